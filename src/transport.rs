use std::{
    collections::HashMap,
    io,
    net::{Ipv4Addr, Ipv6Addr, SocketAddr, ToSocketAddrs, UdpSocket},
};

use prost::Message;

use crate::{
    config::Config,
    envelope::{Envelope, EventType, ValueMetric},
    DataPoint,
};

/// Largest payload a single UDP datagram can carry.
pub const MAX_DATAGRAM_SIZE: usize = 65_507;

/// Tag key that always carries the point's kind.
pub const TYPE_TAG: &str = "type";

/// Sink for one export cycle's batch of points.
pub trait Transport: Send {
    /// Best effort: failures are reported through logs only.
    fn send(&mut self, points: &[DataPoint]);
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("no connection to `{address}`")]
    NotConnected { address: String },
    #[error("envelope of {len} bytes exceeds the {max} byte datagram limit")]
    Oversized { len: usize, max: usize },
    #[error("cannot encode envelope: {0}")]
    Encode(#[from] prost::EncodeError),
    #[error("cannot write datagram: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SendReport {
    pub sent: usize,
    pub failed: usize,
}

/// Writes one protobuf envelope per point to the Metron agent over UDP.
#[derive(Debug)]
pub struct MetronTransport {
    socket: Option<UdpSocket>,
    address: String,
    origin: String,
    tags: HashMap<String, String>,
    buf: Vec<u8>,
}
impl MetronTransport {
    /// Never fails: if the agent's address cannot be used, the transport is
    /// created without a socket and every write fails.
    pub fn new(config: &Config) -> Self {
        let address = config.collector_address().to_owned();
        let socket = match connect(&address) {
            Ok(socket) => Some(socket),
            Err(e) => {
                tracing::warn!(%address, error = %e, "Cannot resolve Metron's address");
                None
            }
        };
        Self {
            socket,
            address,
            origin: config.origin().to_owned(),
            tags: config.tags().clone(),
            buf: vec![],
        }
    }

    pub fn is_connected(&self) -> bool {
        self.socket.is_some()
    }

    pub fn send_batch(&mut self, points: &[DataPoint]) -> SendReport {
        let mut report = SendReport::default();
        for point in points {
            match self.write_message(point) {
                Ok(()) => report.sent += 1,
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(
                        metric = %point.name,
                        error = %e,
                        "Cannot write envelope to metron agent"
                    );
                }
            }
        }
        tracing::debug!(
            sent = report.sent,
            failed = report.failed,
            "Sent metrics to metron agent"
        );
        report
    }

    pub fn envelope(&self, point: &DataPoint) -> Envelope {
        let mut tags = self.tags.clone();
        tags.insert(TYPE_TAG.to_owned(), point.kind.as_str().to_owned());
        Envelope {
            origin: self.origin.clone(),
            event_type: EventType::ValueMetric as i32,
            timestamp: Some(i64::try_from(point.timestamp).unwrap_or(i64::MAX)),
            value_metric: Some(ValueMetric {
                name: point.name.clone(),
                value: point.value,
                unit: point.unit.clone(),
            }),
            tags,
        }
    }

    fn write_message(&mut self, point: &DataPoint) -> Result<(), TransportError> {
        let envelope = self.envelope(point);
        let len = envelope.encoded_len();
        if len > MAX_DATAGRAM_SIZE {
            return Err(TransportError::Oversized {
                len,
                max: MAX_DATAGRAM_SIZE,
            });
        }
        self.buf.clear();
        envelope.encode(&mut self.buf)?;
        let Some(socket) = &self.socket else {
            return Err(TransportError::NotConnected {
                address: self.address.clone(),
            });
        };
        socket.send(&self.buf)?;
        Ok(())
    }
}
impl Transport for MetronTransport {
    fn send(&mut self, points: &[DataPoint]) {
        self.send_batch(points);
    }
}

fn connect(address: &str) -> io::Result<UdpSocket> {
    let addr = address.to_socket_addrs()?.next().ok_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidInput, "address resolved to nothing")
    })?;
    let local: SocketAddr = match addr {
        SocketAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
        SocketAddr::V6(_) => (Ipv6Addr::UNSPECIFIED, 0).into(),
    };
    let socket = UdpSocket::bind(local)?;
    socket.connect(addr)?;
    socket.set_nonblocking(true)?;
    Ok(socket)
}

#[cfg(test)]
mod tests {
    use crate::{config::Options, MetricKind};

    use super::*;

    fn point(name: &str, kind: MetricKind) -> DataPoint {
        DataPoint {
            name: name.into(),
            kind,
            value: 1.0,
            timestamp: 872_828_732,
            unit: "count".into(),
        }
    }

    #[test]
    fn type_tag_overrides_base_tag() {
        let config = Options::new()
            .with_origin("svc")
            .with_tag("type", "caller-value")
            .with_tag("serviceGuid", "abc-123")
            .build();
        let transport = MetronTransport::new(&config);
        let envelope = transport.envelope(&point("requests", MetricKind::Counter));
        assert_eq!(envelope.tags["type"], "COUNTER");
        assert_eq!(envelope.tags["serviceGuid"], "abc-123");
        assert_eq!(envelope.tags.len(), 2);
        assert_eq!(envelope.origin, "svc");
        assert_eq!(envelope.timestamp, Some(872_828_732));
        assert_eq!(envelope.event_type, EventType::ValueMetric as i32);
    }

    #[test]
    fn unresolvable_address_degrades() {
        let config = Options::new()
            .with_collector_address("not an address")
            .build();
        let mut transport = MetronTransport::new(&config);
        assert!(!transport.is_connected());
        let points = [
            point("a", MetricKind::Counter),
            point("b", MetricKind::Gauge),
        ];
        let report = transport.send_batch(&points);
        assert_eq!(report, SendReport { sent: 0, failed: 2 });
    }

    #[test]
    fn oversized_envelope_is_rejected_before_writing() {
        let config = Options::new()
            .with_collector_address("not an address")
            .build();
        let mut transport = MetronTransport::new(&config);
        let name = "x".repeat(MAX_DATAGRAM_SIZE);
        let err = transport
            .write_message(&point(&name, MetricKind::Gauge))
            .unwrap_err();
        assert!(matches!(err, TransportError::Oversized { .. }));
    }
}
