//! Envelopes as received by a fake Metron agent over UDP.

use std::{collections::HashMap, net::UdpSocket, time::Duration};

use metrics_loggregator::{
    clock::FixedClock,
    envelope::{Envelope, EventType, ValueMetric},
    transport::{SendReport, MAX_DATAGRAM_SIZE},
    Config, DataPoint, Exporter, MetricKind, MetricRegistry, MetronTransport, Options,
};
use prost::Message;

// =============================================================================
// Test Helpers
// =============================================================================

struct FakeMetron {
    socket: UdpSocket,
    buf: Vec<u8>,
}
impl FakeMetron {
    fn bind() -> anyhow::Result<Self> {
        let socket = UdpSocket::bind("127.0.0.1:0")?;
        socket.set_read_timeout(Some(Duration::from_secs(2)))?;
        Ok(Self {
            socket,
            buf: vec![0; 1 << 16],
        })
    }

    fn address(&self) -> String {
        self.socket.local_addr().unwrap().to_string()
    }

    fn config(&self) -> Config {
        Options::new()
            .with_collector_address(self.address())
            .with_origin("some origin")
            .with_tag("serviceGuid", "abc-123")
            .build()
    }

    fn recv(&mut self) -> anyhow::Result<Envelope> {
        let n = self.socket.recv(&mut self.buf)?;
        Ok(Envelope::decode(&self.buf[..n])?)
    }

    fn recv_n(&mut self, n: usize) -> anyhow::Result<Vec<Envelope>> {
        (0..n).map(|_| self.recv()).collect()
    }

    fn assert_quiet(&self) {
        self.socket
            .set_read_timeout(Some(Duration::from_millis(200)))
            .unwrap();
        let mut buf = [0; 16];
        assert!(self.socket.recv(&mut buf).is_err(), "unexpected datagram");
    }
}

fn point(name: &str, kind: MetricKind, value: f64) -> DataPoint {
    DataPoint {
        name: name.into(),
        kind,
        value,
        timestamp: 872_828_732,
        unit: "count".into(),
    }
}

// =============================================================================
// Transport
// =============================================================================

#[test]
fn sends_metrics_to_metron_over_udp() -> anyhow::Result<()> {
    let mut metron = FakeMetron::bind()?;
    let mut transport = MetronTransport::new(&metron.config());
    assert!(transport.is_connected());

    let report = transport.send_batch(&[point("test-counter", MetricKind::Counter, 123.0)]);
    assert_eq!(report, SendReport { sent: 1, failed: 0 });

    let envelope = metron.recv()?;
    assert_eq!(
        envelope,
        Envelope {
            origin: "some origin".into(),
            event_type: EventType::ValueMetric as i32,
            timestamp: Some(872_828_732),
            value_metric: Some(ValueMetric {
                name: "test-counter".into(),
                value: 123.0,
                unit: "count".into(),
            }),
            tags: HashMap::from([
                ("serviceGuid".to_owned(), "abc-123".to_owned()),
                ("type".to_owned(), "COUNTER".to_owned()),
            ]),
        }
    );
    Ok(())
}

#[test]
fn failing_point_does_not_stop_the_batch() -> anyhow::Result<()> {
    let mut metron = FakeMetron::bind()?;
    let mut transport = MetronTransport::new(&metron.config());

    let oversized = "x".repeat(MAX_DATAGRAM_SIZE);
    let points = [
        point("first", MetricKind::Counter, 1.0),
        point(&oversized, MetricKind::Counter, 2.0),
        point("third", MetricKind::Counter, 3.0),
    ];
    let report = transport.send_batch(&points);
    assert_eq!(report, SendReport { sent: 2, failed: 1 });

    let names: Vec<String> = metron
        .recv_n(2)?
        .into_iter()
        .filter_map(|e| e.value_metric.map(|m| m.name))
        .collect();
    assert_eq!(names, ["first", "third"]);
    metron.assert_quiet();
    Ok(())
}

#[test]
fn caller_type_tag_is_overwritten() -> anyhow::Result<()> {
    let mut metron = FakeMetron::bind()?;
    let config = Options::new()
        .with_collector_address(metron.address())
        .with_tag("type", "mine")
        .build();
    let mut transport = MetronTransport::new(&config);
    transport.send_batch(&[point("depth", MetricKind::Gauge, 1.0)]);

    let envelope = metron.recv()?;
    assert_eq!(envelope.tags.get("type").map(String::as_str), Some("GAUGE"));
    assert_eq!(envelope.origin, "");
    Ok(())
}

// =============================================================================
// Export cycle
// =============================================================================

#[test]
fn one_cycle_end_to_end() -> anyhow::Result<()> {
    const T: u64 = 1_500_000_000_000;

    let mut metron = FakeMetron::bind()?;
    let registry = MetricRegistry::new();
    registry.get_or_register_counter("requests")?.inc(42);
    registry.get_or_register_gauge("queue_depth")?.update(7);

    let config = metron.config();
    let transport = MetronTransport::new(&config);
    let mut exporter = Exporter::with_clock(transport, FixedClock(T), config.time_unit());

    let mut points = exporter.assemble(&registry);
    points.sort_by(|a, b| a.name.cmp(&b.name));
    assert_eq!(points.len(), 2);
    assert_eq!(points[0].name, "queue_depth");
    assert_eq!(points[0].kind, MetricKind::Gauge);
    assert_eq!(points[0].value, 7.0);
    assert_eq!(points[1].name, "requests");
    assert_eq!(points[1].kind, MetricKind::Counter);
    assert_eq!(points[1].value, 42.0);
    assert!(points.iter().all(|p| p.timestamp == T));

    exporter.export(&registry);

    let mut envelopes = metron.recv_n(2)?;
    envelopes.sort_by_key(|e| e.value_metric.as_ref().map(|m| m.name.clone()));
    let types: Vec<&str> = envelopes.iter().map(|e| e.tags["type"].as_str()).collect();
    assert_eq!(types, ["GAUGE", "COUNTER"]);
    for envelope in &envelopes {
        assert_eq!(envelope.origin, "some origin");
        assert_eq!(envelope.timestamp, Some(T as i64));
        assert_eq!(envelope.tags["serviceGuid"], "abc-123");
    }
    Ok(())
}
