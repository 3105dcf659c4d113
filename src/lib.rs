pub mod clock;
pub mod config;
pub mod convert;
pub mod envelope;
pub mod exporter;
pub mod instrument;
pub mod registry;
pub mod reporter;
pub mod transport;

pub use config::{Config, Options};
pub use exporter::Exporter;
pub use registry::{MetricRegistry, Registry};
pub use reporter::{loggregator, Reporter, ReporterHandle};
pub use transport::{MetronTransport, Transport};

type MetricKey = String;

/// Milliseconds since the Unix epoch.
pub type Time = u64;

/// Classifies the instrument a [`DataPoint`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricKind {
    Counter,
    Gauge,
    Meter,
    Timer,
    Histogram,
}
impl MetricKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Counter => "COUNTER",
            MetricKind::Gauge => "GAUGE",
            MetricKind::Meter => "METER",
            MetricKind::Timer => "TIMER",
            MetricKind::Histogram => "HISTOGRAM",
        }
    }
}
impl core::fmt::Display for MetricKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One normalized value, ready to be wrapped in an envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct DataPoint {
    pub name: String,
    pub kind: MetricKind,
    pub value: f64,
    pub timestamp: Time,
    pub unit: String,
}
