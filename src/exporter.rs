use std::time::Duration;

use crate::{
    clock::{Clock, SystemClock},
    convert::convert,
    registry::Registry,
    transport::Transport,
    DataPoint,
};

#[derive(Debug)]
pub struct Exporter<T, C = SystemClock> {
    transport: T,
    clock: C,
    time_unit: Duration,
}
impl<T: Transport> Exporter<T> {
    pub fn new(transport: T, time_unit: Duration) -> Self {
        Self::with_clock(transport, SystemClock, time_unit)
    }
}
impl<T: Transport, C: Clock> Exporter<T, C> {
    pub fn with_clock(transport: T, clock: C, time_unit: Duration) -> Self {
        Self {
            transport,
            clock,
            time_unit,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Converts every registry entry into points sharing one timestamp.
    pub fn assemble(&self, registry: &dyn Registry) -> Vec<DataPoint> {
        let mut points = vec![];
        let now = self.clock.now();
        registry.each(&mut |name, snapshot| {
            points.extend(convert(&snapshot, name, now, self.time_unit));
        });
        points
    }

    /// Assembles one batch and hands it to the transport. Per-point send
    /// failures are logged by the transport and never reach the caller.
    pub fn export(&mut self, registry: &dyn Registry) {
        let points = self.assemble(registry);
        tracing::debug!(points = points.len(), "Exporting metrics");
        self.transport.send(&points);
    }
}
