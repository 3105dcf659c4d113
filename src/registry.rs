use std::{any::Any, collections::BTreeMap, sync::Arc};

use parking_lot::RwLock;

use crate::{
    instrument::{
        Counter, CounterSnapshot, Gauge, GaugeF64, GaugeF64Snapshot, GaugeSnapshot, Histogram,
        HistogramSnapshot, Meter, MeterSnapshot, Timer, TimerSnapshot,
    },
    MetricKey,
};

/// Read side of a metric registry, as seen by the exporter.
pub trait Registry: Send + Sync {
    /// Calls `visitor` once per entry with a snapshot taken just before the call.
    fn each(&self, visitor: &mut dyn FnMut(&str, MetricSnapshot));
}
impl<R: Registry + ?Sized> Registry for Arc<R> {
    fn each(&self, visitor: &mut dyn FnMut(&str, MetricSnapshot)) {
        (**self).each(visitor)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MetricSnapshot {
    Counter(CounterSnapshot),
    Gauge(GaugeSnapshot),
    GaugeF64(GaugeF64Snapshot),
    Meter(MeterSnapshot),
    Timer(TimerSnapshot),
    Histogram(HistogramSnapshot),
    /// An entry this exporter has no conversion for.
    Unsupported,
}

#[derive(Clone)]
pub enum Instrument {
    Counter(Arc<Counter>),
    Gauge(Arc<Gauge>),
    GaugeF64(Arc<GaugeF64>),
    Meter(Arc<Meter>),
    Timer(Arc<Timer>),
    Histogram(Arc<Histogram>),
    Other(Arc<dyn Any + Send + Sync>),
}
impl Instrument {
    pub fn snapshot(&self) -> MetricSnapshot {
        match self {
            Instrument::Counter(m) => MetricSnapshot::Counter(m.snapshot()),
            Instrument::Gauge(m) => MetricSnapshot::Gauge(m.snapshot()),
            Instrument::GaugeF64(m) => MetricSnapshot::GaugeF64(m.snapshot()),
            Instrument::Meter(m) => MetricSnapshot::Meter(m.snapshot()),
            Instrument::Timer(m) => MetricSnapshot::Timer(m.snapshot()),
            Instrument::Histogram(m) => MetricSnapshot::Histogram(m.snapshot()),
            Instrument::Other(_) => MetricSnapshot::Unsupported,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Instrument::Counter(_) => "counter",
            Instrument::Gauge(_) => "gauge",
            Instrument::GaugeF64(_) => "gauge_f64",
            Instrument::Meter(_) => "meter",
            Instrument::Timer(_) => "timer",
            Instrument::Histogram(_) => "histogram",
            Instrument::Other(_) => "other",
        }
    }
}
impl core::fmt::Debug for Instrument {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_tuple("Instrument").field(&self.kind_name()).finish()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("metric `{name}` is already registered")]
    Duplicate { name: MetricKey },
    #[error("metric `{name}` is registered as a {actual}, not a {expected}")]
    KindMismatch {
        name: MetricKey,
        expected: &'static str,
        actual: &'static str,
    },
}

/// In-process registry of named live instruments.
#[derive(Debug, Default)]
pub struct MetricRegistry {
    metrics: RwLock<BTreeMap<MetricKey, Instrument>>,
}
impl MetricRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &self,
        name: impl Into<MetricKey>,
        instrument: Instrument,
    ) -> Result<(), RegistryError> {
        let name = name.into();
        let mut metrics = self.metrics.write();
        if metrics.contains_key(&name) {
            return Err(RegistryError::Duplicate { name });
        }
        metrics.insert(name, instrument);
        Ok(())
    }
    pub fn unregister(&self, name: &str) -> Option<Instrument> {
        self.metrics.write().remove(name)
    }
    pub fn get(&self, name: &str) -> Option<Instrument> {
        self.metrics.read().get(name).cloned()
    }
    pub fn len(&self) -> usize {
        self.metrics.read().len()
    }
    pub fn is_empty(&self) -> bool {
        self.metrics.read().is_empty()
    }

    fn get_or_register<T>(
        &self,
        name: &str,
        expected: &'static str,
        unwrap: impl Fn(&Instrument) -> Option<Arc<T>>,
        wrap: impl FnOnce(Arc<T>) -> Instrument,
        new: impl FnOnce() -> T,
    ) -> Result<Arc<T>, RegistryError> {
        let mut metrics = self.metrics.write();
        if let Some(existing) = metrics.get(name) {
            return unwrap(existing).ok_or_else(|| RegistryError::KindMismatch {
                name: name.to_owned(),
                expected,
                actual: existing.kind_name(),
            });
        }
        let instrument = Arc::new(new());
        metrics.insert(name.to_owned(), wrap(instrument.clone()));
        Ok(instrument)
    }

    pub fn get_or_register_counter(&self, name: &str) -> Result<Arc<Counter>, RegistryError> {
        self.get_or_register(
            name,
            "counter",
            |m| match m {
                Instrument::Counter(c) => Some(c.clone()),
                _ => None,
            },
            Instrument::Counter,
            Counter::new,
        )
    }
    pub fn get_or_register_gauge(&self, name: &str) -> Result<Arc<Gauge>, RegistryError> {
        self.get_or_register(
            name,
            "gauge",
            |m| match m {
                Instrument::Gauge(g) => Some(g.clone()),
                _ => None,
            },
            Instrument::Gauge,
            Gauge::new,
        )
    }
    pub fn get_or_register_gauge_f64(&self, name: &str) -> Result<Arc<GaugeF64>, RegistryError> {
        self.get_or_register(
            name,
            "gauge_f64",
            |m| match m {
                Instrument::GaugeF64(g) => Some(g.clone()),
                _ => None,
            },
            Instrument::GaugeF64,
            GaugeF64::new,
        )
    }
    pub fn get_or_register_meter(&self, name: &str) -> Result<Arc<Meter>, RegistryError> {
        self.get_or_register(
            name,
            "meter",
            |m| match m {
                Instrument::Meter(m) => Some(m.clone()),
                _ => None,
            },
            Instrument::Meter,
            Meter::new,
        )
    }
    pub fn get_or_register_timer(&self, name: &str) -> Result<Arc<Timer>, RegistryError> {
        self.get_or_register(
            name,
            "timer",
            |m| match m {
                Instrument::Timer(t) => Some(t.clone()),
                _ => None,
            },
            Instrument::Timer,
            Timer::new,
        )
    }
    pub fn get_or_register_histogram(&self, name: &str) -> Result<Arc<Histogram>, RegistryError> {
        self.get_or_register(
            name,
            "histogram",
            |m| match m {
                Instrument::Histogram(h) => Some(h.clone()),
                _ => None,
            },
            Instrument::Histogram,
            Histogram::new,
        )
    }
}
impl Registry for MetricRegistry {
    fn each(&self, visitor: &mut dyn FnMut(&str, MetricSnapshot)) {
        // Snapshots are taken outside the lock.
        let entries: Vec<(MetricKey, Instrument)> = self
            .metrics
            .read()
            .iter()
            .map(|(name, instrument)| (name.clone(), instrument.clone()))
            .collect();
        for (name, instrument) in entries {
            visitor(&name, instrument.snapshot());
        }
    }
}
