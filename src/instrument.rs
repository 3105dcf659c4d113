//! Thread-safe live instruments and their immutable snapshots.
//!
//! Every instrument hands out a snapshot that is detached from the live
//! value: updates recorded after `snapshot()` returns are never visible
//! through it.

use std::{
    collections::VecDeque,
    sync::atomic::{AtomicI64, AtomicU64, Ordering},
    time::{Duration, Instant},
};

use parking_lot::Mutex;

/// Number of most recent values a histogram keeps for its statistics.
pub const SAMPLE_SIZE: usize = 1028;

/// Percentiles emitted for every histogram and timer.
pub const PERCENTILES: [f64; 6] = [0.5, 0.75, 0.95, 0.98, 0.99, 0.999];

const TICK_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Default)]
pub struct Counter {
    count: AtomicI64,
}
impl Counter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc(&self, n: i64) {
        self.count.fetch_add(n, Ordering::Relaxed);
    }
    pub fn dec(&self, n: i64) {
        self.count.fetch_sub(n, Ordering::Relaxed);
    }
    pub fn clear(&self) {
        self.count.store(0, Ordering::Relaxed);
    }
    pub fn count(&self) -> i64 {
        self.count.load(Ordering::Relaxed)
    }
    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot(self.count())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterSnapshot(pub i64);

#[derive(Debug, Default)]
pub struct Gauge {
    value: AtomicI64,
}
impl Gauge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&self, value: i64) {
        self.value.store(value, Ordering::Relaxed);
    }
    pub fn value(&self) -> i64 {
        self.value.load(Ordering::Relaxed)
    }
    pub fn snapshot(&self) -> GaugeSnapshot {
        GaugeSnapshot(self.value())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GaugeSnapshot(pub i64);

/// Floating point gauge, stored as the bit pattern of an `f64`.
#[derive(Debug, Default)]
pub struct GaugeF64 {
    bits: AtomicU64,
}
impl GaugeF64 {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&self, value: f64) {
        self.bits.store(value.to_bits(), Ordering::Relaxed);
    }
    pub fn value(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Relaxed))
    }
    pub fn snapshot(&self) -> GaugeF64Snapshot {
        GaugeF64Snapshot(self.value())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GaugeF64Snapshot(pub f64);

/// Exponentially weighted moving rate, ticked every [`TICK_INTERVAL`].
#[derive(Debug, Clone, Copy)]
struct Ewma {
    alpha: f64,
    /// Events per second.
    rate: f64,
    uncounted: i64,
    init: bool,
}
impl Ewma {
    fn with_minutes(minutes: f64) -> Self {
        let alpha = 1.0 - (-TICK_INTERVAL.as_secs_f64() / 60.0 / minutes).exp();
        Self {
            alpha,
            rate: 0.0,
            uncounted: 0,
            init: false,
        }
    }

    fn tick(&mut self) {
        let instant_rate = self.uncounted as f64 / TICK_INTERVAL.as_secs_f64();
        self.uncounted = 0;
        if self.init {
            self.rate += self.alpha * (instant_rate - self.rate);
        } else {
            self.rate = instant_rate;
            self.init = true;
        }
    }

    /// Applies `ticks` ticks; only the first one can see uncounted events.
    fn tick_n(&mut self, ticks: u32) {
        if ticks == 0 {
            return;
        }
        self.tick();
        let idle = i32::try_from(ticks - 1).unwrap_or(i32::MAX);
        self.rate *= (1.0 - self.alpha).powi(idle);
    }
}

#[derive(Debug)]
struct MeterState {
    count: i64,
    rates: [Ewma; 3],
    last_tick: Instant,
}
impl MeterState {
    fn catch_up(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_tick);
        let ticks = elapsed.as_nanos() / TICK_INTERVAL.as_nanos();
        if ticks == 0 {
            return;
        }
        let ticks = u32::try_from(ticks).unwrap_or(u32::MAX);
        for rate in &mut self.rates {
            rate.tick_n(ticks);
        }
        self.last_tick += TICK_INTERVAL * ticks;
    }
}

/// Counts events and tracks their 1-, 5- and 15-minute moving rates.
#[derive(Debug)]
pub struct Meter {
    start: Instant,
    state: Mutex<MeterState>,
}
impl Meter {
    pub fn new() -> Self {
        Self::started_at(Instant::now())
    }

    pub(crate) fn started_at(start: Instant) -> Self {
        let state = MeterState {
            count: 0,
            rates: [
                Ewma::with_minutes(1.0),
                Ewma::with_minutes(5.0),
                Ewma::with_minutes(15.0),
            ],
            last_tick: start,
        };
        Self {
            start,
            state: Mutex::new(state),
        }
    }

    pub fn mark(&self, n: i64) {
        self.mark_at(n, Instant::now());
    }
    pub(crate) fn mark_at(&self, n: i64, now: Instant) {
        let mut state = self.state.lock();
        state.catch_up(now);
        state.count = state.count.wrapping_add(n);
        for rate in &mut state.rates {
            rate.uncounted = rate.uncounted.wrapping_add(n);
        }
    }

    pub fn snapshot(&self) -> MeterSnapshot {
        self.snapshot_at(Instant::now())
    }
    pub(crate) fn snapshot_at(&self, now: Instant) -> MeterSnapshot {
        let mut state = self.state.lock();
        state.catch_up(now);
        let elapsed = now.saturating_duration_since(self.start).as_secs_f64();
        let rate_mean = if elapsed > 0.0 {
            state.count as f64 / elapsed
        } else {
            0.0
        };
        MeterSnapshot {
            count: state.count,
            rate1: state.rates[0].rate,
            rate5: state.rates[1].rate,
            rate15: state.rates[2].rate,
            rate_mean,
        }
    }
}
impl Default for Meter {
    fn default() -> Self {
        Self::new()
    }
}

/// Rates are events per second.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MeterSnapshot {
    pub count: i64,
    pub rate1: f64,
    pub rate5: f64,
    pub rate15: f64,
    pub rate_mean: f64,
}

#[derive(Debug, Default)]
struct HistogramState {
    count: i64,
    sample: VecDeque<i64>,
}

/// Distribution of values over a sliding window of the most recent
/// [`SAMPLE_SIZE`] updates. `count` covers every update ever made.
#[derive(Debug, Default)]
pub struct Histogram {
    state: Mutex<HistogramState>,
}
impl Histogram {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&self, value: i64) {
        let mut state = self.state.lock();
        state.count += 1;
        if state.sample.len() == SAMPLE_SIZE {
            state.sample.pop_front();
        }
        state.sample.push_back(value);
    }
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.count = 0;
        state.sample.clear();
    }
    pub fn snapshot(&self) -> HistogramSnapshot {
        let (count, mut values) = {
            let state = self.state.lock();
            (state.count, Vec::from_iter(state.sample.iter().copied()))
        };
        values.sort_unstable();
        HistogramSnapshot { count, values }
    }
}

/// Frozen, sorted copy of a histogram's sample.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct HistogramSnapshot {
    count: i64,
    values: Vec<i64>,
}
impl HistogramSnapshot {
    pub fn from_values(count: i64, mut values: Vec<i64>) -> Self {
        values.sort_unstable();
        Self { count, values }
    }

    pub fn count(&self) -> i64 {
        self.count
    }
    pub fn min(&self) -> i64 {
        self.values.first().copied().unwrap_or(0)
    }
    pub fn max(&self) -> i64 {
        self.values.last().copied().unwrap_or(0)
    }
    pub fn mean(&self) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }
        let sum: f64 = self.values.iter().map(|&v| v as f64).sum();
        sum / self.values.len() as f64
    }
    /// Population standard deviation of the sample.
    pub fn std_dev(&self) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }
        let mean = self.mean();
        let sum: f64 = self
            .values
            .iter()
            .map(|&v| {
                let d = v as f64 - mean;
                d * d
            })
            .sum();
        (sum / self.values.len() as f64).sqrt()
    }
    pub fn percentile(&self, p: f64) -> f64 {
        let n = self.values.len();
        if n == 0 {
            return 0.0;
        }
        let pos = p * (n + 1) as f64;
        if pos < 1.0 {
            self.values[0] as f64
        } else if pos >= n as f64 {
            self.values[n - 1] as f64
        } else {
            let lower = self.values[pos as usize - 1] as f64;
            let upper = self.values[pos as usize] as f64;
            lower + (pos - pos.floor()) * (upper - lower)
        }
    }
}

/// A meter of events plus a histogram of their durations in nanoseconds.
#[derive(Debug, Default)]
pub struct Timer {
    /// Held across both halves so a snapshot never sees one without the other.
    pair: Mutex<()>,
    meter: Meter,
    histogram: Histogram,
}
impl Timer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&self, duration: Duration) {
        let nanos = i64::try_from(duration.as_nanos()).unwrap_or(i64::MAX);
        let _pair = self.pair.lock();
        self.histogram.update(nanos);
        self.meter.mark(1);
    }
    pub fn update_since(&self, start: Instant) {
        self.update(start.elapsed());
    }
    pub fn time<T>(&self, f: impl FnOnce() -> T) -> T {
        let start = Instant::now();
        let out = f();
        self.update_since(start);
        out
    }
    pub fn snapshot(&self) -> TimerSnapshot {
        let _pair = self.pair.lock();
        TimerSnapshot {
            rates: self.meter.snapshot(),
            durations: self.histogram.snapshot(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct TimerSnapshot {
    pub rates: MeterSnapshot,
    /// Nanoseconds.
    pub durations: HistogramSnapshot,
}
