//! Snapshot to [`DataPoint`] conversion, one function per instrument kind.

use std::time::Duration;

use crate::{
    instrument::{
        CounterSnapshot, GaugeF64Snapshot, GaugeSnapshot, HistogramSnapshot, MeterSnapshot,
        TimerSnapshot, PERCENTILES,
    },
    registry::MetricSnapshot,
    DataPoint, MetricKind, Time,
};

pub const COUNT_UNIT: &str = "count";
pub const RATE_UNIT: &str = "per-second";

const METER_FANOUT: usize = 5;
const HISTOGRAM_FANOUT: usize = 5 + PERCENTILES.len();
const PERCENTILE_SUFFIXES: [&str; PERCENTILES.len()] =
    [".p50", ".p75", ".p95", ".p98", ".p99", ".p999"];

/// Number of points [`convert`] produces for `snapshot`.
pub fn fanout(snapshot: &MetricSnapshot) -> usize {
    match snapshot {
        MetricSnapshot::Counter(_) | MetricSnapshot::Gauge(_) | MetricSnapshot::GaugeF64(_) => 1,
        MetricSnapshot::Meter(_) => METER_FANOUT,
        MetricSnapshot::Timer(_) => METER_FANOUT + HISTOGRAM_FANOUT - 1,
        MetricSnapshot::Histogram(_) => HISTOGRAM_FANOUT,
        MetricSnapshot::Unsupported => 0,
    }
}

pub fn convert(
    snapshot: &MetricSnapshot,
    name: &str,
    timestamp: Time,
    time_unit: Duration,
) -> Vec<DataPoint> {
    match snapshot {
        MetricSnapshot::Counter(s) => vec![convert_counter(*s, name, timestamp)],
        MetricSnapshot::Gauge(s) => vec![convert_gauge(*s, name, timestamp)],
        MetricSnapshot::GaugeF64(s) => vec![convert_gauge_f64(*s, name, timestamp)],
        MetricSnapshot::Meter(s) => convert_meter(s, name, timestamp),
        MetricSnapshot::Timer(s) => convert_timer(s, name, timestamp, time_unit),
        MetricSnapshot::Histogram(s) => convert_histogram(s, name, timestamp),
        MetricSnapshot::Unsupported => vec![],
    }
}

fn point(name: String, kind: MetricKind, value: f64, timestamp: Time, unit: &str) -> DataPoint {
    DataPoint {
        name,
        kind,
        value,
        timestamp,
        unit: unit.to_owned(),
    }
}

pub fn convert_counter(snapshot: CounterSnapshot, name: &str, timestamp: Time) -> DataPoint {
    point(
        name.to_owned(),
        MetricKind::Counter,
        snapshot.0 as f64,
        timestamp,
        COUNT_UNIT,
    )
}

pub fn convert_gauge(snapshot: GaugeSnapshot, name: &str, timestamp: Time) -> DataPoint {
    point(name.to_owned(), MetricKind::Gauge, snapshot.0 as f64, timestamp, "")
}

pub fn convert_gauge_f64(snapshot: GaugeF64Snapshot, name: &str, timestamp: Time) -> DataPoint {
    point(name.to_owned(), MetricKind::Gauge, snapshot.0, timestamp, "")
}

fn rate_points(
    snapshot: &MeterSnapshot,
    name: &str,
    kind: MetricKind,
    timestamp: Time,
) -> [DataPoint; METER_FANOUT] {
    let rate = |suffix: &str, value: f64| {
        point(format!("{name}{suffix}"), kind, value, timestamp, RATE_UNIT)
    };
    [
        point(
            format!("{name}.count"),
            kind,
            snapshot.count as f64,
            timestamp,
            COUNT_UNIT,
        ),
        rate(".rate1", snapshot.rate1),
        rate(".rate5", snapshot.rate5),
        rate(".rate15", snapshot.rate15),
        rate(".meanRate", snapshot.rate_mean),
    ]
}

pub fn convert_meter(snapshot: &MeterSnapshot, name: &str, timestamp: Time) -> Vec<DataPoint> {
    Vec::from(rate_points(snapshot, name, MetricKind::Meter, timestamp))
}

/// Distribution statistics, each divided by `scale`. Excludes `.count`.
fn distribution_points(
    snapshot: &HistogramSnapshot,
    name: &str,
    kind: MetricKind,
    timestamp: Time,
    scale: f64,
    unit: &str,
) -> Vec<DataPoint> {
    let stat = |suffix: &str, value: f64| {
        point(format!("{name}{suffix}"), kind, value / scale, timestamp, unit)
    };
    let mut points = Vec::with_capacity(HISTOGRAM_FANOUT - 1);
    points.push(stat(".min", snapshot.min() as f64));
    points.push(stat(".max", snapshot.max() as f64));
    points.push(stat(".mean", snapshot.mean()));
    points.push(stat(".stddev", snapshot.std_dev()));
    for (p, suffix) in PERCENTILES.iter().zip(PERCENTILE_SUFFIXES) {
        points.push(stat(suffix, snapshot.percentile(*p)));
    }
    points
}

pub fn convert_histogram(
    snapshot: &HistogramSnapshot,
    name: &str,
    timestamp: Time,
) -> Vec<DataPoint> {
    let kind = MetricKind::Histogram;
    let mut points = Vec::with_capacity(HISTOGRAM_FANOUT);
    points.push(point(
        format!("{name}.count"),
        kind,
        snapshot.count() as f64,
        timestamp,
        "",
    ));
    points.extend(distribution_points(snapshot, name, kind, timestamp, 1.0, ""));
    points
}

/// Durations are recorded in nanoseconds and emitted in `time_unit`.
pub fn convert_timer(
    snapshot: &TimerSnapshot,
    name: &str,
    timestamp: Time,
    time_unit: Duration,
) -> Vec<DataPoint> {
    let kind = MetricKind::Timer;
    let scale = time_unit.as_nanos().max(1) as f64;
    let unit = time_unit_name(time_unit);
    let mut points = Vec::with_capacity(METER_FANOUT + HISTOGRAM_FANOUT - 1);
    points.extend(rate_points(&snapshot.rates, name, kind, timestamp));
    points.extend(distribution_points(
        &snapshot.durations,
        name,
        kind,
        timestamp,
        scale,
        &unit,
    ));
    points
}

/// `1ms`, `1s`, `250us`, ...
pub fn time_unit_name(time_unit: Duration) -> String {
    humantime::format_duration(time_unit).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const TS: Time = 1_700_000_000_000;

    fn names(points: &[DataPoint]) -> Vec<&str> {
        points.iter().map(|p| p.name.as_str()).collect()
    }

    #[test]
    fn counter_is_unscaled() {
        let point = convert_counter(CounterSnapshot(42), "requests", TS);
        assert_eq!(
            point,
            DataPoint {
                name: "requests".into(),
                kind: MetricKind::Counter,
                value: 42.0,
                timestamp: TS,
                unit: "count".into(),
            }
        );
    }

    #[test]
    fn gauges_keep_their_value() {
        let point = convert_gauge(GaugeSnapshot(-7), "depth", TS);
        assert_eq!(point.value, -7.0);
        assert_eq!(point.kind, MetricKind::Gauge);
        assert_eq!(point.unit, "");

        let point = convert_gauge_f64(GaugeF64Snapshot(0.25), "ratio", TS);
        assert_eq!(point.value, 0.25);
        assert_eq!(point.kind, MetricKind::Gauge);
    }

    #[test]
    fn meter_expands_to_rates() {
        let snapshot = MeterSnapshot {
            count: 10,
            rate1: 1.0,
            rate5: 5.0,
            rate15: 15.0,
            rate_mean: 0.5,
        };
        let points = convert_meter(&snapshot, "hits", TS);
        assert_eq!(
            names(&points),
            ["hits.count", "hits.rate1", "hits.rate5", "hits.rate15", "hits.meanRate"]
        );
        let values: Vec<f64> = points.iter().map(|p| p.value).collect();
        assert_eq!(values, [10.0, 1.0, 5.0, 15.0, 0.5]);
        assert!(points.iter().all(|p| p.kind == MetricKind::Meter));
        assert_eq!(points[0].unit, "count");
        assert!(points[1..].iter().all(|p| p.unit == "per-second"));
    }

    #[test]
    fn histogram_expands_to_statistics() {
        let snapshot = HistogramSnapshot::from_values(7, vec![1, 2, 3, 4, 5]);
        let points = convert_histogram(&snapshot, "size", TS);
        assert_eq!(
            names(&points),
            [
                "size.count",
                "size.min",
                "size.max",
                "size.mean",
                "size.stddev",
                "size.p50",
                "size.p75",
                "size.p95",
                "size.p98",
                "size.p99",
                "size.p999",
            ]
        );
        assert_eq!(points[0].value, 7.0);
        assert_eq!(points[1].value, 1.0);
        assert_eq!(points[2].value, 5.0);
        assert_eq!(points[3].value, 3.0);
        assert_eq!(points[5].value, 3.0);
        assert!(points.iter().all(|p| p.kind == MetricKind::Histogram));
    }

    #[test]
    fn timer_rescales_durations() {
        let snapshot = TimerSnapshot {
            rates: MeterSnapshot {
                count: 2,
                ..Default::default()
            },
            durations: HistogramSnapshot::from_values(2, vec![2_000_000, 4_000_000]),
        };
        let points = convert_timer(&snapshot, "latency", TS, Duration::from_millis(1));
        assert_eq!(points.len(), 15);
        assert!(points.iter().all(|p| p.kind == MetricKind::Timer));

        let find = |name: &str| points.iter().find(|p| p.name == name).unwrap();
        assert_eq!(find("latency.count").value, 2.0);
        assert_eq!(find("latency.mean").value, 3.0);
        assert_eq!(find("latency.mean").unit, "1ms");
        assert_eq!(find("latency.min").value, 2.0);
        assert_eq!(find("latency.max").value, 4.0);
        assert_eq!(find("latency.stddev").value, 1.0);
        assert_eq!(find("latency.rate1").unit, "per-second");
    }

    #[test]
    fn timer_mean_in_microseconds() {
        let snapshot = TimerSnapshot {
            durations: HistogramSnapshot::from_values(1, vec![1_500]),
            ..Default::default()
        };
        let points = convert_timer(&snapshot, "t", TS, Duration::from_micros(1));
        let mean = points.iter().find(|p| p.name == "t.mean").unwrap();
        assert_eq!(mean.value, 1.5);
        assert_eq!(mean.unit, "1us");
    }

    #[test]
    fn fanout_matches_conversion() {
        let snapshots = [
            MetricSnapshot::Counter(CounterSnapshot(1)),
            MetricSnapshot::Gauge(GaugeSnapshot(1)),
            MetricSnapshot::GaugeF64(GaugeF64Snapshot(1.0)),
            MetricSnapshot::Meter(MeterSnapshot::default()),
            MetricSnapshot::Timer(TimerSnapshot::default()),
            MetricSnapshot::Histogram(HistogramSnapshot::default()),
            MetricSnapshot::Unsupported,
        ];
        for snapshot in &snapshots {
            let points = convert(snapshot, "m", TS, Duration::from_millis(1));
            assert_eq!(points.len(), fanout(snapshot), "{snapshot:?}");
            assert!(points.iter().all(|p| p.timestamp == TS));
        }
    }

    #[test]
    fn time_unit_names() {
        assert_eq!(time_unit_name(Duration::from_millis(1)), "1ms");
        assert_eq!(time_unit_name(Duration::from_secs(1)), "1s");
        assert_eq!(time_unit_name(Duration::from_nanos(1)), "1ns");
    }
}
