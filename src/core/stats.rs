//! Request statistics and metric snapshots
//!
//! Components that can describe themselves implement [`MetricsProvider`];
//! the server renders the combined snapshot in Prometheus text format.
//! Counters and histograms recorded while serving requests go through a
//! [`StatsRegistry`].

use parking_lot::Mutex;
use serde::Serialize;
use std::collections::BTreeMap;

/// Prometheus metric type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    Counter,
    Gauge,
    Histogram,
    Summary,
}

impl MetricKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Counter => "counter",
            MetricKind::Gauge => "gauge",
            MetricKind::Histogram => "histogram",
            MetricKind::Summary => "summary",
        }
    }
}

/// One sample of a metric series
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Metric {
    pub name: String,
    pub help: Option<String>,
    pub kind: Option<MetricKind>,
    pub tags: Vec<(String, String)>,
    pub value: f64,
}

impl Metric {
    pub fn new(name: impl Into<String>, value: f64) -> Self {
        Metric {
            name: name.into(),
            help: None,
            kind: None,
            tags: Vec::new(),
            value,
        }
    }

    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    pub fn with_kind(mut self, kind: MetricKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn with_tag(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.push((name.into(), value.into()));
        self
    }
}

/// Something that reports metrics
pub trait MetricsProvider {
    fn metrics(&self) -> Vec<Metric>;
}

/// Sink for counters and histograms recorded while serving requests
pub trait StatsRegistry: MetricsProvider + Send + Sync {
    /// Add `amount` to the counter series `name{labels}`
    fn counter_inc(&self, name: &str, labels: &[(&str, &str)], amount: f64);

    /// Record one observation as Prometheus histogram series
    /// (`_sum`, `_count` and cumulative `_bucket{le=...}` including `+Inf`)
    fn histogram(&self, name: &str, labels: &[(&str, &str)], buckets: &[f64], value: f64) {
        self.counter_inc(&format!("{}_sum", name), labels, value);
        self.counter_inc(&format!("{}_count", name), labels, 1.0);

        let bucket_name = format!("{}_bucket", name);
        for bound in buckets {
            if value <= *bound {
                let le = bound.to_string();
                let mut bucket_labels = labels.to_vec();
                bucket_labels.push(("le", le.as_str()));
                self.counter_inc(&bucket_name, &bucket_labels, 1.0);
            }
        }
        let mut inf_labels = labels.to_vec();
        inf_labels.push(("le", "+Inf"));
        self.counter_inc(&bucket_name, &inf_labels, 1.0);
    }
}

type SeriesKey = (String, Vec<(String, String)>);

/// Process-local registry
#[derive(Debug, Default)]
pub struct InMemoryStatsRegistry {
    series: Mutex<BTreeMap<SeriesKey, f64>>,
}

impl InMemoryStatsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value of a series, if it was ever incremented
    pub fn value(&self, name: &str, labels: &[(&str, &str)]) -> Option<f64> {
        self.series.lock().get(&series_key(name, labels)).copied()
    }
}

fn series_key(name: &str, labels: &[(&str, &str)]) -> SeriesKey {
    let mut tags: Vec<(String, String)> = labels
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    tags.sort();
    (name.to_string(), tags)
}

impl StatsRegistry for InMemoryStatsRegistry {
    fn counter_inc(&self, name: &str, labels: &[(&str, &str)], amount: f64) {
        *self.series.lock().entry(series_key(name, labels)).or_insert(0.0) += amount;
    }
}

impl MetricsProvider for InMemoryStatsRegistry {
    fn metrics(&self) -> Vec<Metric> {
        self.series
            .lock()
            .iter()
            .map(|((name, tags), value)| Metric {
                name: name.clone(),
                help: None,
                kind: None,
                tags: tags.clone(),
                value: *value,
            })
            .collect()
    }
}
