//! Bounded in-memory time-series store.
//!
//! Each distinct `(name, labels)` pair owns a FIFO ring of samples capped at
//! `max_samples_per_key`. A periodic sweep drops samples older than the
//! retention window so memory stays bounded even for keys that stop
//! receiving writes.

use crate::task::PeriodicTask;
use crate::types::{Labels, MetricStats, Sample, TimeRange, metric_key};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

/// Default cap on samples retained per series
pub const DEFAULT_MAX_SAMPLES_PER_KEY: usize = 1000;

/// Default retention window
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(24 * 60 * 60);

/// Default cap on distinct series
pub const DEFAULT_MAX_SERIES: usize = 10_000;

/// Samples for one metric key, oldest first
#[derive(Debug, Clone)]
pub struct MetricSeries {
    pub name: String,
    pub labels: Labels,
    pub samples: VecDeque<Sample>,
}

impl MetricSeries {
    fn matches(&self, name: &str, filter: &Labels) -> bool {
        self.name == name
            && filter
                .iter()
                .all(|(k, v)| self.labels.get(k).is_some_and(|actual| actual == v))
    }
}

/// Latest sample of one series, used for export
#[derive(Debug, Clone, PartialEq)]
pub struct LatestSample {
    pub name: String,
    pub labels: Labels,
    pub sample: Sample,
}

/// Store configuration
#[derive(Debug, Clone, Copy)]
pub struct TimeSeriesConfig {
    pub max_samples_per_key: usize,
    pub retention: Duration,
    /// Writes that would open a series beyond this count are dropped
    pub max_series: usize,
}

impl Default for TimeSeriesConfig {
    fn default() -> Self {
        Self {
            max_samples_per_key: DEFAULT_MAX_SAMPLES_PER_KEY,
            retention: DEFAULT_RETENTION,
            max_series: DEFAULT_MAX_SERIES,
        }
    }
}

/// Bounded per-key ring of timestamped samples
pub struct TimeSeriesStore {
    series: DashMap<String, MetricSeries>,
    config: TimeSeriesConfig,
    saturated: AtomicBool,
}

impl TimeSeriesStore {
    /// Create an empty store
    pub fn new(config: TimeSeriesConfig) -> Self {
        Self {
            series: DashMap::new(),
            config: TimeSeriesConfig {
                max_samples_per_key: config.max_samples_per_key.max(1),
                retention: config.retention,
                max_series: config.max_series.max(1),
            },
            saturated: AtomicBool::new(false),
        }
    }

    /// Store configuration
    pub fn config(&self) -> TimeSeriesConfig {
        self.config
    }

    /// Append a sample stamped with the current time
    pub fn record(&self, name: &str, value: f64, labels: &Labels) {
        self.record_at(name, value, labels, Utc::now());
    }

    /// Append a sample with an explicit timestamp
    pub fn record_at(&self, name: &str, value: f64, labels: &Labels, timestamp: DateTime<Utc>) {
        let key = metric_key(name, labels);
        if !self.series.contains_key(&key) && self.series.len() >= self.config.max_series {
            if !self.saturated.swap(true, Ordering::Relaxed) {
                warn!(
                    metric = name,
                    max_series = self.config.max_series,
                    "Series limit reached, dropping samples for new series"
                );
            }
            return;
        }

        let mut entry = self.series.entry(key).or_insert_with(|| MetricSeries {
            name: name.to_string(),
            labels: labels.clone(),
            samples: VecDeque::new(),
        });

        entry.samples.push_back(Sample { timestamp, value });
        while entry.samples.len() > self.config.max_samples_per_key {
            entry.samples.pop_front();
        }
    }

    /// Aggregate samples of every series named `name` whose labels include `filter`.
    ///
    /// An empty filter aggregates all label sets of the metric. Without a
    /// range every retained sample counts. Returns zeroed stats when nothing
    /// matches.
    pub fn query(&self, name: &str, filter: &Labels, range: Option<TimeRange>) -> MetricStats {
        let mut values = Vec::new();
        for entry in self.series.iter() {
            let series = entry.value();
            if !series.matches(name, filter) {
                continue;
            }
            values.extend(
                series
                    .samples
                    .iter()
                    .filter(|s| range.is_none_or(|r| r.contains(s.timestamp)))
                    .map(|s| s.value),
            );
        }
        MetricStats::from_values(values)
    }

    /// Samples of exactly one series, oldest first
    pub fn samples(&self, name: &str, labels: &Labels) -> Vec<Sample> {
        self.series
            .get(&metric_key(name, labels))
            .map(|s| s.samples.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Most recent sample of each series, optionally restricted to one metric name.
    /// Sorted by metric key.
    pub fn latest(&self, name: Option<&str>) -> Vec<LatestSample> {
        let mut latest: Vec<(String, LatestSample)> = self
            .series
            .iter()
            .filter(|entry| name.is_none_or(|n| entry.value().name == n))
            .filter_map(|entry| {
                let series = entry.value();
                series.samples.back().map(|sample| {
                    (
                        entry.key().clone(),
                        LatestSample {
                            name: series.name.clone(),
                            labels: series.labels.clone(),
                            sample: *sample,
                        },
                    )
                })
            })
            .collect();

        latest.sort_by(|a, b| a.0.cmp(&b.0));
        latest.into_iter().map(|(_, sample)| sample).collect()
    }

    /// Number of distinct series
    pub fn series_count(&self) -> usize {
        self.series.len()
    }

    /// Drop samples older than the retention window. Returns the number removed.
    pub fn sweep(&self, now: DateTime<Utc>) -> usize {
        let retention = chrono::Duration::from_std(self.config.retention)
            .unwrap_or_else(|_| chrono::Duration::weeks(52 * 100));
        let cutoff = now.checked_sub_signed(retention).unwrap_or(DateTime::<Utc>::MIN_UTC);

        let mut removed = 0;
        self.series.retain(|_, series| {
            while series.samples.front().is_some_and(|s| s.timestamp < cutoff) {
                series.samples.pop_front();
                removed += 1;
            }
            !series.samples.is_empty()
        });
        if self.series.len() < self.config.max_series {
            self.saturated.store(false, Ordering::Relaxed);
        }

        debug!(removed, series = self.series.len(), "Metric retention sweep");
        removed
    }

    /// Run the retention sweep on a timer
    pub fn start_sweeper(self: &Arc<Self>, period: Duration) -> PeriodicTask {
        let store = Arc::clone(self);
        PeriodicTask::spawn("metrics-sweeper", period, move || {
            let store = store.clone();
            async move {
                store.sweep(Utc::now());
            }
        })
    }
}

impl Default for TimeSeriesStore {
    fn default() -> Self {
        Self::new(TimeSeriesConfig::default())
    }
}
