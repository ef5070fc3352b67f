//! Stage-latency measurement trackers.
//!
//! Two trackers exist per agent: the pre-agent window (submission to store
//! claim) and the post-agent window (store claim to artifact delivery).
//! Samples and counter snapshots are buffered and POSTed as JSON to the
//! sink named by the tracker's connection string. Metrics are never on the
//! task-correctness path: submission failures are logged and swallowed.

use std::collections::HashMap;
use std::sync::Mutex;

use serde::Serialize;

use gridagent_core::clock::now_ms;
use gridagent_core::models::StageStamp;
use gridagent_core::{EventsCounter, MetricValue};

#[derive(Debug, Clone, Serialize)]
struct MeasurementSample {
    from_event: String,
    to_event: String,
    latency_ms: i64,
    recorded_at_ms: i64,
    counters: HashMap<String, serde_json::Value>,
}

pub struct PerformanceTracker {
    enabled: bool,
    endpoint: String,
    /// Sink host tag carried on every submission body.
    sink_host: String,
    client: reqwest::Client,
    samples: Mutex<Vec<MeasurementSample>>,
}

/// Build a tracker from the raw config strings ("1" enables).
pub fn performance_tracker_initializer(
    metrics_are_enabled: &str,
    connection_string: &str,
    sink_host: &str,
) -> PerformanceTracker {
    let enabled = metrics_are_enabled == "1" && !connection_string.is_empty();
    PerformanceTracker {
        enabled,
        endpoint: connection_string.to_string(),
        sink_host: sink_host.to_string(),
        client: reqwest::Client::new(),
        samples: Mutex::new(Vec::new()),
    }
}

impl PerformanceTracker {
    /// Record the latency between two stage stamps together with the current
    /// counter values. Missing stamps are skipped (the submitter may predate
    /// the stage schema).
    pub fn add_metric_sample(
        &self,
        stats: &HashMap<String, StageStamp>,
        counter: &EventsCounter,
        from_event: &str,
        to_event: &str,
    ) {
        if !self.enabled {
            return;
        }

        let (Some(from), Some(to)) = (stats.get(from_event), stats.get(to_event)) else {
            tracing::debug!(
                from_event = from_event,
                to_event = to_event,
                "skipping measurement, stage stamp missing"
            );
            return;
        };

        let counters = counter
            .snapshot()
            .into_iter()
            .map(|(name, value)| {
                let value = match value {
                    MetricValue::Count(c) => serde_json::Value::from(c),
                    MetricValue::Label(l) => serde_json::Value::from(l),
                };
                (name, value)
            })
            .collect();

        self.samples.lock().unwrap().push(MeasurementSample {
            from_event: from_event.to_string(),
            to_event: to_event.to_string(),
            latency_ms: to.tstmp - from.tstmp,
            recorded_at_ms: now_ms(),
            counters,
        });
    }

    /// Flush buffered samples to the sink.
    pub async fn submit_measurements(&self) {
        let samples: Vec<MeasurementSample> = std::mem::take(&mut *self.samples.lock().unwrap());
        if !self.enabled || samples.is_empty() {
            return;
        }

        let count = samples.len();
        let body = serde_json::json!({
            "sink_host": self.sink_host,
            "samples": samples,
        });

        match self.client.post(&self.endpoint).json(&body).send().await {
            Ok(response) if response.status().is_success() => {
                tracing::debug!(count = count, "measurements submitted");
            }
            Ok(response) => {
                tracing::warn!(
                    status = %response.status(),
                    endpoint = %self.endpoint,
                    "metrics sink rejected submission"
                );
            }
            Err(e) => {
                tracing::warn!(error = %e, endpoint = %self.endpoint, "metrics submission failed");
            }
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    #[cfg(test)]
    fn pending_samples(&self) -> usize {
        self.samples.lock().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats_with(pairs: &[(&str, i64)]) -> HashMap<String, StageStamp> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), StageStamp { tstmp: *v }))
            .collect()
    }

    #[test]
    fn test_disabled_tracker_records_nothing() {
        let tracker = performance_tracker_initializer("0", "http://sink", "10.0.0.1");
        let stats = stats_with(&[("a", 100), ("b", 250)]);
        tracker.add_metric_sample(&stats, &EventsCounter::new(&[]), "a", "b");
        assert!(!tracker.is_enabled());
        assert_eq!(tracker.pending_samples(), 0);
    }

    #[test]
    fn test_enabled_requires_connection_string() {
        let tracker = performance_tracker_initializer("1", "", "10.0.0.1");
        assert!(!tracker.is_enabled());
    }

    #[test]
    fn test_sample_latency_and_counters() {
        let tracker = performance_tracker_initializer("1", "http://sink", "10.0.0.1");
        let counter = EventsCounter::new(&["hits"]);
        counter.increment("hits");
        let stats = stats_with(&[("a", 100), ("b", 250)]);
        tracker.add_metric_sample(&stats, &counter, "a", "b");
        let samples = tracker.samples.lock().unwrap();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].latency_ms, 150);
        assert_eq!(samples[0].counters["hits"], serde_json::Value::from(1));
    }

    #[test]
    fn test_missing_stamp_is_skipped() {
        let tracker = performance_tracker_initializer("1", "http://sink", "10.0.0.1");
        let stats = stats_with(&[("a", 100)]);
        tracker.add_metric_sample(&stats, &EventsCounter::new(&[]), "a", "b");
        assert_eq!(tracker.pending_samples(), 0);
    }

    #[tokio::test]
    async fn test_submit_with_unreachable_sink_is_swallowed() {
        let tracker = performance_tracker_initializer("1", "http://127.0.0.1:1/metrics", "h");
        let stats = stats_with(&[("a", 1), ("b", 2)]);
        tracker.add_metric_sample(&stats, &EventsCounter::new(&[]), "a", "b");
        tracker.submit_measurements().await;
        assert_eq!(tracker.pending_samples(), 0);
    }
}
