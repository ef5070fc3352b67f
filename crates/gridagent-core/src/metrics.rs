//! Event counters.
//!
//! Each tracker window (pre-agent, post-agent) owns one `EventsCounter`
//! registered with its counter names up front, so the metrics sink always
//! receives the full schema even when a counter never fired.

use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq)]
pub enum MetricValue {
    Count(i64),
    Label(String),
}

#[derive(Debug, Default)]
pub struct EventsCounter {
    values: Mutex<HashMap<String, MetricValue>>,
}

impl EventsCounter {
    pub fn new(names: &[&str]) -> Self {
        let values = names
            .iter()
            .map(|n| (n.to_string(), MetricValue::Count(0)))
            .collect();
        Self {
            values: Mutex::new(values),
        }
    }

    pub fn increment(&self, name: &str) {
        self.increment_by(name, 1);
    }

    pub fn increment_by(&self, name: &str, amount: i64) {
        let mut values = self.values.lock().unwrap();
        let entry = values
            .entry(name.to_string())
            .or_insert(MetricValue::Count(0));
        match entry {
            MetricValue::Count(c) => *c += amount,
            // A label overwritten by a count increment starts from zero.
            MetricValue::Label(_) => *entry = MetricValue::Count(amount),
        }
    }

    pub fn set_label(&self, name: &str, value: impl Into<String>) {
        let mut values = self.values.lock().unwrap();
        values.insert(name.to_string(), MetricValue::Label(value.into()));
    }

    pub fn count(&self, name: &str) -> i64 {
        match self.values.lock().unwrap().get(name) {
            Some(MetricValue::Count(c)) => *c,
            _ => 0,
        }
    }

    pub fn snapshot(&self) -> HashMap<String, MetricValue> {
        self.values.lock().unwrap().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registered_counters_start_at_zero() {
        let counter = EventsCounter::new(&["a", "b"]);
        assert_eq!(counter.count("a"), 0);
        assert_eq!(counter.count("b"), 0);
        assert!(counter.snapshot().contains_key("a"));
    }

    #[test]
    fn test_increment_and_increment_by() {
        let counter = EventsCounter::new(&["a"]);
        counter.increment("a");
        counter.increment_by("a", 41);
        assert_eq!(counter.count("a"), 42);
    }

    #[test]
    fn test_increment_unregistered_counter() {
        let counter = EventsCounter::new(&[]);
        counter.increment("late");
        assert_eq!(counter.count("late"), 1);
    }

    #[test]
    fn test_set_label() {
        let counter = EventsCounter::new(&["pod"]);
        counter.set_label("pod", "agent-7");
        assert_eq!(
            counter.snapshot().get("pod"),
            Some(&MetricValue::Label("agent-7".to_string()))
        );
        // Labels read as zero through the count accessor.
        assert_eq!(counter.count("pod"), 0);
    }
}
