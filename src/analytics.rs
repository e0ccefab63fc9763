//! Fire-and-forget usage events.
//!
//! The engine reports every filter and search action as an
//! [`AnalyticsEvent`]. Where the event goes is decided by the injected
//! [`AnalyticsSink`]; a failing sink never changes what the user sees.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

pub const FILTER_EVENT: &str = "filter_tutorials";
pub const SEARCH_EVENT: &str = "search_tutorials";

/// A named event with free-form properties.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalyticsEvent {
    pub name: String,
    pub properties: Map<String, Value>,
}

impl AnalyticsEvent {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            properties: Map::new(),
        }
    }

    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.properties.insert(key.to_owned(), value.into());
        self
    }

    /// `filter_tutorials {filter}`.
    pub fn filter(category: &str) -> Self {
        Self::new(FILTER_EVENT).with("filter", category)
    }

    /// `search_tutorials {query, results}`.
    pub fn search(folded_query: &str, results: usize) -> Self {
        Self::new(SEARCH_EVENT)
            .with("query", folded_query)
            .with("results", results)
    }
}

#[derive(Debug, Error)]
pub enum AnalyticsError {
    #[error("failed to write analytics event to {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to encode analytics event: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("analytics sink is unavailable")]
    Unavailable,
}

/// Destination for analytics events.
pub trait AnalyticsSink: Send + Sync {
    fn record(&self, event: &AnalyticsEvent) -> Result<(), AnalyticsError>;
}

/// Deliver `event` to `sink`, logging instead of propagating failures.
pub fn report(sink: &dyn AnalyticsSink, event: &AnalyticsEvent) {
    if let Err(e) = sink.record(event) {
        tracing::warn!(event = %event.name, error = %e, "analytics event dropped");
    }
}

/// Emits each event as a `tracing` record under the `analytics` target.
pub struct TracingSink;

impl AnalyticsSink for TracingSink {
    fn record(&self, event: &AnalyticsEvent) -> Result<(), AnalyticsError> {
        let properties = serde_json::to_string(&event.properties)?;
        tracing::info!(target: "analytics", event = %event.name, %properties, "track");
        Ok(())
    }
}

#[derive(Serialize)]
struct JsonLine<'a> {
    ts: u64,
    #[serde(flatten)]
    event: &'a AnalyticsEvent,
}

/// Appends one JSON object per event to a file.
pub struct JsonLinesSink {
    path: PathBuf,
    file: Mutex<File>,
}

impl JsonLinesSink {
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }
}

impl AnalyticsSink for JsonLinesSink {
    fn record(&self, event: &AnalyticsEvent) -> Result<(), AnalyticsError> {
        let ts = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        let mut line = serde_json::to_string(&JsonLine { ts, event })?;
        line.push('\n');
        let mut file = self.file.lock().map_err(|_| AnalyticsError::Unavailable)?;
        file.write_all(line.as_bytes())
            .map_err(|source| AnalyticsError::Write {
                path: self.path.clone(),
                source,
            })
    }
}

/// Discards every event.
#[cfg(test)]
pub struct NullSink;

#[cfg(test)]
impl AnalyticsSink for NullSink {
    fn record(&self, _event: &AnalyticsEvent) -> Result<(), AnalyticsError> {
        Ok(())
    }
}

/// Keeps events in memory; used by tests to observe what was reported.
#[cfg(test)]
#[derive(Default)]
pub struct RecordingSink {
    pub events: Mutex<Vec<AnalyticsEvent>>,
}

#[cfg(test)]
impl RecordingSink {
    pub fn names(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|e| e.name.clone())
            .collect()
    }
}

#[cfg(test)]
impl AnalyticsSink for RecordingSink {
    fn record(&self, event: &AnalyticsEvent) -> Result<(), AnalyticsError> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

/// Always fails; used by tests to check that failures stay contained.
#[cfg(test)]
pub struct FailingSink;

#[cfg(test)]
impl AnalyticsSink for FailingSink {
    fn record(&self, _event: &AnalyticsEvent) -> Result<(), AnalyticsError> {
        Err(AnalyticsError::Unavailable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn search_event_carries_query_and_results() {
        let e = AnalyticsEvent::search("join", 2);
        assert_eq!(e.name, SEARCH_EVENT);
        assert_eq!(e.properties["query"], json!("join"));
        assert_eq!(e.properties["results"], json!(2));
    }

    #[test]
    fn filter_event_carries_filter() {
        let e = AnalyticsEvent::filter("nosql");
        assert_eq!(e.name, FILTER_EVENT);
        assert_eq!(e.properties["filter"], json!("nosql"));
    }

    #[test]
    fn json_lines_sink_appends_one_object_per_line() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("events.jsonl");
        let sink = JsonLinesSink::open(&path).unwrap();
        report(&sink, &AnalyticsEvent::filter("sql"));
        report(&sink, &AnalyticsEvent::search("index", 0));

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<Value> = contents
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["name"], json!("filter_tutorials"));
        assert_eq!(lines[0]["properties"]["filter"], json!("sql"));
        assert_eq!(lines[1]["properties"]["results"], json!(0));
        assert!(lines[1]["ts"].as_u64().is_some());
    }

    #[test]
    fn report_swallows_sink_failures() {
        // Must not panic.
        report(&FailingSink, &AnalyticsEvent::filter("all"));
    }

    #[test]
    fn recording_sink_collects_names() {
        let sink = RecordingSink::default();
        report(&sink, &AnalyticsEvent::filter("all"));
        report(&sink, &AnalyticsEvent::search("", 5));
        assert_eq!(sink.names(), vec![FILTER_EVENT, SEARCH_EVENT]);
    }
}
