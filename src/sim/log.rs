//! Bounded operational log
//!
//! Human-readable lines for operators, separate from `tracing` telemetry.
//! Append-only until the high-water mark, then silently truncated to the
//! most recent entries.

use serde::{Deserialize, Serialize};

use crate::events::EventType;

/// What kind of occurrence a log line records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LogCategory {
    PackageDrop,
    Spill,
    HumanEntry,
    Congestion,
    BatteryLow,
    TaskAssigned,
    TaskCompleted,
    AssistDecision,
    SafetyAlert,
    Workflow,
}

impl From<EventType> for LogCategory {
    fn from(event_type: EventType) -> Self {
        match event_type {
            EventType::PackageDrop => LogCategory::PackageDrop,
            EventType::Spill => LogCategory::Spill,
            EventType::HumanEntry => LogCategory::HumanEntry,
            EventType::Congestion => LogCategory::Congestion,
            EventType::BatteryLow => LogCategory::BatteryLow,
        }
    }
}

impl LogCategory {
    /// Display color carried for dashboard collaborators
    pub fn color(&self) -> &'static str {
        match self {
            LogCategory::PackageDrop | LogCategory::TaskAssigned => "#00d4ff",
            LogCategory::Spill | LogCategory::SafetyAlert => "#ff6b35",
            LogCategory::HumanEntry | LogCategory::BatteryLow => "#ffcc00",
            LogCategory::Congestion | LogCategory::AssistDecision => "#a855f7",
            LogCategory::TaskCompleted | LogCategory::Workflow => "#00ff88",
        }
    }
}

/// One operational log line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: String,
    pub category: LogCategory,
    pub message: String,
    pub timestamp_ms: u64,
    pub color: String,
}

/// Most-recent-N ring of log lines
#[derive(Debug)]
pub struct EventLog {
    entries: Vec<LogEntry>,
    capacity: usize,
    retain: usize,
    counter: u64,
}

impl EventLog {
    pub fn new(capacity: usize, retain: usize) -> Self {
        Self {
            entries: Vec::new(),
            capacity,
            retain,
            counter: 0,
        }
    }

    pub fn push(&mut self, category: LogCategory, message: impl Into<String>, now_ms: u64) {
        self.counter += 1;
        self.entries.push(LogEntry {
            id: format!("log-{}-{}", now_ms, self.counter),
            category,
            message: message.into(),
            timestamp_ms: now_ms,
            color: category.color().to_string(),
        });
        if self.entries.len() > self.capacity {
            let cut = self.entries.len() - self.retain;
            self.entries.drain(..cut);
        }
    }

    /// The most recent `limit` entries, oldest first
    pub fn recent(&self, limit: usize) -> &[LogEntry] {
        let start = self.entries.len().saturating_sub(limit);
        &self.entries[start..]
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overflow_truncates_to_retain() {
        let mut log = EventLog::new(200, 100);
        for i in 0..201 {
            log.push(LogCategory::TaskCompleted, format!("line {i}"), i);
        }
        assert_eq!(log.len(), 100);
        // The oldest surviving line is the 101st pushed
        assert_eq!(log.recent(100)[0].message, "line 101");
    }

    #[test]
    fn test_recent_returns_newest_entries() {
        let mut log = EventLog::new(200, 100);
        for i in 0..10 {
            log.push(LogCategory::Workflow, format!("line {i}"), i);
        }
        let tail = log.recent(3);
        assert_eq!(tail.len(), 3);
        assert_eq!(tail[2].message, "line 9");
    }

    #[test]
    fn test_entry_ids_are_unique() {
        let mut log = EventLog::new(200, 100);
        log.push(LogCategory::Spill, "a", 42);
        log.push(LogCategory::Spill, "b", 42);
        let ids: Vec<&String> = log.recent(10).iter().map(|e| &e.id).collect();
        assert_ne!(ids[0], ids[1]);
    }
}
