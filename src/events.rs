//! Security event log - bounded audit trail of security-relevant actions

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Default number of retained events
pub const DEFAULT_EVENT_CAPACITY: usize = 1000;

/// Severity of a security event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventLevel {
    Info,
    Warning,
    Critical,
}

impl EventLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Critical => "critical",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityEventType {
    KeyInitialized,
    KeyLocked,
    UnwrapFailed,
    DecryptFailed,
    StorageRejected,
    MigrationApplied,
    MigrationFailed,
    LegacyMigrated,
    BackupCreated,
    BackupRestored,
    Other(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityEvent {
    #[serde(rename = "type")]
    pub event_type: SecurityEventType,
    pub level: EventLevel,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl SecurityEvent {
    pub fn new(event_type: SecurityEventType, level: EventLevel, message: impl Into<String>) -> Self {
        Self {
            event_type,
            level,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Capped, ordered event history (most recent last)
pub struct SecurityEventLog {
    events: RwLock<VecDeque<SecurityEvent>>,
    max_events: usize,
}

impl SecurityEventLog {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_EVENT_CAPACITY)
    }

    pub fn with_capacity(max_events: usize) -> Self {
        let max_events = max_events.max(1);
        Self {
            events: RwLock::new(VecDeque::with_capacity(max_events)),
            max_events,
        }
    }

    /// Append an event, evicting the oldest once the cap is exceeded
    pub fn log(&self, event: SecurityEvent) {
        match event.level {
            EventLevel::Info => tracing::info!(event = ?event.event_type, "{}", event.message),
            EventLevel::Warning => tracing::warn!(event = ?event.event_type, "{}", event.message),
            EventLevel::Critical => tracing::error!(event = ?event.event_type, "{}", event.message),
        }

        let mut events = self.events.write();
        events.push_back(event);
        while events.len() > self.max_events {
            events.pop_front();
        }
    }

    pub fn record(&self, event_type: SecurityEventType, level: EventLevel, message: impl Into<String>) {
        self.log(SecurityEvent::new(event_type, level, message));
    }

    /// Snapshot of the current history
    pub fn list(&self) -> Vec<SecurityEvent> {
        self.events.read().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.max_events
    }

    pub fn count_of(&self, event_type: &SecurityEventType) -> usize {
        self.events
            .read()
            .iter()
            .filter(|e| &e.event_type == event_type)
            .count()
    }

    pub fn clear(&self) {
        self.events.write().clear();
    }
}

impl Default for SecurityEventLog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_event() {
        let log = SecurityEventLog::new();
        log.record(SecurityEventType::KeyInitialized, EventLevel::Info, "ready");

        let events = log.list();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].message, "ready");
        assert_eq!(events[0].level, EventLevel::Info);
    }

    #[test]
    fn test_cap_keeps_most_recent() {
        let log = SecurityEventLog::new();
        for i in 0..1100 {
            log.record(
                SecurityEventType::Other("tick".into()),
                EventLevel::Info,
                format!("event {}", i),
            );
        }

        let events = log.list();
        assert_eq!(events.len(), 1000);
        assert_eq!(events.first().unwrap().message, "event 100");
        assert_eq!(events.last().unwrap().message, "event 1099");
    }

    #[test]
    fn test_count_of() {
        let log = SecurityEventLog::with_capacity(10);
        log.record(SecurityEventType::UnwrapFailed, EventLevel::Warning, "a");
        log.record(SecurityEventType::KeyLocked, EventLevel::Info, "b");
        log.record(SecurityEventType::UnwrapFailed, EventLevel::Warning, "c");
        assert_eq!(log.count_of(&SecurityEventType::UnwrapFailed), 2);
    }

    #[test]
    fn test_event_json_shape() {
        let event = SecurityEvent::new(SecurityEventType::KeyLocked, EventLevel::Warning, "locked");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "key_locked");
        assert_eq!(json["level"], "warning");
    }
}
