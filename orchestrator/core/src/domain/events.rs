// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain Events
//!
//! Payload carried by the event stream. Events are immutable once published:
//! the stream wraps each one in an `Arc` and every subscriber receives a
//! shared reference.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Terminal event published once per execution that finished normally
pub const EXECUTION_COMPLETED: &str = "execution.completed";
/// Terminal event published once per execution that failed
pub const EXECUTION_FAILED: &str = "execution.failed";
/// Terminal event published once per cancelled execution
pub const EXECUTION_CANCELLED: &str = "execution.cancelled";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    AgentAction,
    ToolUsage,
    ComponentGenerated,
    ComponentUpdated,
    Custom(String),
}

impl EventType {
    pub fn custom(name: impl Into<String>) -> Self {
        EventType::Custom(name.into())
    }

    /// Whether this is one of the execution terminal events
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            EventType::Custom(name)
                if name == EXECUTION_COMPLETED
                    || name == EXECUTION_FAILED
                    || name == EXECUTION_CANCELLED
        )
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventType::AgentAction => f.write_str("agent_action"),
            EventType::ToolUsage => f.write_str("tool_usage"),
            EventType::ComponentGenerated => f.write_str("component_generated"),
            EventType::ComponentUpdated => f.write_str("component_updated"),
            EventType::Custom(name) => f.write_str(name),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub event_type: EventType,
    pub source: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub data: HashMap<String, Value>,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

impl Event {
    pub fn new(event_type: EventType, source: impl Into<String>) -> Self {
        Self {
            event_type,
            source: source.into(),
            timestamp: Utc::now(),
            data: HashMap::new(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_data(mut self, key: impl Into<String>, value: Value) -> Self {
        self.data.insert(key.into(), value);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

// ============================================================================
// Subscriptions
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubscriptionId(pub u64);

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Which events a subscriber receives
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum EventFilter {
    #[default]
    All,
    Type(EventType),
    Source(String),
}

impl EventFilter {
    pub fn matches(&self, event: &Event) -> bool {
        match self {
            EventFilter::All => true,
            EventFilter::Type(event_type) => &event.event_type == event_type,
            EventFilter::Source(source) => &event.source == source,
        }
    }
}

impl From<EventType> for EventFilter {
    fn from(event_type: EventType) -> Self {
        EventFilter::Type(event_type)
    }
}

impl From<Option<EventType>> for EventFilter {
    fn from(event_type: Option<EventType>) -> Self {
        event_type.map(EventFilter::Type).unwrap_or_default()
    }
}

/// Push-style subscriber callback. Errors are logged by the stream and
/// never reach the publisher.
pub type EventHandler = Arc<dyn Fn(&Event) -> anyhow::Result<()> + Send + Sync>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_terminal_event_types() {
        assert!(EventType::custom(EXECUTION_COMPLETED).is_terminal());
        assert!(EventType::custom(EXECUTION_CANCELLED).is_terminal());
        assert!(!EventType::custom("execution.started").is_terminal());
        assert!(!EventType::AgentAction.is_terminal());
    }

    #[test]
    fn test_event_serialization() {
        let event = Event::new(EventType::ComponentGenerated, "codegen")
            .with_data("component", json!("ProfilePage"))
            .with_metadata("execution_id", json!("abc"));

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event_type"], json!("component_generated"));
        assert_eq!(value["data"]["component"], json!("ProfilePage"));

        let custom = serde_json::to_value(EventType::custom("deploy")).unwrap();
        assert_eq!(custom, json!({"custom": "deploy"}));
    }

    #[test]
    fn test_event_filter() {
        let event = Event::new(EventType::ToolUsage, "engineering");
        assert!(EventFilter::All.matches(&event));
        assert!(EventFilter::from(EventType::ToolUsage).matches(&event));
        assert!(!EventFilter::from(EventType::AgentAction).matches(&event));
        assert!(EventFilter::Source("engineering".into()).matches(&event));
        assert_eq!(EventFilter::from(None), EventFilter::All);
    }
}
