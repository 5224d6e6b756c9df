// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Agent reply protocol
//!
//! Agents backed by a model or a remote runtime answer with a JSON object:
//!
//! ```json
//! {
//!   "output": { "api_design": "..." },
//!   "routes": [ { "target": "codegen", "description": "...", "input": {}, "priority": 0 } ],
//!   "explanation": "why",
//!   "complete": false,
//!   "success": true
//! }
//! ```
//!
//! Every field is optional. Only an explicit `"complete": true` ends the
//! branch; otherwise the executor follows `routes`, or the node's declared
//! edges when there are none. Replies that are not JSON are treated as plain
//! text, stored under `<role>_output`, and also follow edges.

use crate::domain::agent::{AgentOutput, AgentResult, AgentRole, RoutingRequest, Task};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::HashMap;

#[derive(Debug, Deserialize)]
struct ReplyEnvelope {
    #[serde(default)]
    output: Option<Map<String, Value>>,
    #[serde(default)]
    routes: Vec<RouteReply>,
    #[serde(default)]
    explanation: Option<String>,
    #[serde(default)]
    complete: Option<bool>,
    #[serde(default)]
    success: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct RouteReply {
    target: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    input: HashMap<String, Value>,
    #[serde(default)]
    priority: i32,
}

/// Parse a textual reply.
///
/// `description` is the current task's description, inherited by routes that
/// do not carry their own.
pub fn parse_reply(text: &str, role: &AgentRole, description: &str) -> AgentOutput {
    match extract_json(text).and_then(|json| serde_json::from_str::<ReplyEnvelope>(json).ok()) {
        Some(envelope) => from_envelope(envelope, description),
        None => plain_text(text, role),
    }
}

/// Interpret an already-structured reply (e.g. from the language bridge)
pub fn parse_value(value: Value, role: &AgentRole, description: &str) -> AgentOutput {
    match serde_json::from_value::<ReplyEnvelope>(value.clone()) {
        Ok(envelope) => from_envelope(envelope, description),
        Err(_) => plain_text(&value.to_string(), role),
    }
}

fn from_envelope(envelope: ReplyEnvelope, description: &str) -> AgentOutput {
    let routes: Vec<RoutingRequest> = envelope
        .routes
        .into_iter()
        .map(|route| {
            let mut task = Task::new(route.description.unwrap_or_else(|| description.to_string()));
            task.input_data = route.input;
            RoutingRequest::new(route.target, task).with_priority(route.priority)
        })
        .collect();

    let complete = envelope.complete.unwrap_or(false);
    let result = AgentResult {
        success: envelope.success.unwrap_or(true),
        output: envelope.output.map(|o| o.into_iter().collect()).unwrap_or_default(),
        explanation: envelope.explanation,
        complete,
    };

    AgentOutput { result, routes }
}

fn plain_text(text: &str, role: &AgentRole) -> AgentOutput {
    AgentOutput::new(
        AgentResult::success()
            .with_output(format!("{}_output", role.as_str()), Value::String(text.trim().to_string())),
    )
}

/// Slice from the first `{` to the last `}` (tolerates ```json fences)
fn extract_json(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}
