use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::message::MessageDescriptor;

/// Where a session sits in the collection cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleState {
    /// Nothing asked yet this turn.
    AwaitingPrompt,
    /// A prompt went out; the next input belongs to the head parameter.
    AwaitingInput,
    Reacting,
    Finishing,
    /// Finish completed.
    Idle,
}

impl ScheduleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AwaitingPrompt => "awaiting_prompt",
            Self::AwaitingInput => "awaiting_input",
            Self::Reacting => "reacting",
            Self::Finishing => "finishing",
            Self::Idle => "idle",
        }
    }
}

impl std::fmt::Display for ScheduleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Confirmed parameter values in resolution order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Confirmed {
    entries: Vec<(String, Value)>,
}

impl Confirmed {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// String view of a confirmed value; empty when absent or not a string.
    pub fn str(&self, name: &str) -> &str {
        self.get(name).and_then(|v| v.as_str()).unwrap_or_default()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Record a value. Re-resolving a name replaces its value and moves it
    /// to the end, keeping resolution order.
    pub fn insert(&mut self, name: &str, value: Value) {
        self.entries.retain(|(n, _)| n != name);
        self.entries.push((name.to_string(), value));
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|(n, _)| n.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A one-shot replacement for the next prompt of `parameter`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PromptOverride {
    pub parameter: String,
    pub message: MessageDescriptor,
}

/// Per-session collection state.
#[derive(Debug, Clone, Serialize)]
pub struct ConversationContext {
    pub skill_id: Option<String>,
    pub confirmed: Confirmed,
    pub pending: VecDeque<String>,
    pub prompt_override: Option<PromptOverride>,
    pub state: ScheduleState,
    /// True once a finish has reset the context.
    pub cleared: bool,
    pub turns: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ConversationContext {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            skill_id: None,
            confirmed: Confirmed::default(),
            pending: VecDeque::new(),
            prompt_override: None,
            state: ScheduleState::AwaitingPrompt,
            cleared: false,
            turns: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Parameter currently being collected.
    pub fn head(&self) -> Option<&str> {
        self.pending.front().map(|s| s.as_str())
    }

    pub fn is_pending(&self, name: &str) -> bool {
        self.pending.iter().any(|n| n == name)
    }

    /// Move `name` to the front of the queue, dropping any existing entry.
    pub fn enqueue_front(&mut self, name: &str) {
        self.pending.retain(|n| n != name);
        self.pending.push_front(name.to_string());
    }

    /// Append `name` unless it is already queued.
    pub fn enqueue_back(&mut self, name: &str) {
        if !self.is_pending(name) {
            self.pending.push_back(name.to_string());
        }
    }

    pub fn dequeue(&mut self, name: &str) {
        self.pending.retain(|n| n != name);
    }

    /// Whether the next event should open a new collection cycle.
    pub fn needs_start(&self) -> bool {
        self.skill_id.is_none() || self.state == ScheduleState::Idle
    }

    /// Drop everything collected. The session keeps existing but the next
    /// event starts from scratch.
    pub fn clear(&mut self) {
        let created_at = self.created_at;
        let turns = self.turns;
        *self = Self::new();
        self.created_at = created_at;
        self.turns = turns;
        self.state = ScheduleState::Idle;
        self.cleared = true;
    }

    pub fn touch(&mut self) {
        self.turns += 1;
        self.updated_at = Utc::now();
    }
}

impl Default for ConversationContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn fresh_context() {
        let ctx = ConversationContext::new();
        assert!(ctx.head().is_none());
        assert!(ctx.confirmed.is_empty());
        assert_eq!(ctx.state, ScheduleState::AwaitingPrompt);
        assert!(ctx.needs_start());
        assert!(!ctx.cleared);
    }

    #[test]
    fn enqueue_front_deduplicates() {
        let mut ctx = ConversationContext::new();
        ctx.enqueue_back("a");
        ctx.enqueue_back("b");
        ctx.enqueue_back("a");
        assert_eq!(ctx.pending, ["a", "b"]);

        ctx.enqueue_front("b");
        assert_eq!(ctx.pending, ["b", "a"]);
        ctx.enqueue_front("b");
        assert_eq!(ctx.pending, ["b", "a"]);
        ctx.enqueue_front("c");
        assert_eq!(ctx.head(), Some("c"));
        assert_eq!(ctx.pending.len(), 3);
    }

    #[test]
    fn confirmed_keeps_resolution_order() {
        let mut c = Confirmed::default();
        c.insert("size", json!("M"));
        c.insert("pizza", json!("マリナーラ"));
        assert_eq!(c.names(), vec!["size", "pizza"]);
        c.insert("size", json!("L"));
        assert_eq!(c.names(), vec!["pizza", "size"]);
        assert_eq!(c.str("size"), "L");
        assert_eq!(c.len(), 2);
        assert_eq!(c.str("missing"), "");
    }

    #[test]
    fn clear_resets_but_marks_cleared() {
        let mut ctx = ConversationContext::new();
        ctx.skill_id = Some("s".into());
        ctx.confirmed.insert("a", json!(1));
        ctx.enqueue_back("b");
        ctx.touch();
        ctx.clear();
        assert!(ctx.cleared);
        assert!(ctx.confirmed.is_empty());
        assert!(ctx.pending.is_empty());
        assert!(ctx.skill_id.is_none());
        assert_eq!(ctx.state, ScheduleState::Idle);
        assert_eq!(ctx.turns, 1);
        assert!(ctx.needs_start());
    }

    #[test]
    fn state_names() {
        assert_eq!(ScheduleState::AwaitingInput.to_string(), "awaiting_input");
        assert_eq!(
            serde_json::to_value(ScheduleState::Idle).unwrap(),
            json!("idle")
        );
    }
}
