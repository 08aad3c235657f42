//! Confirmation gate: one pending action per chat session.

use super::execute::Step;
use super::Resolver;
use std::collections::HashMap;
use std::time::{Duration, Instant};

pub const DEFAULT_SESSION: &str = "default";
pub const PENDING_TTL: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    Affirm,
    Deny,
    Other,
}

/// Classify a reply to a confirmation question. Trimmed, lower-cased,
/// trailing punctuation ignored.
pub fn classify_reply(message: &str) -> Reply {
    let normalized = message
        .trim()
        .trim_end_matches(|c: char| c.is_ascii_punctuation())
        .trim()
        .to_lowercase();
    match normalized.as_str() {
        "yes" | "y" | "confirm" | "do it" | "proceed" | "go ahead" => Reply::Affirm,
        "no" | "n" | "cancel" | "stop" | "abort" => Reply::Deny,
        _ => Reply::Other,
    }
}

/// A gated plan, already resolved to concrete commands. Target ids were
/// frozen when it was proposed.
#[derive(Debug, Clone)]
pub struct PendingAgentAction {
    pub action: &'static str,
    pub resolver: Resolver,
    pub summary: String,
    pub steps: Vec<Step>,
    pub created_at: Instant,
}

impl PendingAgentAction {
    pub fn new(action: &'static str, resolver: Resolver, summary: String, steps: Vec<Step>) -> Self {
        PendingAgentAction { action, resolver, summary, steps, created_at: Instant::now() }
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        now.duration_since(self.created_at) >= PENDING_TTL
    }
}

#[derive(Debug, Default)]
pub struct ConversationStore {
    pending: HashMap<String, PendingAgentAction>,
}

impl ConversationStore {
    pub fn insert(&mut self, session: &str, action: PendingAgentAction) {
        self.prune(Instant::now());
        self.pending.insert(session.to_string(), action);
    }

    /// Remove and return the session's pending action, unless it expired.
    pub fn take(&mut self, session: &str) -> Option<PendingAgentAction> {
        self.take_at(session, Instant::now())
    }

    fn take_at(&mut self, session: &str, now: Instant) -> Option<PendingAgentAction> {
        self.pending.remove(session).filter(|p| !p.is_expired(now))
    }

    fn prune(&mut self, now: Instant) {
        self.pending.retain(|_, p| !p.is_expired(now));
    }
}
