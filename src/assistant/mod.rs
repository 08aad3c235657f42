//! Server-side task assistant.
//!
//! A chat message is resolved into an `AgentPlan` (LLM first, rule parser
//! as fallback), prepared into concrete steps against the current store,
//! and then either run or parked behind a confirmation question.

pub mod confirm;
pub mod course;
pub mod execute;
pub mod llm;
pub mod plan;
pub mod prompt;
pub mod rules;
#[cfg(test)]
mod test_server;

use crate::errors::ApiError;
use crate::filter::local_today;
use crate::state::AppState;
use crate::world::Task;
use chrono::NaiveDate;
use confirm::{classify_reply, PendingAgentAction, Reply, DEFAULT_SESSION};
use execute::Outcome;
use plan::{parse_plan, AgentPlan};
use serde::{Deserialize, Serialize};

/// Which resolver produced the plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resolver {
    Llm,
    Rules,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub session_id: Option<String>,
}

impl ChatRequest {
    pub fn session(&self) -> &str {
        self.session_id.as_deref().map(str::trim).filter(|s| !s.is_empty()).unwrap_or(DEFAULT_SESSION)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatReply {
    pub reply: String,
    pub action: String,
    pub resolver: Resolver,
    pub tasks: Vec<Task>,
    pub awaiting_confirmation: bool,
    pub affected: usize,
}

impl ChatReply {
    fn text(action: &str, resolver: Resolver, reply: impl Into<String>) -> Self {
        ChatReply {
            reply: reply.into(),
            action: action.to_string(),
            resolver,
            tasks: Vec::new(),
            awaiting_confirmation: false,
            affected: 0,
        }
    }

    fn from_outcome(action: &str, resolver: Resolver, message: Option<&str>, outcome: Outcome) -> Self {
        let reply = match message.map(str::trim).filter(|m| !m.is_empty()) {
            Some(m) if !outcome.failed => m.to_string(),
            _ => outcome.lines.join("\n"),
        };
        ChatReply {
            reply,
            action: action.to_string(),
            resolver,
            tasks: outcome.tasks,
            awaiting_confirmation: false,
            affected: outcome.affected,
        }
    }
}

pub async fn handle_message(state: &AppState, session: &str, message: &str) -> Result<ChatReply, ApiError> {
    handle_message_on(state, session, message, local_today()).await
}

#[tracing::instrument(skip(state, message))]
pub async fn handle_message_on(
    state: &AppState,
    session: &str,
    message: &str,
    today: NaiveDate,
) -> Result<ChatReply, ApiError> {
    let pending = state
        .conversations
        .lock()
        .map_err(ApiError::poisoned("conversations"))?
        .take(session);

    if let Some(pending) = pending {
        match classify_reply(message) {
            Reply::Affirm => {
                tracing::info!(action = pending.action, "pending action confirmed");
                let outcome = execute::run(&pending.steps, state)?;
                return Ok(ChatReply::from_outcome(pending.action, pending.resolver, None, outcome));
            }
            Reply::Deny => {
                tracing::info!(action = pending.action, "pending action cancelled");
                let reply = format!("Cancelled, I won't {}. Nothing was changed.", pending.summary);
                return Ok(ChatReply::text(pending.action, pending.resolver, reply));
            }
            Reply::Other => tracing::debug!(action = pending.action, "pending action discarded"),
        }
    }

    let (plan, resolver) = resolve_plan(state, message, today).await?;
    let action = plan.action.name();
    tracing::info!(action, ?resolver, "plan resolved");

    let prepared = {
        let world = state.read_world()?;
        execute::prepare(&plan, &world, today, &state.settings.courses)
    };

    if prepared.needs_confirmation {
        let summary = prepared.preview();
        let mut reply = ChatReply::text(
            action,
            resolver,
            format!("This will {summary}. Reply \"yes\" to confirm or \"no\" to cancel."),
        );
        reply.awaiting_confirmation = true;
        state
            .conversations
            .lock()
            .map_err(ApiError::poisoned("conversations"))?
            .insert(session, PendingAgentAction::new(action, resolver, summary, prepared.steps));
        return Ok(reply);
    }

    let outcome = execute::run(&prepared.steps, state)?;
    Ok(ChatReply::from_outcome(action, resolver, plan.message.as_deref(), outcome))
}

/// LLM when configured and its reply satisfies the contract, rules otherwise.
async fn resolve_plan(state: &AppState, message: &str, today: NaiveDate) -> Result<(AgentPlan, Resolver), ApiError> {
    if let Some(client) = state.llm_client()? {
        let prompt = {
            let world = state.read_world()?;
            prompt::build_prompt(message, &world.tasks, &state.settings.courses, today)
        };
        match client.complete(prompt::SYSTEM_PROMPT, &prompt).await {
            Ok(reply) => match parse_plan(&reply, today) {
                Ok(plan) => return Ok((plan, Resolver::Llm)),
                Err(e) => tracing::warn!(error = %e, "llm reply rejected, falling back to rules"),
            },
            Err(e) => tracing::warn!(error = %e, "llm request failed, falling back to rules"),
        }
    }
    Ok((rules::parse_simple_intent(message, today, &state.settings.courses), Resolver::Rules))
}
