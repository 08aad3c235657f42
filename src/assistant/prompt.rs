//! System contract and per-request prompt for the LLM resolver.

use super::course::Course;
use crate::world::Task;
use chrono::NaiveDate;
use std::fmt::Write;

/// Tasks listed in the prompt, most urgent first.
pub const PROMPT_TASK_LIMIT: usize = 50;

pub const SYSTEM_PROMPT: &str = r#"You are the task assistant of a student planner.
Turn the user's request into exactly ONE JSON object and nothing else: no prose, no code fences.

Shape: {"action": ACTION, ...parameters, "message": optional short reply, "confirmationRequired": bool}

Actions and parameters:
- CREATE_TASK {"task": {"title", "description"?, "dueDate"? (YYYY-MM-DD), "dueTime"?, "priority"? (low|medium|high), "course"?, "tags"?}}
- UPDATE_TASK {"target": {"id"? , "title"?}, "updates": {same fields as task, plus "status"? (completed|in-progress|pending|overdue), "completed"?, "starred"?}}
- DELETE_TASK | COMPLETE_TASK | UNCOMPLETE_TASK | STAR_TASK | UNSTAR_TASK {"target": {"id"?, "title"?}}
- SHOW_TASKS {"criteria": FILTER}
- SEARCH_TASKS {"query": string}
- DELETE_MULTIPLE | COMPLETE_MULTIPLE | STAR_MULTIPLE {"criteria": FILTER}
- UPDATE_MULTIPLE {"criteria": FILTER, "updates": {...}}
- CLEAR_COMPLETED | CLEAR_OVERDUE | CLEAR_PENDING (no parameters)
- SHOW_ANALYTICS (no parameters)
- MULTI_ACTION {"actions": [up to 10 of the above, not nested]}
- CLARIFY {"question": string}
- GENERAL_RESPONSE (the answer goes in "message"; not allowed inside MULTI_ACTION)

FILTER fields (all optional, combined with AND): "course", "priority", "status", "completed", "starred",
"overdue", "today", "thisWeek", "dueBefore", "dueAfter" (YYYY-MM-DD), "search", "tags", "ids".
Bulk actions need at least one filter field.

Rules:
- Resolve relative dates ("tomorrow", "next Friday") against TODAY and write them as YYYY-MM-DD.
- Prefer the task id from the task list when the user names an existing task.
- Set "confirmationRequired": true for anything that deletes more than one task.
- If the request is ambiguous, answer with CLARIFY."#;

/// The user turn: today's date, the course catalog, the current tasks and
/// the request itself.
pub fn build_prompt(utterance: &str, tasks: &[Task], courses: &[Course], today: NaiveDate) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "TODAY: {} ({})", today.format("%Y-%m-%d"), today.format("%A"));

    out.push_str("\nCOURSES:\n");
    for c in courses {
        let _ = writeln!(out, "- {} ({})", c.name, c.code);
    }

    let mut listed: Vec<&Task> = tasks.iter().collect();
    listed.sort_by_key(|t| (t.completed, t.due_date));
    let _ = writeln!(out, "\nTASKS ({} total):", tasks.len());
    if listed.is_empty() {
        out.push_str("(none)\n");
    }
    for t in listed.iter().take(PROMPT_TASK_LIMIT) {
        let _ = writeln!(
            out,
            "- id={} | {} | due {} | {} | {} | {}{}{}",
            t.id,
            t.title,
            t.due_date.format("%Y-%m-%d"),
            t.priority.as_str(),
            t.status.as_str(),
            t.course,
            if t.completed { " | completed" } else { "" },
            if t.starred { " | starred" } else { "" },
        );
    }
    if listed.len() > PROMPT_TASK_LIMIT {
        let _ = writeln!(out, "... {} more not shown", listed.len() - PROMPT_TASK_LIMIT);
    }

    let _ = write!(out, "\nREQUEST: {}", utterance.trim());
    out
}
