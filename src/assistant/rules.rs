//! Rule-based intent parser. Used whenever the LLM is unavailable or its
//! reply does not satisfy the plan contract.

use super::course::{find_course, Course};
use super::plan::{AgentAction, AgentPlan, TaskRef};
use crate::filter::TaskFilter;
use crate::models::{CreateTaskRequest, UpdateTaskRequest};
use crate::world::{Priority, TaskStatus};
use chrono::{Datelike, Duration, NaiveDate, Weekday};
use regex::{Captures, Regex};
use std::sync::OnceLock;

const MAX_RELATIVE_DAYS: i64 = 3650;
const CONNECTORS: &[&str] = &["due", "by", "on", "for", "at", "with", "and", "to", "-", ":"];

const HELP: &str = "I can add, update, complete, star, delete and search tasks, \
    show what's due, clear completed or overdue tasks, and show your stats. \
    Try \"add lab report due Friday high priority\".";

// ── Patterns ──────────────────────────────────────────────────

static GREETING_REGEX: OnceLock<Regex> = OnceLock::new();
static HELP_REGEX: OnceLock<Regex> = OnceLock::new();
static CLEAR_REGEX: OnceLock<Regex> = OnceLock::new();
static BULK_REGEX: OnceLock<Regex> = OnceLock::new();
static MARK_ALL_REGEX: OnceLock<Regex> = OnceLock::new();
static CREATE_REGEX: OnceLock<Regex> = OnceLock::new();
static SEARCH_REGEX: OnceLock<Regex> = OnceLock::new();
static MARK_UNDONE_REGEX: OnceLock<Regex> = OnceLock::new();
static UNCOMPLETE_REGEX: OnceLock<Regex> = OnceLock::new();
static MARK_DONE_REGEX: OnceLock<Regex> = OnceLock::new();
static COMPLETE_REGEX: OnceLock<Regex> = OnceLock::new();
static UNSTAR_REGEX: OnceLock<Regex> = OnceLock::new();
static STAR_REGEX: OnceLock<Regex> = OnceLock::new();
static DELETE_REGEX: OnceLock<Regex> = OnceLock::new();
static UPDATE_REGEX: OnceLock<Regex> = OnceLock::new();
static ANALYTICS_REGEX: OnceLock<Regex> = OnceLock::new();
static SHOW_REGEX: OnceLock<Regex> = OnceLock::new();
static DUE_REGEX: OnceLock<Regex> = OnceLock::new();
static PRIORITY_REGEX: OnceLock<Regex> = OnceLock::new();
static TRAILING_COURSE_REGEX: OnceLock<Regex> = OnceLock::new();
static TARGET_PREFIX_REGEX: OnceLock<Regex> = OnceLock::new();
static FIELD_PREFIX_REGEX: OnceLock<Regex> = OnceLock::new();
static HASHTAG_REGEX: OnceLock<Regex> = OnceLock::new();

fn re(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).expect("static regex"))
}

fn due_regex() -> &'static Regex {
    re(
        &DUE_REGEX,
        r"(?i)\b(?:(?:due|by|on)\s+)?(today|tonight|tomorrow|next\s+week|in\s+(\d+)\s+days?|(?:next\s+)?(monday|tuesday|wednesday|thursday|friday|saturday|sunday)|(\d{4}-\d{2}-\d{2}))\b",
    )
}

fn priority_regex() -> &'static Regex {
    re(
        &PRIORITY_REGEX,
        r"(?i)\b(?:(?:with|at)\s+)?(?:(high|medium|low)[\s-]+priority|priority\s*:?\s*(high|medium|low)|(urgent))\b",
    )
}

// ── Entry point ───────────────────────────────────────────────

/// Map a free-text request onto a plan. Never fails: input it cannot read
/// becomes a `CLARIFY`.
pub fn parse_simple_intent(utterance: &str, today: NaiveDate, catalog: &[Course]) -> AgentPlan {
    let text = utterance.trim().trim_end_matches(['.', '!', '?']).trim();
    if text.is_empty() {
        return AgentPlan::clarify("What would you like to do with your tasks?");
    }

    if re(&GREETING_REGEX, r"(?i)^(?:hi|hello|hey|thanks|thank you)\b").is_match(text) {
        return AgentPlan::general(format!("Hi! {HELP}"));
    }
    if re(&HELP_REGEX, r"(?i)^(?:help|what can you do)\b").is_match(text) {
        return AgentPlan::general(HELP);
    }

    if let Some(caps) = re(
        &CLEAR_REGEX,
        r"(?i)^(?:please\s+)?(?:clear|delete|remove)\s+(?:all\s+)?(?:of\s+)?(?:my\s+|the\s+)?(completed|done|finished|overdue|pending)(?:\s+tasks?)?$",
    )
    .captures(text)
    {
        let action = match caps[1].to_lowercase().as_str() {
            "overdue" => AgentAction::ClearOverdue,
            "pending" => AgentAction::ClearPending,
            _ => AgentAction::ClearCompleted,
        };
        return AgentPlan::new(action);
    }

    if let Some(plan) = parse_bulk(text, catalog) {
        return plan;
    }

    if let Some(caps) = re(
        &CREATE_REGEX,
        r"(?i)^(?:please\s+)?(?:create|add|new|make|schedule|remind\s+me\s+to)\b\s*(?:an?\s+)?(?:new\s+)?(?:task\b\s*)?(?:(?:to|called|named|titled)\s+)?:?\s*(.*)$",
    )
    .captures(text)
    {
        return parse_create(&caps[1], today, catalog);
    }

    if let Some(caps) = re(&SEARCH_REGEX, r"(?i)^(?:search|find|look)\s+(?:for\s+)?(?:tasks?\s+)?(?:(?:about|with|containing|named)\s+)?(.+)$")
        .captures(text)
    {
        let query = strip_quotes(&caps[1]);
        if !query.is_empty() {
            return AgentPlan::new(AgentAction::SearchTasks { query });
        }
    }

    if let Some(target) = target_from(&MARK_UNDONE_REGEX, r"(?i)^mark\s+(.+?)\s+as\s+(?:not\s+done|not\s+complete[d]?|incomplete|undone|pending)$", text)
        .or_else(|| target_from(&UNCOMPLETE_REGEX, r"(?i)^(?:uncomplete|reopen|unfinish|undo)\s+(.+)$", text))
    {
        return AgentPlan::new(AgentAction::UncompleteTask { target });
    }

    if let Some(target) = target_from(&MARK_DONE_REGEX, r"(?i)^mark\s+(.+?)\s+as\s+(?:done|complete[d]?|finished)$", text)
        .or_else(|| {
            target_from(
                &COMPLETE_REGEX,
                r"(?i)^(?:i\s+)?(?:complete[d]?|finish(?:ed)?|done\s+with|check\s+off|tick\s+off)\s+(.+)$",
                text,
            )
        })
    {
        return AgentPlan::new(AgentAction::CompleteTask { target });
    }

    if let Some(target) = target_from(&UNSTAR_REGEX, r"(?i)^(?:unstar|unpin|unfavou?rite)\s+(.+)$", text) {
        return AgentPlan::new(AgentAction::UnstarTask { target });
    }
    if let Some(target) = target_from(&STAR_REGEX, r"(?i)^(?:star|pin|favou?rite)\s+(.+)$", text) {
        return AgentPlan::new(AgentAction::StarTask { target });
    }
    if let Some(target) = target_from(&DELETE_REGEX, r"(?i)^(?:delete|remove|drop|cancel)\s+(.+)$", text) {
        return AgentPlan::new(AgentAction::DeleteTask { target });
    }

    if let Some(caps) = re(
        &UPDATE_REGEX,
        r"(?i)^(update|change|rename|move|reschedule|set)\s+(.+?)\s+to\s+(.+)$",
    )
    .captures(text)
    {
        return parse_update(&caps, today, catalog);
    }

    if re(&ANALYTICS_REGEX, r"(?i)\b(?:stats|statistics|analytics|progress|summary|how\s+am\s+i\s+doing)\b").is_match(text) {
        return AgentPlan::new(AgentAction::ShowAnalytics);
    }

    if let Some(caps) = re(&SHOW_REGEX, r"(?i)^(?:show|list|display|view|what(?:'s|\s+is|\s+are)?|which)\b(.*)$").captures(text) {
        let criteria = criteria_from(&caps[1], catalog);
        return AgentPlan::new(AgentAction::ShowTasks { criteria });
    }

    AgentPlan::clarify(format!("Sorry, I didn't understand \"{text}\". {HELP}"))
}

// ── Actions ───────────────────────────────────────────────────

fn parse_bulk(text: &str, catalog: &[Course]) -> Option<AgentPlan> {
    let (verb, rest) = if let Some(caps) = re(
        &MARK_ALL_REGEX,
        r"(?i)^mark\s+(?:all|every)\b(.*?)\s+as\s+(?:done|complete[d]?|finished)$",
    )
    .captures(text)
    {
        ("complete".to_string(), caps[1].to_string())
    } else {
        let caps = re(&BULK_REGEX, r"(?i)^(?:please\s+)?(complete|finish|delete|remove|star)\s+(?:all|every)\b(.*)$")
            .captures(text)?;
        (caps[1].to_lowercase(), caps[2].to_string())
    };

    let criteria = criteria_from(&rest, catalog);
    if criteria.is_empty() {
        return Some(AgentPlan::clarify(format!(
            "That would {verb} every task. Which ones do you mean, for example \"{verb} all overdue tasks\"?"
        )));
    }
    let action = match verb.as_str() {
        "delete" | "remove" => AgentAction::DeleteMultiple { criteria },
        "star" => AgentAction::StarMultiple { criteria },
        _ => AgentAction::CompleteMultiple { criteria },
    };
    Some(AgentPlan::new(action))
}

fn parse_create(rest: &str, today: NaiveDate, catalog: &[Course]) -> AgentPlan {
    let mut title = rest.to_string();
    let mut request = CreateTaskRequest::default();

    if let Some(caps) = due_regex().captures(&title) {
        request.due_date = resolve_due(&caps, today).map(|d| d.format("%Y-%m-%d").to_string());
        title = cut(&title, &caps);
    }
    if let Some(caps) = priority_regex().captures(&title) {
        request.priority = Some(priority_from(&caps));
        title = cut(&title, &caps);
    }
    if let Some(caps) = re(&TRAILING_COURSE_REGEX, r"(?i)\s+for\s+([a-z][a-z0-9 ]*?)[\s,.]*$").captures(&title) {
        if let Some(course) = find_course(catalog, &caps[1]) {
            request.course = Some(course.name.clone());
            title = cut(&title, &caps);
        }
    }

    let title = strip_quotes(&tidy(&title));
    if title.is_empty() {
        return AgentPlan::clarify("What should the new task be called?");
    }
    request.title = Some(title);
    AgentPlan::new(AgentAction::CreateTask { task: request })
}

fn parse_update(caps: &Captures, today: NaiveDate, catalog: &[Course]) -> AgentPlan {
    let verb = caps[1].to_lowercase();
    let field_prefix = re(
        &FIELD_PREFIX_REGEX,
        r"(?i)^(?:the\s+)?(priority|due\s+date|deadline|date|course|title|name|status)\s+(?:of|for|on)\s+",
    );
    let raw_target = caps[2].trim();
    let (field, raw_target) = match field_prefix.captures(raw_target) {
        Some(f) => (Some(f[1].to_lowercase()), &raw_target[f.get(0).map_or(0, |m| m.end())..]),
        None => (None, raw_target),
    };
    let target = clean_target(raw_target);
    if target.is_empty() {
        return AgentPlan::clarify("Which task should I change?");
    }
    let value = caps[3].trim();
    let lower = value.to_lowercase();

    let mut updates = UpdateTaskRequest::default();
    let due = due_regex()
        .captures(value)
        .filter(|c| c.get(0).is_some_and(|m| m.as_str().len() == value.len()))
        .and_then(|c| resolve_due(&c, today));

    if verb == "rename" || matches!(field.as_deref(), Some("title" | "name")) {
        updates.title = Some(strip_quotes(value));
    } else if let Some(due) = due {
        updates.due_date = Some(due.format("%Y-%m-%d").to_string());
    } else if let Some(priority) = priority_word(&lower) {
        updates.priority = Some(priority);
    } else if let Some(status) = status_word(&lower) {
        updates.status = Some(status);
    } else if let Some(course) = find_course(catalog, value) {
        updates.course = Some(course.name.clone());
    } else if field.as_deref() == Some("course") {
        updates.course = Some(value.to_string());
    } else if verb == "change" || verb == "update" {
        updates.title = Some(strip_quotes(value));
    } else {
        return AgentPlan::clarify(format!("I couldn't tell what \"{value}\" should change on \"{target}\"."));
    }

    AgentPlan::new(AgentAction::UpdateTask { target: TaskRef::title(target), updates })
}

// ── Criteria ──────────────────────────────────────────────────

/// Filter words in a listing or bulk request: "overdue", "this week",
/// "high priority", course names, `#tags`.
fn criteria_from(text: &str, catalog: &[Course]) -> TaskFilter {
    let lower = text.to_lowercase();
    let words: Vec<&str> = lower.split(|c: char| !c.is_alphanumeric() && c != '-').filter(|w| !w.is_empty()).collect();
    let joined = format!(" {} ", words.join(" "));
    let has = |phrase: &str| joined.contains(&format!(" {phrase} "));

    let mut criteria = TaskFilter::default();
    if has("overdue") || has("late") {
        criteria.overdue = Some(true);
    }
    if has("today") {
        criteria.today = Some(true);
    }
    if has("this week") {
        criteria.this_week = Some(true);
    }
    if has("completed") || has("done") || has("finished") {
        criteria.completed = Some(true);
    } else if ["pending", "open", "incomplete", "unfinished", "remaining", "todo"].iter().any(|w| has(w)) {
        criteria.completed = Some(false);
    }
    if has("in progress") || has("in-progress") {
        criteria.status = Some(TaskStatus::InProgress);
    }
    if has("starred") || has("favorite") || has("favourite") {
        criteria.starred = Some(true);
    }
    if let Some(caps) = priority_regex().captures(text) {
        criteria.priority = Some(priority_from(&caps));
    }
    for course in catalog {
        let names = [course.name.to_lowercase(), course.id.to_lowercase(), course.code.to_lowercase()];
        if names.iter().any(|n| has(n)) {
            criteria.course = Some(course.name.clone());
            break;
        }
    }
    criteria.tags = re(&HASHTAG_REGEX, r"#([\w-]+)")
        .captures_iter(text)
        .map(|c| c[1].to_string())
        .collect();
    criteria
}

// ── Helpers ───────────────────────────────────────────────────

fn target_from(cell: &'static OnceLock<Regex>, pattern: &str, text: &str) -> Option<TaskRef> {
    let caps = re(cell, pattern).captures(text)?;
    let target = clean_target(&caps[1]);
    (!target.is_empty()).then(|| TaskRef::title(target))
}

fn clean_target(raw: &str) -> String {
    let prefix = re(&TARGET_PREFIX_REGEX, r"(?i)^(?:the\s+|my\s+)?(?:task\s+)?(?:called\s+|named\s+)?");
    let stripped = prefix.replace(raw.trim(), "");
    let stripped = stripped.trim();
    let stripped = match stripped.len().checked_sub(5) {
        Some(at) if stripped.is_char_boundary(at) && stripped[at..].eq_ignore_ascii_case(" task") => &stripped[..at],
        _ => stripped,
    };
    strip_quotes(stripped)
}

fn resolve_due(caps: &Captures, today: NaiveDate) -> Option<NaiveDate> {
    if let Some(n) = caps.get(2) {
        let days: i64 = n.as_str().parse().ok()?;
        return (days <= MAX_RELATIVE_DAYS).then(|| today + Duration::days(days));
    }
    if let Some(day) = caps.get(3) {
        return weekday(day.as_str()).map(|w| next_weekday(today, w));
    }
    if let Some(iso) = caps.get(4) {
        return NaiveDate::parse_from_str(iso.as_str(), "%Y-%m-%d").ok();
    }
    let phrase = caps[1].to_lowercase();
    match phrase.split_whitespace().collect::<Vec<_>>().as_slice() {
        ["today"] | ["tonight"] => Some(today),
        ["tomorrow"] => Some(today + Duration::days(1)),
        ["next", "week"] => Some(today + Duration::days(7)),
        _ => None,
    }
}

fn weekday(name: &str) -> Option<Weekday> {
    match name.to_lowercase().as_str() {
        "monday" => Some(Weekday::Mon),
        "tuesday" => Some(Weekday::Tue),
        "wednesday" => Some(Weekday::Wed),
        "thursday" => Some(Weekday::Thu),
        "friday" => Some(Weekday::Fri),
        "saturday" => Some(Weekday::Sat),
        "sunday" => Some(Weekday::Sun),
        _ => None,
    }
}

/// Next occurrence strictly after today.
fn next_weekday(today: NaiveDate, target: Weekday) -> NaiveDate {
    let from = today.weekday().num_days_from_monday() as i64;
    let to = target.num_days_from_monday() as i64;
    let ahead = (to - from).rem_euclid(7);
    today + Duration::days(if ahead == 0 { 7 } else { ahead })
}

fn priority_from(caps: &Captures) -> Priority {
    if caps.get(3).is_some() {
        return Priority::High;
    }
    let word = caps.get(1).or_else(|| caps.get(2)).map(|m| m.as_str().to_lowercase());
    priority_word(word.as_deref().unwrap_or("medium")).unwrap_or_default()
}

fn priority_word(text: &str) -> Option<Priority> {
    match text.trim().trim_end_matches(" priority") {
        "high" | "urgent" => Some(Priority::High),
        "medium" | "normal" => Some(Priority::Medium),
        "low" => Some(Priority::Low),
        _ => None,
    }
}

fn status_word(text: &str) -> Option<TaskStatus> {
    match text.trim() {
        "in progress" | "in-progress" | "started" => Some(TaskStatus::InProgress),
        "pending" | "not started" => Some(TaskStatus::Pending),
        _ => None,
    }
}

/// Remove the whole match from `text`.
fn cut(text: &str, caps: &Captures) -> String {
    match caps.get(0) {
        Some(m) => format!("{} {}", &text[..m.start()], &text[m.end()..]),
        None => text.to_string(),
    }
}

/// Collapse whitespace and drop dangling connector words at either end.
fn tidy(text: &str) -> String {
    let mut words: Vec<&str> = text
        .split_whitespace()
        .map(|w| w.trim_end_matches(','))
        .filter(|w| !w.is_empty())
        .collect();
    while words.last().is_some_and(|w| CONNECTORS.contains(&w.to_lowercase().as_str())) {
        words.pop();
    }
    while words.first().is_some_and(|w| CONNECTORS.contains(&w.to_lowercase().as_str())) {
        words.remove(0);
    }
    words.join(" ")
}

fn strip_quotes(text: &str) -> String {
    text.trim().trim_matches(['"', '\'', '“', '”']).trim().to_string()
}
