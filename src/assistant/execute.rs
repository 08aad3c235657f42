//! Turn a validated plan into concrete steps, then run them.
//!
//! `prepare` works on a scratch copy of the world so later steps of a
//! MULTI_ACTION see the effect of earlier ones. Every target is resolved to
//! explicit ids there; `run` replays the frozen commands against the live
//! store through `AppState::commit`.

use super::course::{detect_course, find_course, Course};
use super::plan::{AgentAction, AgentPlan, TaskRef};
use crate::errors::ApiError;
use crate::filter::TaskFilter;
use crate::state::AppState;
use crate::world::{BulkAction, Command, Event, Selection, Task, TaskPatch, TaskStatus, World};
use chrono::NaiveDate;
use uuid::Uuid;

const MAX_CANDIDATES: usize = 5;

#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// Reply text with optional task listing. No mutation.
    Say { text: String, tasks: Vec<Task> },
    /// The request could not be turned into a command: no or several
    /// target candidates, invalid fields, nothing matched.
    Unresolved { text: String, tasks: Vec<Task> },
    Mutate {
        /// Imperative, for the confirmation question ("delete 3 tasks").
        preview: String,
        /// Past tense, for the reply ("Deleted 3 tasks").
        done: String,
        /// Tasks the command touched when it was prepared.
        expected: usize,
        command: Command,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Prepared {
    pub steps: Vec<Step>,
    pub needs_confirmation: bool,
}

impl Prepared {
    pub fn mutates(&self) -> bool {
        self.steps.iter().any(|s| matches!(s, Step::Mutate { .. }))
    }

    /// "delete 3 tasks (overdue) and create \"Essay\"".
    pub fn preview(&self) -> String {
        let parts: Vec<&str> = self
            .steps
            .iter()
            .filter_map(|s| match s {
                Step::Mutate { preview, .. } => Some(preview.as_str()),
                Step::Say { .. } | Step::Unresolved { .. } => None,
            })
            .collect();
        parts.join(", then ")
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Outcome {
    pub lines: Vec<String>,
    pub tasks: Vec<Task>,
    pub affected: usize,
    /// A step could not be resolved or applied; its line explains why.
    pub failed: bool,
}

// ── Prepare ───────────────────────────────────────────────────

pub fn prepare(plan: &AgentPlan, world: &World, today: NaiveDate, catalog: &[Course]) -> Prepared {
    let mut scratch = world.clone();
    let mut steps = Vec::new();
    if plan.action == AgentAction::GeneralResponse {
        say(&mut steps, plan.message.clone().unwrap_or_default());
    } else {
        prepare_action(&plan.action, &mut scratch, today, catalog, &mut steps);
    }

    let mutating = steps.iter().any(|s| matches!(s, Step::Mutate { .. }));
    Prepared { steps, needs_confirmation: mutating && plan.needs_confirmation() }
}

fn prepare_action(action: &AgentAction, scratch: &mut World, today: NaiveDate, catalog: &[Course], steps: &mut Vec<Step>) {
    match action {
        AgentAction::CreateTask { task } => {
            let mut request = task.clone();
            request.course = match request.course.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
                Some(name) => Some(find_course(catalog, name).map_or_else(|| name.to_string(), |c| c.name.clone())),
                None => request
                    .title
                    .as_deref()
                    .and_then(|title| detect_course(title, request.description.as_deref(), catalog))
                    .map(|m| m.course_name),
            };
            match request.validate(Some(today)) {
                Ok(mut new) => {
                    new.id.get_or_insert_with(|| Uuid::new_v4().to_string());
                    let preview = format!("create \"{}\" due {}", new.title, new.due_date.format("%Y-%m-%d"));
                    let done = format!(
                        "Created \"{}\" ({}, due {}, {} priority)",
                        new.title,
                        new.course,
                        new.due_date.format("%Y-%m-%d"),
                        new.priority.as_str()
                    );
                    push_mutation(scratch, steps, preview, done, 1, Command::CreateTask(new));
                }
                Err(errors) => unresolved(steps, format!("I couldn't create that task: {}", errors.summary())),
            }
        }

        AgentAction::UpdateTask { target, updates } => {
            let Some(task) = resolve_target(target, scratch, steps) else { return };
            match updates.clone().validate() {
                Ok(patch) if patch.is_empty() => unresolved(steps, format!("There is nothing to change on \"{}\".", task.title)),
                Ok(patch) => push_update(scratch, steps, &task, patch, "update", "Updated"),
                Err(errors) => unresolved(steps, format!("I couldn't update \"{}\": {}", task.title, errors.summary())),
            }
        }

        AgentAction::DeleteTask { target } => {
            let Some(task) = resolve_target(target, scratch, steps) else { return };
            let preview = format!("delete \"{}\"", task.title);
            let done = format!("Deleted \"{}\"", task.title);
            push_mutation(scratch, steps, preview, done, 1, Command::DeleteTask { task_id: task.id });
        }

        AgentAction::CompleteTask { target } => {
            let Some(task) = resolve_target(target, scratch, steps) else { return };
            let patch = TaskPatch { completed: Some(true), status: Some(TaskStatus::Completed), ..TaskPatch::default() };
            push_update(scratch, steps, &task, patch, "complete", "Completed");
        }

        AgentAction::UncompleteTask { target } => {
            let Some(task) = resolve_target(target, scratch, steps) else { return };
            let patch = TaskPatch { completed: Some(false), status: Some(TaskStatus::Pending), ..TaskPatch::default() };
            push_update(scratch, steps, &task, patch, "reopen", "Reopened");
        }

        AgentAction::StarTask { target } | AgentAction::UnstarTask { target } => {
            let starred = matches!(action, AgentAction::StarTask { .. });
            let Some(task) = resolve_target(target, scratch, steps) else { return };
            let patch = TaskPatch { starred: Some(starred), ..TaskPatch::default() };
            let (verb, past) = if starred { ("star", "Starred") } else { ("unstar", "Unstarred") };
            push_update(scratch, steps, &task, patch, verb, past);
        }

        AgentAction::ShowTasks { criteria } => {
            let tasks: Vec<Task> = scratch.list(criteria, today).into_iter().cloned().collect();
            let text = match tasks.len() {
                0 => format!("No tasks match {}.", criteria.describe()),
                n => format!("{}: {n} task{}.", capitalize(&criteria.describe()), plural(n)),
            };
            steps.push(Step::Say { text, tasks });
        }

        AgentAction::SearchTasks { query } => {
            let filter = TaskFilter { search: Some(query.clone()), ..TaskFilter::default() };
            let tasks: Vec<Task> = scratch.list(&filter, today).into_iter().cloned().collect();
            let text = match tasks.len() {
                0 => format!("Nothing matches \"{query}\"."),
                n => format!("Found {n} task{} matching \"{query}\".", plural(n)),
            };
            steps.push(Step::Say { text, tasks });
        }

        AgentAction::DeleteMultiple { criteria } => {
            prepare_bulk(scratch, steps, criteria, today, BulkAction::Delete, ("delete", "Deleted"))
        }
        AgentAction::CompleteMultiple { criteria } => {
            prepare_bulk(scratch, steps, criteria, today, BulkAction::Complete, ("complete", "Completed"))
        }
        AgentAction::StarMultiple { criteria } => {
            prepare_bulk(scratch, steps, criteria, today, BulkAction::Star(true), ("star", "Starred"))
        }
        AgentAction::UpdateMultiple { criteria, updates } => match updates.clone().validate() {
            Ok(patch) => prepare_bulk(scratch, steps, criteria, today, BulkAction::Update(patch), ("update", "Updated")),
            Err(errors) => unresolved(steps, format!("I couldn't apply those updates: {}", errors.summary())),
        },

        AgentAction::ClearCompleted => {
            let criteria = TaskFilter { completed: Some(true), ..TaskFilter::default() };
            prepare_bulk(scratch, steps, &criteria, today, BulkAction::Delete, ("clear", "Cleared"))
        }
        AgentAction::ClearOverdue => {
            let criteria = TaskFilter { overdue: Some(true), ..TaskFilter::default() };
            prepare_bulk(scratch, steps, &criteria, today, BulkAction::Delete, ("clear", "Cleared"))
        }
        AgentAction::ClearPending => {
            let criteria = TaskFilter {
                status: Some(TaskStatus::Pending),
                completed: Some(false),
                ..TaskFilter::default()
            };
            prepare_bulk(scratch, steps, &criteria, today, BulkAction::Delete, ("clear", "Cleared"))
        }

        AgentAction::ShowAnalytics => {
            let a = scratch.analytics(today);
            let text = format!(
                "{} tasks: {} completed ({}%), {} pending, {} in progress, {} overdue, {} due today, {} due this week, {} starred.",
                a.total, a.completed, a.completion_rate, a.pending, a.in_progress, a.overdue, a.due_today, a.due_this_week, a.starred
            );
            say(steps, text);
        }

        AgentAction::MultiAction { actions } => {
            for step in actions {
                prepare_action(step, scratch, today, catalog, steps);
            }
        }

        AgentAction::Clarify { question } => say(steps, question.clone()),
        // Only valid at the top level, where `prepare` answers with the plan message.
        AgentAction::GeneralResponse => {}
    }
}

fn prepare_bulk(
    scratch: &mut World,
    steps: &mut Vec<Step>,
    criteria: &TaskFilter,
    today: NaiveDate,
    action: BulkAction,
    (verb, past): (&str, &str),
) {
    let criteria = &criteria.clone().normalized();
    if criteria.is_empty() {
        unresolved(steps, format!("I need at least one condition before I {verb} tasks in bulk."));
        return;
    }
    let ids: Vec<String> = scratch.list(criteria, today).iter().map(|t| t.id.clone()).collect();
    if ids.is_empty() {
        unresolved(steps, format!("No tasks match {}, so there is nothing to {verb}.", criteria.describe()));
        return;
    }
    let n = ids.len();
    let what = format!("{n} task{} ({})", plural(n), criteria.describe());
    let command = Command::Bulk { action, selection: Selection::Ids(ids) };
    push_mutation(scratch, steps, format!("{verb} {what}"), format!("{past} {what}"), n, command);
}

fn push_update(scratch: &mut World, steps: &mut Vec<Step>, task: &Task, patch: TaskPatch, verb: &str, past: &str) {
    let preview = format!("{verb} \"{}\"", task.title);
    let done = format!("{past} \"{}\"", task.title);
    push_mutation(scratch, steps, preview, done, 1, Command::UpdateTask { task_id: task.id.clone(), patch });
}

fn push_mutation(scratch: &mut World, steps: &mut Vec<Step>, preview: String, done: String, expected: usize, command: Command) {
    match scratch.apply(command.clone()) {
        Ok(_) => steps.push(Step::Mutate { preview, done, expected, command }),
        Err(e) => unresolved(steps, format!("I couldn't {preview}: {e}.")),
    }
}

/// Find one task by id, else by title: exact (case-insensitive) first, then
/// substring. Zero or several candidates produce a reply instead.
fn resolve_target(target: &TaskRef, world: &World, steps: &mut Vec<Step>) -> Option<Task> {
    if let Some(task) = target.id.as_deref().and_then(|id| world.get(id.trim())) {
        return Some(task.clone());
    }
    let Some(title) = target.title.as_deref().map(str::trim).filter(|t| !t.is_empty()) else {
        unresolved(steps, format!("I couldn't find {}.", target.describe()));
        return None;
    };

    let needle = title.to_lowercase();
    let exact: Vec<&Task> = world.tasks.iter().filter(|t| t.title.trim().to_lowercase() == needle).collect();
    let candidates = if exact.is_empty() {
        world.tasks.iter().filter(|t| t.title.to_lowercase().contains(&needle)).collect()
    } else {
        exact
    };

    match candidates.as_slice() {
        [] => {
            unresolved(steps, format!("I couldn't find a task matching \"{title}\"."));
            None
        }
        [task] => Some((*task).clone()),
        many => {
            let names: Vec<String> = many
                .iter()
                .take(MAX_CANDIDATES)
                .map(|t| format!("\"{}\" (due {})", t.title, t.due_date.format("%Y-%m-%d")))
                .collect();
            let more = many.len().saturating_sub(MAX_CANDIDATES);
            let tail = if more > 0 { format!(" and {more} more") } else { String::new() };
            steps.push(Step::Unresolved {
                text: format!("Several tasks match \"{title}\": {}{tail}. Which one did you mean?", names.join(", ")),
                tasks: many.iter().map(|t| (*t).clone()).collect(),
            });
            None
        }
    }
}

fn say(steps: &mut Vec<Step>, text: String) {
    steps.push(Step::Say { text, tasks: Vec::new() });
}

fn unresolved(steps: &mut Vec<Step>, text: String) {
    steps.push(Step::Unresolved { text, tasks: Vec::new() });
}

fn plural(n: usize) -> &'static str {
    if n == 1 { "" } else { "s" }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

// ── Run ───────────────────────────────────────────────────────

/// Apply prepared steps to the live store, in order. A step whose target
/// vanished in the meantime is reported and skipped; storage failures abort.
pub fn run(steps: &[Step], state: &AppState) -> Result<Outcome, ApiError> {
    let mut outcome = Outcome::default();
    for step in steps {
        match step {
            Step::Say { text, tasks } => {
                outcome.lines.push(text.clone());
                outcome.tasks.extend(tasks.iter().cloned());
            }
            Step::Unresolved { text, tasks } => {
                outcome.failed = true;
                outcome.lines.push(text.clone());
                outcome.tasks.extend(tasks.iter().cloned());
            }
            Step::Mutate { done, expected, command, .. } => match state.commit(command.clone()) {
                Ok(event) => {
                    let (count, task) = event_effect(event);
                    outcome.affected += count;
                    outcome.tasks.extend(task);
                    if count == *expected {
                        outcome.lines.push(format!("{done}."));
                    } else {
                        outcome.lines.push(format!("{done}: only {count} of {expected} still existed."));
                    }
                }
                Err(e @ (ApiError::NotFound(_) | ApiError::Conflict(_) | ApiError::Validation(_))) => {
                    tracing::info!(error = %e, "assistant step skipped");
                    outcome.failed = true;
                    outcome.lines.push(format!("Skipped: {} ({e}).", done.to_lowercase()));
                }
                Err(e) => return Err(e),
            },
        }
    }
    Ok(outcome)
}

fn event_effect(event: Event) -> (usize, Option<Task>) {
    match event {
        Event::TaskCreated { task, .. } | Event::TaskUpdated { task, .. } => (1, Some(task)),
        Event::TaskDeleted { .. } => (1, None),
        Event::BulkApplied { affected, .. } => (affected.len(), None),
        Event::Cleared { removed, .. } => (removed.len(), None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assistant::course::default_catalog;
    use crate::models::CreateTaskRequest;
    use crate::world::NewTask;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 2, 11).unwrap()
    }

    fn world() -> World {
        let mut w = World::new();
        for (id, title, due) in [
            ("1", "Physics lab report", "2026-02-10"),
            ("2", "Essay draft", "2026-02-12"),
            ("3", "Essay final", "2026-02-20"),
            ("4", "Calculus problem set", "2026-02-09"),
        ] {
            let mut new = NewTask::new(title, NaiveDate::parse_from_str(due, "%Y-%m-%d").unwrap());
            new.id = Some(id.into());
            w.apply(Command::CreateTask(new)).unwrap();
        }
        w
    }

    fn prep(action: AgentAction, w: &World) -> Prepared {
        prepare(&AgentPlan::new(action), w, today(), &default_catalog())
    }

    fn unresolved_text(step: &Step) -> &str {
        match step {
            Step::Unresolved { text, .. } => text,
            other => panic!("expected Unresolved, got {other:?}"),
        }
    }

    #[test]
    fn create_detects_course_and_defaults_due() {
        let task = CreateTaskRequest { title: Some("Thermodynamics problem set".into()), ..CreateTaskRequest::default() };
        let prepared = prep(AgentAction::CreateTask { task }, &World::new());

        match &prepared.steps[..] {
            [Step::Mutate { command: Command::CreateTask(new), .. }] => {
                assert_eq!(new.course, "Physics");
                assert_eq!(new.due_date, today());
                assert!(new.id.is_some());
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(!prepared.needs_confirmation);
    }

    #[test]
    fn create_keeps_explicit_course() {
        let task = CreateTaskRequest {
            title: Some("Thermodynamics reading".into()),
            course: Some("math".into()),
            ..CreateTaskRequest::default()
        };
        match &prep(AgentAction::CreateTask { task }, &World::new()).steps[..] {
            [Step::Mutate { command: Command::CreateTask(new), .. }] => assert_eq!(new.course, "Mathematics"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn exact_title_wins_over_substring() {
        let mut w = world();
        let mut new = NewTask::new("Essay", today());
        new.id = Some("5".into());
        w.apply(Command::CreateTask(new)).unwrap();

        let prepared = prep(AgentAction::DeleteTask { target: TaskRef::title("essay") }, &w);
        match &prepared.steps[..] {
            [Step::Mutate { command: Command::DeleteTask { task_id }, .. }] => assert_eq!(task_id, "5"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn ambiguous_title_asks_instead_of_guessing() {
        let prepared = prep(AgentAction::CompleteTask { target: TaskRef::title("essay") }, &world());
        assert!(!prepared.mutates());
        let text = unresolved_text(&prepared.steps[0]);
        assert!(text.contains("Essay draft") && text.contains("Essay final"), "{text}");
        match &prepared.steps[0] {
            Step::Unresolved { tasks, .. } => assert_eq!(tasks.len(), 2),
            _ => unreachable!(),
        }
    }

    #[test]
    fn missing_title_is_reported() {
        let prepared = prep(AgentAction::DeleteTask { target: TaskRef::title("biology") }, &world());
        assert!(!prepared.mutates());
        assert!(unresolved_text(&prepared.steps[0]).contains("couldn't find"));
    }

    #[test]
    fn target_by_id() {
        let target = TaskRef { id: Some("3".into()), title: None };
        match &prep(AgentAction::StarTask { target }, &world()).steps[..] {
            [Step::Mutate { command: Command::UpdateTask { task_id, patch }, .. }] => {
                assert_eq!(task_id, "3");
                assert_eq!(patch.starred, Some(true));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn clear_overdue_freezes_ids_and_needs_confirmation() {
        let prepared = prep(AgentAction::ClearOverdue, &world());
        assert!(prepared.needs_confirmation);
        match &prepared.steps[..] {
            [Step::Mutate { command: Command::Bulk { action, selection }, expected, .. }] => {
                assert_eq!(*action, BulkAction::Delete);
                assert_eq!(*selection, Selection::Ids(vec!["1".into(), "4".into()]));
                assert_eq!(*expected, 2);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(prepared.preview(), "clear 2 tasks (overdue)");
    }

    #[test]
    fn empty_bulk_is_not_gated() {
        let prepared = prep(AgentAction::ClearCompleted, &world());
        assert!(!prepared.mutates());
        assert!(!prepared.needs_confirmation);
        assert!(unresolved_text(&prepared.steps[0]).contains("nothing to clear"));
    }

    #[test]
    fn blank_bulk_criteria_select_nothing() {
        let criteria = TaskFilter { search: Some(" ".into()), ..TaskFilter::default() };
        let prepared = prep(AgentAction::DeleteMultiple { criteria }, &world());
        assert!(!prepared.mutates());
        assert!(unresolved_text(&prepared.steps[0]).contains("at least one condition"));
    }

    #[test]
    fn multi_action_sees_earlier_steps() {
        let task = CreateTaskRequest { title: Some("Read chapter 4".into()), ..CreateTaskRequest::default() };
        let plan = AgentAction::MultiAction {
            actions: vec![
                AgentAction::CreateTask { task },
                AgentAction::StarTask { target: TaskRef::title("read chapter 4") },
            ],
        };
        let prepared = prep(plan, &world());
        match &prepared.steps[..] {
            [Step::Mutate { command: Command::CreateTask(new), .. }, Step::Mutate { command: Command::UpdateTask { task_id, .. }, .. }] => {
                assert_eq!(new.id.as_ref(), Some(task_id));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn show_and_search_list_tasks() {
        let criteria = TaskFilter { overdue: Some(true), ..TaskFilter::default() };
        match &prep(AgentAction::ShowTasks { criteria }, &world()).steps[..] {
            [Step::Say { tasks, .. }] => assert_eq!(tasks.len(), 2),
            other => panic!("unexpected {other:?}"),
        }
        match &prep(AgentAction::SearchTasks { query: "ESSAY".into() }, &world()).steps[..] {
            [Step::Say { tasks, text }] => {
                assert_eq!(tasks.len(), 2);
                assert_eq!(text, "Found 2 tasks matching \"ESSAY\".");
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
