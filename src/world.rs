use crate::filter::TaskFilter;
use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

pub const DEFAULT_COURSE: &str = "General";

// ── Entity types ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        }
    }
}

/// Stored status. Never derived from `completed` or the due date:
/// the two flags are kept independently and may disagree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskStatus {
    Completed,
    InProgress,
    #[default]
    Pending,
    Overdue,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Completed => "completed",
            TaskStatus::InProgress => "in-progress",
            TaskStatus::Pending => "pending",
            TaskStatus::Overdue => "overdue",
        }
    }
}

fn default_course() -> String {
    DEFAULT_COURSE.to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub due_date: NaiveDate,
    /// Free-form ("10:30 AM"), never checked against `due_date`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_time: Option<String>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default = "default_course")]
    pub course: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub starred: bool,
}

impl Task {
    /// The one overdue predicate: due strictly before today and not completed.
    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        self.due_date < today && !self.completed
    }

    pub fn is_due_this_week(&self, today: NaiveDate) -> bool {
        self.due_date >= today && self.due_date <= today + Duration::days(6)
    }

    /// `completed` flag and `status` tell different stories.
    pub fn has_status_drift(&self) -> bool {
        self.completed != (self.status == TaskStatus::Completed)
    }

    fn apply_patch(&mut self, patch: &TaskPatch) {
        if let Some(title) = &patch.title {
            self.title = title.clone();
        }
        if let Some(description) = &patch.description {
            self.description = Some(description.clone());
        }
        if let Some(due_date) = patch.due_date {
            self.due_date = due_date;
        }
        if let Some(due_time) = &patch.due_time {
            self.due_time = Some(due_time.clone());
        }
        if let Some(priority) = patch.priority {
            self.priority = priority;
        }
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(course) = &patch.course {
            self.course = course.clone();
        }
        if let Some(tags) = &patch.tags {
            self.tags = tags.clone();
        }
        if let Some(completed) = patch.completed {
            self.completed = completed;
        }
        if let Some(starred) = patch.starred {
            self.starred = starred;
        }
    }
}

/// A validated task ready to be inserted. `id: None` lets the world assign one.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTask {
    pub id: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub due_date: NaiveDate,
    pub due_time: Option<String>,
    pub priority: Priority,
    pub status: TaskStatus,
    pub course: String,
    pub tags: Vec<String>,
    pub completed: bool,
    pub starred: bool,
}

impl NewTask {
    /// A task with every optional field at its default.
    pub fn new(title: impl Into<String>, due_date: NaiveDate) -> Self {
        NewTask {
            id: None,
            title: title.into(),
            description: None,
            due_date,
            due_time: None,
            priority: Priority::default(),
            status: TaskStatus::default(),
            course: default_course(),
            tags: Vec::new(),
            completed: false,
            starred: false,
        }
    }
}

/// Partial update. `None` leaves the field alone.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub due_date: Option<NaiveDate>,
    pub due_time: Option<String>,
    pub priority: Option<Priority>,
    pub status: Option<TaskStatus>,
    pub course: Option<String>,
    pub tags: Option<Vec<String>>,
    pub completed: Option<bool>,
    pub starred: Option<bool>,
}

impl TaskPatch {
    pub fn is_empty(&self) -> bool {
        *self == TaskPatch::default()
    }
}

/// Which tasks a bulk command touches. A filter is resolved inside
/// `apply`, against the same state the command mutates.
#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    Ids(Vec<String>),
    Filter { filter: TaskFilter, today: NaiveDate },
}

#[derive(Debug, Clone, PartialEq)]
pub enum BulkAction {
    Delete,
    /// Sets both `completed` and `status`.
    Complete,
    Star(bool),
    Update(TaskPatch),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearScope {
    /// `completed == true`
    Completed,
    /// The overdue predicate.
    Overdue,
    /// `status == pending` and not completed.
    Pending,
}

// ── Commands ──────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    CreateTask(NewTask),
    UpdateTask { task_id: String, patch: TaskPatch },
    DeleteTask { task_id: String },
    Bulk { action: BulkAction, selection: Selection },
    Clear { scope: ClearScope, today: NaiveDate },
}

// ── Events ────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    TaskCreated { revision: u64, task: Task },
    TaskUpdated { revision: u64, task: Task },
    TaskDeleted { revision: u64, task: Task },
    /// `affected` lists ids touched (or removed, for Delete) in store order.
    BulkApplied { revision: u64, affected: Vec<String> },
    Cleared { revision: u64, removed: Vec<String> },
}

impl Event {
    /// False for bulk/clear commands that matched nothing.
    pub fn changed(&self) -> bool {
        match self {
            Event::BulkApplied { affected, .. } => !affected.is_empty(),
            Event::Cleared { removed, .. } => !removed.is_empty(),
            _ => true,
        }
    }

    pub fn revision(&self) -> u64 {
        match self {
            Event::TaskCreated { revision, .. }
            | Event::TaskUpdated { revision, .. }
            | Event::TaskDeleted { revision, .. }
            | Event::BulkApplied { revision, .. }
            | Event::Cleared { revision, .. } => *revision,
        }
    }
}

// ── Errors ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WorldError {
    #[error("task {0} not found")]
    TaskNotFound(String),
    #[error("task {0} already exists")]
    DuplicateId(String),
}

// ── Analytics ─────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Analytics {
    pub total: usize,
    pub completed: usize,
    pub pending: usize,
    pub in_progress: usize,
    pub overdue: usize,
    pub starred: usize,
    pub due_today: usize,
    pub due_this_week: usize,
    /// Percentage of tasks with `completed == true`, rounded.
    pub completion_rate: u32,
    pub by_priority: BTreeMap<String, usize>,
    pub by_course: BTreeMap<String, usize>,
    /// Tasks whose `completed` flag disagrees with their status.
    pub status_drift: usize,
}

// ── The World ──────────────────────────────────────────────────

/// The authoritative task list. Lives in memory, loaded from the save file
/// on boot. Every mutation goes through `apply`.
#[derive(Debug, Clone, Default)]
pub struct World {
    /// Insertion order is preserved; it is the order of the save file.
    pub tasks: Vec<Task>,
    /// Bumped once per command that changed something. Not persisted.
    pub revision: u64,
}

impl World {
    pub fn new() -> Self {
        World::default()
    }

    pub fn with_tasks(tasks: Vec<Task>) -> Self {
        World { tasks, revision: 0 }
    }

    /// Apply a command. A failed command leaves the world untouched.
    pub fn apply(&mut self, cmd: Command) -> Result<Event, WorldError> {
        match cmd {
            Command::CreateTask(new) => {
                let id = match new.id {
                    Some(id) => {
                        if self.position(&id).is_some() {
                            return Err(WorldError::DuplicateId(id));
                        }
                        id
                    }
                    None => Uuid::new_v4().to_string(),
                };

                let task = Task {
                    id,
                    title: new.title,
                    description: new.description,
                    due_date: new.due_date,
                    due_time: new.due_time,
                    priority: new.priority,
                    status: new.status,
                    course: new.course,
                    tags: new.tags,
                    completed: new.completed,
                    starred: new.starred,
                };

                self.tasks.push(task.clone());
                self.revision += 1;
                Ok(Event::TaskCreated { revision: self.revision, task })
            }

            Command::UpdateTask { task_id, patch } => {
                let idx = self.position(&task_id).ok_or(WorldError::TaskNotFound(task_id))?;
                let task = &mut self.tasks[idx];
                task.apply_patch(&patch);

                let task = task.clone();
                self.revision += 1;
                Ok(Event::TaskUpdated { revision: self.revision, task })
            }

            Command::DeleteTask { task_id } => {
                let idx = self.position(&task_id).ok_or(WorldError::TaskNotFound(task_id))?;
                let task = self.tasks.remove(idx);
                self.revision += 1;
                Ok(Event::TaskDeleted { revision: self.revision, task })
            }

            Command::Bulk { action, selection } => {
                let targets = self.select(&selection);

                match &action {
                    BulkAction::Delete => self.tasks.retain(|t| !targets.contains(&t.id)),
                    BulkAction::Complete => self.for_each_target(&targets, |t| {
                        t.completed = true;
                        t.status = TaskStatus::Completed;
                    }),
                    BulkAction::Star(value) => self.for_each_target(&targets, |t| t.starred = *value),
                    BulkAction::Update(patch) => self.for_each_target(&targets, |t| t.apply_patch(patch)),
                }

                if !targets.is_empty() {
                    self.revision += 1;
                }
                Ok(Event::BulkApplied { revision: self.revision, affected: targets })
            }

            Command::Clear { scope, today } => {
                let removed: Vec<String> = self
                    .tasks
                    .iter()
                    .filter(|t| match scope {
                        ClearScope::Completed => t.completed,
                        ClearScope::Overdue => t.is_overdue(today),
                        ClearScope::Pending => t.status == TaskStatus::Pending && !t.completed,
                    })
                    .map(|t| t.id.clone())
                    .collect();

                if !removed.is_empty() {
                    self.tasks.retain(|t| !removed.contains(&t.id));
                    self.revision += 1;
                }
                Ok(Event::Cleared { revision: self.revision, removed })
            }
        }
    }

    pub fn get(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    /// Tasks matching `filter`, in store order.
    pub fn list(&self, filter: &TaskFilter, today: NaiveDate) -> Vec<&Task> {
        self.tasks.iter().filter(|t| filter.matches(t, today)).collect()
    }

    pub fn analytics(&self, today: NaiveDate) -> Analytics {
        let mut a = Analytics {
            total: self.tasks.len(),
            ..Analytics::default()
        };
        for p in [Priority::High, Priority::Medium, Priority::Low] {
            a.by_priority.insert(p.as_str().to_string(), 0);
        }

        for t in &self.tasks {
            if t.completed {
                a.completed += 1;
            }
            match t.status {
                TaskStatus::Pending => a.pending += 1,
                TaskStatus::InProgress => a.in_progress += 1,
                TaskStatus::Completed | TaskStatus::Overdue => {}
            }
            if t.is_overdue(today) {
                a.overdue += 1;
            }
            if t.starred {
                a.starred += 1;
            }
            if t.due_date == today {
                a.due_today += 1;
            }
            if t.is_due_this_week(today) {
                a.due_this_week += 1;
            }
            if t.has_status_drift() {
                a.status_drift += 1;
            }
            *a.by_priority.entry(t.priority.as_str().to_string()).or_default() += 1;
            *a.by_course.entry(t.course.clone()).or_default() += 1;
        }

        if a.total > 0 {
            a.completion_rate = ((a.completed as f64 / a.total as f64) * 100.0).round() as u32;
        }
        a
    }

    // Linear scan, the store is one student's task list.
    fn position(&self, id: &str) -> Option<usize> {
        self.tasks.iter().position(|t| t.id == id)
    }

    fn select(&self, selection: &Selection) -> Vec<String> {
        match selection {
            Selection::Ids(ids) => self
                .tasks
                .iter()
                .filter(|t| ids.contains(&t.id))
                .map(|t| t.id.clone())
                .collect(),
            Selection::Filter { filter, today } => self
                .tasks
                .iter()
                .filter(|t| filter.matches(t, *today))
                .map(|t| t.id.clone())
                .collect(),
        }
    }

    fn for_each_target(&mut self, targets: &[String], mut f: impl FnMut(&mut Task)) {
        for task in self.tasks.iter_mut().filter(|t| targets.contains(&t.id)) {
            f(task);
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────
