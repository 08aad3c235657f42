use crate::filter::TaskFilter;
use crate::validation::{clean_tags, clean_title, parse_due_date, ValidationErrors};
use crate::world::{NewTask, Priority, TaskPatch, TaskStatus, DEFAULT_COURSE};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

// ── Requests ──────────────────────────────────────────────────

/// Body of `POST /tasks`, also the `task` object of an assistant CREATE_TASK.
/// Everything is optional at the serde level so missing fields surface as
/// field errors rather than a parse failure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTaskRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub course: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub starred: Option<bool>,
}

impl CreateTaskRequest {
    /// Validate into a `NewTask`. `default_due` stands in for a missing
    /// `dueDate`; the HTTP API passes `None` so the field stays required.
    pub fn validate(self, default_due: Option<NaiveDate>) -> Result<NewTask, ValidationErrors> {
        let mut errors = ValidationErrors::new();

        let title = match self.title.as_deref().map(clean_title) {
            Some(Ok(title)) => title,
            Some(Err(msg)) => {
                errors.push_field("title", msg);
                String::new()
            }
            None => {
                errors.push_field("title", "Title is required");
                String::new()
            }
        };

        let due_date = match (self.due_date.as_deref(), default_due) {
            (Some(raw), _) => match parse_due_date(raw.trim()) {
                Ok(d) => Some(d),
                Err(msg) => {
                    errors.push_field("dueDate", msg);
                    None
                }
            },
            (None, Some(d)) => Some(d),
            (None, None) => {
                errors.push_field("dueDate", "Due date is required");
                None
            }
        };

        let id = match self.id.map(|id| id.trim().to_string()) {
            Some(id) if id.is_empty() => {
                errors.push_field("id", "Id must not be blank");
                None
            }
            other => other,
        };

        let (Some(due_date), true) = (due_date, errors.is_empty()) else {
            return Err(errors);
        };

        Ok(NewTask {
            id,
            title,
            description: non_blank(self.description),
            due_date,
            due_time: non_blank(self.due_time),
            priority: self.priority.unwrap_or_default(),
            status: self.status.unwrap_or_default(),
            course: non_blank(self.course).unwrap_or_else(|| DEFAULT_COURSE.to_string()),
            tags: clean_tags(self.tags.unwrap_or_default()),
            completed: self.completed.unwrap_or(false),
            starred: self.starred.unwrap_or(false),
        })
    }
}

/// Body of `PATCH /tasks/:id` and of bulk `update`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTaskRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub course: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub starred: Option<bool>,
}

impl UpdateTaskRequest {
    pub fn validate(self) -> Result<TaskPatch, ValidationErrors> {
        let mut errors = ValidationErrors::new();

        let title = match self.title.as_deref().map(clean_title) {
            Some(Ok(t)) => Some(t),
            Some(Err(msg)) => {
                errors.push_field("title", msg);
                None
            }
            None => None,
        };
        let due_date = match self.due_date.as_deref().map(|d| parse_due_date(d.trim())) {
            Some(Ok(d)) => Some(d),
            Some(Err(msg)) => {
                errors.push_field("dueDate", msg);
                None
            }
            None => None,
        };
        if self.course.as_deref().is_some_and(|c| c.trim().is_empty()) {
            errors.push_field("course", "Course must not be blank");
        }

        errors.into_result(TaskPatch {
            title,
            description: self.description,
            due_date,
            due_time: self.due_time,
            priority: self.priority,
            status: self.status,
            course: self.course.map(|c| c.trim().to_string()),
            tags: self.tags.map(clean_tags),
            completed: self.completed,
            starred: self.starred,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BulkOperation {
    Delete,
    Complete,
    Star,
    Update,
    ClearCompleted,
    ClearOverdue,
    ClearPending,
}

/// Body of `POST /tasks/bulk`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkRequest {
    pub operation: BulkOperation,
    #[serde(default)]
    pub task_ids: Option<Vec<String>>,
    #[serde(default)]
    pub filter: Option<TaskFilter>,
    #[serde(default)]
    pub updates: Option<UpdateTaskRequest>,
    /// For `star`: the value to set. Defaults to `true`.
    #[serde(default)]
    pub value: Option<bool>,
}

/// Query string of `GET /tasks`. Flat scalars only; it converts into a
/// `TaskFilter`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListTasksQuery {
    pub course: Option<String>,
    pub priority: Option<Priority>,
    pub status: Option<TaskStatus>,
    pub completed: Option<bool>,
    pub starred: Option<bool>,
    pub overdue: Option<bool>,
    pub today: Option<bool>,
    pub this_week: Option<bool>,
    pub search: Option<String>,
    pub tag: Option<String>,
}

impl From<ListTasksQuery> for TaskFilter {
    fn from(q: ListTasksQuery) -> Self {
        TaskFilter {
            course: non_blank(q.course),
            priority: q.priority,
            status: q.status,
            completed: q.completed,
            starred: q.starred,
            overdue: q.overdue,
            today: q.today,
            this_week: q.this_week,
            search: non_blank(q.search),
            tags: non_blank(q.tag).into_iter().collect(),
            ..TaskFilter::default()
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SetLlmKeyRequest {
    #[serde(default)]
    pub key: Option<String>,
}

// ── Responses ─────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkResponse {
    pub success: bool,
    pub operation: BulkOperation,
    pub affected: usize,
    pub task_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteResponse {
    pub success: bool,
    pub id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub tasks: usize,
    pub revision: u64,
    pub version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetLlmKeyResponse {
    pub success: bool,
    pub assistant_enabled: bool,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn create_request_defaults() {
        let req: CreateTaskRequest =
            serde_json::from_str(r#"{"title":"Write report","dueDate":"2099-01-01"}"#).unwrap();
        let new = req.validate(None).unwrap();
        assert_eq!(new.id, None);
        assert_eq!(new.title, "Write report");
        assert_eq!(new.due_date, day("2099-01-01"));
        assert_eq!(new.priority, Priority::Medium);
        assert_eq!(new.status, TaskStatus::Pending);
        assert_eq!(new.course, "General");
        assert!(new.tags.is_empty());
        assert!(!new.completed && !new.starred);
    }

    #[test]
    fn create_request_reports_every_field() {
        let req: CreateTaskRequest = serde_json::from_str(r#"{"title":"  ","dueDate":"next friday"}"#).unwrap();
        let errors = req.validate(None).unwrap_err();
        assert!(errors.field_errors.contains_key("title"));
        assert!(errors.field_errors.contains_key("dueDate"));
    }

    #[test]
    fn due_date_required_without_default() {
        let req = CreateTaskRequest { title: Some("x".into()), ..CreateTaskRequest::default() };
        let errors = req.clone().validate(None).unwrap_err();
        assert_eq!(errors.field_errors["dueDate"], vec!["Due date is required".to_string()]);

        let new = req.validate(Some(day("2026-02-11"))).unwrap();
        assert_eq!(new.due_date, day("2026-02-11"));
    }

    #[test]
    fn unknown_priority_is_a_parse_error() {
        let res: Result<CreateTaskRequest, _> =
            serde_json::from_str(r#"{"title":"x","dueDate":"2099-01-01","priority":"urgent"}"#);
        assert!(res.is_err());
    }

    #[test]
    fn update_request_validates_present_fields_only() {
        let patch = UpdateTaskRequest { completed: Some(true), ..UpdateTaskRequest::default() }
            .validate()
            .unwrap();
        assert_eq!(patch.completed, Some(true));
        assert_eq!(patch.status, None);

        let errors = UpdateTaskRequest { title: Some("".into()), ..UpdateTaskRequest::default() }
            .validate()
            .unwrap_err();
        assert!(errors.field_errors.contains_key("title"));
    }

    #[test]
    fn bulk_operation_names() {
        let req: BulkRequest = serde_json::from_str(r#"{"operation":"clear-completed"}"#).unwrap();
        assert_eq!(req.operation, BulkOperation::ClearCompleted);
        assert!(req.task_ids.is_none());
    }

    #[test]
    fn list_query_into_filter() {
        let q = ListTasksQuery {
            course: Some("  ".into()),
            overdue: Some(true),
            tag: Some("exam".into()),
            ..ListTasksQuery::default()
        };
        let f = TaskFilter::from(q);
        assert_eq!(f.course, None);
        assert_eq!(f.overdue, Some(true));
        assert_eq!(f.tags, vec!["exam".to_string()]);
    }
}
