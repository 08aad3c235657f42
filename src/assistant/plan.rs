//! The assistant's action taxonomy and the strict reply contract.
//!
//! An LLM reply must be exactly one JSON object that deserializes into
//! `AgentPlan` and passes `AgentPlan::validate`. Anything else is rejected
//! and the caller falls back to the rule-based parser.

use crate::filter::TaskFilter;
use crate::models::{CreateTaskRequest, UpdateTaskRequest};
use crate::validation::ValidationErrors;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub const MAX_STEPS: usize = 10;

/// Identifies one task, by id or by (partial) title.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskRef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl TaskRef {
    pub fn title(title: impl Into<String>) -> Self {
        TaskRef { id: None, title: Some(title.into()) }
    }

    pub fn is_empty(&self) -> bool {
        self.id.as_deref().map_or(true, |s| s.trim().is_empty())
            && self.title.as_deref().map_or(true, |s| s.trim().is_empty())
    }

    pub fn describe(&self) -> String {
        match (&self.title, &self.id) {
            (Some(t), _) if !t.trim().is_empty() => format!("\"{}\"", t.trim()),
            (_, Some(id)) => format!("task {id}"),
            _ => "that task".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AgentAction {
    CreateTask { task: CreateTaskRequest },
    UpdateTask { target: TaskRef, updates: UpdateTaskRequest },
    DeleteTask { target: TaskRef },
    CompleteTask { target: TaskRef },
    UncompleteTask { target: TaskRef },
    StarTask { target: TaskRef },
    UnstarTask { target: TaskRef },
    ShowTasks {
        #[serde(default)]
        criteria: TaskFilter,
    },
    SearchTasks { query: String },
    DeleteMultiple { criteria: TaskFilter },
    CompleteMultiple { criteria: TaskFilter },
    StarMultiple { criteria: TaskFilter },
    UpdateMultiple { criteria: TaskFilter, updates: UpdateTaskRequest },
    ClearCompleted,
    ClearOverdue,
    ClearPending,
    ShowAnalytics,
    MultiAction { actions: Vec<AgentAction> },
    Clarify { question: String },
    /// Text comes from the plan's `message`.
    GeneralResponse,
}

impl AgentAction {
    pub fn name(&self) -> &'static str {
        match self {
            AgentAction::CreateTask { .. } => "CREATE_TASK",
            AgentAction::UpdateTask { .. } => "UPDATE_TASK",
            AgentAction::DeleteTask { .. } => "DELETE_TASK",
            AgentAction::CompleteTask { .. } => "COMPLETE_TASK",
            AgentAction::UncompleteTask { .. } => "UNCOMPLETE_TASK",
            AgentAction::StarTask { .. } => "STAR_TASK",
            AgentAction::UnstarTask { .. } => "UNSTAR_TASK",
            AgentAction::ShowTasks { .. } => "SHOW_TASKS",
            AgentAction::SearchTasks { .. } => "SEARCH_TASKS",
            AgentAction::DeleteMultiple { .. } => "DELETE_MULTIPLE",
            AgentAction::CompleteMultiple { .. } => "COMPLETE_MULTIPLE",
            AgentAction::StarMultiple { .. } => "STAR_MULTIPLE",
            AgentAction::UpdateMultiple { .. } => "UPDATE_MULTIPLE",
            AgentAction::ClearCompleted => "CLEAR_COMPLETED",
            AgentAction::ClearOverdue => "CLEAR_OVERDUE",
            AgentAction::ClearPending => "CLEAR_PENDING",
            AgentAction::ShowAnalytics => "SHOW_ANALYTICS",
            AgentAction::MultiAction { .. } => "MULTI_ACTION",
            AgentAction::Clarify { .. } => "CLARIFY",
            AgentAction::GeneralResponse => "GENERAL_RESPONSE",
        }
    }

    /// Bulk removals always go through the confirmation gate.
    pub fn is_destructive_bulk(&self) -> bool {
        match self {
            AgentAction::DeleteMultiple { .. }
            | AgentAction::ClearCompleted
            | AgentAction::ClearOverdue
            | AgentAction::ClearPending => true,
            AgentAction::MultiAction { actions } => actions.iter().any(AgentAction::is_destructive_bulk),
            _ => false,
        }
    }

    fn validate(&self, today: NaiveDate, nested: bool, errors: &mut ValidationErrors) {
        match self {
            AgentAction::CreateTask { task } => {
                if let Err(e) = task.clone().validate(Some(today)) {
                    errors.push_form(format!("CREATE_TASK: {}", e.summary()));
                }
            }
            AgentAction::UpdateTask { target, updates } => {
                check_target(self.name(), target, errors);
                if let Err(e) = updates.clone().validate() {
                    errors.push_form(format!("UPDATE_TASK: {}", e.summary()));
                }
            }
            AgentAction::DeleteTask { target }
            | AgentAction::CompleteTask { target }
            | AgentAction::UncompleteTask { target }
            | AgentAction::StarTask { target }
            | AgentAction::UnstarTask { target } => check_target(self.name(), target, errors),
            AgentAction::SearchTasks { query } => {
                if query.trim().is_empty() {
                    errors.push_form("SEARCH_TASKS: query is empty");
                }
            }
            AgentAction::DeleteMultiple { criteria }
            | AgentAction::CompleteMultiple { criteria }
            | AgentAction::StarMultiple { criteria } => {
                if criteria.is_empty() {
                    errors.push_form(format!("{}: criteria must not be empty", self.name()));
                }
            }
            AgentAction::UpdateMultiple { criteria, updates } => {
                if criteria.is_empty() {
                    errors.push_form("UPDATE_MULTIPLE: criteria must not be empty");
                }
                match updates.clone().validate() {
                    Ok(patch) if patch.is_empty() => errors.push_form("UPDATE_MULTIPLE: no updates"),
                    Ok(_) => {}
                    Err(e) => errors.push_form(format!("UPDATE_MULTIPLE: {}", e.summary())),
                }
            }
            AgentAction::MultiAction { actions } => {
                if nested {
                    errors.push_form("MULTI_ACTION cannot be nested");
                } else if actions.is_empty() {
                    errors.push_form("MULTI_ACTION has no steps");
                } else if actions.len() > MAX_STEPS {
                    errors.push_form(format!("MULTI_ACTION has more than {MAX_STEPS} steps"));
                }
                for step in actions {
                    step.validate(today, true, errors);
                }
            }
            AgentAction::Clarify { question } => {
                if question.trim().is_empty() {
                    errors.push_form("CLARIFY: question is empty");
                }
            }
            AgentAction::GeneralResponse => {
                if nested {
                    errors.push_form("GENERAL_RESPONSE cannot be a MULTI_ACTION step");
                }
            }
            AgentAction::ShowTasks { .. }
            | AgentAction::ClearCompleted
            | AgentAction::ClearOverdue
            | AgentAction::ClearPending
            | AgentAction::ShowAnalytics => {}
        }
    }
}

fn check_target(name: &str, target: &TaskRef, errors: &mut ValidationErrors) {
    if target.is_empty() {
        errors.push_form(format!("{name}: target needs an id or a title"));
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentPlan {
    #[serde(flatten)]
    pub action: AgentAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default)]
    pub confirmation_required: bool,
}

impl AgentPlan {
    pub fn new(action: AgentAction) -> Self {
        AgentPlan { action, message: None, confirmation_required: false }
    }

    pub fn clarify(question: impl Into<String>) -> Self {
        AgentPlan::new(AgentAction::Clarify { question: question.into() })
    }

    pub fn general(message: impl Into<String>) -> Self {
        AgentPlan { message: Some(message.into()), ..AgentPlan::new(AgentAction::GeneralResponse) }
    }

    pub fn validate(&self, today: NaiveDate) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        self.action.validate(today, false, &mut errors);
        if self.action == AgentAction::GeneralResponse && self.message.as_deref().map_or(true, |m| m.trim().is_empty()) {
            errors.push_form("GENERAL_RESPONSE needs a message");
        }
        errors.into_result(())
    }

    pub fn needs_confirmation(&self) -> bool {
        self.confirmation_required || self.action.is_destructive_bulk()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    #[error("reply is not a valid plan: {0}")]
    Schema(#[from] serde_json::Error),
    #[error("plan failed validation: {0}")]
    Invalid(ValidationErrors),
}

/// Parse an LLM reply. Exactly one JSON object, no surrounding prose,
/// no code fences.
pub fn parse_plan(reply: &str, today: NaiveDate) -> Result<AgentPlan, PlanError> {
    let plan: AgentPlan = serde_json::from_str(reply.trim())?;
    plan.validate(today).map_err(PlanError::Invalid)?;
    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::Priority;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 2, 11).unwrap()
    }

    #[test]
    fn parses_create_task() {
        let reply = r#"{"action":"CREATE_TASK","task":{"title":"Lab report","dueDate":"2026-02-13","priority":"high"},"message":"Added!"}"#;
        let plan = parse_plan(reply, today()).unwrap();
        match &plan.action {
            AgentAction::CreateTask { task } => {
                assert_eq!(task.title.as_deref(), Some("Lab report"));
                assert_eq!(task.priority, Some(Priority::High));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(plan.message.as_deref(), Some("Added!"));
        assert!(!plan.confirmation_required);
    }

    #[test]
    fn parses_bulk_with_criteria_and_flag() {
        let reply = r#"{"action":"DELETE_MULTIPLE","criteria":{"course":"Physics","completed":true},"confirmationRequired":true}"#;
        let plan = parse_plan(reply, today()).unwrap();
        assert!(plan.confirmation_required);
        assert!(plan.needs_confirmation());
        match plan.action {
            AgentAction::DeleteMultiple { criteria } => {
                assert_eq!(criteria.course.as_deref(), Some("Physics"));
                assert_eq!(criteria.completed, Some(true));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn unit_actions_parse() {
        let plan = parse_plan(r#"{"action":"CLEAR_OVERDUE"}"#, today()).unwrap();
        assert_eq!(plan.action, AgentAction::ClearOverdue);
        assert!(plan.needs_confirmation());
    }

    #[test]
    fn prose_around_json_is_rejected() {
        let reply = "Sure! Here you go: {\"action\":\"SHOW_ANALYTICS\"}";
        assert!(matches!(parse_plan(reply, today()), Err(PlanError::Schema(_))));

        let fenced = "```json\n{\"action\":\"SHOW_ANALYTICS\"}\n```";
        assert!(matches!(parse_plan(fenced, today()), Err(PlanError::Schema(_))));
    }

    #[test]
    fn unknown_action_is_rejected() {
        assert!(parse_plan(r#"{"action":"LAUNCH_ROCKET"}"#, today()).is_err());
    }

    #[test]
    fn missing_required_params_rejected() {
        assert!(parse_plan(r#"{"action":"DELETE_TASK"}"#, today()).is_err());
        assert!(matches!(
            parse_plan(r#"{"action":"DELETE_TASK","target":{}}"#, today()),
            Err(PlanError::Invalid(_))
        ));
        assert!(matches!(
            parse_plan(r#"{"action":"CREATE_TASK","task":{"title":" "}}"#, today()),
            Err(PlanError::Invalid(_))
        ));
        assert!(matches!(
            parse_plan(r#"{"action":"CREATE_TASK","task":{"title":"x","dueDate":"soon"}}"#, today()),
            Err(PlanError::Invalid(_))
        ));
    }

    #[test]
    fn bulk_needs_criteria() {
        assert!(matches!(
            parse_plan(r#"{"action":"DELETE_MULTIPLE","criteria":{}}"#, today()),
            Err(PlanError::Invalid(_))
        ));
    }

    #[test]
    fn multi_action_rules() {
        let ok = r#"{"action":"MULTI_ACTION","actions":[
            {"action":"CREATE_TASK","task":{"title":"Read ch. 4"}},
            {"action":"CLEAR_COMPLETED"}
        ]}"#;
        let plan = parse_plan(ok, today()).unwrap();
        assert!(plan.needs_confirmation());

        let empty = r#"{"action":"MULTI_ACTION","actions":[]}"#;
        assert!(matches!(parse_plan(empty, today()), Err(PlanError::Invalid(_))));

        let nested = r#"{"action":"MULTI_ACTION","actions":[{"action":"MULTI_ACTION","actions":[{"action":"SHOW_ANALYTICS"}]}]}"#;
        assert!(matches!(parse_plan(nested, today()), Err(PlanError::Invalid(_))));
    }

    #[test]
    fn blank_search_criteria_are_rejected() {
        let reply = r#"{"action":"DELETE_MULTIPLE","criteria":{"search":""},"confirmationRequired":true}"#;
        assert!(matches!(parse_plan(reply, today()), Err(PlanError::Invalid(_))));

        let reply = r#"{"action":"UPDATE_MULTIPLE","criteria":{"course":"  "},"updates":{"priority":"high"}}"#;
        assert!(matches!(parse_plan(reply, today()), Err(PlanError::Invalid(_))));
    }

    #[test]
    fn general_response_uses_plan_message() {
        let plan = parse_plan(r#"{"action":"GENERAL_RESPONSE","message":"You're welcome!"}"#, today()).unwrap();
        assert_eq!(plan.action, AgentAction::GeneralResponse);
        assert_eq!(plan.message.as_deref(), Some("You're welcome!"));

        assert!(matches!(
            parse_plan(r#"{"action":"GENERAL_RESPONSE"}"#, today()),
            Err(PlanError::Invalid(_))
        ));
    }

    #[test]
    fn plan_serializes_back_to_contract() {
        let plan = AgentPlan::new(AgentAction::CompleteTask { target: TaskRef::title("Essay") });
        let json = serde_json::to_value(&plan).unwrap();
        assert_eq!(json["action"], "COMPLETE_TASK");
        assert_eq!(json["target"]["title"], "Essay");
        assert_eq!(json["confirmationRequired"], false);
    }
}
