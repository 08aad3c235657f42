//! Task predicates shared by the list endpoint, bulk operations and the
//! assistant. Every set field is an independent predicate; a task matches
//! when all of them hold.

use crate::world::{Priority, Task, TaskStatus};
use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};

/// Today's date in the server's local timezone.
pub fn local_today() -> NaiveDate {
    Local::now().date_naive()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TaskFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub course: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub starred: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overdue: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub today: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub this_week: Option<bool>,
    /// Inclusive upper bound on the due date.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_before: Option<NaiveDate>,
    /// Inclusive lower bound on the due date.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_after: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
    /// Task must carry every listed tag.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ids: Option<Vec<String>>,
}

impl TaskFilter {
    /// True when the filter would select every task. Blank text fields
    /// count as unset.
    pub fn is_empty(&self) -> bool {
        self.clone().normalized() == TaskFilter::default()
    }

    /// Trim text fields and drop the blank ones, so a filter of only blank
    /// strings is empty.
    pub fn normalized(mut self) -> Self {
        fn non_blank(value: Option<String>) -> Option<String> {
            value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
        }
        self.course = non_blank(self.course);
        self.search = non_blank(self.search);
        self.tags = self
            .tags
            .into_iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();
        self
    }

    pub fn matches(&self, task: &Task, today: NaiveDate) -> bool {
        if let Some(course) = &self.course {
            if !task.course.trim().eq_ignore_ascii_case(course.trim()) {
                return false;
            }
        }
        if self.priority.is_some_and(|p| task.priority != p) {
            return false;
        }
        if self.status.is_some_and(|s| task.status != s) {
            return false;
        }
        if self.completed.is_some_and(|c| task.completed != c) {
            return false;
        }
        if self.starred.is_some_and(|s| task.starred != s) {
            return false;
        }
        if self.overdue.is_some_and(|o| task.is_overdue(today) != o) {
            return false;
        }
        if self.today.is_some_and(|t| (task.due_date == today) != t) {
            return false;
        }
        if self.this_week.is_some_and(|w| task.is_due_this_week(today) != w) {
            return false;
        }
        if self.due_before.is_some_and(|d| task.due_date > d) {
            return false;
        }
        if self.due_after.is_some_and(|d| task.due_date < d) {
            return false;
        }
        if let Some(needle) = &self.search {
            if !matches_text(task, needle) {
                return false;
            }
        }
        if !self
            .tags
            .iter()
            .all(|tag| task.tags.iter().any(|t| t.eq_ignore_ascii_case(tag)))
        {
            return false;
        }
        if let Some(ids) = &self.ids {
            if !ids.contains(&task.id) {
                return false;
            }
        }
        true
    }

    /// Short human description, used in assistant replies.
    pub fn describe(&self) -> String {
        let mut parts = Vec::new();
        if let Some(p) = self.priority {
            parts.push(format!("{} priority", p.as_str()));
        }
        if let Some(s) = self.status {
            parts.push(format!("status {}", s.as_str()));
        }
        match self.completed {
            Some(true) => parts.push("completed".to_string()),
            Some(false) => parts.push("not completed".to_string()),
            None => {}
        }
        if self.starred == Some(true) {
            parts.push("starred".to_string());
        }
        if self.overdue == Some(true) {
            parts.push("overdue".to_string());
        }
        if self.today == Some(true) {
            parts.push("due today".to_string());
        }
        if self.this_week == Some(true) {
            parts.push("due this week".to_string());
        }
        if let Some(c) = &self.course {
            parts.push(format!("in {c}"));
        }
        if let Some(q) = &self.search {
            parts.push(format!("matching \"{q}\""));
        }
        if !self.tags.is_empty() {
            parts.push(format!("tagged {}", self.tags.join(", ")));
        }
        if parts.is_empty() {
            "all tasks".to_string()
        } else {
            parts.join(", ")
        }
    }
}

/// Case-insensitive substring search over title, description, course and tags.
pub fn matches_text(task: &Task, needle: &str) -> bool {
    let needle = needle.trim().to_lowercase();
    if needle.is_empty() {
        return true;
    }
    task.title.to_lowercase().contains(&needle)
        || task
            .description
            .as_deref()
            .is_some_and(|d| d.to_lowercase().contains(&needle))
        || task.course.to_lowercase().contains(&needle)
        || task.tags.iter().any(|t| t.to_lowercase().contains(&needle))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn task(id: &str, title: &str, due: &str) -> Task {
        Task {
            id: id.into(),
            title: title.into(),
            description: None,
            due_date: day(due),
            due_time: None,
            priority: Priority::Medium,
            status: TaskStatus::Pending,
            course: "General".into(),
            tags: Vec::new(),
            completed: false,
            starred: false,
        }
    }

    const TODAY: &str = "2026-02-11";

    #[test]
    fn empty_filter_matches_everything() {
        let f = TaskFilter::default();
        assert!(f.is_empty());
        assert!(f.matches(&task("1", "x", "1999-01-01"), day(TODAY)));
    }

    #[test]
    fn blank_text_fields_do_not_make_a_filter() {
        let f = TaskFilter { search: Some("  ".into()), course: Some(String::new()), tags: vec![" ".into()], ..TaskFilter::default() };
        assert!(f.is_empty());
        assert_eq!(f.normalized(), TaskFilter::default());

        let f = TaskFilter { search: Some(" lab ".into()), ..TaskFilter::default() };
        assert!(!f.is_empty());
        assert_eq!(f.normalized().search.as_deref(), Some("lab"));
    }

    #[test]
    fn overdue_means_past_and_open() {
        let f = TaskFilter { overdue: Some(true), ..TaskFilter::default() };
        let mut late = task("1", "late", "2026-02-10");
        assert!(f.matches(&late, day(TODAY)));

        late.completed = true;
        assert!(!f.matches(&late, day(TODAY)));

        assert!(!f.matches(&task("2", "today", TODAY), day(TODAY)));
    }

    #[test]
    fn this_week_is_a_seven_day_window() {
        let f = TaskFilter { this_week: Some(true), ..TaskFilter::default() };
        assert!(f.matches(&task("1", "a", TODAY), day(TODAY)));
        assert!(f.matches(&task("2", "b", "2026-02-17"), day(TODAY)));
        assert!(!f.matches(&task("3", "c", "2026-02-18"), day(TODAY)));
        assert!(!f.matches(&task("4", "d", "2026-02-10"), day(TODAY)));
    }

    #[test]
    fn predicates_are_conjunctive() {
        let mut t = task("1", "Calculus problem set", "2026-02-12");
        t.priority = Priority::High;
        t.course = "Mathematics".into();

        let f = TaskFilter {
            priority: Some(Priority::High),
            course: Some("mathematics".into()),
            search: Some("PROBLEM".into()),
            ..TaskFilter::default()
        };
        assert!(f.matches(&t, day(TODAY)));

        let f = TaskFilter { starred: Some(true), ..f };
        assert!(!f.matches(&t, day(TODAY)));
    }

    #[test]
    fn search_looks_at_description_and_tags() {
        let mut t = task("1", "Reading", TODAY);
        t.description = Some("Chapter on Thermodynamics".into());
        t.tags = vec!["exam-prep".into()];

        assert!(matches_text(&t, "thermo"));
        assert!(matches_text(&t, "EXAM"));
        assert!(!matches_text(&t, "biology"));
    }

    #[test]
    fn tags_must_all_be_present() {
        let mut t = task("1", "Lab", TODAY);
        t.tags = vec!["lab".into(), "group".into()];
        let f = TaskFilter { tags: vec!["LAB".into(), "group".into()], ..TaskFilter::default() };
        assert!(f.matches(&t, day(TODAY)));
        let f = TaskFilter { tags: vec!["lab".into(), "solo".into()], ..TaskFilter::default() };
        assert!(!f.matches(&t, day(TODAY)));
    }

    #[test]
    fn criteria_deserialize_from_camel_case() {
        let f: TaskFilter =
            serde_json::from_str(r#"{"priority":"high","thisWeek":true,"dueBefore":"2026-03-01"}"#).unwrap();
        assert_eq!(f.priority, Some(Priority::High));
        assert_eq!(f.this_week, Some(true));
        assert_eq!(f.due_before, Some(day("2026-03-01")));
        assert_eq!(f.describe(), "high priority, due this week");
    }
}
