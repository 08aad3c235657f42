//! Request validation helpers.
//!
//! Errors are collected into a flattened tree (`formErrors` + `fieldErrors`)
//! so a single 400 response can report every problem at once.

use chrono::NaiveDate;
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::OnceLock;

static DUE_DATE_REGEX: OnceLock<Regex> = OnceLock::new();

fn due_date_regex() -> &'static Regex {
    DUE_DATE_REGEX.get_or_init(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("static regex"))
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationErrors {
    pub form_errors: Vec<String>,
    pub field_errors: BTreeMap<String, Vec<String>>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn form(message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.push_form(message);
        errors
    }

    pub fn field(field: &str, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.push_field(field, message);
        errors
    }

    pub fn push_form(&mut self, message: impl Into<String>) {
        self.form_errors.push(message.into());
    }

    pub fn push_field(&mut self, field: &str, message: impl Into<String>) {
        self.field_errors
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.form_errors.is_empty() && self.field_errors.is_empty()
    }

    /// `Ok(value)` when nothing was recorded, otherwise the collected errors.
    pub fn into_result<T>(self, value: T) -> Result<T, ValidationErrors> {
        if self.is_empty() {
            Ok(value)
        } else {
            Err(self)
        }
    }

    /// First message, for places that can only show one line.
    pub fn summary(&self) -> String {
        if let Some(msg) = self.form_errors.first() {
            return msg.clone();
        }
        self.field_errors
            .iter()
            .next()
            .and_then(|(field, msgs)| msgs.first().map(|m| format!("{field}: {m}")))
            .unwrap_or_else(|| "invalid input".to_string())
    }
}

impl std::fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.summary())
    }
}

/// Parse a due date. Only the exact `YYYY-MM-DD` shape is accepted.
pub fn parse_due_date(raw: &str) -> Result<NaiveDate, String> {
    if !due_date_regex().is_match(raw) {
        return Err("Due date must be in YYYY-MM-DD format".to_string());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| format!("{raw} is not a calendar date"))
}

/// Trimmed, non-empty title.
pub fn clean_title(raw: &str) -> Result<String, String> {
    let title = raw.trim();
    if title.is_empty() {
        return Err("Title is required".to_string());
    }
    Ok(title.to_string())
}

/// Trim tags and drop empty / duplicate ones, keeping first-seen order.
pub fn clean_tags(raw: Vec<String>) -> Vec<String> {
    let mut tags: Vec<String> = Vec::with_capacity(raw.len());
    for tag in raw {
        let tag = tag.trim();
        if !tag.is_empty() && !tags.iter().any(|t| t == tag) {
            tags.push(tag.to_string());
        }
    }
    tags
}
