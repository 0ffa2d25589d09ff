use super::enums::{DueStatus, Frequency, Section};
use super::timestamp::Timestamp;
use crate::error::ValidationError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use uuid::Uuid;

/// Maximum content length in characters after trimming
pub const MAX_CONTENT_LEN: usize = 1000;

/// Opaque identifier shared by todos and subtasks.
///
/// New ids are UUID v4 strings; ids read from disk are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TodoId(String);

impl TodoId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 8 characters, for log lines and compact listings
    pub fn short(&self) -> &str {
        let end = self
            .0
            .char_indices()
            .nth(8)
            .map(|(i, _)| i)
            .unwrap_or(self.0.len());
        &self.0[..end]
    }
}

impl From<&str> for TodoId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for TodoId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for TodoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Trim and validate user-entered content
pub fn validate_content(raw: &str) -> Result<String, ValidationError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptyContent);
    }
    let len = trimmed.chars().count();
    if len > MAX_CONTENT_LEN {
        return Err(ValidationError::ContentTooLong {
            len,
            max: MAX_CONTENT_LEN,
        });
    }
    Ok(trimmed.to_string())
}

/// Urgency of a due date relative to `today`
pub fn due_status(due: &Timestamp, today: NaiveDate) -> DueStatus {
    DueStatus::from_days(due.days_from(today))
}

/// Human label such as "3 days left", "today", "2 days overdue"
pub fn due_label(due: &Timestamp, today: NaiveDate) -> String {
    match due.days_from(today) {
        0 => "today".to_string(),
        1 => "1 day left".to_string(),
        -1 => "1 day overdue".to_string(),
        d if d > 0 => format!("{} days left", d),
        d => format!("{} days overdue", -d),
    }
}

/// Rule for generating the next instance of a completed todo
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecurrenceRule {
    pub frequency: Frequency,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<Timestamp>,
    /// 0 = Monday .. 6 = Sunday, weekly rules only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weekdays: Option<BTreeSet<u8>>,
    #[serde(default)]
    pub copy_subtasks: bool,
}

impl RecurrenceRule {
    /// Build a rule from user input, rejecting inconsistent combinations.
    ///
    /// `today` is the reference day for rejecting end dates in the past.
    pub fn new(
        frequency: Frequency,
        end_date: Option<Timestamp>,
        weekdays: Option<Vec<u8>>,
        copy_subtasks: bool,
        today: NaiveDate,
    ) -> Result<Self, ValidationError> {
        if let Some(end) = end_date {
            if end.local_date() < today {
                return Err(ValidationError::InvalidRecurrence(
                    "end date cannot be in the past".to_string(),
                ));
            }
        }

        let weekdays = match weekdays {
            None => None,
            Some(days) => {
                if frequency != Frequency::Weekly {
                    return Err(ValidationError::InvalidRecurrence(
                        "weekdays can only be used with weekly frequency".to_string(),
                    ));
                }
                if days.is_empty() {
                    return Err(ValidationError::InvalidRecurrence(
                        "weekdays cannot be empty".to_string(),
                    ));
                }
                if let Some(bad) = days.iter().find(|d| **d > 6) {
                    return Err(ValidationError::InvalidRecurrence(format!(
                        "weekday {} is out of range (0 = Monday .. 6 = Sunday)",
                        bad
                    )));
                }
                Some(days.into_iter().collect())
            }
        };

        Ok(Self {
            frequency,
            end_date,
            weekdays,
            copy_subtasks,
        })
    }

    pub fn describe(&self) -> String {
        const NAMES: [&str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];
        let mut text = self.frequency.name().to_string();
        if let Some(days) = &self.weekdays {
            let names: Vec<&str> = days
                .iter()
                .filter_map(|d| NAMES.get(*d as usize).copied())
                .collect();
            text.push_str(&format!(" ({})", names.join(", ")));
        }
        if let Some(end) = &self.end_date {
            text.push_str(&format!(" until {}", end.local_date()));
        }
        if self.copy_subtasks {
            text.push_str(" [copy subtasks]");
        }
        text
    }
}

/// A one-level child of a todo
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubTask {
    pub id: TodoId,
    pub content: String,
    #[serde(default)]
    pub completed: bool,
    pub created_at: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<Timestamp>,
    #[serde(default)]
    pub order: u32,
    pub parent_id: TodoId,
}

impl SubTask {
    pub fn new(parent_id: TodoId, content: String, order: u32) -> Self {
        Self {
            id: TodoId::generate(),
            content,
            completed: false,
            created_at: Timestamp::now(),
            due_date: None,
            order,
            parent_id,
        }
    }

    pub fn toggle_complete(&mut self) {
        self.completed = !self.completed;
    }
}

/// A top-level to-do item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Todo {
    pub id: TodoId,
    pub content: String,
    #[serde(default)]
    pub completed: bool,
    pub created_at: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<Timestamp>,
    #[serde(default)]
    pub order: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subtasks: Vec<SubTask>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recurrence: Option<RecurrenceRule>,
}

impl Todo {
    pub fn new(content: String, due_date: Option<Timestamp>, order: u32) -> Self {
        Self {
            id: TodoId::generate(),
            content,
            completed: false,
            created_at: Timestamp::now(),
            due_date,
            order,
            subtasks: Vec::new(),
            recurrence: None,
        }
    }

    pub fn section(&self) -> Section {
        Section::of(self.completed)
    }

    /// Append a subtask, fixing its parent reference and order
    pub fn add_subtask(&mut self, mut subtask: SubTask) {
        subtask.parent_id = self.id.clone();
        subtask.order = self.subtasks.len() as u32;
        self.subtasks.push(subtask);
    }

    pub fn find_subtask_mut(&mut self, id: &TodoId) -> Option<&mut SubTask> {
        self.subtasks.iter_mut().find(|st| &st.id == id)
    }

    /// Remove a subtask and close the gap in sibling orders
    pub fn remove_subtask(&mut self, id: &TodoId) -> Option<SubTask> {
        let idx = self.subtasks.iter().position(|st| &st.id == id)?;
        let removed = self.subtasks.remove(idx);
        self.renumber_subtasks();
        Some(removed)
    }

    /// Sort subtasks by their order and make orders dense
    pub fn renumber_subtasks(&mut self) -> bool {
        self.subtasks.sort_by_key(|st| st.order);
        let mut changed = false;
        for (idx, subtask) in self.subtasks.iter_mut().enumerate() {
            if subtask.order != idx as u32 {
                subtask.order = idx as u32;
                changed = true;
            }
        }
        changed
    }

    pub fn completed_subtask_count(&self) -> usize {
        self.subtasks.iter().filter(|st| st.completed).count()
    }

    pub fn due_status(&self, today: NaiveDate) -> Option<DueStatus> {
        self.due_date.as_ref().map(|due| due_status(due, today))
    }

    pub fn is_due_on(&self, day: NaiveDate) -> bool {
        self.due_date.map(|d| d.local_date() == day).unwrap_or(false)
    }
}
