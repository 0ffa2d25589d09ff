use super::todo::RecurrenceRule;
use super::timestamp::Timestamp;

/// Update instruction for an optional field.
///
/// Distinguishes "leave as is" from "remove the value", which a bare
/// `Option<T>` cannot express.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Patch<T> {
    #[default]
    Unchanged,
    Set(T),
    Clear,
}

impl<T> Patch<T> {
    pub fn is_unchanged(&self) -> bool {
        matches!(self, Patch::Unchanged)
    }

    /// Apply to a slot, returning whether the slot was touched
    pub fn apply_to(self, slot: &mut Option<T>) -> bool {
        match self {
            Patch::Unchanged => false,
            Patch::Set(value) => {
                *slot = Some(value);
                true
            }
            Patch::Clear => {
                let had_value = slot.is_some();
                *slot = None;
                had_value
            }
        }
    }
}

/// Field changes for a todo. Unset fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TodoUpdate {
    /// Raw content; trimmed and validated before it is applied
    pub content: Option<String>,
    pub completed: Option<bool>,
    pub due_date: Patch<Timestamp>,
    pub recurrence: Patch<RecurrenceRule>,
}

impl TodoUpdate {
    pub fn content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn completed(mut self, completed: bool) -> Self {
        self.completed = Some(completed);
        self
    }

    pub fn due_date(mut self, due: Patch<Timestamp>) -> Self {
        self.due_date = due;
        self
    }

    pub fn recurrence(mut self, rule: Patch<RecurrenceRule>) -> Self {
        self.recurrence = rule;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_none()
            && self.completed.is_none()
            && self.due_date.is_unchanged()
            && self.recurrence.is_unchanged()
    }
}

/// Field changes for a subtask
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubTaskUpdate {
    pub content: Option<String>,
    pub completed: Option<bool>,
    pub due_date: Patch<Timestamp>,
}

impl SubTaskUpdate {
    pub fn content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn completed(mut self, completed: bool) -> Self {
        self.completed = Some(completed);
        self
    }

    pub fn due_date(mut self, due: Patch<Timestamp>) -> Self {
        self.due_date = due;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_none() && self.completed.is_none() && self.due_date.is_unchanged()
    }
}

/// Changes to the non-sort settings
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SettingsUpdate {
    pub split_ratio: Option<[f64; 2]>,
    pub always_on_top: Option<bool>,
}
