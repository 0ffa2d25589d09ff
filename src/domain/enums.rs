use serde::{Deserialize, Serialize};
use std::fmt;

/// Ordering applied to each section when displayed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SortOrder {
    /// Persisted `order` field only (user drag-and-drop order)
    #[serde(rename = "manual")]
    Manual,
    /// Earliest due date first, undated last
    #[default]
    #[serde(rename = "dueDate_asc")]
    DueDateAsc,
    /// Latest due date first, undated last
    #[serde(rename = "dueDate_desc")]
    DueDateDesc,
    /// Items due today, then the remaining dated items, then undated
    #[serde(rename = "today_first")]
    TodayFirst,
}

impl SortOrder {
    /// Parse from the key stored in the document ("dueDate_asc", ...)
    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "manual" => Some(Self::Manual),
            "dueDate_asc" => Some(Self::DueDateAsc),
            "dueDate_desc" => Some(Self::DueDateDesc),
            "today_first" => Some(Self::TodayFirst),
            _ => None,
        }
    }

    /// Key stored in the document
    pub fn as_key(&self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::DueDateAsc => "dueDate_asc",
            Self::DueDateDesc => "dueDate_desc",
            Self::TodayFirst => "today_first",
        }
    }

    pub fn all() -> &'static [SortOrder] {
        &[
            SortOrder::Manual,
            SortOrder::DueDateAsc,
            SortOrder::DueDateDesc,
            SortOrder::TodayFirst,
        ]
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_key())
    }
}

/// The two independently ordered sections of the list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Section {
    Pending,
    Completed,
}

impl Section {
    /// Section a todo belongs to given its completion flag
    pub fn of(completed: bool) -> Self {
        if completed {
            Self::Completed
        } else {
            Self::Pending
        }
    }

    pub fn opposite(&self) -> Self {
        match self {
            Self::Pending => Self::Completed,
            Self::Completed => Self::Pending,
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "pending" | "in_progress" | "todo" => Some(Self::Pending),
            "completed" | "done" => Some(Self::Completed),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
        }
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Recurrence frequency
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
}

impl Frequency {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "daily" => Some(Self::Daily),
            "weekly" => Some(Self::Weekly),
            "monthly" => Some(Self::Monthly),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
        }
    }
}

/// Due-date urgency bucket relative to a reference day
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DueStatus {
    /// 14 or more days past due
    OverdueSevere,
    /// 7 to 13 days past due
    OverdueModerate,
    /// 1 to 6 days past due
    OverdueMild,
    Today,
    /// Due within the next 10 days
    Upcoming,
    Normal,
}

impl DueStatus {
    /// Bucket for a signed day distance (negative = overdue)
    pub fn from_days(days: i64) -> Self {
        match days {
            d if d <= -14 => Self::OverdueSevere,
            d if d <= -7 => Self::OverdueModerate,
            d if d < 0 => Self::OverdueMild,
            0 => Self::Today,
            d if d <= 10 => Self::Upcoming,
            _ => Self::Normal,
        }
    }

    pub fn is_overdue(&self) -> bool {
        matches!(
            self,
            Self::OverdueSevere | Self::OverdueModerate | Self::OverdueMild
        )
    }
}
