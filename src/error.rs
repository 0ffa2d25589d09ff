use crate::domain::{Section, TodoId};
use std::path::PathBuf;

/// Input rejected before any mutation is applied
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("content cannot be empty or whitespace only")]
    EmptyContent,
    #[error("content must not exceed {max} characters (got {len})")]
    ContentTooLong { len: usize, max: usize },
    #[error("{0}")]
    InvalidDate(#[from] crate::domain::TimestampParseError),
    #[error("invalid recurrence: {0}")]
    InvalidRecurrence(String),
    #[error("invalid split ratio {0}: both parts must be positive numbers")]
    InvalidSplitRatio(String),
    #[error("duplicate id in document: {0}")]
    DuplicateId(TodoId),
    #[error("subtask {subtask} references parent {claimed} but belongs to {actual}")]
    ParentMismatch {
        subtask: TodoId,
        claimed: TodoId,
        actual: TodoId,
    },
}

/// Error type for repository, store and migration operations
#[derive(Debug, thiserror::Error)]
pub enum TodoError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("todo not found: {0}")]
    NotFound(String),
    #[error("subtask {subtask} not found under todo {parent}")]
    SubTaskNotFound { parent: TodoId, subtask: String },
    #[error("id prefix '{0}' matches more than one todo")]
    AmbiguousId(String),
    #[error("todo {id} is in the {actual} section, not {expected}")]
    WrongSection {
        id: TodoId,
        expected: Section,
        actual: Section,
    },
    #[error("invalid reorder: {0}")]
    InvalidReorder(String),
    #[error("could not access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("failed to save {path} after {attempts} attempts: {source}")]
    WriteFailed {
        path: PathBuf,
        attempts: u32,
        #[source]
        source: std::io::Error,
    },
    #[error("{path} is corrupt and no valid backup was found: {reason}")]
    Corrupt { path: PathBuf, reason: String },
    #[error("migration aborted, original file left untouched: {0}")]
    MigrationAborted(String),
    #[error("backup not found: {0}")]
    BackupNotFound(String),
}

impl TodoError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, TodoError>;
