use super::enums::{Section, SortOrder};
use super::todo::{Todo, TodoId};
use crate::error::ValidationError;
use serde::ser::SerializeTuple;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::HashSet;

/// Schema version written to every document
pub const CURRENT_VERSION: &str = "1.0";

/// Pending section maximised by default
pub const DEFAULT_SPLIT_RATIO: [f64; 2] = [9.0, 1.0];

fn default_split_ratio() -> [f64; 2] {
    DEFAULT_SPLIT_RATIO
}

/// Whole parts are written as integers so `[9, 1]` stays `[9, 1]` and
/// fractions such as `[0.75, 0.25]` are written back as they were read.
fn serialize_split_ratio<S: Serializer>(ratio: &[f64; 2], serializer: S) -> Result<S::Ok, S::Error> {
    let mut tuple = serializer.serialize_tuple(2)?;
    for part in ratio {
        if part.fract() == 0.0 && *part >= 0.0 && *part <= u32::MAX as f64 {
            tuple.serialize_element(&(*part as u32))?;
        } else {
            tuple.serialize_element(part)?;
        }
    }
    tuple.end()
}

/// User settings stored alongside the todos
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(default)]
    pub sort_order: SortOrder,
    #[serde(default = "default_split_ratio", serialize_with = "serialize_split_ratio")]
    pub split_ratio: [f64; 2],
    #[serde(default)]
    pub always_on_top: bool,
    /// Keys written by other versions, carried through untouched
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            sort_order: SortOrder::default(),
            split_ratio: DEFAULT_SPLIT_RATIO,
            always_on_top: false,
            extra: Map::new(),
        }
    }
}

/// Both parts must be finite and positive; integers and fractions both work
pub fn validate_split_ratio(ratio: [f64; 2]) -> Result<[f64; 2], ValidationError> {
    if ratio.iter().all(|part| part.is_finite() && *part > 0.0) {
        return Ok(ratio);
    }
    Err(ValidationError::InvalidSplitRatio(format!("{}:{}", ratio[0], ratio[1])))
}

/// The whole persisted structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub version: String,
    #[serde(default)]
    pub settings: Settings,
    #[serde(default)]
    pub todos: Vec<Todo>,
}

impl Default for Document {
    fn default() -> Self {
        Self {
            version: CURRENT_VERSION.to_string(),
            settings: Settings::default(),
            todos: Vec::new(),
        }
    }
}

impl Document {
    pub fn find(&self, id: &TodoId) -> Option<&Todo> {
        self.todos.iter().find(|t| &t.id == id)
    }

    pub fn find_mut(&mut self, id: &TodoId) -> Option<&mut Todo> {
        self.todos.iter_mut().find(|t| &t.id == id)
    }

    pub fn position(&self, id: &TodoId) -> Option<usize> {
        self.todos.iter().position(|t| &t.id == id)
    }

    /// Todos of one section in persisted order
    pub fn section(&self, section: Section) -> Vec<&Todo> {
        let mut todos: Vec<&Todo> = self
            .todos
            .iter()
            .filter(|t| t.section() == section)
            .collect();
        todos.sort_by_key(|t| t.order);
        todos
    }

    /// Order value that places a new item at the end of a section
    pub fn next_order(&self, section: Section) -> u32 {
        self.todos
            .iter()
            .filter(|t| t.section() == section)
            .map(|t| t.order + 1)
            .max()
            .unwrap_or(0)
    }

    /// Whether any todo or subtask already uses this id
    pub fn contains_id(&self, id: &TodoId) -> bool {
        self.todos
            .iter()
            .any(|t| &t.id == id || t.subtasks.iter().any(|st| &st.id == id))
    }

    pub fn pending_count(&self) -> usize {
        self.todos.iter().filter(|t| !t.completed).count()
    }

    /// Check identity and parent invariants of a caller-supplied document
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut seen = HashSet::new();
        for todo in &self.todos {
            if !seen.insert(&todo.id) {
                return Err(ValidationError::DuplicateId(todo.id.clone()));
            }
            for subtask in &todo.subtasks {
                if !seen.insert(&subtask.id) {
                    return Err(ValidationError::DuplicateId(subtask.id.clone()));
                }
                if subtask.parent_id != todo.id {
                    return Err(ValidationError::ParentMismatch {
                        subtask: subtask.id.clone(),
                        claimed: subtask.parent_id.clone(),
                        actual: todo.id.clone(),
                    });
                }
            }
        }
        validate_split_ratio(self.settings.split_ratio)?;
        Ok(())
    }
}
