//! Turning raw JSON from disk into a reconciled [`Document`].
//!
//! Input is first classified into one of three shapes. Legacy shapes go
//! through a rename table and default filling; every shape is then decoded
//! record by record so one bad todo never takes the rest of the list down.

use crate::domain::{
    normalize_orders, validate_split_ratio, Document, RecurrenceRule, Settings, SortOrder,
    SubTask, Timestamp, Todo, TodoId, CURRENT_VERSION, DEFAULT_SPLIT_RATIO,
};
use crate::error::{Result, TodoError};
use serde_json::{Map, Value};
use std::collections::HashSet;

/// Legacy field name -> current field name
const RENAMES: &[(&str, &str)] = &[
    ("text", "content"),
    ("created_at", "createdAt"),
    ("due_date", "dueDate"),
    ("position", "order"),
    ("parent_id", "parentId"),
];

/// Fields that no longer exist and are dropped silently
const DROPPED: &[&str] = &["modified_at", "modifiedAt"];

/// Legacy settings key -> current key
const SETTINGS_RENAMES: &[(&str, &str)] = &[
    ("sort_order", "sortOrder"),
    ("split_ratio", "splitRatio"),
    ("always_on_top", "alwaysOnTop"),
];

/// Top-level layout of a document file
#[derive(Debug, Clone, PartialEq)]
pub enum DocumentShape {
    /// Object with a `version` field
    Current(Map<String, Value>),
    /// Bare array of todo records
    LegacyArray(Vec<Value>),
    /// Object without a `version` field
    LegacyObject(Map<String, Value>),
}

impl DocumentShape {
    pub fn is_legacy(&self) -> bool {
        !matches!(self, Self::Current(_))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Current(_) => "current",
            Self::LegacyArray(_) => "legacy-array",
            Self::LegacyObject(_) => "legacy-object",
        }
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Classify raw JSON. Anything other than an array or object is rejected.
pub fn classify(value: Value) -> Result<DocumentShape> {
    match value {
        Value::Array(records) => Ok(DocumentShape::LegacyArray(records)),
        Value::Object(map) if map.contains_key("version") => Ok(DocumentShape::Current(map)),
        Value::Object(map) => Ok(DocumentShape::LegacyObject(map)),
        other => Err(TodoError::MigrationAborted(format!(
            "expected a JSON array or object at the top level, found {}",
            json_type(&other)
        ))),
    }
}

/// What decoding had to change to produce a valid document
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    /// Shape the input was classified as
    pub shape: &'static str,
    /// Records dropped as malformed or duplicate
    pub skipped: usize,
    /// Individual fields defaulted, dropped, renamed or repaired
    pub repaired: usize,
    /// Orders renumbered to be dense
    pub renumbered: bool,
}

impl MigrationReport {
    /// Whether the decoded document differs from what is on disk
    pub fn changed(&self) -> bool {
        self.shape != "current" || self.skipped > 0 || self.repaired > 0 || self.renumbered
    }
}

/// Error for one record; the record is skipped
type FieldResult<T> = std::result::Result<T, String>;

/// Typed access to one record, applying the rename table on the way
struct Record<'a> {
    map: &'a Map<String, Value>,
    repaired: usize,
}

impl<'a> Record<'a> {
    fn new(map: &'a Map<String, Value>) -> Self {
        Self { map, repaired: 0 }
    }

    /// Value under `key`, or under its legacy name. `null` counts as absent.
    fn get(&mut self, key: &str) -> Option<&'a Value> {
        if let Some(value) = self.map.get(key).filter(|v| !v.is_null()) {
            return Some(value);
        }
        let legacy = RENAMES
            .iter()
            .find(|(_, current)| *current == key)
            .map(|(old, _)| *old)?;
        let value = self.map.get(legacy).filter(|v| !v.is_null())?;
        self.repaired += 1;
        Some(value)
    }

    fn id(&mut self) -> FieldResult<TodoId> {
        match self.get("id") {
            Some(Value::String(s)) if !s.trim().is_empty() => Ok(TodoId::from(s.as_str())),
            Some(Value::Number(n)) => {
                self.repaired += 1;
                Ok(TodoId::from(n.to_string()))
            }
            Some(Value::String(_)) | None => Err("missing or empty id".to_string()),
            Some(other) => Err(format!("id must be a string, found {}", json_type(other))),
        }
    }

    fn string(&mut self, key: &str) -> FieldResult<String> {
        match self.get(key) {
            Some(Value::String(s)) => Ok(s.clone()),
            None => {
                self.repaired += 1;
                Ok(String::new())
            }
            Some(other) => Err(format!("{} must be a string, found {}", key, json_type(other))),
        }
    }

    fn bool(&mut self, key: &str) -> FieldResult<bool> {
        match self.get(key) {
            Some(Value::Bool(b)) => Ok(*b),
            None => Ok(false),
            Some(other) => Err(format!("{} must be a boolean, found {}", key, json_type(other))),
        }
    }

    fn order(&mut self, key: &str) -> FieldResult<Option<u32>> {
        let Some(value) = self.get(key) else {
            return Ok(None);
        };
        let parsed = value.as_u64().or_else(|| {
            value
                .as_f64()
                .filter(|f| *f >= 0.0 && f.fract() == 0.0)
                .map(|f| f as u64)
        });
        match parsed {
            Some(n) => Ok(Some(u32::try_from(n).unwrap_or(u32::MAX))),
            None => Err(format!("{} must be a non-negative integer, found {}", key, value)),
        }
    }

    /// Creation time; anything unusable becomes "now"
    fn created_at(&mut self, id: &TodoId) -> Timestamp {
        match self.get("createdAt") {
            Some(Value::String(s)) => match s.parse() {
                Ok(ts) => ts,
                Err(e) => {
                    tracing::warn!(id = %id, error = %e, "unparsable createdAt, using current time");
                    self.repaired += 1;
                    Timestamp::now()
                }
            },
            Some(other) => {
                tracing::warn!(id = %id, found = json_type(other), "createdAt is not a string, using current time");
                self.repaired += 1;
                Timestamp::now()
            }
            None => {
                self.repaired += 1;
                Timestamp::now()
            }
        }
    }

    /// Due date; anything unusable is dropped
    fn due_date(&mut self, id: &TodoId) -> Option<Timestamp> {
        match self.get("dueDate")? {
            Value::String(s) if s.trim().is_empty() => None,
            Value::String(s) => match s.parse() {
                Ok(ts) => Some(ts),
                Err(e) => {
                    tracing::warn!(id = %id, error = %e, "unparsable dueDate dropped");
                    self.repaired += 1;
                    None
                }
            },
            other => {
                tracing::warn!(id = %id, found = json_type(other), "dueDate is not a string, dropped");
                self.repaired += 1;
                None
            }
        }
    }
}

fn decode_subtask(value: &Value, parent: &TodoId, report: &mut MigrationReport) -> FieldResult<SubTask> {
    let Value::Object(map) = value else {
        return Err(format!("subtask must be an object, found {}", json_type(value)));
    };
    let mut record = Record::new(map);
    let id = record.id()?;
    // A wrong reference is kept here so reconcile can report the repair
    let parent_id = match record.get("parentId") {
        Some(Value::String(s)) if !s.trim().is_empty() => TodoId::from(s.as_str()),
        Some(Value::Number(n)) => TodoId::from(n.to_string()),
        _ => {
            record.repaired += 1;
            parent.clone()
        }
    };
    let subtask = SubTask {
        content: record.string("content")?,
        completed: record.bool("completed")?,
        created_at: record.created_at(&id),
        due_date: record.due_date(&id),
        order: record.order("order")?.unwrap_or(0),
        parent_id,
        id,
    };
    report.repaired += record.repaired;
    Ok(subtask)
}

fn decode_todo(value: &Value, report: &mut MigrationReport) -> FieldResult<Todo> {
    let Value::Object(map) = value else {
        return Err(format!("record must be an object, found {}", json_type(value)));
    };
    let mut record = Record::new(map);
    let id = record.id()?;
    let content = record.string("content")?;
    let completed = record.bool("completed")?;
    let created_at = record.created_at(&id);
    let due_date = record.due_date(&id);
    let mut order = record.order("order")?.unwrap_or(0);

    // Obsolete separate manual order: it wins over `order` and is dropped
    if let Some(manual) = record.order("manualOrder")? {
        tracing::debug!(id = %id, from = order, to = manual, "folded manualOrder into order");
        order = manual;
        record.repaired += 1;
    }

    let recurrence = match record.get("recurrence") {
        None => None,
        Some(raw) => match serde_json::from_value::<RecurrenceRule>(raw.clone()) {
            Ok(rule) => Some(rule),
            Err(e) => {
                tracing::warn!(id = %id, error = %e, "invalid recurrence rule dropped");
                record.repaired += 1;
                None
            }
        },
    };

    let mut subtasks = Vec::new();
    match record.get("subtasks") {
        None => {}
        Some(Value::Array(items)) => {
            for (idx, item) in items.iter().enumerate() {
                match decode_subtask(item, &id, report) {
                    Ok(subtask) => subtasks.push(subtask),
                    Err(reason) => {
                        tracing::warn!(parent = %id, index = idx, reason = %reason, "skipping malformed subtask");
                        report.skipped += 1;
                    }
                }
            }
        }
        Some(other) => {
            tracing::warn!(id = %id, found = json_type(other), "subtasks is not an array, ignored");
            record.repaired += 1;
        }
    }

    if DROPPED.iter().any(|key| map.contains_key(*key)) {
        record.repaired += 1;
    }
    report.repaired += record.repaired;

    Ok(Todo {
        id,
        content,
        completed,
        created_at,
        due_date,
        order,
        subtasks,
        recurrence,
    })
}

fn decode_split_ratio(value: &Value) -> Option<[f64; 2]> {
    let parts = value.as_array()?;
    if parts.len() != 2 {
        return None;
    }
    validate_split_ratio([parts[0].as_f64()?, parts[1].as_f64()?]).ok()
}

fn decode_settings(raw: Option<&Value>, report: &mut MigrationReport) -> Settings {
    let mut settings = Settings::default();
    let Some(raw) = raw else {
        return settings;
    };
    let Value::Object(map) = raw else {
        tracing::warn!(found = json_type(raw), "settings is not an object, using defaults");
        report.repaired += 1;
        return settings;
    };

    let mut map = map.clone();
    for (old, new) in SETTINGS_RENAMES {
        if let Some(value) = map.remove(*old) {
            map.entry(new.to_string()).or_insert(value);
            report.repaired += 1;
        }
    }

    if let Some(value) = map.remove("sortOrder") {
        match value.as_str().and_then(SortOrder::from_key) {
            Some(mode) => settings.sort_order = mode,
            None => {
                tracing::warn!(value = %value, "unknown sort order, using default");
                report.repaired += 1;
            }
        }
    }
    if let Some(value) = map.remove("splitRatio") {
        match decode_split_ratio(&value) {
            Some(ratio) => settings.split_ratio = ratio,
            None => {
                tracing::warn!(value = %value, default = ?DEFAULT_SPLIT_RATIO, "invalid split ratio, using default");
                report.repaired += 1;
            }
        }
    }
    if let Some(value) = map.remove("alwaysOnTop") {
        match value.as_bool() {
            Some(on) => settings.always_on_top = on,
            None => {
                tracing::warn!(value = %value, "alwaysOnTop is not a boolean, using default");
                report.repaired += 1;
            }
        }
    }
    settings.extra = map;
    settings
}

/// Decode a classified document and reconcile it
pub fn decode(shape: DocumentShape) -> (Document, MigrationReport) {
    let mut report = MigrationReport {
        shape: shape.name(),
        ..MigrationReport::default()
    };

    let (settings, records) = match &shape {
        DocumentShape::LegacyArray(records) => (Settings::default(), records.as_slice()),
        DocumentShape::Current(map) | DocumentShape::LegacyObject(map) => {
            let settings = decode_settings(map.get("settings"), &mut report);
            let records = match map.get("todos") {
                Some(Value::Array(records)) => records.as_slice(),
                None | Some(Value::Null) => &[],
                Some(other) => {
                    tracing::warn!(found = json_type(other), "todos is not an array, starting empty");
                    report.repaired += 1;
                    &[]
                }
            };
            (settings, records)
        }
    };

    let mut todos = Vec::with_capacity(records.len());
    for (idx, record) in records.iter().enumerate() {
        match decode_todo(record, &mut report) {
            Ok(todo) => todos.push(todo),
            Err(reason) => {
                tracing::warn!(index = idx, reason = %reason, "skipping malformed todo record");
                report.skipped += 1;
            }
        }
    }

    let mut document = Document {
        version: CURRENT_VERSION.to_string(),
        settings,
        todos,
    };
    reconcile(&mut document, &mut report);

    if report.changed() {
        tracing::info!(
            shape = report.shape,
            todos = document.todos.len(),
            skipped = report.skipped,
            repaired = report.repaired,
            renumbered = report.renumbered,
            "document decoded with changes"
        );
    }
    (document, report)
}

/// Parse and decode raw file content
pub fn decode_str(raw: &str) -> Result<(Document, MigrationReport)> {
    let value: Value = serde_json::from_str(raw)?;
    Ok(decode(classify(value)?))
}

/// Restore document invariants: unique ids, correct parent references,
/// dense orders and pending-first storage.
pub fn reconcile(doc: &mut Document, report: &mut MigrationReport) {
    let mut seen: HashSet<TodoId> = HashSet::new();
    let before = doc.todos.len();
    doc.todos.retain(|todo| {
        let fresh = seen.insert(todo.id.clone());
        if !fresh {
            tracing::warn!(id = %todo.id, "duplicate todo id dropped");
        }
        fresh
    });
    report.skipped += before - doc.todos.len();

    for todo in &mut doc.todos {
        let parent = todo.id.clone();
        let before = todo.subtasks.len();
        todo.subtasks.retain(|st| {
            let fresh = seen.insert(st.id.clone());
            if !fresh {
                tracing::warn!(id = %st.id, parent = %parent, "duplicate subtask id dropped");
            }
            fresh
        });
        report.skipped += before - todo.subtasks.len();

        for subtask in &mut todo.subtasks {
            if subtask.parent_id != todo.id {
                tracing::warn!(id = %subtask.id, claimed = %subtask.parent_id, actual = %todo.id, "fixed subtask parent reference");
                subtask.parent_id = todo.id.clone();
                report.repaired += 1;
            }
        }
    }

    if doc.version != CURRENT_VERSION {
        doc.version = CURRENT_VERSION.to_string();
        report.repaired += 1;
    }

    let order_before: Vec<TodoId> = doc.todos.iter().map(|t| t.id.clone()).collect();
    let renumbered = normalize_orders(doc);
    let moved = doc.todos.iter().map(|t| &t.id).ne(order_before.iter());
    report.renumbered = renumbered || moved;
}
