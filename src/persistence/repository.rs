use super::backup::BackupEntry;
use super::debounce::DebounceCoordinator;
use super::files::StorePaths;
use super::store::{DocumentStore, LoadSource, Loaded};
use crate::config::Config;
use crate::domain::{
    self, arrange, normalize_orders, split_sections, successor, validate_content,
    validate_split_ratio, Document, Section, Settings, SettingsUpdate, SortOrder, SubTask,
    SubTaskUpdate, Timestamp, Todo, TodoId, TodoUpdate, CURRENT_VERSION,
};
use crate::error::{Result, TodoError};
use chrono::{Local, NaiveDate};
use parking_lot::{Mutex, MutexGuard};
use std::collections::HashSet;
use std::sync::Arc;

fn today() -> NaiveDate {
    Local::now().date_naive()
}

/// The in-memory document and the only way to change it.
///
/// Every mutation runs under one lock: validate, apply, then hand a snapshot
/// to the debounce coordinator (or write it immediately for drag-and-drop and
/// whole-document saves). A failed write never rolls back the in-memory
/// change; the snapshot stays queued and is retried by the next write or
/// [`TodoRepository::flush`].
pub struct TodoRepository {
    store: Arc<DocumentStore>,
    state: Mutex<Document>,
    writer: DebounceCoordinator,
}

impl TodoRepository {
    /// Load the document under `paths` and start the write worker
    pub fn open(paths: StorePaths, config: &Config) -> Result<Self> {
        paths.ensure()?;
        let root = paths.root().to_path_buf();
        let store = Arc::new(DocumentStore::new(paths, config));
        let loaded = store.load()?;
        log_load(&loaded);

        let writer = DebounceCoordinator::new(store.clone(), config.debounce())
            .map_err(|e| TodoError::io(root, e))?;
        if loaded.needs_write {
            writer.schedule("reconcile", loaded.document.clone());
        }

        Ok(Self {
            store,
            state: Mutex::new(loaded.document),
            writer,
        })
    }

    pub fn paths(&self) -> &StorePaths {
        self.store.paths()
    }

    fn lock(&self) -> MutexGuard<'_, Document> {
        self.state.lock()
    }

    /// Write pending changes, then re-read the document from disk
    pub fn load(&self) -> Result<Document> {
        let mut doc = self.lock();
        self.writer.flush()?;
        let loaded = self.store.load()?;
        log_load(&loaded);
        if loaded.needs_write {
            self.writer.schedule("reconcile", loaded.document.clone());
        }
        *doc = loaded.document;
        Ok(doc.clone())
    }

    /// Replace the whole document and write it immediately
    pub fn save(&self, document: Document) -> Result<()> {
        document.validate()?;
        let mut document = document;
        document.version = CURRENT_VERSION.to_string();
        normalize_orders(&mut document);

        let mut doc = self.lock();
        *doc = document;
        self.writer.write_now("save", doc.clone())
    }

    /// Snapshot of the current in-memory document
    pub fn document(&self) -> Document {
        self.lock().clone()
    }

    pub fn create(&self, content: &str, due_date: Option<Timestamp>) -> Result<Todo> {
        let content = validate_content(content)?;
        let mut doc = self.lock();

        let order = doc.next_order(Section::Pending);
        let mut todo = Todo::new(content, due_date, order);
        while doc.contains_id(&todo.id) {
            todo.id = TodoId::generate();
        }
        doc.todos.push(todo.clone());
        arrange(&mut doc);

        tracing::info!(id = %todo.id.short(), order, "created todo");
        self.writer.schedule(format!("create:{}", todo.id.short()), doc.clone());
        Ok(todo)
    }

    /// Apply field changes. Changing `completed` moves the todo to the end of
    /// the other section; completing a recurring todo spawns its successor.
    pub fn update(&self, id: &TodoId, update: TodoUpdate) -> Result<Todo> {
        let content = update.content.as_deref().map(validate_content).transpose()?;
        let mut doc = self.lock();
        let todo = apply_update(&mut doc, id, content, update)?;
        self.writer.schedule(format!("update:{}", id.short()), doc.clone());
        Ok(todo)
    }

    /// Flip completion, the checkbox shortcut for [`TodoRepository::update`]
    pub fn toggle(&self, id: &TodoId) -> Result<Todo> {
        let mut doc = self.lock();
        let completed = doc
            .find(id)
            .map(|t| t.completed)
            .ok_or_else(|| TodoError::NotFound(id.to_string()))?;
        let todo = apply_update(&mut doc, id, None, TodoUpdate::default().completed(!completed))?;
        self.writer.schedule(format!("toggle:{}", id.short()), doc.clone());
        Ok(todo)
    }

    pub fn delete(&self, id: &TodoId) -> Result<Todo> {
        let mut doc = self.lock();
        let idx = doc
            .position(id)
            .ok_or_else(|| TodoError::NotFound(id.to_string()))?;
        let removed = doc.todos.remove(idx);
        normalize_orders(&mut doc);

        tracing::info!(id = %id.short(), subtasks = removed.subtasks.len(), "deleted todo");
        self.writer.schedule(format!("delete:{}", id.short()), doc.clone());
        Ok(removed)
    }

    /// Set a section's order to `ordered_ids` (exactly that section's todos)
    /// and switch to manual sorting. Written before returning.
    pub fn reorder(&self, section: Section, ordered_ids: &[TodoId]) -> Result<()> {
        let mut doc = self.lock();
        let mut next = doc.clone();
        domain::reorder_section(&mut next, section, ordered_ids)?;
        *doc = next;
        tracing::info!(section = %section, count = ordered_ids.len(), "reordered section");
        self.writer.write_now(format!("reorder:{}", section), doc.clone())
    }

    /// Drag one todo to `position` within its section. Written before
    /// returning; yields the position it landed at.
    pub fn move_todo(&self, id: &TodoId, section: Section, position: usize) -> Result<usize> {
        let mut doc = self.lock();
        let mut next = doc.clone();
        let landed = domain::move_within_section(&mut next, id, section, position)?;
        *doc = next;
        self.writer.write_now(format!("move:{}", id.short()), doc.clone())?;
        Ok(landed)
    }

    /// Sort both sections by `mode`, persist that order and keep the mode
    pub fn set_sort_mode(&self, mode: SortOrder) -> Result<usize> {
        let mut doc = self.lock();
        let updated = domain::apply_sort_mode(&mut doc, mode, today());
        self.writer.schedule("sort", doc.clone());
        Ok(updated)
    }

    /// (pending, completed), each sorted by the active mode
    pub fn sections(&self) -> (Vec<Todo>, Vec<Todo>) {
        let doc = self.lock();
        let (pending, completed) = split_sections(&doc, doc.settings.sort_order, today());
        (
            pending.into_iter().cloned().collect(),
            completed.into_iter().cloned().collect(),
        )
    }

    pub fn get(&self, id: &TodoId) -> Result<Todo> {
        self.lock()
            .find(id)
            .cloned()
            .ok_or_else(|| TodoError::NotFound(id.to_string()))
    }

    /// Resolve a full id or a unique prefix of one
    pub fn resolve_id(&self, prefix: &str) -> Result<TodoId> {
        let doc = self.lock();
        resolve(doc.todos.iter().map(|t| &t.id), prefix)
    }

    /// Resolve a subtask id or prefix among `parent`'s subtasks
    pub fn resolve_subtask_id(&self, parent: &TodoId, prefix: &str) -> Result<TodoId> {
        let doc = self.lock();
        let todo = doc
            .find(parent)
            .ok_or_else(|| TodoError::NotFound(parent.to_string()))?;
        resolve(todo.subtasks.iter().map(|st| &st.id), prefix).map_err(|e| match e {
            TodoError::NotFound(_) => TodoError::SubTaskNotFound {
                parent: parent.clone(),
                subtask: prefix.to_string(),
            },
            other => other,
        })
    }

    /// Todos whose content or subtasks contain `query`, case-insensitively
    pub fn search(&self, query: &str) -> Vec<Todo> {
        let doc = self.lock();
        domain::search(&doc, query)
            .into_iter()
            .map(|hit| hit.todo.clone())
            .collect()
    }

    pub fn settings(&self) -> Settings {
        self.lock().settings.clone()
    }

    pub fn update_settings(&self, update: SettingsUpdate) -> Result<Settings> {
        let ratio = update.split_ratio.map(validate_split_ratio).transpose()?;
        let mut doc = self.lock();
        if let Some(ratio) = ratio {
            doc.settings.split_ratio = ratio;
        }
        if let Some(on) = update.always_on_top {
            doc.settings.always_on_top = on;
        }
        let settings = doc.settings.clone();
        self.writer.schedule("settings", doc.clone());
        Ok(settings)
    }

    pub fn add_subtask(&self, parent: &TodoId, content: &str) -> Result<SubTask> {
        let content = validate_content(content)?;
        let mut doc = self.lock();
        let mut subtask = SubTask::new(parent.clone(), content, 0);
        while doc.contains_id(&subtask.id) {
            subtask.id = TodoId::generate();
        }
        let todo = doc
            .find_mut(parent)
            .ok_or_else(|| TodoError::NotFound(parent.to_string()))?;
        todo.add_subtask(subtask);
        let added = todo
            .subtasks
            .last()
            .cloned()
            .ok_or_else(|| TodoError::NotFound(parent.to_string()))?;

        tracing::info!(parent = %parent.short(), id = %added.id.short(), "added subtask");
        self.writer.schedule(format!("subtask:{}", parent.short()), doc.clone());
        Ok(added)
    }

    pub fn update_subtask(&self, parent: &TodoId, id: &TodoId, update: SubTaskUpdate) -> Result<SubTask> {
        let content = update.content.as_deref().map(validate_content).transpose()?;
        let mut doc = self.lock();
        let subtask = find_subtask(&mut doc, parent, id)?;
        if let Some(content) = content {
            subtask.content = content;
        }
        if let Some(completed) = update.completed {
            subtask.completed = completed;
        }
        update.due_date.apply_to(&mut subtask.due_date);
        let updated = subtask.clone();

        self.writer.schedule(format!("subtask:{}", parent.short()), doc.clone());
        Ok(updated)
    }

    pub fn toggle_subtask(&self, parent: &TodoId, id: &TodoId) -> Result<SubTask> {
        let mut doc = self.lock();
        let subtask = find_subtask(&mut doc, parent, id)?;
        subtask.toggle_complete();
        let toggled = subtask.clone();

        self.writer.schedule(format!("subtask:{}", parent.short()), doc.clone());
        Ok(toggled)
    }

    pub fn delete_subtask(&self, parent: &TodoId, id: &TodoId) -> Result<SubTask> {
        let mut doc = self.lock();
        let todo = doc
            .find_mut(parent)
            .ok_or_else(|| TodoError::NotFound(parent.to_string()))?;
        let removed = todo
            .remove_subtask(id)
            .ok_or_else(|| TodoError::SubTaskNotFound {
                parent: parent.clone(),
                subtask: id.to_string(),
            })?;
        self.writer.schedule(format!("subtask:{}", parent.short()), doc.clone());
        Ok(removed)
    }

    /// Set the order of `parent`'s subtasks; written before returning
    pub fn reorder_subtasks(&self, parent: &TodoId, ordered_ids: &[TodoId]) -> Result<()> {
        let mut doc = self.lock();
        let todo = doc
            .find_mut(parent)
            .ok_or_else(|| TodoError::NotFound(parent.to_string()))?;

        let current: HashSet<&TodoId> = todo.subtasks.iter().map(|st| &st.id).collect();
        let wanted: HashSet<&TodoId> = ordered_ids.iter().collect();
        if wanted.len() != ordered_ids.len() || wanted != current {
            return Err(TodoError::InvalidReorder(format!(
                "expected the {} subtasks of {} exactly once each",
                current.len(),
                parent.short()
            )));
        }

        for (order, id) in ordered_ids.iter().enumerate() {
            if let Some(subtask) = todo.find_subtask_mut(id) {
                subtask.order = order as u32;
            }
        }
        todo.renumber_subtasks();
        self.writer.write_now(format!("subtasks:{}", parent.short()), doc.clone())
    }

    /// Write anything pending and report a failure that has not been seen yet
    pub fn flush(&self) -> Result<()> {
        self.writer.flush()
    }

    /// Physical writes since the repository was opened
    pub fn writes(&self) -> u64 {
        self.writer.writes()
    }

    pub fn backups(&self) -> Result<Vec<BackupEntry>> {
        self.store.backups().list()
    }

    /// Replace the document with a backup (by file name, or the newest
    /// valid one) and write it immediately
    pub fn restore_backup(&self, name: Option<&str>) -> Result<Document> {
        let mut doc = self.lock();
        let (entry, restored) = self.store.read_backup(name)?;
        tracing::warn!(backup = %entry.name, todos = restored.todos.len(), "restoring backup");
        *doc = restored;
        self.writer.write_now("restore", doc.clone())?;
        Ok(doc.clone())
    }
}

fn log_load(loaded: &Loaded) {
    match &loaded.source {
        LoadSource::Missing | LoadSource::Primary => {
            tracing::debug!(todos = loaded.document.todos.len(), source = ?loaded.source, "document loaded")
        }
        LoadSource::Migrated { legacy_backup } => tracing::info!(
            todos = loaded.document.todos.len(),
            backup = %legacy_backup.display(),
            "document migrated"
        ),
        LoadSource::Backup { name } => tracing::warn!(
            todos = loaded.document.todos.len(),
            backup = %name,
            "document recovered from backup"
        ),
    }
}

fn apply_update(
    doc: &mut Document,
    id: &TodoId,
    content: Option<String>,
    update: TodoUpdate,
) -> Result<Todo> {
    let idx = doc
        .position(id)
        .ok_or_else(|| TodoError::NotFound(id.to_string()))?;

    {
        let todo = &mut doc.todos[idx];
        if let Some(content) = content {
            todo.content = content;
        }
        update.due_date.apply_to(&mut todo.due_date);
        update.recurrence.apply_to(&mut todo.recurrence);
    }

    if let Some(completed) = update.completed {
        if doc.todos[idx].completed != completed {
            set_completed(doc, idx, completed);
        }
    }
    normalize_orders(doc);

    doc.find(id)
        .cloned()
        .ok_or_else(|| TodoError::NotFound(id.to_string()))
}

/// Move the todo at `idx` to the end of the other section. Completing a
/// recurring todo appends its successor to the pending section.
fn set_completed(doc: &mut Document, idx: usize, completed: bool) {
    let target = Section::of(completed);
    let order = doc.next_order(target);
    let todo = &mut doc.todos[idx];
    todo.completed = completed;
    todo.order = order;
    tracing::info!(id = %todo.id.short(), section = %target, "moved to section");

    if !completed {
        return;
    }
    let Some(mut next) = successor(&doc.todos[idx]) else {
        return;
    };
    while doc.contains_id(&next.id) {
        next.id = TodoId::generate();
        let parent = next.id.clone();
        for subtask in &mut next.subtasks {
            subtask.parent_id = parent.clone();
        }
    }
    next.order = doc.next_order(Section::Pending);
    doc.todos[idx].recurrence = None;
    doc.todos.push(next);
}

fn find_subtask<'a>(doc: &'a mut Document, parent: &TodoId, id: &TodoId) -> Result<&'a mut SubTask> {
    let todo = doc
        .find_mut(parent)
        .ok_or_else(|| TodoError::NotFound(parent.to_string()))?;
    todo.find_subtask_mut(id).ok_or_else(|| TodoError::SubTaskNotFound {
        parent: parent.clone(),
        subtask: id.to_string(),
    })
}

fn resolve<'a>(ids: impl Iterator<Item = &'a TodoId>, prefix: &str) -> Result<TodoId> {
    let prefix = prefix.trim();
    if prefix.is_empty() {
        return Err(TodoError::NotFound(String::new()));
    }
    let mut matches = Vec::new();
    for id in ids {
        if id.as_str() == prefix {
            return Ok(id.clone());
        }
        if id.as_str().starts_with(prefix) {
            matches.push(id);
        }
    }
    match matches.as_slice() {
        [only] => Ok((*only).clone()),
        [] => Err(TodoError::NotFound(prefix.to_string())),
        _ => Err(TodoError::AmbiguousId(prefix.to_string())),
    }
}
