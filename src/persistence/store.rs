use super::backup::{BackupEntry, BackupStore};
use super::files::{atomic_write, read_optional, StorePaths};
use super::migration::{classify, decode, MigrationReport};
use crate::config::Config;
use crate::domain::Document;
use crate::error::{Result, TodoError};
use serde_json::Value;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

const RETRY_BASE_DELAY: Duration = Duration::from_millis(50);

/// Where a loaded document came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadSource {
    /// No file yet; default document
    Missing,
    /// The data file itself
    Primary,
    /// A legacy file that was migrated and rewritten
    Migrated { legacy_backup: PathBuf },
    /// The data file was unreadable; restored from this backup
    Backup { name: String },
}

#[derive(Debug, Clone)]
pub struct Loaded {
    pub document: Document,
    pub source: LoadSource,
    pub report: MigrationReport,
    /// Decoding changed the document and it has not been written back yet
    pub needs_write: bool,
}

/// Reads and writes the document file.
///
/// Writes go through a temp file and rename, are retried a bounded number of
/// times, and are followed by a rotating backup.
#[derive(Debug)]
pub struct DocumentStore {
    paths: StorePaths,
    backups: BackupStore,
    max_write_attempts: u32,
    retry_delay: Duration,
}

impl DocumentStore {
    pub fn new(paths: StorePaths, config: &Config) -> Self {
        let backups = BackupStore::new(paths.backup_dir(), config.max_backups);
        Self {
            paths,
            backups,
            max_write_attempts: config.max_write_attempts.max(1),
            retry_delay: RETRY_BASE_DELAY,
        }
    }

    pub fn paths(&self) -> &StorePaths {
        &self.paths
    }

    pub fn backups(&self) -> &BackupStore {
        &self.backups
    }

    /// Read the data file, migrating legacy shapes and falling back to the
    /// newest valid backup when the file cannot be parsed.
    pub fn load(&self) -> Result<Loaded> {
        let path = self.paths.data_file();
        let Some(raw) = read_optional(&path)? else {
            tracing::info!(path = %path.display(), "no data file, starting with an empty document");
            return Ok(Loaded {
                document: Document::default(),
                source: LoadSource::Missing,
                report: MigrationReport {
                    shape: "current",
                    ..MigrationReport::default()
                },
                needs_write: false,
            });
        };

        let value: Value = match serde_json::from_str(&raw) {
            Ok(value) => value,
            Err(e) => return self.recover(&raw, e.to_string()),
        };
        let shape = match classify(value) {
            Ok(shape) => shape,
            Err(e) => return self.recover(&raw, e.to_string()),
        };

        if !shape.is_legacy() {
            let (document, report) = decode(shape);
            let needs_write = report.changed();
            return Ok(Loaded {
                document,
                source: LoadSource::Primary,
                report,
                needs_write,
            });
        }

        // Keep the original bytes before anything overwrites them
        let legacy_backup = self.backups.write_legacy_backup(raw.as_bytes()).map_err(|e| {
            tracing::error!(error = %e, "could not back up legacy file, migration aborted");
            TodoError::MigrationAborted(format!("could not back up original file: {}", e))
        })?;

        let (document, report) = decode(shape);
        self.write(&document)?;
        tracing::info!(
            from = report.shape,
            todos = document.todos.len(),
            skipped = report.skipped,
            backup = %legacy_backup.display(),
            "migrated legacy document"
        );
        Ok(Loaded {
            document,
            source: LoadSource::Migrated { legacy_backup },
            report,
            needs_write: false,
        })
    }

    /// The data file is unusable: quarantine it and use the newest valid backup
    fn recover(&self, raw: &str, reason: String) -> Result<Loaded> {
        let path = self.paths.data_file();
        tracing::warn!(path = %path.display(), reason = %reason, "data file is corrupt, trying backups");

        if let Err(e) = self.backups.quarantine(raw.as_bytes()) {
            tracing::warn!(error = %e, "could not quarantine corrupt file");
        }

        let Some((entry, value)) = self.backups.newest_valid()? else {
            tracing::error!(path = %path.display(), "no valid backup to fall back to");
            return Err(TodoError::Corrupt { path, reason });
        };

        let (document, report) = decode(classify(value)?);
        tracing::warn!(backup = %entry.name, todos = document.todos.len(), "restored document from backup");
        Ok(Loaded {
            document,
            source: LoadSource::Backup { name: entry.name },
            report,
            needs_write: true,
        })
    }

    /// Decode a backup by name, or the newest valid one
    pub fn read_backup(&self, name: Option<&str>) -> Result<(BackupEntry, Document)> {
        let (entry, value) = match name {
            Some(name) => {
                let entry = self.backups.find(name)?;
                let value = self.backups.verify(&entry)?;
                (entry, value)
            }
            None => self
                .backups
                .newest_valid()?
                .ok_or_else(|| TodoError::BackupNotFound("no valid backup".to_string()))?,
        };
        let (document, _) = decode(classify(value)?);
        Ok((entry, document))
    }

    /// Atomically replace the data file, then write a rotating backup
    pub fn write(&self, document: &Document) -> Result<()> {
        self.paths.ensure()?;
        let bytes = serde_json::to_vec_pretty(document)?;
        let path = self.paths.data_file();

        let mut attempt = 1;
        loop {
            match atomic_write(&path, &bytes) {
                Ok(()) => break,
                Err(source) if attempt >= self.max_write_attempts => {
                    tracing::error!(path = %path.display(), attempts = attempt, error = %source, "giving up on write");
                    return Err(TodoError::WriteFailed {
                        path,
                        attempts: attempt,
                        source,
                    });
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), attempt, error = %e, "write failed, retrying");
                    thread::sleep(self.retry_delay * attempt);
                    attempt += 1;
                }
            }
        }
        tracing::debug!(path = %path.display(), bytes = bytes.len(), todos = document.todos.len(), "document written");

        // The data file is safe at this point; a failed backup is not fatal
        if let Err(e) = self.backups.write_backup(&bytes) {
            tracing::warn!(error = %e, "failed to write backup");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Todo, TodoId};
    use std::fs;
    use tempfile::tempdir;

    fn store(dir: &std::path::Path) -> DocumentStore {
        let mut store = DocumentStore::new(StorePaths::new(dir), &Config::default());
        store.retry_delay = Duration::from_millis(1);
        store
    }

    fn doc_with(ids: &[&str]) -> Document {
        let mut doc = Document::default();
        for (i, id) in ids.iter().enumerate() {
            let mut todo = Todo::new(format!("todo {}", id), None, i as u32);
            todo.id = TodoId::from(*id);
            doc.todos.push(todo);
        }
        doc
    }

    #[test]
    fn test_missing_file_gives_default() {
        let temp_dir = tempdir().unwrap();
        let loaded = store(temp_dir.path()).load().unwrap();
        assert_eq!(loaded.source, LoadSource::Missing);
        assert_eq!(loaded.document, Document::default());
        assert!(!loaded.needs_write);
    }

    #[test]
    fn test_write_then_load() {
        let temp_dir = tempdir().unwrap();
        let store = store(temp_dir.path());
        let doc = doc_with(&["a", "b"]);
        store.write(&doc).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded.source, LoadSource::Primary);
        assert_eq!(loaded.document, doc);
        assert!(!loaded.needs_write);
        assert_eq!(store.backups().list().unwrap().len(), 1);
    }

    #[test]
    fn test_write_failure_is_reported_after_retries() {
        let temp_dir = tempdir().unwrap();
        let store = store(temp_dir.path());
        // a directory where the data file should be makes the rename fail
        fs::create_dir_all(store.paths().data_file()).unwrap();

        match store.write(&doc_with(&["a"])) {
            Err(TodoError::WriteFailed { attempts, .. }) => assert_eq!(attempts, 3),
            other => panic!("expected WriteFailed, got {:?}", other),
        }
    }

    #[test]
    fn test_corrupt_file_falls_back_to_newest_valid_backup() {
        let temp_dir = tempdir().unwrap();
        let store = store(temp_dir.path());
        store.write(&doc_with(&["old"])).unwrap();
        store.write(&doc_with(&["old", "new"])).unwrap();
        fs::write(store.paths().data_file(), "{\"version\": \"1.0\", \"todos\": [").unwrap();

        let loaded = store.load().unwrap();
        assert!(matches!(loaded.source, LoadSource::Backup { .. }));
        assert!(loaded.needs_write);
        let ids: Vec<&str> = loaded.document.todos.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["old", "new"]);

        // the corrupt bytes are kept aside
        let quarantined = store
            .backups()
            .list()
            .unwrap()
            .into_iter()
            .filter(|e| e.name.starts_with("data_corrupt_"))
            .count();
        assert_eq!(quarantined, 1);
    }

    #[test]
    fn test_corrupt_file_without_backup_is_an_error() {
        let temp_dir = tempdir().unwrap();
        let store = store(temp_dir.path());
        fs::write(store.paths().data_file(), "42").unwrap();
        assert!(matches!(store.load(), Err(TodoError::Corrupt { .. })));
        // original left in place
        assert_eq!(fs::read_to_string(store.paths().data_file()).unwrap(), "42");
    }

    #[test]
    fn test_legacy_file_is_migrated_with_backup() {
        let temp_dir = tempdir().unwrap();
        let store = store(temp_dir.path());
        let legacy = r#"[{"id":"a","text":"x","created_at":"2025-01-01T00:00:00Z","position":0}]"#;
        fs::write(store.paths().data_file(), legacy).unwrap();

        let loaded = store.load().unwrap();
        let LoadSource::Migrated { legacy_backup } = &loaded.source else {
            panic!("expected migration, got {:?}", loaded.source);
        };
        assert_eq!(fs::read_to_string(legacy_backup).unwrap(), legacy);

        let on_disk: Value = serde_json::from_str(&fs::read_to_string(store.paths().data_file()).unwrap()).unwrap();
        assert_eq!(on_disk["version"], "1.0");
        assert_eq!(on_disk["todos"][0]["content"], "x");
        assert!(on_disk["todos"][0].get("text").is_none());
    }

    #[test]
    fn test_migration_aborts_when_backup_cannot_be_written() {
        let temp_dir = tempdir().unwrap();
        let store = store(temp_dir.path());
        let legacy = r#"[{"id":"a","text":"x"}]"#;
        fs::write(store.paths().data_file(), legacy).unwrap();
        // a plain file where the backup directory should be
        fs::write(store.paths().backup_dir(), "").unwrap();

        assert!(matches!(store.load(), Err(TodoError::MigrationAborted(_))));
        assert_eq!(fs::read_to_string(store.paths().data_file()).unwrap(), legacy);
    }

    #[test]
    fn test_read_backup_by_name() {
        let temp_dir = tempdir().unwrap();
        let store = store(temp_dir.path());
        store.write(&doc_with(&["a"])).unwrap();
        let name = store.backups().list().unwrap()[0].name.clone();

        let (entry, doc) = store.read_backup(Some(&name)).unwrap();
        assert_eq!(entry.name, name);
        assert_eq!(doc.todos[0].id.as_str(), "a");
        assert!(matches!(store.read_backup(Some("missing.json")), Err(TodoError::BackupNotFound(_))));
    }
}
