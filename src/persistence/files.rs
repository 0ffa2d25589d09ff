use crate::error::{Result, TodoError};
use anyhow::Context;
use std::env;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Name of a project-local data directory
pub const LOCAL_DIR_NAME: &str = ".todo-panel";
/// Environment variable overriding the data directory
pub const DIR_ENV_VAR: &str = "TODO_PANEL_DIR";

const DATA_FILE: &str = "data.json";
const BACKUP_DIR: &str = "backups";
const CONFIG_FILE: &str = "config.json";

/// Layout of a data directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorePaths {
    root: PathBuf,
}

impl StorePaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn data_file(&self) -> PathBuf {
        self.root.join(DATA_FILE)
    }

    pub fn backup_dir(&self) -> PathBuf {
        self.root.join(BACKUP_DIR)
    }

    pub fn config_file(&self) -> PathBuf {
        self.root.join(CONFIG_FILE)
    }

    /// Create the data and backup directories if missing
    pub fn ensure(&self) -> Result<()> {
        for dir in [self.root.clone(), self.backup_dir()] {
            if !dir.exists() {
                fs::create_dir_all(&dir).map_err(|e| TodoError::io(&dir, e))?;
                tracing::debug!(dir = %dir.display(), "created directory");
            }
        }
        Ok(())
    }
}

/// Pick the data directory: explicit flag, then `TODO_PANEL_DIR`, then the
/// nearest `.todo-panel` above the current directory, then `~/.todo-panel`.
pub fn resolve_data_dir(explicit: Option<&Path>) -> anyhow::Result<PathBuf> {
    if let Some(dir) = explicit {
        return Ok(dir.to_path_buf());
    }

    if let Some(dir) = env::var_os(DIR_ENV_VAR).filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(dir));
    }

    let current_dir = env::current_dir().context("Could not determine current directory")?;
    if let Some(local_dir) = find_local_dir(&current_dir) {
        return Ok(local_dir);
    }

    let home = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home.join(LOCAL_DIR_NAME))
}

/// Find a `.todo-panel` directory by walking up from `start_dir`
pub fn find_local_dir(start_dir: &Path) -> Option<PathBuf> {
    let mut current = start_dir;
    loop {
        let candidate = current.join(LOCAL_DIR_NAME);
        if candidate.is_dir() {
            return Some(candidate);
        }
        current = current.parent()?;
    }
}

/// Create `.todo-panel` inside `parent`
pub fn init_local_dir(parent: &Path) -> anyhow::Result<PathBuf> {
    let dir = parent.join(LOCAL_DIR_NAME);
    if dir.exists() {
        anyhow::bail!("Data directory already exists: {}", dir.display());
    }
    fs::create_dir_all(dir.join(BACKUP_DIR))
        .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
    Ok(dir)
}

/// Write `content` to a temp file next to `path`, fsync, then rename over it.
/// Readers see either the old file or the new one, never a partial write.
pub fn atomic_write(path: &Path, content: &[u8]) -> io::Result<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    let mut temp_file = NamedTempFile::new_in(dir)?;
    temp_file.write_all(content)?;
    temp_file.as_file().sync_all()?;
    temp_file.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Read a file, `None` if it does not exist
pub fn read_optional(path: &Path) -> Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(TodoError::io(path, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_paths_layout() {
        let paths = StorePaths::new("/tmp/tp");
        assert_eq!(paths.data_file(), PathBuf::from("/tmp/tp/data.json"));
        assert_eq!(paths.backup_dir(), PathBuf::from("/tmp/tp/backups"));
        assert_eq!(paths.config_file(), PathBuf::from("/tmp/tp/config.json"));
    }

    #[test]
    fn test_ensure_creates_directories() {
        let temp_dir = tempfile::tempdir().unwrap();
        let paths = StorePaths::new(temp_dir.path().join("nested").join("data"));
        paths.ensure().unwrap();
        assert!(paths.backup_dir().is_dir());
        // idempotent
        paths.ensure().unwrap();
    }

    #[test]
    fn test_atomic_write_and_read() {
        let temp_dir = tempfile::tempdir().unwrap();
        let test_file = temp_dir.path().join("data.json");

        atomic_write(&test_file, b"{\"a\":1}").unwrap();
        assert_eq!(read_optional(&test_file).unwrap().as_deref(), Some("{\"a\":1}"));

        atomic_write(&test_file, b"{}").unwrap();
        assert_eq!(read_optional(&test_file).unwrap().as_deref(), Some("{}"));

        // no temp files left behind
        let entries = fs::read_dir(temp_dir.path()).unwrap().count();
        assert_eq!(entries, 1);
    }

    #[test]
    fn test_read_missing_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        assert_eq!(read_optional(&temp_dir.path().join("missing.json")).unwrap(), None);
    }

    #[test]
    fn test_atomic_write_into_missing_dir_fails() {
        let temp_dir = tempfile::tempdir().unwrap();
        let target = temp_dir.path().join("nope").join("data.json");
        assert!(atomic_write(&target, b"{}").is_err());
    }

    #[test]
    fn test_find_and_init_local_dir() {
        let temp_dir = tempfile::tempdir().unwrap();
        let nested = temp_dir.path().join("a").join("b");
        fs::create_dir_all(&nested).unwrap();

        let created = init_local_dir(temp_dir.path()).unwrap();
        assert_eq!(find_local_dir(&nested), Some(created.clone()));
        assert!(created.join("backups").is_dir());
        assert!(init_local_dir(temp_dir.path()).is_err());
    }

    #[test]
    fn test_explicit_dir_wins() {
        let dir = resolve_data_dir(Some(Path::new("/srv/todos"))).unwrap();
        assert_eq!(dir, PathBuf::from("/srv/todos"));
    }
}
