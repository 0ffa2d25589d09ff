pub mod backup;
pub mod debounce;
pub mod files;
pub mod migration;
pub mod repository;
pub mod store;

pub use backup::{BackupEntry, BackupKind, BackupStore};
pub use debounce::{DebounceCoordinator, DocumentSink, DEFAULT_WINDOW};
pub use files::{
    atomic_write, find_local_dir, init_local_dir, read_optional, resolve_data_dir, StorePaths,
    DIR_ENV_VAR, LOCAL_DIR_NAME,
};
pub use migration::{classify, decode, decode_str, reconcile, DocumentShape, MigrationReport};
pub use repository::TodoRepository;
pub use store::{DocumentStore, LoadSource, Loaded};
