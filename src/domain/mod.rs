pub mod document;
pub mod enums;
pub mod links;
pub mod patch;
pub mod recurrence;
pub mod sort;
pub mod timestamp;
pub mod todo;
pub mod views;

pub use document::{validate_split_ratio, Document, Settings, CURRENT_VERSION, DEFAULT_SPLIT_RATIO};
pub use enums::{DueStatus, Frequency, Section, SortOrder};
pub use links::{detect_links, extract_paths, extract_urls, has_links, Link, LinkKind};
pub use patch::{Patch, SettingsUpdate, SubTaskUpdate, TodoUpdate};
pub use recurrence::{next_occurrence, should_create_next, successor};
pub use sort::{
    apply_sort_mode, arrange, move_within_section, normalize_orders, reorder_section,
    sort_todos, split_sections,
};
pub use timestamp::{Timestamp, TimestampParseError};
pub use todo::{
    due_label, due_status, validate_content, RecurrenceRule, SubTask, Todo, TodoId,
    MAX_CONTENT_LEN,
};
pub use views::{list_rows, search, subtask_progress, tree_connector, ListRow, MatchField, SearchHit};
