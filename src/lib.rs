//! Persistence and reconciliation for a local to-do list.
//!
//! [`TodoRepository`] owns the document and exposes the CRUD surface; writes
//! are debounced, atomic and backed up, and older file layouts are migrated
//! on load.

pub mod config;
pub mod domain;
pub mod error;
pub mod persistence;

pub use config::{load_config, save_config, Config};
pub use error::{Result, TodoError, ValidationError};
pub use persistence::{StorePaths, TodoRepository};
