//! Inspection tasks for fieldsync clients.
//!
//! This crate holds the task domain types, the single validation function
//! for new-task drafts, the canonical task collection, and the edit surface
//! for one task.
//!
//! # Module Organization
//!
//! - [`types`] - Task records, tags, drafts, patches
//! - [`error`] - [`TaskError`] and its mapping onto [`fieldsync::ErrorKind`]
//! - [`api`] - The [`TaskApi`] seam and its HTTP implementation
//! - [`store`] - [`TaskStore`], the canonical collection
//! - [`editor`] - [`TaskEditor`], the local edit draft

pub mod api;
pub mod editor;
pub mod error;
pub mod store;
pub mod types;

pub use api::{HttpTaskApi, TaskApi};
pub use editor::TaskEditor;
pub use error::{TaskError, TaskResult};
pub use store::{FetchOutcome, FetchScope, TaskStore};
pub use types::*;
