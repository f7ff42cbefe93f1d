//! Task domain types.
//!
//! - [`task`] - records served by the backend
//! - [`tags`] - ordered, duplicate-free tag set
//! - [`draft`] - create-form input and its validation
//! - [`patch`] - field-level edits

pub mod draft;
pub mod patch;
pub mod tags;
pub mod task;

pub use draft::{validate_draft, MediaUpload, TaskDraft, Violation};
pub use patch::TaskPatch;
pub use tags::Tags;
pub use task::{parse_due_date, Assignee, ImageSlot, Priority, Task, TaskStatus};
