//! Task detail/edit surface.
//!
//! A [`TaskEditor`] works on a private copy of one task. Nothing reaches the
//! store until [`save`](TaskEditor::save); dropping the editor or calling
//! [`cancel`](TaskEditor::cancel) discards the copy without contacting it.

use chrono::NaiveDate;
use fieldsync::types::MediaRef;

use crate::error::{TaskError, TaskResult};
use crate::store::TaskStore;
use crate::types::{Assignee, ImageSlot, MediaUpload, Priority, Task, TaskPatch, TaskStatus, Violation};

/// Local draft of an existing task.
#[derive(Debug, Clone)]
pub struct TaskEditor {
    original: Task,
    draft: Task,
}

impl TaskEditor {
    /// Open task `task_id` from the store's canonical collection.
    pub fn open(store: &TaskStore, task_id: &str) -> TaskResult<Self> {
        store
            .get(task_id)
            .map(Self::new)
            .ok_or_else(|| TaskError::NotFound {
                task_id: task_id.to_string(),
            })
    }

    /// Start editing `task`.
    pub fn new(task: Task) -> Self {
        Self {
            draft: task.clone(),
            original: task,
        }
    }

    /// The task as last saved.
    pub fn original(&self) -> &Task {
        &self.original
    }

    /// The task with local edits applied, for display.
    pub fn task(&self) -> &Task {
        &self.draft
    }

    /// Replace the description.
    pub fn set_description(&mut self, description: impl Into<String>) {
        self.draft.description = description.into();
    }

    /// Choose a priority.
    pub fn set_priority(&mut self, priority: Priority) {
        self.draft.priority = Some(priority);
    }

    /// Move the task to `status`.
    pub fn set_status(&mut self, status: TaskStatus) {
        self.draft.status = Some(status);
    }

    /// Replace the room.
    pub fn set_room(&mut self, room: impl Into<String>) {
        self.draft.room = room.into();
    }

    /// Replace the floor.
    pub fn set_floor(&mut self, floor: impl Into<String>) {
        self.draft.floor = floor.into();
    }

    /// Set the due date.
    pub fn set_due_date(&mut self, due_date: NaiveDate) {
        self.draft.due_date = Some(due_date);
    }

    /// Replace the assignee list.
    pub fn set_assignees(&mut self, assignees: Vec<Assignee>) {
        self.draft.assignees = assignees;
    }

    /// Add a tag. Returns `false` for blank or duplicate tags.
    pub fn add_tag(&mut self, tag: &str) -> bool {
        self.draft.tags.insert(tag)
    }

    /// Remove a tag. Returns `false` if it was not present.
    pub fn remove_tag(&mut self, tag: &str) -> bool {
        self.draft.tags.remove(tag)
    }

    /// Append a newly picked file to `slot`.
    pub fn add_image(&mut self, slot: ImageSlot, upload: MediaUpload) {
        self.draft.images_mut(slot).push(upload.into_media_ref());
    }

    /// Remove the file at `index` in `slot`.
    pub fn remove_image(&mut self, slot: ImageSlot, index: usize) -> Option<MediaRef> {
        let images = self.draft.images_mut(slot);
        (index < images.len()).then(|| images.remove(index))
    }

    /// The changes made since the editor was opened or last saved.
    pub fn patch(&self) -> TaskPatch {
        TaskPatch::between(&self.original, &self.draft)
    }

    /// Whether there is anything to save.
    pub fn is_dirty(&self) -> bool {
        !self.patch().is_empty()
    }

    /// Problems that block saving: the description and the priority must be
    /// set.
    pub fn validate(&self) -> Vec<Violation> {
        let mut violations = Vec::new();
        if self.draft.description.trim().is_empty() {
            violations.push(Violation::new("description", "Description is required"));
        }
        if self.draft.priority.is_none() {
            violations.push(Violation::new("priority", "Select a priority"));
        }
        violations
    }

    /// Send the changes through [`TaskStore::update`].
    ///
    /// A clean editor returns the task without contacting the store. On
    /// success the editor continues from the saved record; on failure the
    /// local edits are kept so the user can retry.
    pub async fn save(&mut self, store: &TaskStore) -> TaskResult<Task> {
        let violations = self.validate();
        if !violations.is_empty() {
            return Err(TaskError::Invalid { violations });
        }

        let patch = self.patch();
        if patch.is_empty() {
            return Ok(self.original.clone());
        }

        let saved = store.update(&self.original.id, &patch).await?;
        self.original = saved.clone();
        self.draft = saved.clone();
        Ok(saved)
    }

    /// Discard the local edits.
    pub fn cancel(self) {
        if self.is_dirty() {
            tracing::debug!(task_id = %self.original.id, "Discarding unsaved task edits");
        }
    }
}
