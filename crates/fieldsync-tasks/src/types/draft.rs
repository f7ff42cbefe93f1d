//! New-task drafts and their validation.

use chrono::NaiveDate;
use fieldsync::types::{data_url, MediaRef};
use serde::Serialize;

use crate::types::tags::Tags;
use crate::types::task::{Assignee, ImageSlot, Priority, TaskStatus};

/// A locally detected problem with a draft or edit.
pub use fieldsync::FieldViolation as Violation;

/// A picked file, carried inline until the backend stores it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaUpload {
    /// Display name.
    pub name: String,
    /// `data:<mime>;base64,<payload>` URL.
    #[serde(rename = "base64")]
    pub data_url: String,
    /// Local location the file was picked from, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
}

impl MediaUpload {
    /// Encode picked bytes.
    pub fn from_bytes(name: impl Into<String>, mime: &str, bytes: &[u8]) -> Self {
        Self {
            name: name.into(),
            data_url: data_url(mime, bytes),
            uri: None,
        }
    }

    /// Remember where the file was picked from.
    pub fn with_uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = Some(uri.into());
        self
    }

    /// Reference form, for adding the file to an existing task.
    pub fn into_media_ref(self) -> MediaRef {
        MediaRef::new(self.data_url, self.name)
    }
}

/// Input collected by the create-task form.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDraft {
    /// Creating user. Filled in by the store from the session.
    pub creator_id: String,
    /// Users to assign.
    pub assignees: Vec<Assignee>,
    /// What needs to be inspected or fixed (required).
    pub description: String,
    /// Required.
    pub priority: Option<Priority>,
    /// Required.
    pub status: Option<TaskStatus>,
    /// Room identifier (required).
    pub room: String,
    /// Floor identifier (required).
    pub floor: String,
    /// At least one tag is required.
    pub tags: Tags,
    /// Required.
    pub due_date: Option<NaiveDate>,
    /// At least one ground-floor photo is required.
    pub ground_floor_images: Vec<MediaUpload>,
    /// At least one last-floor photo is required.
    pub last_floor_images: Vec<MediaUpload>,
    /// Optional extra files.
    pub attachments: Vec<MediaUpload>,
}

impl TaskDraft {
    /// Uploads in `slot`.
    pub fn uploads(&self, slot: ImageSlot) -> &[MediaUpload] {
        match slot {
            ImageSlot::GroundFloor => &self.ground_floor_images,
            ImageSlot::LastFloor => &self.last_floor_images,
            ImageSlot::Attachments => &self.attachments,
        }
    }

    /// Add an upload to `slot`.
    pub fn add_upload(&mut self, slot: ImageSlot, upload: MediaUpload) {
        match slot {
            ImageSlot::GroundFloor => self.ground_floor_images.push(upload),
            ImageSlot::LastFloor => self.last_floor_images.push(upload),
            ImageSlot::Attachments => self.attachments.push(upload),
        }
    }

    /// Remove the upload at `index` in `slot`.
    pub fn remove_upload(&mut self, slot: ImageSlot, index: usize) -> Option<MediaUpload> {
        let uploads = match slot {
            ImageSlot::GroundFloor => &mut self.ground_floor_images,
            ImageSlot::LastFloor => &mut self.last_floor_images,
            ImageSlot::Attachments => &mut self.attachments,
        };
        (index < uploads.len()).then(|| uploads.remove(index))
    }

    /// Body sent to `POST /New/CreateTask`.
    ///
    /// The backend reads the creator from both `userId` and `creatorId`.
    pub fn to_request_body(&self) -> serde_json::Result<serde_json::Value> {
        let mut body = serde_json::to_value(self)?;
        if let Some(map) = body.as_object_mut() {
            map.insert(
                "userId".to_string(),
                serde_json::Value::String(self.creator_id.clone()),
            );
        }
        Ok(body)
    }
}

/// Check a draft before it is submitted.
///
/// Returns every violation, in form order; an empty list means the draft
/// can be sent. Attachments are optional.
pub fn validate_draft(draft: &TaskDraft) -> Vec<Violation> {
    let mut violations = Vec::new();
    let mut require = |ok: bool, field: &'static str, message: &str| {
        if !ok {
            violations.push(Violation::new(field, message));
        }
    };

    require(!draft.description.trim().is_empty(), "description", "Description is required");
    require(draft.priority.is_some(), "priority", "Select a priority");
    require(draft.status.is_some(), "status", "Select a status");
    require(!draft.room.trim().is_empty(), "room", "Room is required");
    require(!draft.floor.trim().is_empty(), "floor", "Floor is required");
    require(!draft.tags.is_empty(), "tags", "Add at least one tag");
    require(draft.due_date.is_some(), "dueDate", "Select a due date");
    require(
        !draft.ground_floor_images.is_empty(),
        ImageSlot::GroundFloor.field(),
        "Add at least one ground floor image",
    );
    require(
        !draft.last_floor_images.is_empty(),
        ImageSlot::LastFloor.field(),
        "Add at least one last floor image",
    );

    violations
}
