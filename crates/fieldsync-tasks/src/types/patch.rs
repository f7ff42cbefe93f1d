//! Field-level edits to an existing task.

use chrono::NaiveDate;
use fieldsync::types::MediaRef;
use serde::Serialize;

use crate::types::tags::Tags;
use crate::types::task::{Assignee, Priority, Task, TaskStatus};

/// A set of field changes. `None` leaves the field untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub floor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Tags>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignees: Option<Vec<Assignee>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ground_floor_images: Option<Vec<MediaRef>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_floor_images: Option<Vec<MediaRef>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachments: Option<Vec<MediaRef>>,
}

macro_rules! diff_fields {
    ($patch:ident, $before:ident, $after:ident; $($field:ident),* $(,)?) => {
        $(
            if $before.$field != $after.$field {
                $patch.$field = Some($after.$field.clone());
            }
        )*
    };
}

macro_rules! overlay_fields {
    ($patch:ident, $task:ident; $($field:ident),* $(,)?) => {
        $(
            if let Some(value) = &$patch.$field {
                $task.$field = value.clone();
            }
        )*
    };
}

impl TaskPatch {
    /// Whether the patch changes nothing.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// The changes that turn `before` into `after`.
    ///
    /// Fields `before` has no value for (priority, status, due date) are only
    /// reported when `after` sets them.
    pub fn between(before: &Task, after: &Task) -> Self {
        let mut patch = Self::default();
        diff_fields!(patch, before, after;
            description, room, floor, tags, assignees,
            ground_floor_images, last_floor_images, attachments,
        );
        if after.priority.is_some() && before.priority != after.priority {
            patch.priority = after.priority;
        }
        if after.status.is_some() && before.status != after.status {
            patch.status = after.status;
        }
        if after.due_date.is_some() && before.due_date != after.due_date {
            patch.due_date = after.due_date;
        }
        patch
    }

    /// `task` with every field set in this patch overlaid.
    pub fn apply_to(&self, task: &Task) -> Task {
        let mut merged = task.clone();
        overlay_fields!(self, merged;
            description, room, floor, tags, assignees,
            ground_floor_images, last_floor_images, attachments,
        );
        if self.priority.is_some() {
            merged.priority = self.priority;
        }
        if self.status.is_some() {
            merged.status = self.status;
        }
        if self.due_date.is_some() {
            merged.due_date = self.due_date;
        }
        merged
    }
}
