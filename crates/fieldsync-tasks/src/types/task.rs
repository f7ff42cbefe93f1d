//! Task records as served by the backend.
//!
//! # Serialization
//!
//! Field names are camelCase. Ids accept the backend's `_id`. Priority and
//! status use their display labels (`"In Progress"`), and unknown or empty
//! labels on incoming records read as `None` instead of failing the whole
//! list.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use fieldsync::types::MediaRef;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::types::tags::Tags;

/// Task priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Priority {
    /// Low priority.
    Low,
    /// Medium priority.
    Medium,
    /// High priority.
    High,
}

impl Priority {
    /// All priorities, lowest first.
    pub const ALL: [Self; 3] = [Self::Low, Self::Medium, Self::High];

    /// Display label, also used on the wire.
    pub fn label(self) -> &'static str {
        match self {
            Self::Low => "Low",
            Self::Medium => "Medium",
            Self::High => "High",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|p| p.label().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown priority '{s}'"))
    }
}

/// Task lifecycle status.
///
/// ```
/// use fieldsync_tasks::TaskStatus;
///
/// assert_eq!(serde_json::to_string(&TaskStatus::InProgress).unwrap(), "\"In Progress\"");
/// assert_eq!("in progress".parse::<TaskStatus>().unwrap(), TaskStatus::InProgress);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskStatus {
    /// Not started.
    Pending,
    /// Being worked on.
    #[serde(rename = "In Progress")]
    InProgress,
    /// Done.
    Completed,
}

impl TaskStatus {
    /// All statuses in lifecycle order.
    pub const ALL: [Self; 3] = [Self::Pending, Self::InProgress, Self::Completed];

    /// Display label, also used on the wire.
    pub fn label(self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::InProgress => "In Progress",
            Self::Completed => "Completed",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Self::ALL
            .into_iter()
            .find(|status| {
                status.label().eq_ignore_ascii_case(wanted)
                    || status.label().replace(' ', "_").eq_ignore_ascii_case(wanted)
            })
            .ok_or_else(|| format!("unknown status '{s}'"))
    }
}

/// A user a task is assigned to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assignee {
    /// User id.
    #[serde(alias = "_id")]
    pub id: String,
    /// Display name.
    #[serde(default)]
    pub name: String,
}

impl Assignee {
    /// Create an assignee.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// A field-inspection work item.
///
/// Backend fields this type does not model (alert lists, watchers, the
/// creator's username) are kept in [`extra`](Task::extra) so a replace-style
/// update sends them back unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Backend id.
    #[serde(alias = "_id")]
    pub id: String,

    /// Id of the user who created the task.
    #[serde(default)]
    pub creator_id: String,

    /// Owner key the backend filters `GET /New/GetTask/:userId` by. Usually
    /// equal to `creator_id`; older records carry only one of the two.
    #[serde(default, rename = "userId")]
    pub owner_id: String,

    /// Users the task is assigned to.
    #[serde(default)]
    pub assignees: Vec<Assignee>,

    /// What needs to be inspected or fixed.
    #[serde(default)]
    pub description: String,

    /// Priority; `None` when the backend sent no known label.
    #[serde(
        default,
        deserialize_with = "lenient_label",
        skip_serializing_if = "Option::is_none"
    )]
    pub priority: Option<Priority>,

    /// Lifecycle status; `None` when the backend sent no known label.
    #[serde(
        default,
        deserialize_with = "lenient_label",
        skip_serializing_if = "Option::is_none"
    )]
    pub status: Option<TaskStatus>,

    /// Room identifier.
    #[serde(default)]
    pub room: String,

    /// Floor identifier.
    #[serde(default)]
    pub floor: String,

    /// Free-form labels.
    #[serde(default)]
    pub tags: Tags,

    /// Due date, without a time of day.
    #[serde(
        default,
        deserialize_with = "lenient_date",
        skip_serializing_if = "Option::is_none"
    )]
    pub due_date: Option<NaiveDate>,

    /// Photos of the ground floor.
    #[serde(default)]
    pub ground_floor_images: Vec<MediaRef>,

    /// Photos of the last floor.
    #[serde(default)]
    pub last_floor_images: Vec<MediaRef>,

    /// Optional extra files.
    #[serde(default)]
    pub attachments: Vec<MediaRef>,

    /// Set by the backend on creation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,

    /// Set by the backend on every update.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,

    /// Backend fields not modelled above, passed through untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Task {
    /// Body sent to `PUT /New/UpdateTask/:id`.
    ///
    /// The full record plus the backend's `_id`. `userId` and `creatorId`
    /// are both filled, from each other when one is missing.
    pub fn to_request_body(&self) -> serde_json::Result<Value> {
        let mut body = serde_json::to_value(self)?;
        if let Some(map) = body.as_object_mut() {
            let creator = Value::String(self.creator().to_string());
            map.insert("_id".to_string(), Value::String(self.id.clone()));
            map.insert("userId".to_string(), creator.clone());
            map.insert("creatorId".to_string(), creator);
        }
        Ok(body)
    }

    /// Id of the creating user, from whichever key the backend filled.
    pub fn creator(&self) -> &str {
        if self.creator_id.is_empty() {
            &self.owner_id
        } else {
            &self.creator_id
        }
    }

    /// Whether `user_id` is one of the assignees.
    pub fn is_assigned_to(&self, user_id: &str) -> bool {
        self.assignees.iter().any(|a| a.id == user_id)
    }

    /// Whether `user_id` created the task.
    pub fn is_created_by(&self, user_id: &str) -> bool {
        let creator = self.creator();
        !creator.is_empty() && creator == user_id
    }

    /// Images in `slot`.
    pub fn images(&self, slot: ImageSlot) -> &[MediaRef] {
        match slot {
            ImageSlot::GroundFloor => &self.ground_floor_images,
            ImageSlot::LastFloor => &self.last_floor_images,
            ImageSlot::Attachments => &self.attachments,
        }
    }

    /// Mutable access to the images in `slot`.
    pub fn images_mut(&mut self, slot: ImageSlot) -> &mut Vec<MediaRef> {
        match slot {
            ImageSlot::GroundFloor => &mut self.ground_floor_images,
            ImageSlot::LastFloor => &mut self.last_floor_images,
            ImageSlot::Attachments => &mut self.attachments,
        }
    }
}

/// Media slots on a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageSlot {
    /// Ground-floor photos (at least one required).
    GroundFloor,
    /// Last-floor photos (at least one required).
    LastFloor,
    /// Other attached files.
    Attachments,
}

impl ImageSlot {
    /// Wire name of the slot.
    pub fn field(self) -> &'static str {
        match self {
            Self::GroundFloor => "groundFloorImages",
            Self::LastFloor => "lastFloorImages",
            Self::Attachments => "attachments",
        }
    }
}

fn lenient_label<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.and_then(|s| s.parse().ok()))
}

fn lenient_date<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.and_then(|s| parse_due_date(&s)))
}

/// Parse a due date given either as `YYYY-MM-DD` or as an RFC 3339 timestamp.
pub fn parse_due_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.date_naive()))
}
