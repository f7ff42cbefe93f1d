//! Uploaded media references and the inline form used for new uploads.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

/// Encode `bytes` as a `data:` URL, the inline form the backend accepts for
/// new uploads.
pub fn data_url(mime: &str, bytes: &[u8]) -> String {
    format!("data:{mime};base64,{}", STANDARD.encode(bytes))
}

/// Reference to an uploaded image or attachment.
///
/// # Examples
///
/// ```rust
/// use fieldsync::types::MediaRef;
///
/// let media: MediaRef = serde_json::from_str(
///     r#"{"_id": "m1", "url": "https://cdn.example.com/a.jpg", "name": "a.jpg"}"#,
/// )
/// .unwrap();
/// assert_eq!(media.name, "a.jpg");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaRef {
    /// Location of the uploaded file (remote URL or inline data URL).
    #[serde(alias = "uri")]
    pub url: String,

    /// Display name.
    #[serde(default)]
    pub name: String,
}

impl MediaRef {
    /// Create a new media reference.
    pub fn new(url: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            name: name.into(),
        }
    }

    /// Whether the file is carried inline as a data URL (not yet uploaded).
    pub fn is_inline(&self) -> bool {
        self.url.starts_with("data:")
    }
}
