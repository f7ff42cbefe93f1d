//! Ordered, duplicate-free tag set.

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

/// Task tags.
///
/// Tags are trimmed on insert; blank tags are dropped and duplicates are
/// ignored (case-sensitively), so insertion order is preserved and every
/// tag appears once.
///
/// ```
/// use fieldsync_tasks::Tags;
///
/// let mut tags = Tags::default();
/// assert!(tags.insert(" crack "));
/// assert!(tags.insert("Crack"));
/// assert!(!tags.insert("crack"));
/// assert_eq!(tags.to_vec(), vec!["crack", "Crack"]);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct Tags(IndexSet<String>);

impl Tags {
    /// Add a tag. Returns `false` if it was blank or already present.
    pub fn insert(&mut self, tag: &str) -> bool {
        let tag = tag.trim();
        if tag.is_empty() {
            return false;
        }
        self.0.insert(tag.to_string())
    }

    /// Remove a tag, keeping the order of the rest.
    pub fn remove(&mut self, tag: &str) -> bool {
        self.0.shift_remove(tag.trim())
    }

    /// Whether `tag` is present.
    pub fn contains(&self, tag: &str) -> bool {
        self.0.contains(tag.trim())
    }

    /// Number of tags.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether there are no tags.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Tags in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Tags as an owned list.
    pub fn to_vec(&self) -> Vec<String> {
        self.0.iter().cloned().collect()
    }
}

impl<S: AsRef<str>> FromIterator<S> for Tags {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut tags = Tags::default();
        for tag in iter {
            tags.insert(tag.as_ref());
        }
        tags
    }
}

impl From<Vec<String>> for Tags {
    fn from(tags: Vec<String>) -> Self {
        tags.into_iter().collect()
    }
}

impl From<Tags> for Vec<String> {
    fn from(tags: Tags) -> Self {
        tags.0.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn removal_keeps_order() {
        let mut tags: Tags = ["a", "b", "c"].into_iter().collect();
        assert!(tags.remove("b"));
        assert!(!tags.remove("z"));
        assert_eq!(tags.to_vec(), vec!["a", "c"]);
    }

    #[test]
    fn deserializes_through_normalization() {
        let tags: Tags = serde_json::from_str(r#"["x", " x ", "", "y"]"#).unwrap();
        assert_eq!(tags.to_vec(), vec!["x", "y"]);
        assert_eq!(serde_json::to_string(&tags).unwrap(), r#"["x","y"]"#);
    }
}
