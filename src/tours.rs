//! Inspections and their virtual-tour galleries.

use chrono::{DateTime, Duration, Months, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::client::ApiClient;
use crate::error::{Error, FieldViolation, Result};

/// An inspection grouping virtual tours.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Inspection {
    /// Backend id.
    #[serde(alias = "_id")]
    pub id: String,
    /// Title.
    #[serde(default)]
    pub title: String,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
    /// Creation time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

/// Input for creating an inspection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NewInspection {
    /// Title (required).
    pub title: String,
    /// Description (required).
    pub description: String,
}

impl NewInspection {
    /// Create the input.
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
        }
    }

    /// Check that both fields are filled in.
    pub fn validate(&self) -> Result<()> {
        let mut violations = Vec::new();
        if self.title.trim().is_empty() {
            violations.push(FieldViolation::new("title", "Title is required."));
        }
        if self.description.trim().is_empty() {
            violations.push(FieldViolation::new("description", "Description is required."));
        }
        if violations.is_empty() {
            Ok(())
        } else {
            Err(Error::Validation(violations))
        }
    }
}

/// A virtual tour belonging to an inspection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualTour {
    /// Backend id.
    #[serde(alias = "_id")]
    pub id: String,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Description.
    #[serde(default)]
    pub description: String,
    /// Creation time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    /// Fields this client does not interpret (scenes, media, ...).
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Created-at window for [`TourFilter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DateRange {
    /// No restriction.
    #[default]
    All,
    /// Created on the current day.
    Today,
    /// Created in the last seven days.
    LastWeek,
    /// Created since the same day last month.
    LastMonth,
    /// Created since the same day last year.
    LastYear,
    /// Created between two dates, inclusive.
    Custom {
        /// First day included.
        start: NaiveDate,
        /// Last day included.
        end: NaiveDate,
    },
}

/// Client-side search over a tour list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TourFilter {
    /// Case-insensitive substring of the tour name.
    pub query: String,
    /// Created-at window.
    pub range: DateRange,
}

impl TourFilter {
    /// Whether `tour` passes the filter at time `now`.
    pub fn matches(&self, tour: &VirtualTour, now: DateTime<Utc>) -> bool {
        let query = self.query.trim().to_lowercase();
        if !query.is_empty() && !tour.name.to_lowercase().contains(&query) {
            return false;
        }

        if self.range == DateRange::All {
            return true;
        }
        let Some(created) = tour.created_at else {
            return false;
        };
        let today = now.date_naive();
        match self.range {
            DateRange::All => true,
            DateRange::Today => created.date_naive() == today,
            DateRange::LastWeek => created >= now - Duration::days(7),
            DateRange::LastMonth => today
                .checked_sub_months(Months::new(1))
                .is_some_and(|since| created.date_naive() >= since),
            DateRange::LastYear => today
                .checked_sub_months(Months::new(12))
                .is_some_and(|since| created.date_naive() >= since),
            DateRange::Custom { start, end } => {
                let day = created.date_naive();
                day >= start && day <= end
            },
        }
    }

    /// Tours passing the filter, in their original order.
    pub fn apply<'a>(&self, tours: &'a [VirtualTour], now: DateTime<Utc>) -> Vec<&'a VirtualTour> {
        tours.iter().filter(|t| self.matches(t, now)).collect()
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct InspectionList {
    #[serde(default)]
    inspections: Vec<Inspection>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreatedInspection {
    new_inspection: Inspection,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TourList {
    #[serde(default)]
    virtual_tours: Vec<VirtualTour>,
}

/// Read access to inspections and tours.
#[derive(Debug, Clone)]
pub struct ToursClient {
    api: ApiClient,
}

impl ToursClient {
    /// Wrap the shared API client.
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    /// List all inspections.
    pub async fn list_inspections(&self) -> Result<Vec<Inspection>> {
        let list: InspectionList = self.api.get_json("/inspection/get").await?;
        tracing::debug!(count = list.inspections.len(), "Fetched inspections");
        Ok(list.inspections)
    }

    /// Create an inspection. Both fields are checked locally first.
    pub async fn create_inspection(&self, input: &NewInspection) -> Result<Inspection> {
        input.validate()?;
        let created: CreatedInspection = self.api.post_json("/inspection/create", input).await?;
        tracing::info!(inspection_id = %created.new_inspection.id, "Inspection created");
        Ok(created.new_inspection)
    }

    /// Virtual tours of one inspection.
    pub async fn virtual_tours(&self, inspection_id: &str) -> Result<Vec<VirtualTour>> {
        if inspection_id.trim().is_empty() {
            return Err(Error::invalid_field("inspectionId", "Inspection id is required"));
        }
        let list: TourList = self
            .api
            .get_json(&format!("/v-tour/get/{inspection_id}"))
            .await?;
        Ok(list.virtual_tours)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn tour(name: &str, created: Option<DateTime<Utc>>) -> VirtualTour {
        VirtualTour {
            id: name.to_lowercase(),
            name: name.into(),
            description: String::new(),
            created_at: created,
            extra: Default::default(),
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 15, 12, 0, 0).unwrap()
    }

    #[test]
    fn new_inspection_requires_both_fields() {
        assert!(NewInspection::new("Block A", "Level 2 slab").validate().is_ok());
        match NewInspection::new(" ", "").validate() {
            Err(Error::Validation(v)) => assert_eq!(v.len(), 2),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn search_is_case_insensitive() {
        let tours = vec![tour("Lobby Walkthrough", None), tour("Roof", None)];
        let filter = TourFilter {
            query: "lobby".into(),
            ..Default::default()
        };
        let names: Vec<_> = filter.apply(&tours, now()).iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["Lobby Walkthrough"]);
    }

    #[test]
    fn date_ranges() {
        let recent = tour("A", Some(Utc.with_ymd_and_hms(2024, 3, 12, 9, 0, 0).unwrap()));
        let older = tour("B", Some(Utc.with_ymd_and_hms(2024, 2, 20, 9, 0, 0).unwrap()));
        let undated = tour("C", None);

        let week = TourFilter {
            range: DateRange::LastWeek,
            ..Default::default()
        };
        assert!(week.matches(&recent, now()));
        assert!(!week.matches(&older, now()));
        assert!(!week.matches(&undated, now()));

        let month = TourFilter {
            range: DateRange::LastMonth,
            ..Default::default()
        };
        assert!(month.matches(&older, now()));

        let custom = TourFilter {
            range: DateRange::Custom {
                start: NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(),
                end: NaiveDate::from_ymd_opt(2024, 2, 20).unwrap(),
            },
            ..Default::default()
        };
        assert!(custom.matches(&older, now()));
        assert!(!custom.matches(&recent, now()));

        assert!(TourFilter::default().matches(&undated, now()));
    }

    #[test]
    fn tour_keeps_unknown_fields() {
        let tour: VirtualTour = serde_json::from_str(
            r#"{"_id":"t1","name":"Lobby","createdAt":"2024-03-12T09:00:00Z","scenes":[1,2]}"#,
        )
        .unwrap();
        assert_eq!(tour.id, "t1");
        assert!(tour.created_at.is_some());
        assert_eq!(tour.extra["scenes"], serde_json::json!([1, 2]));
    }
}
