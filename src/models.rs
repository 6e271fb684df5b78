use chrono::NaiveDateTime;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::schema::plants;

/// Owner recorded when a request does not name one.
pub const GUEST_EMAIL: &str = "guest@example.com";

/// Lookup key stored next to a plant name: trimmed, Unicode lowercase.
/// SQLite's own case folding covers ASCII only.
pub fn name_key(name: &str) -> String {
    name.trim().to_lowercase()
}

/// plant row as stored.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = plants)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct PlantRow {
    pub id: i32,
    pub user_email: String,
    pub name: Option<String>,
    pub scientific_name: Option<String>,
    pub plant_type: Option<String>,
    pub sunlight: Option<String>,
    pub watering: Option<String>,
    pub soil: Option<String>,
    pub fertilizer: Option<String>,
    pub seasonality: Option<String>,
    pub seasonal_months: Option<String>,
    pub uses_notes: Option<String>,
    pub image_url: Option<String>,
    pub qr_code: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// plant details as returned over HTTP.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plant {
    pub id: i32,
    pub user_email: String,
    pub name: Option<String>,
    pub scientific_name: Option<String>,
    #[serde(rename = "plantType")]
    pub plant_type: Option<String>,
    pub sunlight: Option<String>,
    pub watering: Option<String>,
    pub soil: Option<String>,
    pub fertilizer: Option<String>,
    pub seasonality: Option<String>,
    #[serde(rename = "seasonalMonths")]
    pub seasonal_months: Option<Vec<String>>,
    pub uses_notes: Option<String>,
    pub image_url: Option<String>,
    pub qr_code: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl From<PlantRow> for Plant {
    fn from(row: PlantRow) -> Self {
        // Rows written outside this service may hold anything in the JSON column.
        let seasonal_months = row
            .seasonal_months
            .map(|raw| serde_json::from_str::<Vec<String>>(&raw).unwrap_or_default());

        Self {
            id: row.id,
            user_email: row.user_email,
            name: row.name,
            scientific_name: row.scientific_name,
            plant_type: row.plant_type,
            sunlight: row.sunlight,
            watering: row.watering,
            soil: row.soil,
            fertilizer: row.fertilizer,
            seasonality: row.seasonality,
            seasonal_months,
            uses_notes: row.uses_notes,
            image_url: row.image_url,
            qr_code: row.qr_code,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Plant fields accepted by create and update requests.
///
/// Every field is optional: create substitutes defaults, update keeps the
/// stored value for anything left out.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlantInput {
    pub user_email: Option<String>,
    pub name: Option<String>,
    pub scientific_name: Option<String>,
    #[serde(rename = "plantType")]
    pub plant_type: Option<String>,
    pub sunlight: Option<String>,
    pub watering: Option<String>,
    pub soil: Option<String>,
    pub fertilizer: Option<String>,
    pub seasonality: Option<String>,
    #[serde(rename = "seasonalMonths")]
    pub seasonal_months: Option<Vec<String>>,
    pub uses_notes: Option<String>,
    pub image_url: Option<String>,
    /// Accepted on create as a fallback for `image_url`.
    pub image: Option<String>,
    pub qr_code: Option<String>,
}

impl PlantInput {
    /// Constructs input carrying only a name.
    #[cfg(test)] // only needed in tests
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Default::default()
        }
    }

    /// Row for a create request. Empty strings are stored as null.
    pub fn into_new_plant(self) -> NewPlant {
        let name = non_empty(self.name);
        NewPlant {
            user_email: non_empty(self.user_email).unwrap_or_else(|| GUEST_EMAIL.to_owned()),
            name_key: name.as_deref().map(name_key),
            name,
            scientific_name: non_empty(self.scientific_name),
            plant_type: non_empty(self.plant_type),
            sunlight: non_empty(self.sunlight),
            watering: non_empty(self.watering),
            soil: non_empty(self.soil),
            fertilizer: non_empty(self.fertilizer),
            seasonality: non_empty(self.seasonality),
            seasonal_months: self.seasonal_months.as_deref().map(encode_months),
            uses_notes: non_empty(self.uses_notes),
            image_url: non_empty(self.image_url).or_else(|| non_empty(self.image)),
            qr_code: non_empty(self.qr_code),
        }
    }

    /// Changeset for an update request. Only supplied fields are written.
    pub fn into_changes(self) -> PlantChanges {
        PlantChanges {
            user_email: self.user_email,
            name_key: self.name.as_deref().map(name_key),
            name: self.name,
            scientific_name: self.scientific_name,
            plant_type: self.plant_type,
            sunlight: self.sunlight,
            watering: self.watering,
            soil: self.soil,
            fertilizer: self.fertilizer,
            seasonality: self.seasonality,
            seasonal_months: self.seasonal_months.as_deref().map(encode_months),
            uses_notes: self.uses_notes,
            image_url: self.image_url,
            qr_code: self.qr_code,
        }
    }
}

/// New plant row.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = plants)]
pub struct NewPlant {
    pub user_email: String,
    pub name: Option<String>,
    pub name_key: Option<String>,
    pub scientific_name: Option<String>,
    pub plant_type: Option<String>,
    pub sunlight: Option<String>,
    pub watering: Option<String>,
    pub soil: Option<String>,
    pub fertilizer: Option<String>,
    pub seasonality: Option<String>,
    pub seasonal_months: Option<String>,
    pub uses_notes: Option<String>,
    pub image_url: Option<String>,
    pub qr_code: Option<String>,
}

/// Partial update. `None` fields are skipped by diesel, which gives the
/// keep-previous-value merge.
#[derive(Debug, Clone, Default, AsChangeset)]
#[diesel(table_name = plants)]
pub struct PlantChanges {
    pub user_email: Option<String>,
    pub name: Option<String>,
    pub name_key: Option<String>,
    pub scientific_name: Option<String>,
    pub plant_type: Option<String>,
    pub sunlight: Option<String>,
    pub watering: Option<String>,
    pub soil: Option<String>,
    pub fertilizer: Option<String>,
    pub seasonality: Option<String>,
    pub seasonal_months: Option<String>,
    pub uses_notes: Option<String>,
    pub image_url: Option<String>,
    pub qr_code: Option<String>,
}

impl PlantChanges {
    pub fn is_empty(&self) -> bool {
        [
            &self.user_email,
            &self.name,
            &self.name_key,
            &self.scientific_name,
            &self.plant_type,
            &self.sunlight,
            &self.watering,
            &self.soil,
            &self.fertilizer,
            &self.seasonality,
            &self.seasonal_months,
            &self.uses_notes,
            &self.image_url,
            &self.qr_code,
        ]
        .iter()
        .all(|field| field.is_none())
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

fn encode_months(months: &[String]) -> String {
    serde_json::to_string(months).unwrap_or_else(|_| "[]".to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_substitutes_defaults_for_empty_fields() {
        let input = PlantInput {
            user_email: Some(String::new()),
            sunlight: Some(String::new()),
            image: Some("http://img/x.png".into()),
            seasonal_months: Some(vec!["Jan".into(), "Apr".into()]),
            ..PlantInput::named("Tulsi")
        };

        let row = input.into_new_plant();
        assert_eq!(row.user_email, GUEST_EMAIL);
        assert_eq!(row.name.as_deref(), Some("Tulsi"));
        assert_eq!(row.name_key.as_deref(), Some("tulsi"));
        assert_eq!(row.sunlight, None);
        assert_eq!(row.image_url.as_deref(), Some("http://img/x.png"));
        assert_eq!(row.seasonal_months.as_deref(), Some(r#"["Jan","Apr"]"#));
    }

    #[test]
    fn name_key_folds_unicode_case() {
        assert_eq!(name_key("  Érable "), "érable");
        assert_eq!(name_key("ÖLBAUM"), "ölbaum");
        assert_eq!(name_key("Tulsi"), name_key("TULSI"));

        let changes = PlantInput::named("Érable").into_changes();
        assert_eq!(changes.name.as_deref(), Some("Érable"));
        assert_eq!(changes.name_key.as_deref(), Some("érable"));
        assert_eq!(PlantInput::default().into_new_plant().name_key, None);
    }

    #[test]
    fn explicit_image_url_wins_over_image() {
        let input = PlantInput {
            image_url: Some("http://a".into()),
            image: Some("http://b".into()),
            ..Default::default()
        };
        assert_eq!(input.into_new_plant().image_url.as_deref(), Some("http://a"));
    }

    #[test]
    fn update_keeps_empty_strings_and_skips_absent_fields() {
        let changes = PlantInput {
            watering: Some("Daily".into()),
            soil: Some(String::new()),
            ..Default::default()
        }
        .into_changes();

        assert_eq!(changes.watering.as_deref(), Some("Daily"));
        assert_eq!(changes.soil.as_deref(), Some(""));
        assert!(changes.name.is_none());
        assert!(!changes.is_empty());
        assert!(PlantChanges::default().is_empty());
    }

    #[test]
    fn unreadable_month_column_becomes_empty_list() {
        let now = chrono::Utc::now().naive_utc();
        let row = PlantRow {
            id: 1,
            user_email: GUEST_EMAIL.into(),
            name: None,
            scientific_name: None,
            plant_type: None,
            sunlight: None,
            watering: None,
            soil: None,
            fertilizer: None,
            seasonality: None,
            seasonal_months: Some("not json".into()),
            uses_notes: None,
            image_url: None,
            qr_code: None,
            created_at: now,
            updated_at: now,
        };
        assert_eq!(Plant::from(row).seasonal_months, Some(vec![]));
    }
}
