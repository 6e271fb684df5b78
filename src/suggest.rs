//! Best-effort plant care suggestions from the text model.
//!
//! Model output is untrusted: it may be fenced, truncated, or shaped
//! differently than asked. Every field is checked on its own and dropped
//! when it does not fit.

use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::ai::AiProvider;
use crate::error::AppError;

const SYSTEM_PROMPT: &str = "You are a helpful botanist. Return concise factual care info as JSON.
Keys:
- scientific_name (string)
- watering (string)
- sunlight (string)
- soil (string)
- fertilizer (string)
- seasonality (string)
- seasonalMonths (array of 3-letter month codes, e.g. [\"Jan\",\"Apr\"])
- uses_notes (string)
- image (optional absolute URL photo; leave empty if unsure)";

const MONTHS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// Care attributes suggested for a plant. Absent fields are omitted from
/// the JSON; `seasonalMonths` is always present.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PlantAttributes {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scientific_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub watering: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sunlight: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub soil: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fertilizer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seasonality: Option<String>,
    #[serde(rename = "seasonalMonths")]
    pub seasonal_months: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uses_notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

pub struct SuggestionService {
    provider: Option<Arc<dyn AiProvider>>,
}

impl SuggestionService {
    pub fn new(provider: Option<Arc<dyn AiProvider>>) -> Self {
        Self { provider }
    }

    pub async fn suggest(&self, raw_name: &str) -> Result<PlantAttributes, AppError> {
        let provider = self
            .provider
            .as_ref()
            .ok_or_else(|| AppError::Configuration("OPENAI_API_KEY missing".to_string()))?;

        let name = raw_name.trim();
        if name.is_empty() {
            return Err(AppError::Validation("plantName required".to_string()));
        }

        let user = format!("Give JSON for plant \"{name}\". Only JSON, no prose.");
        let raw = provider
            .complete(SYSTEM_PROMPT, &user)
            .await
            .map_err(AppError::upstream("suggestion"))?;

        let attributes = parse_attributes(&raw);
        tracing::debug!(
            plant = name,
            months = attributes.seasonal_months.len(),
            "suggestion parsed"
        );
        Ok(attributes)
    }
}

/// Remove markdown code fences the model likes to wrap JSON in.
pub fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let without_open = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```JSON"))
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    without_open
        .trim()
        .strip_suffix("```")
        .unwrap_or(without_open)
        .trim()
}

/// Parse model output into attributes, never failing.
pub fn parse_attributes(raw: &str) -> PlantAttributes {
    let object = match serde_json::from_str::<Value>(strip_code_fences(raw)) {
        Ok(Value::Object(object)) => object,
        _ => return PlantAttributes::default(),
    };

    PlantAttributes {
        scientific_name: text(&object, "scientific_name"),
        watering: text(&object, "watering"),
        sunlight: text(&object, "sunlight"),
        soil: text(&object, "soil"),
        fertilizer: text(&object, "fertilizer"),
        seasonality: text(&object, "seasonality"),
        seasonal_months: months(object.get("seasonalMonths")),
        uses_notes: text(&object, "uses_notes"),
        image: text(&object, "image").filter(|url| {
            url.starts_with("https://") || url.starts_with("http://")
        }),
    }
}

fn text(object: &Map<String, Value>, key: &str) -> Option<String> {
    match object.get(key) {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        _ => None,
    }
}

/// Month codes in calendar order, each at most once. Accepts codes or full
/// names in any case; everything else is dropped.
fn months(value: Option<&Value>) -> Vec<String> {
    let Some(Value::Array(items)) = value else {
        return Vec::new();
    };

    let mut seen = [false; 12];
    for item in items {
        if let Some(index) = item.as_str().and_then(month_index) {
            seen[index] = true;
        }
    }

    MONTHS
        .iter()
        .zip(seen)
        .filter(|(_, present)| *present)
        .map(|(code, _)| code.to_string())
        .collect()
}

fn month_index(raw: &str) -> Option<usize> {
    let lower = raw.trim().to_ascii_lowercase();
    if lower.len() < 3 {
        return None;
    }
    MONTHS.iter().position(|code| {
        let code = code.to_ascii_lowercase();
        lower == code || (lower.starts_with(&code) && is_full_month(&lower))
    })
}

fn is_full_month(lower: &str) -> bool {
    const FULL: [&str; 12] = [
        "january", "february", "march", "april", "may", "june", "july", "august", "september",
        "october", "november", "december",
    ];
    FULL.contains(&lower) || lower == "sept"
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::FakeProvider;

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(strip_code_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("```\n{}\n```"), "{}");
        assert_eq!(strip_code_fences("  {\"a\":1} "), "{\"a\":1}");
    }

    #[test]
    fn test_invalid_json_yields_only_empty_months() {
        let attributes = parse_attributes("Sorry, I can't help with that.");
        assert_eq!(attributes, PlantAttributes::default());
        assert_eq!(
            serde_json::to_value(&attributes).unwrap(),
            serde_json::json!({ "seasonalMonths": [] })
        );
    }

    #[test]
    fn test_non_object_json_is_empty() {
        assert_eq!(parse_attributes("[1, 2, 3]"), PlantAttributes::default());
        assert_eq!(parse_attributes("\"tulsi\""), PlantAttributes::default());
    }

    #[test]
    fn test_fenced_response_is_parsed() {
        let raw = "```json\n{\"scientific_name\": \"Ocimum tenuiflorum\", \"watering\": \"Daily\", \"seasonalMonths\": [\"Jul\", \"Mar\"]}\n```";
        let attributes = parse_attributes(raw);
        assert_eq!(attributes.scientific_name.as_deref(), Some("Ocimum tenuiflorum"));
        assert_eq!(attributes.watering.as_deref(), Some("Daily"));
        assert_eq!(attributes.seasonal_months, vec!["Mar", "Jul"]);
        assert_eq!(attributes.soil, None);
    }

    #[test]
    fn test_fields_of_wrong_type_are_dropped() {
        let raw = r#"{"watering": 3, "soil": "", "sunlight": ["full"], "seasonalMonths": "all year", "image": "not a url"}"#;
        let attributes = parse_attributes(raw);
        assert_eq!(attributes, PlantAttributes::default());
    }

    #[test]
    fn test_months_are_coerced() {
        let raw = r#"{"seasonalMonths": ["april", "JAN", "Apr", "Sept", "Smarch", 7, "dec"]}"#;
        assert_eq!(
            parse_attributes(raw).seasonal_months,
            vec!["Jan", "Apr", "Sep", "Dec"]
        );
    }

    #[test]
    fn test_image_must_be_absolute_url() {
        let raw = r#"{"image": "https://upload.example/tulsi.jpg"}"#;
        assert_eq!(
            parse_attributes(raw).image.as_deref(),
            Some("https://upload.example/tulsi.jpg")
        );
    }

    #[tokio::test]
    async fn test_missing_provider_is_configuration_error() {
        let service = SuggestionService::new(None);
        let err = service.suggest("tulsi").await.unwrap_err();
        assert!(matches!(err, AppError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_blank_name_never_calls_provider() {
        let provider = Arc::new(FakeProvider::new());
        let service = SuggestionService::new(Some(provider.clone()));
        let err = service.suggest("   ").await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(provider.chat_calls(), 0);
    }

    #[tokio::test]
    async fn test_prompt_mentions_plant() {
        let provider = Arc::new(FakeProvider::new().with_chat_response(r#"{"soil": "Loamy"}"#));
        let service = SuggestionService::new(Some(provider.clone()));
        let attributes = service.suggest(" Tulsi ").await.unwrap();
        assert_eq!(attributes.soil.as_deref(), Some("Loamy"));
        assert_eq!(
            provider.prompts(),
            vec!["Give JSON for plant \"Tulsi\". Only JSON, no prose.".to_string()]
        );
    }
}
