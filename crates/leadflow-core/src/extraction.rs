use crate::{LeadDetails, LeadDraft, LeadPriority};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

pub const EXTRACTION_PROMPT_VERSION: &str = "lead-extract.v1";

/// User-facing messages for the parse action.
pub const EMPTY_INPUT_MESSAGE: &str = "Input text cannot be empty.";
pub const PARSE_FAILED_MESSAGE: &str = "Failed to parse lead data with AI.";

/// Field name and the description the model sees, in prompt order.
pub const EXTRACTION_FIELDS: [(&str, &str); 16] = [
    ("leadDate", "The date of the lead."),
    ("leadType", "The type of lead (e.g., buyer, seller)."),
    (
        "sellerBuyerContact",
        "The contact information of the seller or buyer.",
    ),
    ("frequency", "The frequency of the lead (e.g., weekly, monthly)."),
    ("itemDetails", "Details about the item in the lead."),
    ("purity", "The purity of the item."),
    ("packing", "The packing details."),
    ("qty", "The quantity of the item."),
    ("warehouse", "The warehouse information."),
    ("sample", "Sample details."),
    ("marketRate", "The market rate."),
    ("sellerBuyerName", "The name of the seller or buyer."),
    ("sellerBuyerRate", "The rate offered by the seller or buyer."),
    ("aikyanRate", "The Aikyan rate."),
    ("note", "Any additional notes about the lead."),
    (
        "priority",
        "Analyze the text for urgency, large quantities, or direct statements of priority. \
         Classify as 'High', 'Medium', or 'Low'. If no strong signals are present, default to 'Medium'.",
    ),
];

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionFailureKind {
    EmptyInput,
    NotConfigured,
    Timeout,
    ProviderError,
    InvalidOutput,
}

impl ExtractionFailureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::EmptyInput => "empty_input",
            Self::NotConfigured => "not_configured",
            Self::Timeout => "timeout",
            Self::ProviderError => "provider_error",
            Self::InvalidOutput => "invalid_output",
        }
    }
}

impl fmt::Display for ExtractionFailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, thiserror::Error)]
#[error("lead extraction failed ({kind}): {message}")]
pub struct ExtractionError {
    pub kind: ExtractionFailureKind,
    pub message: String,
}

impl ExtractionError {
    pub fn new(kind: ExtractionFailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Turns raw lead text into structured fields.
#[async_trait]
pub trait LeadExtractor: Send + Sync {
    fn name(&self) -> &str;

    async fn extract(&self, raw_text: &str) -> Result<LeadDraft, ExtractionError>;
}

pub fn system_prompt() -> &'static str {
    "You are an AI assistant that extracts structured information from raw lead data text. \
     Respond with a single JSON object and nothing else."
}

pub fn build_prompt(raw_text: &str) -> String {
    let mut prompt = String::from(
        "Given the raw lead text, extract the following fields if present:\n\n",
    );
    for (field, description) in EXTRACTION_FIELDS {
        prompt.push_str(&format!("- {field}: {description}\n"));
    }
    prompt.push_str("\nRaw Lead Text: ");
    prompt.push_str(raw_text.trim());
    prompt.push_str("\n\nReturn the extracted fields in JSON format. Omit fields that are not present.");
    prompt
}

/// Reads the model reply into a draft. Priority falls back to `Medium`.
pub fn parse_extraction_output(raw: &str) -> Result<LeadDraft, ExtractionError> {
    let object = outermost_json_object(raw).ok_or_else(|| {
        ExtractionError::new(
            ExtractionFailureKind::InvalidOutput,
            "model reply did not contain a JSON object",
        )
    })?;
    let map = match serde_json::from_str::<Value>(object) {
        Ok(Value::Object(map)) => map,
        Ok(_) => {
            return Err(ExtractionError::new(
                ExtractionFailureKind::InvalidOutput,
                "model reply was not a JSON object",
            ))
        }
        Err(err) => {
            return Err(ExtractionError::new(
                ExtractionFailureKind::InvalidOutput,
                format!("model reply parse error: {err}"),
            ))
        }
    };

    let mut details = LeadDetails::default();
    for (field, slot) in details.fields_mut() {
        *slot = text_value(&map, field);
    }
    let priority = text_value(&map, "priority")
        .and_then(|label| label.parse::<LeadPriority>().ok())
        .unwrap_or_default();

    Ok(LeadDraft {
        details,
        priority: Some(priority),
    })
}

fn text_value(map: &Map<String, Value>, key: &str) -> Option<String> {
    let text = match map.get(key)? {
        Value::Null => return None,
        Value::String(text) => text.trim().to_string(),
        Value::Number(number) => number.to_string(),
        Value::Bool(flag) => flag.to_string(),
        other => other.to_string(),
    };
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

fn outermost_json_object(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&raw[start..=end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_lists_every_field_and_the_raw_text() {
        let prompt = build_prompt("  Need 20MT turmeric weekly, call 98200  ");
        for (field, _) in EXTRACTION_FIELDS {
            assert!(prompt.contains(&format!("- {field}:")), "missing {field}");
        }
        assert!(prompt.contains("Raw Lead Text: Need 20MT turmeric weekly, call 98200\n"));
    }

    #[test]
    fn fenced_reply_is_parsed_and_priority_defaults_to_medium() {
        let reply = "Here you go:\n```json\n{\"leadType\": \"Buyer\", \"qty\": 20, \
                     \"itemDetails\": \"Turmeric\", \"note\": \"\", \"unknown\": \"x\"}\n```";
        let draft = parse_extraction_output(reply).expect("parse reply");
        assert_eq!(draft.details.lead_type.as_deref(), Some("Buyer"));
        assert_eq!(draft.details.qty.as_deref(), Some("20"));
        assert_eq!(draft.details.item_details.as_deref(), Some("Turmeric"));
        assert_eq!(draft.details.note, None);
        assert_eq!(draft.priority, Some(LeadPriority::Medium));
    }

    #[test]
    fn explicit_priority_is_kept_and_garbage_is_rejected() {
        let draft = parse_extraction_output(r#"{"priority":"High"}"#).expect("parse");
        assert_eq!(draft.priority, Some(LeadPriority::High));

        let err = parse_extraction_output("no json here").expect_err("invalid");
        assert_eq!(err.kind, ExtractionFailureKind::InvalidOutput);
        let err = parse_extraction_output("{not json}").expect_err("invalid");
        assert_eq!(err.kind, ExtractionFailureKind::InvalidOutput);
    }
}
