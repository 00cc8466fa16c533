use crate::{LeadDetails, LeadDraft, LeadPatch, LeadPriority, LeadStatus, SampleStatus};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub const MAX_FIELD_CHARS: usize = 2_000;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ValidationIssue {
    pub field: String,
    pub message: String,
}

impl ValidationIssue {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
#[error("validation failed: {}", summarize(.issues))]
pub struct ValidationErrors {
    pub issues: Vec<ValidationIssue>,
}

fn summarize(issues: &[ValidationIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Untrusted create / edit payload. Enum fields arrive as labels and are checked here.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LeadForm {
    #[serde(flatten)]
    pub details: LeadDetails,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gc_image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clipboard: Option<String>,
}

impl LeadForm {
    /// New leads always start as `New`; `status` and `sampleStatus` are ignored here.
    /// `gcImage` and `clipboard` are checked like any text field but only stored by an
    /// update, so a create drops them.
    pub fn into_draft(self) -> Result<LeadDraft, ValidationErrors> {
        let mut issues = Vec::new();
        check_text_fields(&self.details, &mut issues);
        check_attachments(&self, &mut issues);
        let priority = parse_label::<LeadPriority>("priority", self.priority.as_deref(), &mut issues);
        if !issues.is_empty() {
            return Err(ValidationErrors { issues });
        }

        let mut details = self.details;
        for (_, value) in details.fields_mut() {
            if value.as_deref().is_some_and(|text| text.trim().is_empty()) {
                *value = None;
            }
        }
        Ok(LeadDraft { details, priority })
    }

    pub fn into_patch(self) -> Result<LeadPatch, ValidationErrors> {
        let mut issues = Vec::new();
        check_text_fields(&self.details, &mut issues);
        check_attachments(&self, &mut issues);
        let status = parse_label::<LeadStatus>("status", self.status.as_deref(), &mut issues);
        let sample_status =
            parse_label::<SampleStatus>("sampleStatus", self.sample_status.as_deref(), &mut issues);
        let priority = parse_label::<LeadPriority>("priority", self.priority.as_deref(), &mut issues);
        if !issues.is_empty() {
            return Err(ValidationErrors { issues });
        }

        Ok(LeadPatch {
            details: self.details,
            status,
            sample_status,
            priority,
            gc_image: self.gc_image,
            clipboard: self.clipboard,
        })
    }
}

/// Extracted drafts go back through the form so model output meets the same limits.
impl From<LeadDraft> for LeadForm {
    fn from(draft: LeadDraft) -> Self {
        Self {
            details: draft.details,
            priority: draft.priority.map(|priority| priority.as_str().to_string()),
            ..Self::default()
        }
    }
}

fn check_attachments(form: &LeadForm, issues: &mut Vec<ValidationIssue>) {
    for (field, value) in [("gcImage", &form.gc_image), ("clipboard", &form.clipboard)] {
        check_text(field, value.as_deref(), issues);
    }
}

fn check_text_fields(details: &LeadDetails, issues: &mut Vec<ValidationIssue>) {
    for (field, value) in details.fields() {
        check_text(field, value.as_deref(), issues);
    }
}

fn check_text(field: &str, value: Option<&str>, issues: &mut Vec<ValidationIssue>) {
    let Some(value) = value else {
        return;
    };
    if value.chars().count() > MAX_FIELD_CHARS {
        issues.push(ValidationIssue::new(
            field,
            format!("must be at most {MAX_FIELD_CHARS} characters"),
        ));
    }
    if value
        .chars()
        .any(|ch| ch.is_control() && !matches!(ch, '\n' | '\r' | '\t'))
    {
        issues.push(ValidationIssue::new(
            field,
            "contains control characters",
        ));
    }
}

// Blank labels mean "not provided".
fn parse_label<T>(field: &str, value: Option<&str>, issues: &mut Vec<ValidationIssue>) -> Option<T>
where
    T: std::str::FromStr<Err = String>,
{
    let value = value.filter(|value| !value.trim().is_empty())?;
    match value.parse::<T>() {
        Ok(parsed) => Some(parsed),
        Err(message) => {
            issues.push(ValidationIssue::new(field, message));
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn draft_normalizes_blank_fields_and_parses_priority() {
        let form = LeadForm {
            details: LeadDetails {
                item_details: Some("Turmeric fingers".to_string()),
                note: Some("   ".to_string()),
                ..LeadDetails::default()
            },
            priority: Some("high".to_string()),
            status: Some("Dead".to_string()),
            ..LeadForm::default()
        };

        let draft = form.into_draft().expect("valid form");
        assert_eq!(draft.details.item_details.as_deref(), Some("Turmeric fingers"));
        assert_eq!(draft.details.note, None);
        assert_eq!(draft.priority, Some(LeadPriority::High));
    }

    #[test]
    fn every_issue_is_reported_before_failing() {
        let form = LeadForm {
            details: LeadDetails {
                qty: Some("x".repeat(MAX_FIELD_CHARS + 1)),
                note: Some("bell\u{7}".to_string()),
                ..LeadDetails::default()
            },
            status: Some("archived".to_string()),
            sample_status: Some("lost".to_string()),
            ..LeadForm::default()
        };

        let err = form.into_patch().expect_err("invalid form");
        let fields = err
            .issues
            .iter()
            .map(|issue| issue.field.as_str())
            .collect::<Vec<_>>();
        assert_eq!(fields, vec!["qty", "note", "status", "sampleStatus"]);
        assert!(err.to_string().starts_with("validation failed: qty:"));
    }

    #[test]
    fn patch_keeps_blank_strings_so_fields_can_be_cleared() {
        let form: LeadForm = serde_json::from_value(serde_json::json!({
            "note": "",
            "status": "Follow-up needed",
            "sampleStatus": "Sent"
        }))
        .expect("form json");

        let patch = form.into_patch().expect("valid patch");
        assert_eq!(patch.details.note.as_deref(), Some(""));
        assert_eq!(patch.status, Some(LeadStatus::FollowUpNeeded));
        assert_eq!(patch.sample_status, Some(SampleStatus::Sent));
        assert_eq!(patch.priority, None);
    }

    #[test]
    fn create_checks_attachments_but_does_not_keep_them() {
        let form = LeadForm {
            gc_image: Some("gc-\u{0}.png".to_string()),
            ..LeadForm::default()
        };
        let err = form.into_draft().expect_err("control character");
        assert_eq!(err.issues[0].field, "gcImage");

        let form = LeadForm {
            clipboard: Some("copied text".to_string()),
            ..LeadForm::default()
        };
        let draft = form.into_draft().expect("valid");
        assert_eq!(draft, LeadDraft::default());
    }

    #[test]
    fn extracted_drafts_are_revalidated_through_the_form() {
        let draft = LeadDraft {
            details: LeadDetails {
                note: Some("x".repeat(MAX_FIELD_CHARS + 1)),
                qty: Some("  ".to_string()),
                ..LeadDetails::default()
            },
            priority: Some(LeadPriority::Low),
        };
        let err = LeadForm::from(draft.clone())
            .into_draft()
            .expect_err("too long");
        assert_eq!(err.issues[0].field, "note");

        let mut accepted = draft;
        accepted.details.note = Some("call after 5".to_string());
        let cleaned = LeadForm::from(accepted).into_draft().expect("valid");
        assert_eq!(cleaned.details.qty, None);
        assert_eq!(cleaned.priority, Some(LeadPriority::Low));
    }
}
