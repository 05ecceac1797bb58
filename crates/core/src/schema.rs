//! The structured result of an analysis run and its validation rules.
//!
//! Every optional field has a typed default and is always serialized, so a
//! summary read back from JSON is field-for-field identical to the one written.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use serde_with::{serde_as, DefaultOnNull};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("expected a JSON object at the top level, found {0}")]
    NotAnObject(&'static str),

    #[error("field mismatch: {0}")]
    Field(#[from] serde_json::Error),

    #[error("refusal={refusal} disagrees with refusal_reason={reason:?}")]
    InconsistentRefusal {
        refusal: bool,
        reason: Option<String>,
    },
}

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExperienceItem {
    pub company: String,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub start: Option<String>,
    #[serde(default)]
    pub end: Option<String>,
    #[serde_as(deserialize_as = "DefaultOnNull")]
    #[serde(default)]
    pub highlights: Vec<String>,
}

#[serde_as]
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DocumentSummary {
    #[serde_as(deserialize_as = "DefaultOnNull")]
    #[serde(default)]
    pub refusal: bool,
    #[serde(default)]
    pub refusal_reason: Option<String>,
    #[serde(default)]
    pub candidate_name: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde_as(deserialize_as = "DefaultOnNull")]
    #[serde(default)]
    pub summary_points: Vec<String>,
    #[serde_as(deserialize_as = "DefaultOnNull")]
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde_as(deserialize_as = "DefaultOnNull")]
    #[serde(default)]
    pub experience: Vec<ExperienceItem>,
}

impl DocumentSummary {
    pub fn refusal(reason: impl Into<String>) -> Self {
        Self {
            refusal: true,
            refusal_reason: Some(reason.into()),
            ..Self::default()
        }
    }

    /// Validates a parsed JSON value against the summary schema.
    ///
    /// Unknown keys are ignored; a non-object payload, a missing
    /// `experience[].company`, a mistyped field or a refusal flag that
    /// disagrees with its reason are all rejected.
    pub fn from_value(value: Value) -> Result<Self, SchemaError> {
        if !value.is_object() {
            return Err(SchemaError::NotAnObject(json_kind(&value)));
        }

        let summary: DocumentSummary = serde_json::from_value(value)?;
        summary.check_refusal()?;
        Ok(summary)
    }

    pub fn check_refusal(&self) -> Result<(), SchemaError> {
        if self.refusal != self.refusal_reason.is_some() {
            return Err(SchemaError::InconsistentRefusal {
                refusal: self.refusal,
                reason: self.refusal_reason.clone(),
            });
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
