//! Structured extraction against a completion model.
//!
//! One extraction call, and if its output does not validate, exactly one
//! repair call that feeds the invalid text back. A second failure is fatal.

use crate::config::AnalysisOptions;
use crate::error::PipelineError;
use crate::schema::{DocumentSummary, SchemaError};
use crate::traits::{CompletionProvider, CompletionRequest};
use std::time::Instant;
use thiserror::Error;
use tracing::{info, warn};

pub const SYSTEM_PROMPT: &str = "You are a strict information extraction engine.

Rules:
- Use ONLY the provided context.
- Do NOT infer or invent facts.
- If information is missing, return null or empty lists.
- Output ONLY valid JSON.
- No explanations, no commentary.";

const SCHEMA_SKETCH: &str = r#"{
  "candidate_name": string|null,
  "location": string|null,
  "email": string|null,
  "summary_points": [string],
  "skills": [string],
  "experience": [
    {
      "company": string,
      "role": string|null,
      "start": string|null,
      "end": string|null,
      "highlights": [string]
    }
  ]
}"#;

pub fn extraction_prompt(context: &str) -> String {
    format!(
        "Extract structured information from the document context below.

Hard rules:
- Output must be VALID JSON matching the schema.
- Use ONLY facts explicitly present in the context.
- Do NOT add companies/roles/dates/skills that are not mentioned.
- If a field is unknown, use null or [].

Schema:
{SCHEMA_SKETCH}

Output constraints:
- Keep lists concise (<= 8 skills, <= 3 highlights per experience unless clearly more).
- Remove duplicates and near-duplicates.

Context:
{context}"
    )
}

pub fn repair_prompt(raw: &str) -> String {
    format!(
        "Fix the following into VALID JSON only.
It must match this schema. Do not add keys not present in the schema.
Return only JSON.

Schema:
{SCHEMA_SKETCH}

RAW:
{raw}"
    )
}

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("no JSON object or array found")]
    NoJson,

    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("schema violation: {0}")]
    Schema(#[from] SchemaError),
}

/// Removes a surrounding markdown code fence (```` ``` ```` or ```` ```json ````).
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    if !trimmed.starts_with("```") {
        return trimmed;
    }

    let body = match trimmed.find('\n') {
        Some(newline) => &trimmed[newline + 1..],
        None => return "",
    };
    let body = body.trim_end();
    body.strip_suffix("```").unwrap_or(body).trim()
}

/// Finds the JSON payload inside model output: the first balanced `{...}`,
/// or failing that the first balanced `[...]`. Brackets inside string
/// literals are ignored. Returns `None` rather than guessing when neither
/// closes.
pub fn extract_json_text(raw: &str) -> Option<&str> {
    let text = strip_code_fence(raw);
    balanced_span(text, '{', '}').or_else(|| balanced_span(text, '[', ']'))
}

fn balanced_span(text: &str, open: char, close: char) -> Option<&str> {
    let start = text.find(open)?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }

        if ch == '"' {
            in_string = true;
        } else if ch == open {
            depth += 1;
        } else if ch == close {
            depth -= 1;
            if depth == 0 {
                return Some(&text[start..start + offset + ch.len_utf8()]);
            }
        }
    }

    None
}

pub fn parse_summary(raw: &str) -> Result<DocumentSummary, ParseError> {
    let json = extract_json_text(raw).ok_or(ParseError::NoJson)?;
    let value: serde_json::Value = serde_json::from_str(json)?;
    Ok(DocumentSummary::from_value(value)?)
}

/// Terminal state of one extraction run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionStage {
    /// Nothing to ground on; no model call was made.
    EmptyContext,
    Parsed,
    Repaired,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    pub summary: DocumentSummary,
    pub stage: ExtractionStage,
}

pub struct Extractor<C> {
    provider: C,
    options: AnalysisOptions,
}

impl<C> Extractor<C>
where
    C: CompletionProvider,
{
    pub fn new(provider: C, options: AnalysisOptions) -> Self {
        Self { provider, options }
    }

    pub fn provider(&self) -> &C {
        &self.provider
    }

    pub async fn extract(&self, context: &str) -> Result<Extraction, PipelineError> {
        if context.trim().is_empty() {
            warn!("empty_context: returning empty schema (fail-safe)");
            return Ok(Extraction {
                summary: DocumentSummary::default(),
                stage: ExtractionStage::EmptyContext,
            });
        }

        let started = Instant::now();
        let raw = self.complete_with_one_retry(&self.request(extraction_prompt(context))).await?;
        info!(
            raw_chars = raw.chars().count(),
            llm_ms = started.elapsed().as_secs_f64() * 1000.0,
            "llm"
        );

        let error = match parse_summary(&raw) {
            Ok(summary) => {
                return Ok(Extraction {
                    summary,
                    stage: ExtractionStage::Parsed,
                })
            }
            Err(error) => error,
        };
        warn!(error = %error, "model output failed validation, requesting repair");

        let fixed = self.provider.complete(&self.request(repair_prompt(&raw))).await?;
        match parse_summary(&fixed) {
            Ok(summary) => Ok(Extraction {
                summary,
                stage: ExtractionStage::Repaired,
            }),
            Err(error) => {
                warn!(error = %error, "repair output failed validation");
                Err(PipelineError::ParseFailure {
                    stage: "repair",
                    preview: preview(&fixed, self.options.preview_chars),
                })
            }
        }
    }

    fn request(&self, user: String) -> CompletionRequest {
        CompletionRequest {
            system: SYSTEM_PROMPT.to_string(),
            user,
            temperature: self.options.temperature,
            max_tokens: self.options.max_output_tokens,
        }
    }

    async fn complete_with_one_retry(&self, request: &CompletionRequest) -> Result<String, PipelineError> {
        match self.provider.complete(request).await {
            Ok(text) => Ok(text),
            Err(error) if error.is_transient() => {
                warn!(error = %error, "transient extraction failure, retrying once");
                Ok(self.provider.complete(request).await?)
            }
            Err(error) => Err(error.into()),
        }
    }
}

pub fn preview(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
