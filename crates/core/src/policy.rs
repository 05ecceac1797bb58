//! Deterministic query gate that runs before any retrieval or model call.
//!
//! Rules are data: an ordered list of `(category, pattern)` pairs matched
//! case-insensitively. Categories are evaluated in [`CATEGORY_PRECEDENCE`]
//! order and the first category with a hit decides, so a query that both
//! tries to override instructions and asks for a key is reported as
//! `prompt_injection`.

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonCode {
    PromptInjection,
    UnsafeRequest,
}

impl ReasonCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReasonCode::PromptInjection => "prompt_injection",
            ReasonCode::UnsafeRequest => "unsafe_request",
        }
    }
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub const CATEGORY_PRECEDENCE: [ReasonCode; 2] = [ReasonCode::PromptInjection, ReasonCode::UnsafeRequest];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Allow,
    Refuse,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyDecision {
    pub decision: Decision,
    pub reasons: Vec<ReasonCode>,
}

impl PolicyDecision {
    pub fn allow() -> Self {
        Self {
            decision: Decision::Allow,
            reasons: Vec::new(),
        }
    }

    pub fn refuse(reason: ReasonCode) -> Self {
        Self {
            decision: Decision::Refuse,
            reasons: vec![reason],
        }
    }

    pub fn is_refusal(&self) -> bool {
        self.decision == Decision::Refuse
    }

    pub fn primary_reason(&self) -> Option<ReasonCode> {
        self.reasons.first().copied()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PolicyRule {
    pub category: ReasonCode,
    pub pattern: &'static str,
}

const fn rule(category: ReasonCode, pattern: &'static str) -> PolicyRule {
    PolicyRule { category, pattern }
}

use ReasonCode::{PromptInjection, UnsafeRequest};

pub const DEFAULT_RULES: &[PolicyRule] = &[
    // instruction override
    rule(
        PromptInjection,
        r"\b(?:ignore|disregard|forget|override)\s+(?:all\s+|any\s+)?(?:of\s+)?(?:the\s+|your\s+)?(?:previous\s+|prior\s+|above\s+|earlier\s+)?(?:instructions|rules|prompts?)\b",
    ),
    rule(PromptInjection, r"\bdisregard\s+(?:the\s+|everything\s+)?above\b"),
    // hidden prompt / role impersonation
    rule(PromptInjection, r"\bsystem\s+prompt\b"),
    rule(PromptInjection, r"\b(?:developer|system)\s+message\b"),
    rule(PromptInjection, r"(?m)^\s*(?:system|developer)\s*:"),
    rule(PromptInjection, r"\bact\s+as\b"),
    rule(PromptInjection, r"\byou\s+are\s+now\b"),
    rule(PromptInjection, r"\bfrom\s+now\s+on\b"),
    rule(PromptInjection, r"\bpretend\s+(?:to\s+be|you\s+are)\b"),
    rule(PromptInjection, r"\bjailbreak"),
    // raw context exfiltration
    rule(
        PromptInjection,
        r"\b(?:output|print|show|dump|return|repeat|reveal)\s+(?:me\s+)?(?:the\s+)?(?:raw\s+|full\s+|entire\s+|unfiltered\s+)?context\b",
    ),
    rule(PromptInjection, r"\b(?:raw|unfiltered)\s+(?:context|chunks|document\s+text)\b"),
    rule(PromptInjection, r"\b(?:context|chunks|prompt)\s+as-is\b"),
    // credentials
    rule(UnsafeRequest, r"api[\s_-]?keys?\b"),
    rule(UnsafeRequest, r"\bopenai\s+key\b"),
    rule(UnsafeRequest, r"\bsk-"),
    rule(UnsafeRequest, r"\b(?:access|auth|bearer|secret)[\s_-]?(?:keys?|tokens?)\b"),
    rule(UnsafeRequest, r"\bprivate\s+key\b"),
    rule(UnsafeRequest, r"\bpasswords?\b"),
    // environment and configuration secrets
    rule(UnsafeRequest, r"\benv(?:ironment)?\s+var(?:iable)?s?\b"),
    rule(UnsafeRequest, r"\bread\s+(?:the\s+)?environment\b"),
    rule(UnsafeRequest, r"\bdump\s+(?:the\s+)?env\b"),
    rule(UnsafeRequest, r"\bdotenv\b"),
    rule(UnsafeRequest, r"(?:^|[\s/'`])\.env\b"),
    rule(UnsafeRequest, r"\bos\.environ\b"),
    rule(UnsafeRequest, r"\bprocess\.env\b"),
];

#[derive(Debug, Clone)]
struct CompiledRule {
    category: ReasonCode,
    pattern: &'static str,
    regex: Regex,
}

#[derive(Debug, Clone)]
pub struct PolicyGate {
    rules: Vec<CompiledRule>,
}

impl PolicyGate {
    pub fn new(rules: &[PolicyRule]) -> Result<Self, regex::Error> {
        let rules = rules
            .iter()
            .map(|rule| {
                Ok(CompiledRule {
                    category: rule.category,
                    pattern: rule.pattern,
                    regex: RegexBuilder::new(rule.pattern).case_insensitive(true).build()?,
                })
            })
            .collect::<Result<Vec<_>, regex::Error>>()?;
        Ok(Self { rules })
    }

    pub fn with_default_rules() -> Result<Self, regex::Error> {
        Self::new(DEFAULT_RULES)
    }

    pub fn evaluate(&self, query: &str) -> PolicyDecision {
        for category in CATEGORY_PRECEDENCE {
            let hit = self
                .rules
                .iter()
                .filter(|rule| rule.category == category)
                .find(|rule| rule.regex.is_match(query));

            if let Some(rule) = hit {
                debug!(reason = %category, pattern = rule.pattern, "policy rule matched");
                return PolicyDecision::refuse(category);
            }
        }
        PolicyDecision::allow()
    }
}
