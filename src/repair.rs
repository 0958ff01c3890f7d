//! Turning free-text completions into a [`CorrectionResult`].
//!
//! The loop is an explicit state machine with a hard bound of
//! [`MAX_GENERATION_ATTEMPTS`] completions, the first of which the caller has
//! already obtained:
//!
//! ```text
//! AwaitingCompletion ──ok──▶ Parsed ──▶ Done
//!        │
//!        └─invalid─▶ Invalid ──attempts left──▶ Retry ──▶ AwaitingCompletion
//!                       │                          │
//!                       └──bound reached──▶ FinalFallback ◀─transport error
//!                                               │
//!                                               ▼
//!                                              Done
//! ```

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::types::CorrectionResult;
use crate::GecError;

/// Completions per request, counting the first one.
pub const MAX_GENERATION_ATTEMPTS: u32 = 2;

/// Appended to the prompt when asking for a second completion.
pub const RETRY_INSTRUCTION: &str =
    "IMPORTANT: Return only a single valid JSON object with keys: input, reasoning, correction, error_type.";

/// Line marker used to salvage a correction from prose.
pub const CORRECTION_MARKER: &str = "Correction:";

/// Somewhere to get another completion from.
#[async_trait]
pub trait CompletionSource: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, GecError>;
}

/// Why a completion could not be read as a result.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseFailure {
    #[error("no JSON object in completion")]
    NoJsonObject,
    #[error("invalid JSON: {0}")]
    InvalidJson(String),
    #[error("JSON value is not an object")]
    NotAnObject,
    #[error("missing field `{0}`")]
    MissingField(&'static str),
    #[error("field `{0}` is not a string")]
    WrongType(&'static str),
    #[error("correction is empty")]
    EmptyCorrection,
}

/// Which path produced the final result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepairSource {
    /// A completion parsed as a valid JSON result.
    Structured,
    /// Salvaged from a `Correction:` line.
    Marker,
    /// Nothing usable; the correction is empty.
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepairOutcome {
    pub result: CorrectionResult,
    /// Completions consumed, including the first.
    pub attempts: u32,
    pub source: RepairSource,
}

impl RepairOutcome {
    pub fn is_total_failure(&self) -> bool {
        self.source == RepairSource::Failed
    }
}

enum RepairState {
    /// A completion for `attempt` is in hand and has not been parsed yet.
    AwaitingCompletion { attempt: u32, raw: String },
    Parsed { attempt: u32, result: CorrectionResult },
    Invalid {
        attempt: u32,
        raw: String,
        reason: ParseFailure,
    },
    /// Ask for completion number `attempt`.
    Retry { attempt: u32, prompt: String },
    FinalFallback { attempts: u32, raw: String },
    Done(RepairOutcome),
}

/// Bounded parse-and-retry protocol.
#[derive(Debug, Clone, Copy, Default)]
pub struct RepairLoop;

impl RepairLoop {
    pub fn new() -> Self {
        Self
    }

    /// Drive `first_raw` (the completion of `prompt`) to a final outcome.
    /// `input` is the request text; it fills a missing `input` field.
    pub async fn run(
        &self,
        prompt: &str,
        input: &str,
        first_raw: String,
        source: &dyn CompletionSource,
    ) -> RepairOutcome {
        let mut state = RepairState::AwaitingCompletion {
            attempt: 1,
            raw: first_raw,
        };
        // Most recent completion text, for the fallback after a transport error.
        let mut last_raw = String::new();

        loop {
            state = match state {
                RepairState::AwaitingCompletion { attempt, raw } => {
                    last_raw.clone_from(&raw);
                    match extract_structured(&raw, input) {
                        Ok(result) => RepairState::Parsed { attempt, result },
                        Err(reason) => RepairState::Invalid {
                            attempt,
                            raw,
                            reason,
                        },
                    }
                }
                RepairState::Parsed { attempt, result } => RepairState::Done(RepairOutcome {
                    result,
                    attempts: attempt,
                    source: RepairSource::Structured,
                }),
                RepairState::Invalid {
                    attempt,
                    raw,
                    reason,
                } => {
                    tracing::debug!(attempt, %reason, "completion did not parse");
                    if attempt < MAX_GENERATION_ATTEMPTS {
                        RepairState::Retry {
                            attempt: attempt + 1,
                            prompt: retry_prompt(prompt, &raw),
                        }
                    } else {
                        RepairState::FinalFallback {
                            attempts: attempt,
                            raw,
                        }
                    }
                }
                RepairState::Retry { attempt, prompt } => match source.complete(&prompt).await {
                    Ok(raw) => RepairState::AwaitingCompletion { attempt, raw },
                    Err(e) => {
                        tracing::warn!(attempt, error = %e, "repair completion failed");
                        RepairState::FinalFallback {
                            attempts: attempt,
                            raw: last_raw.clone(),
                        }
                    }
                },
                RepairState::FinalFallback { attempts, raw } => {
                    RepairState::Done(final_fallback(input, &raw, attempts))
                }
                RepairState::Done(outcome) => return outcome,
            };
        }
    }
}

fn retry_prompt(prompt: &str, raw: &str) -> String {
    format!("{prompt}\n\nPrevious response:\n{raw}\n\n{RETRY_INSTRUCTION}")
}

fn final_fallback(input: &str, raw: &str, attempts: u32) -> RepairOutcome {
    match marker_correction(raw) {
        Some(correction) => RepairOutcome {
            result: CorrectionResult {
                input: input.to_string(),
                reasoning: raw.to_string(),
                correction,
                error_type: None,
            },
            attempts,
            source: RepairSource::Marker,
        },
        None => RepairOutcome {
            result: CorrectionResult {
                input: input.to_string(),
                reasoning: raw.to_string(),
                correction: String::new(),
                error_type: None,
            },
            attempts,
            source: RepairSource::Failed,
        },
    }
}

/// Text on the first non-empty line after [`CORRECTION_MARKER`], without
/// surrounding whitespace or quotes.
pub fn marker_correction(raw: &str) -> Option<String> {
    let pos = raw.find(CORRECTION_MARKER)?;
    raw[pos + CORRECTION_MARKER.len()..]
        .lines()
        .map(|line| {
            line.trim()
                .trim_matches(|c| matches!(c, '"' | '\'' | '`'))
                .trim()
        })
        .find(|line| !line.is_empty())
        .map(str::to_string)
}

/// Parse the outermost `{...}` span of `raw` as a result.
pub fn extract_structured(raw: &str, input: &str) -> Result<CorrectionResult, ParseFailure> {
    let start = raw.find('{').ok_or(ParseFailure::NoJsonObject)?;
    let end = raw.rfind('}').ok_or(ParseFailure::NoJsonObject)?;
    if end < start {
        return Err(ParseFailure::NoJsonObject);
    }

    let value: Value = serde_json::from_str(&raw[start..=end])
        .map_err(|e| ParseFailure::InvalidJson(e.to_string()))?;
    let Value::Object(map) = value else {
        return Err(ParseFailure::NotAnObject);
    };

    let reasoning = string_field(&map, "reasoning", &["reasoning", "explanation"])?
        .ok_or(ParseFailure::MissingField("reasoning"))?;
    let correction = string_field(&map, "correction", &["correction", "corrected"])?
        .ok_or(ParseFailure::MissingField("correction"))?;
    if correction.trim().is_empty() {
        return Err(ParseFailure::EmptyCorrection);
    }
    let parsed_input = string_field(&map, "input", &["input"])?;
    let error_type = string_field(&map, "error_type", &["error_type"])?
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty());

    Ok(CorrectionResult {
        input: parsed_input.unwrap_or_else(|| input.to_string()),
        reasoning,
        correction: correction.trim().to_string(),
        error_type,
    })
}

/// First of `keys` holding a string. Null counts as absent.
fn string_field(
    map: &Map<String, Value>,
    field: &'static str,
    keys: &[&str],
) -> Result<Option<String>, ParseFailure> {
    for key in keys {
        match map.get(*key) {
            Some(Value::String(s)) => return Ok(Some(s.clone())),
            None | Some(Value::Null) => continue,
            Some(_) => return Err(ParseFailure::WrongType(field)),
        }
    }
    Ok(None)
}
