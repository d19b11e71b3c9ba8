//! Stage and timing validation.
//!
//! One malformed stage aborts an entire engine run, so every generated stage
//! passes through [`FilterValidator::validate_stage`] before it is used.
//! Invalid stages are dropped, never repaired.

use framecut_common::ExportLogger;
use framecut_timeline::MIN_ELEMENT_DURATION_SECS;

use crate::stage::{Stage, StageKind};

/// Identifiers that only show up when a value failed to resolve.
const PLACEHOLDER_TOKENS: &[&str] = &["undefined", "null", "NaN", "inf"];

/// Outcome of a validation pass. Errors block, warnings do not.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Stages that survived a list validation, with the reasons for the rest.
#[derive(Debug, Clone, Default)]
pub struct StageListValidation {
    pub valid: Vec<Stage>,
    pub report: ValidationReport,
}

/// Stage predicates and graph-string cleanup.
#[derive(Debug, Clone)]
pub struct FilterValidator {
    logger: ExportLogger,
}

impl FilterValidator {
    pub fn new(logger: ExportLogger) -> Self {
        Self { logger }
    }

    /// Whether a serialized stage may be handed to the engine.
    pub fn validate_stage(&self, text: &str, kind: StageKind) -> bool {
        if text.trim().is_empty() {
            self.logger.debug(format!("Empty {kind} stage detected"));
            return false;
        }

        if let Some(token) = find_placeholder(text) {
            self.logger.debug(format!(
                "Invalid {kind} stage contains unresolved '{token}': {text}"
            ));
            return false;
        }

        true
    }

    /// Partition `stages` by [`Self::validate_stage`].
    pub fn validate_stage_list(&self, stages: &[Stage], kind: StageKind) -> StageListValidation {
        let mut result = StageListValidation::default();

        for (index, stage) in stages.iter().enumerate() {
            let text = stage.to_string();
            if self.validate_stage(&text, kind) {
                result.valid.push(stage.clone());
            } else {
                result
                    .report
                    .errors
                    .push(format!("Invalid {kind} stage at index {index}: \"{text}\""));
            }
        }

        if result.valid.is_empty() && !stages.is_empty() {
            result.report.warnings.push(format!(
                "No valid {kind} stages found out of {} total",
                stages.len()
            ));
        }

        result
    }

    /// Check an element's placement against the output duration.
    pub fn validate_timing(
        &self,
        start_time: f64,
        duration: f64,
        total_duration: f64,
    ) -> ValidationReport {
        let mut report = ValidationReport::default();

        if duration <= MIN_ELEMENT_DURATION_SECS {
            report.errors.push(format!(
                "Duration too short: {duration}s (minimum {MIN_ELEMENT_DURATION_SECS}s)"
            ));
        }

        if start_time < 0.0 {
            report
                .errors
                .push(format!("Negative start time: {start_time}s"));
        }

        if !start_time.is_finite() || !duration.is_finite() {
            report.errors.push(format!(
                "Non-finite timing values: startTime={start_time}, duration={duration}"
            ));
        }

        if start_time >= total_duration {
            report.warnings.push(format!(
                "Start time ({start_time}s) exceeds video duration ({total_duration}s)"
            ));
        }

        report
    }

    pub fn clean_joined_stages(&self, text: &str) -> String {
        clean_joined_stages(text)
    }
}

/// Collapse repeated `;` separators and trim leading/trailing ones.
///
/// Idempotent: cleaning a cleaned string returns it unchanged.
pub fn clean_joined_stages(text: &str) -> String {
    text.split(';')
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join(";")
}

/// First placeholder identifier outside single-quoted regions.
fn find_placeholder(text: &str) -> Option<&'static str> {
    let mut unquoted = String::with_capacity(text.len());
    let mut in_quotes = false;
    for c in text.chars() {
        if c == '\'' {
            in_quotes = !in_quotes;
            unquoted.push(' ');
        } else if !in_quotes {
            unquoted.push(c);
        }
    }

    unquoted
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .find_map(|token| PLACEHOLDER_TOKENS.iter().copied().find(|p| *p == token))
}
