//! Validation levels, per-level diagnostics and the aggregated report

use crate::error::FailureKind;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

/// Subject used by synthetic errors that do not refer to a real file or pattern
pub const PIPELINE_SUBJECT: &str = "<pipeline>";

/// Validation levels in execution order
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    JsonSchema,
    Display,
    EnumString,
    EnumIter,
    IntoStaticStr,
)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase", ascii_case_insensitive)]
pub enum ValidationLevel {
    Structural,
    Contract,
    Typescript,
    Build,
    HealthCheck,
    ContractDiscovery,
}

impl ValidationLevel {
    pub const ALL: [ValidationLevel; 6] = [
        ValidationLevel::Structural,
        ValidationLevel::Contract,
        ValidationLevel::Typescript,
        ValidationLevel::Build,
        ValidationLevel::HealthCheck,
        ValidationLevel::ContractDiscovery,
    ];

    pub fn as_str(&self) -> &'static str {
        self.into()
    }

    /// Failure kind reported when this level's own checks fail
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            ValidationLevel::Structural => FailureKind::StructuralMissingFile,
            ValidationLevel::Contract | ValidationLevel::ContractDiscovery => {
                FailureKind::ContractMismatch
            }
            ValidationLevel::Typescript | ValidationLevel::Build => FailureKind::ToolFailure,
            ValidationLevel::HealthCheck => FailureKind::HealthCheckFailure,
        }
    }

    /// Whether a failed result at this level stops the pipeline
    pub fn is_fatal(&self) -> bool {
        matches!(self, ValidationLevel::Structural)
    }

    /// Sort into execution order and drop duplicates
    pub fn normalize(levels: &[ValidationLevel]) -> Vec<ValidationLevel> {
        let mut levels = levels.to_vec();
        levels.sort();
        levels.dedup();
        levels
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StructuralError {
    pub file: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ContractError {
    pub pattern: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum DiagnosticSeverity {
    Error,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TypeScriptError {
    pub file: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<u32>,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<DiagnosticSeverity>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BuildError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct HealthCheckError {
    pub endpoint: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryError {
    pub pattern: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StructuralDetails {
    pub errors: Vec<StructuralError>,
    pub missing_files: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ContractDetails {
    pub errors: Vec<ContractError>,
    pub missing_contracts: Vec<String>,
    /// Declared but not expected; informational only
    pub unused_contracts: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TypeScriptDetails {
    pub errors: Vec<TypeScriptError>,
    pub output: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BuildDetails {
    pub errors: Vec<BuildError>,
    pub output: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct HealthCheckDetails {
    pub errors: Vec<HealthCheckError>,
    pub health_check_passed: bool,
    pub message_patterns_passed: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryDetails {
    pub errors: Vec<DiscoveryError>,
    pub discovered_contracts: usize,
}

/// Level-specific payload, tagged by `level` in JSON
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "level", rename_all = "camelCase")]
pub enum LevelDetails {
    Structural(StructuralDetails),
    Contract(ContractDetails),
    Typescript(TypeScriptDetails),
    Build(BuildDetails),
    HealthCheck(HealthCheckDetails),
    ContractDiscovery(DiscoveryDetails),
}

impl LevelDetails {
    pub fn level(&self) -> ValidationLevel {
        match self {
            LevelDetails::Structural(_) => ValidationLevel::Structural,
            LevelDetails::Contract(_) => ValidationLevel::Contract,
            LevelDetails::Typescript(_) => ValidationLevel::Typescript,
            LevelDetails::Build(_) => ValidationLevel::Build,
            LevelDetails::HealthCheck(_) => ValidationLevel::HealthCheck,
            LevelDetails::ContractDiscovery(_) => ValidationLevel::ContractDiscovery,
        }
    }

    /// The level's shape with no errors
    pub fn empty(level: ValidationLevel) -> Self {
        match level {
            ValidationLevel::Structural => LevelDetails::Structural(StructuralDetails::default()),
            ValidationLevel::Contract => LevelDetails::Contract(ContractDetails::default()),
            ValidationLevel::Typescript => LevelDetails::Typescript(TypeScriptDetails::default()),
            ValidationLevel::Build => LevelDetails::Build(BuildDetails::default()),
            ValidationLevel::HealthCheck => LevelDetails::HealthCheck(HealthCheckDetails {
                errors: Vec::new(),
                health_check_passed: true,
                message_patterns_passed: true,
            }),
            ValidationLevel::ContractDiscovery => {
                LevelDetails::ContractDiscovery(DiscoveryDetails::default())
            }
        }
    }

    /// The level's shape holding exactly one error with `message`
    pub fn synthetic(level: ValidationLevel, message: impl Into<String>) -> Self {
        let message = message.into();
        let subject = PIPELINE_SUBJECT.to_string();
        match level {
            ValidationLevel::Structural => LevelDetails::Structural(StructuralDetails {
                errors: vec![StructuralError { file: subject, message }],
                missing_files: Vec::new(),
            }),
            ValidationLevel::Contract => LevelDetails::Contract(ContractDetails {
                errors: vec![ContractError {
                    pattern: subject,
                    message,
                    file: None,
                }],
                ..Default::default()
            }),
            ValidationLevel::Typescript => LevelDetails::Typescript(TypeScriptDetails {
                errors: vec![TypeScriptError {
                    file: subject,
                    line: None,
                    column: None,
                    message,
                    code: None,
                    severity: Some(DiagnosticSeverity::Error),
                }],
                output: String::new(),
            }),
            ValidationLevel::Build => LevelDetails::Build(BuildDetails {
                errors: vec![BuildError {
                    message,
                    file: None,
                }],
                output: String::new(),
            }),
            ValidationLevel::HealthCheck => LevelDetails::HealthCheck(HealthCheckDetails {
                errors: vec![HealthCheckError {
                    endpoint: subject,
                    message,
                }],
                health_check_passed: false,
                message_patterns_passed: false,
            }),
            ValidationLevel::ContractDiscovery => {
                LevelDetails::ContractDiscovery(DiscoveryDetails {
                    errors: vec![DiscoveryError {
                        pattern: subject,
                        message,
                    }],
                    discovered_contracts: 0,
                })
            }
        }
    }

    pub fn error_count(&self) -> usize {
        match self {
            LevelDetails::Structural(d) => d.errors.len(),
            LevelDetails::Contract(d) => d.errors.len(),
            LevelDetails::Typescript(d) => d.errors.len(),
            LevelDetails::Build(d) => d.errors.len(),
            LevelDetails::HealthCheck(d) => d.errors.len(),
            LevelDetails::ContractDiscovery(d) => d.errors.len(),
        }
    }

    pub fn error_messages(&self) -> Vec<String> {
        match self {
            LevelDetails::Structural(d) => {
                d.errors.iter().map(|e| format!("{}: {}", e.file, e.message)).collect()
            }
            LevelDetails::Contract(d) => d.errors.iter().map(|e| e.message.clone()).collect(),
            LevelDetails::Typescript(d) => d
                .errors
                .iter()
                .map(|e| match (e.line, e.column) {
                    (Some(line), Some(column)) => {
                        format!("{}({line},{column}): {}", e.file, e.message)
                    }
                    _ => format!("{}: {}", e.file, e.message),
                })
                .collect(),
            LevelDetails::Build(d) => d.errors.iter().map(|e| e.message.clone()).collect(),
            LevelDetails::HealthCheck(d) => d
                .errors
                .iter()
                .map(|e| format!("{}: {}", e.endpoint, e.message))
                .collect(),
            LevelDetails::ContractDiscovery(d) => {
                d.errors.iter().map(|e| e.message.clone()).collect()
            }
        }
    }
}

/// Outcome of one level
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureKind>,
    pub duration_ms: u64,
    #[serde(flatten)]
    pub details: LevelDetails,
}

impl ValidationResult {
    /// Result whose validity is decided by the level's own checks
    pub fn from_details(details: LevelDetails, valid: bool) -> Self {
        let failure = (!valid).then(|| details.level().failure_kind());
        Self {
            valid,
            failure,
            duration_ms: 0,
            details,
        }
    }

    pub fn failed(level: ValidationLevel, kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            valid: false,
            failure: Some(kind),
            duration_ms: 0,
            details: LevelDetails::synthetic(level, message),
        }
    }

    pub fn timed_out(level: ValidationLevel, timeout: Duration) -> Self {
        Self::failed(
            level,
            FailureKind::Timeout,
            format!(
                "{} validation timed out after {}ms",
                level,
                timeout.as_millis()
            ),
        )
    }

    pub fn cancelled(level: ValidationLevel) -> Self {
        Self::failed(
            level,
            FailureKind::Cancelled,
            format!("{level} validation was cancelled"),
        )
    }

    pub fn validator_error(level: ValidationLevel, error: &anyhow::Error) -> Self {
        Self::failed(
            level,
            FailureKind::ValidatorError,
            format!("{level} validator failed: {error:#}"),
        )
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration_ms = duration.as_millis() as u64;
        self
    }

    pub fn level(&self) -> ValidationLevel {
        self.details.level()
    }

    pub fn is_timeout(&self) -> bool {
        self.failure == Some(FailureKind::Timeout)
    }

    pub fn is_cancelled(&self) -> bool {
        self.failure == Some(FailureKind::Cancelled)
    }

    /// Whether the pipeline must stop after this result.
    ///
    /// Keyed on the level, so a structural timeout or validator error stops
    /// the run exactly like missing files do.
    pub fn is_fatal(&self) -> bool {
        !self.valid && self.level().is_fatal()
    }

    pub fn error_count(&self) -> usize {
        self.details.error_count()
    }

    pub fn error_messages(&self) -> Vec<String> {
        self.details.error_messages()
    }

    pub fn structural(&self) -> Option<&StructuralDetails> {
        match &self.details {
            LevelDetails::Structural(d) => Some(d),
            _ => None,
        }
    }

    pub fn contract(&self) -> Option<&ContractDetails> {
        match &self.details {
            LevelDetails::Contract(d) => Some(d),
            _ => None,
        }
    }

    pub fn typescript(&self) -> Option<&TypeScriptDetails> {
        match &self.details {
            LevelDetails::Typescript(d) => Some(d),
            _ => None,
        }
    }

    pub fn build(&self) -> Option<&BuildDetails> {
        match &self.details {
            LevelDetails::Build(d) => Some(d),
            _ => None,
        }
    }

    pub fn health_check(&self) -> Option<&HealthCheckDetails> {
        match &self.details {
            LevelDetails::HealthCheck(d) => Some(d),
            _ => None,
        }
    }

    pub fn contract_discovery(&self) -> Option<&DiscoveryDetails> {
        match &self.details {
            LevelDetails::ContractDiscovery(d) => Some(d),
            _ => None,
        }
    }
}

/// Aggregated outcome of one pipeline run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub run_id: String,
    pub project_root: PathBuf,
    /// RFC 3339
    pub started_at: String,
    pub duration_ms: u64,
    pub valid: bool,
    pub results: Vec<ValidationResult>,
    /// Level that ended the run early through a fatal failure or cancellation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stopped_at: Option<ValidationLevel>,
}

impl ValidationReport {
    pub fn result(&self, level: ValidationLevel) -> Option<&ValidationResult> {
        self.results.iter().find(|r| r.level() == level)
    }

    pub fn levels(&self) -> Vec<ValidationLevel> {
        self.results.iter().map(ValidationResult::level).collect()
    }

    pub fn failed_levels(&self) -> Vec<ValidationLevel> {
        self.results
            .iter()
            .filter(|r| !r.valid)
            .map(ValidationResult::level)
            .collect()
    }

    pub fn total_errors(&self) -> usize {
        self.results.iter().map(ValidationResult::error_count).sum()
    }
}
