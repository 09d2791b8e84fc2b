//! Error types for template loading, code assembly and validation reporting
//!
//! Two families live here:
//! - Typed errors (`TemplateError`, `GenerationError`) for the few paths that
//!   actually fail: a template that cannot be found, read or parsed, and
//!   generation options that are unusable.
//! - `FailureKind`, the taxonomy attached to validation results. Validation
//!   failures are reported as data in the report and never raised.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while resolving, reading or parsing a template file
#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("template not found: {path}")]
    NotFound { path: PathBuf },

    #[error("template contains no accepted code blocks: {path}")]
    ParseEmpty { path: PathBuf },

    #[error("failed to read template {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("template path escapes the template root: {path}")]
    InvalidPath { path: PathBuf },
}

impl TemplateError {
    /// Taxonomy kind for this error
    pub fn kind(&self) -> FailureKind {
        match self {
            TemplateError::NotFound { .. } | TemplateError::InvalidPath { .. } => {
                FailureKind::TemplateNotFound
            }
            TemplateError::ParseEmpty { .. } => FailureKind::TemplateParseEmpty,
            TemplateError::Read { .. } => FailureKind::TemplateNotFound,
        }
    }
}

/// Errors raised by the code assembler
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error("invalid generation options: {0}")]
    InvalidOptions(String),
}

impl GenerationError {
    /// Taxonomy kind, for template failures only
    pub fn kind(&self) -> Option<FailureKind> {
        match self {
            GenerationError::Template(error) => Some(error.kind()),
            GenerationError::InvalidOptions(_) => None,
        }
    }
}

/// Failure taxonomy shared by generation and validation results
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "camelCase")]
pub enum FailureKind {
    TemplateNotFound,
    TemplateParseEmpty,
    UnresolvedPlaceholder,
    StructuralMissingFile,
    ContractMismatch,
    ToolFailure,
    Timeout,
    HealthCheckFailure,
    Cancelled,
    ValidatorError,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureKind::TemplateNotFound => "template_not_found",
            FailureKind::TemplateParseEmpty => "template_parse_empty",
            FailureKind::UnresolvedPlaceholder => "unresolved_placeholder",
            FailureKind::StructuralMissingFile => "structural_missing_file",
            FailureKind::ContractMismatch => "contract_mismatch",
            FailureKind::ToolFailure => "tool_failure",
            FailureKind::Timeout => "timeout",
            FailureKind::HealthCheckFailure => "health_check_failure",
            FailureKind::Cancelled => "cancelled",
            FailureKind::ValidatorError => "validator_error",
        };
        f.write_str(name)
    }
}
