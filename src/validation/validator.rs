//! Validator trait and the context handed to every level

use crate::validation::types::{ValidationLevel, ValidationResult};
use anyhow::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Inputs shared by all levels of one pipeline run
#[derive(Debug, Clone)]
pub struct ValidationContext {
    pub project_root: PathBuf,
    /// Contract patterns the caller expects the service to declare
    pub expected_contracts: Vec<String>,
    pub run_id: String,
    pub cancellation: CancellationToken,
}

impl ValidationContext {
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        Self {
            project_root: project_root.into(),
            expected_contracts: Vec::new(),
            run_id: Uuid::new_v4().to_string(),
            cancellation: CancellationToken::new(),
        }
    }

    /// Expected patterns, deduplicated, first occurrence kept
    pub fn with_expected_contracts<I, S>(mut self, contracts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for contract in contracts {
            let contract = contract.into();
            if !self.expected_contracts.contains(&contract) {
                self.expected_contracts.push(contract);
            }
        }
        self
    }

    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = run_id.into();
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }
}

/// One validation level
///
/// Implementations report findings as data in the returned result. `Err` is
/// reserved for internal failures (I/O, spawn errors) and is converted into a
/// failed result by the pipeline.
#[async_trait]
pub trait Validator: Send + Sync {
    fn level(&self) -> ValidationLevel;

    /// Human-readable description
    fn description(&self) -> &str;

    async fn validate(&self, context: &ValidationContext) -> Result<ValidationResult>;
}
