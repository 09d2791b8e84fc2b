//! Declared controller contracts against the expected set

use crate::validation::diagnostics::ContractPatternParser;
use crate::validation::scan::{controller_files, distinct_patterns, scan_declarations};
use crate::validation::types::{
    ContractDetails, ContractError, LevelDetails, ValidationLevel, ValidationResult,
};
use crate::validation::validator::{ValidationContext, Validator};
use anyhow::Result;
use async_trait::async_trait;

pub struct ContractValidator {
    controller_suffix: String,
    excluded_dirs: Vec<String>,
}

impl ContractValidator {
    pub fn new(controller_suffix: impl Into<String>, excluded_dirs: Vec<String>) -> Self {
        Self {
            controller_suffix: controller_suffix.into(),
            excluded_dirs,
        }
    }
}

#[async_trait]
impl Validator for ContractValidator {
    fn level(&self) -> ValidationLevel {
        ValidationLevel::Contract
    }

    fn description(&self) -> &str {
        "Cross-references controller message and event patterns with expected contracts"
    }

    async fn validate(&self, context: &ValidationContext) -> Result<ValidationResult> {
        let root = context.project_root().to_path_buf();
        let suffix = self.controller_suffix.clone();
        let excluded = self.excluded_dirs.clone();
        let files = tokio::task::spawn_blocking({
            let root = root.clone();
            move || controller_files(&root, &suffix, &excluded)
        })
        .await??;

        let scanned = scan_declarations(&root, &files, ContractPatternParser::source()).await?;
        let declared = distinct_patterns(&scanned);

        let mut details = ContractDetails::default();

        for file in &scanned {
            for declaration in file.declarations.iter().filter(|d| !d.is_well_formed()) {
                details.errors.push(ContractError {
                    pattern: declaration.pattern.clone(),
                    message: format!(
                        "Pattern '{}' at line {} is not shaped like service-name.action",
                        declaration.pattern, declaration.line
                    ),
                    file: Some(file.file.clone()),
                });
            }
        }

        for expected in &context.expected_contracts {
            if !declared.contains(expected) {
                details.missing_contracts.push(expected.clone());
                details.errors.push(ContractError {
                    pattern: expected.clone(),
                    message: format!("Contract '{expected}' is expected but not declared by any controller"),
                    file: None,
                });
            }
        }

        details.unused_contracts = declared
            .iter()
            .filter(|pattern| !context.expected_contracts.contains(pattern))
            .cloned()
            .collect();

        let valid = details.errors.is_empty();
        if valid {
            tracing::debug!(
                controllers = files.len(),
                declared = declared.len(),
                unused = details.unused_contracts.len(),
                "contract validation passed"
            );
        } else {
            tracing::warn!(
                missing = details.missing_contracts.len(),
                errors = details.errors.len(),
                "contract validation failed"
            );
        }

        Ok(ValidationResult::from_details(
            LevelDetails::Contract(details),
            valid,
        ))
    }
}
