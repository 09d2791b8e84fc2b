//! Contract re-scan of the compiled build output

use crate::validation::diagnostics::ContractPatternParser;
use crate::validation::scan::{collect_files, distinct_patterns, scan_declarations};
use crate::validation::types::{
    DiscoveryDetails, DiscoveryError, LevelDetails, PIPELINE_SUBJECT, ValidationLevel,
    ValidationResult,
};
use crate::validation::validator::{ValidationContext, Validator};
use anyhow::Result;
use async_trait::async_trait;
use std::path::PathBuf;

const OUTPUT_EXTENSIONS: &[&str] = &["js", "mjs", "cjs", "ts"];

pub struct ContractDiscoveryValidator {
    build_output_dir: PathBuf,
}

impl ContractDiscoveryValidator {
    pub fn new(build_output_dir: impl Into<PathBuf>) -> Self {
        Self {
            build_output_dir: build_output_dir.into(),
        }
    }
}

#[async_trait]
impl Validator for ContractDiscoveryValidator {
    fn level(&self) -> ValidationLevel {
        ValidationLevel::ContractDiscovery
    }

    fn description(&self) -> &str {
        "Discovers contract patterns in the build output"
    }

    async fn validate(&self, context: &ValidationContext) -> Result<ValidationResult> {
        let output_dir = context.project_root().join(&self.build_output_dir);
        let is_dir = tokio::fs::metadata(&output_dir)
            .await
            .map(|meta| meta.is_dir())
            .unwrap_or(false);
        if !is_dir {
            tracing::warn!(dir = %output_dir.display(), "build output not found");
            return Ok(ValidationResult::from_details(
                LevelDetails::ContractDiscovery(DiscoveryDetails {
                    errors: vec![DiscoveryError {
                        pattern: PIPELINE_SUBJECT.to_string(),
                        message: format!(
                            "Build output directory {} not found",
                            self.build_output_dir.display()
                        ),
                    }],
                    discovered_contracts: 0,
                }),
                false,
            ));
        }

        let files = tokio::task::spawn_blocking({
            let output_dir = output_dir.clone();
            move || {
                collect_files(&output_dir, &[], |relative| {
                    relative
                        .extension()
                        .and_then(|ext| ext.to_str())
                        .is_some_and(|ext| OUTPUT_EXTENSIONS.contains(&ext))
                })
            }
        })
        .await??;

        let scanned =
            scan_declarations(&output_dir, &files, ContractPatternParser::compiled()).await?;
        let discovered = distinct_patterns(&scanned);

        let mut errors = Vec::new();
        if context.expected_contracts.is_empty() {
            if discovered.is_empty() {
                errors.push(DiscoveryError {
                    pattern: PIPELINE_SUBJECT.to_string(),
                    message: "No contracts discovered in build output".to_string(),
                });
            }
        } else {
            for expected in &context.expected_contracts {
                if !discovered.contains(expected) {
                    errors.push(DiscoveryError {
                        pattern: expected.clone(),
                        message: format!("Contract '{expected}' was not discovered in build output"),
                    });
                }
            }
            let extra = unexpected_patterns(&discovered, &context.expected_contracts);
            if !extra.is_empty() {
                tracing::debug!(?extra, "discovered patterns beyond the expected set are accepted");
            }
        }

        let valid = errors.is_empty();
        tracing::debug!(
            files = files.len(),
            discovered = discovered.len(),
            expected = context.expected_contracts.len(),
            valid,
            "contract discovery finished"
        );
        Ok(ValidationResult::from_details(
            LevelDetails::ContractDiscovery(DiscoveryDetails {
                errors,
                discovered_contracts: discovered.len(),
            }),
            valid,
        ))
    }
}

/// Discovered patterns nobody asked for, in discovery order
fn unexpected_patterns<'a>(discovered: &'a [String], expected: &[String]) -> Vec<&'a str> {
    discovered
        .iter()
        .filter(|pattern| !expected.contains(pattern))
        .map(String::as_str)
        .collect()
}
