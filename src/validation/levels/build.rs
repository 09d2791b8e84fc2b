//! Production build through the configured build command

use crate::config::CommandSpec;
use crate::validation::diagnostics::BuildDiagnosticParser;
use crate::validation::process::run_command;
use crate::validation::types::{BuildDetails, LevelDetails, ValidationLevel, ValidationResult};
use crate::validation::validator::{ValidationContext, Validator};
use anyhow::Result;
use async_trait::async_trait;

pub struct BuildValidator {
    command: CommandSpec,
    parser: BuildDiagnosticParser,
}

impl BuildValidator {
    pub fn new(command: CommandSpec) -> Self {
        Self {
            command,
            parser: BuildDiagnosticParser,
        }
    }
}

#[async_trait]
impl Validator for BuildValidator {
    fn level(&self) -> ValidationLevel {
        ValidationLevel::Build
    }

    fn description(&self) -> &str {
        "Builds the project"
    }

    async fn validate(&self, context: &ValidationContext) -> Result<ValidationResult> {
        let output = run_command(&self.command, context.project_root()).await?;
        let combined = output.combined();

        let errors = if output.success {
            tracing::debug!(command = %self.command.display(), "build passed");
            Vec::new()
        } else {
            let errors = self.parser.parse_failure(&combined);
            tracing::warn!(
                command = %self.command.display(),
                exit_code = ?output.exit_code,
                errors = errors.len(),
                "build failed"
            );
            errors
        };

        Ok(ValidationResult::from_details(
            LevelDetails::Build(BuildDetails {
                errors,
                output: combined,
            }),
            output.success,
        ))
    }
}
