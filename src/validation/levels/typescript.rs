//! Type-check through the configured compiler command

use crate::config::CommandSpec;
use crate::validation::diagnostics::{DiagnosticParser, TypeScriptDiagnosticParser};
use crate::validation::process::run_command;
use crate::validation::types::{
    DiagnosticSeverity, LevelDetails, PIPELINE_SUBJECT, TypeScriptDetails, TypeScriptError,
    ValidationLevel, ValidationResult,
};
use crate::validation::validator::{ValidationContext, Validator};
use anyhow::Result;
use async_trait::async_trait;

pub struct TypeScriptValidator {
    command: CommandSpec,
    parser: TypeScriptDiagnosticParser,
}

impl TypeScriptValidator {
    pub fn new(command: CommandSpec) -> Self {
        Self {
            command,
            parser: TypeScriptDiagnosticParser,
        }
    }
}

#[async_trait]
impl Validator for TypeScriptValidator {
    fn level(&self) -> ValidationLevel {
        ValidationLevel::Typescript
    }

    fn description(&self) -> &str {
        "Type-checks the project without emitting output"
    }

    async fn validate(&self, context: &ValidationContext) -> Result<ValidationResult> {
        let output = run_command(&self.command, context.project_root()).await?;
        let combined = output.combined();

        let mut errors = Vec::new();
        if !output.success {
            errors = self.parser.parse(&combined);
            if errors.is_empty() {
                errors.push(TypeScriptError {
                    file: PIPELINE_SUBJECT.to_string(),
                    line: None,
                    column: None,
                    message: format!(
                        "`{}` exited with code {}",
                        self.command.display(),
                        output
                            .exit_code
                            .map_or_else(|| "unknown".to_string(), |code| code.to_string())
                    ),
                    code: None,
                    severity: Some(DiagnosticSeverity::Error),
                });
            }
            tracing::warn!(errors = errors.len(), "type-check failed");
        } else {
            tracing::debug!("type-check passed");
        }

        Ok(ValidationResult::from_details(
            LevelDetails::Typescript(TypeScriptDetails {
                errors,
                output: combined,
            }),
            output.success,
        ))
    }
}
