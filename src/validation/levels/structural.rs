//! Required project files

use crate::validation::types::{
    LevelDetails, StructuralDetails, StructuralError, ValidationLevel, ValidationResult,
};
use crate::validation::validator::{ValidationContext, Validator};
use anyhow::Result;
use async_trait::async_trait;

pub struct StructuralValidator {
    required_files: Vec<String>,
}

impl StructuralValidator {
    pub fn new(required_files: Vec<String>) -> Self {
        Self { required_files }
    }
}

#[async_trait]
impl Validator for StructuralValidator {
    fn level(&self) -> ValidationLevel {
        ValidationLevel::Structural
    }

    fn description(&self) -> &str {
        "Checks that every required project file exists"
    }

    async fn validate(&self, context: &ValidationContext) -> Result<ValidationResult> {
        let root = context.project_root();

        let root_is_dir = tokio::fs::metadata(root)
            .await
            .map(|meta| meta.is_dir())
            .unwrap_or(false);
        if !root_is_dir {
            tracing::warn!(project = %root.display(), "project root does not exist");
            let details = StructuralDetails {
                errors: vec![StructuralError {
                    file: root.display().to_string(),
                    message: "Project root does not exist or is not a directory".to_string(),
                }],
                missing_files: self.required_files.clone(),
            };
            return Ok(ValidationResult::from_details(
                LevelDetails::Structural(details),
                false,
            ));
        }

        let mut details = StructuralDetails::default();
        for file in &self.required_files {
            let present = tokio::fs::metadata(root.join(file))
                .await
                .map(|meta| meta.is_file())
                .unwrap_or(false);
            if !present {
                details.errors.push(StructuralError {
                    file: file.clone(),
                    message: format!("Required file {file} is missing"),
                });
                details.missing_files.push(file.clone());
            }
        }

        let valid = details.missing_files.is_empty();
        if valid {
            tracing::debug!(files = self.required_files.len(), "structural validation passed");
        } else {
            tracing::warn!(missing = ?details.missing_files, "structural validation failed");
        }
        Ok(ValidationResult::from_details(
            LevelDetails::Structural(details),
            valid,
        ))
    }
}
