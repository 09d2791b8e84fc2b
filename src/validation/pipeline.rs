//! Validation pipeline orchestrator
//!
//! Runs the requested levels one after another in fixed order. Each level is
//! raced against its timeout and the run's cancellation token. Only a failing
//! structural level stops the run early; every other failure is recorded and
//! the next level still runs.

use crate::config::PipelineConfig;
use crate::logging::{level_span, pipeline_span};
use crate::metrics::METRICS;
use crate::validation::container::{ContainerRuntime, DockerRuntime};
use crate::validation::levels::default_validators;
use crate::validation::types::{ValidationLevel, ValidationReport, ValidationResult};
use crate::validation::validator::{ValidationContext, Validator};
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::Instrument;

enum LevelOutcome {
    Finished(ValidationResult),
    Failed(anyhow::Error),
    TimedOut,
    Cancelled,
}

pub struct ValidationPipeline {
    config: Arc<PipelineConfig>,
    validators: BTreeMap<ValidationLevel, Arc<dyn Validator>>,
}

impl ValidationPipeline {
    /// Pipeline with the default validators and a CLI container runtime
    pub fn new(config: PipelineConfig) -> Self {
        let runtime: Arc<dyn ContainerRuntime> = Arc::new(DockerRuntime::new(&config.container));
        Self::with_runtime(config, runtime)
    }

    pub fn with_runtime(config: PipelineConfig, runtime: Arc<dyn ContainerRuntime>) -> Self {
        let validators = default_validators(&config, runtime).into_iter().collect();
        Self {
            config: Arc::new(config),
            validators,
        }
    }

    /// Replace the validator for `validator.level()`
    pub fn with_validator(mut self, validator: Arc<dyn Validator>) -> Self {
        self.validators.insert(validator.level(), validator);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run `levels` (all levels when `None` or empty) and aggregate the results.
    ///
    /// Never fails: validator errors, timeouts and cancellation all become
    /// failed results in the report.
    pub async fn validate(
        &self,
        context: &ValidationContext,
        levels: Option<&[ValidationLevel]>,
    ) -> ValidationReport {
        let levels = match levels {
            Some(requested) if !requested.is_empty() => ValidationLevel::normalize(requested),
            _ => ValidationLevel::ALL.to_vec(),
        };
        let project = context.project_root().display().to_string();
        let span = pipeline_span(&context.run_id, &project);
        self.run(context, levels).instrument(span).await
    }

    async fn run(&self, context: &ValidationContext, levels: Vec<ValidationLevel>) -> ValidationReport {
        let started_at = Utc::now().to_rfc3339();
        let started = Instant::now();
        tracing::info!(levels = ?levels, "validation started");

        let mut results = Vec::with_capacity(levels.len());
        let mut stopped_at = None;

        for level in levels {
            let Some(validator) = self.validators.get(&level) else {
                tracing::error!(%level, "no validator registered");
                results.push(ValidationResult::failed(
                    level,
                    crate::error::FailureKind::ValidatorError,
                    format!("no validator registered for {level}"),
                ));
                continue;
            };

            let result = self
                .run_level(level, validator.as_ref(), context)
                .instrument(level_span(level.as_str(), validator.description()))
                .await;

            let fatal = result.is_fatal();
            let cancelled = result.is_cancelled();
            results.push(result);

            if fatal || cancelled {
                tracing::warn!(%level, fatal, cancelled, "validation stopped");
                stopped_at = Some(level);
                break;
            }
        }

        let valid = results.iter().all(|result| result.valid);
        let report = ValidationReport {
            run_id: context.run_id.clone(),
            project_root: context.project_root.clone(),
            started_at,
            duration_ms: started.elapsed().as_millis() as u64,
            valid,
            results,
            stopped_at,
        };

        let status = match (report.stopped_at.is_some(), report.valid) {
            (true, _) => "stopped",
            (false, true) => "valid",
            (false, false) => "invalid",
        };
        METRICS.record_pipeline(status);
        tracing::info!(
            valid = report.valid,
            levels = report.results.len(),
            errors = report.total_errors(),
            duration_ms = report.duration_ms,
            status,
            "validation finished"
        );
        report
    }

    async fn run_level(
        &self,
        level: ValidationLevel,
        validator: &dyn Validator,
        context: &ValidationContext,
    ) -> ValidationResult {
        let timeout = self.config.level_timeout(level);
        let started = Instant::now();
        tracing::debug!(timeout_ms = timeout.as_millis() as u64, "level started");

        let outcome = if context.is_cancelled() {
            LevelOutcome::Cancelled
        } else {
            tokio::select! {
                biased;
                _ = context.cancellation.cancelled() => LevelOutcome::Cancelled,
                finished = tokio::time::timeout(timeout, validator.validate(context)) => match finished {
                    Ok(Ok(result)) => LevelOutcome::Finished(result),
                    Ok(Err(error)) => LevelOutcome::Failed(error),
                    Err(_) => LevelOutcome::TimedOut,
                },
            }
        };

        let (result, status) = match outcome {
            LevelOutcome::Finished(result) => {
                let status = if result.valid { "passed" } else { "failed" };
                (result, status)
            }
            LevelOutcome::Failed(error) => {
                tracing::error!(error = %format!("{error:#}"), "validator error");
                (ValidationResult::validator_error(level, &error), "error")
            }
            LevelOutcome::TimedOut => {
                tracing::warn!(timeout_ms = timeout.as_millis() as u64, "level timed out");
                (ValidationResult::timed_out(level, timeout), "timeout")
            }
            LevelOutcome::Cancelled => {
                tracing::warn!("level cancelled");
                (ValidationResult::cancelled(level), "cancelled")
            }
        };

        let elapsed = started.elapsed();
        METRICS.record_level(level.as_str(), status, elapsed);
        crate::log_slow_operation!(
            elapsed,
            timeout.as_millis() as u64 / 2,
            %level,
            status,
            "level finished"
        );
        result.with_duration(elapsed)
    }
}
