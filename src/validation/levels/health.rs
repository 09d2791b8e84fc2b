//! Runs the service in a container and probes it over HTTP

use crate::config::ContainerConfig;
use crate::validation::container::{ContainerGuard, ContainerLaunch, ContainerRuntime};
use crate::validation::diagnostics::ContractPatternParser;
use crate::validation::scan::{controller_files, distinct_patterns, scan_declarations};
use crate::validation::types::{
    HealthCheckDetails, HealthCheckError, LevelDetails, ValidationLevel, ValidationResult,
};
use crate::validation::validator::{ValidationContext, Validator};
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{self, Instant};

const DOCKERFILE: &str = "Dockerfile";

pub struct HealthCheckValidator {
    runtime: Arc<dyn ContainerRuntime>,
    container: ContainerConfig,
    start_timeout: Duration,
    probe_timeout: Duration,
    controller_suffix: String,
    excluded_dirs: Vec<String>,
    http: reqwest::Client,
}

impl HealthCheckValidator {
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        container: ContainerConfig,
        start_timeout: Duration,
        probe_timeout: Duration,
    ) -> Self {
        Self {
            runtime,
            container,
            start_timeout,
            probe_timeout,
            controller_suffix: ".controller.ts".to_string(),
            excluded_dirs: Vec::new(),
            http: reqwest::Client::new(),
        }
    }

    pub fn with_sources(mut self, controller_suffix: String, excluded_dirs: Vec<String>) -> Self {
        self.controller_suffix = controller_suffix;
        self.excluded_dirs = excluded_dirs;
        self
    }

    fn failed(errors: Vec<HealthCheckError>) -> ValidationResult {
        ValidationResult::from_details(
            LevelDetails::HealthCheck(HealthCheckDetails {
                errors,
                health_check_passed: false,
                message_patterns_passed: false,
            }),
            false,
        )
    }

    /// Poll the health endpoint until it answers 2xx or the deadline passes
    async fn wait_healthy(&self, url: &str, deadline: Instant) -> Option<String> {
        let interval = Duration::from_millis(self.container.probe_interval_ms);
        let mut last_problem = "no response".to_string();
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Some(last_problem);
            }
            match self.http.get(url).timeout(remaining).send().await {
                Ok(response) if response.status().is_success() => return None,
                Ok(response) => last_problem = format!("status {}", response.status()),
                Err(error) => last_problem = error.to_string(),
            }
            time::sleep(interval.min(deadline.saturating_duration_since(Instant::now()))).await;
        }
    }

    /// POST each pattern; a pattern responds unless the status is 404 or 5xx
    async fn probe_patterns(
        &self,
        base_url: &str,
        patterns: &[String],
        deadline: Instant,
    ) -> Vec<HealthCheckError> {
        let mut errors = Vec::new();
        for pattern in patterns {
            let url = format!("{base_url}{}/{pattern}", self.container.rpc_prefix);
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                errors.push(HealthCheckError {
                    endpoint: url,
                    message: "probe budget exhausted before pattern was checked".to_string(),
                });
                continue;
            }
            let outcome = self
                .http
                .post(&url)
                .json(&serde_json::json!({}))
                .timeout(remaining)
                .send()
                .await;
            match outcome {
                Ok(response) => {
                    let status = response.status();
                    if status == reqwest::StatusCode::NOT_FOUND || status.is_server_error() {
                        errors.push(HealthCheckError {
                            endpoint: url,
                            message: format!("pattern '{pattern}' did not respond ({status})"),
                        });
                    } else {
                        tracing::debug!(%pattern, %status, "pattern responded");
                    }
                }
                Err(error) => errors.push(HealthCheckError {
                    endpoint: url,
                    message: format!("pattern '{pattern}' request failed: {error}"),
                }),
            }
        }
        errors
    }
}

async fn release(guard: ContainerGuard) {
    if let Err(error) = guard.release().await {
        tracing::warn!(error = %format!("{error:#}"), "container cleanup failed");
    }
}

#[async_trait]
impl Validator for HealthCheckValidator {
    fn level(&self) -> ValidationLevel {
        ValidationLevel::HealthCheck
    }

    fn description(&self) -> &str {
        "Starts the service container and probes health and message pattern endpoints"
    }

    async fn validate(&self, context: &ValidationContext) -> Result<ValidationResult> {
        let root = context.project_root().to_path_buf();

        if !tokio::fs::try_exists(root.join(DOCKERFILE))
            .await
            .unwrap_or(false)
        {
            tracing::warn!(project = %root.display(), "no Dockerfile, health check skipped");
            return Ok(Self::failed(vec![HealthCheckError {
                endpoint: DOCKERFILE.to_string(),
                message: "Dockerfile not found, cannot run health check".to_string(),
            }]));
        }

        let files = tokio::task::spawn_blocking({
            let root = root.clone();
            let suffix = self.controller_suffix.clone();
            let excluded = self.excluded_dirs.clone();
            move || controller_files(&root, &suffix, &excluded)
        })
        .await??;
        let scanned = scan_declarations(&root, &files, ContractPatternParser::source()).await?;
        let patterns = distinct_patterns(&scanned);

        let name = format!("{}-{}", self.container.image_prefix, context.run_id);
        let launch = ContainerLaunch {
            project_root: root.clone(),
            image_tag: name.clone(),
            container_name: name,
            container_port: self.container.port,
        };

        let mut guard = ContainerGuard::new(Arc::clone(&self.runtime));
        let started = time::timeout(self.start_timeout, guard.start(&launch)).await;
        let base_url = match started {
            Ok(Ok(base_url)) => base_url,
            Ok(Err(error)) => {
                tracing::warn!(error = %format!("{error:#}"), "container failed to start");
                release(guard).await;
                return Ok(Self::failed(vec![HealthCheckError {
                    endpoint: self.runtime.name().to_string(),
                    message: format!("container failed to start: {error:#}"),
                }]));
            }
            Err(_) => {
                tracing::warn!(
                    timeout_ms = self.start_timeout.as_millis() as u64,
                    "container start timed out"
                );
                release(guard).await;
                return Ok(Self::failed(vec![HealthCheckError {
                    endpoint: self.runtime.name().to_string(),
                    message: format!(
                        "container did not start within {}ms",
                        self.start_timeout.as_millis()
                    ),
                }]));
            }
        };

        let deadline = Instant::now() + self.probe_timeout;
        let health_url = format!("{base_url}{}", self.container.health_path);
        let mut errors = Vec::new();

        let health_check_passed = match self.wait_healthy(&health_url, deadline).await {
            None => true,
            Some(problem) => {
                errors.push(HealthCheckError {
                    endpoint: health_url.clone(),
                    message: format!(
                        "health endpoint did not return 2xx within {}ms ({problem})",
                        self.probe_timeout.as_millis()
                    ),
                });
                false
            }
        };

        let message_patterns_passed = if health_check_passed {
            let pattern_errors = self.probe_patterns(&base_url, &patterns, deadline).await;
            let passed = pattern_errors.is_empty();
            errors.extend(pattern_errors);
            passed
        } else {
            false
        };

        release(guard).await;

        let valid = health_check_passed && message_patterns_passed;
        tracing::info!(
            health_check_passed,
            message_patterns_passed,
            patterns = patterns.len(),
            "health check finished"
        );
        Ok(ValidationResult::from_details(
            LevelDetails::HealthCheck(HealthCheckDetails {
                errors,
                health_check_passed,
                message_patterns_passed,
            }),
            valid,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::container::ContainerResources;
    use parking_lot::Mutex;
    use std::fs;
    use tempfile::TempDir;

    #[derive(Default)]
    struct FailingRuntime {
        removed: Mutex<Vec<ContainerResources>>,
    }

    #[async_trait]
    impl ContainerRuntime for FailingRuntime {
        fn name(&self) -> &str {
            "failing"
        }

        async fn build(&self, _launch: &ContainerLaunch) -> Result<()> {
            Ok(())
        }

        async fn run(&self, _launch: &ContainerLaunch) -> Result<String> {
            anyhow::bail!("daemon unavailable")
        }

        async fn base_url(&self, _container: &str, _launch: &ContainerLaunch) -> Result<String> {
            anyhow::bail!("not running")
        }

        async fn remove(&self, resources: &ContainerResources) -> Result<()> {
            self.removed.lock().push(resources.clone());
            Ok(())
        }

        fn remove_detached(&self, resources: ContainerResources) {
            self.removed.lock().push(resources);
        }
    }

    fn validator() -> HealthCheckValidator {
        validator_with(Arc::new(FailingRuntime::default()))
    }

    fn validator_with(runtime: Arc<FailingRuntime>) -> HealthCheckValidator {
        HealthCheckValidator::new(
            runtime,
            ContainerConfig::default(),
            Duration::from_secs(1),
            Duration::from_secs(1),
        )
    }

    #[tokio::test]
    async fn missing_dockerfile_fails_without_starting() {
        let dir = TempDir::new().unwrap();
        let result = validator()
            .validate(&ValidationContext::new(dir.path()))
            .await
            .unwrap();
        let details = result.health_check().unwrap();
        assert!(!result.valid);
        assert_eq!(details.errors[0].endpoint, "Dockerfile");
        assert!(!details.health_check_passed);
    }

    #[tokio::test]
    async fn start_failure_is_reported() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("Dockerfile"), "FROM oven/bun\n").unwrap();
        let result = validator()
            .validate(&ValidationContext::new(dir.path()))
            .await
            .unwrap();
        let details = result.health_check().unwrap();
        assert!(details.errors[0].message.contains("daemon unavailable"));
    }

    #[tokio::test]
    async fn failed_run_still_removes_named_container_and_image() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("Dockerfile"), "FROM oven/bun\n").unwrap();
        let runtime = Arc::new(FailingRuntime::default());
        let context = ValidationContext::new(dir.path()).with_run_id("r9");
        validator_with(runtime.clone())
            .validate(&context)
            .await
            .unwrap();
        assert_eq!(
            *runtime.removed.lock(),
            vec![ContainerResources {
                container: Some("svcforge-validate-r9".into()),
                image_tag: Some("svcforge-validate-r9".into()),
            }]
        );
    }
}
