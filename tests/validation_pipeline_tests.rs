//! Pipeline runs against temporary projects, shell tools and a fake service
#![cfg(unix)]

use anyhow::Result;
use assert_matches::assert_matches;
use async_trait::async_trait;
use axum::extract::{Path as UrlPath, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Router;
use parking_lot::Mutex;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use svcforge::config::{CommandSpec, PipelineConfig};
use svcforge::error::FailureKind;
use svcforge::validation::{
    ContainerLaunch, ContainerResources, ContainerRuntime, ValidationContext, ValidationLevel,
    ValidationPipeline,
};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

const LIST_PROJECTS: &str = "graph-service.listProjects";
const PROJECT_CREATED: &str = "graph-service.projectCreated";

// =============================================================================
// Fixtures
// =============================================================================

const CONTROLLER: &str = r#"import { Controller } from "@nestjs/common";
import { EventPattern, MessagePattern } from "@nestjs/microservices";

@Controller()
export class GraphController {
  @MessagePattern('graph-service.listProjects')
  list() {
    return [];
  }

  @EventPattern("graph-service.projectCreated")
  onCreated() {}
}
"#;

const COMPILED_CONTROLLER: &str = r#"__decorate([
    (0, microservices_1.MessagePattern)('graph-service.listProjects'),
], GraphController.prototype, "list", null);
__decorate([
    (0, microservices_1.EventPattern)('graph-service.projectCreated'),
], GraphController.prototype, "onCreated", null);
"#;

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

/// A project that passes every level
fn service_project() -> TempDir {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    write(root, "src/main.ts", "bootstrap();\n");
    write(root, "src/app.module.ts", "export class AppModule {}\n");
    write(
        root,
        "src/health/health.controller.ts",
        "@Controller('health')\nexport class HealthController {}\n",
    );
    write(root, "src/health/health.module.ts", "export class HealthModule {}\n");
    write(root, "src/graph/graph.controller.ts", CONTROLLER);
    write(root, "dist/graph/graph.controller.js", COMPILED_CONTROLLER);
    write(root, "Dockerfile", "FROM oven/bun:1\nCOPY . .\nCMD [\"bun\", \"dist/main.js\"]\n");
    dir
}

fn shell(script: &str) -> CommandSpec {
    CommandSpec::new("sh", ["-c", script])
}

fn passing_config() -> PipelineConfig {
    let mut config = PipelineConfig::default()
        .with_typescript_command(CommandSpec::new("true", Vec::<String>::new()))
        .with_build_command(CommandSpec::new("true", Vec::<String>::new()))
        .with_timeout(ValidationLevel::HealthCheck, 5_000);
    config.timeouts_ms.container_start = 5_000;
    config.container.probe_interval_ms = 50;
    config
}

// =============================================================================
// Fake service and runtime
// =============================================================================

async fn rpc(
    State(known): State<Arc<Vec<String>>>,
    UrlPath(pattern): UrlPath<String>,
) -> StatusCode {
    if known.contains(&pattern) {
        StatusCode::OK
    } else {
        StatusCode::NOT_FOUND
    }
}

/// Serve `/health` and `/rpc/{pattern}` for `known` patterns; returns the base URL
async fn spawn_fake_service(known: &[&str]) -> String {
    let known = Arc::new(known.iter().map(|p| p.to_string()).collect::<Vec<_>>());
    let app = Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/rpc/{pattern}", post(rpc))
        .with_state(known);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

struct FakeRuntime {
    base_url: String,
    launched: Mutex<Vec<String>>,
    stopped: Mutex<Vec<String>>,
    removed_images: Mutex<Vec<String>>,
}

impl FakeRuntime {
    fn new(base_url: String) -> Arc<Self> {
        Arc::new(Self {
            base_url,
            launched: Mutex::new(Vec::new()),
            stopped: Mutex::new(Vec::new()),
            removed_images: Mutex::new(Vec::new()),
        })
    }

    fn record_removal(&self, resources: &ContainerResources) {
        if let Some(container) = &resources.container {
            self.stopped.lock().push(container.clone());
        }
        if let Some(image) = &resources.image_tag {
            self.removed_images.lock().push(image.clone());
        }
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    fn name(&self) -> &str {
        "fake"
    }

    async fn build(&self, launch: &ContainerLaunch) -> Result<()> {
        self.launched.lock().push(launch.image_tag.clone());
        Ok(())
    }

    async fn run(&self, _launch: &ContainerLaunch) -> Result<String> {
        Ok("fake-1".to_string())
    }

    async fn base_url(&self, _container: &str, _launch: &ContainerLaunch) -> Result<String> {
        Ok(self.base_url.clone())
    }

    async fn remove(&self, resources: &ContainerResources) -> Result<()> {
        self.record_removal(resources);
        Ok(())
    }

    fn remove_detached(&self, resources: ContainerResources) {
        self.record_removal(&resources);
    }
}

async fn pipeline_with_service(config: PipelineConfig, known: &[&str]) -> (ValidationPipeline, Arc<FakeRuntime>) {
    let runtime = FakeRuntime::new(spawn_fake_service(known).await);
    let pipeline = ValidationPipeline::with_runtime(config, runtime.clone());
    (pipeline, runtime)
}

// =============================================================================
// Full runs
// =============================================================================

#[tokio::test]
async fn test_full_run_passes_every_level() {
    let project = service_project();
    let (pipeline, runtime) =
        pipeline_with_service(passing_config(), &[LIST_PROJECTS, PROJECT_CREATED]).await;
    let context = ValidationContext::new(project.path())
        .with_expected_contracts([LIST_PROJECTS, PROJECT_CREATED])
        .with_run_id("run-1");

    let report = pipeline.validate(&context, None).await;

    assert!(report.valid, "{:#?}", report.results);
    assert_eq!(report.levels(), ValidationLevel::ALL.to_vec());
    assert_eq!(report.stopped_at, None);
    assert_eq!(report.total_errors(), 0);
    assert_eq!(report.run_id, "run-1");

    let health = report
        .result(ValidationLevel::HealthCheck)
        .and_then(|r| r.health_check())
        .unwrap();
    assert!(health.health_check_passed);
    assert!(health.message_patterns_passed);

    let discovery = report
        .result(ValidationLevel::ContractDiscovery)
        .and_then(|r| r.contract_discovery())
        .unwrap();
    assert_eq!(discovery.discovered_contracts, 2);

    assert_eq!(*runtime.launched.lock(), vec!["svcforge-validate-run-1"]);
    assert_eq!(*runtime.stopped.lock(), vec!["fake-1"]);
    assert_eq!(*runtime.removed_images.lock(), vec!["svcforge-validate-run-1"]);
}

#[tokio::test]
async fn test_report_serializes_with_level_tags() {
    let project = service_project();
    fs::remove_file(project.path().join("src/main.ts")).unwrap();
    let pipeline = ValidationPipeline::new(passing_config());

    let report = pipeline
        .validate(&ValidationContext::new(project.path()), None)
        .await;
    let json = serde_json::to_value(&report).unwrap();

    assert_eq!(json["valid"], false);
    assert_eq!(json["stoppedAt"], "structural");
    assert_eq!(json["results"][0]["level"], "structural");
    assert_eq!(json["results"][0]["failure"], "structuralMissingFile");
    assert_eq!(json["results"][0]["missingFiles"][0], "src/main.ts");
}

// =============================================================================
// Structural
// =============================================================================

#[tokio::test]
async fn test_missing_health_controller_stops_pipeline() {
    let project = service_project();
    fs::remove_file(project.path().join("src/health/health.controller.ts")).unwrap();
    let pipeline = ValidationPipeline::new(passing_config());

    let report = pipeline
        .validate(&ValidationContext::new(project.path()), None)
        .await;

    assert!(!report.valid);
    assert_eq!(report.results.len(), 1);
    assert_eq!(report.stopped_at, Some(ValidationLevel::Structural));
    let structural = report.results[0].structural().unwrap();
    assert_eq!(structural.missing_files, vec!["src/health/health.controller.ts"]);
    assert_eq!(report.results[0].failure, Some(FailureKind::StructuralMissingFile));
}

#[tokio::test]
async fn test_missing_project_root_is_structural_failure() {
    let pipeline = ValidationPipeline::new(passing_config());
    let report = pipeline
        .validate(
            &ValidationContext::new("/nonexistent/svcforge-project"),
            Some(&[ValidationLevel::Structural, ValidationLevel::Build]),
        )
        .await;
    assert_eq!(report.levels(), vec![ValidationLevel::Structural]);
    assert_eq!(report.results[0].structural().unwrap().missing_files.len(), 4);
}

// =============================================================================
// Contracts
// =============================================================================

#[tokio::test]
async fn test_contract_mismatch_does_not_stop_pipeline() {
    let project = service_project();
    let pipeline = ValidationPipeline::new(passing_config());
    let context = ValidationContext::new(project.path())
        .with_expected_contracts([LIST_PROJECTS, "graph-service.deleteProject"]);

    let report = pipeline
        .validate(
            &context,
            Some(&[ValidationLevel::Typescript, ValidationLevel::Contract]),
        )
        .await;

    assert!(!report.valid);
    assert_eq!(
        report.levels(),
        vec![ValidationLevel::Contract, ValidationLevel::Typescript]
    );
    let contract = report.results[0].contract().unwrap();
    assert_eq!(contract.missing_contracts, vec!["graph-service.deleteProject"]);
    assert_eq!(contract.unused_contracts, vec![PROJECT_CREATED]);
    assert!(report.results[1].valid);
    assert_eq!(report.failed_levels(), vec![ValidationLevel::Contract]);
}

#[tokio::test]
async fn test_discovery_reports_undiscovered_contract() {
    let project = service_project();
    let pipeline = ValidationPipeline::new(passing_config());
    let context = ValidationContext::new(project.path())
        .with_expected_contracts([LIST_PROJECTS, "graph-service.archiveProject"]);

    let report = pipeline
        .validate(&context, Some(&[ValidationLevel::ContractDiscovery]))
        .await;

    let discovery = report.results[0].contract_discovery().unwrap();
    assert_eq!(discovery.discovered_contracts, 2);
    assert_eq!(discovery.errors.len(), 1);
    assert_eq!(discovery.errors[0].pattern, "graph-service.archiveProject");
}

// =============================================================================
// Tools
// =============================================================================

#[tokio::test]
async fn test_typescript_diagnostics_are_parsed() {
    let project = service_project();
    let config = passing_config().with_typescript_command(shell(
        "echo 'src/graph/graph.service.ts(3,5): error TS2322: Type string is not assignable to type number.'; exit 2",
    ));
    let pipeline = ValidationPipeline::new(config);

    let report = pipeline
        .validate(
            &ValidationContext::new(project.path()),
            Some(&[ValidationLevel::Typescript, ValidationLevel::Build]),
        )
        .await;

    let typescript = report.results[0].typescript().unwrap();
    assert!(!report.results[0].valid);
    assert_eq!(typescript.errors.len(), 1);
    assert_eq!(typescript.errors[0].file, "src/graph/graph.service.ts");
    assert_eq!(typescript.errors[0].line, Some(3));
    assert_eq!(typescript.errors[0].column, Some(5));
    assert_eq!(typescript.errors[0].code.as_deref(), Some("TS2322"));
    assert!(report.results[1].valid);
}

#[tokio::test]
async fn test_build_failure_without_diagnostics_is_generic() {
    let project = service_project();
    let config = passing_config().with_build_command(shell("echo 'bundling...'; exit 1"));
    let pipeline = ValidationPipeline::new(config);

    let report = pipeline
        .validate(
            &ValidationContext::new(project.path()),
            Some(&[ValidationLevel::Build]),
        )
        .await;

    let build = report.results[0].build().unwrap();
    assert_eq!(build.errors.len(), 1);
    assert_eq!(build.errors[0].message, "Build failed (see output for details)");
    assert!(build.output.contains("bundling..."));
    assert_eq!(report.results[0].failure, Some(FailureKind::ToolFailure));
}

#[tokio::test]
async fn test_typescript_timeout_lets_build_run() {
    let project = service_project();
    let config = passing_config()
        .with_typescript_command(CommandSpec::new("sleep", ["5"]))
        .with_timeout(ValidationLevel::Typescript, 100);
    let pipeline = ValidationPipeline::new(config);
    let started = Instant::now();

    let report = pipeline
        .validate(
            &ValidationContext::new(project.path()),
            Some(&[ValidationLevel::Typescript, ValidationLevel::Build]),
        )
        .await;

    assert!(started.elapsed() < Duration::from_secs(4));
    assert!(report.results[0].is_timeout());
    assert_eq!(
        report.results[0].error_messages(),
        vec!["<pipeline>: typescript validation timed out after 100ms"]
    );
    assert!(report.results[1].valid);
    assert_eq!(report.stopped_at, None);
}

#[tokio::test]
async fn test_unspawnable_tool_is_validator_error() {
    let project = service_project();
    let config = passing_config()
        .with_build_command(CommandSpec::new("svcforge-no-such-tool", Vec::<String>::new()));
    let pipeline = ValidationPipeline::new(config);

    let report = pipeline
        .validate(
            &ValidationContext::new(project.path()),
            Some(&[ValidationLevel::Build, ValidationLevel::ContractDiscovery]),
        )
        .await;

    assert_eq!(report.results[0].failure, Some(FailureKind::ValidatorError));
    assert!(report.results[0].error_messages()[0].contains("svcforge-no-such-tool"));
    assert_eq!(report.results.len(), 2);
}

// =============================================================================
// Health check
// =============================================================================

#[tokio::test]
async fn test_unanswered_pattern_fails_message_probe() {
    let project = service_project();
    let (pipeline, runtime) = pipeline_with_service(passing_config(), &[LIST_PROJECTS]).await;

    let report = pipeline
        .validate(
            &ValidationContext::new(project.path()),
            Some(&[ValidationLevel::HealthCheck]),
        )
        .await;

    let result = &report.results[0];
    let health = result.health_check().unwrap();
    assert!(!result.valid);
    assert!(health.health_check_passed);
    assert!(!health.message_patterns_passed);
    assert_eq!(health.errors.len(), 1);
    assert!(health.errors[0].endpoint.ends_with("/rpc/graph-service.projectCreated"));
    assert_eq!(runtime.stopped.lock().len(), 1);
}

#[tokio::test]
async fn test_missing_dockerfile_fails_health_check() {
    let project = service_project();
    fs::remove_file(project.path().join("Dockerfile")).unwrap();
    let (pipeline, runtime) =
        pipeline_with_service(passing_config(), &[LIST_PROJECTS, PROJECT_CREATED]).await;

    let report = pipeline
        .validate(
            &ValidationContext::new(project.path()),
            Some(&[ValidationLevel::HealthCheck, ValidationLevel::ContractDiscovery]),
        )
        .await;

    assert_matches!(
        report.results[0].failure,
        Some(FailureKind::HealthCheckFailure)
    );
    assert!(runtime.launched.lock().is_empty());
    assert!(report.results[1].valid);
}

// =============================================================================
// Container cleanup through the CLI runtime
// =============================================================================

/// Stand-in container CLI: logs every call, `run` prints an id, `port` hangs
fn hanging_port_runtime(dir: &Path) -> (String, std::path::PathBuf) {
    use std::os::unix::fs::PermissionsExt;

    let log = dir.join("runtime.log");
    let script = dir.join("fake-docker");
    fs::write(
        &script,
        format!(
            "#!/bin/sh\necho \"$*\" >> '{}'\ncase \"$1\" in\n  run) echo cid123 ;;\n  port) sleep 5 ;;\nesac\nexit 0\n",
            log.display()
        ),
    )
    .unwrap();
    fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();
    (script.display().to_string(), log)
}

fn runtime_calls(log: &Path) -> Vec<String> {
    fs::read_to_string(log)
        .unwrap_or_default()
        .lines()
        .map(str::to_string)
        .collect()
}

#[tokio::test]
async fn test_start_timeout_removes_container_and_image() {
    let project = service_project();
    let tools = TempDir::new().unwrap();
    let (program, log) = hanging_port_runtime(tools.path());
    let mut config = passing_config();
    config.container.runtime = program;
    config.timeouts_ms.container_start = 500;
    let pipeline = ValidationPipeline::new(config);
    let context = ValidationContext::new(project.path()).with_run_id("leak-1");

    let started = Instant::now();
    let report = pipeline
        .validate(&context, Some(&[ValidationLevel::HealthCheck]))
        .await;

    assert!(started.elapsed() < Duration::from_secs(4));
    let health = report.results[0].health_check().unwrap();
    assert_eq!(
        health.errors[0].message,
        "container did not start within 500ms"
    );
    let calls = runtime_calls(&log);
    assert!(calls.contains(&"rm -f cid123".to_string()), "{calls:?}");
    assert!(
        calls.contains(&"rmi -f svcforge-validate-leak-1".to_string()),
        "{calls:?}"
    );
    assert_eq!(calls.last().map(String::as_str), Some("rmi -f svcforge-validate-leak-1"));
}

#[tokio::test]
async fn test_cancelled_start_still_removes_container() {
    let project = service_project();
    let tools = TempDir::new().unwrap();
    let (program, log) = hanging_port_runtime(tools.path());
    let mut config = passing_config();
    config.container.runtime = program;
    let pipeline = ValidationPipeline::new(config);
    let token = CancellationToken::new();
    let context = ValidationContext::new(project.path())
        .with_run_id("leak-2")
        .with_cancellation(token.clone());

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(500)).await;
        token.cancel();
    });
    let report = pipeline
        .validate(&context, Some(&[ValidationLevel::HealthCheck]))
        .await;
    assert!(report.results[0].is_cancelled());

    let deadline = Instant::now() + Duration::from_secs(3);
    let expected = "rmi -f svcforge-validate-leak-2".to_string();
    while !runtime_calls(&log).contains(&expected) && Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    let calls = runtime_calls(&log);
    assert!(calls.contains(&"rm -f cid123".to_string()), "{calls:?}");
    assert!(calls.contains(&expected), "{calls:?}");
}

// =============================================================================
// Cancellation
// =============================================================================

#[tokio::test]
async fn test_cancellation_stops_running_level() {
    let project = service_project();
    let config = passing_config().with_typescript_command(CommandSpec::new("sleep", ["5"]));
    let pipeline = ValidationPipeline::new(config);
    let token = CancellationToken::new();
    let context = ValidationContext::new(project.path()).with_cancellation(token.clone());

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        token.cancel();
    });
    let started = Instant::now();
    let report = pipeline.validate(&context, None).await;

    assert!(started.elapsed() < Duration::from_secs(4));
    assert_eq!(
        report.levels(),
        vec![
            ValidationLevel::Structural,
            ValidationLevel::Contract,
            ValidationLevel::Typescript
        ]
    );
    assert!(report.results[2].is_cancelled());
    assert_eq!(report.stopped_at, Some(ValidationLevel::Typescript));
}
