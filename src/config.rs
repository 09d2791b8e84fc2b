use crate::codegen::{
    DEFAULT_CONNECTION_NAME, DEFAULT_ORM, FieldDefinition, SchemaGenerationOptions,
};
use crate::validation::ValidationLevel;
use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const REQUIRED_FILES: &[&str] = &[
    "src/main.ts",
    "src/app.module.ts",
    "src/health/health.controller.ts",
    "src/health/health.module.ts",
];

const DEFAULT_TYPESCRIPT_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_BUILD_TIMEOUT_MS: u64 = 60_000;
const DEFAULT_HEALTH_PROBE_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_CONTAINER_START_TIMEOUT_MS: u64 = 60_000;
const DEFAULT_CONTAINER_PORT: u16 = 3000;
const DEFAULT_BUILD_OUTPUT_DIR: &str = "dist";

/// Every knob the validation pipeline reads
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub required_files: Vec<String>,
    pub timeouts_ms: TimeoutConfig,
    pub typescript_command: CommandSpec,
    pub build_command: CommandSpec,
    /// Compiled output scanned by contract discovery, relative to the project root
    pub build_output_dir: PathBuf,
    pub controller_suffix: String,
    /// Directory names skipped while scanning sources
    pub excluded_dirs: Vec<String>,
    pub container: ContainerConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub typescript: u64,
    pub build: u64,
    pub health_probe: u64,
    pub container_start: u64,
    /// Structural, contract and contract discovery levels
    pub default: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerConfig {
    /// Container CLI (`docker`, `podman`)
    pub runtime: String,
    pub host: String,
    /// Port the service listens on inside the container
    pub port: u16,
    pub health_path: String,
    pub rpc_prefix: String,
    pub probe_interval_ms: u64,
    pub image_prefix: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            required_files: REQUIRED_FILES.iter().map(|f| f.to_string()).collect(),
            timeouts_ms: TimeoutConfig::default(),
            typescript_command: CommandSpec::new("tsc", ["--noEmit"]),
            build_command: CommandSpec::new("bun", ["run", "build"]),
            build_output_dir: PathBuf::from(DEFAULT_BUILD_OUTPUT_DIR),
            controller_suffix: ".controller.ts".to_string(),
            excluded_dirs: vec![
                "node_modules".to_string(),
                DEFAULT_BUILD_OUTPUT_DIR.to_string(),
                ".git".to_string(),
            ],
            container: ContainerConfig::default(),
        }
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            typescript: DEFAULT_TYPESCRIPT_TIMEOUT_MS,
            build: DEFAULT_BUILD_TIMEOUT_MS,
            health_probe: DEFAULT_HEALTH_PROBE_TIMEOUT_MS,
            container_start: DEFAULT_CONTAINER_START_TIMEOUT_MS,
            default: DEFAULT_TYPESCRIPT_TIMEOUT_MS,
        }
    }
}

impl Default for CommandSpec {
    fn default() -> Self {
        Self::new("true", Vec::<String>::new())
    }
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            runtime: "docker".to_string(),
            host: "127.0.0.1".to_string(),
            port: DEFAULT_CONTAINER_PORT,
            health_path: "/health".to_string(),
            rpc_prefix: "/rpc".to_string(),
            probe_interval_ms: 500,
            image_prefix: "svcforge-validate".to_string(),
        }
    }
}

impl PipelineConfig {
    /// Load from a TOML file; missing keys keep their defaults
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            bail!("config file {:?} does not exist", path);
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {:?}", path))?;
        let config: PipelineConfig = toml::from_str(&content)
            .with_context(|| format!("failed to parse TOML config {:?}", path))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            !self.required_files.is_empty(),
            "at least one required file must be configured"
        );
        for file in &self.required_files {
            let path = Path::new(file);
            anyhow::ensure!(
                !path.is_absolute() && !file.contains(".."),
                "required file {:?} must be relative to the project root",
                file
            );
        }

        let timeouts = &self.timeouts_ms;
        for (name, value) in [
            ("typescript", timeouts.typescript),
            ("build", timeouts.build),
            ("health_probe", timeouts.health_probe),
            ("container_start", timeouts.container_start),
            ("default", timeouts.default),
        ] {
            anyhow::ensure!(value > 0, "timeout {name} must be greater than zero");
        }

        anyhow::ensure!(
            !self.typescript_command.program.trim().is_empty(),
            "typescript command must not be empty"
        );
        anyhow::ensure!(
            !self.build_command.program.trim().is_empty(),
            "build command must not be empty"
        );
        anyhow::ensure!(
            self.controller_suffix.ends_with(".ts"),
            "controller suffix {:?} must end with .ts",
            self.controller_suffix
        );

        let container = &self.container;
        anyhow::ensure!(container.port > 0, "container port must be non-zero");
        anyhow::ensure!(
            container.health_path.starts_with('/'),
            "health path {:?} must start with '/'",
            container.health_path
        );
        anyhow::ensure!(
            container.rpc_prefix.starts_with('/'),
            "rpc prefix {:?} must start with '/'",
            container.rpc_prefix
        );
        anyhow::ensure!(
            container.probe_interval_ms > 0,
            "probe interval must be greater than zero"
        );
        Ok(())
    }

    /// Timeout budget for one level
    pub fn level_timeout(&self, level: ValidationLevel) -> Duration {
        let ms = match level {
            ValidationLevel::Typescript => self.timeouts_ms.typescript,
            ValidationLevel::Build => self.timeouts_ms.build,
            ValidationLevel::HealthCheck => {
                self.timeouts_ms.container_start + self.timeouts_ms.health_probe
            }
            ValidationLevel::Structural
            | ValidationLevel::Contract
            | ValidationLevel::ContractDiscovery => self.timeouts_ms.default,
        };
        Duration::from_millis(ms)
    }

    /// Set the budget that `level_timeout(level)` reads.
    ///
    /// Structural, contract and contract discovery share `timeouts_ms.default`,
    /// so setting any one of them sets all three. For the health check only the
    /// probe budget is set; the level's total still adds `container_start`.
    pub fn with_timeout(mut self, level: ValidationLevel, ms: u64) -> Self {
        match level {
            ValidationLevel::Typescript => self.timeouts_ms.typescript = ms,
            ValidationLevel::Build => self.timeouts_ms.build = ms,
            ValidationLevel::HealthCheck => self.timeouts_ms.health_probe = ms,
            _ => self.timeouts_ms.default = ms,
        }
        self
    }

    pub fn with_typescript_command(mut self, command: CommandSpec) -> Self {
        self.typescript_command = command;
        self
    }

    pub fn with_build_command(mut self, command: CommandSpec) -> Self {
        self.build_command = command;
        self
    }

    pub fn with_container_port(mut self, port: u16) -> Self {
        self.container.port = port;
        self
    }
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "svcforge",
    about = "Generate and certify microservice sources",
    version
)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Render connection, schema and repository sources for one entity
    Generate(GenerateArgs),
    /// Run the validation pipeline against a project directory
    Validate(ValidateArgs),
    /// Print the JSON Schema of the validation report
    Schema,
}

#[derive(Args, Debug, Clone)]
pub struct GenerateArgs {
    #[arg(
        long,
        env = "SVCFORGE_TEMPLATES",
        value_name = "DIR",
        help = "Template root containing components/<orm>/"
    )]
    pub templates: PathBuf,

    #[arg(long, value_name = "NAME", help = "Entity name, e.g. Product")]
    pub entity: String,

    #[arg(long, value_name = "NAME", help = "Table name, e.g. products")]
    pub table: String,

    #[arg(
        long = "field",
        value_name = "SPEC",
        help = "Field as name:kind[:required][:unique][:pk][:max=N][:default=V]"
    )]
    pub fields: Vec<FieldDefinition>,

    #[arg(long, default_value = DEFAULT_ORM)]
    pub orm: String,

    #[arg(long, default_value = DEFAULT_CONNECTION_NAME)]
    pub connection: String,

    #[arg(long, value_name = "TYPE", help = "Database type, default postgresql")]
    pub database_type: Option<String>,
}

impl GenerateArgs {
    pub fn options(&self) -> SchemaGenerationOptions {
        let options = SchemaGenerationOptions::new(&self.entity, &self.table)
            .with_fields(self.fields.iter().cloned())
            .with_orm(&self.orm)
            .with_connection_name(&self.connection);
        match self.database_type.as_deref() {
            Some(database_type) => options.with_database_type(database_type),
            None => options,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct ValidateArgs {
    #[arg(long, value_name = "DIR", help = "Generated project root")]
    pub project: PathBuf,

    #[arg(
        long = "level",
        value_name = "LEVEL",
        help = "Level to run (repeatable); all levels when omitted"
    )]
    pub levels: Vec<ValidationLevel>,

    #[arg(
        long = "contract",
        value_name = "PATTERN",
        help = "Expected contract pattern (repeatable)"
    )]
    pub contracts: Vec<String>,

    #[arg(
        long,
        env = "SVCFORGE_CONFIG",
        value_name = "FILE",
        help = "Pipeline configuration (TOML)"
    )]
    pub config: Option<PathBuf>,

    #[arg(
        long,
        env = "SVCFORGE_CONTAINER_PORT",
        value_name = "PORT",
        help = "Port the service listens on inside the container"
    )]
    pub container_port: Option<u16>,

    #[arg(
        long,
        value_name = "FILE",
        help = "Write Prometheus text metrics for the run to FILE"
    )]
    pub metrics: Option<PathBuf>,
}

impl ValidateArgs {
    /// File config (or defaults) with CLI overrides applied
    pub fn pipeline_config(&self) -> Result<PipelineConfig> {
        let mut config = match self.config.as_ref() {
            Some(path) => PipelineConfig::load_from_file(path)?,
            None => PipelineConfig::default(),
        };
        if let Some(port) = self.container_port {
            config = config.with_container_port(port);
        }
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn defaults_are_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.required_files.len(), 4);
        assert_eq!(
            config.level_timeout(ValidationLevel::Build),
            Duration::from_secs(60)
        );
        assert_eq!(
            config.level_timeout(ValidationLevel::ContractDiscovery),
            Duration::from_secs(30)
        );
        assert_eq!(
            config.level_timeout(ValidationLevel::HealthCheck),
            Duration::from_secs(90)
        );
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pipeline.toml");
        std::fs::write(
            &path,
            "build_output_dir = \"build\"\n\n[timeouts_ms]\nbuild = 120000\n\n[build_command]\nprogram = \"npm\"\nargs = [\"run\", \"build\"]\n",
        )
        .unwrap();

        let config = PipelineConfig::load_from_file(&path).unwrap();
        assert_eq!(config.timeouts_ms.build, 120_000);
        assert_eq!(config.timeouts_ms.typescript, 30_000);
        assert_eq!(config.build_command.display(), "npm run build");
        assert_eq!(config.build_output_dir, PathBuf::from("build"));
        assert_eq!(config.container.port, 3000);
    }

    #[test]
    fn rejects_zero_timeout() {
        let config = PipelineConfig::default().with_timeout(ValidationLevel::Typescript, 0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_escaping_required_file() {
        let mut config = PipelineConfig::default();
        config.required_files.push("../outside.ts".into());
        assert!(config.validate().is_err());
    }

    #[test]
    fn generate_args_build_options() {
        let cli = CliArgs::try_parse_from([
            "svcforge",
            "generate",
            "--templates",
            "templates",
            "--entity",
            "Product",
            "--table",
            "products",
            "--field",
            "name:string:required",
            "--field",
            "price:number",
        ])
        .unwrap();
        let Command::Generate(args) = cli.command else {
            panic!("expected generate");
        };
        let options = args.options();
        assert_eq!(options.fields.len(), 2);
        assert_eq!(options.orm, "drizzle");
        assert_eq!(options.connection_name, "main-db");
        assert_eq!(options.database_type, "postgresql");
    }

    #[test]
    fn validate_args_parse_levels() {
        let cli = CliArgs::try_parse_from([
            "svcforge",
            "validate",
            "--project",
            ".",
            "--level",
            "build",
            "--level",
            "healthCheck",
            "--contract",
            "graph-service.listProjects",
        ])
        .unwrap();
        let Command::Validate(args) = cli.command else {
            panic!("expected validate");
        };
        assert_eq!(
            args.levels,
            vec![ValidationLevel::Build, ValidationLevel::HealthCheck]
        );
        assert_eq!(args.contracts, vec!["graph-service.listProjects"]);
    }

    #[test]
    fn missing_file_is_an_error() {
        let err = PipelineConfig::load_from_file("/nonexistent/pipeline.toml").unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn with_timeout_sets_the_shared_budgets() {
        let config = PipelineConfig::default()
            .with_timeout(ValidationLevel::Contract, 250)
            .with_timeout(ValidationLevel::HealthCheck, 1_000);
        for level in [
            ValidationLevel::Structural,
            ValidationLevel::Contract,
            ValidationLevel::ContractDiscovery,
        ] {
            assert_eq!(config.level_timeout(level), Duration::from_millis(250));
        }
        assert_eq!(config.timeouts_ms.health_probe, 1_000);
        assert_eq!(
            config.level_timeout(ValidationLevel::HealthCheck),
            Duration::from_millis(DEFAULT_CONTAINER_START_TIMEOUT_MS + 1_000)
        );
    }
}
