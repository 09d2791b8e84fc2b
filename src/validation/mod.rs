//! Six-level validation of a generated microservice project
//!
//! ```text
//! structural -> contract -> typescript -> build -> healthCheck -> contractDiscovery
//! ```
//!
//! - **types**: levels, per-level diagnostics, results and the report
//! - **validator**: the `Validator` trait and the per-run `ValidationContext`
//! - **levels**: one validator per level
//! - **pipeline**: ordering, timeouts, cancellation and aggregation
//! - **diagnostics**: compiler, bundler and contract pattern parsers
//! - **scan**: source tree walking
//! - **process**: external tool execution
//! - **container**: container runtime used by the health check

pub mod container;
pub mod diagnostics;
pub mod levels;
pub mod pipeline;
pub mod process;
pub mod scan;
pub mod types;
pub mod validator;

pub use container::{
    ContainerGuard, ContainerLaunch, ContainerResources, ContainerRuntime, DockerRuntime,
};
pub use diagnostics::{
    BuildDiagnosticParser, ContractDeclaration, ContractKind, ContractPatternParser,
    DiagnosticParser, TypeScriptDiagnosticParser, is_well_formed_contract,
};
pub use levels::{
    BuildValidator, ContractDiscoveryValidator, ContractValidator, HealthCheckValidator,
    StructuralValidator, TypeScriptValidator, default_validators,
};
pub use pipeline::ValidationPipeline;
pub use process::{CommandOutput, run_command};
pub use types::{
    BuildDetails, BuildError, ContractDetails, ContractError, DiagnosticSeverity, DiscoveryDetails,
    DiscoveryError, HealthCheckDetails, HealthCheckError, LevelDetails, PIPELINE_SUBJECT,
    StructuralDetails, StructuralError, TypeScriptDetails, TypeScriptError, ValidationLevel,
    ValidationReport, ValidationResult,
};
pub use validator::{ValidationContext, Validator};
