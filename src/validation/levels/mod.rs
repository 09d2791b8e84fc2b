//! Validator implementations, one per level

pub mod build;
pub mod contract;
pub mod discovery;
pub mod health;
pub mod structural;
pub mod typescript;

pub use build::BuildValidator;
pub use contract::ContractValidator;
pub use discovery::ContractDiscoveryValidator;
pub use health::HealthCheckValidator;
pub use structural::StructuralValidator;
pub use typescript::TypeScriptValidator;

use crate::config::PipelineConfig;
use crate::validation::container::ContainerRuntime;
use crate::validation::types::ValidationLevel;
use crate::validation::validator::Validator;
use std::sync::Arc;
use std::time::Duration;

/// Default validator for every level, in execution order
pub fn default_validators(
    config: &PipelineConfig,
    runtime: Arc<dyn ContainerRuntime>,
) -> Vec<(ValidationLevel, Arc<dyn Validator>)> {
    let health = HealthCheckValidator::new(
        runtime,
        config.container.clone(),
        Duration::from_millis(config.timeouts_ms.container_start),
        Duration::from_millis(config.timeouts_ms.health_probe),
    )
    .with_sources(config.controller_suffix.clone(), config.excluded_dirs.clone());

    let validators: Vec<Arc<dyn Validator>> = vec![
        Arc::new(StructuralValidator::new(config.required_files.clone())),
        Arc::new(ContractValidator::new(
            config.controller_suffix.clone(),
            config.excluded_dirs.clone(),
        )),
        Arc::new(TypeScriptValidator::new(config.typescript_command.clone())),
        Arc::new(BuildValidator::new(config.build_command.clone())),
        Arc::new(health),
        Arc::new(ContractDiscoveryValidator::new(
            config.build_output_dir.clone(),
        )),
    ];
    validators
        .into_iter()
        .map(|validator| (validator.level(), validator))
        .collect()
}
