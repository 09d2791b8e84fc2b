pub mod cli;
pub mod codegen;
pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod template;
pub mod validation;

pub use cli::run;
pub use codegen::{CodeAssembler, GeneratedArtifact, SchemaGenerationOptions};
pub use config::{CliArgs, Command, PipelineConfig};
pub use error::{FailureKind, GenerationError, TemplateError};
pub use logging::{LoggingConfig, init_logging};
pub use template::{TemplateLoader, TemplateVariables, substitute};
pub use validation::{
    ValidationContext, ValidationLevel, ValidationPipeline, ValidationReport, ValidationResult,
    Validator,
};
