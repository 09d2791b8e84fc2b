//! Command dispatch for the `svcforge` binary
//!
//! Every command writes one JSON document to stdout; logs go elsewhere.

use crate::codegen::CodeAssembler;
use crate::config::{CliArgs, Command, GenerateArgs, ValidateArgs};
use crate::metrics::encode_metrics;
use crate::template::TemplateLoader;
use crate::validation::{ValidationContext, ValidationPipeline, ValidationReport};
use anyhow::{Context, Result};
use std::io::Write;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Execute one CLI command, writing its JSON result to stdout
pub async fn run(args: CliArgs) -> Result<ExitCode> {
    match args.command {
        Command::Generate(generate) => run_generate(generate),
        Command::Validate(validate) => run_validate(validate).await,
        Command::Schema => {
            let schema = schemars::schema_for!(ValidationReport);
            write_json(&schema)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn run_generate(args: GenerateArgs) -> Result<ExitCode> {
    anyhow::ensure!(
        args.templates.is_dir(),
        "template root {} is not a directory",
        args.templates.display()
    );
    let loader = Arc::new(TemplateLoader::new(&args.templates));
    let assembler = CodeAssembler::new(loader);
    let artifact = match assembler.generate(&args.options()) {
        Ok(artifact) => artifact,
        Err(error) => {
            tracing::error!(kind = ?error.kind(), %error, entity = %args.entity, "generation failed");
            return Err(anyhow::Error::new(error)
                .context(format!("failed to generate sources for {}", args.entity)));
        }
    };

    if !artifact.is_complete() {
        tracing::warn!(
            unresolved = ?artifact.unsubstituted_variables(),
            "generated sources contain unresolved placeholders"
        );
    }
    write_json(&artifact)?;
    Ok(ExitCode::SUCCESS)
}

async fn run_validate(args: ValidateArgs) -> Result<ExitCode> {
    let config = args.pipeline_config()?;
    anyhow::ensure!(
        args.project.is_dir(),
        "project root {} is not a directory",
        args.project.display()
    );

    let cancellation = CancellationToken::new();
    let context = ValidationContext::new(&args.project)
        .with_expected_contracts(args.contracts.iter().cloned())
        .with_cancellation(cancellation.clone());

    let signal_task = tokio::spawn({
        let cancellation = cancellation.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupt received, cancelling validation");
                cancellation.cancel();
            }
        }
    });

    let pipeline = ValidationPipeline::new(config);
    let report = pipeline.validate(&context, Some(&args.levels)).await;
    signal_task.abort();

    if let Some(path) = args.metrics.as_ref() {
        std::fs::write(path, encode_metrics())
            .with_context(|| format!("failed to write metrics to {}", path.display()))?;
        tracing::debug!(path = %path.display(), "metrics written");
    }

    write_json(&report)?;
    Ok(if report.valid {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn write_json<T: serde::Serialize>(value: &T) -> Result<()> {
    let mut stdout = std::io::stdout().lock();
    serde_json::to_writer_pretty(&mut stdout, value).context("failed to write JSON output")?;
    writeln!(stdout)?;
    Ok(())
}
