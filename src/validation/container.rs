//! Container lifecycle for the health-check level
//!
//! `ContainerGuard` owns everything a launch creates. It records the image
//! once built and the container name before `run` is issued, so a launch that
//! times out or is cancelled halfway still has its resources removed.

use crate::config::{CommandSpec, ContainerConfig};
use crate::validation::process::run_command;
use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

/// What to build and run
#[derive(Debug, Clone)]
pub struct ContainerLaunch {
    pub project_root: PathBuf,
    pub image_tag: String,
    /// Name given to the container so it can be removed before its id is known
    pub container_name: String,
    /// Port the service listens on inside the container
    pub container_port: u16,
}

/// Resources a launch has created so far
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerResources {
    /// Container id, or its name until `run` reports the id
    pub container: Option<String>,
    pub image_tag: Option<String>,
}

impl ContainerResources {
    pub fn is_empty(&self) -> bool {
        self.container.is_none() && self.image_tag.is_none()
    }

    /// Runtime arguments that remove these resources, container first
    pub fn removal_args(&self) -> Vec<[&str; 3]> {
        let mut commands = Vec::with_capacity(2);
        if let Some(container) = &self.container {
            commands.push(["rm", "-f", container.as_str()]);
        }
        if let Some(tag) = &self.image_tag {
            commands.push(["rmi", "-f", tag.as_str()]);
        }
        commands
    }
}

#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    fn name(&self) -> &str;

    /// Build the image tagged `launch.image_tag`
    async fn build(&self, launch: &ContainerLaunch) -> Result<()>;

    /// Start one detached container named `launch.container_name`; returns its id
    async fn run(&self, launch: &ContainerLaunch) -> Result<String>;

    /// Base URL the started container is reachable at
    async fn base_url(&self, container: &str, launch: &ContainerLaunch) -> Result<String>;

    /// Remove the container, then the image
    async fn remove(&self, resources: &ContainerResources) -> Result<()>;

    /// Removal for paths that cannot await
    fn remove_detached(&self, resources: ContainerResources);
}

/// Docker-compatible CLI runtime (`docker`, `podman`)
pub struct DockerRuntime {
    program: String,
    host: String,
}

impl DockerRuntime {
    pub fn new(config: &ContainerConfig) -> Self {
        Self {
            program: config.runtime.clone(),
            host: config.host.clone(),
        }
    }

    fn command<I, S>(&self, args: I) -> CommandSpec
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        CommandSpec::new(self.program.clone(), args)
    }

    async fn invoke(&self, spec: CommandSpec, cwd: &Path) -> Result<String> {
        let output = run_command(&spec, cwd).await?;
        if !output.success {
            bail!(
                "`{}` failed with exit code {:?}: {}",
                spec.display(),
                output.exit_code,
                output.stderr.trim()
            );
        }
        Ok(output.stdout.trim().to_string())
    }
}

/// Host port from `docker port` output such as `127.0.0.1:49153`
pub fn parse_published_port(mapping: &str) -> Result<u16> {
    let line = mapping
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .ok_or_else(|| anyhow!("no published port reported"))?;
    let port = line
        .rsplit(':')
        .next()
        .ok_or_else(|| anyhow!("malformed port mapping {line:?}"))?;
    port.parse()
        .with_context(|| format!("malformed port mapping {line:?}"))
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    fn name(&self) -> &str {
        &self.program
    }

    async fn build(&self, launch: &ContainerLaunch) -> Result<()> {
        tracing::info!(image = %launch.image_tag, runtime = %self.program, "building service image");
        let spec = self.command(["build", "-t", launch.image_tag.as_str(), "."]);
        self.invoke(spec, &launch.project_root).await?;
        Ok(())
    }

    async fn run(&self, launch: &ContainerLaunch) -> Result<String> {
        let publish = format!("{}::{}", self.host, launch.container_port);
        let spec = self.command([
            "run",
            "-d",
            "--name",
            launch.container_name.as_str(),
            "-p",
            publish.as_str(),
            launch.image_tag.as_str(),
        ]);
        self.invoke(spec, &launch.project_root).await
    }

    async fn base_url(&self, container: &str, launch: &ContainerLaunch) -> Result<String> {
        let port = format!("{}/tcp", launch.container_port);
        let spec = self.command(["port", container, port.as_str()]);
        let mapping = self.invoke(spec, &launch.project_root).await?;
        let port = parse_published_port(&mapping)?;
        Ok(format!("http://{}:{}", self.host, port))
    }

    async fn remove(&self, resources: &ContainerResources) -> Result<()> {
        let cwd = std::env::temp_dir();
        let mut failures = Vec::new();
        for args in resources.removal_args() {
            let spec = self.command(args);
            match self.invoke(spec, &cwd).await {
                Ok(_) => tracing::debug!(target_id = args[2], "{} done", args[0]),
                Err(error) => failures.push(format!("{error:#}")),
            }
        }
        if !failures.is_empty() {
            bail!("container cleanup failed: {}", failures.join("; "));
        }
        Ok(())
    }

    fn remove_detached(&self, resources: ContainerResources) {
        let program = self.program.clone();
        let spawned = std::thread::Builder::new()
            .name("container-cleanup".to_string())
            .spawn(move || {
                for args in resources.removal_args() {
                    let status = std::process::Command::new(&program)
                        .args(args)
                        .stdin(Stdio::null())
                        .stdout(Stdio::null())
                        .stderr(Stdio::null())
                        .status();
                    if let Err(error) = status {
                        tracing::error!(target_id = args[2], %error, "{} failed", args[0]);
                    }
                }
            });
        if let Err(error) = spawned {
            tracing::error!(%error, "failed to spawn container cleanup");
        }
    }
}

/// Owns a launch's resources until released; removes them on drop otherwise
pub struct ContainerGuard {
    runtime: Arc<dyn ContainerRuntime>,
    resources: ContainerResources,
    base_url: Option<String>,
}

impl ContainerGuard {
    pub fn new(runtime: Arc<dyn ContainerRuntime>) -> Self {
        Self {
            runtime,
            resources: ContainerResources::default(),
            base_url: None,
        }
    }

    /// Build, run and resolve the container; returns its base URL.
    ///
    /// Resources are recorded as they are created, so dropping this future
    /// part way leaves them owned by the guard.
    pub async fn start(&mut self, launch: &ContainerLaunch) -> Result<String> {
        self.runtime
            .build(launch)
            .await
            .context("image build failed")?;
        self.resources.image_tag = Some(launch.image_tag.clone());

        self.resources.container = Some(launch.container_name.clone());
        let id = self
            .runtime
            .run(launch)
            .await
            .context("container start failed")?;
        if !id.is_empty() {
            self.resources.container = Some(id.clone());
        }

        let container = self
            .resources
            .container
            .clone()
            .unwrap_or_else(|| launch.container_name.clone());
        let base_url = self
            .runtime
            .base_url(&container, launch)
            .await
            .context("failed to resolve published port")?;
        tracing::info!(id = %container, base_url = %base_url, "container started");
        self.base_url = Some(base_url.clone());
        Ok(base_url)
    }

    pub fn base_url(&self) -> Option<&str> {
        self.base_url.as_deref()
    }

    pub fn resources(&self) -> &ContainerResources {
        &self.resources
    }

    /// Remove everything created so far
    pub async fn release(mut self) -> Result<()> {
        let resources = std::mem::take(&mut self.resources);
        if resources.is_empty() {
            return Ok(());
        }
        self.runtime.remove(&resources).await
    }
}

impl Drop for ContainerGuard {
    fn drop(&mut self) {
        let resources = std::mem::take(&mut self.resources);
        if !resources.is_empty() {
            tracing::warn!(
                container = ?resources.container,
                image = ?resources.image_tag,
                "container guard dropped without release"
            );
            self.runtime.remove_detached(resources);
        }
    }
}
