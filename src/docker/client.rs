use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, LogOutput, RemoveContainerOptions, StartContainerOptions,
};
use bollard::exec::{CreateExecOptions, StartExecOptions, StartExecResults};
use bollard::image::CommitContainerOptions;
use bollard::{Docker, API_DEFAULT_VERSION};
use futures::stream::StreamExt;
use std::io;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use super::config::{DaemonConfig, DaemonEndpoint};
use super::runtime::{ContainerRuntime, ContainerSpec, ExecIo, ExecSpec, ExecStatus, SaveOptions};
use crate::error::{Result, SessionError};

pub struct DockerClient {
    docker: Docker,
}

impl DockerClient {
    pub async fn new(config: &DaemonConfig) -> Result<Self> {
        let connection_error = |source| SessionError::Connection {
            address: config.host.clone(),
            source,
        };

        let docker = match config.endpoint() {
            DaemonEndpoint::Unix(path) => {
                Docker::connect_with_socket(&path, config.timeout_secs, API_DEFAULT_VERSION)
            }
            DaemonEndpoint::Http(addr) => {
                Docker::connect_with_http(&addr, config.timeout_secs, API_DEFAULT_VERSION)
            }
        }
        .map_err(connection_error)?;

        // Test connection
        let version = docker.version().await.map_err(connection_error)?;

        info!(
            "Connected to container daemon at {} (version {})",
            config.host,
            version.version.unwrap_or_default()
        );

        Ok(Self { docker })
    }
}

#[async_trait]
impl ContainerRuntime for DockerClient {
    async fn create_container(&self, spec: &ContainerSpec) -> Result<String> {
        let options = spec.name.as_ref().map(|name| CreateContainerOptions {
            name: name.clone(),
            platform: None,
        });

        let config = Config {
            image: Some(spec.image.clone()),
            cmd: Some(spec.cmd.clone()),
            labels: Some(spec.labels.clone()),
            attach_stdin: Some(spec.attach_stdin),
            open_stdin: Some(spec.attach_stdin),
            ..Default::default()
        };

        let response = self
            .docker
            .create_container(options, config)
            .await
            .map_err(|e| SessionError::runtime("container create", e))?;

        info!("Created container {} from image {}", response.id, spec.image);
        Ok(response.id)
    }

    async fn start_container(&self, container_id: &str) -> Result<()> {
        self.docker
            .start_container(container_id, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| SessionError::runtime("container start", e))?;

        info!("Started container: {}", container_id);
        Ok(())
    }

    async fn create_exec(&self, container_id: &str, spec: &ExecSpec) -> Result<String> {
        let exec_config = CreateExecOptions {
            cmd: Some(spec.cmd.clone()),
            env: (!spec.env.is_empty()).then(|| spec.env.clone()),
            working_dir: spec.working_dir.clone(),
            attach_stdin: Some(spec.attach_stdin),
            attach_stdout: Some(spec.attach_stdout),
            attach_stderr: Some(spec.attach_stderr),
            ..Default::default()
        };

        let exec = self
            .docker
            .create_exec(container_id, exec_config)
            .await
            .map_err(|e| SessionError::runtime("exec create", e))?;

        debug!("Created exec {} in container {}: {:?}", exec.id, container_id, spec.cmd);
        Ok(exec.id)
    }

    async fn start_exec(&self, exec_id: &str, io: ExecIo<'_>) -> Result<()> {
        let ExecIo {
            stdin,
            mut stdout,
            mut stderr,
        } = io;

        let options = StartExecOptions {
            detach: false,
            ..Default::default()
        };

        let started = self
            .docker
            .start_exec(exec_id, Some(options))
            .await
            .map_err(|e| SessionError::runtime("exec start", e))?;

        let (mut output, mut input) = match started {
            StartExecResults::Attached { output, input } => (output, input),
            StartExecResults::Detached => return Ok(()),
        };

        let feed = async move {
            if let Some(stdin) = stdin {
                tokio::io::copy(stdin, &mut input).await?;
                input.shutdown().await?;
            }
            Ok::<(), io::Error>(())
        };

        let drain = async move {
            while let Some(frame) = output.next().await {
                match frame.map_err(io::Error::other)? {
                    LogOutput::StdOut { message } | LogOutput::Console { message } => {
                        if let Some(sink) = stdout.as_deref_mut() {
                            sink.write_all(&message).await?;
                        }
                    }
                    LogOutput::StdErr { message } => {
                        if let Some(sink) = stderr.as_deref_mut() {
                            sink.write_all(&message).await?;
                        }
                    }
                    LogOutput::StdIn { .. } => {}
                }
            }
            if let Some(sink) = stdout.as_deref_mut() {
                sink.flush().await?;
            }
            if let Some(sink) = stderr.as_deref_mut() {
                sink.flush().await?;
            }
            Ok::<(), io::Error>(())
        };

        // Once output closes the command reads no more input; stop feeding stdin.
        tokio::pin!(feed, drain);
        tokio::select! {
            fed = &mut feed => {
                fed?;
                drain.await?;
            }
            drained = &mut drain => drained?,
        }

        debug!("Exec {} finished streaming", exec_id);
        Ok(())
    }

    async fn inspect_exec(&self, exec_id: &str) -> Result<ExecStatus> {
        let inspect = self
            .docker
            .inspect_exec(exec_id)
            .await
            .map_err(|e| SessionError::runtime("exec inspect", e))?;

        Ok(ExecStatus {
            running: inspect.running.unwrap_or(false),
            exit_code: inspect.exit_code,
        })
    }

    async fn commit_container(&self, container_id: &str, options: &SaveOptions) -> Result<String> {
        let commit_options = CommitContainerOptions {
            container: container_id.to_string(),
            repo: options.repo.clone().unwrap_or_default(),
            tag: options.tag.clone().unwrap_or_default(),
            comment: options.comment.clone().unwrap_or_default(),
            author: options.author.clone().unwrap_or_default(),
            pause: options.pause,
            ..Default::default()
        };

        let commit = self
            .docker
            .commit_container(commit_options, Config::<String>::default())
            .await
            .map_err(|e| SessionError::runtime("container commit", e))?;

        let image_id: Option<String> = commit.id.into();
        let image_id = image_id
            .filter(|id| !id.is_empty())
            .ok_or(SessionError::MissingImageId)?;

        info!("Committed container {} as image {}", container_id, image_id);
        Ok(image_id)
    }

    async fn remove_container(&self, container_id: &str, force: bool) -> Result<()> {
        let options = RemoveContainerOptions {
            force,
            ..Default::default()
        };

        self.docker
            .remove_container(container_id, Some(options))
            .await
            .map_err(|e| SessionError::runtime("container remove", e))?;

        info!("Removed container: {}", container_id);
        Ok(())
    }
}
