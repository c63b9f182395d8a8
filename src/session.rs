//! A session owns exactly one running container for its lifetime.
//!
//! ```no_run
//! # async fn demo() -> boxsession::Result<()> {
//! use boxsession::{Command, DaemonConfig, Session, SessionOptions};
//!
//! let config = DaemonConfig::from_env();
//! let mut session = Session::connect(&config, SessionOptions::new("alpine:latest")).await?;
//!
//! let mut out = Vec::new();
//! session.run(Command::new("echo").arg("hello").stdout(&mut out)).await?;
//! assert_eq!(out, b"hello\n");
//!
//! let image = session.save().await?;
//! session.close().await?;
//! # let _ = image;
//! # Ok(())
//! # }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info, warn};

use crate::docker::{
    ContainerRuntime, ContainerSpec, DaemonConfig, DockerClient, ExecIo, ExecSpec, InputStream,
    OutputStream, SaveOptions,
};
use crate::error::{Result, SessionError};

/// Label put on every container a session creates.
pub const MANAGED_LABEL: &str = "boxsession.managed";

const EXEC_POLL_INITIAL: Duration = Duration::from_millis(20);
const EXEC_POLL_MAX: Duration = Duration::from_secs(1);

/// Foreground process that keeps the container alive between commands.
pub fn default_keep_alive() -> Vec<String> {
    vec![
        "/usr/bin/tail".to_string(),
        "-f".to_string(),
        "/dev/null".to_string(),
    ]
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionOptions {
    pub image: String,
    #[serde(default = "default_keep_alive")]
    pub keep_alive: Vec<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub labels: HashMap<String, String>,
}

impl SessionOptions {
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            keep_alive: default_keep_alive(),
            name: None,
            labels: HashMap::new(),
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    pub fn keep_alive<I, S>(mut self, cmd: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keep_alive = cmd.into_iter().map(Into::into).collect();
        self
    }

    fn container_spec(&self) -> ContainerSpec {
        let mut labels = self.labels.clone();
        labels.insert(MANAGED_LABEL.to_string(), "true".to_string());

        ContainerSpec {
            image: self.image.clone(),
            cmd: self.keep_alive.clone(),
            name: self.name.clone(),
            labels,
            attach_stdin: true,
        }
    }
}

/// One command to execute inside the session's container.
///
/// Streams are borrowed for the duration of [`Session::run`]; a stream left
/// unset is not attached at all.
pub struct Command<'a> {
    path: String,
    args: Vec<String>,
    env: Vec<String>,
    working_dir: Option<String>,
    stdin: Option<InputStream<'a>>,
    stdout: Option<OutputStream<'a>>,
    stderr: Option<OutputStream<'a>>,
}

impl<'a> Command<'a> {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            args: Vec::new(),
            env: Vec::new(),
            working_dir: None,
            stdin: None,
            stdout: None,
            stderr: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        self.env.push(format!("{}={}", key.as_ref(), value.as_ref()));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<String>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn stdin<R: AsyncRead + Send + Unpin>(mut self, reader: &'a mut R) -> Self {
        self.stdin = Some(reader);
        self
    }

    pub fn stdout<W: AsyncWrite + Send + Unpin>(mut self, writer: &'a mut W) -> Self {
        self.stdout = Some(writer);
        self
    }

    pub fn stderr<W: AsyncWrite + Send + Unpin>(mut self, writer: &'a mut W) -> Self {
        self.stderr = Some(writer);
        self
    }

    /// Executable followed by its arguments.
    pub fn argv(&self) -> Vec<String> {
        std::iter::once(self.path.clone())
            .chain(self.args.iter().cloned())
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    Started,
    Closed,
}

pub struct Session {
    runtime: Arc<dyn ContainerRuntime>,
    container_id: String,
    image: String,
    state: SessionState,
}

impl Session {
    /// Connects to the daemon described by `config` and creates a session on it.
    pub async fn connect(config: &DaemonConfig, options: SessionOptions) -> Result<Self> {
        let client = DockerClient::new(config).await?;
        Self::create(Arc::new(client), options).await
    }

    /// Creates and starts the session's container on an existing runtime.
    ///
    /// If the container is created but fails to start, it is removed again
    /// before the start error is returned.
    pub async fn create(runtime: Arc<dyn ContainerRuntime>, options: SessionOptions) -> Result<Self> {
        let container_id = runtime.create_container(&options.container_spec()).await?;

        if let Err(e) = runtime.start_container(&container_id).await {
            warn!("Container {} failed to start, removing it: {}", container_id, e);
            if let Err(cleanup) = runtime.remove_container(&container_id, true).await {
                warn!("Failed to remove unstarted container {}: {}", container_id, cleanup);
            }
            return Err(e);
        }

        info!("Session started in container {} ({})", container_id, options.image);
        Ok(Self {
            runtime,
            container_id,
            image: options.image,
            state: SessionState::Started,
        })
    }

    pub fn id(&self) -> &str {
        &self.container_id
    }

    pub fn image(&self) -> &str {
        &self.image
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_closed(&self) -> bool {
        self.state == SessionState::Closed
    }

    fn ensure_started(&self) -> Result<()> {
        match self.state {
            SessionState::Started => Ok(()),
            SessionState::Closed => Err(SessionError::Closed),
        }
    }

    /// Runs `command` in the container, streaming until it exits.
    ///
    /// A non-zero exit is reported as [`SessionError::ExitStatus`].
    pub async fn run(&self, command: Command<'_>) -> Result<()> {
        self.ensure_started()?;

        let argv = command.argv();
        let Command {
            env,
            working_dir,
            stdin,
            stdout,
            stderr,
            ..
        } = command;

        let spec = ExecSpec {
            cmd: argv,
            env,
            working_dir,
            attach_stdin: stdin.is_some(),
            attach_stdout: stdout.is_some(),
            attach_stderr: stderr.is_some(),
        };

        let exec_id = self.runtime.create_exec(&self.container_id, &spec).await?;
        self.runtime
            .start_exec(&exec_id, ExecIo { stdin, stdout, stderr })
            .await?;

        match self.wait_exec(&exec_id).await? {
            Some(0) | None => {
                debug!("Command {:?} completed in {}", spec.cmd, self.container_id);
                Ok(())
            }
            Some(code) => {
                debug!("Command {:?} exited with {} in {}", spec.cmd, code, self.container_id);
                Err(SessionError::ExitStatus { code })
            }
        }
    }

    /// Polls the exec until the daemon reports it finished.
    ///
    /// The attached output closes when the process closes its stdio, which can
    /// be well before it exits.
    async fn wait_exec(&self, exec_id: &str) -> Result<Option<i64>> {
        let mut delay = EXEC_POLL_INITIAL;
        loop {
            let status = self.runtime.inspect_exec(exec_id).await?;
            if !status.running {
                return Ok(status.exit_code);
            }
            debug!("Exec {} still running, checking again in {:?}", exec_id, delay);
            tokio::time::sleep(delay).await;
            delay = (delay * 2).min(EXEC_POLL_MAX);
        }
    }

    /// Commits the container's filesystem into a new image and returns its id.
    pub async fn save(&self) -> Result<String> {
        self.save_with(&SaveOptions::default()).await
    }

    pub async fn save_with(&self, options: &SaveOptions) -> Result<String> {
        self.ensure_started()?;
        self.runtime.commit_container(&self.container_id, options).await
    }

    /// Force-removes the container.
    ///
    /// Closing a closed session is a no-op, and a container the daemon no
    /// longer knows about counts as removed. Any other failure leaves the
    /// session open so the call can be retried.
    pub async fn close(&mut self) -> Result<()> {
        if self.is_closed() {
            return Ok(());
        }

        match self.runtime.remove_container(&self.container_id, true).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {
                warn!("Container {} was already gone on close", self.container_id);
            }
            Err(e) => return Err(e),
        }

        self.state = SessionState::Closed;
        info!("Session closed: {}", self.container_id);
        Ok(())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.state == SessionState::Started {
            warn!(
                "Session dropped without close; container {} is still running",
                self.container_id
            );
        }
    }
}
