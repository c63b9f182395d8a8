use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::Result;

/// Byte source the daemon reads an exec's standard input from.
pub type InputStream<'a> = &'a mut (dyn AsyncRead + Send + Unpin);

/// Byte sink the daemon writes an exec's output into.
pub type OutputStream<'a> = &'a mut (dyn AsyncWrite + Send + Unpin);

/// Container creation request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerSpec {
    pub image: String,
    pub cmd: Vec<String>,
    pub name: Option<String>,
    pub labels: HashMap<String, String>,
    pub attach_stdin: bool,
}

/// Exec creation request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecSpec {
    pub cmd: Vec<String>,
    pub env: Vec<String>,
    pub working_dir: Option<String>,
    pub attach_stdin: bool,
    pub attach_stdout: bool,
    pub attach_stderr: bool,
}

/// Streams wired to a started exec for the duration of the call.
#[derive(Default)]
pub struct ExecIo<'a> {
    pub stdin: Option<InputStream<'a>>,
    pub stdout: Option<OutputStream<'a>>,
    pub stderr: Option<OutputStream<'a>>,
}

/// Daemon-reported state of an exec.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecStatus {
    pub running: bool,
    /// Set once the process has exited.
    pub exit_code: Option<i64>,
}

/// Settings for committing a container into an image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveOptions {
    pub repo: Option<String>,
    pub tag: Option<String>,
    pub comment: Option<String>,
    pub author: Option<String>,
    /// Pause the container while committing.
    pub pause: bool,
}

impl Default for SaveOptions {
    fn default() -> Self {
        Self {
            repo: None,
            tag: None,
            comment: None,
            author: None,
            pause: true,
        }
    }
}

/// The daemon operations a session is built from.
///
/// [`crate::docker::DockerClient`] is the production implementation; the
/// session tests drive an in-memory one.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Returns the new container's id.
    async fn create_container(&self, spec: &ContainerSpec) -> Result<String>;

    async fn start_container(&self, container_id: &str) -> Result<()>;

    /// Returns the new exec's id.
    async fn create_exec(&self, container_id: &str, spec: &ExecSpec) -> Result<String>;

    /// Runs the exec attached, returning once the daemon closes its output.
    /// The process may still be running at that point.
    async fn start_exec(&self, exec_id: &str, io: ExecIo<'_>) -> Result<()>;

    async fn inspect_exec(&self, exec_id: &str) -> Result<ExecStatus>;

    /// Returns the committed image's id.
    async fn commit_container(&self, container_id: &str, options: &SaveOptions) -> Result<String>;

    async fn remove_container(&self, container_id: &str, force: bool) -> Result<()>;
}
