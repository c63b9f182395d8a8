//! In-memory daemon used by the unit tests.

use async_trait::async_trait;
use bollard::errors::Error as DockerError;
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::docker::{ContainerRuntime, ContainerSpec, ExecIo, ExecSpec, ExecStatus, SaveOptions};
use crate::error::{Result, SessionError};

fn daemon_error(status_code: u16, message: impl Into<String>) -> DockerError {
    DockerError::DockerResponseServerError {
        status_code,
        message: message.into(),
    }
}

struct FakeContainer {
    spec: ContainerSpec,
    running: bool,
}

struct FakeExec {
    spec: ExecSpec,
    exit_code: Option<i64>,
    /// Inspections left that still report the exec as running.
    running_for: u32,
}

#[derive(Default)]
struct FakeState {
    next_id: u64,
    containers: HashMap<String, FakeContainer>,
    execs: HashMap<String, FakeExec>,
    last_exec: Option<ExecSpec>,
    created: usize,
    removed: usize,
    calls: usize,
    reject_removal: bool,
    keep_running_for: u32,
    inspections: usize,
}

impl FakeState {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}{:012x}", self.next_id)
    }
}

#[derive(Default)]
pub struct FakeDaemon {
    state: Mutex<FakeState>,
    fail_start: bool,
}

impl FakeDaemon {
    pub fn failing_start() -> Self {
        Self {
            fail_start: true,
            ..Default::default()
        }
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut FakeState) -> T) -> T {
        let mut state = self.state.lock().unwrap();
        f(&mut state)
    }

    fn call<T>(&self, f: impl FnOnce(&mut FakeState) -> T) -> T {
        self.with_state(|state| {
            state.calls += 1;
            f(state)
        })
    }

    pub fn exists(&self, id: &str) -> bool {
        self.with_state(|s| s.containers.contains_key(id))
    }

    pub fn is_running(&self, id: &str) -> bool {
        self.with_state(|s| s.containers.get(id).is_some_and(|c| c.running))
    }

    pub fn container_count(&self) -> usize {
        self.with_state(|s| s.containers.len())
    }

    pub fn created_count(&self) -> usize {
        self.with_state(|s| s.created)
    }

    pub fn remove_count(&self) -> usize {
        self.with_state(|s| s.removed)
    }

    pub fn call_count(&self) -> usize {
        self.with_state(|s| s.calls)
    }

    pub fn container_spec(&self, id: &str) -> Option<ContainerSpec> {
        self.with_state(|s| s.containers.get(id).map(|c| c.spec.clone()))
    }

    pub fn last_exec(&self) -> Option<ExecSpec> {
        self.with_state(|s| s.last_exec.clone())
    }

    /// Drops a container behind the session's back.
    pub fn forget(&self, id: &str) {
        self.with_state(|s| s.containers.remove(id));
    }

    /// Later execs report `running` for `inspections` checks after their
    /// output closes.
    pub fn keep_running_for(&self, inspections: u32) {
        self.with_state(|s| s.keep_running_for = inspections);
    }

    pub fn inspect_count(&self) -> usize {
        self.with_state(|s| s.inspections)
    }

    pub fn reject_removal(&self, reject: bool) {
        self.with_state(|s| s.reject_removal = reject);
    }
}

#[async_trait]
impl ContainerRuntime for FakeDaemon {
    async fn create_container(&self, spec: &ContainerSpec) -> Result<String> {
        self.call(|s| {
            if spec.image.starts_with("missing") {
                let err = daemon_error(404, format!("No such image: {}", spec.image));
                return Err(SessionError::runtime("container create", err));
            }
            let id = s.next_id("c");
            s.created += 1;
            s.containers.insert(
                id.clone(),
                FakeContainer {
                    spec: spec.clone(),
                    running: false,
                },
            );
            Ok(id)
        })
    }

    async fn start_container(&self, container_id: &str) -> Result<()> {
        let fail_start = self.fail_start;
        self.call(|s| {
            let container = s.containers.get_mut(container_id).ok_or_else(|| {
                SessionError::runtime("container start", daemon_error(404, "No such container"))
            })?;
            if fail_start {
                let err = daemon_error(500, "OCI runtime create failed");
                return Err(SessionError::runtime("container start", err));
            }
            container.running = true;
            Ok(())
        })
    }

    async fn create_exec(&self, container_id: &str, spec: &ExecSpec) -> Result<String> {
        self.call(|s| {
            if !s.containers.get(container_id).is_some_and(|c| c.running) {
                let err = daemon_error(404, format!("No such container: {container_id}"));
                return Err(SessionError::runtime("exec create", err));
            }
            let id = s.next_id("e");
            s.execs.insert(
                id.clone(),
                FakeExec {
                    spec: spec.clone(),
                    exit_code: None,
                    running_for: s.keep_running_for,
                },
            );
            s.last_exec = Some(spec.clone());
            Ok(id)
        })
    }

    async fn start_exec(&self, exec_id: &str, io: ExecIo<'_>) -> Result<()> {
        let spec = self.call(|s| {
            s.execs.get(exec_id).map(|exec| exec.spec.clone()).ok_or_else(|| {
                SessionError::runtime("exec start", daemon_error(404, "No such exec instance"))
            })
        })?;

        let ExecIo {
            stdin,
            stdout,
            stderr,
        } = io;

        let mut input = Vec::new();
        if let Some(stdin) = stdin {
            stdin.read_to_end(&mut input).await?;
        }

        let (out, err, code): (Vec<u8>, Vec<u8>, i64) = match spec.cmd[0].as_str() {
            "echo" => (format!("{}\n", spec.cmd[1..].join(" ")).into_bytes(), Vec::new(), 0),
            "cat" => (input, Vec::new(), 0),
            "true" => (Vec::new(), Vec::new(), 0),
            "false" => (Vec::new(), Vec::new(), 1),
            other => (
                Vec::new(),
                format!("exec: \"{other}\": executable file not found in $PATH\n").into_bytes(),
                127,
            ),
        };

        if let Some(sink) = stdout {
            sink.write_all(&out).await?;
        }
        if let Some(sink) = stderr {
            sink.write_all(&err).await?;
        }

        self.with_state(|s| {
            if let Some(exec) = s.execs.get_mut(exec_id) {
                exec.exit_code = Some(code);
            }
        });
        Ok(())
    }

    async fn inspect_exec(&self, exec_id: &str) -> Result<ExecStatus> {
        self.call(|s| {
            s.inspections += 1;
            let exec = s.execs.get_mut(exec_id).ok_or_else(|| {
                SessionError::runtime("exec inspect", daemon_error(404, "No such exec instance"))
            })?;
            if exec.running_for > 0 {
                exec.running_for -= 1;
                return Ok(ExecStatus {
                    running: true,
                    exit_code: None,
                });
            }
            Ok(ExecStatus {
                running: false,
                exit_code: exec.exit_code,
            })
        })
    }

    async fn commit_container(&self, container_id: &str, _options: &SaveOptions) -> Result<String> {
        self.call(|s| {
            if !s.containers.contains_key(container_id) {
                let err = daemon_error(404, format!("No such container: {container_id}"));
                return Err(SessionError::runtime("container commit", err));
            }
            Ok(format!("sha256:{}", s.next_id("")))
        })
    }

    async fn remove_container(&self, container_id: &str, _force: bool) -> Result<()> {
        self.call(|s| {
            if s.reject_removal {
                let err = daemon_error(409, "removal of container is already in progress");
                return Err(SessionError::runtime("container remove", err));
            }
            if s.containers.remove(container_id).is_none() {
                let err = daemon_error(404, format!("No such container: {container_id}"));
                return Err(SessionError::runtime("container remove", err));
            }
            s.removed += 1;
            Ok(())
        })
    }
}
