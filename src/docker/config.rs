use serde::{Deserialize, Serialize};

/// Environment variable consulted by [`DaemonConfig::from_env`].
pub const DOCKER_HOST_ENV: &str = "DOCKER_HOST";

/// Address used when `DOCKER_HOST` is unset or empty.
pub const DEFAULT_DOCKER_HOST: &str = "unix:///var/run/docker.sock";

/// Where and how to reach the container daemon.
///
/// Resolve this once at the edge of the program (see [`DaemonConfig::from_env`])
/// and hand it to [`crate::Session::connect`]; nothing else in the crate reads
/// the environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaemonConfig {
    pub host: String,
    /// Request timeout in seconds, applied by the client to every call.
    pub timeout_secs: u64,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_DOCKER_HOST.to_string(),
            timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DaemonEndpoint {
    /// Filesystem path of a unix socket.
    Unix(String),
    /// `tcp://` or `http://` address.
    Http(String),
}

impl DaemonConfig {
    pub fn with_host(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ..Default::default()
        }
    }

    pub fn from_env() -> Self {
        Self::from_host_var(std::env::var(DOCKER_HOST_ENV).ok())
    }

    /// Builds a config from the raw value of `DOCKER_HOST`.
    pub fn from_host_var(value: Option<String>) -> Self {
        match value {
            Some(host) if !host.trim().is_empty() => Self::with_host(host.trim()),
            _ => Self::default(),
        }
    }

    pub fn endpoint(&self) -> DaemonEndpoint {
        let host = self.host.as_str();
        if let Some(path) = host.strip_prefix("unix://") {
            DaemonEndpoint::Unix(path.to_string())
        } else if host.starts_with("tcp://") || host.starts_with("http://") {
            DaemonEndpoint::Http(host.to_string())
        } else {
            DaemonEndpoint::Unix(host.to_string())
        }
    }
}
