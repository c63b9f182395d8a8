mod client;
mod config;
mod runtime;

pub use client::DockerClient;
pub use config::{DaemonConfig, DaemonEndpoint, DEFAULT_DOCKER_HOST, DOCKER_HOST_ENV};
pub use runtime::{
    ContainerRuntime, ContainerSpec, ExecIo, ExecSpec, ExecStatus, InputStream, OutputStream, SaveOptions,
};
