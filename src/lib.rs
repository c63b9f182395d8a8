//! Container-backed command sessions.
//!
//! A [`Session`] creates one container from an image, keeps it running, runs
//! commands inside it with attached standard streams, can commit it as a new
//! image, and removes it on [`Session::close`].

pub mod docker;
pub mod error;
pub mod session;
pub mod shared;

#[cfg(test)]
mod testing;

pub use docker::{ContainerRuntime, DaemonConfig, DockerClient, ExecIo, SaveOptions};
pub use error::{Result, SessionError};
pub use session::{Command, Session, SessionOptions, SessionState};
