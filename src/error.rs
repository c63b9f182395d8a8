use thiserror::Error;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Cannot connect to container daemon at {address}: {source}")]
    Connection {
        address: String,
        #[source]
        source: bollard::errors::Error,
    },

    #[error("Daemon rejected {operation}: {source}")]
    Runtime {
        operation: &'static str,
        #[source]
        source: bollard::errors::Error,
    },

    #[error("Stream error: {0}")]
    Stream(#[from] std::io::Error),

    #[error("Command exited with status {code}")]
    ExitStatus { code: i64 },

    #[error("Session is closed")]
    Closed,

    #[error("Daemon committed the container but returned no image id")]
    MissingImageId,
}

impl SessionError {
    pub(crate) fn runtime(operation: &'static str, source: bollard::errors::Error) -> Self {
        SessionError::Runtime { operation, source }
    }

    /// True when the daemon answered 404 for the requested object.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            SessionError::Runtime {
                source: bollard::errors::Error::DockerResponseServerError { status_code: 404, .. },
                ..
            }
        )
    }
}

pub type Result<T> = std::result::Result<T, SessionError>;
