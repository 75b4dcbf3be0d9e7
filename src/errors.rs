//! Typed error hierarchy for dashbundle.
//!
//! Three top-level enums cover the three subsystems:
//! - `ProcessError`: subprocess spawn and I/O failures
//! - `BundleError`: bundle allocation, directory and assembly failures
//! - `GatewayError`: git smart-HTTP gateway failures
//!
//! Each maps onto an HTTP status at the server boundary (see `server::api`).

use axum::http::StatusCode;
use thiserror::Error;

/// Errors from spawning or driving a child process.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error while talking to {program}: {source}")]
    Io {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} did not finish within {secs}s")]
    TimedOut { program: String, secs: u64 },
}

/// Errors from bundle creation.
#[derive(Debug, Error)]
pub enum BundleError {
    #[error("notebook not found")]
    NotebookNotFound,

    #[error("invalid notebook path: {0}")]
    InvalidNotebookPath(String),

    #[error("unknown bundle type")]
    UnknownBundleType,

    #[error("invalid bundle id: {0}")]
    InvalidBundleId(String),

    #[error("could not create bundle directory {path}")]
    DirectoryExhausted { path: std::path::PathBuf },

    #[error("Filesystem error at {path}: {source}")]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Renderer failed: {0}")]
    Render(String),

    #[error("Failed to read notebook {path}: {message}")]
    NotebookParse {
        path: std::path::PathBuf,
        message: String,
    },

    #[error("Git error: {0}")]
    Git(#[from] git2::Error),

    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error(transparent)]
    Process(#[from] ProcessError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl BundleError {
    pub fn io(path: impl Into<std::path::PathBuf>, source: std::io::Error) -> Self {
        BundleError::Io {
            path: path.into(),
            source,
        }
    }

    /// HTTP status this error surfaces as.
    pub fn status(&self) -> StatusCode {
        match self {
            BundleError::NotebookNotFound
            | BundleError::InvalidNotebookPath(_)
            | BundleError::UnknownBundleType
            | BundleError::InvalidBundleId(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Errors from the git smart-HTTP gateway.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("invalid bundle id: {0}")]
    InvalidBundleId(String),

    #[error("bundle {0} not found")]
    BundleNotFound(String),

    #[error("invalid repository path: {0}")]
    InvalidPath(String),

    #[error("malformed gzip request body: {0}")]
    MalformedGzip(#[source] std::io::Error),

    #[error("request body inflates past {limit} bytes")]
    BodyTooLarge { limit: usize },

    #[error("git backend returned malformed CGI output: {0}")]
    Protocol(String),

    #[error(transparent)]
    Process(#[from] ProcessError),
}

impl GatewayError {
    /// HTTP status this error surfaces as.
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::InvalidBundleId(_)
            | GatewayError::InvalidPath(_)
            | GatewayError::MalformedGzip(_) => StatusCode::BAD_REQUEST,
            GatewayError::BundleNotFound(_) => StatusCode::NOT_FOUND,
            GatewayError::BodyTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            GatewayError::Protocol(_) => StatusCode::BAD_GATEWAY,
            GatewayError::Process(ProcessError::TimedOut { .. }) => StatusCode::GATEWAY_TIMEOUT,
            GatewayError::Process(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn process_error_spawn_is_matchable() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        let err = ProcessError::Spawn {
            program: "/usr/lib/git-core/git-http-backend".into(),
            source: io_err,
        };
        match &err {
            ProcessError::Spawn { source, .. } => {
                assert_eq!(source.kind(), std::io::ErrorKind::NotFound);
            }
            _ => panic!("Expected Spawn variant"),
        }
        assert!(err.to_string().contains("git-http-backend"));
    }

    #[test]
    fn bundle_client_errors_map_to_400() {
        assert_eq!(BundleError::NotebookNotFound.status(), StatusCode::BAD_REQUEST);
        assert_eq!(BundleError::UnknownBundleType.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            BundleError::InvalidNotebookPath("../x".into()).status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn bundle_directory_exhausted_is_internal() {
        let err = BundleError::DirectoryExhausted {
            path: "/tmp/bundle/x".into(),
        };
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(err.to_string().contains("could not create bundle directory"));
    }

    #[test]
    fn gateway_timeout_maps_to_504() {
        let err = GatewayError::Process(ProcessError::TimedOut {
            program: "git-http-backend".into(),
            secs: 1,
        });
        assert_eq!(err.status(), StatusCode::GATEWAY_TIMEOUT);
    }

    #[test]
    fn gateway_protocol_error_is_distinct() {
        let err = GatewayError::Protocol("no header terminator".into());
        assert_eq!(err.status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn all_error_types_implement_std_error_trait() {
        fn assert_std_error<E: std::error::Error>(_: &E) {}
        assert_std_error(&ProcessError::TimedOut {
            program: "x".into(),
            secs: 1,
        });
        assert_std_error(&BundleError::UnknownBundleType);
        assert_std_error(&GatewayError::BundleNotFound("abc".into()));
    }
}
