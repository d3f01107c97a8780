use thiserror::Error;

/// The directory's error taxonomy. Every component-level error eventually
/// narrows to one of these variants; the gateway maps them 1:1 onto gRPC
/// status codes.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("deadline exceeded: {0}")]
    DeadlineExceeded(String),

    #[error("unavailable: {0}")]
    Unavailable(String),

    #[error("failed precondition: {0}")]
    FailedPrecondition(String),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Self {
        Error::Internal(value.into())
    }
}

impl Error {
    /// True if a worker should retry the operation that produced this error.
    /// Per spec.md §7, only `UNAVAILABLE` is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Unavailable(_))
    }

    /// The machine-readable component tag surfaced in gRPC error details.
    pub fn component(&self, component: &str) -> ErrorWithComponent<'_> {
        ErrorWithComponent {
            error: self,
            component,
        }
    }
}

/// Pairs an [Error] with the component tag described in spec.md §7, so that
/// callers at the gateway boundary can attach it to `tonic::Status` details
/// without every internal crate needing to know about gRPC.
pub struct ErrorWithComponent<'a> {
    pub error: &'a Error,
    pub component: &'a str,
}
