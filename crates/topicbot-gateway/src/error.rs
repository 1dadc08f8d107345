use thiserror::Error;

pub const BACKEND_UNREACHABLE_MESSAGE: &str =
    "❌ Cannot reach the backend service. Check that it is running and the URL is correct.";
pub const BACKEND_TIMEOUT_MESSAGE: &str =
    "⏱️ The backend service timed out. Please try again later.";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
/// Failure of a backend call after retries are exhausted.
///
/// `Unreachable` and `TimedOut` render as fixed user-facing text; the other
/// variants name the operation that failed.
pub enum GatewayError {
    #[error("{}", BACKEND_UNREACHABLE_MESSAGE)]
    Unreachable { operation: String },
    #[error("{}", BACKEND_TIMEOUT_MESSAGE)]
    TimedOut { operation: String },
    #[error("backend {operation} failed with status {status}: {body}")]
    Status {
        operation: String,
        status: u16,
        body: String,
    },
    #[error("backend {operation} failed: {message}")]
    Operation { operation: String, message: String },
    #[error("could not interpret backend response for {operation}: {message}")]
    Malformed { operation: String, message: String },
}

impl GatewayError {
    pub fn operation(&self) -> &str {
        match self {
            Self::Unreachable { operation }
            | Self::TimedOut { operation }
            | Self::Status { operation, .. }
            | Self::Operation { operation, .. }
            | Self::Malformed { operation, .. } => operation,
        }
    }

    /// True for connectivity failures and timeouts.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unreachable { .. } | Self::TimedOut { .. })
    }
}
