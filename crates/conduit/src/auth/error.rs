use thiserror::Error;

/// Failures while exchanging the API key for a bearer token
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// The auth endpoint answered with a non-success status
    #[error("Auth token refresh failed: {status} - {body}")]
    Rejected { status: u16, body: String },

    /// Connection, timeout or other transport failure
    #[error("Auth request failed: {0}")]
    Transport(String),

    /// The endpoint answered 2xx but the body was not a usable grant
    #[error("Invalid auth response: {0}")]
    InvalidResponse(String),
}

impl AuthError {
    /// HTTP status returned by the auth endpoint, if it answered at all
    pub fn status(&self) -> Option<u16> {
        match self {
            AuthError::Rejected { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for AuthError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            AuthError::Transport(format!("timed out: {e}"))
        } else if e.is_connect() {
            AuthError::Transport(format!("failed to connect: {e}"))
        } else if e.is_decode() {
            AuthError::InvalidResponse(e.to_string())
        } else {
            AuthError::Transport(e.to_string())
        }
    }
}
