use bytes::Bytes;
use thiserror::Error;

/// Why a relay ended early.
///
/// `Display` renders the text chunk that HTTP callers receive in place of
/// more data.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RelayFailure {
    /// The stream endpoint answered with a non-success status
    #[error("Error: {status} - {body}")]
    Upstream { status: u16, body: String },

    /// Connect failure, or the connection dropped mid-stream
    #[error("Error: {0}")]
    Transport(String),
}

/// One item of a relay stream.
///
/// Data frames carry the upstream bytes exactly as one transport read
/// delivered them. A failure frame is always the last item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayFrame {
    Data(Bytes),
    Failed(RelayFailure),
}

impl RelayFrame {
    pub fn is_failure(&self) -> bool {
        matches!(self, RelayFrame::Failed(_))
    }

    /// Bytes to write to the caller's response body
    pub fn into_bytes(self) -> Bytes {
        match self {
            RelayFrame::Data(bytes) => bytes,
            RelayFrame::Failed(failure) => Bytes::from(failure.to_string()),
        }
    }
}
