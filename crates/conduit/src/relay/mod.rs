mod frame;
mod stream;

pub use frame::{RelayFailure, RelayFrame};
pub use stream::{RelayStream, STREAM_PATH, StreamRelay, forward_chunks};
