mod error;
mod payload;
mod routes;

pub use error::ApiError;
pub use payload::{HistoryMessage, HistoryPart, StreamRequest, flatten_history};
pub use routes::{AppState, RelayServer, create_router};
