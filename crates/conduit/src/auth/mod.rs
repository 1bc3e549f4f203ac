//! Upstream bearer-token lifecycle.

mod error;
mod manager;
mod token;

pub use error::AuthError;
pub use manager::{AUTH_TOKEN_PATH, TokenManager};
pub use token::{FRESHNESS_FLOOR_SECS, SAFETY_MARGIN_SECS, Token, TokenState};
