//! Test utilities for conduit - shared fixtures
//!
//! Builds managers and relays pointed at a mock upstream so integration
//! tests don't repeat the wiring.

use std::sync::Arc;
use std::time::Duration;

use crate::auth::TokenManager;
use crate::config::{AuthConfig, Credentials, RelayConfig};
use crate::relay::StreamRelay;
use crate::server::AppState;

/// API key used by every fixture
pub const TEST_API_KEY: &str = "dvt_test_key_0123456789";

/// Credentials for a mock upstream at `base_url`
pub fn credentials_for(base_url: &str) -> Arc<Credentials> {
    Arc::new(Credentials::new(TEST_API_KEY, base_url).expect("mock upstream URL must be valid"))
}

/// Auth settings with a short exchange timeout
pub fn test_auth_config() -> AuthConfig {
    AuthConfig {
        timeout_secs: 5,
        ..AuthConfig::default()
    }
}

pub fn token_manager_for(base_url: &str) -> Arc<TokenManager> {
    Arc::new(
        TokenManager::new(credentials_for(base_url), test_auth_config())
            .expect("auth client must build"),
    )
}

pub fn relay_for(base_url: &str) -> Arc<StreamRelay> {
    Arc::new(StreamRelay::new(
        token_manager_for(base_url),
        Duration::from_secs(5),
    ))
}

/// Router state around a relay for `base_url`
pub fn app_state_for(base_url: &str) -> Arc<AppState> {
    Arc::new(AppState {
        relay: relay_for(base_url),
        relay_config: RelayConfig::default(),
    })
}

/// JSON body the auth endpoint returns on success
pub fn token_grant(access_token: &str, expires_in: i64) -> serde_json::Value {
    serde_json::json!({
        "access_token": access_token,
        "expires_in": expires_in,
        "token_type": "bearer",
    })
}
