//! Token manager shared by every relay task.
//!
//! Responsibilities:
//! - Hand out a bearer token with at least two minutes left.
//! - Refresh through the upstream auth endpoint when the held token is stale.
//! - Collapse concurrent staleness into a single in-flight refresh.
//!
//! Reads go through an [`ArcSwapOption`] and never lock. Only the refresh
//! path takes `refresh_gate`, which also holds the last exchange outcome.

use arc_swap::ArcSwapOption;
use chrono::Utc;
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use super::{AuthError, Token, TokenState};
use crate::config::{AuthConfig, Credentials};
use crate::error::{ConduitError, Result};

/// Credential-exchange endpoint, relative to the upstream base URL
pub const AUTH_TOKEN_PATH: &str = "/api/v1/auth/token";

/// Body returned by the auth endpoint
#[derive(Debug, Deserialize)]
struct TokenGrant {
    access_token: String,
    expires_in: i64,
}

/// Outcome of the latest credential exchange. `generation` counts
/// exchanges and is mirrored in `TokenManager::generation` for lock-free reads.
#[derive(Default)]
struct RefreshOutcome {
    generation: u64,
    result: Option<std::result::Result<Arc<Token>, AuthError>>,
}

pub struct TokenManager {
    credentials: Arc<Credentials>,
    auth: AuthConfig,
    client: Client,
    current: ArcSwapOption<Token>,
    generation: AtomicU64,
    refresh_gate: Mutex<RefreshOutcome>,
}

impl TokenManager {
    /// Create a manager with no token yet; the first `get_token` fetches one.
    pub fn new(credentials: Arc<Credentials>, auth: AuthConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(auth.timeout_secs))
            .build()
            .map_err(|e| ConduitError::Client(format!("Failed to create auth client: {e}")))?;

        debug!(
            "TokenManager initialized with API key {} and base URL {}",
            credentials.masked_key(),
            credentials.base_url()
        );

        Ok(Self {
            credentials,
            auth,
            client,
            current: ArcSwapOption::empty(),
            generation: AtomicU64::new(0),
            refresh_gate: Mutex::new(RefreshOutcome::default()),
        })
    }

    pub fn credentials(&self) -> &Arc<Credentials> {
        &self.credentials
    }

    /// Return a token with at least two minutes of validity, refreshing first
    /// if there is none or the held one is stale.
    ///
    /// Callers that queue behind an in-flight refresh receive its outcome,
    /// success or failure, instead of starting another exchange.
    pub async fn get_token(&self) -> std::result::Result<Arc<Token>, AuthError> {
        let seen = self.generation.load(Ordering::Acquire);
        if let Some(token) = self.current.load_full() {
            if token.is_fresh() {
                return Ok(token);
            }
        }

        let mut outcome = self.refresh_gate.lock().await;

        // An exchange finished while we waited for the gate.
        if outcome.generation != seen {
            if let Some(result) = &outcome.result {
                debug!("Joined concurrent token refresh");
                return result.clone();
            }
        }

        self.refresh_locked(&mut outcome).await
    }

    /// Force a credential exchange and replace the stored token.
    ///
    /// On failure the stored token is left untouched.
    pub async fn refresh(&self) -> std::result::Result<Arc<Token>, AuthError> {
        let mut outcome = self.refresh_gate.lock().await;
        self.refresh_locked(&mut outcome).await
    }

    /// The stored token, without refreshing
    pub fn cached(&self) -> Option<Arc<Token>> {
        self.current.load_full()
    }

    pub fn state(&self) -> TokenState {
        TokenState::of(self.current.load().as_deref(), Utc::now())
    }

    async fn refresh_locked(
        &self,
        outcome: &mut RefreshOutcome,
    ) -> std::result::Result<Arc<Token>, AuthError> {
        let result = match self.exchange().await {
            Ok(token) => {
                info!(
                    "Successfully refreshed auth token. Expires at {}",
                    token.expires_at()
                );
                let token = Arc::new(token);
                self.current.store(Some(Arc::clone(&token)));
                Ok(token)
            }
            Err(e) => {
                error!("Error refreshing auth token: {e}");
                Err(e)
            }
        };

        // Publish after the token store so a caller that sees the new
        // generation also sees the new token.
        outcome.generation += 1;
        outcome.result = Some(result.clone());
        self.generation.store(outcome.generation, Ordering::Release);

        result
    }

    async fn exchange(&self) -> std::result::Result<Token, AuthError> {
        let url = self.credentials.endpoint(AUTH_TOKEN_PATH);
        debug!("Requesting new auth token from {url}");

        let response = self
            .client
            .post(&url)
            .header("X-API-Key", self.credentials.api_key())
            .form(&[
                ("username", self.auth.username.as_str()),
                ("password", self.auth.password.as_str()),
                ("scope", self.auth.scope.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|e| format!("<unreadable body: {e}>"));
            return Err(AuthError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let grant: TokenGrant = response
            .json()
            .await
            .map_err(|e| AuthError::InvalidResponse(e.to_string()))?;

        Token::from_grant(grant.access_token, grant.expires_in, Utc::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn manager() -> TokenManager {
        let creds = Credentials::new("dvt_test", "http://127.0.0.1:1").unwrap();
        TokenManager::new(Arc::new(creds), AuthConfig::default()).unwrap()
    }

    #[test]
    fn test_new_manager_is_uninitialized() {
        let m = manager();
        assert!(m.cached().is_none());
        assert_eq!(m.state(), TokenState::Uninitialized);
    }

    #[tokio::test]
    async fn test_fresh_cached_token_skips_network() {
        let m = manager();
        let token = Arc::new(Token::new("cached", Utc::now() + ChronoDuration::hours(1)));
        m.current.store(Some(Arc::clone(&token)));

        // The base URL points at a closed port, so any refresh would fail.
        let got = m.get_token().await.unwrap();
        assert!(Arc::ptr_eq(&got, &token));
        assert_eq!(m.state(), TokenState::Valid);
    }

    #[tokio::test]
    async fn test_transport_failure_keeps_previous_token() {
        let m = manager();
        let stale = Arc::new(Token::new("old", Utc::now() + ChronoDuration::seconds(5)));
        m.current.store(Some(Arc::clone(&stale)));

        let err = m.get_token().await.unwrap_err();
        assert!(matches!(err, AuthError::Transport(_)));

        let kept = m.cached().unwrap();
        assert!(Arc::ptr_eq(&kept, &stale));
        assert_eq!(m.state(), TokenState::Stale);
    }

    #[tokio::test]
    async fn test_sequential_failures_each_count_as_an_exchange() {
        let m = manager();

        // Nothing was in flight for either call, so each one exchanges.
        assert!(m.get_token().await.is_err());
        assert!(m.get_token().await.is_err());
        assert_eq!(m.generation.load(Ordering::Acquire), 2);

        let outcome = m.refresh_gate.lock().await;
        assert_eq!(outcome.generation, 2);
        assert!(matches!(outcome.result, Some(Err(AuthError::Transport(_)))));
    }
}
