//! Bearer token value and freshness rules.

use chrono::{DateTime, Duration, Utc};
use std::fmt;

use super::AuthError;

/// Seconds subtracted from the upstream-declared lifetime when a token is stored.
pub const SAFETY_MARGIN_SECS: i64 = 120;

/// Minimum remaining validity (against the stored expiry) for a cached token
/// to be handed out without refreshing first.
pub const FRESHNESS_FLOOR_SECS: i64 = 120;

/// A bearer token and the instant it should be considered expired.
///
/// The stored expiry already has [`SAFETY_MARGIN_SECS`] taken off, so it is
/// never recomputed on read. Tokens are replaced wholesale on refresh.
#[derive(Clone, PartialEq, Eq)]
pub struct Token {
    value: String,
    expires_at: DateTime<Utc>,
}

impl Token {
    pub fn new(value: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            value: value.into(),
            expires_at,
        }
    }

    /// Build a token from an auth grant issued at `issued_at`.
    ///
    /// `expires_at = issued_at + expires_in - 120s`. Lifetimes shorter than the
    /// margin yield a token that is already stale.
    pub fn from_grant(
        value: impl Into<String>,
        expires_in: i64,
        issued_at: DateTime<Utc>,
    ) -> Result<Self, AuthError> {
        let lifetime = expires_in
            .checked_sub(SAFETY_MARGIN_SECS)
            .and_then(Duration::try_seconds)
            .ok_or_else(|| {
                AuthError::InvalidResponse(format!("expires_in out of range: {expires_in}"))
            })?;
        let expires_at = issued_at.checked_add_signed(lifetime).ok_or_else(|| {
            AuthError::InvalidResponse(format!("expires_in out of range: {expires_in}"))
        })?;

        Ok(Self::new(value, expires_at))
    }

    /// The raw bearer string. Keep it out of logs.
    pub fn secret(&self) -> &str {
        &self.value
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn remaining_at(&self, now: DateTime<Utc>) -> Duration {
        self.expires_at - now
    }

    pub fn is_fresh_at(&self, now: DateTime<Utc>) -> bool {
        self.remaining_at(now) >= Duration::seconds(FRESHNESS_FLOOR_SECS)
    }

    pub fn is_fresh(&self) -> bool {
        self.is_fresh_at(Utc::now())
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("value", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Lifecycle state of the managed token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenState {
    /// No token has been fetched yet.
    Uninitialized,
    /// Token has at least the freshness floor left.
    Valid,
    /// Token exists but will be refreshed on the next request.
    Stale,
}

impl TokenState {
    pub fn of(token: Option<&Token>, now: DateTime<Utc>) -> Self {
        match token {
            None => TokenState::Uninitialized,
            Some(t) if t.is_fresh_at(now) => TokenState::Valid,
            Some(_) => TokenState::Stale,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TokenState::Uninitialized => "uninitialized",
            TokenState::Valid => "valid",
            TokenState::Stale => "stale",
        }
    }
}

impl fmt::Display for TokenState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
