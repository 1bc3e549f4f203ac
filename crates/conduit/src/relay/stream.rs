//! Unbuffered upstream streaming
//!
//! Every relay call gets its own HTTP client with pooling disabled, so no
//! connection (and none of its buffered bytes) is ever shared between two
//! requests. Bytes are forwarded per transport read with no line or event
//! framing in between.

use bytes::Bytes;
use futures::stream::{Stream, StreamExt};
use reqwest::Client;
use reqwest::header::{ACCEPT, ACCEPT_ENCODING, CACHE_CONTROL, CONNECTION};
use serde_json::Value;
use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::{RelayFailure, RelayFrame};
use crate::auth::{AuthError, TokenManager};

/// Streaming endpoint, relative to the upstream base URL
pub const STREAM_PATH: &str = "/api/v1/stream";

/// Lazy, finite, non-restartable sequence of relay frames
pub type RelayStream = Pin<Box<dyn Stream<Item = RelayFrame> + Send>>;

pub struct StreamRelay {
    tokens: Arc<TokenManager>,
    connect_timeout: Duration,
}

impl StreamRelay {
    pub fn new(tokens: Arc<TokenManager>, connect_timeout: Duration) -> Self {
        Self {
            tokens,
            connect_timeout,
        }
    }

    pub fn tokens(&self) -> &Arc<TokenManager> {
        &self.tokens
    }

    /// Start one upstream streaming call for `payload`.
    ///
    /// The token is acquired before this returns, so an auth failure never
    /// produces a partial stream. Everything after that (connect, status
    /// check, body reads) happens as the returned stream is polled, and
    /// dropping the stream closes the upstream connection.
    pub async fn relay(&self, payload: Value) -> Result<RelayStream, AuthError> {
        let token = self.tokens.get_token().await?;
        let credentials = Arc::clone(self.tokens.credentials());
        let connect_timeout = self.connect_timeout;
        let relay_id = Uuid::new_v4();

        let stream = async_stream::stream! {
            let mut guard = RelayGuard::new(relay_id);

            let client = match dedicated_client(connect_timeout) {
                Ok(client) => client,
                Err(e) => {
                    error!(%relay_id, "Failed to create upstream client: {e}");
                    yield RelayFrame::Failed(RelayFailure::Transport(e.to_string()));
                    guard.finish();
                    return;
                }
            };

            let url = credentials.endpoint(STREAM_PATH);
            debug!(%relay_id, "Making unbuffered API request to {url}");

            let sent = client
                .post(&url)
                .bearer_auth(token.secret())
                .header("X-API-Key", credentials.api_key())
                .header(ACCEPT, "text/event-stream")
                .header(CACHE_CONTROL, "no-cache")
                .header(CONNECTION, "close")
                .header(ACCEPT_ENCODING, "identity")
                .json(&payload)
                .send()
                .await;

            let response = match sent {
                Ok(response) => response,
                Err(e) => {
                    error!(%relay_id, "Upstream request failed: {e}");
                    yield RelayFrame::Failed(RelayFailure::Transport(describe_send_error(&e)));
                    guard.finish();
                    return;
                }
            };

            let status = response.status();
            if !status.is_success() {
                let body = response
                    .text()
                    .await
                    .unwrap_or_else(|e| format!("<unreadable body: {e}>"));
                error!(%relay_id, "API error: {} - {}", status.as_u16(), body);
                yield RelayFrame::Failed(RelayFailure::Upstream {
                    status: status.as_u16(),
                    body,
                });
                guard.finish();
                return;
            }

            info!(%relay_id, "Beginning to read response bytes");
            let frames = forward_chunks(response.bytes_stream());
            futures::pin_mut!(frames);
            while let Some(frame) = frames.next().await {
                yield frame;
            }
            guard.finish();
        };

        Ok(Box::pin(stream))
    }
}

/// Turn raw transport reads into relay frames.
///
/// Empty reads are dropped; every other chunk is passed through untouched
/// and in order. A read error becomes one trailing failure frame.
pub fn forward_chunks<S, E>(upstream: S) -> impl Stream<Item = RelayFrame>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: fmt::Display,
{
    async_stream::stream! {
        futures::pin_mut!(upstream);
        let mut received = 0usize;

        while let Some(read) = upstream.next().await {
            received += 1;
            match read {
                Ok(chunk) if chunk.is_empty() => continue,
                Ok(chunk) => {
                    debug!("Received chunk #{received}: {} bytes", chunk.len());
                    yield RelayFrame::Data(chunk);
                }
                Err(e) => {
                    warn!("Upstream stream failed after {received} reads: {e}");
                    yield RelayFrame::Failed(RelayFailure::Transport(e.to_string()));
                    return;
                }
            }
        }

        debug!("Streaming complete. Received {received} chunks total.");
    }
}

/// Client used for exactly one relay call.
///
/// No idle connections are kept, so the socket closes when the response is
/// dropped. No request timeout is set, since the body may stream
/// for as long as upstream keeps it open.
fn dedicated_client(connect_timeout: Duration) -> reqwest::Result<Client> {
    Client::builder()
        .pool_max_idle_per_host(0)
        .http1_only()
        .connect_timeout(connect_timeout)
        .build()
}

fn describe_send_error(e: &reqwest::Error) -> String {
    if e.is_connect() {
        format!("Failed to connect to upstream: {e}")
    } else if e.is_timeout() {
        format!("Upstream request timed out: {e}")
    } else {
        format!("Upstream request failed: {e}")
    }
}

/// Logs relays that are dropped before reaching a terminal frame, which is
/// what a client disconnect looks like from here.
struct RelayGuard {
    relay_id: Uuid,
    finished: bool,
}

impl RelayGuard {
    fn new(relay_id: Uuid) -> Self {
        Self {
            relay_id,
            finished: false,
        }
    }

    fn finish(&mut self) {
        self.finished = true;
    }
}

impl Drop for RelayGuard {
    fn drop(&mut self) {
        if self.finished {
            debug!(relay_id = %self.relay_id, "Relay completed");
        } else {
            debug!(
                relay_id = %self.relay_id,
                "Relay dropped before completion - closing upstream connection"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    fn ok(chunk: &'static str) -> Result<Bytes, std::io::Error> {
        Ok(Bytes::from_static(chunk.as_bytes()))
    }

    #[tokio::test]
    async fn test_empty_chunks_are_suppressed() {
        let upstream = stream::iter(vec![ok("AB"), ok(""), ok("CD")]);

        let frames: Vec<RelayFrame> = forward_chunks(upstream).collect().await;

        assert_eq!(
            frames,
            vec![
                RelayFrame::Data(Bytes::from_static(b"AB")),
                RelayFrame::Data(Bytes::from_static(b"CD")),
            ]
        );
    }

    #[tokio::test]
    async fn test_chunks_are_not_reframed() {
        // Partial SSE lines and prefixes must pass through as-is
        let upstream = stream::iter(vec![ok("data: hel"), ok("lo\n\nda"), ok("ta: [DONE]\n\n")]);

        let frames: Vec<Bytes> = forward_chunks(upstream)
            .map(RelayFrame::into_bytes)
            .collect()
            .await;

        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0], Bytes::from_static(b"data: hel"));
        assert_eq!(frames[1], Bytes::from_static(b"lo\n\nda"));
        assert_eq!(frames[2], Bytes::from_static(b"ta: [DONE]\n\n"));
    }

    #[tokio::test]
    async fn test_read_error_ends_with_failure_frame() {
        let upstream = stream::iter(vec![
            ok("AB"),
            Err(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "connection reset",
            )),
            ok("never"),
        ]);

        let frames: Vec<RelayFrame> = forward_chunks(upstream).collect().await;

        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0], RelayFrame::Data(Bytes::from_static(b"AB")));
        assert_eq!(
            frames[1],
            RelayFrame::Failed(RelayFailure::Transport("connection reset".to_string()))
        );
    }

    #[tokio::test]
    async fn test_empty_upstream_ends_cleanly() {
        let upstream = stream::iter(Vec::<Result<Bytes, std::io::Error>>::new());
        let frames: Vec<RelayFrame> = forward_chunks(upstream).collect().await;
        assert!(frames.is_empty());
    }

    #[test]
    fn test_dedicated_client_builds() {
        assert!(dedicated_client(Duration::from_secs(1)).is_ok());
    }
}
