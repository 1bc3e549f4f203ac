use clap::Parser;
use conduit::config::RelayConfig;
use conduit::relay::{RelayFailure, RelayFrame, StreamRelay};
use conduit::server::StreamRequest;
use futures::StreamExt;
use serde_json::{Map, Value};
use tokio::io::AsyncWriteExt;

use crate::error::{CliError, CliResult};
use crate::output::OutputFormat;

/// Send one message through the relay and write the response as it arrives
#[derive(Parser)]
pub struct StreamCommand {
    #[clap(help = "Message to send")]
    pub message: String,

    #[clap(long, short, help = "Model code (defaults to relay.default_model)")]
    pub model: Option<String>,

    #[clap(
        long = "param",
        short = 'p',
        value_parser = parse_param,
        help = "Extra top-level payload field as key=value (repeatable)"
    )]
    pub params: Vec<(String, Value)>,
}

impl StreamCommand {
    pub fn request(&self) -> StreamRequest {
        let mut request = StreamRequest::new(self.message.clone());
        request.model_code = self.model.clone();
        if !self.params.is_empty() {
            request.additional_params = Some(self.params.iter().cloned().collect::<Map<_, _>>());
        }
        request
    }

    pub async fn execute(
        &self,
        relay: &StreamRelay,
        relay_config: &RelayConfig,
        format: OutputFormat,
    ) -> CliResult<()> {
        let payload = self.request().into_payload(&relay_config.default_model)?;
        let mut frames = relay.relay(payload).await?;

        let mut stdout = tokio::io::stdout();
        let mut failure = None;

        while let Some(frame) = frames.next().await {
            match (format, frame) {
                (OutputFormat::Table, RelayFrame::Data(bytes)) => {
                    stdout.write_all(&bytes).await?;
                    stdout.flush().await?;
                }
                (OutputFormat::Json, RelayFrame::Data(bytes)) => {
                    let line = serde_json::json!({
                        "type": "data",
                        "bytes": bytes.len(),
                        "text": String::from_utf8_lossy(&bytes),
                    });
                    stdout.write_all(format!("{line}\n").as_bytes()).await?;
                    stdout.flush().await?;
                }
                (OutputFormat::Json, RelayFrame::Failed(f)) => {
                    let line = serde_json::json!({
                        "type": "error",
                        "message": f.to_string(),
                    });
                    stdout.write_all(format!("{line}\n").as_bytes()).await?;
                    stdout.flush().await?;
                    failure = Some(f);
                }
                (OutputFormat::Table, RelayFrame::Failed(f)) => failure = Some(f),
            }
        }

        match failure {
            Some(RelayFailure::Upstream { status, body }) => Err(CliError(format!(
                "upstream returned {status} - {body}"
            ))),
            Some(RelayFailure::Transport(msg)) => Err(CliError(format!("relay interrupted: {msg}"))),
            None => {
                if matches!(format, OutputFormat::Table) {
                    stdout.write_all(b"\n").await?;
                    stdout.flush().await?;
                }
                Ok(())
            }
        }
    }
}

/// Parse `key=value`. The value is taken as JSON when it parses, otherwise
/// as a plain string.
fn parse_param(raw: &str) -> Result<(String, Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{raw}'"))?;

    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty key in '{raw}'"));
    }

    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}
