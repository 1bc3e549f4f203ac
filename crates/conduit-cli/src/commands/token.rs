use chrono::Utc;
use clap::Parser;
use comfy_table::{ContentArrangement, Table, presets::UTF8_FULL_CONDENSED};
use conduit::auth::TokenManager;

use crate::error::CliResult;
use crate::output::{OutputFormat, format_remaining, format_timestamp};

/// Acquire a bearer token and report its state. The token value itself is
/// never printed.
#[derive(Parser)]
pub struct TokenCommand {
    #[clap(long, help = "Force a refresh even if the cached token is fresh")]
    pub refresh: bool,
}

impl TokenCommand {
    pub async fn execute(&self, tokens: &TokenManager, format: OutputFormat) -> CliResult<()> {
        let token = if self.refresh {
            tokens.refresh().await?
        } else {
            tokens.get_token().await?
        };

        let now = Utc::now();
        let state = tokens.state();
        let remaining = token.remaining_at(now);
        let credentials = tokens.credentials();

        match format {
            OutputFormat::Json => {
                let output = serde_json::json!({
                    "token_status": state.as_str(),
                    "expires_at": token.expires_at().to_rfc3339(),
                    "remaining_secs": remaining.num_seconds(),
                    "upstream": credentials.base_url(),
                    "api_key": credentials.masked_key(),
                });
                println!("{}", serde_json::to_string_pretty(&output)?);
            }
            OutputFormat::Table => {
                let mut table = Table::new();
                table
                    .load_preset(UTF8_FULL_CONDENSED)
                    .set_content_arrangement(ContentArrangement::Dynamic)
                    .set_header(["Field", "Value"]);

                table.add_row(["Status", state.as_str()]);
                table.add_row(["Expires", &format_timestamp(&token.expires_at())]);
                table.add_row(["Remaining", &format_remaining(remaining)]);
                table.add_row(["Upstream", credentials.base_url()]);
                table.add_row(["API key", &credentials.masked_key()]);

                println!("{table}");
            }
        }

        Ok(())
    }
}
