pub mod commands;
pub mod error;
pub mod output;

pub use commands::{StreamCommand, TokenCommand};
pub use error::{CliError, CliResult};
pub use output::{OutputFormat, format_remaining, format_timestamp};
