use std::fmt;

#[derive(Debug)]
pub struct CliError(pub String);

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for CliError {}

impl From<String> for CliError {
    fn from(s: String) -> Self {
        CliError(s)
    }
}

impl From<&str> for CliError {
    fn from(s: &str) -> Self {
        CliError(s.to_string())
    }
}

impl From<conduit::ConduitError> for CliError {
    fn from(e: conduit::ConduitError) -> Self {
        CliError(e.to_string())
    }
}

impl From<conduit::auth::AuthError> for CliError {
    fn from(e: conduit::auth::AuthError) -> Self {
        CliError(e.to_string())
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        CliError(format!("JSON error: {e}"))
    }
}

impl From<std::io::Error> for CliError {
    fn from(e: std::io::Error) -> Self {
        CliError(format!("IO error: {e}"))
    }
}

pub type CliResult<T> = Result<T, CliError>;

#[cfg(test)]
mod tests {
    use super::*;
    use conduit::auth::AuthError;

    #[test]
    fn test_library_errors_keep_their_message() {
        let auth = AuthError::Rejected {
            status: 401,
            body: "bad key".to_string(),
        };
        assert_eq!(
            CliError::from(auth).to_string(),
            "Auth token refresh failed: 401 - bad key"
        );

        let config = conduit::ConduitError::Config("missing key".to_string());
        assert!(CliError::from(config).to_string().contains("missing key"));
    }

    #[test]
    fn test_json_errors_are_prefixed() {
        let err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        assert!(CliError::from(err).to_string().starts_with("JSON error: "));
    }
}
