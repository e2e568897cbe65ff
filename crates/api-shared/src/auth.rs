use std::env;

/// Header carrying the API key on mutating routes.
pub const API_KEY_HEADER: &str = "x-api-key";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("API_KEY not set in environment")]
    NotConfigured,
    #[error("missing API key")]
    Missing,
    #[error("invalid API key")]
    Invalid,
}

/// Validates the provided API key against `API_KEY` from the environment.
pub fn validate_api_key(provided_key: Option<&str>) -> Result<(), AuthError> {
    let expected_key = env::var("API_KEY").map_err(|_| {
        tracing::error!("API_KEY not set; rejecting authenticated request");
        AuthError::NotConfigured
    })?;
    check_api_key(provided_key, &expected_key)
}

fn check_api_key(provided_key: Option<&str>, expected_key: &str) -> Result<(), AuthError> {
    match provided_key {
        None => Err(AuthError::Missing),
        Some(key) if key.is_empty() => Err(AuthError::Missing),
        Some(key) if key == expected_key => Ok(()),
        Some(_) => Err(AuthError::Invalid),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_expected_key() {
        assert_eq!(check_api_key(Some("k1"), "k1"), Ok(()));
        assert_eq!(check_api_key(Some("k2"), "k1"), Err(AuthError::Invalid));
        assert_eq!(check_api_key(Some(""), "k1"), Err(AuthError::Missing));
        assert_eq!(check_api_key(None, "k1"), Err(AuthError::Missing));
    }
}
