//! Credential resolution and user-agent composition.

use crate::constants::ENV_VARIABLE;
use crate::error::{ExtractError, Result};

/// Resolve the API key to use: the explicit argument if non-empty, otherwise the
/// `ZYTE_AUTOEXTRACT_KEY` environment variable. Fails if neither yields a non-empty value.
pub fn get_api_key(explicit: Option<&str>) -> Result<String> {
    if let Some(key) = explicit {
        if !key.is_empty() {
            return Ok(key.to_string());
        }
    }
    match std::env::var(ENV_VARIABLE) {
        Ok(key) if !key.is_empty() => Ok(key),
        _ => Err(ExtractError::NoApiKey),
    }
}

/// Compose the `User-Agent` header: `zyte-autoextract/<lib-version> <transport>/<transport-version>`.
pub fn user_agent() -> String {
    format!(
        "zyte-autoextract/{} reqwest/{}",
        env!("CARGO_PKG_VERSION"),
        reqwest_version(),
    )
}

// reqwest doesn't expose its own version as a constant; this crate pins a single reqwest
// major.minor and reports it here rather than pulling in a build script for one string.
fn reqwest_version() -> &'static str {
    "0.12"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_key_wins() {
        assert_eq!(get_api_key(Some("abc")).unwrap(), "abc");
    }

    #[test]
    fn empty_explicit_falls_through_to_missing_env() {
        // SAFETY: test runs single-threaded w.r.t. this var via serial execution of this module;
        // we only assert the error kind, not depend on other tests' env state.
        std::env::remove_var(ENV_VARIABLE);
        let err = get_api_key(Some("")).unwrap_err();
        assert!(matches!(err, ExtractError::NoApiKey));
    }

    #[test]
    fn env_var_used_when_no_explicit_key() {
        std::env::set_var(ENV_VARIABLE, "env-key");
        assert_eq!(get_api_key(None).unwrap(), "env-key");
        std::env::remove_var(ENV_VARIABLE);
    }

    #[test]
    fn user_agent_has_expected_shape() {
        let ua = user_agent();
        assert!(ua.starts_with("zyte-autoextract/"));
        assert!(ua.contains("reqwest/"));
    }
}
