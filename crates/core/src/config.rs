//! Core runtime configuration.
//!
//! Configuration is resolved once at process startup and then passed into core services as
//! `Arc<CoreConfig>`. Request handling never reads environment variables.

use crate::constants::{
    DEFAULT_CLAIMS_DATA_DIR, DEFAULT_IDEMPOTENCY_TTL_SECS, DEFAULT_ORACLE_TIMEOUT_SECS,
    DEFAULT_PROMPTS_FILE, PATIENTS_DIR_NAME,
};
use crate::{ClaimError, ClaimResult};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// One entry of the ordered text-generation provider chain.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProviderConfig {
    pub name: String,
    pub base_url: String,
    pub model: String,
    /// Name of the environment variable holding the provider's API key.
    pub api_key_env: String,
}

/// Core configuration resolved at startup.
#[derive(Clone, Debug)]
pub struct CoreConfig {
    claims_data_dir: PathBuf,
    prompts_file: PathBuf,
    idempotency_ttl: Duration,
    oracle_timeout: Duration,
    same_day_guard: bool,
    providers: Vec<ProviderConfig>,
}

impl CoreConfig {
    /// Create a new `CoreConfig`.
    ///
    /// # Errors
    ///
    /// Returns `ClaimError::InvalidInput` if either duration is zero.
    pub fn new(
        claims_data_dir: PathBuf,
        prompts_file: PathBuf,
        idempotency_ttl: Duration,
        oracle_timeout: Duration,
        same_day_guard: bool,
        providers: Vec<ProviderConfig>,
    ) -> ClaimResult<Self> {
        if idempotency_ttl.is_zero() {
            return Err(ClaimError::InvalidInput(
                "idempotency window cannot be zero".into(),
            ));
        }
        if oracle_timeout.is_zero() {
            return Err(ClaimError::InvalidInput(
                "oracle timeout cannot be zero".into(),
            ));
        }

        Ok(Self {
            claims_data_dir,
            prompts_file,
            idempotency_ttl,
            oracle_timeout,
            same_day_guard,
            providers,
        })
    }

    pub fn claims_data_dir(&self) -> &Path {
        &self.claims_data_dir
    }

    pub fn patients_dir(&self) -> PathBuf {
        self.claims_data_dir.join(PATIENTS_DIR_NAME)
    }

    pub fn prompts_file(&self) -> &Path {
        &self.prompts_file
    }

    pub fn idempotency_ttl(&self) -> Duration {
        self.idempotency_ttl
    }

    pub fn oracle_timeout(&self) -> Duration {
        self.oracle_timeout
    }

    pub fn same_day_guard(&self) -> bool {
        self.same_day_guard
    }

    pub fn providers(&self) -> &[ProviderConfig] {
        &self.providers
    }
}

impl CoreConfig {
    /// Resolve the configuration from process environment variables.
    ///
    /// Call once at startup; see [`CoreConfig::from_lookup`] for the variables read.
    pub fn from_env() -> ClaimResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Resolve the configuration from `lookup`, which maps a variable name to its value.
    ///
    /// Reads `CLAIMS_DATA_DIR`, `NME_PROMPTS_FILE`, `NME_IDEMPOTENCY_TTL_SECS`,
    /// `NME_ORACLE_TIMEOUT_SECS`, `NME_SAME_DAY_GUARD` and `NME_ORACLE_PROVIDERS`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> ClaimResult<Self> {
        let claims_data_dir = lookup("CLAIMS_DATA_DIR")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_CLAIMS_DATA_DIR.into());
        let prompts_file = lookup("NME_PROMPTS_FILE")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_PROMPTS_FILE.into());

        Self::new(
            PathBuf::from(claims_data_dir),
            PathBuf::from(prompts_file),
            secs_from_env_value(
                "NME_IDEMPOTENCY_TTL_SECS",
                lookup("NME_IDEMPOTENCY_TTL_SECS"),
                DEFAULT_IDEMPOTENCY_TTL_SECS,
            )?,
            secs_from_env_value(
                "NME_ORACLE_TIMEOUT_SECS",
                lookup("NME_ORACLE_TIMEOUT_SECS"),
                DEFAULT_ORACLE_TIMEOUT_SECS,
            )?,
            flag_from_env_value("NME_SAME_DAY_GUARD", lookup("NME_SAME_DAY_GUARD"), true)?,
            providers_from_env_value(lookup("NME_ORACLE_PROVIDERS"))?,
        )
    }
}

/// Parse a positive number of seconds from an optional string value.
///
/// If `value` is `None` or empty/whitespace, returns `default_secs`.
pub fn secs_from_env_value(
    name: &str,
    value: Option<String>,
    default_secs: u64,
) -> ClaimResult<Duration> {
    let value = value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty());
    let secs = match value {
        Some(v) => v
            .parse::<u64>()
            .map_err(|_| ClaimError::InvalidInput(format!("{name} must be a whole number of seconds")))?,
        None => default_secs,
    };
    Ok(Duration::from_secs(secs))
}

/// Parse an on/off flag. Missing or empty values give `default`.
pub fn flag_from_env_value(name: &str, value: Option<String>, default: bool) -> ClaimResult<bool> {
    let Some(value) = value.map(|v| v.trim().to_ascii_lowercase()) else {
        return Ok(default);
    };
    match value.as_str() {
        "" => Ok(default),
        "1" | "true" | "on" | "yes" => Ok(true),
        "0" | "false" | "off" | "no" => Ok(false),
        _ => Err(ClaimError::InvalidInput(format!(
            "{name} must be one of true/false/on/off/1/0"
        ))),
    }
}

/// Parse the ordered provider chain.
///
/// Format: comma separated entries of `name=base_url|model|api_key_env`, tried in the order
/// given. An empty value yields an empty chain.
pub fn providers_from_env_value(value: Option<String>) -> ClaimResult<Vec<ProviderConfig>> {
    let Some(value) = value else {
        return Ok(Vec::new());
    };

    let mut providers = Vec::new();
    for entry in value.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let (name, rest) = entry.split_once('=').ok_or_else(|| {
            ClaimError::InvalidInput(format!("provider entry '{entry}' is missing '='"))
        })?;
        let parts: Vec<&str> = rest.split('|').map(str::trim).collect();
        let [base_url, model, api_key_env] = parts.as_slice() else {
            return Err(ClaimError::InvalidInput(format!(
                "provider entry '{entry}' must be name=base_url|model|api_key_env"
            )));
        };
        if name.trim().is_empty() || base_url.is_empty() || model.is_empty() {
            return Err(ClaimError::InvalidInput(format!(
                "provider entry '{entry}' has empty parts"
            )));
        }
        providers.push(ProviderConfig {
            name: name.trim().to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key_env: api_key_env.to_string(),
        });
    }
    Ok(providers)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_zero_durations() {
        let err = CoreConfig::new(
            PathBuf::from("d"),
            PathBuf::from("p"),
            Duration::ZERO,
            Duration::from_secs(1),
            true,
            Vec::new(),
        )
        .unwrap_err();
        assert!(matches!(err, ClaimError::InvalidInput(_)));
    }

    #[test]
    fn secs_default_and_parse() {
        assert_eq!(
            secs_from_env_value("X", None, 60).unwrap(),
            Duration::from_secs(60)
        );
        assert_eq!(
            secs_from_env_value("X", Some(" 15 ".into()), 60).unwrap(),
            Duration::from_secs(15)
        );
        assert!(secs_from_env_value("X", Some("soon".into()), 60).is_err());
    }

    #[test]
    fn flag_values() {
        assert!(flag_from_env_value("G", None, true).unwrap());
        assert!(!flag_from_env_value("G", Some("off".into()), true).unwrap());
        assert!(flag_from_env_value("G", Some("maybe".into()), true).is_err());
    }

    #[test]
    fn provider_chain_keeps_order() {
        let providers = providers_from_env_value(Some(
            "openai=https://api.openai.com/v1/|gpt-4o|OPENAI_API_KEY, gemini=https://g.example/v1|gemini-pro|GEMINI_API_KEY".into(),
        ))
        .unwrap();
        assert_eq!(providers.len(), 2);
        assert_eq!(providers[0].name, "openai");
        assert_eq!(providers[0].base_url, "https://api.openai.com/v1");
        assert_eq!(providers[1].api_key_env, "GEMINI_API_KEY");
    }

    #[test]
    fn provider_entry_must_have_three_parts() {
        assert!(providers_from_env_value(Some("openai=https://x|gpt".into())).is_err());
        assert!(providers_from_env_value(Some("openai".into())).is_err());
    }

    #[test]
    fn lookup_defaults_and_overrides() {
        let cfg = CoreConfig::from_lookup(|_| None).unwrap();
        assert_eq!(cfg.claims_data_dir(), Path::new(DEFAULT_CLAIMS_DATA_DIR));
        assert_eq!(cfg.idempotency_ttl(), Duration::from_secs(60));
        assert!(cfg.same_day_guard());
        assert!(cfg.providers().is_empty());

        let cfg = CoreConfig::from_lookup(|name| match name {
            "CLAIMS_DATA_DIR" => Some("/srv/claims".into()),
            "NME_SAME_DAY_GUARD" => Some("off".into()),
            "NME_ORACLE_TIMEOUT_SECS" => Some("30".into()),
            _ => None,
        })
        .unwrap();
        assert_eq!(cfg.patients_dir(), PathBuf::from("/srv/claims/patients"));
        assert!(!cfg.same_day_guard());
        assert_eq!(cfg.oracle_timeout(), Duration::from_secs(30));

        assert!(CoreConfig::from_lookup(|name| {
            (name == "NME_IDEMPOTENCY_TTL_SECS").then(|| "0".to_string())
        })
        .is_err());
    }
}
