//! Text-generation oracle.
//!
//! Claim text is produced by an external language model behind [`TextOracle`]. Providers are
//! tried in order by [`FallbackOracle`]; callers only ever see the single trait.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::{CoreConfig, ProviderConfig};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OracleError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("cannot connect to {0}")]
    Connection(String),
    #[error("http client error: {0}")]
    Http(String),
    #[error("provider returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("could not parse provider response: {0}")]
    Parse(String),
    #[error("provider returned no text")]
    EmptyResponse,
    #[error("no text providers configured")]
    NoProviders,
    #[error("scripted oracle has no responses left")]
    Exhausted,
}

pub trait TextOracle: Send + Sync {
    /// Generate text for `prompt`, giving up after `timeout` when one is supplied.
    fn generate_text(&self, prompt: &str, timeout: Option<Duration>)
        -> Result<String, OracleError>;

    /// Name used in logs.
    fn name(&self) -> &str;
}

/// Client for providers exposing an OpenAI-compatible `/chat/completions` endpoint.
pub struct OpenAiCompatibleOracle {
    name: String,
    base_url: String,
    model: String,
    api_key: Option<String>,
    client: reqwest::blocking::Client,
    default_timeout: Duration,
}

impl OpenAiCompatibleOracle {
    pub fn new(
        name: impl Into<String>,
        base_url: &str,
        model: impl Into<String>,
        api_key: Option<String>,
        default_timeout: Duration,
    ) -> Result<Self, OracleError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(default_timeout)
            .build()
            .map_err(|e| OracleError::Http(e.to_string()))?;
        Ok(Self {
            name: name.into(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.into(),
            api_key,
            client,
            default_timeout,
        })
    }

    /// Build a client from a configured provider, reading its API key from the environment.
    pub fn from_provider(
        provider: &ProviderConfig,
        default_timeout: Duration,
    ) -> Result<Self, OracleError> {
        let api_key = if provider.api_key_env.is_empty() {
            None
        } else {
            std::env::var(&provider.api_key_env).ok()
        };
        if api_key.is_none() && !provider.api_key_env.is_empty() {
            tracing::warn!(
                "provider {} has no API key in {}",
                provider.name,
                provider.api_key_env
            );
        }
        Self::new(
            provider.name.clone(),
            &provider.base_url,
            provider.model.clone(),
            api_key,
            default_timeout,
        )
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

impl TextOracle for OpenAiCompatibleOracle {
    fn generate_text(
        &self,
        prompt: &str,
        timeout: Option<Duration>,
    ) -> Result<String, OracleError> {
        let url = format!("{}/chat/completions", self.base_url);
        let timeout = timeout.unwrap_or(self.default_timeout);
        let body = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: 0.2,
        };

        let mut request = self.client.post(&url).timeout(timeout).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().map_err(|e| {
            if e.is_timeout() {
                OracleError::Timeout(timeout)
            } else if e.is_connect() {
                OracleError::Connection(self.base_url.clone())
            } else {
                OracleError::Http(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(OracleError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatResponse = response
            .json()
            .map_err(|e| OracleError::Parse(e.to_string()))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty())
            .ok_or(OracleError::EmptyResponse)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Tries each provider in order and returns the first success.
pub struct FallbackOracle {
    providers: Vec<Box<dyn TextOracle>>,
}

impl FallbackOracle {
    pub fn new(providers: Vec<Box<dyn TextOracle>>) -> Self {
        Self { providers }
    }

    /// Build the chain from the configured provider list.
    ///
    /// # Errors
    ///
    /// Returns an [`OracleError`] if an HTTP client cannot be built.
    pub fn from_config(cfg: &CoreConfig) -> Result<Self, OracleError> {
        let providers = cfg
            .providers()
            .iter()
            .map(|p| {
                OpenAiCompatibleOracle::from_provider(p, cfg.oracle_timeout())
                    .map(|o| Box::new(o) as Box<dyn TextOracle>)
            })
            .collect::<Result<Vec<_>, _>>()?;
        if providers.is_empty() {
            tracing::warn!("no text providers configured; claim generation will fail");
        }
        Ok(Self::new(providers))
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

impl TextOracle for FallbackOracle {
    fn generate_text(
        &self,
        prompt: &str,
        timeout: Option<Duration>,
    ) -> Result<String, OracleError> {
        let mut last_error = OracleError::NoProviders;
        for provider in &self.providers {
            match provider.generate_text(prompt, timeout) {
                Ok(text) => return Ok(text),
                Err(e) => {
                    tracing::warn!("text provider {} failed: {}", provider.name(), e);
                    last_error = e;
                }
            }
        }
        Err(last_error)
    }

    fn name(&self) -> &str {
        "fallback"
    }
}

/// Deterministic oracle returning queued results in order.
#[derive(Default)]
pub struct ScriptedOracle {
    name: String,
    responses: Mutex<VecDeque<Result<String, OracleError>>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedOracle {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn reply(self, text: impl Into<String>) -> Self {
        self.push(Ok(text.into()));
        self
    }

    pub fn fail(self, error: OracleError) -> Self {
        self.push(Err(error));
        self
    }

    pub fn push(&self, result: Result<String, OracleError>) {
        if let Ok(mut responses) = self.responses.lock() {
            responses.push_back(result);
        }
    }

    /// Prompts received so far, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

impl TextOracle for ScriptedOracle {
    fn generate_text(
        &self,
        prompt: &str,
        _timeout: Option<Duration>,
    ) -> Result<String, OracleError> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }
        self.responses
            .lock()
            .ok()
            .and_then(|mut r| r.pop_front())
            .unwrap_or(Err(OracleError::Exhausted))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_uses_first_success() {
        let chain = FallbackOracle::new(vec![
            Box::new(ScriptedOracle::new("a").fail(OracleError::Timeout(Duration::from_secs(1)))),
            Box::new(ScriptedOracle::new("b").reply("texto")),
        ]);
        assert_eq!(chain.generate_text("p", None).unwrap(), "texto");
    }

    #[test]
    fn fallback_returns_last_error() {
        let chain = FallbackOracle::new(vec![
            Box::new(ScriptedOracle::new("a").fail(OracleError::EmptyResponse)),
            Box::new(ScriptedOracle::new("b").fail(OracleError::Status {
                status: 503,
                body: "busy".into(),
            })),
        ]);
        assert!(matches!(
            chain.generate_text("p", None),
            Err(OracleError::Status { status: 503, .. })
        ));
    }

    #[test]
    fn empty_chain_reports_no_providers() {
        let chain = FallbackOracle::new(Vec::new());
        assert!(chain.is_empty());
        assert_eq!(chain.generate_text("p", None), Err(OracleError::NoProviders));
    }

    #[test]
    fn scripted_records_prompts_and_runs_out() {
        let oracle = ScriptedOracle::new("s").reply("uno");
        assert_eq!(oracle.generate_text("hola", None).unwrap(), "uno");
        assert_eq!(oracle.generate_text("otra", None), Err(OracleError::Exhausted));
        assert_eq!(oracle.prompts(), vec!["hola".to_string(), "otra".to_string()]);
    }

    #[test]
    fn unreachable_provider_is_a_connection_or_timeout_error() {
        let oracle = OpenAiCompatibleOracle::new(
            "local",
            "http://127.0.0.1:9/v1/",
            "test-model",
            None,
            Duration::from_secs(2),
        )
        .unwrap();
        let err = oracle.generate_text("hola", None).unwrap_err();
        assert!(matches!(
            err,
            OracleError::Connection(_) | OracleError::Timeout(_) | OracleError::Http(_)
        ));
    }
}
