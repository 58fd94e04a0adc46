use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::config::Config;
use crate::errors::{GenError, Result};
use crate::wire::{ApiKey, Instruction};

pub mod anthropic;
pub mod mock;
pub mod openai;
pub mod retry;

/// One text-generation backend. Implementations turn a system/user pair into
/// the model's raw reply; they do not interpret it.
#[async_trait]
pub trait Provider: Send + Sync {
    async fn invoke(&self, ins: &Instruction, credential: Option<&ApiKey>) -> Result<String>;
}

pub type DynProvider = Box<dyn Provider + Send + Sync>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[serde(alias = "open-ai")]
    OpenAI,
    Anthropic,
    Mock,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::OpenAI => "openai",
            ProviderKind::Anthropic => "anthropic",
            ProviderKind::Mock => "mock",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = GenError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" | "open-ai" => Ok(ProviderKind::OpenAI),
            "anthropic" => Ok(ProviderKind::Anthropic),
            "mock" => Ok(ProviderKind::Mock),
            _ => Err(GenError::UnsupportedProvider(s.to_string())),
        }
    }
}

/// Build a fresh adapter for `kind`. Nothing is cached between requests.
pub fn make_provider(kind: ProviderKind, cfg: &Config) -> Result<DynProvider> {
    match kind {
        ProviderKind::OpenAI => Ok(Box::new(openai::OpenAIProvider::new(&cfg.openai, cfg.timeout_secs)?)),
        ProviderKind::Anthropic => Ok(Box::new(anthropic::Anthropic::new(&cfg.anthropic, cfg.timeout_secs)?)),
        ProviderKind::Mock => Ok(Box::new(mock::MockProvider)),
    }
}

pub(crate) fn http_client(timeout_secs: u64) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| GenError::permanent(format!("http client setup failed: {e}")))
}

pub(crate) fn require_credential<'a>(credential: Option<&'a ApiKey>, provider: &str) -> Result<&'a ApiKey> {
    match credential {
        Some(key) if !key.is_blank() => Ok(key),
        _ => Err(GenError::Authentication(format!("no API key configured for {provider}"))),
    }
}

/// Map a non-success HTTP status to the error taxonomy. The body is kept
/// short; it comes from the backend and never contains our key.
pub(crate) fn classify_status(provider: &str, status: StatusCode, body: &str) -> GenError {
    let snippet: String = body.chars().take(500).collect();
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            GenError::Authentication(format!("{provider} rejected the credential ({status})"))
        }
        StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS => {
            GenError::transient(format!("{provider} API error ({status}): {snippet}"))
        }
        s if s.is_server_error() => GenError::transient(format!("{provider} API error ({status}): {snippet}")),
        _ => GenError::permanent(format!("{provider} API error ({status}): {snippet}")),
    }
}

pub(crate) fn classify_transport(provider: &str, err: reqwest::Error) -> GenError {
    if err.is_builder() {
        GenError::permanent(format!("{provider} request could not be built: {err}"))
    } else {
        GenError::transient(format!("{provider} request failed: {err}"))
    }
}
