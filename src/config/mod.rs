use anyhow::{Context, Result};
use fs_err as fs;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::provider::retry::RetryPolicy;
use crate::provider::ProviderKind;
use crate::wire::ApiKey;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub bind: String,
    pub timeout_secs: u64,
    /// Ask the backend once more, in strict mode, when its reply has no usable file list.
    pub reprompt_on_malformed: bool,
    /// Where prompt/response transcripts go; `None` disables them.
    pub transcript_dir: Option<String>,
    pub retry: RetryPolicy,
    pub openai: OpenAiSettings,
    pub anthropic: AnthropicSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenAiSettings {
    pub api_base: String,
    pub model: String,
    #[serde(skip_serializing)]
    pub api_key: Option<ApiKey>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnthropicSettings {
    pub api_base: String,
    pub model: String,
    pub api_version: String,
    pub max_tokens: u32,
    #[serde(skip_serializing)]
    pub api_key: Option<ApiKey>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8000".into(),
            timeout_secs: 120,
            reprompt_on_malformed: true,
            transcript_dir: None,
            retry: RetryPolicy::default(),
            openai: OpenAiSettings::default(),
            anthropic: AnthropicSettings::default(),
        }
    }
}

impl Default for OpenAiSettings {
    fn default() -> Self {
        Self {
            api_base: "https://api.openai.com".into(),
            model: "gpt-4o".into(),
            api_key: None,
        }
    }
}

impl Default for AnthropicSettings {
    fn default() -> Self {
        Self {
            api_base: "https://api.anthropic.com".into(),
            model: "claude-3-5-sonnet-20241022".into(),
            api_version: "2023-06-01".into(),
            max_tokens: 8000,
            api_key: None,
        }
    }
}

impl Config {
    /// Defaults, then the optional TOML file, then process environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut cfg = match path {
            Some(p) => {
                let text = fs::read_to_string(p)?;
                Self::from_toml_str(&text).with_context(|| format!("parsing {}", p.display()))?
            }
            None => Self::default(),
        };
        cfg.apply_vars(|k| std::env::var(k).ok())?;
        Ok(cfg)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Overlay settings from a variable lookup (the environment in production).
    pub fn apply_vars(&mut self, get: impl Fn(&str) -> Option<String>) -> Result<()> {
        let get = |k: &str| get(k).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("OPENAI_API_KEY") { self.openai.api_key = Some(ApiKey::new(v)); }
        if let Some(v) = get("ANTHROPIC_API_KEY") { self.anthropic.api_key = Some(ApiKey::new(v)); }
        if let Some(v) = get("TESTGEN_BIND") { self.bind = v; }
        if let Some(v) = get("TESTGEN_OPENAI_MODEL") { self.openai.model = v; }
        if let Some(v) = get("TESTGEN_ANTHROPIC_MODEL") { self.anthropic.model = v; }
        if let Some(v) = get("TESTGEN_OPENAI_BASE") { self.openai.api_base = v; }
        if let Some(v) = get("TESTGEN_ANTHROPIC_BASE") { self.anthropic.api_base = v; }
        if let Some(v) = get("TESTGEN_TRANSCRIPT_DIR") { self.transcript_dir = Some(v); }
        if let Some(v) = get("TESTGEN_TIMEOUT_SECS") {
            self.timeout_secs = v
                .trim()
                .parse()
                .with_context(|| format!("TESTGEN_TIMEOUT_SECS must be a number of seconds, got {v:?}"))?;
        }
        Ok(())
    }

    /// Process-wide fallback credential for a provider.
    pub fn default_credential(&self, kind: ProviderKind) -> Option<&ApiKey> {
        match kind {
            ProviderKind::OpenAI => self.openai.api_key.as_ref(),
            ProviderKind::Anthropic => self.anthropic.api_key.as_ref(),
            ProviderKind::Mock => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn toml_overrides_only_what_it_names() {
        let cfg = Config::from_toml_str(
            r#"
            timeout_secs = 30
            [retry]
            max_retries = 4
            [anthropic]
            model = "claude-3-opus"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.timeout_secs, 30);
        assert_eq!(cfg.retry.max_retries, 4);
        assert_eq!(cfg.retry.base_delay_ms, RetryPolicy::default().base_delay_ms);
        assert_eq!(cfg.anthropic.model, "claude-3-opus");
        assert_eq!(cfg.anthropic.max_tokens, 8000);
        assert_eq!(cfg.openai.model, "gpt-4o");
    }

    #[test]
    fn env_supplies_credentials_and_overrides() {
        let vars: HashMap<&str, &str> = [
            ("OPENAI_API_KEY", "sk-openai"),
            ("ANTHROPIC_API_KEY", "   "),
            ("TESTGEN_BIND", "0.0.0.0:9000"),
            ("TESTGEN_TIMEOUT_SECS", "15"),
        ]
        .into_iter()
        .collect();
        let mut cfg = Config::default();
        cfg.apply_vars(|k| vars.get(k).map(|v| v.to_string())).unwrap();

        assert_eq!(cfg.default_credential(ProviderKind::OpenAI).map(|k| k.expose()), Some("sk-openai"));
        assert!(cfg.default_credential(ProviderKind::Anthropic).is_none());
        assert!(cfg.default_credential(ProviderKind::Mock).is_none());
        assert_eq!(cfg.bind, "0.0.0.0:9000");
        assert_eq!(cfg.timeout_secs, 15);
    }

    #[test]
    fn bad_timeout_is_an_error() {
        let mut cfg = Config::default();
        let err = cfg
            .apply_vars(|k| (k == "TESTGEN_TIMEOUT_SECS").then(|| "soon".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("TESTGEN_TIMEOUT_SECS"));
    }

    #[test]
    fn serialized_config_never_contains_keys() {
        let mut cfg = Config::default();
        cfg.openai.api_key = Some(ApiKey::new("sk-secret"));
        let text = toml::to_string(&cfg).unwrap();
        assert!(!text.contains("sk-secret"));
    }
}
