use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{classify_status, classify_transport, http_client, require_credential, Provider};
use crate::config::AnthropicSettings;
use crate::errors::{GenError, Result};
use crate::wire::{ApiKey, Instruction};

/// Messages API adapter. There is no JSON mode here, so replies often carry
/// prose or code fences around the payload.
pub struct Anthropic {
    pub model: String,
    pub api_base: String,
    pub api_version: String,
    pub max_tokens: u32,
    client: Client,
}

#[derive(Serialize)]
struct MsgRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<Msg<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
}

#[derive(Serialize)]
struct Msg<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct MsgResponse {
    content: Vec<Block>,
}

#[derive(Deserialize)]
struct Block {
    #[serde(default)]
    text: String,
    #[serde(default)]
    r#type: String,
}

impl Anthropic {
    pub fn new(settings: &AnthropicSettings, timeout_secs: u64) -> Result<Self> {
        Ok(Self {
            model: settings.model.clone(),
            api_base: settings.api_base.clone(),
            api_version: settings.api_version.clone(),
            max_tokens: settings.max_tokens,
            client: http_client(timeout_secs)?,
        })
    }

    fn body<'a>(&'a self, ins: &'a Instruction) -> MsgRequest<'a> {
        MsgRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            messages: vec![Msg { role: "user", content: &ins.user }],
            system: Some(ins.system.as_str()).filter(|s| !s.trim().is_empty()),
        }
    }
}

/// Concatenate the text blocks of a messages response.
pub(crate) fn message_text(body: &str) -> Result<String> {
    let parsed: MsgResponse = serde_json::from_str(body)
        .map_err(|e| GenError::permanent(format!("anthropic response parse error: {e}")))?;
    Ok(parsed
        .content
        .into_iter()
        .filter(|b| b.r#type == "text")
        .map(|b| b.text)
        .collect::<Vec<_>>()
        .join(""))
}

#[async_trait]
impl Provider for Anthropic {
    async fn invoke(&self, ins: &Instruction, credential: Option<&ApiKey>) -> Result<String> {
        let key = require_credential(credential, "anthropic")?;
        let url = format!("{}/v1/messages", self.api_base.trim_end_matches('/'));
        debug!(%url, model = %self.model, "anthropic: POST");

        let resp = self
            .client
            .post(&url)
            .header("x-api-key", key.expose())
            .header("anthropic-version", &self.api_version)
            .json(&self.body(ins))
            .send()
            .await
            .map_err(|e| classify_transport("anthropic", e))?;

        let status = resp.status();
        let text = resp.text().await.map_err(|e| classify_transport("anthropic", e))?;
        if !status.is_success() {
            return Err(classify_status("anthropic", status, &text));
        }
        message_text(&text)
    }
}
