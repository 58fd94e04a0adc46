use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use super::{classify_status, classify_transport, http_client, require_credential, Provider};
use crate::config::OpenAiSettings;
use crate::errors::{GenError, Result};
use crate::wire::{ApiKey, Instruction};

/// Chat-completions adapter. Asks for `json_object` output, so replies are
/// normally a bare JSON document.
pub struct OpenAIProvider {
    model: String,
    api_base: String,
    client: Client,
}

impl OpenAIProvider {
    pub fn new(settings: &OpenAiSettings, timeout_secs: u64) -> Result<Self> {
        Ok(Self {
            model: settings.model.clone(),
            api_base: settings.api_base.clone(),
            client: http_client(timeout_secs)?,
        })
    }

    fn body(&self, ins: &Instruction) -> Value {
        json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": ins.system },
                { "role": "user", "content": ins.user }
            ],
            "temperature": 0.2,
            "response_format": { "type": "json_object" }
        })
    }
}

#[derive(Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

/// Pull the first choice's text out of a chat-completions envelope. A missing
/// or null message yields an empty reply, which the extractor rejects.
pub(crate) fn completion_text(body: &str) -> Result<String> {
    let parsed: ChatResponse = serde_json::from_str(body)
        .map_err(|e| GenError::permanent(format!("openai response parse error: {e}")))?;
    Ok(parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .unwrap_or_default())
}

#[async_trait]
impl Provider for OpenAIProvider {
    async fn invoke(&self, ins: &Instruction, credential: Option<&ApiKey>) -> Result<String> {
        let key = require_credential(credential, "openai")?;
        let url = format!("{}/v1/chat/completions", self.api_base.trim_end_matches('/'));
        debug!(%url, model = %self.model, "openai: POST");

        let resp = self
            .client
            .post(&url)
            .bearer_auth(key.expose())
            .json(&self.body(ins))
            .send()
            .await
            .map_err(|e| classify_transport("openai", e))?;

        let status = resp.status();
        let text = resp.text().await.map_err(|e| classify_transport("openai", e))?;
        if !status.is_success() {
            return Err(classify_status("openai", status, &text));
        }
        completion_text(&text)
    }
}
