//! LLM seam.
//!
//! Everything that asks a model for an answer (SD classification, retro
//! scoring, the quality judge, UAT conversion) goes through [`LlmClient`],
//! so tests substitute a scripted client and the CLI wires [`OpenAiClient`].

use crate::config::LlmConfig;
use crate::error::{LeoError, Result};
use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::{json, Value};

pub trait LlmClient: Send + Sync {
    /// Model identifier recorded alongside assessments.
    fn model(&self) -> &str;

    /// Single-turn completion. Implementations attempt the call once.
    fn complete(&self, system: &str, prompt: &str) -> Result<String>;
}

// ---------------------------------------------------------------------------
// OpenAiClient
// ---------------------------------------------------------------------------

/// Chat-completions client. Requests JSON-object output.
pub struct OpenAiClient {
    base_url: String,
    api_key: String,
    model: String,
    client: Client,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Deserialize)]
struct Message {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiClient {
    pub fn new(base_url: &str, api_key: &str, model: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            client: Client::new(),
        }
    }

    /// Build from config; `None` when the API key variable is unset.
    pub fn from_config(cfg: &LlmConfig) -> Option<Self> {
        let key = cfg.api_key()?;
        Some(Self::new(&cfg.base_url, &key, &cfg.model))
    }
}

impl LlmClient for OpenAiClient {
    fn model(&self) -> &str {
        &self.model
    }

    fn complete(&self, system: &str, prompt: &str) -> Result<String> {
        let body = json!({
            "model": self.model,
            "temperature": 0.2,
            "response_format": {"type": "json_object"},
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": prompt},
            ],
        });
        let resp = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().unwrap_or_default();
            return Err(LeoError::Llm(format!("HTTP {status}: {text}")));
        }
        let parsed: ChatResponse = resp.json()?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| LeoError::Llm("empty completion".to_string()))
    }
}

// ---------------------------------------------------------------------------
// Response parsing
// ---------------------------------------------------------------------------

/// Pull the outermost JSON object out of a model reply, tolerating code
/// fences and prose around it.
pub fn extract_json(text: &str) -> Option<Value> {
    if let Ok(v @ Value::Object(_)) = serde_json::from_str::<Value>(text.trim()) {
        return Some(v);
    }
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    match serde_json::from_str::<Value>(&text[start..=end]) {
        Ok(v @ Value::Object(_)) => Some(v),
        _ => None,
    }
}

/// `complete` followed by [`extract_json`]; a reply without an object is an
/// [`LeoError::Llm`].
pub fn complete_json(llm: &dyn LlmClient, system: &str, prompt: &str) -> Result<Value> {
    let reply = llm.complete(system, prompt)?;
    extract_json(&reply)
        .ok_or_else(|| LeoError::Llm(format!("reply was not a JSON object: {reply}")))
}

/// Test double replying with a fixed text, or failing.
#[cfg(test)]
pub(crate) struct ScriptedLlm {
    reply: std::result::Result<String, String>,
    pub calls: std::sync::atomic::AtomicUsize,
}

#[cfg(test)]
impl ScriptedLlm {
    pub fn replying(reply: impl Into<String>) -> Self {
        Self {
            reply: Ok(reply.into()),
            calls: Default::default(),
        }
    }

    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            reply: Err(message.into()),
            calls: Default::default(),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(test)]
impl LlmClient for ScriptedLlm {
    fn model(&self) -> &str {
        "scripted"
    }

    fn complete(&self, _system: &str, _prompt: &str) -> Result<String> {
        self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        self.reply.clone().map_err(LeoError::Llm)
    }
}
