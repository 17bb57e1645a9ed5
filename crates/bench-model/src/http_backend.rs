// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! An OpenAI-compatible chat-completions backend over HTTP.
//!
//! All three backends in [`crate::cache::GeneratorCache`] (remote, batch-local,
//! single-shot) speak this same wire format — they differ only in base URL,
//! credentials, and which extra sampling fields they forward. Local inference
//! servers (vLLM, llama.cpp, text-generation-inference) all expose this same
//! `/chat/completions` shape, so one HTTP client covers every backend without
//! binding this crate to any particular GPU runtime.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::provider::{GenerationResult, Generator, GeneratorOptions};
use crate::types::{Message, Role, Usage};

/// Which family of backend a [`HttpChatBackend`] represents. Purely for
/// logging and for `forward_extra_sampling` below — the wire protocol is
/// identical across all three.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Remote,
    BatchLocal,
    SingleShot,
}

impl BackendKind {
    fn label(self) -> &'static str {
        match self {
            BackendKind::Remote => "remote",
            BackendKind::BatchLocal => "batch-local",
            BackendKind::SingleShot => "single-shot",
        }
    }

    /// Only the batch-local backend forwards `frequency_penalty`/`presence_penalty`;
    /// per spec §4.1 these are batch-local-only sampling parameters.
    fn forwards_extra_sampling(self) -> bool {
        matches!(self, BackendKind::BatchLocal)
    }
}

#[derive(Debug, Clone)]
pub struct HttpChatBackend {
    kind: BackendKind,
    model: String,
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

/// Configuration needed to construct any one of the three backends.
#[derive(Debug, Clone, Default)]
pub struct BackendConfig {
    pub model: String,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
}

impl HttpChatBackend {
    const DEFAULT_REMOTE_BASE_URL: &'static str = "https://api.openai.com/v1";

    /// Build the remote chat API backend. Falls back to the OpenAI default
    /// base URL when none is configured.
    pub fn remote(cfg: &BackendConfig) -> anyhow::Result<Self> {
        Ok(Self {
            kind: BackendKind::Remote,
            model: cfg.model.clone(),
            base_url: cfg
                .base_url
                .clone()
                .unwrap_or_else(|| Self::DEFAULT_REMOTE_BASE_URL.to_string()),
            api_key: cfg.api_key.clone(),
            client: reqwest::Client::new(),
        })
    }

    /// Build the batch-local inference backend. Unlike `remote`, this
    /// backend has no sane default endpoint — a local inference server must
    /// be explicitly configured. Construction fails (never panics) when
    /// `base_url` is absent, so callers can degrade to `single_shot`.
    pub fn batch_local(cfg: &BackendConfig) -> anyhow::Result<Self> {
        let base_url = cfg
            .base_url
            .clone()
            .ok_or_else(|| anyhow::anyhow!("batch-local backend requires a base_url"))?;
        Ok(Self {
            kind: BackendKind::BatchLocal,
            model: cfg.model.clone(),
            base_url,
            api_key: cfg.api_key.clone(),
            client: reqwest::Client::new(),
        })
    }

    /// Build the single-shot local inference fallback. Like `batch_local`
    /// this talks to a local server, but never forwards the extra batch
    /// sampling knobs — this is the backend that construction always
    /// succeeds for, so it is the terminal fallback in the cache.
    pub fn single_shot(cfg: &BackendConfig) -> anyhow::Result<Self> {
        let base_url = cfg
            .base_url
            .clone()
            .unwrap_or_else(|| "http://127.0.0.1:8000/v1".to_string());
        Ok(Self {
            kind: BackendKind::SingleShot,
            model: cfg.model.clone(),
            base_url,
            api_key: cfg.api_key.clone(),
            client: reqwest::Client::new(),
        })
    }
}

fn role_str(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
    }
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessageOut,
    #[serde(default)]
    logprobs: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct ChatMessageOut {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize, Default)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

#[async_trait]
impl Generator for HttpChatBackend {
    fn name(&self) -> &str {
        self.kind.label()
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(
        &self,
        messages: &[Message],
        options: &GeneratorOptions,
    ) -> anyhow::Result<GenerationResult> {
        let wire_messages: Vec<WireMessage> = messages
            .iter()
            .map(|m| WireMessage { role: role_str(m.role), content: &m.content })
            .collect();

        let mut body = json!({
            "model": self.model,
            "messages": wire_messages,
            "temperature": options.temperature,
            "max_tokens": options.max_tokens,
            "top_p": options.top_p,
        });
        if options.top_logprobs > 0 {
            body["logprobs"] = json!(true);
            body["top_logprobs"] = json!(options.top_logprobs);
        }
        if self.kind.forwards_extra_sampling() {
            if let Some(fp) = options.frequency_penalty {
                body["frequency_penalty"] = json!(fp);
            }
            if let Some(pp) = options.presence_penalty {
                body["presence_penalty"] = json!(pp);
            }
        }

        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let mut req = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("{} backend request to {}: {e}", self.kind.label(), url))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("{} backend returned {status}: {body}", self.kind.label());
        }

        let parsed: ChatResponse = resp.json().await?;
        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("{} backend returned no choices", self.kind.label()))?;
        let usage = parsed.usage.unwrap_or_default();

        Ok(GenerationResult {
            text: choice.message.content.unwrap_or_default(),
            logprobs: choice.logprobs,
            usage: Usage {
                input_tokens: usage.prompt_tokens,
                output_tokens: usage.completion_tokens,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_defaults_base_url_when_unset() {
        let backend = HttpChatBackend::remote(&BackendConfig {
            model: "gpt-4o-mini".into(),
            base_url: None,
            api_key: None,
        })
        .unwrap();
        assert_eq!(backend.base_url, HttpChatBackend::DEFAULT_REMOTE_BASE_URL);
        assert_eq!(backend.name(), "remote");
    }

    #[test]
    fn batch_local_requires_base_url() {
        let err = HttpChatBackend::batch_local(&BackendConfig {
            model: "llama-3-70b".into(),
            base_url: None,
            api_key: None,
        })
        .unwrap_err();
        assert!(err.to_string().contains("base_url"));
    }

    #[test]
    fn single_shot_always_constructs() {
        let backend = HttpChatBackend::single_shot(&BackendConfig {
            model: "llama-3-8b".into(),
            base_url: None,
            api_key: None,
        })
        .unwrap();
        assert_eq!(backend.name(), "single-shot");
    }

    #[test]
    fn only_batch_local_forwards_extra_sampling() {
        assert!(BackendKind::BatchLocal.forwards_extra_sampling());
        assert!(!BackendKind::Remote.forwards_extra_sampling());
        assert!(!BackendKind::SingleShot.forwards_extra_sampling());
    }
}
