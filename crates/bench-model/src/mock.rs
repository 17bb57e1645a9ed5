// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::provider::{GenerationResult, Generator, GeneratorOptions};
use crate::types::{Message, Role, Usage};

/// Deterministic mock backend for tests.  Echoes the last user message
/// back as the assistant response.
#[derive(Default)]
pub struct MockGenerator;

#[async_trait]
impl Generator for MockGenerator {
    fn name(&self) -> &str {
        "mock"
    }
    fn model_name(&self) -> &str {
        "mock-model"
    }

    async fn generate(
        &self,
        messages: &[Message],
        _options: &GeneratorOptions,
    ) -> anyhow::Result<GenerationResult> {
        let reply = messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .unwrap_or("[no input]");

        Ok(GenerationResult {
            text: format!("MOCK: {reply}"),
            logprobs: None,
            usage: Usage { input_tokens: 10, output_tokens: 10 },
        })
    }
}

/// A pre-scripted mock backend.  Each call to `generate` pops the next
/// reply from the front of the queue.  This lets tests drive exact
/// deterministic sample sequences through the self-consistency aggregator
/// and the abstention strategies without network access.
pub struct ScriptedGenerator {
    replies: Mutex<VecDeque<String>>,
    fallback: String,
    name: String,
}

impl ScriptedGenerator {
    pub fn new(replies: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().map(Into::into).collect()),
            fallback: "[no more scripted replies]".to_string(),
            name: "scripted-mock".to_string(),
        }
    }

    /// Override the string returned once the script is exhausted.
    pub fn with_fallback(mut self, fallback: impl Into<String>) -> Self {
        self.fallback = fallback.into();
        self
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    fn name(&self) -> &str {
        &self.name
    }
    fn model_name(&self) -> &str {
        "scripted-mock-model"
    }

    async fn generate(
        &self,
        _messages: &[Message],
        _options: &GeneratorOptions,
    ) -> anyhow::Result<GenerationResult> {
        let text = {
            let mut replies = self.replies.lock().unwrap();
            replies.pop_front().unwrap_or_else(|| self.fallback.clone())
        };
        Ok(GenerationResult {
            text,
            logprobs: None,
            usage: Usage { input_tokens: 5, output_tokens: 5 },
        })
    }
}
