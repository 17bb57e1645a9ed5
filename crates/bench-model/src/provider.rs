// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use async_trait::async_trait;

use crate::types::{LogProbs, Message, Usage};

/// Sampling parameters threaded through to whichever backend handles a
/// given model identifier.  Unsupported fields are silently ignored by a
/// backend rather than rejected — e.g. the remote backend ignores
/// `frequency_penalty`/`presence_penalty`.
#[derive(Debug, Clone, Default)]
pub struct GeneratorOptions {
    pub temperature: f32,
    pub max_tokens: u32,
    pub top_p: f32,
    pub top_logprobs: u32,
    pub frequency_penalty: Option<f32>,
    pub presence_penalty: Option<f32>,
}

/// The result of one completion call: text, optional log-probs, and the
/// token usage for that single call (not accumulated across retries or
/// self-consistency samples — callers sum usage themselves).
#[derive(Debug, Clone, Default)]
pub struct GenerationResult {
    pub text: String,
    pub logprobs: Option<LogProbs>,
    pub usage: Usage,
}

/// A single-shot, non-streaming chat completion backend.
///
/// Unlike the streaming `ModelProvider` this crate's generator layer was
/// adapted from, every call here returns one finished `GenerationResult` —
/// there is no token-level streaming need in this benchmark's control flow,
/// since every caller blocks on the full text before it can parse a
/// decision out of it.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Human-readable backend name for logging ("remote", "batch-local", "single-shot").
    fn name(&self) -> &str;

    /// Model identifier as configured.
    fn model_name(&self) -> &str;

    async fn generate(
        &self,
        messages: &[Message],
        options: &GeneratorOptions,
    ) -> anyhow::Result<GenerationResult>;
}
