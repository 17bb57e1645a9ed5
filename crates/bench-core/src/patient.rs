// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! The Patient (C6): holds per-case context and answers free-form
//! doctor questions using one of four responding variants.

use std::sync::Mutex;

use bench_model::{Generator, GeneratorOptions, Message, Recorder, Usage};
use rand::Rng;

use crate::model::PatientState;

const REFUSAL: &str = "I'm sorry, I don't have that information.";

/// Which responding variant a Patient instance uses (spec §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatientVariant {
    Random,
    Direct,
    Instruct,
    FactSelect,
}

impl PatientVariant {
    pub fn name(&self) -> &'static str {
        match self {
            PatientVariant::Random => "random",
            PatientVariant::Direct => "direct",
            PatientVariant::Instruct => "instruct",
            PatientVariant::FactSelect => "fact_select",
        }
    }
}

/// Response to one doctor question, plus the usage spent producing it.
#[derive(Debug, Clone)]
pub struct PatientResponse {
    pub text: String,
    pub usage: Usage,
}

/// Per-case object bound to the hidden context. Lives for exactly one
/// case (spec §3 lifecycles).
pub struct Patient {
    variant: PatientVariant,
    initial_info: String,
    context: Vec<String>,
    context_paragraph: String,
    generator_options: GeneratorOptions,
    /// Decomposed facts, populated lazily by FactSelect on first use and
    /// cached for the instance's lifetime (spec §4.6, testable property 7).
    atomic_facts: Mutex<Option<Vec<String>>>,
}

impl Patient {
    pub fn new(
        variant: PatientVariant,
        initial_info: impl Into<String>,
        context: Vec<String>,
        atomic_facts: Option<Vec<String>>,
        generator_options: GeneratorOptions,
    ) -> Self {
        let context_paragraph = context.join(" ");
        Self {
            variant,
            initial_info: initial_info.into(),
            context,
            context_paragraph,
            generator_options,
            atomic_facts: Mutex::new(atomic_facts),
        }
    }

    pub async fn respond(
        &self,
        generator: &dyn Generator,
        question: &str,
        recorder: &Recorder,
    ) -> anyhow::Result<PatientResponse> {
        match self.variant {
            PatientVariant::Random => Ok(self.respond_random()),
            PatientVariant::Direct => self.respond_direct(generator, question, recorder).await,
            PatientVariant::Instruct => self.respond_instruct(generator, question, recorder).await,
            PatientVariant::FactSelect => self.respond_fact_select(generator, question, recorder).await,
        }
    }

    fn respond_random(&self) -> PatientResponse {
        let refuse = self.context.is_empty() || rand::thread_rng().gen_bool(0.5);
        let text = if refuse {
            REFUSAL.to_string()
        } else {
            let idx = rand::thread_rng().gen_range(0..self.context.len());
            self.context[idx].clone()
        };
        PatientResponse { text, usage: Usage::default() }
    }

    async fn respond_direct(
        &self,
        generator: &dyn Generator,
        question: &str,
        recorder: &Recorder,
    ) -> anyhow::Result<PatientResponse> {
        let messages = vec![
            Message::system(
                "You are a patient. Answer the doctor's question using only the information given, \
                 or say you don't know.",
            ),
            Message::user(format!("PATIENT INFORMATION: {}\nDOCTOR QUESTION: {}", self.initial_info, question)),
        ];
        self.call(generator, &messages, 64, recorder).await
    }

    async fn respond_instruct(
        &self,
        generator: &dyn Generator,
        question: &str,
        recorder: &Recorder,
    ) -> anyhow::Result<PatientResponse> {
        let messages = vec![
            Message::system(
                "You are a patient. Quote only what the question asks for, drawn verbatim from your \
                 medical history below. If it isn't covered, say you don't know.",
            ),
            Message::user(format!(
                "MEDICAL HISTORY: {}\nDOCTOR QUESTION: {}",
                self.context_paragraph, question
            )),
        ];
        self.call(generator, &messages, 64, recorder).await
    }

    async fn respond_fact_select(
        &self,
        generator: &dyn Generator,
        question: &str,
        recorder: &Recorder,
    ) -> anyhow::Result<PatientResponse> {
        let mut usage = Usage::default();

        let needs_decomposition = self.atomic_facts.lock().unwrap().is_none();
        if needs_decomposition {
            let facts_response = self.decompose(generator, recorder).await?;
            usage.add(facts_response.usage);
            let facts = facts_response.text.lines().map(str::trim).filter(|l| !l.is_empty()).map(String::from).collect();
            *self.atomic_facts.lock().unwrap() = Some(facts);
        }

        let facts = self.atomic_facts.lock().unwrap().clone().unwrap_or_default();
        let facts_text = facts.join("\n");

        let messages = vec![
            Message::system(
                "You are a patient. From the list of facts below, return verbatim only the facts that \
                 answer the doctor's question, or say you don't know if none apply.",
            ),
            Message::user(format!("FACTS:\n{facts_text}\nDOCTOR QUESTION: {question}")),
        ];
        let mut response = self.call(generator, &messages, 64, recorder).await?;
        response.usage.add(usage);
        Ok(response)
    }

    async fn decompose(&self, generator: &dyn Generator, recorder: &Recorder) -> anyhow::Result<PatientResponse> {
        let messages = vec![
            Message::system("Decompose the medical history below into a list of self-contained, atomic facts, one per line."),
            Message::user(format!("MEDICAL HISTORY: {}", self.context_paragraph)),
        ];
        self.call(generator, &messages, 512, recorder).await
    }

    /// Single generator call for one patient turn, mirrored to the message
    /// log (spec §6b) the same way the Expert's aggregator does.
    async fn call(
        &self,
        generator: &dyn Generator,
        messages: &[Message],
        max_tokens: u32,
        recorder: &Recorder,
    ) -> anyhow::Result<PatientResponse> {
        let mut options = self.generator_options.clone();
        options.max_tokens = max_tokens;
        let outcome = generator.generate(messages, &options).await;
        recorder
            .log_message(serde_json::json!({
                "model": generator.model_name(),
                "request": messages,
                "response": outcome.as_ref().ok().map(|r| r.text.as_str()),
                "error": outcome.as_ref().err().map(|e| e.to_string()),
            }))
            .await?;
        let result = outcome?;
        Ok(PatientResponse { text: result.text, usage: result.usage })
    }
}
