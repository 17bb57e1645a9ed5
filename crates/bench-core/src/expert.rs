// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! The Expert (C5): a per-case facade bound to one strategy. On abstain
//! it additionally calls a dedicated question-generation prompt.

use bench_model::{Generator, GeneratorOptions, Message, Recorder, Usage};
use bench_parser::Options;

use crate::aggregator::{self, Kind};
use crate::model::{LetterChoice, PatientState};
use crate::strategies::{self, Strategy, StrategyInput};

/// What the Expert decided this turn: either it needs more information
/// (`Question`) or it is ready to commit (`Choice`).
#[derive(Debug, Clone)]
pub enum ExpertResponse {
    Question {
        question: String,
        letter_choice: LetterChoice,
        confidence: f64,
        usage: Usage,
    },
    Choice {
        letter_choice: LetterChoice,
        confidence: f64,
        usage: Usage,
    },
}

impl ExpertResponse {
    pub fn letter_choice(&self) -> LetterChoice {
        match self {
            ExpertResponse::Question { letter_choice, .. } => *letter_choice,
            ExpertResponse::Choice { letter_choice, .. } => *letter_choice,
        }
    }

    pub fn usage(&self) -> Usage {
        match self {
            ExpertResponse::Question { usage, .. } => *usage,
            ExpertResponse::Choice { usage, .. } => *usage,
        }
    }

    pub fn confidence(&self) -> f64 {
        match self {
            ExpertResponse::Question { confidence, .. } => *confidence,
            ExpertResponse::Choice { confidence, .. } => *confidence,
        }
    }
}

/// Configuration fixed for the lifetime of one Expert instance (one case).
#[derive(Debug, Clone)]
pub struct ExpertConfig {
    pub strategy: Strategy,
    pub rationale_generation: bool,
    pub self_consistency: u32,
    pub abstain_threshold: Option<f64>,
    pub max_questions: usize,
    /// Reuse the abstention-decision messages for question generation
    /// (`shared`) rather than building a fresh skeleton (`independent`).
    pub independent_modules: bool,
    pub generator_options: GeneratorOptions,
}

/// Per-case object bound to `inquiry` and `options` (spec §4.5).
pub struct Expert {
    inquiry: String,
    options: Options,
    config: ExpertConfig,
}

impl Expert {
    pub fn new(inquiry: impl Into<String>, options: Options, config: ExpertConfig) -> Self {
        Self { inquiry: inquiry.into(), options, config }
    }

    pub async fn respond(
        &self,
        generator: &dyn Generator,
        patient_state: &PatientState,
        recorder: &Recorder,
    ) -> anyhow::Result<ExpertResponse> {
        let input = StrategyInput {
            patient_state,
            inquiry: &self.inquiry,
            options: &self.options,
            rationale_generation: self.config.rationale_generation,
            self_consistency: self.config.self_consistency,
            abstain_threshold: self.config.abstain_threshold,
            generator_options: &self.config.generator_options,
            max_questions: self.config.max_questions,
        };

        let outcome = strategies::decide(self.config.strategy, generator, &input, recorder).await?;

        if !outcome.abstain {
            return Ok(ExpertResponse::Choice {
                letter_choice: outcome.letter_choice,
                confidence: outcome.confidence,
                usage: outcome.usage,
            });
        }

        if let Some(question) = outcome.atomic_question {
            return Ok(ExpertResponse::Question {
                question,
                letter_choice: outcome.letter_choice,
                confidence: outcome.confidence,
                usage: outcome.usage,
            });
        }

        let mut usage = outcome.usage;
        let question = self.generate_question(generator, patient_state, &input, &mut usage, recorder).await?;

        Ok(ExpertResponse::Question {
            question,
            letter_choice: outcome.letter_choice,
            confidence: outcome.confidence,
            usage,
        })
    }

    async fn generate_question(
        &self,
        generator: &dyn Generator,
        patient_state: &PatientState,
        input: &StrategyInput<'_>,
        usage: &mut Usage,
        recorder: &Recorder,
    ) -> anyhow::Result<String> {
        let task = "ask exactly one atomic follow-up question that has not already been asked, \
                     to help you decide the correct answer.";

        let messages = if self.config.independent_modules {
            build_skeleton(patient_state, &self.inquiry, &self.options, task)
        } else {
            let mut messages = build_skeleton(patient_state, &self.inquiry, &self.options, task);
            messages.push(Message::user(
                "You decided you need more information. Ask your one follow-up question now.",
            ));
            messages
        };

        let result = aggregator::run(
            generator,
            &messages,
            Kind::Question,
            1,
            input.generator_options,
            &self.options,
            recorder,
        )
        .await?;
        usage.add(result.usage);

        Ok(result.atomic_question.unwrap_or_else(|| {
            tracing::warn!("question generation produced no parseable question, using fallback");
            "Can you tell me more about your symptoms?".to_string()
        }))
    }
}

fn build_skeleton(patient_state: &PatientState, inquiry: &str, options: &Options, task: &str) -> Vec<Message> {
    let options_text =
        options.iter().map(|(letter, text)| format!("{letter}: {text}")).collect::<Vec<_>>().join(" ");
    let user_content = format!(
        "PATIENT INFORMATION: {}\nCONVERSATION LOG: {}\nQUESTION: {}\nOPTIONS: {}\nYOUR TASK: {}",
        patient_state.initial_info,
        patient_state.format_conversation_log(),
        inquiry,
        options_text,
        task,
    );
    vec![
        Message::system("You are a medical doctor answering multiple-choice questions."),
        Message::user(user_content),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use bench_model::{Recorder, ScriptedGenerator};

    fn options() -> Options {
        [('A', "flu".to_string()), ('B', "pneumonia".to_string())].into_iter().collect()
    }

    fn config(strategy: Strategy, max_questions: usize) -> ExpertConfig {
        ExpertConfig {
            strategy,
            rationale_generation: false,
            self_consistency: 1,
            abstain_threshold: None,
            max_questions,
            independent_modules: false,
            generator_options: GeneratorOptions::default(),
        }
    }

    #[tokio::test]
    async fn fixed_expert_asks_a_question_below_budget() {
        let expert = Expert::new("What is the diagnosis?", options(), config(Strategy::Fixed, 2));
        let state = PatientState::new("fever");
        // intermediate-letter call, then question-generation call.
        let generator = ScriptedGenerator::new(["A", "Do you have a cough?"]);
        let recorder = Recorder::new(None, None, None).unwrap();

        let response = expert.respond(&generator, &state, &recorder).await.unwrap();
        match response {
            ExpertResponse::Question { question, .. } => assert_eq!(question, "Do you have a cough?"),
            ExpertResponse::Choice { .. } => panic!("expected a question"),
        }
    }

    #[tokio::test]
    async fn fixed_expert_commits_at_budget() {
        let expert = Expert::new("What is the diagnosis?", options(), config(Strategy::Fixed, 2));
        let mut state = PatientState::new("fever");
        state.push("q1", "a1");
        state.push("q2", "a2");
        let generator = ScriptedGenerator::new(["B"]);
        let recorder = Recorder::new(None, None, None).unwrap();

        let response = expert.respond(&generator, &state, &recorder).await.unwrap();
        assert!(matches!(response, ExpertResponse::Choice { letter_choice: LetterChoice::B, .. }));
    }
}
