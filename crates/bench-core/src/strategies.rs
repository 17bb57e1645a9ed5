// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! The six abstention strategies (C4): each shapes a prompt, runs it
//! through the self-consistency aggregator, and derives `abstain` +
//! `confidence`. Every strategy additionally elicits an intermediate
//! letter via a second prompt for analysis, except Implicit when its
//! own decision call already produced one.

use bench_model::{Generator, GeneratorOptions, Message, Recorder, Usage};
use bench_parser::{Options, YesNo};

use crate::aggregator::{self, Kind};
use crate::model::{LetterChoice, PatientState};

const DEFAULT_PROB_THRESHOLD: f64 = 0.8;
const DEFAULT_SCALE_THRESHOLD: f64 = 4.0;

/// Which abstention strategy is driving a case.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Fixed,
    Implicit,
    Binary,
    Numerical,
    NumCutOff,
    Scale,
}

impl Strategy {
    pub fn name(&self) -> &'static str {
        match self {
            Strategy::Fixed => "fixed",
            Strategy::Implicit => "implicit",
            Strategy::Binary => "binary",
            Strategy::Numerical => "numerical",
            Strategy::NumCutOff => "numcutoff",
            Strategy::Scale => "scale",
        }
    }
}

/// Everything a strategy needs to decide, gathered once by the Expert.
pub struct StrategyInput<'a> {
    pub patient_state: &'a PatientState,
    pub inquiry: &'a str,
    pub options: &'a Options,
    pub rationale_generation: bool,
    pub self_consistency: u32,
    /// Overrides the strategy's own default when set (NumCutOff: 0.8, Scale: 4.0).
    pub abstain_threshold: Option<f64>,
    pub generator_options: &'a GeneratorOptions,
    /// Only consulted by [`Strategy::Fixed`].
    pub max_questions: usize,
}

/// What a strategy decided, plus everything needed for the turn
/// controller's bookkeeping and the output record.
#[derive(Debug, Clone)]
pub struct StrategyOutcome {
    pub abstain: bool,
    pub confidence: f64,
    pub usage: Usage,
    pub letter_choice: LetterChoice,
    pub atomic_question: Option<String>,
}

/// Run `strategy` against `input` using `generator`.
pub async fn decide(
    strategy: Strategy,
    generator: &dyn Generator,
    input: &StrategyInput<'_>,
    recorder: &Recorder,
) -> anyhow::Result<StrategyOutcome> {
    match strategy {
        Strategy::Fixed => fixed(generator, input, recorder).await,
        Strategy::Implicit => implicit(generator, input, recorder).await,
        Strategy::Binary => binary(generator, input, recorder).await,
        Strategy::Numerical => numerical(generator, input, recorder).await,
        Strategy::NumCutOff => numcutoff(generator, input, recorder).await,
        Strategy::Scale => scale(generator, input, recorder).await,
    }
}

fn task_prompt(core: &str, rationale_generation: bool) -> String {
    if rationale_generation {
        format!(
            "First write one line starting with \"REASON:\" explaining your reasoning, \
             then on the next line, {core}"
        )
    } else {
        core.to_string()
    }
}

fn build_messages(input: &StrategyInput<'_>, task: &str) -> Vec<Message> {
    let options_text = input
        .options
        .iter()
        .map(|(letter, text)| format!("{letter}: {text}"))
        .collect::<Vec<_>>()
        .join(" ");

    let user_content = format!(
        "PATIENT INFORMATION: {}\nCONVERSATION LOG: {}\nQUESTION: {}\nOPTIONS: {}\nYOUR TASK: {}",
        input.patient_state.initial_info,
        input.patient_state.format_conversation_log(),
        input.inquiry,
        options_text,
        task,
    );

    vec![
        Message::system("You are a medical doctor answering multiple-choice questions."),
        Message::user(user_content),
    ]
}

async fn intermediate_letter(
    generator: &dyn Generator,
    input: &StrategyInput<'_>,
    usage: &mut Usage,
    recorder: &Recorder,
) -> anyhow::Result<LetterChoice> {
    let task = task_prompt(
        "assume you have enough information and answer with only the letter of your choice.",
        input.rationale_generation,
    );
    let messages = build_messages(input, &task);
    let outcome =
        aggregator::run(generator, &messages, Kind::Choice, 1, input.generator_options, input.options, recorder)
            .await?;
    usage.add(outcome.usage);
    Ok(outcome.letter_choice.unwrap_or(LetterChoice::Unparseable))
}

async fn fixed(generator: &dyn Generator, input: &StrategyInput<'_>, recorder: &Recorder) -> anyhow::Result<StrategyOutcome> {
    let abstain = input.patient_state.interaction_history.len() < input.max_questions;
    let mut usage = Usage::default();
    let letter_choice = intermediate_letter(generator, input, &mut usage, recorder).await?;
    Ok(StrategyOutcome {
        abstain,
        confidence: if abstain { 1.0 } else { 0.0 },
        usage,
        letter_choice,
        atomic_question: None,
    })
}

async fn implicit(generator: &dyn Generator, input: &StrategyInput<'_>, recorder: &Recorder) -> anyhow::Result<StrategyOutcome> {
    let task = task_prompt(
        "either give your letter choice, or if you need more information, ask exactly one atomic follow-up question.",
        input.rationale_generation,
    );
    let messages = build_messages(input, &task);
    let outcome = aggregator::run(
        generator,
        &messages,
        Kind::ChoiceOrQuestion,
        input.self_consistency,
        input.generator_options,
        input.options,
        recorder,
    )
    .await?;

    let mut usage = outcome.usage;
    let letter_won = matches!(outcome.letter_choice, Some(l) if l != LetterChoice::Unparseable);
    let abstain = !letter_won;

    let letter_choice = if letter_won {
        outcome.letter_choice.expect("letter_won implies Some")
    } else {
        intermediate_letter(generator, input, &mut usage, recorder).await?
    };

    Ok(StrategyOutcome {
        abstain,
        confidence: outcome.confidence,
        usage,
        letter_choice,
        atomic_question: outcome.atomic_question,
    })
}

async fn binary(generator: &dyn Generator, input: &StrategyInput<'_>, recorder: &Recorder) -> anyhow::Result<StrategyOutcome> {
    let task = task_prompt("answer YES or NO: are you confident enough to commit to an answer?", input.rationale_generation);
    let messages = build_messages(input, &task);
    let outcome = aggregator::run(
        generator,
        &messages,
        Kind::YesNo,
        input.self_consistency,
        input.generator_options,
        input.options,
        recorder,
    )
    .await?;

    let mut usage = outcome.usage;
    let abstain = outcome.yes_no == Some(YesNo::No);
    let letter_choice = intermediate_letter(generator, input, &mut usage, recorder).await?;

    Ok(StrategyOutcome { abstain, confidence: outcome.confidence, usage, letter_choice, atomic_question: None })
}

async fn numerical(generator: &dyn Generator, input: &StrategyInput<'_>, recorder: &Recorder) -> anyhow::Result<StrategyOutcome> {
    let score_task = task_prompt("state your confidence that you can answer correctly, as a float in [0,1].", input.rationale_generation);
    let score_messages = build_messages(input, &score_task);
    let score_outcome = aggregator::run(
        generator,
        &score_messages,
        Kind::Numerical,
        input.self_consistency,
        input.generator_options,
        input.options,
        recorder,
    )
    .await?;

    let mut usage = score_outcome.usage;

    let followup_task = task_prompt("given that confidence, answer YES or NO: should you proceed to commit now?", input.rationale_generation);
    let followup_messages = build_messages(input, &followup_task);
    let followup_outcome = aggregator::run(
        generator,
        &followup_messages,
        Kind::YesNo,
        input.self_consistency,
        input.generator_options,
        input.options,
        recorder,
    )
    .await?;
    usage.add(followup_outcome.usage);

    let abstain = followup_outcome.yes_no == Some(YesNo::No);
    let letter_choice = intermediate_letter(generator, input, &mut usage, recorder).await?;

    Ok(StrategyOutcome {
        abstain,
        confidence: score_outcome.score.unwrap_or(0.0),
        usage,
        letter_choice,
        atomic_question: None,
    })
}

async fn numcutoff(generator: &dyn Generator, input: &StrategyInput<'_>, recorder: &Recorder) -> anyhow::Result<StrategyOutcome> {
    let task = task_prompt("state your confidence that you can answer correctly, as a float in [0,1].", input.rationale_generation);
    let messages = build_messages(input, &task);
    let outcome = aggregator::run(
        generator,
        &messages,
        Kind::Numerical,
        input.self_consistency,
        input.generator_options,
        input.options,
        recorder,
    )
    .await?;

    let mut usage = outcome.usage;
    let mean = outcome.score.unwrap_or(0.0);
    let threshold = input.abstain_threshold.unwrap_or(DEFAULT_PROB_THRESHOLD);
    let abstain = mean < threshold;
    let letter_choice = intermediate_letter(generator, input, &mut usage, recorder).await?;

    Ok(StrategyOutcome { abstain, confidence: mean, usage, letter_choice, atomic_question: None })
}

async fn scale(generator: &dyn Generator, input: &StrategyInput<'_>, recorder: &Recorder) -> anyhow::Result<StrategyOutcome> {
    let task = task_prompt(
        "rate your confidence as one of: Very Unconfident, Somewhat Unconfident, \
         Neither Confident nor Unconfident, Somewhat Confident, Very Confident.",
        input.rationale_generation,
    );
    let messages = build_messages(input, &task);
    let outcome = aggregator::run(
        generator,
        &messages,
        Kind::Scale,
        input.self_consistency,
        input.generator_options,
        input.options,
        recorder,
    )
    .await?;

    let mut usage = outcome.usage;
    let mean = outcome.score.unwrap_or(0.0);
    let threshold = input.abstain_threshold.unwrap_or(DEFAULT_SCALE_THRESHOLD);
    let abstain = mean < threshold;
    let letter_choice = intermediate_letter(generator, input, &mut usage, recorder).await?;

    Ok(StrategyOutcome { abstain, confidence: mean, usage, letter_choice, atomic_question: None })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bench_model::{Recorder, ScriptedGenerator};

    fn case_options() -> Options {
        [('A', "flu".to_string()), ('B', "pneumonia".to_string()), ('C', "asthma".to_string())]
            .into_iter()
            .collect()
    }

    fn base_input<'a>(
        state: &'a PatientState,
        options: &'a Options,
        generator_options: &'a GeneratorOptions,
    ) -> StrategyInput<'a> {
        StrategyInput {
            patient_state: state,
            inquiry: "What is the diagnosis?",
            options,
            rationale_generation: false,
            self_consistency: 1,
            abstain_threshold: None,
            generator_options,
            max_questions: 2,
        }
    }

    #[tokio::test]
    async fn fixed_abstains_below_budget() {
        let state = PatientState::new("fever for 3 days");
        let options = case_options();
        let generator_options = GeneratorOptions::default();
        let input = base_input(&state, &options, &generator_options);
        let generator = ScriptedGenerator::new(["C"]);
        let recorder = Recorder::new(None, None, None).unwrap();

        let outcome = decide(Strategy::Fixed, &generator, &input, &recorder).await.unwrap();
        assert!(outcome.abstain);
        assert_eq!(outcome.confidence, 1.0);
        assert_eq!(outcome.letter_choice, LetterChoice::C);
    }

    #[tokio::test]
    async fn fixed_commits_at_budget() {
        let mut state = PatientState::new("fever for 3 days");
        state.push("q1", "a1");
        state.push("q2", "a2");
        let options = case_options();
        let generator_options = GeneratorOptions::default();
        let mut input = base_input(&state, &options, &generator_options);
        input.max_questions = 2;
        let generator = ScriptedGenerator::new(["A"]);
        let recorder = Recorder::new(None, None, None).unwrap();

        let outcome = decide(Strategy::Fixed, &generator, &input, &recorder).await.unwrap();
        assert!(!outcome.abstain);
        assert_eq!(outcome.confidence, 0.0);
    }

    #[tokio::test]
    async fn binary_s2_abstains_on_no_majority() {
        let state = PatientState::new("info");
        let options = case_options();
        let generator_options = GeneratorOptions::default();
        let mut input = base_input(&state, &options, &generator_options);
        input.self_consistency = 3;
        let generator = ScriptedGenerator::new(["DECISION: NO", "DECISION: NO", "DECISION: YES", "B"]);
        let recorder = Recorder::new(None, None, None).unwrap();

        let outcome = decide(Strategy::Binary, &generator, &input, &recorder).await.unwrap();
        assert!(outcome.abstain);
        assert!((outcome.confidence - (1.0 / 3.0)).abs() < 1e-9);
        assert_eq!(outcome.letter_choice, LetterChoice::B);
    }

    #[tokio::test]
    async fn numcutoff_s3_commits_above_threshold() {
        let state = PatientState::new("info");
        let options = case_options();
        let generator_options = GeneratorOptions::default();
        let mut input = base_input(&state, &options, &generator_options);
        input.self_consistency = 3;
        input.abstain_threshold = Some(0.8);
        let generator = ScriptedGenerator::new(["0.9", "0.85", "0.95", "A"]);
        let recorder = Recorder::new(None, None, None).unwrap();

        let outcome = decide(Strategy::NumCutOff, &generator, &input, &recorder).await.unwrap();
        assert!(!outcome.abstain);
        assert!((outcome.confidence - 0.9).abs() < 1e-9);
    }

    #[tokio::test]
    async fn scale_s4_commits_above_threshold() {
        let state = PatientState::new("info");
        let options = case_options();
        let generator_options = GeneratorOptions::default();
        let mut input = base_input(&state, &options, &generator_options);
        input.self_consistency = 2;
        input.abstain_threshold = Some(4.0);
        let generator = ScriptedGenerator::new(["Somewhat Confident", "Very Confident", "B"]);
        let recorder = Recorder::new(None, None, None).unwrap();

        let outcome = decide(Strategy::Scale, &generator, &input, &recorder).await.unwrap();
        assert!(!outcome.abstain);
        assert!((outcome.confidence - 4.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn implicit_s5_commits_and_skips_second_call() {
        let state = PatientState::new("info");
        let options = case_options();
        let generator_options = GeneratorOptions::default();
        let mut input = base_input(&state, &options, &generator_options);
        input.self_consistency = 3;
        // No fourth scripted reply: the intermediate-letter call must be skipped.
        let generator = ScriptedGenerator::new(["A", "A?", "B"]);
        let recorder = Recorder::new(None, None, None).unwrap();

        let outcome = decide(Strategy::Implicit, &generator, &input, &recorder).await.unwrap();
        assert!(!outcome.abstain);
        assert_eq!(outcome.letter_choice, LetterChoice::A);
        assert!((outcome.confidence - (2.0 / 3.0)).abs() < 1e-9);
        assert_eq!(outcome.atomic_question, None);
    }

    #[tokio::test]
    async fn binary_never_parses_defaults_to_abstain() {
        let state = PatientState::new("info");
        let options = case_options();
        let generator_options = GeneratorOptions::default();
        let mut input = base_input(&state, &options, &generator_options);
        input.self_consistency = 3;
        let generator = ScriptedGenerator::new(["gibberish", "gibberish", "gibberish", "gibberish"]);
        let recorder = Recorder::new(None, None, None).unwrap();

        let outcome = decide(Strategy::Binary, &generator, &input, &recorder).await.unwrap();
        assert!(outcome.abstain);
        assert_eq!(outcome.confidence, 0.0);
        assert_eq!(outcome.letter_choice, LetterChoice::Unparseable);
    }
}
