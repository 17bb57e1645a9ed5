// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Self-consistency aggregation (C3): run a decision prompt N times and
//! fuse the samples into one verdict. Samples are collected strictly in
//! call order — ties in majority/modal selection are broken by first
//! occurrence in that order, per spec §5.

use bench_model::{Generator, GeneratorOptions, LogProbs, Message, Recorder, Usage};
use bench_parser::{
    parse_atomic_question, parse_choice, parse_confidence_score, parse_likert_scale, parse_yes_no, Choice, Options,
    YesNo,
};

use crate::model::LetterChoice;

/// Which shape of decision this aggregation run is fusing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    /// Either a letter choice or a follow-up question (Implicit strategy).
    ChoiceOrQuestion,
    YesNo,
    Numerical,
    Scale,
    /// Single-shot letter choice (the intermediate-answer call every strategy makes).
    Choice,
    /// Single-shot follow-up question (question generation).
    Question,
}

/// Fused result of one aggregation run. Only the fields relevant to
/// `kind` are populated; the rest are `None`/defaults.
#[derive(Debug, Clone, Default)]
pub struct AggregateOutcome {
    pub usage: Usage,
    pub response_text: String,
    pub logprobs: Option<LogProbs>,
    pub confidence: f64,
    pub letter_choice: Option<LetterChoice>,
    pub atomic_question: Option<String>,
    pub yes_no: Option<YesNo>,
    /// Mean probability (Numerical) or mean Likert level (Scale).
    pub score: Option<f64>,
}

/// Run `generator` against `messages` and fuse `n` samples per `kind`.
///
/// `n` is ignored (treated as 1) for [`Kind::Choice`] and [`Kind::Question`]
/// per spec §4.3 — those always run exactly once.
pub async fn run(
    generator: &dyn Generator,
    messages: &[Message],
    kind: Kind,
    n: u32,
    options: &GeneratorOptions,
    case_options: &Options,
    recorder: &Recorder,
) -> anyhow::Result<AggregateOutcome> {
    match kind {
        Kind::ChoiceOrQuestion => choice_or_question(generator, messages, n, options, case_options, recorder).await,
        Kind::YesNo => yes_no(generator, messages, n, options, recorder).await,
        Kind::Numerical => numerical(generator, messages, n, options, recorder).await,
        Kind::Scale => scale(generator, messages, n, options, recorder).await,
        Kind::Choice => choice_only(generator, messages, options, case_options, recorder).await,
        Kind::Question => question_only(generator, messages, options, recorder).await,
    }
}

/// Runs one generator call, retrying once on failure, and mirrors the raw
/// request/response pair to the message log (spec §6b) regardless of outcome.
async fn sample_once(
    generator: &dyn Generator,
    messages: &[Message],
    options: &GeneratorOptions,
    recorder: &Recorder,
) -> anyhow::Result<(String, Option<LogProbs>, Usage)> {
    let log_call = |attempt: u32, outcome: &Result<(String, Option<LogProbs>, Usage), String>| {
        let (response_text, error) = match outcome {
            Ok((text, _, _)) => (Some(text.as_str()), None),
            Err(err) => (None, Some(err.as_str())),
        };
        serde_json::json!({
            "model": generator.model_name(),
            "attempt": attempt,
            "request": messages,
            "response": response_text,
            "error": error,
        })
    };

    match generator.generate(messages, options).await {
        Ok(result) => {
            let sample = (result.text, result.logprobs, result.usage);
            recorder.log_message(log_call(1, &Ok(sample.clone()))).await?;
            Ok(sample)
        }
        Err(err) => {
            recorder.log_message(log_call(1, &Err(err.to_string()))).await?;
            tracing::warn!(error = %err, "generator call failed, retrying once");
            match generator.generate(messages, options).await {
                Ok(result) => {
                    let sample = (result.text, result.logprobs, result.usage);
                    recorder.log_message(log_call(2, &Ok(sample.clone()))).await?;
                    Ok(sample)
                }
                Err(err) => {
                    recorder.log_message(log_call(2, &Err(err.to_string()))).await?;
                    tracing::error!(error = %err, "generator call failed twice, using empty response");
                    Ok((String::new(), None, Usage::default()))
                }
            }
        }
    }
}

async fn choice_or_question(
    generator: &dyn Generator,
    messages: &[Message],
    n: u32,
    options: &GeneratorOptions,
    case_options: &Options,
    recorder: &Recorder,
) -> anyhow::Result<AggregateOutcome> {
    let mut total_usage = Usage::default();
    let mut answers: Vec<(char, String, Option<LogProbs>)> = Vec::new();
    let mut questions: Vec<(String, String)> = Vec::new();

    for _ in 0..n.max(1) {
        let (text, logprobs, usage) = sample_once(generator, messages, options, recorder).await?;
        total_usage.add(usage);
        if text.is_empty() {
            continue;
        }
        if text.contains('?') {
            if let Some(question) = parse_atomic_question(&text) {
                questions.push((question, text));
            }
        } else if let Choice::Letter(letter) = parse_choice(&text, case_options) {
            answers.push((letter, text, logprobs));
        }
    }

    if answers.is_empty() && questions.is_empty() {
        return Ok(AggregateOutcome {
            usage: total_usage,
            response_text: "No response.".to_string(),
            confidence: 0.0,
            letter_choice: Some(LetterChoice::Unparseable),
            ..Default::default()
        });
    }

    let confidence = answers.len() as f64 / (answers.len() + questions.len()) as f64;

    if answers.len() > questions.len() {
        let letters: Vec<char> = answers.iter().map(|(c, _, _)| *c).collect();
        let winner = modal_first_occurrence(&letters);
        let (_, response_text, logprobs) =
            answers.iter().find(|(c, _, _)| *c == winner).cloned().expect("winner came from answers");
        Ok(AggregateOutcome {
            usage: total_usage,
            response_text,
            logprobs,
            confidence,
            letter_choice: Some(LetterChoice::from_char(winner)),
            atomic_question: None,
            ..Default::default()
        })
    } else {
        let idx = (rand::random::<u32>() as usize) % questions.len();
        let (question, response_text) = questions[idx].clone();
        Ok(AggregateOutcome {
            usage: total_usage,
            response_text,
            logprobs: None,
            confidence,
            letter_choice: None,
            atomic_question: Some(question),
            ..Default::default()
        })
    }
}

fn modal_first_occurrence(items: &[char]) -> char {
    let mut counts = std::collections::HashMap::new();
    for c in items {
        *counts.entry(*c).or_insert(0usize) += 1;
    }
    let max_count = counts.values().copied().max().unwrap_or(0);
    *items.iter().find(|c| counts[c] == max_count).expect("items is non-empty")
}

async fn yes_no(
    generator: &dyn Generator,
    messages: &[Message],
    n: u32,
    options: &GeneratorOptions,
    recorder: &Recorder,
) -> anyhow::Result<AggregateOutcome> {
    let mut total_usage = Usage::default();
    let mut votes: Vec<YesNo> = Vec::new();
    let mut texts: Vec<String> = Vec::new();
    let mut logprobs_list: Vec<Option<LogProbs>> = Vec::new();

    for _ in 0..n.max(1) {
        let (text, logprobs, usage) = sample_once(generator, messages, options, recorder).await?;
        total_usage.add(usage);
        votes.push(parse_yes_no(&text));
        texts.push(text);
        logprobs_list.push(logprobs);
    }

    let yes_count = votes.iter().filter(|v| **v == YesNo::Yes).count();
    let no_count = votes.len() - yes_count;
    let winner = if yes_count > no_count { YesNo::Yes } else { YesNo::No };
    let winner_idx = votes.iter().position(|v| *v == winner).unwrap_or(0);

    Ok(AggregateOutcome {
        usage: total_usage,
        response_text: texts.into_iter().nth(winner_idx).unwrap_or_default(),
        logprobs: logprobs_list.into_iter().nth(winner_idx).flatten(),
        confidence: yes_count as f64 / votes.len() as f64,
        yes_no: Some(winner),
        ..Default::default()
    })
}

async fn numerical(
    generator: &dyn Generator,
    messages: &[Message],
    n: u32,
    options: &GeneratorOptions,
    recorder: &Recorder,
) -> anyhow::Result<AggregateOutcome> {
    let mut total_usage = Usage::default();
    let mut scores: Vec<f64> = Vec::new();
    let mut texts: Vec<String> = Vec::new();
    let mut logprobs_list: Vec<Option<LogProbs>> = Vec::new();

    for _ in 0..n.max(1) {
        let (text, logprobs, usage) = sample_once(generator, messages, options, recorder).await?;
        total_usage.add(usage);
        scores.push(parse_confidence_score(&text));
        texts.push(text);
        logprobs_list.push(logprobs);
    }

    let mean = scores.iter().sum::<f64>() / scores.len() as f64;
    let closest_idx = closest_to_mean(&scores, mean);

    Ok(AggregateOutcome {
        usage: total_usage,
        response_text: texts.into_iter().nth(closest_idx).unwrap_or_default(),
        logprobs: logprobs_list.into_iter().nth(closest_idx).flatten(),
        confidence: mean,
        score: Some(mean),
        ..Default::default()
    })
}

async fn scale(
    generator: &dyn Generator,
    messages: &[Message],
    n: u32,
    options: &GeneratorOptions,
    recorder: &Recorder,
) -> anyhow::Result<AggregateOutcome> {
    let mut total_usage = Usage::default();
    let mut scores: Vec<f64> = Vec::new();
    let mut texts: Vec<String> = Vec::new();
    let mut logprobs_list: Vec<Option<LogProbs>> = Vec::new();

    for _ in 0..n.max(1) {
        let (text, logprobs, usage) = sample_once(generator, messages, options, recorder).await?;
        total_usage.add(usage);
        scores.push(parse_likert_scale(&text) as f64);
        texts.push(text);
        logprobs_list.push(logprobs);
    }

    let mean = scores.iter().sum::<f64>() / scores.len() as f64;
    let closest_idx = closest_to_mean(&scores, mean);

    Ok(AggregateOutcome {
        usage: total_usage,
        response_text: texts.into_iter().nth(closest_idx).unwrap_or_default(),
        logprobs: logprobs_list.into_iter().nth(closest_idx).flatten(),
        confidence: mean,
        score: Some(mean),
        ..Default::default()
    })
}

fn closest_to_mean(scores: &[f64], mean: f64) -> usize {
    scores
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| (**a - mean).abs().partial_cmp(&(**b - mean).abs()).unwrap())
        .map(|(idx, _)| idx)
        .unwrap_or(0)
}

async fn choice_only(
    generator: &dyn Generator,
    messages: &[Message],
    options: &GeneratorOptions,
    case_options: &Options,
    recorder: &Recorder,
) -> anyhow::Result<AggregateOutcome> {
    let (text, logprobs, usage) = sample_once(generator, messages, options, recorder).await?;
    let choice = parse_choice(&text, case_options);
    let confidence = if matches!(choice, Choice::Letter(_)) { 1.0 } else { 0.0 };
    Ok(AggregateOutcome {
        usage,
        response_text: text,
        logprobs,
        confidence,
        letter_choice: Some(choice.into()),
        ..Default::default()
    })
}

async fn question_only(
    generator: &dyn Generator,
    messages: &[Message],
    options: &GeneratorOptions,
    recorder: &Recorder,
) -> anyhow::Result<AggregateOutcome> {
    let (text, logprobs, usage) = sample_once(generator, messages, options, recorder).await?;
    let question = parse_atomic_question(&text);
    let confidence = if question.is_some() { 1.0 } else { 0.0 };
    Ok(AggregateOutcome {
        usage,
        response_text: text,
        logprobs,
        confidence,
        atomic_question: question,
        ..Default::default()
    })
}
