// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! The Batch Driver (C8): loads a corpus, resumes a prior run by case id,
//! and fans cases out across a bounded pool of concurrent workers.

use std::collections::HashSet;
use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use bench_config::{BackendSelector, Config, PatientVariantName, StrategyName};
use bench_core::{Case, CaseResult, ExpertConfig, PatientVariant, Strategy};
use bench_model::{BackendConfig, BackendSelection, GeneratorCache, GeneratorOptions, Recorder};
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;

use crate::corpus::load_corpus;
use crate::turn_controller;

/// Running totals across a batch run, seeded from any cases already
/// present in the output log when resuming (spec §5, §8 property S6).
#[derive(Debug, Clone, Default)]
pub struct Stats {
    pub total: usize,
    pub correct: usize,
    pub forced_commits: usize,
    pub total_questions: usize,
}

impl Stats {
    pub fn accuracy(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.correct as f64 / self.total as f64
        }
    }

    pub fn forced_commit_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.forced_commits as f64 / self.total as f64
        }
    }

    pub fn avg_questions(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.total_questions as f64 / self.total as f64
        }
    }

    fn record(&mut self, outcome: &turn_controller::CaseOutcome) {
        self.total += 1;
        if outcome.correct {
            self.correct += 1;
        }
        if outcome.forced_commit {
            self.forced_commits += 1;
        }
        self.total_questions += outcome.result.interactive_system.num_questions;
    }
}

fn strategy_name_to_strategy(name: StrategyName) -> Strategy {
    match name {
        StrategyName::Fixed => Strategy::Fixed,
        StrategyName::Implicit => Strategy::Implicit,
        StrategyName::Binary => Strategy::Binary,
        StrategyName::Numerical => Strategy::Numerical,
        StrategyName::Numcutoff => Strategy::NumCutOff,
        StrategyName::Scale => Strategy::Scale,
    }
}

fn patient_variant_name_to_variant(name: PatientVariantName) -> PatientVariant {
    match name {
        PatientVariantName::Random => PatientVariant::Random,
        PatientVariantName::Direct => PatientVariant::Direct,
        PatientVariantName::Instruct => PatientVariant::Instruct,
        PatientVariantName::FactSelect => PatientVariant::FactSelect,
    }
}

fn backend_selector_to_selection(selector: BackendSelector) -> BackendSelection {
    match selector {
        BackendSelector::Remote => BackendSelection::Remote,
        BackendSelector::BatchLocal => BackendSelection::BatchLocal,
        BackendSelector::SingleShot => BackendSelection::SingleShot,
    }
}

/// Case ids already recorded in an existing output log, and the [`Stats`]
/// they contribute, so a restarted run neither re-answers nor double-counts
/// them (spec §8 property S6).
fn resume_state(path: &Path) -> anyhow::Result<(HashSet<String>, Stats)> {
    let mut seen = HashSet::new();
    let mut stats = Stats::default();

    if !path.is_file() {
        return Ok((seen, stats));
    }

    let file = std::fs::File::open(path).with_context(|| format!("opening output log {}", path.display()))?;
    for (line_no, line) in BufReader::new(file).lines().enumerate() {
        let line = line.with_context(|| format!("reading output log {} at line {}", path.display(), line_no + 1))?;
        if line.trim().is_empty() {
            continue;
        }
        let result: CaseResult = serde_json::from_str(&line)
            .with_context(|| format!("parsing output log {} at line {}", path.display(), line_no + 1))?;
        seen.insert(result.id.clone());
        stats.total += 1;
        if result.is_correct() {
            stats.correct += 1;
        }
        stats.total_questions += result.interactive_system.num_questions;
    }

    Ok((seen, stats))
}

/// Run every case in the configured corpus not already present in the
/// output log, writing each [`CaseResult`] as it completes.
pub async fn run(config: &Config, recorder: Arc<Recorder>) -> anyhow::Result<Stats> {
    let corpus = load_corpus(&config.corpus_path())?;
    let output_path = config.output_path()?;
    let (seen, mut stats) = resume_state(&output_path)?;

    let pending: Vec<Case> = corpus.into_iter().filter(|case| !seen.contains(&case.id)).collect();
    tracing::info!(total = pending.len(), skipped = seen.len(), "starting batch run");

    let output_file = OpenOptions::new()
        .append(true)
        .create(true)
        .open(&output_path)
        .with_context(|| format!("opening output log {}", output_path.display()))?;
    let output = Arc::new(Mutex::new(output_file));

    let expert_cache = Arc::new(GeneratorCache::new());
    let patient_cache = Arc::new(GeneratorCache::new());
    let backend = backend_selector_to_selection(config.sampling.backend);

    // `expert_model_question_generator` selects a distinct model for
    // question-generation prompts; the Expert facade currently drives both
    // the abstention decision and its question-generation call through one
    // `Generator`, so the two resolve to the same cached instance here (see
    // DESIGN.md).
    let expert_model = config
        .strategy
        .expert_model_question_generator
        .clone()
        .unwrap_or_else(|| config.strategy.expert_model.clone());
    let expert_backend_cfg = BackendConfig {
        model: expert_model.clone(),
        base_url: config.sampling.base_url.clone(),
        api_key: config.sampling.api_account.clone(),
    };
    let patient_backend_cfg = BackendConfig {
        model: config.strategy.patient_model.clone(),
        base_url: config.sampling.base_url.clone(),
        api_key: config.sampling.api_account.clone(),
    };

    let expert_generator = expert_cache.get_or_build(&expert_model, backend, &expert_backend_cfg).await?;
    let patient_generator =
        patient_cache.get_or_build(&config.strategy.patient_model, backend, &patient_backend_cfg).await?;

    let generator_options = GeneratorOptions {
        temperature: config.sampling.temperature,
        max_tokens: config.sampling.max_tokens,
        top_p: config.sampling.top_p,
        top_logprobs: config.sampling.top_logprobs,
        frequency_penalty: config.sampling.frequency_penalty,
        presence_penalty: config.sampling.presence_penalty,
    };

    let expert_config = ExpertConfig {
        strategy: strategy_name_to_strategy(config.strategy.expert_class),
        rationale_generation: config.strategy.rationale_generation,
        self_consistency: config.strategy.self_consistency,
        abstain_threshold: config.strategy.abstain_threshold,
        max_questions: config.run.max_questions,
        independent_modules: config.strategy.independent_modules,
        generator_options: generator_options.clone(),
    };
    let patient_variant = patient_variant_name_to_variant(config.strategy.patient_class);

    let semaphore = Arc::new(Semaphore::new(config.run.concurrency.max(1)));
    let mut tasks = JoinSet::new();

    for case in pending {
        let semaphore = Arc::clone(&semaphore);
        let expert_generator = Arc::clone(&expert_generator);
        let patient_generator = Arc::clone(&patient_generator);
        let expert_config = expert_config.clone();
        let patient_generator_options = generator_options.clone();
        let recorder = Arc::clone(&recorder);
        let output = Arc::clone(&output);

        tasks.spawn(async move {
            let _permit = semaphore.acquire_owned().await.expect("semaphore never closes");
            let outcome = turn_controller::run_case(
                &case,
                expert_generator.as_ref(),
                patient_generator.as_ref(),
                expert_config,
                patient_variant,
                patient_generator_options,
                recorder.as_ref(),
            )
            .await?;

            let line = serde_json::to_string(&outcome.result).context("serializing case result")?;
            {
                let mut file = output.lock().await;
                writeln!(file, "{line}").context("appending case result")?;
            }
            anyhow::Ok(outcome)
        });
    }

    while let Some(joined) = tasks.join_next().await {
        match joined.context("case task panicked")? {
            Ok(outcome) => {
                stats.record(&outcome);
                tracing::info!(id = %outcome.result.id, correct = outcome.correct, "case complete");
            }
            Err(err) => {
                tracing::error!(error = %err, "case failed");
            }
        }
    }

    Ok(stats)
}
