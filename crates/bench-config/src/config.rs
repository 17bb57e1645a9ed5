// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! [`Config`] groups the flat [`Cli`] surface into the three-way split
//! the rest of the crate consumes, mirroring the surrounding crate's own
//! `Config { model, agent, tools }` grouping.

use std::path::PathBuf;

use anyhow::{bail, Context};

use crate::cli::{BackendSelector, Cli, PatientVariantName, StrategyName};

#[derive(Debug, Clone)]
pub struct RunConfig {
    pub data_dir: PathBuf,
    pub dev_filename: String,
    pub output_filename: String,
    pub max_questions: usize,
    pub log_filename: Option<String>,
    pub history_log_filename: Option<String>,
    pub detail_log_filename: Option<String>,
    pub message_log_filename: Option<String>,
    pub concurrency: usize,
}

#[derive(Debug, Clone)]
pub struct StrategyConfig {
    pub expert_class: StrategyName,
    pub expert_model: String,
    pub expert_model_question_generator: Option<String>,
    pub patient_class: PatientVariantName,
    pub patient_model: String,
    pub rationale_generation: bool,
    pub self_consistency: u32,
    pub abstain_threshold: Option<f64>,
    pub independent_modules: bool,
}

#[derive(Debug, Clone)]
pub struct SamplingConfig {
    pub backend: BackendSelector,
    pub api_account: Option<String>,
    pub base_url: Option<String>,
    pub temperature: f32,
    pub top_p: f32,
    pub max_tokens: u32,
    pub top_logprobs: u32,
    pub frequency_penalty: Option<f32>,
    pub presence_penalty: Option<f32>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub run: RunConfig,
    pub strategy: StrategyConfig,
    pub sampling: SamplingConfig,
}

impl Config {
    /// Builds a validated [`Config`] from a parsed [`Cli`]. Unknown
    /// strategy/variant names are unrepresentable (they're `ValueEnum`s);
    /// this validates the remaining class-1 configuration errors (spec §7).
    pub fn from_cli(cli: Cli) -> anyhow::Result<Self> {
        if !cli.data_dir.is_dir() {
            bail!("data_dir {} is not a directory", cli.data_dir.display());
        }
        if cli.max_questions == 0 {
            bail!("max_questions must be at least 1");
        }
        if cli.self_consistency == 0 {
            bail!("self_consistency must be at least 1");
        }
        if cli.backend == BackendSelector::BatchLocal && cli.base_url.is_none() {
            bail!("backend=batch-local requires --base-url");
        }

        let corpus_path = cli.data_dir.join(&cli.dev_filename);
        if !corpus_path.is_file() {
            bail!("corpus file {} does not exist", corpus_path.display());
        }

        tracing::debug!(
            expert_class = %cli.expert_class,
            patient_class = %cli.patient_class,
            backend = %cli.backend,
            corpus = %corpus_path.display(),
            "configuration validated"
        );

        Ok(Config {
            run: RunConfig {
                data_dir: cli.data_dir,
                dev_filename: cli.dev_filename,
                output_filename: cli.output_filename,
                max_questions: cli.max_questions,
                log_filename: cli.log_filename,
                history_log_filename: cli.history_log_filename,
                detail_log_filename: cli.detail_log_filename,
                message_log_filename: cli.message_log_filename,
                concurrency: cli.concurrency.max(1),
            },
            strategy: StrategyConfig {
                expert_class: cli.expert_class,
                expert_model: cli.expert_model,
                expert_model_question_generator: cli.expert_model_question_generator,
                patient_class: cli.patient_class,
                patient_model: cli.patient_model,
                rationale_generation: cli.rationale_generation,
                self_consistency: cli.self_consistency,
                abstain_threshold: cli.abstain_threshold,
                independent_modules: cli.independent_modules,
            },
            sampling: SamplingConfig {
                backend: cli.backend,
                api_account: cli.api_account,
                base_url: cli.base_url,
                temperature: cli.temperature,
                top_p: cli.top_p,
                max_tokens: cli.max_tokens,
                top_logprobs: cli.top_logprobs,
                frequency_penalty: cli.frequency_penalty,
                presence_penalty: cli.presence_penalty,
            },
        })
    }

    pub fn corpus_path(&self) -> PathBuf {
        self.run.data_dir.join(&self.run.dev_filename)
    }

    pub fn output_path(&self) -> anyhow::Result<PathBuf> {
        let path = self.run.data_dir.join(&self.run.output_filename);
        path.parent()
            .map(|_| ())
            .context("output_filename has no parent directory")?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn base_args(data_dir: &std::path::Path) -> Vec<String> {
        vec![
            "mediq-bench".to_string(),
            "--expert-model".to_string(),
            "gpt-4o".to_string(),
            "--patient-model".to_string(),
            "gpt-4o".to_string(),
            "--data-dir".to_string(),
            data_dir.display().to_string(),
        ]
    }

    #[test]
    fn rejects_missing_data_dir() {
        let cli = Cli::parse_from(base_args(std::path::Path::new("/nonexistent/dir/xyz")));
        assert!(Config::from_cli(cli).is_err());
    }

    #[test]
    fn rejects_missing_corpus_file() {
        let dir = tempfile::tempdir().unwrap();
        let cli = Cli::parse_from(base_args(dir.path()));
        assert!(Config::from_cli(cli).is_err());
    }

    #[test]
    fn accepts_valid_config() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("dev.jsonl"), "").unwrap();
        let cli = Cli::parse_from(base_args(dir.path()));
        let config = Config::from_cli(cli).unwrap();
        assert_eq!(config.run.max_questions, 30);
        assert_eq!(config.sampling.temperature, 0.6);
    }

    #[test]
    fn rejects_batch_local_without_base_url() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("dev.jsonl"), "").unwrap();
        let mut args = base_args(dir.path());
        args.push("--backend".to_string());
        args.push("batch-local".to_string());
        let cli = Cli::parse_from(args);
        assert!(Config::from_cli(cli).is_err());
    }
}
