// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Command-line surface (spec §6/§6a). `Cli` carries every documented
//! flag as a typed field; [`Config::from_cli`] groups them into the
//! three sub-configs the rest of the crate consumes.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};

/// Which abstention strategy drives the Expert (spec §4.4).
///
/// Named after the original `--expert_class` flag: in the source system
/// this selected a dynamically-loaded class; here it selects an entry in
/// an internal registry (spec §9 Design Notes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyName {
    Fixed,
    Implicit,
    Binary,
    Numerical,
    Numcutoff,
    Scale,
}

impl std::fmt::Display for StrategyName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            StrategyName::Fixed => "fixed",
            StrategyName::Implicit => "implicit",
            StrategyName::Binary => "binary",
            StrategyName::Numerical => "numerical",
            StrategyName::Numcutoff => "numcutoff",
            StrategyName::Scale => "scale",
        };
        f.write_str(s)
    }
}

/// Which responding variant drives the Patient (spec §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatientVariantName {
    Random,
    Direct,
    Instruct,
    FactSelect,
}

impl std::fmt::Display for PatientVariantName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PatientVariantName::Random => "random",
            PatientVariantName::Direct => "direct",
            PatientVariantName::Instruct => "instruct",
            PatientVariantName::FactSelect => "fact_select",
        };
        f.write_str(s)
    }
}

/// Which generation backend serves a given run (spec §4.1, §9a).
///
/// Collapses the original `use_vllm`/`use_api` pair of independently
/// settable flags into one mutually exclusive choice — see DESIGN.md.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendSelector {
    /// Hosted chat API, e.g. OpenAI.
    Remote,
    /// Local batch-inference server (vLLM or compatible).
    BatchLocal,
    /// Local single-shot inference server, used as fallback.
    SingleShot,
}

impl std::fmt::Display for BackendSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BackendSelector::Remote => "remote",
            BackendSelector::BatchLocal => "batch-local",
            BackendSelector::SingleShot => "single-shot",
        };
        f.write_str(s)
    }
}

/// Full command-line surface (spec §6).
#[derive(Debug, Clone, Parser)]
#[command(name = "mediq-bench", version, about = "Interactive clinical QA benchmark")]
pub struct Cli {
    /// Vestigial module identifier kept for config-surface compatibility;
    /// dispatch is by `expert_class` against an internal registry.
    #[arg(long, default_value = "expert")]
    pub expert_module: String,

    /// Which abstention strategy the Expert uses.
    #[arg(long, value_enum, default_value_t = StrategyName::Fixed)]
    pub expert_class: StrategyName,

    /// Model identifier used for the Expert's decision calls.
    #[arg(long, env = "MEDIQ_EXPERT_MODEL")]
    pub expert_model: String,

    /// Model identifier used for question generation, if different from `expert_model`.
    #[arg(long)]
    pub expert_model_question_generator: Option<String>,

    /// Vestigial module identifier kept for config-surface compatibility;
    /// dispatch is by `patient_class` against an internal registry.
    #[arg(long, default_value = "patient")]
    pub patient_module: String,

    /// Which responding variant the Patient uses.
    #[arg(long, value_enum, default_value_t = PatientVariantName::Instruct)]
    pub patient_class: PatientVariantName,

    /// Model identifier used for the Patient's response calls.
    #[arg(long, env = "MEDIQ_PATIENT_MODEL")]
    pub patient_model: String,

    /// Directory containing the corpus file.
    #[arg(long)]
    pub data_dir: PathBuf,

    /// Corpus filename, resolved relative to `data_dir`.
    #[arg(long, default_value = "dev.jsonl")]
    pub dev_filename: String,

    /// Output log filename; appended to, not truncated.
    #[arg(long, default_value = "output.jsonl")]
    pub output_filename: String,

    /// Maximum follow-up questions per case before a forced commit.
    #[arg(long, default_value_t = 30)]
    pub max_questions: usize,

    /// Operational log filename (tracing output mirror); unset disables file logging.
    #[arg(long)]
    pub log_filename: Option<String>,

    /// Full message lists at each stage, one JSON object per event.
    #[arg(long)]
    pub history_log_filename: Option<String>,

    /// Parser decisions and per-sample outcomes, one JSON object per event.
    #[arg(long)]
    pub detail_log_filename: Option<String>,

    /// Raw backend request/response pairs, one JSON object per event.
    #[arg(long)]
    pub message_log_filename: Option<String>,

    /// Ask the model to emit a REASON: line before its decision.
    #[arg(long, default_value_t = false)]
    pub rationale_generation: bool,

    /// Number of self-consistency samples per decision prompt.
    #[arg(long, default_value_t = 1)]
    pub self_consistency: u32,

    /// Abstention threshold; meaning depends on strategy (NumCutOff: probability, Scale: Likert level).
    #[arg(long)]
    pub abstain_threshold: Option<f64>,

    /// Build question-generation prompts from a fresh skeleton instead of
    /// extending the abstention-decision messages.
    #[arg(long, default_value_t = false)]
    pub independent_modules: bool,

    /// Which generation backend to use.
    #[arg(long, value_enum, default_value_t = BackendSelector::Remote)]
    pub backend: BackendSelector,

    /// Named account/credential set for the remote backend.
    #[arg(long, env = "MEDIQ_API_ACCOUNT")]
    pub api_account: Option<String>,

    /// Base URL for the batch-local or single-shot backend.
    #[arg(long)]
    pub base_url: Option<String>,

    #[arg(long, default_value_t = 0.6)]
    pub temperature: f32,

    #[arg(long, default_value_t = 0.9)]
    pub top_p: f32,

    #[arg(long, default_value_t = 256)]
    pub max_tokens: u32,

    #[arg(long, default_value_t = 0)]
    pub top_logprobs: u32,

    #[arg(long)]
    pub frequency_penalty: Option<f32>,

    #[arg(long)]
    pub presence_penalty: Option<f32>,

    /// Maximum concurrent cases processed by the batch driver.
    #[arg(long, default_value_t = 4)]
    pub concurrency: usize,
}
