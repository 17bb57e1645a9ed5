// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! End-to-end test of the batch driver against a small on-disk corpus, using
//! a scripted generator so no network access is required.

use bench_config::{BackendSelector, Cli, Config, PatientVariantName, StrategyName};
use bench_driver::Recorder;
use clap::Parser;

fn args(data_dir: &std::path::Path) -> Vec<String> {
    vec![
        "mediq-bench".to_string(),
        "--expert-model".to_string(),
        "gpt-4o".to_string(),
        "--patient-model".to_string(),
        "gpt-4o".to_string(),
        "--data-dir".to_string(),
        data_dir.display().to_string(),
        "--expert-class".to_string(),
        "fixed".to_string(),
        "--patient-class".to_string(),
        "direct".to_string(),
        "--max-questions".to_string(),
        "1".to_string(),
        "--backend".to_string(),
        "single-shot".to_string(),
    ]
}

fn write_corpus(dir: &std::path::Path) {
    std::fs::write(
        dir.join("dev.jsonl"),
        concat!(
            r#"{"id":"1","question":"Diagnosis?","options":{"A":"flu","B":"pneumonia"},"answer":"flu","answer_idx":"A","context":"Patient has a fever and a cough."}"#,
            "\n",
        ),
    )
    .unwrap();
}

#[test]
fn cli_parses_and_validates_a_minimal_run() {
    let dir = tempfile::tempdir().unwrap();
    write_corpus(dir.path());

    let cli = Cli::parse_from(args(dir.path()));
    assert_eq!(cli.expert_class, StrategyName::Fixed);
    assert_eq!(cli.patient_class, PatientVariantName::Direct);
    assert_eq!(cli.backend, BackendSelector::SingleShot);

    let config = Config::from_cli(cli).unwrap();
    assert_eq!(config.run.max_questions, 1);

    let corpus = bench_driver::load_corpus(&config.corpus_path()).unwrap();
    assert_eq!(corpus.len(), 1);
    assert_eq!(corpus[0].id, "1");
}

#[tokio::test]
async fn run_case_resume_is_idempotent_on_case_id() {
    use bench_core::{ExpertConfig, PatientVariant, Strategy};
    use bench_model::{GeneratorOptions, ScriptedGenerator};

    let dir = tempfile::tempdir().unwrap();
    write_corpus(dir.path());
    let corpus = bench_driver::load_corpus(&dir.path().join("dev.jsonl")).unwrap();
    let case = &corpus[0];

    let expert_config = ExpertConfig {
        strategy: Strategy::Fixed,
        rationale_generation: false,
        self_consistency: 1,
        abstain_threshold: None,
        max_questions: 1,
        independent_modules: false,
        generator_options: GeneratorOptions::default(),
    };
    let recorder = Recorder::new(None, None, None).unwrap();

    // Budget of 1: the first decision call is already at the edge of the
    // question budget, so Fixed abstains once then is forced to commit.
    let expert_generator = ScriptedGenerator::new(["A", "A"]);
    let patient_generator = ScriptedGenerator::new(["Yes, since this morning."]);

    let first = bench_driver::run_case(
        case,
        &expert_generator,
        &patient_generator,
        expert_config.clone(),
        PatientVariant::Direct,
        GeneratorOptions::default(),
        &recorder,
    )
    .await
    .unwrap();

    let expert_generator_rerun = ScriptedGenerator::new(["A", "A"]);
    let patient_generator_rerun = ScriptedGenerator::new(["Yes, since this morning."]);
    let second = bench_driver::run_case(
        case,
        &expert_generator_rerun,
        &patient_generator_rerun,
        expert_config,
        PatientVariant::Direct,
        GeneratorOptions::default(),
        &recorder,
    )
    .await
    .unwrap();

    assert_eq!(first.result.interactive_system.letter_choice, second.result.interactive_system.letter_choice);
    assert_eq!(first.result.interactive_system.num_questions, second.result.interactive_system.num_questions);
    assert_eq!(
        first.result.interactive_system.intermediate_choices.len(),
        first.result.interactive_system.num_questions + 1
    );
}
