// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! The Turn Controller (C7): runs one case, alternating Expert and
//! Patient turns, enforcing the turn budget, and forcing a committed
//! answer on timeout.

use bench_core::{
    Case, CaseInfo, CaseResult, Expert, ExpertConfig, ExpertResponse, InteractiveSystem, Patient, PatientState,
    PatientVariant,
};
use bench_model::{Generator, Recorder};
use serde_json::json;

/// Outcome of one case run, with the bookkeeping the batch driver needs
/// beyond the raw [`CaseResult`].
pub struct CaseOutcome {
    pub result: CaseResult,
    pub forced_commit: bool,
    pub correct: bool,
}

/// Run one case to completion (spec §4.7).
pub async fn run_case(
    case: &Case,
    expert_generator: &dyn Generator,
    patient_generator: &dyn Generator,
    expert_config: ExpertConfig,
    patient_variant: PatientVariant,
    patient_generator_options: bench_model::GeneratorOptions,
    recorder: &Recorder,
) -> anyhow::Result<CaseOutcome> {
    let max_questions = expert_config.max_questions;
    let expert = Expert::new(case.question.clone(), case.options.clone(), expert_config);
    let patient = Patient::new(
        patient_variant,
        case.initial_info(),
        case.context.clone(),
        case.atomic_facts.clone(),
        patient_generator_options,
    );

    let mut patient_state = PatientState::new(case.initial_info());
    let mut questions = Vec::new();
    let mut answers = Vec::new();
    let mut intermediate_choices = Vec::new();
    let mut temp_additional_info = Vec::new();
    let mut final_letter = None;

    while patient_state.interaction_history.len() < max_questions {
        let response = expert.respond(expert_generator, &patient_state, recorder).await?;
        recorder
            .log_history(json!({"case_id": case.id, "turn": questions.len(), "stage": "expert"}))
            .await?;

        match response {
            ExpertResponse::Question { question, letter_choice, confidence, usage } => {
                temp_additional_info.push(json!({
                    "confidence": confidence,
                    "input_tokens": usage.input_tokens,
                    "output_tokens": usage.output_tokens,
                    "forced_commit": false,
                }));
                intermediate_choices.push(letter_choice);

                let patient_response = patient.respond(patient_generator, &question, recorder).await?;
                recorder
                    .log_history(json!({"case_id": case.id, "turn": questions.len(), "stage": "patient"}))
                    .await?;
                recorder
                    .log_detail(json!({
                        "case_id": case.id,
                        "turn": questions.len(),
                        "intermediate_choice": letter_choice.to_string(),
                        "confidence": confidence,
                    }))
                    .await?;

                patient_state.push(question.clone(), patient_response.text.clone());
                questions.push(question);
                answers.push(patient_response.text);
            }
            ExpertResponse::Choice { letter_choice, confidence, usage } => {
                temp_additional_info.push(json!({
                    "confidence": confidence,
                    "input_tokens": usage.input_tokens,
                    "output_tokens": usage.output_tokens,
                    "forced_commit": false,
                }));
                intermediate_choices.push(letter_choice);
                final_letter = Some(letter_choice);
                break;
            }
        }
    }

    let forced_commit = final_letter.is_none();
    let final_letter = match final_letter {
        Some(letter) => letter,
        None => {
            let response = expert.respond(expert_generator, &patient_state, recorder).await?;
            let letter = response.letter_choice();
            temp_additional_info.push(json!({
                "confidence": response.confidence(),
                "input_tokens": response.usage().input_tokens,
                "output_tokens": response.usage().output_tokens,
                "forced_commit": true,
            }));
            intermediate_choices.push(letter);
            letter
        }
    };

    let num_questions = questions.len();
    let result = CaseResult {
        id: case.id.clone(),
        interactive_system: InteractiveSystem {
            letter_choice: final_letter,
            questions,
            answers,
            num_questions,
            intermediate_choices,
            temp_additional_info,
        },
        info: CaseInfo {
            initial_info: case.initial_info(),
            correct_answer: case.answer.clone(),
            correct_answer_idx: case.answer_idx,
            question: case.question.clone(),
            options: case.options.clone(),
            context: case.context.clone(),
            facts: case.atomic_facts.clone(),
        },
    };
    let correct = result.is_correct();

    Ok(CaseOutcome { result, forced_commit, correct })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bench_core::LetterChoice;
    use bench_model::{GeneratorOptions, ScriptedGenerator};
    use std::collections::BTreeMap;

    fn case() -> Case {
        let mut options = BTreeMap::new();
        options.insert('A', "flu".to_string());
        options.insert('B', "pneumonia".to_string());
        Case {
            id: "1".into(),
            question: "Diagnosis?".into(),
            options,
            answer: "flu".into(),
            answer_idx: 'A',
            context: vec!["Patient has a fever.".into(), "Patient has a cough.".into()],
            initial_info: None,
            atomic_facts: None,
        }
    }

    fn expert_config(strategy: bench_core::Strategy, max_questions: usize) -> ExpertConfig {
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
    async fn s1_fixed_forces_commit_after_budget() {
        let case = case();
        // Two question turns (abstain while below budget), then a forced commit.
        let expert_generator = ScriptedGenerator::new([
            "A", // intermediate letter, turn 1
            "What is your temperature?",
            "A", // intermediate letter, turn 2
            "Any cough?",
            "A", // forced commit
        ]);
        let patient_generator = ScriptedGenerator::new(["Yes, 101F.", "Yes, for 3 days."]);
        let recorder = Recorder::new(None, None, None).unwrap();

        let outcome = run_case(
            &case,
            &expert_generator,
            &patient_generator,
            expert_config(bench_core::Strategy::Fixed, 2),
            bench_core::PatientVariant::Direct,
            GeneratorOptions::default(),
            &recorder,
        )
        .await
        .unwrap();

        assert_eq!(outcome.result.interactive_system.num_questions, 2);
        assert_eq!(outcome.result.interactive_system.intermediate_choices.len(), 3);
        assert!(outcome.forced_commit);
        assert_eq!(outcome.result.interactive_system.letter_choice, LetterChoice::A);
    }
}
