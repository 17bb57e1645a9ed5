// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! The data model shared by every component: [`Case`] (read-only corpus
//! entry), [`PatientState`] (the Expert's only view of the world), and
//! [`CaseResult`] (the record the batch driver appends to the output log).

use std::fmt;

use serde::{Deserialize, Serialize};

use bench_parser::Options;

/// The letter choice the Expert committed to, or the sentinel for
/// unparseable model output. Never a bare `char` on the wire: an
/// unparseable decision is a first-class outcome, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LetterChoice {
    #[serde(rename = "A")]
    A,
    #[serde(rename = "B")]
    B,
    #[serde(rename = "C")]
    C,
    #[serde(rename = "D")]
    D,
    #[serde(rename = "unparseable")]
    Unparseable,
}

impl LetterChoice {
    pub fn from_char(c: char) -> Self {
        match c.to_ascii_uppercase() {
            'A' => LetterChoice::A,
            'B' => LetterChoice::B,
            'C' => LetterChoice::C,
            'D' => LetterChoice::D,
            _ => LetterChoice::Unparseable,
        }
    }
}

impl From<bench_parser::Choice> for LetterChoice {
    fn from(choice: bench_parser::Choice) -> Self {
        match choice {
            bench_parser::Choice::Letter(c) => LetterChoice::from_char(c),
            bench_parser::Choice::Unparseable => LetterChoice::Unparseable,
        }
    }
}

impl fmt::Display for LetterChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LetterChoice::A => "A",
            LetterChoice::B => "B",
            LetterChoice::C => "C",
            LetterChoice::D => "D",
            LetterChoice::Unparseable => "unparseable",
        };
        f.write_str(s)
    }
}

/// One question/answer turn between Expert and Patient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QaPair {
    pub question: String,
    pub answer: String,
}

/// The Expert's only view of a case: never the hidden context, the
/// answer key, or the pre-decomposed facts (spec §3 invariant 6).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PatientState {
    pub initial_info: String,
    pub interaction_history: Vec<QaPair>,
}

impl PatientState {
    pub fn new(initial_info: impl Into<String>) -> Self {
        Self { initial_info: initial_info.into(), interaction_history: Vec::new() }
    }

    pub fn push(&mut self, question: impl Into<String>, answer: impl Into<String>) {
        self.interaction_history.push(QaPair { question: question.into(), answer: answer.into() });
    }

    pub fn questions(&self) -> Vec<&str> {
        self.interaction_history.iter().map(|qa| qa.question.as_str()).collect()
    }

    pub fn answers(&self) -> Vec<&str> {
        self.interaction_history.iter().map(|qa| qa.answer.as_str()).collect()
    }

    /// Formats the conversation log the way every abstention strategy's
    /// prompt skeleton expects it: `"Doctor Question: ...\nPatient Response:
    /// ..."` pairs, or the literal string `"None"` when empty.
    pub fn format_conversation_log(&self) -> String {
        if self.interaction_history.is_empty() {
            return "None".to_string();
        }
        self.interaction_history
            .iter()
            .map(|qa| format!("Doctor Question: {}\nPatient Response: {}", qa.question, qa.answer))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// One multiple-choice item plus its hidden context and answer key.
/// Immutable and read-only for the lifetime of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Case {
    pub id: String,
    pub question: String,
    pub options: Options,
    pub answer: String,
    pub answer_idx: char,
    pub context: Vec<String>,
    #[serde(default)]
    pub initial_info: Option<String>,
    #[serde(default)]
    pub atomic_facts: Option<Vec<String>>,
}

impl Case {
    /// The presenting statement shown to the Expert first: `initial_info`
    /// when set, otherwise the first context sentence, otherwise empty.
    pub fn initial_info(&self) -> String {
        self.initial_info
            .clone()
            .or_else(|| self.context.first().cloned())
            .unwrap_or_default()
    }

    pub fn options_text(&self) -> String {
        self.options
            .iter()
            .map(|(letter, text)| format!("{letter}: {text}"))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Extra fields an abstention strategy attaches to a turn for analysis
/// (confidence, usage, whether this was a forced commit, ...), recorded
/// verbatim alongside the turn's letter/question.
pub type AdditionalInfo = serde_json::Map<String, serde_json::Value>;

/// The per-case record the batch driver appends to the output log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseResult {
    pub id: String,
    pub interactive_system: InteractiveSystem,
    pub info: CaseInfo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteractiveSystem {
    pub letter_choice: LetterChoice,
    pub questions: Vec<String>,
    pub answers: Vec<String>,
    pub num_questions: usize,
    pub intermediate_choices: Vec<LetterChoice>,
    pub temp_additional_info: Vec<AdditionalInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseInfo {
    pub initial_info: String,
    pub correct_answer: String,
    pub correct_answer_idx: char,
    pub question: String,
    pub options: Options,
    pub context: Vec<String>,
    #[serde(default)]
    pub facts: Option<Vec<String>>,
}

impl CaseResult {
    /// Whether the final letter exactly matches the case's ground truth.
    pub fn is_correct(&self) -> bool {
        matches!(
            (self.interactive_system.letter_choice, self.info.correct_answer_idx.to_ascii_uppercase()),
            (LetterChoice::A, 'A') | (LetterChoice::B, 'B') | (LetterChoice::C, 'C') | (LetterChoice::D, 'D')
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patient_state_formats_empty_log_as_none() {
        assert_eq!(PatientState::new("info").format_conversation_log(), "None");
    }

    #[test]
    fn patient_state_formats_qa_pairs() {
        let mut state = PatientState::new("info");
        state.push("Any fever?", "Yes, for 3 days.");
        assert_eq!(
            state.format_conversation_log(),
            "Doctor Question: Any fever?\nPatient Response: Yes, for 3 days."
        );
    }

    #[test]
    fn case_initial_info_falls_back_to_first_context_sentence() {
        let case = Case {
            id: "1".into(),
            question: "q".into(),
            options: Options::new(),
            answer: "flu".into(),
            answer_idx: 'A',
            context: vec!["Patient has a fever.".into(), "Patient has a cough.".into()],
            initial_info: None,
            atomic_facts: None,
        };
        assert_eq!(case.initial_info(), "Patient has a fever.");
    }

    #[test]
    fn letter_choice_round_trips_through_json() {
        let json = serde_json::to_string(&LetterChoice::B).unwrap();
        assert_eq!(json, "\"B\"");
        let back: LetterChoice = serde_json::from_str(&json).unwrap();
        assert_eq!(back, LetterChoice::B);
    }

    #[test]
    fn is_correct_matches_ground_truth_letter() {
        let result = CaseResult {
            id: "1".into(),
            interactive_system: InteractiveSystem {
                letter_choice: LetterChoice::C,
                questions: vec![],
                answers: vec![],
                num_questions: 0,
                intermediate_choices: vec![LetterChoice::C],
                temp_additional_info: vec![],
            },
            info: CaseInfo {
                initial_info: "info".into(),
                correct_answer: "asthma".into(),
                correct_answer_idx: 'C',
                question: "q".into(),
                options: Options::new(),
                context: vec![],
                facts: None,
            },
        };
        assert!(result.is_correct());
    }
}
