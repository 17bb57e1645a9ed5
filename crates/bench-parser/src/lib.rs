// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Pure, deterministic functions that turn free-form model text into a
//! structured decision. None of these ever panic or perform I/O; an
//! unparseable input produces a conservative default and a logged warning,
//! never an error.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;

/// The four labeled candidate answers, in presentation order.
pub type Options = BTreeMap<char, String>;

/// Result of [`parse_choice`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Choice {
    Letter(char),
    Unparseable,
}

impl Choice {
    pub fn letter(self) -> Option<char> {
        match self {
            Choice::Letter(c) => Some(c),
            Choice::Unparseable => None,
        }
    }
}

/// Result of [`parse_yes_no`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum YesNo {
    Yes,
    No,
}

fn punctuation_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[,.;@#()?!'/&:$]+\s*").unwrap())
}

fn confidence_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d+\.\d+").unwrap())
}

/// Extract the letter choice implied by free-form `text`.
///
/// Tries, in order: option-text appearing (case-insensitively) in any
/// response line; a standalone `{A,B,C,D}` token after stripping
/// punctuation; the entire trimmed response when it is exactly one such
/// letter. Falls back to [`Choice::Unparseable`].
pub fn parse_choice(text: &str, options: &Options) -> Choice {
    for line in text.lines() {
        let line_lower = line.to_lowercase();
        for (letter, option_text) in options {
            if !option_text.is_empty() && line_lower.contains(&option_text.to_lowercase()) {
                return Choice::Letter(*letter);
            }
        }
    }

    for line in text.lines() {
        let stripped = punctuation_regex().replace_all(line, " ");
        for token in stripped.split_whitespace() {
            if token.len() == 1 {
                if let Some(letter) = token.chars().next() {
                    if options.contains_key(&letter) {
                        return Choice::Letter(letter);
                    }
                }
            }
        }
    }

    let trimmed = text.trim();
    if trimmed.len() == 1 {
        if let Some(letter) = trimmed.chars().next() {
            if options.contains_key(&letter) {
                return Choice::Letter(letter);
            }
        }
    }

    tracing::warn!(text, "parse_choice: unparseable response");
    Choice::Unparseable
}

/// Extract a single atomic follow-up question from `text`.
///
/// Returns the last line containing `?`, stripped of a leading `Label:`
/// prefix and surrounding quotes. `None` when no line contains `?`.
pub fn parse_atomic_question(text: &str) -> Option<String> {
    let last_question_line = text.lines().filter(|line| line.contains('?')).last()?;

    let after_label = last_question_line.rsplit(':').next().unwrap_or(last_question_line);
    let question = after_label.trim().trim_matches(|c| c == '\'' || c == '"').trim();

    if question.is_empty() {
        tracing::warn!(text, "parse_atomic_question: unparseable response");
        return None;
    }
    Some(question.to_string())
}

/// Parse a yes/no decision from `text`.
///
/// Lowercases, strips `.,;:`, keeps only what follows a `DECISION:` marker
/// when present, then looks for the standalone tokens `yes`/`no`. Exactly
/// one present wins; both or neither present conservatively return `No`
/// (logged).
pub fn parse_yes_no(text: &str) -> YesNo {
    let mut normalized = text.to_lowercase();
    for ch in ['.', ',', ';', ':'] {
        normalized = normalized.replace(ch, "");
    }

    let scope = match normalized.find("decision") {
        Some(idx) => &normalized[idx + "decision".len()..],
        None => normalized.as_str(),
    };

    let has_yes = scope.split_whitespace().any(|tok| tok == "yes");
    let has_no = scope.split_whitespace().any(|tok| tok == "no");

    match (has_yes, has_no) {
        (true, false) => YesNo::Yes,
        (false, true) => YesNo::No,
        (true, true) => {
            tracing::warn!(text, "parse_yes_no: both yes and no present, defaulting to No");
            YesNo::No
        }
        (false, false) => {
            tracing::warn!(text, "parse_yes_no: neither yes nor no present, defaulting to No");
            YesNo::No
        }
    }
}

/// Parse a probability in `[0,1]` from `text`.
///
/// Extracts every decimal float matching `\d+\.\d+` and returns the last
/// one. When none are found, returns a small jittered default near 0.2
/// (logged) so the caller never has to special-case "no score" — a real
/// score and a defaulted one share the same type.
pub fn parse_confidence_score(text: &str) -> f64 {
    let scores: Vec<f64> = confidence_regex()
        .find_iter(text)
        .filter_map(|m| m.as_str().parse::<f64>().ok())
        .collect();

    let Some(&last) = scores.last() else {
        tracing::warn!(text, "parse_confidence_score: no score found, using jittered default");
        let jitter = (rand::random::<f64>() - rand::random::<f64>()) * 0.2;
        return (0.2 + jitter).clamp(0.0, 0.4);
    };

    if scores.len() > 1 {
        tracing::warn!(text, count = scores.len(), "parse_confidence_score: more than one score, using last");
    }
    if last > 1.0 {
        tracing::warn!(text, last, "parse_confidence_score: score exceeds 1.0");
    }
    last
}

/// Parse a Likert confidence level `{0..5}` from `text`, 0 meaning
/// unparseable (not a valid level but never an error).
pub fn parse_likert_scale(text: &str) -> u8 {
    let mut normalized = text.to_lowercase();
    for ch in ['.', ',', ';', ':'] {
        normalized = normalized.replace(ch, "");
    }

    if normalized.contains("very confident") {
        5
    } else if normalized.contains("somewhat confident") {
        4
    } else if normalized.contains("neither confident nor unconfident")
        || normalized.contains("neither confident or unconfident")
    {
        3
    } else if normalized.contains("somewhat unconfident") {
        2
    } else if normalized.contains("very unconfident") {
        1
    } else {
        tracing::warn!(text, "parse_likert_scale: unparseable response");
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts(pairs: &[(char, &str)]) -> Options {
        pairs.iter().map(|(c, s)| (*c, s.to_string())).collect()
    }

    #[test]
    fn parse_choice_single_letter() {
        assert_eq!(parse_choice("B", &opts(&[('A', "flu"), ('B', "pneumonia")])), Choice::Letter('B'));
    }

    #[test]
    fn parse_choice_trailing_letter_token() {
        assert_eq!(
            parse_choice("the answer is C.", &opts(&[('A', "flu"), ('B', "pneumonia"), ('C', "asthma")])),
            Choice::Letter('C')
        );
    }

    #[test]
    fn parse_choice_option_text_match() {
        assert_eq!(
            parse_choice("I believe it is pneumonia", &opts(&[('A', "flu"), ('B', "pneumonia")])),
            Choice::Letter('B')
        );
    }

    #[test]
    fn parse_choice_unparseable() {
        assert_eq!(
            parse_choice("I have no idea what this is", &opts(&[('A', "flu"), ('B', "pneumonia")])),
            Choice::Unparseable
        );
    }

    #[test]
    fn parse_atomic_question_last_line_with_label() {
        assert_eq!(
            parse_atomic_question("REASON: thinking\nQUESTION: \"Do you have a fever?\"").as_deref(),
            Some("Do you have a fever?")
        );
    }

    #[test]
    fn parse_atomic_question_none_without_question_mark() {
        assert_eq!(parse_atomic_question("no question here"), None);
    }

    #[test]
    fn parse_yes_no_decision_marker() {
        assert_eq!(parse_yes_no("DECISION: yes"), YesNo::Yes);
    }

    #[test]
    fn parse_yes_no_defaults_to_no_on_ambiguity() {
        assert_eq!(parse_yes_no("maybe"), YesNo::No);
    }

    #[test]
    fn parse_yes_no_both_present_defaults_no() {
        assert_eq!(parse_yes_no("yes and no"), YesNo::No);
    }

    #[test]
    fn parse_confidence_score_exact() {
        assert_eq!(parse_confidence_score("0.73"), 0.73);
    }

    #[test]
    fn parse_confidence_score_takes_last() {
        assert_eq!(parse_confidence_score("first 0.1 then 0.9"), 0.9);
    }

    #[test]
    fn parse_confidence_score_default_in_range() {
        let score = parse_confidence_score("no number here");
        assert!((0.0..=0.4).contains(&score), "score {score} out of expected range");
    }

    #[test]
    fn parse_likert_scale_somewhat_confident() {
        assert_eq!(parse_likert_scale("Somewhat Confident"), 4);
    }

    #[test]
    fn parse_likert_scale_very_confident() {
        assert_eq!(parse_likert_scale("Very confident."), 5);
    }

    #[test]
    fn parse_likert_scale_neutral_or_variant() {
        assert_eq!(parse_likert_scale("Neither confident or unconfident"), 3);
    }

    #[test]
    fn parse_likert_scale_unparseable_is_zero() {
        assert_eq!(parse_likert_scale("I don't know"), 0);
    }
}
