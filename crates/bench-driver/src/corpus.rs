// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Corpus loading (spec §6c): one JSON object per line, keyed by `id`.
//! A line that fails to parse is a fatal configuration error — the whole
//! corpus is invalid, not one case.

use std::collections::BTreeMap;
use std::io::{BufRead, BufReader};
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Deserializer};

use bench_core::Case;

/// Wire shape of one corpus line (spec §6): `context` may be a single
/// paragraph string or an array of sentences.
#[derive(Debug, Deserialize)]
struct RawCase {
    id: String,
    question: String,
    options: BTreeMap<String, String>,
    answer: String,
    answer_idx: String,
    #[serde(deserialize_with = "string_or_vec")]
    context: Vec<String>,
    #[serde(default)]
    initial_info: Option<String>,
    #[serde(default)]
    atomic_facts: Option<Vec<String>>,
}

fn string_or_vec<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringOrVec {
        One(String),
        Many(Vec<String>),
    }
    match StringOrVec::deserialize(deserializer)? {
        StringOrVec::One(s) => Ok(vec![s]),
        StringOrVec::Many(v) => Ok(v),
    }
}

impl TryFrom<RawCase> for Case {
    type Error = anyhow::Error;

    fn try_from(raw: RawCase) -> anyhow::Result<Case> {
        let answer_idx = raw
            .answer_idx
            .chars()
            .next()
            .ok_or_else(|| anyhow::anyhow!("case {}: empty answer_idx", raw.id))?
            .to_ascii_uppercase();

        let options = raw
            .options
            .into_iter()
            .map(|(k, v)| {
                let letter = k
                    .chars()
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("case {}: empty option key", raw.id))?
                    .to_ascii_uppercase();
                Ok((letter, v))
            })
            .collect::<anyhow::Result<_>>()?;

        Ok(Case {
            id: raw.id,
            question: raw.question,
            options,
            answer: raw.answer,
            answer_idx,
            context: raw.context,
            initial_info: raw.initial_info,
            atomic_facts: raw.atomic_facts,
        })
    }
}

/// Load every case from `path`, in file order.
pub fn load_corpus(path: &Path) -> anyhow::Result<Vec<Case>> {
    let file = std::fs::File::open(path).with_context(|| format!("opening corpus {}", path.display()))?;
    let reader = BufReader::new(file);

    let mut cases = Vec::new();
    for (line_no, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("reading corpus {} at line {}", path.display(), line_no + 1))?;
        if line.trim().is_empty() {
            continue;
        }
        let raw: RawCase = serde_json::from_str(&line)
            .with_context(|| format!("parsing corpus {} at line {}", path.display(), line_no + 1))?;
        cases.push(Case::try_from(raw)?);
    }
    Ok(cases)
}
