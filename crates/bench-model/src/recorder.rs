// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! The three optional structured JSONL logs (spec §6/§6b): history,
//! detail, and message. Each is enabled independently by its filename
//! being configured; writes are serialized per sink so concurrent cases
//! never interleave a partial line. Lives here, rather than in the
//! batch-driver crate, so the domain core can log raw generator I/O at
//! the point each call is made.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use anyhow::Context;
use serde_json::Value;
use tokio::sync::Mutex;

struct Sink {
    file: Mutex<std::fs::File>,
}

impl Sink {
    fn open(path: &Path) -> anyhow::Result<Self> {
        let file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(path)
            .with_context(|| format!("opening log {}", path.display()))?;
        Ok(Self { file: Mutex::new(file) })
    }

    async fn write(&self, event: &Value) -> anyhow::Result<()> {
        let line = serde_json::to_string(event).context("serializing log event")?;
        let mut file = self.file.lock().await;
        writeln!(file, "{line}").context("writing log event")?;
        Ok(())
    }
}

/// Owns whichever of the three optional sinks were configured; components
/// receive it by reference rather than reaching for a process-global
/// logger (spec §9 Design Notes).
#[derive(Default)]
pub struct Recorder {
    history: Option<Sink>,
    detail: Option<Sink>,
    message: Option<Sink>,
}

impl Recorder {
    pub fn new(
        history_path: Option<&Path>,
        detail_path: Option<&Path>,
        message_path: Option<&Path>,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            history: history_path.map(Sink::open).transpose()?,
            detail: detail_path.map(Sink::open).transpose()?,
            message: message_path.map(Sink::open).transpose()?,
        })
    }

    /// Full message-list snapshot for one turn. No-op when `history_log_filename` is unset.
    pub async fn log_history(&self, event: Value) -> anyhow::Result<()> {
        if let Some(sink) = &self.history {
            sink.write(&event).await?;
        }
        Ok(())
    }

    /// Parser decision / per-sample outcome. No-op when `detail_log_filename` is unset.
    pub async fn log_detail(&self, event: Value) -> anyhow::Result<()> {
        if let Some(sink) = &self.detail {
            sink.write(&event).await?;
        }
        Ok(())
    }

    /// Raw backend request/response. No-op when `message_log_filename` is unset.
    pub async fn log_message(&self, event: Value) -> anyhow::Result<()> {
        if let Some(sink) = &self.message {
            sink.write(&event).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn disabled_sinks_are_silent_no_ops() {
        let recorder = Recorder::new(None, None, None).unwrap();
        recorder.log_history(json!({"x": 1})).await.unwrap();
        recorder.log_detail(json!({"x": 1})).await.unwrap();
        recorder.log_message(json!({"x": 1})).await.unwrap();
    }

    #[tokio::test]
    async fn enabled_sink_appends_one_line_per_event() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.jsonl");
        let recorder = Recorder::new(Some(&path), None, None).unwrap();
        recorder.log_history(json!({"turn": 0})).await.unwrap();
        recorder.log_history(json!({"turn": 1})).await.unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 2);
    }
}
