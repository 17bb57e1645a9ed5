// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Process-wide generator cache: one live backend per model identifier.
//!
//! Construction is memoized behind a `tokio::sync::Mutex` so two concurrent
//! first-uses of the same model still produce only one live client (per
//! spec §5's idempotent-construction requirement).

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::http_backend::{BackendConfig, HttpChatBackend};
use crate::provider::Generator;

/// Which family of backend a model identifier should resolve to. Mirrors
/// the three backends in spec §4.1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendSelection {
    Remote,
    BatchLocal,
    SingleShot,
}

pub struct GeneratorCache {
    entries: Mutex<HashMap<String, Arc<dyn Generator>>>,
}

impl Default for GeneratorCache {
    fn default() -> Self {
        Self { entries: Mutex::new(HashMap::new()) }
    }
}

impl GeneratorCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached generator for `model`, constructing it on first
    /// use. Construction failures for [`BackendSelection::BatchLocal`]
    /// degrade to the single-shot backend with a logged warning, per
    /// spec §4.1 — they never propagate as an error here. A construction
    /// failure for `Remote` or `SingleShot` is returned to the caller,
    /// since neither has a further fallback.
    pub async fn get_or_build(
        &self,
        model: &str,
        selection: BackendSelection,
        cfg: &BackendConfig,
    ) -> anyhow::Result<Arc<dyn Generator>> {
        let mut entries = self.entries.lock().await;
        if let Some(existing) = entries.get(model) {
            return Ok(Arc::clone(existing));
        }

        let generator: Arc<dyn Generator> = match selection {
            BackendSelection::Remote => Arc::new(HttpChatBackend::remote(cfg)?),
            BackendSelection::SingleShot => Arc::new(HttpChatBackend::single_shot(cfg)?),
            BackendSelection::BatchLocal => match HttpChatBackend::batch_local(cfg) {
                Ok(backend) => Arc::new(backend),
                Err(err) => {
                    tracing::warn!(
                        model,
                        error = %err,
                        "batch-local backend construction failed, degrading to single-shot"
                    );
                    Arc::new(HttpChatBackend::single_shot(cfg)?)
                }
            },
        };

        entries.insert(model.to_string(), Arc::clone(&generator));
        Ok(generator)
    }
}
