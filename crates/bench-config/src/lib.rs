// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
mod cli;
mod config;

pub use cli::{BackendSelector, Cli, PatientVariantName, StrategyName};
pub use config::{Config, RunConfig, SamplingConfig, StrategyConfig};
