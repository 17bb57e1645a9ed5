// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
mod batch_driver;
mod corpus;
mod output;
mod turn_controller;

pub use batch_driver::{run as run_batch, Stats};
pub use bench_model::Recorder;
pub use corpus::load_corpus;
pub use output::{finalise_stdout, write_progress, write_stderr, write_stdout};
pub use turn_controller::{run_case, CaseOutcome};
