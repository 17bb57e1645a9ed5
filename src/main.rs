// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::Arc;

use bench_config::{Cli, Config};
use bench_driver::Recorder;
use clap::Parser;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_filename.as_deref());

    let config = Config::from_cli(cli)?;

    let recorder = Arc::new(Recorder::new(
        config.run.history_log_filename.as_ref().map(|f| config.run.data_dir.join(f)).as_deref(),
        config.run.detail_log_filename.as_ref().map(|f| config.run.data_dir.join(f)).as_deref(),
        config.run.message_log_filename.as_ref().map(|f| config.run.data_dir.join(f)).as_deref(),
    )?);

    let stats = bench_driver::run_batch(&config, recorder).await?;

    bench_driver::write_stdout(&format!(
        "{{\"total\":{},\"accuracy\":{:.4},\"forced_commit_rate\":{:.4},\"avg_questions\":{:.2}}}\n",
        stats.total,
        stats.accuracy(),
        stats.forced_commit_rate(),
        stats.avg_questions(),
    ));
    bench_driver::write_progress(&format!(
        "completed {} cases, accuracy {:.1}%",
        stats.total,
        stats.accuracy() * 100.0,
    ));

    Ok(())
}

/// Mirrors an operational log to `log_path` if given, otherwise writes to
/// stderr. Respects `RUST_LOG` over the default `info` filter.
fn init_logging(log_path: Option<&str>) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if let Some(path) = log_path {
        if let Ok(file) = std::fs::OpenOptions::new().create(true).append(true).open(path) {
            let _ = tracing_subscriber::registry()
                .with(fmt::layer().with_target(true).with_ansi(false).with_writer(std::sync::Mutex::new(file)))
                .with(filter)
                .try_init();
            return;
        }
    }

    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .try_init();
}
