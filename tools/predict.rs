//! One-shot prediction
//!
//! Reads a JSON employee record from a file (or stdin when no path is given),
//! runs the pipeline configured by `$ATTRITION_CONFIG` / `config/config.toml`,
//! and prints the verdict.

use anyhow::{Context, Result};
use attrition_pipeline::{config::AppConfig, telemetry, InferencePipeline, RawRecord};
use std::io::Read;
use std::process::ExitCode;
use tracing::error;

fn read_record(path: Option<&str>) -> Result<RawRecord> {
    let raw = match path {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read record from {}", path))?,
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read record from stdin")?;
            buf
        }
    };
    serde_json::from_str(&raw).context("Record must be a JSON object of field -> value")
}

fn main() -> Result<ExitCode> {
    let config = AppConfig::load()?;
    telemetry::init(&config.logging, "predict")?;

    let path = std::env::args().nth(1);
    let record = read_record(path.as_deref())?;
    let pipeline = InferencePipeline::from_config(&config)?;

    match pipeline.trace(&record) {
        Ok(trace) => {
            println!("{}", trace.verdict.message());
            if !trace.defaulted_fields.is_empty() {
                println!("Defaults used for: {}", trace.defaulted_fields.join(", "));
            }
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            if e.is_system_anomaly() {
                error!(error_kind = e.kind(), error = %e, "Model configuration anomaly");
            }
            eprintln!("{}", e.user_message());
            Ok(ExitCode::FAILURE)
        }
    }
}
