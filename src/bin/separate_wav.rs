//! Separate a two-speaker WAV file without the desktop shell
//!
//! Run with: cargo run --bin separate_wav -- <input.wav> [output_dir]

use duosplit_lib::engine::{shared_separator, Separator};
use duosplit_lib::models::{ArtifactStatus, SignalReport};
use duosplit_lib::pipeline::{AudioInput, Pipeline};
use duosplit_lib::render::RunArtifacts;
use duosplit_lib::{init_logging, AppConfig};
use std::path::{Path, PathBuf};
use tracing::warn;

fn main() {
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 || args.len() > 3 {
        eprintln!("Usage: {} <input.wav> [output_dir]", args[0]);
        std::process::exit(2);
    }
    let input = PathBuf::from(&args[1]);
    let output_dir = args
        .get(2)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("separated"));

    let (config, config_problem) = AppConfig::load();
    init_logging(&config);
    if let Some(e) = config_problem {
        warn!("Using default configuration: {}", e);
    }

    println!("Separating {:?}...\n", input);

    let pipeline_config = config.pipeline_config();
    let outcome = match Pipeline::new(&pipeline_config).run(
        AudioInput::File(input),
        || shared_separator(&config.separator).map(|s| s as &dyn Separator),
        |_, ready| println!("Mixture ready ({} ms), separating...\n", ready.mixture.duration_ms),
    ) {
        Ok(outcome) => outcome,
        Err(e) => {
            eprintln!("✗ {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = std::fs::create_dir_all(&output_dir) {
        eprintln!("✗ Could not create {:?}: {}", output_dir, e);
        std::process::exit(1);
    }

    let report = &outcome.report;
    println!(
        "Input: {}Hz, {} channel(s), {} ms{}",
        report.input.original_sample_rate,
        report.input.original_channels,
        report.input.duration_ms,
        if report.input.resampled { " (resampled to 16kHz)" } else { "" }
    );

    let mut failures = 0;
    for signal in std::iter::once(&report.mixture).chain(report.sources.iter()) {
        failures += export_signal(&outcome.artifacts, signal, &output_dir);
    }

    let report_path = output_dir.join("report.json");
    match serde_json::to_string_pretty(report) {
        Ok(json) => {
            if let Err(e) = std::fs::write(&report_path, json) {
                eprintln!("✗ Could not write {:?}: {}", report_path, e);
                failures += 1;
            }
        }
        Err(e) => {
            eprintln!("✗ Could not serialize report: {}", e);
            failures += 1;
        }
    }

    println!("\nDone in {} ms, output in {:?}", report.elapsed_ms, output_dir);
    if failures > 0 {
        std::process::exit(1);
    }
}

/// Copy the artifacts of one signal out of the scratch dir, returning the number of failures
fn export_signal(
    artifacts: &RunArtifacts,
    signal: &SignalReport,
    output_dir: &Path,
) -> usize {
    let mut failures = 0;
    println!("{}:", signal.title);

    for (kind, status) in [
        ("audio", &signal.audio),
        ("waveform", &signal.waveform),
        ("spectrogram", &signal.spectrogram),
    ] {
        match status {
            ArtifactStatus::Ready { artifact_id } => {
                let extension = if kind == "audio" { "wav" } else { "png" };
                let target = output_dir.join(format!("{}-{}.{}", signal.label.slug(), kind, extension));
                match artifacts
                    .read(artifact_id)
                    .and_then(|bytes| std::fs::write(&target, bytes).map_err(Into::into))
                {
                    Ok(()) => println!("  ✓ {:<12} {:?}", kind, target),
                    Err(e) => {
                        println!("  ✗ {:<12} {}", kind, e);
                        failures += 1;
                    }
                }
            }
            ArtifactStatus::Failed { message } => {
                println!("  ✗ {:<12} {}", kind, message);
                failures += 1;
            }
        }
    }
    failures
}
