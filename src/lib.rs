pub mod audio;
#[cfg(feature = "desktop")]
mod commands;
pub mod config;
pub mod engine;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod render;

pub use config::AppConfig;
pub use error::{AppError, Result};

use std::fs::File;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Console and file logging; `RUST_LOG` overrides the configured filter
pub fn init_logging(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let log_path = config.log_file_path();
    let file_layer = match File::create(&log_path) {
        Ok(file) => Some(
            fmt::layer()
                .with_ansi(false)
                .with_writer(std::sync::Mutex::new(file)),
        ),
        Err(e) => {
            eprintln!("Could not create log file {:?}: {}", log_path, e);
            None
        }
    };

    // Fails only when a subscriber is already set (tests, embedding)
    let _ = tracing_subscriber::registry()
        .with(fmt::layer()) // Console output
        .with(file_layer) // File output
        .with(filter)
        .try_init();
}

#[cfg(feature = "desktop")]
#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    use audio::MicrophoneCapability;
    use commands::AppState;
    use tauri::Manager;
    use tracing::{error, info, warn};

    let (config, config_problem) = AppConfig::load();
    init_logging(&config);

    info!("Starting DuoSplit...");
    if let Some(e) = config_problem {
        warn!("Using default configuration: {}", e);
    }
    config.log_summary();

    // Decided once; the page only offers recording when this is available
    let microphone = MicrophoneCapability::detect();

    let app = tauri::Builder::default()
        .manage(AppState::new(config, microphone))
        .invoke_handler(tauri::generate_handler![
            // Input commands
            commands::get_input_options,
            // Separation commands
            commands::separate_upload,
            commands::separate_file,
            commands::record_and_separate,
            commands::read_artifact,
            commands::release_session,
        ])
        .build(tauri::generate_context!());

    let app = match app {
        Ok(app) => app,
        Err(e) => {
            error!("Error while building tauri application: {}", e);
            return;
        }
    };

    app.run(|handle, event| {
        if let tauri::RunEvent::Exit = event {
            // Never blocks; a run still in progress leaves its temp dir behind
            if let Err(e) = handle.state::<AppState>().session.release() {
                warn!("Skipped cleanup on exit: {}", e);
            }
        }
    });
}
