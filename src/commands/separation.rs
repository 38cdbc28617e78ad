use crate::commands::AppState;
use crate::engine::{shared_separator, Separator};
use crate::error::{AppError, Result};
use crate::models::RunReport;
use crate::pipeline::AudioInput;
use std::path::PathBuf;
use tauri::ipc::{InvokeBody, Request, Response};
use tauri::{AppHandle, Emitter, Manager, State};
use tracing::{info, warn};

/// Header carrying the uploaded file's name next to the raw body
const FILE_NAME_HEADER: &str = "x-file-name";

/// Emitted with a `MixtureReady` payload before the model runs
const MIXTURE_READY_EVENT: &str = "mixture-ready";

/// Run the pipeline on a blocking worker so the page stays responsive
async fn run_in_background(app: AppHandle, input: AudioInput) -> Result<RunReport> {
    tokio::task::spawn_blocking(move || {
        let state = app.state::<AppState>();
        state.session.run(
            &state.pipeline,
            input,
            || shared_separator(&state.config.separator).map(|s| s as &dyn Separator),
            |ready| {
                if let Err(e) = app.emit(MIXTURE_READY_EVENT, ready) {
                    warn!("Could not send mixture of run {}: {}", ready.run_id, e);
                }
            },
        )
    })
    .await
    .map_err(|e| AppError::InvalidState(format!("Separation task failed: {}", e)))?
}

#[tauri::command]
pub async fn separate_upload(app: AppHandle, request: Request<'_>) -> Result<RunReport> {
    let data = match request.body() {
        InvokeBody::Raw(bytes) => bytes.clone(),
        InvokeBody::Json(_) => {
            return Err(AppError::InvalidInput(
                "Upload must be sent as a raw request body".into(),
            ))
        }
    };

    let name = request
        .headers()
        .get(FILE_NAME_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("upload.wav")
        .to_string();

    info!("Received upload {} ({} bytes)", name, data.len());
    run_in_background(app, AudioInput::Bytes { name, data }).await
}

#[tauri::command]
pub async fn separate_file(app: AppHandle, file_path: String) -> Result<RunReport> {
    let path = PathBuf::from(&file_path);

    if !path.exists() {
        return Err(AppError::NotFound(format!("File not found: {}", file_path)));
    }

    run_in_background(app, AudioInput::File(path)).await
}

#[tauri::command]
pub async fn record_and_separate(app: AppHandle, duration_secs: u32) -> Result<RunReport> {
    if !app.state::<AppState>().microphone.is_available() {
        return Err(AppError::InvalidState("No microphone available".into()));
    }

    run_in_background(app, AudioInput::Microphone { duration_secs }).await
}

/// Raw bytes of a WAV or PNG artifact of the current run
#[tauri::command]
pub async fn read_artifact(state: State<'_, AppState>, artifact_id: String) -> Result<Response> {
    let bytes = state.session.read_artifact(&artifact_id)?;
    Ok(Response::new(bytes))
}

/// Fails with `InvalidState` while a run is in progress
#[tauri::command]
pub async fn release_session(state: State<'_, AppState>) -> Result<()> {
    state.session.release()
}
