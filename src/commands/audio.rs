use crate::commands::AppState;
use crate::models::InputOptions;
use tauri::State;

#[tauri::command]
pub fn get_input_options(state: State<'_, AppState>) -> InputOptions {
    InputOptions::new(&state.microphone, state.config.default_record_secs)
}
