// desktop.rs — Tauri shell: managed state, commands, and the events the
// webview listens to (`chat:message`, `analysis:result`, `capture:image`).

use serde::Serialize;
use std::sync::Arc;
use tauri::{AppHandle, Emitter, Manager};
use tokio::sync::Mutex as TokioMutex;

use crate::ai::InferenceClient;
use crate::analysis::{AnalysisFlow, AnalysisOutcome, AnalysisResult};
use crate::capture::{CaptureSource, FacingMode, FfmpegCamera, SourceStatus};
use crate::chat::{ChatFlow, ChatMessage, ChatTranscript};
use crate::payload::ImagePreview;
use crate::settings::Settings;

/// Independent state slots, one per flow.
pub struct AppState {
    capture: TokioMutex<CaptureSource>,
    analysis: Arc<AnalysisFlow>,
    chat: Arc<ChatFlow>,
}

#[derive(Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct CapturePayload {
    status: SourceStatus,
    image: Option<ImagePreview>,
}

fn emit_capture(app: &AppHandle, source: &CaptureSource) {
    let payload = CapturePayload {
        status: source.status(),
        image: source.current_image().map(|i| i.preview()),
    };
    if let Err(e) = app.emit("capture:image", payload) {
        log::error!("Failed to emit capture:image: {}", e);
    }
}

#[tauri::command]
async fn select_file(
    path: String,
    state: tauri::State<'_, AppState>,
    app: AppHandle,
) -> Result<ImagePreview, String> {
    let mut source = state.capture.lock().await;
    let image = source.select_file(&path).await.map_err(|e| e.to_string())?;
    state.analysis.clear();
    emit_capture(&app, &source);
    Ok(image.preview())
}

/// Bytes read by the webview's own file input.
#[tauri::command]
async fn upload_image(
    name: String,
    bytes: Vec<u8>,
    state: tauri::State<'_, AppState>,
    app: AppHandle,
) -> Result<ImagePreview, String> {
    let mut source = state.capture.lock().await;
    let image = source.select_bytes(bytes, &name).map_err(|e| e.to_string())?;
    state.analysis.clear();
    emit_capture(&app, &source);
    Ok(image.preview())
}

#[tauri::command]
async fn start_camera(
    facing: Option<FacingMode>,
    state: tauri::State<'_, AppState>,
    app: AppHandle,
) -> Result<SourceStatus, String> {
    let mut source = state.capture.lock().await;
    let facing = facing.unwrap_or_default();
    tokio::task::block_in_place(|| source.start_camera(facing)).map_err(|e| e.to_string())?;
    emit_capture(&app, &source);
    Ok(source.status())
}

#[tauri::command]
async fn switch_camera(
    state: tauri::State<'_, AppState>,
    app: AppHandle,
) -> Result<SourceStatus, String> {
    let mut source = state.capture.lock().await;
    let result = tokio::task::block_in_place(|| source.switch_camera());
    emit_capture(&app, &source);
    result.map_err(|e| e.to_string())?;
    Ok(source.status())
}

#[tauri::command]
async fn stop_camera(state: tauri::State<'_, AppState>, app: AppHandle) -> Result<SourceStatus, String> {
    let mut source = state.capture.lock().await;
    tokio::task::block_in_place(|| source.stop_camera());
    emit_capture(&app, &source);
    Ok(source.status())
}

#[tauri::command]
async fn capture_photo(
    state: tauri::State<'_, AppState>,
    app: AppHandle,
) -> Result<ImagePreview, String> {
    let mut source = state.capture.lock().await;
    let image = tokio::task::block_in_place(|| source.capture_frame()).map_err(|e| e.to_string())?;
    state.analysis.clear();
    emit_capture(&app, &source);
    Ok(image.preview())
}

#[tauri::command]
async fn reset_image(state: tauri::State<'_, AppState>, app: AppHandle) -> Result<SourceStatus, String> {
    let mut source = state.capture.lock().await;
    tokio::task::block_in_place(|| source.reset());
    state.analysis.clear();
    emit_capture(&app, &source);
    Ok(source.status())
}

#[tauri::command]
async fn current_image(state: tauri::State<'_, AppState>) -> Result<Option<ImagePreview>, String> {
    let source = state.capture.lock().await;
    Ok(source.current_image().map(|i| i.preview()))
}

#[tauri::command]
async fn analyze_image(
    state: tauri::State<'_, AppState>,
    app: AppHandle,
) -> Result<AnalysisResult, String> {
    // Copy the image out so the capture lock is not held during the call.
    let image = state.capture.lock().await.current_image().cloned();
    let analysis = Arc::clone(&state.analysis);
    let outcome = analysis.run_analysis(image.as_ref()).await;
    if let Some(slot) = analysis.result() {
        if let Err(e) = app.emit("analysis:result", slot) {
            log::error!("Failed to emit analysis:result: {}", e);
        }
    }
    outcome.map_err(|e| e.to_string())
}

#[tauri::command]
fn analysis_result(state: tauri::State<'_, AppState>) -> Option<AnalysisOutcome> {
    state.analysis.result()
}

#[tauri::command]
async fn send_chat_message(
    text: String,
    state: tauri::State<'_, AppState>,
) -> Result<Option<ChatMessage>, String> {
    let chat = Arc::clone(&state.chat);
    chat.send_chat_message(&text).await.map_err(|e| e.to_string())
}

#[tauri::command]
fn set_chat_draft(text: String, state: tauri::State<'_, AppState>) {
    state.chat.set_draft(text);
}

#[tauri::command]
fn chat_history(state: tauri::State<'_, AppState>) -> ChatTranscript {
    state.chat.transcript()
}

#[tauri::command]
async fn save_settings(app: AppHandle, settings: Settings) -> Result<(), String> {
    let path = Settings::app_config_path(&app)?;
    settings.save(&path).map_err(|e| e.to_string())
}

#[tauri::command]
async fn load_settings(app: AppHandle) -> Result<Settings, String> {
    let path = Settings::app_config_path(&app)?;
    Settings::load(&path).map_err(|e| e.to_string())
}

fn build_state(app: &AppHandle) -> Result<AppState, Box<dyn std::error::Error>> {
    let settings = Settings::load_from_app(app)?;
    let client = Arc::new(InferenceClient::from_settings(&settings)?);

    let camera = Arc::new(FfmpegCamera::from_settings(&settings));
    let capture = CaptureSource::from_settings(camera, &settings);

    let emitter = app.clone();
    let chat = ChatFlow::new(Arc::clone(&client)).with_observer(Arc::new(move |message: &ChatMessage| {
        if let Err(e) = emitter.emit("chat:message", message) {
            log::error!("Failed to emit chat:message: {}", e);
        }
    }));

    Ok(AppState {
        capture: TokioMutex::new(capture),
        analysis: Arc::new(AnalysisFlow::new(client)),
        chat: Arc::new(chat),
    })
}

#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    tauri::Builder::default()
        .setup(|app| {
            let state = build_state(app.handle())?;
            app.manage(state);
            log::info!("Arogya started");
            Ok(())
        })
        .invoke_handler(tauri::generate_handler![
            select_file,
            upload_image,
            start_camera,
            switch_camera,
            stop_camera,
            capture_photo,
            reset_image,
            current_image,
            analyze_image,
            analysis_result,
            send_chat_message,
            set_chat_draft,
            chat_history,
            save_settings,
            load_settings
        ])
        .run(tauri::generate_context!())
        .expect("error while running tauri application");
}
