//! Tauri host for the application shell.

use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tauri::{AppHandle, Emitter, Manager, State};
use tauri_plugin_dialog::{DialogExt, MessageDialogButtons, MessageDialogKind};
use tokio_util::sync::CancellationToken;

use crate::client::EchoClient;
use crate::config::EchoConfig;
use crate::conversation::{ChatEvent, ConversationBackend, ConversationEngine};
use crate::error::{EchoError, Result};
use crate::groq::GroqClient;
use crate::logging;
use crate::models::SettingKey;
use crate::prompts;
use crate::shell::{self, ActiveTurn, AppShell, Confirm, ShellSnapshot, CLEAR_PROMPT, DELETE_PROMPT};
use crate::storage::{self, KeyValueStore, SqliteStore};

const CHAT_EVENT: &str = "chat:event";
const SHELL_UPDATE: &str = "shell:update";

pub struct DesktopState {
    shell: tokio::sync::Mutex<AppShell>,
    backend: Arc<dyn ConversationBackend>,
    active_turn: ActiveTurn,
    log_dir: PathBuf,
}

impl DesktopState {
    fn initialize(app: &AppHandle) -> Result<Self> {
        let config = EchoConfig::from_env()?;

        let data_dir = match &config.data_dir {
            Some(dir) => dir.clone(),
            None => app
                .path()
                .app_data_dir()
                .map_err(|e| EchoError::Config(format!("no app data dir: {}", e)))?,
        };
        let log_dir = config.log_dir.clone().unwrap_or_else(|| data_dir.join("logs"));

        if let Err(e) = logging::init_logging(Some(&log_dir)) {
            eprintln!("Failed to initialize logging: {}", e);
        }

        let store: Arc<dyn KeyValueStore> =
            Arc::new(SqliteStore::open(&data_dir.join(storage::DB_FILE_NAME))?);
        let shell = AppShell::load(
            Box::new(storage::history_port(store.clone())),
            Box::new(storage::settings_port(store)),
            config.ring_delay,
        );

        let backend: Arc<dyn ConversationBackend> = match &config.endpoint_url {
            Some(url) => {
                logging::log_shell(&format!("Using remote endpoint {}", url));
                Arc::new(EchoClient::new(url)?)
            }
            None => {
                let model = GroqClient::from_config(&config)?;
                if !model.has_credentials() {
                    logging::log_provider(None, "GROQ_API_KEY is not set; chat will fail");
                }
                Arc::new(ConversationEngine::new(Arc::new(model)))
            }
        };

        Ok(Self {
            shell: tokio::sync::Mutex::new(shell),
            backend,
            active_turn: ActiveTurn::new(),
            log_dir,
        })
    }
}

/// Native OK/Cancel dialog
struct DialogConfirm(AppHandle);

impl Confirm for DialogConfirm {
    fn confirm(&self, prompt: &str) -> bool {
        self.0
            .dialog()
            .message(prompt)
            .title("Echo")
            .kind(MessageDialogKind::Warning)
            .buttons(MessageDialogButtons::OkCancel)
            .blocking_show()
    }
}

/// Ask off the async runtime; a dialog failure counts as "no"
async fn ask(app: &AppHandle, prompt: &'static str) -> bool {
    let confirm = DialogConfirm(app.clone());
    tauri::async_runtime::spawn_blocking(move || confirm.confirm(prompt))
        .await
        .unwrap_or(false)
}

fn publish(app: &AppHandle, shell: &AppShell) -> ShellSnapshot {
    let snapshot = shell.snapshot();
    if let Err(e) = app.emit(SHELL_UPDATE, &snapshot) {
        logging::log_error(None, &format!("Failed to emit shell update: {}", e));
    }
    snapshot
}

// ============ App Initialization ============

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitResult {
    pub snapshot: ShellSnapshot,
    pub removed_logs: usize,
}

#[tauri::command]
async fn init_app(app: AppHandle, state: State<'_, DesktopState>) -> std::result::Result<InitResult, String> {
    let removed_logs = logging::cleanup_old_logs(&state.log_dir).unwrap_or(0);
    let shell = state.shell.lock().await;
    logging::log_shell("App initialized");
    Ok(InitResult {
        snapshot: publish(&app, &shell),
        removed_logs,
    })
}

#[tauri::command]
async fn get_shell_snapshot(state: State<'_, DesktopState>) -> std::result::Result<ShellSnapshot, String> {
    Ok(state.shell.lock().await.snapshot())
}

#[tauri::command]
fn get_greeting() -> &'static str {
    prompts::ECHO_GREETING
}

#[tauri::command]
fn sample_input() -> &'static str {
    prompts::sample_input(&mut rand::rng())
}

// ============ Screens ============

#[tauri::command]
async fn start_app(app: AppHandle, state: State<'_, DesktopState>) -> std::result::Result<ShellSnapshot, String> {
    let mut shell = state.shell.lock().await;
    shell.start().map_err(|e| e.to_string())?;
    Ok(publish(&app, &shell))
}

#[tauri::command]
async fn request_call(app: AppHandle, state: State<'_, DesktopState>) -> std::result::Result<ShellSnapshot, String> {
    let delay = state.shell.lock().await.check_call().map_err(|e| e.to_string())?;
    tokio::time::sleep(delay).await;

    let mut shell = state.shell.lock().await;
    shell.ring().map_err(|e| e.to_string())?;
    Ok(publish(&app, &shell))
}

#[tauri::command]
async fn accept_call(app: AppHandle, state: State<'_, DesktopState>) -> std::result::Result<ShellSnapshot, String> {
    let mut shell = state.shell.lock().await;
    shell.accept_call().map_err(|e| e.to_string())?;
    Ok(publish(&app, &shell))
}

#[tauri::command]
async fn decline_call(app: AppHandle, state: State<'_, DesktopState>) -> std::result::Result<ShellSnapshot, String> {
    let mut shell = state.shell.lock().await;
    shell.decline_call().map_err(|e| e.to_string())?;
    Ok(publish(&app, &shell))
}

#[tauri::command]
async fn view_entry(app: AppHandle, state: State<'_, DesktopState>, id: i64) -> std::result::Result<ShellSnapshot, String> {
    let mut shell = state.shell.lock().await;
    shell.view_entry(id).map_err(|e| e.to_string())?;
    Ok(publish(&app, &shell))
}

#[tauri::command]
async fn close_result(app: AppHandle, state: State<'_, DesktopState>) -> std::result::Result<ShellSnapshot, String> {
    let mut shell = state.shell.lock().await;
    shell.close_result().map_err(|e| e.to_string())?;
    Ok(publish(&app, &shell))
}

// ============ Chat ============

/// Send one message. Reply chunks and the closing result arrive as `chat:event`.
#[tauri::command]
async fn send_message(
    app: AppHandle,
    state: State<'_, DesktopState>,
    text: String,
) -> std::result::Result<ShellSnapshot, String> {
    // a busy or empty submission is rejected here, before anything is cancelled
    let turn = state.shell.lock().await.begin_turn(&text).map_err(|e| e.to_string())?;
    let turn_id = turn.id;
    let cancel = CancellationToken::new();
    state.active_turn.arm(turn_id, cancel.clone());

    let emitter = app.clone();
    let outcome = shell::stream_turn(&state.shell, state.backend.as_ref(), turn, cancel, move |event: &ChatEvent| {
        if let Err(e) = emitter.emit(CHAT_EVENT, event) {
            logging::log_error(None, &format!("Failed to emit chat event: {}", e));
        }
    })
    .await;

    state.active_turn.release(turn_id);
    let shell = state.shell.lock().await;
    let snapshot = publish(&app, &shell);

    match outcome {
        Ok(_) => Ok(snapshot),
        Err(e) => {
            logging::log_error(None, &format!("Chat turn failed: {}", e));
            Err(e.to_string())
        }
    }
}

/// Leave the chat; any reply in flight is cancelled and nothing is saved
#[tauri::command]
async fn hang_up(app: AppHandle, state: State<'_, DesktopState>) -> std::result::Result<ShellSnapshot, String> {
    if state.active_turn.cancel() {
        logging::log_shell("Cancelled the reply in flight");
    }
    let mut shell = state.shell.lock().await;
    shell.hang_up().map_err(|e| e.to_string())?;
    Ok(publish(&app, &shell))
}

// ============ Journal ============

#[tauri::command]
async fn toggle_completed(app: AppHandle, state: State<'_, DesktopState>, id: i64) -> std::result::Result<ShellSnapshot, String> {
    let mut shell = state.shell.lock().await;
    shell.toggle_completed(id).map_err(|e| e.to_string())?;
    Ok(publish(&app, &shell))
}

#[tauri::command]
async fn delete_entry(app: AppHandle, state: State<'_, DesktopState>, id: i64) -> std::result::Result<ShellSnapshot, String> {
    let confirmed = ask(&app, DELETE_PROMPT).await;
    let mut shell = state.shell.lock().await;
    shell
        .delete_entry(id, &move |_: &str| confirmed)
        .map_err(|e| e.to_string())?;
    Ok(publish(&app, &shell))
}

#[tauri::command]
async fn clear_all_data(app: AppHandle, state: State<'_, DesktopState>) -> std::result::Result<ShellSnapshot, String> {
    let confirmed = ask(&app, CLEAR_PROMPT).await;
    let mut shell = state.shell.lock().await;
    shell
        .clear_all(&move |_: &str| confirmed)
        .map_err(|e| e.to_string())?;
    Ok(publish(&app, &shell))
}

#[tauri::command]
async fn update_setting(
    app: AppHandle,
    state: State<'_, DesktopState>,
    key: SettingKey,
    value: bool,
) -> std::result::Result<ShellSnapshot, String> {
    let mut shell = state.shell.lock().await;
    shell.update_setting(key, value).map_err(|e| e.to_string())?;
    Ok(publish(&app, &shell))
}

pub fn run() {
    tauri::Builder::default()
        .plugin(tauri_plugin_opener::init())
        .plugin(tauri_plugin_dialog::init())
        .setup(|app| {
            let state = DesktopState::initialize(app.handle())?;
            app.manage(state);
            Ok(())
        })
        .invoke_handler(tauri::generate_handler![
            init_app,
            get_shell_snapshot,
            get_greeting,
            sample_input,
            start_app,
            request_call,
            accept_call,
            decline_call,
            view_entry,
            close_result,
            send_message,
            hang_up,
            toggle_completed,
            delete_entry,
            clear_all_data,
            update_setting,
        ])
        .run(tauri::generate_context!())
        .expect("error while running tauri application");
}
