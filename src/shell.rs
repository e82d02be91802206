//! Application shell: screen state machine, chat turns and the journal.
//!
//! ```text
//! onboarding -> dashboard <-> calling -> chatting -> result -> dashboard
//!                   \______________________________/ (view entry)
//! ```

use chrono::Utc;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::conversation::{ChatEvent, ConversationBackend};
use crate::error::{EchoError, Result};
use crate::journal::{self, Journal, Progress};
use crate::logging;
use crate::models::{ConversationResult, JournalEntry, Message, SettingKey, Settings, Stats};
use crate::prompts::ECHO_GREETING;
use crate::storage::StatePort;

pub const DELETE_PROMPT: &str = "确定要移除这条记录吗？";
pub const CLEAR_PROMPT: &str = "确定要清除所有历史记录吗？";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Screen {
    Onboarding,
    Dashboard,
    Calling,
    Chatting,
    Result,
}

impl Screen {
    pub fn as_str(&self) -> &'static str {
        match self {
            Screen::Onboarding => "onboarding",
            Screen::Dashboard => "dashboard",
            Screen::Calling => "calling",
            Screen::Chatting => "chatting",
            Screen::Result => "result",
        }
    }
}

/// Asks the user to confirm a destructive action
pub trait Confirm: Send + Sync {
    fn confirm(&self, prompt: &str) -> bool;
}

impl<F> Confirm for F
where
    F: Fn(&str) -> bool + Send + Sync,
{
    fn confirm(&self, prompt: &str) -> bool {
        self(prompt)
    }
}

/// A submitted user message waiting for its reply
#[derive(Debug, Clone, PartialEq)]
pub struct Turn {
    pub id: u64,
    pub transcript: Vec<Message>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TurnOutcome {
    /// Reply appended; the conversation goes on
    Continue { reply: String },
    /// Conversation closed and saved to the journal
    Finished { entry: JournalEntry },
    /// The chat was left before the reply arrived
    Aborted,
}

/// Everything a host needs to render the shell
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShellSnapshot {
    pub screen: Screen,
    pub greeting: &'static str,
    pub transcript: Vec<Message>,
    pub awaiting_reply: bool,
    pub current: Option<JournalEntry>,
    pub view_mode: bool,
    pub settings: Settings,
    pub stats: Stats,
    pub progress: Progress,
    pub entries: Vec<JournalEntry>,
}

pub struct AppShell {
    screen: Screen,
    journal: Journal,
    settings: Settings,
    history_port: Box<dyn StatePort<Vec<JournalEntry>>>,
    settings_port: Box<dyn StatePort<Settings>>,
    ring_delay: Duration,

    transcript: Vec<Message>,
    pending_turn: Option<u64>,
    turn_counter: u64,

    current: Option<JournalEntry>,
    view_mode: bool,
}

impl AppShell {
    /// Restore persisted state. Starts on the onboarding screen.
    pub fn load(
        history_port: Box<dyn StatePort<Vec<JournalEntry>>>,
        settings_port: Box<dyn StatePort<Settings>>,
        ring_delay: Duration,
    ) -> Self {
        let journal = Journal::new(history_port.load());
        let settings = settings_port.load();
        logging::log_shell(&format!("Loaded {} journal entries", journal.len()));

        Self {
            screen: Screen::Onboarding,
            journal,
            settings,
            history_port,
            settings_port,
            ring_delay,
            transcript: Vec::new(),
            pending_turn: None,
            turn_counter: 0,
            current: None,
            view_mode: false,
        }
    }

    pub fn screen(&self) -> Screen {
        self.screen
    }

    pub fn journal(&self) -> &Journal {
        &self.journal
    }

    pub fn settings(&self) -> Settings {
        self.settings
    }

    pub fn transcript(&self) -> &[Message] {
        &self.transcript
    }

    pub fn current(&self) -> Option<&JournalEntry> {
        self.current.as_ref()
    }

    pub fn is_view_mode(&self) -> bool {
        self.view_mode
    }

    pub fn awaiting_reply(&self) -> bool {
        self.pending_turn.is_some()
    }

    fn require(&self, action: &'static str, screen: Screen) -> Result<()> {
        if self.screen == screen {
            Ok(())
        } else {
            Err(EchoError::InvalidTransition {
                action,
                screen: self.screen.as_str(),
            })
        }
    }

    fn go(&mut self, next: Screen) {
        logging::log_shell(&format!("{} -> {}", self.screen.as_str(), next.as_str()));
        self.screen = next;
    }

    fn persist_history(&self) -> Result<()> {
        self.history_port.save(&self.journal.entries().to_vec()).map_err(|e| {
            logging::log_error(None, &format!("Failed to save journal: {}", e));
            e
        })
    }

    // ============ Screen transitions ============

    pub fn start(&mut self) -> Result<()> {
        self.require("start", Screen::Onboarding)?;
        self.go(Screen::Dashboard);
        Ok(())
    }

    /// The incoming call shows up after the ring delay
    pub async fn request_call(&mut self) -> Result<()> {
        let delay = self.check_call()?;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.ring()
    }

    /// First half of `request_call`: validate and return how long to wait
    /// before `ring`. Hosts wait without holding the shell.
    pub fn check_call(&self) -> Result<Duration> {
        self.require("request a call", Screen::Dashboard)?;
        Ok(self.ring_delay)
    }

    /// Show the incoming call, if the dashboard is still up
    pub fn ring(&mut self) -> Result<()> {
        self.require("request a call", Screen::Dashboard)?;
        self.go(Screen::Calling);
        Ok(())
    }

    pub fn accept_call(&mut self) -> Result<()> {
        self.require("accept a call", Screen::Calling)?;
        self.transcript.clear();
        self.pending_turn = None;
        self.go(Screen::Chatting);
        Ok(())
    }

    pub fn decline_call(&mut self) -> Result<()> {
        self.require("decline a call", Screen::Calling)?;
        self.go(Screen::Dashboard);
        Ok(())
    }

    /// Close the chat. With a result the conversation becomes a new journal
    /// entry shown on the result screen; without one it is discarded.
    ///
    /// A failed save is returned as an error, but the entry stays in memory.
    pub fn finish_chat(&mut self, result: Option<ConversationResult>) -> Result<Option<JournalEntry>> {
        self.require("finish a chat", Screen::Chatting)?;
        self.pending_turn = None;
        let conversation = std::mem::take(&mut self.transcript);

        let Some(result) = result else {
            logging::log_shell(&format!("Chat abandoned after {} messages", conversation.len()));
            self.go(Screen::Dashboard);
            return Ok(None);
        };

        let id = self.journal.next_id(Utc::now().timestamp_millis());
        logging::log_shell(&format!("New entry {} ({})", id, result.emotion));
        let entry = journal::new_entry(id, conversation, result, Utc::now());

        self.journal.record(entry.clone());
        self.current = Some(entry.clone());
        self.view_mode = false;
        self.go(Screen::Result);

        self.persist_history()?;
        Ok(Some(entry))
    }

    /// Leave the chat without saving anything
    pub fn hang_up(&mut self) -> Result<()> {
        self.finish_chat(None).map(|_| ())
    }

    pub fn view_entry(&mut self, id: i64) -> Result<JournalEntry> {
        self.require("view an entry", Screen::Dashboard)?;
        let entry = self.journal.get(id).cloned().ok_or(EchoError::EntryNotFound(id))?;
        self.current = Some(entry.clone());
        self.view_mode = true;
        self.go(Screen::Result);
        Ok(entry)
    }

    pub fn close_result(&mut self) -> Result<()> {
        self.require("close the result", Screen::Result)?;
        self.current = None;
        self.view_mode = false;
        self.go(Screen::Dashboard);
        Ok(())
    }

    // ============ Chat turns ============

    /// Append the user's message and hand back the transcript to send
    pub fn begin_turn(&mut self, text: &str) -> Result<Turn> {
        self.require("send a message", Screen::Chatting)?;
        if self.pending_turn.is_some() {
            return Err(EchoError::Busy);
        }
        let text = text.trim();
        if text.is_empty() {
            return Err(EchoError::EmptyMessage);
        }

        self.transcript.push(Message::user(text));
        self.turn_counter += 1;
        self.pending_turn = Some(self.turn_counter);

        Ok(Turn {
            id: self.turn_counter,
            transcript: self.transcript.clone(),
        })
    }

    fn owns_turn(&self, turn_id: u64) -> bool {
        self.screen == Screen::Chatting && self.pending_turn == Some(turn_id)
    }

    /// Record the finished reply. A result closes the chat.
    pub fn complete_turn(
        &mut self,
        turn_id: u64,
        reply: String,
        result: Option<ConversationResult>,
    ) -> Result<TurnOutcome> {
        if !self.owns_turn(turn_id) {
            return Ok(TurnOutcome::Aborted);
        }
        self.pending_turn = None;

        if !reply.is_empty() {
            self.transcript.push(Message::assistant(reply.clone()));
        }

        match result {
            Some(result) => match self.finish_chat(Some(result))? {
                Some(entry) => Ok(TurnOutcome::Finished { entry }),
                None => Ok(TurnOutcome::Aborted),
            },
            None => Ok(TurnOutcome::Continue { reply }),
        }
    }

    /// Drop the unanswered user message so it can be sent again.
    /// Returns its text when the turn was still outstanding.
    pub fn fail_turn(&mut self, turn_id: u64) -> Option<String> {
        if !self.owns_turn(turn_id) {
            return None;
        }
        self.pending_turn = None;
        self.transcript.pop().map(|m| m.content)
    }

    // ============ Journal ============

    pub fn toggle_completed(&mut self, id: i64) -> Result<bool> {
        if !self.journal.toggle_completed(id) {
            return Ok(false);
        }
        if let Some(current) = self.current.as_mut().filter(|c| c.id == id) {
            current.completed = !current.completed;
        }
        self.persist_history()?;
        Ok(true)
    }

    /// Returns false when the user declined or the entry does not exist
    pub fn delete_entry(&mut self, id: i64, confirm: &dyn Confirm) -> Result<bool> {
        if !confirm.confirm(DELETE_PROMPT) {
            return Ok(false);
        }
        if !self.journal.remove(id) {
            return Ok(false);
        }
        logging::log_shell(&format!("Deleted entry {}", id));
        self.persist_history()?;
        Ok(true)
    }

    /// Empty the journal and drop its storage key. Returns false when declined.
    pub fn clear_all(&mut self, confirm: &dyn Confirm) -> Result<bool> {
        if !confirm.confirm(CLEAR_PROMPT) {
            return Ok(false);
        }
        let removed = self.journal.len();
        self.journal.clear();
        logging::log_shell(&format!("Cleared {} entries", removed));
        self.history_port.clear()?;
        Ok(true)
    }

    pub fn update_setting(&mut self, key: SettingKey, value: bool) -> Result<Settings> {
        self.settings = self.settings.with(key, value);
        self.settings_port.save(&self.settings)?;
        Ok(self.settings)
    }

    pub fn stats(&self) -> Stats {
        self.journal.stats()
    }

    pub fn snapshot(&self) -> ShellSnapshot {
        ShellSnapshot {
            screen: self.screen,
            greeting: ECHO_GREETING,
            transcript: self.transcript.clone(),
            awaiting_reply: self.awaiting_reply(),
            current: self.current.clone(),
            view_mode: self.view_mode,
            settings: self.settings,
            stats: self.stats(),
            progress: journal::progress(self.journal.len()),
            entries: self.journal.entries().to_vec(),
        }
    }
}

/// Send one user message through `backend` and fold the reply into the shell.
///
/// The shell lock is only held between stream items, so the host can hang up
/// while the reply is streaming. `on_event` sees every event as it arrives.
pub async fn run_turn<B, F>(
    shell: &tokio::sync::Mutex<AppShell>,
    backend: &B,
    text: &str,
    cancel: CancellationToken,
    on_event: F,
) -> Result<TurnOutcome>
where
    B: ConversationBackend + ?Sized,
    F: FnMut(&ChatEvent) + Send,
{
    let turn = shell.lock().await.begin_turn(text)?;
    stream_turn(shell, backend, turn, cancel, on_event).await
}

/// Stream the reply for a turn already opened with `begin_turn`
pub async fn stream_turn<B, F>(
    shell: &tokio::sync::Mutex<AppShell>,
    backend: &B,
    turn: Turn,
    cancel: CancellationToken,
    mut on_event: F,
) -> Result<TurnOutcome>
where
    B: ConversationBackend + ?Sized,
    F: FnMut(&ChatEvent) + Send,
{
    let mut events = match backend.open(turn.transcript, cancel.clone()).await {
        Ok(events) => events,
        Err(e) => {
            shell.lock().await.fail_turn(turn.id);
            return Err(e);
        }
    };

    let mut reply = String::new();
    let mut result = None;
    while let Some(event) = events.next().await {
        let event = match event {
            Ok(event) => event,
            Err(e) => {
                shell.lock().await.fail_turn(turn.id);
                return Err(e);
            }
        };
        on_event(&event);
        match event {
            ChatEvent::TextChunk(chunk) => reply.push_str(&chunk),
            ChatEvent::Terminal(terminal) => result = Some(terminal.result),
        }
    }

    if cancel.is_cancelled() {
        shell.lock().await.fail_turn(turn.id);
        return Ok(TurnOutcome::Aborted);
    }
    shell.lock().await.complete_turn(turn.id, reply, result)
}

/// Cancellation handle of the turn currently streaming, tagged with its id
#[derive(Default)]
pub struct ActiveTurn {
    slot: std::sync::Mutex<Option<(u64, CancellationToken)>>,
}

impl ActiveTurn {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, Option<(u64, CancellationToken)>> {
        self.slot.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn arm(&self, turn_id: u64, cancel: CancellationToken) {
        *self.slot() = Some((turn_id, cancel));
    }

    /// Forget the handle, but only if it still belongs to `turn_id`
    pub fn release(&self, turn_id: u64) {
        let mut slot = self.slot();
        if slot.as_ref().is_some_and(|(id, _)| *id == turn_id) {
            *slot = None;
        }
    }

    /// Cancel whatever is streaming. Returns false when nothing was.
    pub fn cancel(&self) -> bool {
        match self.slot().take() {
            Some((_, cancel)) => {
                cancel.cancel();
                true
            }
            None => false,
        }
    }
}
