pub mod view;

use std::path::{Path, PathBuf};
use std::sync::{Arc, MutexGuard};

use duckdb::Connection;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::ChatConfig;
use crate::db::models::{Message, Role, Session, SessionId};
use crate::db::service::{DbService, StoreError};
use crate::db::DbPool;
use crate::dictation::{discard_audio, recording_path, DictationService, TranscriptionError};
use crate::llm::models::{ChatRequest, Message as LlmMessage, StreamEvent};
use crate::llm::{stream_chat, LlmProvider};
pub use view::{ChatView, ViewEvent};

const DEFAULT_TITLE: &str = "New Chat";

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error(transparent)]
    Storage(#[from] StoreError),
    #[error("Message is empty")]
    EmptyMessage,
    #[error("A recording is already in progress")]
    AlreadyRecording,
    #[error("No recording in progress")]
    NotRecording,
    #[error("Dictation is not available")]
    DictationUnavailable,
}

impl ControllerError {
    /// Only a failing database ends the interactive session; everything else
    /// aborts just the one command.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ControllerError::Storage(StoreError::Db(_)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatState {
    Idle,
    SessionActive(SessionId),
    Streaming { session_id: SessionId, buffer: String },
}

impl ChatState {
    pub fn session_id(&self) -> Option<SessionId> {
        match self {
            ChatState::Idle => None,
            ChatState::SessionActive(id) => Some(*id),
            ChatState::Streaming { session_id, .. } => Some(*session_id),
        }
    }
}

/// How a submitted message's reply ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyOutcome {
    /// The reply was persisted as this assistant message.
    Saved(Message),
    /// The stream finished without any text; nothing was persisted.
    Empty,
    /// The stream failed; the partial reply was discarded.
    Failed(String),
}

/// A transcription running on a blocking worker.
pub struct DictationJob {
    path: PathBuf,
    handle: JoinHandle<Result<String, TranscriptionError>>,
}

impl DictationJob {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn wait(self) -> Result<String, TranscriptionError> {
        match self.handle.await {
            Ok(result) => result,
            Err(e) => Err(TranscriptionError::Worker(e.to_string())),
        }
    }
}

/// Drives one chat window: the current session, the reply being streamed and
/// the dictation state. All display updates go through the `ChatView` passed
/// to each operation.
pub struct SessionController {
    pool: DbPool,
    llm: Arc<dyn LlmProvider>,
    dictation: Option<Arc<DictationService>>,
    chat: ChatConfig,
    audio_dir: PathBuf,
    fallback_model: String,
    model: String,
    state: ChatState,
    recording: Option<PathBuf>,
    input: String,
}

impl SessionController {
    pub fn new(pool: DbPool, llm: Arc<dyn LlmProvider>, chat: ChatConfig, default_model: impl Into<String>) -> Self {
        let default_model = default_model.into();
        Self {
            pool,
            llm,
            dictation: None,
            chat,
            audio_dir: std::env::temp_dir(),
            fallback_model: default_model.clone(),
            model: default_model,
            state: ChatState::Idle,
            recording: None,
            input: String::new(),
        }
    }

    pub fn with_dictation(mut self, service: Arc<DictationService>, audio_dir: impl Into<PathBuf>) -> Self {
        self.dictation = Some(service);
        self.audio_dir = audio_dir.into();
        self
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.pool.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn state(&self) -> &ChatState {
        &self.state
    }

    pub fn current_session(&self) -> Option<SessionId> {
        self.state.session_id()
    }

    pub fn is_recording(&self) -> bool {
        self.recording.is_some()
    }

    // --- Models ---

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn set_model(&mut self, model: impl Into<String>) {
        self.model = model.into();
    }

    /// Lists the server's models and keeps the current choice if it is still
    /// offered, otherwise picks the first one (or the configured default).
    pub async fn refresh_models(&mut self) -> Vec<String> {
        let models = self.llm.list_models().await;
        if !models.iter().any(|m| *m == self.model) {
            self.model = models.first().cloned().unwrap_or_else(|| self.fallback_model.clone());
        }
        models
    }

    // --- Sessions ---

    pub fn sessions(&self) -> Result<Vec<Session>, ControllerError> {
        Ok(DbService::list_sessions(&self.conn())?)
    }

    pub fn new_chat(&mut self, view: &mut dyn ChatView) {
        self.state = ChatState::Idle;
        view.render(ViewEvent::Cleared);
    }

    pub fn select_session(&mut self, id: SessionId, view: &mut dyn ChatView) -> Result<(), ControllerError> {
        let messages = {
            let conn = self.conn();
            if DbService::get_session(&conn, id)?.is_none() {
                return Err(StoreError::UnknownSession(id).into());
            }
            DbService::list_messages(&conn, id)?
        };

        self.state = ChatState::SessionActive(id);
        view.render(ViewEvent::Cleared);
        for m in messages {
            view.render(ViewEvent::Message {
                role: m.role,
                content: m.content,
            });
        }
        Ok(())
    }

    pub fn rename_current_session(&mut self, title: &str, view: &mut dyn ChatView) -> Result<(), ControllerError> {
        let Some(id) = self.current_session() else {
            return Ok(());
        };
        DbService::rename_session(&self.conn(), id, title)?;
        view.render(ViewEvent::SessionsChanged);
        Ok(())
    }

    pub fn delete_session(&mut self, id: SessionId, view: &mut dyn ChatView) -> Result<(), ControllerError> {
        DbService::delete_session(&self.conn(), id)?;

        if self.current_session() == Some(id) {
            self.state = ChatState::Idle;
            view.render(ViewEvent::Cleared);
        }
        view.render(ViewEvent::SessionsChanged);
        Ok(())
    }

    pub fn delete_current_session(&mut self, view: &mut dyn ChatView) -> Result<(), ControllerError> {
        match self.current_session() {
            Some(id) => self.delete_session(id, view),
            None => {
                self.new_chat(view);
                Ok(())
            }
        }
    }

    // --- Chat ---

    /// Sends `text` as the next user message and streams the reply into `view`.
    ///
    /// The controller stays mutably borrowed until the reply ends, so a second
    /// submission cannot start while one is streaming.
    pub async fn submit(&mut self, text: &str, view: &mut dyn ChatView) -> Result<ReplyOutcome, ControllerError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ControllerError::EmptyMessage);
        }

        let session_id = match self.current_session() {
            Some(id) => id,
            None => {
                let session = DbService::create_session(&self.conn(), &derive_title(text, self.chat.title_words))?;
                info!("Started session {} ({:?})", session.id, session.title);
                self.state = ChatState::SessionActive(session.id);
                view.render(ViewEvent::SessionsChanged);
                session.id
            }
        };

        if !self.input.is_empty() {
            self.input.clear();
            view.render(ViewEvent::InputChanged(String::new()));
        }

        let history = {
            let conn = self.conn();
            DbService::add_message(&conn, session_id, Role::User, text)?;
            DbService::list_messages(&conn, session_id)?
        };
        view.render(ViewEvent::Message {
            role: Role::User,
            content: text.to_string(),
        });

        let mut messages: Vec<LlmMessage> = Vec::with_capacity(history.len() + 1);
        if let Some(system) = self.chat.system_prompt.as_deref().filter(|s| !s.trim().is_empty()) {
            messages.push(LlmMessage::new(Role::System, system));
        }
        messages.extend(history.into_iter().map(LlmMessage::from));

        let request = ChatRequest {
            model: self.model.clone(),
            messages,
        };

        self.state = ChatState::Streaming {
            session_id,
            buffer: String::new(),
        };
        view.render(ViewEvent::ReplyStarted);

        let mut rx = stream_chat(self.llm.clone(), request, self.chat.stream_buffer);
        let mut failure = None;
        while let Some(event) = rx.recv().await {
            match event {
                StreamEvent::Fragment(fragment) => {
                    if let ChatState::Streaming { buffer, .. } = &mut self.state {
                        buffer.push_str(&fragment);
                    }
                    view.render(ViewEvent::Fragment(fragment));
                }
                StreamEvent::Done => break,
                StreamEvent::Error(message) => {
                    failure = Some(message);
                    break;
                }
            }
        }

        let reply = match std::mem::replace(&mut self.state, ChatState::SessionActive(session_id)) {
            ChatState::Streaming { buffer, .. } => buffer,
            _ => String::new(),
        };

        if let Some(message) = failure {
            warn!("Reply for session {} failed: {}", session_id, message);
            view.render(ViewEvent::ReplyFailed(format!("Error: {}", message)));
            return Ok(ReplyOutcome::Failed(message));
        }

        if reply.is_empty() {
            debug!("Empty reply for session {}, nothing saved", session_id);
            view.render(ViewEvent::ReplyFinished);
            return Ok(ReplyOutcome::Empty);
        }

        let saved = DbService::add_message(&self.conn(), session_id, Role::Assistant, &reply)?;
        view.render(ViewEvent::ReplyFinished);
        Ok(ReplyOutcome::Saved(saved))
    }

    // --- Dictation ---

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn set_input(&mut self, text: impl Into<String>) {
        self.input = text.into();
    }

    pub fn take_input(&mut self) -> String {
        std::mem::take(&mut self.input)
    }

    /// Reserves a fresh audio path for the external recorder to write to.
    pub fn start_recording(&mut self) -> Result<PathBuf, ControllerError> {
        if self.dictation.is_none() {
            return Err(ControllerError::DictationUnavailable);
        }
        if self.recording.is_some() {
            return Err(ControllerError::AlreadyRecording);
        }

        let path = recording_path(&self.audio_dir);
        debug!("Recording to {}", path.display());
        self.recording = Some(path.clone());
        Ok(path)
    }

    /// Hands the finished recording to a blocking worker. The audio file is
    /// removed once the worker is done with it.
    pub fn stop_recording(&mut self) -> Result<DictationJob, ControllerError> {
        let path = self.recording.take().ok_or(ControllerError::NotRecording)?;
        let service = self.dictation.clone().ok_or(ControllerError::DictationUnavailable)?;

        let audio = path.clone();
        let handle = tokio::task::spawn_blocking(move || {
            let result = service.transcribe(&audio);
            discard_audio(&audio);
            result
        });

        Ok(DictationJob { path, handle })
    }

    /// Appends a finished transcription to the pending input. Failures are
    /// logged and leave the input untouched.
    pub fn apply_dictation(&mut self, result: Result<String, TranscriptionError>, view: &mut dyn ChatView) -> &str {
        match result {
            Ok(text) => {
                let text = text.trim();
                if !text.is_empty() {
                    if !self.input.is_empty() && !self.input.ends_with(char::is_whitespace) {
                        self.input.push(' ');
                    }
                    self.input.push_str(text);
                    view.render(ViewEvent::InputChanged(self.input.clone()));
                }
            }
            Err(e) => warn!("Transcription error: {}", e),
        }
        &self.input
    }
}

/// The first `words` words of `text`, or "New Chat" when there are none.
pub fn derive_title(text: &str, words: usize) -> String {
    let title = text.split_whitespace().take(words.max(1)).collect::<Vec<_>>().join(" ");
    if title.is_empty() {
        DEFAULT_TITLE.to_string()
    } else {
        title
    }
}
