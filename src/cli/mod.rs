pub mod commands;

use std::io::{self, Write};
use std::sync::Arc;

use thiserror::Error;

use crate::cli::commands::{Commands, SessionAction};
use crate::config::AppConfig;
use crate::controller::{ChatView, ControllerError, ReplyOutcome, SessionController, ViewEvent};
use crate::db::models::{Role, Session};
use crate::db::service::{DbService, StoreError};
use crate::db::{get_connection, transcript, DbPool};
use crate::dictation::{DictationService, TranscriptionError};
use crate::llm::ProviderFactory;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("Failed to load configuration: {0}")]
    Config(#[from] config::ConfigError),
    #[error("Failed to open database: {0}")]
    Database(#[from] duckdb::Error),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Controller(#[from] ControllerError),
    #[error(transparent)]
    Transcription(#[from] TranscriptionError),
    #[error("I/O Error: {0}")]
    Io(#[from] io::Error),
}

pub async fn run_cli(command: Commands, config_path: &str) -> Result<(), CliError> {
    let config = AppConfig::load(config_path)?;

    match command {
        Commands::Session { action } => {
            let pool = get_connection(&config.database)?;
            run_session_action(action, &pool)
        }
        Commands::Models => {
            let llm = ProviderFactory::create_default(&config);
            let models = llm.list_models().await;
            if models.is_empty() {
                println!("No models found at {}. Pull one with 'ollama pull <model>'.", config.ollama.base_url);
            }
            for (idx, model) in models.iter().enumerate() {
                println!("{}. {}", idx + 1, model);
            }
            Ok(())
        }
        Commands::Transcribe { path } => {
            let service = Arc::new(DictationService::from_config(&config.dictation));
            let text = tokio::task::spawn_blocking(move || service.transcribe(&path))
                .await
                .map_err(|e| TranscriptionError::Worker(e.to_string()))??;
            println!("{}", text);
            Ok(())
        }
        Commands::Chat { session, model } => run_repl(config, session, model).await,
    }
}

fn print_sessions(sessions: &[Session]) {
    if sessions.is_empty() {
        println!("No sessions found.");
        return;
    }
    println!("{:<8} | {:<26} | {}", "ID", "Created At", "Title");
    println!("{:-<8}-+-{:-<26}-+-{:-<20}", "", "", "");
    for s in sessions {
        println!("{:<8} | {:<26} | {}", s.id, s.created_at.format("%Y-%m-%d %H:%M:%S UTC"), s.title);
    }
}

fn run_session_action(action: SessionAction, pool: &DbPool) -> Result<(), CliError> {
    let conn = pool.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

    match action {
        SessionAction::Create { title } => {
            let session = DbService::create_session(&conn, &title)?;
            println!("Created Session: {} ({})", session.title, session.id);
        }
        SessionAction::List => {
            print_sessions(&DbService::list_sessions(&conn)?);
        }
        SessionAction::Show { id } => {
            let session = DbService::get_session(&conn, id)?.ok_or(StoreError::UnknownSession(id))?;
            println!("# {}", session.title);
            for m in DbService::list_messages(&conn, id)? {
                println!("\n[{}]\n{}", m.role.as_str().to_uppercase(), m.content);
            }
        }
        SessionAction::Rename { id, title } => {
            DbService::rename_session(&conn, id, &title)?;
            println!("Renamed session {} to {}", id, title);
        }
        SessionAction::Delete { id } => {
            DbService::delete_session(&conn, id)?;
            println!("Deleted session {}", id);
        }
        SessionAction::Export { id, path } => {
            let session = DbService::get_session(&conn, id)?.ok_or(StoreError::UnknownSession(id))?;
            let messages = DbService::list_messages(&conn, id)?;

            let export_path = path.unwrap_or_else(|| format!("session_{}.txt", id));
            std::fs::write(&export_path, transcript::export(&session, &messages))?;
            println!("Session exported successfully to: {}", export_path);
        }
        SessionAction::Import { path } => {
            let content = std::fs::read_to_string(&path)?;
            let parsed = transcript::parse(&content);
            let session = DbService::import_transcript(&conn, &parsed)?;
            println!(
                "Imported {} messages into session {} ({})",
                parsed.messages.len(),
                session.id,
                session.title
            );
        }
    }
    Ok(())
}

/// Prints controller updates to the terminal.
#[derive(Default)]
struct TerminalView {
    /// The user's own line is already on screen when they submit it.
    skip_user_echo: bool,
}

impl ChatView for TerminalView {
    fn render(&mut self, event: ViewEvent) {
        match event {
            ViewEvent::Cleared => println!("---------------------------"),
            ViewEvent::Message { role: Role::User, .. } if self.skip_user_echo => {
                self.skip_user_echo = false;
            }
            ViewEvent::Message { role, content } => {
                println!("{}> {}", speaker(role), content);
            }
            ViewEvent::SessionsChanged => {}
            ViewEvent::ReplyStarted => {
                print!("{}> ", speaker(Role::Assistant));
                let _ = io::stdout().flush();
            }
            ViewEvent::Fragment(text) => {
                print!("{}", text);
                let _ = io::stdout().flush();
            }
            ViewEvent::ReplyFinished => println!(),
            ViewEvent::ReplyFailed(error) => println!("\n{}", error),
            ViewEvent::InputChanged(text) if text.is_empty() => {}
            ViewEvent::InputChanged(text) => println!("[pending input] {}", text),
        }
    }
}

fn speaker(role: Role) -> &'static str {
    match role {
        Role::User => "User",
        Role::Assistant => "Assistant",
        Role::System => "System",
    }
}

fn read_line() -> io::Result<Option<String>> {
    let mut input = String::new();
    if io::stdin().read_line(&mut input)? == 0 {
        return Ok(None);
    }
    Ok(Some(input.trim().to_string()))
}

fn print_help() {
    println!("Commands:");
    println!("  /new              start a new chat");
    println!("  /sessions         list saved sessions");
    println!("  /open ID          switch to a saved session");
    println!("  /rename TITLE     rename the current session");
    println!("  /delete [ID]      delete a session (default: current)");
    println!("  /models           list models");
    println!("  /model NAME       switch model");
    println!("  /record           reserve a recording file for dictation");
    println!("  /stop             transcribe the recording into the input");
    println!("  /send             send the pending dictated input");
    println!("  /exit             quit");
}

async fn run_repl(config: AppConfig, session: Option<i64>, model: Option<String>) -> Result<(), CliError> {
    let pool = get_connection(&config.database)?;
    let llm = ProviderFactory::create_default(&config);
    let dictation = Arc::new(DictationService::from_config(&config.dictation));

    let mut controller = SessionController::new(pool, llm, config.chat.clone(), config.ollama.default_model.clone())
        .with_dictation(dictation, config.dictation.audio_dir());
    let mut view = TerminalView::default();

    controller.refresh_models().await;
    if let Some(model) = model {
        controller.set_model(model);
    }

    println!("--- Ollama Chat ---");
    println!("Model: {}", controller.model());
    println!("Type /help for commands, /exit to quit.");
    println!("-------------------");

    if let Some(id) = session {
        controller.select_session(id, &mut view)?;
    }

    loop {
        print!("\nUser> ");
        io::stdout().flush()?;

        let Some(line) = read_line()? else { break };
        let (command, arg) = match line.split_once(' ') {
            Some((command, arg)) => (command, arg.trim()),
            None => (line.as_str(), ""),
        };

        let result = match command {
            "" => continue,
            "/exit" | "/quit" => break,
            "/help" => {
                print_help();
                Ok(())
            }
            "/new" => {
                controller.new_chat(&mut view);
                Ok(())
            }
            "/sessions" => controller.sessions().map(|s| print_sessions(&s)),
            "/open" => match arg.parse() {
                Ok(id) => controller.select_session(id, &mut view),
                Err(_) => {
                    println!("Usage: /open ID");
                    Ok(())
                }
            },
            "/rename" if !arg.is_empty() => controller.rename_current_session(arg, &mut view),
            "/delete" if arg.is_empty() => controller.delete_current_session(&mut view),
            "/delete" => match arg.parse() {
                Ok(id) => controller.delete_session(id, &mut view),
                Err(_) => {
                    println!("Usage: /delete [ID]");
                    Ok(())
                }
            },
            "/models" => {
                for m in controller.refresh_models().await {
                    let marker = if m == controller.model() { "*" } else { " " };
                    println!("{} {}", marker, m);
                }
                Ok(())
            }
            "/model" if !arg.is_empty() => {
                controller.set_model(arg);
                println!("Model: {}", controller.model());
                Ok(())
            }
            "/record" => controller.start_recording().map(|path| {
                println!("Recording to {}", path.display());
                println!("Write the audio there (e.g. arecord -f S16_LE -r 16000 {}), then /stop.", path.display());
            }),
            "/stop" => match controller.stop_recording() {
                Ok(job) => {
                    println!("Processing audio...");
                    let result = job.wait().await;
                    if let Err(e) = &result {
                        println!("{}", e);
                    }
                    controller.apply_dictation(result, &mut view);
                    Ok(())
                }
                Err(e) => Err(e),
            },
            "/rename" | "/model" => {
                println!("Usage: {} NAME", command);
                Ok(())
            }
            "/send" => {
                let pending = controller.take_input();
                view.skip_user_echo = false;
                send(&mut controller, &mut view, &pending).await
            }
            _ if command.starts_with('/') => {
                println!("Unknown command {}. Type /help.", command);
                Ok(())
            }
            _ => {
                let pending = controller.take_input();
                let text = if pending.is_empty() { line.clone() } else { format!("{} {}", pending, line) };
                view.skip_user_echo = pending.is_empty();
                send(&mut controller, &mut view, &text).await
            }
        };

        if let Err(e) = result {
            if e.is_fatal() {
                return Err(e.into());
            }
            println!("{}", e);
        }
    }

    Ok(())
}

async fn send(controller: &mut SessionController, view: &mut TerminalView, text: &str) -> Result<(), ControllerError> {
    match controller.submit(text, view).await {
        Ok(ReplyOutcome::Empty) => println!("(empty reply)"),
        Ok(_) => {}
        Err(ControllerError::EmptyMessage) => println!("Nothing to send."),
        Err(e) => return Err(e),
    }
    Ok(())
}
