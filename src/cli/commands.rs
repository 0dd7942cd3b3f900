use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::db::models::SessionId;

#[derive(Parser)]
#[command(name = "ochat", version, about = "Chat with a local Ollama server", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Override the config file path globally
    #[arg(short, long, global = true, default_value = "config.yaml")]
    pub config: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Enter the interactive chat REPL
    Chat {
        /// Resume an existing session instead of starting a new one
        #[arg(short, long)]
        session: Option<SessionId>,

        /// Model to chat with (defaults to the first one the server lists)
        #[arg(short, long)]
        model: Option<String>,
    },

    /// List the models available on the server
    Models,

    /// Manage chat sessions
    Session {
        #[command(subcommand)]
        action: SessionAction,
    },

    /// Transcribe an audio file with the configured speech model
    Transcribe {
        /// Path to a WAV recording
        path: PathBuf,
    },
}

#[derive(Subcommand)]
pub enum SessionAction {
    /// Create an empty session
    Create {
        #[arg(short, long, default_value = "New Chat")]
        title: String,
    },

    /// List all sessions, newest first
    List,

    /// Print the messages of a session
    Show { id: SessionId },

    /// Change the title of a session
    Rename { id: SessionId, title: String },

    /// Delete a session and all of its messages
    Delete { id: SessionId },

    /// Export a session to a .txt file
    Export {
        id: SessionId,
        /// The path to the output file (optional)
        #[arg(short, long)]
        path: Option<String>,
    },

    /// Import a session from a .txt file
    Import {
        #[arg(short, long)]
        path: String,
    },
}
