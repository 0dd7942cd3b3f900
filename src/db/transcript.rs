//! Plain-text session transcripts used by `session export` / `session import`.
//!
//! ```text
//! Session: <title>
//! ID: <id>
//! Created At: <timestamp>
//! ---
//! [USER]: first line
//! more lines
//! ---
//! [ASSISTANT]: reply
//! ---
//! ```
//!
//! Continuation lines that would read as a separator or a role line, or that
//! already start with `\`, are written with a leading `\`.

use std::fmt::Write;

use crate::db::models::{Message, Role, Session};

const SEPARATOR: &str = "---";
const ESCAPE: char = '\\';
const DEFAULT_TITLE: &str = "Imported Session";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedTranscript {
    pub title: String,
    pub messages: Vec<(Role, String)>,
}

pub fn export(session: &Session, messages: &[Message]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Session: {}", session.title);
    let _ = writeln!(out, "ID: {}", session.id);
    let _ = writeln!(out, "Created At: {}", session.created_at);
    let _ = writeln!(out, "{}", SEPARATOR);

    for m in messages {
        let mut lines = m.content.split('\n');
        let first = lines.next().unwrap_or_default();
        let _ = writeln!(out, "[{}]: {}", m.role.as_str().to_uppercase(), first);
        for line in lines {
            if needs_escape(line) {
                out.push(ESCAPE);
            }
            let _ = writeln!(out, "{}", line);
        }
        let _ = writeln!(out, "{}", SEPARATOR);
    }
    out
}

fn needs_escape(line: &str) -> bool {
    line == SEPARATOR || line.starts_with('[') || line.starts_with(ESCAPE)
}

pub fn parse(text: &str) -> ParsedTranscript {
    let mut lines = text.lines().peekable();

    let title = match lines.peek().and_then(|l| l.strip_prefix("Session: ")) {
        Some(title) => {
            let title = title.trim().to_string();
            lines.next();
            title
        }
        None => DEFAULT_TITLE.to_string(),
    };

    let mut messages = Vec::new();
    let mut current: Option<(Option<Role>, String)> = None;

    for line in lines {
        if line == SEPARATOR {
            push_block(&mut messages, current.take());
        } else if let Some((role, first_line)) = parse_role_line(line) {
            current = Some((role, first_line.to_string()));
        } else if let Some((_, content)) = current.as_mut() {
            content.push('\n');
            content.push_str(line.strip_prefix(ESCAPE).unwrap_or(line));
        }
    }

    // Tolerate a missing trailing separator
    push_block(&mut messages, current);

    ParsedTranscript { title, messages }
}

/// Keeps a finished block when it has a conversational role and some text.
/// System prompts come from configuration and are never imported.
fn push_block(messages: &mut Vec<(Role, String)>, block: Option<(Option<Role>, String)>) {
    if let Some((Some(role), content)) = block {
        if role != Role::System && !content.trim().is_empty() {
            messages.push((role, content));
        }
    }
}

/// `[ROLE]: text` -> (role if known, text). Unknown roles are kept as `None`
/// so their continuation lines are consumed and then dropped.
fn parse_role_line(line: &str) -> Option<(Option<Role>, &str)> {
    let rest = line.strip_prefix('[')?;
    let end = rest.find("]: ")?;
    let role = rest[..end].parse::<Role>().ok();
    Some((role, &rest[end + 3..]))
}
