use crate::db::models::Role;

/// Updates the controller pushes to whatever is displaying the chat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewEvent {
    /// Drop every bubble currently shown.
    Cleared,
    /// A complete message bubble, in history order.
    Message { role: Role, content: String },
    /// The session list changed (created, deleted, renamed).
    SessionsChanged,
    /// An assistant bubble opened and is waiting for its first fragment.
    ReplyStarted,
    /// Text to append to the open assistant bubble.
    Fragment(String),
    ReplyFinished,
    /// The open assistant bubble shows this error instead of a reply.
    ReplyFailed(String),
    /// The pending input text was replaced.
    InputChanged(String),
}

pub trait ChatView {
    fn render(&mut self, event: ViewEvent);
}

/// Keeps every event; useful for headless callers and tests.
impl ChatView for Vec<ViewEvent> {
    fn render(&mut self, event: ViewEvent) {
        self.push(event);
    }
}
