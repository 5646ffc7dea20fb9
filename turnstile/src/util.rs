//! Small convenience constructors for common types.

use crate::{CollectionId, Message, ProviderId, Role, Session, ThreadId, TurnInput};

pub fn system_message(content: impl Into<String>) -> Message {
    Message::new(Role::System, content)
}

pub fn user_message(content: impl Into<String>) -> Message {
    Message::new(Role::User, content)
}

pub fn assistant_message(content: impl Into<String>) -> Message {
    Message::new(Role::Assistant, content)
}

pub fn session(
    account_id: impl Into<String>,
    provider: ProviderId,
    model: impl Into<String>,
) -> Session {
    Session::new(account_id, provider, model)
}

/// A turn whose memory lives in a collection named after the thread.
pub fn turn(thread_id: impl Into<ThreadId>, user_text: impl Into<String>) -> TurnInput {
    let thread_id = thread_id.into();
    let collection = CollectionId::new(thread_id.as_str());
    TurnInput::new(thread_id, collection, user_text)
}

pub fn regenerate_turn(thread_id: impl Into<ThreadId>) -> TurnInput {
    turn(thread_id, "").regenerate()
}

pub fn parse_provider_id(value: &str) -> Option<ProviderId> {
    match value.trim().to_ascii_lowercase().as_str() {
        "local" => Some(ProviderId::Ollama),
        other => ProviderId::parse(other),
    }
}
