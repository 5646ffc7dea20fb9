/// Creates a single chat [`Message`](crate::Message) from a role shorthand.
///
/// ```rust
/// use turnstile::{Role, ts_msg};
///
/// let message = ts_msg!(assistant => "Refunds take five days.");
/// assert_eq!(message.role, Role::Assistant);
/// ```
#[macro_export]
macro_rules! ts_msg {
    (system => $content:expr $(,)?) => {
        $crate::Message::new($crate::Role::System, $content)
    };
    (user => $content:expr $(,)?) => {
        $crate::Message::new($crate::Role::User, $content)
    };
    (assistant => $content:expr $(,)?) => {
        $crate::Message::new($crate::Role::Assistant, $content)
    };
    (tool => $content:expr $(,)?) => {
        $crate::Message::new($crate::Role::Tool, $content)
    };
    ($role:ident => $content:expr $(,)?) => {
        compile_error!("unsupported role: use system, user, assistant, or tool");
    };
}

/// Creates a `Vec<Message>` from role/content pairs.
///
/// ```rust
/// use turnstile::{Role, ts_messages};
///
/// let messages = ts_messages![
///     system => "You are concise.",
///     user => "Where is my order?",
/// ];
///
/// assert_eq!(messages.len(), 2);
/// assert_eq!(messages[1].role, Role::User);
/// ```
#[macro_export]
macro_rules! ts_messages {
    () => {
        Vec::<$crate::Message>::new()
    };
    ($($role:ident => $content:expr),+ $(,)?) => {
        vec![$($crate::ts_msg!($role => $content)),+]
    };
}

/// Creates a gateway [`Session`](crate::Session) with provider shorthand support.
///
/// Optional `persona = ..` and `billing = ..` arguments follow the model.
///
/// ```rust
/// use turnstile::{ProviderId, ts_session};
///
/// let session = ts_session!("acct-1", openai, "gpt-4o-mini", persona = "Be concise.");
/// assert_eq!(session.provider, ProviderId::OpenAi);
/// assert_eq!(session.persona.as_deref(), Some("Be concise."));
/// ```
#[macro_export]
macro_rules! ts_session {
    (@provider openai) => { $crate::ProviderId::OpenAi };
    (@provider anthropic) => { $crate::ProviderId::Anthropic };
    (@provider claude) => { $crate::ProviderId::Anthropic };
    (@provider gemini) => { $crate::ProviderId::Gemini };
    (@provider ollama) => { $crate::ProviderId::Ollama };
    (@provider local) => { $crate::ProviderId::Ollama };
    (@provider $other:ident) => {
        compile_error!("unsupported provider: use openai, anthropic, claude, gemini, ollama, or local")
    };
    ($account_id:expr, $provider:ident, $model:expr $(,)?) => {
        $crate::Session::new($account_id, $crate::ts_session!(@provider $provider), $model)
    };
    ($account_id:expr, $provider:ident, $model:expr, persona = $persona:expr $(,)?) => {
        $crate::ts_session!($account_id, $provider, $model).with_persona($persona)
    };
    ($account_id:expr, $provider:ident, $model:expr, billing = $billing:expr $(,)?) => {
        $crate::ts_session!($account_id, $provider, $model).with_billing($billing)
    };
    (
        $account_id:expr,
        $provider:ident,
        $model:expr,
        persona = $persona:expr,
        billing = $billing:expr $(,)?
    ) => {
        $crate::ts_session!($account_id, $provider, $model)
            .with_persona($persona)
            .with_billing($billing)
    };
}
