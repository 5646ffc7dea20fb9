//! Provider-facing contracts consumed by the gateway: messages, stream events,
//! the model provider trait, and the normalized provider error taxonomy.

mod credentials;
mod error;
mod model;
mod provider;
mod registry;
mod stream;

pub mod prelude {
    pub use crate::{
        BoxedEventStream, CredentialStore, InMemoryCredentialStore, Message, ModelProvider,
        ModelRequest, ProviderError, ProviderErrorKind, ProviderFuture, ProviderId,
        ProviderRegistry, Role, SecretString, StopReason, StreamEvent, TokenUsage, ToolCall,
        ToolDefinition, VecEventStream,
    };
}

pub use credentials::{CredentialStore, InMemoryCredentialStore, SecretString};
pub use error::{ProviderError, ProviderErrorKind};
pub use model::{
    Message, ModelRequest, ProviderId, Role, StopReason, TokenUsage, ToolCall, ToolDefinition,
};
pub use provider::{ModelProvider, ProviderFuture};
pub use registry::ProviderRegistry;
pub use stream::{BoxedEventStream, ModelEventStream, StreamEvent, VecEventStream};
