use std::future::Future;
use std::pin::Pin;

use crate::{BoxedEventStream, ModelRequest, ProviderError, ProviderId};

pub type ProviderFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A model integration. Implementations are shared read-only across turns and
/// must report failures as [`ProviderError`] values, never panics.
pub trait ModelProvider: Send + Sync {
    fn id(&self) -> ProviderId;

    fn stream<'a>(
        &'a self,
        request: ModelRequest,
    ) -> ProviderFuture<'a, Result<BoxedEventStream<'a>, ProviderError>>;
}
