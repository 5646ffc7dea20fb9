//! Event relay: turns model and tool output into paced outbound events.
//!
//! ```rust
//! use tgateway::chunk_text;
//!
//! assert_eq!(chunk_text("Hello, world", 5), vec!["Hello", ", wor", "ld"]);
//! assert_eq!(chunk_text("héllo!", 5), vec!["héllo", "!"]);
//! ```

use std::time::Duration;

use serde_json::{Value, json};
use tcommon::BoxFuture;

use crate::sink::{CancelReason, OutboundSink};
use crate::{GatewayError, OutboundEvent};

/// Enriches buffered annotation URLs into the final citations payload.
pub trait AnnotationResolver: Send + Sync {
    fn resolve<'a>(&'a self, urls: &'a [String]) -> BoxFuture<'a, Result<Value, GatewayError>>;
}

/// Emits each distinct URL once, numbered in arrival order.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassthroughAnnotationResolver;

impl AnnotationResolver for PassthroughAnnotationResolver {
    fn resolve<'a>(&'a self, urls: &'a [String]) -> BoxFuture<'a, Result<Value, GatewayError>> {
        Box::pin(async move {
            let mut seen = Vec::<&str>::new();
            for url in urls {
                if !seen.contains(&url.as_str()) {
                    seen.push(url);
                }
            }

            let citations: Vec<Value> = seen
                .iter()
                .enumerate()
                .map(|(index, url)| json!({ "index": index + 1, "url": url }))
                .collect();
            Ok(Value::Array(citations))
        })
    }
}

/// Splits text into pieces of at most `chunk_size` characters. Counting
/// characters keeps every piece valid UTF-8.
pub fn chunk_text(text: &str, chunk_size: usize) -> Vec<&str> {
    let size = chunk_size.max(1);
    let mut chunks = Vec::new();
    let mut start = 0;

    for (count, (index, _)) in text.char_indices().enumerate() {
        if count > 0 && count % size == 0 {
            chunks.push(&text[start..index]);
            start = index;
        }
    }

    if start < text.len() {
        chunks.push(&text[start..]);
    }

    chunks
}

/// Per-turn relay state. Not shared between turns.
#[derive(Debug)]
pub(crate) struct EventRelay {
    chunk_size: usize,
    delay: Duration,
    annotations: Vec<String>,
    suppressed: String,
}

impl EventRelay {
    pub(crate) fn new(chunk_size: usize, delay: Duration) -> Self {
        Self {
            chunk_size,
            delay,
            annotations: Vec::new(),
            suppressed: String::new(),
        }
    }

    pub(crate) async fn text(&self, sink: &OutboundSink, text: &str) -> Result<(), CancelReason> {
        for chunk in chunk_text(text, self.chunk_size) {
            sink.send(OutboundEvent::TextDelta(chunk.to_string())).await?;
            sink.pause(self.delay).await?;
        }

        Ok(())
    }

    /// Relays a streaming tool's chunk as-is, keeping the per-chunk delay.
    pub(crate) async fn forward(
        &self,
        sink: &OutboundSink,
        chunk: String,
    ) -> Result<(), CancelReason> {
        if chunk.is_empty() {
            return Ok(());
        }

        sink.send(OutboundEvent::TextDelta(chunk)).await?;
        sink.pause(self.delay).await
    }

    /// Records partial `tool_use` content without relaying it.
    pub(crate) fn suppress(&mut self, partial: &str) {
        self.suppressed.push_str(partial);
    }

    pub(crate) fn suppressed(&self) -> &str {
        &self.suppressed
    }

    pub(crate) fn annotate(&mut self, url: String) {
        self.annotations.push(url);
    }

    /// Resolves buffered annotations into one citations event. A resolver
    /// failure degrades to an empty list.
    pub(crate) async fn citations(
        &mut self,
        resolver: &dyn AnnotationResolver,
    ) -> Option<OutboundEvent> {
        if self.annotations.is_empty() {
            return None;
        }

        let urls = std::mem::take(&mut self.annotations);
        let citations = match resolver.resolve(&urls).await {
            Ok(citations) => citations,
            Err(error) => {
                tracing::warn!(
                    phase = "relay",
                    event = "annotation_resolution_failed",
                    annotations = urls.len(),
                    error = %error
                );
                Value::Array(Vec::new())
            }
        };

        Some(OutboundEvent::Citations(citations))
    }
}
