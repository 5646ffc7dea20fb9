//! Shared utilities and strongly-typed common values for workspace crates.
//!
//! ```rust
//! use tcommon::{CollectionId, MetadataMap, ThreadId, TraceId};
//!
//! let thread = ThreadId::from("thread-1");
//! let collection = CollectionId::new("history-1");
//! let trace = TraceId::new("trace-1");
//! let mut metadata = MetadataMap::new();
//! metadata.insert("tenant".to_string(), "acme".to_string());
//!
//! assert_eq!(thread.as_str(), "thread-1");
//! assert_eq!(collection.to_string(), "history-1");
//! assert_eq!(trace.to_string(), "trace-1");
//! ```

pub mod future {
    //! Shared async future aliases.
    //!
    //! ```rust
    //! use tcommon::BoxFuture;
    //!
    //! fn str_len<'a>(value: &'a str) -> BoxFuture<'a, usize> {
    //!     Box::pin(async move { value.len() })
    //! }
    //!
    //! let _future = str_len("hello");
    //! ```

    use std::future::Future;
    use std::pin::Pin;

    pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
}

pub mod context {
    //! Shared metadata and cross-crate identifier newtypes.

    use std::collections::HashMap;
    use std::fmt::{Display, Formatter};

    use serde::{Deserialize, Serialize};

    pub type MetadataMap = HashMap<String, String>;

    macro_rules! string_id {
        ($(#[$meta:meta])* $name:ident) => {
            $(#[$meta])*
            #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
            #[serde(transparent)]
            pub struct $name(String);

            impl $name {
                pub fn new(value: impl Into<String>) -> Self {
                    Self(value.into())
                }

                pub fn as_str(&self) -> &str {
                    self.0.as_str()
                }

                pub fn is_blank(&self) -> bool {
                    self.0.trim().is_empty()
                }
            }

            impl Display for $name {
                fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
                    f.write_str(&self.0)
                }
            }

            impl From<String> for $name {
                fn from(value: String) -> Self {
                    Self(value)
                }
            }

            impl From<&str> for $name {
                fn from(value: &str) -> Self {
                    Self(value.to_string())
                }
            }
        };
    }

    string_id!(
        /// Identifies one conversation thread in the transcript store.
        ThreadId
    );

    string_id!(
        /// Identifies the running memory buffer a thread's history is recalled from.
        CollectionId
    );

    string_id!(TraceId);
}

pub use context::{CollectionId, MetadataMap, ThreadId, TraceId};
pub use future::BoxFuture;
