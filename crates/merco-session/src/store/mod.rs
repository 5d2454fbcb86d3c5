//! Remote source store.
//!
//! The store is the source of truth for strategy sources. The session never
//! writes files itself; everything goes through a [`SourceStore`]:
//!
//! - **HttpStore**: the strategy server's REST endpoints
//! - **MemoryStore**: in-process, ephemeral (offline sessions, tests)

mod http;
mod memory;
mod traits;

pub use http::{HttpStore, DEFAULT_TIMEOUT};
pub use memory::{MemoryStore, StoreStats};
pub use traits::{NodeEntry, NodeKind, SourceNode, SourceStore};
