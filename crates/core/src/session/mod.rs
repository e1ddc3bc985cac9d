//! Conversion sessions and their persistence.

mod memory;
mod redis;
mod store;
mod types;

pub use memory::MemoryStore;
pub use redis::RedisStore;
pub use store::{AssetEntry, SessionStore, StoreError};
pub use types::{AssetState, ConversionSession, MetaLite, SessionState};
