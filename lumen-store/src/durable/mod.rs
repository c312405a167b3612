//! Durable key-value store interface (tier 2)
//!
//! The store owns TTL enforcement: an entry past its expiry must read as
//! absent. The cache additionally checks the TTL recorded in its own
//! envelope, so a store that is lax about expiry never serves stale values.

mod file;
mod memory;

pub use file::FileDurableStore;
pub use memory::MemoryDurableStore;

use crate::error::Result;
use async_trait::async_trait;
use std::time::Duration;

/// A byte-oriented key-value store that survives process restarts.
#[async_trait]
pub trait DurableStore: Send + Sync {
    /// Short backend name used in logs
    fn name(&self) -> &str;

    /// Read a key; expired or missing keys read as `None`
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Write a key with an expiry measured from now
    async fn put(&self, key: &str, bytes: Vec<u8>, ttl: Duration) -> Result<()>;

    /// Delete a key; deleting a missing key is not an error
    async fn delete(&self, key: &str) -> Result<()>;
}
