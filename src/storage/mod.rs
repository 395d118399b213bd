//! 持久化键值存储
//!
//! 只提供按 key 读写 JSON 的能力，同一个 key 后写覆盖先写。

pub mod file_store;
pub mod memory_store;

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use crate::error::AppResult;

pub use file_store::JsonFileStore;
pub use memory_store::MemoryStore;

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> AppResult<Option<JsonValue>>;
    async fn set(&self, key: &str, value: JsonValue) -> AppResult<()>;
    async fn remove(&self, key: &str) -> AppResult<()>;
}
