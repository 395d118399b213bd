use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{AppResult, StorageError};
use crate::storage::KeyValueStore;

/// 文件存储：目录下每个 key 一个 JSON 文件
///
/// 写入先落到临时文件再改名，同一个存储上的写入依次进行，
/// 临时文件不会被两个写入者同时截断。
pub struct JsonFileStore {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    pub async fn open(dir: impl AsRef<Path>) -> AppResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| StorageError::WriteFailed {
                key: dir.display().to_string(),
                message: e.to_string(),
            })?;
        Ok(Self {
            dir,
            write_lock: Mutex::new(()),
        })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let file_name: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("{}.json", file_name))
    }
}

#[async_trait]
impl KeyValueStore for JsonFileStore {
    async fn get(&self, key: &str) -> AppResult<Option<JsonValue>> {
        let path = self.path_for(key);
        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(StorageError::ReadFailed {
                    key: key.to_string(),
                    message: e.to_string(),
                }
                .into())
            }
        };
        let value = serde_json::from_str(&content).map_err(|e| StorageError::Corrupted {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        Ok(Some(value))
    }

    async fn set(&self, key: &str, value: JsonValue) -> AppResult<()> {
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        let body = serde_json::to_vec_pretty(&value).map_err(|e| StorageError::WriteFailed {
            key: key.to_string(),
            message: e.to_string(),
        })?;

        let write_failed = |e: std::io::Error| StorageError::WriteFailed {
            key: key.to_string(),
            message: e.to_string(),
        };
        let _write = self.write_lock.lock().await;
        fs::write(&tmp, body).await.map_err(write_failed)?;
        fs::rename(&tmp, &path).await.map_err(write_failed)?;

        debug!("已写入 {}", path.display());
        Ok(())
    }

    async fn remove(&self, key: &str) -> AppResult<()> {
        let _write = self.write_lock.lock().await;
        match fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::WriteFailed {
                key: key.to_string(),
                message: e.to_string(),
            }
            .into()),
        }
    }
}
