//! 键值存储
//!
//! 上传记录和其它应用数据（例如 `documents`）共用同一个命名空间，
//! 所以清理逻辑必须按键前缀过滤，不能假设所有键都是上传记录。

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::StoreError;

/// 异步键值存储
///
/// 不提供事务；读-改-写的串行化由上层（`RecordStore`）负责。
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<JsonValue>, StoreError>;

    async fn set(&self, key: &str, value: JsonValue) -> Result<(), StoreError>;

    async fn remove(&self, key: &str) -> Result<(), StoreError>;

    /// 列出所有键
    async fn keys(&self) -> Result<Vec<String>, StoreError>;
}

/// 内存存储，进程退出后数据丢失
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: RwLock<BTreeMap<String, JsonValue>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn poisoned() -> StoreError {
        StoreError::Unavailable("内存存储锁已损坏".to_string())
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<JsonValue>, StoreError> {
        let data = self.data.read().map_err(|_| Self::poisoned())?;
        Ok(data.get(key).cloned())
    }

    async fn set(&self, key: &str, value: JsonValue) -> Result<(), StoreError> {
        let mut data = self.data.write().map_err(|_| Self::poisoned())?;
        data.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        let mut data = self.data.write().map_err(|_| Self::poisoned())?;
        data.remove(key);
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>, StoreError> {
        let data = self.data.read().map_err(|_| Self::poisoned())?;
        Ok(data.keys().cloned().collect())
    }
}

/// JSON 文件存储
///
/// 整个命名空间保存在一个 JSON 对象里，每次写入都整体落盘（先写临时文件再重命名），
/// 进程重启后数据仍然存在。
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    data: Mutex<BTreeMap<String, JsonValue>>,
}

impl FileStore {
    /// 打开存储文件，文件不存在时从空数据开始
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let data = match fs::read_to_string(&path).await {
            Ok(content) if content.trim().is_empty() => BTreeMap::new(),
            Ok(content) => serde_json::from_str(&content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(io_error(&path, e)),
        };
        debug!("打开存储文件: {} ({} 个键)", path.display(), data.len());
        Ok(Self {
            path,
            data: Mutex::new(data),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn flush(&self, data: &BTreeMap<String, JsonValue>) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .await
                    .map_err(|e| io_error(parent, e))?;
            }
        }
        let content = serde_json::to_string_pretty(data)?;
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, content)
            .await
            .map_err(|e| io_error(&tmp, e))?;
        fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| io_error(&self.path, e))?;
        Ok(())
    }
}

#[async_trait]
impl KvStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<JsonValue>, StoreError> {
        let data = self.data.lock().await;
        Ok(data.get(key).cloned())
    }

    async fn set(&self, key: &str, value: JsonValue) -> Result<(), StoreError> {
        let mut data = self.data.lock().await;
        let previous = data.insert(key.to_string(), value);
        if let Err(e) = self.flush(&data).await {
            // 落盘失败时恢复内存中的旧值
            match previous {
                Some(old) => data.insert(key.to_string(), old),
                None => data.remove(key),
            };
            return Err(e);
        }
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        let mut data = self.data.lock().await;
        if let Some(old) = data.remove(key) {
            if let Err(e) = self.flush(&data).await {
                data.insert(key.to_string(), old);
                return Err(e);
            }
        }
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>, StoreError> {
        let data = self.data.lock().await;
        Ok(data.keys().cloned().collect())
    }
}

fn io_error(path: &Path, source: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.display().to_string(),
        source,
    }
}
