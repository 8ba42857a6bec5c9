//! 上传记录存储
//!
//! 在 `KvStore` 之上提供类型化的上传记录读写。底层存储没有事务，
//! 同一个上传 ID 的所有写操作都要先拿到该 ID 的锁，读-改-写因此不会丢失更新。

use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::error::StoreError;
use crate::infrastructure::store::KvStore;
use crate::models::{record_key, UploadId, UploadRecord, RECORD_KEY_PREFIX};

type LockMap = HashMap<UploadId, Arc<AsyncMutex<()>>>;

/// 上传记录存储
#[derive(Clone)]
pub struct RecordStore {
    store: Arc<dyn KvStore>,
    locks: Arc<Mutex<LockMap>>,
}

impl RecordStore {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self {
            store,
            locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// 读取记录（不加锁，只读方使用）
    pub async fn get(&self, id: &UploadId) -> Result<Option<UploadRecord>, StoreError> {
        read_record(self.store.as_ref(), id).await
    }

    /// 获取某个 ID 的写锁
    pub async fn lock(&self, id: &UploadId) -> RecordTxn<'_> {
        let mutex = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            locks.entry(id.clone()).or_default().clone()
        };
        let guard = mutex.lock_owned().await;
        RecordTxn {
            records: self,
            id: id.clone(),
            guard: Some(guard),
        }
    }

    /// 写入新记录；同一个 ID 已存在时返回 `AlreadyExists`
    pub async fn create(&self, record: &UploadRecord) -> Result<(), StoreError> {
        let txn = self.lock(&record.id).await;
        if txn.load().await?.is_some() {
            return Err(StoreError::AlreadyExists {
                key: record_key(&record.id),
            });
        }
        txn.save(record).await
    }

    /// 读-改-写：记录不存在时返回 `None`，不会凭空创建记录
    pub async fn update<F>(&self, id: &UploadId, f: F) -> Result<Option<UploadRecord>, StoreError>
    where
        F: FnOnce(&mut UploadRecord),
    {
        let txn = self.lock(id).await;
        let Some(mut record) = txn.load().await? else {
            return Ok(None);
        };
        f(&mut record);
        txn.save(&record).await?;
        Ok(Some(record))
    }

    pub async fn delete(&self, id: &UploadId) -> Result<(), StoreError> {
        self.lock(id).await.remove().await
    }

    /// 列出命名空间中所有上传记录的键
    pub async fn record_keys(&self) -> Result<Vec<String>, StoreError> {
        let keys = self.store.keys().await?;
        Ok(keys
            .into_iter()
            .filter(|key| key.starts_with(RECORD_KEY_PREFIX))
            .collect())
    }

    /// 读取记录键对应的原始 JSON
    pub async fn raw(&self, key: &str) -> Result<Option<JsonValue>, StoreError> {
        self.store.get(key).await
    }

    /// 当前持有锁表项的 ID 数量
    pub fn lock_entries(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn release(&self, id: &UploadId) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        if locks
            .get(id)
            .is_some_and(|mutex| Arc::strong_count(mutex) == 1)
        {
            locks.remove(id);
        }
    }
}

/// 持有某个上传 ID 写锁期间的读写句柄
pub struct RecordTxn<'a> {
    records: &'a RecordStore,
    id: UploadId,
    guard: Option<OwnedMutexGuard<()>>,
}

impl RecordTxn<'_> {
    pub async fn load(&self) -> Result<Option<UploadRecord>, StoreError> {
        read_record(self.records.store.as_ref(), &self.id).await
    }

    pub async fn save(&self, record: &UploadRecord) -> Result<(), StoreError> {
        let value = serde_json::to_value(record)?;
        self.records.store.set(&record_key(&self.id), value).await
    }

    pub async fn remove(&self) -> Result<(), StoreError> {
        self.records.store.remove(&record_key(&self.id)).await
    }
}

impl Drop for RecordTxn<'_> {
    fn drop(&mut self) {
        self.guard.take();
        self.records.release(&self.id);
    }
}

async fn read_record(
    store: &dyn KvStore,
    id: &UploadId,
) -> Result<Option<UploadRecord>, StoreError> {
    match store.get(&record_key(id)).await? {
        Some(value) => Ok(Some(serde_json::from_value(value)?)),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::store::MemoryStore;
    use crate::models::{PayloadKind, UploadPayload, UploadStatus};
    use async_trait::async_trait;
    use serde_json::json;
    use std::time::Duration;

    /// 每次读取都会暂停一段时间的存储，用来制造读-改-写交错
    struct SlowStore {
        inner: MemoryStore,
        delay: Duration,
    }

    #[async_trait]
    impl KvStore for SlowStore {
        async fn get(&self, key: &str) -> Result<Option<JsonValue>, StoreError> {
            let value = self.inner.get(key).await;
            tokio::time::sleep(self.delay).await;
            value
        }

        async fn set(&self, key: &str, value: JsonValue) -> Result<(), StoreError> {
            self.inner.set(key, value).await
        }

        async fn remove(&self, key: &str) -> Result<(), StoreError> {
            self.inner.remove(key).await
        }

        async fn keys(&self) -> Result<Vec<String>, StoreError> {
            self.inner.keys().await
        }
    }

    fn new_record(id: &str) -> UploadRecord {
        UploadRecord::new(
            UploadId::new(id),
            UploadPayload::new(PayloadKind::Resume, "Acme Corp"),
            1_000,
        )
    }

    #[tokio::test]
    async fn test_create_rejects_duplicate_id() {
        let records = RecordStore::new(Arc::new(MemoryStore::new()));
        records.create(&new_record("1")).await.unwrap();
        let err = records.create(&new_record("1")).await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists { .. }));
    }

    #[tokio::test]
    async fn test_update_missing_record_does_not_create() {
        let records = RecordStore::new(Arc::new(MemoryStore::new()));
        let id = UploadId::new("404");
        let result = records
            .update(&id, |rec| rec.surface_ready = true)
            .await
            .unwrap();
        assert!(result.is_none());
        assert!(records.get(&id).await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_interleaved_updates_are_not_lost() {
        let records = RecordStore::new(Arc::new(SlowStore {
            inner: MemoryStore::new(),
            delay: Duration::from_millis(50),
        }));
        let id = UploadId::new("1");
        records.create(&new_record("1")).await.unwrap();

        // 不加锁时两次更新会读到同一份旧记录，后写入的一方覆盖前者
        let a = records.update(&id, |rec| rec.surface_ready = true);
        let b = records.update(&id, |rec| {
            rec.advance(UploadStatus::Cancelled, 2_000);
        });
        let (a, b) = tokio::join!(a, b);
        a.unwrap();
        b.unwrap();

        let rec = records.get(&id).await.unwrap().unwrap();
        assert!(rec.surface_ready);
        assert_eq!(rec.status, UploadStatus::Cancelled);
        assert_eq!(records.lock_entries(), 0);
    }

    #[tokio::test]
    async fn test_record_keys_filters_namespace() {
        let kv = Arc::new(MemoryStore::new());
        kv.set("documents", json!([])).await.unwrap();
        kv.set("Resume_details", json!({})).await.unwrap();
        let records = RecordStore::new(kv);
        records.create(&new_record("7")).await.unwrap();

        assert_eq!(records.record_keys().await.unwrap(), vec!["upload_7"]);
        records.delete(&UploadId::new("7")).await.unwrap();
        assert!(records.record_keys().await.unwrap().is_empty());
    }
}
