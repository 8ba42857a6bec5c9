//! 文档库服务 - 业务能力层
//!
//! 文档以有序列表的形式保存在存储的 `documents` 键下。
//! `append` 是读出整个列表、追加、整体写回，并不是原子操作；
//! 本进程内的追加会串行执行，但其它进程同时写这个键仍可能相互覆盖。

use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::StoreError;
use crate::infrastructure::KvStore;
use crate::models::{Document, DocumentKind};

/// 文档列表在存储中的键
pub const DOCUMENTS_KEY: &str = "documents";

/// 文档库
#[derive(Clone)]
pub struct DocumentRepository {
    store: Arc<dyn KvStore>,
    write_lock: Arc<Mutex<()>>,
}

impl DocumentRepository {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self {
            store,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// 读取全部文档
    pub async fn list(&self) -> Result<Vec<Document>, StoreError> {
        match self.store.get(DOCUMENTS_KEY).await? {
            Some(value) => Ok(serde_json::from_value(value)?),
            None => Ok(Vec::new()),
        }
    }

    /// 追加一个文档
    ///
    /// 如果这是该类型的第一个文档，则自动设为当前选用文档。
    pub async fn append(&self, document: Document) -> Result<Document, StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut documents = self.list().await?;

        let mut document = document;
        if !documents.iter().any(|doc| doc.kind == document.kind) {
            debug!("{} 类型的第一个文档，设为当前选用", document.kind);
            document.is_active = true;
        }
        documents.push(document.clone());

        self.store
            .set(DOCUMENTS_KEY, serde_json::to_value(&documents)?)
            .await?;
        info!("📄 文档已保存: {} (共 {} 个)", document.name, documents.len());
        Ok(document)
    }

    /// 按类型筛选
    pub async fn by_kind(&self, kind: DocumentKind) -> Result<Vec<Document>, StoreError> {
        Ok(self
            .list()
            .await?
            .into_iter()
            .filter(|doc| doc.kind == kind)
            .collect())
    }

    /// 某个类型当前选用的文档
    pub async fn active(&self, kind: DocumentKind) -> Result<Option<Document>, StoreError> {
        Ok(self
            .list()
            .await?
            .into_iter()
            .find(|doc| doc.kind == kind && doc.is_active))
    }
}
