//! 进行中的上传尝试
//!
//! 每次上传尝试在协调器内存中有一个上下文对象，按上传 ID 索引：
//! 请求上传时插入，到达终态（完成 / 取消）或启动失败时移除。

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use crate::models::{SurfaceId, UploadId, UploadPayload};

/// 单次上传尝试的上下文
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptCtx {
    pub payload: UploadPayload,
    pub surface_id: Option<SurfaceId>,
    pub started_at: i64,
}

/// 进行中的上传尝试表
#[derive(Debug, Default)]
pub struct AttemptTable {
    inner: Mutex<HashMap<UploadId, AttemptCtx>>,
}

impl AttemptTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, id: UploadId, payload: UploadPayload, started_at: i64) {
        self.lock().insert(
            id,
            AttemptCtx {
                payload,
                surface_id: None,
                started_at,
            },
        );
    }

    /// 记录上传页面 ID，尝试已经结束时返回 false
    pub fn set_surface(&self, id: &UploadId, surface_id: SurfaceId) -> bool {
        match self.lock().get_mut(id) {
            Some(ctx) => {
                ctx.surface_id.get_or_insert(surface_id);
                true
            }
            None => false,
        }
    }

    pub fn remove(&self, id: &UploadId) -> Option<AttemptCtx> {
        self.lock().remove(id)
    }

    pub fn get(&self, id: &UploadId) -> Option<AttemptCtx> {
        self.lock().get(id).cloned()
    }

    pub fn contains(&self, id: &UploadId) -> bool {
        self.lock().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<UploadId, AttemptCtx>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PayloadKind;

    #[test]
    fn test_attempt_lifecycle() {
        let table = AttemptTable::new();
        let id = UploadId::new("1");
        table.insert(id.clone(), UploadPayload::new(PayloadKind::Resume, "Acme"), 10);
        assert!(table.set_surface(&id, SurfaceId(4)));
        assert!(table.set_surface(&id, SurfaceId(5)));
        assert_eq!(table.get(&id).unwrap().surface_id, Some(SurfaceId(4)));

        assert!(table.remove(&id).is_some());
        assert!(!table.set_surface(&id, SurfaceId(6)));
        assert!(table.is_empty());
    }
}
