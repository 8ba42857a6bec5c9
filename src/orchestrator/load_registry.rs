//! 页面加载监听表
//!
//! 每个上传页面注册一个一次性的"加载完成"监听，按页面 ID 索引，首次匹配后立即移除，
//! 不会触发两次，也不会被其它上传尝试的页面触发。
//!
//! 页面可能在监听注册之前就加载完成（创建页面和注册监听之间存在时间差），
//! 这种"提前到达"的加载事件会先暂存，注册时立即触发。

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, PoisonError};
use thiserror::Error;

use crate::models::{SurfaceId, UploadId, UploadPayload};

/// 加载完成后要发给页面的初始化信息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingInit {
    pub upload_id: UploadId,
    pub payload: UploadPayload,
}

/// 注册结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Registration {
    /// 已挂起，等待加载事件
    Armed,
    /// 页面已经加载过，立即触发
    Fired(PendingInit),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("页面 {0} 已经注册过加载监听")]
pub struct DuplicateListener(pub SurfaceId);

#[derive(Debug, Default)]
struct RegistryState {
    pending: HashMap<SurfaceId, PendingInit>,
    loaded_early: HashSet<SurfaceId>,
}

/// 页面加载监听表
#[derive(Debug, Default)]
pub struct LoadListenerRegistry {
    inner: Mutex<RegistryState>,
}

impl LoadListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 为页面注册一次性监听
    pub fn register(
        &self,
        surface_id: SurfaceId,
        init: PendingInit,
    ) -> Result<Registration, DuplicateListener> {
        let mut state = self.lock();
        if state.pending.contains_key(&surface_id) {
            return Err(DuplicateListener(surface_id));
        }
        if state.loaded_early.remove(&surface_id) {
            return Ok(Registration::Fired(init));
        }
        state.pending.insert(surface_id, init);
        Ok(Registration::Armed)
    }

    /// 页面加载完成：有监听则取出并移除，没有则暂存
    pub fn fire(&self, surface_id: SurfaceId) -> Option<PendingInit> {
        let mut state = self.lock();
        match state.pending.remove(&surface_id) {
            Some(init) => Some(init),
            None => {
                state.loaded_early.insert(surface_id);
                None
            }
        }
    }

    /// 页面关闭后清理
    pub fn forget(&self, surface_id: SurfaceId) {
        let mut state = self.lock();
        state.pending.remove(&surface_id);
        state.loaded_early.remove(&surface_id);
    }

    pub fn pending_len(&self) -> usize {
        self.lock().pending.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RegistryState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
