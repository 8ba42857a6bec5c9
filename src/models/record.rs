//! 上传记录
//!
//! 每次上传尝试对应一条 `UploadRecord`，以 `upload_<id>` 为键保存在持久化存储中。
//! 只有协调器会写入记录，上传页面只读取自己的那一条。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};

use crate::models::document::Document;

/// 上传记录键前缀
pub const RECORD_KEY_PREFIX: &str = "upload_";

/// 当前时间（毫秒时间戳）
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// 创建时间距 `now_ms` 是否已经超过 `max_age_ms`
///
/// `created_at` 来自存储，可能是任意值，相减时饱和而不是溢出。
pub fn is_stale(created_at: i64, now_ms: i64, max_age_ms: i64) -> bool {
    now_ms.saturating_sub(created_at) > max_age_ms
}

/// 根据上传 ID 生成存储键
pub fn record_key(id: &UploadId) -> String {
    format!("{}{}", RECORD_KEY_PREFIX, id)
}

/// 上传尝试 ID
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UploadId(String);

impl UploadId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UploadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 上传页面 ID（对应浏览器里的一个标签页）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SurfaceId(pub u64);

impl fmt::Display for SurfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 上传 ID 生成器
///
/// ID 取自毫秒时间戳；同一毫秒内的多次请求依次加一，保证进程内严格递增、不重复。
#[derive(Debug, Default)]
pub struct UploadIdGenerator {
    last: AtomicI64,
}

impl UploadIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// 基于给定时间生成下一个 ID
    pub fn next_at(&self, now_ms: i64) -> UploadId {
        let prev = self
            .last
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(now_ms.max(last + 1))
            })
            .unwrap_or_else(|last| last);
        UploadId(now_ms.max(prev + 1).to_string())
    }
}

/// 上传请求类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadKind {
    Resume,
    CoverLetter,
    Certificate,
    Other,
}

impl PayloadKind {
    /// 展示给用户的名称
    pub fn label(self) -> &'static str {
        match self {
            PayloadKind::Resume => "resume",
            PayloadKind::CoverLetter => "cover letter",
            PayloadKind::Certificate => "certificate",
            PayloadKind::Other => "other",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PayloadKind::Resume => "resume",
            PayloadKind::CoverLetter => "cover_letter",
            PayloadKind::Certificate => "certificate",
            PayloadKind::Other => "other",
        }
    }
}

/// 发起方提交的上传请求描述
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadPayload {
    #[serde(rename = "type")]
    pub kind: PayloadKind,
    /// 上下文说明（例如公司名称）
    pub context: String,
}

impl UploadPayload {
    pub fn new(kind: PayloadKind, context: impl Into<String>) -> Self {
        Self {
            kind,
            context: context.into(),
        }
    }
}

/// 上传状态
///
/// 只能沿 `Starting → SurfaceCreated → Ready → {Completed | Cancelled}` 前进，
/// `Completed` 和 `Cancelled` 为终态。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadStatus {
    Starting,
    SurfaceCreated,
    Ready,
    Completed,
    Cancelled,
}

impl UploadStatus {
    fn rank(self) -> u8 {
        match self {
            UploadStatus::Starting => 0,
            UploadStatus::SurfaceCreated => 1,
            UploadStatus::Ready => 2,
            UploadStatus::Completed | UploadStatus::Cancelled => 3,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, UploadStatus::Completed | UploadStatus::Cancelled)
    }

    /// 是否允许迁移到 `next`
    ///
    /// 消息之间没有顺序保证，所以允许跳过中间状态，但不允许后退或离开终态。
    pub fn can_advance_to(self, next: UploadStatus) -> bool {
        !self.is_terminal() && next.rank() > self.rank()
    }
}

/// 上传记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadRecord {
    pub id: UploadId,
    #[serde(rename = "data")]
    pub payload: UploadPayload,
    pub status: UploadStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub surface_id: Option<SurfaceId>,
    #[serde(default)]
    pub surface_ready: bool,
    pub created_at: i64,
    pub last_updated_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancelled_at: Option<i64>,
    #[serde(default, rename = "document", skip_serializing_if = "Option::is_none")]
    pub artifact: Option<Document>,
}

impl UploadRecord {
    /// 创建处于 `Starting` 状态的新记录
    pub fn new(id: UploadId, payload: UploadPayload, now_ms: i64) -> Self {
        Self {
            id,
            payload,
            status: UploadStatus::Starting,
            surface_id: None,
            surface_ready: false,
            created_at: now_ms,
            last_updated_at: now_ms,
            completed_at: None,
            cancelled_at: None,
            artifact: None,
        }
    }

    /// 推进状态，返回是否实际发生了迁移
    pub fn advance(&mut self, next: UploadStatus, now_ms: i64) -> bool {
        if !self.status.can_advance_to(next) {
            return false;
        }
        self.status = next;
        self.last_updated_at = now_ms;
        true
    }

    /// 绑定上传页面；已经绑定过则保持不变
    pub fn attach_surface(&mut self, surface_id: SurfaceId) -> bool {
        if self.surface_id.is_some() {
            return false;
        }
        self.surface_id = Some(surface_id);
        true
    }
}
