//! 消息格式
//!
//! 所有消息都是 JSON，`type` 字段区分消息类型，其余字段使用 camelCase。
//!
//! ```text
//! 发起方   → 协调器: UPLOAD_DOCUMENT { data }
//! 上传页面 → 协调器: UPLOAD_TAB_READY { uploadId }
//! 协调器   → 上传页面: INIT_UPLOAD { uploadId, data }
//! 上传页面 → 协调器: UPLOAD_COMPLETE { document, uploadId, tabId }
//! 上传页面 → 协调器: UPLOAD_CANCELLED { uploadId, tabId }
//! 协调器   → 发起方: UPLOAD_SUCCESS { documentName, documentType } / UPLOAD_CANCELLED
//! ```

use serde::{Deserialize, Serialize};

use crate::models::document::{Document, DocumentKind};
use crate::models::record::{SurfaceId, UploadId, UploadPayload};

/// 上传页面地址中携带上传 ID 的参数名
pub const UPLOAD_ID_PARAM: &str = "uploadId";

/// 发往协调器的消息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum CoordinatorRequest {
    UploadDocument {
        data: UploadPayload,
    },
    UploadTabReady {
        upload_id: UploadId,
    },
    UploadComplete {
        document: Document,
        upload_id: UploadId,
        tab_id: SurfaceId,
    },
    UploadCancelled {
        upload_id: UploadId,
        tab_id: SurfaceId,
    },
}

impl CoordinatorRequest {
    /// 消息类型名（用于日志）
    pub fn kind(&self) -> &'static str {
        match self {
            CoordinatorRequest::UploadDocument { .. } => "UPLOAD_DOCUMENT",
            CoordinatorRequest::UploadTabReady { .. } => "UPLOAD_TAB_READY",
            CoordinatorRequest::UploadComplete { .. } => "UPLOAD_COMPLETE",
            CoordinatorRequest::UploadCancelled { .. } => "UPLOAD_CANCELLED",
        }
    }
}

/// 协调器发往上传页面的消息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum SurfaceCommand {
    InitUpload {
        upload_id: UploadId,
        data: UploadPayload,
    },
}

/// 协调器发往发起方的通知（尽力而为，不保证送达）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum Notification {
    UploadSuccess {
        document_name: String,
        document_type: DocumentKind,
    },
    UploadCancelled,
}

/// 对请求的应答
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upload_id: Option<UploadId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Response {
    pub fn ok() -> Self {
        Self {
            success: true,
            ..Default::default()
        }
    }

    pub fn started(upload_id: UploadId) -> Self {
        Self {
            success: true,
            upload_id: Some(upload_id),
            message: Some("已在新页面中开始上传".to_string()),
            error: None,
        }
    }

    pub fn failed(error: impl ToString) -> Self {
        Self {
            success: false,
            error: Some(error.to_string()),
            ..Default::default()
        }
    }
}

/// 构造上传页面地址：`<base>?uploadId=<id>`
pub fn launch_url(base: &str, id: &UploadId) -> String {
    let sep = if base.contains('?') { '&' } else { '?' };
    format!("{}{}{}={}", base, sep, UPLOAD_ID_PARAM, id)
}

/// 从上传页面地址中取出上传 ID
pub fn upload_id_from_url(url: &str) -> Option<UploadId> {
    let (_, query) = url.split_once('?')?;
    let query = query.split('#').next().unwrap_or_default();
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, value)| *key == UPLOAD_ID_PARAM && !value.is_empty())
        .map(|(_, value)| UploadId::new(value))
}
