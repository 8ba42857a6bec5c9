//! 数据模型
//!
//! - `record` - 上传记录（每次上传尝试一条）
//! - `document` - 上传完成后的文档
//! - `message` - 各上下文之间传递的消息

pub mod document;
pub mod message;
pub mod record;

pub use document::{Document, DocumentKind};
pub use message::{
    launch_url, upload_id_from_url, CoordinatorRequest, Notification, Response, SurfaceCommand,
};
pub use record::{
    is_stale, now_millis, record_key, PayloadKind, SurfaceId, UploadId, UploadIdGenerator,
    UploadPayload, UploadRecord, UploadStatus, RECORD_KEY_PREFIX,
};
