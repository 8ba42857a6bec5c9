use thiserror::Error;

use crate::models::SurfaceId;

/// 上传流程错误类型
///
/// 按照处理方式分类：
/// - `Validation` / `Delivery` / `Rejected` 只停留在上传页面本地
/// - `Persistence` / `NotFound` 作为应答返回给发送方
/// - `Host` 使启动中的上传尝试被放弃
#[derive(Debug, Error)]
pub enum UploadError {
    /// 文件校验失败（类型或大小不符合要求）
    #[error("文件校验失败: {0}")]
    Validation(#[from] ValidationError),
    /// 存储读写失败
    #[error("存储读写失败: {0}")]
    Persistence(#[from] StoreError),
    /// 消息投递失败（接收方已经不存在）
    #[error("消息投递失败: {0}")]
    Delivery(#[from] DeliveryError),
    /// 上传页面找不到自己的上传记录
    #[error("上传记录不存在: {upload_id}")]
    NotFound { upload_id: String },
    /// 上传页面宿主错误
    #[error("上传页面错误: {0}")]
    Host(#[from] HostError),
    /// 协调器应答失败
    #[error("协调器处理失败: {reason}")]
    Rejected { reason: String },
}

/// 文件校验错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// 不支持的文件类型
    #[error("请上传 PDF、DOC 或 DOCX 文件 (当前类型: {mime_type})")]
    UnsupportedType { mime_type: String },
    /// 文件过大
    #[error("文件大小必须小于 10MB (当前: {size} 字节, 上限: {max} 字节)")]
    TooLarge { size: u64, max: u64 },
}

/// 持久化存储错误
#[derive(Debug, Error)]
pub enum StoreError {
    /// 读写存储文件失败
    #[error("读写存储文件失败 ({path}): {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// 序列化或反序列化失败
    #[error("存储数据序列化失败: {0}")]
    Serde(#[from] serde_json::Error),
    /// 键已经存在
    #[error("键已存在: {key}")]
    AlreadyExists { key: String },
    /// 存储暂不可用
    #[error("存储不可用: {0}")]
    Unavailable(String),
}

/// 消息投递错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryError {
    /// 接收方已关闭
    #[error("接收方已关闭: {target}")]
    RecipientGone { target: String },
    /// 接收方没有回复
    #[error("接收方没有回复: {target}")]
    NoReply { target: String },
}

/// 上传页面宿主错误
#[derive(Debug, Error)]
pub enum HostError {
    /// 创建上传页面失败
    #[error("创建上传页面失败: {0}")]
    CreateFailed(String),
    /// 上传页面已经关闭
    #[error("上传页面 {0} 已关闭")]
    SurfaceGone(SurfaceId),
    /// 宿主返回了一个仍在使用的页面 ID
    #[error("上传页面 {0} 已被其它上传占用")]
    DuplicateSurface(SurfaceId),
    /// 页面脚本执行失败
    #[error("页面脚本执行失败: {0}")]
    Script(String),
    /// 浏览器协议错误
    #[error("浏览器错误: {0}")]
    Browser(#[from] chromiumoxide::error::CdpError),
}

impl UploadError {
    /// 创建记录不存在错误
    pub fn not_found(upload_id: impl Into<String>) -> Self {
        UploadError::NotFound {
            upload_id: upload_id.into(),
        }
    }
}

/// 上传流程结果类型
pub type Result<T> = std::result::Result<T, UploadError>;
