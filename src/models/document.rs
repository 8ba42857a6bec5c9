use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::record::PayloadKind;

/// 文档库中的文档类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Resume,
    CoverLetter,
    Other,
}

impl From<PayloadKind> for DocumentKind {
    /// 证书没有单独的文档类型，统一归入 `Other`
    fn from(kind: PayloadKind) -> Self {
        match kind {
            PayloadKind::Resume => DocumentKind::Resume,
            PayloadKind::CoverLetter => DocumentKind::CoverLetter,
            PayloadKind::Certificate | PayloadKind::Other => DocumentKind::Other,
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DocumentKind::Resume => "resume",
            DocumentKind::CoverLetter => "cover_letter",
            DocumentKind::Other => "other",
        };
        f.write_str(s)
    }
}

/// 上传完成的文档
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: DocumentKind,
    /// base64 编码的文件内容
    pub content: String,
    /// RFC 3339 格式的上传时间
    pub upload_date: String,
    pub size: u64,
    /// 是否为同类型中当前选用的文档
    #[serde(default)]
    pub is_active: bool,
    #[serde(default)]
    pub tags: Vec<String>,
}
