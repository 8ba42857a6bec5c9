//! 文件采集服务 - 业务能力层
//!
//! 只负责"校验文件 + 生成文档"能力，不关心消息和流程

use base64::Engine as _;
use chrono::{DateTime, SecondsFormat, Utc};
use phf::phf_map;

use crate::error::ValidationError;
use crate::models::{Document, DocumentKind, UploadPayload};

/// 单个文件大小上限（10 MiB）
pub const MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// 允许上传的 MIME 类型 → 扩展名
static ALLOWED_TYPES: phf::Map<&'static str, &'static str> = phf_map! {
    "application/pdf" => "pdf",
    "application/msword" => "doc",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document" => "docx",
};

/// 用户选择的文件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedFile {
    pub name: String,
    /// 浏览器声明的 MIME 类型
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl CapturedFile {
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            bytes,
        }
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// 校验文件类型和大小，通过时返回扩展名
pub fn validate_file(file: &CapturedFile, max_size: u64) -> Result<&'static str, ValidationError> {
    let extension = ALLOWED_TYPES
        .get(file.mime_type.as_str())
        .copied()
        .ok_or_else(|| ValidationError::UnsupportedType {
            mime_type: file.mime_type.clone(),
        })?;

    if file.size() > max_size {
        return Err(ValidationError::TooLarge {
            size: file.size(),
            max: max_size,
        });
    }

    Ok(extension)
}

/// 根据文件和上传请求构建文档
///
/// 文档类型取自请求类型（`certificate` 归为 `other`），标签为 `[context, 请求类型]`。
pub fn build_document(
    file: &CapturedFile,
    payload: &UploadPayload,
    now: DateTime<Utc>,
) -> Document {
    Document {
        id: now.timestamp_millis().to_string(),
        name: file.name.clone(),
        kind: DocumentKind::from(payload.kind),
        content: base64::engine::general_purpose::STANDARD.encode(&file.bytes),
        upload_date: now.to_rfc3339_opts(SecondsFormat::Millis, true),
        size: file.size(),
        is_active: false,
        tags: vec![payload.context.clone(), payload.kind.as_str().to_string()],
    }
}

/// 格式化文件大小，例如 `1.5 KB`、`2 MB`
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];
    if bytes == 0 {
        return "0 Bytes".to_string();
    }

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    let formatted = format!("{:.2}", value);
    let trimmed = formatted.trim_end_matches('0').trim_end_matches('.');
    format!("{} {}", trimmed, UNITS[unit])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PayloadKind;
    use chrono::TimeZone;

    fn pdf(size: usize) -> CapturedFile {
        CapturedFile::new("resume.pdf", "application/pdf", vec![0u8; size])
    }

    #[test]
    fn test_validate_accepts_allowed_types() {
        assert_eq!(validate_file(&pdf(10), MAX_FILE_SIZE), Ok("pdf"));
        let docx = CapturedFile::new(
            "cv.docx",
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
            vec![1, 2, 3],
        );
        assert_eq!(validate_file(&docx, MAX_FILE_SIZE), Ok("docx"));
    }

    #[test]
    fn test_validate_rejects_type_and_size() {
        let txt = CapturedFile::new("notes.txt", "text/plain", vec![1]);
        assert_eq!(
            validate_file(&txt, MAX_FILE_SIZE),
            Err(ValidationError::UnsupportedType {
                mime_type: "text/plain".to_string()
            })
        );

        let limit = MAX_FILE_SIZE as usize;
        assert!(validate_file(&pdf(limit), MAX_FILE_SIZE).is_ok());
        assert_eq!(
            validate_file(&pdf(limit + 1), MAX_FILE_SIZE),
            Err(ValidationError::TooLarge {
                size: MAX_FILE_SIZE + 1,
                max: MAX_FILE_SIZE
            })
        );
    }

    #[test]
    fn test_certificate_is_stored_as_other() {
        let now = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        let payload = UploadPayload::new(PayloadKind::Certificate, "AWS");
        let file = CapturedFile::new("c.pdf", "application/pdf", b"hi".to_vec());
        let doc = build_document(&file, &payload, now);

        assert_eq!(doc.kind, DocumentKind::Other);
        assert_eq!(doc.content, "aGk=");
        assert_eq!(doc.size, 2);
        assert_eq!(doc.upload_date, "2026-01-02T03:04:05.000Z");
        assert_eq!(doc.tags, vec!["AWS".to_string(), "certificate".to_string()]);
        assert!(!doc.is_active);
    }

    #[test]
    fn test_format_file_size() {
        assert_eq!(format_file_size(0), "0 Bytes");
        assert_eq!(format_file_size(512), "512 Bytes");
        assert_eq!(format_file_size(1536), "1.5 KB");
        assert_eq!(format_file_size(2 * 1024 * 1024), "2 MB");
    }
}
