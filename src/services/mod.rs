//! 业务能力层（Services）
//!
//! - `capture` - 文件校验与文档构建（上传页面使用）
//! - `document_repository` - 文档库，接收上传完成的文档
//! - `notifier` - 通知发起方（不保证送达）

pub mod capture;
pub mod document_repository;
pub mod notifier;

pub use capture::{build_document, format_file_size, validate_file, CapturedFile, MAX_FILE_SIZE};
pub use document_repository::{DocumentRepository, DOCUMENTS_KEY};
pub use notifier::Notifier;
