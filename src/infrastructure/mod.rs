//! 基础设施层（Infrastructure）
//!
//! - `store` - 键值存储（内存 / JSON 文件）
//! - `record_store` - 上传记录的类型化读写，按 ID 串行化写入
//! - `link` - 发往协调器的消息通道
//! - `js_executor` - 在浏览器页面里执行脚本

pub mod js_executor;
pub mod link;
pub mod record_store;
pub mod store;

pub use js_executor::JsExecutor;
pub use link::{CoordinatorLink, Inbound};
pub use record_store::{RecordStore, RecordTxn};
pub use store::{FileStore, KvStore, MemoryStore};
