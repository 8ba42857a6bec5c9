//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层持有上传状态机和应用生命周期，是整个系统的"指挥中心"。
//!
//! ## 模块划分
//!
//! ### `coordinator` - 上传协调器
//! - 处理 `UPLOAD_DOCUMENT` / `UPLOAD_TAB_READY` / `UPLOAD_COMPLETE` / `UPLOAD_CANCELLED`
//! - 唯一写入上传记录的组件
//! - 创建和关闭上传页面，页面加载后发送 `INIT_UPLOAD`
//! - 启动时清理过期记录
//!
//! ### `attempts` / `load_registry`
//! - 进行中的上传尝试（按上传 ID）
//! - 一次性页面加载监听（按页面 ID）
//!
//! ### `app` - 应用入口
//! - 打开存储、连接浏览器、运行协调器直到退出
//!
//! ## 层次关系
//!
//! ```text
//! app
//!     ↓
//! coordinator (状态机 + 启动清理)
//!     ↓                 ↘
//! browser (页面宿主)    services (文档库 / 通知)
//!     ↓                 ↙
//! infrastructure (存储 / 消息通道 / JsExecutor)
//! ```

pub mod app;
pub mod attempts;
pub mod coordinator;
pub mod load_registry;

// 重新导出主要类型
pub use app::App;
pub use attempts::{AttemptCtx, AttemptTable};
pub use coordinator::{Coordinator, CoordinatorSettings, SweepReport};
pub use load_registry::{DuplicateListener, LoadListenerRegistry, PendingInit, Registration};
