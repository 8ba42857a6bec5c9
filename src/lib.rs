//! # Upload Relay
//!
//! 一个用于协调"弹出页面发起、独立上传页面完成"的文件上传服务
//!
//! 发起方页面（弹出页面）随时可能关闭，所以上传由常驻的协调器接管：
//! 协调器为每次上传创建独立的上传页面，通过消息握手驱动上传状态机，
//! 把完成的文档写入文档库，并在启动时清理过期的上传记录。
//!
//! ## 架构设计
//!
//! 本系统采用严格的四层架构：
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 持有稀缺资源，只暴露能力
//! - `KvStore` - 键值存储（内存 / JSON 文件）
//! - `RecordStore` - 上传记录读写，同一 ID 的写入串行化
//! - `CoordinatorLink` - 发往协调器的消息通道
//! - `JsExecutor` - 唯一的 page owner，提供 eval() / dispatch() 能力
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"
//! - `capture` - 文件校验与文档构建
//! - `DocumentRepository` - 文档库
//! - `Notifier` - 通知发起方（不保证送达）
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义上传页面一侧"一次上传"的完整流程
//! - `UploadSurface` - 读取记录 → 就绪 → 选择文件 → 上报完成 / 取消
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/coordinator` - 上传状态机和启动清理
//! - `orchestrator/app` - 应用生命周期
//!
//! 上传页面由 `browser/` 下的宿主创建：浏览器标签页（chromiumoxide）或进程内任务。
//!
//! ## 模块结构

pub mod browser;
pub mod config;
pub mod error;
pub mod infrastructure;

pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use browser::{ChromeSurfaceHost, LocalSurfaceHost, SurfaceHost};
pub use config::Config;
pub use error::{Result, UploadError};
pub use models::{UploadId, UploadPayload, UploadRecord, UploadStatus};
pub use orchestrator::{App, Coordinator, CoordinatorSettings};
pub use workflow::UploadSurface;
