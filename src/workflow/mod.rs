//! 流程层（Workflow）
//!
//! 定义"一次上传尝试"在上传页面一侧的完整流程：
//! 读取记录 → 报告就绪 → 选择文件 → 校验 → 上报完成 / 取消

pub mod upload_surface;

pub use upload_surface::{
    SurfaceExit, SurfaceInput, SurfaceSettings, SurfaceSnapshot, SurfaceView, UploadSurface,
};
