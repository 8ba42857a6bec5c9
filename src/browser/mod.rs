//! 上传页面宿主
//!
//! 宿主负责创建、关闭上传页面，以及把协调器的命令投递给页面。
//! 页面加载完成后，宿主通过 `CoordinatorLink::surface_loaded` 通知协调器。
//!
//! - `chrome_host` - 每个上传页面是浏览器里的一个标签页（chromiumoxide）
//! - `bridge` - 浏览器页面与协调器之间的请求/应答协议
//! - `local_host` - 上传页面作为进程内的 tokio 任务运行

use async_trait::async_trait;

use crate::error::HostError;
use crate::models::{SurfaceCommand, SurfaceId};

pub mod bridge;
pub mod chrome_host;
pub mod connection;
pub mod headless;
pub mod local_host;

pub use bridge::{Bridge, BridgeReply, PagePoster};
pub use chrome_host::ChromeSurfaceHost;
pub use connection::connect_to_browser_and_page;
pub use headless::launch_headless_browser;
pub use local_host::{LocalSurfaceHost, SurfaceRemote};

/// 上传页面宿主
#[async_trait]
pub trait SurfaceHost: Send + Sync {
    /// 以 `launch_url` 打开新的上传页面，返回页面 ID
    async fn create(&self, launch_url: &str) -> Result<SurfaceId, HostError>;

    /// 向页面投递命令；页面已关闭时返回 `SurfaceGone`
    async fn deliver(&self, surface_id: SurfaceId, command: SurfaceCommand)
        -> Result<(), HostError>;

    /// 关闭页面
    async fn close(&self, surface_id: SurfaceId) -> Result<(), HostError>;
}
