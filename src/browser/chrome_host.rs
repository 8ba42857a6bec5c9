//! 浏览器上传页面宿主
//!
//! 每个上传页面是浏览器里的一个标签页：
//! - 页面 → 协调器：页面调用 `window.__uploadRelayBridge(JSON.stringify(frame))`，
//!   通过 CDP 的 Runtime binding 进入消息桥（协议见 `bridge`）
//! - 协调器 → 页面：在页面 window 上派发 `upload-relay` 事件，`detail` 为消息
//! - 导航完成即视为页面加载完成

use async_trait::async_trait;
use chromiumoxide::cdp::js_protocol::runtime::{AddBindingParams, EventBindingCalled};
use chromiumoxide::{Browser, Page};
use futures::{future, StreamExt};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, error, info, warn};

use crate::browser::bridge::{post_to_page, Bridge, BRIDGE_BINDING};
use crate::browser::SurfaceHost;
use crate::error::HostError;
use crate::infrastructure::{CoordinatorLink, JsExecutor, RecordStore};
use crate::models::{SurfaceCommand, SurfaceId};

/// 浏览器上传页面宿主
pub struct ChromeSurfaceHost {
    browser: AsyncMutex<Browser>,
    link: CoordinatorLink,
    records: RecordStore,
    pages: Mutex<HashMap<SurfaceId, JsExecutor>>,
    next_id: AtomicU64,
}

impl ChromeSurfaceHost {
    /// `records` 只用于响应页面的记录查询
    pub fn new(browser: Browser, link: CoordinatorLink, records: RecordStore) -> Self {
        Self {
            browser: AsyncMutex::new(browser),
            link,
            records,
            pages: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(0),
        }
    }

    /// 给页面安装消息桥
    pub async fn attach_bridge(page: &Page, bridge: Bridge) -> Result<(), HostError> {
        page.execute(AddBindingParams::new(BRIDGE_BINDING)).await?;
        let events = page.event_listener::<EventBindingCalled>().await?;
        let payloads = events.filter_map(|event| {
            future::ready((event.name == BRIDGE_BINDING).then(|| event.payload.clone()))
        });

        let executor = JsExecutor::new(page.clone());
        tokio::spawn(async move {
            bridge.pump(payloads, &executor).await;
        });

        Ok(())
    }

    fn executor(&self, surface_id: SurfaceId) -> Option<JsExecutor> {
        self.pages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&surface_id)
            .cloned()
    }
}

#[async_trait]
impl SurfaceHost for ChromeSurfaceHost {
    async fn create(&self, launch_url: &str) -> Result<SurfaceId, HostError> {
        let page = {
            let browser = self.browser.lock().await;
            browser.new_page("about:blank").await.map_err(|e| {
                error!("创建上传页面失败: {}", e);
                HostError::CreateFailed(e.to_string())
            })?
        };

        let surface_id = SurfaceId(self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        let bridge = Bridge::new(
            self.link.clone(),
            self.records.clone(),
            format!("页面 {}", surface_id),
        );
        if let Err(e) = Self::attach_bridge(&page, bridge).await {
            error!("[页面 {}] 安装消息桥失败，关闭标签页: {}", surface_id, e);
            if let Err(close_err) = page.close().await {
                warn!("[页面 {}] ⚠️ 关闭标签页失败: {}", surface_id, close_err);
            }
            return Err(e);
        }

        self.pages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(surface_id, JsExecutor::new(page.clone()));

        // 导航完成后报告页面加载完成
        let link = self.link.clone();
        let url = launch_url.to_string();
        tokio::spawn(async move {
            match page.goto(url.as_str()).await {
                Ok(_) => {
                    info!("🪟 上传页面 {} 已加载: {}", surface_id, url);
                    if let Err(e) = link.surface_loaded(surface_id) {
                        warn!("[页面 {}] ⚠️ 无法报告页面加载完成: {}", surface_id, e);
                    }
                }
                Err(e) => error!("[页面 {}] 导航到 {} 失败: {}", surface_id, url, e),
            }
        });

        Ok(surface_id)
    }

    async fn deliver(
        &self,
        surface_id: SurfaceId,
        command: SurfaceCommand,
    ) -> Result<(), HostError> {
        let executor = self
            .executor(surface_id)
            .ok_or(HostError::SurfaceGone(surface_id))?;
        post_to_page(&executor, &command).await
    }

    async fn close(&self, surface_id: SurfaceId) -> Result<(), HostError> {
        let executor = self
            .pages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&surface_id)
            .ok_or(HostError::SurfaceGone(surface_id))?;
        executor.page().clone().close().await?;
        debug!("[页面 {}] 已关闭", surface_id);
        Ok(())
    }
}
