//! 应用入口 - 编排层
//!
//! ## 职责
//!
//! 1. **应用初始化**：打开存储、连接浏览器、给发起方页面安装消息桥、创建协调器
//! 2. **启动清理**：服务开始前回收过期的上传记录
//! 3. **持续服务**：处理消息直到收到 Ctrl-C
//! 4. **转发通知**：把协调器的通知尽力转发给发起方页面
//!
//! 浏览器只由本模块和页面宿主持有。

use anyhow::{Context, Result};
use chromiumoxide::{Browser, Page};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

use crate::browser::bridge::post_to_page;
use crate::browser::{self, Bridge, ChromeSurfaceHost};
use crate::config::Config;
use crate::infrastructure::{
    CoordinatorLink, FileStore, Inbound, JsExecutor, KvStore, RecordStore,
};
use crate::models::Notification;
use crate::orchestrator::coordinator::Coordinator;
use crate::services::{DocumentRepository, Notifier};
use crate::utils::logging::{log_startup, log_sweep_report};

/// 应用主结构
pub struct App {
    config: Config,
    initiator: JsExecutor,
    coordinator: Arc<Coordinator>,
    inbox: mpsc::UnboundedReceiver<Inbound>,
}

impl App {
    /// 初始化应用
    pub async fn initialize(config: Config) -> Result<Self> {
        log_startup(&config);

        let file_store = FileStore::open(&config.store_path)
            .await
            .with_context(|| format!("打开存储失败: {}", config.store_path.display()))?;
        info!("✓ 已打开存储: {}", file_store.path().display());
        let store: Arc<dyn KvStore> = Arc::new(file_store);

        let (browser, page) = open_browser(&config).await?;

        // 发起方页面和上传页面共用同一个消息通道
        let (link, inbox) = CoordinatorLink::channel();
        let records = RecordStore::new(store.clone());
        let bridge = Bridge::new(link.clone(), records.clone(), "发起方");
        ChromeSurfaceHost::attach_bridge(&page, bridge)
            .await
            .context("给发起方页面安装消息桥失败")?;

        let host = Arc::new(ChromeSurfaceHost::new(browser, link, records.clone()));
        let coordinator = Coordinator::new(
            records,
            DocumentRepository::new(store),
            host,
            Notifier::new(),
            config.coordinator_settings(),
        );

        Ok(Self {
            config,
            initiator: JsExecutor::new(page),
            coordinator: Arc::new(coordinator),
            inbox,
        })
    }

    /// 运行应用主逻辑
    pub async fn run(self) -> Result<()> {
        let Self {
            config,
            initiator,
            coordinator,
            inbox,
        } = self;

        match coordinator.startup_sweep().await {
            Ok(report) => log_sweep_report(&report),
            Err(e) => warn!("⚠️ 启动清理失败，跳过: {}", e),
        }

        tokio::spawn(forward_notifications(
            initiator,
            coordinator.notifier().subscribe(),
        ));

        let mut serve = tokio::spawn(Arc::clone(&coordinator).serve(inbox));
        info!("✓ 上传协调服务已就绪: {}", config.initiator_url);

        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal.context("监听 Ctrl-C 失败")?;
                info!(
                    "\n收到退出信号，进行中的上传 {} 个",
                    coordinator.attempts().len()
                );
                serve.abort();
            }
            joined = &mut serve => {
                if let Err(e) = joined {
                    error!("协调器任务异常退出: {}", e);
                }
            }
        }

        info!("👋 程序退出");
        Ok(())
    }
}

/// 优先连接已打开的浏览器，配置允许时退回到无头浏览器
async fn open_browser(config: &Config) -> Result<(Browser, Page)> {
    match browser::connect_to_browser_and_page(config.browser_debug_port, &config.initiator_url)
        .await
    {
        Ok(pair) => Ok(pair),
        Err(e) if config.headless => {
            warn!("⚠️ 连接浏览器失败 ({})，改为启动无头浏览器", e);
            browser::launch_headless_browser(
                &config.initiator_url,
                config.chrome_executable.as_deref(),
            )
            .await
        }
        Err(e) => Err(e.context(format!(
            "无法连接到调试端口 {} 上的浏览器",
            config.browser_debug_port
        ))),
    }
}

/// 把通知转发给发起方页面；发起方可能已经关闭，失败只记录日志
async fn forward_notifications(
    initiator: JsExecutor,
    mut notifications: broadcast::Receiver<Notification>,
) {
    loop {
        match notifications.recv().await {
            Ok(notification) => {
                if let Err(e) = post_to_page(&initiator, &notification).await {
                    debug!("发起方不可用，丢弃通知 {:?}: {}", notification, e);
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!("⚠️ 通知积压，丢弃 {} 条", skipped);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
