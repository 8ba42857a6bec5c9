use anyhow::Result;
use chromiumoxide::{Browser, Page};
use futures::StreamExt;
use tokio::time::sleep;
use tracing::{debug, error, info};

/// 连接到浏览器并获取发起方页面
///
/// 优先复用地址以 `initiator_url` 开头的已打开页面，找不到时新建页面并导航过去。
pub async fn connect_to_browser_and_page(
    port: u16,
    initiator_url: &str,
) -> Result<(Browser, Page)> {
    let browser_url = format!("http://localhost:{}", port);
    info!("正在连接到浏览器: {}", browser_url);
    debug!("发起方页面: {}", initiator_url);

    let (browser, mut handler) = Browser::connect(&browser_url).await.map_err(|e| {
        error!("连接浏览器失败: {}", e);
        e
    })?;
    debug!("浏览器连接成功");

    // 在后台处理浏览器事件
    tokio::spawn(async move {
        while let Some(h) = handler.next().await {
            if h.is_err() {
                break;
            }
        }
    });

    // 添加短暂延迟以等待浏览器状态同步
    sleep(tokio::time::Duration::from_millis(300)).await;

    let pages = browser.pages().await?;
    debug!("获取到 {} 个页面", pages.len());

    for p in pages.iter() {
        if let Ok(Some(url)) = p.url().await {
            debug!("检查页面地址: {}", url);
            if url.starts_with(initiator_url) {
                info!("✓ 找到发起方页面: {}", url);
                return Ok((browser, p.clone()));
            }
        }
    }
    debug!("未找到发起方页面，将创建新页面");

    let page = browser.new_page("about:blank").await.map_err(|e| {
        error!("创建新页面失败: {}", e);
        e
    })?;
    page.goto(initiator_url).await.map_err(|e| {
        error!("导航到 {} 失败: {}", initiator_url, e);
        e
    })?;
    info!("已导航到: {}", initiator_url);

    Ok((browser, page))
}
