use anyhow::Result;
use upload_relay::config::{Config, DEFAULT_CONFIG_FILE};
use upload_relay::orchestrator::App;
use upload_relay::utils::logging;

#[tokio::main]
async fn main() -> Result<()> {
    // 加载配置（第一个参数可指定配置文件）
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_FILE.to_string());
    let config = Config::load(&config_path)?;

    // 初始化日志
    logging::init(config.verbose_logging);

    // 初始化并运行应用
    App::initialize(config).await?.run().await?;

    Ok(())
}
