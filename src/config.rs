use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::orchestrator::CoordinatorSettings;

/// 默认配置文件路径
pub const DEFAULT_CONFIG_FILE: &str = "upload_relay.toml";

/// 程序配置文件
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// 浏览器调试端口
    pub browser_debug_port: u16,
    /// 发起方页面地址
    pub initiator_url: String,
    /// 上传页面基础地址（会追加 `?uploadId=<id>`）
    pub surface_base_url: String,
    /// 持久化存储文件
    pub store_path: PathBuf,
    /// 页面加载完成到发送 INIT_UPLOAD 的间隔
    pub settle_delay_ms: u64,
    /// 启动清理的记录年龄阈值
    pub sweep_max_age_ms: i64,
    /// 是否显示详细日志
    pub verbose_logging: bool,
    /// 找不到调试端口时是否启动无头浏览器
    pub headless: bool,
    /// 无头模式下使用的浏览器可执行文件
    pub chrome_executable: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            browser_debug_port: 2001,
            initiator_url: "http://localhost:8080/popup.html".to_string(),
            surface_base_url: "http://localhost:8080/file-upload.html".to_string(),
            store_path: PathBuf::from("upload_relay_store.json"),
            settle_delay_ms: 200,
            sweep_max_age_ms: 3_600_000,
            verbose_logging: false,
            headless: false,
            chrome_executable: None,
        }
    }
}

impl Config {
    /// 读取配置文件（不存在时使用默认值），再用环境变量覆盖
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let base = if path.exists() {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("读取配置文件失败: {}", path.display()))?;
            Self::from_toml_str(&text)
                .with_context(|| format!("解析配置文件失败: {}", path.display()))?
        } else {
            Self::default()
        };
        Ok(base.with_env())
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn from_env() -> Self {
        Self::default().with_env()
    }

    fn with_env(self) -> Self {
        Self {
            browser_debug_port: std::env::var("BROWSER_DEBUG_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(self.browser_debug_port),
            initiator_url: std::env::var("INITIATOR_URL").unwrap_or(self.initiator_url),
            surface_base_url: std::env::var("SURFACE_BASE_URL").unwrap_or(self.surface_base_url),
            store_path: std::env::var("STORE_PATH")
                .map(PathBuf::from)
                .unwrap_or(self.store_path),
            settle_delay_ms: std::env::var("SETTLE_DELAY_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(self.settle_delay_ms),
            sweep_max_age_ms: std::env::var("SWEEP_MAX_AGE_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(self.sweep_max_age_ms),
            verbose_logging: std::env::var("VERBOSE_LOGGING")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(self.verbose_logging),
            headless: std::env::var("HEADLESS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(self.headless),
            chrome_executable: std::env::var("CHROME_EXECUTABLE")
                .ok()
                .map(PathBuf::from)
                .or(self.chrome_executable),
        }
    }

    pub fn coordinator_settings(&self) -> CoordinatorSettings {
        CoordinatorSettings {
            settle_delay: Duration::from_millis(self.settle_delay_ms),
            sweep_max_age_ms: self.sweep_max_age_ms,
            surface_base_url: self.surface_base_url.clone(),
        }
    }
}
