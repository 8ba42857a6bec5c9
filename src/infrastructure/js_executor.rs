//! JS 执行器 - 基础设施层
//!
//! 持有浏览器页面，只暴露"执行 JS"和"派发页面事件"的能力

use anyhow::Result;
use chromiumoxide::Page;
use serde::Serialize;
use serde_json::Value as JsonValue;

/// JS 执行器
///
/// 职责：
/// - 持有 Page 资源
/// - 暴露 eval() / dispatch() 能力
/// - 不认识上传记录，不处理上传流程
#[derive(Clone)]
pub struct JsExecutor {
    page: Page,
}

impl JsExecutor {
    /// 创建新的 JS 执行器
    pub fn new(page: Page) -> Self {
        Self { page }
    }

    /// 获取 page 的引用（用于其他操作）
    pub fn page(&self) -> &Page {
        &self.page
    }

    /// 执行 JS 代码并返回 JSON 结果
    pub async fn eval(&self, js_code: impl Into<String>) -> Result<JsonValue> {
        let result = self.page.evaluate(js_code.into()).await?;
        let json_value = result.into_value()?;
        Ok(json_value)
    }

    /// 在页面的 window 上派发一个 CustomEvent，`detail` 为序列化后的消息
    pub async fn dispatch<T: Serialize>(&self, event_name: &str, detail: &T) -> Result<()> {
        let js_code = dispatch_script(event_name, detail)?;
        self.eval(js_code).await?;
        Ok(())
    }
}

/// 生成派发事件的脚本
fn dispatch_script<T: Serialize>(event_name: &str, detail: &T) -> Result<String> {
    let detail_json = serde_json::to_string(detail)?;
    let name_json = serde_json::to_string(event_name)?;
    Ok(format!(
        r#"
        (() => {{
            window.dispatchEvent(new CustomEvent({}, {{ detail: {} }}));
            return true;
        }})()
        "#,
        name_json, detail_json
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_dispatch_script_embeds_json() {
        let script = dispatch_script("upload-relay", &json!({ "type": "INIT_UPLOAD" })).unwrap();
        assert!(script.contains(r#"new CustomEvent("upload-relay""#));
        assert!(script.contains(r#"detail: {"type":"INIT_UPLOAD"}"#));
    }
}
