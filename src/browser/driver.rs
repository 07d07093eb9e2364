//! 浏览器驱动抽象
//!
//! 引擎只依赖 BrowserLauncher / PageDriver 两个 trait：打开页面、在页面上执行脚本、
//! 模拟点击/输入/按键、等待导航。所有 DOM 读写都封装为 PageScript，
//! 真实驱动执行其 source，测试驱动按 name 应答。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::core::BrowserError;

/// 一段在页面上执行的脚本：`(function)(args...)`，参数以 JSON 字面量嵌入
#[derive(Debug, Clone)]
pub struct PageScript {
    pub name: &'static str,
    pub args: Vec<Value>,
    pub source: String,
}

impl PageScript {
    /// `function` 为 JS 函数表达式（可以是 async），返回值必须可 JSON 序列化
    pub fn new(name: &'static str, function: &str, args: Vec<Value>) -> Self {
        let rendered: Vec<String> = args.iter().map(|a| a.to_string()).collect();
        let source = format!("({})({})", function.trim(), rendered.join(", "));
        Self { name, args, source }
    }

    /// 第 i 个参数的字符串形式（测试驱动用）
    pub fn arg_str(&self, i: usize) -> Option<&str> {
        self.args.get(i).and_then(|v| v.as_str())
    }
}

/// 打开页面（导航并等待网络空闲）
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn open(&self, url: &str) -> Result<Arc<dyn PageDriver>, BrowserError>;
}

/// 一个打开的页面会话，由当前执行的任务独占
#[async_trait]
pub trait PageDriver: Send + Sync {
    /// 执行脚本并返回 JSON 结果（undefined 为 Null）
    async fn evaluate(&self, script: &PageScript) -> Result<Value, BrowserError>;

    /// 真实鼠标点击
    async fn click(&self, selector: &str) -> Result<(), BrowserError>;

    /// 逐字符输入，字符间隔 delay
    async fn type_text(&self, selector: &str, text: &str, delay: Duration) -> Result<(), BrowserError>;

    /// 按键（如 "Enter" / "Escape"）
    async fn press_key(&self, key: &str) -> Result<(), BrowserError>;

    /// 等待一次导航，最多 timeout；超时返回 Ok(false)
    async fn wait_for_navigation(&self, timeout: Duration) -> Result<bool, BrowserError>;

    /// 释放会话（关闭标签页与浏览器进程），重复调用无副作用
    async fn close(&self) -> Result<(), BrowserError>;

    async fn scroll_into_view(&self, selector: &str) -> Result<(), BrowserError> {
        self.evaluate(&scripts::scroll_into_view(selector)).await.map(|_| ())
    }

    async fn focus(&self, selector: &str) -> Result<(), BrowserError> {
        self.evaluate(&scripts::focus(selector)).await.map(|_| ())
    }

    async fn blur(&self, selector: &str) -> Result<(), BrowserError> {
        self.evaluate(&scripts::blur(selector)).await.map(|_| ())
    }

    async fn element_exists(&self, selector: &str) -> Result<bool, BrowserError> {
        let v = self.evaluate(&scripts::element_exists(selector)).await?;
        Ok(v.as_bool().unwrap_or(false))
    }
}

/// 驱动层通用脚本
pub mod scripts {
    use serde_json::json;

    use super::PageScript;

    pub fn element_exists(selector: &str) -> PageScript {
        PageScript::new(
            "element_exists",
            "(selector) => !!document.querySelector(selector)",
            vec![json!(selector)],
        )
    }

    pub fn scroll_into_view(selector: &str) -> PageScript {
        PageScript::new(
            "scroll_into_view",
            r#"(selector) => {
                const el = document.querySelector(selector);
                if (el) el.scrollIntoView({ behavior: 'smooth', block: 'center' });
                return !!el;
            }"#,
            vec![json!(selector)],
        )
    }

    pub fn focus(selector: &str) -> PageScript {
        PageScript::new(
            "focus",
            r#"(selector) => {
                const el = document.querySelector(selector);
                if (el) el.focus();
                return !!el;
            }"#,
            vec![json!(selector)],
        )
    }

    pub fn blur(selector: &str) -> PageScript {
        PageScript::new(
            "blur",
            r#"(selector) => {
                const el = document.querySelector(selector);
                if (el) {
                    el.blur();
                    el.dispatchEvent(new Event('blur', { bubbles: true }));
                }
                return !!el;
            }"#,
            vec![json!(selector)],
        )
    }

    /// 滚到底部再回到顶部，触发懒加载的字段
    pub fn prime_lazy_content(pause_ms: u64) -> PageScript {
        PageScript::new(
            "prime_lazy_content",
            r#"async (pauseMs) => {
                window.scrollTo(0, document.body.scrollHeight);
                await new Promise(r => setTimeout(r, pauseMs));
                window.scrollTo(0, 0);
                return true;
            }"#,
            vec![json!(pause_ms)],
        )
    }

    /// 第一个 form 的 outerHTML，没有 form 时取 body
    pub fn form_html() -> PageScript {
        PageScript::new(
            "form_html",
            r#"() => {
                const forms = document.querySelectorAll('form');
                if (forms.length > 0) return forms[0].outerHTML;
                return document.body.outerHTML;
            }"#,
            vec![],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_script_embeds_json_args() {
        let script = PageScript::new("x", "(a, b) => a + b", vec![json!("it's \"q\""), json!(3)]);
        assert_eq!(script.source, r#"((a, b) => a + b)("it's \"q\"", 3)"#);
        assert_eq!(script.arg_str(0), Some("it's \"q\""));
        assert_eq!(script.arg_str(1), None);
    }
}
