//! Chrome 驱动：使用 headless_chrome 控制真实浏览器
//!
//! 需启用 feature "browser" 且系统已安装 Chrome/Chromium。
//! headless_chrome 是同步 API，所有调用都放进 spawn_blocking。

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use headless_chrome::{Browser, LaunchOptions, Tab};
use serde_json::Value;

use crate::browser::{BrowserLauncher, PageDriver, PageScript};
use crate::config::BrowserSection;
use crate::core::BrowserError;

/// 当前文档标记；导航后新文档上不存在
const MARK_DOCUMENT: &str = "window.__autoformDocument = true";
const DOCUMENT_MARKED: &str = "window.__autoformDocument === true";
const NAVIGATION_POLL: Duration = Duration::from_millis(100);

fn mark_document(tab: &Tab) {
    if let Err(e) = tab.evaluate(MARK_DOCUMENT, false) {
        tracing::debug!(error = %e, "failed to mark current document");
    }
}

/// URL 变了，或文档标记确认已不存在（None 表示读取失败，不作判断）
fn navigation_observed(baseline: &str, url: &str, marked: Option<bool>) -> bool {
    url != baseline || marked == Some(false)
}

/// 每个任务启动一个独立的浏览器进程
pub struct ChromeLauncher {
    headless: bool,
    chrome_path: Option<PathBuf>,
    window_size: (u32, u32),
    navigation_timeout: Duration,
}

impl ChromeLauncher {
    pub fn new(cfg: &BrowserSection) -> Self {
        let chrome_path = cfg
            .chrome_path
            .clone()
            .or_else(|| std::env::var("CHROME_PATH").ok().map(PathBuf::from));
        Self {
            headless: cfg.headless,
            chrome_path,
            window_size: (cfg.window_width, cfg.window_height),
            navigation_timeout: Duration::from_secs(cfg.navigation_timeout_secs),
        }
    }
}

#[async_trait]
impl BrowserLauncher for ChromeLauncher {
    async fn open(&self, url: &str) -> Result<Arc<dyn PageDriver>, BrowserError> {
        let options = LaunchOptions::default_builder()
            .headless(self.headless)
            .path(self.chrome_path.clone())
            .window_size(Some(self.window_size))
            .build()
            .map_err(|e| BrowserError::Launch(e.to_string()))?;
        let url = url.to_string();
        let timeout = self.navigation_timeout;

        tracing::info!(url = %url, headless = self.headless, "launching chrome");

        let page = tokio::task::spawn_blocking(move || {
            let browser = Browser::new(options)
                .map_err(|e| BrowserError::Launch(format!("Chrome launch failed: {}", e)))?;
            let tab = browser
                .new_tab()
                .map_err(|e| BrowserError::Launch(format!("Browser tab failed: {}", e)))?;
            tab.set_default_timeout(timeout);
            tab.navigate_to(&url)
                .map_err(|e| BrowserError::Navigate(e.to_string()))?;
            tab.wait_until_navigated()
                .map_err(|e| BrowserError::Navigate(e.to_string()))?;
            mark_document(&tab);
            Ok::<_, BrowserError>(ChromePage {
                baseline_url: Mutex::new(tab.get_url()),
                tab,
                browser: Mutex::new(Some(browser)),
            })
        })
        .await
        .map_err(|e| BrowserError::Launch(format!("Task join: {}", e)))??;

        Ok(Arc::new(page))
    }
}

/// 打开的 Chrome 标签页；close 后浏览器进程随 Browser drop 退出
pub struct ChromePage {
    tab: Arc<Tab>,
    browser: Mutex<Option<Browser>>,
    /// 上次确认导航完成时的 URL
    baseline_url: Mutex<String>,
}

impl ChromePage {
    fn ensure_open(&self) -> Result<(), BrowserError> {
        match self.browser.lock() {
            Ok(guard) if guard.is_some() => Ok(()),
            _ => Err(BrowserError::Closed),
        }
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T, BrowserError>
    where
        T: Send + 'static,
        F: FnOnce(Arc<Tab>) -> Result<T, BrowserError> + Send + 'static,
    {
        self.ensure_open()?;
        let tab = Arc::clone(&self.tab);
        tokio::task::spawn_blocking(move || f(tab))
            .await
            .map_err(|e| BrowserError::Interaction(format!("Task join: {}", e)))?
    }
}

#[async_trait]
impl PageDriver for ChromePage {
    async fn evaluate(&self, script: &PageScript) -> Result<Value, BrowserError> {
        let name = script.name.to_string();
        let wrapped = format!(
            "(async () => JSON.stringify(await ({})))()",
            script.source
        );
        self.blocking(move |tab| {
            let remote = tab.evaluate(&wrapped, true).map_err(|e| BrowserError::Script {
                name: name.clone(),
                reason: e.to_string(),
            })?;
            match remote.value {
                Some(Value::String(json)) => {
                    serde_json::from_str(&json).map_err(|e| BrowserError::Script {
                        name,
                        reason: format!("non-JSON result: {}", e),
                    })
                }
                _ => Ok(Value::Null),
            }
        })
        .await
    }

    async fn click(&self, selector: &str) -> Result<(), BrowserError> {
        let selector = selector.to_string();
        self.blocking(move |tab| {
            let element = tab
                .find_element(&selector)
                .map_err(|_| BrowserError::ElementNotFound(selector.clone()))?;
            element
                .click()
                .map_err(|e| BrowserError::Interaction(format!("Click failed: {}", e)))?;
            Ok(())
        })
        .await
    }

    async fn type_text(&self, selector: &str, text: &str, delay: Duration) -> Result<(), BrowserError> {
        let selector = selector.to_string();
        let text = text.to_string();
        self.blocking(move |tab| {
            let element = tab
                .find_element(&selector)
                .map_err(|_| BrowserError::ElementNotFound(selector.clone()))?;
            element
                .focus()
                .map_err(|e| BrowserError::Interaction(format!("Focus failed: {}", e)))?;
            let mut buf = [0u8; 4];
            for ch in text.chars() {
                tab.type_str(ch.encode_utf8(&mut buf))
                    .map_err(|e| BrowserError::Interaction(format!("Type failed: {}", e)))?;
                std::thread::sleep(delay);
            }
            Ok(())
        })
        .await
    }

    async fn press_key(&self, key: &str) -> Result<(), BrowserError> {
        let key = key.to_string();
        self.blocking(move |tab| {
            tab.press_key(&key)
                .map_err(|e| BrowserError::Interaction(format!("Key press failed: {}", e)))?;
            Ok(())
        })
        .await
    }

    /// 轮询 URL 变化或文档标记消失，直到超时；点击触发的导航可能尚未开始
    async fn wait_for_navigation(&self, timeout: Duration) -> Result<bool, BrowserError> {
        let baseline = self
            .baseline_url
            .lock()
            .map(|u| u.clone())
            .unwrap_or_default();
        let (navigated, url) = self
            .blocking(move |tab| {
                let deadline = Instant::now() + timeout;
                loop {
                    let url = tab.get_url();
                    // 导航进行中 evaluate 可能失败，视为未知继续轮询
                    let marked = tab
                        .evaluate(DOCUMENT_MARKED, false)
                        .ok()
                        .and_then(|r| r.value)
                        .and_then(|v| v.as_bool());
                    if navigation_observed(&baseline, &url, marked) {
                        if let Err(e) = tab.wait_until_navigated() {
                            tracing::debug!(error = %e, "navigation started but load did not finish");
                        }
                        mark_document(&tab);
                        return Ok((true, tab.get_url()));
                    }
                    if Instant::now() >= deadline {
                        return Ok((false, url));
                    }
                    std::thread::sleep(NAVIGATION_POLL);
                }
            })
            .await?;
        if let Ok(mut guard) = self.baseline_url.lock() {
            *guard = url;
        }
        Ok(navigated)
    }

    async fn close(&self) -> Result<(), BrowserError> {
        let browser = match self.browser.lock() {
            Ok(mut guard) => guard.take(),
            Err(_) => None,
        };
        let Some(browser) = browser else {
            return Ok(());
        };
        let tab = Arc::clone(&self.tab);
        tokio::task::spawn_blocking(move || {
            if let Err(e) = tab.close(true) {
                tracing::debug!(error = %e, "tab close failed, dropping browser anyway");
            }
            drop(browser);
        })
        .await
        .map_err(|e| BrowserError::Interaction(format!("Task join: {}", e)))
    }
}
