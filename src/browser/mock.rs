//! Mock 浏览器（用于测试与演示，无需 Chrome）
//!
//! MockPage 按脚本名应答：先取一次性队列，再取默认应答，都没有则返回 Null；
//! 所有调用按顺序记录，便于断言交互序列。

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::browser::{BrowserLauncher, PageDriver, PageScript};
use crate::core::BrowserError;

/// 记录下来的一次页面调用
#[derive(Debug, Clone, PartialEq)]
pub enum PageCall {
    Evaluate { name: String, args: Vec<Value> },
    Click(String),
    Type { selector: String, text: String },
    PressKey(String),
    WaitForNavigation,
    Close,
}

#[derive(Default)]
struct MockPageState {
    queued: HashMap<String, VecDeque<Result<Value, BrowserError>>>,
    defaults: HashMap<String, Value>,
    calls: Vec<PageCall>,
    navigation_occurs: bool,
    closed: bool,
}

/// 可编排的页面
#[derive(Default)]
pub struct MockPage {
    state: Mutex<MockPageState>,
}

impl MockPage {
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置某脚本的默认应答
    pub fn respond(&self, name: &str, value: Value) -> &Self {
        if let Ok(mut s) = self.state.lock() {
            s.defaults.insert(name.to_string(), value);
        }
        self
    }

    /// 追加一次性应答，优先于默认应答
    pub fn respond_once(&self, name: &str, value: Value) -> &Self {
        self.queue(name, Ok(value))
    }

    /// 追加一次性失败
    pub fn fail_once(&self, name: &str, error: BrowserError) -> &Self {
        self.queue(name, Err(error))
    }

    fn queue(&self, name: &str, result: Result<Value, BrowserError>) -> &Self {
        if let Ok(mut s) = self.state.lock() {
            s.queued.entry(name.to_string()).or_default().push_back(result);
        }
        self
    }

    pub fn set_navigation_occurs(&self, occurs: bool) {
        if let Ok(mut s) = self.state.lock() {
            s.navigation_occurs = occurs;
        }
    }

    pub fn calls(&self) -> Vec<PageCall> {
        self.state.lock().map(|s| s.calls.clone()).unwrap_or_default()
    }

    /// 某脚本每次被执行时的参数
    pub fn evaluations(&self, name: &str) -> Vec<Vec<Value>> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                PageCall::Evaluate { name: n, args } if n == name => Some(args),
                _ => None,
            })
            .collect()
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().map(|s| s.closed).unwrap_or(false)
    }

    fn record(&self, call: PageCall) -> Result<(), BrowserError> {
        let mut s = self.state.lock().map_err(|_| BrowserError::Closed)?;
        if s.closed && call != PageCall::Close {
            return Err(BrowserError::Closed);
        }
        s.calls.push(call);
        Ok(())
    }
}

#[async_trait]
impl PageDriver for MockPage {
    async fn evaluate(&self, script: &PageScript) -> Result<Value, BrowserError> {
        self.record(PageCall::Evaluate {
            name: script.name.to_string(),
            args: script.args.clone(),
        })?;
        let mut s = self.state.lock().map_err(|_| BrowserError::Closed)?;
        if let Some(result) = s.queued.get_mut(script.name).and_then(|q| q.pop_front()) {
            return result;
        }
        Ok(s.defaults.get(script.name).cloned().unwrap_or(Value::Null))
    }

    async fn click(&self, selector: &str) -> Result<(), BrowserError> {
        self.record(PageCall::Click(selector.to_string()))
    }

    async fn type_text(&self, selector: &str, text: &str, _delay: Duration) -> Result<(), BrowserError> {
        self.record(PageCall::Type {
            selector: selector.to_string(),
            text: text.to_string(),
        })
    }

    async fn press_key(&self, key: &str) -> Result<(), BrowserError> {
        self.record(PageCall::PressKey(key.to_string()))
    }

    async fn wait_for_navigation(&self, _timeout: Duration) -> Result<bool, BrowserError> {
        self.record(PageCall::WaitForNavigation)?;
        Ok(self.state.lock().map(|s| s.navigation_occurs).unwrap_or(false))
    }

    async fn close(&self) -> Result<(), BrowserError> {
        self.record(PageCall::Close)?;
        if let Ok(mut s) = self.state.lock() {
            s.closed = true;
        }
        Ok(())
    }
}

/// 每次 open 都返回同一个 MockPage
pub struct MockBrowser {
    page: Arc<MockPage>,
    opened: Mutex<Vec<String>>,
    launch_error: Option<String>,
}

impl MockBrowser {
    pub fn new(page: Arc<MockPage>) -> Self {
        Self {
            page,
            opened: Mutex::new(Vec::new()),
            launch_error: None,
        }
    }

    /// open 总是失败
    pub fn failing(reason: impl Into<String>) -> Self {
        Self {
            page: Arc::new(MockPage::new()),
            opened: Mutex::new(Vec::new()),
            launch_error: Some(reason.into()),
        }
    }

    pub fn page(&self) -> Arc<MockPage> {
        Arc::clone(&self.page)
    }

    pub fn opened_urls(&self) -> Vec<String> {
        self.opened.lock().map(|o| o.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl BrowserLauncher for MockBrowser {
    async fn open(&self, url: &str) -> Result<Arc<dyn PageDriver>, BrowserError> {
        if let Some(reason) = &self.launch_error {
            return Err(BrowserError::Launch(reason.clone()));
        }
        if let Ok(mut opened) = self.opened.lock() {
            opened.push(url.to_string());
        }
        let page: Arc<dyn PageDriver> = self.page.clone();
        Ok(page)
    }
}
