//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `AUTOFORM__*` 覆盖（双下划线表示嵌套，如 `AUTOFORM__BROWSER__HEADLESS=true`）。
//! API Key 不在配置文件里，只记录读取它的环境变量名；缺失时在任务运行时报 Configuration 错误。

use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub browser: BrowserSection,
    pub fill: FillSection,
    pub server: ServerSection,
}

/// [app] 段：数据目录（字段缓存与任务日志都放在其下）
#[derive(Debug, Clone, Deserialize)]
pub struct AppSection {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

impl AppSection {
    /// 字段缓存文件
    pub fn cache_path(&self) -> PathBuf {
        self.data_dir.join("form_cache.json")
    }

    /// 任务日志目录
    pub fn logs_dir(&self) -> PathBuf {
        self.data_dir.join("logs")
    }
}

/// [llm] 段：后端、模型与超时
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSection {
    /// 后端：gemini 或 openai
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// OpenAI 兼容端点；未设置时按 provider 取默认值
    pub base_url: Option<String>,
    /// 读取 API Key 的环境变量名
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default)]
    pub timeouts: LlmTimeoutsSection,
}

fn default_provider() -> String {
    "gemini".to_string()
}

fn default_model() -> String {
    "gemini-2.5-flash".to_string()
}

fn default_api_key_env() -> String {
    "GEMINI_API_KEY".to_string()
}

pub const GEMINI_OPENAI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/openai";

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            base_url: None,
            api_key_env: default_api_key_env(),
            timeouts: LlmTimeoutsSection::default(),
        }
    }
}

impl LlmSection {
    pub fn resolved_base_url(&self) -> String {
        match (&self.base_url, self.provider.as_str()) {
            (Some(url), _) => url.clone(),
            (None, "openai") => "https://api.openai.com/v1".to_string(),
            (None, _) => GEMINI_OPENAI_BASE_URL.to_string(),
        }
    }

    /// 从环境变量读取 API Key；空串视为缺失
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmTimeoutsSection {
    /// 单次请求超时（秒）
    #[serde(default = "default_request_timeout")]
    pub request: u64,
}

fn default_request_timeout() -> u64 {
    60
}

impl Default for LlmTimeoutsSection {
    fn default() -> Self {
        Self {
            request: default_request_timeout(),
        }
    }
}

/// [browser] 段
#[derive(Debug, Clone, Deserialize)]
pub struct BrowserSection {
    /// 默认有界面，便于观察与人工接管
    #[serde(default)]
    pub headless: bool,
    /// Chrome 可执行文件；未设置时读 CHROME_PATH，再不行由 headless_chrome 自动查找
    pub chrome_path: Option<PathBuf>,
    #[serde(default = "default_window_width")]
    pub window_width: u32,
    #[serde(default = "default_window_height")]
    pub window_height: u32,
    /// 打开页面时等待导航完成的上限（秒）
    #[serde(default = "default_navigation_timeout_secs")]
    pub navigation_timeout_secs: u64,
}

fn default_window_width() -> u32 {
    1366
}

fn default_window_height() -> u32 {
    900
}

fn default_navigation_timeout_secs() -> u64 {
    60
}

impl Default for BrowserSection {
    fn default() -> Self {
        Self {
            headless: false,
            chrome_path: None,
            window_width: default_window_width(),
            window_height: default_window_height(),
            navigation_timeout_secs: default_navigation_timeout_secs(),
        }
    }
}

/// [fill] 段：填写过程中的固定等待（毫秒）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FillSection {
    /// 打开页面后
    pub page_settle: u64,
    /// 滚到底部后停留，触发懒加载
    pub prime_pause: u64,
    /// 滚动到字段后
    pub scroll_settle: u64,
    /// radio / checkbox / select / 日期操作后
    pub action_settle: u64,
    /// 文本类写入后
    pub text_settle: u64,
    /// 展开自定义下拉后等待选项渲染
    pub listbox_open: u64,
    pub keystroke_delay: u64,
    /// 组合框输入完成后等待建议列表
    pub suggestion_wait: u64,
    /// 日期失焦后、按 Escape 前
    pub picker_dismiss: u64,
    /// 所有字段处理完、查找提交按钮前
    pub pre_submit: u64,
    /// 点击提交后等待导航的上限
    pub navigation_timeout: u64,
    /// 关闭浏览器前停留
    pub teardown_delay: u64,
}

impl Default for FillSection {
    fn default() -> Self {
        Self {
            page_settle: 2000,
            prime_pause: 1000,
            scroll_settle: 300,
            action_settle: 300,
            text_settle: 200,
            listbox_open: 800,
            keystroke_delay: 50,
            suggestion_wait: 500,
            picker_dismiss: 200,
            pre_submit: 2000,
            navigation_timeout: 5000,
            teardown_delay: 2000,
        }
    }
}

/// [server] 段
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_bind")]
    pub bind: String,
}

fn default_bind() -> String {
    "127.0.0.1:3000".to_string()
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

/// 从 config 目录加载配置，环境变量 AUTOFORM__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 AUTOFORM__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("AUTOFORM")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}
