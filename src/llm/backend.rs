//! 抽取与映射共用的 LLM 后端：可能未配置（缺少 API Key），以及回复的 JSON 解析

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use regex::Regex;
use serde_json::Value;

use crate::config::LlmSection;
use crate::core::AutomationError;
use crate::llm::{LlmClient, OpenAiClient};

/// 已配置的客户端，或缺失凭据时的占位
#[derive(Clone)]
pub struct LlmBackend {
    client: Option<Arc<dyn LlmClient>>,
    key_env: String,
}

impl LlmBackend {
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self {
            client: Some(client),
            key_env: String::new(),
        }
    }

    /// 缺少凭据；任何调用都返回 Configuration
    pub fn unconfigured(key_env: impl Into<String>) -> Self {
        Self {
            client: None,
            key_env: key_env.into(),
        }
    }

    /// 根据 [llm] 段与环境变量创建；缺 Key 不是加载错误，推迟到任务运行时报告
    pub fn from_config(cfg: &LlmSection) -> Self {
        match cfg.api_key() {
            Some(key) => {
                let base_url = cfg.resolved_base_url();
                tracing::info!(provider = %cfg.provider, model = %cfg.model, base_url = %base_url, "using OpenAI-compatible LLM");
                Self::new(Arc::new(OpenAiClient::new(
                    &base_url,
                    &cfg.model,
                    &key,
                    Duration::from_secs(cfg.timeouts.request),
                )))
            }
            None => {
                tracing::warn!(env = %cfg.api_key_env, "LLM API key not set, tasks will fail with a configuration error");
                Self::unconfigured(cfg.api_key_env.clone())
            }
        }
    }

    pub fn is_configured(&self) -> bool {
        self.client.is_some()
    }

    pub fn client(&self) -> Result<&Arc<dyn LlmClient>, AutomationError> {
        self.client.as_ref().ok_or_else(|| {
            AutomationError::Configuration(format!(
                "{} not found in environment variables",
                self.key_env
            ))
        })
    }
}

static FENCE_RE: OnceLock<Regex> = OnceLock::new();

/// 去掉 ```json ... ``` 包裹
pub fn strip_code_fences(text: &str) -> String {
    let re = FENCE_RE.get_or_init(|| Regex::new(r"(?i)```(?:json)?").unwrap());
    re.replace_all(text, "").trim().to_string()
}

/// 解析模型回复中的 JSON
pub fn parse_json_reply(text: &str) -> Result<Value, String> {
    let cleaned = strip_code_fences(text);
    serde_json::from_str(&cleaned).map_err(|e| {
        let preview: String = cleaned.chars().take(200).collect();
        format!("reply is not valid JSON ({}): {}", e, preview)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_fenced_reply_is_parsed() {
        let reply = "```json\n{\"#name\": \"A\"}\n```";
        assert_eq!(parse_json_reply(reply).unwrap(), json!({"#name": "A"}));
        assert_eq!(parse_json_reply("  [1, 2] ").unwrap(), json!([1, 2]));
        assert!(parse_json_reply("Sure! Here you go").is_err());
    }

    #[test]
    fn test_unconfigured_backend_reports_key_env() {
        let backend = LlmBackend::unconfigured("GEMINI_API_KEY");
        assert!(!backend.is_configured());
        let err = backend.client().err().unwrap();
        assert!(matches!(err, AutomationError::Configuration(ref m) if m.contains("GEMINI_API_KEY")));
    }
}
