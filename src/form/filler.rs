//! 表单填写引擎
//!
//! 流程：批量映射 -> 按抽取顺序逐个字段处理（缺值策略、存在性检查、滚动、按类型分派策略）-> 提交。
//! 单个字段的失败只写日志，不中断任务。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::browser::PageDriver;
use crate::config::FillSection;
use crate::core::{AutomationError, GateError};
use crate::form::field::{FieldDescriptor, FieldType, FillValue, ValueSource};
use crate::form::mapping::{apply_mapping, is_missing, FieldMapper, FieldMapping};
use crate::form::strategy::{settle, FieldHandler, StrategyOutcome, SubmitLocator};

/// 填写过程中的固定等待
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FillTimings {
    pub page_settle: Duration,
    pub prime_pause: Duration,
    pub scroll_settle: Duration,
    pub action_settle: Duration,
    pub text_settle: Duration,
    pub listbox_open: Duration,
    pub keystroke_delay: Duration,
    pub suggestion_wait: Duration,
    pub picker_dismiss: Duration,
    pub pre_submit: Duration,
    pub navigation_timeout: Duration,
    pub teardown_delay: Duration,
}

impl FillTimings {
    pub fn from_config(cfg: &FillSection) -> Self {
        let ms = Duration::from_millis;
        Self {
            page_settle: ms(cfg.page_settle),
            prime_pause: ms(cfg.prime_pause),
            scroll_settle: ms(cfg.scroll_settle),
            action_settle: ms(cfg.action_settle),
            text_settle: ms(cfg.text_settle),
            listbox_open: ms(cfg.listbox_open),
            keystroke_delay: ms(cfg.keystroke_delay),
            suggestion_wait: ms(cfg.suggestion_wait),
            picker_dismiss: ms(cfg.picker_dismiss),
            pre_submit: ms(cfg.pre_submit),
            navigation_timeout: ms(cfg.navigation_timeout),
            teardown_delay: ms(cfg.teardown_delay),
        }
    }

    /// 全部为零，测试用
    pub fn instant() -> Self {
        Self::from_config(&FillSection {
            page_settle: 0,
            prime_pause: 0,
            scroll_settle: 0,
            action_settle: 0,
            text_settle: 0,
            listbox_open: 0,
            keystroke_delay: 0,
            suggestion_wait: 0,
            picker_dismiss: 0,
            pre_submit: 0,
            navigation_timeout: 0,
            teardown_delay: 0,
        })
    }
}

impl Default for FillTimings {
    fn default() -> Self {
        Self::from_config(&FillSection::default())
    }
}

/// 填写过程与外界的接口：写任务日志、向人提问
#[async_trait]
pub trait FillContext: Send + Sync {
    fn log(&self, message: &str);

    /// 挂起直到有人回答；没有超时
    async fn ask_user(&self, question: &str) -> Result<String, GateError>;
}

/// 单个字段的处理结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldStatus {
    Filled { strategy: &'static str, detail: String },
    Skipped(String),
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct FieldOutcome {
    pub selector: String,
    pub label: String,
    pub status: FieldStatus,
}

/// 提交结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    Submitted { locator: &'static str, navigated: bool },
    NotFound,
}

#[derive(Debug, Clone, Default)]
pub struct FillReport {
    pub fields: Vec<FieldOutcome>,
}

impl FillReport {
    fn count(&self, f: impl Fn(&FieldStatus) -> bool) -> usize {
        self.fields.iter().filter(|o| f(&o.status)).count()
    }

    pub fn filled(&self) -> usize {
        self.count(|s| matches!(s, FieldStatus::Filled { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|s| matches!(s, FieldStatus::Skipped(_)))
    }

    pub fn failed(&self) -> usize {
        self.count(|s| matches!(s, FieldStatus::Failed(_)))
    }

    pub fn status_of(&self, selector: &str) -> Option<&FieldStatus> {
        self.fields
            .iter()
            .find(|o| o.selector == selector)
            .map(|o| &o.status)
    }
}

/// 缺值时的处理
enum MissingValue {
    Use(FillValue),
    Skip(String),
}

pub struct FormFillingEngine {
    mapper: Arc<dyn FieldMapper>,
    timings: FillTimings,
}

impl FormFillingEngine {
    pub fn new(mapper: Arc<dyn FieldMapper>, timings: FillTimings) -> Self {
        Self { mapper, timings }
    }

    pub fn mapper(&self) -> &Arc<dyn FieldMapper> {
        &self.mapper
    }

    pub fn timings(&self) -> &FillTimings {
        &self.timings
    }

    /// 一次批量映射；失败时降级为全部未映射并继续。返回已映射字段数
    pub async fn map_values(
        &self,
        fields: &mut [FieldDescriptor],
        form_data: &Value,
        ctx: &dyn FillContext,
    ) -> usize {
        ctx.log(&format!(
            "[LLM STEP 2] Mapping user data to {} fields...",
            fields.len()
        ));
        let mapping = match self.mapper.map_fields(fields, form_data).await {
            Ok(mapping) => mapping,
            Err(e) => {
                tracing::warn!(error = %e, "mapping failed, treating every field as unmapped");
                ctx.log(&format!("[ERROR] {}. Continuing without mapped values.", e));
                FieldMapping::new()
            }
        };
        apply_mapping(fields, &mapping);
        fields.iter().filter(|f| f.resolved_value.is_some()).count()
    }

    /// 按顺序处理全部字段
    pub async fn fill(
        &self,
        page: &dyn PageDriver,
        fields: &mut [FieldDescriptor],
        ctx: &dyn FillContext,
    ) -> FillReport {
        let mut report = FillReport::default();
        for field in fields.iter_mut() {
            let status = self.fill_field(page, field, ctx).await;
            report.fields.push(FieldOutcome {
                selector: field.selector.clone(),
                label: field.label.clone(),
                status,
            });
        }
        report
    }

    async fn fill_field(
        &self,
        page: &dyn PageDriver,
        field: &mut FieldDescriptor,
        ctx: &dyn FillContext,
    ) -> FieldStatus {
        let mapped = field
            .resolved_value
            .clone()
            .filter(|v| !is_missing(Some(v.as_str())));
        let value = match mapped {
            Some(v) => FillValue::Text(v),
            None => match self.resolve_missing(field, ctx).await {
                MissingValue::Use(value) => value,
                MissingValue::Skip(reason) => return FieldStatus::Skipped(reason),
            },
        };

        match self.apply_value(page, field, &value).await {
            Ok((strategy, detail)) => {
                tracing::debug!(selector = %field.selector, strategy, "field filled");
                let status = FieldStatus::Filled { strategy, detail };
                if let Some(line) = filled_line(field, &status) {
                    ctx.log(&line);
                }
                status
            }
            Err(e) => {
                tracing::warn!(selector = %field.selector, error = %e, "field failed");
                let message = match &e {
                    AutomationError::Browser(crate::core::BrowserError::ElementNotFound(_)) => {
                        format!("[ERROR] Element not found: \"{}\"", field.label)
                    }
                    other => format!("[ERROR] {}", other),
                };
                ctx.log(&message);
                FieldStatus::Failed(e.to_string())
            }
        }
    }

    /// 缺值策略：radio 或标签含 other/response 跳过；checkbox 视为不勾选；其余问人
    async fn resolve_missing(&self, field: &mut FieldDescriptor, ctx: &dyn FillContext) -> MissingValue {
        if field.is_optional_when_missing() {
            ctx.log(&format!("[SKIP] No matching data found for \"{}\"", field.label));
            return MissingValue::Skip("optional field without data".to_string());
        }
        if field.field_type == FieldType::Checkbox {
            return MissingValue::Use(FillValue::Flag(false));
        }

        ctx.log(&format!(
            "WAITING: No data found for \"{}\". Asking user...",
            field.label
        ));
        match ctx
            .ask_user(&format!("Please provide a value for: {}", field.label))
            .await
        {
            Ok(answer) => {
                field.resolved_value = Some(answer.clone());
                field.value_source = Some(ValueSource::Human);
                MissingValue::Use(FillValue::Text(answer))
            }
            Err(e) => {
                ctx.log(&format!(
                    "[ERROR] Interactive prompt failed for \"{}\": {}",
                    field.label, e
                ));
                ctx.log(&format!(
                    "[SKIP] Skipping \"{}\" due to interaction error.",
                    field.label
                ));
                MissingValue::Skip(format!("prompt failed: {}", e))
            }
        }
    }

    /// 存在性检查、滚动、按类型依次尝试策略，成功后写 [FILLED] 日志并等待页面稳定
    async fn apply_value(
        &self,
        page: &dyn PageDriver,
        field: &FieldDescriptor,
        value: &FillValue,
    ) -> Result<(&'static str, String), AutomationError> {
        if !page.element_exists(&field.selector).await? {
            return Err(crate::core::BrowserError::ElementNotFound(field.selector.clone()).into());
        }
        page.scroll_into_view(&field.selector).await?;
        settle(self.timings.scroll_settle).await;

        let handler = FieldHandler::for_field(field);
        let mut reasons = Vec::new();
        for strategy in handler.strategies() {
            match strategy.apply(page, field, value, &self.timings).await? {
                StrategyOutcome::Applied(detail) => {
                    settle(match handler {
                        FieldHandler::Text => self.timings.text_settle,
                        _ => self.timings.action_settle,
                    })
                    .await;
                    return Ok((strategy.name(), detail));
                }
                StrategyOutcome::Skipped(reason) => {
                    reasons.push(format!("{}: {}", strategy.name(), reason));
                }
            }
        }
        Err(AutomationError::fill(
            field.label.clone(),
            format!(
                "could not apply {} value \"{}\" ({})",
                handler.label().to_lowercase(),
                value,
                reasons.join("; ")
            ),
        ))
    }

    /// 依次尝试提交定位方式；找到则等待可能的导航（超时不算错误）
    pub async fn submit(&self, page: &dyn PageDriver, ctx: &dyn FillContext) -> Result<SubmitOutcome, AutomationError> {
        ctx.log("Submitting form...");
        settle(self.timings.pre_submit).await;

        for locator in SubmitLocator::ORDER {
            let result = page.evaluate(&locator.script()).await?;
            if !result.get("clicked").and_then(Value::as_bool).unwrap_or(false) {
                continue;
            }
            let text = result.get("text").and_then(Value::as_str).unwrap_or_default();
            tracing::info!(locator = locator.name(), text, "submit control clicked");
            ctx.log("Form submitted successfully");
            let navigated = page
                .wait_for_navigation(self.timings.navigation_timeout)
                .await?;
            if !navigated {
                let timeout = AutomationError::NavigationTimeout(
                    self.timings.navigation_timeout.as_millis() as u64,
                );
                tracing::debug!(reason = %timeout, "no navigation after submit");
            }
            return Ok(SubmitOutcome::Submitted {
                locator: locator.name(),
                navigated,
            });
        }

        tracing::warn!("{}", AutomationError::SubmissionNotFound);
        ctx.log("Warning: Could not find submit button");
        Ok(SubmitOutcome::NotFound)
    }
}

/// 成功结果对应的日志行
fn filled_line(field: &FieldDescriptor, status: &FieldStatus) -> Option<String> {
    match status {
        FieldStatus::Filled { detail, .. } => {
            let handler = FieldHandler::for_field(field);
            Some(match handler {
                FieldHandler::Text => format!("[FILLED] {} \"{}\"", text_kind(field), field.label),
                FieldHandler::Checkbox => {
                    format!("[FILLED] Checkbox \"{}\" = {}", field.label, detail)
                }
                _ => format!("[FILLED] {} \"{}\" = \"{}\"", handler.label(), field.label, detail),
            })
        }
        _ => None,
    }
}

fn text_kind(field: &FieldDescriptor) -> &'static str {
    if field.field_type == FieldType::Textarea {
        "Textarea"
    } else {
        "Text"
    }
}
