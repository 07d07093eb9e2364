//! 字段填写策略
//!
//! 每种字段类型对应一组按顺序尝试的具名策略；策略先读取元素形态（原生控件或带 role 的自定义控件），
//! 形态不符时返回 Skipped 交给下一条。选项匹配在 Rust 侧完成，页面脚本只负责读取与点击。

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::browser::{PageDriver, PageScript};
use crate::core::BrowserError;
use crate::form::field::{FieldDescriptor, FieldType, FillValue};
use crate::form::filler::FillTimings;

/// 单条策略的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StrategyOutcome {
    /// 已写入，附带日志用的描述
    Applied(String),
    /// 形态不符或没有匹配项，交给下一条
    Skipped(String),
}

/// 具名填写策略
#[async_trait]
pub trait FillStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    async fn apply(
        &self,
        page: &dyn PageDriver,
        field: &FieldDescriptor,
        value: &FillValue,
        timings: &FillTimings,
    ) -> Result<StrategyOutcome, BrowserError>;
}

/// 字段处理器分类（决定使用哪组策略）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldHandler {
    Radio,
    Checkbox,
    Select,
    Date,
    TypeAhead,
    Text,
}

impl FieldHandler {
    /// 分派顺序：radio、checkbox、select、日期、输入即搜索、其余文本类
    pub fn for_field(field: &FieldDescriptor) -> Self {
        match field.field_type {
            FieldType::Radio => FieldHandler::Radio,
            FieldType::Checkbox => FieldHandler::Checkbox,
            FieldType::Select => FieldHandler::Select,
            _ if field.is_date_like() => FieldHandler::Date,
            _ if field.is_typeahead() => FieldHandler::TypeAhead,
            _ => FieldHandler::Text,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            FieldHandler::Radio => "Radio",
            FieldHandler::Checkbox => "Checkbox",
            FieldHandler::Select => "Dropdown",
            FieldHandler::Date => "Date",
            FieldHandler::TypeAhead => "Combobox",
            FieldHandler::Text => "Text",
        }
    }

    pub fn strategies(self) -> Vec<Box<dyn FillStrategy>> {
        match self {
            FieldHandler::Radio => vec![Box::new(RadioSelfOption), Box::new(RadioDescendantOption)],
            FieldHandler::Checkbox => vec![
                Box::new(StyledCheckbox),
                Box::new(NativeCheckbox),
                Box::new(CheckboxGroupOptions),
            ],
            FieldHandler::Select => vec![Box::new(StyledListbox), Box::new(NativeSelect)],
            FieldHandler::Date => vec![Box::new(DateDirectValue)],
            FieldHandler::TypeAhead => vec![Box::new(TypeAheadCombobox)],
            FieldHandler::Text => vec![
                Box::new(DirectValue),
                Box::new(ContentEditable),
                Box::new(KeyboardEntry),
            ],
        }
    }
}

pub(crate) async fn settle(duration: Duration) {
    if !duration.is_zero() {
        tokio::time::sleep(duration).await;
    }
}

// ---------------------------------------------------------------------------
// 文本匹配

/// 小写并折叠空白
pub fn normalize_text(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

/// 页面上的一个候选选项
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct OptionCandidate {
    pub text: String,
    pub value: String,
    pub checked: bool,
}

/// 先精确匹配，再「选项文本包含目标」
pub fn pick_option(candidates: &[OptionCandidate], target: &str) -> Option<usize> {
    let target = normalize_text(target);
    if target.is_empty() {
        return None;
    }
    candidates
        .iter()
        .position(|c| normalize_text(&c.text) == target)
        .or_else(|| {
            candidates
                .iter()
                .position(|c| normalize_text(&c.text).contains(&target))
        })
}

/// 原生 select：第一轮精确文本；第二轮双向包含或 value 精确相等
pub fn pick_native_option(candidates: &[OptionCandidate], target: &str) -> Option<usize> {
    let target = normalize_text(target);
    if target.is_empty() {
        return None;
    }
    candidates
        .iter()
        .position(|c| normalize_text(&c.text) == target)
        .or_else(|| {
            candidates.iter().position(|c| {
                let text = normalize_text(&c.text);
                (!text.is_empty() && (text.contains(&target) || target.contains(&text)))
                    || normalize_text(&c.value) == target
            })
        })
}

/// 元素本身是单选项时是否应激活：文本一致，或目标是布尔/性别同义词
pub fn radio_self_matches(label: &str, target: &str) -> bool {
    let label = normalize_text(label);
    let target = normalize_text(target);
    label == target || matches!(target.as_str(), "true" | "yes" | "1" | "on" | "male" | "female")
}

// ---------------------------------------------------------------------------
// 页面脚本

/// 元素形态
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ElementInfo {
    pub tag: String,
    pub role: Option<String>,
    pub input_type: Option<String>,
    pub label: String,
    pub checked: bool,
    pub aria_checked: Option<String>,
    pub editable: bool,
    pub has_value: bool,
}

impl ElementInfo {
    fn role_is(&self, role: &str) -> bool {
        self.role.as_deref() == Some(role)
    }

    fn input_type_is(&self, t: &str) -> bool {
        self.tag == "input" && self.input_type.as_deref() == Some(t)
    }
}

/// 选项的查找范围
#[derive(Debug, Clone, Copy)]
enum Scope {
    /// 字段根元素的后代
    Within,
    /// 整个文档（弹出式列表框的选项渲染在根元素之外）
    Document,
}

impl Scope {
    fn as_str(self) -> &'static str {
        match self {
            Scope::Within => "within",
            Scope::Document => "document",
        }
    }
}

const RADIO_OPTION_QUERY: &str = "div[role=\"radio\"], input[type=\"radio\"], label";
const CHECKBOX_OPTION_QUERY: &str = "[role=\"checkbox\"], input[type=\"checkbox\"]";
const LISTBOX_OPTION_QUERY: &str = "[role=\"option\"]";

pub mod scripts {
    use super::*;

    pub fn describe_element(selector: &str) -> PageScript {
        PageScript::new(
            "describe_element",
            r#"(selector) => {
                const el = document.querySelector(selector);
                if (!el) return null;
                const tag = el.tagName.toLowerCase();
                return {
                    tag,
                    role: el.getAttribute('role'),
                    inputType: typeof el.type === 'string' ? el.type : null,
                    label: el.getAttribute('aria-label') || el.innerText || el.value || el.textContent || '',
                    checked: !!el.checked,
                    ariaChecked: el.getAttribute('aria-checked'),
                    editable: !!el.isContentEditable,
                    hasValue: ['input', 'textarea', 'select'].includes(tag),
                };
            }"#,
            vec![json!(selector)],
        )
    }

    pub(super) fn list_options(selector: &str, query: &str, scope: Scope) -> PageScript {
        PageScript::new(
            "list_options",
            r#"(selector, query, scope) => {
                const root = scope === 'document' ? document : document.querySelector(selector);
                if (!root) return [];
                return [...root.querySelectorAll(query)].map(opt => ({
                    text: (opt.getAttribute('aria-label') || opt.innerText || opt.text || opt.value || opt.textContent || '').trim(),
                    value: typeof opt.value === 'string' ? opt.value : '',
                    checked: !!opt.checked || opt.getAttribute('aria-checked') === 'true',
                }));
            }"#,
            vec![json!(selector), json!(query), json!(scope.as_str())],
        )
    }

    pub(super) fn activate_option(
        selector: &str,
        query: &str,
        scope: Scope,
        index: usize,
        mark_checked: bool,
    ) -> PageScript {
        PageScript::new(
            "activate_option",
            r#"(selector, query, scope, index, markChecked) => {
                const root = scope === 'document' ? document : document.querySelector(selector);
                if (!root) return false;
                const opt = root.querySelectorAll(query)[index];
                if (!opt) return false;
                opt.scrollIntoView({ behavior: 'smooth', block: 'center' });
                opt.click();
                if (markChecked && opt.getAttribute('role') === 'radio') {
                    opt.dispatchEvent(new MouseEvent('mousedown', { bubbles: true }));
                    opt.dispatchEvent(new MouseEvent('mouseup', { bubbles: true }));
                    opt.setAttribute('aria-checked', 'true');
                }
                return true;
            }"#,
            vec![
                json!(selector),
                json!(query),
                json!(scope.as_str()),
                json!(index),
                json!(mark_checked),
            ],
        )
    }

    pub fn activate_element(selector: &str, mark_checked: bool) -> PageScript {
        PageScript::new(
            "activate_element",
            r#"(selector, markChecked) => {
                const el = document.querySelector(selector);
                if (!el) return false;
                el.scrollIntoView({ behavior: 'smooth', block: 'center' });
                el.click();
                if (markChecked && el.getAttribute('role') === 'radio') {
                    el.setAttribute('aria-checked', 'true');
                }
                return true;
            }"#,
            vec![json!(selector), json!(mark_checked)],
        )
    }

    pub fn toggle_native_checkbox(selector: &str) -> PageScript {
        PageScript::new(
            "toggle_native_checkbox",
            r#"(selector) => {
                const el = document.querySelector(selector);
                if (!el) return null;
                el.click();
                el.dispatchEvent(new Event('change', { bubbles: true }));
                return !!el.checked;
            }"#,
            vec![json!(selector)],
        )
    }

    pub fn set_select_value(selector: &str, option_value: &str) -> PageScript {
        PageScript::new(
            "set_select_value",
            r#"(selector, optionValue) => {
                const el = document.querySelector(selector);
                if (!el) return false;
                el.value = optionValue;
                el.dispatchEvent(new Event('input', { bubbles: true }));
                el.dispatchEvent(new Event('change', { bubbles: true }));
                return true;
            }"#,
            vec![json!(selector), json!(option_value)],
        )
    }

    /// 清空后直接写 value，并触发 input + change
    pub fn set_value(selector: &str, value: &str) -> PageScript {
        PageScript::new(
            "set_value",
            r#"(selector, value) => {
                const el = document.querySelector(selector);
                if (!el) return false;
                el.focus();
                el.value = '';
                el.value = value;
                el.dispatchEvent(new Event('input', { bubbles: true }));
                el.dispatchEvent(new Event('change', { bubbles: true }));
                return true;
            }"#,
            vec![json!(selector), json!(value)],
        )
    }

    pub fn set_text_content(selector: &str, value: &str) -> PageScript {
        PageScript::new(
            "set_text_content",
            r#"(selector, value) => {
                const el = document.querySelector(selector);
                if (!el) return false;
                el.focus();
                el.textContent = value;
                el.dispatchEvent(new Event('input', { bubbles: true }));
                el.blur();
                return true;
            }"#,
            vec![json!(selector), json!(value)],
        )
    }
}

async fn describe(page: &dyn PageDriver, selector: &str) -> Result<Option<ElementInfo>, BrowserError> {
    let value = page.evaluate(&scripts::describe_element(selector)).await?;
    if value.is_null() {
        return Ok(None);
    }
    serde_json::from_value(value)
        .map(Some)
        .map_err(|e| BrowserError::Script {
            name: "describe_element".to_string(),
            reason: e.to_string(),
        })
}

async fn list_options(
    page: &dyn PageDriver,
    selector: &str,
    query: &str,
    scope: Scope,
) -> Result<Vec<OptionCandidate>, BrowserError> {
    let value = page
        .evaluate(&scripts::list_options(selector, query, scope))
        .await?;
    if value.is_null() {
        return Ok(vec![]);
    }
    serde_json::from_value(value).map_err(|e| BrowserError::Script {
        name: "list_options".to_string(),
        reason: e.to_string(),
    })
}

fn truthy(value: &Value) -> bool {
    value.as_bool().unwrap_or(false)
}

fn not_found() -> StrategyOutcome {
    StrategyOutcome::Skipped("element not found".to_string())
}

// ---------------------------------------------------------------------------
// radio

/// 元素本身就是一个单选项
pub struct RadioSelfOption;

#[async_trait]
impl FillStrategy for RadioSelfOption {
    fn name(&self) -> &'static str {
        "radio-self-option"
    }

    async fn apply(
        &self,
        page: &dyn PageDriver,
        field: &FieldDescriptor,
        value: &FillValue,
        _timings: &FillTimings,
    ) -> Result<StrategyOutcome, BrowserError> {
        let Some(info) = describe(page, &field.selector).await? else {
            return Ok(not_found());
        };
        if !(info.role_is("radio") || info.input_type_is("radio")) {
            return Ok(StrategyOutcome::Skipped("element is not a radio option".into()));
        }
        if !radio_self_matches(&info.label, &value.as_text()) {
            return Ok(StrategyOutcome::Skipped(format!(
                "option \"{}\" does not match",
                info.label.trim()
            )));
        }
        page.evaluate(&scripts::activate_element(&field.selector, true))
            .await?;
        Ok(StrategyOutcome::Applied(normalize_text(&info.label)))
    }
}

/// 在容器内查找匹配的单选项
pub struct RadioDescendantOption;

#[async_trait]
impl FillStrategy for RadioDescendantOption {
    fn name(&self) -> &'static str {
        "radio-descendant-option"
    }

    async fn apply(
        &self,
        page: &dyn PageDriver,
        field: &FieldDescriptor,
        value: &FillValue,
        _timings: &FillTimings,
    ) -> Result<StrategyOutcome, BrowserError> {
        let candidates = list_options(page, &field.selector, RADIO_OPTION_QUERY, Scope::Within).await?;
        let Some(index) = pick_option(&candidates, &value.as_text()) else {
            return Ok(StrategyOutcome::Skipped(format!(
                "no radio option matches \"{}\"",
                value
            )));
        };
        let clicked = page
            .evaluate(&scripts::activate_option(
                &field.selector,
                RADIO_OPTION_QUERY,
                Scope::Within,
                index,
                true,
            ))
            .await?;
        if !truthy(&clicked) {
            return Ok(StrategyOutcome::Skipped("radio option disappeared".into()));
        }
        Ok(StrategyOutcome::Applied(normalize_text(&candidates[index].text)))
    }
}

// ---------------------------------------------------------------------------
// checkbox

/// role="checkbox" 的自定义复选框：与 aria-checked 不一致时点击
pub struct StyledCheckbox;

#[async_trait]
impl FillStrategy for StyledCheckbox {
    fn name(&self) -> &'static str {
        "styled-checkbox"
    }

    async fn apply(
        &self,
        page: &dyn PageDriver,
        field: &FieldDescriptor,
        value: &FillValue,
        _timings: &FillTimings,
    ) -> Result<StrategyOutcome, BrowserError> {
        let Some(info) = describe(page, &field.selector).await? else {
            return Ok(not_found());
        };
        if !info.role_is("checkbox") {
            return Ok(StrategyOutcome::Skipped("element has no checkbox role".into()));
        }
        let should_check = value.should_check();
        let is_checked = info.aria_checked.as_deref() == Some("true");
        if should_check != is_checked {
            page.evaluate(&scripts::activate_element(&field.selector, false))
                .await?;
        }
        Ok(StrategyOutcome::Applied(should_check.to_string()))
    }
}

/// 原生 input[type=checkbox]：状态不一致时点击并派发 change
pub struct NativeCheckbox;

#[async_trait]
impl FillStrategy for NativeCheckbox {
    fn name(&self) -> &'static str {
        "native-checkbox"
    }

    async fn apply(
        &self,
        page: &dyn PageDriver,
        field: &FieldDescriptor,
        value: &FillValue,
        _timings: &FillTimings,
    ) -> Result<StrategyOutcome, BrowserError> {
        let Some(info) = describe(page, &field.selector).await? else {
            return Ok(not_found());
        };
        if !info.input_type_is("checkbox") {
            return Ok(StrategyOutcome::Skipped("element is not a native checkbox".into()));
        }
        let should_check = value.should_check();
        if should_check == info.checked {
            return Ok(StrategyOutcome::Applied(info.checked.to_string()));
        }
        let now = page
            .evaluate(&scripts::toggle_native_checkbox(&field.selector))
            .await?;
        Ok(StrategyOutcome::Applied(
            now.as_bool().unwrap_or(should_check).to_string(),
        ))
    }
}

/// 一组复选框的容器：勾选文本匹配任一逗号分隔值的选项
pub struct CheckboxGroupOptions;

#[async_trait]
impl FillStrategy for CheckboxGroupOptions {
    fn name(&self) -> &'static str {
        "checkbox-group-options"
    }

    async fn apply(
        &self,
        page: &dyn PageDriver,
        field: &FieldDescriptor,
        value: &FillValue,
        _timings: &FillTimings,
    ) -> Result<StrategyOutcome, BrowserError> {
        let candidates =
            list_options(page, &field.selector, CHECKBOX_OPTION_QUERY, Scope::Within).await?;
        if candidates.is_empty() {
            return Ok(StrategyOutcome::Skipped("no checkbox options in container".into()));
        }
        if !value.should_check() {
            return Ok(StrategyOutcome::Applied("false".into()));
        }

        let mut ticked = Vec::new();
        for wanted in value.as_text().split(',') {
            let Some(index) = pick_option(&candidates, wanted) else {
                continue;
            };
            if !candidates[index].checked && !ticked.contains(&index) {
                page.evaluate(&scripts::activate_option(
                    &field.selector,
                    CHECKBOX_OPTION_QUERY,
                    Scope::Within,
                    index,
                    false,
                ))
                .await?;
            }
            if !ticked.contains(&index) {
                ticked.push(index);
            }
        }
        if ticked.is_empty() {
            return Ok(StrategyOutcome::Skipped(format!(
                "no checkbox option matches \"{}\"",
                value
            )));
        }
        let labels: Vec<String> = ticked
            .iter()
            .map(|&i| normalize_text(&candidates[i].text))
            .collect();
        Ok(StrategyOutcome::Applied(labels.join(", ")))
    }
}

// ---------------------------------------------------------------------------
// select

/// role="listbox" 的自定义下拉：点击展开，等待选项渲染后点选
pub struct StyledListbox;

#[async_trait]
impl FillStrategy for StyledListbox {
    fn name(&self) -> &'static str {
        "styled-listbox"
    }

    async fn apply(
        &self,
        page: &dyn PageDriver,
        field: &FieldDescriptor,
        value: &FillValue,
        timings: &FillTimings,
    ) -> Result<StrategyOutcome, BrowserError> {
        let Some(info) = describe(page, &field.selector).await? else {
            return Ok(not_found());
        };
        if !info.role_is("listbox") {
            return Ok(StrategyOutcome::Skipped("element has no listbox role".into()));
        }
        page.evaluate(&scripts::activate_element(&field.selector, false))
            .await?;
        settle(timings.listbox_open).await;

        let candidates =
            list_options(page, &field.selector, LISTBOX_OPTION_QUERY, Scope::Document).await?;
        let Some(index) = pick_option(&candidates, &value.as_text()) else {
            return Ok(StrategyOutcome::Skipped(format!(
                "option \"{}\" not found in listbox",
                value
            )));
        };
        page.evaluate(&scripts::activate_option(
            &field.selector,
            LISTBOX_OPTION_QUERY,
            Scope::Document,
            index,
            false,
        ))
        .await?;
        Ok(StrategyOutcome::Applied(normalize_text(&candidates[index].text)))
    }
}

/// 原生 select
pub struct NativeSelect;

#[async_trait]
impl FillStrategy for NativeSelect {
    fn name(&self) -> &'static str {
        "native-select"
    }

    async fn apply(
        &self,
        page: &dyn PageDriver,
        field: &FieldDescriptor,
        value: &FillValue,
        _timings: &FillTimings,
    ) -> Result<StrategyOutcome, BrowserError> {
        let Some(info) = describe(page, &field.selector).await? else {
            return Ok(not_found());
        };
        if info.tag != "select" {
            return Ok(StrategyOutcome::Skipped("element is not a <select>".into()));
        }
        let candidates = list_options(page, &field.selector, "option", Scope::Within).await?;
        let Some(index) = pick_native_option(&candidates, &value.as_text()) else {
            return Ok(StrategyOutcome::Skipped(format!(
                "option \"{}\" not found",
                value
            )));
        };
        let chosen = &candidates[index];
        page.evaluate(&scripts::set_select_value(&field.selector, &chosen.value))
            .await?;
        Ok(StrategyOutcome::Applied(chosen.text.clone()))
    }
}

// ---------------------------------------------------------------------------
// date / type-ahead / text

/// 日期：直接写原始值（格式由映射服务负责），随后失焦并关闭日期选择浮层
pub struct DateDirectValue;

#[async_trait]
impl FillStrategy for DateDirectValue {
    fn name(&self) -> &'static str {
        "date-direct-value"
    }

    async fn apply(
        &self,
        page: &dyn PageDriver,
        field: &FieldDescriptor,
        value: &FillValue,
        timings: &FillTimings,
    ) -> Result<StrategyOutcome, BrowserError> {
        let text = value.as_text();
        let written = page
            .evaluate(&scripts::set_value(&field.selector, &text))
            .await?;
        if !truthy(&written) {
            return Ok(not_found());
        }
        settle(timings.action_settle).await;
        page.blur(&field.selector).await?;
        settle(timings.picker_dismiss).await;
        page.press_key("Escape").await?;
        Ok(StrategyOutcome::Applied(text))
    }
}

/// 输入即搜索的组合框：点击聚焦，逐字输入，回车确认第一条建议
pub struct TypeAheadCombobox;

#[async_trait]
impl FillStrategy for TypeAheadCombobox {
    fn name(&self) -> &'static str {
        "typeahead-combobox"
    }

    async fn apply(
        &self,
        page: &dyn PageDriver,
        field: &FieldDescriptor,
        value: &FillValue,
        timings: &FillTimings,
    ) -> Result<StrategyOutcome, BrowserError> {
        let text = value.as_text();
        page.click(&field.selector).await?;
        settle(timings.action_settle).await;
        page.type_text(&field.selector, &text, timings.keystroke_delay)
            .await?;
        settle(timings.suggestion_wait).await;
        page.press_key("Enter").await?;
        Ok(StrategyOutcome::Applied(text))
    }
}

/// input / textarea：清空、写值、触发事件、失焦
pub struct DirectValue;

#[async_trait]
impl FillStrategy for DirectValue {
    fn name(&self) -> &'static str {
        "direct-value"
    }

    async fn apply(
        &self,
        page: &dyn PageDriver,
        field: &FieldDescriptor,
        value: &FillValue,
        _timings: &FillTimings,
    ) -> Result<StrategyOutcome, BrowserError> {
        let Some(info) = describe(page, &field.selector).await? else {
            return Ok(not_found());
        };
        if !info.has_value || info.tag == "select" {
            return Ok(StrategyOutcome::Skipped(format!(
                "<{}> has no writable value",
                info.tag
            )));
        }
        let text = value.as_text();
        page.evaluate(&scripts::set_value(&field.selector, &text))
            .await?;
        page.blur(&field.selector).await?;
        Ok(StrategyOutcome::Applied(text))
    }
}

/// contenteditable 或 role="textbox" 的自定义输入框
pub struct ContentEditable;

#[async_trait]
impl FillStrategy for ContentEditable {
    fn name(&self) -> &'static str {
        "content-editable"
    }

    async fn apply(
        &self,
        page: &dyn PageDriver,
        field: &FieldDescriptor,
        value: &FillValue,
        _timings: &FillTimings,
    ) -> Result<StrategyOutcome, BrowserError> {
        let Some(info) = describe(page, &field.selector).await? else {
            return Ok(not_found());
        };
        if !(info.editable || info.role_is("textbox")) {
            return Ok(StrategyOutcome::Skipped("element is not editable".into()));
        }
        let text = value.as_text();
        page.evaluate(&scripts::set_text_content(&field.selector, &text))
            .await?;
        Ok(StrategyOutcome::Applied(text))
    }
}

/// 最后手段：点击后用键盘输入
pub struct KeyboardEntry;

#[async_trait]
impl FillStrategy for KeyboardEntry {
    fn name(&self) -> &'static str {
        "keyboard-entry"
    }

    async fn apply(
        &self,
        page: &dyn PageDriver,
        field: &FieldDescriptor,
        value: &FillValue,
        timings: &FillTimings,
    ) -> Result<StrategyOutcome, BrowserError> {
        let text = value.as_text();
        page.click(&field.selector).await?;
        page.type_text(&field.selector, &text, timings.keystroke_delay)
            .await?;
        page.blur(&field.selector).await?;
        Ok(StrategyOutcome::Applied(text))
    }
}

// ---------------------------------------------------------------------------
// 提交按钮

/// 提交按钮定位方式，按顺序尝试
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitLocator {
    /// 可见文本含 submit / send / register / next
    ButtonText,
    /// aria-label 含 submit
    AriaLabel,
    /// 表单内最后一个可点击元素
    LastClickable,
}

pub const SUBMIT_KEYWORDS: [&str; 4] = ["submit", "send", "register", "next"];

const CLICKABLE_QUERY: &str =
    "button, input[type=\"submit\"], div[role=\"button\"], span[role=\"button\"]";

impl SubmitLocator {
    pub const ORDER: [SubmitLocator; 3] = [
        SubmitLocator::ButtonText,
        SubmitLocator::AriaLabel,
        SubmitLocator::LastClickable,
    ];

    pub fn name(self) -> &'static str {
        match self {
            SubmitLocator::ButtonText => "submit-by-text",
            SubmitLocator::AriaLabel => "submit-by-aria-label",
            SubmitLocator::LastClickable => "submit-last-clickable",
        }
    }

    /// 找到即点击；返回 `{ clicked, text }`
    pub fn script(self) -> PageScript {
        match self {
            SubmitLocator::ButtonText => PageScript::new(
                self.name(),
                r#"(query, keywords) => {
                    const buttons = [...document.querySelectorAll(query)];
                    const btn = buttons.find(b => {
                        const text = (b.innerText || b.value || b.textContent || '').toLowerCase();
                        return keywords.some(k => text.includes(k));
                    });
                    if (!btn) return { clicked: false };
                    btn.click();
                    return { clicked: true, text: (btn.innerText || btn.value || '').trim() };
                }"#,
                vec![json!(CLICKABLE_QUERY), json!(SUBMIT_KEYWORDS)],
            ),
            SubmitLocator::AriaLabel => PageScript::new(
                self.name(),
                r#"() => {
                    const btn = [...document.querySelectorAll('[aria-label]')]
                        .find(el => el.getAttribute('aria-label').toLowerCase().includes('submit'));
                    if (!btn) return { clicked: false };
                    btn.click();
                    return { clicked: true, text: btn.getAttribute('aria-label') };
                }"#,
                vec![],
            ),
            SubmitLocator::LastClickable => PageScript::new(
                self.name(),
                r#"(query) => {
                    const form = document.querySelector('form');
                    let buttons = form ? [...form.querySelectorAll(query)] : [];
                    if (buttons.length === 0) buttons = [...document.querySelectorAll(query)];
                    const btn = buttons[buttons.length - 1];
                    if (!btn) return { clicked: false };
                    btn.click();
                    return { clicked: true, text: (btn.innerText || btn.value || '').trim() };
                }"#,
                vec![json!(CLICKABLE_QUERY)],
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::{MockPage, PageCall};

    fn opt(text: &str) -> OptionCandidate {
        OptionCandidate {
            text: text.into(),
            value: String::new(),
            checked: false,
        }
    }

    fn opt_val(text: &str, value: &str) -> OptionCandidate {
        OptionCandidate {
            text: text.into(),
            value: value.into(),
            checked: false,
        }
    }

    #[test]
    fn test_pick_option_prefers_exact_match() {
        let options = vec![opt("Female"), opt("Male")];
        assert_eq!(pick_option(&options, "male"), Some(1));
        assert_eq!(pick_option(&options, " FEMALE "), Some(0));
        assert_eq!(pick_option(&options, "fem"), Some(0));
        assert_eq!(pick_option(&options, "other"), None);
        assert_eq!(pick_option(&options, ""), None);
    }

    #[test]
    fn test_pick_native_option_passes() {
        let options = vec![
            opt_val("Select a state", ""),
            opt_val("Uttar Pradesh", "UP"),
            opt_val("NCR", "ncr"),
        ];
        assert_eq!(pick_native_option(&options, "ncr"), Some(2));
        assert_eq!(pick_native_option(&options, "up"), Some(1));
        assert_eq!(pick_native_option(&options, "Uttar"), Some(1));
        assert_eq!(pick_native_option(&options, "Delhi NCR region"), Some(2));
        assert_eq!(pick_native_option(&options, "Kerala"), None);
    }

    #[test]
    fn test_radio_self_synonyms() {
        assert!(radio_self_matches("  Yes  ", "yes"));
        assert!(radio_self_matches("I agree", "true"));
        assert!(radio_self_matches("Gender - Male", "Male"));
        assert!(radio_self_matches("M", "female"));
        assert!(!radio_self_matches("Blue", "Red"));
    }

    #[test]
    fn test_handler_dispatch_order() {
        let f = |t: FieldType, label: &str, sel: &str| {
            FieldHandler::for_field(&FieldDescriptor::new(sel, label, t))
        };
        assert_eq!(f(FieldType::Radio, "Date of visit", "#r"), FieldHandler::Radio);
        assert_eq!(f(FieldType::Select, "Birth year", "#s"), FieldHandler::Select);
        assert_eq!(f(FieldType::Text, "Date of Birth", "#dob"), FieldHandler::Date);
        assert_eq!(
            f(FieldType::Text, "Subjects", "#react-select-2-input"),
            FieldHandler::TypeAhead
        );
        assert_eq!(f(FieldType::Textarea, "Address", "#a"), FieldHandler::Text);
        assert_eq!(f(FieldType::Tel, "Phone", "#p"), FieldHandler::Text);
    }

    fn element(info: Value) -> MockPage {
        let page = MockPage::new();
        page.respond("describe_element", info);
        page
    }

    #[tokio::test]
    async fn test_styled_checkbox_toggles_only_on_disagreement() {
        let field = FieldDescriptor::new("div[role='checkbox']", "Agree", FieldType::Checkbox);
        let timings = FillTimings::instant();

        let page = element(json!({"tag": "div", "role": "checkbox", "ariaChecked": "false"}));
        let outcome = StyledCheckbox
            .apply(&page, &field, &FillValue::Flag(false), &timings)
            .await
            .unwrap();
        assert_eq!(outcome, StrategyOutcome::Applied("false".into()));
        assert!(page.evaluations("activate_element").is_empty());

        let outcome = StyledCheckbox
            .apply(&page, &field, &FillValue::Text("yes".into()), &timings)
            .await
            .unwrap();
        assert_eq!(outcome, StrategyOutcome::Applied("true".into()));
        assert_eq!(page.evaluations("activate_element").len(), 1);
    }

    #[tokio::test]
    async fn test_native_checkbox_unchecks_when_value_false() {
        let field = FieldDescriptor::new("#news", "Newsletter", FieldType::Checkbox);
        let page = element(json!({"tag": "input", "inputType": "checkbox", "checked": true}));
        page.respond("toggle_native_checkbox", json!(false));

        assert!(matches!(
            StyledCheckbox
                .apply(&page, &field, &FillValue::Flag(false), &FillTimings::instant())
                .await
                .unwrap(),
            StrategyOutcome::Skipped(_)
        ));
        let outcome = NativeCheckbox
            .apply(&page, &field, &FillValue::Flag(false), &FillTimings::instant())
            .await
            .unwrap();
        assert_eq!(outcome, StrategyOutcome::Applied("false".into()));
        assert_eq!(page.evaluations("toggle_native_checkbox").len(), 1);
    }

    #[tokio::test]
    async fn test_radio_descendant_marks_matching_option() {
        let field = FieldDescriptor::new("div[role='radiogroup']", "Gender", FieldType::Radio);
        let page = element(json!({"tag": "div", "role": "radiogroup"}));
        page.respond(
            "list_options",
            json!([{"text": "Female"}, {"text": "Male"}, {"text": "Other"}]),
        );
        page.respond("activate_option", json!(true));

        let timings = FillTimings::instant();
        let value = FillValue::Text("Male".into());
        assert!(matches!(
            RadioSelfOption.apply(&page, &field, &value, &timings).await.unwrap(),
            StrategyOutcome::Skipped(_)
        ));
        let outcome = RadioDescendantOption
            .apply(&page, &field, &value, &timings)
            .await
            .unwrap();
        assert_eq!(outcome, StrategyOutcome::Applied("male".into()));

        let args = &page.evaluations("activate_option")[0];
        assert_eq!(args[3], json!(1));
        assert_eq!(args[4], json!(true));
    }

    #[tokio::test]
    async fn test_styled_listbox_opens_then_picks_from_document() {
        let field = FieldDescriptor::new("div[role='listbox']", "State", FieldType::Select);
        let page = element(json!({"tag": "div", "role": "listbox"}));
        page.respond("list_options", json!([{"text": "Choose"}, {"text": "Karnataka"}]));

        let outcome = StyledListbox
            .apply(&page, &field, &FillValue::Text("karnataka".into()), &FillTimings::instant())
            .await
            .unwrap();
        assert_eq!(outcome, StrategyOutcome::Applied("karnataka".into()));

        let names: Vec<String> = page
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                PageCall::Evaluate { name, .. } => Some(name),
                _ => None,
            })
            .collect();
        assert_eq!(
            names,
            vec!["describe_element", "activate_element", "list_options", "activate_option"]
        );
        assert_eq!(page.evaluations("list_options")[0][2], json!("document"));
    }

    #[tokio::test]
    async fn test_native_select_sets_option_value() {
        let field = FieldDescriptor::new("#state", "State", FieldType::Select);
        let page = element(json!({"tag": "select", "hasValue": true}));
        page.respond(
            "list_options",
            json!([{"text": "Select", "value": ""}, {"text": "Haryana", "value": "HR"}]),
        );

        let outcome = NativeSelect
            .apply(&page, &field, &FillValue::Text("haryana".into()), &FillTimings::instant())
            .await
            .unwrap();
        assert_eq!(outcome, StrategyOutcome::Applied("Haryana".into()));
        assert_eq!(page.evaluations("set_select_value")[0][1], json!("HR"));
    }

    #[tokio::test]
    async fn test_date_sets_raw_value_and_dismisses_picker() {
        let field = FieldDescriptor::new("#dob", "Date of Birth", FieldType::Text);
        let page = MockPage::new();
        page.respond("set_value", json!(true));

        DateDirectValue
            .apply(&page, &field, &FillValue::Text("22 Dec 2003".into()), &FillTimings::instant())
            .await
            .unwrap();
        assert_eq!(page.evaluations("set_value")[0][1], json!("22 Dec 2003"));
        assert_eq!(page.evaluations("blur").len(), 1);
        assert!(page.calls().contains(&PageCall::PressKey("Escape".into())));
    }

    #[tokio::test]
    async fn test_typeahead_types_then_confirms() {
        let field = FieldDescriptor::new("#react-select-2-input", "Subjects", FieldType::Text);
        let page = MockPage::new();
        TypeAheadCombobox
            .apply(&page, &field, &FillValue::Text("Maths".into()), &FillTimings::instant())
            .await
            .unwrap();
        assert_eq!(
            page.calls(),
            vec![
                PageCall::Click("#react-select-2-input".into()),
                PageCall::Type {
                    selector: "#react-select-2-input".into(),
                    text: "Maths".into()
                },
                PageCall::PressKey("Enter".into()),
            ]
        );
    }

    #[tokio::test]
    async fn test_text_falls_back_to_content_editable() {
        let field = FieldDescriptor::new("div[contenteditable]", "Bio", FieldType::Textarea);
        let page = element(json!({"tag": "div", "editable": true}));
        let value = FillValue::Text("hello".into());
        let timings = FillTimings::instant();

        assert!(matches!(
            DirectValue.apply(&page, &field, &value, &timings).await.unwrap(),
            StrategyOutcome::Skipped(_)
        ));
        assert_eq!(
            ContentEditable.apply(&page, &field, &value, &timings).await.unwrap(),
            StrategyOutcome::Applied("hello".into())
        );
    }
    #[tokio::test]
    async fn test_radio_self_option_accepts_gender_target_on_short_label() {
        let field = FieldDescriptor::new("div[data-value='M']", "Gender", FieldType::Radio);
        let page = element(json!({"tag": "div", "role": "radio", "label": "M"}));

        let outcome = RadioSelfOption
            .apply(&page, &field, &FillValue::Text("Male".into()), &FillTimings::instant())
            .await
            .unwrap();
        assert_eq!(outcome, StrategyOutcome::Applied("m".into()));
        let args = &page.evaluations("activate_element")[0];
        assert_eq!(args[1], json!(true));
    }

    #[tokio::test]
    async fn test_checkbox_group_ticks_each_listed_option_once() {
        let field = FieldDescriptor::new("div[role='group']", "Hobbies", FieldType::Checkbox);
        let page = MockPage::new();
        page.respond(
            "list_options",
            json!([
                {"text": "Reading", "checked": false},
                {"text": "Music", "checked": true},
                {"text": "Sports", "checked": false}
            ]),
        );

        let outcome = CheckboxGroupOptions
            .apply(
                &page,
                &field,
                &FillValue::Text("Sports, music, Reading, sports".into()),
                &FillTimings::instant(),
            )
            .await
            .unwrap();
        assert_eq!(outcome, StrategyOutcome::Applied("sports, music, reading".into()));

        // Music 已勾选，不再点击；重复的 Sports 只点一次
        let clicked: Vec<Value> = page
            .evaluations("activate_option")
            .into_iter()
            .map(|args| args[3].clone())
            .collect();
        assert_eq!(clicked, vec![json!(2), json!(0)]);
    }

    #[tokio::test]
    async fn test_checkbox_group_without_match_skips() {
        let field = FieldDescriptor::new("div[role='group']", "Hobbies", FieldType::Checkbox);
        let page = MockPage::new();
        page.respond("list_options", json!([{"text": "Reading"}, {"text": "Music"}]));
        let timings = FillTimings::instant();

        let outcome = CheckboxGroupOptions
            .apply(&page, &field, &FillValue::Text("Chess".into()), &timings)
            .await
            .unwrap();
        assert!(matches!(outcome, StrategyOutcome::Skipped(reason) if reason.contains("Chess")));
        assert!(page.evaluations("activate_option").is_empty());

        let empty = MockPage::new();
        assert!(matches!(
            CheckboxGroupOptions
                .apply(&empty, &field, &FillValue::Text("Reading".into()), &timings)
                .await
                .unwrap(),
            StrategyOutcome::Skipped(_)
        ));
    }

    #[tokio::test]
    async fn test_keyboard_entry_clicks_types_and_blurs() {
        let field = FieldDescriptor::new("#custom", "Nickname", FieldType::Text);
        let page = MockPage::new();

        let outcome = KeyboardEntry
            .apply(&page, &field, &FillValue::Text("Ash".into()), &FillTimings::instant())
            .await
            .unwrap();
        assert_eq!(outcome, StrategyOutcome::Applied("Ash".into()));

        let calls = page.calls();
        assert_eq!(calls[0], PageCall::Click("#custom".into()));
        assert_eq!(
            calls[1],
            PageCall::Type {
                selector: "#custom".into(),
                text: "Ash".into()
            }
        );
        assert!(matches!(&calls[2], PageCall::Evaluate { name, .. } if name == "blur"));
    }
}
