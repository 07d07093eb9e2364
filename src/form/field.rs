//! 字段描述符：页面上发现的一个表单字段或一组选项

use std::fmt;

use serde::{Deserialize, Serialize};

/// 字段类型；未知类型按普通文本处理
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FieldType {
    Text,
    Textarea,
    Email,
    Tel,
    Number,
    Date,
    Select,
    Radio,
    Checkbox,
    /// 文件上传，抽取后过滤掉
    File,
    Other(String),
}

impl FieldType {
    pub fn as_str(&self) -> &str {
        match self {
            FieldType::Text => "text",
            FieldType::Textarea => "textarea",
            FieldType::Email => "email",
            FieldType::Tel => "tel",
            FieldType::Number => "number",
            FieldType::Date => "date",
            FieldType::Select => "select",
            FieldType::Radio => "radio",
            FieldType::Checkbox => "checkbox",
            FieldType::File => "file",
            FieldType::Other(s) => s.as_str(),
        }
    }

    /// 允许携带 options 的类型
    pub fn has_options(&self) -> bool {
        matches!(self, FieldType::Select | FieldType::Radio | FieldType::Checkbox)
    }
}

impl From<String> for FieldType {
    fn from(s: String) -> Self {
        match s.trim().to_lowercase().as_str() {
            "text" => FieldType::Text,
            "textarea" => FieldType::Textarea,
            "email" => FieldType::Email,
            "tel" | "phone" => FieldType::Tel,
            "number" => FieldType::Number,
            "date" => FieldType::Date,
            "select" | "select-one" | "dropdown" | "listbox" => FieldType::Select,
            "radio" => FieldType::Radio,
            "checkbox" => FieldType::Checkbox,
            "file" => FieldType::File,
            _ => FieldType::Other(s),
        }
    }
}

impl From<FieldType> for String {
    fn from(t: FieldType) -> Self {
        t.as_str().to_string()
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 值的来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ValueSource {
    MappingService,
    Human,
}

/// 字段描述符
///
/// `resolved_value` / `value_source` 只在本次运行中填充，不写入缓存。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    /// 再次访问同一表单时可重新定位 DOM 节点的 CSS 选择器
    pub selector: String,
    pub label: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub options: Vec<String>,
    #[serde(skip)]
    pub resolved_value: Option<String>,
    #[serde(skip)]
    pub value_source: Option<ValueSource>,
}

impl FieldDescriptor {
    pub fn new(selector: impl Into<String>, label: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            selector: selector.into(),
            label: label.into(),
            field_type,
            options: Vec::new(),
            resolved_value: None,
            value_source: None,
        }
    }

    pub fn with_options<I, S>(mut self, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.options = options.into_iter().map(Into::into).collect();
        self
    }

    /// 日期/生日字段：类型为 date，或标签含 date / birth
    pub fn is_date_like(&self) -> bool {
        let label = self.label.to_lowercase();
        self.field_type == FieldType::Date || label.contains("date") || label.contains("birth")
    }

    /// 选择器指向输入即搜索的组合框（如 react-select）
    pub fn is_typeahead(&self) -> bool {
        let selector = self.selector.to_lowercase();
        selector.contains("react-select")
            || selector.contains("role=\"combobox\"")
            || selector.contains("role='combobox'")
            || selector.contains("role=combobox")
    }

    /// 缺值时视为可选：单选组，或标签含 other / response
    pub fn is_optional_when_missing(&self) -> bool {
        let label = self.label.to_lowercase();
        self.field_type == FieldType::Radio || label.contains("other") || label.contains("response")
    }

    /// 去掉运行期字段，得到可写入缓存的形态
    pub fn extraction_shape(&self) -> Self {
        Self {
            resolved_value: None,
            value_source: None,
            ..self.clone()
        }
    }
}

/// 实际要写入页面的值
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FillValue {
    Text(String),
    Flag(bool),
}

impl FillValue {
    /// 复选框是否应勾选：true / yes / 1，或任何非空且非 "null" 的值
    pub fn should_check(&self) -> bool {
        match self {
            FillValue::Flag(b) => *b,
            FillValue::Text(s) => {
                let v = s.trim().to_lowercase();
                matches!(v.as_str(), "true" | "yes" | "1") || !(v.is_empty() || v == "null")
            }
        }
    }

    pub fn as_text(&self) -> String {
        match self {
            FillValue::Text(s) => s.clone(),
            FillValue::Flag(b) => b.to_string(),
        }
    }
}

impl fmt::Display for FillValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_text())
    }
}
