//! 映射集成：一次批量调用，为每个字段选出一个值或「未映射」
//!
//! 输出中缺席的选择器与显式 "null" 等价，都表示没有找到值。

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;

use crate::core::AutomationError;
use crate::form::field::{FieldDescriptor, ValueSource};

/// 未映射哨兵值
pub const UNMAPPED: &str = "null";

/// 选择器 -> 值（None 表示未映射）
pub type FieldMapping = HashMap<String, Option<String>>;

/// 外部映射服务
#[async_trait]
pub trait FieldMapper: Send + Sync {
    fn ready(&self) -> Result<(), AutomationError> {
        Ok(())
    }

    async fn map_fields(
        &self,
        fields: &[FieldDescriptor],
        form_data: &Value,
    ) -> Result<FieldMapping, AutomationError>;
}

/// 值是否缺失：None、空串或哨兵
pub fn is_missing(value: Option<&str>) -> bool {
    match value {
        None => true,
        Some(v) => {
            let v = v.trim();
            v.is_empty() || v.eq_ignore_ascii_case(UNMAPPED)
        }
    }
}

/// 把映射服务返回的 JSON 对象转为 FieldMapping；非字符串标量转成字符串
pub fn mapping_from_json(value: &Value) -> Result<FieldMapping, AutomationError> {
    let object = value
        .as_object()
        .ok_or_else(|| AutomationError::Mapping("mapping reply is not a JSON object".to_string()))?;
    Ok(object
        .iter()
        .map(|(selector, v)| {
            let mapped = match v {
                Value::Null => None,
                Value::String(s) if is_missing(Some(s.as_str())) => None,
                Value::String(s) => Some(s.clone()),
                Value::Array(items) => {
                    let joined: Vec<String> = items
                        .iter()
                        .map(|i| i.as_str().map(str::to_string).unwrap_or_else(|| i.to_string()))
                        .collect();
                    Some(joined.join(", ")).filter(|s| !s.is_empty())
                }
                other => Some(other.to_string()),
            };
            (selector.clone(), mapped)
        })
        .collect())
}

/// 把映射写入字段的 resolved_value / value_source
pub fn apply_mapping(fields: &mut [FieldDescriptor], mapping: &FieldMapping) {
    for field in fields.iter_mut() {
        match mapping.get(&field.selector).cloned().flatten() {
            Some(value) if !is_missing(Some(value.as_str())) => {
                tracing::debug!(label = %field.label, value = %value, "mapped");
                field.resolved_value = Some(value);
                field.value_source = Some(ValueSource::MappingService);
            }
            _ => {
                tracing::debug!(label = %field.label, "no match");
                field.resolved_value = None;
                field.value_source = None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::form::field::FieldType;
    use serde_json::json;

    #[test]
    fn test_absent_and_sentinel_are_equivalent() {
        let mut fields = vec![
            FieldDescriptor::new("#name", "Name", FieldType::Text),
            FieldDescriptor::new("#phone", "Phone", FieldType::Tel),
            FieldDescriptor::new("#email", "Email", FieldType::Email),
        ];
        let mapping = mapping_from_json(&json!({"#name": "A", "#phone": "null"})).unwrap();
        apply_mapping(&mut fields, &mapping);

        assert_eq!(fields[0].resolved_value.as_deref(), Some("A"));
        assert_eq!(fields[0].value_source, Some(ValueSource::MappingService));
        assert!(fields[1].resolved_value.is_none());
        assert!(fields[2].resolved_value.is_none());
        assert!(fields[2].value_source.is_none());
    }

    #[test]
    fn test_non_string_values() {
        let mapping = mapping_from_json(&json!({
            "#agree": true,
            "#age": 30,
            "#hobbies": ["Cricket", "Art"],
            "#none": null,
            "#blank": "  "
        }))
        .unwrap();
        assert_eq!(mapping["#agree"].as_deref(), Some("true"));
        assert_eq!(mapping["#age"].as_deref(), Some("30"));
        assert_eq!(mapping["#hobbies"].as_deref(), Some("Cricket, Art"));
        assert_eq!(mapping["#none"], None);
        assert_eq!(mapping["#blank"], None);
    }

    #[test]
    fn test_non_object_reply_is_mapping_error() {
        let err = mapping_from_json(&json!(["#name"])).unwrap_err();
        assert!(matches!(err, AutomationError::Mapping(_)));
    }
}
