//! 基于 LLM 的字段映射：字段列表 + 用户数据 -> 选择器到值的映射
//!
//! 每个字段都要求出现在回复中；找不到数据时为 "null"。回复里缺席的字段按未映射处理。

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::core::AutomationError;
use crate::form::mapping::mapping_from_json;
use crate::form::{FieldDescriptor, FieldMapper, FieldMapping, UNMAPPED};
use crate::llm::backend::{parse_json_reply, LlmBackend};
use crate::llm::Message;

/// 每个字段最多带给模型的选项数
const MAX_OPTIONS: usize = 20;

const MAPPING_SYSTEM: &str = "You fill web forms using only the data you are given. \
Reply with a JSON object only, without markdown or commentary.";

fn mapping_prompt(fields: &[FieldDescriptor], form_data: &Value) -> String {
    let field_list: Vec<Value> = fields
        .iter()
        .map(|f| {
            json!({
                "id": f.selector,
                "label": f.label,
                "type": f.field_type.as_str(),
                "options": f.options.iter().take(MAX_OPTIONS).collect::<Vec<_>>(),
            })
        })
        .collect();
    let data = serde_json::to_string_pretty(form_data).unwrap_or_else(|_| form_data.to_string());
    let field_list = serde_json::to_string_pretty(&field_list).unwrap_or_default();

    format!(
        r#"Assign a value from USER DATA to each form field, matching by meaning rather than exact wording.

Rules:
- Phone or mobile fields take phone numbers, never a gender or other value.
- Email fields take email addresses; name fields take the user's own name, not a relative's.
- For select, radio and checkbox-group fields answer with one of the listed options.
- A single checkbox whose label or option matches an entry of a list in USER DATA gets "true".
- Dates use the format the field's label or options suggest.
- Never invent data. If nothing in USER DATA fits a field, its value is exactly "{unmapped}".
- Every field id below must appear in your answer.

Reply with one JSON object mapping each field id to its value, for example:
{{"input[aria-label='Name']": "Asha", "input[aria-label='Phone']": "{unmapped}"}}

USER DATA:
{data}

FORM FIELDS:
{field_list}"#,
        unmapped = UNMAPPED,
    )
}

pub struct LlmFieldMapper {
    backend: LlmBackend,
}

impl LlmFieldMapper {
    pub fn new(backend: LlmBackend) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl FieldMapper for LlmFieldMapper {
    fn ready(&self) -> Result<(), AutomationError> {
        self.backend.client().map(|_| ())
    }

    async fn map_fields(
        &self,
        fields: &[FieldDescriptor],
        form_data: &Value,
    ) -> Result<FieldMapping, AutomationError> {
        let client = self.backend.client()?;
        tracing::info!(fields = fields.len(), "requesting field mapping");

        let reply = client
            .complete(&[
                Message::system(MAPPING_SYSTEM),
                Message::user(mapping_prompt(fields, form_data)),
            ])
            .await
            .map_err(AutomationError::Mapping)?;
        tracing::debug!(reply = %reply, "mapping reply");

        let parsed = parse_json_reply(&reply).map_err(AutomationError::Mapping)?;
        let mapping = mapping_from_json(&parsed)?;

        let missing = fields
            .iter()
            .filter(|f| !mapping.contains_key(&f.selector))
            .count();
        if missing > 0 {
            tracing::debug!(missing, "mapping reply omitted some fields, treating them as unmapped");
        }
        Ok(mapping)
    }
}
