//! 基于 LLM 的字段抽取：表单 HTML -> 字段描述符列表

use async_trait::async_trait;
use serde_json::Value;

use crate::core::AutomationError;
use crate::form::{FieldDescriptor, FieldExtractor};
use crate::llm::backend::{parse_json_reply, LlmBackend};
use crate::llm::Message;

const EXTRACTION_SYSTEM: &str = "You analyse HTML forms and describe their fields as JSON. \
Reply with a JSON array only, without markdown or commentary.";

fn extraction_prompt(form_html: &str) -> String {
    format!(
        r#"List every visible, interactive field of the form below.

Include text-like inputs (text, email, tel, number, date), textareas, native selects and
styled dropdowns (role="listbox"), radio groups (role="radiogroup" or grouped inputs) and
checkboxes (native or role="checkbox"). Include "Other" text boxes that belong to a choice
question. Leave out anything hidden (display:none, visibility:hidden, type="hidden").

Selectors:
- One entry per radio question: use the container that holds all of its options.
- A checkbox group that answers one question gets one entry on its container.
- Single inputs: prefer aria-labelledby, aria-label, name or role attributes.
- Never use short generated ids such as #i32.
- Use the same selector shape every time for the same field.

Each entry has:
  "selector": CSS selector,
  "label": the question text,
  "type": one of text, email, tel, number, date, textarea, select, radio, checkbox, file,
  "options": option labels for select / radio / checkbox, otherwise [].

Example:
[{{"selector": "div[role='radiogroup'][aria-labelledby='q1']", "label": "Gender", "type": "radio", "options": ["Male", "Female", "Other"]}}]

FORM HTML:
{form_html}"#
    )
}

pub struct LlmFieldExtractor {
    backend: LlmBackend,
}

impl LlmFieldExtractor {
    pub fn new(backend: LlmBackend) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl FieldExtractor for LlmFieldExtractor {
    fn ready(&self) -> Result<(), AutomationError> {
        self.backend.client().map(|_| ())
    }

    async fn extract(&self, form_html: &str) -> Result<Vec<FieldDescriptor>, AutomationError> {
        let client = self.backend.client()?;
        tracing::info!(html_len = form_html.len(), "sending form HTML for field extraction");

        let reply = client
            .complete(&[
                Message::system(EXTRACTION_SYSTEM),
                Message::user(extraction_prompt(form_html)),
            ])
            .await
            .map_err(|e| AutomationError::Extraction(format!("Field extraction failed: {}", e)))?;
        tracing::debug!(reply = %reply, "extraction reply");

        let parsed = parse_json_reply(&reply).map_err(AutomationError::Extraction)?;
        let Value::Array(items) = parsed else {
            return Err(AutomationError::Extraction(
                "Field extraction reply is not a JSON array".to_string(),
            ));
        };

        // 单个条目格式不对时丢弃该条目，不影响其余字段
        let fields: Vec<FieldDescriptor> = items
            .into_iter()
            .filter_map(|item| match serde_json::from_value::<FieldDescriptor>(item) {
                Ok(field) => Some(field),
                Err(e) => {
                    tracing::warn!(error = %e, "dropping malformed field entry");
                    None
                }
            })
            .collect();
        tracing::info!(count = fields.len(), "fields extracted");
        Ok(fields)
    }
}
