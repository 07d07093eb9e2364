//! 字段解析：缓存优先，未命中时抽取页面 HTML 交给外部抽取服务，并把结果写回缓存
//!
//! 缓存只是性能优化：丢掉缓存不改变结果，只增加外部调用次数。

use std::sync::Arc;

use async_trait::async_trait;

use crate::browser::{scripts, PageDriver};
use crate::core::AutomationError;
use crate::form::cache::FieldCache;
use crate::form::field::{FieldDescriptor, FieldType};

/// 外部抽取服务：表单 HTML -> 有序字段列表
#[async_trait]
pub trait FieldExtractor: Send + Sync {
    /// 凭据检查；缺失时返回 Configuration
    fn ready(&self) -> Result<(), AutomationError> {
        Ok(())
    }

    async fn extract(&self, form_html: &str) -> Result<Vec<FieldDescriptor>, AutomationError>;
}

/// 解析结果
#[derive(Debug, Clone)]
pub struct ResolvedFields {
    pub fields: Vec<FieldDescriptor>,
    pub from_cache: bool,
}

/// 字段解析引擎
pub struct FieldResolutionEngine {
    cache: Arc<FieldCache>,
    extractor: Arc<dyn FieldExtractor>,
}

impl FieldResolutionEngine {
    pub fn new(cache: Arc<FieldCache>, extractor: Arc<dyn FieldExtractor>) -> Self {
        Self { cache, extractor }
    }

    pub fn extractor(&self) -> &Arc<dyn FieldExtractor> {
        &self.extractor
    }

    /// 返回字段列表；零字段时返回 Extraction
    pub async fn resolve(&self, page: &dyn PageDriver, url: &str) -> Result<ResolvedFields, AutomationError> {
        if let Some(fields) = self.cache.get(url) {
            if !fields.is_empty() {
                tracing::debug!(url, count = fields.len(), "field cache hit");
                return Ok(ResolvedFields {
                    fields,
                    from_cache: true,
                });
            }
        }

        let html = page.evaluate(&scripts::form_html()).await?;
        let html = html.as_str().unwrap_or_default();
        if html.is_empty() {
            return Err(AutomationError::Extraction(
                "Page returned no form HTML".to_string(),
            ));
        }

        let extracted = self.extractor.extract(html).await?;
        let fields = sanitize(extracted);
        if fields.is_empty() {
            return Err(AutomationError::Extraction(
                "No fields extracted from form. Please check the form HTML.".to_string(),
            ));
        }

        self.cache.put(url, &fields);
        tracing::info!(url, count = fields.len(), "extracted fields and saved to cache");
        Ok(ResolvedFields {
            fields,
            from_cache: false,
        })
    }
}

/// 去掉文件上传与无选择器的条目，free-text 类型清空 options
fn sanitize(fields: Vec<FieldDescriptor>) -> Vec<FieldDescriptor> {
    fields
        .into_iter()
        .filter(|f| f.field_type != FieldType::File && !f.selector.trim().is_empty())
        .map(|mut f| {
            if !f.field_type.has_options() {
                f.options.clear();
            }
            f.extraction_shape()
        })
        .collect()
}
