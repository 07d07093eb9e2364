//! 单个任务的端到端执行：打开页面 -> 解析字段 -> 映射 -> 填写 -> 提交 -> 关闭页面
//!
//! 页面会话在所有退出路径上都会被关闭（成功、抽取失败、配置错误之后的任何错误）。

use std::sync::Arc;

use serde_json::Value;

use crate::browser::{scripts, BrowserLauncher, PageDriver};
use crate::core::AutomationError;
use crate::form::field::FieldDescriptor;
use crate::form::filler::{FillContext, FillReport, FormFillingEngine, SubmitOutcome};
use crate::form::resolver::FieldResolutionEngine;
use crate::form::strategy::settle;

/// 一次运行的结果
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub fields: Vec<FieldDescriptor>,
    pub from_cache: bool,
    pub report: FillReport,
    pub submit: SubmitOutcome,
}

pub struct AutomationService {
    launcher: Arc<dyn BrowserLauncher>,
    resolver: FieldResolutionEngine,
    filler: FormFillingEngine,
}

impl AutomationService {
    pub fn new(
        launcher: Arc<dyn BrowserLauncher>,
        resolver: FieldResolutionEngine,
        filler: FormFillingEngine,
    ) -> Self {
        Self {
            launcher,
            resolver,
            filler,
        }
    }

    /// 凭据检查在打开浏览器之前完成；之后的任何错误都会先关闭页面再返回
    pub async fn run(
        &self,
        url: &str,
        form_data: &Value,
        ctx: &dyn FillContext,
    ) -> Result<RunSummary, AutomationError> {
        ctx.log(&format!("Starting automation for: {}", url));
        self.resolver.extractor().ready()?;
        self.filler.mapper().ready()?;

        ctx.log("Navigating to form...");
        let page = self.launcher.open(url).await?;

        let result = self.drive(page.as_ref(), url, form_data, ctx).await;

        settle(self.filler.timings().teardown_delay).await;
        if let Err(e) = page.close().await {
            tracing::warn!(url, error = %e, "failed to close browser session");
        }
        result
    }

    async fn drive(
        &self,
        page: &dyn PageDriver,
        url: &str,
        form_data: &Value,
        ctx: &dyn FillContext,
    ) -> Result<RunSummary, AutomationError> {
        let timings = self.filler.timings();
        settle(timings.page_settle).await;
        page.evaluate(&scripts::prime_lazy_content(
            timings.prime_pause.as_millis() as u64,
        ))
        .await?;

        ctx.log("Step 1: Checking cache for form fields...");
        let resolved = self.resolver.resolve(page, url).await?;
        if resolved.from_cache {
            ctx.log("INFO: Cache hit! Using stored field mappings.");
        } else {
            ctx.log(&format!(
                "INFO: Cache miss. Extracted {} fields and saved to cache.",
                resolved.fields.len()
            ));
        }
        ctx.log(&format!(
            "[LLM STEP 1] Found {} fields (file inputs filtered out)",
            resolved.fields.len()
        ));
        for (i, field) in resolved.fields.iter().enumerate() {
            tracing::debug!(
                index = i + 1,
                label = %field.label,
                field_type = %field.field_type,
                selector = %field.selector,
                options = ?field.options,
                "extracted field"
            );
        }

        let mut fields = resolved.fields;
        let mapped = self.filler.map_values(&mut fields, form_data, ctx).await;
        tracing::info!(url, mapped, total = fields.len(), "mapping applied");

        let report = self.filler.fill(page, &mut fields, ctx).await;
        tracing::info!(
            url,
            filled = report.filled(),
            skipped = report.skipped(),
            failed = report.failed(),
            "fields processed"
        );

        let submit = self.filler.submit(page, ctx).await?;
        ctx.log("Task completed!");

        Ok(RunSummary {
            fields,
            from_cache: resolved.from_cache,
            report,
            submit,
        })
    }
}
