//! 组装：由 AppConfig 创建浏览器、LLM 协作方、缓存、引擎与编排器

use std::sync::Arc;

use async_trait::async_trait;

use crate::browser::BrowserLauncher;
use crate::config::AppConfig;
use crate::core::{
    AutomationError, InMemoryTaskStore, Task, TaskLogStore, TaskOrchestrator, TaskRunner,
};
use crate::form::{
    AutomationService, FieldCache, FieldExtractor, FieldMapper, FieldResolutionEngine,
    FillContext, FillTimings, FormFillingEngine,
};
use crate::llm::{LlmBackend, LlmFieldExtractor, LlmFieldMapper};

#[async_trait]
impl TaskRunner for AutomationService {
    async fn run(&self, task: &Task, ctx: &dyn FillContext) -> Result<(), AutomationError> {
        AutomationService::run(self, &task.url, &task.form_data, ctx)
            .await
            .map(|_| ())
    }
}

/// 真实浏览器；未启用 feature "browser" 时返回错误
#[cfg(feature = "browser")]
pub fn build_launcher(cfg: &AppConfig) -> anyhow::Result<Arc<dyn BrowserLauncher>> {
    Ok(Arc::new(crate::browser::ChromeLauncher::new(&cfg.browser)))
}

#[cfg(not(feature = "browser"))]
pub fn build_launcher(_cfg: &AppConfig) -> anyhow::Result<Arc<dyn BrowserLauncher>> {
    anyhow::bail!("built without the \"browser\" feature; rebuild with --features browser")
}

/// 打开（或新建）字段缓存文件
pub fn build_cache(cfg: &AppConfig) -> Arc<FieldCache> {
    Arc::new(FieldCache::open(cfg.app.cache_path()))
}

/// 由各协作方组装执行服务
pub fn build_service(
    cfg: &AppConfig,
    launcher: Arc<dyn BrowserLauncher>,
    extractor: Arc<dyn FieldExtractor>,
    mapper: Arc<dyn FieldMapper>,
    cache: Arc<FieldCache>,
) -> AutomationService {
    AutomationService::new(
        launcher,
        FieldResolutionEngine::new(cache, extractor),
        FormFillingEngine::new(mapper, FillTimings::from_config(&cfg.fill)),
    )
}

/// 生产配置：LLM 协作方 + 文件缓存 + 文件日志 + 内存任务存储（需在 tokio 运行时内调用）
pub fn build_orchestrator(
    cfg: &AppConfig,
    launcher: Arc<dyn BrowserLauncher>,
) -> TaskOrchestrator {
    let backend = LlmBackend::from_config(&cfg.llm);
    let service = build_service(
        cfg,
        launcher,
        Arc::new(LlmFieldExtractor::new(backend.clone())),
        Arc::new(LlmFieldMapper::new(backend)),
        build_cache(cfg),
    );
    tracing::info!(data_dir = %cfg.app.data_dir.display(), "orchestrator ready");
    TaskOrchestrator::start(
        Arc::new(service),
        Arc::new(InMemoryTaskStore::new()),
        TaskLogStore::new(cfg.app.logs_dir()),
    )
}
