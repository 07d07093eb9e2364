//! 端到端场景：编排器 + 执行服务 + LLM 抽取/映射，浏览器与模型均为脚本化替身

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use autoform::browser::{BrowserLauncher, MockPage, PageCall, PageDriver};
use autoform::core::{
    AutomationError, BrowserError, InMemoryTaskStore, Task, TaskLogStore, TaskOrchestrator,
    TaskStatus,
};
use autoform::form::{
    AutomationService, FieldCache, FieldResolutionEngine, FillTimings, FormFillingEngine,
};
use autoform::llm::{LlmBackend, LlmFieldExtractor, LlmFieldMapper, MockLlmClient};
use serde_json::{json, Value};

/// 每次 open 返回一个新的表单页面
#[derive(Default)]
struct PagePerTask {
    pages: Mutex<Vec<Arc<MockPage>>>,
}

impl PagePerTask {
    fn pages(&self) -> Vec<Arc<MockPage>> {
        self.pages.lock().unwrap().clone()
    }
}

#[async_trait]
impl BrowserLauncher for PagePerTask {
    async fn open(&self, _url: &str) -> Result<Arc<dyn PageDriver>, BrowserError> {
        let page = Arc::new(MockPage::new());
        page.respond("form_html", json!("<form>...</form>"));
        page.respond("element_exists", json!(true));
        page.respond("describe_element", json!({"tag": "input", "hasValue": true}));
        page.respond("set_value", json!(true));
        page.respond("submit-by-text", json!({"clicked": true, "text": "Submit"}));
        self.pages.lock().unwrap().push(page.clone());
        let page: Arc<dyn PageDriver> = page;
        Ok(page)
    }
}

struct Harness {
    orchestrator: TaskOrchestrator,
    launcher: Arc<PagePerTask>,
    _dir: tempfile::TempDir,
}

fn harness(llm: Arc<MockLlmClient>) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let launcher = Arc::new(PagePerTask::default());
    let backend = LlmBackend::new(llm);
    let service = AutomationService::new(
        launcher.clone(),
        FieldResolutionEngine::new(
            Arc::new(FieldCache::in_memory()),
            Arc::new(LlmFieldExtractor::new(backend.clone())),
        ),
        FormFillingEngine::new(
            Arc::new(LlmFieldMapper::new(backend)),
            FillTimings::instant(),
        ),
    );
    let orchestrator = TaskOrchestrator::start(
        Arc::new(service),
        Arc::new(InMemoryTaskStore::new()),
        TaskLogStore::new(dir.path().join("logs")),
    );
    Harness {
        orchestrator,
        launcher,
        _dir: dir,
    }
}

fn contact_fields() -> String {
    json!([
        {"selector": "input[aria-label='Name']", "label": "Name", "type": "text"},
        {"selector": "input[aria-label='Email']", "label": "Email", "type": "email"},
        {"selector": "input[aria-label='Phone']", "label": "Phone", "type": "tel"}
    ])
    .to_string()
}

fn contact_mapping() -> String {
    json!({
        "input[aria-label='Name']": "A",
        "input[aria-label='Email']": "b@x.com",
        "input[aria-label='Phone']": "null"
    })
    .to_string()
}

async fn wait_for(orch: &TaskOrchestrator, id: &str, status: TaskStatus) -> Task {
    for _ in 0..500 {
        if let Some(task) = orch.get_task(id) {
            if task.status == status {
                return task;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!(
        "task {} never reached {:?}: {:?}",
        id,
        status,
        orch.get_task(id)
    );
}

fn set_values(page: &MockPage) -> Vec<Value> {
    page.evaluations("set_value")
        .into_iter()
        .filter_map(|args| args.get(1).cloned())
        .collect()
}

#[tokio::test]
async fn test_unknown_phone_is_asked_then_filled_and_submitted() {
    let llm = Arc::new(MockLlmClient::with_replies([contact_fields(), contact_mapping()]));
    let h = harness(llm);
    let task = h.orchestrator.submit(
        "https://f.example/x",
        json!({"Name": "A", "Email": "b@x.com"}),
    );

    let waiting = wait_for(&h.orchestrator, &task.id, TaskStatus::WaitingInput).await;
    assert_eq!(
        waiting.current_question.as_deref(),
        Some("Please provide a value for: Phone")
    );

    assert_eq!(
        h.orchestrator.answer_pending_question("12345"),
        Some(task.id.clone())
    );
    let resumed = h.orchestrator.get_task(&task.id).unwrap();
    assert_ne!(resumed.status, TaskStatus::WaitingInput);
    assert!(resumed.current_question.is_none());

    let done = wait_for(&h.orchestrator, &task.id, TaskStatus::Completed).await;
    assert!(done.error.is_none());
    assert!(done.logs.iter().any(|l| l.ends_with("Task completed!")));

    let page = &h.launcher.pages()[0];
    assert_eq!(set_values(page), vec![json!("A"), json!("b@x.com"), json!("12345")]);
    assert_eq!(page.evaluations("submit-by-text").len(), 1);
    assert!(page.is_closed());
}

#[tokio::test]
async fn test_empty_extraction_fails_task_and_closes_page() {
    let llm = Arc::new(MockLlmClient::with_replies(["[]"]));
    let h = harness(llm);
    let task = h.orchestrator.submit("https://f.example/empty", json!({"Name": "A"}));

    let failed = wait_for(&h.orchestrator, &task.id, TaskStatus::Failed).await;
    assert!(failed.error.as_deref().unwrap_or_default().contains("Extraction"));
    assert!(failed.logs.last().unwrap().contains("ERROR: "));

    let page = &h.launcher.pages()[0];
    assert!(page.is_closed());
    assert!(page.evaluations("submit-by-text").is_empty());
}

#[tokio::test]
async fn test_unmapped_radio_and_checkbox_do_not_ask() {
    let fields = json!([
        {"selector": "div[role='radiogroup']", "label": "Gender", "type": "radio", "options": ["Male", "Female"]},
        {"selector": "input[name='newsletter']", "label": "Newsletter", "type": "checkbox"}
    ])
    .to_string();
    let llm = Arc::new(MockLlmClient::with_replies([fields, "{}".to_string()]));
    let h = harness(llm);
    let task = h.orchestrator.submit("https://f.example/choices", json!({}));

    let done = wait_for(&h.orchestrator, &task.id, TaskStatus::Completed).await;
    assert!(done
        .logs
        .iter()
        .any(|l| l.ends_with("[SKIP] No matching data found for \"Gender\"")));
    assert!(!done.logs.iter().any(|l| l.contains("WAITING")));
    assert!(h.orchestrator.pending_question().is_none());
}

#[tokio::test]
async fn test_second_task_waits_while_first_needs_input() {
    let llm = Arc::new(MockLlmClient::with_replies([
        contact_fields(),
        contact_mapping(),
        json!([{"selector": "#city", "label": "City", "type": "text"}]).to_string(),
        json!({"#city": "Pune"}).to_string(),
    ]));
    let h = harness(llm);
    let first = h.orchestrator.submit("https://f.example/one", json!({"Name": "A"}));
    let second = h.orchestrator.submit("https://f.example/two", json!({"City": "Pune"}));

    wait_for(&h.orchestrator, &first.id, TaskStatus::WaitingInput).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(
        h.orchestrator.get_task(&second.id).unwrap().status,
        TaskStatus::Pending
    );

    // 带错误 ID 的回答不生效
    assert_eq!(h.orchestrator.answer_for(&second.id, "nope"), None);
    assert_eq!(h.orchestrator.answer_for(&first.id, "12345"), Some(first.id.clone()));

    wait_for(&h.orchestrator, &first.id, TaskStatus::Completed).await;
    wait_for(&h.orchestrator, &second.id, TaskStatus::Completed).await;

    let order: Vec<String> = h
        .orchestrator
        .list_tasks()
        .into_iter()
        .map(|t| t.url)
        .collect();
    assert_eq!(order, vec!["https://f.example/one", "https://f.example/two"]);
    assert_eq!(h.launcher.pages().len(), 2);
}

#[tokio::test]
async fn test_task_log_is_retrievable_by_id() {
    let llm = Arc::new(MockLlmClient::with_replies([
        json!([{"selector": "#city", "label": "City", "type": "text"}]).to_string(),
        json!({"#city": "Pune"}).to_string(),
    ]));
    let h = harness(llm);
    let task = h.orchestrator.submit("https://f.example/log", json!({"City": "Pune"}));
    wait_for(&h.orchestrator, &task.id, TaskStatus::Completed).await;

    let text = h.orchestrator.read_log(&task.id).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert!(lines[0].starts_with('['));
    assert!(lines[0].ends_with("Starting automation for: https://f.example/log"));
    assert!(text.contains("Task completed!"));

    assert!(matches!(
        h.orchestrator.read_log("does-not-exist"),
        Err(AutomationError::LogNotFound(_))
    ));
    let page = &h.launcher.pages()[0];
    assert_eq!(page.calls().last(), Some(&PageCall::Close));
}
