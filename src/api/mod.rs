//! HTTP 边界（feature "web"）：任务提交、队列与任务查询、人工回答、日志下载、SSE 推送

use std::convert::Infallible;
use std::time::Duration;

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use futures_util::stream::{self, Stream};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::broadcast;

use crate::core::{AutomationError, QueueEvent, Task, TaskOrchestrator};

type ApiError = (StatusCode, String);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitRequest {
    url: Option<String>,
    form_data: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InputRequest {
    value: String,
    task_id: Option<String>,
}

pub fn router(orchestrator: TaskOrchestrator) -> Router {
    Router::new()
        .route("/api/queue", get(list_queue).post(submit_task))
        .route("/api/tasks/:id", get(get_task))
        .route("/api/input", post(submit_input))
        .route("/api/logs/:id", get(download_log))
        .route("/api/events", get(events_sse))
        .route("/api/health", get(|| async { "OK" }))
        .with_state(orchestrator)
}

async fn submit_task(
    State(orch): State<TaskOrchestrator>,
    Json(req): Json<SubmitRequest>,
) -> Result<(StatusCode, Json<Task>), ApiError> {
    let url = req.url.filter(|u| !u.trim().is_empty());
    let form_data = req.form_data.filter(|d| !d.is_null());
    let (Some(url), Some(form_data)) = (url, form_data) else {
        return Err((
            StatusCode::BAD_REQUEST,
            "URL and formData are required".to_string(),
        ));
    };
    let task = orch.submit(url, form_data);
    Ok((StatusCode::CREATED, Json(task)))
}

async fn list_queue(State(orch): State<TaskOrchestrator>) -> Json<Vec<Task>> {
    Json(orch.list_tasks())
}

async fn get_task(
    State(orch): State<TaskOrchestrator>,
    Path(id): Path<String>,
) -> Result<Json<Task>, ApiError> {
    orch.get_task(&id)
        .map(Json)
        .ok_or((StatusCode::NOT_FOUND, format!("Task {} not found", id)))
}

/// 没有待答问题（或 taskId 不符）时为空操作，answered 为 null
async fn submit_input(
    State(orch): State<TaskOrchestrator>,
    Json(req): Json<InputRequest>,
) -> Json<Value> {
    let answered = match req.task_id {
        Some(id) => orch.answer_for(&id, req.value),
        None => orch.answer_pending_question(req.value),
    };
    Json(json!({ "success": true, "answered": answered }))
}

async fn download_log(
    State(orch): State<TaskOrchestrator>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    match orch.read_log(&id) {
        Ok(text) => Ok((
            [
                (header::CONTENT_TYPE, "text/plain; charset=utf-8".to_string()),
                (
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename=\"task_{}.log\"", id),
                ),
            ],
            text,
        )
            .into_response()),
        Err(e @ AutomationError::LogNotFound(_)) => Err((StatusCode::NOT_FOUND, e.to_string())),
        Err(e) => Err((StatusCode::INTERNAL_SERVER_ERROR, e.to_string())),
    }
}

/// SSE：连接时先推一份当前队列，之后转发编排器事件；落后的订阅者跳过丢失的事件
async fn events_sse(
    State(orch): State<TaskOrchestrator>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = orch.subscribe();
    let initial = QueueEvent::QueueUpdate(orch.list_tasks());
    let s = stream::unfold((Some(initial), rx), |(mut first, mut rx)| async move {
        if let Some(event) = first.take() {
            return Some((Ok(to_sse(&event)), (None, rx)));
        }
        loop {
            match rx.recv().await {
                Ok(event) => return Some((Ok(to_sse(&event)), (None, rx))),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::debug!(skipped = n, "sse subscriber lagged");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    });
    Sse::new(s).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keepalive"),
    )
}

/// SSE data 字段：queueUpdate 为任务数组，requestInput 为 {taskId, question}
fn event_data(event: &QueueEvent) -> String {
    match event {
        QueueEvent::QueueUpdate(tasks) => serde_json::to_string(tasks),
        QueueEvent::RequestInput { task_id, question } => {
            serde_json::to_string(&json!({ "taskId": task_id, "question": question }))
        }
    }
    .unwrap_or_else(|_| "null".to_string())
}

fn to_sse(event: &QueueEvent) -> Event {
    Event::default().event(event.name()).data(event_data(event))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{InMemoryTaskStore, TaskLogStore, TaskRunner};
    use crate::form::FillContext;
    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use std::sync::Arc;
    use tower::ServiceExt;

    /// 永不结束的任务体，保证任务停在 processing
    struct Parked;

    #[async_trait]
    impl TaskRunner for Parked {
        async fn run(&self, _task: &Task, ctx: &dyn FillContext) -> Result<(), AutomationError> {
            ctx.log("parked");
            std::future::pending::<()>().await;
            Ok(())
        }
    }

    fn app(dir: &std::path::Path) -> (Router, TaskOrchestrator) {
        let orch = TaskOrchestrator::start(
            Arc::new(Parked),
            Arc::new(InMemoryTaskStore::new()),
            TaskLogStore::new(dir),
        );
        (router(orch.clone()), orch)
    }

    async fn body_json(resp: Response) -> Value {
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_submit_requires_url_and_form_data() {
        let dir = tempfile::tempdir().unwrap();
        let (app, orch) = app(dir.path());

        let resp = app
            .clone()
            .oneshot(post_json("/api/queue", json!({ "url": "https://f.example/x" })))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert!(orch.list_tasks().is_empty());

        let resp = app
            .oneshot(post_json(
                "/api/queue",
                json!({ "url": "https://f.example/x", "formData": { "Name": "A" } }),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);
        let task = body_json(resp).await;
        assert_eq!(task["url"], "https://f.example/x");
        assert_eq!(task["formData"]["Name"], "A");
        assert!(task["id"].is_string());
    }

    #[tokio::test]
    async fn test_queue_and_task_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let (app, orch) = app(dir.path());
        let task = orch.submit("https://f.example/a", json!({}));

        let resp = app
            .clone()
            .oneshot(Request::get("/api/queue").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await.as_array().unwrap().len(), 1);

        let resp = app
            .clone()
            .oneshot(
                Request::get(format!("/api/tasks/{}", task.id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await["id"], task.id.as_str());

        let resp = app
            .oneshot(Request::get("/api/tasks/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_input_without_pending_question_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let (app, _orch) = app(dir.path());
        let resp = app
            .oneshot(post_json("/api/input", json!({ "value": "12345" })))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        assert_eq!(body["success"], true);
        assert!(body["answered"].is_null());
    }

    #[tokio::test]
    async fn test_log_download_and_missing_log() {
        let dir = tempfile::tempdir().unwrap();
        let (app, orch) = app(dir.path());

        let resp = app
            .clone()
            .oneshot(Request::get("/api/logs/unknown").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let task = orch.submit("https://f.example/a", json!({}));
        for _ in 0..100 {
            if orch.read_log(&task.id).is_ok() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let resp = app
            .clone()
            .oneshot(
                Request::get(format!("/api/logs/{}", task.id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        assert!(String::from_utf8_lossy(&bytes).contains("parked"));

        // 清洗后才等于真实 ID 的别名不能读到该任务的日志
        let resp = app
            .oneshot(
                Request::get(format!("/api/logs/..{}", task.id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_event_data_shapes() {
        let event = QueueEvent::RequestInput {
            task_id: "1".into(),
            question: "Please provide a value for: Phone".into(),
        };
        assert_eq!(event.name(), "requestInput");
        let data: Value = serde_json::from_str(&event_data(&event)).unwrap();
        assert_eq!(
            data,
            json!({ "taskId": "1", "question": "Please provide a value for: Phone" })
        );

        let task = Task::new("https://f.example/a", json!({ "Name": "A" }));
        let update = QueueEvent::QueueUpdate(vec![task.clone()]);
        assert_eq!(update.name(), "queueUpdate");
        let data: Value = serde_json::from_str(&event_data(&update)).unwrap();
        assert_eq!(data[0]["id"], task.id.as_str());
        assert_eq!(data[0]["status"], "pending");
    }

    #[tokio::test]
    async fn test_events_stream_starts_with_current_queue() {
        use futures_util::StreamExt;

        let dir = tempfile::tempdir().unwrap();
        let (app, orch) = app(dir.path());
        let task = orch.submit("https://f.example/a", json!({}));

        let resp = app
            .oneshot(Request::get("/api/events").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(resp.headers()[header::CONTENT_TYPE]
            .to_str()
            .unwrap()
            .starts_with("text/event-stream"));

        let mut body = resp.into_body().into_data_stream();
        let chunk = tokio::time::timeout(Duration::from_secs(2), body.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        let frame = String::from_utf8_lossy(&chunk).to_string();
        assert!(frame.starts_with("event: queueUpdate\n"), "{}", frame);
        let data = frame
            .lines()
            .find_map(|l| l.strip_prefix("data: "))
            .unwrap();
        let tasks: Value = serde_json::from_str(data).unwrap();
        assert_eq!(tasks[0]["id"], task.id.as_str());
    }
}
