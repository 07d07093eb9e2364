//! Autoform CLI
//!
//! 用法：`autoform <url> <form-data.json | 内联 JSON>`
//! 执行单个任务，把任务日志逐行打印到 stdout；需要人工补全时在 stdin 读取一行作为回答。

use std::path::Path;

use anyhow::{bail, Context};
use autoform::{app, config::load_config, core::TaskStatus, observability};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;

/// 参数是已存在的文件路径时读取文件，否则按内联 JSON 解析
fn read_form_data(arg: &str) -> anyhow::Result<Value> {
    let raw = if Path::new(arg).is_file() {
        std::fs::read_to_string(arg).with_context(|| format!("Failed to read {}", arg))?
    } else {
        arg.to_string()
    };
    serde_json::from_str(&raw).context("Form data is not valid JSON")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let [url, data] = args.as_slice() else {
        bail!("usage: autoform <url> <form-data.json | inline JSON>");
    };
    let form_data = read_form_data(data)?;

    let cfg = load_config(None).context("Failed to load config")?;
    let launcher = app::build_launcher(&cfg)?;
    let orchestrator = app::build_orchestrator(&cfg, launcher);

    let mut events = orchestrator.subscribe();
    let task = orchestrator.submit(url.clone(), form_data);
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut printed = 0usize;

    loop {
        let event = tokio::select! {
            ev = events.recv() => ev,
            _ = tokio::signal::ctrl_c() => {
                orchestrator.shutdown();
                bail!("interrupted");
            }
        };
        match event {
            Ok(_) | Err(RecvError::Lagged(_)) => {}
            Err(RecvError::Closed) => bail!("orchestrator stopped unexpectedly"),
        }

        // 以存储中的最新状态为准，事件只用作唤醒（落后丢失的事件不影响提问）
        let Some(current) = orchestrator.get_task(&task.id) else {
            continue;
        };
        for line in current.logs.iter().skip(printed) {
            println!("{}", line);
        }
        printed = current.logs.len();

        match current.status {
            TaskStatus::WaitingInput => {
                let question = current.current_question.unwrap_or_default();
                println!("? {}", question);
                let answer = stdin
                    .next_line()
                    .await
                    .context("Failed to read answer from stdin")?
                    .unwrap_or_default();
                orchestrator.answer_for(&task.id, answer.trim());
            }
            TaskStatus::Completed => return Ok(()),
            TaskStatus::Failed => bail!(current.error.unwrap_or_else(|| "task failed".into())),
            _ => {}
        }
    }
}
