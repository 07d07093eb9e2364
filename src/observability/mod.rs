//! 可观测性：诊断日志（tracing）
//!
//! 诊断流写 stderr，默认 info，可通过 RUST_LOG 覆盖；任务日志是另一条面向用户的流，不经过这里。

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // 重复初始化（如测试中）时忽略
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .try_init();
}
