//! Autoform - 表单自动填写引擎
//!
//! 模块划分：
//! - **api**: HTTP / SSE 边界（feature "web"）
//! - **app**: 由配置组装各组件
//! - **browser**: 浏览器驱动抽象、Chrome 实现与 Mock
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 任务模型、编排器、人工输入闸门、任务存储与日志
//! - **form**: 字段描述、缓存、解析、映射、填写策略与提交
//! - **llm**: LLM 客户端抽象，以及基于 LLM 的字段抽取与映射
//! - **observability**: 诊断日志初始化

#[cfg(feature = "web")]
pub mod api;
pub mod app;
pub mod browser;
pub mod config;
pub mod core;
pub mod form;
pub mod llm;
pub mod observability;
