//! LLM 层：客户端抽象与实现（OpenAI 兼容 / Mock），以及基于 LLM 的字段抽取与映射

pub mod backend;
pub mod extractor;
pub mod mapper;
pub mod mock;
pub mod openai;
pub mod traits;

pub use backend::LlmBackend;
pub use extractor::LlmFieldExtractor;
pub use mapper::LlmFieldMapper;
pub use mock::MockLlmClient;
pub use openai::{OpenAiClient, TokenUsage};
pub use traits::{LlmClient, Message, Role};
