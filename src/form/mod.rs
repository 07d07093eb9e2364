//! 表单层：字段描述、缓存、解析、映射、填写策略与端到端执行

pub mod cache;
pub mod field;
pub mod filler;
pub mod mapping;
pub mod resolver;
pub mod service;
pub mod strategy;

pub use cache::{normalize_url, FieldCache};
pub use field::{FieldDescriptor, FieldType, FillValue, ValueSource};
pub use filler::{FillContext, FillReport, FillTimings, FormFillingEngine, SubmitOutcome};
pub use mapping::{FieldMapper, FieldMapping, UNMAPPED};
pub use resolver::{FieldExtractor, FieldResolutionEngine, ResolvedFields};
pub use service::{AutomationService, RunSummary};
pub use strategy::{FillStrategy, StrategyOutcome};
