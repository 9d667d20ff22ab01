//! 业务能力层（Services）
//!
//! 每个服务只描述“我能做什么”，不关心调度顺序：
//! - `ExplanationCache` - 解释缓存
//! - `BatchSizeSelector` - 批次大小选择
//! - `BatchPlanner` - 批次规划
//! - `LlmService` - 调用 LLM 生成解释

pub mod batch_planner;
pub mod batch_size_selector;
pub mod explanation_cache;
pub mod generator;
pub mod llm_service;

pub use batch_planner::BatchPlanner;
pub use batch_size_selector::{BatchSizeSelector, SelectorSettings, SizeChoice};
pub use explanation_cache::ExplanationCache;
pub use generator::ExplanationGenerator;
pub use llm_service::LlmService;
