//! # Term Explainer
//!
//! 为课程文章中的专业术语批量生成简短解释（悬停提示），
//! 第一批结果尽快出现，其余结果逐步到达。
//!
//! ## 架构设计
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 持有本地持久化资源，只暴露键值读写能力
//! - `KeyValueStore` - `FileStore` / `MemoryStore`
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"
//! - `ExplanationCache` - 解释缓存
//! - `BatchSizeSelector` - 根据历史表现选择批次大小
//! - `BatchPlanner` - 切分批次，第一批最小
//! - `LlmService` - 调用 LLM 生成解释
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一个批次"的完整处理流程
//! - `BatchExecutor` - 缓存 → 生成 → 写回 → 拆分重试
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/scheduler` - 第一批原地执行，其余批次有界并发，推送进度
//!
//! ## 使用方式
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use term_explainer::{Config, FileStore, LlmService, Scheduler, SubjectContext};
//! # async fn example() -> term_explainer::AppResult<()> {
//! let config = Config::from_env();
//! let scheduler = Scheduler::from_config(
//!     &config,
//!     Arc::new(LlmService::new(&config)),
//!     Arc::new(FileStore::new(&config.store_dir)),
//! )?;
//!
//! let terms = vec!["所有权".to_string(), "借用".to_string()];
//! let mut run = scheduler.run(terms, SubjectContext::new("Rust 编程"))?;
//! while let Some(event) = run.next_event().await {
//!     println!("{}% 已就绪 {} 条", event.progress.percentage, event.explanations.len());
//! }
//! let explanations = run.finish().await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod infrastructure;
pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use config::Config;
pub use error::{AppError, AppResult};
pub use infrastructure::{FileStore, KeyValueStore, MemoryStore};
pub use models::{
    Batch, BatchId, BatchSizeMetric, Explanation, ExplanationMap, Progress, RunEvent, RunState,
    SubjectContext, Term,
};
pub use orchestrator::{RunHandle, Scheduler, SchedulerSettings};
pub use services::{
    BatchPlanner, BatchSizeSelector, ExplanationCache, ExplanationGenerator, LlmService,
    SelectorSettings, SizeChoice,
};
pub use utils::logging;
pub use workflow::{BatchExecutor, RetryPolicy};
