//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责批次调度与并发控制，是整个系统的“指挥中心”。
//!
//! ## 层次关系
//!
//! ```text
//! scheduler (处理 Vec<Batch>)
//!     ↓
//! workflow::BatchExecutor (处理单个 Batch，含拆分重试)
//!     ↓
//! services (能力层：cache / selector / planner / llm)
//!     ↓
//! infrastructure (基础设施：KeyValueStore)
//! ```
//!
//! ## 设计原则
//!
//! 1. **单一职责**：scheduler 管并发与进度，executor 管单个批次
//! 2. **向下依赖**：编排层 → workflow → services → infrastructure
//! 3. **无业务逻辑**：只做调度和汇总，不做具体生成判断

pub mod scheduler;

pub use scheduler::{RunHandle, Scheduler, SchedulerSettings};
