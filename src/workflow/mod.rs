//! 流程层（Workflow）
//!
//! 定义“一个批次”的完整处理流程：缓存 → 生成 → 写回 → 拆分重试

pub mod batch_executor;

pub use batch_executor::{BatchExecutor, RetryPolicy};
