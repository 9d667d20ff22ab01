//! 基础设施层（Infrastructure Layer）
//!
//! 持有本地持久化资源，只暴露“按键读写”的能力，
//! 不认识术语、批次或统计数据的含义。

pub mod store;

pub use store::{FileStore, KeyValueStore, MemoryStore, SnapshotWriter};
