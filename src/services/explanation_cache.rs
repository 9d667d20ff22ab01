//! 解释缓存 - 业务能力层
//!
//! 在任何网络调用之前查询，每次成功生成之后写入。
//! 持久化失败只记录警告，退化为“没有缓存”。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::error::AppError;
use crate::infrastructure::{KeyValueStore, SnapshotWriter};
use crate::models::{ExplanationMap, Term};

/// 缓存在存储中的键
pub const CACHE_KEY: &str = "explanation_cache";

/// 解释缓存
///
/// 职责：
/// - 查询：把一批术语分成命中与未命中
/// - 写入：合并新解释并整体持久化
/// - 可被多个在途批次并发调用，相同键后写覆盖先写
pub struct ExplanationCache {
    writer: SnapshotWriter,
    entries: RwLock<ExplanationMap>,
    // 只在持有写锁时递增，与快照内容一一对应
    version: AtomicU64,
}

impl ExplanationCache {
    /// 从存储加载缓存，读取失败时从空缓存开始
    pub fn load(store: Arc<dyn KeyValueStore>) -> Self {
        let entries = match store.get_as::<ExplanationMap>(CACHE_KEY) {
            Ok(Some(entries)) => {
                debug!("已加载 {} 条缓存解释", entries.len());
                entries
            }
            Ok(None) => ExplanationMap::new(),
            Err(e) => {
                warn!("⚠️ 读取解释缓存失败，使用空缓存: {}", e);
                ExplanationMap::new()
            }
        };

        Self {
            writer: SnapshotWriter::new(store, CACHE_KEY),
            entries: RwLock::new(entries),
            version: AtomicU64::new(0),
        }
    }

    /// 查询一批术语
    ///
    /// # 返回
    /// `(命中的解释, 未命中的术语)`，未命中部分保持输入顺序
    pub fn lookup(&self, terms: &[Term]) -> (ExplanationMap, Vec<Term>) {
        let entries = self.entries.read();
        let mut hits = ExplanationMap::new();
        let mut misses = Vec::new();

        for term in terms {
            match entries.get(term) {
                Some(explanation) => {
                    hits.insert(term.clone(), explanation.clone());
                }
                None => misses.push(term.clone()),
            }
        }

        (hits, misses)
    }

    /// 写入新解释并持久化
    pub fn store(&self, new_entries: &ExplanationMap) {
        if new_entries.is_empty() {
            return;
        }

        let (version, snapshot) = {
            let mut entries = self.entries.write();
            for (term, explanation) in new_entries {
                entries.insert(term.clone(), explanation.clone());
            }
            let version = self.version.fetch_add(1, Ordering::SeqCst) + 1;
            (version, serde_json::to_string(&*entries))
        };

        // 锁外落盘，写入器丢弃比已落盘版本旧的快照
        let persisted = snapshot
            .map_err(|e| AppError::store_corrupted(CACHE_KEY, e))
            .and_then(|raw| self.writer.write(version, &raw));
        if let Err(e) = persisted {
            warn!("⚠️ 解释缓存持久化失败（仅保留在内存中）: {}", e);
        }
    }

    /// 是否已缓存某个术语
    pub fn contains(&self, term: &str) -> bool {
        self.entries.read().contains_key(term)
    }

    /// 缓存条目数
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
