//! 批次大小选择器 - 业务能力层
//!
//! 维护每个批次大小的历史耗时与成功率，为下一批选择大小：
//! 先轮流探索候选大小，样本充足后选历史得分最高者。

use std::cmp::Ordering;
use std::sync::Arc;

use parking_lot::Mutex;
use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::AppError;
use crate::infrastructure::{KeyValueStore, SnapshotWriter};
use crate::models::{BatchSizeMetric, MetricsSnapshot};

/// 统计数据在存储中的键
pub const METRICS_KEY: &str = "batch_size_metrics";

/// 选择器参数
#[derive(Debug, Clone)]
pub struct SelectorSettings {
    /// 候选批次大小（去重、升序）
    pub candidate_sizes: Vec<usize>,
    /// 候选大小“已评估”所需样本数
    pub min_samples_per_size: u32,
    /// 结束探索所需的已评估候选数量
    pub explored_sizes_required: usize,
    pub min_batch_size: usize,
    pub max_batch_size: usize,
}

impl SelectorSettings {
    pub fn from_config(config: &Config) -> Self {
        let mut candidate_sizes = config.candidate_batch_sizes.clone();
        candidate_sizes.sort_unstable();
        candidate_sizes.dedup();

        Self {
            candidate_sizes,
            min_samples_per_size: config.min_samples_per_size,
            explored_sizes_required: config.explored_sizes_required,
            min_batch_size: config.min_batch_size,
            max_batch_size: config.max_batch_size,
        }
    }
}

/// 一次选择的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeChoice {
    /// 被评估的候选大小，批次结果记在它名下
    pub candidate: usize,
    /// 实际切分用的大小（受上下限和剩余术语数限制）
    pub size: usize,
}

struct SelectorInner {
    metrics: MetricsSnapshot,
    rng: SmallRng,
    version: u64,
}

/// 批次大小选择器
///
/// 多个并发运行共享同一个实例，统计更新采用后写覆盖。
pub struct BatchSizeSelector {
    settings: SelectorSettings,
    writer: SnapshotWriter,
    inner: Mutex<SelectorInner>,
}

impl BatchSizeSelector {
    /// 创建选择器并从存储恢复历史统计
    pub fn new(settings: SelectorSettings, store: Arc<dyn KeyValueStore>) -> Self {
        Self::with_rng(settings, store, SmallRng::from_entropy())
    }

    /// 使用固定随机种子（测试用，保证平局选择可复现）
    pub fn with_seed(settings: SelectorSettings, store: Arc<dyn KeyValueStore>, seed: u64) -> Self {
        Self::with_rng(settings, store, SmallRng::seed_from_u64(seed))
    }

    fn with_rng(settings: SelectorSettings, store: Arc<dyn KeyValueStore>, rng: SmallRng) -> Self {
        let metrics = match store.get_as::<MetricsSnapshot>(METRICS_KEY) {
            Ok(Some(metrics)) => metrics,
            Ok(None) => MetricsSnapshot::new(),
            Err(e) => {
                warn!("⚠️ 读取批次统计失败，从零开始学习: {}", e);
                MetricsSnapshot::new()
            }
        };

        Self {
            settings,
            writer: SnapshotWriter::new(store, METRICS_KEY),
            inner: Mutex::new(SelectorInner {
                metrics,
                rng,
                version: 0,
            }),
        }
    }

    /// 为下一批选择大小
    ///
    /// # 参数
    /// - `remaining_term_count`: 尚未分配的术语数，较少时结果不超过该值
    pub fn choose_size(&self, remaining_term_count: usize) -> usize {
        self.choose(remaining_term_count).size
    }

    /// 为下一批选择大小，同时返回被评估的候选大小
    pub fn choose(&self, remaining_term_count: usize) -> SizeChoice {
        let mut inner = self.inner.lock();

        let candidate = if self.exploring(&inner.metrics) {
            let size = self.least_sampled(&mut inner);
            debug!("🔭 探索阶段，选择样本最少的批次大小 {}", size);
            size
        } else {
            let size = self.best_scoring(&inner.metrics);
            debug!("🎯 利用阶段，选择历史得分最高的批次大小 {}", size);
            size
        };

        SizeChoice {
            candidate,
            size: self.clamp(candidate, remaining_term_count),
        }
    }

    /// 记录一次批次结果
    ///
    /// # 参数
    /// - `size`: 批次大小（统计的键）
    /// - `term_count`: 实际发送的术语数（加权平均的权重）
    /// - `duration_ms`: 调用耗时
    /// - `success_count`: 返回了解释的术语数
    pub fn record(&self, size: usize, term_count: usize, duration_ms: u64, success_count: usize) {
        if term_count == 0 {
            return;
        }

        let (version, snapshot) = {
            let mut inner = self.inner.lock();
            let metric = inner
                .metrics
                .entry(size)
                .or_insert_with(|| BatchSizeMetric::new(size));
            metric.observe(term_count, duration_ms, success_count);

            debug!(
                "📈 批次大小 {}: 平均 {:.1}ms/术语, 成功率 {:.2}, 样本 {}",
                size, metric.average_time_per_term, metric.success_rate, metric.sample_count
            );

            inner.version += 1;
            (inner.version, serde_json::to_string(&inner.metrics))
        };

        let persisted = snapshot
            .map_err(|e| AppError::store_corrupted(METRICS_KEY, e))
            .and_then(|raw| self.writer.write(version, &raw));
        if let Err(e) = persisted {
            warn!("⚠️ 批次统计持久化失败: {}", e);
        }
    }

    /// 是否仍处于探索阶段
    pub fn is_exploring(&self) -> bool {
        self.exploring(&self.inner.lock().metrics)
    }

    /// 某个批次大小的当前统计
    pub fn metric(&self, size: usize) -> Option<BatchSizeMetric> {
        self.inner.lock().metrics.get(&size).cloned()
    }

    /// 全部统计的快照
    pub fn snapshot(&self) -> MetricsSnapshot {
        self.inner.lock().metrics.clone()
    }

    pub fn settings(&self) -> &SelectorSettings {
        &self.settings
    }

    fn samples(&self, metrics: &MetricsSnapshot, size: usize) -> u32 {
        metrics.get(&size).map(|m| m.sample_count).unwrap_or(0)
    }

    fn exploring(&self, metrics: &MetricsSnapshot) -> bool {
        let explored = self
            .settings
            .candidate_sizes
            .iter()
            .filter(|&&size| self.samples(metrics, size) >= self.settings.min_samples_per_size)
            .count();
        let required = self
            .settings
            .explored_sizes_required
            .min(self.settings.candidate_sizes.len());

        explored < required
    }

    fn least_sampled(&self, inner: &mut SelectorInner) -> usize {
        let fewest = self
            .settings
            .candidate_sizes
            .iter()
            .map(|&size| self.samples(&inner.metrics, size))
            .min()
            .unwrap_or(0);

        let tied: Vec<usize> = self
            .settings
            .candidate_sizes
            .iter()
            .copied()
            .filter(|&size| self.samples(&inner.metrics, size) == fewest)
            .collect();

        tied.choose(&mut inner.rng)
            .copied()
            .unwrap_or(self.settings.min_batch_size)
    }

    fn best_scoring(&self, metrics: &MetricsSnapshot) -> usize {
        self.settings
            .candidate_sizes
            .iter()
            .filter_map(|size| metrics.get(size))
            .filter(|m| m.sample_count >= self.settings.min_samples_per_size)
            .map(|m| (m.batch_size, m.score()))
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal))
            .map(|(size, _)| size)
            .unwrap_or(self.settings.min_batch_size)
    }

    fn clamp(&self, size: usize, remaining_term_count: usize) -> usize {
        let size = size.clamp(self.settings.min_batch_size, self.settings.max_batch_size);
        if remaining_term_count > 0 && remaining_term_count < size {
            remaining_term_count
        } else {
            size
        }
    }
}
