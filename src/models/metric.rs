use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 某个批次大小的历史表现
///
/// 持久化字段名沿用存储格式：
/// `{ batchSize, averageTimePerConcept, successRate, totalConcepts, samples }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSizeMetric {
    pub batch_size: usize,
    /// 平均每个术语耗时（毫秒）
    #[serde(rename = "averageTimePerConcept")]
    pub average_time_per_term: f64,
    /// 成功率，范围 [0, 1]
    pub success_rate: f64,
    /// 累计观察到的术语数，即加权平均的权重
    #[serde(rename = "totalConcepts")]
    pub total_terms_observed: u64,
    /// 记录次数
    #[serde(rename = "samples")]
    pub sample_count: u32,
}

impl BatchSizeMetric {
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size,
            average_time_per_term: 0.0,
            success_rate: 0.0,
            total_terms_observed: 0,
            sample_count: 0,
        }
    }

    /// 以本批术语数为权重更新加权平均
    pub fn observe(&mut self, term_count: usize, duration_ms: u64, success_count: usize) {
        if term_count == 0 {
            return;
        }

        let weight = term_count as f64;
        let previous = self.total_terms_observed as f64;
        let total = previous + weight;

        let time_per_term = duration_ms as f64 / weight;
        let success_rate = (success_count.min(term_count)) as f64 / weight;

        self.average_time_per_term =
            (self.average_time_per_term * previous + time_per_term * weight) / total;
        self.success_rate = (self.success_rate * previous + success_rate * weight) / total;
        self.total_terms_observed += term_count as u64;
        self.sample_count += 1;
    }

    /// 速度与可靠性的综合得分，越高越好
    pub fn score(&self) -> f64 {
        // 极快的批次可能测出 0ms，给一个下限避免除零
        let time = self.average_time_per_term.max(0.001);
        (1000.0 / time) * (self.success_rate * 10.0)
    }
}

/// 持久化格式：批次大小 → 统计
pub type MetricsSnapshot = BTreeMap<usize, BatchSizeMetric>;
