//! 批次规划 - 业务能力层
//!
//! 第一批固定为很小的规模，让第一批解释尽快出现；
//! 其余术语按选定的大小切分。

use crate::models::{Batch, BatchId, Term};
use crate::services::batch_size_selector::SizeChoice;

/// 批次规划器
#[derive(Debug, Clone)]
pub struct BatchPlanner {
    first_batch_size: usize,
}

impl BatchPlanner {
    pub fn new(first_batch_size: usize) -> Self {
        Self {
            first_batch_size: first_batch_size.max(1),
        }
    }

    pub fn first_batch_size(&self) -> usize {
        self.first_batch_size
    }

    /// 把术语列表切分为有序批次
    ///
    /// # 参数
    /// - `terms`: 全部术语
    /// - `size`: 第一批之后每批的大小
    pub fn plan(&self, terms: &[Term], size: usize) -> Vec<Batch> {
        self.plan_for(
            terms,
            SizeChoice {
                candidate: size,
                size,
            },
        )
    }

    /// 按选择器的结果切分，第一批之后的批次都记在 `choice.candidate` 名下
    ///
    /// 剩余术语不足一个候选大小时 `choice.size` 会小于 `choice.candidate`，
    /// 这时批次仍然算作该候选的一次样本。
    pub fn plan_for(&self, terms: &[Term], choice: SizeChoice) -> Vec<Batch> {
        if terms.is_empty() {
            return Vec::new();
        }

        if terms.len() <= self.first_batch_size {
            return vec![Batch::new(BatchId::root(0), terms.to_vec())];
        }

        let (first, rest) = terms.split_at(self.first_batch_size);
        let mut batches = vec![Batch::new(BatchId::root(0), first.to_vec())];

        batches.extend(
            rest.chunks(choice.size.max(1)).enumerate().map(|(i, chunk)| {
                Batch::new(BatchId::root(i + 1), chunk.to_vec()).with_planned_size(choice.candidate)
            }),
        );

        batches
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn terms(n: usize) -> Vec<Term> {
        (0..n).map(|i| format!("术语{}", i)).collect()
    }

    #[test]
    fn test_small_list_is_single_batch() {
        let batches = BatchPlanner::new(4).plan(&terms(3), 8);
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 3);
    }

    #[test]
    fn test_first_batch_is_small_then_selected_size() {
        let batches = BatchPlanner::new(4).plan(&terms(20), 6);
        let sizes: Vec<usize> = batches.iter().map(Batch::len).collect();

        // 4 + ceil(16 / 6) 批
        assert_eq!(sizes, vec![4, 6, 6, 4]);
        let ids: Vec<String> = batches.iter().map(|b| b.id.to_string()).collect();
        assert_eq!(ids, vec!["0", "1", "2", "3"]);
    }

    #[test]
    fn test_first_batch_is_not_attributed_to_a_candidate() {
        let choice = SizeChoice {
            candidate: 8,
            size: 6,
        };
        let batches = BatchPlanner::new(4).plan_for(&terms(10), choice);

        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].planned_size, None);
        assert_eq!(batches[1].len(), 6);
        assert_eq!(batches[1].planned_size, Some(8));
    }

    #[test]
    fn test_plan_preserves_every_term_in_order() {
        let input = terms(23);
        let flattened: Vec<Term> = BatchPlanner::new(4)
            .plan(&input, 8)
            .into_iter()
            .flat_map(|b| b.terms)
            .collect();
        assert_eq!(flattened, input);
    }

    #[test]
    fn test_empty_list_has_no_batches() {
        assert!(BatchPlanner::new(4).plan(&[], 8).is_empty());
    }
}
