use std::fmt::{self, Display};

use super::term::Term;

/// 批次编号
///
/// 顶层批次为单个数字（`3`），重试拆分出的子批次在父编号后追加序号（`3.1`），
/// 只用于日志追踪来源。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BatchId {
    path: Vec<usize>,
}

impl BatchId {
    /// 顶层批次编号
    pub fn root(index: usize) -> Self {
        Self { path: vec![index] }
    }

    /// 第 `index` 个子批次的编号
    pub fn child(&self, index: usize) -> Self {
        let mut path = self.path.clone();
        path.push(index);
        Self { path }
    }

    /// 拆分深度，顶层批次为 0
    pub fn depth(&self) -> usize {
        self.path.len() - 1
    }
}

impl Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.path.iter().map(|p| p.to_string()).collect();
        write!(f, "{}", parts.join("."))
    }
}

/// 一次提交给生成服务的术语批次
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    pub id: BatchId,
    pub terms: Vec<Term>,
    /// 选择器为该批次选定的候选大小，批次结果按它记入统计。
    ///
    /// 第一批和重试拆分出的子批次为 `None`，不参与候选大小的评估。
    pub planned_size: Option<usize>,
}

impl Batch {
    pub fn new(id: BatchId, terms: Vec<Term>) -> Self {
        Self {
            id,
            terms,
            planned_size: None,
        }
    }

    /// 标记该批次属于哪个候选大小
    pub fn with_planned_size(mut self, size: usize) -> Self {
        self.planned_size = Some(size);
        self
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// 把 `terms` 按 `chunk_size` 切成当前批次的子批次
    pub fn split(&self, terms: &[Term], chunk_size: usize) -> Vec<Batch> {
        terms
            .chunks(chunk_size.max(1))
            .enumerate()
            .map(|(i, chunk)| Batch::new(self.id.child(i + 1), chunk.to_vec()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_id_lineage() {
        let root = BatchId::root(3);
        let grandchild = root.child(1).child(2);

        assert_eq!(root.to_string(), "3");
        assert_eq!(grandchild.to_string(), "3.1.2");
        assert_eq!(grandchild.depth(), 2);
    }

    #[test]
    fn test_split_tags_children() {
        let terms: Vec<Term> = (0..5).map(|i| format!("t{}", i)).collect();
        let batch = Batch::new(BatchId::root(2), terms.clone());

        let parts = batch.split(&terms, 3);
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].id.to_string(), "2.1");
        assert_eq!(parts[1].id.to_string(), "2.2");
        assert_eq!(parts[0].len(), 3);
        assert_eq!(parts[1].len(), 2);
    }

    #[test]
    fn test_split_children_are_not_attributed_to_a_candidate() {
        let terms: Vec<Term> = (0..8).map(|i| format!("t{}", i)).collect();
        let batch = Batch::new(BatchId::root(1), terms.clone()).with_planned_size(8);

        let parts = batch.split(&terms, 4);
        assert!(parts.iter().all(|p| p.planned_size.is_none()));
    }
}
