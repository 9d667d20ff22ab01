use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// 需要解释的术语，大小写与空白由调用方规范化
pub type Term = String;

/// 术语的生成解释，一旦生成不再修改
pub type Explanation = String;

/// 术语 → 解释
pub type ExplanationMap = HashMap<Term, Explanation>;

/// 学科上下文
///
/// 只用于提升生成质量，调度核心不解读其中内容
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectContext {
    /// 学科 / 课程名称
    pub subject: String,
    /// 文章标题（可选）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl SubjectContext {
    pub fn new(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            title: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }
}

/// 把 `source` 合并进 `target`，只写入 `target` 中尚不存在的术语
///
/// 已存在的解释在一次运行内永不覆盖，因此合并满足幂等：
/// `merge(merge(A, B), A) == merge(A, B)`。返回新增的条目数。
pub fn merge_explanations(target: &mut ExplanationMap, source: ExplanationMap) -> usize {
    let mut added = 0;
    for (term, explanation) in source {
        if let std::collections::hash_map::Entry::Vacant(slot) = target.entry(term) {
            slot.insert(explanation);
            added += 1;
        }
    }
    added
}
