//! 生成服务接口
//!
//! 调度核心只依赖这个 trait，生产环境由 [`LlmService`](super::LlmService) 实现，
//! 测试中替换为脚本化的替身。

use futures::future::BoxFuture;

use crate::error::AppResult;
use crate::models::{ExplanationMap, SubjectContext, Term};

/// 解释生成能力
///
/// 返回的映射可以缺少部分请求的术语（部分成功），
/// 返回 `Err` 表示整次调用失败，调用方按“零条解释”处理。
pub trait ExplanationGenerator: Send + Sync {
    fn generate<'a>(
        &'a self,
        terms: &'a [Term],
        context: &'a SubjectContext,
    ) -> BoxFuture<'a, AppResult<ExplanationMap>>;
}
