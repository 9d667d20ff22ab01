//! 批次执行流程 - 流程层
//!
//! 流程顺序：
//! 1. 查缓存，全部命中直接返回
//! 2. 未命中部分调用生成服务 → 写缓存 → 按批次的候选大小上报统计
//! 3. 部分失败：未解决的术语对半拆分，深度 +1 重试
//! 4. 整体失败：整个批次对半拆分，深度 +1 重试
//! 5. 重试预算用尽或批次已到最小规模：返回已解决部分
//!
//! 执行永不返回错误，最坏情况是一个空映射。

use std::sync::Arc;
use std::time::Instant;

use futures::future::{join_all, BoxFuture};
use futures::FutureExt;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::models::{merge_explanations, Batch, ExplanationMap, SubjectContext, Term};
use crate::services::{BatchSizeSelector, ExplanationCache, ExplanationGenerator};

/// 拆分重试策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// 最大重试深度
    pub max_retries: u32,
    /// 批次不大于此值时不再拆分
    pub min_batch_size: usize,
}

impl RetryPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_retries: config.max_retries,
            min_batch_size: config.min_batch_size,
        }
    }

    /// 当前深度、当前批次长度下是否还能拆分重试
    pub fn can_split(&self, retry_depth: u32, batch_len: usize) -> bool {
        retry_depth < self.max_retries && batch_len > self.min_batch_size
    }

    /// 拆分后子批次的大小
    pub fn sub_batch_size(&self, len: usize) -> usize {
        self.min_batch_size.max(len / 2).max(1)
    }
}

/// 批次执行器
///
/// - 编排单个批次的缓存、生成、重试
/// - 共享缓存与选择器，可被多个在途批次同时使用
/// - 不关心批次之间的并发与进度
pub struct BatchExecutor {
    generator: Arc<dyn ExplanationGenerator>,
    cache: Arc<ExplanationCache>,
    selector: Arc<BatchSizeSelector>,
    policy: RetryPolicy,
}

impl BatchExecutor {
    pub fn new(
        generator: Arc<dyn ExplanationGenerator>,
        cache: Arc<ExplanationCache>,
        selector: Arc<BatchSizeSelector>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            generator,
            cache,
            selector,
            policy,
        }
    }

    pub fn cache(&self) -> &Arc<ExplanationCache> {
        &self.cache
    }

    pub fn selector(&self) -> &Arc<BatchSizeSelector> {
        &self.selector
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// 执行一个批次
    ///
    /// # 参数
    /// - `batch`: 待执行批次
    /// - `context`: 学科上下文，原样传给生成服务
    /// - `retry_depth`: 当前重试深度，顶层批次为 0
    ///
    /// # 返回
    /// 本批次已解决的解释（可能为空）
    pub fn execute<'a>(
        &'a self,
        batch: Batch,
        context: &'a SubjectContext,
        retry_depth: u32,
    ) -> BoxFuture<'a, ExplanationMap> {
        async move {
            let (hits, misses) = self.cache.lookup(&batch.terms);
            if misses.is_empty() {
                debug!("[批次 {}] ⚡ 全部 {} 个术语命中缓存", batch.id, hits.len());
                return hits;
            }

            debug!(
                "[批次 {}] 缓存命中 {} 个，请求生成 {} 个 (重试深度 {})",
                batch.id,
                hits.len(),
                misses.len(),
                retry_depth
            );

            let started = Instant::now();
            let outcome = self.generator.generate(&misses, context).await;
            let duration_ms = started.elapsed().as_millis() as u64;

            let mut resolved = hits;

            match outcome {
                Ok(fresh) => {
                    let fresh: ExplanationMap = fresh
                        .into_iter()
                        .filter(|(term, _)| misses.contains(term))
                        .collect();

                    self.report(&batch, misses.len(), duration_ms, fresh.len());
                    self.cache.store(&fresh);
                    merge_explanations(&mut resolved, fresh);

                    let unresolved: Vec<Term> = misses
                        .into_iter()
                        .filter(|term| !resolved.contains_key(term))
                        .collect();

                    if unresolved.is_empty() {
                        debug!("[批次 {}] ✓ 完成，耗时 {}ms", batch.id, duration_ms);
                        return resolved;
                    }

                    if self.policy.can_split(retry_depth, batch.len()) {
                        info!(
                            "[批次 {}] 部分成功，{} 个术语未返回，拆分重试",
                            batch.id,
                            unresolved.len()
                        );
                        let retried = self
                            .retry_split(&batch, &unresolved, context, retry_depth)
                            .await;
                        merge_explanations(&mut resolved, retried);
                    } else {
                        warn!(
                            "[批次 {}] ⚠️ 重试预算用尽，{} 个术语保持未解决",
                            batch.id,
                            unresolved.len()
                        );
                    }
                }
                Err(e) => {
                    warn!("[批次 {}] ❌ 生成服务调用失败: {}", batch.id, e);
                    self.report(&batch, misses.len(), duration_ms, 0);

                    if self.policy.can_split(retry_depth, batch.len()) {
                        // 整体失败时没有任何可信的部分结果，整批重新拆分
                        let retried = self
                            .retry_split(&batch, &batch.terms, context, retry_depth)
                            .await;
                        merge_explanations(&mut resolved, retried);
                    } else {
                        warn!(
                            "[批次 {}] ⚠️ 重试预算用尽，放弃 {} 个术语",
                            batch.id,
                            misses.len()
                        );
                    }
                }
            }

            resolved
        }
        .boxed()
    }

    /// 第一批和重试子批次不属于任何候选大小，不上报
    fn report(&self, batch: &Batch, term_count: usize, duration_ms: u64, success_count: usize) {
        if let Some(size) = batch.planned_size {
            self.selector
                .record(size, term_count, duration_ms, success_count);
        }
    }

    /// 把 `terms` 拆成子批次，在下一深度并发执行并合并结果
    async fn retry_split(
        &self,
        parent: &Batch,
        terms: &[Term],
        context: &SubjectContext,
        retry_depth: u32,
    ) -> ExplanationMap {
        let size = self.policy.sub_batch_size(terms.len());
        let sub_batches = parent.split(terms, size);

        debug!(
            "[批次 {}] 拆分为 {} 个子批次 (每批 ≤{})",
            parent.id,
            sub_batches.len(),
            size
        );

        let results = join_all(
            sub_batches
                .into_iter()
                .map(|sub| self.execute(sub, context, retry_depth + 1)),
        )
        .await;

        let mut merged = ExplanationMap::new();
        for result in results {
            merge_explanations(&mut merged, result);
        }
        merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AppError, AppResult};
    use crate::infrastructure::{KeyValueStore, MemoryStore};
    use crate::models::BatchId;
    use crate::services::SelectorSettings;
    use parking_lot::Mutex;

    type Script = dyn Fn(&[Term], usize) -> AppResult<ExplanationMap> + Send + Sync;

    /// 按脚本返回结果的生成服务替身，记录每次调用的术语
    struct ScriptedGenerator {
        script: Box<Script>,
        calls: Mutex<Vec<Vec<Term>>>,
    }

    impl ScriptedGenerator {
        fn new(script: impl Fn(&[Term], usize) -> AppResult<ExplanationMap> + Send + Sync + 'static) -> Arc<Self> {
            Arc::new(Self {
                script: Box::new(script),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> Vec<Vec<Term>> {
            self.calls.lock().clone()
        }
    }

    impl ExplanationGenerator for ScriptedGenerator {
        fn generate<'a>(
            &'a self,
            terms: &'a [Term],
            _context: &'a SubjectContext,
        ) -> BoxFuture<'a, AppResult<ExplanationMap>> {
            let call_index = {
                let mut calls = self.calls.lock();
                calls.push(terms.to_vec());
                calls.len() - 1
            };
            let result = (self.script)(terms, call_index);
            async move { result }.boxed()
        }
    }

    fn explain_all(terms: &[Term]) -> ExplanationMap {
        terms
            .iter()
            .map(|t| (t.clone(), format!("{} 的解释", t)))
            .collect()
    }

    fn terms(n: usize) -> Vec<Term> {
        (0..n).map(|i| format!("术语{}", i)).collect()
    }

    fn build_executor(generator: Arc<ScriptedGenerator>) -> (BatchExecutor, Arc<ExplanationCache>, Arc<BatchSizeSelector>) {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let cache = Arc::new(ExplanationCache::load(store.clone()));
        let selector = Arc::new(BatchSizeSelector::with_seed(
            SelectorSettings::from_config(&Config::default()),
            store,
            11,
        ));
        let policy = RetryPolicy {
            max_retries: 2,
            min_batch_size: 3,
        };
        (
            BatchExecutor::new(generator, cache.clone(), selector.clone(), policy),
            cache,
            selector,
        )
    }

    /// 第一批之后的批次，记在与长度相同的候选大小名下
    fn batch(terms: Vec<Term>) -> Batch {
        let size = terms.len();
        Batch::new(BatchId::root(1), terms).with_planned_size(size)
    }

    #[tokio::test]
    async fn test_all_cached_makes_no_calls() {
        let generator = ScriptedGenerator::new(|terms, _| Ok(explain_all(terms)));
        let (executor, cache, selector) = build_executor(generator.clone());
        let input = terms(4);
        cache.store(&explain_all(&input));

        let context = SubjectContext::new("测试");
        let result = executor.execute(batch(input), &context, 0).await;

        assert_eq!(result.len(), 4);
        assert!(generator.calls().is_empty());
        assert!(selector.snapshot().is_empty(), "缓存命中不应更新统计");
    }

    #[tokio::test]
    async fn test_only_misses_are_requested() {
        let generator = ScriptedGenerator::new(|terms, _| Ok(explain_all(terms)));
        let (executor, cache, _) = build_executor(generator.clone());
        let input = terms(3);
        cache.store(&explain_all(&input[..2]));

        let context = SubjectContext::new("测试");
        let result = executor.execute(batch(input.clone()), &context, 0).await;

        assert_eq!(result.len(), 3);
        assert_eq!(generator.calls(), vec![vec![input[2].clone()]]);
    }

    #[tokio::test]
    async fn test_success_updates_cache_and_metrics() {
        let generator = ScriptedGenerator::new(|terms, _| Ok(explain_all(terms)));
        let (executor, cache, selector) = build_executor(generator);

        let context = SubjectContext::new("测试");
        executor.execute(batch(terms(8)), &context, 0).await;

        assert_eq!(cache.len(), 8);
        let metric = selector.metric(8).unwrap();
        assert_eq!(metric.sample_count, 1);
        assert_eq!(metric.success_rate, 1.0);
    }

    #[tokio::test]
    async fn test_partial_failure_retries_missing_terms() {
        // 第一次只返回前 6 个
        let generator = ScriptedGenerator::new(|terms, call| {
            if call == 0 {
                Ok(explain_all(&terms[..6]))
            } else {
                Ok(explain_all(terms))
            }
        });
        let (executor, _, selector) = build_executor(generator.clone());
        let input = terms(10);

        let context = SubjectContext::new("测试");
        let result = executor.execute(batch(input.clone()), &context, 0).await;

        assert_eq!(result.len(), 10);
        let calls = generator.calls();
        assert_eq!(calls[0].len(), 10);
        // 剩余 4 个按 max(3, 4/2) = 3 拆分
        let mut retry_sizes: Vec<usize> = calls[1..].iter().map(Vec::len).collect();
        retry_sizes.sort_unstable();
        assert_eq!(retry_sizes, vec![1, 3]);
        for call in &calls[1..] {
            for term in call {
                assert!(input[6..].contains(term), "重试只应包含缺失的术语");
            }
        }
        assert!((selector.metric(10).unwrap().success_rate - 0.6).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_total_failure_gives_up_after_budget() {
        let generator =
            ScriptedGenerator::new(|_, _| Err(AppError::service("服务不可用")));
        let (executor, cache, selector) = build_executor(generator.clone());

        let context = SubjectContext::new("测试");
        let result = executor.execute(batch(terms(8)), &context, 0).await;

        assert!(result.is_empty());
        assert!(cache.is_empty());

        // 深度 0: 8 → 深度 1: 4 + 4 → 深度 2: (3 + 1) × 2
        let mut sizes: Vec<usize> = generator.calls().iter().map(Vec::len).collect();
        sizes.sort_unstable();
        assert_eq!(sizes, vec![1, 1, 3, 3, 4, 4, 8]);
        assert_eq!(selector.metric(8).unwrap().success_rate, 0.0);
        // 子批次不计入候选统计
        assert_eq!(selector.snapshot().len(), 1);
    }

    #[tokio::test]
    async fn test_metrics_use_planned_size_not_length() {
        let generator = ScriptedGenerator::new(|terms, _| Ok(explain_all(terms)));
        let (executor, _, selector) = build_executor(generator);
        let context = SubjectContext::new("测试");

        // 剩余 6 个术语，但这一批是为候选大小 12 规划的
        let short = Batch::new(BatchId::root(1), terms(6)).with_planned_size(12);
        executor.execute(short, &context, 0).await;

        let first = Batch::new(BatchId::root(0), terms(10)[6..].to_vec());
        executor.execute(first, &context, 0).await;

        let snapshot = selector.snapshot();
        assert_eq!(snapshot.keys().copied().collect::<Vec<_>>(), vec![12]);
        assert_eq!(snapshot[&12].total_terms_observed, 6);
    }

    #[tokio::test]
    async fn test_empty_responses_terminate() {
        let generator = ScriptedGenerator::new(|_, _| Ok(ExplanationMap::new()));
        let (executor, _, _) = build_executor(generator.clone());

        let context = SubjectContext::new("测试");
        let result = executor.execute(batch(terms(8)), &context, 0).await;

        assert!(result.is_empty());
        // 最多 2^(r+1) - 1 次调用
        assert!(generator.calls().len() <= 7);
    }

    #[tokio::test]
    async fn test_min_size_batch_is_not_split() {
        let generator =
            ScriptedGenerator::new(|_, _| Err(AppError::service("服务不可用")));
        let (executor, _, _) = build_executor(generator.clone());

        let context = SubjectContext::new("测试");
        executor.execute(batch(terms(3)), &context, 0).await;

        assert_eq!(generator.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_retry_success_on_total_failure() {
        let generator = ScriptedGenerator::new(|terms, call| {
            if call == 0 {
                Err(AppError::service("超时"))
            } else {
                Ok(explain_all(terms))
            }
        });
        let (executor, _, _) = build_executor(generator.clone());

        let context = SubjectContext::new("测试");
        let result = executor.execute(batch(terms(8)), &context, 0).await;

        assert_eq!(result.len(), 8);
        assert_eq!(generator.calls().len(), 3);
    }

    #[test]
    fn test_retry_policy() {
        let policy = RetryPolicy {
            max_retries: 2,
            min_batch_size: 3,
        };
        assert!(policy.can_split(0, 4));
        assert!(!policy.can_split(0, 3));
        assert!(!policy.can_split(2, 10));
        assert_eq!(policy.sub_batch_size(10), 5);
        assert_eq!(policy.sub_batch_size(4), 3);
    }
}
