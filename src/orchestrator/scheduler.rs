//! 调度器 - 编排层
//!
//! ## 职责
//!
//! 把一组术语变成一条逐步填充的解释事件流。
//!
//! ## 核心流程
//!
//! 1. **规划**：向选择器要批次大小，交给规划器切分
//! 2. **第一批**：原地等待第一批完成，尽快给调用方第一批结果
//! 3. **其余批次**：最多 `concurrency_limit` 个同时在途，相邻启动之间间隔
//!    `launch_delay`，避免瞬间打满限流
//! 4. **汇总**：每个批次完成后合并结果、推送一次进度
//! 5. **结束**：所有批次（含重试子批次）结束后进入 `DONE`，
//!    即使仍有术语未解决
//!
//! 调用方丢弃事件接收端即视为放弃本次运行：不再启动新批次，
//! 已启动的批次继续跑完（结果仍会写入缓存）。

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, watch};
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tracing::{debug, error, info};

use crate::config::Config;
use crate::error::{AppError, AppResult, TermListError};
use crate::infrastructure::KeyValueStore;
use crate::models::{
    merge_explanations, Batch, ExplanationMap, Progress, RunEvent, RunState, SubjectContext, Term,
};
use crate::services::{
    BatchPlanner, BatchSizeSelector, ExplanationCache, ExplanationGenerator, SelectorSettings,
};
use crate::utils::logging::{log_progress, log_run_start, print_final_stats};
use crate::workflow::{BatchExecutor, RetryPolicy};

/// 调度参数
#[derive(Debug, Clone, Copy)]
pub struct SchedulerSettings {
    /// 同时在途的批次上限（不含第一批）
    pub concurrency_limit: usize,
    /// 相邻两次启动之间的间隔
    pub launch_delay: Duration,
}

impl SchedulerSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            concurrency_limit: config.concurrency_limit.max(1),
            launch_delay: Duration::from_millis(config.launch_delay_ms),
        }
    }
}

/// 调度器
///
/// 缓存与批次统计由所有运行共享，同一个调度器可以同时驱动多次运行。
pub struct Scheduler {
    executor: Arc<BatchExecutor>,
    planner: BatchPlanner,
    settings: SchedulerSettings,
}

impl Scheduler {
    pub fn new(executor: Arc<BatchExecutor>, planner: BatchPlanner, settings: SchedulerSettings) -> Self {
        Self {
            executor,
            planner,
            settings,
        }
    }

    /// 按配置组装缓存、选择器、执行器与规划器
    pub fn from_config(
        config: &Config,
        generator: Arc<dyn ExplanationGenerator>,
        store: Arc<dyn KeyValueStore>,
    ) -> AppResult<Self> {
        config.validate()?;

        let cache = Arc::new(ExplanationCache::load(store.clone()));
        let selector = Arc::new(BatchSizeSelector::new(
            SelectorSettings::from_config(config),
            store,
        ));
        let executor = Arc::new(BatchExecutor::new(
            generator,
            cache,
            selector,
            RetryPolicy::from_config(config),
        ));

        Ok(Self::new(
            executor,
            BatchPlanner::new(config.first_batch_size),
            SchedulerSettings::from_config(config),
        ))
    }

    pub fn executor(&self) -> &Arc<BatchExecutor> {
        &self.executor
    }

    pub fn cache(&self) -> &Arc<ExplanationCache> {
        self.executor.cache()
    }

    pub fn selector(&self) -> &Arc<BatchSizeSelector> {
        self.executor.selector()
    }

    /// 开始一次运行
    ///
    /// 术语列表有误时立即返回错误，不会发起任何生成请求。
    /// 必须在 tokio 运行时中调用。
    pub fn run(&self, terms: Vec<Term>, context: SubjectContext) -> AppResult<RunHandle> {
        let terms = validate_terms(terms)?;
        let (state_tx, state_rx) = watch::channel(RunState::Idle);

        state_tx.send_replace(RunState::Planning);
        let remaining = terms.len().saturating_sub(self.planner.first_batch_size());
        let choice = self.executor.selector().choose(remaining);
        let batches = self.planner.plan_for(&terms, choice);
        log_run_start(terms.len(), batches.len(), choice.size);

        // 每个批次至多一次事件，容量足够时发送端永不阻塞
        let (event_tx, event_rx) = mpsc::channel(batches.len().max(1));

        let driver = RunDriver {
            executor: self.executor.clone(),
            settings: self.settings,
            context,
            events: event_tx,
            state: state_tx,
            accumulated: ExplanationMap::new(),
            completed: 0,
            total: batches.len(),
            term_count: terms.len(),
            abandoned: false,
        };
        let task = tokio::spawn(driver.drive(batches));

        Ok(RunHandle {
            events: event_rx,
            state: state_rx,
            task,
        })
    }
}

/// 检查调用方传入的术语列表
///
/// 空白术语视为调用方错误；完全相同的术语只保留第一次出现。
fn validate_terms(terms: Vec<Term>) -> AppResult<Vec<Term>> {
    if let Some(index) = terms.iter().position(|t| t.trim().is_empty()) {
        return Err(TermListError::BlankTerm { index }.into());
    }

    let mut seen = HashSet::with_capacity(terms.len());
    let original_len = terms.len();
    let unique: Vec<Term> = terms
        .into_iter()
        .filter(|term| seen.insert(term.clone()))
        .collect();

    if unique.len() < original_len {
        debug!("去除 {} 个重复术语", original_len - unique.len());
    }

    Ok(unique)
}

/// 一次运行的句柄
pub struct RunHandle {
    events: mpsc::Receiver<RunEvent>,
    state: watch::Receiver<RunState>,
    task: JoinHandle<ExplanationMap>,
}

impl RunHandle {
    /// 等待下一次进度事件，运行结束后返回 `None`
    pub async fn next_event(&mut self) -> Option<RunEvent> {
        self.events.recv().await
    }

    /// 当前运行状态
    pub fn state(&self) -> RunState {
        *self.state.borrow()
    }

    /// 订阅运行状态变化
    pub fn watch_state(&self) -> watch::Receiver<RunState> {
        self.state.clone()
    }

    /// 读完剩余事件并返回最终结果
    pub async fn finish(mut self) -> AppResult<ExplanationMap> {
        while self.events.recv().await.is_some() {}
        self.task.await.map_err(run_aborted)
    }

    /// 收集全部事件与最终结果
    pub async fn collect(mut self) -> AppResult<(Vec<RunEvent>, ExplanationMap)> {
        let mut events = Vec::new();
        while let Some(event) = self.events.recv().await {
            events.push(event);
        }
        let explanations = self.task.await.map_err(run_aborted)?;
        Ok((events, explanations))
    }

    /// 拆成事件接收端、状态订阅与最终结果
    ///
    /// 丢弃事件接收端即放弃本次运行。
    pub fn into_parts(
        self,
    ) -> (
        mpsc::Receiver<RunEvent>,
        watch::Receiver<RunState>,
        JoinHandle<ExplanationMap>,
    ) {
        (self.events, self.state, self.task)
    }
}

fn run_aborted(e: JoinError) -> AppError {
    AppError::RunAborted(e.to_string())
}

/// 单次运行的驱动状态，只存在于后台任务中
struct RunDriver {
    executor: Arc<BatchExecutor>,
    settings: SchedulerSettings,
    context: SubjectContext,
    events: mpsc::Sender<RunEvent>,
    state: watch::Sender<RunState>,
    accumulated: ExplanationMap,
    completed: usize,
    total: usize,
    term_count: usize,
    abandoned: bool,
}

impl RunDriver {
    async fn drive(mut self, batches: Vec<Batch>) -> ExplanationMap {
        let started = Instant::now();
        let mut pending = batches.into_iter().peekable();

        // ========== 第一批：原地等待 ==========
        match pending.next() {
            Some(first) => {
                self.set_state(RunState::FirstBatchRunning);
                let result = self.executor.execute(first, &self.context, 0).await;
                self.complete_batch(result).await;
            }
            None => {
                // 空列表也要给出一次 100% 的结束事件
                self.emit().await;
            }
        }

        // ========== 其余批次：有界并发 ==========
        self.set_state(RunState::RemainingBatchesRunning);
        let mut in_flight: JoinSet<ExplanationMap> = JoinSet::new();

        while let Some(batch) = pending.next() {
            if self.check_abandoned() {
                break;
            }

            while in_flight.len() >= self.settings.concurrency_limit {
                self.join_next(&mut in_flight).await;
            }
            if self.check_abandoned() {
                break;
            }

            debug!("[批次 {}] 启动 ({} 个术语)", batch.id, batch.len());
            let executor = self.executor.clone();
            let context = self.context.clone();
            in_flight.spawn(async move { executor.execute(batch, &context, 0).await });

            if pending.peek().is_some() {
                self.pause_between_launches(&mut in_flight).await;
            }
        }

        if self.abandoned {
            info!(
                "调用方已放弃本次运行，{} 个在途批次将在后台完成",
                in_flight.len()
            );
            in_flight.detach_all();
        } else {
            while !in_flight.is_empty() {
                self.join_next(&mut in_flight).await;
            }
        }

        self.set_state(RunState::Done);
        print_final_stats(
            self.accumulated.len(),
            self.term_count,
            started.elapsed().as_millis(),
        );

        self.accumulated
    }

    /// 启动间隔内顺便收取已完成的批次，让进度及时推送
    async fn pause_between_launches(&mut self, in_flight: &mut JoinSet<ExplanationMap>) {
        let pause = tokio::time::sleep(self.settings.launch_delay);
        tokio::pin!(pause);

        loop {
            tokio::select! {
                _ = &mut pause => break,
                Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                    self.on_joined(joined).await;
                }
            }
        }
    }

    async fn join_next(&mut self, in_flight: &mut JoinSet<ExplanationMap>) {
        if let Some(joined) = in_flight.join_next().await {
            self.on_joined(joined).await;
        }
    }

    async fn on_joined(&mut self, joined: Result<ExplanationMap, JoinError>) {
        match joined {
            Ok(result) => self.complete_batch(result).await,
            Err(e) => {
                // 批次任务崩溃时按空结果计入进度，保证运行能结束
                error!("批次任务执行失败: {}", e);
                self.complete_batch(ExplanationMap::new()).await;
            }
        }
    }

    async fn complete_batch(&mut self, result: ExplanationMap) {
        merge_explanations(&mut self.accumulated, result);
        self.completed += 1;
        self.emit().await;
    }

    async fn emit(&mut self) {
        let progress = Progress::new(self.completed, self.total);
        log_progress(&progress, self.accumulated.len(), self.term_count);

        if self.abandoned {
            return;
        }

        let event = RunEvent {
            explanations: self.accumulated.clone(),
            progress,
        };
        if self.events.send(event).await.is_err() {
            self.abandoned = true;
        }
    }

    fn check_abandoned(&mut self) -> bool {
        if self.events.is_closed() {
            self.abandoned = true;
        }
        self.abandoned
    }

    fn set_state(&self, state: RunState) {
        debug!("运行状态 → {}", state);
        self.state.send_replace(state);
    }
}
