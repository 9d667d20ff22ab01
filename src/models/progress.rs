use std::fmt::{self, Display};

use super::term::ExplanationMap;

/// 批次级别的完成进度
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub total: usize,
    pub completed: usize,
    pub percentage: u8,
}

impl Progress {
    pub fn new(completed: usize, total: usize) -> Self {
        let percentage = if total == 0 {
            100
        } else {
            ((completed.min(total) * 100) / total) as u8
        };
        Self {
            total,
            completed,
            percentage,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.completed >= self.total
    }
}

/// 推送给调用方的一次进度事件
#[derive(Debug, Clone)]
pub struct RunEvent {
    /// 截至目前已就绪的解释
    pub explanations: ExplanationMap,
    pub progress: Progress,
}

/// 调度运行状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Planning,
    FirstBatchRunning,
    RemainingBatchesRunning,
    Done,
}

impl Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunState::Idle => "IDLE",
            RunState::Planning => "PLANNING",
            RunState::FirstBatchRunning => "FIRST_BATCH_RUNNING",
            RunState::RemainingBatchesRunning => "REMAINING_BATCHES_RUNNING",
            RunState::Done => "DONE",
        };
        write!(f, "{}", name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentage_rounds_down_until_complete() {
        assert_eq!(Progress::new(1, 3).percentage, 33);
        assert_eq!(Progress::new(2, 3).percentage, 66);
        assert_eq!(Progress::new(3, 3).percentage, 100);
    }

    #[test]
    fn test_empty_run_is_complete() {
        let progress = Progress::new(0, 0);
        assert!(progress.is_complete());
        assert_eq!(progress.percentage, 100);
    }
}
