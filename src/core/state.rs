//! 轮次状态机
//!
//! AwaitingModel -> Parsing -> ApplyingMemory -> DispatchingTools -> (下一轮或 Terminated)。
//! 研究循环在每次切换时写日志并推送事件。

use std::fmt;

use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundPhase {
    AwaitingModel,
    Parsing,
    ApplyingMemory,
    DispatchingTools,
    Terminated,
}

impl fmt::Display for RoundPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RoundPhase::AwaitingModel => "awaiting_model",
            RoundPhase::Parsing => "parsing",
            RoundPhase::ApplyingMemory => "applying_memory",
            RoundPhase::DispatchingTools => "dispatching_tools",
            RoundPhase::Terminated => "terminated",
        };
        f.write_str(s)
    }
}

/// 循环结束原因
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopExit {
    /// 工作区状态为 DONE
    Done,
    /// 达到轮次预算
    BudgetExhausted,
    /// 单步模式下已执行一轮
    SingleStep,
    /// 同一轮的重试次数用尽
    RetriesExhausted,
}

impl LoopExit {
    pub fn is_done(&self) -> bool {
        matches!(self, LoopExit::Done)
    }
}
