//! 研究过程事件：供 CLI / 前端展示轮次进度、模型输出、记忆变更、工具调用与恢复动作

use serde::Serialize;

use crate::core::{LoopExit, RoundPhase};
use crate::memory::TaskStatus;

/// 单步过程事件（可序列化为 JSON 供前端展示）
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResearchEvent {
    /// 新一轮开始（round 从 1 开始）
    RoundStarted { round: usize, max_rounds: Option<usize> },
    /// 状态机切换
    Phase { round: usize, phase: RoundPhase },
    /// 模型输出（预览，避免过长）
    ModelOutput { round: usize, preview: String },
    /// 工作区已应用本轮更新
    MemoryUpdated {
        round: usize,
        status: TaskStatus,
        added: Vec<String>,
        deleted: Vec<String>,
        blocks: usize,
    },
    ToolCall { round: usize, tool: String, input: String },
    /// 工具返回（预览）
    Observation {
        round: usize,
        tool: String,
        ok: bool,
        preview: String,
    },
    /// 错误恢复动作（retry_round / end_run / abort）
    Recovery { action: String, detail: String },
    Finished { exit: LoopExit, rounds: usize },
    Error { text: String },
}
