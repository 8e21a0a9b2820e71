//! Agent 错误类型与恢复动作
//!
//! 与 RecoveryEngine 配合：根据 AgentError 决定 RetryRound / EndRun / Abort。

use std::time::Duration;

use thiserror::Error;

use crate::llm::LlmError;

/// 研究运行过程中可能出现的错误
#[derive(Error, Debug)]
pub enum AgentError {
    /// 模型输出中找不到可解析的指令对象（临时性格式错误）
    #[error("JSON parse error: {0}")]
    JsonParseError(String),

    #[error("LLM error: {0}")]
    LlmError(#[from] LlmError),

    #[error("Tool execution failed: {0}")]
    ToolExecutionFailed(String),

    #[error("Tool timeout: {0}")]
    ToolTimeout(String),

    #[error("Illegal tool: {0}")]
    IllegalTool(String),

    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("Missing credentials: {0}")]
    MissingCredentials(String),

    /// 兜底摘要自身失败，运行以错误结束
    #[error("Fallback summarizer failed: {0}")]
    SummarizerFailed(LlmError),
}

impl AgentError {
    /// 启动配置类错误：不重试，直接交给调用方
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            AgentError::ConfigError(_)
                | AgentError::MissingCredentials(_)
                | AgentError::SummarizerFailed(_)
        )
    }
}

impl From<config::ConfigError> for AgentError {
    fn from(e: config::ConfigError) -> Self {
        AgentError::ConfigError(e.to_string())
    }
}

/// 恢复引擎根据错误类型给出的建议动作
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryAction {
    /// 等待后重跑同一轮（不推进轮次计数）
    RetryRound(Duration),
    /// 重试次数用尽：结束循环，走兜底摘要
    EndRun,
    /// 终止运行并向调用方报告错误
    Abort,
}
