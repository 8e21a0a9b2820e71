//! LLM 客户端抽象
//!
//! 所有后端（OpenAI 兼容 / OpenRouter / DeepSeek / Mock）实现 LlmClient；研究循环只依赖该 trait，
//! 由调用方注入具体实例，测试中替换为 MockLlmClient。

use async_trait::async_trait;
use thiserror::Error;

use crate::memory::Message;

/// 模型后端错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LlmError {
    #[error("API error: {0}")]
    ApiError(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out after {0}s")]
    Timeout(u64),

    #[error("Rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("Empty response from model")]
    EmptyResponse,
}

/// LLM 客户端 trait：单次非流式完成
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError>;

    /// 累计 token 使用统计：(prompt_tokens, completion_tokens, total_tokens)
    /// 默认返回 (0, 0, 0)，具体实现可覆盖
    fn token_usage(&self) -> (u64, u64, u64) {
        (0, 0, 0)
    }
}
