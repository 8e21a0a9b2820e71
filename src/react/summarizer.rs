//! 兜底摘要：轮次预算用尽仍未完成时，把工作区快照交给模型一次，得到尽力而为的最终答案
//!
//! 不修改工作区，不重试；模型调用失败即为本次运行的终止错误。

use std::sync::Arc;
use std::time::Duration;

use crate::core::AgentError;
use crate::llm::{LlmClient, LlmError};
use crate::memory::Message;
use crate::react::prompts::{render_template, SUMMARY_PROMPT};

pub struct FallbackSummarizer {
    llm: Arc<dyn LlmClient>,
    template: String,
    request_timeout: Duration,
}

impl FallbackSummarizer {
    pub fn new(llm: Arc<dyn LlmClient>, template: impl Into<String>) -> Self {
        Self {
            llm,
            template: template.into(),
            request_timeout: Duration::from_secs(300),
        }
    }

    pub fn with_default_prompt(llm: Arc<dyn LlmClient>) -> Self {
        Self::new(llm, SUMMARY_PROMPT)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// workspace_render：Workspace::render() 的输出
    pub async fn summarize(&self, workspace_render: &str) -> Result<String, AgentError> {
        let prompt = render_template(&self.template, &[("content", workspace_render)]);
        let messages = vec![Message::user(prompt.trim().to_string())];
        let result = tokio::time::timeout(self.request_timeout, self.llm.complete(&messages))
            .await
            .unwrap_or(Err(LlmError::Timeout(self.request_timeout.as_secs())));
        match result {
            Ok(answer) => {
                tracing::info!(chars = answer.chars().count(), "fallback summary produced");
                Ok(answer)
            }
            Err(e) => {
                tracing::error!(error = %e, "fallback summarizer failed");
                Err(AgentError::SummarizerFailed(e))
            }
        }
    }
}
