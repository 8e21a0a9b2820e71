//! Planner：渲染研究 prompt 并调用模型
//!
//! 每轮只发送一条 User 消息（模板 + 任务 + 工作区快照 + 上一轮工具结果），不携带对话历史。
//! 模型调用包在 tokio::time::timeout 中，超时转为 LlmError::Timeout。

use std::sync::Arc;
use std::time::Duration;

use crate::core::AgentError;
use crate::llm::{LlmClient, LlmError};
use crate::memory::Message;
use crate::react::prompts::{format_tool_records, format_tools, render_template, RESEARCH_PROMPT};
use crate::react::schema::round_command_schema_json;
use crate::tools::ToolCallRecord;

/// 渲染一轮 prompt 所需的上下文
#[derive(Debug, Clone, Copy)]
pub struct PromptContext<'a> {
    pub task: &'a str,
    pub current_date: &'a str,
    pub workspace: &'a str,
    pub tool_records: Option<&'a [ToolCallRecord]>,
}

pub struct Planner {
    llm: Arc<dyn LlmClient>,
    template: String,
    request_timeout: Duration,
    max_tool_calls: usize,
    tools: Vec<(String, String)>,
    response_schema: String,
}

impl Planner {
    pub fn new(llm: Arc<dyn LlmClient>, template: impl Into<String>) -> Self {
        Self {
            llm,
            template: template.into(),
            request_timeout: Duration::from_secs(300),
            max_tool_calls: 3,
            tools: Vec::new(),
            response_schema: round_command_schema_json(),
        }
    }

    /// 使用内置研究模板
    pub fn with_default_prompt(llm: Arc<dyn LlmClient>) -> Self {
        Self::new(llm, RESEARCH_PROMPT)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_max_tool_calls(mut self, n: usize) -> Self {
        self.max_tool_calls = n;
        self
    }

    /// (name, description) 列表，渲染进可用工具段落
    pub fn with_tools(mut self, tools: Vec<(String, String)>) -> Self {
        self.tools = tools;
        self
    }

    pub fn max_tool_calls(&self) -> usize {
        self.max_tool_calls
    }

    /// 获取 LLM 累计 token 使用统计
    pub fn token_usage(&self) -> (u64, u64, u64) {
        self.llm.token_usage()
    }

    pub fn render_prompt(&self, ctx: &PromptContext<'_>) -> String {
        let tool_records = format_tool_records(ctx.tool_records);
        let tools = format_tools(&self.tools);
        let max_tool_calls = self.max_tool_calls.to_string();
        render_template(
            &self.template,
            &[
                ("current_date", ctx.current_date),
                ("task", ctx.task.trim()),
                ("workspace", ctx.workspace),
                ("tool_records", tool_records.as_str()),
                ("response_schema", self.response_schema.as_str()),
                ("tools", tools.as_str()),
                ("max_tool_calls", max_tool_calls.as_str()),
            ],
        )
        .trim()
        .to_string()
    }

    /// 发送已渲染的 prompt，返回模型原始文本
    pub async fn plan(&self, prompt: &str) -> Result<String, AgentError> {
        let messages = vec![Message::user(prompt.to_string())];
        match tokio::time::timeout(self.request_timeout, self.llm.complete(&messages)).await {
            Ok(result) => result.map_err(AgentError::LlmError),
            Err(_) => Err(AgentError::LlmError(LlmError::Timeout(
                self.request_timeout.as_secs(),
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmClient;
    use crate::tools::ToolCallStatus;
    use async_trait::async_trait;

    struct HangingLlm;

    #[async_trait]
    impl LlmClient for HangingLlm {
        async fn complete(&self, _messages: &[Message]) -> Result<String, LlmError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(String::new())
        }
    }

    #[test]
    fn test_render_prompt_fills_placeholders() {
        let planner = Planner::with_default_prompt(Arc::new(MockLlmClient::new()))
            .with_tools(vec![("search".to_string(), "web search".to_string())]);
        let records = vec![ToolCallRecord {
            tool: "search".to_string(),
            input: "singapore bookshops".to_string(),
            output: "Title: Woods".to_string(),
            status: ToolCallStatus::Ok,
        }];
        let prompt = planner.render_prompt(&PromptContext {
            task: "  plan a trip  ",
            current_date: "2025-05-01",
            workspace: "Status: IN_PROGRESS\nMemory: \n... no memory blocks ...\n",
            tool_records: Some(&records),
        });
        assert!(prompt.starts_with("Date: `2025-05-01`."));
        assert!(prompt.contains("```\nplan a trip\n```"));
        assert!(prompt.contains("Source 1: search: singapore bookshops"));
        assert!(prompt.contains("- **search**: web search"));
        assert!(prompt.contains("at most 3 tool calls"));
        assert!(prompt.contains("\"status_update\""));
        assert!(!prompt.contains("{tool_records}"));
    }

    #[test]
    fn test_first_round_marker() {
        let planner = Planner::with_default_prompt(Arc::new(MockLlmClient::new()));
        let prompt = planner.render_prompt(&PromptContext {
            task: "t",
            current_date: "2025-05-01",
            workspace: "",
            tool_records: None,
        });
        assert!(prompt.contains("... no previous tool results ..."));
    }

    #[tokio::test]
    async fn test_plan_sends_single_user_message() {
        let mock = Arc::new(MockLlmClient::scripted(["raw output"]));
        let planner = Planner::new(mock.clone(), "{task}");
        assert_eq!(planner.plan("hello").await.unwrap(), "raw output");
        assert_eq!(mock.prompts(), vec!["hello".to_string()]);
    }

    #[tokio::test]
    async fn test_plan_timeout() {
        let planner = Planner::new(Arc::new(HangingLlm), "{task}")
            .with_timeout(Duration::from_millis(20));
        let err = planner.plan("x").await.unwrap_err();
        assert!(matches!(err, AgentError::LlmError(LlmError::Timeout(_))));
    }
}
