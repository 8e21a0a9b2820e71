//! Mock LLM 客户端（用于测试与无 API Key 的本地演示）
//!
//! 按顺序返回预设回复；预设用完后回显最后一条 User 消息的开头，并给出 DONE 指令，
//! 使研究循环在一轮内结束。

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::{LlmClient, LlmError};
use crate::memory::{Message, Role};

/// 回显时截取的最大字符数
const ECHO_PREVIEW_CHARS: usize = 80;

#[derive(Debug, Default)]
pub struct MockLlmClient {
    script: Mutex<VecDeque<Result<String, LlmError>>>,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// 按顺序返回给定回复
    pub fn scripted<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_results(responses.into_iter().map(|r| Ok(r.into())))
    }

    /// 可混入错误的脚本（模拟网络故障等）
    pub fn with_results(results: impl IntoIterator<Item = Result<String, LlmError>>) -> Self {
        Self {
            script: Mutex::new(results.into_iter().collect()),
            ..Self::default()
        }
    }

    /// 已被调用次数
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// 每次调用收到的最后一条 User 消息
    pub fn prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .map(|p| p.clone())
            .unwrap_or_default()
    }

    fn default_reply(last_user: &str) -> String {
        let preview: String = last_user.chars().take(ECHO_PREVIEW_CHARS).collect();
        serde_json::json!({
            "status_update": "DONE",
            "memory_updates": [],
            "tool_calls": [],
            "answer": format!("Echo from Mock: {preview}"),
            "important_links": []
        })
        .to_string()
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let last_user = messages
            .iter()
            .rev()
            .find(|m| matches!(m.role, Role::User))
            .map(|m| m.content.as_str())
            .unwrap_or("(no input)");

        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(last_user.to_string());
        }

        let next = self.script.lock().ok().and_then(|mut s| s.pop_front());
        match next {
            Some(result) => result,
            None => Ok(Self::default_reply(last_user)),
        }
    }
}
