//! 每轮模型指令：从提取出的 JSON 对象宽松地构造
//!
//! 缺失字段取默认值（无 memory_updates / tool_calls 视为空列表，无状态视为进行中），
//! 格式不对的条目跳过并记日志，非字符串标量转成字符串。不会因为形状问题拒绝整条指令。

use serde_json::{Map, Value};

use crate::memory::{BlockOperation, ImportantLink, RoundUpdate, TaskStatus};
use crate::tools::ToolCall;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct RoundCommand {
    pub status: Option<TaskStatus>,
    pub memory_updates: Vec<BlockOperation>,
    pub tool_calls: Vec<ToolCall>,
    pub answer: Option<String>,
    pub important_links: Option<Vec<ImportantLink>>,
}

impl RoundCommand {
    pub fn from_object(obj: &Map<String, Value>) -> Self {
        let status = obj
            .get("status_update")
            .or_else(|| obj.get("status"))
            .and_then(value_to_text)
            .map(|s| TaskStatus::from_token(&s));

        let memory_updates = match obj.get("memory_updates") {
            Some(Value::Array(items)) => items.iter().filter_map(parse_block_op).collect(),
            Some(Value::Null) | None => {
                tracing::debug!("response has no memory_updates, defaulting to empty");
                Vec::new()
            }
            Some(other) => {
                tracing::warn!(value = %other, "memory_updates is not a list, ignored");
                Vec::new()
            }
        };

        let tool_calls = match obj.get("tool_calls") {
            Some(Value::Array(items)) => items.iter().filter_map(parse_tool_call).collect(),
            Some(Value::Null) | None => {
                tracing::debug!("response has no tool_calls, defaulting to empty");
                Vec::new()
            }
            Some(other) => {
                tracing::warn!(value = %other, "tool_calls is not a list, ignored");
                Vec::new()
            }
        };

        let answer = obj
            .get("answer")
            .and_then(value_to_text)
            .filter(|a| !a.trim().is_empty());

        let important_links = match obj.get("important_links") {
            Some(Value::Array(items)) => Some(items.iter().filter_map(parse_link).collect()),
            _ => None,
        };

        Self {
            status,
            memory_updates,
            tool_calls,
            answer,
            important_links,
        }
    }

    /// 拆成工作区更新与本轮工具调用
    pub fn split(self) -> (RoundUpdate, Vec<ToolCall>) {
        let update = RoundUpdate {
            status: self.status,
            operations: self.memory_updates,
            answer: self.answer,
            important_links: self.important_links,
        };
        (update, self.tool_calls)
    }
}

/// 字符串原样返回，数字 / 布尔 / 复合值序列化为文本，null 视为缺失
fn value_to_text(v: &Value) -> Option<String> {
    match v {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(_) | Value::Bool(_) => Some(v.to_string()),
        Value::Array(_) | Value::Object(_) => serde_json::to_string(v).ok(),
    }
}

fn parse_block_op(item: &Value) -> Option<BlockOperation> {
    let Value::Object(op) = item else {
        tracing::warn!(item = %item, "memory update is not an object, skipped");
        return None;
    };
    let kind = op
        .get("operation")
        .and_then(Value::as_str)
        .map(|s| s.trim().to_lowercase())
        .unwrap_or_default();
    match kind.as_str() {
        "add" => match op.get("content").and_then(value_to_text) {
            Some(content) => Some(BlockOperation::Add { content }),
            None => {
                tracing::warn!("add operation without content, skipped");
                None
            }
        },
        "delete" => match op.get("id").and_then(value_to_text) {
            Some(id) => Some(BlockOperation::Delete {
                id: id.trim().to_string(),
            }),
            None => {
                tracing::warn!("delete operation without id, skipped");
                None
            }
        },
        other => {
            tracing::warn!(operation = %other, "unknown memory operation, skipped");
            None
        }
    }
}

fn parse_tool_call(item: &Value) -> Option<ToolCall> {
    let Value::Object(call) = item else {
        tracing::warn!(item = %item, "tool call is not an object, skipped");
        return None;
    };
    let Some(tool) = call.get("tool").and_then(value_to_text) else {
        tracing::warn!(item = %item, "tool call without tool name, skipped");
        return None;
    };
    let input = call.get("input").and_then(value_to_text).unwrap_or_default();
    Some(ToolCall::new(tool.trim(), input))
}

fn parse_link(item: &Value) -> Option<ImportantLink> {
    match item {
        Value::Object(link) => {
            let url = link.get("url").and_then(value_to_text)?;
            let title = link.get("title").and_then(value_to_text).unwrap_or_default();
            Some(ImportantLink { url, title })
        }
        Value::String(url) => Some(ImportantLink {
            url: url.clone(),
            title: String::new(),
        }),
        _ => None,
    }
}
