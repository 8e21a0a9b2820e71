//! 每轮响应格式的 JSON Schema（schemars 生成），拼入研究 prompt，减少模型输出格式错误

use schemars::{schema_for, JsonSchema};

/// 模型每轮必须输出的对象（仅用于 Schema 生成，实际解析见 RoundCommand）
#[allow(dead_code)]
#[derive(JsonSchema)]
struct RoundCommandFormat {
    /// "IN_PROGRESS" 或 "DONE"
    status_update: String,
    /// 按顺序执行的记忆块操作
    memory_updates: Vec<MemoryUpdateFormat>,
    /// 本轮工具调用，数量上限见 prompt 说明
    tool_calls: Vec<ToolCallFormat>,
    /// 仅在 DONE 时给出：最终完整答案
    answer: Option<String>,
    /// 仅在 DONE 时给出：支撑答案的重要链接
    important_links: Option<Vec<LinkFormat>>,
}

#[allow(dead_code)]
#[derive(JsonSchema)]
struct MemoryUpdateFormat {
    /// "add" 或 "delete"
    operation: String,
    /// add：新块内容（ID 由系统分配）
    content: Option<String>,
    /// delete：要删除的块 ID，如 abc-123
    id: Option<String>,
}

#[allow(dead_code)]
#[derive(JsonSchema)]
struct ToolCallFormat {
    /// "search" 或 "scrape"
    tool: String,
    /// 搜索词或 URL
    input: String,
}

#[allow(dead_code)]
#[derive(JsonSchema)]
struct LinkFormat {
    url: String,
    title: String,
}

/// 返回响应格式的 JSON Schema 字符串
pub fn round_command_schema_json() -> String {
    let schema = schema_for!(RoundCommandFormat);
    serde_json::to_string_pretty(&schema).unwrap_or_default()
}
