//! 工具注册表
//!
//! 所有工具实现 Tool trait（name / description / execute），由 ToolRegistry 按名注册与查找；
//! ToolExecutor 在调用时加超时、并发分发并统一把失败转成文本结果。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

/// 工具 trait：名称、描述（写入 prompt）、异步执行
///
/// input 为模型给出的自由文本（搜索词 / URL），context 为共享上下文（当前任务描述）。
#[async_trait]
pub trait Tool: Send + Sync {
    /// 工具名称（对应 JSON 中的 "tool" 字段）
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    async fn execute(&self, input: &str, context: Option<&str>) -> Result<String, String>;
}

/// 工具注册表：按名称存储 Arc<dyn Tool>，注册集合即模型可用的封闭工具集
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: impl Tool + 'static) {
        let name = tool.name().to_string();
        self.tools.insert(name, Arc::new(tool));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// 按名称排序，保证 prompt 渲染稳定
    pub fn tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// 返回 (name, description) 列表，用于生成 prompt 中的可用工具段落
    pub fn tool_descriptions(&self) -> Vec<(String, String)> {
        self.tool_names()
            .into_iter()
            .filter_map(|name| {
                self.tools
                    .get(&name)
                    .map(|tool| (name.clone(), tool.description().to_string()))
            })
            .collect()
    }
}
