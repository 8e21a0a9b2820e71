//! 工具执行器
//!
//! 持有 ToolRegistry 与单次调用超时。dispatch() 把一轮内的全部调用各自 spawn 为独立任务并发执行，
//! 结果按请求顺序返回；任何失败（未知工具、工具报错、超时、panic）都在单次调用边界转成文本结果，
//! 整批调用永远不会因为某一个失败而失败。每次调用输出结构化审计日志（JSON）。

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::time::timeout;

use crate::core::AgentError;
use crate::tools::ToolRegistry;

/// 审计日志中输入预览的最大字符数
const INPUT_PREVIEW_CHARS: usize = 200;

/// 模型请求的一次工具调用
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    pub tool: String,
    pub input: String,
}

impl ToolCall {
    pub fn new(tool: impl Into<String>, input: impl Into<String>) -> Self {
        Self {
            tool: tool.into(),
            input: input.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCallStatus {
    Ok,
    Failed,
}

/// 一次已执行调用的记录；失败调用的 output 是错误描述，下游与成功结果同样对待
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolCallRecord {
    pub tool: String,
    pub input: String,
    pub output: String,
    pub status: ToolCallStatus,
}

impl ToolCallRecord {
    pub fn is_ok(&self) -> bool {
        self.status == ToolCallStatus::Ok
    }
}

pub struct ToolExecutor {
    registry: Arc<ToolRegistry>,
    timeout: Duration,
}

impl ToolExecutor {
    pub fn new(registry: ToolRegistry, timeout_secs: u64) -> Self {
        Self::with_timeout(registry, Duration::from_secs(timeout_secs))
    }

    pub fn with_timeout(registry: ToolRegistry, timeout: Duration) -> Self {
        Self {
            registry: Arc::new(registry),
            timeout,
        }
    }

    pub fn tool_descriptions(&self) -> Vec<(String, String)> {
        self.registry.tool_descriptions()
    }

    /// 并发执行一轮内的全部调用，返回与 calls 一一对应、顺序一致的记录
    pub async fn dispatch(&self, calls: &[ToolCall], context: Option<&str>) -> Vec<ToolCallRecord> {
        let handles: Vec<_> = calls
            .iter()
            .map(|call| {
                let registry = Arc::clone(&self.registry);
                let limit = self.timeout;
                let tool = call.tool.clone();
                let input = call.input.clone();
                let context = context.map(str::to_string);
                tokio::spawn(async move {
                    run_call(&registry, limit, &tool, &input, context.as_deref()).await
                })
            })
            .collect();

        let results = join_all(handles).await;

        calls
            .iter()
            .zip(results)
            .map(|(call, joined)| {
                let (output, status) = match joined {
                    Ok(Ok(output)) => (output, ToolCallStatus::Ok),
                    Ok(Err(e)) => (failure_text(&e), ToolCallStatus::Failed),
                    Err(join_err) => {
                        tracing::error!(tool = %call.tool, error = %join_err, "tool task aborted");
                        audit(&call.tool, false, "panic", 0, &call.input);
                        (
                            format!("Tool execution failed: {join_err}"),
                            ToolCallStatus::Failed,
                        )
                    }
                };
                ToolCallRecord {
                    tool: call.tool.clone(),
                    input: call.input.clone(),
                    output,
                    status,
                }
            })
            .collect()
    }
}

/// 执行单个调用；未知工具返回 IllegalTool，超时返回 ToolTimeout，工具报错转为 ToolExecutionFailed
async fn run_call(
    registry: &ToolRegistry,
    limit: Duration,
    tool_name: &str,
    input: &str,
    context: Option<&str>,
) -> Result<String, AgentError> {
    let start = Instant::now();
    let Some(tool) = registry.get(tool_name) else {
        tracing::warn!(tool = %tool_name, "model requested an unregistered tool");
        audit(tool_name, false, "illegal_tool", 0, input);
        return Err(AgentError::IllegalTool(tool_name.to_string()));
    };

    let result = timeout(limit, tool.execute(input, context)).await;

    let (ok, outcome) = match &result {
        Ok(Ok(_)) => (true, "ok"),
        Ok(Err(_)) => (false, "error"),
        Err(_) => (false, "timeout"),
    };
    audit(
        tool_name,
        ok,
        outcome,
        start.elapsed().as_millis() as u64,
        input,
    );

    match result {
        Ok(Ok(content)) => Ok(content),
        Ok(Err(e)) => Err(AgentError::ToolExecutionFailed(e)),
        Err(_) => Err(AgentError::ToolTimeout(tool_name.to_string())),
    }
}

/// 失败调用的文本结果（会原样进入下一轮 prompt）
fn failure_text(err: &AgentError) -> String {
    match err {
        AgentError::ToolExecutionFailed(msg) => format!("Tool execution failed: {msg}"),
        other => format!("Tool execution failed: {other}"),
    }
}

fn audit(tool: &str, ok: bool, outcome: &str, duration_ms: u64, input: &str) {
    let audit = serde_json::json!({
        "event": "tool_audit",
        "tool": tool,
        "ok": ok,
        "outcome": outcome,
        "duration_ms": duration_ms,
        "input_preview": input_preview(input),
    });
    tracing::info!(audit = %audit.to_string(), "tool");
}

fn input_preview(input: &str) -> String {
    if input.chars().count() > INPUT_PREVIEW_CHARS {
        format!("{}...", input.chars().take(INPUT_PREVIEW_CHARS).collect::<String>())
    } else {
        input.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::Tool;
    use async_trait::async_trait;
    use tokio::sync::Barrier;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "search"
        }

        fn description(&self) -> &str {
            "echo"
        }

        async fn execute(&self, input: &str, context: Option<&str>) -> Result<String, String> {
            if input == "boom" {
                return Err("provider exploded".to_string());
            }
            Ok(format!("{input}|{}", context.unwrap_or("-")))
        }
    }

    struct SlowTool;

    #[async_trait]
    impl Tool for SlowTool {
        fn name(&self) -> &str {
            "scrape"
        }

        fn description(&self) -> &str {
            "sleeps for the number of milliseconds given as input"
        }

        async fn execute(&self, input: &str, _context: Option<&str>) -> Result<String, String> {
            let ms: u64 = input.parse().map_err(|_| "bad input".to_string())?;
            tokio::time::sleep(Duration::from_millis(ms)).await;
            Ok(format!("slept {ms}"))
        }
    }

    struct PanicTool;

    #[async_trait]
    impl Tool for PanicTool {
        fn name(&self) -> &str {
            "panic"
        }

        fn description(&self) -> &str {
            "always panics"
        }

        async fn execute(&self, _input: &str, _context: Option<&str>) -> Result<String, String> {
            panic!("tool bug")
        }
    }

    /// 所有调用必须同时在途才能越过屏障
    struct BarrierTool(Arc<Barrier>);

    #[async_trait]
    impl Tool for BarrierTool {
        fn name(&self) -> &str {
            "barrier"
        }

        fn description(&self) -> &str {
            "waits until every sibling call is running"
        }

        async fn execute(&self, input: &str, _context: Option<&str>) -> Result<String, String> {
            self.0.wait().await;
            Ok(input.to_string())
        }
    }

    fn executor() -> ToolExecutor {
        let mut registry = ToolRegistry::new();
        registry.register(EchoTool);
        registry.register(SlowTool);
        registry.register(PanicTool);
        ToolExecutor::with_timeout(registry, Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_middle_failure_keeps_order() {
        let calls = vec![
            ToolCall::new("search", "rust"),
            ToolCall::new("search", "boom"),
            ToolCall::new("search", "tokio"),
        ];
        let records = executor().dispatch(&calls, Some("task")).await;
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].output, "rust|task");
        assert!(records[0].is_ok());
        assert_eq!(records[1].status, ToolCallStatus::Failed);
        assert_eq!(records[1].output, "Tool execution failed: provider exploded");
        assert_eq!(records[2].output, "tokio|task");
        assert!(records[2].is_ok());
    }

    #[tokio::test]
    async fn test_order_independent_of_completion() {
        let calls = vec![
            ToolCall::new("scrape", "150"),
            ToolCall::new("scrape", "10"),
            ToolCall::new("scrape", "50"),
        ];
        let records = executor().dispatch(&calls, None).await;
        let outputs: Vec<_> = records.iter().map(|r| r.output.as_str()).collect();
        assert_eq!(outputs, vec!["slept 150", "slept 10", "slept 50"]);
    }

    #[tokio::test]
    async fn test_calls_run_concurrently() {
        let barrier = Arc::new(Barrier::new(3));
        let mut registry = ToolRegistry::new();
        registry.register(BarrierTool(barrier));
        let executor = ToolExecutor::with_timeout(registry, Duration::from_secs(5));
        let calls: Vec<_> = (0..3).map(|i| ToolCall::new("barrier", i.to_string())).collect();
        let records = tokio::time::timeout(Duration::from_secs(2), executor.dispatch(&calls, None))
            .await
            .expect("calls were serialized");
        assert!(records.iter().all(|r| r.is_ok()));
    }

    #[tokio::test]
    async fn test_unknown_tool_becomes_error_text() {
        let records = executor()
            .dispatch(&[ToolCall::new("shell", "rm -rf /")], None)
            .await;
        assert_eq!(records[0].status, ToolCallStatus::Failed);
        assert_eq!(records[0].output, "Tool execution failed: Illegal tool: shell");
    }

    #[tokio::test]
    async fn test_timeout_becomes_error_text() {
        let mut registry = ToolRegistry::new();
        registry.register(SlowTool);
        let executor = ToolExecutor::with_timeout(registry, Duration::from_millis(20));
        let records = executor.dispatch(&[ToolCall::new("scrape", "500")], None).await;
        assert_eq!(records[0].status, ToolCallStatus::Failed);
        assert!(records[0].output.contains("Tool timeout: scrape"));
    }

    #[tokio::test]
    async fn test_panicking_tool_is_contained() {
        let calls = vec![ToolCall::new("panic", "x"), ToolCall::new("search", "ok")];
        let records = executor().dispatch(&calls, None).await;
        assert_eq!(records[0].status, ToolCallStatus::Failed);
        assert!(records[0].output.starts_with("Tool execution failed"));
        assert!(records[1].is_ok());
    }

    #[tokio::test]
    async fn test_empty_batch() {
        assert!(executor().dispatch(&[], None).await.is_empty());
    }

    #[tokio::test]
    async fn test_run_call_error_variants() {
        let exec = executor();
        assert!(matches!(
            run_call(&exec.registry, exec.timeout, "nope", "x", None).await,
            Err(AgentError::IllegalTool(_))
        ));
        assert!(matches!(
            run_call(&exec.registry, exec.timeout, "search", "boom", None).await,
            Err(AgentError::ToolExecutionFailed(_))
        ));
    }
}
