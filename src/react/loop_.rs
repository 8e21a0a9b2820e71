//! 研究主循环
//!
//! 每轮：节流等待 -> 渲染 prompt 并调用模型 -> 去掉推理段 -> 提取指令对象 -> 应用到工作区 -> 并发执行工具。
//! 格式错误与模型/网络故障由 RecoveryEngine 决定等待后重跑同一轮（不推进轮次）、结束循环或终止运行。
//! 工作区更新只在模型输出解析成功后发生，之后的步骤不会失败，因此重跑一轮不会重复应用更新。
//! 工具调用总会执行（包括给出 DONE 的一轮），结束条件只在轮次边界检查：
//! 工作区 DONE、轮次计数超过预算、单步模式已执行一轮、重试次数用尽。

use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;

use crate::core::{AgentError, LoopExit, RecoveryAction, RecoveryEngine, RoundPhase};
use crate::memory::Workspace;
use crate::react::command::RoundCommand;
use crate::react::extract::{extract_largest_json, strip_thinking};
use crate::react::planner::{Planner, PromptContext};
use crate::react::ResearchEvent;
use crate::tools::{ToolCallRecord, ToolExecutor};

/// 模型输出预览最大字符数
const MODEL_PREVIEW_CHARS: usize = 800;
/// Observation 预览最大字符数
const OBSERVATION_PREVIEW_CHARS: usize = 200;

/// 运行方式：循环直到结束条件，或只执行一轮（供按步驱动的前端使用）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Loop { max_rounds: usize },
    SingleStep,
}

/// 一次研究任务的可变状态
#[derive(Debug)]
pub struct ResearchState {
    pub task: String,
    /// %Y-%m-%d，任务开始时确定
    pub current_date: String,
    pub workspace: Workspace,
    /// 上一轮的工具结果，只用于渲染下一轮 prompt
    pub tool_records: Option<Vec<ToolCallRecord>>,
    /// 已完成的轮数
    pub round: usize,
    /// 所有轮次的工具结果（报告 / 展示用）
    pub tool_history: Vec<ToolCallRecord>,
}

impl ResearchState {
    pub fn new(task: impl Into<String>) -> Self {
        Self::with_date(task, chrono::Local::now().format("%Y-%m-%d").to_string())
    }

    pub fn with_date(task: impl Into<String>, current_date: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            current_date: current_date.into(),
            workspace: Workspace::new(),
            tool_records: None,
            round: 0,
            tool_history: Vec::new(),
        }
    }
}

/// 研究会话：Planner、工具执行器、恢复引擎与可选事件通道
pub struct ResearchSession<'a> {
    pub planner: &'a Planner,
    pub executor: &'a ToolExecutor,
    pub recovery: &'a RecoveryEngine,
    /// 每轮请求模型前的固定等待
    pub round_delay: Duration,
    pub event_tx: Option<&'a UnboundedSender<ResearchEvent>>,
}

impl<'a> ResearchSession<'a> {
    pub fn new(planner: &'a Planner, executor: &'a ToolExecutor, recovery: &'a RecoveryEngine) -> Self {
        Self {
            planner,
            executor,
            recovery,
            round_delay: Duration::ZERO,
            event_tx: None,
        }
    }

    pub fn with_round_delay(mut self, delay: Duration) -> Self {
        self.round_delay = delay;
        self
    }

    pub fn with_event_tx(mut self, tx: &'a UnboundedSender<ResearchEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    fn send(&self, ev: ResearchEvent) {
        if let Some(tx) = self.event_tx {
            let _ = tx.send(ev);
        }
    }

    fn phase(&self, round: usize, phase: RoundPhase) {
        tracing::debug!(round, phase = %phase, "round phase");
        self.send(ResearchEvent::Phase { round, phase });
    }

    fn finish(&self, state: &ResearchState, exit: LoopExit) -> LoopExit {
        self.phase(state.round, RoundPhase::Terminated);
        tracing::info!(rounds = state.round, exit = ?exit, status = %state.workspace.status(), "research loop finished");
        self.send(ResearchEvent::Finished {
            exit,
            rounds: state.round,
        });
        exit
    }
}

fn preview(text: &str, max_chars: usize) -> String {
    if text.chars().count() > max_chars {
        format!("{}...", text.chars().take(max_chars).collect::<String>())
    } else {
        text.to_string()
    }
}

/// 执行研究循环，返回结束原因；只有不可恢复的错误才返回 Err
pub async fn research_loop(
    session: &ResearchSession<'_>,
    state: &mut ResearchState,
    mode: RunMode,
) -> Result<LoopExit, AgentError> {
    let max_rounds = match mode {
        RunMode::Loop { max_rounds } => Some(max_rounds),
        RunMode::SingleStep => None,
    };
    // 同一轮内的连续失败次数
    let mut attempt: u32 = 0;

    loop {
        let round = state.round + 1;
        if attempt == 0 {
            tracing::info!(round, max_rounds = ?max_rounds, "round started");
            session.send(ResearchEvent::RoundStarted { round, max_rounds });
        }

        if !session.round_delay.is_zero() {
            tokio::time::sleep(session.round_delay).await;
        }

        match run_round(session, state, round).await {
            Ok(()) => {
                attempt = 0;
                state.round = round;
                if state.workspace.is_done() {
                    return Ok(session.finish(state, LoopExit::Done));
                }
                // 轮次计数超过预算才结束：预算 N 时最多执行 N + 1 轮
                if max_rounds.is_some_and(|max| state.round > max) {
                    return Ok(session.finish(state, LoopExit::BudgetExhausted));
                }
                if mode == RunMode::SingleStep {
                    return Ok(session.finish(state, LoopExit::SingleStep));
                }
            }
            Err(e) => {
                attempt += 1;
                match session.recovery.handle(&e, attempt) {
                    RecoveryAction::RetryRound(delay) => {
                        tracing::warn!(round, attempt, error = %e, delay_ms = delay.as_millis() as u64, "round failed, retrying");
                        session.send(ResearchEvent::Recovery {
                            action: "retry_round".to_string(),
                            detail: e.to_string(),
                        });
                        if !delay.is_zero() {
                            tokio::time::sleep(delay).await;
                        }
                    }
                    RecoveryAction::EndRun => {
                        tracing::warn!(round, attempt, error = %e, "retry attempts exhausted, ending run");
                        session.send(ResearchEvent::Recovery {
                            action: "end_run".to_string(),
                            detail: e.to_string(),
                        });
                        return Ok(session.finish(state, LoopExit::RetriesExhausted));
                    }
                    RecoveryAction::Abort => {
                        tracing::error!(round, error = %e, "unrecoverable error, aborting run");
                        session.send(ResearchEvent::Recovery {
                            action: "abort".to_string(),
                            detail: e.to_string(),
                        });
                        session.send(ResearchEvent::Error { text: e.to_string() });
                        session.phase(state.round, RoundPhase::Terminated);
                        return Err(e);
                    }
                }
            }
        }
    }
}

/// 单轮；失败只可能发生在应用工作区更新之前
async fn run_round(
    session: &ResearchSession<'_>,
    state: &mut ResearchState,
    round: usize,
) -> Result<(), AgentError> {
    session.phase(round, RoundPhase::AwaitingModel);
    let workspace = state.workspace.render();
    let prompt = session.planner.render_prompt(&PromptContext {
        task: &state.task,
        current_date: &state.current_date,
        workspace: &workspace,
        tool_records: state.tool_records.as_deref(),
    });
    let raw = session.planner.plan(&prompt).await?;
    session.send(ResearchEvent::ModelOutput {
        round,
        preview: preview(&raw, MODEL_PREVIEW_CHARS),
    });

    session.phase(round, RoundPhase::Parsing);
    let cleaned = strip_thinking(&raw);
    let Some(obj) = extract_largest_json(&cleaned) else {
        tracing::warn!(round, response = %preview(&cleaned, 200), "no command object in model response");
        return Err(AgentError::JsonParseError(format!(
            "no JSON object in response: {}",
            preview(cleaned.trim(), 200)
        )));
    };
    let (update, calls) = RoundCommand::from_object(&obj).split();

    session.phase(round, RoundPhase::ApplyingMemory);
    let summary = state.workspace.apply(update);
    tracing::info!(
        round,
        status = %state.workspace.status(),
        added = summary.added.len(),
        deleted = summary.deleted.len(),
        missing = summary.missing.len(),
        blocks = state.workspace.len(),
        "workspace updated"
    );
    session.send(ResearchEvent::MemoryUpdated {
        round,
        status: state.workspace.status(),
        added: summary.added,
        deleted: summary.deleted,
        blocks: state.workspace.len(),
    });

    session.phase(round, RoundPhase::DispatchingTools);
    let cap = session.planner.max_tool_calls();
    if calls.len() > cap {
        tracing::warn!(round, requested = calls.len(), cap, "model exceeded the per-round tool call limit");
    }
    for call in &calls {
        session.send(ResearchEvent::ToolCall {
            round,
            tool: call.tool.clone(),
            input: call.input.clone(),
        });
    }

    let records = session.executor.dispatch(&calls, Some(state.task.as_str())).await;
    for record in &records {
        session.send(ResearchEvent::Observation {
            round,
            tool: record.tool.clone(),
            ok: record.is_ok(),
            preview: preview(&record.output, OBSERVATION_PREVIEW_CHARS),
        });
    }

    state.tool_history.extend(records.iter().cloned());
    state.tool_records = Some(records);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use async_trait::async_trait;
    use serde_json::json;

    use crate::core::RetryPolicy;
    use crate::llm::{LlmError, MockLlmClient};
    use crate::memory::TaskStatus;
    use crate::tools::{Tool, ToolRegistry};

    struct StubSearch;

    #[async_trait]
    impl Tool for StubSearch {
        fn name(&self) -> &str {
            "search"
        }

        fn description(&self) -> &str {
            "stub search"
        }

        async fn execute(&self, input: &str, _context: Option<&str>) -> Result<String, String> {
            Ok(format!("results for {input}"))
        }
    }

    fn executor() -> ToolExecutor {
        let mut registry = ToolRegistry::new();
        registry.register(StubSearch);
        ToolExecutor::with_timeout(registry, Duration::from_secs(5))
    }

    fn in_progress(calls: usize) -> String {
        let tool_calls: Vec<_> = (0..calls)
            .map(|i| json!({"tool": "search", "input": format!("q{i}")}))
            .collect();
        json!({
            "status_update": "IN_PROGRESS",
            "memory_updates": [{"operation": "add", "content": "note"}],
            "tool_calls": tool_calls
        })
        .to_string()
    }

    fn recovery() -> RecoveryEngine {
        RecoveryEngine::new(RetryPolicy::unbounded(Duration::ZERO))
    }

    #[tokio::test]
    async fn test_unparseable_output_retries_same_round() {
        let mock = Arc::new(MockLlmClient::scripted([
            "I cannot answer in JSON today".to_string(),
            in_progress(1),
        ]));
        let planner = Planner::with_default_prompt(mock.clone());
        let executor = executor();
        let recovery = recovery();
        let session = ResearchSession::new(&planner, &executor, &recovery);
        let mut state = ResearchState::with_date("task", "2025-05-01");

        let exit = research_loop(&session, &mut state, RunMode::SingleStep).await.unwrap();
        assert_eq!(exit, LoopExit::SingleStep);
        assert_eq!(state.round, 1);
        assert_eq!(mock.calls(), 2);
        assert_eq!(state.workspace.len(), 1);
    }

    #[tokio::test]
    async fn test_retry_limit_ends_run() {
        let mock = Arc::new(MockLlmClient::with_results(vec![
            Err(LlmError::Network("down".to_string())),
            Err(LlmError::Network("down".to_string())),
            Err(LlmError::Network("down".to_string())),
        ]));
        let planner = Planner::with_default_prompt(mock.clone());
        let executor = executor();
        let recovery = RecoveryEngine::new(RetryPolicy::unbounded(Duration::ZERO).with_max_attempts(2));
        let session = ResearchSession::new(&planner, &executor, &recovery);
        let mut state = ResearchState::with_date("task", "2025-05-01");

        let exit = research_loop(&session, &mut state, RunMode::Loop { max_rounds: 5 })
            .await
            .unwrap();
        assert_eq!(exit, LoopExit::RetriesExhausted);
        assert_eq!(state.round, 0);
        assert_eq!(mock.calls(), 2);
    }

    #[tokio::test]
    async fn test_tool_records_feed_next_round() {
        let mock = Arc::new(MockLlmClient::scripted([in_progress(1), in_progress(0)]));
        let planner = Planner::with_default_prompt(mock.clone());
        let executor = executor();
        let recovery = recovery();
        let session = ResearchSession::new(&planner, &executor, &recovery);
        let mut state = ResearchState::with_date("task", "2025-05-01");

        let exit = research_loop(&session, &mut state, RunMode::Loop { max_rounds: 1 })
            .await
            .unwrap();
        assert_eq!(exit, LoopExit::BudgetExhausted);
        assert_eq!(state.round, 2);
        let prompts = mock.prompts();
        assert!(prompts[0].contains("... no previous tool results ..."));
        assert!(prompts[1].contains("Source 1: search: q0"));
        assert!(prompts[1].contains("results for q0"));
        // 第二轮没有工具调用，缓冲被替换为空
        assert_eq!(state.tool_records.as_deref().map(<[_]>::len), Some(0));
        assert_eq!(state.tool_history.len(), 1);
        assert_eq!(state.workspace.len(), 2);
    }

    #[tokio::test]
    async fn test_soft_cap_does_not_truncate() {
        let mock = Arc::new(MockLlmClient::scripted([in_progress(5)]));
        let planner = Planner::with_default_prompt(mock.clone());
        let executor = executor();
        let recovery = recovery();
        let session = ResearchSession::new(&planner, &executor, &recovery);
        let mut state = ResearchState::with_date("task", "2025-05-01");

        research_loop(&session, &mut state, RunMode::SingleStep).await.unwrap();
        assert_eq!(state.tool_records.as_ref().map(Vec::len), Some(5));
    }

    #[tokio::test]
    async fn test_done_round_still_dispatches_tools() {
        let done = json!({
            "status_update": "DONE",
            "answer": "a",
            "tool_calls": [{"tool": "search", "input": "q"}]
        })
        .to_string();
        let mock = Arc::new(MockLlmClient::scripted([done]));
        let planner = Planner::with_default_prompt(mock.clone());
        let executor = executor();
        let recovery = recovery();
        let session = ResearchSession::new(&planner, &executor, &recovery);
        let mut state = ResearchState::with_date("task", "2025-05-01");

        let exit = research_loop(&session, &mut state, RunMode::Loop { max_rounds: 2 })
            .await
            .unwrap();
        assert_eq!(exit, LoopExit::Done);
        assert_eq!(state.round, 1);
        assert_eq!(mock.calls(), 1);
        assert_eq!(state.tool_history.len(), 1);
        assert_eq!(state.tool_history[0].output, "results for q");
    }

    #[tokio::test]
    async fn test_budget_ends_after_counter_exceeds_max() {
        let mock = Arc::new(MockLlmClient::scripted(
            (0..4).map(|_| in_progress(0)).collect::<Vec<_>>(),
        ));
        let planner = Planner::with_default_prompt(mock.clone());
        let executor = executor();
        let recovery = recovery();
        let session = ResearchSession::new(&planner, &executor, &recovery);
        let mut state = ResearchState::with_date("task", "2025-05-01");

        let exit = research_loop(&session, &mut state, RunMode::Loop { max_rounds: 2 })
            .await
            .unwrap();
        assert_eq!(exit, LoopExit::BudgetExhausted);
        assert_eq!(state.round, 3);
        assert_eq!(mock.calls(), 3);
    }

    #[tokio::test]
    async fn test_events_follow_phases() {
        let mock = Arc::new(MockLlmClient::new());
        let planner = Planner::with_default_prompt(mock);
        let executor = executor();
        let recovery = recovery();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let session = ResearchSession::new(&planner, &executor, &recovery).with_event_tx(&tx);
        let mut state = ResearchState::with_date("task", "2025-05-01");

        let exit = research_loop(&session, &mut state, RunMode::Loop { max_rounds: 3 })
            .await
            .unwrap();
        assert_eq!(exit, LoopExit::Done);
        assert_eq!(state.workspace.status(), TaskStatus::Done);

        let mut phases = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            if let ResearchEvent::Phase { phase, .. } = ev {
                phases.push(phase);
            }
        }
        assert_eq!(
            phases,
            vec![
                RoundPhase::AwaitingModel,
                RoundPhase::Parsing,
                RoundPhase::ApplyingMemory,
                RoundPhase::DispatchingTools,
                RoundPhase::Terminated,
            ]
        );
    }
}
