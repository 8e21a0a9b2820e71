//! 研究 Agent 运行时
//!
//! create_llm_from_config 按配置选择模型后端（缺少 Key 为启动错误，不会静默退回 Mock）；
//! create_research_components 构建 Planner / ToolExecutor / Recovery / 兜底摘要；
//! run_research 对一个任务跑完整研究循环，未完成时走兜底摘要，返回 ResearchReport。

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;
use tracing::Instrument;

use crate::config::{load_prompt, AppConfig, LLM_API_KEY_VARS};
use crate::core::recovery::duration_from_secs;
use crate::core::{AgentError, LoopExit, RecoveryEngine, RetryPolicy};
use crate::llm::{create_deepseek_client, LlmClient, MockLlmClient, OpenAiClient, OPENROUTER_BASE_URL};
use crate::memory::{ImportantLink, WorkspaceSnapshot};
use crate::react::prompts::{RESEARCH_PROMPT, SUMMARY_PROMPT};
use crate::react::{
    research_loop, FallbackSummarizer, Planner, ResearchEvent, ResearchSession, ResearchState, RunMode,
};
use crate::tools::{ScrapeTool, SearchTool, ToolCallRecord, ToolExecutor, ToolRegistry};

pub const DEFAULT_OPENROUTER_MODEL: &str = "deepseek/deepseek-r1";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";

/// 根据配置与环境变量选择 LLM 后端（OpenRouter / OpenAI / DeepSeek / Mock）
pub fn create_llm_from_config(cfg: &AppConfig) -> Result<Arc<dyn LlmClient>, AgentError> {
    let provider = cfg.llm.provider.trim().to_lowercase();
    if provider == "mock" {
        tracing::warn!("Using Mock LLM");
        return Ok(Arc::new(MockLlmClient::new()));
    }

    let api_key = cfg.llm.api_key().ok_or_else(|| {
        AgentError::MissingCredentials(format!(
            "provider '{}' needs one of {}",
            provider,
            LLM_API_KEY_VARS.join(", ")
        ))
    })?;
    let model = cfg.llm.model.as_deref();
    let base_url = cfg.llm.base_url.as_deref();

    let client = match provider.as_str() {
        "openrouter" => OpenAiClient::new(
            Some(base_url.unwrap_or(OPENROUTER_BASE_URL)),
            model.unwrap_or(DEFAULT_OPENROUTER_MODEL),
            &api_key,
        ),
        "openai" => OpenAiClient::new(base_url, model.unwrap_or(DEFAULT_OPENAI_MODEL), &api_key),
        "deepseek" => match base_url {
            Some(base) => OpenAiClient::new(
                Some(base),
                model.unwrap_or(crate::llm::DEEPSEEK_CHAT),
                &api_key,
            ),
            None => create_deepseek_client(model, &api_key),
        },
        other => {
            return Err(AgentError::ConfigError(format!(
                "unknown llm provider: {other}"
            )))
        }
    };
    tracing::info!(provider = %provider, model = %client.model(), "Using LLM backend");
    Ok(Arc::new(client))
}

/// 默认工具集：search（Tavily）与 scrape
pub fn default_tools(cfg: &AppConfig) -> ToolRegistry {
    let mut tools = ToolRegistry::new();
    let search_key = cfg.tools.search.api_key();
    if search_key.is_none() {
        tracing::warn!(
            "{} not set, search calls will fail",
            crate::config::SEARCH_API_KEY_VAR
        );
    }
    tools.register(SearchTool::new(&cfg.tools.search, search_key));
    tools.register(ScrapeTool::new(&cfg.tools.scrape));
    tools
}

/// 预构建的研究组件，可被多个任务复用
pub struct ResearchComponents {
    pub planner: Planner,
    pub executor: ToolExecutor,
    pub recovery: RecoveryEngine,
    pub summarizer: FallbackSummarizer,
    pub max_rounds: usize,
    /// 每轮请求模型前的固定等待
    pub round_delay: Duration,
}

/// 从配置创建完整组件（真实模型后端 + 默认工具）
pub fn create_research_components(cfg: &AppConfig) -> Result<ResearchComponents, AgentError> {
    let llm = create_llm_from_config(cfg)?;
    build_components(cfg, llm, default_tools(cfg))
}

/// 用注入的模型与工具构建组件（测试中传入 MockLlmClient 与桩工具）
///
/// 时间类配置为 inf 或超出 Duration 范围时返回 ConfigError。
pub fn build_components(
    cfg: &AppConfig,
    llm: Arc<dyn LlmClient>,
    tools: ToolRegistry,
) -> Result<ResearchComponents, AgentError> {
    let request_timeout = Duration::from_secs(cfg.llm.timeouts.request);
    let research_prompt = load_prompt(cfg.prompts.research.as_ref(), "research", RESEARCH_PROMPT);
    let summary_prompt = load_prompt(cfg.prompts.summary.as_ref(), "summary", SUMMARY_PROMPT);

    let executor = ToolExecutor::new(tools, cfg.tools.tool_timeout_secs);
    let planner = Planner::new(llm.clone(), research_prompt)
        .with_timeout(request_timeout)
        .with_max_tool_calls(cfg.agent.max_tool_calls_per_round)
        .with_tools(executor.tool_descriptions());
    let summarizer = FallbackSummarizer::new(llm, summary_prompt).with_timeout(request_timeout);

    Ok(ResearchComponents {
        planner,
        executor,
        recovery: RecoveryEngine::new(RetryPolicy::try_from(&cfg.agent.retry)?),
        summarizer,
        max_rounds: cfg.agent.max_rounds,
        round_delay: duration_from_secs("agent.round_delay_secs", cfg.agent.round_delay_secs)?,
    })
}

impl ResearchComponents {
    pub fn session<'a>(
        &'a self,
        event_tx: Option<&'a UnboundedSender<ResearchEvent>>,
    ) -> ResearchSession<'a> {
        let session = ResearchSession::new(&self.planner, &self.executor, &self.recovery)
            .with_round_delay(self.round_delay);
        match event_tx {
            Some(tx) => session.with_event_tx(tx),
            None => session,
        }
    }
}

/// 运行结果：模型给出答案，或预算用尽后由兜底摘要给出
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    Answered,
    Summarized,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResearchReport {
    pub run_id: String,
    pub outcome: RunOutcome,
    pub answer: String,
    pub important_links: Vec<ImportantLink>,
    pub memory: WorkspaceSnapshot,
    pub tool_history: Vec<ToolCallRecord>,
    pub rounds: usize,
    pub exit: LoopExit,
}

/// 对一个任务跑完整研究
pub async fn run_research(
    components: &ResearchComponents,
    task: &str,
    event_tx: Option<&UnboundedSender<ResearchEvent>>,
) -> Result<ResearchReport, AgentError> {
    let mut state = ResearchState::new(task);
    run_research_with_state(components, &mut state, event_tx).await
}

/// 在给定状态上跑研究（可预设日期、工作区 ID 生成器）
pub async fn run_research_with_state(
    components: &ResearchComponents,
    state: &mut ResearchState,
    event_tx: Option<&UnboundedSender<ResearchEvent>>,
) -> Result<ResearchReport, AgentError> {
    let run_id = uuid::Uuid::new_v4().to_string();
    let span = tracing::info_span!("research", run_id = %run_id);
    let session = components.session(event_tx);
    let exit = research_loop(
        &session,
        state,
        RunMode::Loop {
            max_rounds: components.max_rounds,
        },
    )
    .instrument(span.clone())
    .await?;

    let answered = exit.is_done()
        .then(|| state.workspace.answer().map(str::to_string))
        .flatten();
    let (outcome, answer) = match answered {
        Some(answer) => (RunOutcome::Answered, answer),
        None => {
            tracing::info!(exit = ?exit, rounds = state.round, "task not finished, running fallback summarizer");
            let summary = components
                .summarizer
                .summarize(&state.workspace.render())
                .instrument(span)
                .await?;
            (RunOutcome::Summarized, summary)
        }
    };

    let (prompt_tokens, completion_tokens, total_tokens) = components.planner.token_usage();
    tracing::info!(
        run_id = %run_id,
        outcome = ?outcome,
        rounds = state.round,
        prompt_tokens,
        completion_tokens,
        total_tokens,
        "research run finished"
    );

    Ok(ResearchReport {
        run_id,
        outcome,
        answer,
        important_links: state.workspace.important_links().to_vec(),
        memory: state.workspace.snapshot(),
        tool_history: state.tool_history.clone(),
        rounds: state.round,
        exit,
    })
}

/// 只执行一轮（按步驱动的前端使用）；不触发兜底摘要
pub async fn run_single_step(
    components: &ResearchComponents,
    state: &mut ResearchState,
    event_tx: Option<&UnboundedSender<ResearchEvent>>,
) -> Result<LoopExit, AgentError> {
    let session = components.session(event_tx);
    research_loop(&session, state, RunMode::SingleStep).await
}
