//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `DEEPSEARCH__*` 覆盖（双下划线表示嵌套，如 `DEEPSEARCH__AGENT__MAX_ROUNDS=4`）。
//! API Key 不放在配置文件中，只从环境变量读取（见 [`LlmSection::api_key`] 与 [`SearchSection::api_key`]）。

use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub agent: AgentSection,
    pub tools: ToolsSection,
    pub prompts: PromptsSection,
}

/// [app] 段
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppSection {
    pub name: Option<String>,
}

/// [llm] 段：后端选择、模型与超时
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSection {
    /// openrouter / openai / deepseek / mock
    #[serde(default = "default_provider")]
    pub provider: String,
    pub model: Option<String>,
    pub base_url: Option<String>,
    #[serde(default)]
    pub timeouts: LlmTimeoutsSection,
}

fn default_provider() -> String {
    "openrouter".to_string()
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            base_url: None,
            timeouts: LlmTimeoutsSection::default(),
        }
    }
}

/// 模型 Key 的环境变量，按顺序取第一个存在的
pub const LLM_API_KEY_VARS: [&str; 4] = [
    "LLM_API_KEY",
    "OPENROUTER_API_KEY",
    "DEEPSEEK_API_KEY",
    "OPENAI_API_KEY",
];

impl LlmSection {
    /// 从环境变量读取模型 API Key
    pub fn api_key(&self) -> Option<String> {
        LLM_API_KEY_VARS
            .iter()
            .find_map(|name| std::env::var(name).ok())
            .filter(|k| !k.trim().is_empty())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmTimeoutsSection {
    /// 单次模型请求超时（秒）
    #[serde(default = "default_request_timeout")]
    pub request: u64,
}

fn default_request_timeout() -> u64 {
    300
}

impl Default for LlmTimeoutsSection {
    fn default() -> Self {
        Self {
            request: default_request_timeout(),
        }
    }
}

/// [agent] 段：轮次预算、节流、工具调用软上限、重试策略
#[derive(Debug, Clone, Deserialize)]
pub struct AgentSection {
    #[serde(default = "default_max_rounds")]
    pub max_rounds: usize,
    /// 每轮请求模型前的固定等待（秒），对后端限流
    #[serde(default = "default_round_delay_secs")]
    pub round_delay_secs: f64,
    /// 每轮工具调用数的软上限：写进 prompt，超出时只记录告警
    #[serde(default = "default_max_tool_calls")]
    pub max_tool_calls_per_round: usize,
    #[serde(default)]
    pub retry: RetrySection,
}

fn default_max_rounds() -> usize {
    8
}

fn default_round_delay_secs() -> f64 {
    20.0
}

fn default_max_tool_calls() -> usize {
    3
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            max_rounds: default_max_rounds(),
            round_delay_secs: default_round_delay_secs(),
            max_tool_calls_per_round: default_max_tool_calls(),
            retry: RetrySection::default(),
        }
    }
}

/// [agent.retry] 段：格式错误 / 网络故障时同一轮的重试
#[derive(Debug, Clone, Deserialize)]
pub struct RetrySection {
    /// 未设置表示不限次数
    pub max_attempts: Option<u32>,
    #[serde(default = "default_retry_delay_secs")]
    pub delay_secs: f64,
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,
    #[serde(default = "default_max_delay_secs")]
    pub max_delay_secs: f64,
}

fn default_retry_delay_secs() -> f64 {
    10.0
}

fn default_backoff_factor() -> f64 {
    1.0
}

fn default_max_delay_secs() -> f64 {
    60.0
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_attempts: None,
            delay_secs: default_retry_delay_secs(),
            backoff_factor: default_backoff_factor(),
            max_delay_secs: default_max_delay_secs(),
        }
    }
}

/// [tools] 段
#[derive(Debug, Clone, Deserialize)]
pub struct ToolsSection {
    /// 单次工具调用超时（秒）
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,
    #[serde(default)]
    pub search: SearchSection,
    #[serde(default)]
    pub scrape: ScrapeSection,
}

fn default_tool_timeout_secs() -> u64 {
    300
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            tool_timeout_secs: default_tool_timeout_secs(),
            search: SearchSection::default(),
            scrape: ScrapeSection::default(),
        }
    }
}

/// [tools.search] 段：Tavily 搜索
#[derive(Debug, Clone, Deserialize)]
pub struct SearchSection {
    #[serde(default = "default_search_api_base")]
    pub api_base: String,
    /// basic / advanced
    #[serde(default = "default_search_depth")]
    pub search_depth: String,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    #[serde(default = "default_search_timeout_secs")]
    pub timeout_secs: u64,
}

pub const SEARCH_API_KEY_VAR: &str = "TAVILY_API_KEY";

fn default_search_api_base() -> String {
    "https://api.tavily.com".to_string()
}

fn default_search_depth() -> String {
    "basic".to_string()
}

fn default_max_results() -> usize {
    5
}

fn default_search_timeout_secs() -> u64 {
    60
}

impl Default for SearchSection {
    fn default() -> Self {
        Self {
            api_base: default_search_api_base(),
            search_depth: default_search_depth(),
            max_results: default_max_results(),
            timeout_secs: default_search_timeout_secs(),
        }
    }
}

impl SearchSection {
    pub fn api_key(&self) -> Option<String> {
        std::env::var(SEARCH_API_KEY_VAR)
            .ok()
            .filter(|k| !k.trim().is_empty())
    }
}

/// [tools.scrape] 段：抓取超时、是否收集链接、最大字符数
#[derive(Debug, Clone, Deserialize)]
pub struct ScrapeSection {
    #[serde(default = "default_scrape_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_gather_links")]
    pub gather_links: bool,
    #[serde(default = "default_max_result_chars")]
    pub max_result_chars: usize,
}

fn default_scrape_timeout_secs() -> u64 {
    30
}

fn default_gather_links() -> bool {
    true
}

fn default_max_result_chars() -> usize {
    8000
}

impl Default for ScrapeSection {
    fn default() -> Self {
        Self {
            timeout_secs: default_scrape_timeout_secs(),
            gather_links: default_gather_links(),
            max_result_chars: default_max_result_chars(),
        }
    }
}

/// [prompts] 段：可选的 prompt 模板文件
#[derive(Debug, Clone, Deserialize, Default)]
pub struct PromptsSection {
    pub research: Option<PathBuf>,
    pub summary: Option<PathBuf>,
}

/// 从 config 目录加载配置，环境变量 DEEPSEARCH__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 则追加该文件（可覆盖前面的键），文件不存在时报错
/// 3. 最后叠加环境变量 DEEPSEARCH__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if !path.exists() {
            tracing::warn!(path = %path.display(), "config file not found");
        }
        builder = builder.add_source(config::File::from(path.clone()).required(true));
    }

    builder = builder.add_source(
        config::Environment::with_prefix("DEEPSEARCH")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

/// 读取 prompt 模板：显式路径 > config/prompts/<name>.txt > ../config/prompts/<name>.txt > 内置默认
pub fn load_prompt(explicit: Option<&PathBuf>, name: &str, fallback: &str) -> String {
    let candidates = [
        explicit.cloned(),
        Some(PathBuf::from(format!("config/prompts/{name}.txt"))),
        Some(PathBuf::from(format!("../config/prompts/{name}.txt"))),
    ];
    candidates
        .into_iter()
        .flatten()
        .find_map(|p| std::fs::read_to_string(p).ok())
        .unwrap_or_else(|| fallback.to_string())
}
