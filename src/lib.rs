//! DeepSearch - 自主研究智能体
//!
//! 模块划分：
//! - **agent**: 研究运行时（组件构建、完整运行、单步运行、运行报告）
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误类型、重试策略与恢复引擎、轮次状态机
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / OpenRouter / DeepSeek / Mock）
//! - **memory**: 模型消息与单次任务工作区（记忆块、状态、答案）
//! - **observability**: 日志初始化
//! - **react**: 指令提取、prompt 渲染、Planner、研究主循环、兜底摘要
//! - **tools**: 工具注册、并发执行器、search 与 scrape

pub mod agent;
pub mod config;
pub mod core;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod react;
pub mod tools;

pub use agent::{run_research, ResearchComponents, ResearchReport, RunOutcome};
