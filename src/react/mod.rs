//! 研究层：指令提取、prompt 渲染、Planner、主循环、兜底摘要

pub mod command;
pub mod events;
pub mod extract;
pub mod loop_;
pub mod planner;
pub mod prompts;
pub mod schema;
pub mod summarizer;

pub use command::RoundCommand;
pub use events::ResearchEvent;
pub use extract::{extract_largest_json, strip_thinking};
pub use loop_::{research_loop, ResearchSession, ResearchState, RunMode};
pub use planner::{Planner, PromptContext};
pub use schema::round_command_schema_json;
pub use summarizer::FallbackSummarizer;
