//! LLM 层：客户端抽象与实现（OpenAI 兼容 / OpenRouter / DeepSeek / Mock）

pub mod deepseek;
pub mod mock;
pub mod openai;
pub mod traits;

pub use deepseek::{create_deepseek_client, DEEPSEEK_CHAT};
pub use mock::MockLlmClient;
pub use openai::{OpenAiClient, TokenUsage, OPENROUTER_BASE_URL};
pub use traits::{LlmClient, LlmError};
