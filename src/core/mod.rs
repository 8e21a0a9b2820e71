//! 核心层：错误与恢复策略、轮次状态机

pub mod error;
pub mod recovery;
pub mod state;

pub use error::{AgentError, RecoveryAction};
pub use recovery::{RecoveryEngine, RetryPolicy};
pub use state::{LoopExit, RoundPhase};
