//! 记忆层：模型消息、单次任务工作区（记忆块 + 状态 + 答案）

pub mod message;
pub mod workspace;

pub use message::{Message, Role};
pub use workspace::{
    ApplySummary, BlockIdSource, BlockOperation, ImportantLink, RandomBlockIds, RoundUpdate,
    TaskStatus, Workspace, WorkspaceSnapshot,
};
