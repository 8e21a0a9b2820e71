//! 工作区：一次研究任务内的全部记忆
//!
//! 由状态、记忆块（id -> 内容）、最终答案与重要链接组成。模型每轮只能看到 render() 的快照，
//! 对话历史不会被隐式保留；apply() 是唯一的写入入口，每轮由研究循环调用一次。
//!
//! 不变量：
//! - 块 ID 在整个运行期内唯一，删除后也不会被再次分配；
//! - answer 有值当且仅当 status == Done。

use std::collections::HashSet;
use std::fmt;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;

/// 任务状态（只有两种取值；「已总结 / 出错」是运行结果，不写入工作区）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize)]
pub enum TaskStatus {
    #[default]
    InProgress,
    Done,
}

impl TaskStatus {
    pub const IN_PROGRESS_TOKEN: &'static str = "IN_PROGRESS";
    pub const DONE_TOKEN: &'static str = "DONE";

    pub fn as_token(&self) -> &'static str {
        match self {
            TaskStatus::InProgress => Self::IN_PROGRESS_TOKEN,
            TaskStatus::Done => Self::DONE_TOKEN,
        }
    }

    /// 解析模型给出的状态字符串；无法识别的值一律视为进行中
    pub fn from_token(token: &str) -> Self {
        let normalized = token.trim().to_lowercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "done" | "completed" | "complete" | "finished" | "已完成" => TaskStatus::Done,
            "in_progress" | "进行中" => TaskStatus::InProgress,
            other => {
                tracing::debug!(status = %other, "unknown status token, treating as in progress");
                TaskStatus::InProgress
            }
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_token())
    }
}

/// 单条记忆块操作：Add 不需要调用方提供 id，Delete 对不存在的 id 静默忽略
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BlockOperation {
    Add { content: String },
    Delete { id: String },
}

/// 重要链接（任务完成时由模型给出）
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ImportantLink {
    pub url: String,
    pub title: String,
}

/// 一轮的工作区更新
#[derive(Clone, Debug, Default)]
pub struct RoundUpdate {
    /// None 表示模型未给出状态，保持进行中
    pub status: Option<TaskStatus>,
    pub operations: Vec<BlockOperation>,
    pub answer: Option<String>,
    pub important_links: Option<Vec<ImportantLink>>,
}

/// apply() 的结果摘要，供日志与事件使用
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ApplySummary {
    pub added: Vec<String>,
    pub deleted: Vec<String>,
    /// Delete 指向不存在的块（no-op）
    pub missing: Vec<String>,
}

/// 块 ID 候选生成器；工作区负责去重，生成器只需给出格式正确的候选
pub trait BlockIdSource: Send {
    fn next_candidate(&mut self) -> String;
}

/// 默认生成器：3 个小写字母 + '-' + 3 个数字，如 abc-123
pub struct RandomBlockIds {
    rng: StdRng,
}

impl RandomBlockIds {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Default for RandomBlockIds {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockIdSource for RandomBlockIds {
    fn next_candidate(&mut self) -> String {
        let mut id = String::with_capacity(7);
        for _ in 0..3 {
            id.push(self.rng.gen_range(b'a'..=b'z') as char);
        }
        id.push('-');
        for _ in 0..3 {
            id.push(self.rng.gen_range(b'0'..=b'9') as char);
        }
        id
    }
}

/// 工作区只读快照（报告 / 事件 / 前端展示）
#[derive(Clone, Debug, Serialize)]
pub struct WorkspaceSnapshot {
    pub status: TaskStatus,
    pub blocks: Vec<(String, String)>,
    pub answer: Option<String>,
    pub important_links: Vec<ImportantLink>,
}

pub struct Workspace {
    status: TaskStatus,
    /// 按插入顺序保存，render 顺序即此顺序
    blocks: Vec<(String, String)>,
    answer: Option<String>,
    important_links: Vec<ImportantLink>,
    /// 本次运行分配过的全部 ID（含已删除），保证不复用
    issued_ids: HashSet<String>,
    ids: Box<dyn BlockIdSource>,
}

impl Workspace {
    pub fn new() -> Self {
        Self::with_id_source(Box::new(RandomBlockIds::new()))
    }

    pub fn with_id_source(ids: Box<dyn BlockIdSource>) -> Self {
        Self {
            status: TaskStatus::InProgress,
            blocks: Vec::new(),
            answer: None,
            important_links: Vec::new(),
            issued_ids: HashSet::new(),
            ids,
        }
    }

    pub fn status(&self) -> TaskStatus {
        self.status
    }

    pub fn is_done(&self) -> bool {
        self.status != TaskStatus::InProgress
    }

    pub fn answer(&self) -> Option<&str> {
        self.answer.as_deref()
    }

    pub fn important_links(&self) -> &[ImportantLink] {
        &self.important_links
    }

    pub fn blocks(&self) -> &[(String, String)] {
        &self.blocks
    }

    pub fn block(&self, id: &str) -> Option<&str> {
        self.blocks
            .iter()
            .find(|(block_id, _)| block_id == id)
            .map(|(_, content)| content.as_str())
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// 渲染为模型输入：首行状态，随后每块一行 <id>content</id>；无块时输出占位行
    pub fn render(&self) -> String {
        let mut out = format!("Status: {}\n", self.status);
        out.push_str("Memory: \n");
        if self.blocks.is_empty() {
            out.push_str("... no memory blocks ...\n");
        } else {
            for (id, content) in &self.blocks {
                out.push_str(&format!("<{id}>{content}</{id}>\n"));
            }
        }
        out
    }

    /// 应用一轮更新。状态 -> 块操作（按顺序）-> 答案与链接。
    ///
    /// Done 但没有任何答案时降级为进行中，保持「answer 有值 iff Done」；
    /// 进行中时忽略模型给出的 answer / important_links。
    pub fn apply(&mut self, update: RoundUpdate) -> ApplySummary {
        let mut summary = ApplySummary::default();

        for op in update.operations {
            match op {
                BlockOperation::Add { content } => {
                    let id = self.generate_unique_id();
                    self.blocks.push((id.clone(), content));
                    summary.added.push(id);
                }
                BlockOperation::Delete { id } => {
                    let before = self.blocks.len();
                    self.blocks.retain(|(block_id, _)| block_id != &id);
                    if self.blocks.len() < before {
                        summary.deleted.push(id);
                    } else {
                        summary.missing.push(id);
                    }
                }
            }
        }

        let requested = update.status.unwrap_or_default();
        match requested {
            TaskStatus::Done => {
                if let Some(answer) = update.answer {
                    self.answer = Some(answer);
                }
                if self.answer.is_some() {
                    self.status = TaskStatus::Done;
                    if let Some(links) = update.important_links {
                        self.important_links = links;
                    }
                } else {
                    tracing::warn!("status DONE without an answer, keeping IN_PROGRESS");
                    self.status = TaskStatus::InProgress;
                }
            }
            TaskStatus::InProgress => {
                self.status = TaskStatus::InProgress;
                self.answer = None;
                self.important_links.clear();
            }
        }

        summary
    }

    pub fn snapshot(&self) -> WorkspaceSnapshot {
        WorkspaceSnapshot {
            status: self.status,
            blocks: self.blocks.clone(),
            answer: self.answer.clone(),
            important_links: self.important_links.clone(),
        }
    }

    /// 重复抽取候选直到不与任何已分配 ID 冲突
    fn generate_unique_id(&mut self) -> String {
        loop {
            let candidate = self.ids.next_candidate();
            if self.issued_ids.insert(candidate.clone()) {
                return candidate;
            }
            tracing::debug!(id = %candidate, "block id collision, re-rolling");
        }
    }
}

impl Default for Workspace {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Workspace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Workspace")
            .field("status", &self.status)
            .field("blocks", &self.blocks)
            .field("answer", &self.answer)
            .field("important_links", &self.important_links)
            .finish()
    }
}
