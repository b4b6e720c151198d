//! 记忆层：单轮对话记录、会话级来源库与笔记库

pub mod conversation;
pub mod notes;
pub mod sources;

pub use conversation::{Message, Role, ToolCall, Transcript};
pub use notes::{Note, NoteStore};
pub use sources::{normalize_url, url_domain, Source, SourceStore};

/// 会话研究状态：由编排器独占持有，工具执行时以可变借用传入
#[derive(Debug, Default)]
pub struct ResearchState {
    pub sources: SourceStore,
    pub notes: NoteStore,
}

impl ResearchState {
    pub fn new() -> Self {
        Self::default()
    }

    /// 会话重置：清空笔记与来源
    pub fn reset(&mut self) {
        self.sources.clear();
        self.notes.clear();
    }
}
