//! 笔记库：只追加的研究发现，可选关联来源 URL（弱引用，不要求存在于来源库）

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::sources::url_domain;

/// 单条研究笔记
#[derive(Clone, Debug, Serialize)]
pub struct Note {
    pub id: String,
    pub content: String,
    pub source_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub title: String,
}

impl Note {
    pub fn new(content: impl Into<String>, source_url: Option<String>) -> Self {
        let source_url = source_url
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty());
        let title = match source_url.as_deref().and_then(url_domain) {
            Some(domain) => format!("Note from {}", domain),
            None => "General Note".to_string(),
        };
        Self {
            id: Uuid::new_v4().to_string(),
            content: content.into(),
            source_url,
            created_at: Utc::now(),
            title,
        }
    }
}

/// 会话级笔记库
#[derive(Debug, Default)]
pub struct NoteStore {
    notes: Vec<Note>,
}

impl NoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加一条笔记，返回其 ID
    pub fn append(&mut self, content: impl Into<String>, source_url: Option<String>) -> String {
        let note = Note::new(content, source_url);
        let id = note.id.clone();
        self.notes.push(note);
        id
    }

    /// 按 1 起始的位置取笔记（与数字引用 [n] 对应）
    pub fn nth(&self, position: usize) -> Option<&Note> {
        position.checked_sub(1).and_then(|i| self.notes.get(i))
    }

    pub fn all(&self) -> &[Note] {
        &self.notes
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    pub fn clear(&mut self) {
        self.notes.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_title_derived_from_domain() {
        let note = Note::new("finding", Some("https://www.Reuters.com/article".to_string()));
        assert_eq!(note.title, "Note from www.reuters.com");
        let general = Note::new("finding", None);
        assert_eq!(general.title, "General Note");
        let blank = Note::new("finding", Some("  ".to_string()));
        assert!(blank.source_url.is_none());
    }

    #[test]
    fn test_append_assigns_unique_ids_in_order() {
        let mut store = NoteStore::new();
        let a = store.append("A", Some("http://x".to_string()));
        let b = store.append("B", None);
        assert_ne!(a, b);
        assert_eq!(store.nth(1).unwrap().content, "A");
        assert_eq!(store.nth(2).unwrap().content, "B");
        assert!(store.nth(0).is_none());
        assert!(store.nth(3).is_none());
    }
}
