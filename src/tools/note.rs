//! take_note：记录一条研究发现

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::memory::ResearchState;
use crate::tools::schema::{parameters_schema, parse_args};
use crate::tools::{Tool, TAKE_NOTE};

/// take_note 参数
#[derive(Debug, Deserialize, JsonSchema)]
pub struct NoteArgs {
    /// The finding to record
    pub content: String,
    /// URL of the source this finding came from
    #[serde(default)]
    pub source_url: Option<String>,
}

pub struct TakeNoteTool;

#[async_trait]
impl Tool for TakeNoteTool {
    fn name(&self) -> &str {
        TAKE_NOTE
    }

    fn description(&self) -> &str {
        "Record an important finding, optionally with the URL of its source. Notes are cited by their order: the first note is [1]."
    }

    fn parameters_schema(&self) -> Value {
        parameters_schema::<NoteArgs>()
    }

    async fn execute(&self, args: Value, state: &mut ResearchState) -> Result<Value, String> {
        let args: NoteArgs = parse_args(TAKE_NOTE, args)?;
        if args.content.trim().is_empty() {
            return Err("Note content is empty".to_string());
        }
        let note_id = state.notes.append(args.content, args.source_url);
        let position = state.notes.len();
        Ok(json!({
            "success": true,
            "note_id": note_id,
            "message": format!("Note {} recorded", position),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_note_is_appended() {
        let mut state = ResearchState::new();
        let out = TakeNoteTool
            .execute(json!({"content": "RBC profit rose", "source_url": "https://www.rbc.com/q3"}), &mut state)
            .await
            .unwrap();
        assert_eq!(out["success"], true);
        assert_eq!(out["message"], "Note 1 recorded");
        let note = state.notes.nth(1).unwrap();
        assert_eq!(note.id, out["note_id"].as_str().unwrap());
        assert_eq!(note.title, "Note from www.rbc.com");
    }

    #[tokio::test]
    async fn test_empty_note_is_rejected() {
        let mut state = ResearchState::new();
        assert!(TakeNoteTool.execute(json!({"content": "  "}), &mut state).await.is_err());
        assert!(state.notes.is_empty());
    }
}
