//! 研究过程事件：经 mpsc 通道推送给前端（WebSocket / CLI），序列化为 `{type, data}`

use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc::UnboundedSender;

use super::TurnOutcome;

/// 单轮研究中的过程事件
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ResearchEvent {
    /// 阶段提示（"Searching..."、"Generating answer..."）
    Status(String),
    /// 即将执行工具
    ToolUse { tool: String, arguments: Value },
    /// 工具执行完毕
    ToolResult { tool: String, success: bool, result: Value },
    /// 最终回答的一段文本
    StreamChunk(String),
    /// 回答中存在无法解析的引用标记
    CitationWarning { unresolved: Vec<u64> },
    /// 本轮完成
    Complete(Box<TurnOutcome>),
    /// 本轮失败
    Error(String),
}

/// 推送事件；接收端已关闭时静默丢弃
pub(crate) fn emit(events: Option<&UnboundedSender<ResearchEvent>>, event: ResearchEvent) {
    if let Some(tx) = events {
        let _ = tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wire_shape_is_type_and_data() {
        let v = serde_json::to_value(ResearchEvent::Status("Searching".into())).unwrap();
        assert_eq!(v, json!({"type": "status", "data": "Searching"}));

        let v = serde_json::to_value(ResearchEvent::ToolUse {
            tool: "search_web".into(),
            arguments: json!({"query": "q"}),
        })
        .unwrap();
        assert_eq!(v["type"], "tool_use");
        assert_eq!(v["data"]["tool"], "search_web");

        let v = serde_json::to_value(ResearchEvent::CitationWarning { unresolved: vec![7] }).unwrap();
        assert_eq!(v["type"], "citation_warning");
        assert_eq!(v["data"]["unresolved"], json!([7]));
    }

    #[test]
    fn test_emit_ignores_closed_receiver() {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        drop(rx);
        emit(Some(&tx), ResearchEvent::StreamChunk("x".into()));
        emit(None, ResearchEvent::StreamChunk("y".into()));
    }
}
