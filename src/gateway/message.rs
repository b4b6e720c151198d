//! 网关消息协议
//!
//! 入站（客户端 -> 服务端）：`{"type": "chat", "message": ".."}`、`{"type": "reset"}`、`{"type": "ping"}`。
//! 出站（服务端 -> 客户端）：研究过程事件与连接控制消息，统一为 `{type, data}`。

use serde::{Deserialize, Serialize};

use crate::research::ResearchEvent;

/// 客户端发来的消息
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Chat { message: String },
    Reset,
    Ping,
}

/// 连接级控制消息
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ControlMessage {
    Connected { session_id: String },
    Cleared { session_id: String },
    Pong,
}

/// 发往客户端的消息
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ServerMessage {
    Event(ResearchEvent),
    Control(ControlMessage),
}

impl ServerMessage {
    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Event(ResearchEvent::Error(message.into()))
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            format!(r#"{{"type":"error","data":"serialize failed: {}"}}"#, e)
        })
    }
}

impl From<ResearchEvent> for ServerMessage {
    fn from(e: ResearchEvent) -> Self {
        ServerMessage::Event(e)
    }
}

impl From<ControlMessage> for ServerMessage {
    fn from(c: ControlMessage) -> Self {
        ServerMessage::Control(c)
    }
}

/// 解析入站文本；失败时返回可直接发给客户端的错误描述
pub fn parse_client_message(text: &str) -> Result<ClientMessage, String> {
    serde_json::from_str(text).map_err(|e| format!("Invalid message: {}", e))
}
