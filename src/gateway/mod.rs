//! 网关：会话注册表、消息协议与 HTTP / WebSocket 服务
//!
//! 每个 session_id 独立持有一个 Orchestrator；同一会话内的多轮请求串行执行，不同会话互不影响。
//! server 模块依赖 axum，仅在 `web` feature 下编译。

mod message;
#[cfg(feature = "web")]
mod server;
mod session;

pub use message::{parse_client_message, ClientMessage, ControlMessage, ServerMessage};
#[cfg(feature = "web")]
pub use server::{router, serve};
pub use session::{SessionId, SessionRegistry};
