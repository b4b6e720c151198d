//! LLM 层：客户端抽象与实现（OpenAI 兼容 / Mock / 脚本化）、OAuth 凭据

pub mod auth;
pub mod mock;
pub mod openai;
pub mod traits;

pub use auth::fetch_oauth_token;
pub use mock::{CallKind, MockLlmClient, RecordedCall, ScriptedLlmClient};
pub use openai::{OpenAiClient, TokenUsage};
pub use traits::{Completion, LlmClient, TokenStream, ToolChoice, ToolSpec};
