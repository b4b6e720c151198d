//! Mock LLM 客户端
//!
//! - MockLlmClient：未配置 API Key 时使用，直接回显用户问题，不请求工具
//! - ScriptedLlmClient：按脚本依次返回预设回复并记录每次调用，供测试驱动完整研究流程

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use futures_util::stream;

use crate::llm::{Completion, LlmClient, TokenStream, ToolChoice, ToolSpec};
use crate::memory::{Message, Role};

/// 流式输出时每段字符数
const CHUNK_CHARS: usize = 8;

fn chunked(text: &str) -> TokenStream {
    let chars: Vec<char> = text.chars().collect();
    let chunks: Vec<Result<String, String>> = chars
        .chunks(CHUNK_CHARS)
        .map(|c| Ok(c.iter().collect()))
        .collect();
    Box::pin(stream::iter(chunks))
}

fn last_user(messages: &[Message]) -> &str {
    messages
        .iter()
        .rev()
        .find(|m| m.role == Role::User)
        .map(|m| m.content.as_str())
        .unwrap_or("(no input)")
}

/// Mock 客户端：回显用户最后一条消息
#[derive(Debug, Default)]
pub struct MockLlmClient;

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, String> {
        Ok(format!("Mock answer (no model configured): {}", last_user(messages)))
    }

    async fn complete_with_tools(
        &self,
        messages: &[Message],
        _tools: &[ToolSpec],
        _choice: &ToolChoice,
    ) -> Result<Completion, String> {
        Ok(Completion::text(self.complete(messages).await?))
    }

    async fn complete_stream(&self, messages: &[Message]) -> Result<TokenStream, String> {
        Ok(chunked(&self.complete(messages).await?))
    }

    fn model_name(&self) -> &str {
        "mock"
    }
}

/// 调用类型
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CallKind {
    Text,
    Tools,
    Stream,
}

/// 一次被记录的模型调用
#[derive(Clone, Debug)]
pub struct RecordedCall {
    pub kind: CallKind,
    pub messages: Vec<Message>,
    pub tool_names: Vec<String>,
    pub choice: Option<ToolChoice>,
}

/// 脚本化客户端：工具回复与文本回复各一条队列，按调用顺序消费；队列耗尽时返回错误
#[derive(Debug, Default)]
pub struct ScriptedLlmClient {
    tool_replies: Mutex<VecDeque<Result<Completion, String>>>,
    text_replies: Mutex<VecDeque<Result<String, String>>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加一条 complete_with_tools 的回复
    pub fn with_tool_reply(self, reply: Completion) -> Self {
        self.push_tool(Ok(reply));
        self
    }

    /// 追加一条 complete / complete_stream 的文本回复
    pub fn with_text_reply(self, reply: impl Into<String>) -> Self {
        self.push_text(Ok(reply.into()));
        self
    }

    /// 追加一条失败的文本回复
    pub fn with_text_error(self, err: impl Into<String>) -> Self {
        self.push_text(Err(err.into()));
        self
    }

    /// 追加一条失败的工具回复
    pub fn with_tool_error(self, err: impl Into<String>) -> Self {
        self.push_tool(Err(err.into()));
        self
    }

    fn push_tool(&self, reply: Result<Completion, String>) {
        if let Ok(mut q) = self.tool_replies.lock() {
            q.push_back(reply);
        }
    }

    fn push_text(&self, reply: Result<String, String>) {
        if let Ok(mut q) = self.text_replies.lock() {
            q.push_back(reply);
        }
    }

    /// 目前为止的全部调用记录
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    fn record(&self, kind: CallKind, messages: &[Message], tools: &[ToolSpec], choice: Option<&ToolChoice>) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(RecordedCall {
                kind,
                messages: messages.to_vec(),
                tool_names: tools.iter().map(|t| t.name.clone()).collect(),
                choice: choice.cloned(),
            });
        }
    }

    fn next_text(&self) -> Result<String, String> {
        self.text_replies
            .lock()
            .ok()
            .and_then(|mut q| q.pop_front())
            .unwrap_or_else(|| Err("Scripted text replies exhausted".to_string()))
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, String> {
        self.record(CallKind::Text, messages, &[], None);
        self.next_text()
    }

    async fn complete_with_tools(
        &self,
        messages: &[Message],
        tools: &[ToolSpec],
        choice: &ToolChoice,
    ) -> Result<Completion, String> {
        self.record(CallKind::Tools, messages, tools, Some(choice));
        self.tool_replies
            .lock()
            .ok()
            .and_then(|mut q| q.pop_front())
            .unwrap_or_else(|| Err("Scripted tool replies exhausted".to_string()))
    }

    async fn complete_stream(&self, messages: &[Message]) -> Result<TokenStream, String> {
        self.record(CallKind::Stream, messages, &[], None);
        Ok(chunked(&self.next_text()?))
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}
