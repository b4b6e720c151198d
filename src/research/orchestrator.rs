//! 研究编排器：单轮「选工具 → 执行 → 生成回答 → 引用映射」
//!
//! 每个会话一个 Orchestrator，独占其来源库与笔记库；模型、工具执行器与策略通过 ResearchComponents 在会话间共享。
//! 任何错误都在本轮内被捕获，转为对话式错误回复，已完成工具写入的来源与笔记保留。

use std::sync::Arc;

use futures_util::StreamExt;
use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::mpsc::UnboundedSender;

use super::citations::{append_recent_sources, resolve_citations, CitedSource};
use super::classifier::{DecompositionDecision, QueryClassifier};
use super::events::{emit, ResearchEvent};
use super::strategy::Strategy;
use crate::core::{AgentError, TurnPhase};
use crate::llm::{LlmClient, ToolChoice};
use crate::memory::{Message, Note, ResearchState, ToolCall, Transcript};
use crate::tools::{failure, SubQuery, ToolExecutor, DECOMPOSE_QUERY, SEARCH_WEB, SUMMARIZE_SEARCH_RESULTS};

/// 会话间共享的研究组件
pub struct ResearchComponents {
    pub llm: Arc<dyn LlmClient>,
    pub executor: ToolExecutor,
    pub strategy: Strategy,
    pub classifier: Arc<dyn QueryClassifier>,
    /// 每轮最多几次「模型请求工具」
    pub max_tool_rounds: usize,
    /// 最终回答是否以 Token 流生成
    pub stream: bool,
}

/// 一次工具调用的记录（用于展示与审计）
#[derive(Clone, Debug, Serialize)]
pub struct ToolCallRecord {
    pub tool: String,
    pub arguments: Value,
    pub result: Value,
}

/// 单轮结果
#[derive(Clone, Debug, Serialize)]
pub struct TurnOutcome {
    pub success: bool,
    pub answer: String,
    pub sources: Vec<CitedSource>,
    pub unresolved_citations: Vec<u64>,
    pub tool_calls: Vec<ToolCallRecord>,
    pub notes: Vec<Note>,
    pub notes_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

fn is_success(result: &Value) -> bool {
    result.get("success").and_then(Value::as_bool).unwrap_or(false)
}

/// 会话级研究编排器
pub struct Orchestrator {
    components: Arc<ResearchComponents>,
    state: ResearchState,
    phase: TurnPhase,
}

impl Orchestrator {
    pub fn new(components: Arc<ResearchComponents>) -> Self {
        Self {
            components,
            state: ResearchState::new(),
            phase: TurnPhase::Idle,
        }
    }

    pub fn phase(&self) -> TurnPhase {
        self.phase
    }

    pub fn state(&self) -> &ResearchState {
        &self.state
    }

    /// 会话重置：清空笔记与来源，回到 Idle
    pub fn reset(&mut self) {
        self.state.reset();
        self.phase = TurnPhase::Idle;
        tracing::info!("research session reset");
    }

    fn advance(&mut self, next: TurnPhase) {
        if !self.phase.can_transition(next) {
            tracing::warn!(from = ?self.phase, to = ?next, "unexpected phase transition");
        }
        self.phase = next;
    }

    /// 处理一条用户消息；events 为 None 时不推送过程事件
    pub async fn run_turn(
        &mut self,
        user_message: &str,
        events: Option<&UnboundedSender<ResearchEvent>>,
    ) -> TurnOutcome {
        let strategy = self.components.strategy.clone();
        tracing::info!(protocol = %strategy.version, chars = user_message.chars().count(), "research turn started");
        self.advance(TurnPhase::ToolSelection);

        let mut trace = Vec::new();
        match self.drive(user_message, events, &mut trace).await {
            Ok(answer) => {
                let mut report = resolve_citations(&answer, strategy.citation, &self.state);
                if self.state.notes.is_empty() && strategy.recent_sources > 0 {
                    append_recent_sources(&mut report, &self.state, strategy.recent_sources);
                }
                if !report.unresolved.is_empty() {
                    tracing::warn!(unresolved = ?report.unresolved, "answer cites unknown sources");
                    emit(
                        events,
                        ResearchEvent::CitationWarning {
                            unresolved: report.unresolved.clone(),
                        },
                    );
                }
                self.advance(TurnPhase::Done);
                let outcome = TurnOutcome {
                    success: true,
                    answer,
                    sources: report.sources,
                    unresolved_citations: report.unresolved,
                    tool_calls: trace,
                    notes: self.state.notes.all().to_vec(),
                    notes_count: self.state.notes.len(),
                    error: None,
                };
                tracing::info!(
                    sources = outcome.sources.len(),
                    tool_calls = outcome.tool_calls.len(),
                    "research turn complete"
                );
                emit(events, ResearchEvent::Complete(Box::new(outcome.clone())));
                outcome
            }
            Err(e) => {
                tracing::error!(error = %e, debug = ?e, phase = ?self.phase, "research turn failed");
                self.advance(TurnPhase::Error);
                let message = e.to_string();
                emit(events, ResearchEvent::Error(message.clone()));
                TurnOutcome {
                    success: false,
                    answer: format!("I encountered an error: {}", message),
                    sources: Vec::new(),
                    unresolved_citations: Vec::new(),
                    tool_calls: trace,
                    notes: self.state.notes.all().to_vec(),
                    notes_count: self.state.notes.len(),
                    error: Some(message),
                }
            }
        }
    }

    /// 工具轮次 + 最终生成，返回回答文本
    async fn drive(
        &mut self,
        user_message: &str,
        events: Option<&UnboundedSender<ResearchEvent>>,
        trace: &mut Vec<ToolCallRecord>,
    ) -> Result<String, AgentError> {
        let c = self.components.clone();
        let mut transcript = Transcript::start(&c.strategy.system_prompt, user_message);
        let specs = c.executor.specs(&c.strategy.tools);

        let mut forced = None;
        if c.strategy.classify && c.strategy.offers(DECOMPOSE_QUERY) {
            if let DecompositionDecision::Decompose { reason } = c.classifier.classify(user_message).await {
                tracing::info!(reason = %reason, "forcing query decomposition");
                forced = Some(ToolChoice::Force(DECOMPOSE_QUERY.to_string()));
            }
        }

        emit(events, ResearchEvent::Status("Thinking...".to_string()));
        let rounds = c.max_tool_rounds.max(1);
        for round in 0..rounds {
            let choice = forced.take().unwrap_or(ToolChoice::Auto);
            let completion = c
                .llm
                .complete_with_tools(transcript.messages(), &specs, &choice)
                .await
                .map_err(AgentError::LlmError)?;

            if !completion.has_tool_calls() {
                self.advance(TurnPhase::FinalGeneration);
                let answer = completion.content.unwrap_or_default();
                if c.stream {
                    for piece in answer.split_inclusive(' ') {
                        emit(events, ResearchEvent::StreamChunk(piece.to_string()));
                    }
                }
                return Ok(answer);
            }

            self.advance(TurnPhase::ToolExecution);
            tracing::debug!(round, calls = completion.tool_calls.len(), "model requested tools");
            transcript.push(Message::assistant_tool_calls(
                completion.content.clone().unwrap_or_default(),
                completion.tool_calls.clone(),
            ));
            for call in &completion.tool_calls {
                let result = self.run_tool_call(call, events, trace).await;
                transcript.push(Message::tool(call.id.clone(), result.to_string()));
            }
            if round + 1 < rounds {
                self.advance(TurnPhase::ToolSelection);
            }
        }

        self.advance(TurnPhase::FinalGeneration);
        emit(events, ResearchEvent::Status("Generating answer...".to_string()));
        if c.stream {
            let mut stream = c
                .llm
                .complete_stream(transcript.messages())
                .await
                .map_err(AgentError::LlmError)?;
            let mut answer = String::new();
            while let Some(chunk) = stream.next().await {
                let chunk = chunk.map_err(AgentError::LlmError)?;
                if chunk.is_empty() {
                    continue;
                }
                answer.push_str(&chunk);
                emit(events, ResearchEvent::StreamChunk(chunk));
            }
            Ok(answer)
        } else {
            c.llm
                .complete(transcript.messages())
                .await
                .map_err(AgentError::LlmError)
        }
    }

    /// 执行模型请求的单个工具调用；任何失败都折叠为 `{success: false}` 结果
    async fn run_tool_call(
        &mut self,
        call: &ToolCall,
        events: Option<&UnboundedSender<ResearchEvent>>,
        trace: &mut Vec<ToolCallRecord>,
    ) -> Value {
        let c = self.components.clone();
        let raw = if call.arguments.trim().is_empty() { "{}" } else { call.arguments.as_str() };

        let (arguments, mut result) = match serde_json::from_str::<Value>(raw) {
            Err(e) => {
                let err = AgentError::JsonParseError(e.to_string());
                tracing::warn!(tool = %call.name, error = %err, "tool arguments are not valid JSON");
                (Value::String(call.arguments.clone()), failure(&err.to_string()))
            }
            Ok(_) if !c.strategy.offers(&call.name) => {
                let err = AgentError::UnknownTool(call.name.clone());
                tracing::warn!(tool = %call.name, "model requested a tool outside the strategy");
                (json!({}), failure(&err.to_string()))
            }
            Ok(args) => {
                emit(
                    events,
                    ResearchEvent::ToolUse {
                        tool: call.name.clone(),
                        arguments: args.clone(),
                    },
                );
                emit(events, ResearchEvent::Status(format!("Executing {}...", call.name)));
                let result = c.executor.execute_lenient(&call.name, args.clone(), &mut self.state).await;
                (args, result)
            }
        };

        if call.name == DECOMPOSE_QUERY
            && is_success(&result)
            && result.get("execute_searches").and_then(Value::as_bool).unwrap_or(true)
        {
            result = self.expand_decomposition(result, events).await;
        }

        emit(
            events,
            ResearchEvent::ToolResult {
                tool: call.name.clone(),
                success: is_success(&result),
                result: result.clone(),
            },
        );
        trace.push(ToolCallRecord {
            tool: call.name.clone(),
            arguments,
            result: result.clone(),
        });
        result
    }

    /// 依次执行分解出的子查询：搜索，成功则摘要；结果汇总回分解结果中
    async fn expand_decomposition(
        &mut self,
        mut result: Value,
        events: Option<&UnboundedSender<ResearchEvent>>,
    ) -> Value {
        let c = self.components.clone();
        let subs: Vec<SubQuery> = result
            .get("searches")
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default();

        let mut sub_searches = Vec::new();
        let mut summaries = Vec::new();
        let mut total_results = 0usize;
        for sub in subs {
            emit(events, ResearchEvent::Status(format!("Searching: {}", sub.query)));
            let args = json!({ "query": sub.query });
            emit(
                events,
                ResearchEvent::ToolUse {
                    tool: SEARCH_WEB.to_string(),
                    arguments: args.clone(),
                },
            );
            let search = c.executor.execute_lenient(SEARCH_WEB, args, &mut self.state).await;
            if !is_success(&search) {
                tracing::warn!(query = %sub.query, error = %search["error"], "sub-search failed, skipping");
                sub_searches.push(json!({
                    "query": sub.query,
                    "purpose": sub.purpose,
                    "success": false,
                    "error": search["error"],
                }));
                continue;
            }

            let results = search.get("results").cloned().unwrap_or_else(|| json!([]));
            total_results += results.as_array().map_or(0, Vec::len);
            sub_searches.push(json!({
                "query": sub.query,
                "purpose": sub.purpose,
                "success": true,
                "results": results,
            }));

            let summary = c
                .executor
                .execute_lenient(
                    SUMMARIZE_SEARCH_RESULTS,
                    json!({ "query": sub.query, "purpose": sub.purpose, "results": results }),
                    &mut self.state,
                )
                .await;
            if is_success(&summary) {
                summaries.push(json!({
                    "query": sub.query,
                    "purpose": sub.purpose,
                    "summary": summary["summary"],
                }));
            }
        }

        tracing::info!(sub_searches = sub_searches.len(), total_results, "decomposition expanded");
        if let Some(obj) = result.as_object_mut() {
            obj.insert("sub_searches".to_string(), Value::Array(sub_searches));
            obj.insert("summaries".to_string(), Value::Array(summaries));
            obj.insert("total_results".to_string(), json!(total_results));
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{Completion, ScriptedLlmClient};
    use crate::research::classifier::{Disabled, KeywordClassifier};
    use crate::research::strategy::ProtocolVersion;
    use crate::tools::{FetchPageTool, SearchWebTool, StaticTransport, TakeNoteTool, ToolRegistry};

    fn call(id: &str, name: &str, args: Value) -> ToolCall {
        ToolCall {
            id: id.to_string(),
            name: name.to_string(),
            arguments: args.to_string(),
        }
    }

    fn parts(llm: Arc<ScriptedLlmClient>, version: ProtocolVersion, stream: bool) -> ResearchComponents {
        let transport = Arc::new(
            StaticTransport::new().with_page(
                "https://x.com/",
                "text/html",
                "<html><head><title>X</title></head><body>x facts</body></html>",
            ),
        );
        let mut registry = ToolRegistry::new();
        registry.register(SearchWebTool::new(transport.clone(), "https://search.test/html/", 5));
        registry.register(FetchPageTool::new(transport, 3000));
        registry.register(TakeNoteTool);
        ResearchComponents {
            llm,
            executor: ToolExecutor::new(registry, 5),
            strategy: Strategy::for_version(version),
            classifier: Arc::new(Disabled),
            max_tool_rounds: 1,
            stream,
        }
    }

    fn components(llm: Arc<ScriptedLlmClient>, version: ProtocolVersion, stream: bool) -> Arc<ResearchComponents> {
        Arc::new(parts(llm, version, stream))
    }

    #[tokio::test]
    async fn test_direct_answer_without_tools() {
        let llm = Arc::new(ScriptedLlmClient::new().with_tool_reply(Completion::text("Plain answer")));
        let mut orch = Orchestrator::new(components(llm.clone(), ProtocolVersion::V1, false));
        let out = orch.run_turn("hi", None).await;
        assert!(out.success);
        assert_eq!(out.answer, "Plain answer");
        assert_eq!(orch.phase(), TurnPhase::Done);
        assert_eq!(llm.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_numeric_citations_follow_notes() {
        let llm = Arc::new(
            ScriptedLlmClient::new()
                .with_tool_reply(Completion::tools(vec![
                    call("c1", "fetch_page_content", json!({"url": "https://x.com/"})),
                    call("c2", "take_note", json!({"content": "x fact", "source_url": "https://x.com/"})),
                ]))
                .with_text_reply("X is true [1]. Also [4]."),
        );
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let mut orch = Orchestrator::new(components(llm.clone(), ProtocolVersion::V1, false));
        let out = orch.run_turn("tell me about x", Some(&tx)).await;

        assert!(out.success);
        assert_eq!(out.sources.len(), 1);
        assert_eq!(out.sources[0].title, "X");
        assert_eq!(out.unresolved_citations, vec![4]);
        assert_eq!(out.tool_calls.len(), 2);
        assert_eq!(out.notes_count, 1);

        // final call carries the tool results and no tools
        let calls = llm.calls();
        let last = calls.last().unwrap();
        assert!(last.tool_names.is_empty());
        assert_eq!(last.messages.iter().filter(|m| m.role == crate::memory::Role::Tool).count(), 2);

        drop(tx);
        let mut kinds = Vec::new();
        while let Some(ev) = rx.recv().await {
            kinds.push(serde_json::to_value(&ev).unwrap()["type"].as_str().unwrap().to_string());
        }
        assert!(kinds.contains(&"citation_warning".to_string()));
        assert_eq!(kinds.last().map(String::as_str), Some("complete"));
    }

    #[tokio::test]
    async fn test_bad_arguments_and_foreign_tools_become_failures() {
        let llm = Arc::new(
            ScriptedLlmClient::new()
                .with_tool_reply(Completion::tools(vec![
                    ToolCall {
                        id: "c1".into(),
                        name: "search_web".into(),
                        arguments: "{not json".into(),
                    },
                    call("c2", "decompose_query", json!({"complex_query": "x"})),
                ]))
                .with_text_reply("done"),
        );
        let mut orch = Orchestrator::new(components(llm, ProtocolVersion::V1, false));
        let out = orch.run_turn("q", None).await;
        assert!(out.success);
        assert_eq!(out.tool_calls[0].result["success"], false);
        assert!(out.tool_calls[0].result["error"].as_str().unwrap().contains("JSON"));
        assert!(out.tool_calls[1].result["error"].as_str().unwrap().contains("Unknown tool"));
    }

    #[tokio::test]
    async fn test_model_failure_becomes_conversational_error() {
        let llm = Arc::new(
            ScriptedLlmClient::new()
                .with_tool_reply(Completion::tools(vec![call(
                    "c1",
                    "take_note",
                    json!({"content": "kept"}),
                )]))
                .with_text_error("upstream 500"),
        );
        let mut orch = Orchestrator::new(components(llm, ProtocolVersion::V2, false));
        let out = orch.run_turn("q", None).await;
        assert!(!out.success);
        assert!(out.answer.starts_with("I encountered an error:"));
        assert!(out.answer.contains("upstream 500"));
        assert_eq!(orch.phase(), TurnPhase::Error);
        // notes written before the failure survive
        assert_eq!(orch.state().notes.len(), 1);
    }

    #[tokio::test]
    async fn test_keyword_classifier_forces_decomposition() {
        let llm = Arc::new(ScriptedLlmClient::new().with_tool_reply(Completion::text("ok")));
        let mut p = parts(llm.clone(), ProtocolVersion::V3, false);
        p.classifier = Arc::new(KeywordClassifier::new(&["big 6".to_string()]));
        let mut orch = Orchestrator::new(Arc::new(p));
        orch.run_turn("How are the big 6 banks doing?", None).await;
        assert_eq!(
            llm.calls()[0].choice,
            Some(ToolChoice::Force(DECOMPOSE_QUERY.to_string()))
        );
    }

    #[tokio::test]
    async fn test_reset_clears_state() {
        let llm = Arc::new(
            ScriptedLlmClient::new()
                .with_tool_reply(Completion::tools(vec![call("c1", "take_note", json!({"content": "n"}))]))
                .with_text_reply("a"),
        );
        let mut orch = Orchestrator::new(components(llm, ProtocolVersion::V2, false));
        orch.run_turn("q", None).await;
        assert_eq!(orch.state().notes.len(), 1);
        orch.reset();
        assert!(orch.state().notes.is_empty());
        assert!(orch.state().sources.is_empty());
        assert_eq!(orch.phase(), TurnPhase::Idle);
    }
}
