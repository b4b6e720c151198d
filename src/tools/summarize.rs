//! summarize_search_results：把一组搜索结果交给模型做按媒体署名的摘要

use std::sync::Arc;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::llm::LlmClient;
use crate::memory::{url_domain, Message, ResearchState};
use crate::tools::schema::{parameters_schema, parse_args};
use crate::tools::search::SearchHit;
use crate::tools::{Tool, SUMMARIZE_SEARCH_RESULTS};

const SUMMARIZE_SYSTEM_PROMPT: &str = "You summarize web search results for a research assistant. \
Attribute every fact to its outlet by name (for example \"according to Reuters\"). \
Never use numeric citations such as [1]. Keep it to one short paragraph.";

/// summarize_search_results 参数
#[derive(Debug, Deserialize, JsonSchema)]
pub struct SummarizeArgs {
    /// The search query that produced the results
    pub query: String,
    /// What this search was meant to find out
    #[serde(default)]
    pub purpose: String,
    /// Results as returned by search_web
    #[serde(default)]
    pub results: Vec<SearchHit>,
}

/// summarize_search_results 工具
pub struct SummarizeResultsTool {
    llm: Arc<dyn LlmClient>,
    top_n: usize,
}

impl SummarizeResultsTool {
    pub fn new(llm: Arc<dyn LlmClient>, top_n: usize) -> Self {
        Self { llm, top_n }
    }

    fn render(&self, args: &SummarizeArgs) -> String {
        let mut out = format!("Query: {}\n", args.query);
        if !args.purpose.is_empty() {
            out.push_str(&format!("Purpose: {}\n", args.purpose));
        }
        out.push_str("\nResults:\n");
        for hit in args.results.iter().take(self.top_n) {
            let outlet = url_domain(&hit.url).unwrap_or_default();
            out.push_str(&format!(
                "- {} ({})\n  {}\n  {}\n",
                hit.title, outlet, hit.snippet, hit.url
            ));
        }
        out
    }
}

#[async_trait]
impl Tool for SummarizeResultsTool {
    fn name(&self) -> &str {
        SUMMARIZE_SEARCH_RESULTS
    }

    fn description(&self) -> &str {
        "Summarize search results, attributing each fact to its news outlet by name."
    }

    fn parameters_schema(&self) -> Value {
        parameters_schema::<SummarizeArgs>()
    }

    async fn execute(&self, args: Value, _state: &mut ResearchState) -> Result<Value, String> {
        let args: SummarizeArgs = parse_args(SUMMARIZE_SEARCH_RESULTS, args)?;
        if args.results.is_empty() {
            return Ok(json!({
                "success": false,
                "query": args.query,
                "error": "No results to summarize",
            }));
        }
        let messages = [Message::system(SUMMARIZE_SYSTEM_PROMPT), Message::user(self.render(&args))];
        let summary = self.llm.complete(&messages).await?;
        Ok(json!({
            "success": true,
            "query": args.query,
            "purpose": args.purpose,
            "summary": summary.trim(),
            "sources_used": args.results.len().min(self.top_n),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ScriptedLlmClient;

    fn hit(i: usize) -> Value {
        json!({"url": format!("https://outlet{}.com/a", i), "title": format!("T{}", i), "snippet": "s"})
    }

    #[tokio::test]
    async fn test_empty_results_fail_without_model_call() {
        let llm = Arc::new(ScriptedLlmClient::new());
        let tool = SummarizeResultsTool::new(llm.clone(), 5);
        let mut state = ResearchState::new();
        let out = tool
            .execute(json!({"query": "q", "purpose": "p", "results": []}), &mut state)
            .await
            .unwrap();
        assert_eq!(out["success"], false);
        assert!(llm.calls().is_empty());
    }

    #[tokio::test]
    async fn test_only_top_n_results_reach_model() {
        let llm = Arc::new(ScriptedLlmClient::new().with_text_reply(" According to outlet0, things happened. "));
        let tool = SummarizeResultsTool::new(llm.clone(), 2);
        let mut state = ResearchState::new();
        let results: Vec<Value> = (0..4).map(hit).collect();
        let out = tool
            .execute(json!({"query": "q", "purpose": "p", "results": results}), &mut state)
            .await
            .unwrap();
        assert_eq!(out["summary"], "According to outlet0, things happened.");
        assert_eq!(out["sources_used"], 2);
        let prompt = &llm.calls()[0].messages[1].content;
        assert!(prompt.contains("outlet1.com"));
        assert!(!prompt.contains("outlet2.com"));
    }
}
