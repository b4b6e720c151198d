//! decompose_query：请模型把多实体问题拆成一组有序子查询
//!
//! 模型应返回 JSON 数组 `[{query, purpose}]`（也接受 `{"searches": [...]}`），代码围栏会先被去掉。
//! 解析失败直接报告失败并附带原始回复，不做任何回退拆分。

use std::sync::Arc;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::llm::LlmClient;
use crate::memory::{Message, ResearchState};
use crate::tools::schema::{parameters_schema, parse_args};
use crate::tools::{Tool, DECOMPOSE_QUERY};

const DEFAULT_NUM_SEARCHES: usize = 4;
const MAX_NUM_SEARCHES: usize = 8;

const DECOMPOSE_SYSTEM_PROMPT: &str = "You split complex research questions into focused web searches. \
Produce one search per entity the question names, plus one for market or regulatory context when it matters. \
Respond with JSON only: an array of objects with keys \"query\" and \"purpose\". No commentary.";

fn default_true() -> bool {
    true
}

/// decompose_query 参数
#[derive(Debug, Deserialize, JsonSchema)]
pub struct DecomposeArgs {
    /// The multi-entity question to split
    pub complex_query: String,
    /// How many sub-searches to produce (1-8, default 4)
    #[serde(default)]
    pub num_searches: Option<usize>,
    /// Whether the sub-searches should be run right away (default true)
    #[serde(default = "default_true")]
    pub execute_searches: bool,
}

/// 一个子查询
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SubQuery {
    pub query: String,
    #[serde(default)]
    pub purpose: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SubQueryList {
    List(Vec<SubQuery>),
    Wrapped { searches: Vec<SubQuery> },
}

/// 去掉 ```json ... ``` 围栏
pub fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = rest.split_once('\n').map(|(_, b)| b).unwrap_or("");
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

/// 解析模型回复为子查询列表（空查询被丢弃）
pub fn parse_sub_queries(raw: &str) -> Result<Vec<SubQuery>, String> {
    let parsed: SubQueryList =
        serde_json::from_str(strip_code_fences(raw)).map_err(|e| format!("Decomposition is not valid JSON: {}", e))?;
    let list = match parsed {
        SubQueryList::List(l) => l,
        SubQueryList::Wrapped { searches } => searches,
    };
    let list: Vec<SubQuery> = list.into_iter().filter(|s| !s.query.trim().is_empty()).collect();
    if list.is_empty() {
        return Err("Decomposition produced no sub-queries".to_string());
    }
    Ok(list)
}

/// decompose_query 工具
pub struct DecomposeQueryTool {
    llm: Arc<dyn LlmClient>,
}

impl DecomposeQueryTool {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl Tool for DecomposeQueryTool {
    fn name(&self) -> &str {
        DECOMPOSE_QUERY
    }

    fn description(&self) -> &str {
        "Split a question about several entities (e.g. several banks or companies) into focused sub-searches. \
         Use this first for comparisons and multi-entity questions."
    }

    fn parameters_schema(&self) -> Value {
        parameters_schema::<DecomposeArgs>()
    }

    async fn execute(&self, args: Value, _state: &mut ResearchState) -> Result<Value, String> {
        let args: DecomposeArgs = parse_args(DECOMPOSE_QUERY, args)?;
        let num = args
            .num_searches
            .unwrap_or(DEFAULT_NUM_SEARCHES)
            .clamp(1, MAX_NUM_SEARCHES);

        let messages = [
            Message::system(DECOMPOSE_SYSTEM_PROMPT),
            Message::user(format!(
                "Question: {}\nProduce at most {} searches.",
                args.complex_query, num
            )),
        ];
        let raw = self.llm.complete(&messages).await?;

        match parse_sub_queries(&raw) {
            Ok(mut searches) => {
                searches.truncate(num);
                tracing::info!(query = %args.complex_query, count = searches.len(), "query decomposed");
                Ok(json!({
                    "success": true,
                    "original_query": args.complex_query,
                    "searches": searches,
                    "execute_searches": args.execute_searches,
                }))
            }
            Err(e) => {
                tracing::warn!(error = %e, "decomposition response unparsable");
                Ok(json!({
                    "success": false,
                    "error": e,
                    "raw_response": raw,
                }))
            }
        }
    }
}
