//! 查询分解判定：决定首轮是否强制调用 decompose_query
//!
//! keywords：大小写不敏感的触发词子串匹配；model：单独一次模型调用，返回 `{"decompose": bool, "reason": ".."}`；off：从不强制。

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use crate::config::ResearchSection;
use crate::core::AgentError;
use crate::llm::LlmClient;
use crate::memory::Message;
use crate::tools::decompose::strip_code_fences;

const CLASSIFIER_PROMPT: &str = "Decide whether a research question names several distinct entities \
(companies, banks, products, countries) that each need their own web search. \
Answer with JSON only: {\"decompose\": true|false, \"reason\": \"<short reason>\"}.";

/// 分解判定结果
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DecompositionDecision {
    Decompose { reason: String },
    FreeSelection,
}

#[async_trait]
pub trait QueryClassifier: Send + Sync {
    async fn classify(&self, query: &str) -> DecompositionDecision;
}

/// 关键词判定
pub struct KeywordClassifier {
    triggers: Vec<String>,
}

impl KeywordClassifier {
    pub fn new(triggers: &[String]) -> Self {
        Self {
            triggers: triggers
                .iter()
                .map(|t| t.to_lowercase())
                .filter(|t| !t.trim().is_empty())
                .collect(),
        }
    }
}

#[async_trait]
impl QueryClassifier for KeywordClassifier {
    async fn classify(&self, query: &str) -> DecompositionDecision {
        // 两端补空格，使 " vs " 这类带空格的触发词也能匹配首尾
        let haystack = format!(" {} ", query.to_lowercase());
        match self.triggers.iter().find(|t| haystack.contains(t.as_str())) {
            Some(t) => DecompositionDecision::Decompose {
                reason: format!("matched trigger '{}'", t.trim()),
            },
            None => DecompositionDecision::FreeSelection,
        }
    }
}

#[derive(Deserialize)]
struct ModelVerdict {
    decompose: bool,
    #[serde(default)]
    reason: String,
}

/// 模型判定；调用失败或回复无法解析时不强制分解
pub struct ModelClassifier {
    llm: Arc<dyn LlmClient>,
}

impl ModelClassifier {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl QueryClassifier for ModelClassifier {
    async fn classify(&self, query: &str) -> DecompositionDecision {
        let messages = [Message::system(CLASSIFIER_PROMPT), Message::user(query)];
        let raw = match self.llm.complete(&messages).await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(error = %e, "classifier call failed");
                return DecompositionDecision::FreeSelection;
            }
        };
        match serde_json::from_str::<ModelVerdict>(strip_code_fences(&raw)) {
            Ok(v) if v.decompose => DecompositionDecision::Decompose { reason: v.reason },
            Ok(_) => DecompositionDecision::FreeSelection,
            Err(e) => {
                tracing::warn!(error = %e, raw = %raw, "classifier reply unparsable");
                DecompositionDecision::FreeSelection
            }
        }
    }
}

pub struct Disabled;

#[async_trait]
impl QueryClassifier for Disabled {
    async fn classify(&self, _query: &str) -> DecompositionDecision {
        DecompositionDecision::FreeSelection
    }
}

/// 按 research.classifier 选择实现
pub fn classifier_from_config(
    cfg: &ResearchSection,
    llm: Arc<dyn LlmClient>,
) -> Result<Arc<dyn QueryClassifier>, AgentError> {
    match cfg.classifier.trim().to_lowercase().as_str() {
        "keywords" | "keyword" => Ok(Arc::new(KeywordClassifier::new(&cfg.decompose_triggers))),
        "model" => Ok(Arc::new(ModelClassifier::new(llm))),
        "off" | "none" | "disabled" => Ok(Arc::new(Disabled)),
        other => Err(AgentError::ConfigError(format!("Unknown classifier: {}", other))),
    }
}
