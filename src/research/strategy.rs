//! 研究策略：协议版本 -> 系统提示词、可用工具、引用格式、最近来源补充条数
//!
//! | 版本 | 工具 | 引用格式 | 最近来源 | 分解判定 |
//! |------|------|----------|----------|----------|
//! | v1 | search / fetch / note | `[n]` | 0 | 否 |
//! | v2 | search / fetch / note | `[n]` | 5 | 否 |
//! | v3 | + decompose / summarize | `LINK_INDEX:n` | 5 | 是 |

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::config::ResearchSection;
use crate::core::AgentError;
use crate::tools::{DECOMPOSE_QUERY, FETCH_PAGE_CONTENT, SEARCH_WEB, SUMMARIZE_SEARCH_RESULTS, TAKE_NOTE};

const V1_PROMPT: &str = "You are a helpful research assistant. When answering questions:
1. Search for relevant information if needed
2. Take notes on important findings with source URLs
3. Provide comprehensive answers with citations
4. Format citations as [1], [2], etc. in your response, where [n] is the n-th note you took
5. Always cite your sources when using web information";

const V2_PROMPT: &str = "You are a helpful research assistant with access to web search and page fetching. When answering questions:
1. Search for relevant information if needed
2. Fetch detailed content from promising sources
3. Take notes on important findings with source URLs
4. Provide comprehensive answers with citations
5. Format citations as [1], [2], etc. in your response, where [n] is the n-th note you took
6. Always cite your sources when using web information";

const V3_PROMPT: &str = "You are a research assistant with web search, page fetching, query decomposition and summarization tools.
- For questions about several entities (for example \"the big 6 banks\" or \"compare X and Y\"), call decompose_query first; its sub-searches are run and summarized for you.
- Otherwise search, then fetch the most promising pages.
- Every search result and fetched page carries an \"index\". Cite a source by writing LINK_INDEX:<index> right after the claim it supports, e.g. \"Profits rose 4% LINK_INDEX:3\".
- Only cite indices that appeared in tool results. Do not invent indices and do not use [n] brackets.";

/// 协议版本
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolVersion {
    V1,
    V2,
    V3,
}

impl FromStr for ProtocolVersion {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "v1" | "1" => Ok(Self::V1),
            "v2" | "2" => Ok(Self::V2),
            "v3" | "3" => Ok(Self::V3),
            other => Err(AgentError::ConfigError(format!("Unknown research protocol: {}", other))),
        }
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::V1 => "v1",
            Self::V2 => "v2",
            Self::V3 => "v3",
        };
        f.write_str(s)
    }
}

/// 回答中的引用标记格式
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CitationFormat {
    /// `[n]`：第 n 条笔记
    Numeric,
    /// `LINK_INDEX:n`：展示序号为 n 的来源
    LinkIndex,
}

/// 一个协议版本对应的完整策略
#[derive(Clone, Debug)]
pub struct Strategy {
    pub version: ProtocolVersion,
    pub system_prompt: String,
    pub tools: Vec<String>,
    pub citation: CitationFormat,
    /// 无笔记时补充的最近来源条数，0 表示不补充
    pub recent_sources: usize,
    /// 首轮是否参考分解判定
    pub classify: bool,
}

impl Strategy {
    pub fn for_version(version: ProtocolVersion) -> Self {
        let base = vec![SEARCH_WEB.to_string(), FETCH_PAGE_CONTENT.to_string(), TAKE_NOTE.to_string()];
        match version {
            ProtocolVersion::V1 => Self {
                version,
                system_prompt: V1_PROMPT.to_string(),
                tools: base,
                citation: CitationFormat::Numeric,
                recent_sources: 0,
                classify: false,
            },
            ProtocolVersion::V2 => Self {
                version,
                system_prompt: V2_PROMPT.to_string(),
                tools: base,
                citation: CitationFormat::Numeric,
                recent_sources: 5,
                classify: false,
            },
            ProtocolVersion::V3 => {
                let mut tools = base;
                tools.push(DECOMPOSE_QUERY.to_string());
                tools.push(SUMMARIZE_SEARCH_RESULTS.to_string());
                Self {
                    version,
                    system_prompt: V3_PROMPT.to_string(),
                    tools,
                    citation: CitationFormat::LinkIndex,
                    recent_sources: 5,
                    classify: true,
                }
            }
        }
    }

    /// 按 [research] 配置选择策略；recent_sources 可被配置覆盖
    pub fn from_config(cfg: &ResearchSection) -> Result<Self, AgentError> {
        let mut strategy = Self::for_version(cfg.protocol.parse()?);
        if let Some(n) = cfg.recent_sources {
            strategy.recent_sources = n;
        }
        Ok(strategy)
    }

    pub fn offers(&self, tool: &str) -> bool {
        self.tools.iter().any(|t| t == tool)
    }
}

impl Default for Strategy {
    fn default() -> Self {
        Self::for_version(ProtocolVersion::V3)
    }
}
