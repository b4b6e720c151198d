//! 研究工具箱：search_web、fetch_page_content、take_note、decompose_query、summarize_search_results
//!
//! 工具通过 WebTransport 访问网络、通过 LlmClient 调用模型，结果统一为带 `success` 字段的 JSON。

pub mod decompose;
pub mod executor;
pub mod fetch;
pub mod note;
pub mod registry;
pub mod schema;
pub mod search;
pub mod summarize;
pub mod web;

pub const SEARCH_WEB: &str = "search_web";
pub const FETCH_PAGE_CONTENT: &str = "fetch_page_content";
pub const TAKE_NOTE: &str = "take_note";
pub const DECOMPOSE_QUERY: &str = "decompose_query";
pub const SUMMARIZE_SEARCH_RESULTS: &str = "summarize_search_results";

pub use decompose::{DecomposeQueryTool, SubQuery};
pub use executor::{failure, ToolExecutor};
pub use fetch::FetchPageTool;
pub use note::TakeNoteTool;
pub use registry::{Tool, ToolRegistry};
pub use search::{SearchHit, SearchWebTool};
pub use summarize::SummarizeResultsTool;
pub use web::{FetchedPage, HttpTransport, StaticTransport, TransportError, WebTransport};
