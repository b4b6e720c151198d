//! search_web：抓取搜索引擎 HTML 结果页并解析结果块
//!
//! 结果块依赖 `.result` / `a.result__a` / `.result__snippet` / `.result__url` 等类名；跳转链接从 `uddg`（其次 `kh`）
//! 参数解包。页面结构变化时只会得到零条结果，不会报错。每条结果写入来源库并带回其展示序号。

use std::sync::Arc;

use async_trait::async_trait;
use schemars::JsonSchema;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use url::Url;

use crate::memory::ResearchState;
use crate::tools::schema::{parameters_schema, parse_args};
use crate::tools::web::WebTransport;
use crate::tools::{Tool, SEARCH_WEB};

/// 一条搜索结果
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SearchHit {
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub snippet: String,
}

/// search_web 参数
#[derive(Debug, Deserialize, JsonSchema)]
pub struct SearchArgs {
    /// The search query
    pub query: String,
}

/// 把结果页中的跳转链接还原为目标 URL
fn unwrap_redirect(href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() {
        return None;
    }
    let absolute = if href.starts_with("//") {
        format!("https:{}", href)
    } else if href.starts_with('/') {
        format!("https://duckduckgo.com{}", href)
    } else {
        href.to_string()
    };
    if let Ok(parsed) = Url::parse(&absolute) {
        for key in ["uddg", "kh"] {
            let target = parsed
                .query_pairs()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.into_owned());
            if let Some(target) = target.filter(|t| t.starts_with("http")) {
                return Some(target);
            }
        }
    }
    absolute.starts_with("http").then_some(absolute)
}

fn selector(css: &'static str) -> Selector {
    Selector::parse(css).expect("valid result selector")
}

fn element_text(el: ElementRef<'_>) -> String {
    el.text().collect::<Vec<_>>().join(" ").split_whitespace().collect::<Vec<_>>().join(" ")
}

/// 解析结果页，最多返回 max_results 条
pub fn parse_search_results(html: &str, max_results: usize) -> Vec<SearchHit> {
    let doc = Html::parse_document(html);
    let result_sel = selector(".result");
    let link_sel = selector("a.result__a");
    let snippet_sel = selector(".result__snippet");
    let url_sel = selector(".result__url");

    let mut hits = Vec::new();
    for block in doc.select(&result_sel) {
        if hits.len() >= max_results {
            break;
        }
        if block.value().classes().any(|c| c == "result--ad") {
            continue;
        }
        let link = block.select(&link_sel).next();
        let from_link = link
            .and_then(|a| a.value().attr("href"))
            .and_then(unwrap_redirect);
        let from_display = || {
            block.select(&url_sel).next().map(element_text).and_then(|u| {
                let u = u.trim().to_string();
                if u.is_empty() {
                    None
                } else if u.starts_with("http") {
                    Some(u)
                } else {
                    Some(format!("https://{}", u))
                }
            })
        };
        let Some(url) = from_link.or_else(from_display) else {
            continue;
        };
        let title = link
            .map(element_text)
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| "No title".to_string());
        let snippet = block
            .select(&snippet_sel)
            .next()
            .map(element_text)
            .unwrap_or_default();
        hits.push(SearchHit { url, title, snippet });
    }
    hits
}

/// search_web 工具
pub struct SearchWebTool {
    transport: Arc<dyn WebTransport>,
    endpoint: String,
    max_results: usize,
}

impl SearchWebTool {
    pub fn new(transport: Arc<dyn WebTransport>, endpoint: impl Into<String>, max_results: usize) -> Self {
        Self {
            transport,
            endpoint: endpoint.into(),
            max_results,
        }
    }

    /// 结果页 URL（查询参数 q）
    pub fn search_url(&self, query: &str) -> Result<String, String> {
        Url::parse_with_params(&self.endpoint, &[("q", query)])
            .map(|u| u.to_string())
            .map_err(|e| format!("Invalid search endpoint {}: {}", self.endpoint, e))
    }

    async fn search(&self, query: &str) -> Result<Vec<SearchHit>, String> {
        let url = self.search_url(query)?;
        let page = self.transport.get(&url).await.map_err(|e| e.to_string())?;
        if !page.is_success() {
            return Err(format!("Search provider returned HTTP {}", page.status));
        }
        Ok(parse_search_results(&page.body, self.max_results))
    }
}

#[async_trait]
impl Tool for SearchWebTool {
    fn name(&self) -> &str {
        SEARCH_WEB
    }

    fn description(&self) -> &str {
        "Search the web for information. Returns a list of results (url, title, snippet) each with a link index for citation."
    }

    fn parameters_schema(&self) -> Value {
        parameters_schema::<SearchArgs>()
    }

    async fn execute(&self, args: Value, state: &mut ResearchState) -> Result<Value, String> {
        let args: SearchArgs = parse_args(SEARCH_WEB, args)?;
        let query = args.query.trim();
        if query.is_empty() {
            return Err("Missing query".to_string());
        }
        tracing::info!(query = %query, "search_web");

        match self.search(query).await {
            Ok(hits) => {
                let results: Vec<Value> = hits
                    .iter()
                    .map(|h| {
                        let index = state.sources.record_search_hit(&h.url, &h.title, &h.snippet, query);
                        json!({
                            "index": index,
                            "url": h.url,
                            "title": h.title,
                            "snippet": h.snippet,
                        })
                    })
                    .collect();
                if results.is_empty() {
                    tracing::warn!(query = %query, "search returned zero results");
                }
                Ok(json!({ "success": true, "query": query, "results": results }))
            }
            Err(e) => {
                tracing::warn!(query = %query, error = %e, "search_web failed");
                Ok(json!({ "success": false, "query": query, "error": e }))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::web::StaticTransport;

    const RESULTS_PAGE: &str = r##"
<html><body>
<div class="result results_links result--ad">
  <a class="result__a" href="https://ads.example/">Sponsored</a>
</div>
<div class="result results_links">
  <h2 class="result__title"><a class="result__a" href="//duckduckgo.com/l/?uddg=https%3A%2F%2Fwww.reuters.com%2Fmarkets%2Fbanks&amp;rut=abc">Canadian <b>banks</b> report</a></h2>
  <a class="result__snippet" href="#">Big six banks posted <b>higher</b> earnings.</a>
</div>
<div class="result results_links">
  <a class="result__a" href="https://www.bnnbloomberg.ca/story">BNN story</a>
  <div class="result__snippet">Quarterly results.</div>
</div>
<div class="result">
  <a class="result__url" href="#"> www.theglobeandmail.com/business </a>
  <div class="result__snippet">Globe coverage</div>
</div>
<div class="result"><span>no link at all</span></div>
</body></html>"##;

    #[test]
    fn test_parse_unwraps_redirects_and_skips_ads() {
        let hits = parse_search_results(RESULTS_PAGE, 10);
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].url, "https://www.reuters.com/markets/banks");
        assert_eq!(hits[0].title, "Canadian banks report");
        assert_eq!(hits[0].snippet, "Big six banks posted higher earnings.");
        assert_eq!(hits[1].url, "https://www.bnnbloomberg.ca/story");
        assert_eq!(hits[2].url, "https://www.theglobeandmail.com/business");
        assert_eq!(hits[2].title, "No title");
    }

    #[test]
    fn test_parse_respects_cap() {
        assert_eq!(parse_search_results(RESULTS_PAGE, 2).len(), 2);
    }

    #[test]
    fn test_unwrap_redirect_variants() {
        assert_eq!(
            unwrap_redirect("/l/?kh=-1&uddg=https%3A%2F%2Fa.com%2Fx%3Fy%3D1").as_deref(),
            Some("https://a.com/x?y=1")
        );
        assert_eq!(unwrap_redirect("https://b.com/").as_deref(), Some("https://b.com/"));
        assert_eq!(unwrap_redirect("javascript:void(0)"), None);
        assert_eq!(unwrap_redirect(""), None);
    }

    #[tokio::test]
    async fn test_zero_results_is_success_with_empty_list() {
        let tool = SearchWebTool::new(
            Arc::new(StaticTransport::new().with_page(
                "https://search.test/html/?q=nothing",
                "text/html",
                "<html><body><div class=\"no-results\">No results.</div></body></html>",
            )),
            "https://search.test/html/",
            5,
        );
        let mut state = ResearchState::new();
        let out = tool.execute(json!({"query": "nothing"}), &mut state).await.unwrap();
        assert_eq!(out["success"], true);
        assert_eq!(out["results"].as_array().unwrap().len(), 0);
        assert!(state.sources.is_empty());
    }

    #[tokio::test]
    async fn test_results_are_recorded_with_indices() {
        let transport = StaticTransport::new().with_page(
            "https://search.test/html/?q=banks",
            "text/html",
            RESULTS_PAGE,
        );
        let tool = SearchWebTool::new(Arc::new(transport), "https://search.test/html/", 5);
        let mut state = ResearchState::new();
        let out = tool.execute(json!({"query": "banks"}), &mut state).await.unwrap();
        assert_eq!(out["results"][0]["index"], 1);
        assert_eq!(out["results"][2]["index"], 3);
        let source = state.sources.get("https://www.reuters.com/markets/banks").unwrap();
        assert!(source.content.is_none());
        assert_eq!(source.query.as_deref(), Some("banks"));
    }

    #[tokio::test]
    async fn test_transport_failure_returns_no_partial_results() {
        let tool = SearchWebTool::new(Arc::new(StaticTransport::new()), "https://search.test/html/", 5);
        let mut state = ResearchState::new();
        let out = tool.execute(json!({"query": "offline"}), &mut state).await.unwrap();
        assert_eq!(out["success"], false);
        assert!(out.get("results").is_none());
        assert!(out["error"].as_str().unwrap().contains("connection refused"));
    }
}
