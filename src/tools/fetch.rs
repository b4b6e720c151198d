//! fetch_page_content：抓取页面并提取可读正文
//!
//! PDF 链接直接返回占位文本（不下载不解析）；HTML 用 html2text 转文本，失败时退回简单去标签。
//! 正文超过 max_content_length 字符时截断为恰好该长度再加 "..."。

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use regex::Regex;
use schemars::JsonSchema;
use scraper::{Html, Selector};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::memory::{url_domain, ResearchState};
use crate::tools::schema::{parameters_schema, parse_args};
use crate::tools::web::WebTransport;
use crate::tools::{Tool, FETCH_PAGE_CONTENT};

/// html2text 渲染宽度
const RENDER_WIDTH: usize = 120;

/// fetch_page_content 参数
#[derive(Debug, Deserialize, JsonSchema)]
pub struct FetchArgs {
    /// The URL to fetch
    pub url: String,
}

/// URL 路径是否以 .pdf 结尾（大小写不敏感，忽略查询串）
pub fn is_pdf_url(raw: &str) -> bool {
    let path = match url::Url::parse(raw.trim()) {
        Ok(u) => u.path().to_string(),
        Err(_) => raw.split(['?', '#']).next().unwrap_or_default().to_string(),
    };
    path.to_lowercase().ends_with(".pdf")
}

fn pdf_placeholder(url: &str) -> String {
    format!(
        "[PDF document at {}. PDF content is not extracted; cite it by URL if relevant.]",
        url
    )
}

static INVISIBLE_BLOCKS_RE: OnceLock<Regex> = OnceLock::new();

/// 去掉不可见内容块（script/style/noscript）
fn drop_invisible_blocks(html: &str) -> String {
    let re = INVISIBLE_BLOCKS_RE.get_or_init(|| {
        Regex::new(r"(?is)<(script|style|noscript)\b[^>]*>.*?</(script|style|noscript)\s*>")
            .expect("valid invisible block regex")
    });
    re.replace_all(html, " ").into_owned()
}

/// 简单去除 HTML 标签，保留文本并合并连续空白
fn strip_html_tags(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' => {
                in_tag = false;
                out.push(' ');
            }
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// HTML -> 可读纯文本（已合并空白）
pub fn html_to_text(html: &str) -> String {
    let cleaned = drop_invisible_blocks(html);
    let text = match html2text::from_read(cleaned.as_bytes(), RENDER_WIDTH) {
        Ok(t) if !t.trim().is_empty() => t,
        Ok(_) => strip_html_tags(&cleaned),
        Err(e) => {
            tracing::debug!(error = %e, "html2text failed, falling back to tag stripping");
            strip_html_tags(&cleaned)
        }
    };
    collapse_whitespace(&text)
}

/// 页面 `<title>`，缺失时为空
pub fn html_title(html: &str) -> Option<String> {
    let doc = Html::parse_document(html);
    let sel = Selector::parse("title").expect("valid title selector");
    doc.select(&sel)
        .next()
        .map(|t| collapse_whitespace(&t.text().collect::<String>()))
        .filter(|t| !t.is_empty())
}

/// 超过 max 字符时截断为恰好 max 字符并追加 "..."
pub fn truncate_content(text: &str, max: usize) -> String {
    if text.chars().count() > max {
        format!("{}...", text.chars().take(max).collect::<String>())
    } else {
        text.to_string()
    }
}

fn looks_textual(content_type: Option<&str>) -> bool {
    match content_type {
        None => true,
        Some(ct) => ct.contains("html") || ct.starts_with("text/") || ct.contains("xml"),
    }
}

/// fetch_page_content 工具
pub struct FetchPageTool {
    transport: Arc<dyn WebTransport>,
    max_content_length: usize,
}

impl FetchPageTool {
    pub fn new(transport: Arc<dyn WebTransport>, max_content_length: usize) -> Self {
        Self {
            transport,
            max_content_length,
        }
    }

    fn record(state: &mut ResearchState, url: &str, title: &str, content: &str, relaxed_trust: bool) -> Value {
        let index = state.sources.record_fetch(url, title, content);
        json!({
            "success": true,
            "url": url,
            "title": title,
            "content": content,
            "index": index,
            "relaxed_trust": relaxed_trust,
        })
    }
}

#[async_trait]
impl Tool for FetchPageTool {
    fn name(&self) -> &str {
        FETCH_PAGE_CONTENT
    }

    fn description(&self) -> &str {
        "Fetch a web page and return its readable text content (truncated). PDF links are not downloaded."
    }

    fn parameters_schema(&self) -> Value {
        parameters_schema::<FetchArgs>()
    }

    async fn execute(&self, args: Value, state: &mut ResearchState) -> Result<Value, String> {
        let args: FetchArgs = parse_args(FETCH_PAGE_CONTENT, args)?;
        let url = args.url.trim().to_string();
        if url.is_empty() {
            return Err("Missing url".to_string());
        }
        let fallback_title = url_domain(&url).unwrap_or_else(|| url.clone());

        if is_pdf_url(&url) {
            tracing::info!(url = %url, "pdf link, skipping fetch");
            return Ok(Self::record(state, &url, &fallback_title, &pdf_placeholder(&url), false));
        }

        let page = match self.transport.get(&url).await {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(url = %url, error = %e, "fetch_page_content failed");
                return Ok(json!({ "success": false, "url": url, "error": e.to_string() }));
            }
        };
        if !page.is_success() {
            return Ok(json!({
                "success": false,
                "url": url,
                "error": format!("HTTP {}", page.status),
            }));
        }

        let content_type = page.content_type.as_deref();
        if content_type.is_some_and(|ct| ct.contains("pdf")) {
            return Ok(Self::record(state, &url, &fallback_title, &pdf_placeholder(&url), page.relaxed_trust));
        }
        if !looks_textual(content_type) {
            let placeholder = format!(
                "[Content type {} at {} was not parsed.]",
                content_type.unwrap_or("unknown"),
                url
            );
            return Ok(Self::record(state, &url, &fallback_title, &placeholder, page.relaxed_trust));
        }

        let is_html = content_type.map_or(true, |ct| ct.contains("html") || ct.contains("xml"));
        let (title, text) = if is_html {
            (
                html_title(&page.body).unwrap_or(fallback_title),
                html_to_text(&page.body),
            )
        } else {
            (fallback_title, collapse_whitespace(&page.body))
        };
        let content = truncate_content(&text, self.max_content_length);
        tracing::debug!(url = %url, chars = content.chars().count(), "page fetched");
        Ok(Self::record(state, &url, &title, &content, page.relaxed_trust))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::web::StaticTransport;

    #[test]
    fn test_pdf_detection_ignores_case_and_query() {
        assert!(is_pdf_url("https://a.com/report.PDF"));
        assert!(is_pdf_url("https://a.com/r.pdf?download=1"));
        assert!(!is_pdf_url("https://a.com/pdf-guide"));
    }

    #[test]
    fn test_truncation_is_exact() {
        let text = "a".repeat(50);
        let cut = truncate_content(&text, 10);
        assert_eq!(cut, format!("{}...", "a".repeat(10)));
        assert_eq!(truncate_content("short", 10), "short");
        assert_eq!(truncate_content(&"b".repeat(10), 10), "b".repeat(10));
    }

    #[test]
    fn test_html_to_text_drops_scripts() {
        let html = "<html><head><title>T</title><script>var x = 'secret';</script><style>p{}</style></head>\
                    <body><p>Visible   text</p><p>More</p></body></html>";
        let text = html_to_text(html);
        assert!(text.contains("Visible text"));
        assert!(text.contains("More"));
        assert!(!text.contains("secret"));
        assert_eq!(html_title(html).as_deref(), Some("T"));
    }

    #[tokio::test]
    async fn test_pdf_is_not_fetched() {
        let transport = Arc::new(StaticTransport::new());
        let tool = FetchPageTool::new(transport.clone(), 3000);
        let mut state = ResearchState::new();
        let out = tool
            .execute(json!({"url": "https://bank.example/annual.pdf"}), &mut state)
            .await
            .unwrap();
        assert_eq!(out["success"], true);
        assert!(out["content"].as_str().unwrap().contains("https://bank.example/annual.pdf"));
        assert!(transport.requests().is_empty());
        assert_eq!(state.sources.len(), 1);
    }

    #[tokio::test]
    async fn test_fetch_truncates_and_records() {
        let body = format!("<html><head><title>Long</title></head><body><p>{}</p></body></html>", "w ".repeat(400));
        let transport = StaticTransport::new().with_page("https://a.com/long", "text/html; charset=utf-8", &body);
        let tool = FetchPageTool::new(Arc::new(transport), 100);
        let mut state = ResearchState::new();
        let out = tool.execute(json!({"url": "https://a.com/long"}), &mut state).await.unwrap();
        let content = out["content"].as_str().unwrap();
        assert_eq!(content.chars().count(), 103);
        assert!(content.ends_with("..."));
        assert_eq!(out["title"], "Long");
        assert_eq!(out["index"], 1);
        assert_eq!(state.sources.get("https://a.com/long").unwrap().content.as_deref(), Some(content));
    }

    #[tokio::test]
    async fn test_binary_content_is_flagged() {
        let transport = StaticTransport::new().with_page("https://a.com/img", "image/png", "\u{89}PNG");
        let tool = FetchPageTool::new(Arc::new(transport), 3000);
        let mut state = ResearchState::new();
        let out = tool.execute(json!({"url": "https://a.com/img"}), &mut state).await.unwrap();
        assert!(out["content"].as_str().unwrap().contains("image/png"));
        assert_eq!(out["title"], "a.com");
    }

    #[tokio::test]
    async fn test_transport_failure_reports_detail() {
        let transport = StaticTransport::new().with_error("https://down.example/", "certificate verify failed");
        let tool = FetchPageTool::new(Arc::new(transport), 3000);
        let mut state = ResearchState::new();
        let out = tool.execute(json!({"url": "https://down.example/"}), &mut state).await.unwrap();
        assert_eq!(out["success"], false);
        assert!(out["error"].as_str().unwrap().contains("certificate"));
        assert!(state.sources.is_empty());
    }

    #[tokio::test]
    async fn test_http_error_status_is_failure() {
        let transport = StaticTransport::new().with_status("https://a.com/missing", 404, "not found");
        let tool = FetchPageTool::new(Arc::new(transport), 3000);
        let mut state = ResearchState::new();
        let out = tool.execute(json!({"url": "https://a.com/missing"}), &mut state).await.unwrap();
        assert_eq!(out["success"], false);
        assert_eq!(out["error"], "HTTP 404");
    }
}
