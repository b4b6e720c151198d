//! 来源库：规范化 URL -> 来源元数据/正文
//!
//! 首次出现时分配展示序号（从 1 递增，会话内稳定）；之后的搜索命中或抓取只覆盖内容，不改变序号。

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// 预览截取字符数（无摘要时从正文截取）
const PREVIEW_CHARS: usize = 200;

/// 单个来源记录
#[derive(Clone, Debug, Serialize)]
pub struct Source {
    pub url: String,
    pub title: String,
    pub snippet: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    pub retrieved_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    pub index: u32,
    #[serde(skip)]
    touched: u64,
}

impl Source {
    /// 展示用摘要：优先搜索摘要，否则取正文前若干字符
    pub fn preview(&self) -> String {
        if !self.snippet.is_empty() {
            return self.snippet.clone();
        }
        match &self.content {
            Some(c) if c.chars().count() > PREVIEW_CHARS => {
                format!("{}...", c.chars().take(PREVIEW_CHARS).collect::<String>())
            }
            Some(c) => c.clone(),
            None => String::new(),
        }
    }
}

/// URL 规范化：scheme/host 小写、去掉 fragment；无法解析时仅去除首尾空白
pub fn normalize_url(raw: &str) -> String {
    let trimmed = raw.trim();
    match url::Url::parse(trimmed) {
        Ok(mut u) => {
            u.set_fragment(None);
            u.to_string()
        }
        Err(_) => trimmed.to_string(),
    }
}

/// 从 URL 提取 host（小写）
pub fn url_domain(raw: &str) -> Option<String> {
    url::Url::parse(raw.trim())
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_lowercase()))
}

/// 会话级来源库
#[derive(Debug)]
pub struct SourceStore {
    by_url: HashMap<String, Source>,
    next_index: u32,
    touch_counter: u64,
}

impl Default for SourceStore {
    fn default() -> Self {
        Self {
            by_url: HashMap::new(),
            next_index: 1,
            touch_counter: 0,
        }
    }
}

impl SourceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 取得（或新建）记录并刷新触达顺序
    fn entry(&mut self, url: &str) -> &mut Source {
        let key = normalize_url(url);
        self.touch_counter += 1;
        let touched = self.touch_counter;
        let next_index = &mut self.next_index;
        let source = self.by_url.entry(key.clone()).or_insert_with(|| {
            let index = *next_index;
            *next_index += 1;
            Source {
                url: key,
                title: String::new(),
                snippet: String::new(),
                content: None,
                retrieved_at: Utc::now(),
                query: None,
                index,
                touched,
            }
        });
        source.touched = touched;
        source.retrieved_at = Utc::now();
        source
    }

    /// 记录一条搜索命中（无正文），返回展示序号；已抓取的正文保留
    pub fn record_search_hit(&mut self, url: &str, title: &str, snippet: &str, query: &str) -> u32 {
        let source = self.entry(url);
        source.title = title.to_string();
        source.snippet = snippet.to_string();
        source.query = Some(query.to_string());
        source.index
    }

    /// 记录一次页面抓取（写入或覆盖正文），返回展示序号
    pub fn record_fetch(&mut self, url: &str, title: &str, content: &str) -> u32 {
        let source = self.entry(url);
        source.title = title.to_string();
        source.content = Some(content.to_string());
        source.index
    }

    pub fn get(&self, url: &str) -> Option<&Source> {
        self.by_url.get(&normalize_url(url))
    }

    /// 按展示序号查找
    pub fn by_index(&self, index: u32) -> Option<&Source> {
        self.by_url.values().find(|s| s.index == index)
    }

    /// 最近触达的 n 个来源（最新在前）
    pub fn recent(&self, n: usize) -> Vec<&Source> {
        let mut all: Vec<&Source> = self.by_url.values().collect();
        all.sort_by(|a, b| b.touched.cmp(&a.touched));
        all.truncate(n);
        all
    }

    /// 全部来源，按展示序号排序
    pub fn all(&self) -> Vec<&Source> {
        let mut all: Vec<&Source> = self.by_url.values().collect();
        all.sort_by_key(|s| s.index);
        all
    }

    pub fn len(&self) -> usize {
        self.by_url.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_url.is_empty()
    }

    /// 会话重置：清空来源，序号从 1 重新开始
    pub fn clear(&mut self) {
        self.by_url.clear();
        self.next_index = 1;
        self.touch_counter = 0;
    }
}
