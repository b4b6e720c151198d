//! 引用映射：从回答中提取 `[n]` 或 `LINK_INDEX:n` 标记并解析为展示来源
//!
//! 标记去重后按首次出现顺序排列；无法解析的序号不进入来源列表，单独收集到 unresolved。

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

use super::strategy::CitationFormat;
use crate::memory::{ResearchState, Source};

const SNIPPET_CHARS: usize = 200;

/// 展示用来源条目
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CitedSource {
    pub index: u32,
    pub url: String,
    pub title: String,
    pub snippet: String,
}

impl CitedSource {
    fn from_source(index: u32, source: &Source) -> Self {
        Self {
            index,
            url: source.url.clone(),
            title: display_title(source),
            snippet: source.preview(),
        }
    }
}

/// 引用解析结果
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CitationReport {
    pub sources: Vec<CitedSource>,
    pub unresolved: Vec<u64>,
}

fn display_title(source: &Source) -> String {
    if source.title.is_empty() {
        "Unknown".to_string()
    } else {
        source.title.clone()
    }
}

static NUMERIC_RE: OnceLock<Regex> = OnceLock::new();
static LINK_INDEX_RE: OnceLock<Regex> = OnceLock::new();

fn marker_regex(format: CitationFormat) -> &'static Regex {
    match format {
        CitationFormat::Numeric => NUMERIC_RE.get_or_init(|| Regex::new(r"\[(\d+)\]").expect("valid numeric marker regex")),
        CitationFormat::LinkIndex => {
            LINK_INDEX_RE.get_or_init(|| Regex::new(r"LINK_INDEX:\s*(\d+)").expect("valid LINK_INDEX regex"))
        }
    }
}

/// 提取引用序号：去重，保留首次出现顺序；超出 u64 的序号记为 u64::MAX（必然无法解析）
pub fn extract_markers(text: &str, format: CitationFormat) -> Vec<u64> {
    let mut seen = HashSet::new();
    marker_regex(format)
        .captures_iter(text)
        .filter_map(|c| c.get(1).map(|m| m.as_str().parse::<u64>().unwrap_or(u64::MAX)))
        .filter(|n| seen.insert(*n))
        .collect()
}

fn resolve_one(marker: u64, format: CitationFormat, state: &ResearchState) -> Option<CitedSource> {
    let n = u32::try_from(marker).ok()?;
    match format {
        CitationFormat::Numeric => {
            let note = state.notes.nth(n as usize)?;
            let url = note.source_url.as_deref()?;
            let entry = match state.sources.get(url) {
                Some(source) => CitedSource {
                    index: n,
                    url: url.to_string(),
                    title: display_title(source),
                    snippet: source.preview(),
                },
                None => CitedSource {
                    index: n,
                    url: url.to_string(),
                    title: note.title.clone(),
                    snippet: note.content.chars().take(SNIPPET_CHARS).collect(),
                },
            };
            Some(entry)
        }
        CitationFormat::LinkIndex => state.sources.by_index(n).map(|s| CitedSource::from_source(n, s)),
    }
}

/// 解析回答中的全部引用
pub fn resolve_citations(answer: &str, format: CitationFormat, state: &ResearchState) -> CitationReport {
    let mut report = CitationReport::default();
    for n in extract_markers(answer, format) {
        match resolve_one(n, format, state) {
            Some(entry) => report.sources.push(entry),
            None => report.unresolved.push(n),
        }
    }
    report
}

/// 追加最近触达的来源（已在列表中的 URL 跳过）
pub fn append_recent_sources(report: &mut CitationReport, state: &ResearchState, n: usize) {
    for source in state.sources.recent(n) {
        if report.sources.iter().any(|s| s.url == source.url) {
            continue;
        }
        report.sources.push(CitedSource::from_source(source.index, source));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_markers_map_to_notes_in_order() {
        let mut state = ResearchState::new();
        state.sources.record_fetch("https://x.com/", "X page", "x body");
        state.sources.record_fetch("https://y.com/", "Y page", "y body");
        state.notes.append("fact x", Some("https://x.com/".into()));
        state.notes.append("fact y", Some("https://y.com/".into()));

        let report = resolve_citations("A [1] and B [2], again [1].", CitationFormat::Numeric, &state);
        let urls: Vec<&str> = report.sources.iter().map(|s| s.url.as_str()).collect();
        assert_eq!(urls, vec!["https://x.com/", "https://y.com/"]);
        assert_eq!(report.sources[0].index, 1);
        assert_eq!(report.sources[1].title, "Y page");
        assert!(report.unresolved.is_empty());
    }

    #[test]
    fn test_first_appearance_order_and_dedupe() {
        assert_eq!(extract_markers("[3] [1] [3] [2]", CitationFormat::Numeric), vec![3, 1, 2]);
        assert_eq!(
            extract_markers("a LINK_INDEX:4 b LINK_INDEX: 2 c LINK_INDEX:4", CitationFormat::LinkIndex),
            vec![4, 2]
        );
        assert!(extract_markers("[1]", CitationFormat::LinkIndex).is_empty());
    }

    #[test]
    fn test_unresolvable_markers_are_reported() {
        let mut state = ResearchState::new();
        state.notes.append("no url", None);
        state.sources.record_search_hit("https://a.com/", "A", "snip", "q");

        let numeric = resolve_citations("[1] [5]", CitationFormat::Numeric, &state);
        assert!(numeric.sources.is_empty());
        assert_eq!(numeric.unresolved, vec![1, 5]);

        let link = resolve_citations("LINK_INDEX:1 LINK_INDEX:9", CitationFormat::LinkIndex, &state);
        assert_eq!(link.sources.len(), 1);
        assert_eq!(link.sources[0].snippet, "snip");
        assert_eq!(link.unresolved, vec![9]);
    }

    #[test]
    fn test_oversized_markers_stay_unresolved() {
        let mut state = ResearchState::new();
        state.sources.record_search_hit("https://a.com/", "A", "", "q");
        let report = resolve_citations(
            "LINK_INDEX:1 LINK_INDEX:99999999999 LINK_INDEX:123456789012345678901234567890",
            CitationFormat::LinkIndex,
            &state,
        );
        assert_eq!(report.sources.len(), 1);
        assert_eq!(report.unresolved, vec![99_999_999_999, u64::MAX]);

        let numeric = resolve_citations("[99999999999]", CitationFormat::Numeric, &state);
        assert_eq!(numeric.unresolved, vec![99_999_999_999]);
    }

    #[test]
    fn test_note_url_missing_from_store_uses_note_title() {
        let mut state = ResearchState::new();
        state.notes.append("remembered fact", Some("https://gone.example/p".into()));
        let report = resolve_citations("[1]", CitationFormat::Numeric, &state);
        assert_eq!(report.sources[0].title, "Note from gone.example");
        assert_eq!(report.sources[0].snippet, "remembered fact");
    }

    #[test]
    fn test_recent_sources_skip_already_cited() {
        let mut state = ResearchState::new();
        state.sources.record_search_hit("https://a.com/", "A", "", "q");
        state.sources.record_search_hit("https://b.com/", "B", "", "q");
        let mut report = resolve_citations("LINK_INDEX:2", CitationFormat::LinkIndex, &state);
        append_recent_sources(&mut report, &state, 5);
        let titles: Vec<&str> = report.sources.iter().map(|s| s.title.as_str()).collect();
        assert_eq!(titles, vec!["B", "A"]);
    }
}
