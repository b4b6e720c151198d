//! 网页传输层：GET 页面并做尽力而为的 UTF-8 解码
//!
//! 先用严格证书校验（可附加自定义 CA）；若失败原因是证书/TLS 信任问题且开启了回退，则用宽松校验重试一次。
//! relaxed_trust_hosts 中的主机直接走宽松客户端。

use std::collections::HashMap;
use std::error::Error as StdError;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, CONTENT_TYPE};
use reqwest::Client;
use thiserror::Error;

use crate::config::ResearchSection;
use crate::core::AgentError;

/// 一次抓取的结果（任意 HTTP 状态）
#[derive(Clone, Debug)]
pub struct FetchedPage {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: String,
    /// 是否经由宽松证书校验获得
    pub relaxed_trust: bool,
}

impl FetchedPage {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// 传输错误
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Trust verification failed: {0}")]
    Trust(String),

    #[error("Request failed: {0}")]
    Request(String),
}

/// 页面传输抽象：HTTP 实现与内存实现（测试 / 离线回放）
#[async_trait]
pub trait WebTransport: Send + Sync {
    async fn get(&self, url: &str) -> Result<FetchedPage, TransportError>;
}

/// 证书 / TLS 握手失败在底层错误文本中的特征
const TRUST_MARKERS: &[&str] = &[
    "certificate",
    "handshake",
    "ssl routines",
    "self signed",
    "self-signed",
    "unknown issuer",
    "unknownissuer",
];

/// 判断 reqwest 错误是否源自证书 / TLS 信任失败
///
/// 只看连接阶段错误的 source 链；顶层错误的文本带有请求 URL，不参与匹配。
fn is_trust_error(err: &reqwest::Error) -> bool {
    err.is_connect() && chain_mentions_trust(err.source())
}

fn chain_mentions_trust(mut current: Option<&(dyn StdError + 'static)>) -> bool {
    while let Some(e) = current {
        let text = e.to_string().to_lowercase();
        if TRUST_MARKERS.iter().any(|m| text.contains(m)) {
            return true;
        }
        current = e.source();
    }
    false
}

/// 基于 reqwest 的传输实现
pub struct HttpTransport {
    strict: Client,
    relaxed: Option<Client>,
    relaxed_hosts: Vec<String>,
}

impl HttpTransport {
    pub fn from_config(cfg: &ResearchSection) -> Result<Self, AgentError> {
        let strict = Self::builder(cfg)?
            .build()
            .map_err(|e| AgentError::ConfigError(format!("Build HTTP client: {}", e)))?;
        let relaxed = if cfg.trust_fallback {
            Some(
                Self::builder(cfg)?
                    .danger_accept_invalid_certs(true)
                    .build()
                    .map_err(|e| AgentError::ConfigError(format!("Build relaxed HTTP client: {}", e)))?,
            )
        } else {
            None
        };
        Ok(Self {
            strict,
            relaxed,
            relaxed_hosts: cfg.relaxed_trust_hosts.iter().map(|h| h.to_lowercase()).collect(),
        })
    }

    fn builder(cfg: &ResearchSection) -> Result<reqwest::ClientBuilder, AgentError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));

        let mut builder = Client::builder()
            .timeout(Duration::from_secs(cfg.request_timeout_secs))
            .user_agent(cfg.user_agent.clone())
            .default_headers(headers);

        if let Some(path) = &cfg.ca_bundle {
            let pem = std::fs::read(path)
                .map_err(|e| AgentError::ConfigError(format!("Read CA bundle {}: {}", path.display(), e)))?;
            let cert = reqwest::Certificate::from_pem(&pem)
                .map_err(|e| AgentError::ConfigError(format!("Parse CA bundle {}: {}", path.display(), e)))?;
            builder = builder.add_root_certificate(cert);
        }
        Ok(builder)
    }

    fn prefers_relaxed(&self, url: &str) -> bool {
        let host = crate::memory::url_domain(url).unwrap_or_default();
        !host.is_empty() && self.relaxed_hosts.iter().any(|h| host.contains(h.as_str()))
    }

    async fn send(client: &Client, url: &str, relaxed_trust: bool) -> Result<FetchedPage, reqwest::Error> {
        let resp = client.get(url).send().await?;
        let status = resp.status().as_u16();
        let content_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_lowercase());
        let bytes = resp.bytes().await?;
        let mut body = String::from_utf8_lossy(&bytes).into_owned();
        if body.starts_with('\u{FEFF}') {
            body = body['\u{FEFF}'.len_utf8()..].to_string();
        }
        Ok(FetchedPage {
            status,
            content_type,
            body,
            relaxed_trust,
        })
    }
}

#[async_trait]
impl WebTransport for HttpTransport {
    async fn get(&self, url: &str) -> Result<FetchedPage, TransportError> {
        if let Some(relaxed) = &self.relaxed {
            if self.prefers_relaxed(url) {
                tracing::info!(url = %url, "using relaxed trust for configured host");
                return Self::send(relaxed, url, true)
                    .await
                    .map_err(|e| TransportError::Request(e.to_string()));
            }
        }

        match Self::send(&self.strict, url, false).await {
            Ok(page) => Ok(page),
            Err(e) if is_trust_error(&e) => {
                let Some(relaxed) = &self.relaxed else {
                    return Err(TransportError::Trust(e.to_string()));
                };
                tracing::warn!(url = %url, error = %e, "trust verification failed, retrying with relaxed verification");
                Self::send(relaxed, url, true).await.map_err(|fallback| {
                    tracing::error!(url = %url, error = %fallback, "relaxed fetch also failed");
                    TransportError::Trust(format!("{} (fallback: {})", e, fallback))
                })
            }
            Err(e) => Err(TransportError::Request(e.to_string())),
        }
    }
}

/// 内存传输：按 URL 返回预置页面并记录请求，用于测试与离线回放
#[derive(Debug, Default)]
pub struct StaticTransport {
    pages: HashMap<String, Result<FetchedPage, String>>,
    requests: Mutex<Vec<String>>,
}

impl StaticTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// 预置一个 200 响应
    pub fn with_page(mut self, url: &str, content_type: &str, body: &str) -> Self {
        self.pages.insert(
            url.to_string(),
            Ok(FetchedPage {
                status: 200,
                content_type: Some(content_type.to_string()),
                body: body.to_string(),
                relaxed_trust: false,
            }),
        );
        self
    }

    /// 预置一个指定状态码的响应
    pub fn with_status(mut self, url: &str, status: u16, body: &str) -> Self {
        self.pages.insert(
            url.to_string(),
            Ok(FetchedPage {
                status,
                content_type: Some("text/html".to_string()),
                body: body.to_string(),
                relaxed_trust: false,
            }),
        );
        self
    }

    /// 预置一个传输失败
    pub fn with_error(mut self, url: &str, error: &str) -> Self {
        self.pages.insert(url.to_string(), Err(error.to_string()));
        self
    }

    /// 已请求过的 URL（按顺序）
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl WebTransport for StaticTransport {
    async fn get(&self, url: &str) -> Result<FetchedPage, TransportError> {
        if let Ok(mut r) = self.requests.lock() {
            r.push(url.to_string());
        }
        match self.pages.get(url) {
            Some(Ok(page)) => Ok(page.clone()),
            Some(Err(e)) => Err(TransportError::Request(e.clone())),
            None => Err(TransportError::Request(format!("connection refused: {}", url))),
        }
    }
}
