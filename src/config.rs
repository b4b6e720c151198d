//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `SLEUTH__*` 覆盖（双下划线表示嵌套，如 `SLEUTH__RESEARCH__PROTOCOL=v2`）。

use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub llm: LlmSection,
    pub tools: ToolsSection,
    pub research: ResearchSection,
    pub server: ServerSection,
}

/// [llm] 段：后端选择、模型、凭据与输出方式
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// 后端：openai / mock；openai 需要 API Key 或 OAuth 配置，否则回退到 mock
    pub provider: String,
    pub model: String,
    pub base_url: Option<String>,
    /// 未设置时读取环境变量 OPENAI_API_KEY
    pub api_key: Option<String>,
    pub max_tokens: u32,
    /// 最终回答是否以 Token 流推送
    pub stream: bool,
    pub oauth: Option<OAuthSection>,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-4o-mini-2024-07-18".to_string(),
            base_url: None,
            api_key: None,
            max_tokens: 4096,
            stream: true,
            oauth: None,
        }
    }
}

/// [llm.oauth] 段：client-credentials 换取 access token，作为 API Key 使用
#[derive(Debug, Clone, Deserialize)]
pub struct OAuthSection {
    pub token_url: String,
    pub client_id: String,
    pub client_secret: String,
}

/// [tools] 段：单次工具调用超时
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsSection {
    pub tool_timeout_secs: u64,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            tool_timeout_secs: 120,
        }
    }
}

/// [research] 段：协议版本、分解判定、检索与抓取限制、信任回退
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ResearchSection {
    /// v1 / v2 / v3
    pub protocol: String,
    /// keywords / model / off
    pub classifier: String,
    /// 触发查询分解的关键词（大小写不敏感的子串匹配）
    pub decompose_triggers: Vec<String>,
    pub max_search_results: usize,
    pub max_content_length: usize,
    pub request_timeout_secs: u64,
    pub search_endpoint: String,
    pub user_agent: String,
    /// 自定义 CA 证书（PEM），用于企业代理环境
    pub ca_bundle: Option<PathBuf>,
    /// 证书校验失败时是否用宽松校验重试一次
    pub trust_fallback: bool,
    /// 直接使用宽松校验的主机（子串匹配）
    pub relaxed_trust_hosts: Vec<String>,
    pub max_tool_rounds: usize,
    pub summarize_top_n: usize,
    /// 覆盖协议默认的「最近来源」补充条数
    pub recent_sources: Option<usize>,
}

impl Default for ResearchSection {
    fn default() -> Self {
        Self {
            protocol: "v3".to_string(),
            classifier: "keywords".to_string(),
            decompose_triggers: default_decompose_triggers(),
            max_search_results: 5,
            max_content_length: 3000,
            request_timeout_secs: 10,
            search_endpoint: "https://html.duckduckgo.com/html/".to_string(),
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36".to_string(),
            ca_bundle: None,
            trust_fallback: true,
            relaxed_trust_hosts: vec!["github.com".into(), "githubusercontent.com".into()],
            max_tool_rounds: 1,
            summarize_top_n: 5,
            recent_sources: None,
        }
    }
}

fn default_decompose_triggers() -> Vec<String> {
    vec![
        "big 6".into(),
        "big six".into(),
        "big 5".into(),
        "big five".into(),
        "top 5".into(),
        "top five".into(),
        "top 10".into(),
        "compare".into(),
        "comparison".into(),
        "versus".into(),
        " vs ".into(),
        "each of the".into(),
    ]
}

/// [server] 段：网关监听地址与会话回收
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub host: String,
    pub port: u16,
    /// 会话空闲超过该秒数且无进行中的请求时被回收
    pub session_timeout_secs: u64,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            session_timeout_secs: 1800,
        }
    }
}

impl ServerSection {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// 从 config 目录加载配置，环境变量 SLEUTH__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 SLEUTH__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("SLEUTH")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}
