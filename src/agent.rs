//! 研究运行时装配
//!
//! create_llm_from_config 按配置选择模型后端（OAuth / API Key / Mock），
//! create_research_components 组装工具注册表、执行器、策略与分解判定，供所有会话共享。

use std::sync::Arc;

use crate::config::AppConfig;
use crate::core::AgentError;
use crate::llm::{fetch_oauth_token, LlmClient, MockLlmClient, OpenAiClient};
use crate::research::{classifier_from_config, ResearchComponents, Strategy};
use crate::tools::{
    DecomposeQueryTool, FetchPageTool, HttpTransport, SearchWebTool, SummarizeResultsTool, TakeNoteTool,
    ToolExecutor, ToolRegistry, WebTransport,
};

/// 根据配置选择 LLM 后端：provider=mock 直接用 Mock；openai 依次尝试 OAuth、配置中的 api_key、OPENAI_API_KEY，都没有时回退 Mock
pub async fn create_llm_from_config(cfg: &AppConfig) -> Result<Arc<dyn LlmClient>, AgentError> {
    let provider = cfg.llm.provider.to_lowercase();
    if provider == "mock" {
        tracing::info!("Using Mock LLM (configured)");
        return Ok(Arc::new(MockLlmClient));
    }
    if provider != "openai" {
        return Err(AgentError::ConfigError(format!("Unknown LLM provider: {}", cfg.llm.provider)));
    }

    let api_key = match &cfg.llm.oauth {
        Some(oauth) => Some(fetch_oauth_token(oauth, cfg.research.request_timeout_secs).await?),
        None => cfg
            .llm
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| std::env::var("OPENAI_API_KEY").ok()),
    };

    match api_key {
        Some(key) => {
            tracing::info!("Using OpenAI-compatible LLM ({})", cfg.llm.model);
            Ok(Arc::new(OpenAiClient::new(
                cfg.llm.base_url.as_deref(),
                &cfg.llm.model,
                Some(&key),
                cfg.llm.max_tokens,
            )))
        }
        None => {
            tracing::warn!("No API key set, using Mock LLM");
            Ok(Arc::new(MockLlmClient))
        }
    }
}

/// 用给定的模型与网页传输组装研究组件（测试与离线回放直接调用）
pub fn build_components(
    cfg: &AppConfig,
    llm: Arc<dyn LlmClient>,
    transport: Arc<dyn WebTransport>,
) -> Result<ResearchComponents, AgentError> {
    let research = &cfg.research;
    let strategy = Strategy::from_config(research)?;
    let classifier = classifier_from_config(research, llm.clone())?;

    let mut tools = ToolRegistry::new();
    tools.register(SearchWebTool::new(
        transport.clone(),
        research.search_endpoint.clone(),
        research.max_search_results,
    ));
    tools.register(FetchPageTool::new(transport, research.max_content_length));
    tools.register(TakeNoteTool);
    tools.register(DecomposeQueryTool::new(llm.clone()));
    tools.register(SummarizeResultsTool::new(llm.clone(), research.summarize_top_n));

    tracing::info!(
        protocol = %strategy.version,
        offered = ?strategy.tools,
        registered = ?tools.tool_names(),
        classifier = %research.classifier,
        "research components ready"
    );
    Ok(ResearchComponents {
        llm,
        executor: ToolExecutor::new(tools, cfg.tools.tool_timeout_secs),
        strategy,
        classifier,
        max_tool_rounds: research.max_tool_rounds,
        stream: cfg.llm.stream,
    })
}

/// 按配置创建全部研究组件（真实模型与 HTTP 传输）
pub async fn create_research_components(cfg: &AppConfig) -> Result<Arc<ResearchComponents>, AgentError> {
    let llm = create_llm_from_config(cfg).await?;
    let transport: Arc<dyn WebTransport> = Arc::new(HttpTransport::from_config(&cfg.research)?);
    Ok(Arc::new(build_components(cfg, llm, transport)?))
}
