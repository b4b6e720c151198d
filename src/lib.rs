//! Sleuth - Rust 研究助手
//!
//! 模块划分：
//! - **agent**: 按配置装配模型后端、网页传输、工具与策略
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误类型与单轮状态机
//! - **gateway**: 会话注册表与 WebSocket / JSON API 网关
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / Mock / 脚本化）
//! - **memory**: 单轮对话记录、来源库与笔记库
//! - **observability**: tracing 初始化
//! - **research**: 策略、分解判定、引用映射与单轮编排
//! - **tools**: 搜索、抓取、笔记、查询分解、结果摘要与执行器

pub mod agent;
pub mod config;
pub mod core;
pub mod gateway;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod research;
pub mod tools;
