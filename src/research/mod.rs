//! 研究流程：策略、分解判定、引用映射、过程事件与单轮编排

pub mod citations;
pub mod classifier;
pub mod events;
pub mod orchestrator;
pub mod strategy;

pub use citations::{extract_markers, resolve_citations, CitationReport, CitedSource};
pub use classifier::{
    classifier_from_config, DecompositionDecision, Disabled, KeywordClassifier, ModelClassifier, QueryClassifier,
};
pub use events::ResearchEvent;
pub use orchestrator::{Orchestrator, ResearchComponents, ToolCallRecord, TurnOutcome};
pub use strategy::{CitationFormat, ProtocolVersion, Strategy};
