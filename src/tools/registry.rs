//! 工具注册表
//!
//! 所有工具实现 Tool trait（name / description / parameters_schema / execute），由 ToolRegistry 按注册顺序保存，
//! 按名查找；ToolExecutor 在调用时加超时并统一转 AgentError。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::llm::ToolSpec;
use crate::memory::ResearchState;

/// 工具 trait：名称、描述（供 LLM 理解）、参数 schema、异步执行
///
/// execute 返回的 JSON 至少包含 `success` 字段；返回 Err 表示参数无效或无法执行，由执行器转成失败结果。
#[async_trait]
pub trait Tool: Send + Sync {
    /// 工具名称（模型 tool call 中的 function name）
    fn name(&self) -> &str;

    /// 工具描述（供 LLM 理解功能）
    fn description(&self) -> &str;

    /// 参数 JSON Schema
    fn parameters_schema(&self) -> Value;

    /// 执行工具；state 为当前会话的来源库与笔记库
    async fn execute(&self, args: Value, state: &mut ResearchState) -> Result<Value, String>;
}

/// 工具注册表：按注册顺序保存 Arc<dyn Tool>，支持 register / get / specs / tool_names
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
    by_name: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册工具；同名工具覆盖旧实现，位置不变
    pub fn register(&mut self, tool: impl Tool + 'static) {
        let name = tool.name().to_string();
        let tool: Arc<dyn Tool> = Arc::new(tool);
        match self.by_name.get(&name) {
            Some(&i) => self.tools[i] = tool,
            None => {
                self.by_name.insert(name, self.tools.len());
                self.tools.push(tool);
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.by_name.get(name).map(|&i| self.tools[i].clone())
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.tools.iter().map(|t| t.name().to_string()).collect()
    }

    /// 生成暴露给模型的工具描述；names 为空表示全部工具，否则按 names 顺序且忽略未注册的名字
    pub fn specs(&self, names: &[String]) -> Vec<ToolSpec> {
        let selected: Vec<Arc<dyn Tool>> = if names.is_empty() {
            self.tools.clone()
        } else {
            names.iter().filter_map(|n| self.get(n)).collect()
        };
        selected
            .iter()
            .map(|t| ToolSpec {
                name: t.name().to_string(),
                description: t.description().to_string(),
                parameters: t.parameters_schema(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Named(&'static str);

    #[async_trait]
    impl Tool for Named {
        fn name(&self) -> &str {
            self.0
        }
        fn description(&self) -> &str {
            "test tool"
        }
        fn parameters_schema(&self) -> Value {
            json!({"type": "object"})
        }
        async fn execute(&self, _args: Value, _state: &mut ResearchState) -> Result<Value, String> {
            Ok(json!({"success": true, "tool": self.0}))
        }
    }

    #[test]
    fn test_specs_follow_requested_order() {
        let mut reg = ToolRegistry::new();
        reg.register(Named("a"));
        reg.register(Named("b"));
        reg.register(Named("c"));
        assert_eq!(reg.tool_names(), vec!["a", "b", "c"]);

        let names: Vec<String> = reg
            .specs(&["c".to_string(), "missing".to_string(), "a".to_string()])
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(names, vec!["c", "a"]);
        assert_eq!(reg.specs(&[]).len(), 3);
    }

    #[test]
    fn test_reregister_keeps_position() {
        let mut reg = ToolRegistry::new();
        reg.register(Named("a"));
        reg.register(Named("b"));
        reg.register(Named("a"));
        assert_eq!(reg.tool_names(), vec!["a", "b"]);
    }
}
