//! 工具执行器
//!
//! 持有 ToolRegistry 与全局超时，execute(tool_name, args, state) 在超时内调用工具，
//! 超时或失败时转为 AgentError（ToolTimeout / ToolExecutionFailed）；每次调用输出结构化审计日志（JSON）。

use std::time::{Duration, Instant};

use serde_json::{json, Value};
use tokio::time::timeout;

use crate::core::AgentError;
use crate::llm::ToolSpec;
use crate::memory::ResearchState;
use crate::tools::ToolRegistry;

/// 工具执行器：对每次调用施加超时，并将结果映射为 AgentError
pub struct ToolExecutor {
    registry: ToolRegistry,
    timeout: Duration,
}

impl ToolExecutor {
    pub fn new(registry: ToolRegistry, timeout_secs: u64) -> Self {
        Self {
            registry,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    /// 执行指定工具；未注册返回 UnknownTool，超时返回 ToolTimeout，工具返回 Err 则转为 ToolExecutionFailed
    pub async fn execute(
        &self,
        tool_name: &str,
        args: Value,
        state: &mut ResearchState,
    ) -> Result<Value, AgentError> {
        let tool = self
            .registry
            .get(tool_name)
            .ok_or_else(|| AgentError::UnknownTool(tool_name.to_string()))?;

        let start = Instant::now();
        let args_preview = args_preview(&args);
        let result = timeout(self.timeout, tool.execute(args, state)).await;

        let (ok, outcome): (bool, &str) = match &result {
            Ok(Ok(v)) if v.get("success").and_then(Value::as_bool).unwrap_or(false) => (true, "ok"),
            Ok(Ok(_)) => (false, "failed"),
            Ok(Err(_)) => (false, "error"),
            Err(_) => (false, "timeout"),
        };
        let duration_ms = start.elapsed().as_millis() as u64;
        let audit = json!({
            "event": "tool_audit",
            "tool": tool_name,
            "ok": ok,
            "outcome": outcome,
            "duration_ms": duration_ms,
            "args_preview": args_preview,
        });
        tracing::info!(audit = %audit.to_string(), "tool");

        match result {
            Ok(Ok(content)) => Ok(content),
            Ok(Err(e)) => Err(AgentError::ToolExecutionFailed(e)),
            Err(_) => Err(AgentError::ToolTimeout(tool_name.to_string())),
        }
    }

    /// 执行并把任何错误折叠为 `{success: false, error}` 结果
    pub async fn execute_lenient(&self, tool_name: &str, args: Value, state: &mut ResearchState) -> Value {
        match self.execute(tool_name, args, state).await {
            Ok(v) => v,
            Err(e) => failure(&e.to_string()),
        }
    }

    pub fn specs(&self, names: &[String]) -> Vec<ToolSpec> {
        self.registry.specs(names)
    }
}

/// 标准失败结果
pub fn failure(error: &str) -> Value {
    json!({ "success": false, "error": error })
}

fn args_preview(args: &Value) -> String {
    let s = args.to_string();
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::Tool;
    use async_trait::async_trait;

    struct Slow;

    #[async_trait]
    impl Tool for Slow {
        fn name(&self) -> &str {
            "slow"
        }
        fn description(&self) -> &str {
            "sleeps"
        }
        fn parameters_schema(&self) -> Value {
            json!({"type": "object"})
        }
        async fn execute(&self, _args: Value, _state: &mut ResearchState) -> Result<Value, String> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(json!({"success": true}))
        }
    }

    struct Failing;

    #[async_trait]
    impl Tool for Failing {
        fn name(&self) -> &str {
            "failing"
        }
        fn description(&self) -> &str {
            "always errors"
        }
        fn parameters_schema(&self) -> Value {
            json!({"type": "object"})
        }
        async fn execute(&self, _args: Value, _state: &mut ResearchState) -> Result<Value, String> {
            Err("boom".to_string())
        }
    }

    fn executor(timeout_secs: u64) -> ToolExecutor {
        let mut reg = ToolRegistry::new();
        reg.register(Slow);
        reg.register(Failing);
        ToolExecutor::new(reg, timeout_secs)
    }

    #[tokio::test]
    async fn test_timeout_maps_to_tool_timeout() {
        let exec = executor(1);
        let mut state = ResearchState::new();
        let err = exec.execute("slow", json!({}), &mut state).await.unwrap_err();
        assert!(matches!(err, AgentError::ToolTimeout(name) if name == "slow"));
    }

    #[tokio::test]
    async fn test_errors_fold_into_failure_results() {
        let exec = executor(5);
        let mut state = ResearchState::new();
        let failed = exec.execute_lenient("failing", json!({}), &mut state).await;
        assert_eq!(failed["success"], false);
        assert!(failed["error"].as_str().unwrap().contains("boom"));

        let unknown = exec.execute_lenient("nope", json!({}), &mut state).await;
        assert_eq!(unknown["success"], false);
        assert!(unknown["error"].as_str().unwrap().contains("Unknown tool"));
    }
}
