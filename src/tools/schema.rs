//! 工具参数 Schema 与参数校验（schemars 自动生成 JSON Schema，serde 反序列化即校验）

use schemars::{schema_for, JsonSchema};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::core::AgentError;

/// 为参数结构体生成 JSON Schema，去掉 `$schema` / `title` 等模型不需要的元信息
pub fn parameters_schema<T: JsonSchema>() -> Value {
    let schema = schema_for!(T);
    let mut value = serde_json::to_value(&schema).unwrap_or_else(|_| serde_json::json!({"type": "object"}));
    if let Some(obj) = value.as_object_mut() {
        obj.remove("$schema");
        obj.remove("title");
    }
    value
}

/// 按参数结构体校验并解析工具参数
pub fn parse_args<T: DeserializeOwned>(tool: &str, args: Value) -> Result<T, String> {
    serde_json::from_value(args).map_err(|e| {
        AgentError::InvalidArguments {
            tool: tool.to_string(),
            reason: e.to_string(),
        }
        .to_string()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    /// 测试参数
    #[allow(dead_code)]
    #[derive(Deserialize, JsonSchema)]
    struct Args {
        /// 查询
        query: String,
        limit: Option<u32>,
    }

    #[test]
    fn test_schema_lists_required_fields() {
        let schema = parameters_schema::<Args>();
        assert!(schema.get("$schema").is_none());
        assert_eq!(schema["type"], "object");
        assert_eq!(schema["required"], serde_json::json!(["query"]));
        assert!(schema["properties"]["limit"].is_object());
    }

    #[test]
    fn test_parse_args_rejects_missing_field() {
        let err = parse_args::<Args>("search_web", serde_json::json!({"limit": 3})).err().unwrap();
        assert!(err.starts_with("Invalid arguments for search_web"));
        assert!(err.contains("query"));
    }
}
