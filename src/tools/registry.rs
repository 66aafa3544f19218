//! 工具目录
//!
//! 所有工具实现 Tool trait（name / description / parameters / execute），由 ToolCatalog 按名注册与查找。
//! 目录在启动时构建一次，之后只读；prompt_description 是惰性重建的缓存，每次 register 使其失效一次。

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use super::ToolExecutionContext;

/// 参数声明类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Number,
    Boolean,
    Array,
    Object,
}

impl ParamType {
    pub fn as_str(self) -> &'static str {
        match self {
            ParamType::String => "string",
            ParamType::Number => "number",
            ParamType::Boolean => "boolean",
            ParamType::Array => "array",
            ParamType::Object => "object",
        }
    }

    /// 由文档中的类型注解推断：数值 → number，布尔 → boolean，列表 → array，映射 → object，其余 → string
    ///
    /// 可空包装（`Optional[T]`、`Union[T, None]`、`T | None`）按内层类型 T 推断。
    pub fn from_annotation(annotation: &str) -> Self {
        let base = strip_optional(annotation)
            .split(['[', '<', ' '])
            .next()
            .unwrap_or_default()
            .to_lowercase();
        match base.as_str() {
            "int" | "float" | "number" | "i8" | "i16" | "i32" | "i64" | "u8" | "u16" | "u32"
            | "u64" | "usize" | "isize" | "f32" | "f64" | "integer" => ParamType::Number,
            "bool" | "boolean" => ParamType::Boolean,
            "list" | "tuple" | "set" | "vec" | "array" | "sequence" => ParamType::Array,
            "dict" | "map" | "mapping" | "hashmap" | "btreemap" | "object" => ParamType::Object,
            _ => ParamType::String,
        }
    }

    /// 值是否符合声明类型
    pub fn accepts(self, value: &Value) -> bool {
        match self {
            ParamType::String => value.is_string(),
            ParamType::Number => value.is_number(),
            ParamType::Boolean => value.is_boolean(),
            ParamType::Array => value.is_array(),
            ParamType::Object => value.is_object(),
        }
    }
}

/// 去掉可空包装，返回内层类型注解
fn strip_optional(annotation: &str) -> &str {
    let s = annotation.trim();
    let inner = if let Some(rest) = strip_prefix_ignore_case(s, "optional[") {
        rest.strip_suffix(']')
    } else if let Some(rest) = strip_prefix_ignore_case(s, "union[") {
        rest.strip_suffix(']').and_then(|members| single_non_null(members, ','))
    } else if s.contains('|') {
        single_non_null(s, '|')
    } else {
        None
    };
    match inner {
        Some(t) => strip_optional(t),
        None => s,
    }
}

/// 注解带可空包装（参数可省略）
pub(crate) fn is_nullable(annotation: &str) -> bool {
    strip_optional(annotation).len() != annotation.trim().len()
}

fn strip_prefix_ignore_case<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    s.get(..prefix.len())
        .filter(|head| head.eq_ignore_ascii_case(prefix))
        .map(|_| &s[prefix.len()..])
}

/// 按顶层分隔符拆分（忽略方括号内部），去掉 None 后恰好剩一个成员时返回它
fn single_non_null(members: &str, sep: char) -> Option<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in members.char_indices() {
        match c {
            '[' => depth += 1,
            ']' => depth = depth.saturating_sub(1),
            c if c == sep && depth == 0 => {
                parts.push(&members[start..i]);
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(&members[start..]);

    let mut rest = parts
        .into_iter()
        .map(str::trim)
        .filter(|p| !p.eq_ignore_ascii_case("none") && !p.eq_ignore_ascii_case("nonetype"));
    match (rest.next(), rest.next()) {
        (Some(only), None) => Some(only),
        _ => None,
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 工具参数（注册时派生，之后不可变）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolParameter {
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: ParamType,
    pub description: String,
    pub required: bool,
}

/// 工具执行错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ToolError {
    #[error("missing required argument '{0}'")]
    MissingArgument(String),

    #[error("invalid argument '{name}': {reason}")]
    InvalidArgument { name: String, reason: String },

    /// 工具内部失败；type_name 保留原始错误类型名
    #[error("{message}")]
    Execution { type_name: String, message: String },

    #[error("tool timed out after {0}s")]
    Timeout(u64),
}

impl ToolError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Execution {
            type_name: "ToolExecutionError".to_string(),
            message: message.into(),
        }
    }

    /// 包装任意错误并保留其类型名（取路径最后一段）
    pub fn from_error<E: std::error::Error>(error: E) -> Self {
        let full = std::any::type_name::<E>();
        let short = full.rsplit("::").next().unwrap_or(full);
        Self::Execution {
            type_name: short.to_string(),
            message: error.to_string(),
        }
    }

    /// 报告中使用的错误类型名
    pub fn error_type(&self) -> &str {
        match self {
            ToolError::MissingArgument(_) => "MissingArgument",
            ToolError::InvalidArgument { .. } => "InvalidArgument",
            ToolError::Execution { type_name, .. } => type_name,
            ToolError::Timeout(_) => "ToolTimeout",
        }
    }
}

/// 目录错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CatalogError {
    #[error("tool not found: {0}")]
    NotFound(String),

    /// 同名工具同时出现在分析阶段与回复阶段的目录中
    #[error("tool '{0}' registered in both analysis and response catalogs")]
    DuplicateAcrossStages(String),
}

impl CatalogError {
    pub fn error_type(&self) -> &'static str {
        match self {
            CatalogError::NotFound(_) => "ToolNotFoundError",
            CatalogError::DuplicateAcrossStages(_) => "DuplicateToolError",
        }
    }
}

/// 工具 trait：名称、描述（供 LLM 理解）、参数、异步执行
#[async_trait]
pub trait Tool: Send + Sync {
    /// 工具名称（动作 JSON 中的 "tool" 字段）
    fn name(&self) -> &str;

    /// 一行描述
    fn description(&self) -> &str;

    fn parameters(&self) -> &[ToolParameter];

    /// 参数 JSON Schema（properties / required）
    fn parameters_schema(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();
        for p in self.parameters() {
            properties.insert(
                p.name.clone(),
                serde_json::json!({
                    "type": p.param_type.as_str(),
                    "description": p.description,
                }),
            );
            if p.required {
                required.push(Value::String(p.name.clone()));
            }
        }
        serde_json::json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }

    async fn execute(
        &self,
        ctx: &ToolExecutionContext,
        args: &Map<String, Value>,
    ) -> Result<Value, ToolError>;
}

/// 工具目录：BTreeMap 保证 schema / 描述输出顺序稳定
#[derive(Default)]
pub struct ToolCatalog {
    tools: BTreeMap<String, Arc<dyn Tool>>,
    prompt_cache: OnceLock<String>,
    cache_builds: AtomicUsize,
}

impl ToolCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册（同名覆盖），并使 prompt 描述缓存失效
    pub fn register(&mut self, tool: impl Tool + 'static) {
        self.register_arc(Arc::new(tool));
    }

    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        if self.tools.insert(name.clone(), tool).is_some() {
            tracing::warn!(tool = %name, "Tool re-registered, previous entry overwritten");
        }
        self.prompt_cache = OnceLock::new();
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn Tool>, CatalogError> {
        self.tools
            .get(name)
            .cloned()
            .ok_or_else(|| CatalogError::NotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn all(&self) -> Vec<Arc<dyn Tool>> {
        self.tools.values().cloned().collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// 每个工具的结构化描述，供 tool-calling 协议使用
    pub fn schema(&self) -> Vec<Value> {
        self.tools
            .values()
            .map(|tool| {
                serde_json::json!({
                    "name": tool.name(),
                    "description": tool.description(),
                    "parameters": tool.parameters_schema(),
                })
            })
            .collect()
    }

    /// 紧凑文本描述（缓存；注册后首次访问时重建）
    pub fn prompt_description(&self) -> &str {
        self.prompt_cache.get_or_init(|| {
            self.cache_builds.fetch_add(1, Ordering::Relaxed);
            self.build_prompt_description()
        })
    }

    /// 描述缓存累计重建次数
    pub fn prompt_cache_builds(&self) -> usize {
        self.cache_builds.load(Ordering::Relaxed)
    }

    fn build_prompt_description(&self) -> String {
        let mut blocks = Vec::with_capacity(self.tools.len());
        for tool in self.tools.values() {
            let params = tool.parameters();
            let signature = params
                .iter()
                .map(|p| {
                    let marker = if p.required { "" } else { "?" };
                    format!("{}{}: {}", p.name, marker, p.param_type)
                })
                .collect::<Vec<_>>()
                .join(", ");
            let mut block = format!("{}: {}\n  call: {}({})", tool.name(), tool.description(), tool.name(), signature);
            for p in params {
                let req = if p.required { "required" } else { "optional" };
                block.push_str(&format!(
                    "\n  - {} ({}, {}): {}",
                    p.name, p.param_type, req, p.description
                ));
            }
            blocks.push(block);
        }
        blocks.join("\n\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StaticTool {
        name: &'static str,
        description: &'static str,
        params: Vec<ToolParameter>,
    }

    #[async_trait]
    impl Tool for StaticTool {
        fn name(&self) -> &str {
            self.name
        }

        fn description(&self) -> &str {
            self.description
        }

        fn parameters(&self) -> &[ToolParameter] {
            &self.params
        }

        async fn execute(
            &self,
            _ctx: &ToolExecutionContext,
            _args: &Map<String, Value>,
        ) -> Result<Value, ToolError> {
            Ok(Value::Null)
        }
    }

    fn tool(name: &'static str, description: &'static str) -> StaticTool {
        StaticTool {
            name,
            description,
            params: vec![
                ToolParameter {
                    name: "query".into(),
                    param_type: ParamType::String,
                    description: "the search text.".into(),
                    required: true,
                },
                ToolParameter {
                    name: "limit".into(),
                    param_type: ParamType::Number,
                    description: "max results.".into(),
                    required: false,
                },
            ],
        }
    }

    #[test]
    fn test_get_missing_is_not_found() {
        let catalog = ToolCatalog::new();
        assert_eq!(
            catalog.get("nope").err(),
            Some(CatalogError::NotFound("nope".into()))
        );
    }

    #[test]
    fn test_schema_shape() {
        let mut catalog = ToolCatalog::new();
        catalog.register(tool("search", "Search things."));
        let schema = catalog.schema();
        assert_eq!(schema.len(), 1);
        assert_eq!(schema[0]["name"], "search");
        assert_eq!(schema[0]["parameters"]["properties"]["limit"]["type"], "number");
        assert_eq!(schema[0]["parameters"]["required"], serde_json::json!(["query"]));
    }

    #[test]
    fn test_prompt_description_cache_invalidated_per_register() {
        let mut catalog = ToolCatalog::new();
        catalog.register(tool("search", "Search things."));
        let first = catalog.prompt_description().to_string();
        let _ = catalog.prompt_description();
        assert_eq!(catalog.prompt_cache_builds(), 1);
        assert!(first.contains("search: Search things."));
        assert!(first.contains("call: search(query: string, limit?: number)"));
        assert!(first.contains("- limit (number, optional): max results."));

        catalog.register(tool("search", "Search better."));
        assert_eq!(catalog.prompt_cache_builds(), 1);
        let second = catalog.prompt_description().to_string();
        assert_eq!(catalog.prompt_cache_builds(), 2);
        assert!(second.contains("Search better."));
        assert_eq!(catalog.len(), 1);
    }

    #[test]
    fn test_param_type_from_annotation() {
        assert_eq!(ParamType::from_annotation("int"), ParamType::Number);
        assert_eq!(ParamType::from_annotation("float"), ParamType::Number);
        assert_eq!(ParamType::from_annotation("bool"), ParamType::Boolean);
        assert_eq!(ParamType::from_annotation("list[str]"), ParamType::Array);
        assert_eq!(ParamType::from_annotation("Dict[str, int]"), ParamType::Object);
        assert_eq!(ParamType::from_annotation("str"), ParamType::String);
        assert_eq!(ParamType::from_annotation("Member"), ParamType::String);
    }

    #[test]
    fn test_optional_annotations_use_inner_type() {
        assert_eq!(ParamType::from_annotation("Optional[int]"), ParamType::Number);
        assert_eq!(ParamType::from_annotation("Optional[List[str]]"), ParamType::Array);
        assert_eq!(ParamType::from_annotation("Union[bool, None]"), ParamType::Boolean);
        assert_eq!(ParamType::from_annotation("Union[None, Dict[str, int]]"), ParamType::Object);
        assert_eq!(ParamType::from_annotation("float | None"), ParamType::Number);
        assert_eq!(ParamType::from_annotation("Optional[Optional[int]]"), ParamType::Number);
        // 多个非空成员无法确定类型，退回 string
        assert_eq!(ParamType::from_annotation("Union[int, str]"), ParamType::String);
        assert!(is_nullable("Optional[int]"));
        assert!(is_nullable("str | None"));
        assert!(!is_nullable("List[str]"));
    }

    #[test]
    fn test_param_type_accepts_matching_json() {
        assert!(ParamType::Number.accepts(&serde_json::json!(3)));
        assert!(!ParamType::Number.accepts(&serde_json::json!("3")));
        assert!(ParamType::Array.accepts(&serde_json::json!(["a"])));
        assert!(!ParamType::Boolean.accepts(&Value::Null));
    }

    #[test]
    fn test_tool_error_type_names() {
        #[derive(Debug)]
        struct ParseFailure;
        impl fmt::Display for ParseFailure {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("could not parse")
            }
        }
        impl std::error::Error for ParseFailure {}

        let e = ToolError::from_error(ParseFailure);
        assert_eq!(e.error_type(), "ParseFailure");
        assert_eq!(e.to_string(), "could not parse");
        assert_eq!(ToolError::Timeout(3).error_type(), "ToolTimeout");
    }
}
