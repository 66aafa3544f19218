//! 函数式工具：显式注册入口
//!
//! 处理函数第一个参数永远是 ToolExecutionContext，其余参数以 JSON 对象传入。
//! 参数声明来自两处：ToolSignature（Rust 类型 → 参数类型，是否有默认值 → required）与文档（描述）。
//!
//! ```ignore
//! let tool = FunctionTool::describe(
//!     "search_channel_history",
//!     "Search recent messages.\n\nArgs:\n  query (str): text to look for.",
//!     ToolSignature::new().param::<String>("query"),
//!     |ctx, args| async move { ... },
//! );
//! catalog.register(tool);
//! ```

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use super::docstring::parse_doc;
use super::registry::{is_nullable, ParamType, Tool, ToolError, ToolParameter};
use super::ToolExecutionContext;

/// Rust 类型到参数类型的映射
pub trait NativeParam {
    fn param_type() -> ParamType;

    /// Option<T> 视为带默认值
    fn has_default() -> bool {
        false
    }
}

macro_rules! native_param {
    ($kind:expr => $($t:ty),+) => {
        $(impl NativeParam for $t {
            fn param_type() -> ParamType {
                $kind
            }
        })+
    };
}

native_param!(ParamType::Number => i8, i16, i32, i64, isize, u8, u16, u32, u64, usize, f32, f64);
native_param!(ParamType::Boolean => bool);
native_param!(ParamType::String => String, Value);
native_param!(ParamType::Object => Map<String, Value>);

impl<T> NativeParam for Vec<T> {
    fn param_type() -> ParamType {
        ParamType::Array
    }
}

impl<K, V> NativeParam for HashMap<K, V> {
    fn param_type() -> ParamType {
        ParamType::Object
    }
}

impl<K, V> NativeParam for BTreeMap<K, V> {
    fn param_type() -> ParamType {
        ParamType::Object
    }
}

impl<T: NativeParam> NativeParam for Option<T> {
    fn param_type() -> ParamType {
        T::param_type()
    }

    fn has_default() -> bool {
        true
    }
}

#[derive(Debug, Clone)]
struct SignatureParam {
    name: String,
    param_type: ParamType,
    has_default: bool,
}

/// 处理函数的参数声明（不含第一个上下文参数）
#[derive(Debug, Clone, Default)]
pub struct ToolSignature {
    params: Vec<SignatureParam>,
}

impl ToolSignature {
    pub fn new() -> Self {
        Self::default()
    }

    /// 无默认值的参数；Option<T> 自动视为可选
    pub fn param<T: NativeParam>(mut self, name: &str) -> Self {
        self.params.push(SignatureParam {
            name: name.to_string(),
            param_type: T::param_type(),
            has_default: T::has_default(),
        });
        self
    }

    /// 带默认值的参数（required = false）
    pub fn param_default<T: NativeParam>(mut self, name: &str) -> Self {
        self.params.push(SignatureParam {
            name: name.to_string(),
            param_type: T::param_type(),
            has_default: true,
        });
        self
    }
}

type Handler =
    Arc<dyn Fn(ToolExecutionContext, Map<String, Value>) -> BoxFuture<'static, Result<Value, ToolError>> + Send + Sync>;

/// 由处理函数与文档构造的工具
#[derive(Clone)]
pub struct FunctionTool {
    name: String,
    description: String,
    parameters: Vec<ToolParameter>,
    handler: Handler,
}

impl FunctionTool {
    /// 描述取文档首行；参数类型与 required 取自 signature，描述取自文档 Args 段
    pub fn describe<F, Fut>(name: &str, doc: &str, signature: ToolSignature, handler: F) -> Self
    where
        F: Fn(ToolExecutionContext, Map<String, Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, ToolError>> + Send + 'static,
    {
        let parsed = parse_doc(doc);
        let parameters = signature
            .params
            .into_iter()
            .map(|p| ToolParameter {
                description: parsed
                    .param(&p.name)
                    .map(|d| d.description.clone())
                    .unwrap_or_default(),
                name: p.name,
                param_type: p.param_type,
                required: !p.has_default,
            })
            .collect();
        Self::assemble(name, parsed.summary, parameters, handler)
    }

    /// 无 signature 时完全依据文档：类型来自注解，带 optional 标记或可空注解的为可选
    pub fn from_doc<F, Fut>(name: &str, doc: &str, handler: F) -> Self
    where
        F: Fn(ToolExecutionContext, Map<String, Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, ToolError>> + Send + 'static,
    {
        let parsed = parse_doc(doc);
        let parameters = parsed
            .params
            .iter()
            .map(|p| ToolParameter {
                name: p.name.clone(),
                param_type: p
                    .annotation
                    .as_deref()
                    .map(ParamType::from_annotation)
                    .unwrap_or(ParamType::String),
                description: p.description.clone(),
                required: !p.optional && !p.annotation.as_deref().is_some_and(is_nullable),
            })
            .collect();
        Self::assemble(name, parsed.summary, parameters, handler)
    }

    fn assemble<F, Fut>(name: &str, description: String, parameters: Vec<ToolParameter>, handler: F) -> Self
    where
        F: Fn(ToolExecutionContext, Map<String, Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, ToolError>> + Send + 'static,
    {
        Self {
            name: name.to_string(),
            description,
            parameters,
            handler: Arc::new(move |ctx, args| handler(ctx, args).boxed()),
        }
    }
}

#[async_trait]
impl Tool for FunctionTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters(&self) -> &[ToolParameter] {
        &self.parameters
    }

    async fn execute(
        &self,
        ctx: &ToolExecutionContext,
        args: &Map<String, Value>,
    ) -> Result<Value, ToolError> {
        (self.handler)(ctx.clone(), args.clone()).await
    }
}

/// 取必填参数并反序列化
pub fn arg<T: DeserializeOwned>(args: &Map<String, Value>, name: &str) -> Result<T, ToolError> {
    let value = args
        .get(name)
        .filter(|v| !v.is_null())
        .ok_or_else(|| ToolError::MissingArgument(name.to_string()))?;
    serde_json::from_value(value.clone()).map_err(|e| ToolError::InvalidArgument {
        name: name.to_string(),
        reason: e.to_string(),
    })
}

/// 取可选参数；缺省时返回 default
pub fn arg_or<T: DeserializeOwned>(
    args: &Map<String, Value>,
    name: &str,
    default: T,
) -> Result<T, ToolError> {
    match args.get(name) {
        None | Some(Value::Null) => Ok(default),
        Some(_) => arg(args, name),
    }
}
