//! 工具层：目录、函数式注册、文档解析、执行器与内置工具

pub mod builtin;
pub mod context;
pub mod docstring;
pub mod executor;
pub mod function;
pub mod registry;
pub mod report;
pub mod schema;

pub use context::ToolExecutionContext;
pub use executor::ToolExecutor;
pub use function::{FunctionTool, NativeParam, ToolSignature};
pub use registry::{CatalogError, ParamType, Tool, ToolCatalog, ToolError, ToolParameter};
pub use report::{render_reports, ActionRequest, ToolFailure, ToolReport, ToolStatus, MULTI_TOOL_SUMMARY};
pub use schema::action_schema_json;
