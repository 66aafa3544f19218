//! 工具执行集成测试

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use hive::platform::{Author, InMemoryPlatform, InboundMessage};
    use hive::tools::function::arg;
    use hive::tools::{
        ActionRequest, FunctionTool, ParamType, Tool, ToolCatalog, ToolError, ToolExecutionContext, ToolExecutor,
        ToolSignature, ToolStatus, MULTI_TOOL_SUMMARY,
    };
    use serde_json::{json, Value};

    fn ctx() -> ToolExecutionContext {
        ToolExecutionContext::new(
            Arc::new(InMemoryPlatform::new()),
            InboundMessage::new("ops", Author::user("u1", "Ann"), "run the batch"),
        )
    }

    /// 记录调用次数的工具；fail 为真时抛出 ValueError
    fn tracked(name: &str, output: &'static str, fail: bool, calls: Arc<AtomicUsize>) -> FunctionTool {
        FunctionTool::describe(name, "Tracked test tool.", ToolSignature::new(), move |_ctx, _args| {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                if fail {
                    Err(ToolError::Execution {
                        type_name: "ValueError".to_string(),
                        message: "B rejected its input".to_string(),
                    })
                } else {
                    Ok(json!(output))
                }
            }
        })
    }

    #[tokio::test]
    async fn test_batch_stops_at_first_failure() {
        let (a, b, c) = (
            Arc::new(AtomicUsize::new(0)),
            Arc::new(AtomicUsize::new(0)),
            Arc::new(AtomicUsize::new(0)),
        );
        let mut catalog = ToolCatalog::new();
        catalog.register(tracked("a", "A-out", false, a.clone()));
        catalog.register(tracked("b", "B-out", true, b.clone()));
        catalog.register(tracked("c", "C-out", false, c.clone()));
        let executor = ToolExecutor::new(Arc::new(catalog), 5);

        let reports = executor
            .execute(
                &[
                    ActionRequest::new("a", json!({})),
                    ActionRequest::new("b", json!({})),
                    ActionRequest::new("c", json!({})),
                ],
                &ctx(),
            )
            .await;

        assert_eq!(reports.len(), 1);
        let report = &reports[0];
        assert_eq!(report.tool_name, "b");
        assert_eq!(report.status, ToolStatus::Failure);
        let failure = report.error.as_ref().unwrap();
        assert_eq!(failure.error_type, "ValueError");
        assert!(failure.error_message.contains("B rejected its input"));

        assert_eq!(a.load(Ordering::SeqCst), 1);
        assert_eq!(b.load(Ordering::SeqCst), 1);
        assert_eq!(c.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_multiple_successes_are_summarized() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut catalog = ToolCatalog::new();
        catalog.register(tracked("a", "A-out", false, calls.clone()));
        catalog.register(tracked("b", "B-out", false, calls.clone()));
        let executor = ToolExecutor::new(Arc::new(catalog), 5);

        let reports = executor
            .execute(
                &[
                    ActionRequest::new("a", json!({})),
                    ActionRequest::new("no_tool_needed", json!({})),
                    ActionRequest::new("b", json!({})),
                ],
                &ctx(),
            )
            .await;

        assert_eq!(reports.len(), 1);
        let summary = &reports[0];
        assert_eq!(summary.tool_name, MULTI_TOOL_SUMMARY);
        assert!(summary.is_success());
        let rendered = summary.render();
        assert!(rendered.contains("A-out"));
        assert!(rendered.contains("B-out"));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_docstring_registration_and_execution() {
        let doc = "Search recent messages in the channel.\n\
                   \n\
                   Args:\n    \
                       query (str): text to look for.\n    \
                       limit (int, optional): maximum number of matches.\n";
        let tool = FunctionTool::from_doc("search", doc, |_ctx, args| async move {
            let query: String = arg(&args, "query")?;
            let limit = args.get("limit").and_then(Value::as_u64).unwrap_or(5);
            Ok(json!({ "query": query, "limit": limit }))
        });

        assert_eq!(tool.description(), "Search recent messages in the channel.");
        let params = tool.parameters();
        assert_eq!(params.len(), 2);
        assert_eq!(params[0].name, "query");
        assert_eq!(params[0].param_type, ParamType::String);
        assert!(params[0].required);
        assert_eq!(params[1].name, "limit");
        assert_eq!(params[1].param_type, ParamType::Number);
        assert!(!params[1].required);
        assert_eq!(params[1].description, "maximum number of matches.");

        let mut catalog = ToolCatalog::new();
        catalog.register(tool);
        let prompt = catalog.prompt_description();
        assert!(prompt.contains("search(query: string, limit?: number)"));

        let executor = ToolExecutor::new(Arc::new(catalog), 5);
        let reports = executor
            .execute(&[ActionRequest::new("search", json!({ "query": "deploy" }))], &ctx())
            .await;
        assert_eq!(reports[0].output, Some(json!({ "query": "deploy", "limit": 5 })));

        // 缺少必填参数时不调用处理函数
        let reports = executor
            .execute(&[ActionRequest::new("search", json!({ "limit": 2 }))], &ctx())
            .await;
        assert_eq!(reports[0].error.as_ref().unwrap().error_type, "MissingArgument");
    }
}
