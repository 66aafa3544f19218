//! 两阶段编排器：主控流程
//!
//! 每条入站消息：合成记忆上下文 → 分析阶段（可调用调查类工具，工具执行后本阶段立即结束）
//! → 回复阶段（单次模型调用，动作类工具在流结束后执行）→ 流式写回平台，失败时整体重试，最多 max_attempts 次。
//! 只有最后一次失败才向用户展示简短提示；完整错误只交给 ErrorReporter。

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::broadcast;
use tracing::Instrument;

use super::error::{BuildError, OrchestratorError};
use super::state::{PipelineState, RequestTrace};
use crate::config::{AppConfig, ROLE_ANALYSIS, ROLE_RESPONSE};
use crate::llm::{
    create_deepseek_provider, CircuitBreaker, LlmError, MockProvider, ModelChunk, ModelFailure,
    ModelRequest, ModelSelector, OpenAiProvider, SelectionError,
};
use crate::memory::{ChatTurn, ComposedContext, MemoryComposer, Message};
use crate::pipeline::{analysis_prompt, parse_actions, response_prompt, ActionSplitter, PipelineEvent, StreamRelay};
use crate::platform::{deliver, ChatPlatform, ErrorReporter, InboundMessage, MessageHandle, TracingReporter};
use crate::tools::{
    render_reports, ActionRequest, CatalogError, ToolCatalog, ToolExecutionContext, ToolExecutor, ToolReport,
};

type Relay<'a> = StreamRelay<'a, dyn ChatPlatform>;

/// 流水线参数（来自 [pipeline] 与 [stream] 配置段）
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub bot_name: String,
    pub max_attempts: u32,
    pub retry_delay: Duration,
    pub flush_chars: usize,
    pub max_message_chars: usize,
    pub status_text: String,
    pub failure_notice: String,
}

impl PipelineSettings {
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self {
            bot_name: cfg.pipeline.bot_name.clone(),
            max_attempts: cfg.pipeline.max_attempts.max(1),
            retry_delay: Duration::from_millis(cfg.pipeline.retry_delay_ms),
            flush_chars: cfg.stream.flush_chars,
            max_message_chars: cfg.stream.max_message_chars,
            status_text: cfg.pipeline.status_text.clone(),
            failure_notice: cfg.pipeline.failure_notice.clone(),
        }
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

/// 成功完成的请求
#[derive(Debug, Clone)]
pub struct RequestOutcome {
    pub trace: RequestTrace,
    /// 用户可见的回复全文（动作行已剥离）
    pub reply: String,
    pub analysis: String,
    pub action_reports: Vec<ToolReport>,
}

pub struct Orchestrator {
    platform: Arc<dyn ChatPlatform>,
    composer: MemoryComposer,
    selector: ModelSelector,
    analysis_tools: ToolExecutor,
    action_tools: ToolExecutor,
    reporter: Arc<dyn ErrorReporter>,
    settings: PipelineSettings,
    events: Option<broadcast::Sender<PipelineEvent>>,
}

impl Orchestrator {
    pub fn builder(config: &AppConfig) -> OrchestratorBuilder {
        OrchestratorBuilder::new(config)
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        self.selector.breaker()
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// 处理一条入站消息；每次调用在独立的 request span 中运行
    pub async fn handle(&self, message: InboundMessage) -> Result<RequestOutcome, OrchestratorError> {
        let request_id = uuid::Uuid::new_v4().to_string();
        let span = tracing::info_span!("request", request_id = %request_id, channel = %message.channel_id);
        self.run(RequestTrace::new(request_id), message, span.clone())
            .instrument(span)
            .await
    }

    async fn run(
        &self,
        mut trace: RequestTrace,
        message: InboundMessage,
        span: tracing::Span,
    ) -> Result<RequestOutcome, OrchestratorError> {
        tracing::info!(author = %message.author.name, "Handling message");
        let status = self.send_status(&message).await;
        let tool_ctx = ToolExecutionContext::new(self.platform.clone(), message.clone())
            .with_status(status.clone())
            .with_span(span);
        let mut relay: Relay<'_> = StreamRelay::new(
            &*self.platform,
            message.channel_id.clone(),
            self.settings.flush_chars,
            self.settings.max_message_chars,
        )
        .reply_to(message.id.clone())
        .with_status(status);

        let context = self.composer.get_context(&message).await;
        self.transition(&mut trace, PipelineState::ContextBuilt)?;
        let conversation = conversation(&context, &message);

        self.transition(&mut trace, PipelineState::AnalysisRunning)?;
        let analysis = match self.run_analysis(&mut trace, &context, &conversation, &tool_ctx).await {
            Ok(analysis) => analysis,
            Err(e) => return Err(self.fail(&mut trace, &mut relay, e).await),
        };
        self.transition(&mut trace, PipelineState::AnalysisDone)?;

        self.transition(&mut trace, PipelineState::ResponseRunning)?;
        let request = ModelRequest {
            system_prompt: response_prompt(
                &self.settings.bot_name,
                &context.procedural_text,
                &analysis,
                self.action_tools.catalog(),
            ),
            messages: conversation,
            tools: self.action_tools.catalog().schema(),
        };

        let max_attempts = self.settings.max_attempts;
        let mut last_error = None;
        // 上次中途断流的模型；其余模型都不可用时仍重新调用它
        let mut interrupted: Option<String> = None;
        for attempt in 1..=max_attempts {
            trace.attempts = attempt;
            match self
                .response_attempt(&mut trace, &request, &mut relay, interrupted.as_deref())
                .await
            {
                Ok(actions) => {
                    return self
                        .complete(trace, &relay, &message, analysis, actions, &tool_ctx)
                        .await
                }
                Err(e) => {
                    tracing::warn!(attempt, max_attempts, error = %e, "Response attempt failed");
                    if let OrchestratorError::ModelCall { ref model, .. } = e {
                        interrupted = Some(model.clone());
                    }
                    let retry = e.is_retryable() && attempt < max_attempts;
                    if retry {
                        self.emit(PipelineEvent::Retrying {
                            request_id: trace.request_id.clone(),
                            attempt,
                            max_attempts,
                            reason: e.to_string(),
                        });
                    }
                    last_error = Some(e);
                    if !retry {
                        break;
                    }
                    if trace.state == PipelineState::Streaming {
                        self.transition(&mut trace, PipelineState::ResponseRunning)?;
                    }
                    relay.reset();
                    tokio::time::sleep(self.settings.retry_delay).await;
                }
            }
        }

        let error = match last_error {
            Some(OrchestratorError::Config(c)) => OrchestratorError::Config(c),
            Some(e) => OrchestratorError::StreamGeneration {
                attempts: trace.attempts,
                last: e.to_string(),
            },
            None => OrchestratorError::StreamGeneration {
                attempts: 0,
                last: "no attempt made".to_string(),
            },
        };
        Err(self.fail(&mut trace, &mut relay, error).await)
    }

    /// 分析阶段：模型全部不可用时降级为空分析，不阻断请求
    async fn run_analysis(
        &self,
        trace: &mut RequestTrace,
        context: &ComposedContext,
        conversation: &[Message],
        tool_ctx: &ToolExecutionContext,
    ) -> Result<String, OrchestratorError> {
        let catalog = self.analysis_tools.catalog();
        let request = ModelRequest {
            system_prompt: analysis_prompt(&self.settings.bot_name, &context.procedural_text, catalog),
            messages: conversation.to_vec(),
            tools: catalog.schema(),
        };

        let opened = match self.selector.open_stream(ROLE_ANALYSIS, &request).await {
            Ok(opened) => opened,
            Err(SelectionError::Config(e)) => return Err(e.into()),
            Err(e) => {
                if let SelectionError::Exhausted { ref failures, .. } = e {
                    self.emit_failures(&trace.request_id, failures);
                }
                self.reporter.report("pipeline.analysis", &e);
                return Ok(String::new());
            }
        };
        self.emit_failures(&trace.request_id, &opened.failures);
        self.emit(PipelineEvent::ModelSelected {
            request_id: trace.request_id.clone(),
            stage: ROLE_ANALYSIS.to_string(),
            model: opened.model.clone(),
        });
        trace.analysis_model = Some(opened.model.clone());

        let mut text = String::new();
        let mut actions = Vec::new();
        let mut stream = opened.stream;
        while let Some(item) = stream.next().await {
            match item {
                Ok(ModelChunk::Token(t)) => text.push_str(&t),
                Ok(ModelChunk::ToolCall(action)) => actions.push(action),
                Err(e) => {
                    let failure = self.selector.record_failure(&opened.model, &e);
                    self.emit_failures(&trace.request_id, std::slice::from_ref(&failure));
                    self.reporter.report("pipeline.analysis", &e);
                    return Ok(String::new());
                }
            }
        }

        let (visible, parsed) = parse_actions(&text);
        actions.extend(parsed);
        if actions.is_empty() {
            return Ok(visible);
        }

        // 工具执行后本阶段直接结束，不再回到模型
        let reports = self.analysis_tools.execute(&actions, tool_ctx).await;
        if reports.is_empty() {
            return Ok(visible);
        }
        self.emit(PipelineEvent::ToolReports {
            request_id: trace.request_id.clone(),
            stage: ROLE_ANALYSIS.to_string(),
            reports: reports.clone(),
        });
        Ok(render_reports(&reports))
    }

    /// 回复阶段的一次尝试：恰好一次模型调用；返回流中收集到的动作
    async fn response_attempt(
        &self,
        trace: &mut RequestTrace,
        request: &ModelRequest,
        relay: &mut Relay<'_>,
        interrupted: Option<&str>,
    ) -> Result<Vec<ActionRequest>, OrchestratorError> {
        let opened = match self
            .selector
            .open_stream_retrying(ROLE_RESPONSE, request, interrupted)
            .await
        {
            Ok(opened) => opened,
            Err(e) => {
                if let SelectionError::Exhausted { ref failures, .. } = e {
                    self.emit_failures(&trace.request_id, failures);
                }
                return Err(e.into());
            }
        };
        self.emit_failures(&trace.request_id, &opened.failures);
        self.emit(PipelineEvent::ModelSelected {
            request_id: trace.request_id.clone(),
            stage: ROLE_RESPONSE.to_string(),
            model: opened.model.clone(),
        });
        trace.response_model = Some(opened.model.clone());
        self.transition(trace, PipelineState::Streaming)?;

        let mut splitter = ActionSplitter::new();
        let mut stream = opened.stream;
        while let Some(item) = stream.next().await {
            match item {
                Ok(ModelChunk::Token(t)) => {
                    let visible = splitter.push(&t);
                    if !visible.is_empty() {
                        relay.push(&visible).await?;
                    }
                }
                Ok(ModelChunk::ToolCall(action)) => splitter.push_action(action),
                Err(e) => {
                    let failure = self.selector.record_failure(&opened.model, &e);
                    self.emit_failures(&trace.request_id, std::slice::from_ref(&failure));
                    return Err(OrchestratorError::ModelCall {
                        model: opened.model,
                        source: e,
                    });
                }
            }
        }
        relay.push(&splitter.finish()).await?;
        relay.finish().await?;

        let actions = splitter.take_actions();
        if relay.text().trim().is_empty() && actions.is_empty() {
            return Err(OrchestratorError::ModelCall {
                model: opened.model,
                source: LlmError::Stream("model returned an empty response".to_string()),
            });
        }
        Ok(actions)
    }

    /// 流成功结束：执行动作类工具（不再回到模型），写入情景记忆
    async fn complete(
        &self,
        mut trace: RequestTrace,
        relay: &Relay<'_>,
        message: &InboundMessage,
        analysis: String,
        actions: Vec<ActionRequest>,
        tool_ctx: &ToolExecutionContext,
    ) -> Result<RequestOutcome, OrchestratorError> {
        let reply = relay.text().to_string();
        let action_reports = if actions.is_empty() {
            Vec::new()
        } else {
            let reports = self.action_tools.execute(&actions, tool_ctx).await;
            for failed in reports.iter().filter(|r| !r.is_success()) {
                tracing::warn!(tool = %failed.tool_name, "Action tool failed");
            }
            self.emit(PipelineEvent::ToolReports {
                request_id: trace.request_id.clone(),
                stage: ROLE_RESPONSE.to_string(),
                reports: reports.clone(),
            });
            reports
        };

        self.composer.remember_exchange(message, &reply);
        self.transition(&mut trace, PipelineState::Completed)?;
        self.emit(PipelineEvent::Completed {
            request_id: trace.request_id.clone(),
            model: trace.response_model.clone().unwrap_or_default(),
            chars: reply.chars().count(),
        });
        tracing::info!(attempts = trace.attempts, chars = reply.chars().count(), "Request completed");

        Ok(RequestOutcome {
            trace,
            reply,
            analysis,
            action_reports,
        })
    }

    /// 进入 Failed：上报完整错误，向用户展示简短提示
    async fn fail(
        &self,
        trace: &mut RequestTrace,
        relay: &mut Relay<'_>,
        error: OrchestratorError,
    ) -> OrchestratorError {
        self.reporter.report("pipeline", &error);
        if let Err(e) = relay.fail(&self.settings.failure_notice).await {
            self.reporter.report("sink.failure_notice", &e);
        }
        if let Err(e) = self.transition(trace, PipelineState::Failed) {
            tracing::warn!(error = %e, "Could not mark request failed");
        }
        self.emit(PipelineEvent::Failed {
            request_id: trace.request_id.clone(),
            reason: error.to_string(),
        });
        error
    }

    async fn send_status(&self, message: &InboundMessage) -> Option<MessageHandle> {
        if self.settings.status_text.trim().is_empty() {
            return None;
        }
        match deliver(&*self.platform, &message.channel_id, &self.settings.status_text, Some(&message.id)).await {
            Ok(handle) => Some(handle),
            Err(e) => {
                self.reporter.report("sink.status", &e);
                None
            }
        }
    }

    fn transition(&self, trace: &mut RequestTrace, to: PipelineState) -> Result<(), OrchestratorError> {
        let from = trace.advance(to)?;
        tracing::debug!(from = ?from, to = ?to, "Pipeline state changed");
        self.emit(PipelineEvent::StateChanged {
            request_id: trace.request_id.clone(),
            from,
            to,
        });
        Ok(())
    }

    fn emit_failures(&self, request_id: &str, failures: &[ModelFailure]) {
        for f in failures {
            self.emit(PipelineEvent::ModelFailed {
                request_id: request_id.to_string(),
                model: f.model.clone(),
                category: f.category,
                message: f.message.clone(),
            });
        }
    }

    fn emit(&self, event: PipelineEvent) {
        if let Some(ref tx) = self.events {
            // 没有订阅者时发送失败，忽略
            let _ = tx.send(event);
        }
    }
}

/// 短期轮次作为原生对话轮次，当前消息追加在最后
fn conversation(context: &ComposedContext, message: &InboundMessage) -> Vec<Message> {
    let current = ChatTurn {
        message_id: message.id.clone(),
        author_id: message.author.id.clone(),
        author_name: message.author.name.clone(),
        is_bot: false,
        content: message.content.clone(),
        reactions: Vec::new(),
        reply_to: message.reply_to.clone(),
        timestamp: message.timestamp,
    };
    context
        .short_term
        .iter()
        .chain(std::iter::once(&current))
        .map(ChatTurn::to_message)
        .collect()
}

/// 按环境变量注册提供方：mock 总是可用，有密钥时注册 deepseek / openai
pub fn selector_from_env(cfg: &AppConfig, breaker: Arc<CircuitBreaker>) -> ModelSelector {
    let mut selector = ModelSelector::new(cfg.models.clone(), breaker);
    selector.register_provider("mock", Arc::new(MockProvider::new()));
    if std::env::var("DEEPSEEK_API_KEY").is_ok() {
        tracing::info!("Registering DeepSeek provider");
        selector.register_provider(
            "deepseek",
            Arc::new(create_deepseek_provider(cfg.llm.request_timeout_secs)),
        );
    }
    if std::env::var("OPENAI_API_KEY").is_ok() {
        tracing::info!("Registering OpenAI provider");
        selector.register_provider(
            "openai",
            Arc::new(OpenAiProvider::new(
                cfg.llm.base_url.as_deref(),
                None,
                cfg.llm.request_timeout_secs,
            )),
        );
    }
    selector
}

/// Orchestrator 构建器：所有协作者显式注入
pub struct OrchestratorBuilder {
    platform: Option<Arc<dyn ChatPlatform>>,
    composer: Option<MemoryComposer>,
    selector: Option<ModelSelector>,
    analysis_catalog: ToolCatalog,
    action_catalog: ToolCatalog,
    reporter: Arc<dyn ErrorReporter>,
    settings: PipelineSettings,
    tool_timeout_secs: u64,
    events: Option<broadcast::Sender<PipelineEvent>>,
}

impl OrchestratorBuilder {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            platform: None,
            composer: None,
            selector: None,
            analysis_catalog: ToolCatalog::new(),
            action_catalog: ToolCatalog::new(),
            reporter: Arc::new(TracingReporter),
            settings: PipelineSettings::from_config(config),
            tool_timeout_secs: config.tools.tool_timeout_secs,
            events: None,
        }
    }

    pub fn platform(mut self, platform: Arc<dyn ChatPlatform>) -> Self {
        self.platform = Some(platform);
        self
    }

    pub fn composer(mut self, composer: MemoryComposer) -> Self {
        self.composer = Some(composer);
        self
    }

    pub fn selector(mut self, selector: ModelSelector) -> Self {
        self.selector = Some(selector);
        self
    }

    /// 分析阶段工具（只读）
    pub fn analysis_tools(mut self, catalog: ToolCatalog) -> Self {
        self.analysis_catalog = catalog;
        self
    }

    /// 回复阶段工具（有副作用）
    pub fn action_tools(mut self, catalog: ToolCatalog) -> Self {
        self.action_catalog = catalog;
        self
    }

    pub fn reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn settings(mut self, settings: PipelineSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn events(mut self, tx: broadcast::Sender<PipelineEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    pub fn build(self) -> Result<Orchestrator, BuildError> {
        if let Some(dup) = self
            .analysis_catalog
            .names()
            .into_iter()
            .find(|name| self.action_catalog.contains(name))
        {
            return Err(CatalogError::DuplicateAcrossStages(dup).into());
        }
        let platform = self.platform.ok_or(BuildError::Missing("platform"))?;
        let composer = self.composer.ok_or(BuildError::Missing("composer"))?;
        let selector = self.selector.ok_or(BuildError::Missing("selector"))?;
        Ok(Orchestrator {
            platform,
            composer,
            selector,
            analysis_tools: ToolExecutor::new(Arc::new(self.analysis_catalog), self.tool_timeout_secs),
            action_tools: ToolExecutor::new(Arc::new(self.action_catalog), self.tool_timeout_secs),
            reporter: self.reporter,
            settings: self.settings,
            events: self.events,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModelsSection;
    use crate::llm::MockStep;
    use crate::memory::InMemoryProceduralStore;
    use crate::platform::{Author, InMemoryPlatform, RecordingReporter};
    use crate::tools::builtin::{action_catalog, current_time, investigative_catalog};

    struct Harness {
        platform: Arc<InMemoryPlatform>,
        mock: Arc<MockProvider>,
        reporter: Arc<RecordingReporter>,
        orchestrator: Orchestrator,
        events: broadcast::Receiver<PipelineEvent>,
    }

    fn harness(analysis: &[&str], response: &[&str]) -> Harness {
        let platform = Arc::new(InMemoryPlatform::new().with_bot(Author::bot("bot", "Hive")));
        let mock = Arc::new(MockProvider::new());
        let reporter = Arc::new(RecordingReporter::default());
        let store = Arc::new(InMemoryProceduralStore::new());
        let config = AppConfig::default();
        let selector = ModelSelector::new(
            ModelsSection::from_roles([("analysis", analysis.to_vec()), ("response", response.to_vec())]),
            Arc::new(CircuitBreaker::new()),
        )
        .with_provider("mock", mock.clone());
        let composer = MemoryComposer::new(platform.clone(), store.clone(), reporter.clone(), 15);
        let (tx, events) = broadcast::channel(64);
        let mut settings = PipelineSettings::from_config(&config);
        settings.retry_delay = Duration::from_millis(5);
        let orchestrator = Orchestrator::builder(&config)
            .platform(platform.clone())
            .composer(composer)
            .selector(selector)
            .analysis_tools(investigative_catalog(store.clone()))
            .action_tools(action_catalog(store))
            .reporter(reporter.clone())
            .settings(settings)
            .events(tx)
            .build()
            .unwrap();
        Harness {
            platform,
            mock,
            reporter,
            orchestrator,
            events,
        }
    }

    fn inbound(platform: &InMemoryPlatform, text: &str) -> InboundMessage {
        let id = platform.push_message("c", Author::user("u1", "Ann"), text);
        InboundMessage::new("c", Author::user("u1", "Ann"), text).with_id(id)
    }

    fn drain(rx: &mut broadcast::Receiver<PipelineEvent>) -> Vec<PipelineEvent> {
        let mut out = Vec::new();
        while let Ok(e) = rx.try_recv() {
            out.push(e);
        }
        out
    }

    #[tokio::test]
    async fn test_happy_path_walks_every_state() {
        let mut h = harness(&["mock:a"], &["mock:r"]);
        h.mock.push("a", MockStep::text("The user is greeting."));
        h.mock.push("r", MockStep::tokens(&["Hello ", "Ann!"]));
        let msg = inbound(&h.platform, "hi");

        let outcome = h.orchestrator.handle(msg).await.unwrap();
        assert_eq!(outcome.reply, "Hello Ann!");
        assert_eq!(outcome.analysis, "The user is greeting.");
        use PipelineState::*;
        assert_eq!(
            outcome.trace.path(),
            vec![Start, ContextBuilt, AnalysisRunning, AnalysisDone, ResponseRunning, Streaming, Completed]
        );
        assert_eq!(h.platform.bot_messages("c"), vec!["Hello Ann!".to_string()]);

        let events = drain(&mut h.events);
        assert!(matches!(events.last(), Some(PipelineEvent::Completed { chars: 10, .. })));

        let (_, response_request) = &h.mock.requests()[1];
        assert!(response_request.system_prompt.contains("The user is greeting."));
        assert_eq!(response_request.messages.last().unwrap().content, "Ann: hi");
    }

    #[tokio::test]
    async fn test_analysis_tool_result_feeds_response() {
        let h = harness(&["mock:a"], &["mock:r"]);
        h.mock.push(
            "a",
            MockStep::text("ACTION: {\"tool\": \"current_time\", \"args\": {}}\nignored tail"),
        );
        h.mock.push("r", MockStep::text("It is late."));
        let outcome = h.orchestrator.handle(inbound(&h.platform, "what time is it?")).await.unwrap();
        assert!(outcome.analysis.contains("\"tool_name\": \"current_time\""));
        // 分析阶段调用工具后不再回到模型
        assert_eq!(h.mock.calls("a"), 1);
        let (_, response_request) = &h.mock.requests()[1];
        assert!(response_request.system_prompt.contains("current_time"));
    }

    #[tokio::test]
    async fn test_response_actions_are_hidden_and_executed_once() {
        let h = harness(&["mock:a"], &["mock:r"]);
        h.mock.push("a", MockStep::text("greeting"));
        h.mock.push(
            "r",
            MockStep::tokens(&["Hi!\n", "ACTION: {\"tool\": \"add_reaction\", \"args\": {\"emoji\": \"👋\"}}"]),
        );
        let msg = inbound(&h.platform, "hello");
        let msg_id = msg.id.clone();
        let outcome = h.orchestrator.handle(msg).await.unwrap();
        assert_eq!(outcome.reply, "Hi!\n");
        assert_eq!(outcome.action_reports.len(), 1);
        assert!(outcome.action_reports[0].is_success());
        assert_eq!(h.platform.reactions("c", &msg_id), vec!["👋".to_string()]);
        assert_eq!(h.mock.calls("r"), 1);
    }

    #[tokio::test]
    async fn test_analysis_exhaustion_degrades() {
        let h = harness(&["mock:a"], &["mock:r"]);
        h.mock.push("a", MockStep::Fail(LlmError::api(401, "unauthorized")));
        h.mock.push("r", MockStep::text("Still here."));
        let outcome = h.orchestrator.handle(inbound(&h.platform, "hi")).await.unwrap();
        assert_eq!(outcome.analysis, "");
        assert_eq!(outcome.reply, "Still here.");
        assert!(!h.orchestrator.breaker().is_available("mock:a"));
        assert!(h.reporter.entries().iter().any(|(ctx, _)| ctx == "pipeline.analysis"));
    }

    #[tokio::test]
    async fn test_empty_role_fails_request() {
        let h = harness(&["mock:a"], &[]);
        h.mock.push("a", MockStep::text("ok"));
        let err = h.orchestrator.handle(inbound(&h.platform, "hi")).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::Config(_)));
        // 配置错误不重试
        assert_eq!(h.mock.total_calls(), 1);
        let notice = &h.orchestrator.settings().failure_notice;
        assert_eq!(h.platform.bot_messages("c"), vec![notice.clone()]);
    }

    #[tokio::test]
    async fn test_single_response_model_invoked_every_attempt() {
        let h = harness(&["mock:a"], &["mock:r"]);
        h.mock.push("a", MockStep::text("ok"));
        for _ in 0..3 {
            h.mock.push(
                "r",
                MockStep::FailMidStream {
                    chunks: vec![ModelChunk::Token("par".into())],
                    error: LlmError::Stream("connection reset".into()),
                },
            );
        }
        let err = h.orchestrator.handle(inbound(&h.platform, "hi")).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::StreamGeneration { attempts: 3, .. }));
        assert_eq!(h.mock.calls("r"), 3);
        assert_eq!(
            h.orchestrator.breaker().record("mock:r").unwrap().consecutive_failures,
            3
        );
    }

    #[tokio::test]
    async fn test_all_cooling_fails_without_retrying() {
        let h = harness(&["mock:a"], &["mock:r"]);
        h.mock.push("a", MockStep::text("ok"));
        h.orchestrator
            .breaker()
            .record_failure_message("mock:r", "rate limit", crate::llm::ErrorCategory::RateLimited);
        let err = h.orchestrator.handle(inbound(&h.platform, "hi")).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::StreamGeneration { attempts: 1, .. }));
        assert_eq!(h.mock.calls("r"), 0);
    }

    #[test]
    fn test_build_rejects_tool_in_both_stages() {
        let store: Arc<InMemoryProceduralStore> = Arc::new(InMemoryProceduralStore::new());
        let platform = Arc::new(InMemoryPlatform::new());
        let mut actions = ToolCatalog::new();
        actions.register(current_time());
        let result = Orchestrator::builder(&AppConfig::default())
            .platform(platform.clone())
            .composer(MemoryComposer::new(platform, store.clone(), Arc::new(TracingReporter), 5))
            .selector(ModelSelector::new(ModelsSection::default(), Arc::new(CircuitBreaker::new())))
            .analysis_tools(investigative_catalog(store))
            .action_tools(actions)
            .build();
        assert!(matches!(
            result.err(),
            Some(BuildError::Catalog(CatalogError::DuplicateAcrossStages(name))) if name == "current_time"
        ));
    }
}
