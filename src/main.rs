//! Hive 演示入口
//!
//! 初始化日志与配置，在进程内平台上组装编排器，从标准输入逐行读取消息并打印回复。
//! 有 DEEPSEEK_API_KEY / OPENAI_API_KEY 时使用真实模型，否则请在配置中使用 `mock:*` 模型。
//! 命令：`/status` 查看熔断记录，`/quit` 退出。

use std::sync::Arc;

use anyhow::Context;
use hive::config::load_config;
use hive::core::{selector_from_env, Orchestrator};
use hive::llm::CircuitBreaker;
use hive::memory::{InMemoryEpisodic, InMemoryProceduralStore, MemoryComposer};
use hive::platform::{Author, InMemoryPlatform, InboundMessage, TracingReporter};
use hive::tools::builtin::{action_catalog, investigative_catalog};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;

const CHANNEL: &str = "general";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    hive::observability::init();

    let cfg = load_config(None).context("Failed to load config")?;

    let platform = Arc::new(
        InMemoryPlatform::new().with_bot(Author::bot("hive", cfg.pipeline.bot_name.clone())),
    );
    let store = Arc::new(InMemoryProceduralStore::new());
    let reporter = Arc::new(TracingReporter);

    let mut composer = MemoryComposer::new(
        platform.clone(),
        store.clone(),
        reporter.clone(),
        cfg.memory.short_term_window,
    );
    if cfg.memory.episodic_enabled {
        composer = composer.with_episodic(Arc::new(InMemoryEpisodic::default()), cfg.memory.episodic_k);
    }

    let breaker = Arc::new(CircuitBreaker::new());
    let (events_tx, mut events_rx) = broadcast::channel(256);
    let orchestrator = Orchestrator::builder(&cfg)
        .platform(platform.clone())
        .composer(composer)
        .selector(selector_from_env(&cfg, breaker.clone()))
        .analysis_tools(investigative_catalog(store.clone()))
        .action_tools(action_catalog(store))
        .reporter(reporter)
        .events(events_tx)
        .build()
        .context("Failed to build orchestrator")?;

    tokio::spawn(async move {
        while let Ok(event) = events_rx.recv().await {
            if let Ok(json) = serde_json::to_string(&event) {
                tracing::debug!(event = %json, "pipeline");
            }
        }
    });

    let me = Author::user("local", "you");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    println!("{} is listening on #{CHANNEL}. Type /quit to exit.", cfg.pipeline.bot_name);

    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        let text = line.trim();
        match text {
            "" => continue,
            "/quit" => break,
            "/status" => {
                let records = breaker.snapshot();
                if records.is_empty() {
                    println!("all models available");
                }
                for r in records {
                    println!(
                        "{} {} x{} until {}: {}",
                        r.model, r.category, r.consecutive_failures, r.cooldown_until, r.message
                    );
                }
                continue;
            }
            _ => {}
        }

        let id = platform.push_message(CHANNEL, me.clone(), text);
        let message = InboundMessage::new(CHANNEL, me.clone(), text).with_id(id);
        match orchestrator.handle(message).await {
            Ok(outcome) => println!("{}> {}", cfg.pipeline.bot_name, outcome.reply.trim_end()),
            Err(e) => {
                tracing::debug!(error = %e, "Request failed");
                println!("{}> {}", cfg.pipeline.bot_name, orchestrator.settings().failure_notice);
            }
        }
    }

    Ok(())
}
