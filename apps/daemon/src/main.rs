//! ThoughtLoom Daemon - Headless 认知调度守护进程

use std::sync::Arc;

use anyhow::Context;
use tl_cognitive::{CognitiveConfig, Scheduler, SimulatedProcessor, SubmitRequest, ThoughtKind};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// 内置的模拟处理器 (类型, 结果消息)
const KIND_PROCESSORS: &[(ThoughtKind, &str)] = &[
    (ThoughtKind::Reflection, "Reflection processed successfully"),
    (ThoughtKind::Metacognition, "Metacognitive analysis completed"),
    (ThoughtKind::Insight, "Insight recorded successfully"),
    (ThoughtKind::Memory, "Memory processed successfully"),
    (ThoughtKind::Doubt, "Doubt analysed"),
    (ThoughtKind::Contradiction, "Contradiction analysed"),
    (ThoughtKind::Pattern, "Pattern identified and analysed"),
    (ThoughtKind::Alert, "Alert acknowledged"),
];

/// 加载配置：`THOUGHTLOOM_CONFIG` 指向 JSON 文件时优先使用，再叠加环境变量
fn load_config() -> anyhow::Result<CognitiveConfig> {
    let config = match std::env::var("THOUGHTLOOM_CONFIG") {
        Ok(path) => CognitiveConfig::from_file(&path)
            .with_context(|| format!("failed to load config from {}", path))?,
        Err(_) => CognitiveConfig::default(),
    };
    let config = config.with_env_overrides();
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "thoughtloom_daemon=debug,tl_cognitive=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("ThoughtLoom Daemon starting...");

    let config = load_config()?;
    let agents: Vec<String> = config.agent_prior.keys().cloned().collect();
    let scheduler = Scheduler::from_config(config)?;
    let cycle = Arc::clone(scheduler.cycle());

    // 注册处理器
    for (kind, message) in KIND_PROCESSORS {
        cycle
            .register_processor(kind.clone(), Arc::new(SimulatedProcessor::new(kind.as_str(), *message)))
            .await;
    }
    for agent in &agents {
        let message = format!("Agent {} analysed the thought", agent);
        cycle
            .register_agent(agent.clone(), Arc::new(SimulatedProcessor::new(agent.as_str(), message)))
            .await;
    }
    tracing::info!(agents = agents.len(), "Processors registered");

    // 初始思维
    let seed = cycle
        .submit(
            SubmitRequest::new("reflection", "ThoughtLoom daemon is awake and listening")
                .priority(1)
                .tags(["startup"]),
        )
        .await?;
    tracing::info!(thought_id = %seed, "Seed thought submitted");

    scheduler.start().await;
    tracing::info!("ThoughtLoom Daemon is ready!");
    tracing::info!("Press Ctrl+C to shutdown...");

    // 等待关闭信号
    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down...");
    scheduler.stop().await;

    let status = scheduler.status().await;
    tracing::info!(
        ticks = status.ticks,
        total_processed = status.total_processed,
        total_expired = status.total_expired,
        pending = status.pending,
        "Final status"
    );
    tracing::debug!(weights = %serde_json::to_string(&status.learner.weights)?, "Final agent weights");

    Ok(())
}
