//! 处理器接口与注册表
//!
//! 具体分析能力 (情绪标注、一致性检查、模式挖掘等) 通过 [`Processor`] 插入。

use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use tl_core::Result;

use crate::thought::{Metadata, ThoughtKind, ThoughtResult};

/// 处理器特征
#[async_trait]
pub trait Processor: Send + Sync {
    /// 处理器名称
    fn name(&self) -> &str;

    /// 处理思维内容
    async fn process(&self, content: &str, metadata: &Metadata) -> Result<Value>;
}

/// 处理器选择路径
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "route", content = "agent", rename_all = "snake_case")]
pub enum Route {
    /// 按思维类型注册的处理器
    Kind,
    /// 由权重学习器采样的 Agent
    Agent(String),
    /// 通用默认处理器
    Default,
}

/// 默认处理器，确认收到任意思维
#[derive(Debug, Default)]
pub struct DefaultProcessor;

#[async_trait]
impl Processor for DefaultProcessor {
    fn name(&self) -> &str {
        "default"
    }

    async fn process(&self, content: &str, _metadata: &Metadata) -> Result<Value> {
        Ok(json!({
            "result": "Thought acknowledged",
            "content_chars": content.chars().count(),
            "timestamp": Utc::now().to_rfc3339(),
        }))
    }
}

/// 模拟处理器：等待固定延迟后返回固定消息
#[derive(Debug, Clone)]
pub struct SimulatedProcessor {
    name: String,
    message: String,
    delay: Duration,
}

impl SimulatedProcessor {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            delay: Duration::ZERO,
        }
    }

    /// 设置模拟耗时
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl Processor for SimulatedProcessor {
    fn name(&self) -> &str {
        &self.name
    }

    async fn process(&self, _content: &str, metadata: &Metadata) -> Result<Value> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let mut output = json!({
            "processor": self.name,
            "result": self.message,
            "timestamp": Utc::now().to_rfc3339(),
        });
        if let Some(memory_id) = metadata.get("memory_id") {
            output["memory_id"] = memory_id.clone();
        }
        Ok(output)
    }
}

/// 同步闭包处理器
pub struct FnProcessor<F> {
    name: String,
    func: F,
}

impl<F> FnProcessor<F>
where
    F: Fn(&str, &Metadata) -> Result<Value> + Send + Sync,
{
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

#[async_trait]
impl<F> Processor for FnProcessor<F>
where
    F: Fn(&str, &Metadata) -> Result<Value> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn process(&self, content: &str, metadata: &Metadata) -> Result<Value> {
        (self.func)(content, metadata)
    }
}

/// 处理器注册表
pub struct ProcessorRegistry {
    /// 按类型注册
    kinds: HashMap<ThoughtKind, Arc<dyn Processor>>,
    /// 按 Agent 名称注册
    agents: HashMap<String, Arc<dyn Processor>>,
    default: Arc<dyn Processor>,
}

impl ProcessorRegistry {
    /// 创建只含默认处理器的注册表
    pub fn new() -> Self {
        Self {
            kinds: HashMap::new(),
            agents: HashMap::new(),
            default: Arc::new(DefaultProcessor),
        }
    }

    pub fn register_kind(&mut self, kind: ThoughtKind, processor: Arc<dyn Processor>) {
        self.kinds.insert(kind, processor);
    }

    pub fn register_agent(&mut self, name: impl Into<String>, processor: Arc<dyn Processor>) {
        self.agents.insert(name.into(), processor);
    }

    pub fn set_default(&mut self, processor: Arc<dyn Processor>) {
        self.default = processor;
    }

    pub fn for_kind(&self, kind: &ThoughtKind) -> Option<Arc<dyn Processor>> {
        self.kinds.get(kind).cloned()
    }

    pub fn for_agent(&self, name: &str) -> Option<Arc<dyn Processor>> {
        self.agents.get(name).cloned()
    }

    pub fn default_processor(&self) -> Arc<dyn Processor> {
        Arc::clone(&self.default)
    }
}

impl Default for ProcessorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// 调用处理器，错误与 panic 都转为带错误标记的结果
pub(crate) async fn invoke(processor: &dyn Processor, content: &str, metadata: &Metadata) -> ThoughtResult {
    match AssertUnwindSafe(processor.process(content, metadata))
        .catch_unwind()
        .await
    {
        Ok(Ok(output)) => ThoughtResult::Completed { output },
        Ok(Err(err)) => ThoughtResult::Failed {
            error: err.to_string(),
        },
        Err(panic) => ThoughtResult::Failed {
            error: format!("processor '{}' panicked: {}", processor.name(), panic_message(&*panic)),
        },
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tl_core::ThoughtLoomError;

    #[tokio::test]
    async fn test_simulated_processor_output() {
        let processor = SimulatedProcessor::new("memory", "Memory processed");
        let mut metadata = Metadata::new();
        metadata.insert("memory_id".into(), json!(42));

        let output = processor.process("remember", &metadata).await.unwrap();
        assert_eq!(output["result"], "Memory processed");
        assert_eq!(output["memory_id"], 42);
    }

    #[tokio::test]
    async fn test_invoke_catches_errors_and_panics() {
        let failing = FnProcessor::new("failing", |_: &str, _: &Metadata| {
            Err(ThoughtLoomError::Processor("no insight".into()))
        });
        let result = invoke(&failing, "x", &Metadata::new()).await;
        assert_eq!(
            result,
            ThoughtResult::Failed {
                error: "Processor error: no insight".into()
            }
        );

        let panicking = FnProcessor::new("panicking", |_: &str, _: &Metadata| -> Result<Value> {
            panic!("lost in thought")
        });
        match invoke(&panicking, "x", &Metadata::new()).await {
            ThoughtResult::Failed { error } => assert!(error.contains("lost in thought")),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_default_processor_acknowledges() {
        let output = tokio_test::block_on(DefaultProcessor.process("héllo", &Metadata::new())).unwrap();
        assert_eq!(output["result"], "Thought acknowledged");
        assert_eq!(output["content_chars"], 5);
    }

    #[test]
    fn test_registry_lookup() {
        let mut registry = ProcessorRegistry::new();
        registry.register_kind(ThoughtKind::Doubt, Arc::new(SimulatedProcessor::new("doubt", "?")));
        registry.register_agent("pattern", Arc::new(SimulatedProcessor::new("pattern", "p")));
        registry.register_agent("emotional", Arc::new(SimulatedProcessor::new("emotional", "e")));

        assert!(registry.for_kind(&ThoughtKind::Doubt).is_some());
        assert!(registry.for_kind(&ThoughtKind::Memory).is_none());
        assert_eq!(registry.for_agent("pattern").unwrap().name(), "pattern");
        assert!(registry.for_agent("consistency").is_none());
        assert_eq!(registry.default_processor().name(), "default");
    }
}
