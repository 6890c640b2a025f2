//! 认知循环 / 调度器
//!
//! 一次 tick：出队一个思维 → 选择处理器 → 处理 → 评估反馈 → 完成。
//! tick 本身从不返回错误，处理器失败会被捕获并记录为带错误标记的结果。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::{broadcast, Mutex, RwLock};
use tracing::{debug, error, info, warn};

use tl_core::{Event, EventKind, Result, ThoughtLoomError};

use crate::config::CognitiveConfig;
use crate::learner::{AgentWeights, WeightLearner};
use crate::processor::{self, Processor, ProcessorRegistry, Route};
use crate::queue::{validate_score, QueueSnapshot, QueueStats, ThoughtQueue};
use crate::thought::{Metadata, Thought, ThoughtId, ThoughtKind, ThoughtResult};

/// 思维提交请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitRequest {
    pub kind: String,
    pub content: String,
    #[serde(default)]
    pub priority: u32,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub emotion: Option<String>,
    /// 情绪强度，默认 1.0
    #[serde(default)]
    pub intensity: Option<f64>,
    /// 存活时间，缺省使用配置中的默认值
    #[serde(default)]
    pub ttl: Option<Duration>,
}

impl SubmitRequest {
    pub fn new(kind: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            content: content.into(),
            priority: 0,
            metadata: Metadata::new(),
            tags: Vec::new(),
            emotion: None,
            intensity: None,
            ttl: None,
        }
    }

    pub fn priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    pub fn emotion(mut self, emotion: impl Into<String>) -> Self {
        self.emotion = Some(emotion.into());
        self
    }

    pub fn intensity(mut self, intensity: f64) -> Self {
        self.intensity = Some(intensity);
        self
    }

    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    pub fn metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    fn validate(&self) -> Result<()> {
        if self.kind.trim().is_empty() {
            return Err(ThoughtLoomError::Validation("kind must not be empty".into()));
        }
        if self.content.trim().is_empty() {
            return Err(ThoughtLoomError::Validation("content must not be empty".into()));
        }
        if let Some(intensity) = self.intensity {
            if !(0.0..=1.0).contains(&intensity) {
                return Err(ThoughtLoomError::Validation(format!(
                    "intensity must be within [0, 1], got {}",
                    intensity
                )));
            }
        }
        if self.ttl.is_some_and(|ttl| ttl.is_zero()) {
            return Err(ThoughtLoomError::Validation("ttl must be > 0".into()));
        }
        Ok(())
    }
}

/// 单次 tick 的摘要
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleSummary {
    pub thought_id: ThoughtId,
    pub kind: ThoughtKind,
    /// 处理器选择路径
    pub route: Route,
    pub result: ThoughtResult,
    /// 反馈分数 (处理失败时为 None)
    pub feedback: Option<f64>,
    pub emotion: Option<String>,
    pub tags: Vec<String>,
    /// 完成后的统计
    pub stats: QueueStats,
}

/// 认知循环
pub struct CognitiveCycle {
    queue: Mutex<ThoughtQueue>,
    registry: RwLock<ProcessorRegistry>,
    learner: Arc<WeightLearner>,
    config: CognitiveConfig,
    events: broadcast::Sender<Event>,
    /// 保证同一时刻只有一个 tick
    tick_guard: Mutex<()>,
    ticks: AtomicU64,
    last_tick_at: RwLock<Option<DateTime<Utc>>>,
}

impl CognitiveCycle {
    /// 使用注入的学习器创建循环
    pub fn new(config: CognitiveConfig, learner: Arc<WeightLearner>) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        Self {
            queue: Mutex::new(ThoughtQueue::new()),
            registry: RwLock::new(ProcessorRegistry::new()),
            learner,
            config,
            events,
            tick_guard: Mutex::new(()),
            ticks: AtomicU64::new(0),
            last_tick_at: RwLock::new(None),
        }
    }

    /// 按配置创建循环与学习器
    pub fn from_config(config: CognitiveConfig) -> Result<Self> {
        config.validate()?;
        let prior = AgentWeights::new(config.agent_prior.clone())?;
        let learner = Arc::new(WeightLearner::new(prior, config.learning_retention, config.rng_seed));
        Ok(Self::new(config, learner))
    }

    pub fn config(&self) -> &CognitiveConfig {
        &self.config
    }

    pub fn learner(&self) -> Arc<WeightLearner> {
        Arc::clone(&self.learner)
    }

    /// 订阅生命周期事件
    pub fn subscribe_events(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    fn emit(&self, event: Event) {
        // 没有订阅者时发送失败，忽略即可
        let _ = self.events.send(event);
    }

    pub async fn register_processor(&self, kind: impl Into<ThoughtKind>, processor: Arc<dyn Processor>) {
        let kind = kind.into();
        info!(kind = %kind, processor = processor.name(), "Processor registered");
        self.registry.write().await.register_kind(kind, processor);
    }

    pub async fn register_agent(&self, name: impl Into<String>, processor: Arc<dyn Processor>) {
        let name = name.into();
        info!(agent = %name, processor = processor.name(), "Agent registered");
        self.registry.write().await.register_agent(name, processor);
    }

    pub async fn set_default_processor(&self, processor: Arc<dyn Processor>) {
        self.registry.write().await.set_default(processor);
    }

    /// 提交新思维
    pub async fn submit(&self, request: SubmitRequest) -> Result<ThoughtId> {
        self.submit_at(request, Utc::now()).await
    }

    /// 以指定时间提交
    ///
    /// 情绪规则在入队前只应用一次。
    pub async fn submit_at(&self, request: SubmitRequest, now: DateTime<Utc>) -> Result<ThoughtId> {
        request.validate()?;

        let priority = self
            .config
            .emotion
            .apply(request.priority, request.emotion.as_deref());
        let mut thought = Thought::new_at(request.kind.as_str(), request.content, now)
            .with_priority(priority)
            .with_intensity(request.intensity.unwrap_or(1.0))
            .with_tags(request.tags)
            .with_metadata(request.metadata)
            .with_ttl(request.ttl.unwrap_or_else(|| self.config.default_ttl()));
        thought.emotion = request.emotion;

        let id = thought.id;
        let payload = json!({
            "kind": thought.kind.as_str(),
            "priority": thought.priority,
            "emotion": thought.emotion,
        });
        info!(
            thought_id = %id,
            kind = %thought.kind,
            priority = thought.priority,
            emotion = thought.emotion.as_deref().unwrap_or("-"),
            "New thought received"
        );

        self.queue.lock().await.enqueue(thought)?;
        self.emit(Event::new(EventKind::ThoughtSubmitted, id, payload));
        Ok(id)
    }

    /// 执行一次认知 tick；队列为空时返回 None
    pub async fn tick(&self) -> Option<CycleSummary> {
        self.run_tick(None).await
    }

    /// 以指定时间执行 tick
    pub async fn tick_at(&self, now: DateTime<Utc>) -> Option<CycleSummary> {
        self.run_tick(Some(now)).await
    }

    async fn run_tick(&self, now: Option<DateTime<Utc>>) -> Option<CycleSummary> {
        let clock = || now.unwrap_or_else(Utc::now);
        let _guard = self.tick_guard.lock().await;

        let started = clock();
        let (dequeued, expired) = {
            let mut queue = self.queue.lock().await;
            let expired = queue.expire_sweep_at(started);
            (queue.dequeue_next_at(started), expired)
        };
        self.emit_expired(expired);

        let Some(mut thought) = dequeued else {
            debug!("No thoughts in queue");
            return None;
        };
        *self.last_tick_at.write().await = Some(started);
        self.ticks.fetch_add(1, Ordering::Relaxed);

        let (route, processor) = self.resolve(&thought.kind).await;
        debug!(
            thought_id = %thought.id,
            kind = %thought.kind,
            ?route,
            processor = processor.name(),
            "Dispatching thought"
        );
        let dispatched = Event::new(
            EventKind::ThoughtDispatched,
            thought.id,
            json!({ "kind": thought.kind.as_str(), "route": route }),
        );
        let dispatched_id = dispatched.id;
        self.emit(dispatched);

        let result = processor::invoke(processor.as_ref(), &thought.content, &thought.metadata).await;

        let feedback = match &result {
            ThoughtResult::Completed { .. } => {
                let score = self.config.feedback.evaluate(&thought.kind, &result);
                thought.add_feedback(score);
                Some(score)
            }
            ThoughtResult::Failed { error } => {
                warn!(thought_id = %thought.id, kind = %thought.kind, %error, "Processor failed");
                self.emit(
                    Event::new(EventKind::ProcessorFailed, thought.id, json!({ "error": error }))
                        .with_causation(dispatched_id),
                );
                None
            }
            ThoughtResult::Expired => None,
        };

        if let (Route::Agent(agent), Some(score)) = (&route, feedback) {
            if score >= self.config.effective_threshold {
                self.learner.record_effective(agent).await;
            }
        }

        let thought_id = thought.id;
        let kind = thought.kind.clone();
        let emotion = thought.emotion.clone();
        let tags: Vec<String> = thought.tags.iter().cloned().collect();

        let stats = {
            let mut queue = self.queue.lock().await;
            if let Err(err) = queue.record_result_at(thought, result.clone(), clock()) {
                error!(thought_id = %thought_id, %err, "Failed to record thought result");
            }
            queue.stats().clone()
        };
        info!(
            thought_id = %thought_id,
            kind = %kind,
            feedback = feedback.unwrap_or(0.0),
            total_processed = stats.total_processed,
            "Thought processed"
        );
        self.emit(
            Event::new(
                EventKind::ThoughtProcessed,
                thought_id,
                json!({ "kind": kind.as_str(), "feedback": feedback, "failed": result.is_error() }),
            )
            .with_causation(dispatched_id),
        );

        Some(CycleSummary {
            thought_id,
            kind,
            route,
            result,
            feedback,
            emotion,
            tags,
            stats,
        })
    }

    /// 选择处理器
    async fn resolve(&self, kind: &ThoughtKind) -> (Route, Arc<dyn Processor>) {
        if *kind == ThoughtKind::Open {
            if let Some(agent) = self.learner.select_agent().await {
                let registry = self.registry.read().await;
                return match registry.for_agent(&agent) {
                    Some(processor) => (Route::Agent(agent), processor),
                    None => {
                        debug!(agent = %agent, "Sampled agent has no processor, using default");
                        (Route::Default, registry.default_processor())
                    }
                };
            }
        }

        let registry = self.registry.read().await;
        match registry.for_kind(kind) {
            Some(processor) => (Route::Kind, processor),
            None => (Route::Default, registry.default_processor()),
        }
    }

    /// 执行一个学习周期，权重变化时广播事件
    pub async fn learn(&self) -> bool {
        let updated = self.learner.learn().await;
        if updated {
            let weights = self.learner.weights().await;
            self.emit(Event::system(
                EventKind::WeightsUpdated,
                json!({ "weights": &*weights }),
            ));
        }
        updated
    }

    /// 为思维添加反馈
    pub async fn add_feedback(&self, id: ThoughtId, score: f64) -> Result<()> {
        validate_score(score)?;
        self.queue.lock().await.add_feedback(id, score)?;
        self.emit(Event::new(EventKind::FeedbackRecorded, id, json!({ "score": score })));
        Ok(())
    }

    /// 清理过期后判断队列是否为空
    pub async fn is_empty(&self) -> bool {
        self.is_empty_at(Utc::now()).await
    }

    pub async fn is_empty_at(&self, now: DateTime<Utc>) -> bool {
        let (empty, expired) = {
            let mut queue = self.queue.lock().await;
            let expired = queue.expire_sweep_at(now);
            (queue.len() == 0, expired)
        };
        self.emit_expired(expired);
        empty
    }

    fn emit_expired(&self, ids: Vec<ThoughtId>) {
        for id in ids {
            self.emit(Event::new(EventKind::ThoughtExpired, id, json!({})));
        }
    }

    pub async fn stats(&self) -> QueueStats {
        self.queue.lock().await.stats().clone()
    }

    /// 在队列锁内执行只读查询
    pub async fn inspect<R>(&self, f: impl FnOnce(&ThoughtQueue) -> R) -> R {
        let queue = self.queue.lock().await;
        f(&queue)
    }

    pub async fn pending(&self) -> Vec<Thought> {
        self.inspect(ThoughtQueue::pending).await
    }

    /// 最近 n 条历史
    pub async fn history(&self, n: usize) -> Vec<Thought> {
        self.inspect(|queue| queue.recent(n).to_vec()).await
    }

    pub async fn find(&self, id: ThoughtId) -> Option<Thought> {
        self.inspect(|queue| queue.find(id).cloned()).await
    }

    pub async fn prune_history(&self, keep_last: usize) -> usize {
        self.queue.lock().await.prune_history(keep_last)
    }

    /// 生成快照，等待进行中的 tick 完成
    pub async fn snapshot(&self) -> QueueSnapshot {
        let _guard = self.tick_guard.lock().await;
        self.queue.lock().await.snapshot()
    }

    /// 用快照替换当前队列
    pub async fn restore(&self, snapshot: QueueSnapshot) -> Result<()> {
        let restored = ThoughtQueue::restore(snapshot)?;
        let _guard = self.tick_guard.lock().await;
        *self.queue.lock().await = restored;
        Ok(())
    }

    /// 已执行 (且有工作) 的 tick 数
    pub fn tick_count(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    pub async fn last_tick_at(&self) -> Option<DateTime<Utc>> {
        *self.last_tick_at.read().await
    }
}
