//! 后台调度
//!
//! 两个独立任务：认知循环 (tick 后休眠) 与权重学习 (固定周期)。
//! 取消信号只在两次 tick 之间检查，进行中的 tick 总会完整结束。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use tl_core::{Event, EventKind, Result};

use crate::config::CognitiveConfig;
use crate::cycle::CognitiveCycle;
use crate::learner::LearnerStatus;

/// 调度器状态
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerStatus {
    pub running: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub last_tick_at: Option<DateTime<Utc>>,
    /// 处理过思维的 tick 数
    pub ticks: u64,
    pub pending: usize,
    pub total_processed: u64,
    pub total_expired: u64,
    pub learner: LearnerStatus,
}

/// 运行中的后台任务
struct Workers {
    shutdown: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

/// 认知调度器
pub struct Scheduler {
    cycle: Arc<CognitiveCycle>,
    tick_interval: Duration,
    learn_interval: Duration,
    running: AtomicBool,
    /// start/stop 全程持有此锁
    workers: Mutex<Option<Workers>>,
    started_at: RwLock<Option<DateTime<Utc>>>,
    events: broadcast::Sender<Event>,
}

impl Scheduler {
    pub fn new(cycle: Arc<CognitiveCycle>, tick_interval: Duration, learn_interval: Duration) -> Self {
        let (events, _) = broadcast::channel(cycle.config().event_capacity.max(1));
        Self {
            cycle,
            tick_interval,
            learn_interval,
            running: AtomicBool::new(false),
            workers: Mutex::new(None),
            started_at: RwLock::new(None),
            events,
        }
    }

    /// 按配置创建认知循环与调度器
    pub fn from_config(config: CognitiveConfig) -> Result<Self> {
        let tick_interval = config.tick_interval();
        let learn_interval = config.learn_interval();
        let cycle = Arc::new(CognitiveCycle::from_config(config)?);
        Ok(Self::new(cycle, tick_interval, learn_interval))
    }

    pub fn cycle(&self) -> &Arc<CognitiveCycle> {
        &self.cycle
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// 订阅启动/停止事件
    pub fn subscribe_events(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    /// 启动后台任务；已在运行时返回 false
    pub async fn start(&self) -> bool {
        let mut workers = self.workers.lock().await;
        if workers.is_some() {
            warn!("Scheduler already running");
            return false;
        }

        let token = CancellationToken::new();
        let tick_task = tokio::spawn(run_ticks(
            Arc::clone(&self.cycle),
            self.tick_interval,
            token.clone(),
        ));
        let learn_task = tokio::spawn(run_learner(
            Arc::clone(&self.cycle),
            self.learn_interval,
            token.clone(),
        ));

        *workers = Some(Workers {
            shutdown: token,
            handles: vec![tick_task, learn_task],
        });
        self.running.store(true, Ordering::SeqCst);
        *self.started_at.write().await = Some(Utc::now());

        info!(
            tick_interval_ms = self.tick_interval.as_millis() as u64,
            learn_interval_secs = self.learn_interval.as_secs(),
            "Cognitive scheduler started"
        );
        let _ = self.events.send(Event::system(
            EventKind::SchedulerStarted,
            json!({
                "tick_interval_ms": self.tick_interval.as_millis() as u64,
                "learn_interval_secs": self.learn_interval.as_secs(),
            }),
        ));
        true
    }

    /// 发出取消信号并等待两个任务退出
    pub async fn stop(&self) {
        let mut workers = self.workers.lock().await;
        let Some(Workers { shutdown, handles }) = workers.take() else {
            return;
        };

        shutdown.cancel();
        for handle in handles {
            if let Err(err) = handle.await {
                warn!(%err, "Scheduler task ended abnormally");
            }
        }

        self.running.store(false, Ordering::SeqCst);
        *self.started_at.write().await = None;
        info!(ticks = self.cycle.tick_count(), "Cognitive scheduler stopped");
        let _ = self.events.send(Event::system(
            EventKind::SchedulerStopped,
            json!({ "ticks": self.cycle.tick_count() }),
        ));
    }

    pub async fn status(&self) -> SchedulerStatus {
        let (pending, stats) = self
            .cycle
            .inspect(|queue| (queue.len(), queue.stats().clone()))
            .await;
        SchedulerStatus {
            running: self.is_running(),
            started_at: *self.started_at.read().await,
            last_tick_at: self.cycle.last_tick_at().await,
            ticks: self.cycle.tick_count(),
            pending,
            total_processed: stats.total_processed,
            total_expired: stats.total_expired,
            learner: self.cycle.learner().status().await,
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        if let Some(workers) = self.workers.get_mut().as_ref() {
            workers.shutdown.cancel();
        }
    }
}

async fn run_ticks(cycle: Arc<CognitiveCycle>, interval: Duration, token: CancellationToken) {
    debug!("Cognitive loop started");
    loop {
        if token.is_cancelled() {
            break;
        }
        if let Some(summary) = cycle.tick().await {
            debug!(
                thought_id = %summary.thought_id,
                kind = %summary.kind,
                failed = summary.result.is_error(),
                "Tick completed"
            );
        }
        tokio::select! {
            _ = token.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }
    }
    debug!("Cognitive loop stopped");
}

async fn run_learner(cycle: Arc<CognitiveCycle>, interval: Duration, token: CancellationToken) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // 第一次 tick 立即返回
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => {
                if !cycle.learn().await {
                    debug!("No effectiveness signal, weights unchanged");
                }
            }
        }
    }
    debug!("Weight learner stopped");
}
