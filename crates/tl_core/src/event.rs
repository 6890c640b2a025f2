//! 认知生命周期事件定义

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entity::EntityId;

/// 生命周期事件
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// 事件唯一标识
    pub id: Uuid,
    /// 事件类型
    pub kind: EventKind,
    /// 事件时间戳
    pub timestamp: DateTime<Utc>,
    /// 关联实体 ID (思维 ID，调度器级事件为 nil)
    pub entity_id: EntityId,
    /// 事件载荷 (JSON)
    pub payload: serde_json::Value,
    /// 因果关系: 前置事件 ID
    pub causation_id: Option<Uuid>,
}

impl Event {
    /// 创建新事件
    pub fn new(kind: EventKind, entity_id: EntityId, payload: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            timestamp: Utc::now(),
            entity_id,
            payload,
            causation_id: None,
        }
    }

    /// 创建不关联具体思维的系统事件
    pub fn system(kind: EventKind, payload: serde_json::Value) -> Self {
        Self::new(kind, Uuid::nil(), payload)
    }

    /// 设置因果关系
    pub fn with_causation(mut self, causation_id: Uuid) -> Self {
        self.causation_id = Some(causation_id);
        self
    }
}

/// 事件类型枚举
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum EventKind {
    // 思维事件
    ThoughtSubmitted,
    ThoughtDispatched,
    ThoughtProcessed,
    ThoughtExpired,
    ProcessorFailed,
    FeedbackRecorded,

    // 学习事件
    WeightsUpdated,

    // 调度器事件
    SchedulerStarted,
    SchedulerStopped,
}

impl EventKind {
    /// 获取事件类型名称
    pub fn as_str(&self) -> &str {
        match self {
            EventKind::ThoughtSubmitted => "thought_submitted",
            EventKind::ThoughtDispatched => "thought_dispatched",
            EventKind::ThoughtProcessed => "thought_processed",
            EventKind::ThoughtExpired => "thought_expired",
            EventKind::ProcessorFailed => "processor_failed",
            EventKind::FeedbackRecorded => "feedback_recorded",
            EventKind::WeightsUpdated => "weights_updated",
            EventKind::SchedulerStarted => "scheduler_started",
            EventKind::SchedulerStopped => "scheduler_stopped",
        }
    }
}
