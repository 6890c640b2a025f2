//! 思维优先队列
//!
//! 按 `优先级 × 情绪强度` 降序排列，得分相同按入队顺序 (FIFO)。
//! 过期清理在读取前惰性执行，不依赖后台定时器。

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use tl_core::{Result, ThoughtLoomError};

use crate::thought::{Thought, ThoughtId, ThoughtKind, ThoughtResult, ThoughtState};

/// 队列统计
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueueStats {
    /// 已处理总数
    pub total_processed: u64,
    /// 已过期总数
    pub total_expired: u64,
    /// 按类型计数
    pub by_kind: BTreeMap<String, u64>,
    /// 按情绪计数
    pub by_emotion: BTreeMap<String, u64>,
    /// 参与反馈均值的样本数
    pub feedback_samples: u64,
    /// 已处理思维的反馈均值
    pub feedback_mean: f64,
}

impl QueueStats {
    fn record_processed(&mut self, thought: &Thought) {
        self.total_processed += 1;
        *self.by_kind.entry(thought.kind.as_str().to_string()).or_insert(0) += 1;
        if let Some(emotion) = &thought.emotion {
            *self.by_emotion.entry(emotion.clone()).or_insert(0) += 1;
        }
        if thought.feedback_count > 0 {
            self.feedback_samples += 1;
            self.feedback_mean +=
                (thought.feedback_score - self.feedback_mean) / self.feedback_samples as f64;
        }
    }
}

/// 可序列化的队列快照，持久化方式由调用方决定
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueSnapshot {
    /// 待处理思维 (按调度顺序)
    pub pending: Vec<Thought>,
    /// 历史记录
    pub history: Vec<Thought>,
    pub stats: QueueStats,
}

#[derive(Debug, Clone)]
struct QueueEntry {
    seq: u64,
    thought: Thought,
}

impl QueueEntry {
    /// `self` 是否应排在 `other` 之前
    fn precedes(&self, other: &QueueEntry) -> bool {
        let (a, b) = (self.thought.score(), other.thought.score());
        a > b || (a == b && self.seq < other.seq)
    }
}

/// 思维队列
#[derive(Debug, Default)]
pub struct ThoughtQueue {
    /// 活跃队列 (已排序)
    active: Vec<QueueEntry>,
    /// 追加式历史
    history: Vec<Thought>,
    /// 已出队未完成
    in_flight: HashSet<ThoughtId>,
    stats: QueueStats,
    next_seq: u64,
}

impl ThoughtQueue {
    /// 创建空队列
    pub fn new() -> Self {
        Self::default()
    }

    /// 从快照恢复
    pub fn restore(snapshot: QueueSnapshot) -> Result<Self> {
        let mut queue = Self {
            history: snapshot.history,
            stats: snapshot.stats,
            ..Self::default()
        };
        for thought in snapshot.pending {
            queue.enqueue(thought)?;
        }
        Ok(queue)
    }

    /// 生成快照 (不包含处理中的思维)
    pub fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            pending: self.pending(),
            history: self.history.clone(),
            stats: self.stats.clone(),
        }
    }

    /// 入队，保持排序不变式
    pub fn enqueue(&mut self, thought: Thought) -> Result<ThoughtId> {
        if thought.state != ThoughtState::Pending {
            return Err(ThoughtLoomError::InvalidState {
                id: thought.id,
                from: thought.state.as_str(),
                to: ThoughtState::Pending.as_str(),
            });
        }

        let id = thought.id;
        let entry = QueueEntry {
            seq: self.next_seq,
            thought,
        };
        self.next_seq += 1;
        self.insert_sorted(entry);
        Ok(id)
    }

    fn insert_sorted(&mut self, entry: QueueEntry) {
        let index = self.active.partition_point(|existing| existing.precedes(&entry));
        self.active.insert(index, entry);
    }

    /// 清理过期思维，返回被过期的 ID
    pub fn expire_sweep_at(&mut self, now: DateTime<Utc>) -> Vec<ThoughtId> {
        if !self.active.iter().any(|e| e.thought.is_expired_at(now)) {
            return Vec::new();
        }

        let (expired, live): (Vec<_>, Vec<_>) = self
            .active
            .drain(..)
            .partition(|e| e.thought.is_expired_at(now));
        self.active = live;

        let mut ids = Vec::with_capacity(expired.len());
        for QueueEntry { mut thought, .. } in expired {
            if let Err(err) = thought.mark_expired(now) {
                warn!(%err, "Skipping expiry of non-pending thought");
                continue;
            }
            debug!(thought_id = %thought.id, kind = %thought.kind, "Thought expired");
            ids.push(thought.id);
            self.stats.total_expired += 1;
            self.history.push(thought);
        }
        ids
    }

    pub fn expire_sweep(&mut self) -> Vec<ThoughtId> {
        self.expire_sweep_at(Utc::now())
    }

    /// 清理过期后判断是否为空
    pub fn is_empty_at(&mut self, now: DateTime<Utc>) -> bool {
        self.expire_sweep_at(now);
        self.active.is_empty()
    }

    pub fn is_empty(&mut self) -> bool {
        self.is_empty_at(Utc::now())
    }

    /// 清理过期后弹出得分最高的思维，状态迁移为 Dispatched
    pub fn dequeue_next_at(&mut self, now: DateTime<Utc>) -> Option<Thought> {
        self.expire_sweep_at(now);
        if self.active.is_empty() {
            return None;
        }

        let QueueEntry { mut thought, .. } = self.active.remove(0);
        if let Err(err) = thought.mark_dispatched() {
            warn!(%err, "Dropping non-pending thought from active queue");
            return None;
        }
        self.in_flight.insert(thought.id);
        Some(thought)
    }

    pub fn dequeue_next(&mut self) -> Option<Thought> {
        self.dequeue_next_at(Utc::now())
    }

    /// 记录处理结果：Dispatched → Processed，写入历史并更新统计
    pub fn record_result_at(
        &mut self,
        mut thought: Thought,
        result: ThoughtResult,
        now: DateTime<Utc>,
    ) -> Result<()> {
        thought.mark_processed(result, now)?;
        self.in_flight.remove(&thought.id);
        self.stats.record_processed(&thought);
        self.history.push(thought);
        Ok(())
    }

    pub fn record_result(&mut self, thought: Thought, result: ThoughtResult) -> Result<()> {
        self.record_result_at(thought, result, Utc::now())
    }

    /// 为指定思维添加反馈
    ///
    /// 待处理的思维会按新优先级重新定位；历史中的思维只更新记录。
    pub fn add_feedback(&mut self, id: ThoughtId, score: f64) -> Result<()> {
        validate_score(score)?;

        if let Some(index) = self.active.iter().position(|e| e.thought.id == id) {
            let mut entry = self.active.remove(index);
            entry.thought.add_feedback(score);
            self.insert_sorted(entry);
            return Ok(());
        }

        if self.in_flight.contains(&id) {
            return Err(ThoughtLoomError::InFlight(id));
        }

        match self.history.iter_mut().find(|t| t.id == id) {
            Some(thought) => {
                thought.add_feedback(score);
                Ok(())
            }
            None => Err(ThoughtLoomError::NotFound(id)),
        }
    }

    /// 活跃队列长度 (不触发过期清理)
    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    /// 按调度顺序列出待处理思维
    pub fn pending(&self) -> Vec<Thought> {
        self.active.iter().map(|e| e.thought.clone()).collect()
    }

    pub fn history(&self) -> &[Thought] {
        &self.history
    }

    /// 最近 n 条历史
    pub fn recent(&self, n: usize) -> &[Thought] {
        let start = self.history.len().saturating_sub(n);
        &self.history[start..]
    }

    /// 查找思维 (历史或活跃队列)
    pub fn find(&self, id: ThoughtId) -> Option<&Thought> {
        self.history
            .iter()
            .find(|t| t.id == id)
            .or_else(|| self.active.iter().map(|e| &e.thought).find(|t| t.id == id))
    }

    pub fn history_by_kind(&self, kind: &ThoughtKind) -> Vec<&Thought> {
        self.history.iter().filter(|t| &t.kind == kind).collect()
    }

    pub fn history_by_emotion(&self, emotion: &str) -> Vec<&Thought> {
        self.history
            .iter()
            .filter(|t| t.emotion.as_deref() == Some(emotion))
            .collect()
    }

    pub fn history_by_tag(&self, tag: &str) -> Vec<&Thought> {
        self.history.iter().filter(|t| t.tags.contains(tag)).collect()
    }

    /// 仅保留最近 `keep_last` 条历史，返回移除数量
    pub fn prune_history(&mut self, keep_last: usize) -> usize {
        let excess = self.history.len().saturating_sub(keep_last);
        self.history.drain(..excess);
        excess
    }

    pub fn stats(&self) -> &QueueStats {
        &self.stats
    }
}

pub(crate) fn validate_score(score: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&score) {
        return Err(ThoughtLoomError::Validation(format!(
            "feedback score must be within [0, 1], got {}",
            score
        )));
    }
    Ok(())
}
