//! 思维实体
//!
//! 认知调度的最小工作单元，只包含数据与状态迁移。

use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use tl_core::entity::{new_entity_id, Entity, EntityId};
use tl_core::{Result, ThoughtLoomError};

/// 思维 ID
pub type ThoughtId = EntityId;

/// 附加元数据，对队列不透明
pub type Metadata = serde_json::Map<String, Value>;

/// 默认存活时间 (秒)
pub const DEFAULT_TTL_SECS: u64 = 300;

/// 正向反馈阈值，高于此值提升优先级
const POSITIVE_FEEDBACK: f64 = 0.7;
/// 负向反馈阈值，低于此值降低优先级
const NEGATIVE_FEEDBACK: f64 = 0.3;

/// 思维类型
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ThoughtKind {
    Reflection,
    Metacognition,
    Insight,
    Memory,
    Doubt,
    Contradiction,
    Pattern,
    Alert,
    /// 无特定意图，交由权重学习器采样 Agent
    Open,
    /// 未识别的类型，由默认处理器处理
    Unknown(String),
}

impl ThoughtKind {
    /// 从标签解析 (大小写不敏感，兼容葡语别名)
    pub fn parse(label: &str) -> Self {
        let normalized = label.trim().to_lowercase();
        match normalized.as_str() {
            "reflection" | "reflexao" => ThoughtKind::Reflection,
            "metacognition" | "metacognicao" => ThoughtKind::Metacognition,
            "insight" => ThoughtKind::Insight,
            "memory" | "memoria" => ThoughtKind::Memory,
            "doubt" | "duvida" => ThoughtKind::Doubt,
            "contradiction" | "contradicao" => ThoughtKind::Contradiction,
            "pattern" | "padrao" => ThoughtKind::Pattern,
            "alert" | "alerta" => ThoughtKind::Alert,
            "open" | "any" => ThoughtKind::Open,
            _ => ThoughtKind::Unknown(normalized),
        }
    }

    /// 规范名称
    pub fn as_str(&self) -> &str {
        match self {
            ThoughtKind::Reflection => "reflection",
            ThoughtKind::Metacognition => "metacognition",
            ThoughtKind::Insight => "insight",
            ThoughtKind::Memory => "memory",
            ThoughtKind::Doubt => "doubt",
            ThoughtKind::Contradiction => "contradiction",
            ThoughtKind::Pattern => "pattern",
            ThoughtKind::Alert => "alert",
            ThoughtKind::Open => "open",
            ThoughtKind::Unknown(label) => label,
        }
    }
}

impl From<String> for ThoughtKind {
    fn from(label: String) -> Self {
        ThoughtKind::parse(&label)
    }
}

impl From<&str> for ThoughtKind {
    fn from(label: &str) -> Self {
        ThoughtKind::parse(label)
    }
}

impl From<ThoughtKind> for String {
    fn from(kind: ThoughtKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for ThoughtKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 思维状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThoughtState {
    /// 等待调度
    Pending,
    /// 已出队，处理中
    Dispatched,
    /// 已处理 (终态)
    Processed,
    /// 已过期 (终态，只能由 Pending 到达)
    Expired,
}

impl ThoughtState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ThoughtState::Pending => "pending",
            ThoughtState::Dispatched => "dispatched",
            ThoughtState::Processed => "processed",
            ThoughtState::Expired => "expired",
        }
    }

    /// 是否为终态
    pub fn is_terminal(&self) -> bool {
        matches!(self, ThoughtState::Processed | ThoughtState::Expired)
    }
}

/// 处理结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ThoughtResult {
    /// 处理器正常返回
    Completed { output: Value },
    /// 处理器出错或 panic
    Failed { error: String },
    /// 过期哨兵
    Expired,
}

impl ThoughtResult {
    /// 是否带错误标记
    pub fn is_error(&self) -> bool {
        matches!(self, ThoughtResult::Failed { .. })
    }

    pub fn output(&self) -> Option<&Value> {
        match self {
            ThoughtResult::Completed { output } => Some(output),
            _ => None,
        }
    }
}

/// 思维
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thought {
    /// 思维 ID
    pub id: ThoughtId,
    /// 思维类型
    pub kind: ThoughtKind,
    /// 内容
    pub content: String,
    /// 优先级 (>= 0)
    pub priority: u32,
    /// 主导情绪
    pub emotion: Option<String>,
    /// 情绪强度 [0, 1]
    pub intensity: f64,
    /// 上下文标签
    pub tags: BTreeSet<String>,
    pub metadata: Metadata,
    /// 创建时间
    pub created_at: DateTime<Utc>,
    /// 过期时间
    pub expires_at: DateTime<Utc>,
    /// 当前状态
    pub state: ThoughtState,
    /// 处理结果 (仅终态持有)
    pub result: Option<ThoughtResult>,
    /// 完成时间
    pub processed_at: Option<DateTime<Utc>>,
    /// 反馈次数
    pub feedback_count: u32,
    /// 反馈均值 [0, 1]
    pub feedback_score: f64,
}

impl Thought {
    /// 创建新的思维
    pub fn new(kind: impl Into<ThoughtKind>, content: impl Into<String>) -> Self {
        Self::new_at(kind, content, Utc::now())
    }

    /// 以指定创建时间构造
    pub fn new_at(kind: impl Into<ThoughtKind>, content: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: new_entity_id(),
            kind: kind.into(),
            content: content.into(),
            priority: 0,
            emotion: None,
            intensity: 1.0,
            tags: BTreeSet::new(),
            metadata: Metadata::new(),
            created_at: now,
            expires_at: expiry_after(now, Duration::from_secs(DEFAULT_TTL_SECS)),
            state: ThoughtState::Pending,
            result: None,
            processed_at: None,
            feedback_count: 0,
            feedback_score: 0.0,
        }
    }

    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_emotion(mut self, emotion: impl Into<String>) -> Self {
        self.emotion = Some(emotion.into());
        self
    }

    pub fn with_intensity(mut self, intensity: f64) -> Self {
        self.set_intensity(intensity);
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// 设置存活时间，过期时间从创建时间起算
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.expires_at = expiry_after(self.created_at, ttl);
        self
    }

    /// 排序得分 = 优先级 × 情绪强度
    pub fn score(&self) -> f64 {
        self.priority as f64 * self.intensity
    }

    /// 是否在 `now` 时刻已过期
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// 调整优先级，下限为 0
    pub fn adjust_priority(&mut self, delta: i64) {
        let adjusted = (self.priority as i64).saturating_add(delta);
        self.priority = adjusted.clamp(0, u32::MAX as i64) as u32;
    }

    /// 设置情绪强度，钳制到 [0, 1]
    pub fn set_intensity(&mut self, intensity: f64) {
        self.intensity = if intensity.is_nan() {
            0.0
        } else {
            intensity.clamp(0.0, 1.0)
        };
    }

    /// 记录一次反馈
    ///
    /// 反馈分数按增量均值累计；分数 > 0.7 时优先级 +1，< 0.3 时 -1。
    pub fn add_feedback(&mut self, score: f64) {
        let score = score.clamp(0.0, 1.0);
        self.feedback_count += 1;
        self.feedback_score += (score - self.feedback_score) / self.feedback_count as f64;

        if score > POSITIVE_FEEDBACK {
            self.adjust_priority(1);
        } else if score < NEGATIVE_FEEDBACK {
            self.adjust_priority(-1);
        }
    }

    pub(crate) fn mark_dispatched(&mut self) -> Result<()> {
        self.transition(ThoughtState::Pending, ThoughtState::Dispatched)
    }

    pub(crate) fn mark_processed(&mut self, result: ThoughtResult, now: DateTime<Utc>) -> Result<()> {
        self.transition(ThoughtState::Dispatched, ThoughtState::Processed)?;
        self.result = Some(result);
        self.processed_at = Some(now);
        Ok(())
    }

    pub(crate) fn mark_expired(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.transition(ThoughtState::Pending, ThoughtState::Expired)?;
        self.result = Some(ThoughtResult::Expired);
        self.processed_at = Some(now);
        Ok(())
    }

    fn transition(&mut self, expected: ThoughtState, next: ThoughtState) -> Result<()> {
        if self.state != expected {
            return Err(ThoughtLoomError::InvalidState {
                id: self.id,
                from: self.state.as_str(),
                to: next.as_str(),
            });
        }
        self.state = next;
        Ok(())
    }
}

impl Entity for Thought {
    fn id(&self) -> EntityId {
        self.id
    }

    fn entity_type(&self) -> &'static str {
        "thought"
    }
}

impl fmt::Display for Thought {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let preview: String = self.content.chars().take(30).collect();
        write!(
            f,
            "<{} | {} | {}... | prio: {}",
            self.state.as_str().to_uppercase(),
            self.kind.as_str().to_uppercase(),
            preview,
            self.priority
        )?;
        if let Some(emotion) = &self.emotion {
            write!(f, " | {} ({:.1})", emotion, self.intensity)?;
        }
        if !self.tags.is_empty() {
            let tags: Vec<&str> = self.tags.iter().map(String::as_str).collect();
            write!(f, " | tags: {}", tags.join(","))?;
        }
        if self.feedback_count > 0 {
            write!(f, " | feedback: {:.1}", self.feedback_score)?;
        }
        f.write_str(">")
    }
}

/// 过期时间，溢出时截断到可表示的最大时间
fn expiry_after(created_at: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(ttl)
        .ok()
        .and_then(|delta| created_at.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
