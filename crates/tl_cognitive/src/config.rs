//! 认知调度配置
//!
//! 所有字段都有默认值；可从 JSON 加载，再用环境变量覆盖。

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use tl_core::{Result, ThoughtLoomError};

use crate::emotion::EmotionRules;
use crate::feedback::FeedbackRules;
use crate::learner::{AgentWeights, DEFAULT_RETENTION};
use crate::thought::DEFAULT_TTL_SECS;

/// 认知调度配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CognitiveConfig {
    /// 两次 tick 之间的休眠 (毫秒)
    pub tick_interval_ms: u64,
    /// 权重学习周期 (秒)
    pub learn_interval_secs: u64,
    /// 默认存活时间 (秒)
    pub default_ttl_secs: u64,
    /// 反馈分数达到此值即视为 Agent 有效
    pub effective_threshold: f64,
    /// 权重更新保留系数
    pub learning_retention: f64,
    /// 随机种子 (None 时使用系统熵)
    pub rng_seed: Option<u64>,
    /// 事件广播通道容量
    pub event_capacity: usize,
    /// Agent 先验分布
    pub agent_prior: BTreeMap<String, f64>,
    pub emotion: EmotionRules,
    pub feedback: FeedbackRules,
}

impl Default for CognitiveConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 100,
            learn_interval_secs: 600,
            default_ttl_secs: DEFAULT_TTL_SECS,
            effective_threshold: 0.6,
            learning_retention: DEFAULT_RETENTION,
            rng_seed: None,
            event_capacity: 256,
            agent_prior: [
                ("reflection", 0.4),
                ("emotional", 0.2),
                ("consistency", 0.2),
                ("pattern", 0.2),
            ]
            .into_iter()
            .map(|(name, weight)| (name.to_string(), weight))
            .collect(),
            emotion: EmotionRules::default(),
            feedback: FeedbackRules::default(),
        }
    }
}

impl CognitiveConfig {
    /// 从 JSON 字符串加载
    pub fn from_json_str(raw: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// 从 JSON 文件加载
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    /// 默认配置叠加环境变量
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// 用 `THOUGHTLOOM_*` 环境变量覆盖
    pub fn with_env_overrides(mut self) -> Self {
        self.tick_interval_ms = env_u64("THOUGHTLOOM_TICK_INTERVAL_MS", self.tick_interval_ms);
        self.learn_interval_secs = env_u64("THOUGHTLOOM_LEARN_INTERVAL_SECS", self.learn_interval_secs);
        self.default_ttl_secs = env_u64("THOUGHTLOOM_DEFAULT_TTL_SECS", self.default_ttl_secs);
        if let Ok(raw) = std::env::var("THOUGHTLOOM_RNG_SEED") {
            match raw.trim().parse() {
                Ok(seed) => self.rng_seed = Some(seed),
                Err(_) => warn!(value = %raw, "Ignoring invalid THOUGHTLOOM_RNG_SEED"),
            }
        }
        self
    }

    /// 校验取值范围
    pub fn validate(&self) -> Result<()> {
        if self.default_ttl_secs == 0 {
            return Err(ThoughtLoomError::Config("default_ttl_secs must be > 0".into()));
        }
        if self.learn_interval_secs == 0 {
            return Err(ThoughtLoomError::Config("learn_interval_secs must be > 0".into()));
        }
        if !(0.0..=1.0).contains(&self.effective_threshold) {
            return Err(ThoughtLoomError::Config(
                "effective_threshold must be within [0, 1]".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.learning_retention) {
            return Err(ThoughtLoomError::Config(
                "learning_retention must be within [0, 1]".into(),
            ));
        }
        if self.event_capacity == 0 {
            return Err(ThoughtLoomError::Config("event_capacity must be > 0".into()));
        }
        AgentWeights::new(self.agent_prior.clone())
            .map_err(|err| ThoughtLoomError::Config(err.to_string()))?;
        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn learn_interval(&self) -> Duration {
        Duration::from_secs(self.learn_interval_secs)
    }

    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_secs)
    }
}

fn env_u64(key: &str, default: u64) -> u64 {
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!(key, value = %raw, "Ignoring invalid numeric environment override");
            default
        }),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = CognitiveConfig::default();
        config.validate().unwrap();
        assert_eq!(config.default_ttl(), Duration::from_secs(300));
        assert_eq!(config.agent_prior.len(), 4);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config =
            CognitiveConfig::from_json_str(r#"{ "tick_interval_ms": 5, "rng_seed": 42 }"#).unwrap();
        assert_eq!(config.tick_interval(), Duration::from_millis(5));
        assert_eq!(config.rng_seed, Some(42));
        assert_eq!(config.learning_retention, DEFAULT_RETENTION);
    }

    #[test]
    fn test_rejects_invalid_values() {
        assert!(matches!(
            CognitiveConfig::from_json_str(r#"{ "default_ttl_secs": 0 }"#),
            Err(ThoughtLoomError::Config(_))
        ));
        assert!(matches!(
            CognitiveConfig::from_json_str(r#"{ "agent_prior": { "a": 0.0 } }"#),
            Err(ThoughtLoomError::Config(_))
        ));
        assert!(matches!(
            CognitiveConfig::from_json_str("not json"),
            Err(ThoughtLoomError::Serialization(_))
        ));
    }

    #[test]
    fn test_env_override() {
        std::env::set_var("THOUGHTLOOM_LEARN_INTERVAL_SECS", "42");
        let config = CognitiveConfig::from_env();
        std::env::remove_var("THOUGHTLOOM_LEARN_INTERVAL_SECS");
        assert_eq!(config.learn_interval_secs, 42);
    }
}
