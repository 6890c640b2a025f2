//! 权重学习器
//!
//! 根据观测到的有效性信号，自适应调整 Agent 选择概率。
//! 权重分布不可变，每次更新整体替换为新的分布。

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

use tl_core::{Result, ThoughtLoomError};

/// 默认保留系数：新权重 = 0.7 × 旧权重 + 0.3 × 观测分布
pub const DEFAULT_RETENTION: f64 = 0.7;

/// Agent 权重分布 (和为 1)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentWeights(BTreeMap<String, f64>);

impl AgentWeights {
    /// 从先验分布构造并归一化
    pub fn new(prior: BTreeMap<String, f64>) -> Result<Self> {
        if let Some((name, weight)) = prior.iter().find(|(_, w)| !w.is_finite() || **w < 0.0) {
            return Err(ThoughtLoomError::Validation(format!(
                "agent weight for '{}' must be finite and >= 0, got {}",
                name, weight
            )));
        }
        let total: f64 = prior.values().sum();
        if total <= 0.0 {
            return Err(ThoughtLoomError::Validation(
                "agent prior must contain a positive weight".to_string(),
            ));
        }
        Ok(Self(prior.into_iter().map(|(k, w)| (k, w / total)).collect()))
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.0.get(name).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(k, w)| (k.as_str(), *w))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// 权重总和
    pub fn total(&self) -> f64 {
        self.0.values().sum()
    }

    /// 与有效性计数混合，返回新分布；无信号时返回 None
    ///
    /// 不在分布中的 Agent 计数被忽略。
    pub fn blend(&self, counts: &HashMap<String, u64>, retention: f64) -> Option<AgentWeights> {
        let signal: u64 = self
            .0
            .keys()
            .map(|name| counts.get(name).copied().unwrap_or(0))
            .sum();
        if signal == 0 {
            return None;
        }

        let retention = retention.clamp(0.0, 1.0);
        let mut blended: BTreeMap<String, f64> = self
            .0
            .iter()
            .map(|(name, old)| {
                let observed = counts.get(name).copied().unwrap_or(0) as f64 / signal as f64;
                (name.clone(), retention * old + (1.0 - retention) * observed)
            })
            .collect();

        let total: f64 = blended.values().sum();
        if total > 0.0 {
            blended.values_mut().for_each(|w| *w /= total);
        }
        Some(AgentWeights(blended))
    }

    /// 按权重进行类别采样
    pub fn sample<R: rand::Rng + ?Sized>(&self, rng: &mut R) -> Option<String> {
        let names: Vec<&String> = self.0.keys().collect();
        let index = WeightedIndex::new(self.0.values()).ok()?;
        names.get(index.sample(rng)).map(|name| (*name).clone())
    }
}

/// 学习器状态
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearnerStatus {
    /// 学习周期总数
    pub cycles: u64,
    /// 实际更新了权重的周期数
    pub updates: u64,
    pub last_update: Option<DateTime<Utc>>,
    pub weights: AgentWeights,
}

/// 权重学习器
pub struct WeightLearner {
    /// 当前分布 (只由学习器替换)
    weights: RwLock<Arc<AgentWeights>>,
    /// 可复现的随机源
    rng: Mutex<StdRng>,
    /// 当前窗口内的有效性计数
    effectiveness: Mutex<HashMap<String, u64>>,
    retention: f64,
    cycles: AtomicU64,
    updates: AtomicU64,
    last_update: RwLock<Option<DateTime<Utc>>>,
}

impl WeightLearner {
    /// 创建学习器；`seed` 为 None 时使用系统熵
    pub fn new(prior: AgentWeights, retention: f64, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            weights: RwLock::new(Arc::new(prior)),
            rng: Mutex::new(rng),
            effectiveness: Mutex::new(HashMap::new()),
            retention: retention.clamp(0.0, 1.0),
            cycles: AtomicU64::new(0),
            updates: AtomicU64::new(0),
            last_update: RwLock::new(None),
        }
    }

    /// 当前权重快照
    pub async fn weights(&self) -> Arc<AgentWeights> {
        Arc::clone(&*self.weights.read().await)
    }

    /// 按当前分布采样一个 Agent
    pub async fn select_agent(&self) -> Option<String> {
        let weights = self.weights().await;
        let mut rng = self.rng.lock().await;
        weights.sample(&mut *rng)
    }

    /// 用有效性计数更新权重；无信号时不做任何改变并返回 false
    pub async fn update(&self, counts: &HashMap<String, u64>) -> bool {
        let mut guard = self.weights.write().await;
        match guard.blend(counts, self.retention) {
            Some(next) => {
                debug!(?next, "Agent weights blended");
                *guard = Arc::new(next);
                drop(guard);
                self.updates.fetch_add(1, Ordering::Relaxed);
                *self.last_update.write().await = Some(Utc::now());
                true
            }
            None => false,
        }
    }

    /// 记录一次 Agent 处理的有效结果
    pub async fn record_effective(&self, agent: &str) {
        let mut counts = self.effectiveness.lock().await;
        *counts.entry(agent.to_string()).or_insert(0) += 1;
    }

    /// 当前窗口的有效性计数
    pub async fn effectiveness(&self) -> HashMap<String, u64> {
        self.effectiveness.lock().await.clone()
    }

    /// 执行一个学习周期：取出并清空窗口计数，然后更新权重
    pub async fn learn(&self) -> bool {
        self.cycles.fetch_add(1, Ordering::Relaxed);
        let window = std::mem::take(&mut *self.effectiveness.lock().await);
        let updated = self.update(&window).await;
        if updated {
            info!(signals = window.values().sum::<u64>(), "Agent weights updated");
        }
        updated
    }

    pub async fn status(&self) -> LearnerStatus {
        LearnerStatus {
            cycles: self.cycles.load(Ordering::Relaxed),
            updates: self.updates.load(Ordering::Relaxed),
            last_update: *self.last_update.read().await,
            weights: (*self.weights().await).clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn weights(pairs: &[(&str, f64)]) -> AgentWeights {
        AgentWeights::new(pairs.iter().map(|(k, w)| (k.to_string(), *w)).collect()).unwrap()
    }

    fn counts(pairs: &[(&str, u64)]) -> HashMap<String, u64> {
        pairs.iter().map(|(k, c)| (k.to_string(), *c)).collect()
    }

    #[test]
    fn test_prior_is_normalized() {
        let w = weights(&[("a", 2.0), ("b", 6.0)]);
        assert!((w.get("a").unwrap() - 0.25).abs() < 1e-9);
        assert!((w.total() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_invalid_prior() {
        assert!(AgentWeights::new(BTreeMap::new()).is_err());
        let negative = [("a".to_string(), -1.0)].into_iter().collect();
        assert!(AgentWeights::new(negative).is_err());
    }

    #[test]
    fn test_blend_formula() {
        let w = weights(&[("a", 0.5), ("b", 0.5)]);
        let next = w.blend(&counts(&[("a", 8), ("b", 2)]), DEFAULT_RETENTION).unwrap();
        // 0.7 * 0.5 + 0.3 * 0.8 = 0.59
        assert!((next.get("a").unwrap() - 0.59).abs() < 1e-9);
        assert!((next.get("b").unwrap() - 0.41).abs() < 1e-9);
        assert!((next.total() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_blend_ignores_unknown_agents() {
        let w = weights(&[("a", 0.5), ("b", 0.5)]);
        assert!(w.blend(&counts(&[("ghost", 10)]), DEFAULT_RETENTION).is_none());
    }

    #[test]
    fn test_sampling_is_reproducible() {
        let w = weights(&[("a", 0.2), ("b", 0.3), ("c", 0.5)]);
        let draw = |seed| {
            let mut rng = StdRng::seed_from_u64(seed);
            (0..20).map(|_| w.sample(&mut rng).unwrap()).collect::<Vec<_>>()
        };
        assert_eq!(draw(7), draw(7));
    }

    #[test]
    fn test_sampling_respects_zero_weight() {
        let w = weights(&[("never", 0.0), ("always", 1.0)]);
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..100 {
            assert_eq!(w.sample(&mut rng).as_deref(), Some("always"));
        }
    }

    #[tokio::test]
    async fn test_update_without_signal_is_noop() {
        let learner = WeightLearner::new(weights(&[("a", 0.5), ("b", 0.5)]), DEFAULT_RETENTION, Some(1));
        let before = learner.weights().await;

        assert!(!learner.update(&HashMap::new()).await);
        assert!(!learner.update(&counts(&[("a", 0), ("b", 0)])).await);
        assert_eq!(*learner.weights().await, *before);
        assert_eq!(learner.status().await.updates, 0);
    }

    #[tokio::test]
    async fn test_update_shifts_towards_effective_agent() {
        let learner = WeightLearner::new(weights(&[("a", 0.5), ("b", 0.5)]), DEFAULT_RETENTION, Some(1));
        assert!(learner.update(&counts(&[("a", 8), ("b", 2)])).await);

        let after = learner.weights().await;
        assert!(after.get("a").unwrap() > after.get("b").unwrap());
        assert!((after.total() - 1.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_learn_drains_window() {
        let learner = WeightLearner::new(weights(&[("a", 0.5), ("b", 0.5)]), DEFAULT_RETENTION, Some(3));
        learner.record_effective("a").await;
        learner.record_effective("a").await;

        assert!(learner.learn().await);
        assert!(learner.effectiveness().await.is_empty());
        assert!(!learner.learn().await);

        let status = learner.status().await;
        assert_eq!(status.cycles, 2);
        assert_eq!(status.updates, 1);
        assert!(status.last_update.is_some());
    }
}
