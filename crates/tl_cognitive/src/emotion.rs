//! 情绪优先级规则
//!
//! 提交时根据情绪标签一次性调整优先级。标签表属于可调配置。

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// 情绪规则表
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmotionRules {
    /// 紧急情绪 (提升优先级)
    pub urgent: BTreeSet<String>,
    /// 平静情绪 (降低优先级)
    pub calm: BTreeSet<String>,
    /// 紧急情绪的优先级增量
    pub urgent_boost: u32,
    /// 平静情绪的优先级减量
    pub calm_penalty: u32,
}

impl Default for EmotionRules {
    fn default() -> Self {
        let urgent = ["medo", "raiva", "alerta", "ansiedade", "fear", "anger", "alert", "anxiety"];
        let calm = [
            "tranquilidade",
            "satisfacao",
            "gratidao",
            "calm",
            "satisfaction",
            "gratitude",
        ];
        Self {
            urgent: urgent.iter().map(|s| s.to_string()).collect(),
            calm: calm.iter().map(|s| s.to_string()).collect(),
            urgent_boost: 2,
            calm_penalty: 1,
        }
    }
}

impl EmotionRules {
    /// 根据情绪调整优先级，未识别或缺失的情绪保持不变
    pub fn apply(&self, priority: u32, emotion: Option<&str>) -> u32 {
        let Some(label) = emotion.map(|e| e.trim().to_lowercase()) else {
            return priority;
        };

        if self.urgent.contains(&label) {
            priority.saturating_add(self.urgent_boost)
        } else if self.calm.contains(&label) {
            priority.saturating_sub(self.calm_penalty)
        } else {
            priority
        }
    }
}
