//! 反馈评估器
//!
//! 无状态的按类型决策表，为处理结果打分 [0, 1]。

use serde::{Deserialize, Serialize};

use crate::thought::{ThoughtKind, ThoughtResult};

/// 结果检查方式
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "check", rename_all = "snake_case")]
pub enum FeedbackCheck {
    /// 文本长度 (字符数) 大于阈值
    MinLength { chars: usize },
    /// 文本包含子串
    Contains {
        needle: String,
        #[serde(default)]
        ignore_case: bool,
    },
}

impl FeedbackCheck {
    fn passes(&self, text: &str) -> bool {
        match self {
            FeedbackCheck::MinLength { chars } => text.chars().count() > *chars,
            FeedbackCheck::Contains { needle, ignore_case: true } => {
                text.to_lowercase().contains(&needle.to_lowercase())
            }
            FeedbackCheck::Contains { needle, ignore_case: false } => text.contains(needle.as_str()),
        }
    }
}

/// 单条评估规则
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackRule {
    pub kind: ThoughtKind,
    #[serde(flatten)]
    pub check: FeedbackCheck,
    /// 检查通过时的分数
    pub pass: f64,
    /// 检查未通过时的分数
    pub fail: f64,
}

/// 评估规则表
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedbackRules {
    pub rules: Vec<FeedbackRule>,
    /// 未识别类型或缺少字段时的分数
    pub default_score: f64,
    /// 处理器输出中承载结果文本的字段
    pub result_field: String,
}

impl Default for FeedbackRules {
    fn default() -> Self {
        Self {
            rules: vec![
                FeedbackRule {
                    kind: ThoughtKind::Reflection,
                    check: FeedbackCheck::MinLength { chars: 50 },
                    pass: 0.8,
                    fail: 0.5,
                },
                FeedbackRule {
                    kind: ThoughtKind::Alert,
                    check: FeedbackCheck::Contains {
                        needle: "important".to_string(),
                        ignore_case: true,
                    },
                    pass: 0.9,
                    fail: 0.6,
                },
                FeedbackRule {
                    kind: ThoughtKind::Doubt,
                    check: FeedbackCheck::Contains {
                        needle: "?".to_string(),
                        ignore_case: false,
                    },
                    pass: 0.7,
                    fail: 0.4,
                },
            ],
            default_score: 0.5,
            result_field: "result".to_string(),
        }
    }
}

impl FeedbackRules {
    /// 评估处理结果
    pub fn evaluate(&self, kind: &ThoughtKind, result: &ThoughtResult) -> f64 {
        let text = result
            .output()
            .and_then(|output| output.get(&self.result_field))
            .and_then(|value| value.as_str());

        let score = match (self.rules.iter().find(|rule| &rule.kind == kind), text) {
            (Some(rule), Some(text)) if rule.check.passes(text) => rule.pass,
            (Some(rule), Some(_)) => rule.fail,
            _ => self.default_score,
        };
        score.clamp(0.0, 1.0)
    }
}
