//! # tl_cognitive - ThoughtLoom Cognitive Scheduler
//!
//! 认知调度核心：带优先级与过期的思维队列、情绪规则、反馈评估、
//! 自适应权重学习器，以及把它们串起来的认知循环与后台调度器。

pub mod config;
pub mod cycle;
pub mod emotion;
pub mod feedback;
pub mod learner;
pub mod processor;
pub mod queue;
pub mod scheduler;
pub mod thought;

pub use config::CognitiveConfig;
pub use cycle::{CognitiveCycle, CycleSummary, SubmitRequest};
pub use emotion::EmotionRules;
pub use feedback::{FeedbackCheck, FeedbackRule, FeedbackRules};
pub use learner::{AgentWeights, LearnerStatus, WeightLearner};
pub use processor::{DefaultProcessor, FnProcessor, Processor, ProcessorRegistry, Route, SimulatedProcessor};
pub use queue::{QueueSnapshot, QueueStats, ThoughtQueue};
pub use scheduler::{Scheduler, SchedulerStatus};
pub use thought::{Metadata, Thought, ThoughtId, ThoughtKind, ThoughtResult, ThoughtState};
