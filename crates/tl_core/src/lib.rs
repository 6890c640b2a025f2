//! # tl_core - ThoughtLoom Core Primitives
//!
//! 核心原语层，定义统一错误类型、实体 ID 与认知生命周期事件。
//! 此 crate 是整个项目的基础依赖，不依赖其他业务 crate。

pub mod error;
pub mod event;
pub mod entity;

pub use error::{ThoughtLoomError, Result};
pub use event::{Event, EventKind};
pub use entity::{Entity, EntityId};
