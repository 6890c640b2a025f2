//! 核心实体定义

use uuid::Uuid;

/// 实体 ID 类型别名
pub type EntityId = Uuid;

/// 基础实体特征
pub trait Entity: Send + Sync + 'static {
    /// 获取实体 ID
    fn id(&self) -> EntityId;

    /// 获取实体类型
    fn entity_type(&self) -> &'static str;
}

/// 生成新的实体 ID
pub fn new_entity_id() -> EntityId {
    Uuid::new_v4()
}
