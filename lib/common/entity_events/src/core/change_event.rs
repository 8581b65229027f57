use std::fmt;

use entity_model::{IdentityToken, ManagedEntity, SharedEntity};
use serde::{Deserialize, Serialize};

use crate::core::attribute_changes::AttributeChanges;

/// 变更类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeType {
    Created,
    Updated,
    Deleted,
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeType::Created => write!(f, "CREATED"),
            ChangeType::Updated => write!(f, "UPDATED"),
            ChangeType::Deleted => write!(f, "DELETED"),
        }
    }
}

// ============================================================================
// 事务内累积的变更信息
// ============================================================================

/// ChangeEventInfo - 一个实体在事务内累积的变更
///
/// 合并时以对象身份（而不是主键）识别同一实体，新建实体可能还没有主键
#[derive(Clone)]
pub struct ChangeEventInfo {
    entity: SharedEntity,
    change_type: ChangeType,
    changes: AttributeChanges,
    /// 扩展层次中的原始实体名
    entity_name: &'static str,
}

impl ChangeEventInfo {
    pub fn new(
        entity: SharedEntity,
        change_type: ChangeType,
        changes: AttributeChanges,
        entity_name: &'static str,
    ) -> Self {
        Self { entity, change_type, changes, entity_name }
    }

    pub fn entity(&self) -> &SharedEntity {
        &self.entity
    }

    #[inline]
    pub fn change_type(&self) -> ChangeType {
        self.change_type
    }

    pub fn changes(&self) -> &AttributeChanges {
        &self.changes
    }

    #[inline]
    pub fn entity_name(&self) -> &'static str {
        self.entity_name
    }

    /// 合并同一实体后续观察到的变更
    ///
    /// 属性按名称并集合并（同名以后观察到的为准）；后续观察为 DELETED 时类型升级为 DELETED，
    /// 否则保留首次观察到的类型（先 CREATED 后 UPDATED 仍是 CREATED）。
    /// 仍为 CREATED 时只并入属性名，旧值一律为 null
    pub fn merge_with(&mut self, other: ChangeEventInfo) {
        if other.change_type == ChangeType::Deleted {
            self.change_type = ChangeType::Deleted;
        }
        if self.change_type == ChangeType::Created {
            self.changes.merge_names(&other.changes);
        } else {
            self.changes.merge_with(other.changes);
        }
    }

    /// 生成对外发布的事件；此时实体通常已分配主键
    pub fn to_event(&self) -> EntityChangedEvent {
        let entity_id = self.entity.read().identity().ok();
        EntityChangedEvent {
            source: self.entity.clone(),
            entity_id,
            change_type: self.change_type,
            changes: self.changes.clone(),
            entity_name: self.entity_name,
        }
    }
}

impl fmt::Debug for ChangeEventInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeEventInfo")
            .field("entity", &self.entity_name)
            .field("change_type", &self.change_type)
            .field("changes", &self.changes)
            .finish()
    }
}

// ============================================================================
// 对外发布的事件
// ============================================================================

/// EntityChangedEvent - 事务提交后发布的实体变更通知
#[derive(Clone)]
pub struct EntityChangedEvent {
    source: SharedEntity,
    entity_id: Option<IdentityToken>,
    change_type: ChangeType,
    changes: AttributeChanges,
    entity_name: &'static str,
}

/// 可序列化的事件内容（不含实体对象），用于投递到外部队列
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventPayload {
    pub entity_name: String,
    pub entity_id: Option<IdentityToken>,
    pub change_type: ChangeType,
    pub changes: AttributeChanges,
}

impl EntityChangedEvent {
    pub fn source(&self) -> &SharedEntity {
        &self.source
    }

    pub fn entity_id(&self) -> Option<&IdentityToken> {
        self.entity_id.as_ref()
    }

    #[inline]
    pub fn change_type(&self) -> ChangeType {
        self.change_type
    }

    pub fn changes(&self) -> &AttributeChanges {
        &self.changes
    }

    #[inline]
    pub fn entity_name(&self) -> &'static str {
        self.entity_name
    }

    pub fn payload(&self) -> EventPayload {
        EventPayload {
            entity_name: self.entity_name.to_string(),
            entity_id: self.entity_id.clone(),
            change_type: self.change_type,
            changes: self.changes.clone(),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.payload())
    }
}

impl fmt::Debug for EntityChangedEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityChangedEvent")
            .field("entity_name", &self.entity_name)
            .field("entity_id", &self.entity_id)
            .field("change_type", &self.change_type)
            .field("changes", &self.changes)
            .finish()
    }
}

impl fmt::Display for EntityChangedEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.entity_id {
            Some(id) => write!(f, "{} {} {}", self.change_type, id, self.changes),
            None => write!(f, "{} {}-<new> {}", self.change_type, self.entity_name, self.changes),
        }
    }
}
