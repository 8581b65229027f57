use entity_model::{AttributeChangeListener, ChangeSource, LifecycleState, ManagedEntity, RecordedChange, Value};

/// 持久化提供者相关的判断
pub trait PersistenceSupport: Send + Sync {
    /// 实体在本次 flush 中是否被删除
    fn is_deleted(&self, entity: &dyn ManagedEntity, listener: &dyn AttributeChangeListener) -> bool;
}

/// 默认实现：生命周期为 Deleted，或软删除标记从 null 变为非 null
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultPersistenceSupport;

impl PersistenceSupport for DefaultPersistenceSupport {
    fn is_deleted(&self, entity: &dyn ManagedEntity, listener: &dyn AttributeChangeListener) -> bool {
        if entity.lifecycle_state() == LifecycleState::Deleted {
            return true;
        }

        let Some(marker) = entity.meta().soft_delete else {
            return false;
        };
        let was_null = matches!(listener.old_value_of(marker), Some(RecordedChange::Value(Value::Null)));
        let is_set = entity.get_value(marker).map(|v| !v.is_null()).unwrap_or(false);
        was_null && is_set
    }
}
