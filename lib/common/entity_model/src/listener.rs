use std::fmt::Debug;

use crate::entity::ManagedEntity;
use crate::value::Value;

/// 属性变更通知
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyChangeEvent {
    pub property: &'static str,
    pub old_value: Value,
    pub new_value: Value,
}

impl PropertyChangeEvent {
    pub fn new(property: &'static str, old_value: Value, new_value: Value) -> Self {
        Self { property, old_value, new_value }
    }
}

/// 属性变更监听器
pub trait PropertyChangeListener: Send + Sync {
    fn property_changed(&self, event: &PropertyChangeEvent);
}

// ============================================================================
// 变更来源（持久化提供者的变更集抽象）
// ============================================================================

/// 变更集中记录的一项旧值
pub enum RecordedChange {
    /// 普通属性的旧值
    Value(Value),
    /// 嵌入式对象自身的变更集
    Aggregate(Box<dyn ChangeSource>),
}

/// 变更来源能力：任何持久化后端都可以实现，diff 提取算法不依赖具体提供者
pub trait ChangeSource: Debug + Send + Sync {
    fn has_changes(&self) -> bool;

    /// 发生变更的属性名，按记录顺序
    fn changed_attribute_names(&self) -> Vec<String>;

    fn old_value_of(&self, name: &str) -> Option<RecordedChange>;
}

/// 持久化提供者为每个受管实例安装的属性变更监听器
///
/// 接收增强 setter 的通知，累积自上次 flush 以来的变更
pub trait AttributeChangeListener: PropertyChangeListener + ChangeSource {
    /// flush 之后清空已累积的变更
    fn clear(&self);
}

// ============================================================================
// 监听器分发钩子
// ============================================================================

/// 增强后的 setter 调用的全局分发钩子
///
/// 新旧值相等时不通知。先通知提供者的属性变更监听器（转入其脏检查），
/// 再按注册顺序通知应用层监听器。实例上没有任何监听器时静默返回
pub fn fire_listeners<E: ManagedEntity + ?Sized>(
    entity: &E,
    property: &'static str,
    old_value: Value,
    new_value: Value,
) {
    if old_value == new_value {
        return;
    }

    let entry = entity.entry();
    if entry.change_listener().is_none() && entry.listeners().is_empty() {
        tracing::trace!("No listeners on {} for property {}", entity.meta().name, property);
        return;
    }

    let event = PropertyChangeEvent::new(property, old_value, new_value);
    if let Some(listener) = entry.change_listener() {
        listener.property_changed(&event);
    }
    for listener in entry.listeners() {
        listener.property_changed(&event);
    }
}
