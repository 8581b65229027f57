use std::fmt;

use entity_model::{
    AttributeChangeListener, ChangeSource, EntityRef, ManagedEntity, PropertyChangeEvent, PropertyChangeListener,
    RecordedChange, Value,
};
use parking_lot::Mutex;

/// 变更集中的一项
#[derive(Clone)]
enum Recorded {
    /// 属性的首个旧值
    Direct(Value),
    /// 嵌入式对象内部的变更；`original` 为首次变更前的嵌入式对象
    Aggregate { original: Value, nested: ObjectChangeSet },
}

/// ObjectChangeSet - 一个对象自上次 flush 以来的变更集
///
/// 按首次变更的顺序记录属性；同一属性只保留第一次观察到的旧值。
/// 嵌入式值在新旧都存在时逐属性比较，记为嵌套变更集
#[derive(Clone, Default)]
pub struct ObjectChangeSet {
    entries: Vec<(String, Recorded)>,
}

impl ObjectChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// 记录一次属性变化
    pub fn record(&mut self, name: &str, old_value: Value, new_value: Value) {
        if old_value == new_value {
            return;
        }

        let position = self.entries.iter().position(|(n, _)| n == name);
        match (position, old_value, new_value) {
            // 嵌入式对象被整体替换为另一个嵌入式对象：逐属性比较
            (None, Value::Embedded(old), Value::Embedded(new)) => {
                let nested = diff_embedded(&old, &new);
                if !nested.is_empty() {
                    let original = Value::Embedded(old);
                    self.entries.push((name.to_string(), Recorded::Aggregate { original, nested }));
                }
            }
            (None, old, _) => self.entries.push((name.to_string(), Recorded::Direct(old))),
            (Some(index), old, new) => {
                let slot = &mut self.entries[index].1;
                let Recorded::Aggregate { original, nested } = slot else {
                    return;
                };
                match (old, new) {
                    (Value::Embedded(old), Value::Embedded(new)) => nested.merge_first(diff_embedded(&old, &new)),
                    // 嵌入式对象被置空：退化为整体旧值
                    _ => {
                        let original = std::mem::replace(original, Value::Null);
                        *slot = Recorded::Direct(original);
                    }
                }
            }
        }
    }

    /// 合并另一个变更集，已存在的属性保留自己的旧值
    fn merge_first(&mut self, other: ObjectChangeSet) {
        for (name, recorded) in other.entries {
            match self.entries.iter_mut().find(|(n, _)| *n == name) {
                Some((_, Recorded::Aggregate { nested, .. })) => {
                    if let Recorded::Aggregate { nested: incoming, .. } = recorded {
                        nested.merge_first(incoming);
                    }
                }
                Some(_) => {}
                None => self.entries.push((name, recorded)),
            }
        }
    }
}

/// 比较两个嵌入式对象的全部属性
fn diff_embedded(old: &EntityRef, new: &EntityRef) -> ObjectChangeSet {
    let mut changes = ObjectChangeSet::new();
    for property in old.meta().properties {
        let before = old.get_value(property.name).unwrap_or(Value::Null);
        let after = new.get_value(property.name).unwrap_or(Value::Null);
        changes.record(property.name, before, after);
    }
    changes
}

impl ChangeSource for ObjectChangeSet {
    fn has_changes(&self) -> bool {
        !self.entries.is_empty()
    }

    fn changed_attribute_names(&self) -> Vec<String> {
        self.entries.iter().map(|(name, _)| name.clone()).collect()
    }

    fn old_value_of(&self, name: &str) -> Option<RecordedChange> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, recorded)| match recorded {
            Recorded::Direct(value) => RecordedChange::Value(value.clone()),
            Recorded::Aggregate { nested, .. } => RecordedChange::Aggregate(Box::new(nested.clone())),
        })
    }
}

impl fmt::Debug for ObjectChangeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (name, recorded) in &self.entries {
            match recorded {
                Recorded::Direct(value) => map.entry(name, value),
                Recorded::Aggregate { nested, .. } => map.entry(name, nested),
            };
        }
        map.finish()
    }
}

// ============================================================================
// 内存属性变更监听器
// ============================================================================

/// MemAttributeChangeListener - 内存持久化上下文为每个受管实例安装的监听器
///
/// 接收增强 setter 的通知，累积到 flush 为止
#[derive(Default)]
pub struct MemAttributeChangeListener {
    changes: Mutex<ObjectChangeSet>,
}

impl MemAttributeChangeListener {
    pub fn new() -> Self {
        Self::default()
    }

    /// 当前变更集的副本
    pub fn snapshot(&self) -> ObjectChangeSet {
        self.changes.lock().clone()
    }
}

impl PropertyChangeListener for MemAttributeChangeListener {
    fn property_changed(&self, event: &PropertyChangeEvent) {
        tracing::trace!("property {} changed: {:?} -> {:?}", event.property, event.old_value, event.new_value);
        self.changes.lock().record(event.property, event.old_value.clone(), event.new_value.clone());
    }
}

impl ChangeSource for MemAttributeChangeListener {
    fn has_changes(&self) -> bool {
        self.changes.lock().has_changes()
    }

    fn changed_attribute_names(&self) -> Vec<String> {
        self.changes.lock().changed_attribute_names()
    }

    fn old_value_of(&self, name: &str) -> Option<RecordedChange> {
        self.changes.lock().old_value_of(name)
    }
}

impl AttributeChangeListener for MemAttributeChangeListener {
    fn clear(&self) {
        self.changes.lock().clear();
    }
}

impl fmt::Debug for MemAttributeChangeListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemAttributeChangeListener").field("changes", &*self.changes.lock()).finish()
    }
}
