use std::sync::Arc;

use entity_model::{
    same_entity, ChangeSource, CollectionKind, IdentityToken, ManagedEntity, RecordedChange, SharedEntity, Value,
};

use crate::config::{ChangeTrackingConfig, PublishPolicy};
use crate::core::attribute_changes::{AttributeChange, AttributeChanges, IdCollection, OldValue};
use crate::core::change_event::{ChangeEventInfo, ChangeType, EntityChangedEvent};
use crate::core::persistence_support::{DefaultPersistenceSupport, PersistenceSupport};
use crate::core::publisher::EventPublisher;
use crate::core::transaction::{Resources, TransactionContext, TransactionStatus, TransactionSynchronization};
use crate::error::{ChangeTrackingError, PublishError, Result};

// ============================================================================
// 事务范围的累积器
// ============================================================================

/// 绑定在事务资源表上的变更累积器
#[derive(Debug, Default)]
pub struct AccumulatedInfoHolder {
    accumulated: Vec<ChangeEventInfo>,
    synchronized_with_transaction: bool,
}

impl AccumulatedInfoHolder {
    pub fn accumulated(&self) -> &[ChangeEventInfo] {
        &self.accumulated
    }

    #[inline]
    pub fn is_synchronized_with_transaction(&self) -> bool {
        self.synchronized_with_transaction
    }
}

/// 事务结束时（无论提交还是回滚）解绑累积器
struct AccumulatedInfoSynchronization;

impl TransactionSynchronization for AccumulatedInfoSynchronization {
    fn after_completion(&mut self, status: TransactionStatus, resources: &mut Resources) {
        if let Some(holder) = resources.unbind::<AccumulatedInfoHolder>() {
            tracing::trace!("Unbind {} accumulated change infos on {:?}", holder.accumulated.len(), status);
        }
    }
}

// ============================================================================
// 变更事件管理器
// ============================================================================

/// ChangeEventManager - 在持久化 flush 周期中收集、合并并发布实体变更
///
/// 每次 flush 前调用 `before_flush`，把本次观察到的变更合并进事务范围的累积器；
/// 提交前调用 `collect` 取得累积结果与最后一轮观察的合并；事务提交后把结果转换为
/// `EntityChangedEvent` 交给 `publish`。
///
/// # 变更判定
/// - 实体处于 New 状态 → CREATED，diff 为"存在快照"：每个值非 null 的可写属性记一条旧值为 null 的变更
/// - 实体没有属性变更监听器（setter 未增强）→ 跳过，只记录日志
/// - `PersistenceSupport::is_deleted` 为真 → DELETED，diff 为全量快照，引用与集合记为身份令牌
/// - 监听器记录到变更 → UPDATED，diff 来自监听器的变更集
///
/// # 示例
/// ```ignore
/// let registry = Arc::new(ListenerRegistry::new());
/// let manager = ChangeEventManager::new(registry.clone());
///
/// let mut tx = TransactionContext::begin();
/// manager.before_flush(&mut tx, &dirty)?;
/// let infos = manager.collect(&mut tx, &dirty)?;
/// tx.commit();
///
/// let events: Vec<_> = infos.iter().map(ChangeEventInfo::to_event).collect();
/// manager.publish(&events)?;
/// ```
pub struct ChangeEventManager {
    config: ChangeTrackingConfig,
    publisher: Arc<dyn EventPublisher>,
    persistence_support: Box<dyn PersistenceSupport>,
}

impl ChangeEventManager {
    pub fn new(publisher: Arc<dyn EventPublisher>) -> Self {
        Self::with_config(ChangeTrackingConfig::default(), publisher)
    }

    pub fn with_config(config: ChangeTrackingConfig, publisher: Arc<dyn EventPublisher>) -> Self {
        Self { config, publisher, persistence_support: Box::new(DefaultPersistenceSupport) }
    }

    pub fn with_persistence_support(mut self, persistence_support: Box<dyn PersistenceSupport>) -> Self {
        self.persistence_support = persistence_support;
        self
    }

    pub fn config(&self) -> &ChangeTrackingConfig {
        &self.config
    }

    /// flush 之前调用：收集本轮变更并合并进事务累积器
    ///
    /// # 错误
    /// - `TransactionRequired`: 配置要求事务，而上下文没有激活的事务同步
    pub fn before_flush(&self, tx: &mut TransactionContext, entities: &[SharedEntity]) -> Result<()> {
        tracing::trace!("beforeFlush {} entities in {}", entities.len(), tx.id());
        if !self.config.enabled {
            return Ok(());
        }

        let collected = self.internal_collect(entities);
        let holder = self.accumulated_info_holder(tx)?;
        let accumulated = std::mem::take(&mut holder.accumulated);
        holder.accumulated = merge(accumulated, collected);
        Ok(())
    }

    /// 返回累积结果与本轮观察的合并，不写回累积器
    pub fn collect(&self, tx: &mut TransactionContext, entities: &[SharedEntity]) -> Result<Vec<ChangeEventInfo>> {
        tracing::trace!("collect {} entities in {}", entities.len(), tx.id());
        if !self.config.enabled {
            return Ok(Vec::new());
        }

        let accumulated = self.accumulated_info_holder(tx)?.accumulated.clone();
        let collected = self.internal_collect(entities);
        Ok(merge(accumulated, collected))
    }

    /// 对每个实体判定变更类型并提取 diff，不访问累积器
    pub fn internal_collect(&self, entities: &[SharedEntity]) -> Vec<ChangeEventInfo> {
        let mut list = Vec::new();

        for shared in entities {
            let entity = shared.read();

            let (change_type, changes) = if entity.is_new() {
                (ChangeType::Created, presence_snapshot(&*entity))
            } else {
                let Some(listener) = entity.entry().change_listener() else {
                    tracing::debug!(
                        "Cannot collect change event for {} because its attribute change listener is missing",
                        describe(&*entity)
                    );
                    continue;
                };
                if self.persistence_support.is_deleted(&*entity, &**listener) {
                    (ChangeType::Deleted, deleted_snapshot(&*entity))
                } else if listener.has_changes() {
                    (ChangeType::Updated, changes_from_source(&**listener))
                } else {
                    continue;
                }
            };

            let entity_name = entity.meta().original_name();
            list.push(ChangeEventInfo::new(shared.clone(), change_type, changes, entity_name));
        }

        tracing::trace!("collected {:?}", list);
        list
    }

    /// 按顺序逐个发布事件，返回成功投递的数量
    ///
    /// 订阅者失败时的行为由 `publish_policy` 决定：
    /// - `AbortOnFirstError`: 立即返回 `PublishError::Aborted`，之后的事件不投递
    /// - `ContinueOnError`: 投递全部事件后返回 `PublishError::Multiple`
    pub fn publish(&self, events: &[EntityChangedEvent]) -> std::result::Result<usize, PublishError> {
        tracing::trace!("publish {} events", events.len());
        let total = events.len();

        match self.config.publish_policy {
            PublishPolicy::AbortOnFirstError => {
                for (delivered, event) in events.iter().enumerate() {
                    if let Err(err) = self.publisher.publish_event(event) {
                        tracing::warn!("Publishing {} failed, {} events not delivered: {}", event, total - delivered, err);
                        return Err(PublishError::Aborted { delivered, total, source: Box::new(err) });
                    }
                }
                Ok(total)
            }
            PublishPolicy::ContinueOnError => {
                let mut failures = Vec::new();
                for event in events {
                    if let Err(err) = self.publisher.publish_event(event) {
                        tracing::warn!("Publishing {} failed: {}", event, err);
                        failures.push(err);
                    }
                }
                if failures.is_empty() {
                    Ok(total)
                } else {
                    Err(PublishError::Multiple { total, failures })
                }
            }
        }
    }

    /// 事务中已累积的变更
    pub fn accumulated<'t>(&self, tx: &'t TransactionContext) -> &'t [ChangeEventInfo] {
        tx.resources().get::<AccumulatedInfoHolder>().map(AccumulatedInfoHolder::accumulated).unwrap_or(&[])
    }

    /// 取出事务的累积器，首次访问时绑定；事务同步激活时注册一次解绑回调
    fn accumulated_info_holder<'t>(&self, tx: &'t mut TransactionContext) -> Result<&'t mut AccumulatedInfoHolder> {
        if self.config.require_transaction && !tx.is_synchronization_active() {
            return Err(ChangeTrackingError::TransactionRequired { context: tx.id() });
        }

        let synchronized = tx
            .resources()
            .get::<AccumulatedInfoHolder>()
            .map(AccumulatedInfoHolder::is_synchronized_with_transaction)
            .unwrap_or(false);
        let register = tx.is_synchronization_active() && !synchronized;
        if register {
            tx.register_synchronization(Box::new(AccumulatedInfoSynchronization))?;
        }

        let holder = tx.resources_mut().get_or_bind(AccumulatedInfoHolder::default);
        if register {
            holder.synchronized_with_transaction = true;
        }
        Ok(holder)
    }
}

/// 把累积结果转换为待发布的事件
pub fn to_events(infos: &[ChangeEventInfo]) -> Vec<EntityChangedEvent> {
    infos.iter().map(ChangeEventInfo::to_event).collect()
}

// ============================================================================
// 合并
// ============================================================================

/// 以对象身份匹配同一实体：已有则合并，否则追加，保持首次出现的顺序
fn merge(mut existing: Vec<ChangeEventInfo>, incoming: Vec<ChangeEventInfo>) -> Vec<ChangeEventInfo> {
    for info in incoming {
        match existing.iter_mut().find(|e| same_entity(e.entity(), info.entity())) {
            Some(target) => target.merge_with(info),
            None => existing.push(info),
        }
    }
    tracing::trace!("merged {:?}", existing);
    existing
}

// ============================================================================
// diff 提取
// ============================================================================

/// 新建实体：每个值非 null 的可写属性记一条旧值为 null 的变更
fn presence_snapshot<E: ManagedEntity + ?Sized>(entity: &E) -> AttributeChanges {
    entity
        .meta()
        .writable_properties()
        .filter(|p| entity.get_value(p.name).map(|v| !v.is_null()).unwrap_or(false))
        .map(|p| AttributeChange::new(p.name, OldValue::Null))
        .collect()
}

/// 删除实体：全部可写属性的最终值；嵌入式属性展开为嵌套快照
fn deleted_snapshot<E: ManagedEntity + ?Sized>(entity: &E) -> AttributeChanges {
    let mut changes = AttributeChanges::new();
    for property in entity.meta().writable_properties() {
        let value = entity.get_value(property.name).unwrap_or(Value::Null);
        add_value(&mut changes, property.name, value);
    }
    changes
}

/// 更新实体：从变更集提取，嵌入式对象的变更集递归提取
fn changes_from_source<S: ChangeSource + ?Sized>(source: &S) -> AttributeChanges {
    let mut changes = AttributeChanges::new();
    for name in source.changed_attribute_names() {
        match source.old_value_of(&name) {
            Some(RecordedChange::Aggregate(nested)) => {
                changes.add_embedded(name, changes_from_source(nested.as_ref()));
            }
            Some(RecordedChange::Value(value)) => add_value(&mut changes, &name, value),
            None => changes.add(AttributeChange::new(name, OldValue::Null)),
        }
    }
    changes
}

fn add_value(changes: &mut AttributeChanges, name: &str, value: Value) {
    match value {
        Value::Embedded(embedded) => changes.add_embedded(name, deleted_snapshot(&*embedded)),
        other => changes.add(AttributeChange::new(name, detach(name, other))),
    }
}

/// 把活动值转换为不持有对象的旧值
fn detach(name: &str, value: Value) -> OldValue {
    match value {
        Value::Null => OldValue::Null,
        Value::Scalar(scalar) => OldValue::Scalar(scalar),
        Value::Reference(reference) => match IdentityToken::of(&*reference) {
            Ok(id) => OldValue::Reference(id),
            Err(err) => {
                tracing::warn!("Reference in attribute {} recorded as null: {}", name, err);
                OldValue::Null
            }
        },
        Value::Collection(collection) => {
            let mut ids = Vec::with_capacity(collection.len());
            for item in collection.items() {
                match IdentityToken::of(&**item) {
                    // 无序集合按身份去重
                    Ok(id) if collection.kind() == CollectionKind::Set && ids.contains(&id) => {}
                    Ok(id) => ids.push(id),
                    Err(err) => tracing::warn!("Collection item in attribute {} skipped: {}", name, err),
                }
            }
            OldValue::Collection(IdCollection::new(collection.kind(), ids))
        }
        Value::Embedded(embedded) => {
            tracing::warn!("Embedded value {} in attribute {} cannot be detached as a scalar", embedded.meta().name, name);
            OldValue::Null
        }
    }
}

fn describe<E: ManagedEntity + ?Sized>(entity: &E) -> String {
    match entity.identity() {
        Ok(id) => id.to_string(),
        Err(_) => format!("{}-<new>", entity.meta().name),
    }
}
