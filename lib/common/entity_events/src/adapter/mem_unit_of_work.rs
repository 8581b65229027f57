use std::sync::Arc;

use entity_model::{same_entity, AttributeChangeListener, LifecycleState, ManagedEntity, SharedEntity};

use crate::adapter::mem_change_listener::MemAttributeChangeListener;
use crate::core::change_event::EntityChangedEvent;
use crate::core::manager::{to_events, ChangeEventManager};
use crate::core::transaction::{TransactionContext, TransactionOutcome};
use crate::error::Result;

/// MemUnitOfWork - 基于内存的持久化上下文
///
/// 跟踪一组共享实体，在 flush 和提交时驱动 `ChangeEventManager`：
/// - flush：`before_flush` 收集本轮变更，然后新建实体转为 Managed，已删除实体不再跟踪，监听器清空
/// - commit：`collect` 合并累积结果，提交事务，返回待发布的事件
///
/// 只有 setter 已增强的实体会安装属性变更监听器，其余实体的修改不会被检测到
///
/// # 示例
/// ```ignore
/// let mut uow = MemUnitOfWork::begin(manager.clone());
/// uow.attach(customer.clone());
/// customer.write().set_age(Some(31));
/// let events = uow.commit()?;
/// manager.publish(&events)?;
/// ```
pub struct MemUnitOfWork {
    manager: Arc<ChangeEventManager>,
    tx: TransactionContext,
    entities: Vec<SharedEntity>,
}

impl MemUnitOfWork {
    /// 在新事务中开始工作单元
    pub fn begin(manager: Arc<ChangeEventManager>) -> Self {
        Self::with_context(manager, TransactionContext::begin())
    }

    pub fn with_context(manager: Arc<ChangeEventManager>, tx: TransactionContext) -> Self {
        Self { manager, tx, entities: Vec::new() }
    }

    pub fn context(&self) -> &TransactionContext {
        &self.tx
    }

    pub fn entities(&self) -> &[SharedEntity] {
        &self.entities
    }

    /// 跟踪一个新建实体
    pub fn persist(&mut self, entity: SharedEntity) {
        entity.write().entry_mut().set_state(LifecycleState::New);
        self.track(entity);
    }

    /// 跟踪一个已持久化的实体
    pub fn attach(&mut self, entity: SharedEntity) {
        entity.write().entry_mut().set_state(LifecycleState::Managed);
        self.track(entity);
    }

    /// 标记删除；尚未写入的新建实体直接放弃跟踪
    pub fn remove(&mut self, entity: &SharedEntity) {
        let Some(index) = self.entities.iter().position(|e| same_entity(e, entity)) else {
            tracing::debug!("Remove called on an untracked {}", entity.read().meta().name);
            return;
        };

        let mut guard = entity.write();
        if guard.is_new() {
            guard.entry_mut().take_change_listener();
            drop(guard);
            self.entities.remove(index);
        } else {
            guard.entry_mut().set_state(LifecycleState::Deleted);
        }
    }

    /// 收集本轮变更并写入累积器
    pub fn flush(&mut self) -> Result<()> {
        self.manager.before_flush(&mut self.tx, &self.entities)?;
        self.after_flush();
        Ok(())
    }

    /// 合并累积结果并提交事务，返回按首次出现顺序排列的事件
    pub fn commit(mut self) -> Result<Vec<EntityChangedEvent>> {
        let infos = self.manager.collect(&mut self.tx, &self.entities)?;
        self.after_flush();

        let Self { tx, .. } = self;
        let outcome = tx.commit();
        tracing::debug!("Transaction {} committed with {} change events", outcome.id, infos.len());
        Ok(to_events(&infos))
    }

    /// 提交并通过管理器发布事件，返回投递的事件数
    pub fn commit_and_publish(self) -> Result<usize> {
        let manager = self.manager.clone();
        let events = self.commit()?;
        Ok(manager.publish(&events)?)
    }

    /// 回滚事务，累积的变更全部丢弃
    pub fn rollback(self) -> TransactionOutcome {
        for entity in &self.entities {
            if let Some(listener) = entity.read().entry().change_listener() {
                listener.clear();
            }
        }
        let Self { tx, .. } = self;
        tx.rollback()
    }

    fn track(&mut self, entity: SharedEntity) {
        {
            let mut guard = entity.write();
            if guard.setters_enhanced() {
                if guard.entry().change_listener().is_none() {
                    guard.entry_mut().install_change_listener(Arc::new(MemAttributeChangeListener::new()));
                }
            } else {
                tracing::debug!("{} setters are not enhanced, changes will not be detected", guard.meta().name);
            }
        }

        if !self.entities.iter().any(|e| same_entity(e, &entity)) {
            self.entities.push(entity);
        }
    }

    fn after_flush(&mut self) {
        self.entities.retain(|shared| {
            let mut entity = shared.write();
            match entity.lifecycle_state() {
                LifecycleState::New => entity.entry_mut().set_state(LifecycleState::Managed),
                LifecycleState::Deleted => {
                    entity.entry_mut().take_change_listener();
                    return false;
                }
                LifecycleState::Managed => {}
            }
            if let Some(listener) = entity.entry().change_listener() {
                listener.clear();
            }
            true
        });
    }
}
