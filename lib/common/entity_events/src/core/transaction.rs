use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;

use uuid::Uuid;

use crate::error::ChangeTrackingError;

/// 事务结束状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionStatus {
    Committed,
    RolledBack,
}

// ============================================================================
// 事务资源
// ============================================================================

/// 事务范围内的资源表，按类型存放
///
/// 每个资源类型最多绑定一个实例，事务结束时全部释放
#[derive(Default)]
pub struct Resources {
    map: HashMap<TypeId, Box<dyn Any + Send>>,
}

impl Resources {
    pub fn get<T: Any + Send>(&self) -> Option<&T> {
        self.map.get(&TypeId::of::<T>()).and_then(|r| r.downcast_ref::<T>())
    }

    pub fn get_mut<T: Any + Send>(&mut self) -> Option<&mut T> {
        self.map.get_mut(&TypeId::of::<T>()).and_then(|r| r.downcast_mut::<T>())
    }

    /// 取出已绑定的资源，没有时用 `init` 创建并绑定
    pub fn get_or_bind<T: Any + Send>(&mut self, init: impl FnOnce() -> T) -> &mut T {
        let slot = self.map.entry(TypeId::of::<T>()).or_insert_with(|| Box::new(init()));
        match slot.downcast_mut::<T>() {
            Some(resource) => resource,
            // 键由 TypeId::of::<T>() 决定，值的类型必然是 T
            None => unreachable!("resource slot holds a value of another type"),
        }
    }

    /// 绑定资源，返回被替换的旧资源
    pub fn bind<T: Any + Send>(&mut self, resource: T) -> Option<T> {
        self.map
            .insert(TypeId::of::<T>(), Box::new(resource))
            .and_then(|old| old.downcast::<T>().ok())
            .map(|old| *old)
    }

    pub fn unbind<T: Any + Send>(&mut self) -> Option<T> {
        self.map.remove(&TypeId::of::<T>()).and_then(|r| r.downcast::<T>().ok()).map(|r| *r)
    }

    pub fn contains<T: Any + Send>(&self) -> bool {
        self.map.contains_key(&TypeId::of::<T>())
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    fn clear(&mut self) {
        self.map.clear();
    }
}

impl fmt::Debug for Resources {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resources").field("len", &self.map.len()).finish()
    }
}

// ============================================================================
// 事务同步回调
// ============================================================================

/// 事务同步回调：在事务结束时清理或提交事务范围的状态
pub trait TransactionSynchronization: Send {
    /// 仅在提交前调用
    fn before_commit(&mut self, _resources: &mut Resources) {}

    /// 提交或回滚之后调用
    fn after_completion(&mut self, status: TransactionStatus, resources: &mut Resources);
}

/// 事务结束的汇总
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransactionOutcome {
    pub id: Uuid,
    pub status: TransactionStatus,
    /// 同步回调执行完后仍绑定着、随后被强制释放的资源数
    pub unreleased_resources: usize,
}

// ============================================================================
// 事务上下文
// ============================================================================

/// TransactionContext - 显式传递的事务作用域
///
/// 持有资源表和同步回调列表。`begin()` 创建带同步的事务；
/// `non_transactional()` 只提供资源存储，不支持同步回调。
/// 未提交就被丢弃的事务按回滚处理
///
/// # 示例
/// ```ignore
/// let mut tx = TransactionContext::begin();
/// manager.before_flush(&mut tx, &dirty)?;
/// let infos = manager.collect(&mut tx, &dirty)?;
/// tx.commit();
/// ```
pub struct TransactionContext {
    id: Uuid,
    resources: Resources,
    synchronizations: Option<Vec<Box<dyn TransactionSynchronization>>>,
    completed: bool,
}

impl TransactionContext {
    /// 开始一个带同步回调的事务
    pub fn begin() -> Self {
        let id = Uuid::new_v4();
        tracing::trace!("Begin transaction {}", id);
        Self { id, resources: Resources::default(), synchronizations: Some(Vec::new()), completed: false }
    }

    /// 没有事务同步的上下文，资源只在上下文存活期间有效
    pub fn non_transactional() -> Self {
        Self { id: Uuid::new_v4(), resources: Resources::default(), synchronizations: None, completed: false }
    }

    #[inline]
    pub fn id(&self) -> Uuid {
        self.id
    }

    #[inline]
    pub fn is_synchronization_active(&self) -> bool {
        self.synchronizations.is_some() && !self.completed
    }

    pub fn resources(&self) -> &Resources {
        &self.resources
    }

    pub fn resources_mut(&mut self) -> &mut Resources {
        &mut self.resources
    }

    pub fn register_synchronization(
        &mut self,
        synchronization: Box<dyn TransactionSynchronization>,
    ) -> Result<(), ChangeTrackingError> {
        if self.completed {
            return Err(ChangeTrackingError::SynchronizationNotActive { context: self.id });
        }
        match self.synchronizations.as_mut() {
            Some(list) => {
                list.push(synchronization);
                Ok(())
            }
            None => Err(ChangeTrackingError::SynchronizationNotActive { context: self.id }),
        }
    }

    pub fn synchronization_count(&self) -> usize {
        self.synchronizations.as_ref().map(Vec::len).unwrap_or(0)
    }

    pub fn commit(mut self) -> TransactionOutcome {
        self.complete(TransactionStatus::Committed)
    }

    pub fn rollback(mut self) -> TransactionOutcome {
        self.complete(TransactionStatus::RolledBack)
    }

    fn complete(&mut self, status: TransactionStatus) -> TransactionOutcome {
        self.completed = true;
        let mut synchronizations = self.synchronizations.take().unwrap_or_default();

        if status == TransactionStatus::Committed {
            for sync in synchronizations.iter_mut() {
                sync.before_commit(&mut self.resources);
            }
        }
        for sync in synchronizations.iter_mut() {
            sync.after_completion(status, &mut self.resources);
        }

        let unreleased_resources = self.resources.len();
        if unreleased_resources > 0 {
            tracing::debug!("Transaction {} released {} leftover resources", self.id, unreleased_resources);
        }
        self.resources.clear();

        tracing::trace!("Transaction {} completed: {:?}", self.id, status);
        TransactionOutcome { id: self.id, status, unreleased_resources }
    }
}

impl Drop for TransactionContext {
    fn drop(&mut self) {
        if !self.completed {
            tracing::debug!("Transaction {} dropped without completion, rolling back", self.id);
            self.complete(TransactionStatus::RolledBack);
        }
    }
}

impl fmt::Debug for TransactionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionContext")
            .field("id", &self.id)
            .field("resources", &self.resources)
            .field("synchronizations", &self.synchronization_count())
            .field("completed", &self.completed)
            .finish()
    }
}
