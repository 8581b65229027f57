pub mod adapter;
pub mod config;
pub mod core;
pub mod error;

// 导出 diff 与事件类型
pub use core::attribute_changes::{AttributeChange, AttributeChanges, IdCollection, OldValue};
pub use core::change_event::{ChangeEventInfo, ChangeType, EntityChangedEvent, EventPayload};

// 导出管理器、事务与发布接口
pub use core::manager::{to_events, AccumulatedInfoHolder, ChangeEventManager};
pub use core::persistence_support::{DefaultPersistenceSupport, PersistenceSupport};
pub use core::publisher::{EntityChangedListener, EventPublisher, ListenerRegistry};
pub use core::transaction::{
    Resources, TransactionContext, TransactionOutcome, TransactionStatus, TransactionSynchronization,
};

pub use config::{ChangeTrackingConfig, PublishPolicy};
pub use error::{ChangeTrackingError, ConfigError, PublishError, Result};

// 导出内存适配器实现
pub use adapter::mem_change_listener::{MemAttributeChangeListener, ObjectChangeSet};
pub use adapter::mem_unit_of_work::MemUnitOfWork;
