pub mod entity;
pub mod error;
pub mod id;
pub mod listener;
pub mod value;

// 重新导出核心类型，方便使用
pub use entity::{
    downcast_mut,
    downcast_ref,
    same_entity,
    share,
    EntityEntry,
    EntityMeta,
    LifecycleState,
    // 核心 trait
    ManagedEntity,
    PropertyKind,
    PropertyMeta,
    SettersEnhanced,
    SharedEntity,
};
pub use error::ModelError;
pub use id::{IdentityToken, KeyValue, ToKey};
pub use listener::{
    // 增强 setter 调用的分发钩子
    fire_listeners,
    AttributeChangeListener,
    ChangeSource,
    PropertyChangeEvent,
    PropertyChangeListener,
    RecordedChange,
};
pub use value::{
    CollectionKind, EntityCollection, EntityRef, EntitySet, FromValue, Scalar, ToValue, Value,
};

// Entity derive 宏从 entity_derive crate 导入
// 使用方法: #[derive(entity_derive::Entity)]
