use std::any::Any;
use std::fmt::{self, Debug};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::ModelError;
use crate::id::{IdentityToken, KeyValue};
use crate::listener::{AttributeChangeListener, PropertyChangeListener};
use crate::value::Value;

// ============================================================================
// 元数据
// ============================================================================

/// 属性种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertyKind {
    /// 标量
    Scalar,
    /// 单实体引用
    Reference,
    /// 实体引用集合
    Collection,
    /// 嵌入式值对象
    Embedded,
}

/// 属性元数据
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropertyMeta {
    pub name: &'static str,
    pub kind: PropertyKind,
    pub read_only: bool,
}

/// 实体类型元数据（由 `#[derive(Entity)]` 生成的静态数据）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityMeta {
    /// 实体类型名称
    pub name: &'static str,
    /// 被本类型扩展替换的原始实体类型
    pub replaces: Option<&'static str>,
    /// 是否为嵌入式值对象
    pub embeddable: bool,
    /// 软删除标记属性（由 null 变为非 null 即视为删除）
    pub soft_delete: Option<&'static str>,
    /// 属性列表（不含 transient 字段）
    pub properties: &'static [PropertyMeta],
}

impl EntityMeta {
    /// 扩展层次中的原始类型名称，没有扩展时为自身名称
    #[inline]
    pub fn original_name(&self) -> &'static str {
        self.replaces.unwrap_or(self.name)
    }

    pub fn property(&self, name: &str) -> Option<&PropertyMeta> {
        self.properties.iter().find(|p| p.name == name)
    }

    /// 非只读属性
    pub fn writable_properties(&self) -> impl Iterator<Item = &PropertyMeta> {
        self.properties.iter().filter(|p| !p.read_only)
    }
}

// ============================================================================
// 生命周期与实体条目
// ============================================================================

/// 实体生命周期状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LifecycleState {
    /// 新建，尚未写入持久层
    #[default]
    New,
    /// 已由持久化上下文管理
    Managed,
    /// 已标记删除
    Deleted,
}

/// 实体条目：每个实例的系统状态
///
/// 保存生命周期状态、应用层属性监听器，以及持久化提供者安装的属性变更监听器。
/// 克隆条目得到的是一个不带任何监听器的副本
#[derive(Default)]
pub struct EntityEntry {
    state: LifecycleState,
    listeners: Vec<Arc<dyn PropertyChangeListener>>,
    change_listener: Option<Arc<dyn AttributeChangeListener>>,
}

impl EntityEntry {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn state(&self) -> LifecycleState {
        self.state
    }

    #[inline]
    pub fn set_state(&mut self, state: LifecycleState) {
        self.state = state;
    }

    #[inline]
    pub fn is_new(&self) -> bool {
        self.state == LifecycleState::New
    }

    pub fn listeners(&self) -> &[Arc<dyn PropertyChangeListener>] {
        &self.listeners
    }

    pub fn add_listener(&mut self, listener: Arc<dyn PropertyChangeListener>) {
        if !self.listeners.iter().any(|l| same_listener(l, &listener)) {
            self.listeners.push(listener);
        }
    }

    pub fn remove_listener(&mut self, listener: &Arc<dyn PropertyChangeListener>) {
        self.listeners.retain(|l| !same_listener(l, listener));
    }

    /// 持久化提供者的属性变更监听器；为 None 说明该实例没有开启变更追踪
    pub fn change_listener(&self) -> Option<&Arc<dyn AttributeChangeListener>> {
        self.change_listener.as_ref()
    }

    pub fn install_change_listener(&mut self, listener: Arc<dyn AttributeChangeListener>) {
        self.change_listener = Some(listener);
    }

    pub fn take_change_listener(&mut self) -> Option<Arc<dyn AttributeChangeListener>> {
        self.change_listener.take()
    }
}

fn same_listener(a: &Arc<dyn PropertyChangeListener>, b: &Arc<dyn PropertyChangeListener>) -> bool {
    Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
}

impl Clone for EntityEntry {
    fn clone(&self) -> Self {
        Self { state: self.state, listeners: Vec::new(), change_listener: None }
    }
}

impl Debug for EntityEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityEntry")
            .field("state", &self.state)
            .field("listeners", &self.listeners.len())
            .field("change_listener", &self.change_listener.is_some())
            .finish()
    }
}

// 条目是系统状态，不参与实体的值比较
impl PartialEq for EntityEntry {
    fn eq(&self, _other: &Self) -> bool {
        true
    }
}

// ============================================================================
// 核心 Trait
// ============================================================================

/// ManagedEntity - 受管实体核心接口
///
/// 持久实体与嵌入式值对象都实现此 trait，通常由 `#[derive(entity_derive::Entity)]` 生成。
/// trait 是对象安全的，变更事件管理器以 `dyn ManagedEntity` 处理所有实体
///
/// # 示例
/// ```ignore
/// #[derive(Debug, Clone, entity_derive::Entity)]
/// #[entity(name = "Customer")]
/// struct Customer {
///     #[entity(entry)]
///     entry: EntityEntry,
///     id: i64,
///     name: Option<String>,
///     #[entity(reference)]
///     owner: Option<Arc<Owner>>,
/// }
/// ```
pub trait ManagedEntity: Any + Debug + Send + Sync {
    /// 实体类型元数据
    fn meta(&self) -> &'static EntityMeta;

    fn entry(&self) -> &EntityEntry;

    fn entry_mut(&mut self) -> &mut EntityEntry;

    /// 主键，新建实体可能尚未分配
    fn key(&self) -> Option<KeyValue>;

    /// 按名称读取属性值，未知属性返回 None
    fn get_value(&self, property: &str) -> Option<Value>;

    /// 按名称写入属性值（直接写字段，不触发监听器）
    fn set_value(&mut self, property: &str, value: Value) -> Result<(), ModelError>;

    /// 该类型的 setter 是否经过增强
    fn setters_enhanced(&self) -> bool {
        false
    }

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;

    fn into_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;

    /// 身份令牌（类型 + 主键）
    fn identity(&self) -> Result<IdentityToken, ModelError> {
        IdentityToken::of(self)
    }

    #[inline]
    fn lifecycle_state(&self) -> LifecycleState {
        self.entry().state()
    }

    #[inline]
    fn is_new(&self) -> bool {
        self.entry().is_new()
    }
}

/// 标记 trait：类型的 setter 已经过增强步骤改写
///
/// 由 `#[derive(Entity)]` 在结构体带有 `#[entity(setters_enhanced)]` 标记时实现
pub trait SettersEnhanced: ManagedEntity {}

// ============================================================================
// 共享实体句柄
// ============================================================================

/// 持久化上下文与事件中使用的共享实体句柄
pub type SharedEntity = Arc<RwLock<dyn ManagedEntity>>;

/// 把实体包装为带类型的共享句柄，可直接赋给 `SharedEntity`
pub fn share<E: ManagedEntity>(entity: E) -> Arc<RwLock<E>> {
    Arc::new(RwLock::new(entity))
}

/// 对象身份比较（不是主键比较）
#[inline]
pub fn same_entity(a: &SharedEntity, b: &SharedEntity) -> bool {
    Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
}

/// 把 `dyn ManagedEntity` 还原为具体类型
pub fn downcast_ref<E: ManagedEntity>(entity: &dyn ManagedEntity) -> Option<&E> {
    entity.as_any().downcast_ref::<E>()
}

pub fn downcast_mut<E: ManagedEntity>(entity: &mut dyn ManagedEntity) -> Option<&mut E> {
    entity.as_any_mut().downcast_mut::<E>()
}
