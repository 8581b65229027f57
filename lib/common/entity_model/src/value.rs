use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entity::ManagedEntity;
use crate::id::IdentityToken;

// ============================================================================
// 标量值
// ============================================================================

/// 标量属性值（可序列化，不持有任何对象引用）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Scalar {
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Text(String),
    Uuid(Uuid),
    DateTime(DateTime<Utc>),
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Bool(v) => write!(f, "{}", v),
            Scalar::Int(v) => write!(f, "{}", v),
            Scalar::UInt(v) => write!(f, "{}", v),
            Scalar::Float(v) => write!(f, "{}", v),
            Scalar::Text(v) => write!(f, "{:?}", v),
            Scalar::Uuid(v) => write!(f, "{}", v),
            Scalar::DateTime(v) => write!(f, "{}", v.to_rfc3339()),
        }
    }
}

// ============================================================================
// 实时属性值
// ============================================================================

/// 指向另一个实体的共享只读引用
pub type EntityRef = Arc<dyn ManagedEntity>;

/// 集合形态：有序列表或无序集合
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CollectionKind {
    List,
    Set,
}

/// 实体引用集合
#[derive(Clone)]
pub struct EntityCollection {
    kind: CollectionKind,
    items: Vec<EntityRef>,
}

impl EntityCollection {
    pub fn new(kind: CollectionKind, items: Vec<EntityRef>) -> Self {
        Self { kind, items }
    }

    #[inline]
    pub fn kind(&self) -> CollectionKind {
        self.kind
    }

    #[inline]
    pub fn items(&self) -> &[EntityRef] {
        &self.items
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl fmt::Debug for EntityCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ids: Vec<String> = self.items.iter().map(|item| describe_ref(item)).collect();
        write!(f, "{:?}{:?}", self.kind, ids)
    }
}

/// 实体属性的实时值
///
/// 与 diff 中记录的旧值不同，`Value` 可能持有被引用实体本身；
/// 变更事件在落入累加器之前会把引用翻译成身份令牌
#[derive(Clone)]
pub enum Value {
    Null,
    Scalar(Scalar),
    /// 单实体引用
    Reference(EntityRef),
    /// 实体引用集合
    Collection(EntityCollection),
    /// 嵌入式值对象（快照）
    Embedded(EntityRef),
}

impl Value {
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            Value::Scalar(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_reference(&self) -> Option<&EntityRef> {
        match self {
            Value::Reference(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_collection(&self) -> Option<&EntityCollection> {
        match self {
            Value::Collection(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_embedded(&self) -> Option<&EntityRef> {
        match self {
            Value::Embedded(e) => Some(e),
            _ => None,
        }
    }

    /// 值种类名称（用于错误信息）
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Scalar(Scalar::Bool(_)) => "bool",
            Value::Scalar(Scalar::Int(_)) => "int",
            Value::Scalar(Scalar::UInt(_)) => "uint",
            Value::Scalar(Scalar::Float(_)) => "float",
            Value::Scalar(Scalar::Text(_)) => "text",
            Value::Scalar(Scalar::Uuid(_)) => "uuid",
            Value::Scalar(Scalar::DateTime(_)) => "datetime",
            Value::Reference(_) => "reference",
            Value::Collection(_) => "collection",
            Value::Embedded(_) => "embedded",
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "Null"),
            Value::Scalar(s) => write!(f, "{:?}", s),
            Value::Reference(r) => write!(f, "Reference({})", describe_ref(r)),
            Value::Collection(c) => write!(f, "Collection({:?})", c),
            Value::Embedded(e) => write!(f, "Embedded({:?})", e),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Scalar(a), Value::Scalar(b)) => a == b,
            (Value::Reference(a), Value::Reference(b)) => same_ref(a, b),
            (Value::Collection(a), Value::Collection(b)) => {
                if a.kind != b.kind || a.items.len() != b.items.len() {
                    return false;
                }
                match a.kind {
                    CollectionKind::List => a.items.iter().zip(b.items.iter()).all(|(x, y)| same_ref(x, y)),
                    // 集合与顺序无关
                    CollectionKind::Set => a.items.iter().all(|x| b.items.iter().any(|y| same_ref(x, y))),
                }
            }
            (Value::Embedded(a), Value::Embedded(b)) => same_embedded(a, b),
            _ => false,
        }
    }
}

/// 引用相等：同一对象，或相同的身份令牌
fn same_ref(a: &EntityRef, b: &EntityRef) -> bool {
    if Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const () {
        return true;
    }
    match (IdentityToken::of(&**a), IdentityToken::of(&**b)) {
        (Ok(x), Ok(y)) => x == y,
        _ => false,
    }
}

/// 嵌入式对象相等：同一类型且逐属性相等
fn same_embedded(a: &EntityRef, b: &EntityRef) -> bool {
    let meta = a.meta();
    meta.name == b.meta().name
        && meta.properties.iter().all(|p| a.get_value(p.name) == b.get_value(p.name))
}

fn describe_ref(r: &EntityRef) -> String {
    match IdentityToken::of(&**r) {
        Ok(token) => token.to_string(),
        Err(_) => format!("{}-<new>", r.meta().name),
    }
}

// ============================================================================
// 无序实体集合
// ============================================================================

/// 无序实体集合：按对象身份去重，迭代顺序为插入顺序
pub struct EntitySet<E> {
    items: Vec<Arc<E>>,
}

impl<E: ManagedEntity> EntitySet<E> {
    pub fn new() -> Self {
        Self { items: Vec::new() }
    }

    /// 插入实体，已存在时返回 false
    pub fn insert(&mut self, item: Arc<E>) -> bool {
        if self.contains(&item) {
            return false;
        }
        self.items.push(item);
        true
    }

    pub fn remove(&mut self, item: &Arc<E>) -> bool {
        match self.items.iter().position(|x| Arc::ptr_eq(x, item)) {
            Some(pos) => {
                self.items.remove(pos);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, item: &Arc<E>) -> bool {
        self.items.iter().any(|x| Arc::ptr_eq(x, item))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<E>> {
        self.items.iter()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<E: ManagedEntity> Default for EntitySet<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> Clone for EntitySet<E> {
    fn clone(&self) -> Self {
        Self { items: self.items.clone() }
    }
}

impl<E: fmt::Debug> fmt::Debug for EntitySet<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.items.iter()).finish()
    }
}

impl<E: ManagedEntity> FromIterator<Arc<E>> for EntitySet<E> {
    fn from_iter<I: IntoIterator<Item = Arc<E>>>(iter: I) -> Self {
        let mut set = Self::new();
        for item in iter {
            set.insert(item);
        }
        set
    }
}

// ============================================================================
// ToValue / FromValue
// ============================================================================

/// 字段值到 `Value` 的转换，增强后的 setter 通过它捕获新旧值
pub trait ToValue {
    fn to_value(&self) -> Value;
}

/// `Value` 到字段值的转换，类型不符时返回 None
pub trait FromValue: Sized {
    fn from_value(value: Value) -> Option<Self>;
}

impl<T: ToValue + ?Sized> ToValue for &T {
    #[inline]
    fn to_value(&self) -> Value {
        (**self).to_value()
    }
}

impl<T: ToValue> ToValue for Option<T> {
    fn to_value(&self) -> Value {
        match self {
            Some(v) => v.to_value(),
            None => Value::Null,
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Null => Some(None),
            other => T::from_value(other).map(Some),
        }
    }
}

macro_rules! impl_int_value {
    ($variant:ident, $wide:ty, $($t:ty),*) => {
        $(
            impl ToValue for $t {
                #[inline]
                fn to_value(&self) -> Value {
                    Value::Scalar(Scalar::$variant(<$wide>::from(*self)))
                }
            }

            impl FromValue for $t {
                fn from_value(value: Value) -> Option<Self> {
                    match value {
                        Value::Scalar(Scalar::Int(v)) => <$t>::try_from(v).ok(),
                        Value::Scalar(Scalar::UInt(v)) => <$t>::try_from(v).ok(),
                        _ => None,
                    }
                }
            }
        )*
    };
}

impl_int_value!(Int, i64, i8, i16, i32, i64);
impl_int_value!(UInt, u64, u8, u16, u32, u64);

impl ToValue for f64 {
    fn to_value(&self) -> Value {
        Value::Scalar(Scalar::Float(*self))
    }
}

impl FromValue for f64 {
    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Scalar(Scalar::Float(v)) => Some(v),
            _ => None,
        }
    }
}

impl ToValue for f32 {
    fn to_value(&self) -> Value {
        Value::Scalar(Scalar::Float(f64::from(*self)))
    }
}

impl FromValue for f32 {
    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Scalar(Scalar::Float(v)) => Some(v as f32),
            _ => None,
        }
    }
}

impl ToValue for bool {
    fn to_value(&self) -> Value {
        Value::Scalar(Scalar::Bool(*self))
    }
}

impl FromValue for bool {
    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Scalar(Scalar::Bool(v)) => Some(v),
            _ => None,
        }
    }
}

impl ToValue for str {
    fn to_value(&self) -> Value {
        Value::Scalar(Scalar::Text(self.to_string()))
    }
}

impl ToValue for String {
    fn to_value(&self) -> Value {
        Value::Scalar(Scalar::Text(self.clone()))
    }
}

impl FromValue for String {
    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Scalar(Scalar::Text(v)) => Some(v),
            _ => None,
        }
    }
}

impl ToValue for Uuid {
    fn to_value(&self) -> Value {
        Value::Scalar(Scalar::Uuid(*self))
    }
}

impl FromValue for Uuid {
    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Scalar(Scalar::Uuid(v)) => Some(v),
            _ => None,
        }
    }
}

impl ToValue for DateTime<Utc> {
    fn to_value(&self) -> Value {
        Value::Scalar(Scalar::DateTime(*self))
    }
}

impl FromValue for DateTime<Utc> {
    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Scalar(Scalar::DateTime(v)) => Some(v),
            _ => None,
        }
    }
}

impl<E: ManagedEntity> ToValue for Arc<E> {
    fn to_value(&self) -> Value {
        let r: EntityRef = self.clone();
        Value::Reference(r)
    }
}

impl<E: ManagedEntity> FromValue for Arc<E> {
    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Reference(r) => downcast_ref_arc(r),
            _ => None,
        }
    }
}

impl<E: ManagedEntity> ToValue for Vec<Arc<E>> {
    fn to_value(&self) -> Value {
        let items = self.iter().map(|item| item.clone() as EntityRef).collect();
        Value::Collection(EntityCollection::new(CollectionKind::List, items))
    }
}

impl<E: ManagedEntity> FromValue for Vec<Arc<E>> {
    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Collection(c) => c.items.into_iter().map(downcast_ref_arc).collect(),
            _ => None,
        }
    }
}

impl<E: ManagedEntity> ToValue for EntitySet<E> {
    fn to_value(&self) -> Value {
        let items = self.items.iter().map(|item| item.clone() as EntityRef).collect();
        Value::Collection(EntityCollection::new(CollectionKind::Set, items))
    }
}

impl<E: ManagedEntity> FromValue for EntitySet<E> {
    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Collection(c) => {
                let items: Option<Vec<Arc<E>>> =
                    c.items.into_iter().map(downcast_ref_arc).collect();
                items.map(|items| items.into_iter().collect())
            }
            _ => None,
        }
    }
}

fn downcast_ref_arc<E: ManagedEntity>(r: EntityRef) -> Option<Arc<E>> {
    r.into_any_arc().downcast::<E>().ok()
}
