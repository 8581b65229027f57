use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entity::ManagedEntity;
use crate::error::ModelError;

// ============================================================================
// 主键值
// ============================================================================

/// 实体主键值
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum KeyValue {
    Int(i64),
    UInt(u64),
    Text(String),
    Uuid(Uuid),
}

impl fmt::Display for KeyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyValue::Int(v) => write!(f, "{}", v),
            KeyValue::UInt(v) => write!(f, "{}", v),
            KeyValue::Text(v) => write!(f, "{}", v),
            KeyValue::Uuid(v) => write!(f, "{}", v),
        }
    }
}

/// 主键字段到 KeyValue 的转换
///
/// `Option<T>` 表示主键可能尚未分配（例如新建实体）
pub trait ToKey {
    fn to_key(&self) -> Option<KeyValue>;
}

macro_rules! impl_to_key {
    ($variant:ident, $target:ty, $($t:ty),*) => {
        $(
            impl ToKey for $t {
                #[inline]
                fn to_key(&self) -> Option<KeyValue> {
                    Some(KeyValue::$variant(<$target>::from(*self)))
                }
            }
        )*
    };
}

impl_to_key!(Int, i64, i8, i16, i32, i64);
impl_to_key!(UInt, u64, u8, u16, u32, u64);

impl ToKey for String {
    fn to_key(&self) -> Option<KeyValue> {
        Some(KeyValue::Text(self.clone()))
    }
}

impl ToKey for Uuid {
    fn to_key(&self) -> Option<KeyValue> {
        Some(KeyValue::Uuid(*self))
    }
}

impl<T: ToKey> ToKey for Option<T> {
    fn to_key(&self) -> Option<KeyValue> {
        self.as_ref().and_then(ToKey::to_key)
    }
}

// ============================================================================
// 身份令牌
// ============================================================================

/// 身份令牌：(实体类型, 主键)
///
/// 在 diff 中代替实体引用本身，保存 diff 不会持有被引用的对象图
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IdentityToken {
    entity_name: String,
    key: KeyValue,
}

impl IdentityToken {
    pub fn new(entity_name: impl Into<String>, key: KeyValue) -> Self {
        Self { entity_name: entity_name.into(), key }
    }

    /// 为实体生成身份令牌，实体类型取其原始（被扩展的）类型名
    pub fn of<E: ManagedEntity + ?Sized>(entity: &E) -> Result<Self, ModelError> {
        let meta = entity.meta();
        match entity.key() {
            Some(key) => Ok(Self::new(meta.original_name(), key)),
            None => Err(ModelError::MissingKey { entity: meta.name.to_string() }),
        }
    }

    #[inline]
    pub fn entity_name(&self) -> &str {
        &self.entity_name
    }

    #[inline]
    pub fn key(&self) -> &KeyValue {
        &self.key
    }
}

impl fmt::Display for IdentityToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.entity_name, self.key)
    }
}
