use thiserror::Error;

/// 实体模型操作错误
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModelError {
    /// 实体上不存在该属性
    #[error("Unknown property '{property}' on entity '{entity}'")]
    UnknownProperty { entity: String, property: String },

    /// 赋值类型与属性声明类型不符
    #[error("Type mismatch for '{property}': expected {expected}, got {actual}")]
    TypeMismatch { property: String, expected: String, actual: String },

    /// 实体尚未分配主键，无法生成身份令牌
    #[error("Entity '{entity}' has no key assigned")]
    MissingKey { entity: String },

    /// 只读属性不能通过名称赋值
    #[error("Property '{property}' of entity '{entity}' is read-only")]
    ReadOnlyProperty { entity: String, property: String },
}

impl ModelError {
    pub fn type_mismatch(
        property: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        ModelError::TypeMismatch {
            property: property.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }
}
