use thiserror::Error;

/// 增强步骤错误
#[derive(Debug, Error)]
pub enum EnhanceError {
    /// 被追踪字段声明为基本类型，无法表达"未设置"
    #[error("Unable to enhance field {class}.{field} with primitive type {ty}. Use type Option<{ty}>.")]
    PrimitiveField { class: String, field: String, ty: String },

    #[error("Unable to enhance field {class}.{field}: getter `{field}()` or `get_{field}()` not found")]
    MissingGetter { class: String, field: String },

    #[error("Invalid #[entity] attribute on {class}: {message}")]
    Attribute { class: String, message: String },

    #[error("Failed to parse {path}: {message}")]
    Parse { path: String, message: String },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl EnhanceError {
    /// 出错的实体类型名（文件级错误为 None）
    pub fn class(&self) -> Option<&str> {
        match self {
            EnhanceError::PrimitiveField { class, .. }
            | EnhanceError::MissingGetter { class, .. }
            | EnhanceError::Attribute { class, .. } => Some(class),
            EnhanceError::Parse { .. } | EnhanceError::Io { .. } => None,
        }
    }
}
