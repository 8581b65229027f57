use serde::{Deserialize, Serialize};

/// 增强步骤的命名约定
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnhancerOptions {
    #[serde(default = "default_setter_prefix")]
    pub setter_prefix: String,

    #[serde(default = "default_getter_prefix")]
    pub getter_prefix: String,

    /// 持久化提供者内部方法前缀，匹配的方法可见性收窄为 `pub(crate)`
    #[serde(default = "default_persistence_prefix")]
    pub persistence_prefix: String,
}

fn default_setter_prefix() -> String {
    "set_".to_string()
}

fn default_getter_prefix() -> String {
    "get_".to_string()
}

fn default_persistence_prefix() -> String {
    "_persistence_".to_string()
}

impl Default for EnhancerOptions {
    fn default() -> Self {
        Self {
            setter_prefix: default_setter_prefix(),
            getter_prefix: default_getter_prefix(),
            persistence_prefix: default_persistence_prefix(),
        }
    }
}
