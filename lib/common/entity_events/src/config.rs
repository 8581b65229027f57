use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// 订阅者失败时的发布策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishPolicy {
    /// 首个失败即停止，之后的事件不再投递
    #[default]
    AbortOnFirstError,
    /// 投递全部事件，最后汇总失败
    ContinueOnError,
}

/// 变更追踪配置
///
/// # 示例
/// ```yaml
/// enabled: true
/// require_transaction: true
/// publish_policy: continue_on_error
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeTrackingConfig {
    /// 关闭时 collect / before_flush 不产生任何变更
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// 没有事务同步时直接报错，而不是静默地跨请求累积
    #[serde(default = "default_require_transaction")]
    pub require_transaction: bool,

    #[serde(default)]
    pub publish_policy: PublishPolicy,
}

fn default_enabled() -> bool {
    true
}

fn default_require_transaction() -> bool {
    true
}

impl Default for ChangeTrackingConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            require_transaction: default_require_transaction(),
            publish_policy: PublishPolicy::default(),
        }
    }
}

impl ChangeTrackingConfig {
    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config = Self::from_yaml_str(&content)?;
        tracing::debug!("Loaded change tracking config from {}: {:?}", path.display(), config);
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ChangeTrackingConfig::default();
        assert!(config.enabled);
        assert!(config.require_transaction);
        assert_eq!(config.publish_policy, PublishPolicy::AbortOnFirstError);
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let config = ChangeTrackingConfig::from_yaml_str("publish_policy: continue_on_error\n").unwrap();
        assert!(config.enabled);
        assert!(config.require_transaction);
        assert_eq!(config.publish_policy, PublishPolicy::ContinueOnError);
    }

    #[test]
    fn test_invalid_policy_rejected() {
        assert!(ChangeTrackingConfig::from_yaml_str("publish_policy: sometimes\n").is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tracking.yaml");
        std::fs::write(&path, "enabled: false\nrequire_transaction: false\n").unwrap();

        let config = ChangeTrackingConfig::load_from_file(&path).unwrap();
        assert!(!config.enabled);
        assert!(!config.require_transaction);

        let missing = ChangeTrackingConfig::load_from_file(&dir.path().join("missing.yaml"));
        assert!(matches!(missing, Err(ConfigError::Io { .. })));
    }
}
