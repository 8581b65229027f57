use std::path::Path;

use anyhow::Context;
use entity_enhancer::EnhancerOptions;
use serde::{Deserialize, Serialize};

/// 命令行配置文件
///
/// # 示例
/// ```yaml
/// enhancer:
///   setter_prefix: "set_"
///   getter_prefix: "get_"
///   persistence_prefix: "_persistence_"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub enhancer: EnhancerOptions,
}

impl Config {
    pub fn from_yaml_str(content: &str) -> anyhow::Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn load_from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config = Self::from_yaml_str(&content)
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        tracing::debug!("Loaded config from {}: {:?}", path.display(), config);
        Ok(config)
    }
}
