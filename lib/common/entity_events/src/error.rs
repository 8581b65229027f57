//! entity_events 错误类型

use thiserror::Error;
use uuid::Uuid;

/// 事件发布错误
#[derive(Debug, Error)]
pub enum PublishError {
    /// 订阅者处理事件失败
    #[error("Listener '{listener}' failed on {event}: {message}")]
    Subscriber { listener: String, event: String, message: String },

    /// 首个失败即中止，之后的事件未投递
    #[error("Publication aborted after {delivered} of {total} events: {source}")]
    Aborted {
        delivered: usize,
        total: usize,
        #[source]
        source: Box<PublishError>,
    },

    /// 所有事件都尝试投递后，部分失败
    #[error("{} of {total} events failed to publish", .failures.len())]
    Multiple { total: usize, failures: Vec<PublishError> },
}

impl PublishError {
    pub fn subscriber(listener: impl Into<String>, event: impl ToString, message: impl Into<String>) -> Self {
        PublishError::Subscriber {
            listener: listener.into(),
            event: event.to_string(),
            message: message.into(),
        }
    }
}

/// 变更追踪错误
#[derive(Debug, Error)]
pub enum ChangeTrackingError {
    /// 配置要求事务，但当前上下文没有激活的事务同步
    #[error("Change tracking requires an active transaction synchronization (context {context})")]
    TransactionRequired { context: Uuid },

    /// 在没有事务同步的上下文中注册同步回调
    #[error("Transaction synchronization is not active (context {context})")]
    SynchronizationNotActive { context: Uuid },

    #[error("Publish error: {0}")]
    Publish(#[from] PublishError),
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, ChangeTrackingError>;
