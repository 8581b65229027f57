use std::sync::Arc;

use parking_lot::RwLock;

use crate::core::change_event::EntityChangedEvent;
use crate::error::PublishError;

/// 事件发布接口
pub trait EventPublisher: Send + Sync {
    fn publish_event(&self, event: &EntityChangedEvent) -> Result<(), PublishError>;
}

/// 实体变更事件订阅者
pub trait EntityChangedListener: Send + Sync {
    /// 订阅者名称，用于日志和错误信息
    fn name(&self) -> &str;

    fn on_entity_changed(&self, event: &EntityChangedEvent) -> Result<(), PublishError>;
}

struct Subscription {
    /// None 表示订阅所有实体
    entity_name: Option<String>,
    listener: Arc<dyn EntityChangedListener>,
}

impl Subscription {
    fn accepts(&self, event: &EntityChangedEvent) -> bool {
        self.entity_name.as_deref().map(|name| name == event.entity_name()).unwrap_or(true)
    }
}

/// ListenerRegistry - 进程内的订阅者注册表
///
/// 按注册顺序同步调用订阅者，某个订阅者失败时立即返回该错误
#[derive(Default)]
pub struct ListenerRegistry {
    subscriptions: RwLock<Vec<Subscription>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 订阅所有实体的事件
    pub fn subscribe(&self, listener: Arc<dyn EntityChangedListener>) {
        tracing::debug!("Subscribe {} to all entities", listener.name());
        self.subscriptions.write().push(Subscription { entity_name: None, listener });
    }

    /// 只订阅指定（原始）实体名的事件
    pub fn subscribe_to(&self, entity_name: impl Into<String>, listener: Arc<dyn EntityChangedListener>) {
        let entity_name = entity_name.into();
        tracing::debug!("Subscribe {} to {}", listener.name(), entity_name);
        self.subscriptions.write().push(Subscription { entity_name: Some(entity_name), listener });
    }

    pub fn len(&self) -> usize {
        self.subscriptions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.read().is_empty()
    }
}

impl EventPublisher for ListenerRegistry {
    fn publish_event(&self, event: &EntityChangedEvent) -> Result<(), PublishError> {
        // 先复制订阅列表，订阅者在回调中可以再注册
        let targets: Vec<Arc<dyn EntityChangedListener>> = self
            .subscriptions
            .read()
            .iter()
            .filter(|s| s.accepts(event))
            .map(|s| s.listener.clone())
            .collect();

        for listener in targets {
            tracing::trace!("Deliver {} to {}", event, listener.name());
            listener.on_entity_changed(event)?;
        }
        Ok(())
    }
}
