//! ChangeEventManager BDD 测试
//!
//! 本文件使用 BDD（行为驱动开发）风格测试变更事件的收集、合并与发布
//! 实体的 setter 由 `#[entity_derive::enhance]` 增强，变更通过 MemUnitOfWork 驱动
//! 场景：新建、更新、多次 flush、删除（含无序集合）、回滚，以及发布失败策略

use std::sync::Arc;

use entity_events::{
    ChangeEventManager, ChangeTrackingConfig, ChangeTrackingError, ChangeType, EntityChangedEvent,
    EntityChangedListener, ListenerRegistry, MemUnitOfWork, OldValue, PublishError, PublishPolicy,
    TransactionContext, TransactionStatus,
};
use entity_model::{
    share, CollectionKind, EntityEntry, EntitySet, IdentityToken, KeyValue, ManagedEntity, Scalar, SharedEntity,
};
use parking_lot::Mutex;

// ============================================================================
// 测试实体定义
// ============================================================================

#[entity_derive::enhance]
mod model {
    use std::sync::Arc;

    use entity_derive::Entity;
    use entity_model::{EntityEntry, EntitySet};

    /// 宠物主人
    #[derive(Debug, Clone, Entity)]
    pub struct Owner {
        #[entity(entry)]
        pub entry: EntityEntry,
        pub id: i64,
        pub name: Option<String>,
    }

    impl Owner {
        pub fn name(&self) -> &Option<String> {
            &self.name
        }

        pub fn set_name(&mut self, name: Option<String>) {
            self.name = name;
        }
    }

    /// 扩展替换 Owner 的实体，事件上使用原始名称
    #[derive(Debug, Clone, Entity)]
    #[entity(name = "VipOwner", replaces = "Owner")]
    pub struct VipOwner {
        #[entity(entry)]
        pub entry: EntityEntry,
        pub id: i64,
        pub level: Option<i32>,
    }

    #[derive(Debug, Clone, Entity)]
    pub struct Pet {
        #[entity(entry)]
        pub entry: EntityEntry,
        pub id: i64,
        pub nickname: Option<String>,
    }

    /// 宠物以无序集合保存
    #[derive(Debug, Clone, Entity)]
    pub struct Household {
        #[entity(entry)]
        pub entry: EntityEntry,
        pub id: i64,
        pub pets: EntitySet<Pet>,
    }

    impl Household {
        pub fn pets(&self) -> &EntitySet<Pet> {
            &self.pets
        }

        pub fn set_pets(&mut self, pets: EntitySet<Pet>) {
            self.pets = pets;
        }
    }

    #[derive(Debug, Clone, Entity)]
    #[entity(embeddable)]
    pub struct Address {
        #[entity(entry)]
        pub entry: EntityEntry,
        pub city: Option<String>,
        pub street: Option<String>,
    }

    #[derive(Debug, Clone, Entity)]
    #[entity(soft_delete = "deleted_at")]
    pub struct Person {
        #[entity(entry)]
        pub entry: EntityEntry,
        pub id: i64,
        pub name: Option<String>,
        pub age: Option<i32>,
        pub city: Option<String>,
        pub owner: Option<Arc<Owner>>,
        pub pets: Vec<Arc<Pet>>,
        #[entity(embedded)]
        pub address: Option<Address>,
        pub deleted_at: Option<String>,
    }

    impl Person {
        pub fn name(&self) -> &Option<String> {
            &self.name
        }

        pub fn set_name(&mut self, name: Option<String>) {
            self.name = name;
        }

        pub fn age(&self) -> Option<i32> {
            self.age
        }

        pub fn set_age(&mut self, age: Option<i32>) {
            self.age = age;
        }

        pub fn city(&self) -> &Option<String> {
            &self.city
        }

        pub fn set_city(&mut self, city: Option<String>) {
            self.city = city;
        }

        pub fn get_owner(&self) -> Option<Arc<Owner>> {
            self.owner.clone()
        }

        pub fn set_owner(&mut self, owner: Option<Arc<Owner>>) {
            self.owner = owner;
        }

        pub fn address(&self) -> &Option<Address> {
            &self.address
        }

        pub fn set_address(&mut self, address: Option<Address>) {
            self.address = address;
        }

        pub fn deleted_at(&self) -> &Option<String> {
            &self.deleted_at
        }

        pub fn set_deleted_at(&mut self, deleted_at: Option<String>) {
            self.deleted_at = deleted_at;
        }
    }
}

use model::{Address, Household, Owner, Person, Pet, VipOwner};

/// 未经增强的实体：修改不会被检测到
#[derive(Debug, entity_derive::Entity)]
struct Plain {
    #[entity(entry)]
    entry: EntityEntry,
    id: i64,
    title: Option<String>,
}

// ============================================================================
// 测试辅助
// ============================================================================

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn text(value: &str) -> Option<String> {
    Some(value.to_string())
}

fn owner(id: i64) -> Arc<Owner> {
    Arc::new(Owner { entry: EntityEntry::new(), id, name: Some(format!("owner-{}", id)) })
}

fn pet(id: i64) -> Arc<Pet> {
    Arc::new(Pet { entry: EntityEntry::new(), id, nickname: None })
}

fn address(city: &str, street: &str) -> Address {
    Address { entry: EntityEntry::new(), city: text(city), street: text(street) }
}

fn person(id: i64) -> Person {
    Person {
        entry: EntityEntry::new(),
        id,
        name: text("Bob"),
        age: Some(30),
        city: text("Paris"),
        owner: None,
        pets: Vec::new(),
        address: None,
        deleted_at: None,
    }
}

fn manager_with(config: ChangeTrackingConfig, registry: Arc<ListenerRegistry>) -> Arc<ChangeEventManager> {
    Arc::new(ChangeEventManager::with_config(config, registry))
}

fn default_manager() -> Arc<ChangeEventManager> {
    manager_with(ChangeTrackingConfig::default(), Arc::new(ListenerRegistry::new()))
}

fn scalar_text(value: &str) -> OldValue {
    OldValue::Scalar(Scalar::Text(value.to_string()))
}

/// 记录收到的事件
#[derive(Default)]
struct RecordingListener {
    received: Mutex<Vec<String>>,
}

impl EntityChangedListener for RecordingListener {
    fn name(&self) -> &str {
        "recording"
    }

    fn on_entity_changed(&self, event: &EntityChangedEvent) -> Result<(), PublishError> {
        self.received.lock().push(format!("{} {}", event.change_type(), event.entity_name()));
        Ok(())
    }
}

/// 总是失败的订阅者
struct FailingListener;

impl EntityChangedListener for FailingListener {
    fn name(&self) -> &str {
        "failing"
    }

    fn on_entity_changed(&self, event: &EntityChangedEvent) -> Result<(), PublishError> {
        Err(PublishError::subscriber(self.name(), event, "downstream unavailable"))
    }
}

// ============================================================================
// BDD 场景 A：新建实体生成 CREATED 事件
// ============================================================================

#[test]
fn scenario_new_entity_creates_presence_snapshot() {
    init_tracing();

    // ========== Given（给定）==========
    // 一个新建的 Owner，name = "Bob"
    let manager = default_manager();
    let mut uow = MemUnitOfWork::begin(manager);
    let bob = share(Owner { entry: EntityEntry::new(), id: 7, name: text("Bob") });
    uow.persist(bob.clone());

    // ========== When（当）==========
    let events = uow.commit().expect("提交应该成功");

    // ========== Then（那么）==========
    // 只有一条 CREATED 事件，diff 为 ("name", null)，主键不出现在 diff 中
    assert_eq!(events.len(), 1);
    let event = &events[0];
    assert_eq!(event.change_type(), ChangeType::Created);
    assert_eq!(event.changes().attributes(), vec!["name".to_string()]);
    assert_eq!(event.changes().old_value("name"), Some(&OldValue::Null));
    assert!(!event.changes().is_changed("id"));
    assert_eq!(event.entity_id(), Some(&IdentityToken::new("Owner", KeyValue::Int(7))));

    // 提交后实体转为 Managed
    assert!(!bob.read().is_new());
}

// ============================================================================
// BDD 场景 B：受管实体修改一个属性
// ============================================================================

#[test]
fn scenario_managed_entity_records_only_changed_attribute() {
    init_tracing();

    // ========== Given（给定）==========
    // 一个受管的 Person，age = 30，city = "Paris"
    let manager = default_manager();
    let mut uow = MemUnitOfWork::begin(manager);
    let alice = share(person(1));
    uow.attach(alice.clone());

    // ========== When（当）==========
    // age 改为 31，city 设为相同的值
    alice.write().set_age(Some(31));
    alice.write().set_city(text("Paris"));
    uow.flush().expect("flush 应该成功");
    let events = uow.commit().expect("提交应该成功");

    // ========== Then（那么）==========
    // 只有 age 被记录，旧值为 30
    assert_eq!(events.len(), 1);
    let event = &events[0];
    assert_eq!(event.change_type(), ChangeType::Updated);
    assert_eq!(event.changes().len(), 1);
    assert_eq!(event.changes().old_value("age"), Some(&OldValue::Scalar(Scalar::Int(30))));
    assert!(!event.changes().is_changed("city"));
}

// ============================================================================
// BDD 场景 C：同一事务内两次 flush，属性取并集
// ============================================================================

#[test]
fn scenario_two_flushes_union_changes() {
    init_tracing();

    // ========== Given（给定）==========
    let manager = default_manager();
    let mut uow = MemUnitOfWork::begin(manager.clone());
    let alice = share(person(1));
    uow.attach(alice.clone());

    // ========== When（当）==========
    // 第一次 flush 修改 age，第二次 flush 修改 city
    alice.write().set_age(Some(31));
    uow.flush().expect("第一次 flush 应该成功");
    alice.write().set_city(text("Lyon"));
    uow.flush().expect("第二次 flush 应该成功");

    // ========== Then（那么）==========
    // 累积器中同一实体只有一条信息，包含 age 和 city
    let accumulated = manager.accumulated(uow.context());
    assert_eq!(accumulated.len(), 1);
    assert_eq!(accumulated[0].changes().attributes(), vec!["age".to_string(), "city".to_string()]);
    assert_eq!(accumulated[0].changes().old_value("city"), Some(&scalar_text("Paris")));

    let events = uow.commit().expect("提交应该成功");
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].change_type(), ChangeType::Updated);
}

#[test]
fn scenario_created_then_updated_keeps_created() {
    init_tracing();

    // ========== Given（给定）==========
    // 新建 Owner 后 flush，再修改 name
    let manager = default_manager();
    let mut uow = MemUnitOfWork::begin(manager);
    let bob = share(Owner { entry: EntityEntry::new(), id: 7, name: text("Bob") });
    uow.persist(bob.clone());
    uow.flush().expect("flush 应该成功");

    // ========== When（当）==========
    bob.write().set_name(text("Rob"));
    let events = uow.commit().expect("提交应该成功");

    // ========== Then（那么）==========
    // 类型保持首次观察到的 CREATED，diff 只记录属性名，旧值仍为 null
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].change_type(), ChangeType::Created);
    assert_eq!(events[0].changes().attributes(), vec!["name".to_string()]);
    assert_eq!(events[0].changes().old_value("name"), Some(&OldValue::Null));
}

#[test]
fn scenario_created_then_updated_new_attribute_has_null_old_value() {
    init_tracing();

    // ========== Given（给定）==========
    // 新建 Person（city 为空）后 flush，再给 city 赋值并修改 age
    let manager = default_manager();
    let mut uow = MemUnitOfWork::begin(manager);
    let mut entity = person(3);
    entity.city = None;
    let carol = share(entity);
    uow.persist(carol.clone());
    uow.flush().expect("flush 应该成功");

    // ========== When（当）==========
    carol.write().set_city(text("Lyon"));
    carol.write().set_age(Some(31));
    let events = uow.commit().expect("提交应该成功");

    // ========== Then（那么）==========
    // 后来出现的 city 只并入名称，已有的 age 不被真实旧值覆盖
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].change_type(), ChangeType::Created);
    let changes = events[0].changes();
    assert!(changes.is_changed("city"));
    assert_eq!(changes.old_value("city"), Some(&OldValue::Null));
    assert_eq!(changes.old_value("age"), Some(&OldValue::Null));
    assert_eq!(changes.old_value("name"), Some(&OldValue::Null));
}

// ============================================================================
// BDD 场景 D：删除实体，引用记为身份令牌
// ============================================================================

#[test]
fn scenario_deleted_entity_records_identity_tokens() {
    init_tracing();

    // ========== Given（给定）==========
    // Person 引用 Owner(42)，拥有两只宠物和一个地址
    let manager = default_manager();
    let mut uow = MemUnitOfWork::begin(manager);
    let mut entity = person(1);
    entity.owner = Some(owner(42));
    entity.pets = vec![pet(1), pet(2)];
    entity.address = Some(address("Paris", "Main"));
    let alice = share(entity);
    let shared: SharedEntity = alice.clone();
    uow.attach(shared.clone());

    // ========== When（当）==========
    uow.remove(&shared);
    let events = uow.commit().expect("提交应该成功");

    // ========== Then（那么）==========
    assert_eq!(events.len(), 1);
    let changes = events[0].changes();
    assert_eq!(events[0].change_type(), ChangeType::Deleted);

    // 引用为 (Owner, 42)
    assert_eq!(changes.old_reference_id("owner"), Some(&IdentityToken::new("Owner", KeyValue::Int(42))));

    // 集合为身份令牌列表，保持顺序
    let pets = changes.old_collection("pets").expect("pets 应该有快照");
    assert_eq!(pets.kind, CollectionKind::List);
    assert_eq!(
        pets.ids,
        vec![IdentityToken::new("Pet", KeyValue::Int(1)), IdentityToken::new("Pet", KeyValue::Int(2))]
    );

    // 嵌入式属性展开为嵌套快照
    assert_eq!(changes.old_value("address.city"), Some(&scalar_text("Paris")));
    assert_eq!(changes.old_value("name"), Some(&scalar_text("Bob")));
    assert!(!changes.is_changed("id"));

    // 删除后的实体不再被跟踪
    assert!(has_no_change_listener(events[0].source()));
}

#[test]
fn scenario_deleted_entity_set_keeps_set_kind() {
    init_tracing();

    // ========== Given（给定）==========
    // Household 的宠物集合按插入顺序为 Pet(2)、Pet(1)
    let manager = default_manager();
    let mut uow = MemUnitOfWork::begin(manager);
    let pets: EntitySet<Pet> = vec![pet(2), pet(1)].into_iter().collect();
    let home: SharedEntity = share(Household { entry: EntityEntry::new(), id: 5, pets });
    uow.attach(home.clone());

    // ========== When（当）==========
    uow.remove(&home);
    let events = uow.commit().expect("提交应该成功");

    // ========== Then（那么）==========
    // 快照保留无序集合形态，令牌按迭代顺序排列
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].change_type(), ChangeType::Deleted);
    let pets = events[0].changes().old_collection("pets").expect("pets 应该有快照");
    assert_eq!(pets.kind, CollectionKind::Set);
    assert_eq!(
        pets.ids,
        vec![IdentityToken::new("Pet", KeyValue::Int(2)), IdentityToken::new("Pet", KeyValue::Int(1))]
    );
}

#[test]
fn scenario_setter_replacing_entity_set_records_old_tokens() {
    init_tracing();

    // ========== Given（给定）==========
    // 受管的 Household 只有 Pet(1)
    let manager = default_manager();
    let mut uow = MemUnitOfWork::begin(manager);
    let first = pet(1);
    let pets: EntitySet<Pet> = vec![first.clone()].into_iter().collect();
    let home = share(Household { entry: EntityEntry::new(), id: 6, pets });
    uow.attach(home.clone());

    // ========== When（当）==========
    // 通过 setter 换成 {Pet(1), Pet(2)}
    let replaced: EntitySet<Pet> = vec![first, pet(2)].into_iter().collect();
    home.write().set_pets(replaced);
    let events = uow.commit().expect("提交应该成功");

    // ========== Then（那么）==========
    // UPDATED 事件只记录 pets，旧值为原集合的身份令牌
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].change_type(), ChangeType::Updated);
    let changes = events[0].changes();
    assert_eq!(changes.attributes(), vec!["pets".to_string()]);
    let pets = changes.old_collection("pets").expect("pets 应该有旧值");
    assert_eq!(pets.kind, CollectionKind::Set);
    assert_eq!(pets.ids, vec![IdentityToken::new("Pet", KeyValue::Int(1))]);
    assert_eq!(home.read().pets().len(), 2);
}

fn has_no_change_listener(entity: &SharedEntity) -> bool {
    entity.read().entry().change_listener().is_none()
}

#[test]
fn scenario_soft_delete_is_reported_as_deleted() {
    init_tracing();

    // ========== Given（给定）==========
    let manager = default_manager();
    let mut uow = MemUnitOfWork::begin(manager);
    let alice = share(person(1));
    uow.attach(alice.clone());

    // ========== When（当）==========
    // 软删除标记由 null 变为非 null
    alice.write().set_deleted_at(text("2026-10-17"));
    let events = uow.commit().expect("提交应该成功");

    // ========== Then（那么）==========
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].change_type(), ChangeType::Deleted);
    assert_eq!(events[0].changes().old_value("age"), Some(&OldValue::Scalar(Scalar::Int(30))));
}

// ============================================================================
// BDD 场景 E：回滚丢弃累积器
// ============================================================================

#[test]
fn scenario_rollback_discards_accumulator() {
    init_tracing();

    // ========== Given（给定）==========
    // 两次 flush 已经累积了变更
    let manager = default_manager();
    let alice = share(person(1));

    let mut first = MemUnitOfWork::begin(manager.clone());
    first.attach(alice.clone());
    alice.write().set_age(Some(31));
    first.flush().expect("flush 应该成功");
    alice.write().set_city(text("Lyon"));
    first.flush().expect("flush 应该成功");
    assert_eq!(manager.accumulated(first.context()).len(), 1);

    // ========== When（当）==========
    let outcome = first.rollback();

    // ========== Then（那么）==========
    // 累积器随事务同步一起解绑
    assert_eq!(outcome.status, TransactionStatus::RolledBack);
    assert_eq!(outcome.unreleased_resources, 0);

    // 新事务从空累积器开始，只看到自己的修改
    let mut second = MemUnitOfWork::begin(manager.clone());
    second.attach(alice.clone());
    assert!(manager.accumulated(second.context()).is_empty());

    alice.write().set_name(text("Alice"));
    let events = second.commit().expect("提交应该成功");
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].changes().attributes(), vec!["name".to_string()]);
}

// ============================================================================
// 嵌入式对象与引用
// ============================================================================

#[test]
fn scenario_embedded_change_is_nested() {
    init_tracing();

    // ========== Given（给定）==========
    let manager = default_manager();
    let mut uow = MemUnitOfWork::begin(manager);
    let mut entity = person(1);
    entity.address = Some(address("Paris", "Main"));
    let alice = share(entity);
    uow.attach(alice.clone());

    // ========== When（当）==========
    // 换成只有 city 不同的地址
    alice.write().set_address(Some(address("Lyon", "Main")));
    let events = uow.commit().expect("提交应该成功");

    // ========== Then（那么）==========
    let changes = events[0].changes();
    assert!(changes.is_changed("address"));
    assert!(changes.is_changed("address.city"));
    assert!(!changes.is_changed("address.street"));
    assert_eq!(changes.attributes(), vec!["address.city".to_string()]);
    assert_eq!(changes.nested_changes("address").and_then(|n| n.old_value("city")), Some(&scalar_text("Paris")));
}

#[test]
fn scenario_reference_change_records_old_token() {
    init_tracing();

    // ========== Given（给定）==========
    let manager = default_manager();
    let mut uow = MemUnitOfWork::begin(manager);
    let mut entity = person(1);
    entity.owner = Some(owner(42));
    let alice = share(entity);
    uow.attach(alice.clone());

    // ========== When（当）==========
    alice.write().set_owner(Some(owner(43)));
    let events = uow.commit().expect("提交应该成功");

    // ========== Then（那么）==========
    // diff 中只保存旧引用的身份令牌
    let changes = events[0].changes();
    assert_eq!(changes.old_reference_id("owner"), Some(&IdentityToken::new("Owner", KeyValue::Int(42))));
    assert_eq!(changes.to_string(), "{owner=Owner-42}");
}

// ============================================================================
// 监听器缺失、配置与事务要求
// ============================================================================

#[test]
fn scenario_unenhanced_entity_is_skipped() {
    init_tracing();

    // ========== Given（给定）==========
    // 未增强的实体没有属性变更监听器
    let manager = default_manager();
    let mut uow = MemUnitOfWork::begin(manager);
    let plain = share(Plain { entry: EntityEntry::new(), id: 1, title: None });
    uow.attach(plain.clone());

    // ========== When（当）==========
    plain.write().set_value("title", entity_model::Value::Scalar(Scalar::Text("x".into()))).unwrap();
    let events = uow.commit().expect("提交应该成功");

    // ========== Then（那么）==========
    // 变更无法检测，不产生事件
    assert!(events.is_empty());
    assert!(plain.read().entry().change_listener().is_none());
}

#[test]
fn scenario_unenhanced_new_entity_still_created() {
    init_tracing();

    let manager = default_manager();
    let mut uow = MemUnitOfWork::begin(manager);
    uow.persist(share(Plain { entry: EntityEntry::new(), id: 1, title: Some("draft".into()) }));

    let events = uow.commit().expect("提交应该成功");

    assert_eq!(events.len(), 1);
    assert_eq!(events[0].change_type(), ChangeType::Created);
    assert!(events[0].changes().is_changed("title"));
}

#[test]
fn scenario_missing_transaction_fails_fast() {
    init_tracing();

    // ========== Given（给定）==========
    // 默认配置要求事务，而上下文没有事务同步
    let manager = default_manager();
    let mut uow = MemUnitOfWork::with_context(manager, TransactionContext::non_transactional());
    uow.persist(share(Owner { entry: EntityEntry::new(), id: 1, name: text("Bob") }));

    // ========== When（当）==========
    let result = uow.flush();

    // ========== Then（那么）==========
    assert!(matches!(result, Err(ChangeTrackingError::TransactionRequired { .. })));
}

#[test]
fn scenario_transaction_optional_when_configured() {
    init_tracing();

    let config = ChangeTrackingConfig { require_transaction: false, ..ChangeTrackingConfig::default() };
    let manager = manager_with(config, Arc::new(ListenerRegistry::new()));
    let mut uow = MemUnitOfWork::with_context(manager, TransactionContext::non_transactional());
    uow.persist(share(Owner { entry: EntityEntry::new(), id: 1, name: text("Bob") }));

    uow.flush().expect("flush 应该成功");
    let events = uow.commit().expect("提交应该成功");

    assert_eq!(events.len(), 1);
}

#[test]
fn scenario_disabled_tracking_collects_nothing() {
    init_tracing();

    let config = ChangeTrackingConfig { enabled: false, ..ChangeTrackingConfig::default() };
    let manager = manager_with(config, Arc::new(ListenerRegistry::new()));
    let mut uow = MemUnitOfWork::begin(manager);
    let alice = share(person(1));
    uow.attach(alice.clone());

    alice.write().set_age(Some(31));
    let events = uow.commit().expect("提交应该成功");

    assert!(events.is_empty());
}

// ============================================================================
// 发布
// ============================================================================

/// 一个新建 Owner 和一个修改过的 Person，按此顺序提交
fn two_events(manager: Arc<ChangeEventManager>) -> Vec<EntityChangedEvent> {
    let mut uow = MemUnitOfWork::begin(manager);
    uow.persist(share(Owner { entry: EntityEntry::new(), id: 1, name: text("Bob") }));
    let alice = share(person(2));
    uow.attach(alice.clone());
    alice.write().set_age(Some(31));
    uow.commit().expect("提交应该成功")
}

#[test]
fn scenario_publish_aborts_on_first_error() {
    init_tracing();

    // ========== Given（给定）==========
    // 订阅全部实体的记录者，以及只订阅 Owner 且总是失败的订阅者
    let registry = Arc::new(ListenerRegistry::new());
    let recorder = Arc::new(RecordingListener::default());
    registry.subscribe(recorder.clone());
    registry.subscribe_to("Owner", Arc::new(FailingListener));
    let manager = manager_with(ChangeTrackingConfig::default(), registry);
    let events = two_events(manager.clone());

    // ========== When（当）==========
    let result = manager.publish(&events);

    // ========== Then（那么）==========
    // 第一个事件失败后停止，Person 事件未投递
    match result {
        Err(PublishError::Aborted { delivered, total, source }) => {
            assert_eq!(delivered, 0);
            assert_eq!(total, 2);
            assert!(matches!(*source, PublishError::Subscriber { .. }));
        }
        other => panic!("expected Aborted, got {:?}", other),
    }
    assert_eq!(*recorder.received.lock(), vec!["CREATED Owner".to_string()]);
}

#[test]
fn scenario_publish_continues_on_error() {
    init_tracing();

    // ========== Given（给定）==========
    let registry = Arc::new(ListenerRegistry::new());
    let recorder = Arc::new(RecordingListener::default());
    registry.subscribe(recorder.clone());
    registry.subscribe_to("Owner", Arc::new(FailingListener));
    let config = ChangeTrackingConfig { publish_policy: PublishPolicy::ContinueOnError, ..Default::default() };
    let manager = manager_with(config, registry);
    let events = two_events(manager.clone());

    // ========== When（当）==========
    let result = manager.publish(&events);

    // ========== Then（那么）==========
    // 全部事件都尝试投递，失败汇总返回
    match result {
        Err(PublishError::Multiple { total, failures }) => {
            assert_eq!(total, 2);
            assert_eq!(failures.len(), 1);
        }
        other => panic!("expected Multiple, got {:?}", other),
    }
    assert_eq!(*recorder.received.lock(), vec!["CREATED Owner".to_string(), "UPDATED Person".to_string()]);
}

#[test]
fn scenario_extended_entity_published_under_original_name() {
    init_tracing();

    // ========== Given（给定）==========
    // 只订阅 Owner 的订阅者
    let registry = Arc::new(ListenerRegistry::new());
    let recorder = Arc::new(RecordingListener::default());
    registry.subscribe_to("Owner", recorder.clone());
    let manager = manager_with(ChangeTrackingConfig::default(), registry);

    let mut uow = MemUnitOfWork::begin(manager.clone());
    uow.persist(share(VipOwner { entry: EntityEntry::new(), id: 5, level: Some(3) }));
    uow.persist(share(person(6)));

    // ========== When（当）==========
    let delivered = uow.commit_and_publish().expect("发布应该成功");

    // ========== Then（那么）==========
    // 两个事件都已发布，Owner 订阅者只收到扩展实体的事件
    assert_eq!(delivered, 2);
    assert_eq!(*recorder.received.lock(), vec!["CREATED Owner".to_string()]);
}

#[test]
fn scenario_event_payload_serializes_to_json() {
    init_tracing();

    let manager = default_manager();
    let mut uow = MemUnitOfWork::begin(manager);
    uow.persist(share(Owner { entry: EntityEntry::new(), id: 7, name: text("Bob") }));
    let events = uow.commit().expect("提交应该成功");

    let json: serde_json::Value = serde_json::from_str(&events[0].to_json().unwrap()).unwrap();

    assert_eq!(json["entity_name"], "Owner");
    assert_eq!(json["change_type"], "Created");
    assert_eq!(json["entity_id"]["entity_name"], "Owner");
}

#[test]
fn scenario_config_loaded_from_yaml_file() {
    use std::io::Write;

    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "require_transaction: false\npublish_policy: continue_on_error").unwrap();

    let config = ChangeTrackingConfig::load_from_file(file.path()).unwrap();

    assert!(config.enabled);
    assert!(!config.require_transaction);
    assert_eq!(config.publish_policy, PublishPolicy::ContinueOnError);
}
