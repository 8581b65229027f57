pub mod attribute_changes;
pub mod change_event;
pub mod manager;
pub mod persistence_support;
pub mod publisher;
pub mod transaction;
