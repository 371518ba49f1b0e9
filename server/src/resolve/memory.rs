//! In-memory identifier registry
//!
//! Serves single-node deployments and tests. Ids are handed out
//! monotonically; lookups are lock-free reads on DashMaps.

use std::sync::atomic::{AtomicI32, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;

use super::IdentifierResolver;

#[derive(Default)]
pub struct MemoryRegistry {
    next_id: AtomicI32,
    services: DashMap<String, i32>,
    service_names: DashMap<i32, String>,
    instances: DashMap<i32, i32>,
    operations: DashMap<(i32, String), i32>,
    operation_names: DashMap<i32, String>,
    addresses: DashMap<String, i32>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self {
            next_id: AtomicI32::new(1),
            ..Default::default()
        }
    }

    fn allocate(&self) -> i32 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    pub fn register_service(&self, name: &str) -> i32 {
        if let Some(id) = self.services.get(name) {
            return *id;
        }
        let id = self.allocate();
        self.services.insert(name.to_string(), id);
        self.service_names.insert(id, name.to_string());
        id
    }

    pub fn register_instance(&self, service_id: i32) -> i32 {
        let id = self.allocate();
        self.instances.insert(id, service_id);
        id
    }

    pub fn register_operation(&self, service_id: i32, name: &str) -> i32 {
        let key = (service_id, name.to_string());
        if let Some(id) = self.operations.get(&key) {
            return *id;
        }
        let id = self.allocate();
        self.operations.insert(key, id);
        self.operation_names.insert(id, name.to_string());
        id
    }

    pub fn register_address(&self, address: &str) -> i32 {
        if let Some(id) = self.addresses.get(address) {
            return *id;
        }
        let id = self.allocate();
        self.addresses.insert(address.to_string(), id);
        id
    }
}

#[async_trait]
impl IdentifierResolver for MemoryRegistry {
    async fn operation_id(&self, service_id: i32, operation_name: &str) -> Option<i32> {
        self.operations
            .get(&(service_id, operation_name.to_string()))
            .map(|id| *id)
    }

    async fn operation_name(&self, operation_id: i32) -> Option<String> {
        self.operation_names.get(&operation_id).map(|n| n.clone())
    }

    async fn address_id(&self, address: &str) -> Option<i32> {
        self.addresses.get(address).map(|id| *id)
    }

    async fn service_name(&self, service_id: i32) -> Option<String> {
        self.service_names.get(&service_id).map(|n| n.clone())
    }

    async fn service_of_instance(&self, instance_id: i32) -> Option<i32> {
        self.instances.get(&instance_id).map(|id| *id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_registration_is_idempotent() {
        let reg = MemoryRegistry::new();
        let a = reg.register_service("orders");
        let b = reg.register_service("orders");
        assert_eq!(a, b);

        let op_a = reg.register_operation(a, "/list");
        let op_b = reg.register_operation(a, "/list");
        assert_eq!(op_a, op_b);
    }

    #[tokio::test]
    async fn test_lookups() {
        let reg = MemoryRegistry::new();
        let svc = reg.register_service("orders");
        let inst = reg.register_instance(svc);
        let op = reg.register_operation(svc, "/list");
        let addr = reg.register_address("db:5432");

        assert_eq!(reg.service_name(svc).await.as_deref(), Some("orders"));
        assert_eq!(reg.service_of_instance(inst).await, Some(svc));
        assert_eq!(reg.operation_id(svc, "/list").await, Some(op));
        assert_eq!(reg.operation_name(op).await.as_deref(), Some("/list"));
        assert_eq!(reg.address_id("db:5432").await, Some(addr));
        assert_eq!(reg.address_id("unknown").await, None);
    }
}
