#![allow(clippy::unwrap_used, clippy::expect_used, dead_code)]

use std::collections::VecDeque;
use std::sync::Mutex;

use rignet_lib::inventory::{
    AddressLookup, AssignmentRecord, CreatedEquipment, InventoryStore, IpAddressRecord,
    NewEquipment, SqliteInventory, StoreError,
};
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};

pub async fn temp_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("connect sqlite::memory:");
    sqlx::query("PRAGMA foreign_keys=ON;")
        .execute(&pool)
        .await
        .unwrap();
    rignet_lib::migrate::apply_migrations(&pool)
        .await
        .expect("apply migrations");
    pool
}

pub async fn temp_inventory() -> SqliteInventory {
    SqliteInventory::new(temp_pool().await)
}

pub async fn seed_equipment(pool: &SqlitePool, id: &str, name: &str) {
    sqlx::query(
        "INSERT INTO equipment (id, machine_id, name, equipment_type, created_at) \
         VALUES (?1, ?2, ?2, 'MINING_EQUIPMENT', '2026-01-01T00:00:00.000Z')",
    )
    .bind(id)
    .bind(name)
    .execute(pool)
    .await
    .unwrap();
}

pub async fn seed_address(pool: &SqlitePool, id: &str, address: &str, status: &str) {
    sqlx::query(
        "INSERT INTO ip_addresses (id, address, status, created_at) \
         VALUES (?1, ?2, ?3, '2026-01-01T00:00:00.000Z')",
    )
    .bind(id)
    .bind(address)
    .bind(status)
    .execute(pool)
    .await
    .unwrap();
}

pub async fn seed_assignment(
    pool: &SqlitePool,
    id: &str,
    ip_address_id: &str,
    equipment_id: &str,
    active: bool,
    assigned_at: &str,
) {
    sqlx::query(
        "INSERT INTO ip_assignments (id, ip_address_id, equipment_id, is_active, assigned_at, assigned_by) \
         VALUES (?1, ?2, ?3, ?4, ?5, 'seed')",
    )
    .bind(id)
    .bind(ip_address_id)
    .bind(equipment_id)
    .bind(active as i64)
    .bind(assigned_at)
    .execute(pool)
    .await
    .unwrap();
}

pub async fn count(pool: &SqlitePool, table: &str) -> i64 {
    sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
        .fetch_one(pool)
        .await
        .unwrap()
}

/// Wraps a real store and replaces the outcome of selected create calls.
/// `script[n]` applies to the n-th create; `None` passes through.
pub struct ScriptedStore {
    pub inner: SqliteInventory,
    script: Mutex<VecDeque<Option<StoreError>>>,
    pub lookups_fail: bool,
}

impl ScriptedStore {
    pub fn new(inner: SqliteInventory, script: Vec<Option<StoreError>>) -> Self {
        Self {
            inner,
            script: Mutex::new(script.into()),
            lookups_fail: false,
        }
    }

    pub fn failing_lookups(inner: SqliteInventory) -> Self {
        Self {
            inner,
            script: Mutex::new(VecDeque::new()),
            lookups_fail: true,
        }
    }
}

impl InventoryStore for ScriptedStore {
    async fn find_address(&self, address: &str) -> Result<Option<AddressLookup>, StoreError> {
        if self.lookups_fail {
            return Err(StoreError::Unavailable("connection refused".into()));
        }
        self.inner.find_address(address).await
    }

    async fn list_addresses(&self) -> Result<Vec<IpAddressRecord>, StoreError> {
        self.inner.list_addresses().await
    }

    async fn list_active_assignments(&self) -> Result<Vec<AssignmentRecord>, StoreError> {
        self.inner.list_active_assignments().await
    }

    async fn create_equipment_with_addresses(
        &self,
        spec: &NewEquipment,
    ) -> Result<CreatedEquipment, StoreError> {
        let scripted = self.script.lock().unwrap().pop_front().flatten();
        match scripted {
            Some(err) => Err(err),
            None => self.inner.create_equipment_with_addresses(spec).await,
        }
    }
}
