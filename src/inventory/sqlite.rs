use std::collections::HashMap;

use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::{
    AddressLookup, AddressStatus, AssignmentRecord, CreatedEquipment, EquipmentRef,
    InventoryStore, IpAddressRecord, NewEquipment, StoreError,
};
use crate::time::now_rfc3339;

/// `InventoryStore` backed by the local SQLite inventory.
#[derive(Debug, Clone)]
pub struct SqliteInventory {
    pool: SqlitePool,
}

impl SqliteInventory {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn address_record(row: &SqliteRow) -> Result<IpAddressRecord, StoreError> {
    let id: String = row.try_get("id").map_err(StoreError::from_sqlx)?;
    let address: String = row.try_get("address").map_err(StoreError::from_sqlx)?;
    let raw_status: String = row.try_get("status").map_err(StoreError::from_sqlx)?;
    let status = AddressStatus::parse(&raw_status).ok_or_else(|| {
        StoreError::InvalidRecord(format!("address {id} has unknown status '{raw_status}'"))
    })?;
    Ok(IpAddressRecord {
        id,
        address,
        status,
    })
}

fn equipment_ref(row: &SqliteRow) -> Result<Option<EquipmentRef>, StoreError> {
    let id: Option<String> = row.try_get("equipment_id").map_err(StoreError::from_sqlx)?;
    let Some(id) = id else {
        return Ok(None);
    };
    Ok(Some(EquipmentRef {
        id,
        name: row
            .try_get::<Option<String>, _>("equipment_name")
            .map_err(StoreError::from_sqlx)?
            .unwrap_or_default(),
        equipment_type: row
            .try_get::<Option<String>, _>("equipment_type")
            .map_err(StoreError::from_sqlx)?
            .unwrap_or_default(),
    }))
}

impl InventoryStore for SqliteInventory {
    async fn find_address(&self, address: &str) -> Result<Option<AddressLookup>, StoreError> {
        // When an address is stored more than once, prefer the row that is
        // actually held by equipment so the caller sees the owner.
        let row = sqlx::query(
            "SELECT a.id, a.address, a.status, \
                    e.id AS equipment_id, e.name AS equipment_name, \
                    e.equipment_type AS equipment_type \
             FROM ip_addresses a \
             LEFT JOIN ip_assignments s ON s.ip_address_id = a.id AND s.is_active = 1 \
             LEFT JOIN equipment e ON e.id = s.equipment_id \
             WHERE a.address = ?1 \
             ORDER BY (e.id IS NULL), s.assigned_at, a.created_at \
             LIMIT 1",
        )
        .bind(address)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)?;

        match row {
            Some(row) => Ok(Some(AddressLookup {
                record: address_record(&row)?,
                owner: equipment_ref(&row)?,
            })),
            None => Ok(None),
        }
    }

    async fn list_addresses(&self) -> Result<Vec<IpAddressRecord>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, address, status FROM ip_addresses ORDER BY address, created_at, id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)?;
        rows.iter().map(address_record).collect()
    }

    async fn list_active_assignments(&self) -> Result<Vec<AssignmentRecord>, StoreError> {
        let rows = sqlx::query(
            "SELECT s.id, s.ip_address_id, a.address, s.assigned_at, s.assigned_by, \
                    e.id AS equipment_id, e.name AS equipment_name, \
                    e.equipment_type AS equipment_type \
             FROM ip_assignments s \
             JOIN ip_addresses a ON a.id = s.ip_address_id \
             JOIN equipment e ON e.id = s.equipment_id \
             WHERE s.is_active = 1 \
             ORDER BY a.address, s.assigned_at, s.id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)?;

        let mut assignments = Vec::with_capacity(rows.len());
        for row in &rows {
            let equipment = equipment_ref(row)?.ok_or_else(|| {
                StoreError::InvalidRecord("active assignment without equipment".to_string())
            })?;
            assignments.push(AssignmentRecord {
                id: row.try_get("id").map_err(StoreError::from_sqlx)?,
                ip_address_id: row.try_get("ip_address_id").map_err(StoreError::from_sqlx)?,
                address: row.try_get("address").map_err(StoreError::from_sqlx)?,
                equipment,
                is_active: true,
                assigned_at: row.try_get("assigned_at").map_err(StoreError::from_sqlx)?,
                assigned_by: row.try_get("assigned_by").map_err(StoreError::from_sqlx)?,
            });
        }
        Ok(assignments)
    }

    async fn create_equipment_with_addresses(
        &self,
        spec: &NewEquipment,
    ) -> Result<CreatedEquipment, StoreError> {
        let mut tx = self.pool.begin().await.map_err(StoreError::from_sqlx)?;

        // Re-checked inside the write transaction: another operator may have
        // claimed an address after the importer's own duplicate check.
        for system in &spec.systems {
            let existing: Option<String> =
                sqlx::query_scalar("SELECT id FROM ip_addresses WHERE address = ?1 LIMIT 1")
                    .bind(&system.ip_address)
                    .fetch_optional(&mut *tx)
                    .await
                    .map_err(StoreError::from_sqlx)?;
            if existing.is_some() {
                return Err(StoreError::rejected(format!(
                    "address {} already exists in inventory",
                    system.ip_address
                )));
            }
        }

        let equipment_id = Uuid::now_v7().to_string();
        let now = now_rfc3339();
        sqlx::query(
            "INSERT INTO equipment (id, machine_id, name, equipment_type, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(&equipment_id)
        .bind(&spec.machine_id)
        .bind(&spec.name)
        .bind(&spec.equipment_type)
        .bind(&now)
        .execute(&mut *tx)
        .await
        .map_err(StoreError::from_sqlx)?;

        let mut created: HashMap<&str, String> = HashMap::new();
        for (position, system) in spec.systems.iter().enumerate() {
            sqlx::query(
                "INSERT INTO equipment_systems \
                   (id, equipment_id, position, system, ip_address, subnet, gateway, comments) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            )
            .bind(Uuid::now_v7().to_string())
            .bind(&equipment_id)
            .bind(position as i64)
            .bind(&system.system)
            .bind(&system.ip_address)
            .bind(&system.subnet)
            .bind(&system.gateway)
            .bind(&system.comments)
            .execute(&mut *tx)
            .await
            .map_err(StoreError::from_sqlx)?;

            if created.contains_key(system.ip_address.as_str()) {
                continue;
            }

            let address_id = Uuid::now_v7().to_string();
            sqlx::query(
                "INSERT INTO ip_addresses (id, address, status, subnet, gateway, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )
            .bind(&address_id)
            .bind(&system.ip_address)
            .bind(AddressStatus::Assigned.as_str())
            .bind(&system.subnet)
            .bind(&system.gateway)
            .bind(&now)
            .execute(&mut *tx)
            .await
            .map_err(StoreError::from_sqlx)?;

            sqlx::query(
                "INSERT INTO ip_assignments \
                   (id, ip_address_id, equipment_id, is_active, assigned_at, assigned_by) \
                 VALUES (?1, ?2, ?3, 1, ?4, ?5)",
            )
            .bind(Uuid::now_v7().to_string())
            .bind(&address_id)
            .bind(&equipment_id)
            .bind(&now)
            .bind(spec.assigned_by.as_deref())
            .execute(&mut *tx)
            .await
            .map_err(StoreError::from_sqlx)?;

            created.insert(system.ip_address.as_str(), address_id);
        }

        tx.commit().await.map_err(StoreError::from_sqlx)?;
        tracing::info!(
            target: "rignet",
            event = "equipment_created",
            equipment_id = %equipment_id,
            machine_id = %spec.machine_id,
            addresses = created.len()
        );

        Ok(CreatedEquipment {
            id: equipment_id,
            addresses: created.len(),
        })
    }
}
