//! The persisted inventory as seen by the import and integrity code: address
//! records, active assignments, and the one write the importer performs.

use std::fmt;
use std::future::Future;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use ts_rs::TS;

use crate::AppError;

mod sqlite;

pub use sqlite::SqliteInventory;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "UPPERCASE")]
#[ts(export, export_to = "../bindings/")]
pub enum AddressStatus {
    Available,
    Assigned,
    Reserved,
    Offline,
}

impl AddressStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AddressStatus::Available => "AVAILABLE",
            AddressStatus::Assigned => "ASSIGNED",
            AddressStatus::Reserved => "RESERVED",
            AddressStatus::Offline => "OFFLINE",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "AVAILABLE" => Some(AddressStatus::Available),
            "ASSIGNED" => Some(AddressStatus::Assigned),
            "RESERVED" => Some(AddressStatus::Reserved),
            "OFFLINE" => Some(AddressStatus::Offline),
            _ => None,
        }
    }
}

impl fmt::Display for AddressStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "../bindings/")]
pub struct IpAddressRecord {
    pub id: String,
    pub address: String,
    pub status: AddressStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "../bindings/")]
pub struct EquipmentRef {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub equipment_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "../bindings/")]
pub struct AssignmentRecord {
    pub id: String,
    pub ip_address_id: String,
    /// Address value of the referenced record, joined in for grouping.
    pub address: String,
    pub equipment: EquipmentRef,
    pub is_active: bool,
    pub assigned_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub assigned_by: Option<String>,
}

/// Result of looking up one address: the record plus the equipment currently
/// holding it, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressLookup {
    pub record: IpAddressRecord,
    pub owner: Option<EquipmentRef>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEquipment {
    pub machine_id: String,
    pub name: String,
    pub equipment_type: String,
    pub assigned_by: Option<String>,
    pub systems: Vec<NewSystem>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSystem {
    pub system: String,
    /// Already normalized dotted-quad.
    pub ip_address: String,
    pub subnet: String,
    pub gateway: String,
    pub comments: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedEquipment {
    pub id: String,
    pub addresses: usize,
}

#[derive(Debug, Error)]
pub enum StoreError {
    /// The store refused this one request; sibling requests are unaffected.
    #[error("store rejected request: {reason}")]
    Rejected { reason: String },
    /// The store could not be reached or stopped responding.
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("invalid record in store: {0}")]
    InvalidRecord(String),
}

impl StoreError {
    pub fn rejected(reason: impl Into<String>) -> Self {
        StoreError::Rejected {
            reason: reason.into(),
        }
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }

    /// Connection-level sqlx failures are transport errors; everything else is
    /// a rejection of the statement that raised it.
    pub fn from_sqlx(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed
            | sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::Protocol(_) => StoreError::Unavailable(err.to_string()),
            other => StoreError::Rejected {
                reason: other.to_string(),
            },
        }
    }
}

impl From<StoreError> for AppError {
    fn from(error: StoreError) -> Self {
        let code = match &error {
            StoreError::Rejected { .. } => "STORE/REJECTED",
            StoreError::Unavailable(_) => "STORE/UNAVAILABLE",
            StoreError::InvalidRecord(_) => "STORE/INVALID_RECORD",
        };
        AppError::new(code, error.to_string())
    }
}

/// CRUD surface the import pipeline and integrity scanner consume.
///
/// Implementations must return `Send` futures so a pipeline can be driven from
/// a multi-threaded runtime.
pub trait InventoryStore: Send + Sync {
    /// Looks up a normalized address.
    fn find_address(
        &self,
        address: &str,
    ) -> impl Future<Output = Result<Option<AddressLookup>, StoreError>> + Send;

    fn list_addresses(
        &self,
    ) -> impl Future<Output = Result<Vec<IpAddressRecord>, StoreError>> + Send;

    fn list_active_assignments(
        &self,
    ) -> impl Future<Output = Result<Vec<AssignmentRecord>, StoreError>> + Send;

    /// Creates one equipment with all of its addresses, or nothing.
    fn create_equipment_with_addresses(
        &self,
        spec: &NewEquipment,
    ) -> impl Future<Output = Result<CreatedEquipment, StoreError>> + Send;
}
