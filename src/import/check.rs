use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::inventory::{EquipmentRef, InventoryStore, StoreError};

/// The two duplicate-check passes. Only the pre-commit pass drives filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "../bindings/")]
pub enum CheckPass {
    Preview,
    PreCommit,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "../bindings/")]
pub struct DuplicateCheck {
    pub ip_address: String,
    pub exists_in_system: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub existing_equipment: Option<EquipmentRef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "../bindings/")]
pub struct DuplicateCheckReport {
    pub pass: CheckPass,
    pub checks: Vec<DuplicateCheck>,
}

impl DuplicateCheckReport {
    pub fn existing(&self) -> impl Iterator<Item = &DuplicateCheck> {
        self.checks.iter().filter(|c| c.exists_in_system)
    }

    pub fn exists(&self, normalized: &str) -> bool {
        self.checks
            .iter()
            .any(|c| c.exists_in_system && c.ip_address == normalized)
    }
}

/// Looks up every address in the store. Read-only; the first store error
/// aborts the pass.
pub async fn check_system_duplicates<S: InventoryStore>(
    store: &S,
    addresses: &[String],
    pass: CheckPass,
) -> Result<DuplicateCheckReport, StoreError> {
    let mut checks = Vec::with_capacity(addresses.len());
    for address in addresses {
        let check = match store.find_address(address).await? {
            Some(lookup) => DuplicateCheck {
                ip_address: address.clone(),
                exists_in_system: true,
                existing_equipment: lookup.owner,
            },
            None => DuplicateCheck {
                ip_address: address.clone(),
                exists_in_system: false,
                existing_equipment: None,
            },
        };
        checks.push(check);
    }

    let existing = checks.iter().filter(|c| c.exists_in_system).count();
    tracing::info!(
        target: "rignet",
        event = "import_duplicate_check",
        pass = ?pass,
        checked = checks.len(),
        existing
    );

    Ok(DuplicateCheckReport { pass, checks })
}
