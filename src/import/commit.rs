use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use super::check::DuplicateCheckReport;
use super::duplicates::normalize_ip_address;
use super::group::EquipmentGroup;
use crate::config::ImportOptions;
use crate::inventory::{InventoryStore, NewEquipment, NewSystem, StoreError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "../bindings/")]
pub struct FilterOutcome {
    pub groups: Vec<EquipmentGroup>,
    /// Address entries removed because the store already holds them.
    pub skipped: usize,
    pub warnings: Vec<String>,
}

/// Drops every system whose address already exists according to `report`.
/// Equipment left with no systems is dropped altogether.
pub fn filter_duplicates(groups: &[EquipmentGroup], report: &DuplicateCheckReport) -> FilterOutcome {
    let mut kept = Vec::with_capacity(groups.len());
    let mut skipped = 0;
    let mut warnings = Vec::new();

    for group in groups {
        let mut systems = Vec::with_capacity(group.systems.len());
        for entry in &group.systems {
            let address = normalize_ip_address(&entry.ip_address);
            if report.exists(&address) {
                skipped += 1;
                let owner = report
                    .checks
                    .iter()
                    .find(|c| c.ip_address == address)
                    .and_then(|c| c.existing_equipment.as_ref())
                    .map(|eq| format!(" (assigned to {})", eq.name))
                    .unwrap_or_default();
                warnings.push(format!(
                    "{} {}: {address} already exists in inventory{owner}; skipped",
                    group.machine_id, entry.system
                ));
            } else {
                systems.push(entry.clone());
            }
        }

        if systems.is_empty() {
            warnings.push(format!(
                "{}: every address already exists; equipment not imported",
                group.machine_id
            ));
        } else {
            kept.push(EquipmentGroup {
                machine_id: group.machine_id.clone(),
                systems,
            });
        }
    }

    FilterOutcome {
        groups: kept,
        skipped,
        warnings,
    }
}

/// Per-run totals of the commit step.
#[derive(Debug, Default)]
pub struct CommitOutcome {
    pub imported: usize,
    pub addresses: usize,
    /// Entries dropped because an earlier item of this run already took the address.
    pub skipped: usize,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
    /// Set when a transport failure stopped the run; later items were not sent.
    pub aborted: Option<StoreError>,
}

fn creation_request(group: &EquipmentGroup, options: &ImportOptions) -> NewEquipment {
    NewEquipment {
        machine_id: group.machine_id.clone(),
        name: group.machine_id.clone(),
        equipment_type: options.equipment_type.clone(),
        assigned_by: options.assigned_by.clone(),
        systems: group
            .systems
            .iter()
            .map(|entry| NewSystem {
                system: entry.system.clone(),
                ip_address: normalize_ip_address(&entry.ip_address),
                subnet: entry.subnet.clone(),
                gateway: entry.gateway.clone(),
                comments: entry.comments.clone(),
            })
            .collect(),
    }
}

/// Sends one creation request per group, in order. A rejected item is
/// recorded and the next item proceeds; a transport failure stops the run.
/// An address written for one equipment is dropped from later equipment of
/// the same run, so a copied row costs only that entry.
/// `on_item` is called with (finished, total) after each item.
pub async fn commit_groups<S, F>(
    store: &S,
    groups: &[EquipmentGroup],
    options: &ImportOptions,
    mut on_item: F,
) -> CommitOutcome
where
    S: InventoryStore,
    F: FnMut(usize, usize) + Send,
{
    let mut outcome = CommitOutcome::default();
    let total = groups.len();

    // address -> machine id that claimed it earlier in this run
    let mut claimed: HashMap<String, String> = HashMap::new();

    for (idx, group) in groups.iter().enumerate() {
        let mut request = creation_request(group, options);
        request.systems.retain(|system| match claimed.get(&system.ip_address) {
            Some(owner) => {
                outcome.skipped += 1;
                outcome.warnings.push(format!(
                    "{} {}: {} already imported for {owner} in this run; skipped",
                    group.machine_id, system.system, system.ip_address
                ));
                false
            }
            None => true,
        });

        if request.systems.is_empty() {
            outcome.warnings.push(format!(
                "{}: every address was imported earlier in this run; equipment not imported",
                group.machine_id
            ));
            on_item(idx + 1, total);
            continue;
        }

        match store.create_equipment_with_addresses(&request).await {
            Ok(created) => {
                outcome.imported += 1;
                outcome.addresses += created.addresses;
                for system in &request.systems {
                    claimed
                        .entry(system.ip_address.clone())
                        .or_insert_with(|| group.machine_id.clone());
                }
            }
            Err(err) if err.is_transport() => {
                tracing::error!(
                    target: "rignet",
                    event = "import_commit_aborted",
                    machine_id = %group.machine_id,
                    error = %err
                );
                outcome
                    .errors
                    .push(format!("{}: {err}", group.machine_id));
                outcome.aborted = Some(err);
                break;
            }
            Err(err) => {
                tracing::warn!(
                    target: "rignet",
                    event = "import_item_failed",
                    machine_id = %group.machine_id,
                    error = %err
                );
                outcome
                    .errors
                    .push(format!("{}: {err}", group.machine_id));
            }
        }
        on_item(idx + 1, total);
    }

    outcome
}
