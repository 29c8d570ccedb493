use std::collections::{BTreeMap, HashMap};
use std::time::Instant;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::inventory::{AddressStatus, AssignmentRecord, InventoryStore, IpAddressRecord, StoreError};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, TS, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "../bindings/")]
pub enum IntegrityStatus {
    Clean,
    Issues,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, TS, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "../bindings/")]
pub enum Severity {
    Critical,
    High,
    Medium,
}

/// One address value stored as more than one record.
#[derive(Debug, Clone, Serialize, Deserialize, TS, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "../bindings/")]
pub struct DuplicateRecordFinding {
    pub address: String,
    pub severity: Severity,
    pub records: Vec<IpAddressRecord>,
}

/// One address with more than one active assignment.
#[derive(Debug, Clone, Serialize, Deserialize, TS, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "../bindings/")]
pub struct ConflictFinding {
    pub address: String,
    pub severity: Severity,
    pub assignments: Vec<AssignmentRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "../bindings/")]
pub struct MismatchFinding {
    pub ip_address_id: String,
    pub address: String,
    pub severity: Severity,
    pub current_status: AddressStatus,
    pub expected_status: AddressStatus,
    pub active_assignments: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, TS, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "../bindings/")]
pub struct IntegritySummary {
    pub total_addresses: usize,
    pub active_assignments: usize,
    pub duplicate_records: usize,
    pub conflicts: usize,
    pub mismatches: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "../bindings/")]
pub struct IntegrityReport {
    pub status: IntegrityStatus,
    pub summary: IntegritySummary,
    pub duplicate_records: Vec<DuplicateRecordFinding>,
    pub conflicts: Vec<ConflictFinding>,
    pub mismatches: Vec<MismatchFinding>,
    pub generated_at: String,
    pub app_version: String,
    #[ts(type = "number")]
    pub duration_ms: u64,
}

/// Reads every address and active assignment and reports violations. Never
/// writes; the two reads are not a snapshot, so findings are advisory.
pub async fn run_integrity_scan<S: InventoryStore>(store: &S) -> Result<IntegrityReport, StoreError> {
    let start = Instant::now();
    let addresses = store.list_addresses().await?;
    let assignments = store.list_active_assignments().await?;

    let mut report = analyze(&addresses, &assignments);
    report.duration_ms = start.elapsed().as_millis() as u64;

    tracing::info!(
        target: "rignet",
        event = "integrity_scan_complete",
        status = ?report.status,
        addresses = report.summary.total_addresses,
        duplicate_records = report.summary.duplicate_records,
        conflicts = report.summary.conflicts,
        mismatches = report.summary.mismatches,
        duration_ms = report.duration_ms
    );
    Ok(report)
}

/// Pure part of the scan. Findings are ordered by address.
pub fn analyze(addresses: &[IpAddressRecord], assignments: &[AssignmentRecord]) -> IntegrityReport {
    let active: Vec<&AssignmentRecord> = assignments.iter().filter(|a| a.is_active).collect();

    let mut records_by_address: BTreeMap<&str, Vec<&IpAddressRecord>> = BTreeMap::new();
    for record in addresses {
        records_by_address
            .entry(record.address.as_str())
            .or_default()
            .push(record);
    }
    let duplicate_records: Vec<DuplicateRecordFinding> = records_by_address
        .into_iter()
        .filter(|(_, records)| records.len() > 1)
        .map(|(address, records)| DuplicateRecordFinding {
            address: address.to_string(),
            severity: Severity::Critical,
            records: records.into_iter().cloned().collect(),
        })
        .collect();

    let mut active_by_address: BTreeMap<&str, Vec<&AssignmentRecord>> = BTreeMap::new();
    let mut active_by_record: HashMap<&str, usize> = HashMap::new();
    for assignment in active.iter().copied() {
        active_by_address
            .entry(assignment.address.as_str())
            .or_default()
            .push(assignment);
        *active_by_record
            .entry(assignment.ip_address_id.as_str())
            .or_default() += 1;
    }
    let conflicts: Vec<ConflictFinding> = active_by_address
        .into_iter()
        .filter(|(_, held)| held.len() > 1)
        .map(|(address, held)| ConflictFinding {
            address: address.to_string(),
            severity: Severity::High,
            assignments: held.into_iter().cloned().collect(),
        })
        .collect();

    let mut mismatches: Vec<MismatchFinding> = addresses
        .iter()
        .filter_map(|record| {
            let count = active_by_record
                .get(record.id.as_str())
                .copied()
                .unwrap_or(0);
            let assigned = record.status == AddressStatus::Assigned;
            if assigned == (count >= 1) {
                return None;
            }
            Some(MismatchFinding {
                ip_address_id: record.id.clone(),
                address: record.address.clone(),
                severity: Severity::Medium,
                current_status: record.status,
                expected_status: if count >= 1 {
                    AddressStatus::Assigned
                } else {
                    AddressStatus::Available
                },
                active_assignments: count,
            })
        })
        .collect();
    mismatches.sort_by(|a, b| a.address.cmp(&b.address).then(a.ip_address_id.cmp(&b.ip_address_id)));

    let summary = IntegritySummary {
        total_addresses: addresses.len(),
        active_assignments: active.len(),
        duplicate_records: duplicate_records.len(),
        conflicts: conflicts.len(),
        mismatches: mismatches.len(),
    };
    let status = if duplicate_records.is_empty() && conflicts.is_empty() && mismatches.is_empty() {
        IntegrityStatus::Clean
    } else {
        IntegrityStatus::Issues
    };

    IntegrityReport {
        status,
        summary,
        duplicate_records,
        conflicts,
        mismatches,
        generated_at: crate::time::now_rfc3339(),
        app_version: env!("CARGO_PKG_VERSION").to_string(),
        duration_ms: 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::EquipmentRef;

    fn record(id: &str, address: &str, status: AddressStatus) -> IpAddressRecord {
        IpAddressRecord {
            id: id.into(),
            address: address.into(),
            status,
        }
    }

    fn active(id: &str, record_id: &str, address: &str, equipment: &str) -> AssignmentRecord {
        AssignmentRecord {
            id: id.into(),
            ip_address_id: record_id.into(),
            address: address.into(),
            equipment: EquipmentRef {
                id: format!("eq-{equipment}"),
                name: equipment.into(),
                equipment_type: "MINING_EQUIPMENT".into(),
            },
            is_active: true,
            assigned_at: "2026-01-15T09:00:00.000Z".into(),
            assigned_by: None,
        }
    }

    #[test]
    fn clean_inventory_reports_nothing() {
        let addresses = vec![
            record("ip-1", "10.0.0.1", AddressStatus::Assigned),
            record("ip-2", "10.0.0.2", AddressStatus::Available),
            record("ip-3", "10.0.0.3", AddressStatus::Reserved),
        ];
        let assignments = vec![active("as-1", "ip-1", "10.0.0.1", "A")];
        let report = analyze(&addresses, &assignments);
        assert_eq!(report.status, IntegrityStatus::Clean);
        assert_eq!(report.summary.total_addresses, 3);
        assert_eq!(report.summary.active_assignments, 1);
    }

    #[test]
    fn conflicting_assignments_are_grouped_by_address() {
        let addresses = vec![
            record("ip-1", "1.1.1.1", AddressStatus::Assigned),
            record("ip-2", "2.2.2.2", AddressStatus::Assigned),
        ];
        let assignments = vec![
            active("as-1", "ip-1", "1.1.1.1", "A"),
            active("as-2", "ip-1", "1.1.1.1", "B"),
            active("as-3", "ip-2", "2.2.2.2", "C"),
        ];
        let report = analyze(&addresses, &assignments);
        assert_eq!(report.conflicts.len(), 1);
        assert_eq!(report.conflicts[0].address, "1.1.1.1");
        assert_eq!(report.conflicts[0].severity, Severity::High);
        let names: Vec<&str> = report.conflicts[0]
            .assignments
            .iter()
            .map(|a| a.equipment.name.as_str())
            .collect();
        assert_eq!(names, vec!["A", "B"]);
        assert!(report.mismatches.is_empty());
    }

    #[test]
    fn duplicate_records_are_critical() {
        let addresses = vec![
            record("ip-1", "10.0.0.9", AddressStatus::Available),
            record("ip-2", "10.0.0.9", AddressStatus::Available),
            record("ip-3", "10.0.0.8", AddressStatus::Available),
        ];
        let report = analyze(&addresses, &[]);
        assert_eq!(report.status, IntegrityStatus::Issues);
        assert_eq!(report.duplicate_records.len(), 1);
        assert_eq!(report.duplicate_records[0].records.len(), 2);
        assert_eq!(report.duplicate_records[0].severity, Severity::Critical);
    }

    #[test]
    fn status_must_track_active_assignments() {
        let addresses = vec![
            record("ip-1", "10.0.0.1", AddressStatus::Available),
            record("ip-2", "10.0.0.2", AddressStatus::Assigned),
            record("ip-3", "10.0.0.3", AddressStatus::Offline),
            record("ip-4", "10.0.0.4", AddressStatus::Reserved),
        ];
        let assignments = vec![
            active("as-1", "ip-1", "10.0.0.1", "A"),
            active("as-4", "ip-4", "10.0.0.4", "D"),
        ];
        let report = analyze(&addresses, &assignments);

        let found: Vec<(&str, AddressStatus)> = report
            .mismatches
            .iter()
            .map(|m| (m.address.as_str(), m.expected_status))
            .collect();
        assert_eq!(
            found,
            vec![
                ("10.0.0.1", AddressStatus::Assigned),
                ("10.0.0.2", AddressStatus::Available),
                ("10.0.0.4", AddressStatus::Assigned),
            ]
        );
        assert_eq!(report.mismatches[0].current_status, AddressStatus::Available);
    }

    #[test]
    fn inactive_assignments_are_ignored() {
        let addresses = vec![record("ip-1", "10.0.0.1", AddressStatus::Available)];
        let mut released = active("as-1", "ip-1", "10.0.0.1", "A");
        released.is_active = false;
        let report = analyze(&addresses, &[released]);
        assert_eq!(report.status, IntegrityStatus::Clean);
        assert_eq!(report.summary.active_assignments, 0);
    }

    #[test]
    fn report_serializes_wire_names() {
        let report = analyze(&[record("ip-1", "10.0.0.1", AddressStatus::Assigned)], &[]);
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["status"], "issues");
        assert_eq!(value["mismatches"][0]["expectedStatus"], "AVAILABLE");
        assert_eq!(value["mismatches"][0]["severity"], "medium");
        assert_eq!(value["summary"]["duplicateRecords"], 0);
    }
}
