use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use super::workbook::RawRow;

/// How machine ids are compared when folding rows into equipment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "../bindings/")]
pub enum MachineIdKey {
    /// Raw string equality.
    #[default]
    Exact,
    /// ASCII case folded; the first spelling seen becomes the group's id.
    CaseInsensitive,
}

impl MachineIdKey {
    pub fn key(&self, machine_id: &str) -> String {
        match self {
            MachineIdKey::Exact => machine_id.to_string(),
            MachineIdKey::CaseInsensitive => machine_id.to_ascii_uppercase(),
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "exact" => Some(MachineIdKey::Exact),
            "case-insensitive" | "caseinsensitive" | "ci" => Some(MachineIdKey::CaseInsensitive),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "../bindings/")]
pub struct SystemEntry {
    pub system: String,
    /// As written in the file; normalized when checked or committed.
    pub ip_address: String,
    pub subnet: String,
    pub gateway: String,
    pub comments: String,
}

impl From<&RawRow> for SystemEntry {
    fn from(row: &RawRow) -> Self {
        Self {
            system: row.system.clone(),
            ip_address: row.ip_address.clone(),
            subnet: row.subnet.clone(),
            gateway: row.gateway.clone(),
            comments: row.comments.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "../bindings/")]
pub struct EquipmentGroup {
    pub machine_id: String,
    pub systems: Vec<SystemEntry>,
}

/// Folds rows into one group per machine id, in first-seen order. Systems keep
/// file order and are never de-duplicated here.
pub fn group_equipment(rows: &[RawRow], key: MachineIdKey) -> Vec<EquipmentGroup> {
    let mut groups: Vec<EquipmentGroup> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for row in rows {
        let slot = *index.entry(key.key(&row.machine_id)).or_insert_with(|| {
            groups.push(EquipmentGroup {
                machine_id: row.machine_id.clone(),
                systems: Vec::new(),
            });
            groups.len() - 1
        });
        groups[slot].systems.push(SystemEntry::from(row));
    }

    groups
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(machine: &str, system: &str, ip: &str) -> RawRow {
        RawRow {
            machine_id: machine.into(),
            system: system.into(),
            ip_address: ip.into(),
            subnet: String::new(),
            gateway: String::new(),
            comments: String::new(),
            row_index: 0,
        }
    }

    #[test]
    fn groups_in_first_seen_order() {
        let rows = vec![
            row("FS03", "PLC", "10.31.141.216"),
            row("FS02", "PLC", "10.31.145.211"),
            row("FS03", "OBC", "10.31.141.217"),
            row("FS03", "OBC", "10.31.141.218"),
        ];
        let groups = group_equipment(&rows, MachineIdKey::Exact);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].machine_id, "FS03");
        let systems: Vec<&str> = groups[0].systems.iter().map(|s| s.system.as_str()).collect();
        assert_eq!(systems, vec!["PLC", "OBC", "OBC"]);
        assert_eq!(groups[1].systems.len(), 1);
    }

    #[test]
    fn exact_key_keeps_case_variants_apart() {
        let rows = vec![row("fs03", "PLC", "1.1.1.1"), row("FS03", "PLC", "1.1.1.2")];
        assert_eq!(group_equipment(&rows, MachineIdKey::Exact).len(), 2);

        let folded = group_equipment(&rows, MachineIdKey::CaseInsensitive);
        assert_eq!(folded.len(), 1);
        assert_eq!(folded[0].machine_id, "fs03");
        assert_eq!(folded[0].systems.len(), 2);
    }

    #[test]
    fn key_parses_from_config_text() {
        assert_eq!(MachineIdKey::parse("Exact"), Some(MachineIdKey::Exact));
        assert_eq!(
            MachineIdKey::parse("case-insensitive"),
            Some(MachineIdKey::CaseInsensitive)
        );
        assert_eq!(MachineIdKey::parse("fuzzy"), None);
    }
}
