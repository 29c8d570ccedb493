use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use super::workbook::RawRow;

/// Canonical form of an address: trimmed, each dot-separated segment that
/// parses as an integer re-rendered without leading zeros. Segments that are
/// not integers are kept (trimmed) so malformed input still compares stably.
pub fn normalize_ip_address(raw: &str) -> String {
    raw.trim()
        .split('.')
        .map(|segment| {
            let segment = segment.trim();
            match segment.parse::<u64>() {
                Ok(value) => value.to_string(),
                Err(_) => segment.to_string(),
            }
        })
        .collect::<Vec<_>>()
        .join(".")
}

pub fn is_valid_ipv4(raw: &str) -> bool {
    let segments: Vec<&str> = raw.trim().split('.').collect();
    segments.len() == 4
        && segments.iter().all(|segment| {
            let segment = segment.trim();
            !segment.is_empty()
                && segment.len() <= 3
                && segment.bytes().all(|b| b.is_ascii_digit())
                && segment.parse::<u16>().is_ok_and(|v| v <= 255)
        })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "../bindings/")]
pub struct DuplicateOccurrence {
    pub row: usize,
    pub machine_id: String,
    pub system: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "../bindings/")]
pub struct DuplicateInFile {
    /// Normalized address.
    pub ip_address: String,
    /// Every occurrence after the first, in row order.
    pub occurrences: Vec<DuplicateOccurrence>,
}

/// Addresses that appear on more than one row of the file, across equipment.
/// Results are ordered by the row of each address's first occurrence.
pub fn detect_in_file_duplicates(rows: &[RawRow]) -> Vec<DuplicateInFile> {
    let mut order: Vec<String> = Vec::new();
    let mut by_address: HashMap<String, Vec<&RawRow>> = HashMap::new();

    for row in rows {
        let key = normalize_ip_address(&row.ip_address);
        by_address
            .entry(key.clone())
            .or_insert_with(|| {
                order.push(key);
                Vec::new()
            })
            .push(row);
    }

    order
        .into_iter()
        .filter_map(|address| {
            let bearers = by_address.remove(&address)?;
            if bearers.len() < 2 {
                return None;
            }
            let occurrences = bearers
                .into_iter()
                .skip(1)
                .map(|row| DuplicateOccurrence {
                    row: row.row_index,
                    machine_id: row.machine_id.clone(),
                    system: row.system.clone(),
                })
                .collect();
            Some(DuplicateInFile {
                ip_address: address,
                occurrences,
            })
        })
        .collect()
}

/// Distinct normalized addresses in first-seen order.
pub fn unique_addresses(rows: &[RawRow]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    rows.iter()
        .map(|row| normalize_ip_address(&row.ip_address))
        .filter(|address| seen.insert(address.clone()))
        .collect()
}
