use std::collections::HashSet;
use std::io::Cursor;

use calamine::{open_workbook_auto_from_rs, Data, Reader};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use ts_rs::TS;

use super::duplicates::{is_valid_ipv4, normalize_ip_address};

/// Column order of the import template. The positional fallback of the row
/// parser relies on this order, so it must not change.
pub const TEMPLATE_HEADERS: [&str; 6] = [
    "MACHINE ID",
    "SYSTEM",
    "IP ADDRESS",
    "SUBNET MASK",
    "GATEWAY",
    "COMMENTS",
];

/// Sheet name given to CSV uploads, which carry a single unnamed table.
pub const CSV_SHEET_NAME: &str = "Sheet1";

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
const OLE_MAGIC: &[u8] = &[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];

#[derive(Debug, Error)]
pub enum WorkbookError {
    #[error("file is not a readable spreadsheet: {0}")]
    InvalidWorkbook(String),
    #[error("sheet '{name}' not found")]
    SheetNotFound { name: String, available: Vec<String> },
    #[error("sheet '{name}' has no data rows ({dropped} row(s) dropped)")]
    EmptySheet { name: String, dropped: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export, export_to = "../bindings/")]
pub enum WorkbookFormat {
    Spreadsheet,
    Csv,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "../bindings/")]
pub struct SheetInfo {
    pub name: String,
    /// Non-empty rows below the header.
    pub row_count: usize,
    pub column_count: usize,
    pub has_data: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "../bindings/")]
pub struct RawRow {
    pub machine_id: String,
    pub system: String,
    pub ip_address: String,
    pub subnet: String,
    pub gateway: String,
    pub comments: String,
    /// 1-based position below the header row.
    pub row_index: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "../bindings/")]
pub enum DropReason {
    MissingMachineId,
    MissingIpAddress,
    MissingMachineIdAndIpAddress,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "../bindings/")]
pub struct DroppedRow {
    pub row_index: usize,
    pub reason: DropReason,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export, export_to = "../bindings/")]
pub enum MappingMode {
    Header,
    Position,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "../bindings/")]
pub struct ColumnMapping {
    pub mode: MappingMode,
    pub machine_id: usize,
    pub ip_address: usize,
    pub system: Option<usize>,
    pub subnet: Option<usize>,
    pub gateway: Option<usize>,
    pub comments: Option<usize>,
}

impl ColumnMapping {
    fn positional() -> Self {
        Self {
            mode: MappingMode::Position,
            machine_id: 0,
            system: Some(1),
            ip_address: 2,
            subnet: Some(3),
            gateway: Some(4),
            comments: Some(5),
        }
    }

    fn from_headers(headers: &[String]) -> Self {
        let find = |aliases: &[&str]| {
            headers
                .iter()
                .position(|h| aliases.contains(&canonical_header(h).as_str()))
        };

        let machine_id = find(&["MACHINE ID", "MACHINEID", "MACHINE", "EQUIPMENT ID"]);
        let ip_address = find(&["IP ADDRESS", "IPADDRESS", "IP ADDR", "IP"]);
        match (machine_id, ip_address) {
            (Some(machine_id), Some(ip_address)) => Self {
                mode: MappingMode::Header,
                machine_id,
                ip_address,
                system: find(&["SYSTEM", "SYSTEM NAME"]),
                subnet: find(&["SUBNET MASK", "SUBNET", "NETMASK", "MASK"]),
                gateway: find(&["GATEWAY", "DEFAULT GATEWAY", "GW"]),
                comments: find(&["COMMENTS", "COMMENT", "NOTES", "REMARKS"]),
            },
            _ => Self::positional(),
        }
    }
}

fn canonical_header(raw: &str) -> String {
    raw.replace(['_', '-'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_ascii_uppercase()
}

/// Output of parsing one sheet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "../bindings/")]
pub struct ParsedSheet {
    pub sheet: String,
    pub rows: Vec<RawRow>,
    /// Rows accepted into `rows`.
    pub total_rows: usize,
    /// Distinct addresses after normalization.
    pub total_ips: usize,
    pub dropped: Vec<DroppedRow>,
    pub column_mapping: ColumnMapping,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone)]
struct Sheet {
    name: String,
    /// Trimmed cell text, header row included.
    cells: Vec<Vec<String>>,
}

impl Sheet {
    fn header_position(&self) -> Option<usize> {
        self.cells.iter().position(|row| !row_is_blank(row))
    }

    fn info(&self) -> SheetInfo {
        let (row_count, column_count) = match self.header_position() {
            Some(header) => {
                let data_rows = self.cells[header + 1..]
                    .iter()
                    .filter(|row| !row_is_blank(row))
                    .count();
                let columns = self.cells[header..]
                    .iter()
                    .map(|row| {
                        row.iter()
                            .rposition(|cell| !cell.is_empty())
                            .map_or(0, |idx| idx + 1)
                    })
                    .max()
                    .unwrap_or(0);
                (data_rows, columns)
            }
            None => (0, 0),
        };
        SheetInfo {
            name: self.name.clone(),
            row_count,
            column_count,
            has_data: row_count > 0,
        }
    }
}

fn row_is_blank(row: &[String]) -> bool {
    row.iter().all(|cell| cell.is_empty())
}

fn cell_string(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.trim().to_string(),
        Data::Float(v) => format!("{v}"),
        Data::Int(v) => format!("{v}"),
        Data::Bool(v) => v.to_string(),
        other => format!("{other:?}"),
    }
}

fn cell_at(row: &[String], idx: Option<usize>) -> String {
    idx.and_then(|i| row.get(i)).cloned().unwrap_or_default()
}

/// An uploaded spreadsheet, fully loaded into memory.
#[derive(Debug, Clone)]
pub struct Workbook {
    format: WorkbookFormat,
    sheets: Vec<Sheet>,
}

impl Workbook {
    /// Opens xlsx/xls/ods containers with calamine; any other UTF-8 payload is
    /// read as CSV so the exported template can be uploaded as-is.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, WorkbookError> {
        if bytes.is_empty() {
            return Err(WorkbookError::InvalidWorkbook("file is empty".to_string()));
        }
        if bytes.starts_with(ZIP_MAGIC) || bytes.starts_with(OLE_MAGIC) {
            Self::from_container(bytes)
        } else {
            Self::from_csv(bytes)
        }
    }

    fn from_container(bytes: &[u8]) -> Result<Self, WorkbookError> {
        let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))
            .map_err(|e| WorkbookError::InvalidWorkbook(e.to_string()))?;

        let names = workbook.sheet_names().to_owned();
        if names.is_empty() {
            return Err(WorkbookError::InvalidWorkbook(
                "workbook has no worksheet".to_string(),
            ));
        }

        let mut sheets = Vec::with_capacity(names.len());
        for name in names {
            let range = workbook
                .worksheet_range(&name)
                .map_err(|e| WorkbookError::InvalidWorkbook(e.to_string()))?;
            let cells = range
                .rows()
                .map(|row| row.iter().map(cell_string).collect())
                .collect();
            sheets.push(Sheet { name, cells });
        }

        Ok(Self {
            format: WorkbookFormat::Spreadsheet,
            sheets,
        })
    }

    fn from_csv(bytes: &[u8]) -> Result<Self, WorkbookError> {
        let text = std::str::from_utf8(bytes).map_err(|_| {
            WorkbookError::InvalidWorkbook("unsupported file format".to_string())
        })?;
        if text.contains('\0') {
            return Err(WorkbookError::InvalidWorkbook(
                "unsupported file format".to_string(),
            ));
        }
        let text = text.trim_start_matches('\u{feff}');

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(text.as_bytes());
        let mut cells = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|e| WorkbookError::InvalidWorkbook(e.to_string()))?;
            cells.push(record.iter().map(|v| v.trim().to_string()).collect());
        }

        Ok(Self {
            format: WorkbookFormat::Csv,
            sheets: vec![Sheet {
                name: CSV_SHEET_NAME.to_string(),
                cells,
            }],
        })
    }

    pub fn format(&self) -> WorkbookFormat {
        self.format
    }

    pub fn sheet_names(&self) -> Vec<String> {
        self.sheets.iter().map(|s| s.name.clone()).collect()
    }

    pub fn catalog(&self) -> Vec<SheetInfo> {
        self.sheets.iter().map(Sheet::info).collect()
    }

    /// The only sheet with data, when there is exactly one.
    pub fn auto_select(&self) -> Option<String> {
        let mut with_data = self.catalog().into_iter().filter(|info| info.has_data);
        match (with_data.next(), with_data.next()) {
            (Some(only), None) => Some(only.name),
            _ => None,
        }
    }

    pub fn parse_sheet(&self, name: &str) -> Result<ParsedSheet, WorkbookError> {
        let sheet = self
            .sheets
            .iter()
            .find(|s| s.name == name)
            .ok_or_else(|| WorkbookError::SheetNotFound {
                name: name.to_string(),
                available: self.sheet_names(),
            })?;

        let header = sheet
            .header_position()
            .ok_or_else(|| WorkbookError::EmptySheet {
                name: name.to_string(),
                dropped: 0,
            })?;
        let mapping = ColumnMapping::from_headers(&sheet.cells[header]);

        let mut rows = Vec::new();
        let mut dropped = Vec::new();
        let mut warnings = Vec::new();
        let mut addresses = HashSet::new();

        if mapping.mode == MappingMode::Position {
            warnings.push(format!(
                "sheet '{name}' has no MACHINE ID / IP ADDRESS headers; columns read in template order"
            ));
        }

        for (offset, cells) in sheet.cells[header + 1..].iter().enumerate() {
            if row_is_blank(cells) {
                continue;
            }
            let row_index = offset + 1;
            let machine_id = cell_at(cells, Some(mapping.machine_id));
            let ip_address = cell_at(cells, Some(mapping.ip_address));

            let reason = match (machine_id.is_empty(), ip_address.is_empty()) {
                (true, true) => Some(DropReason::MissingMachineIdAndIpAddress),
                (true, false) => Some(DropReason::MissingMachineId),
                (false, true) => Some(DropReason::MissingIpAddress),
                (false, false) => None,
            };
            if let Some(reason) = reason {
                dropped.push(DroppedRow { row_index, reason });
                continue;
            }

            if !is_valid_ipv4(&ip_address) {
                warnings.push(format!(
                    "row {row_index} ({machine_id}): '{ip_address}' is not a valid IPv4 address"
                ));
            }
            addresses.insert(normalize_ip_address(&ip_address));

            rows.push(RawRow {
                machine_id,
                system: cell_at(cells, mapping.system),
                ip_address,
                subnet: cell_at(cells, mapping.subnet),
                gateway: cell_at(cells, mapping.gateway),
                comments: cell_at(cells, mapping.comments),
                row_index,
            });
        }

        if rows.is_empty() {
            return Err(WorkbookError::EmptySheet {
                name: name.to_string(),
                dropped: dropped.len(),
            });
        }

        if !dropped.is_empty() {
            tracing::warn!(
                target: "rignet",
                event = "import_rows_dropped",
                sheet = %name,
                dropped = dropped.len()
            );
        }

        Ok(ParsedSheet {
            sheet: name.to_string(),
            total_rows: rows.len(),
            total_ips: addresses.len(),
            rows,
            dropped,
            column_mapping: mapping,
            warnings,
        })
    }
}
