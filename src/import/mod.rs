//! Spreadsheet import: read a workbook, fold rows into equipment, flag
//! duplicate addresses, and write the survivors to the inventory store.

pub mod check;
pub mod commit;
pub mod duplicates;
pub mod group;
pub mod pipeline;
pub mod report;
pub mod template;
pub mod workbook;

pub use check::{check_system_duplicates, CheckPass, DuplicateCheck, DuplicateCheckReport};
pub use commit::{commit_groups, filter_duplicates, CommitOutcome, FilterOutcome};
pub use duplicates::{
    detect_in_file_duplicates, is_valid_ipv4, normalize_ip_address, unique_addresses,
    DuplicateInFile, DuplicateOccurrence,
};
pub use group::{group_equipment, EquipmentGroup, MachineIdKey, SystemEntry};
pub use pipeline::{
    ConfirmedImport, ImportError, ImportFailure, ImportPipeline, ImportPreview, ImportProgress,
    ImportResult, ImportStage, OpenedWorkbook, ProgressHandler,
};
pub use report::write_import_report;
pub use template::{template_csv, template_xlsx, TEMPLATE_SHEET};
pub use workbook::{
    ColumnMapping, DropReason, DroppedRow, MappingMode, ParsedSheet, RawRow, SheetInfo, Workbook,
    WorkbookError, WorkbookFormat, CSV_SHEET_NAME, TEMPLATE_HEADERS,
};
