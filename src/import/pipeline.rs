//! Staged import orchestration.
//!
//! Each stage is a method that consumes the previous stage's output and
//! returns its own; progress is reported to an optional observer instead of
//! being kept in shared state. Committing requires a [`ConfirmedImport`],
//! which only [`ImportPreview::confirm`] can produce.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use ts_rs::TS;

use super::check::{check_system_duplicates, CheckPass, DuplicateCheck, DuplicateCheckReport};
use super::commit::{commit_groups, filter_duplicates};
use super::duplicates::{detect_in_file_duplicates, unique_addresses, DuplicateInFile};
use super::group::{group_equipment, EquipmentGroup};
use super::workbook::{DropReason, ParsedSheet, SheetInfo, Workbook, WorkbookError};
use crate::config::ImportOptions;
use crate::inventory::{InventoryStore, StoreError};
use crate::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export, export_to = "../bindings/")]
pub enum ImportStage {
    Idle,
    Reading,
    Parsing,
    Grouping,
    Checking,
    Importing,
    Complete,
    Error,
}

impl ImportStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImportStage::Idle => "idle",
            ImportStage::Reading => "reading",
            ImportStage::Parsing => "parsing",
            ImportStage::Grouping => "grouping",
            ImportStage::Checking => "checking",
            ImportStage::Importing => "importing",
            ImportStage::Complete => "complete",
            ImportStage::Error => "error",
        }
    }
}

impl fmt::Display for ImportStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Snapshot of a run's status. `progress` only drives an indicator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "../bindings/")]
pub struct ImportProgress {
    pub stage: ImportStage,
    pub message: String,
    pub progress: u8,
}

pub type ProgressHandler = Arc<dyn Fn(ImportProgress) + Send + Sync + 'static>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "../bindings/")]
pub struct ImportResult {
    pub success: bool,
    pub imported: usize,
    pub skipped: usize,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    /// Pre-commit checks that found the address already stored.
    pub duplicates: Vec<DuplicateCheck>,
}

#[derive(Debug, Error)]
pub enum ImportError {
    #[error(transparent)]
    Workbook(#[from] WorkbookError),
    #[error("choose a sheet to import; candidates: {}", candidates.join(", "))]
    SheetSelectionRequired { candidates: Vec<String> },
    #[error("no importable data: {0}")]
    NoImportableData(String),
    #[error("inventory store failed while {stage}: {source}")]
    Store {
        stage: ImportStage,
        #[source]
        source: StoreError,
    },
}

impl From<ImportError> for AppError {
    fn from(error: ImportError) -> Self {
        let message = error.to_string();
        match error {
            ImportError::Workbook(WorkbookError::InvalidWorkbook(_)) => {
                AppError::new("IMPORT/INVALID_WORKBOOK", message)
            }
            ImportError::Workbook(WorkbookError::EmptySheet { name, dropped }) => {
                AppError::new("IMPORT/EMPTY_SHEET", message)
                    .with_context("sheet", name)
                    .with_context("dropped_rows", dropped.to_string())
            }
            ImportError::Workbook(WorkbookError::SheetNotFound { name, available }) => {
                AppError::new("IMPORT/SHEET_NOT_FOUND", message)
                    .with_context("sheet", name)
                    .with_context("available", available.join(", "))
            }
            ImportError::SheetSelectionRequired { candidates } => {
                AppError::new("IMPORT/SHEET_SELECTION_REQUIRED", message)
                    .with_context("candidates", candidates.join(", "))
            }
            ImportError::NoImportableData(_) => AppError::new("IMPORT/NO_IMPORTABLE_DATA", message),
            ImportError::Store { stage, source } => {
                let code = if source.is_transport() {
                    "IMPORT/STORE_UNAVAILABLE"
                } else {
                    "IMPORT/STORE_ERROR"
                };
                AppError::new(code, message)
                    .with_context("stage", stage.as_str())
                    .with_cause(source)
            }
        }
    }
}

/// Terminal failure of one attempt. `stage` is always `error`; `failed_at`
/// names the stage that was running.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "../bindings/")]
pub struct ImportFailure {
    pub stage: ImportStage,
    pub failed_at: ImportStage,
    pub error: AppError,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub partial: Option<ImportResult>,
}

impl fmt::Display for ImportFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "import failed while {}: {}", self.failed_at, self.error)
    }
}

impl std::error::Error for ImportFailure {}

/// Output of the reading stage.
#[derive(Debug, Clone)]
pub struct OpenedWorkbook {
    pub workbook: Workbook,
    pub catalog: Vec<SheetInfo>,
    /// Set when exactly one sheet has data.
    pub auto_selected: Option<String>,
}

/// Everything the user sees before confirming. Holds the preview-pass
/// duplicate check, which is informational only.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "../bindings/")]
pub struct ImportPreview {
    pub parsed: ParsedSheet,
    pub groups: Vec<EquipmentGroup>,
    pub in_file_duplicates: Vec<DuplicateInFile>,
    pub preview_checks: DuplicateCheckReport,
}

impl ImportPreview {
    pub fn total_systems(&self) -> usize {
        self.groups.iter().map(|g| g.systems.len()).sum()
    }

    /// Records the user's go-ahead.
    pub fn confirm(self) -> ConfirmedImport {
        ConfirmedImport { preview: self }
    }
}

/// A preview the user has approved for commit.
#[derive(Debug, Clone)]
pub struct ConfirmedImport {
    preview: ImportPreview,
}

impl ConfirmedImport {
    pub fn preview(&self) -> &ImportPreview {
        &self.preview
    }
}

pub struct ImportPipeline<'a, S: InventoryStore> {
    store: &'a S,
    options: ImportOptions,
    observer: Option<ProgressHandler>,
}

impl<'a, S: InventoryStore> ImportPipeline<'a, S> {
    pub fn new(store: &'a S, options: ImportOptions) -> Self {
        Self {
            store,
            options,
            observer: None,
        }
    }

    pub fn with_observer(mut self, observer: ProgressHandler) -> Self {
        self.observer = Some(observer);
        self
    }

    fn emit(&self, stage: ImportStage, progress: u8, message: impl Into<String>) {
        let update = ImportProgress {
            stage,
            message: message.into(),
            progress,
        };
        tracing::info!(
            target: "rignet",
            event = "import_stage",
            stage = %stage,
            progress,
            message = %update.message
        );
        if let Some(callback) = &self.observer {
            callback(update);
        }
    }

    fn fail(
        &self,
        failed_at: ImportStage,
        error: ImportError,
        partial: Option<ImportResult>,
    ) -> ImportFailure {
        let error = AppError::from(error);
        tracing::error!(
            target: "rignet",
            event = "import_failed",
            stage = %failed_at,
            code = %error.code(),
            error = %error.message()
        );
        self.emit(ImportStage::Error, 100, error.message().to_string());
        ImportFailure {
            stage: ImportStage::Error,
            failed_at,
            error,
            partial,
        }
    }

    pub fn open(&self, bytes: &[u8]) -> Result<OpenedWorkbook, ImportFailure> {
        self.emit(ImportStage::Reading, 10, "reading workbook");
        let workbook = Workbook::from_bytes(bytes)
            .map_err(|e| self.fail(ImportStage::Reading, e.into(), None))?;
        let catalog = workbook.catalog();
        let auto_selected = workbook.auto_select();
        Ok(OpenedWorkbook {
            workbook,
            catalog,
            auto_selected,
        })
    }

    /// Parses `sheet`, or the auto-selected sheet when `None`.
    pub fn parse(
        &self,
        opened: &OpenedWorkbook,
        sheet: Option<&str>,
    ) -> Result<ParsedSheet, ImportFailure> {
        let name = match sheet.or(opened.auto_selected.as_deref()) {
            Some(name) => name.to_string(),
            None => {
                let candidates = opened
                    .catalog
                    .iter()
                    .filter(|info| info.has_data)
                    .map(|info| info.name.clone())
                    .collect::<Vec<_>>();
                let error: ImportError = if candidates.is_empty() {
                    WorkbookError::EmptySheet {
                        name: opened
                            .catalog
                            .first()
                            .map(|info| info.name.clone())
                            .unwrap_or_default(),
                        dropped: 0,
                    }
                    .into()
                } else {
                    ImportError::SheetSelectionRequired { candidates }
                };
                return Err(self.fail(ImportStage::Reading, error, None));
            }
        };

        self.emit(ImportStage::Parsing, 30, format!("parsing sheet {name}"));
        opened
            .workbook
            .parse_sheet(&name)
            .map_err(|e| self.fail(ImportStage::Parsing, e.into(), None))
    }

    /// Groups rows, flags in-file duplicates and runs the preview check.
    pub async fn preview(&self, parsed: ParsedSheet) -> Result<ImportPreview, ImportFailure> {
        self.emit(
            ImportStage::Grouping,
            50,
            format!("grouping {} rows", parsed.total_rows),
        );
        let groups = group_equipment(&parsed.rows, self.options.machine_id_key);
        let in_file_duplicates = detect_in_file_duplicates(&parsed.rows);

        self.emit(
            ImportStage::Checking,
            70,
            format!("checking {} addresses against inventory", parsed.total_ips),
        );
        let addresses = unique_addresses(&parsed.rows);
        let preview_checks = check_system_duplicates(self.store, &addresses, CheckPass::Preview)
            .await
            .map_err(|source| {
                self.fail(
                    ImportStage::Checking,
                    ImportError::Store {
                        stage: ImportStage::Checking,
                        source,
                    },
                    None,
                )
            })?;

        Ok(ImportPreview {
            parsed,
            groups,
            in_file_duplicates,
            preview_checks,
        })
    }

    /// Re-checks every address, filters, and writes what is left.
    pub async fn commit(&self, confirmed: ConfirmedImport) -> Result<ImportResult, ImportFailure> {
        let preview = confirmed.preview;
        self.emit(ImportStage::Importing, 80, "re-checking addresses before import");

        let addresses = unique_addresses(&preview.parsed.rows);
        let authoritative = check_system_duplicates(self.store, &addresses, CheckPass::PreCommit)
            .await
            .map_err(|source| {
                self.fail(
                    ImportStage::Importing,
                    ImportError::Store {
                        stage: ImportStage::Importing,
                        source,
                    },
                    None,
                )
            })?;

        let filtered = filter_duplicates(&preview.groups, &authoritative);
        let mut warnings = preview_warnings(&preview);
        warnings.extend(filtered.warnings.iter().cloned());
        let duplicates: Vec<DuplicateCheck> = authoritative.existing().cloned().collect();

        if filtered.groups.is_empty() {
            let reason = ImportError::NoImportableData(
                "every address in the file already exists in inventory".to_string(),
            );
            tracing::warn!(target: "rignet", event = "import_nothing_to_commit", skipped = filtered.skipped);
            let result = ImportResult {
                success: false,
                imported: 0,
                skipped: filtered.skipped,
                errors: vec![reason.to_string()],
                warnings,
                duplicates,
            };
            self.emit(ImportStage::Complete, 100, "nothing imported");
            return Ok(result);
        }

        let total = filtered.groups.len();
        self.emit(ImportStage::Importing, 85, format!("importing {total} equipment"));
        let outcome = commit_groups(self.store, &filtered.groups, &self.options, |done, total| {
            let progress = 85 + (done * 14 / total.max(1)) as u8;
            self.emit(
                ImportStage::Importing,
                progress,
                format!("imported {done} of {total}"),
            );
        })
        .await;

        warnings.extend(outcome.warnings);
        let result = ImportResult {
            success: outcome.imported > 0,
            imported: outcome.imported,
            skipped: filtered.skipped + outcome.skipped,
            errors: outcome.errors,
            warnings,
            duplicates,
        };

        if let Some(source) = outcome.aborted {
            return Err(self.fail(
                ImportStage::Importing,
                ImportError::Store {
                    stage: ImportStage::Importing,
                    source,
                },
                Some(result),
            ));
        }

        tracing::info!(
            target: "rignet",
            event = "import_complete",
            imported = result.imported,
            addresses = outcome.addresses,
            skipped = result.skipped,
            failed = result.errors.len()
        );
        self.emit(
            ImportStage::Complete,
            100,
            format!("imported {} of {total} equipment", result.imported),
        );
        Ok(result)
    }
}

fn preview_warnings(preview: &ImportPreview) -> Vec<String> {
    let mut warnings = preview.parsed.warnings.clone();
    for dropped in &preview.parsed.dropped {
        let what = match dropped.reason {
            DropReason::MissingMachineId => "machine id",
            DropReason::MissingIpAddress => "IP address",
            DropReason::MissingMachineIdAndIpAddress => "machine id and IP address",
        };
        warnings.push(format!("row {}: missing {what}; row ignored", dropped.row_index));
    }
    for duplicate in &preview.in_file_duplicates {
        let rows = duplicate
            .occurrences
            .iter()
            .map(|o| format!("{} ({} {})", o.row, o.machine_id, o.system))
            .collect::<Vec<_>>()
            .join(", ");
        warnings.push(format!(
            "{} repeated in file at row(s) {rows}",
            duplicate.ip_address
        ));
    }
    warnings
}
