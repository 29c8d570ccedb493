use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;

use super::duplicates::DuplicateInFile;
use super::pipeline::{ImportFailure, ImportPreview, ImportResult};
use super::workbook::{ColumnMapping, DroppedRow};
use crate::AppError;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ParseSummary<'a> {
    sheet: &'a str,
    total_rows: usize,
    total_ips: usize,
    equipment: usize,
    systems: usize,
    column_mapping: &'a ColumnMapping,
    dropped: &'a [DroppedRow],
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ImportReportFile<'a> {
    generated_at: String,
    app_version: &'static str,
    source: String,
    parse: ParseSummary<'a>,
    in_file_duplicates: &'a [DuplicateInFile],
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<&'a ImportResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a AppError>,
}

/// Writes `import-YYYYmmdd-HHMMSS-mmm.json` under `reports_dir` and returns its
/// path. A name already on disk gets a `-N` suffix; existing reports are never
/// overwritten.
pub fn write_import_report(
    reports_dir: &Path,
    source: &Path,
    preview: &ImportPreview,
    outcome: &Result<ImportResult, ImportFailure>,
) -> Result<PathBuf> {
    fs::create_dir_all(reports_dir)
        .with_context(|| format!("create reports directory {}", reports_dir.display()))?;

    let stamp = Utc::now().format("%Y%m%d-%H%M%S-%3f").to_string();
    let (path, mut file) = create_unique(reports_dir, &stamp)?;
    let (result, error) = match outcome {
        Ok(result) => (Some(result), None),
        Err(failure) => (failure.partial.as_ref(), Some(&failure.error)),
    };
    let payload = ImportReportFile {
        generated_at: crate::time::now_rfc3339(),
        app_version: env!("CARGO_PKG_VERSION"),
        source: source.display().to_string(),
        parse: ParseSummary {
            sheet: &preview.parsed.sheet,
            total_rows: preview.parsed.total_rows,
            total_ips: preview.parsed.total_ips,
            equipment: preview.groups.len(),
            systems: preview.total_systems(),
            column_mapping: &preview.parsed.column_mapping,
            dropped: &preview.parsed.dropped,
        },
        in_file_duplicates: &preview.in_file_duplicates,
        result,
        error,
    };
    let json = serde_json::to_string_pretty(&payload).context("serialize import report")?;
    file.write_all(json.as_bytes())
        .with_context(|| format!("write import report {}", path.display()))?;
    tracing::info!(target: "rignet", event = "import_report_written", path = %path.display());
    Ok(path)
}

fn create_unique(dir: &Path, stamp: &str) -> Result<(PathBuf, File)> {
    let mut attempt = 0u32;
    loop {
        let name = match attempt {
            0 => format!("import-{stamp}.json"),
            n => format!("import-{stamp}-{n}.json"),
        };
        let path = dir.join(name);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => return Ok((path, file)),
            Err(err) if err.kind() == ErrorKind::AlreadyExists => attempt += 1,
            Err(err) => {
                return Err(err).with_context(|| format!("create import report {}", path.display()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::import::{
        detect_in_file_duplicates, group_equipment, CheckPass, DuplicateCheckReport, ImportStage,
        MachineIdKey, Workbook,
    };

    fn preview() -> ImportPreview {
        let csv = "MACHINE ID,SYSTEM,IP ADDRESS\nFS03,PLC,10.31.141.216\nFS03,OBC,10.31.141.216\nFS02,,\n";
        let parsed = Workbook::from_bytes(csv.as_bytes())
            .unwrap()
            .parse_sheet("Sheet1")
            .unwrap();
        ImportPreview {
            groups: group_equipment(&parsed.rows, MachineIdKey::Exact),
            in_file_duplicates: detect_in_file_duplicates(&parsed.rows),
            preview_checks: DuplicateCheckReport {
                pass: CheckPass::Preview,
                checks: Vec::new(),
            },
            parsed,
        }
    }

    fn read(path: &Path) -> serde_json::Value {
        serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
    }

    #[test]
    fn successful_run_records_parse_summary_and_result() {
        let dir = tempfile::tempdir().unwrap();
        let reports = dir.path().join("reports");
        let outcome = Ok(ImportResult {
            success: true,
            imported: 1,
            skipped: 0,
            errors: Vec::new(),
            warnings: Vec::new(),
            duplicates: Vec::new(),
        });

        let path =
            write_import_report(&reports, Path::new("rigs.csv"), &preview(), &outcome).unwrap();
        assert!(path.starts_with(&reports));
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("import-") && name.ends_with(".json"));

        let report = read(&path);
        assert_eq!(report["source"], "rigs.csv");
        assert_eq!(report["parse"]["sheet"], "Sheet1");
        assert_eq!(report["parse"]["totalRows"], 2);
        assert_eq!(report["parse"]["equipment"], 1);
        assert_eq!(report["parse"]["systems"], 2);
        assert_eq!(report["parse"]["dropped"].as_array().unwrap().len(), 1);
        assert_eq!(report["inFileDuplicates"][0]["ipAddress"], "10.31.141.216");
        assert_eq!(report["result"]["imported"], 1);
        assert!(report.get("error").is_none());
    }

    #[test]
    fn reports_in_the_same_millisecond_get_distinct_names() {
        let dir = tempfile::tempdir().unwrap();
        let (first, _) = create_unique(dir.path(), "20260115-090000-000").unwrap();
        let (second, _) = create_unique(dir.path(), "20260115-090000-000").unwrap();
        assert_ne!(first, second);
        assert!(second.ends_with("import-20260115-090000-000-1.json"));

        let outcome = Ok(ImportResult {
            success: true,
            imported: 1,
            skipped: 0,
            errors: Vec::new(),
            warnings: Vec::new(),
            duplicates: Vec::new(),
        });
        let paths: Vec<PathBuf> = (0..3)
            .map(|_| {
                write_import_report(dir.path(), Path::new("rigs.csv"), &preview(), &outcome)
                    .unwrap()
            })
            .collect();
        assert_ne!(paths[0], paths[1]);
        assert_ne!(paths[1], paths[2]);
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 5);
    }

    #[test]
    fn failed_run_keeps_error_and_partial_result() {
        let dir = tempfile::tempdir().unwrap();
        let outcome = Err(ImportFailure {
            stage: ImportStage::Error,
            failed_at: ImportStage::Importing,
            error: AppError::new("IMPORT/STORE_UNAVAILABLE", "database closed"),
            partial: None,
        });

        let path =
            write_import_report(dir.path(), Path::new("rigs.csv"), &preview(), &outcome).unwrap();
        let report = read(&path);
        assert_eq!(report["error"]["code"], "IMPORT/STORE_UNAVAILABLE");
        assert!(report.get("result").is_none());
    }
}
