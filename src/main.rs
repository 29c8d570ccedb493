use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use rignet_lib::db::integrity::{run_integrity_scan, IntegrityReport, IntegrityStatus};
use rignet_lib::db::open_sqlite_pool;
use rignet_lib::import::{
    template_csv, template_xlsx, write_import_report, ImportFailure, ImportPipeline,
    ImportPreview, ImportProgress, ImportResult, MachineIdKey, ProgressHandler, Workbook,
};
use rignet_lib::inventory::SqliteInventory;
use rignet_lib::{flush_file_logs, init_file_logging, init_logging, AppConfig};

const DEFAULT_XLSX_TEMPLATE: &str = "rignet-import-template.xlsx";

#[derive(Debug, Parser)]
#[command(
    name = "rignet",
    about = "Bulk import and integrity checks for the mining equipment IP inventory",
    version
)]
struct Cli {
    /// Inventory database path. Overrides RIGNET_DB.
    #[arg(long, global = true)]
    db: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// List the sheets of a workbook with their row and column counts.
    Sheets {
        file: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Preview an import, and commit it with --yes.
    Import {
        file: PathBuf,
        /// Sheet to import. Required when more than one sheet has data.
        #[arg(long)]
        sheet: Option<String>,
        /// Commit after the preview. Without it nothing is written.
        #[arg(long)]
        yes: bool,
        #[arg(long)]
        json: bool,
        /// Write a JSON run report under the reports directory.
        #[arg(long)]
        report: bool,
        /// Equipment type for created equipment. Overrides RIGNET_EQUIPMENT_TYPE.
        #[arg(long)]
        equipment_type: Option<String>,
        /// Operator recorded on new assignments. Overrides RIGNET_OPERATOR.
        #[arg(long)]
        assigned_by: Option<String>,
        /// Treat machine ids that differ only in case as one equipment.
        #[arg(long)]
        ignore_id_case: bool,
    },
    /// Export the import template.
    Template {
        #[arg(long)]
        xlsx: bool,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Scan the inventory for duplicate records, conflicts and status drift.
    Integrity {
        #[arg(long)]
        json: bool,
    },
    /// Database maintenance.
    #[command(subcommand)]
    Db(DbCommand),
}

#[derive(Debug, Subcommand)]
enum DbCommand {
    /// Create the database if needed and apply pending migrations.
    Migrate,
}

struct ImportArgs {
    file: PathBuf,
    sheet: Option<String>,
    yes: bool,
    json: bool,
    report: bool,
}

fn main() {
    init_logging();

    let cli = Cli::parse();
    let code = match handle_cli(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:#}");
            1
        }
    };
    flush_file_logs();
    process::exit(code);
}

fn handle_cli(cli: Cli) -> Result<i32> {
    let mut config = AppConfig::from_env().context("resolve configuration")?;
    if let Some(db) = cli.db {
        config.db_path = db;
    }
    if let Err(err) = init_file_logging(&config.logs_dir) {
        tracing::warn!(target: "rignet", event = "file_logging_unavailable", error = %err);
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("start async runtime")?;

    match cli.command {
        Commands::Sheets { file, json } => handle_sheets(&file, json),
        Commands::Template { xlsx, out } => handle_template(xlsx, out),
        Commands::Import {
            file,
            sheet,
            yes,
            json,
            report,
            equipment_type,
            assigned_by,
            ignore_id_case,
        } => {
            if let Some(kind) = equipment_type {
                config.default_equipment_type = kind;
            }
            if assigned_by.is_some() {
                config.assigned_by = assigned_by;
            }
            if ignore_id_case {
                config.machine_id_key = MachineIdKey::CaseInsensitive;
            }
            let args = ImportArgs {
                file,
                sheet,
                yes,
                json,
                report,
            };
            runtime.block_on(handle_import(&config, args))
        }
        Commands::Integrity { json } => runtime.block_on(handle_integrity(&config, json)),
        Commands::Db(DbCommand::Migrate) => runtime.block_on(handle_migrate(&config)),
    }
}

fn handle_sheets(file: &Path, json: bool) -> Result<i32> {
    let bytes = fs::read(file).with_context(|| format!("read {}", file.display()))?;
    let workbook = Workbook::from_bytes(&bytes)?;
    let catalog = workbook.catalog();

    if json {
        let serialized = serde_json::to_string_pretty(&catalog).context("serialize sheet catalog")?;
        println!("{serialized}");
        return Ok(0);
    }

    println!("{:<24} {:>6} {:>8}  Data", "Sheet", "Rows", "Columns");
    for info in &catalog {
        let data = if info.has_data { "yes" } else { "no" };
        println!(
            "{:<24} {:>6} {:>8}  {data}",
            info.name, info.row_count, info.column_count
        );
    }
    if let Some(name) = workbook.auto_select() {
        println!("\nOnly '{name}' has data; it will be imported by default.");
    }
    Ok(0)
}

fn handle_template(xlsx: bool, out: Option<PathBuf>) -> Result<i32> {
    let bytes = if xlsx { template_xlsx()? } else { template_csv()? };
    let out = match (out, xlsx) {
        (Some(path), _) => Some(path),
        (None, true) => Some(PathBuf::from(DEFAULT_XLSX_TEMPLATE)),
        (None, false) => None,
    };

    match out {
        Some(path) => {
            fs::write(&path, &bytes).with_context(|| format!("write {}", path.display()))?;
            eprintln!("Template written to {}", path.display());
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&bytes).context("write template to stdout")?;
        }
    }
    Ok(0)
}

async fn handle_import(config: &AppConfig, args: ImportArgs) -> Result<i32> {
    let bytes = fs::read(&args.file).with_context(|| format!("read {}", args.file.display()))?;
    let pool = open_sqlite_pool(&config.db_path).await?;
    let store = SqliteInventory::new(pool.clone());

    let quiet = args.json;
    let observer: ProgressHandler = Arc::new(move |update: ImportProgress| {
        if !quiet {
            eprintln!("[{:>3}%] {:<9} {}", update.progress, update.stage, update.message);
        }
    });
    let pipeline = ImportPipeline::new(&store, config.import_options()).with_observer(observer);

    let preview = match stage_preview(&pipeline, &bytes, args.sheet.as_deref()).await {
        Ok(preview) => preview,
        Err(failure) => {
            pool.close().await;
            return print_failure(&failure, args.json);
        }
    };

    if !args.yes {
        print_preview(&preview, args.json)?;
        if !args.json {
            println!("\nNothing was written. Re-run with --yes to import.");
        }
        pool.close().await;
        return Ok(0);
    }

    let outcome = pipeline.commit(preview.clone().confirm()).await;
    pool.close().await;

    if args.report {
        let path = write_import_report(&config.reports_dir, &args.file, &preview, &outcome)?;
        eprintln!("Report written to {}", path.display());
    }

    match outcome {
        Ok(result) => {
            print_result(&result, args.json)?;
            Ok(if result.success { 0 } else { 1 })
        }
        Err(failure) => print_failure(&failure, args.json),
    }
}

async fn stage_preview(
    pipeline: &ImportPipeline<'_, SqliteInventory>,
    bytes: &[u8],
    sheet: Option<&str>,
) -> Result<ImportPreview, ImportFailure> {
    let opened = pipeline.open(bytes)?;
    let parsed = pipeline.parse(&opened, sheet)?;
    pipeline.preview(parsed).await
}

fn print_preview(preview: &ImportPreview, json: bool) -> Result<()> {
    if json {
        let serialized = serde_json::to_string_pretty(preview).context("serialize import preview")?;
        println!("{serialized}");
        return Ok(());
    }

    let parsed = &preview.parsed;
    println!("Sheet        : {}", parsed.sheet);
    println!("Rows         : {} ({} dropped)", parsed.total_rows, parsed.dropped.len());
    println!("Addresses    : {}", parsed.total_ips);
    println!(
        "Equipment    : {} ({} systems)",
        preview.groups.len(),
        preview.total_systems()
    );

    if !preview.in_file_duplicates.is_empty() {
        println!("\nRepeated in file:");
        for duplicate in &preview.in_file_duplicates {
            for occurrence in &duplicate.occurrences {
                println!(
                    "  {:<16} row {:>4}  {} {}",
                    duplicate.ip_address, occurrence.row, occurrence.machine_id, occurrence.system
                );
            }
        }
    }

    let existing: Vec<_> = preview.preview_checks.existing().collect();
    if !existing.is_empty() {
        println!("\nAlready in inventory (will be skipped):");
        for check in existing {
            let owner = check
                .existing_equipment
                .as_ref()
                .map(|eq| eq.name.as_str())
                .unwrap_or("-");
            println!("  {:<16} {owner}", check.ip_address);
        }
    }

    for warning in &parsed.warnings {
        println!("warning: {warning}");
    }
    Ok(())
}

fn print_result(result: &ImportResult, json: bool) -> Result<()> {
    if json {
        let serialized = serde_json::to_string_pretty(result).context("serialize import result")?;
        println!("{serialized}");
        return Ok(());
    }

    println!(
        "Imported {} equipment, skipped {} address(es).",
        result.imported, result.skipped
    );
    for warning in &result.warnings {
        println!("warning: {warning}");
    }
    for error in &result.errors {
        println!("error: {error}");
    }
    Ok(())
}

fn print_failure(failure: &ImportFailure, json: bool) -> Result<i32> {
    if json {
        let serialized = serde_json::to_string_pretty(failure).context("serialize import failure")?;
        println!("{serialized}");
    } else {
        eprintln!(
            "Import failed while {}: {} ({})",
            failure.failed_at,
            failure.error.message(),
            failure.error.code()
        );
        if let Some(partial) = &failure.partial {
            eprintln!(
                "{} equipment were imported before the failure.",
                partial.imported
            );
        }
    }
    Ok(1)
}

async fn handle_integrity(config: &AppConfig, json: bool) -> Result<i32> {
    let pool = open_sqlite_pool(&config.db_path).await?;
    let store = SqliteInventory::new(pool.clone());
    let report = run_integrity_scan(&store).await;
    pool.close().await;
    let report = report.context("run integrity scan")?;

    if json {
        let serialized = serde_json::to_string_pretty(&report).context("serialize integrity report")?;
        println!("{serialized}");
    } else {
        print_integrity_table(&report);
    }

    Ok(match report.status {
        IntegrityStatus::Clean => 0,
        IntegrityStatus::Issues => 1,
    })
}

fn print_integrity_table(report: &IntegrityReport) {
    let summary = &report.summary;
    println!("Inventory integrity report");
    println!(
        "Status       : {}",
        match report.status {
            IntegrityStatus::Clean => "clean",
            IntegrityStatus::Issues => "issues",
        }
    );
    println!("Addresses    : {}", summary.total_addresses);
    println!("Active       : {}", summary.active_assignments);
    println!("Generated at : {}", report.generated_at);

    if !report.duplicate_records.is_empty() {
        println!("\nDuplicate address records (critical):");
        for finding in &report.duplicate_records {
            let ids: Vec<&str> = finding.records.iter().map(|r| r.id.as_str()).collect();
            println!("  {:<16} {}", finding.address, ids.join(", "));
        }
    }
    if !report.conflicts.is_empty() {
        println!("\nConflicting active assignments (high):");
        for finding in &report.conflicts {
            for assignment in &finding.assignments {
                println!(
                    "  {:<16} {:<16} {}  {}",
                    finding.address,
                    assignment.equipment.name,
                    assignment.assigned_at,
                    assignment.assigned_by.as_deref().unwrap_or("-")
                );
            }
        }
    }
    if !report.mismatches.is_empty() {
        println!("\nStatus mismatches (medium):");
        for finding in &report.mismatches {
            println!(
                "  {:<16} {} -> {} ({} active)",
                finding.address,
                finding.current_status,
                finding.expected_status,
                finding.active_assignments
            );
        }
    }
}

async fn handle_migrate(config: &AppConfig) -> Result<i32> {
    let pool = open_sqlite_pool(&config.db_path).await?;
    let version = rignet_lib::migrate::current_version(&pool).await?;
    pool.close().await;
    println!(
        "Database {} at migration {}",
        config.db_path.display(),
        version.as_deref().unwrap_or("none")
    );
    Ok(0)
}
