use std::path::Path;

use anyhow::{Context, Result as AnyResult};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{ConnectOptions, Pool, Sqlite};

pub mod integrity;

/// Opens (creating if needed) the inventory database and applies pending
/// migrations.
pub async fn open_sqlite_pool(db_path: &Path) -> AnyResult<Pool<Sqlite>> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create database directory {}", parent.display()))?;
    }
    tracing::debug!(target: "rignet", event = "db_path", path = %db_path.display());

    let opts = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Full)
        .foreign_keys(true)
        .log_statements(log::LevelFilter::Debug);

    let pool = SqlitePoolOptions::new()
        .max_connections(8)
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                sqlx::query("PRAGMA busy_timeout = 5000")
                    .execute(conn)
                    .await
                    .map(|_| ())
            })
        })
        .connect_with(opts)
        .await
        .with_context(|| format!("open {}", db_path.display()))?;

    log_effective_pragmas(&pool).await;
    crate::migrate::apply_migrations(&pool)
        .await
        .context("apply inventory migrations")?;

    Ok(pool)
}

/// Reads back what SQLite actually applied; a failed probe is logged as
/// `unknown` rather than failing the open.
async fn log_effective_pragmas(pool: &Pool<Sqlite>) {
    let probe: Result<(String, String, i64), sqlx::Error> = sqlx::query_as(
        "SELECT sqlite_version(), \
                (SELECT journal_mode FROM pragma_journal_mode), \
                (SELECT foreign_keys FROM pragma_foreign_keys)",
    )
    .fetch_one(pool)
    .await;

    let (version, journal_mode, foreign_keys) = match probe {
        Ok(values) => values,
        Err(err) => {
            tracing::warn!(target: "rignet", event = "db_pragma_probe_failed", error = %err);
            ("unknown".into(), "unknown".into(), -1)
        }
    };

    tracing::info!(
        target: "rignet",
        event = "db_open",
        sqlite_version = %version,
        journal_mode = %journal_mode,
        foreign_keys
    );

    if !journal_mode.eq_ignore_ascii_case("wal") {
        tracing::warn!(
            target: "rignet",
            event = "db_open_warning",
            journal_mode = %journal_mode,
            "inventory database is not in WAL mode"
        );
    }
}
