use std::collections::HashMap;

use anyhow::{bail, Context};
use sha2::{Digest, Sha256};
use sqlx::{Executor, SqlitePool};

use crate::time::now_ms;

struct Migration {
    version: &'static str,
    sql: &'static str,
}

static MIGRATIONS: &[Migration] = &[
    Migration {
        version: "202601150900_inventory.sql",
        sql: include_str!("../migrations/202601150900_inventory.sql"),
    },
    Migration {
        version: "202601150910_ip_addresses.sql",
        sql: include_str!("../migrations/202601150910_ip_addresses.sql"),
    },
];

impl Migration {
    /// Statements with `--` comment lines and blank lines removed.
    fn body(&self) -> String {
        strip_comments(self.sql)
    }

    fn checksum(&self) -> String {
        format!("{:x}", Sha256::digest(self.body().as_bytes()))
    }
}

fn strip_comments(raw_sql: &str) -> String {
    raw_sql
        .lines()
        .map(str::trim_end)
        .filter(|line| {
            let t = line.trim_start();
            !t.is_empty() && !t.starts_with("--")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn statement_preview(stmt: &str) -> String {
    let flat = stmt.split_whitespace().collect::<Vec<_>>().join(" ");
    match flat.char_indices().nth(120) {
        Some((cut, _)) => format!("{}…", &flat[..cut]),
        None => flat,
    }
}

async fn applied_checksums(pool: &SqlitePool) -> anyhow::Result<HashMap<String, String>> {
    let rows: Vec<(String, String)> =
        sqlx::query_as("SELECT version, checksum FROM schema_migrations")
            .fetch_all(pool)
            .await
            .context("read schema_migrations")?;
    Ok(rows.into_iter().collect())
}

/// Applies the embedded inventory schema. Each file is recorded in
/// `schema_migrations` with a checksum of its comment-stripped body; a file
/// whose checksum changed after it was applied is refused.
pub async fn apply_migrations(pool: &SqlitePool) -> anyhow::Result<()> {
    pool.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (\
           version    TEXT PRIMARY KEY,\
           applied_at INTEGER NOT NULL,\
           checksum   TEXT NOT NULL\
         )",
    )
    .await
    .context("create schema_migrations")?;

    let applied = applied_checksums(pool).await?;
    let mut newly_applied = 0usize;

    for migration in MIGRATIONS {
        let checksum = migration.checksum();
        match applied.get(migration.version) {
            Some(stored) if *stored == checksum => continue,
            Some(_) => bail!("migration {} edited after application", migration.version),
            None => {}
        }

        let mut tx = pool.begin().await?;
        for stmt in migration.body().split(';').map(str::trim) {
            if stmt.is_empty() {
                continue;
            }
            tracing::debug!(
                target: "rignet",
                event = "migration_stmt",
                version = migration.version,
                sql = %statement_preview(stmt)
            );
            sqlx::query(stmt)
                .execute(&mut *tx)
                .await
                .with_context(|| {
                    format!(
                        "migration {} failed at: {}",
                        migration.version,
                        statement_preview(stmt)
                    )
                })?;
        }

        sqlx::query("INSERT INTO schema_migrations (version, applied_at, checksum) VALUES (?1, ?2, ?3)")
            .bind(migration.version)
            .bind(now_ms())
            .bind(&checksum)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        newly_applied += 1;
        tracing::info!(target: "rignet", event = "migration_applied", version = migration.version);
    }

    if newly_applied == 0 {
        tracing::debug!(target: "rignet", event = "migrations_up_to_date");
    }
    Ok(())
}

/// Latest applied migration, used as the schema marker on integrity reports.
pub async fn current_version(pool: &SqlitePool) -> anyhow::Result<Option<String>> {
    let version = sqlx::query_scalar::<_, String>(
        "SELECT version FROM schema_migrations ORDER BY version DESC LIMIT 1",
    )
    .fetch_optional(pool)
    .await?;
    Ok(version)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn memory_pool() -> SqlitePool {
        SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("connect sqlite::memory:")
    }

    #[tokio::test]
    async fn migrations_are_idempotent() {
        let pool = memory_pool().await;
        apply_migrations(&pool).await.expect("first run");
        apply_migrations(&pool).await.expect("second run");

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM schema_migrations")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count as usize, MIGRATIONS.len());
        assert_eq!(
            current_version(&pool).await.unwrap().as_deref(),
            Some("202601150910_ip_addresses.sql")
        );
    }

    #[tokio::test]
    async fn edited_migration_is_refused() {
        let pool = memory_pool().await;
        apply_migrations(&pool).await.expect("apply");
        sqlx::query("UPDATE schema_migrations SET checksum = 'stale' WHERE version = ?")
            .bind(MIGRATIONS[0].version)
            .execute(&pool)
            .await
            .unwrap();

        let err = apply_migrations(&pool).await.unwrap_err();
        assert!(err.to_string().contains("edited after application"));
    }

    #[test]
    fn comments_are_ignored_by_checksum() {
        assert_eq!(strip_comments("-- note\nSELECT 1;  \n\n"), "SELECT 1;");
    }

    #[test]
    fn long_statements_are_cut_on_char_boundaries() {
        let stmt = format!("INSERT INTO t VALUES ('{}')", "é".repeat(200));
        let preview = statement_preview(&stmt);
        assert!(preview.ends_with('…'));
        assert_eq!(preview.chars().count(), 121);
    }
}
