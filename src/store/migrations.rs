//! Schema versioning for the libSQL state store.
//!
//! Steps are applied in order, each inside its own transaction together with
//! the row that records it in `schema_version`.

use libsql::Connection;
use tracing::{debug, info};

use crate::error::DatabaseError;

/// `(version, label, sql)`. Append only.
const STEPS: &[(i64, &str, &str)] = &[(
    1,
    "kv_state",
    "CREATE TABLE IF NOT EXISTS kv_state (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );",
)];

/// Bring the schema up to the newest step.
pub async fn run_migrations(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            label TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        (),
    )
    .await
    .map_err(|e| DatabaseError::Migration(format!("schema_version table: {e}")))?;

    let applied = schema_version(conn).await?;
    let pending = STEPS.iter().filter(|(version, _, _)| *version > applied);

    for &(version, label, sql) in pending {
        info!(version, label, "Applying schema step");
        apply_step(conn, version, label, sql)
            .await
            .map_err(|e| DatabaseError::Migration(format!("step {version} ({label}): {e}")))?;
    }

    debug!(version = schema_version(conn).await?, "Schema up to date");
    Ok(())
}

async fn apply_step(
    conn: &Connection,
    version: i64,
    label: &str,
    sql: &str,
) -> Result<(), libsql::Error> {
    let tx = conn.transaction().await?;
    tx.execute_batch(sql).await?;
    tx.execute(
        "INSERT INTO schema_version (version, label) VALUES (?1, ?2)",
        libsql::params![version, label],
    )
    .await?;
    tx.commit().await
}

/// Newest applied step, 0 for a fresh database.
pub async fn schema_version(conn: &Connection) -> Result<i64, DatabaseError> {
    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM schema_version", ())
        .await
        .map_err(|e| DatabaseError::Migration(format!("read schema version: {e}")))?;

    let Some(row) = rows
        .next()
        .await
        .map_err(|e| DatabaseError::Migration(format!("read schema version: {e}")))?
    else {
        return Ok(0);
    };
    row.get::<i64>(0)
        .map_err(|e| DatabaseError::Migration(format!("decode schema version: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn memory_conn() -> Connection {
        libsql::Builder::new_local(":memory:")
            .build()
            .await
            .unwrap()
            .connect()
            .unwrap()
    }

    fn newest() -> i64 {
        STEPS.iter().map(|(v, _, _)| *v).max().unwrap_or(0)
    }

    #[tokio::test]
    async fn fresh_database_reaches_newest_version() {
        let conn = memory_conn().await;
        run_migrations(&conn).await.unwrap();
        assert_eq!(schema_version(&conn).await.unwrap(), newest());

        conn.execute(
            "INSERT INTO kv_state (key, value, updated_at) VALUES ('k', '1', 'now')",
            (),
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn rerun_applies_nothing() {
        let conn = memory_conn().await;
        run_migrations(&conn).await.unwrap();
        run_migrations(&conn).await.unwrap();

        let mut rows = conn
            .query("SELECT COUNT(*) FROM schema_version", ())
            .await
            .unwrap();
        let count: i64 = rows.next().await.unwrap().unwrap().get(0).unwrap();
        assert_eq!(count, STEPS.len() as i64);
    }

    #[tokio::test]
    async fn steps_are_strictly_increasing() {
        assert!(STEPS.windows(2).all(|w| w[0].0 < w[1].0));
        assert!(STEPS.iter().all(|(v, _, _)| *v > 0));
    }
}
