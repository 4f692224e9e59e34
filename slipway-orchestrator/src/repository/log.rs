//! Log Repository
//!
//! Handles all database operations related to deployment logs.

use slipway_core::domain::log::{LogEntry, LogLevel};
use sqlx::PgPool;
use uuid::Uuid;

/// Add log entries for a deployment
pub async fn add_entries(
    pool: &PgPool,
    deployment_id: Uuid,
    entries: &[LogEntry],
) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;

    for entry in entries {
        sqlx::query(
            r#"
            INSERT INTO deployment_logs (deployment_id, timestamp, level, message)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(deployment_id)
        .bind(entry.timestamp)
        .bind(entry.level.as_str())
        .bind(&entry.message)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await
}

/// Get all log entries for a deployment
pub async fn find_by_deployment(
    pool: &PgPool,
    deployment_id: Uuid,
) -> Result<Vec<LogEntry>, sqlx::Error> {
    let rows = sqlx::query_as::<_, LogRow>(
        r#"
        SELECT timestamp, level, message
        FROM deployment_logs
        WHERE deployment_id = $1
        ORDER BY timestamp ASC, id ASC
        "#,
    )
    .bind(deployment_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(|r| r.into()).collect())
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct LogRow {
    timestamp: chrono::DateTime<chrono::Utc>,
    level: String,
    message: String,
}

impl From<LogRow> for LogEntry {
    fn from(row: LogRow) -> Self {
        LogEntry {
            timestamp: row.timestamp,
            level: LogLevel::parse(&row.level),
            message: row.message,
        }
    }
}
