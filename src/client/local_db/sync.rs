//! # Offline Queue Rows and Sync Metadata
//!
//! Durable storage of queued operations. Rows are read back in insertion
//! order (`seq`), which is the replay order.

use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use uuid::Uuid;

use super::entities::parse_timestamp;
use super::{LocalDatabase, Result, StoreError};
use crate::client::offline::queue::{OperationStatus, QueuedOperation};

impl LocalDatabase {
    /// Persist a new queued operation
    pub async fn insert_operation(&self, operation: &QueuedOperation) -> Result<()> {
        sqlx::query(
            "INSERT INTO offline_queue
                (id, kind, action, trip_id, target_id, payload, status, retry_count,
                 created_at, last_attempt, error_message)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(operation.id.to_string())
        .bind(operation.kind.as_str())
        .bind(operation.action.as_str())
        .bind(&operation.trip_id)
        .bind(&operation.target_id)
        .bind(serde_json::to_string(&operation.payload)?)
        .bind(operation.status.as_str())
        .bind(operation.retry_count as i64)
        .bind(operation.created_at.to_rfc3339())
        .bind(operation.last_attempt.map(|t| t.to_rfc3339()))
        .bind(&operation.last_error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Operations with one of the given statuses, oldest first
    ///
    /// Rows this version cannot decode are marked `failed` and skipped, so
    /// one bad row does not block the rest of the queue.
    pub async fn load_operations(&self, statuses: &[OperationStatus]) -> Result<Vec<QueuedOperation>> {
        if statuses.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; statuses.len()].join(", ");
        let sql = format!(
            "SELECT seq, id, kind, action, trip_id, target_id, payload, status, retry_count,
                    created_at, last_attempt, error_message
             FROM offline_queue
             WHERE status IN ({})
             ORDER BY seq ASC",
            placeholders
        );
        let mut query = sqlx::query(&sql);
        for status in statuses {
            query = query.bind(status.as_str());
        }
        let rows = query.fetch_all(&self.pool).await?;

        let mut operations = Vec::with_capacity(rows.len());
        for row in rows {
            match row_to_operation(&row) {
                Ok(operation) => operations.push(operation),
                Err(StoreError::Database(e)) => return Err(e.into()),
                Err(e) => {
                    let seq: i64 = row.try_get("seq")?;
                    tracing::warn!(seq, error = %e, "Marking undecodable queued operation failed");
                    self.quarantine_operation(seq, &e.to_string()).await?;
                }
            }
        }
        Ok(operations)
    }

    /// Park an undecodable row as failed so it stays visible in the stats
    async fn quarantine_operation(&self, seq: i64, error: &str) -> Result<()> {
        sqlx::query("UPDATE offline_queue SET status = ?, error_message = ? WHERE seq = ?")
            .bind(OperationStatus::Failed.as_str())
            .bind(error)
            .bind(seq)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// A single queued operation
    pub async fn get_operation(&self, id: &Uuid) -> Result<Option<QueuedOperation>> {
        let row = sqlx::query(
            "SELECT id, kind, action, trip_id, target_id, payload, status, retry_count,
                    created_at, last_attempt, error_message
             FROM offline_queue
             WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_operation).transpose()
    }

    /// Change the status of an operation
    ///
    /// `count_attempt` bumps the retry counter and stamps `last_attempt`.
    pub async fn update_operation_status(
        &self,
        id: &Uuid,
        status: OperationStatus,
        error_message: Option<&str>,
        count_attempt: bool,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE offline_queue SET
                status = ?,
                error_message = COALESCE(?, error_message),
                retry_count = retry_count + ?,
                last_attempt = CASE WHEN ? THEN ? ELSE last_attempt END
             WHERE id = ?",
        )
        .bind(status.as_str())
        .bind(error_message)
        .bind(if count_attempt { 1i64 } else { 0 })
        .bind(count_attempt)
        .bind(Utc::now().to_rfc3339())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Remove an operation; returns whether it existed
    pub async fn delete_operation(&self, id: &Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM offline_queue WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Count operations with a status
    pub async fn count_operations(&self, status: OperationStatus) -> Result<u64> {
        let count: i64 = sqlx::query("SELECT COUNT(*) AS n FROM offline_queue WHERE status = ?")
            .bind(status.as_str())
            .fetch_one(&self.pool)
            .await?
            .try_get("n")?;
        Ok(count as u64)
    }

    /// Delete failed operations created before `cutoff`
    pub async fn delete_failed_operations_before(&self, cutoff: chrono::DateTime<Utc>) -> Result<u64> {
        let failed = self.load_operations(&[OperationStatus::Failed]).await?;
        let mut removed = 0;
        for operation in failed.iter().filter(|op| op.created_at < cutoff) {
            if self.delete_operation(&operation.id).await? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Set sync metadata
    pub async fn set_sync_metadata(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            "INSERT OR REPLACE INTO sync_metadata (key, value, updated_at)
             VALUES (?, ?, ?)",
        )
        .bind(key)
        .bind(value)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Get sync metadata
    pub async fn get_sync_metadata(&self, key: &str) -> Result<Option<String>> {
        let row = sqlx::query("SELECT value FROM sync_metadata WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(row.try_get("value")?)),
            None => Ok(None),
        }
    }

    /// Get last sync timestamp
    pub async fn get_last_sync_time(&self) -> Result<Option<String>> {
        self.get_sync_metadata("last_sync_time").await
    }

    /// Set last sync timestamp
    pub async fn set_last_sync_time(&self) -> Result<()> {
        self.set_sync_metadata("last_sync_time", &Utc::now().to_rfc3339())
            .await
    }
}

fn row_to_operation(row: &SqliteRow) -> Result<QueuedOperation> {
    let id: String = row.try_get("id")?;
    let kind: String = row.try_get("kind")?;
    let action: String = row.try_get("action")?;
    let status: String = row.try_get("status")?;
    let payload: String = row.try_get("payload")?;
    let retry_count: i64 = row.try_get("retry_count")?;
    let created_at: String = row.try_get("created_at")?;
    let last_attempt: Option<String> = row.try_get("last_attempt")?;

    Ok(QueuedOperation {
        id: Uuid::parse_str(&id).map_err(|e| StoreError::Corrupt(e.to_string()))?,
        kind: kind.parse().map_err(StoreError::Corrupt)?,
        action: action.parse().map_err(StoreError::Corrupt)?,
        trip_id: row.try_get("trip_id")?,
        target_id: row.try_get("target_id")?,
        payload: serde_json::from_str(&payload)?,
        status: status.parse().map_err(StoreError::Corrupt)?,
        retry_count: retry_count.max(0) as u32,
        created_at: parse_timestamp(&created_at)?,
        last_attempt: last_attempt.as_deref().map(parse_timestamp).transpose()?,
        last_error: row.try_get("error_message")?,
    })
}
