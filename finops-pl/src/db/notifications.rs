//! User-visible notification records
//!
//! Append-only: one record per processed pattern per validation pass, never
//! deduplicated against earlier passes.

use anyhow::Result;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

/// Notification row
#[derive(Debug, Clone)]
pub struct Notification {
    pub guid: Uuid,
    pub tenant_id: String,
    pub pattern_id: Uuid,
    /// Terminal outcome for this pass ("validated" or "rejected")
    pub outcome: String,
    pub message: String,
    pub created_at: Option<String>,
}

impl Notification {
    pub fn new(tenant_id: &str, pattern_id: Uuid, outcome: &str, message: String) -> Self {
        Self {
            guid: Uuid::new_v4(),
            tenant_id: tenant_id.to_string(),
            pattern_id,
            outcome: outcome.to_string(),
            message,
            created_at: None,
        }
    }
}

/// Append a notification
pub async fn insert_notification(pool: &SqlitePool, notification: &Notification) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO notifications (guid, tenant_id, pattern_id, outcome, message)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(notification.guid.to_string())
    .bind(&notification.tenant_id)
    .bind(notification.pattern_id.to_string())
    .bind(&notification.outcome)
    .bind(&notification.message)
    .execute(pool)
    .await?;
    Ok(())
}

/// All notifications for a tenant, oldest first
pub async fn list_notifications(pool: &SqlitePool, tenant_id: &str) -> Result<Vec<Notification>> {
    let rows = sqlx::query(
        r#"
        SELECT guid, tenant_id, pattern_id, outcome, message, created_at
        FROM notifications
        WHERE tenant_id = ?
        ORDER BY created_at, guid
        "#,
    )
    .bind(tenant_id)
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| {
            let guid: String = row.get("guid");
            let pattern_id: String = row.get("pattern_id");
            Ok(Notification {
                guid: Uuid::parse_str(&guid)?,
                tenant_id: row.get("tenant_id"),
                pattern_id: Uuid::parse_str(&pattern_id)?,
                outcome: row.get("outcome"),
                message: row.get("message"),
                created_at: row.get("created_at"),
            })
        })
        .collect()
}
