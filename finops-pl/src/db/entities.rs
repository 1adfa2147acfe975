//! Business entity reads (tenant business context)

use anyhow::Result;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

/// Business entity row
#[derive(Debug, Clone)]
pub struct BusinessEntity {
    pub guid: Uuid,
    pub tenant_id: String,
    pub name: String,
    pub entity_type: String,
}

impl BusinessEntity {
    pub fn new(tenant_id: &str, name: &str, entity_type: &str) -> Self {
        Self {
            guid: Uuid::new_v4(),
            tenant_id: tenant_id.to_string(),
            name: name.to_string(),
            entity_type: entity_type.to_string(),
        }
    }
}

/// Save a business entity
pub async fn save_entity(pool: &SqlitePool, entity: &BusinessEntity) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO business_entities (guid, tenant_id, name, entity_type)
        VALUES (?, ?, ?, ?)
        ON CONFLICT(tenant_id, name) DO UPDATE SET entity_type = excluded.entity_type
        "#,
    )
    .bind(entity.guid.to_string())
    .bind(&entity.tenant_id)
    .bind(&entity.name)
    .bind(&entity.entity_type)
    .execute(pool)
    .await?;
    Ok(())
}

/// Load all business entities for a tenant, by name
pub async fn list_entities(pool: &SqlitePool, tenant_id: &str) -> Result<Vec<BusinessEntity>> {
    let rows = sqlx::query(
        r#"
        SELECT guid, tenant_id, name, entity_type
        FROM business_entities
        WHERE tenant_id = ?
        ORDER BY name
        "#,
    )
    .bind(tenant_id)
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| {
            let guid: String = row.get("guid");
            Ok(BusinessEntity {
                guid: Uuid::parse_str(&guid)?,
                tenant_id: row.get("tenant_id"),
                name: row.get("name"),
                entity_type: row.get("entity_type"),
            })
        })
        .collect()
}
