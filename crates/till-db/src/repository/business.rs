//! # Business Repository
//!
//! Tenants and their cash registers. Just enough to give every other
//! aggregate something to hang off.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use till_core::validation::validate_name;
use till_core::{Business, CashRegister, CoreError, TenantContext};

/// Repository for businesses and registers.
#[derive(Debug, Clone)]
pub struct BusinessRepository {
    pool: SqlitePool,
}

impl BusinessRepository {
    pub fn new(pool: SqlitePool) -> Self {
        BusinessRepository { pool }
    }

    /// Creates a tenant.
    pub async fn create(&self, name: &str) -> DbResult<Business> {
        validate_name("name", name, 200).map_err(CoreError::from)?;

        let business = Business {
            id: Uuid::new_v4().to_string(),
            name: name.trim().to_string(),
            created_at: Utc::now(),
        };

        sqlx::query("INSERT INTO businesses (id, name, created_at) VALUES (?1, ?2, ?3)")
            .bind(&business.id)
            .bind(&business.name)
            .bind(business.created_at)
            .execute(&self.pool)
            .await?;

        info!(business_id = %business.id, name = %business.name, "Business created");
        Ok(business)
    }

    pub async fn get(&self, id: &str) -> DbResult<Option<Business>> {
        let business = sqlx::query_as::<_, Business>("SELECT * FROM businesses WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(business)
    }

    /// Adds a register to the caller's business.
    pub async fn create_register(&self, ctx: &TenantContext, name: &str) -> DbResult<CashRegister> {
        validate_name("name", name, 100).map_err(CoreError::from)?;

        let register = CashRegister {
            id: Uuid::new_v4().to_string(),
            business_id: ctx.business_id.clone(),
            name: name.trim().to_string(),
            created_at: Utc::now(),
        };

        sqlx::query(
            r#"
            INSERT INTO cash_registers (id, business_id, name, created_at)
            VALUES (?1, ?2, ?3, ?4)
            "#,
        )
        .bind(&register.id)
        .bind(&register.business_id)
        .bind(&register.name)
        .bind(register.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match DbError::from(e) {
            DbError::ForeignKeyViolation { .. } => DbError::not_found("Business", &ctx.business_id),
            other => other,
        })?;

        debug!(register_id = %register.id, business_id = %register.business_id, "Register created");
        Ok(register)
    }

    pub async fn get_register(
        &self,
        ctx: &TenantContext,
        register_id: &str,
    ) -> DbResult<Option<CashRegister>> {
        let register = sqlx::query_as::<_, CashRegister>(
            "SELECT * FROM cash_registers WHERE id = ?1 AND business_id = ?2",
        )
        .bind(register_id)
        .bind(&ctx.business_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(register)
    }

    pub async fn list_registers(&self, ctx: &TenantContext) -> DbResult<Vec<CashRegister>> {
        let registers = sqlx::query_as::<_, CashRegister>(
            "SELECT * FROM cash_registers WHERE business_id = ?1 ORDER BY created_at, rowid",
        )
        .bind(&ctx.business_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(registers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};

    #[tokio::test]
    async fn test_create_and_get() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.businesses();

        let business = repo.create("  Corner Cafe ").await.unwrap();
        assert_eq!(business.name, "Corner Cafe");
        assert_eq!(repo.get(&business.id).await.unwrap(), Some(business));
        assert!(repo.get("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_blank_name_is_rejected() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let err = db.businesses().create("  ").await.unwrap_err();
        assert!(matches!(err, DbError::Domain(CoreError::Validation(_))));
    }

    #[tokio::test]
    async fn test_registers_are_scoped() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.businesses();
        let a = repo.create("A").await.unwrap();
        let b = repo.create("B").await.unwrap();
        let ctx_a = TenantContext::new(&a.id, "u", "owner");
        let ctx_b = TenantContext::new(&b.id, "u", "owner");

        let register = repo.create_register(&ctx_a, "Front").await.unwrap();

        assert!(repo.get_register(&ctx_a, &register.id).await.unwrap().is_some());
        assert!(repo.get_register(&ctx_b, &register.id).await.unwrap().is_none());
        assert_eq!(repo.list_registers(&ctx_a).await.unwrap().len(), 1);
        assert!(repo.list_registers(&ctx_b).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_register_for_unknown_business() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let ctx = TenantContext::new("ghost", "u", "owner");
        let err = db.businesses().create_register(&ctx, "Front").await.unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
    }
}
