//! # Product Repository
//!
//! The slice of the catalog the engine needs: create a product and read it
//! back, always inside the caller's business.

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use till_core::validation::validate_new_product;
use till_core::{CoreError, NewProduct, Product, TenantContext};

/// Repository for product database operations.
#[derive(Debug, Clone)]
pub struct ProductRepository {
    pool: SqlitePool,
}

impl ProductRepository {
    pub fn new(pool: SqlitePool) -> Self {
        ProductRepository { pool }
    }

    /// Inserts a product.
    ///
    /// ## Returns
    /// * `Err(DbError::UniqueViolation)` - SKU already used in this business
    pub async fn create(&self, ctx: &TenantContext, new: NewProduct) -> DbResult<Product> {
        validate_new_product(&new).map_err(CoreError::from)?;

        let now = Utc::now();
        let product = Product {
            id: Uuid::new_v4().to_string(),
            business_id: ctx.business_id.clone(),
            sku: new.sku.map(|s| s.trim().to_string()),
            name: new.name.trim().to_string(),
            price: new.price,
            cost: new.cost,
            stock_min: new.stock_min,
            created_at: now,
            updated_at: now,
        };

        sqlx::query(
            r#"
            INSERT INTO products (
                id, business_id, sku, name, price, cost, stock_min,
                created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(&product.id)
        .bind(&product.business_id)
        .bind(&product.sku)
        .bind(&product.name)
        .bind(product.price)
        .bind(product.cost)
        .bind(product.stock_min)
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match DbError::from(e) {
            DbError::UniqueViolation { .. } => {
                DbError::duplicate("sku", product.sku.clone().unwrap_or_default())
            }
            DbError::ForeignKeyViolation { .. } => {
                DbError::not_found("Business", &ctx.business_id)
            }
            other => other,
        })?;

        debug!(product_id = %product.id, name = %product.name, "Product created");
        Ok(product)
    }

    pub async fn get(&self, ctx: &TenantContext, product_id: &str) -> DbResult<Option<Product>> {
        let product = sqlx::query_as::<_, Product>(
            "SELECT * FROM products WHERE id = ?1 AND business_id = ?2",
        )
        .bind(product_id)
        .bind(&ctx.business_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(product)
    }

    pub async fn list(&self, ctx: &TenantContext) -> DbResult<Vec<Product>> {
        let products = sqlx::query_as::<_, Product>(
            "SELECT * FROM products WHERE business_id = ?1 ORDER BY name",
        )
        .bind(&ctx.business_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(products)
    }

    /// Removes a product. Sale lines keep their snapshot with the product
    /// reference cleared; the stock level goes with it, movements stay.
    ///
    /// Fails with a foreign key violation while an open order still holds
    /// a line for the product.
    pub async fn delete(&self, ctx: &TenantContext, product_id: &str) -> DbResult<()> {
        let result = sqlx::query("DELETE FROM products WHERE id = ?1 AND business_id = ?2")
            .bind(product_id)
            .bind(&ctx.business_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Product", product_id));
        }

        debug!(product_id = %product_id, "Product deleted");
        Ok(())
    }
}

/// Loads a product inside a transaction; absent and foreign both read as
/// `NotFound`.
pub(crate) async fn fetch_product(
    conn: &mut SqliteConnection,
    business_id: &str,
    product_id: &str,
) -> DbResult<Product> {
    sqlx::query_as::<_, Product>("SELECT * FROM products WHERE id = ?1 AND business_id = ?2")
        .bind(product_id)
        .bind(business_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| CoreError::not_found("Product", product_id).into())
}
