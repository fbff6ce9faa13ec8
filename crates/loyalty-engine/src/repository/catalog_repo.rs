//! 商家服务目录仓储

use async_trait::async_trait;
use sqlx::{PgPool, Row};

use loyalty_shared::error::Result;

use super::traits::CatalogRepositoryTrait;
use crate::models::BusinessService;

/// 商家服务目录的 PostgreSQL 仓储
pub struct PgCatalogRepository {
    pool: PgPool,
}

impl PgCatalogRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CatalogRepositoryTrait for PgCatalogRepository {
    async fn cheapest_active_price(&self, business_id: &str) -> Result<Option<i64>> {
        let row = sqlx::query(
            r#"
            SELECT MIN(price)::BIGINT AS cheapest
            FROM business_services
            WHERE business_id = $1 AND is_active = TRUE
            "#,
        )
        .bind(business_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.get("cheapest"))
    }

    async fn list_by_business(&self, business_id: &str) -> Result<Vec<BusinessService>> {
        let services = sqlx::query_as::<_, BusinessService>(
            r#"
            SELECT id, business_id, name, price, is_active, created_at, updated_at
            FROM business_services
            WHERE business_id = $1
            ORDER BY price
            "#,
        )
        .bind(business_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(services)
    }

    async fn upsert(&self, service: &BusinessService) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO business_services
                (id, business_id, name, price, is_active, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                price = EXCLUDED.price,
                is_active = EXCLUDED.is_active,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(&service.id)
        .bind(&service.business_id)
        .bind(&service.name)
        .bind(service.price)
        .bind(service.is_active)
        .bind(service.created_at)
        .bind(service.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
