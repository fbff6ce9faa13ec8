//! 客户进度仓储

use async_trait::async_trait;
use sqlx::{PgPool, Row};

use loyalty_shared::error::Result;

use super::traits::ProgressRepositoryTrait;
use crate::models::CustomerProgress;

/// 客户进度的 PostgreSQL 仓储
pub struct PgProgressRepository {
    pool: PgPool,
}

impl PgProgressRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProgressRepositoryTrait for PgProgressRepository {
    async fn get(&self, customer_id: &str, program_id: &str) -> Result<Option<CustomerProgress>> {
        let progress = sqlx::query_as::<_, CustomerProgress>(
            r#"
            SELECT customer_id, business_id, program_id, visit_count, total_spent,
                   first_visit_date, last_visit_date, reward_unlocked, reward_redeemed,
                   opt_out, almost_notified, unlocked_notified, updated_at
            FROM customer_progress
            WHERE customer_id = $1 AND program_id = $2
            "#,
        )
        .bind(customer_id)
        .bind(program_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(progress)
    }

    async fn list_by_pair(
        &self,
        customer_id: &str,
        business_id: &str,
    ) -> Result<Vec<CustomerProgress>> {
        let rows = sqlx::query_as::<_, CustomerProgress>(
            r#"
            SELECT customer_id, business_id, program_id, visit_count, total_spent,
                   first_visit_date, last_visit_date, reward_unlocked, reward_redeemed,
                   opt_out, almost_notified, unlocked_notified, updated_at
            FROM customer_progress
            WHERE customer_id = $1 AND business_id = $2
            "#,
        )
        .bind(customer_id)
        .bind(business_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn list_by_customer(&self, customer_id: &str) -> Result<Vec<CustomerProgress>> {
        let rows = sqlx::query_as::<_, CustomerProgress>(
            r#"
            SELECT customer_id, business_id, program_id, visit_count, total_spent,
                   first_visit_date, last_visit_date, reward_unlocked, reward_redeemed,
                   opt_out, almost_notified, unlocked_notified, updated_at
            FROM customer_progress
            WHERE customer_id = $1
            ORDER BY business_id, program_id
            "#,
        )
        .bind(customer_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn upsert(&self, progress: &CustomerProgress) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO customer_progress
                (customer_id, business_id, program_id, visit_count, total_spent,
                 first_visit_date, last_visit_date, reward_unlocked, reward_redeemed,
                 opt_out, almost_notified, unlocked_notified, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            ON CONFLICT (customer_id, program_id) DO UPDATE SET
                visit_count = EXCLUDED.visit_count,
                total_spent = EXCLUDED.total_spent,
                first_visit_date = EXCLUDED.first_visit_date,
                last_visit_date = EXCLUDED.last_visit_date,
                reward_unlocked = EXCLUDED.reward_unlocked,
                reward_redeemed = EXCLUDED.reward_redeemed,
                opt_out = EXCLUDED.opt_out,
                almost_notified = EXCLUDED.almost_notified,
                unlocked_notified = EXCLUDED.unlocked_notified,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(&progress.customer_id)
        .bind(&progress.business_id)
        .bind(&progress.program_id)
        .bind(progress.visit_count)
        .bind(progress.total_spent)
        .bind(progress.first_visit_date)
        .bind(progress.last_visit_date)
        .bind(progress.reward_unlocked)
        .bind(progress.reward_redeemed)
        .bind(progress.opt_out)
        .bind(progress.almost_notified)
        .bind(progress.unlocked_notified)
        .bind(progress.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn mark_redeemed(&self, customer_id: &str, program_id: &str) -> Result<bool> {
        // 条件更新即 CAS：已核销的行不会匹配，重复核销不生效
        let result = sqlx::query(
            r#"
            UPDATE customer_progress
            SET reward_redeemed = TRUE, updated_at = NOW()
            WHERE customer_id = $1 AND program_id = $2 AND reward_redeemed = FALSE
            "#,
        )
        .bind(customer_id)
        .bind(program_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn exists_for_program(&self, program_id: &str) -> Result<bool> {
        let row = sqlx::query(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM customer_progress WHERE program_id = $1
            ) AS present
            "#,
        )
        .bind(program_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.get("present"))
    }
}
