//! 兑换码仓储

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};

use loyalty_shared::error::Result;

use super::traits::VoucherRepositoryTrait;
use crate::models::Voucher;

const VOUCHER_COLUMNS: &str = r#"id, code, customer_id, business_id, program_id,
       reward_type, reward_value, expires_at, used, expired, created_at, redeemed_at"#;

/// 兑换码的 PostgreSQL 仓储
///
/// `code` 列带唯一约束，是码值唯一性的最终防线；`mark_used` 是
/// 条件更新（CAS），并发核销同一张码时只有一方成功。
pub struct PgVoucherRepository {
    pool: PgPool,
}

impl PgVoucherRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl VoucherRepositoryTrait for PgVoucherRepository {
    async fn get_by_code(&self, code: &str) -> Result<Option<Voucher>> {
        let voucher = sqlx::query_as::<_, Voucher>(&format!(
            "SELECT {VOUCHER_COLUMNS} FROM vouchers WHERE code = $1"
        ))
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;

        Ok(voucher)
    }

    async fn code_exists(&self, code: &str) -> Result<bool> {
        let row = sqlx::query("SELECT EXISTS(SELECT 1 FROM vouchers WHERE code = $1) AS present")
            .bind(code)
            .fetch_one(&self.pool)
            .await?;

        Ok(row.get("present"))
    }

    async fn find_usable(
        &self,
        customer_id: &str,
        program_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Voucher>> {
        let voucher = sqlx::query_as::<_, Voucher>(&format!(
            r#"
            SELECT {VOUCHER_COLUMNS}
            FROM vouchers
            WHERE customer_id = $1 AND program_id = $2
              AND used = FALSE AND expired = FALSE AND expires_at > $3
            ORDER BY created_at DESC
            LIMIT 1
            "#
        ))
        .bind(customer_id)
        .bind(program_id)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        Ok(voucher)
    }

    async fn list_by_customer(&self, customer_id: &str) -> Result<Vec<Voucher>> {
        let vouchers = sqlx::query_as::<_, Voucher>(&format!(
            r#"
            SELECT {VOUCHER_COLUMNS}
            FROM vouchers
            WHERE customer_id = $1
            ORDER BY created_at DESC
            "#
        ))
        .bind(customer_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(vouchers)
    }

    async fn create(&self, voucher: &Voucher) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO vouchers
                (id, code, customer_id, business_id, program_id, reward_type,
                 reward_value, expires_at, used, expired, created_at, redeemed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(&voucher.id)
        .bind(&voucher.code)
        .bind(&voucher.customer_id)
        .bind(&voucher.business_id)
        .bind(&voucher.program_id)
        .bind(voucher.reward_type)
        .bind(voucher.reward_value)
        .bind(voucher.expires_at)
        .bind(voucher.used)
        .bind(voucher.expired)
        .bind(voucher.created_at)
        .bind(voucher.redeemed_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn mark_used(&self, code: &str, now: DateTime<Utc>) -> Result<Option<Voucher>> {
        let voucher = sqlx::query_as::<_, Voucher>(&format!(
            r#"
            UPDATE vouchers
            SET used = TRUE, redeemed_at = $2
            WHERE code = $1 AND used = FALSE AND expired = FALSE AND expires_at > $2
            RETURNING {VOUCHER_COLUMNS}
            "#
        ))
        .bind(code)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        Ok(voucher)
    }

    async fn expire_due(&self, now: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE vouchers
            SET expired = TRUE
            WHERE used = FALSE AND expired = FALSE AND expires_at <= $1
            "#,
        )
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn expire_for_pair(
        &self,
        customer_id: &str,
        business_id: &str,
        _now: DateTime<Utc>,
    ) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE vouchers
            SET expired = TRUE
            WHERE customer_id = $1 AND business_id = $2 AND used = FALSE AND expired = FALSE
            "#,
        )
        .bind(customer_id)
        .bind(business_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
