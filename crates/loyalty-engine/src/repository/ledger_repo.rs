//! 积分账本仓储

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};

use loyalty_shared::error::Result;

use super::traits::LedgerRepositoryTrait;
use crate::models::{LedgerEntry, LedgerStatus};

/// 积分账本的 PostgreSQL 仓储
///
/// 账本只追加；状态翻转用带状态条件的 UPDATE 实现 CAS，
/// 并发翻转同一条目时只有一方生效。
pub struct PgLedgerRepository {
    pool: PgPool,
}

impl PgLedgerRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LedgerRepositoryTrait for PgLedgerRepository {
    async fn append(&self, entry: &LedgerEntry) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO ledger_entries (id, user_id, booking_id, points, status, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(&entry.id)
        .bind(&entry.user_id)
        .bind(&entry.booking_id)
        .bind(entry.points)
        .bind(entry.status)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn flip_status(
        &self,
        booking_id: &str,
        from: LedgerStatus,
        to: LedgerStatus,
    ) -> Result<Option<LedgerEntry>> {
        let entry = sqlx::query_as::<_, LedgerEntry>(
            r#"
            UPDATE ledger_entries
            SET status = $3
            WHERE id = (
                SELECT id FROM ledger_entries
                WHERE booking_id = $1 AND status = $2
                ORDER BY created_at
                LIMIT 1
            )
            RETURNING id, user_id, booking_id, points, status, created_at
            "#,
        )
        .bind(booking_id)
        .bind(from)
        .bind(to)
        .fetch_optional(&self.pool)
        .await?;

        Ok(entry)
    }

    async fn find_by_booking(&self, booking_id: &str) -> Result<Vec<LedgerEntry>> {
        let entries = sqlx::query_as::<_, LedgerEntry>(
            r#"
            SELECT id, user_id, booking_id, points, status, created_at
            FROM ledger_entries
            WHERE booking_id = $1
            ORDER BY created_at
            "#,
        )
        .bind(booking_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    async fn balance(&self, user_id: &str) -> Result<i64> {
        let row = sqlx::query(
            r#"
            SELECT COALESCE(SUM(points), 0)::BIGINT AS balance
            FROM ledger_entries
            WHERE user_id = $1 AND status = 'deducted'
            "#,
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.get("balance"))
    }

    async fn pending_total(&self, user_id: &str) -> Result<i64> {
        let row = sqlx::query(
            r#"
            SELECT COALESCE(SUM(ABS(points)), 0)::BIGINT AS total
            FROM ledger_entries
            WHERE user_id = $1 AND status = 'pending'
            "#,
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.get("total"))
    }

    async fn redeemed_since(&self, user_id: &str, since: DateTime<Utc>) -> Result<i64> {
        // 只统计已结算的兑换方向条目（负数变化量）
        let row = sqlx::query(
            r#"
            SELECT COALESCE(SUM(-points), 0)::BIGINT AS total
            FROM ledger_entries
            WHERE user_id = $1 AND status = 'deducted' AND points < 0 AND created_at >= $2
            "#,
        )
        .bind(user_id)
        .bind(since)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.get("total"))
    }

    async fn list_by_user(&self, user_id: &str, limit: i64) -> Result<Vec<LedgerEntry>> {
        let entries = sqlx::query_as::<_, LedgerEntry>(
            r#"
            SELECT id, user_id, booking_id, points, status, created_at
            FROM ledger_entries
            WHERE user_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }
}
