//! 已处理事件仓储（幂等表）

use async_trait::async_trait;
use sqlx::{PgPool, Row};

use loyalty_shared::error::Result;

use super::traits::ProcessedEventRepositoryTrait;

/// 幂等表的 PostgreSQL 仓储
///
/// `try_mark_processed` 用 `ON CONFLICT DO NOTHING` 做先占式写入：
/// 并发投递同一事件时只有一方插入成功，其余视为重复。
pub struct PgProcessedEventRepository {
    pool: PgPool,
}

impl PgProcessedEventRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProcessedEventRepositoryTrait for PgProcessedEventRepository {
    async fn try_mark_processed(&self, event_id: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO processed_events (event_id, processed_at)
            VALUES ($1, NOW())
            ON CONFLICT (event_id) DO NOTHING
            "#,
        )
        .bind(event_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn is_processed(&self, event_id: &str) -> Result<bool> {
        let row = sqlx::query(
            "SELECT EXISTS(SELECT 1 FROM processed_events WHERE event_id = $1) AS present",
        )
        .bind(event_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.get("present"))
    }
}
