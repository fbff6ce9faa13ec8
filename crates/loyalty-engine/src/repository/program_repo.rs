//! 忠诚度计划仓储

use async_trait::async_trait;
use sqlx::PgPool;

use loyalty_shared::error::Result;

use super::traits::ProgramRepositoryTrait;
use crate::models::LoyaltyProgram;

/// 忠诚度计划的 PostgreSQL 仓储
pub struct PgProgramRepository {
    pool: PgPool,
}

impl PgProgramRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProgramRepositoryTrait for PgProgramRepository {
    async fn get(&self, id: &str) -> Result<Option<LoyaltyProgram>> {
        let program = sqlx::query_as::<_, LoyaltyProgram>(
            r#"
            SELECT id, business_id, program_type, threshold, time_limit_days,
                   reward_type, reward_value, is_active, created_at, updated_at
            FROM loyalty_programs
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(program)
    }

    async fn list_by_business(&self, business_id: &str) -> Result<Vec<LoyaltyProgram>> {
        let programs = sqlx::query_as::<_, LoyaltyProgram>(
            r#"
            SELECT id, business_id, program_type, threshold, time_limit_days,
                   reward_type, reward_value, is_active, created_at, updated_at
            FROM loyalty_programs
            WHERE business_id = $1
            ORDER BY created_at
            "#,
        )
        .bind(business_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(programs)
    }

    async fn list_active_by_business(&self, business_id: &str) -> Result<Vec<LoyaltyProgram>> {
        let programs = sqlx::query_as::<_, LoyaltyProgram>(
            r#"
            SELECT id, business_id, program_type, threshold, time_limit_days,
                   reward_type, reward_value, is_active, created_at, updated_at
            FROM loyalty_programs
            WHERE business_id = $1 AND is_active = TRUE
            ORDER BY created_at
            "#,
        )
        .bind(business_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(programs)
    }

    async fn create(&self, program: &LoyaltyProgram) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO loyalty_programs
                (id, business_id, program_type, threshold, time_limit_days,
                 reward_type, reward_value, is_active, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(&program.id)
        .bind(&program.business_id)
        .bind(program.program_type)
        .bind(program.threshold)
        .bind(program.time_limit_days)
        .bind(program.reward_type)
        .bind(program.reward_value)
        .bind(program.is_active)
        .bind(program.created_at)
        .bind(program.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update(&self, program: &LoyaltyProgram) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE loyalty_programs
            SET program_type = $2, threshold = $3, time_limit_days = $4,
                reward_type = $5, reward_value = $6, is_active = $7, updated_at = $8
            WHERE id = $1
            "#,
        )
        .bind(&program.id)
        .bind(program.program_type)
        .bind(program.threshold)
        .bind(program.time_limit_days)
        .bind(program.reward_type)
        .bind(program.reward_value)
        .bind(program.is_active)
        .bind(program.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
