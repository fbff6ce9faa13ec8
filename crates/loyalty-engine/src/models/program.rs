//! 忠诚度计划实体定义

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use loyalty_shared::error::{LoyaltyError, Result};

use super::enums::{ProgramType, RewardType};

/// 忠诚度计划
///
/// 由商家配置，定义客户达成奖励的条件与奖励内容。
/// 一旦有客户产生进度，threshold/type/奖励字段即被冻结（只允许启停），
/// 避免运营中途改规则导致客户进度失真。
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct LoyaltyProgram {
    pub id: String,
    pub business_id: String,
    pub program_type: ProgramType,
    /// 解锁阈值：访问型/限时型为次数，消费型为便士金额
    pub threshold: i64,
    /// 限时型计划的窗口长度（天），其他类型必须为空
    #[sqlx(default)]
    pub time_limit_days: Option<i64>,
    pub reward_type: RewardType,
    /// 奖励价值：固定折扣为便士，百分比折扣为 1..=100，免费服务为空
    #[sqlx(default)]
    pub reward_value: Option<i64>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LoyaltyProgram {
    /// 创建新计划（UUID v7 作为主键，时间有序便于索引）
    pub fn new(
        business_id: impl Into<String>,
        program_type: ProgramType,
        threshold: i64,
        time_limit_days: Option<i64>,
        reward_type: RewardType,
        reward_value: Option<i64>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7().to_string(),
            business_id: business_id.into(),
            program_type,
            threshold,
            time_limit_days,
            reward_type,
            reward_value,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    /// 校验计划配置的跨字段约束
    ///
    /// 单字段约束（非空、范围）由请求 DTO 的 validator 完成，
    /// 这里只做依赖计划类型/奖励类型的条件校验。
    pub fn validate(&self) -> Result<()> {
        if self.threshold < 1 {
            return Err(LoyaltyError::Validation(format!(
                "threshold 必须大于 0, 实际: {}",
                self.threshold
            )));
        }

        match (self.program_type, self.time_limit_days) {
            (ProgramType::TimeLimited, None) => {
                return Err(LoyaltyError::Validation(
                    "限时型计划必须配置 time_limit_days".to_string(),
                ));
            }
            (ProgramType::TimeLimited, Some(days)) if days < 1 => {
                return Err(LoyaltyError::Validation(format!(
                    "time_limit_days 必须大于 0, 实际: {days}"
                )));
            }
            (ProgramType::VisitBased | ProgramType::SpendBased, Some(_)) => {
                return Err(LoyaltyError::Validation(
                    "非限时型计划不允许配置 time_limit_days".to_string(),
                ));
            }
            _ => {}
        }

        match (self.reward_type, self.reward_value) {
            (RewardType::FreeService, Some(_)) => Err(LoyaltyError::Validation(
                "免费服务奖励的价值由商家目录决定, 不允许配置 reward_value".to_string(),
            )),
            (RewardType::FixedDiscount, None) | (RewardType::PercentageDiscount, None) => Err(
                LoyaltyError::Validation("该奖励类型必须配置 reward_value".to_string()),
            ),
            (RewardType::FixedDiscount, Some(v)) if v < 1 => Err(LoyaltyError::Validation(
                format!("固定折扣金额必须大于 0, 实际: {v}"),
            )),
            (RewardType::PercentageDiscount, Some(v)) if !(1..=100).contains(&v) => {
                Err(LoyaltyError::Validation(format!(
                    "百分比折扣必须在 1..=100 之间, 实际: {v}"
                )))
            }
            _ => Ok(()),
        }
    }
}
