//! 兑换码实体定义

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::RewardType;

/// 兑换码
///
/// 奖励解锁后发放的持有者凭证（bearer token），代表一次可用的奖励实例。
/// 码值来自加密安全随机源，不可预测；同一 (customer, program) 至多存在
/// 一张未核销的有效兑换码。
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Voucher {
    pub id: String,
    /// 全局唯一兑换码（前缀 + 8 字节随机数的大写十六进制）
    pub code: String,
    pub customer_id: String,
    pub business_id: String,
    /// 发放来源计划，核销时据此回写进度
    pub program_id: String,
    pub reward_type: RewardType,
    #[sqlx(default)]
    pub reward_value: Option<i64>,
    pub expires_at: DateTime<Utc>,
    /// 是否已核销（至多一次）
    pub used: bool,
    /// 是否已过期（由过期清理或退出计划置位）
    pub expired: bool,
    pub created_at: DateTime<Utc>,
    #[sqlx(default)]
    pub redeemed_at: Option<DateTime<Utc>>,
}

impl Voucher {
    /// 创建新兑换码
    pub fn new(
        code: impl Into<String>,
        customer_id: impl Into<String>,
        business_id: impl Into<String>,
        program_id: impl Into<String>,
        reward_type: RewardType,
        reward_value: Option<i64>,
        issued_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            code: code.into(),
            customer_id: customer_id.into(),
            business_id: business_id.into(),
            program_id: program_id.into(),
            reward_type,
            reward_value,
            expires_at,
            used: false,
            expired: false,
            created_at: issued_at,
            redeemed_at: None,
        }
    }

    /// 是否可核销：未使用、未标记过期且尚在有效期内
    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        !self.used && !self.expired && now < self.expires_at
    }
}
