//! 积分账本条目定义

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::LedgerStatus;

/// 积分账本条目
///
/// 只追加日志，余额完全由条目推导而非单独存储：
/// - balance = 已结算（Deducted）条目的带符号积分之和
/// - available = balance - 待结算（Pending）条目的绝对值之和
///
/// 累积条目以正数直接落为 Deducted；兑换预留以负数落为 Pending，
/// 预订完成时结转为 Deducted（余额此时才真正减少），取消时转为
/// Released（余额从未减少过，无需回补）。
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    pub id: String,
    pub user_id: String,
    /// 关联的预订，预留条目的结转/释放按此定位
    pub booking_id: String,
    /// 带符号积分变化量：累积为正，兑换为负
    pub points: i64,
    pub status: LedgerStatus,
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    /// 构造兑换预留条目（Pending，负数）
    ///
    /// `points` 以正数传入兑换数量，内部记为负的变化量
    pub fn reservation(
        user_id: impl Into<String>,
        booking_id: impl Into<String>,
        points: i64,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            user_id: user_id.into(),
            booking_id: booking_id.into(),
            points: -points,
            status: LedgerStatus::Pending,
            created_at: now,
        }
    }

    /// 构造积分累积条目（直接结算，正数）
    pub fn accrual(
        user_id: impl Into<String>,
        booking_id: impl Into<String>,
        points: i64,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            user_id: user_id.into(),
            booking_id: booking_id.into(),
            points,
            status: LedgerStatus::Deducted,
            created_at: now,
        }
    }

    /// 是否为兑换方向（负数变化量）
    pub fn is_redemption(&self) -> bool {
        self.points < 0
    }
}
