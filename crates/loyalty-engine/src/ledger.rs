//! 积分兑换账本服务
//!
//! 账本为只追加日志，余额完全由条目推导。兑换走两阶段：
//! `reserve` 写入 Pending 预留（负数变化量，余额不动但可用额度扣除），
//! 预订完成时 `commit` 结转为 Deducted（余额此时减少），预订取消时
//! `release` 转为 Released（余额从未减少，无需回补）。
//! 已结算（Deducted）的条目永不回退。
//!
//! 预留前的校验顺序：公平性约束 -> 可用余额 -> 滚动兑换上限。
//! 上限统计最近 `redemption_window_days` 天内已结算的兑换积分。
//!
//! 调用方必须持有该用户的账本键互斥锁（`lock_keys::ledger`），
//! 否则并发预留可能双双通过上限检查。

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{info, instrument};

use loyalty_shared::config::LoyaltyConfig;
use loyalty_shared::error::{LoyaltyError, Result};

use crate::models::{LedgerEntry, LedgerStatus};
use crate::repository::LedgerRepositoryTrait;

/// 积分兑换账本服务
pub struct RedemptionLedger<LR>
where
    LR: LedgerRepositoryTrait,
{
    repo: Arc<LR>,
    cap_points: i64,
    window_days: i64,
    accrual_rate_percent: u32,
    min_total_multiple: i64,
}

/// 用户积分余额视图
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceView {
    /// 已结算余额
    pub balance: i64,
    /// 预留中的积分（绝对值）
    pub pending: i64,
    /// 可用余额 = balance - pending
    pub available: i64,
    /// 滚动窗口内已结算的兑换积分
    pub redeemed_in_window: i64,
}

impl<LR> RedemptionLedger<LR>
where
    LR: LedgerRepositoryTrait,
{
    pub fn new(repo: Arc<LR>, config: &LoyaltyConfig) -> Self {
        Self {
            repo,
            cap_points: config.redemption_cap_points,
            window_days: config.redemption_window_days,
            accrual_rate_percent: config.accrual_rate_percent,
            min_total_multiple: config.min_total_multiple,
        }
    }

    /// 预留积分用于兑换
    ///
    /// 校验流程：
    /// 1. 公平性约束：订单金额必须不低于兑换价值的 `min_total_multiple`
    ///    倍（倍数 2 即"兑换价值不超过订单金额的 50%"）
    /// 2. 可用余额 >= 请求积分
    /// 3. 滚动窗口内已兑换 + 本次请求 <= 上限
    ///
    /// 通过后写入 Pending 条目；余额尚未减少，但可用额度立即扣除。
    #[instrument(skip(self), fields(user_id = %user_id, booking_id = %booking_id))]
    pub async fn reserve(
        &self,
        user_id: &str,
        booking_id: &str,
        points: i64,
        booking_total: i64,
        now: DateTime<Utc>,
    ) -> Result<LedgerEntry> {
        if points <= 0 {
            return Err(LoyaltyError::Validation(format!(
                "兑换积分必须大于 0, 实际: {points}"
            )));
        }

        // 1. 公平性约束
        if booking_total < points * self.min_total_multiple {
            return Err(LoyaltyError::Validation(format!(
                "订单金额必须不低于兑换价值的 {} 倍: 订单 {booking_total}, 兑换 {points}",
                self.min_total_multiple
            )));
        }

        // 2. 可用余额
        let available = self.available(user_id).await?;
        if available < points {
            return Err(LoyaltyError::InsufficientBalance {
                required: points,
                available,
            });
        }

        // 3. 滚动上限
        let redeemed = self.redeemed_in_window(user_id, now).await?;
        if redeemed + points > self.cap_points {
            return Err(LoyaltyError::CapExceeded {
                requested: points,
                redeemed,
                cap: self.cap_points,
            });
        }

        let entry = LedgerEntry::reservation(user_id, booking_id, points, now);
        self.repo.append(&entry).await?;

        info!(points, available, redeemed, "积分预留成功");
        Ok(entry)
    }

    /// 预订完成，结转预留（Pending -> Deducted），余额此时减少
    ///
    /// 该预订没有待结算的预留时报 NotFound。
    #[instrument(skip(self), fields(booking_id = %booking_id))]
    pub async fn commit(&self, booking_id: &str) -> Result<LedgerEntry> {
        let entry = self
            .repo
            .flip_status(booking_id, LedgerStatus::Pending, LedgerStatus::Deducted)
            .await?
            .ok_or_else(|| LoyaltyError::not_found("LedgerEntry(pending)", booking_id))?;

        info!(user_id = %entry.user_id, points = entry.points, "预留已结转扣减");
        Ok(entry)
    }

    /// 预订取消，释放预留（Pending -> Released），余额不受影响
    ///
    /// 返回被释放的条目。重复释放为幂等空操作（返回 None）；
    /// 该预订没有任何预留时同样返回 None —— 取消一笔未用积分的预订
    /// 是正常路径。已结算的条目不可释放。
    #[instrument(skip(self), fields(booking_id = %booking_id))]
    pub async fn release(&self, booking_id: &str) -> Result<Option<LedgerEntry>> {
        if let Some(entry) = self
            .repo
            .flip_status(booking_id, LedgerStatus::Pending, LedgerStatus::Released)
            .await?
        {
            info!(user_id = %entry.user_id, points = entry.points, "预留已释放");
            return Ok(Some(entry));
        }

        // 没有 Pending 条目：区分"从未预留/已释放"（空操作）与"已结算"（拒绝）
        let settled_redemption = self
            .repo
            .find_by_booking(booking_id)
            .await?
            .into_iter()
            .any(|e| e.is_redemption() && e.status == LedgerStatus::Deducted);
        if settled_redemption {
            return Err(LoyaltyError::Validation(format!(
                "预订 {booking_id} 的兑换已结算, 不可释放"
            )));
        }

        Ok(None)
    }

    /// 完成预订后按金额比例累积积分
    ///
    /// 积分与便士 1:1，按 `accrual_rate_percent` 取整（向下），
    /// 累积条目直接落为已结算的正数变化量。金额过小折不出积分时
    /// 不写条目，返回 0。
    #[instrument(skip(self), fields(user_id = %user_id, booking_id = %booking_id))]
    pub async fn earn(
        &self,
        user_id: &str,
        booking_id: &str,
        booking_total: i64,
        now: DateTime<Utc>,
    ) -> Result<i64> {
        let points = booking_total * self.accrual_rate_percent as i64 / 100;
        if points <= 0 {
            return Ok(0);
        }

        let entry = LedgerEntry::accrual(user_id, booking_id, points, now);
        self.repo.append(&entry).await?;

        info!(points, "积分已累积");
        Ok(points)
    }

    /// 已结算余额
    pub async fn balance(&self, user_id: &str) -> Result<i64> {
        self.repo.balance(user_id).await
    }

    /// 可用余额 = 已结算余额 - 预留中的积分
    pub async fn available(&self, user_id: &str) -> Result<i64> {
        let balance = self.repo.balance(user_id).await?;
        let pending = self.repo.pending_total(user_id).await?;
        Ok(balance - pending)
    }

    /// 滚动窗口内已结算的兑换积分总量
    pub async fn redeemed_in_window(&self, user_id: &str, now: DateTime<Utc>) -> Result<i64> {
        let since = now - Duration::days(self.window_days);
        self.repo.redeemed_since(user_id, since).await
    }

    /// 余额全景视图
    pub async fn balance_view(&self, user_id: &str, now: DateTime<Utc>) -> Result<BalanceView> {
        let balance = self.repo.balance(user_id).await?;
        let pending = self.repo.pending_total(user_id).await?;
        let redeemed_in_window = self.redeemed_in_window(user_id, now).await?;
        Ok(BalanceView {
            balance,
            pending,
            available: balance - pending,
            redeemed_in_window,
        })
    }

    pub async fn history(&self, user_id: &str, limit: i64) -> Result<Vec<LedgerEntry>> {
        self.repo.list_by_user(user_id, limit).await
    }

    /// 兑换上限（积分）
    pub fn cap_points(&self) -> i64 {
        self.cap_points
    }
}
