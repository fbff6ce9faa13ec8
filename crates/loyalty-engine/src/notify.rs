//! 通知触发器
//!
//! 每个 (customer, program) 一台一次性状态机：
//! {未通知} -> {已发即将解锁} -> {已发解锁}。
//! 状态以进度行上的两个标志持久化，重复投递同一预订事件不会重发。
//! 触发器只产出 {recipient, template, data} 载荷，发送由调用方交付
//! 给 `NotificationDispatcher`。

use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::debug;

use loyalty_shared::events::{NotificationPayload, NotificationTemplate};

use crate::models::{CustomerProgress, LoyaltyProgram};
use crate::progress::ProgressCalculator;

/// 通知触发器
///
/// `alert_percent` 为消费型计划触发"即将解锁"的进度百分比（默认 80）
pub struct NotificationTrigger {
    alert_percent: u32,
}

impl NotificationTrigger {
    pub fn new(alert_percent: u32) -> Self {
        Self { alert_percent }
    }

    /// 评估并翻转通知状态，返回本次应交付的载荷
    ///
    /// 幂等：每个状态只在首次满足条件时产出一次载荷，标志翻转后
    /// 再次调用不会重复产出。进度行的持久化由调用方负责。
    pub fn evaluate(
        &self,
        program: &LoyaltyProgram,
        progress: &mut CustomerProgress,
        voucher_code: Option<&str>,
        now: DateTime<Utc>,
    ) -> Vec<NotificationPayload> {
        let mut payloads = Vec::new();

        if self.should_fire_almost(program, progress) {
            progress.almost_notified = true;
            payloads.push(self.almost_payload(program, progress, now));
            debug!(
                customer_id = %progress.customer_id,
                program_id = %program.id,
                "almost-unlocked notification armed"
            );
        }

        if progress.reward_unlocked && !progress.unlocked_notified {
            progress.unlocked_notified = true;
            payloads.push(self.unlocked_payload(program, progress, voucher_code, now));
            debug!(
                customer_id = %progress.customer_id,
                program_id = %program.id,
                "unlocked notification armed"
            );
        }

        payloads
    }

    /// "即将解锁"触发条件
    ///
    /// 访问型/限时型：恰好差一次；消费型：进度百分比达到阈值且未达标
    fn should_fire_almost(&self, program: &LoyaltyProgram, progress: &CustomerProgress) -> bool {
        if progress.almost_notified || progress.reward_unlocked || progress.opt_out {
            return false;
        }

        let current = progress.current_for(program.program_type);
        if program.program_type.counts_visits() {
            current == program.threshold - 1
        } else {
            let percentage = ProgressCalculator::percentage(current, program.threshold);
            percentage >= self.alert_percent as f64 && current < program.threshold
        }
    }

    fn almost_payload(
        &self,
        program: &LoyaltyProgram,
        progress: &CustomerProgress,
        now: DateTime<Utc>,
    ) -> NotificationPayload {
        let current = progress.current_for(program.program_type);
        NotificationPayload {
            recipient: progress.customer_id.clone(),
            template: NotificationTemplate::AlmostUnlocked,
            data: json!({
                "programId": program.id,
                "businessId": program.business_id,
                "programType": program.program_type,
                "current": current,
                "threshold": program.threshold,
                "remaining": (program.threshold - current).max(0),
            }),
            created_at: now,
        }
    }

    fn unlocked_payload(
        &self,
        program: &LoyaltyProgram,
        progress: &CustomerProgress,
        voucher_code: Option<&str>,
        now: DateTime<Utc>,
    ) -> NotificationPayload {
        NotificationPayload {
            recipient: progress.customer_id.clone(),
            template: NotificationTemplate::RewardUnlocked,
            data: json!({
                "programId": program.id,
                "businessId": program.business_id,
                "rewardType": program.reward_type,
                "rewardValue": program.reward_value,
                "voucherCode": voucher_code,
            }),
            created_at: now,
        }
    }
}
