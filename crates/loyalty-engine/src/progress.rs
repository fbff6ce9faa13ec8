//! 进度计算器
//!
//! 根据计划定义与客户的预订历史计算当前进度与达成百分比。
//! 计算本身是纯函数：不触达仓储，时间一律由调用方显式传入，
//! 便于在测试中固定时钟。
//!
//! 限时型计划的窗口策略：窗口从 `first_visit_date` 起算
//! `time_limit_days` 天；窗口过期且未达标时，下一次完成的预订会把
//! 窗口重新锚定到该预订时间（计数从 1 重新开始），绝不保留过期的
//! 旧锚点。已解锁的奖励不因窗口过期而回退。

use chrono::{DateTime, Utc};
use serde::Serialize;

use loyalty_shared::events::BookingEvent;

use crate::models::{CustomerProgress, LoyaltyProgram};

/// 进度快照
///
/// 某一时刻客户在单个计划中的进度视图，所有派生值已算好
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSnapshot {
    pub program_id: String,
    /// 当前进度值：访问型/限时型为次数，消费型为累计便士
    pub current: i64,
    pub threshold: i64,
    /// 达成百分比，上限 100
    pub percentage: f64,
    /// 距离解锁还差多少（次数或便士），已解锁为 0
    pub remaining: i64,
    /// 限时型计划的窗口剩余天数，其他类型为空
    pub days_remaining: Option<i64>,
    pub unlocked: bool,
    /// 已解锁、未核销且未退出
    pub usable: bool,
}

/// 进度计算器
///
/// 无状态，方法均为关联函数
pub struct ProgressCalculator;

impl ProgressCalculator {
    /// 计算进度快照
    ///
    /// 计划缺失或未启用时由调用方传入 None 化处理；这里对未启用的
    /// 计划返回 None（无错误），与上游"静默跳过"的语义一致。
    pub fn snapshot(
        program: &LoyaltyProgram,
        progress: &CustomerProgress,
        now: DateTime<Utc>,
    ) -> Option<ProgressSnapshot> {
        if !program.is_active {
            return None;
        }

        let current = progress.current_for(program.program_type);
        let percentage = Self::percentage(current, program.threshold);
        let days_remaining = Self::days_remaining(program, progress, now);
        let unlocked = progress.reward_unlocked;

        Some(ProgressSnapshot {
            program_id: program.id.clone(),
            current,
            threshold: program.threshold,
            percentage,
            remaining: (program.threshold - current).max(0),
            days_remaining,
            unlocked,
            usable: progress.is_usable(),
        })
    }

    /// 达成百分比，上限 100
    pub fn percentage(current: i64, threshold: i64) -> f64 {
        if threshold <= 0 {
            return 0.0;
        }
        (current as f64 / threshold as f64 * 100.0).min(100.0)
    }

    /// 限时窗口是否已过期（仅限时型且已有锚点时可能为 true）
    pub fn window_expired(
        program: &LoyaltyProgram,
        progress: &CustomerProgress,
        now: DateTime<Utc>,
    ) -> bool {
        if !program.program_type.is_time_windowed() {
            return false;
        }
        match (progress.first_visit_date, program.time_limit_days) {
            (Some(anchor), Some(days)) => now >= anchor + chrono::Duration::days(days),
            _ => false,
        }
    }

    /// 限时窗口剩余天数
    ///
    /// 尚无锚点时返回完整窗口长度；窗口已过返回 0
    fn days_remaining(
        program: &LoyaltyProgram,
        progress: &CustomerProgress,
        now: DateTime<Utc>,
    ) -> Option<i64> {
        let days = program.time_limit_days?;
        if !program.program_type.is_time_windowed() {
            return None;
        }
        match progress.first_visit_date {
            None => Some(days),
            Some(anchor) => {
                let elapsed = (now - anchor).num_days();
                Some((days - elapsed).max(0))
            }
        }
    }

    /// 把一次完成的预订记入进度（增量步进）
    ///
    /// 限时型计划在窗口过期且未解锁时先重新锚定窗口，再计入本次预订。
    /// 解锁判定不在这里做，由奖励评估器统一负责。
    pub fn record_completed(
        program: &LoyaltyProgram,
        progress: &mut CustomerProgress,
        total_amount: i64,
        occurred_at: DateTime<Utc>,
    ) {
        if program.program_type.is_time_windowed()
            && !progress.reward_unlocked
            && Self::window_expired(program, progress, occurred_at)
        {
            progress.rearm_window(occurred_at);
        }

        progress.visit_count += 1;
        progress.total_spent += total_amount;
        if progress.first_visit_date.is_none() {
            progress.first_visit_date = Some(occurred_at);
        }
        progress.last_visit_date = Some(occurred_at);
        progress.updated_at = occurred_at;
    }

    /// 从有序预订历史折叠出进度（全量重算）
    ///
    /// 只消费 Completed 事件，与 `record_completed` 的增量步进逐事件
    /// 等价：同一段历史走两条路径必须得到相同的进度。
    pub fn from_history(
        program: &LoyaltyProgram,
        customer_id: &str,
        history: &[BookingEvent],
    ) -> CustomerProgress {
        let mut progress = CustomerProgress::new(customer_id, &program.business_id, &program.id);

        for event in history {
            if let BookingEvent::Completed {
                total_amount,
                timestamp,
                ..
            } = event
            {
                Self::record_completed(program, &mut progress, *total_amount, *timestamp);
                if progress.current_for(program.program_type) >= program.threshold {
                    progress.reward_unlocked = true;
                }
            }
        }

        progress
    }
}
