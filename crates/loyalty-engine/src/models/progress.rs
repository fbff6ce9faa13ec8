//! 客户进度实体定义

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::enums::ProgramType;

/// 客户在某商家忠诚度计划中的进度
///
/// 每个 (customer, business, program) 组合一条记录，随每次完成的预订而推进。
/// 两个 `*_notified` 标志是通知状态机的持久化形态：
/// {未通知} -> {已发即将解锁} -> {已发解锁}，同一事件重复投递不会重发。
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct CustomerProgress {
    pub customer_id: String,
    pub business_id: String,
    pub program_id: String,
    /// 累计完成的预订次数（限时型为当前窗口内次数）
    pub visit_count: i64,
    /// 累计消费金额（便士）
    pub total_spent: i64,
    /// 首次有效访问时间，限时型计划的窗口锚点
    #[sqlx(default)]
    pub first_visit_date: Option<DateTime<Utc>>,
    #[sqlx(default)]
    pub last_visit_date: Option<DateTime<Utc>>,
    /// 奖励是否已解锁；除退出计划或显式重置外永不回退为 false
    pub reward_unlocked: bool,
    /// 奖励是否已核销（至多一次）
    pub reward_redeemed: bool,
    /// 客户退出标志（GDPR），退出后不再累积进度与积分
    pub opt_out: bool,
    /// "即将解锁"提醒是否已发送
    pub almost_notified: bool,
    /// "奖励解锁"提醒是否已发送
    pub unlocked_notified: bool,
    pub updated_at: DateTime<Utc>,
}

impl CustomerProgress {
    /// 为 (customer, business, program) 创建零值进度
    pub fn new(
        customer_id: impl Into<String>,
        business_id: impl Into<String>,
        program_id: impl Into<String>,
    ) -> Self {
        Self {
            customer_id: customer_id.into(),
            business_id: business_id.into(),
            program_id: program_id.into(),
            visit_count: 0,
            total_spent: 0,
            first_visit_date: None,
            last_visit_date: None,
            reward_unlocked: false,
            reward_redeemed: false,
            opt_out: false,
            almost_notified: false,
            unlocked_notified: false,
            updated_at: Utc::now(),
        }
    }

    /// 当前进度值：访问型/限时型取次数，消费型取累计金额
    pub fn current_for(&self, program_type: ProgramType) -> i64 {
        if program_type.counts_visits() {
            self.visit_count
        } else {
            self.total_spent
        }
    }

    /// 奖励是否可用：已解锁、未核销且未退出
    pub fn is_usable(&self) -> bool {
        self.reward_unlocked && !self.reward_redeemed && !self.opt_out
    }

    /// 清空全部进度与标志（客户退出时调用）
    ///
    /// 解锁/核销状态一并清除，重新加入后从零开始
    pub fn reset(&mut self, now: DateTime<Utc>) {
        self.visit_count = 0;
        self.total_spent = 0;
        self.first_visit_date = None;
        self.last_visit_date = None;
        self.reward_unlocked = false;
        self.reward_redeemed = false;
        self.almost_notified = false;
        self.unlocked_notified = false;
        self.updated_at = now;
    }

    /// 重新锚定限时窗口（窗口过期且未达标时调用）
    ///
    /// 次数清零、窗口锚点移到新的预订时间，"即将解锁"提醒重新武装。
    /// 与 `reset` 不同，累计消费与解锁/核销状态保持不变。
    pub fn rearm_window(&mut self, anchor: DateTime<Utc>) {
        self.visit_count = 0;
        self.first_visit_date = Some(anchor);
        self.almost_notified = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_progress_is_zeroed() {
        let progress = CustomerProgress::new("cust-001", "biz-001", "prog-001");
        assert_eq!(progress.visit_count, 0);
        assert_eq!(progress.total_spent, 0);
        assert!(progress.first_visit_date.is_none());
        assert!(!progress.reward_unlocked);
        assert!(!progress.is_usable());
    }

    #[test]
    fn test_current_for_program_type() {
        let mut progress = CustomerProgress::new("cust-001", "biz-001", "prog-001");
        progress.visit_count = 4;
        progress.total_spent = 12000;

        assert_eq!(progress.current_for(ProgramType::VisitBased), 4);
        assert_eq!(progress.current_for(ProgramType::TimeLimited), 4);
        assert_eq!(progress.current_for(ProgramType::SpendBased), 12000);
    }

    #[test]
    fn test_is_usable_requires_all_conditions() {
        let mut progress = CustomerProgress::new("cust-001", "biz-001", "prog-001");
        assert!(!progress.is_usable());

        progress.reward_unlocked = true;
        assert!(progress.is_usable());

        progress.reward_redeemed = true;
        assert!(!progress.is_usable());

        progress.reward_redeemed = false;
        progress.opt_out = true;
        assert!(!progress.is_usable());
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut progress = CustomerProgress::new("cust-001", "biz-001", "prog-001");
        progress.visit_count = 7;
        progress.total_spent = 9000;
        progress.first_visit_date = Some(Utc::now());
        progress.reward_unlocked = true;
        progress.almost_notified = true;

        progress.reset(Utc::now());
        assert_eq!(progress.visit_count, 0);
        assert_eq!(progress.total_spent, 0);
        assert!(progress.first_visit_date.is_none());
        assert!(!progress.reward_unlocked);
        assert!(!progress.almost_notified);
    }

    #[test]
    fn test_rearm_window_keeps_lifetime_totals() {
        let mut progress = CustomerProgress::new("cust-001", "biz-001", "prog-001");
        progress.visit_count = 2;
        progress.total_spent = 6000;
        progress.almost_notified = true;

        let anchor = Utc::now();
        progress.rearm_window(anchor);

        assert_eq!(progress.visit_count, 0);
        assert_eq!(progress.total_spent, 6000);
        assert_eq!(progress.first_visit_date, Some(anchor));
        assert!(!progress.almost_notified);
    }
}
