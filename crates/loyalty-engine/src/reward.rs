//! 奖励评估器
//!
//! 判定奖励是否解锁/可用，并在结算时计算折扣金额。
//! 金额计算是纯函数：免费服务所需的目录最低价由服务层查好后传入，
//! 这里不触达仓储。

use chrono::{DateTime, Utc};

use loyalty_shared::error::{LoyaltyError, Result};

use crate::models::{CustomerProgress, LoyaltyProgram, RewardType};
use crate::progress::ProgressCalculator;

/// 奖励评估器
///
/// 无状态，方法均为关联函数
pub struct RewardEvaluator;

impl RewardEvaluator {
    /// 当前进度是否达到解锁条件
    ///
    /// 限时型计划额外要求窗口尚未过期；已经解锁过的进度直接视为解锁
    /// （解锁不因窗口过期回退）。
    pub fn is_unlocked(
        program: &LoyaltyProgram,
        progress: &CustomerProgress,
        now: DateTime<Utc>,
    ) -> bool {
        if progress.reward_unlocked {
            return true;
        }
        let reached = progress.current_for(program.program_type) >= program.threshold;
        if !reached {
            return false;
        }
        !ProgressCalculator::window_expired(program, progress, now)
    }

    /// 奖励是否可在结算时使用
    pub fn is_usable(progress: &CustomerProgress) -> bool {
        progress.is_usable()
    }

    /// 按计划配置计算折扣金额（便士）
    pub fn discount(
        program: &LoyaltyProgram,
        booking_amount: i64,
        cheapest_service_price: Option<i64>,
    ) -> Result<i64> {
        Self::discount_for(
            program.reward_type,
            program.reward_value,
            booking_amount,
            cheapest_service_price,
        )
    }

    /// 按奖励类型与价值计算折扣金额（便士）
    ///
    /// 兑换码核销路径没有计划实体，直接用兑换码上冻结的奖励字段计算。
    /// 折扣不超过订单金额，永不为负。
    pub fn discount_for(
        reward_type: RewardType,
        reward_value: Option<i64>,
        booking_amount: i64,
        cheapest_service_price: Option<i64>,
    ) -> Result<i64> {
        if booking_amount <= 0 {
            return Err(LoyaltyError::Validation(format!(
                "订单金额必须大于 0, 实际: {booking_amount}"
            )));
        }

        match reward_type {
            RewardType::FreeService => {
                let price = cheapest_service_price.ok_or_else(|| {
                    LoyaltyError::Validation(
                        "免费服务奖励需要商家目录中至少一项在售服务".to_string(),
                    )
                })?;
                Ok(price.min(booking_amount))
            }
            RewardType::FixedDiscount => {
                let value = reward_value.ok_or_else(|| {
                    LoyaltyError::Validation("固定折扣奖励缺少 reward_value".to_string())
                })?;
                Ok(value.min(booking_amount))
            }
            RewardType::PercentageDiscount => {
                let percent = reward_value.ok_or_else(|| {
                    LoyaltyError::Validation("百分比折扣奖励缺少 reward_value".to_string())
                })?;
                // 便士整数四舍五入（半数进位）
                Ok((booking_amount * percent + 50) / 100)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::models::ProgramType;

    fn program(
        program_type: ProgramType,
        threshold: i64,
        days: Option<i64>,
        reward_type: RewardType,
        reward_value: Option<i64>,
    ) -> LoyaltyProgram {
        LoyaltyProgram::new(
            "biz-001",
            program_type,
            threshold,
            days,
            reward_type,
            reward_value,
        )
    }

    #[test]
    fn test_unlock_at_threshold() {
        let program = program(
            ProgramType::VisitBased,
            5,
            None,
            RewardType::FixedDiscount,
            Some(500),
        );
        let mut progress = CustomerProgress::new("cust-001", "biz-001", &program.id);

        progress.visit_count = 4;
        assert!(!RewardEvaluator::is_unlocked(
            &program,
            &progress,
            Utc::now()
        ));

        progress.visit_count = 5;
        assert!(RewardEvaluator::is_unlocked(
            &program,
            &progress,
            Utc::now()
        ));
    }

    #[test]
    fn test_time_limited_requires_live_window() {
        let program = program(
            ProgramType::TimeLimited,
            3,
            Some(30),
            RewardType::FreeService,
            None,
        );
        let mut progress = CustomerProgress::new("cust-001", "biz-001", &program.id);
        let start = Utc::now();
        progress.first_visit_date = Some(start);
        progress.visit_count = 3;

        // 窗口内达标即解锁，窗口过后不再解锁
        assert!(RewardEvaluator::is_unlocked(
            &program,
            &progress,
            start + Duration::days(29)
        ));
        assert!(!RewardEvaluator::is_unlocked(
            &program,
            &progress,
            start + Duration::days(31)
        ));

        // 已经解锁过的不回退
        progress.reward_unlocked = true;
        assert!(RewardEvaluator::is_unlocked(
            &program,
            &progress,
            start + Duration::days(31)
        ));
    }

    #[test]
    fn test_percentage_discount_rounds_to_penny() {
        let program = program(
            ProgramType::VisitBased,
            5,
            None,
            RewardType::PercentageDiscount,
            Some(20),
        );
        // 20% of £50.00 = £10.00 exactly
        assert_eq!(RewardEvaluator::discount(&program, 5000, None).unwrap(), 1000);
        // 20% of 1234p = 246.8p -> 247p
        assert_eq!(RewardEvaluator::discount(&program, 1234, None).unwrap(), 247);
        // 15% of 10p = 1.5p -> 2p
        assert_eq!(
            RewardEvaluator::discount_for(RewardType::PercentageDiscount, Some(15), 10, None)
                .unwrap(),
            2
        );
    }

    #[test]
    fn test_fixed_discount_capped_at_amount() {
        let program = program(
            ProgramType::VisitBased,
            5,
            None,
            RewardType::FixedDiscount,
            Some(2000),
        );
        assert_eq!(RewardEvaluator::discount(&program, 5000, None).unwrap(), 2000);
        // 订单金额低于折扣面值时封顶，不会折成负数
        assert_eq!(RewardEvaluator::discount(&program, 1500, None).unwrap(), 1500);
    }

    #[test]
    fn test_free_service_uses_cheapest_price() {
        let program = program(
            ProgramType::VisitBased,
            5,
            None,
            RewardType::FreeService,
            None,
        );
        assert_eq!(
            RewardEvaluator::discount(&program, 5000, Some(1800)).unwrap(),
            1800
        );
        // 目录为空时拒绝折算
        assert!(matches!(
            RewardEvaluator::discount(&program, 5000, None),
            Err(LoyaltyError::Validation(_))
        ));
    }

    #[test]
    fn test_non_positive_amount_rejected() {
        let program = program(
            ProgramType::VisitBased,
            5,
            None,
            RewardType::FixedDiscount,
            Some(500),
        );
        assert!(RewardEvaluator::discount(&program, 0, None).is_err());
        assert!(RewardEvaluator::discount(&program, -100, None).is_err());
    }
}
