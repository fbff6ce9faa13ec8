//! 结算服务
//!
//! 结算流程的三个动作：折扣报价（只读）、奖励核销（至多一次）、
//! 积分兑换预留。核销走 CAS：进度行与兑换码的状态翻转都是条件
//! 更新，并发重复核销只有一方成功，另一方收到 AlreadyRedeemed。
//! 折扣必须在扣款捕获之前应用，模块只负责算出金额。

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, instrument};

use loyalty_shared::error::{LoyaltyError, Result};

use crate::ledger::RedemptionLedger;
use crate::lock::{LockManager, lock_keys};
use crate::models::{CustomerProgress, LedgerEntry, LoyaltyProgram, RewardType, Voucher};
use crate::repository::{
    CatalogRepositoryTrait, LedgerRepositoryTrait, ProgramRepositoryTrait,
    ProgressRepositoryTrait, VoucherRepositoryTrait,
};
use crate::reward::RewardEvaluator;
use crate::service::dto::{ApplyRewardResponse, DiscountQuote, RedeemPointsRequest, validated};

/// 结算服务
pub struct CheckoutService<LR>
where
    LR: LedgerRepositoryTrait,
{
    programs: Arc<dyn ProgramRepositoryTrait>,
    progress: Arc<dyn ProgressRepositoryTrait>,
    catalog: Arc<dyn CatalogRepositoryTrait>,
    vouchers: Arc<dyn VoucherRepositoryTrait>,
    ledger: Arc<RedemptionLedger<LR>>,
    locks: Arc<LockManager>,
}

impl<LR> CheckoutService<LR>
where
    LR: LedgerRepositoryTrait,
{
    pub fn new(
        programs: Arc<dyn ProgramRepositoryTrait>,
        progress: Arc<dyn ProgressRepositoryTrait>,
        catalog: Arc<dyn CatalogRepositoryTrait>,
        vouchers: Arc<dyn VoucherRepositoryTrait>,
        ledger: Arc<RedemptionLedger<LR>>,
        locks: Arc<LockManager>,
    ) -> Self {
        Self {
            programs,
            progress,
            catalog,
            vouchers,
            ledger,
            locks,
        }
    }

    /// 折扣报价（只读，不产生任何状态变更）
    #[instrument(skip(self), fields(customer_id = %customer_id, program_id = %program_id))]
    pub async fn quote(
        &self,
        customer_id: &str,
        program_id: &str,
        booking_amount: i64,
    ) -> Result<DiscountQuote> {
        let program = self.load_program(program_id).await?;
        let row = self.load_progress(customer_id, program_id).await?;
        Self::ensure_usable(&row)?;

        let discount = self.compute_discount(&program, booking_amount).await?;
        Ok(DiscountQuote {
            program_id: program.id,
            reward_type: program.reward_type,
            booking_amount,
            discount,
            payable: booking_amount - discount,
        })
    }

    /// 核销奖励并计算最终折扣（至多一次）
    ///
    /// 单个逻辑事务：折扣计算 -> 进度行 CAS 置已核销 -> 兑换码置已用。
    /// 同一解锁第二次核销在 CAS 处失败，返回 AlreadyRedeemed。
    #[instrument(skip(self), fields(customer_id = %customer_id, program_id = %program_id))]
    pub async fn apply_reward(
        &self,
        customer_id: &str,
        program_id: &str,
        booking_amount: i64,
        now: DateTime<Utc>,
    ) -> Result<ApplyRewardResponse> {
        let program = self.load_program(program_id).await?;
        let _guard = self
            .locks
            .acquire(&lock_keys::progress(customer_id, &program.business_id))
            .await;

        let row = self.load_progress(customer_id, program_id).await?;
        Self::ensure_usable(&row)?;

        // 折扣先算后核销：免费服务的目录校验失败时不消耗解锁
        let discount = self.compute_discount(&program, booking_amount).await?;

        if !self.progress.mark_redeemed(customer_id, program_id).await? {
            return Err(LoyaltyError::AlreadyRedeemed {
                customer_id: customer_id.to_string(),
                program_id: program_id.to_string(),
            });
        }

        // 兑换码（存在时）一并核销；码已被单独用掉也不回滚进度核销
        let voucher_code = match self.vouchers.find_usable(customer_id, program_id, now).await? {
            Some(voucher) => self
                .vouchers
                .mark_used(&voucher.code, now)
                .await?
                .map(|v| v.code),
            None => None,
        };

        info!(discount, voucher_code = ?voucher_code, "奖励已核销");
        Ok(ApplyRewardResponse {
            program_id: program_id.to_string(),
            customer_id: customer_id.to_string(),
            discount,
            payable: booking_amount - discount,
            voucher_code,
            redeemed_at: now,
        })
    }

    /// 按兑换码核销（持码即可，不要求给出计划）
    #[instrument(skip(self), fields(code = %code))]
    pub async fn apply_by_code(
        &self,
        code: &str,
        booking_amount: i64,
        now: DateTime<Utc>,
    ) -> Result<ApplyRewardResponse> {
        let voucher = self
            .vouchers
            .get_by_code(code)
            .await?
            .ok_or_else(|| LoyaltyError::not_found("Voucher", code))?;

        let _guard = self
            .locks
            .acquire(&lock_keys::progress(
                &voucher.customer_id,
                &voucher.business_id,
            ))
            .await;

        let discount = self.discount_for_voucher(&voucher, booking_amount).await?;

        // 码值 CAS 是核销的权威判定
        let Some(used) = self.vouchers.mark_used(code, now).await? else {
            if voucher.used {
                return Err(LoyaltyError::AlreadyRedeemed {
                    customer_id: voucher.customer_id.clone(),
                    program_id: voucher.program_id.clone(),
                });
            }
            return Err(LoyaltyError::Validation(format!("兑换码 {code} 已过期")));
        };

        // 进度行同步置已核销；码是权威，这里的翻转结果不影响成败
        self.progress
            .mark_redeemed(&used.customer_id, &used.program_id)
            .await?;

        info!(discount, customer_id = %used.customer_id, "兑换码已核销");
        Ok(ApplyRewardResponse {
            program_id: used.program_id,
            customer_id: used.customer_id,
            discount,
            payable: booking_amount - discount,
            voucher_code: Some(used.code),
            redeemed_at: now,
        })
    }

    /// 积分兑换预留（预订确认时调用，完成/取消由事件管道结转/释放）
    #[instrument(skip(self, request), fields(user_id = %request.user_id, booking_id = %request.booking_id))]
    pub async fn redeem_points(
        &self,
        request: RedeemPointsRequest,
        now: DateTime<Utc>,
    ) -> Result<LedgerEntry> {
        validated(&request)?;

        let _guard = self
            .locks
            .acquire(&lock_keys::ledger(&request.user_id))
            .await;
        self.ledger
            .reserve(
                &request.user_id,
                &request.booking_id,
                request.points,
                request.booking_total,
                now,
            )
            .await
    }

    // ==================== 私有方法 ====================

    async fn load_program(&self, program_id: &str) -> Result<LoyaltyProgram> {
        let program = self
            .programs
            .get(program_id)
            .await?
            .ok_or_else(|| LoyaltyError::not_found("LoyaltyProgram", program_id))?;
        if !program.is_active {
            return Err(LoyaltyError::Validation(format!(
                "计划 {program_id} 未启用"
            )));
        }
        Ok(program)
    }

    async fn load_progress(
        &self,
        customer_id: &str,
        program_id: &str,
    ) -> Result<CustomerProgress> {
        self.progress
            .get(customer_id, program_id)
            .await?
            .ok_or_else(|| LoyaltyError::not_found("CustomerProgress", program_id))
    }

    fn ensure_usable(row: &CustomerProgress) -> Result<()> {
        if row.reward_redeemed {
            return Err(LoyaltyError::AlreadyRedeemed {
                customer_id: row.customer_id.clone(),
                program_id: row.program_id.clone(),
            });
        }
        if !row.reward_unlocked || row.opt_out {
            return Err(LoyaltyError::Validation(
                "奖励尚未解锁或客户已退出".to_string(),
            ));
        }
        Ok(())
    }

    async fn compute_discount(
        &self,
        program: &LoyaltyProgram,
        booking_amount: i64,
    ) -> Result<i64> {
        let cheapest = if program.reward_type == RewardType::FreeService {
            self.catalog
                .cheapest_active_price(&program.business_id)
                .await?
        } else {
            None
        };
        RewardEvaluator::discount(program, booking_amount, cheapest)
    }

    async fn discount_for_voucher(&self, voucher: &Voucher, booking_amount: i64) -> Result<i64> {
        let cheapest = if voucher.reward_type == RewardType::FreeService {
            self.catalog
                .cheapest_active_price(&voucher.business_id)
                .await?
        } else {
            None
        };
        RewardEvaluator::discount_for(
            voucher.reward_type,
            voucher.reward_value,
            booking_amount,
            cheapest,
        )
    }
}
