//! 预订事件服务
//!
//! 忠诚度模块的入口管道：消费预订生命周期事件，推进各计划进度、
//! 结转/释放积分预留、累积积分、发放兑换码并产出通知载荷。
//! 模块只对事件做出反应，从不主动发起预订操作。
//!
//! ## 完成事件流程
//!
//! 1. 按 (customer, business) 与用户账本加锁 -> 2. 幂等检查
//! -> 3. 结转该预订的积分预留 -> 4. 按比例累积积分
//! -> 5. 逐个推进商家的在售计划：进度步进 -> 解锁判定 -> 新解锁发码
//!    -> 通知触发 -> 持久化 -> 6. 全部成功后落幂等标记
//!
//! 单个计划推进失败只记入结果的 errors，不阻断其他计划。
//! 账本或进度写入失败时事件不落幂等标记，重投递可完整重试。
//! 取消事件只释放预留，进度与累积永不回退。

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, instrument, warn};

use loyalty_shared::error::{LoyaltyError, Result};
use loyalty_shared::events::{
    BookingEvent, BookingEventProcessor, EventEnvelope, EventOutcome, NotificationDispatcher,
    NotificationPayload, ProgramUpdate,
};

use crate::ledger::RedemptionLedger;
use crate::lock::{LockManager, lock_keys};
use crate::models::{CustomerProgress, LoyaltyProgram};
use crate::notify::NotificationTrigger;
use crate::progress::ProgressCalculator;
use crate::repository::{
    LedgerRepositoryTrait, ProcessedEventRepositoryTrait, ProgramRepositoryTrait,
    ProgressRepositoryTrait, VoucherRepositoryTrait,
};
use crate::reward::RewardEvaluator;
use crate::voucher::VoucherService;

/// 单个计划推进的结果（更新 + 应交付的通知）
struct ProgramAdvance {
    update: ProgramUpdate,
    notifications: Vec<NotificationPayload>,
}

/// 预订事件服务
pub struct EventService<VR, LR>
where
    VR: VoucherRepositoryTrait,
    LR: LedgerRepositoryTrait,
{
    programs: Arc<dyn ProgramRepositoryTrait>,
    progress: Arc<dyn ProgressRepositoryTrait>,
    events: Arc<dyn ProcessedEventRepositoryTrait>,
    vouchers: Arc<VoucherService<VR>>,
    ledger: Arc<RedemptionLedger<LR>>,
    dispatcher: Arc<dyn NotificationDispatcher>,
    locks: Arc<LockManager>,
    trigger: NotificationTrigger,
}

impl<VR, LR> EventService<VR, LR>
where
    VR: VoucherRepositoryTrait,
    LR: LedgerRepositoryTrait,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        programs: Arc<dyn ProgramRepositoryTrait>,
        progress: Arc<dyn ProgressRepositoryTrait>,
        events: Arc<dyn ProcessedEventRepositoryTrait>,
        vouchers: Arc<VoucherService<VR>>,
        ledger: Arc<RedemptionLedger<LR>>,
        dispatcher: Arc<dyn NotificationDispatcher>,
        locks: Arc<LockManager>,
        trigger: NotificationTrigger,
    ) -> Self {
        Self {
            programs,
            progress,
            events,
            vouchers,
            ledger,
            dispatcher,
            locks,
            trigger,
        }
    }

    /// 预订完成处理（调用方已持锁、已通过幂等检查）
    async fn handle_completed(
        &self,
        envelope: &EventEnvelope,
        booking_id: &str,
        customer_id: &str,
        business_id: &str,
        total_amount: i64,
        occurred_at: DateTime<Utc>,
    ) -> Result<EventOutcome> {
        // 3. 结转该预订的积分预留（没有预留是正常路径）
        let reservation_committed = match self.ledger.commit(booking_id).await {
            Ok(_) => true,
            Err(LoyaltyError::NotFound { .. }) => false,
            Err(e) => return Err(e),
        };

        // 退出客户不再累积积分与进度
        let opted_out = self
            .progress
            .list_by_pair(customer_id, business_id)
            .await?
            .iter()
            .any(|p| p.opt_out);

        // 4. 按比例累积积分
        let points_accrued = if opted_out {
            0
        } else {
            self.ledger
                .earn(customer_id, booking_id, total_amount, occurred_at)
                .await?
        };

        let mut outcome = EventOutcome {
            event_id: envelope.event_id.clone(),
            processed: true,
            points_accrued,
            reservation_committed,
            reservation_released: false,
            program_updates: Vec::new(),
            notifications: Vec::new(),
            errors: Vec::new(),
        };

        if opted_out {
            info!(customer_id = %customer_id, "客户已退出, 跳过进度推进");
            return Ok(outcome);
        }

        // 5. 逐个推进商家的在售计划，单个失败不阻断其余
        for program in self.programs.list_active_by_business(business_id).await? {
            match self
                .advance_program(&program, customer_id, total_amount, occurred_at)
                .await
            {
                Ok(Some(advance)) => {
                    for payload in &advance.notifications {
                        // 推送失败不影响业务流程
                        if let Err(e) = self.dispatcher.dispatch(payload.clone()).await {
                            warn!(program_id = %program.id, error = %e, "通知交付失败");
                        }
                    }
                    outcome.notifications.extend(advance.notifications);
                    outcome.program_updates.push(advance.update);
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(program_id = %program.id, error = %e, "计划推进失败");
                    outcome.errors.push(format!("{}: {e}", program.id));
                }
            }
        }

        info!(
            points_accrued,
            reservation_committed,
            programs = outcome.program_updates.len(),
            "预订完成事件已处理"
        );
        Ok(outcome)
    }

    /// 推进单个计划：进度步进 -> 解锁判定 -> 新解锁发码 -> 通知触发
    async fn advance_program(
        &self,
        program: &LoyaltyProgram,
        customer_id: &str,
        total_amount: i64,
        occurred_at: DateTime<Utc>,
    ) -> Result<Option<ProgramAdvance>> {
        let mut row = match self.progress.get(customer_id, &program.id).await? {
            Some(row) if row.opt_out => return Ok(None),
            Some(row) => row,
            None => CustomerProgress::new(customer_id, &program.business_id, &program.id),
        };

        ProgressCalculator::record_completed(program, &mut row, total_amount, occurred_at);

        let was_unlocked = row.reward_unlocked;
        if RewardEvaluator::is_unlocked(program, &row, occurred_at) {
            row.reward_unlocked = true;
        }
        let newly_unlocked = !was_unlocked && row.reward_unlocked;

        let voucher_code = if newly_unlocked {
            let voucher = self.vouchers.issue(customer_id, program, occurred_at).await?;
            Some(voucher.code)
        } else {
            None
        };

        let notifications =
            self.trigger
                .evaluate(program, &mut row, voucher_code.as_deref(), occurred_at);

        self.progress.upsert(&row).await?;

        if newly_unlocked {
            info!(
                customer_id = %customer_id,
                program_id = %program.id,
                voucher_code = ?voucher_code,
                "奖励新解锁"
            );
        }

        let current = row.current_for(program.program_type);
        Ok(Some(ProgramAdvance {
            update: ProgramUpdate {
                program_id: program.id.clone(),
                current,
                percentage: ProgressCalculator::percentage(current, program.threshold),
                newly_unlocked,
                voucher_code,
            },
            notifications,
        }))
    }

    /// 预订取消处理：只释放预留，进度与累积不回退
    async fn handle_cancelled(
        &self,
        envelope: &EventEnvelope,
        booking_id: &str,
    ) -> Result<EventOutcome> {
        let released = self.ledger.release(booking_id).await?.is_some();

        info!(booking_id = %booking_id, released, "预订取消事件已处理");
        Ok(EventOutcome {
            event_id: envelope.event_id.clone(),
            processed: true,
            points_accrued: 0,
            reservation_committed: false,
            reservation_released: released,
            program_updates: Vec::new(),
            notifications: Vec::new(),
            errors: Vec::new(),
        })
    }

    /// 客户退出 (customer, business) 下的所有计划（GDPR）
    ///
    /// 进度与标志清零、opt_out 置位、未核销兑换码作废；
    /// 重新加入前不再累积进度与积分。
    #[instrument(skip(self), fields(customer_id = %customer_id, business_id = %business_id))]
    pub async fn opt_out(&self, customer_id: &str, business_id: &str) -> Result<()> {
        let _guard = self
            .locks
            .acquire(&lock_keys::progress(customer_id, business_id))
            .await;
        let now = Utc::now();

        for mut row in self.progress.list_by_pair(customer_id, business_id).await? {
            row.reset(now);
            row.opt_out = true;
            self.progress.upsert(&row).await?;
        }

        let expired = self
            .vouchers
            .expire_for_pair(customer_id, business_id, now)
            .await?;

        info!(expired_vouchers = expired, "客户已退出计划");
        Ok(())
    }

    /// 客户重新加入（清除 opt_out 标志，从零开始）
    #[instrument(skip(self), fields(customer_id = %customer_id, business_id = %business_id))]
    pub async fn opt_in(&self, customer_id: &str, business_id: &str) -> Result<()> {
        let _guard = self
            .locks
            .acquire(&lock_keys::progress(customer_id, business_id))
            .await;

        for mut row in self.progress.list_by_pair(customer_id, business_id).await? {
            if row.opt_out {
                row.opt_out = false;
                row.updated_at = Utc::now();
                self.progress.upsert(&row).await?;
            }
        }

        info!("客户已重新加入计划");
        Ok(())
    }
}

#[async_trait::async_trait]
impl<VR, LR> BookingEventProcessor for EventService<VR, LR>
where
    VR: VoucherRepositoryTrait,
    LR: LedgerRepositoryTrait,
{
    #[instrument(
        skip(self, envelope),
        fields(
            event_id = %envelope.event_id,
            booking_id = %envelope.event.booking_id(),
            customer_id = %envelope.event.customer_id(),
        )
    )]
    async fn process(&self, envelope: &EventEnvelope) -> Result<EventOutcome> {
        let customer_id = envelope.event.customer_id();
        let business_id = envelope.event.business_id();

        // 1. 固定顺序加锁：进度键 -> 账本键，避免与结算路径交错
        let _progress_guard = self
            .locks
            .acquire(&lock_keys::progress(customer_id, business_id))
            .await;
        let _ledger_guard = self.locks.acquire(&lock_keys::ledger(customer_id)).await;

        // 2. 幂等检查：重复投递直接返回空结果（锁内检查, 进程内无竞争）
        if self.events.is_processed(&envelope.event_id).await? {
            info!("事件重复投递, 跳过");
            return Ok(EventOutcome::duplicate(&envelope.event_id));
        }

        // 3. 穷尽匹配事件变体
        let outcome = match &envelope.event {
            BookingEvent::Completed {
                booking_id,
                customer_id,
                business_id,
                total_amount,
                timestamp,
                ..
            } => {
                self.handle_completed(
                    envelope,
                    booking_id,
                    customer_id,
                    business_id,
                    *total_amount,
                    *timestamp,
                )
                .await?
            }
            BookingEvent::Cancelled { booking_id, .. } => {
                self.handle_cancelled(envelope, booking_id).await?
            }
        };

        // 4. 全部成功后才落幂等标记：失败的事件不留痕, 重投递可完整重试；
        //    账本翻转与幂等表写入都是条件更新, 跨进程重放不会重复生效
        self.events.try_mark_processed(&envelope.event_id).await?;
        Ok(outcome)
    }

    async fn is_processed(&self, event_id: &str) -> Result<bool> {
        self.events.is_processed(event_id).await
    }
}
