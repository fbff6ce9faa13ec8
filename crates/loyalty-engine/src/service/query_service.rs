//! 查询服务
//!
//! 面向宿主系统的只读视图：客户进度概览、积分余额摘要、账本流水。
//! 不产生任何状态变更，不加锁。

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::instrument;

use loyalty_shared::error::Result;

use crate::ledger::RedemptionLedger;
use crate::models::Voucher;
use crate::progress::ProgressCalculator;
use crate::repository::{
    LedgerRepositoryTrait, ProgramRepositoryTrait, ProgressRepositoryTrait,
    VoucherRepositoryTrait,
};
use crate::service::dto::{BalanceSummaryDto, LedgerEntryDto, ProgressOverviewDto};

/// 查询服务
pub struct QueryService<LR>
where
    LR: LedgerRepositoryTrait,
{
    programs: Arc<dyn ProgramRepositoryTrait>,
    progress: Arc<dyn ProgressRepositoryTrait>,
    vouchers: Arc<dyn VoucherRepositoryTrait>,
    ledger: Arc<RedemptionLedger<LR>>,
}

impl<LR> QueryService<LR>
where
    LR: LedgerRepositoryTrait,
{
    pub fn new(
        programs: Arc<dyn ProgramRepositoryTrait>,
        progress: Arc<dyn ProgressRepositoryTrait>,
        vouchers: Arc<dyn VoucherRepositoryTrait>,
        ledger: Arc<RedemptionLedger<LR>>,
    ) -> Self {
        Self {
            programs,
            progress,
            vouchers,
            ledger,
        }
    }

    /// 客户在某商家所有在售计划中的进度概览
    ///
    /// 尚无进度行的计划按零进度给出；未启用的计划不出现在结果里。
    #[instrument(skip(self), fields(customer_id = %customer_id, business_id = %business_id))]
    pub async fn progress_overview(
        &self,
        customer_id: &str,
        business_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<ProgressOverviewDto>> {
        let mut overview = Vec::new();

        for program in self.programs.list_active_by_business(business_id).await? {
            let row = self
                .progress
                .get(customer_id, &program.id)
                .await?
                .unwrap_or_else(|| {
                    crate::models::CustomerProgress::new(customer_id, business_id, &program.id)
                });

            let Some(snapshot) = ProgressCalculator::snapshot(&program, &row, now) else {
                continue;
            };

            let voucher_code = if snapshot.usable {
                self.vouchers
                    .find_usable(customer_id, &program.id, now)
                    .await?
                    .map(|v| v.code)
            } else {
                None
            };

            overview.push(ProgressOverviewDto {
                program_id: program.id,
                program_type: program.program_type,
                reward_type: program.reward_type,
                current: snapshot.current,
                threshold: snapshot.threshold,
                percentage: snapshot.percentage,
                remaining: snapshot.remaining,
                days_remaining: snapshot.days_remaining,
                unlocked: snapshot.unlocked,
                usable: snapshot.usable,
                voucher_code,
            });
        }

        Ok(overview)
    }

    /// 用户积分余额摘要（含滚动上限余量）
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn balance_summary(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<BalanceSummaryDto> {
        let view = self.ledger.balance_view(user_id, now).await?;
        let cap = self.ledger.cap_points();
        Ok(BalanceSummaryDto {
            user_id: user_id.to_string(),
            balance: view.balance,
            pending: view.pending,
            available: view.available,
            redeemed_in_window: view.redeemed_in_window,
            cap,
            cap_headroom: (cap - view.redeemed_in_window).max(0),
        })
    }

    /// 用户账本流水（时间倒序）
    pub async fn ledger_history(&self, user_id: &str, limit: i64) -> Result<Vec<LedgerEntryDto>> {
        let entries = self.ledger.history(user_id, limit).await?;
        Ok(entries
            .into_iter()
            .map(|e| LedgerEntryDto {
                id: e.id,
                booking_id: e.booking_id,
                points: e.points,
                status: e.status,
                created_at: e.created_at,
            })
            .collect())
    }

    /// 客户名下的兑换码（时间倒序）
    pub async fn customer_vouchers(&self, customer_id: &str) -> Result<Vec<Voucher>> {
        self.vouchers.list_by_customer(customer_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loyalty_shared::config::LoyaltyConfig;

    use crate::models::{
        CustomerProgress, LedgerEntry, LoyaltyProgram, ProgramType, RewardType,
    };
    use crate::repository::memory::{
        InMemoryLedgerRepository, InMemoryProgramRepository, InMemoryProgressRepository,
        InMemoryVoucherRepository,
    };

    struct Fixture {
        service: QueryService<InMemoryLedgerRepository>,
        programs: Arc<InMemoryProgramRepository>,
        progress: Arc<InMemoryProgressRepository>,
        ledger_repo: Arc<InMemoryLedgerRepository>,
    }

    fn fixture() -> Fixture {
        let programs = Arc::new(InMemoryProgramRepository::new());
        let progress = Arc::new(InMemoryProgressRepository::new());
        let vouchers = Arc::new(InMemoryVoucherRepository::new());
        let ledger_repo = Arc::new(InMemoryLedgerRepository::new());
        let ledger = Arc::new(RedemptionLedger::new(
            ledger_repo.clone(),
            &LoyaltyConfig::default(),
        ));
        let service = QueryService::new(programs.clone(), progress.clone(), vouchers, ledger);
        Fixture {
            service,
            programs,
            progress,
            ledger_repo,
        }
    }

    #[tokio::test]
    async fn test_overview_includes_zero_progress_programs() {
        let fixture = fixture();
        let program = LoyaltyProgram::new(
            "biz-001",
            ProgramType::VisitBased,
            5,
            None,
            RewardType::FixedDiscount,
            Some(500),
        );
        fixture.programs.create(&program).await.unwrap();

        let overview = fixture
            .service
            .progress_overview("cust-001", "biz-001", Utc::now())
            .await
            .unwrap();
        assert_eq!(overview.len(), 1);
        assert_eq!(overview[0].current, 0);
        assert_eq!(overview[0].remaining, 5);
        assert!(!overview[0].unlocked);
    }

    #[tokio::test]
    async fn test_overview_skips_inactive_programs() {
        let fixture = fixture();
        let mut program = LoyaltyProgram::new(
            "biz-001",
            ProgramType::VisitBased,
            5,
            None,
            RewardType::FixedDiscount,
            Some(500),
        );
        program.is_active = false;
        fixture.programs.create(&program).await.unwrap();

        let overview = fixture
            .service
            .progress_overview("cust-001", "biz-001", Utc::now())
            .await
            .unwrap();
        assert!(overview.is_empty());
    }

    #[tokio::test]
    async fn test_overview_reports_existing_progress() {
        let fixture = fixture();
        let program = LoyaltyProgram::new(
            "biz-001",
            ProgramType::SpendBased,
            10000,
            None,
            RewardType::PercentageDiscount,
            Some(10),
        );
        fixture.programs.create(&program).await.unwrap();

        let mut row = CustomerProgress::new("cust-001", "biz-001", &program.id);
        row.total_spent = 7500;
        row.visit_count = 3;
        fixture.progress.upsert(&row).await.unwrap();

        let overview = fixture
            .service
            .progress_overview("cust-001", "biz-001", Utc::now())
            .await
            .unwrap();
        assert_eq!(overview[0].current, 7500);
        assert!((overview[0].percentage - 75.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_balance_summary_headroom() {
        let fixture = fixture();
        let now = Utc::now();
        fixture
            .ledger_repo
            .append(&LedgerEntry::accrual("user-001", "bk-1", 6000, now))
            .await
            .unwrap();
        fixture
            .ledger_repo
            .append(&LedgerEntry {
                status: crate::models::LedgerStatus::Deducted,
                ..LedgerEntry::reservation("user-001", "bk-2", 1200, now)
            })
            .await
            .unwrap();

        let summary = fixture
            .service
            .balance_summary("user-001", now)
            .await
            .unwrap();
        assert_eq!(summary.balance, 4800);
        assert_eq!(summary.redeemed_in_window, 1200);
        assert_eq!(summary.cap_headroom, 3800);
    }

    #[tokio::test]
    async fn test_ledger_history_is_limited() {
        let fixture = fixture();
        let now = Utc::now();
        for i in 0..5 {
            fixture
                .ledger_repo
                .append(&LedgerEntry::accrual(
                    "user-001",
                    &format!("bk-{i}"),
                    100,
                    now + chrono::Duration::seconds(i),
                ))
                .await
                .unwrap();
        }

        let history = fixture.service.ledger_history("user-001", 3).await.unwrap();
        assert_eq!(history.len(), 3);
        // 时间倒序
        assert_eq!(history[0].booking_id, "bk-4");
    }
}
