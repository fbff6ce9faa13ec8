//! 忠诚度引擎集成测试
//!
//! 在内存仓储上组装完整管道（事件服务 + 结算服务 + 查询服务），
//! 验证从预订事件到折扣核销的端到端流程。

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use loyalty_engine::models::{LedgerEntry, LedgerStatus, LoyaltyProgram, ProgramType, RewardType};
use loyalty_engine::repository::memory::{
    CollectingDispatcher, InMemoryCatalogRepository, InMemoryLedgerRepository,
    InMemoryProcessedEventRepository, InMemoryProgramRepository, InMemoryProgressRepository,
    InMemoryVoucherRepository,
};
use loyalty_engine::repository::{
    LedgerRepositoryTrait, ProgramRepositoryTrait, ProgressRepositoryTrait,
};
use loyalty_engine::service::dto::RedeemPointsRequest;
use loyalty_engine::{
    CheckoutService, EventService, LockManager, NotificationTrigger, ProgramService, QueryService,
    RedemptionLedger, VoucherService,
};
use loyalty_shared::config::LoyaltyConfig;
use loyalty_shared::error::{LoyaltyError, Result};
use loyalty_shared::events::{BookingEventProcessor, EventEnvelope, NotificationTemplate};
use loyalty_shared::test_utils::{cancelled_booking, completed_booking};

/// 全内存组装的忠诚度引擎
struct Engine {
    programs: Arc<InMemoryProgramRepository>,
    progress: Arc<InMemoryProgressRepository>,
    ledger_repo: Arc<InMemoryLedgerRepository>,
    dispatcher: Arc<CollectingDispatcher>,
    events: EventService<InMemoryVoucherRepository, InMemoryLedgerRepository>,
    checkout: CheckoutService<InMemoryLedgerRepository>,
    query: QueryService<InMemoryLedgerRepository>,
    admin: ProgramService,
}

fn engine() -> Engine {
    let config = LoyaltyConfig::default();
    let programs = Arc::new(InMemoryProgramRepository::new());
    let progress = Arc::new(InMemoryProgressRepository::new());
    let voucher_repo = Arc::new(InMemoryVoucherRepository::new());
    let ledger_repo = Arc::new(InMemoryLedgerRepository::new());
    let catalog = Arc::new(InMemoryCatalogRepository::new());
    let event_repo = Arc::new(InMemoryProcessedEventRepository::new());
    let dispatcher = Arc::new(CollectingDispatcher::new());
    let locks = Arc::new(LockManager::new());

    let vouchers = Arc::new(VoucherService::new(voucher_repo.clone(), &config));
    let ledger = Arc::new(RedemptionLedger::new(ledger_repo.clone(), &config));

    let events = EventService::new(
        programs.clone(),
        progress.clone(),
        event_repo,
        vouchers,
        ledger.clone(),
        dispatcher.clone(),
        locks.clone(),
        NotificationTrigger::new(config.spend_alert_percent),
    );
    let checkout = CheckoutService::new(
        programs.clone(),
        progress.clone(),
        catalog.clone(),
        voucher_repo.clone(),
        ledger.clone(),
        locks,
    );
    let query = QueryService::new(
        programs.clone(),
        progress.clone(),
        voucher_repo,
        ledger,
    );
    let admin = ProgramService::new(programs.clone(), progress.clone(), catalog);

    Engine {
        programs,
        progress,
        ledger_repo,
        dispatcher,
        events,
        checkout,
        query,
        admin,
    }
}

async fn seed_program(
    engine: &Engine,
    program_type: ProgramType,
    threshold: i64,
    time_limit_days: Option<i64>,
    reward_type: RewardType,
    reward_value: Option<i64>,
) -> LoyaltyProgram {
    let program = LoyaltyProgram::new(
        "biz-001",
        program_type,
        threshold,
        time_limit_days,
        reward_type,
        reward_value,
    );
    engine.programs.create(&program).await.unwrap();
    program
}

async fn complete_booking(engine: &Engine, booking_id: &str, amount: i64, at: DateTime<Utc>) {
    let envelope = EventEnvelope::new(
        completed_booking(booking_id, "cust-001", "biz-001", amount, at),
        "booking-service",
    );
    engine.events.process(&envelope).await.unwrap();
}

#[tokio::test]
async fn test_visit_based_unlock_flow_with_one_shot_notifications() {
    let engine = engine();
    let program = seed_program(
        &engine,
        ProgramType::VisitBased,
        5,
        None,
        RewardType::PercentageDiscount,
        Some(20),
    )
    .await;
    let start = Utc::now();

    // 前 4 次预订：第 4 次触发"即将解锁"，且只触发一次
    for i in 0..4 {
        complete_booking(&engine, &format!("bk-{i}"), 5000, start + Duration::days(i)).await;
    }
    let almost: Vec<_> = engine
        .dispatcher
        .payloads()
        .into_iter()
        .filter(|p| p.template == NotificationTemplate::AlmostUnlocked)
        .collect();
    assert_eq!(almost.len(), 1);
    assert_eq!(almost[0].data["remaining"], 1);

    // 第 5 次预订：解锁一次，百分比 100，兑换码随通知带出
    complete_booking(&engine, "bk-4", 5000, start + Duration::days(4)).await;
    let unlocked: Vec<_> = engine
        .dispatcher
        .payloads()
        .into_iter()
        .filter(|p| p.template == NotificationTemplate::RewardUnlocked)
        .collect();
    assert_eq!(unlocked.len(), 1);
    assert!(unlocked[0].data["voucherCode"].is_string());

    let overview = engine
        .query
        .progress_overview("cust-001", "biz-001", start + Duration::days(4))
        .await
        .unwrap();
    assert_eq!(overview.len(), 1);
    assert!((overview[0].percentage - 100.0).abs() < f64::EPSILON);
    assert!(overview[0].unlocked);
    assert!(overview[0].usable);
    assert!(overview[0].voucher_code.is_some());

    // 第 6 次预订不重发任何通知
    complete_booking(&engine, "bk-5", 5000, start + Duration::days(5)).await;
    assert_eq!(engine.dispatcher.count(), 2);

    // 20% 折扣核销：£50 订单折 £10，整单至多一次
    let applied = engine
        .checkout
        .apply_reward("cust-001", &program.id, 5000, start + Duration::days(6))
        .await
        .unwrap();
    assert_eq!(applied.discount, 1000);
    assert!(applied.voucher_code.is_some());

    let err = engine
        .checkout
        .apply_reward("cust-001", &program.id, 5000, start + Duration::days(6))
        .await
        .unwrap_err();
    assert!(matches!(err, LoyaltyError::AlreadyRedeemed { .. }));
}

#[tokio::test]
async fn test_duplicate_envelope_is_a_no_op() {
    let engine = engine();
    seed_program(
        &engine,
        ProgramType::VisitBased,
        5,
        None,
        RewardType::FixedDiscount,
        Some(500),
    )
    .await;

    let envelope = EventEnvelope::new(
        completed_booking("bk-1", "cust-001", "biz-001", 5000, Utc::now()),
        "booking-service",
    );
    let first = engine.events.process(&envelope).await.unwrap();
    assert!(first.processed);
    assert_eq!(first.points_accrued, 250);

    // 同一信封重复投递：进度与积分都不再变化
    let second = engine.events.process(&envelope).await.unwrap();
    assert!(!second.processed);
    assert_eq!(second.points_accrued, 0);

    assert!(engine.events.is_processed(&envelope.event_id).await.unwrap());

    let row = engine
        .progress
        .list_by_pair("cust-001", "biz-001")
        .await
        .unwrap()
        .remove(0);
    assert_eq!(row.visit_count, 1);
    assert_eq!(
        engine.ledger_repo.balance("cust-001").await.unwrap(),
        250
    );
}

#[tokio::test]
async fn test_reservation_lifecycle_through_events() {
    let engine = engine();
    let now = Utc::now();
    // 预先灌入余额
    engine
        .ledger_repo
        .append(&LedgerEntry::accrual("cust-001", "bk-fund", 2000, now))
        .await
        .unwrap();

    let before = engine.query.balance_summary("cust-001", now).await.unwrap();

    // 预订确认时预留 500 积分
    engine
        .checkout
        .redeem_points(
            RedeemPointsRequest {
                user_id: "cust-001".to_string(),
                booking_id: "bk-1".to_string(),
                points: 500,
                booking_total: 5000,
            },
            now,
        )
        .await
        .unwrap();
    let reserved = engine.query.balance_summary("cust-001", now).await.unwrap();
    assert_eq!(reserved.available, before.available - 500);
    assert_eq!(reserved.balance, before.balance);

    // 取消事件释放预留，可用余额还原
    let cancel = EventEnvelope::new(
        cancelled_booking("bk-1", "cust-001", "biz-001", 5000, now),
        "booking-service",
    );
    let outcome = engine.events.process(&cancel).await.unwrap();
    assert!(outcome.reservation_released);

    let after = engine.query.balance_summary("cust-001", now).await.unwrap();
    assert_eq!(after.available, before.available);
    assert_eq!(after.balance, before.balance);
}

#[tokio::test]
async fn test_completed_booking_commits_reservation() {
    let engine = engine();
    let now = Utc::now();
    engine
        .ledger_repo
        .append(&LedgerEntry::accrual("cust-001", "bk-fund", 2000, now))
        .await
        .unwrap();

    engine
        .checkout
        .redeem_points(
            RedeemPointsRequest {
                user_id: "cust-001".to_string(),
                booking_id: "bk-1".to_string(),
                points: 500,
                booking_total: 5000,
            },
            now,
        )
        .await
        .unwrap();

    let envelope = EventEnvelope::new(
        completed_booking("bk-1", "cust-001", "biz-001", 5000, now),
        "booking-service",
    );
    let outcome = engine.events.process(&envelope).await.unwrap();
    assert!(outcome.reservation_committed);
    // 完成同时按 5% 累积 250 积分
    assert_eq!(outcome.points_accrued, 250);

    let summary = engine.query.balance_summary("cust-001", now).await.unwrap();
    // 2000 - 500 (已扣减) + 250 (累积)
    assert_eq!(summary.balance, 1750);
    assert_eq!(summary.pending, 0);
    assert_eq!(summary.redeemed_in_window, 500);
}

#[tokio::test]
async fn test_spend_based_alert_at_eighty_percent() {
    let engine = engine();
    seed_program(
        &engine,
        ProgramType::SpendBased,
        10000,
        None,
        RewardType::FixedDiscount,
        Some(1000),
    )
    .await;
    let start = Utc::now();

    complete_booking(&engine, "bk-1", 7900, start).await;
    assert_eq!(engine.dispatcher.count(), 0);

    // 累计 8100 便士，越过 80% 告警线
    complete_booking(&engine, "bk-2", 200, start + Duration::days(1)).await;
    let payloads = engine.dispatcher.payloads();
    assert_eq!(payloads.len(), 1);
    assert_eq!(payloads[0].template, NotificationTemplate::AlmostUnlocked);

    // 达标解锁
    complete_booking(&engine, "bk-3", 2000, start + Duration::days(2)).await;
    let payloads = engine.dispatcher.payloads();
    assert_eq!(payloads.len(), 2);
    assert_eq!(payloads[1].template, NotificationTemplate::RewardUnlocked);
}

#[tokio::test]
async fn test_time_limited_window_rearms_and_realerts() {
    let engine = engine();
    seed_program(
        &engine,
        ProgramType::TimeLimited,
        3,
        Some(30),
        RewardType::FixedDiscount,
        Some(500),
    )
    .await;
    let start = Utc::now();

    // 窗口内 2 次（第 2 次触发"即将解锁"），然后窗口过期
    complete_booking(&engine, "bk-1", 3000, start).await;
    complete_booking(&engine, "bk-2", 3000, start + Duration::days(3)).await;
    assert_eq!(engine.dispatcher.count(), 1);

    // 40 天后的预订：窗口重锚定，计数从 1 重来
    let late = start + Duration::days(40);
    complete_booking(&engine, "bk-3", 3000, late).await;
    let row = engine
        .progress
        .list_by_pair("cust-001", "biz-001")
        .await
        .unwrap()
        .remove(0);
    assert_eq!(row.visit_count, 1);
    assert_eq!(row.first_visit_date, Some(late));
    assert!(!row.reward_unlocked);

    // 新窗口内再次接近阈值可重新提醒，随后解锁
    complete_booking(&engine, "bk-4", 3000, late + Duration::days(1)).await;
    complete_booking(&engine, "bk-5", 3000, late + Duration::days(2)).await;
    let templates: Vec<_> = engine
        .dispatcher
        .payloads()
        .into_iter()
        .map(|p| p.template)
        .collect();
    assert_eq!(
        templates,
        vec![
            NotificationTemplate::AlmostUnlocked,
            NotificationTemplate::AlmostUnlocked,
            NotificationTemplate::RewardUnlocked,
        ]
    );
}

#[tokio::test]
async fn test_opt_out_resets_and_blocks_until_opt_in() {
    let engine = engine();
    seed_program(
        &engine,
        ProgramType::VisitBased,
        5,
        None,
        RewardType::FixedDiscount,
        Some(500),
    )
    .await;
    let start = Utc::now();

    for i in 0..5 {
        complete_booking(&engine, &format!("bk-{i}"), 5000, start + Duration::days(i)).await;
    }
    let balance_before = engine.ledger_repo.balance("cust-001").await.unwrap();
    assert!(balance_before > 0);

    // 退出：进度清零、兑换码作废
    engine.events.opt_out("cust-001", "biz-001").await.unwrap();
    let overview = engine
        .query
        .progress_overview("cust-001", "biz-001", start + Duration::days(6))
        .await
        .unwrap();
    assert_eq!(overview[0].current, 0);
    assert!(!overview[0].unlocked);
    assert!(overview[0].voucher_code.is_none());

    // 退出期间不累积进度与积分
    complete_booking(&engine, "bk-out", 5000, start + Duration::days(7)).await;
    let row = engine
        .progress
        .list_by_pair("cust-001", "biz-001")
        .await
        .unwrap()
        .remove(0);
    assert_eq!(row.visit_count, 0);
    assert_eq!(
        engine.ledger_repo.balance("cust-001").await.unwrap(),
        balance_before
    );

    // 重新加入后从零开始推进
    engine.events.opt_in("cust-001", "biz-001").await.unwrap();
    complete_booking(&engine, "bk-back", 5000, start + Duration::days(8)).await;
    let row = engine
        .progress
        .list_by_pair("cust-001", "biz-001")
        .await
        .unwrap()
        .remove(0);
    assert_eq!(row.visit_count, 1);
}

#[tokio::test]
async fn test_program_management_round_trip() {
    let engine = engine();
    let program = engine
        .admin
        .create_program(loyalty_engine::service::dto::CreateProgramRequest {
            business_id: "biz-001".to_string(),
            program_type: ProgramType::VisitBased,
            threshold: 5,
            time_limit_days: None,
            reward_type: RewardType::FixedDiscount,
            reward_value: Some(500),
        })
        .await
        .unwrap();

    // 产生进度后阈值被冻结
    complete_booking(&engine, "bk-1", 5000, Utc::now()).await;
    let err = engine
        .admin
        .update_program(
            &program.id,
            loyalty_engine::service::dto::UpdateProgramRequest {
                threshold: Some(10),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, LoyaltyError::Validation(_)));

    // 停用后事件不再推进该计划
    engine.admin.set_active(&program.id, false).await.unwrap();
    complete_booking(&engine, "bk-2", 5000, Utc::now()).await;
    let row = engine
        .progress
        .list_by_pair("cust-001", "biz-001")
        .await
        .unwrap()
        .remove(0);
    assert_eq!(row.visit_count, 1);
}

#[tokio::test]
async fn test_concurrent_events_never_double_count() {
    let engine = Arc::new(engine());
    seed_program(
        &engine,
        ProgramType::VisitBased,
        10,
        None,
        RewardType::FixedDiscount,
        Some(500),
    )
    .await;
    let now = Utc::now();

    // 10 个预订事件并发投递，进度与积分都必须精确累计
    let mut handles = Vec::new();
    for i in 0..10 {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            let envelope = EventEnvelope::new(
                completed_booking(&format!("bk-{i}"), "cust-001", "biz-001", 1000, now),
                "booking-service",
            );
            engine.events.process(&envelope).await.unwrap();
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let row = engine
        .progress
        .list_by_pair("cust-001", "biz-001")
        .await
        .unwrap()
        .remove(0);
    assert_eq!(row.visit_count, 10);
    assert!(row.reward_unlocked);
    assert_eq!(engine.ledger_repo.balance("cust-001").await.unwrap(), 500);
    // 解锁恰好一次
    let unlocked = engine
        .dispatcher
        .payloads()
        .into_iter()
        .filter(|p| p.template == NotificationTemplate::RewardUnlocked)
        .count();
    assert_eq!(unlocked, 1);
}

/// 第一次写入失败的账本仓储，模拟瞬时数据库故障
struct FlakyLedgerRepository {
    inner: InMemoryLedgerRepository,
    fail_next_append: AtomicBool,
}

#[async_trait]
impl LedgerRepositoryTrait for FlakyLedgerRepository {
    async fn append(&self, entry: &LedgerEntry) -> Result<()> {
        if self.fail_next_append.swap(false, Ordering::SeqCst) {
            return Err(LoyaltyError::Database(sqlx::Error::PoolTimedOut));
        }
        self.inner.append(entry).await
    }

    async fn flip_status(
        &self,
        booking_id: &str,
        from: LedgerStatus,
        to: LedgerStatus,
    ) -> Result<Option<LedgerEntry>> {
        self.inner.flip_status(booking_id, from, to).await
    }

    async fn find_by_booking(&self, booking_id: &str) -> Result<Vec<LedgerEntry>> {
        self.inner.find_by_booking(booking_id).await
    }

    async fn balance(&self, user_id: &str) -> Result<i64> {
        self.inner.balance(user_id).await
    }

    async fn pending_total(&self, user_id: &str) -> Result<i64> {
        self.inner.pending_total(user_id).await
    }

    async fn redeemed_since(&self, user_id: &str, since: DateTime<Utc>) -> Result<i64> {
        self.inner.redeemed_since(user_id, since).await
    }

    async fn list_by_user(&self, user_id: &str, limit: i64) -> Result<Vec<LedgerEntry>> {
        self.inner.list_by_user(user_id, limit).await
    }
}

#[tokio::test]
async fn test_failed_accrual_leaves_event_redeliverable() {
    let config = LoyaltyConfig::default();
    let programs = Arc::new(InMemoryProgramRepository::new());
    let progress = Arc::new(InMemoryProgressRepository::new());
    let voucher_repo = Arc::new(InMemoryVoucherRepository::new());
    let ledger_repo = Arc::new(FlakyLedgerRepository {
        inner: InMemoryLedgerRepository::new(),
        fail_next_append: AtomicBool::new(true),
    });
    let dispatcher = Arc::new(CollectingDispatcher::new());

    let events = EventService::new(
        programs.clone(),
        progress.clone(),
        Arc::new(InMemoryProcessedEventRepository::new()),
        Arc::new(VoucherService::new(voucher_repo, &config)),
        Arc::new(RedemptionLedger::new(ledger_repo.clone(), &config)),
        dispatcher,
        Arc::new(LockManager::new()),
        NotificationTrigger::new(config.spend_alert_percent),
    );

    let program = LoyaltyProgram::new(
        "biz-001",
        ProgramType::VisitBased,
        5,
        None,
        RewardType::FixedDiscount,
        Some(500),
    );
    programs.create(&program).await.unwrap();

    let envelope = EventEnvelope::new(
        completed_booking("bk-1", "cust-001", "biz-001", 5000, Utc::now()),
        "booking-service",
    );

    // 第一次投递在积分累积处遇到数据库故障，事件不落幂等标记
    let err = events.process(&envelope).await.unwrap_err();
    assert!(matches!(err, LoyaltyError::Database(_)));
    assert!(!events.is_processed(&envelope.event_id).await.unwrap());

    // 重投递完整重试：进度与积分都只记一次
    let outcome = events.process(&envelope).await.unwrap();
    assert!(outcome.processed);
    assert_eq!(outcome.points_accrued, 250);
    assert!(events.is_processed(&envelope.event_id).await.unwrap());

    assert_eq!(ledger_repo.inner.balance("cust-001").await.unwrap(), 250);
    let row = progress
        .list_by_pair("cust-001", "biz-001")
        .await
        .unwrap()
        .remove(0);
    assert_eq!(row.visit_count, 1);
}
