//! 内存仓储实现
//!
//! 基于 DashMap 的全套仓储实现，供集成测试与开发环境使用。
//! 语义与 PostgreSQL 实现对齐：条件更新同样是"不满足则不生效"的
//! CAS，幂等表同样是先占式写入。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::Mutex;

use loyalty_shared::error::{LoyaltyError, Result};
use loyalty_shared::events::{NotificationDispatcher, NotificationPayload};

use super::traits::{
    CatalogRepositoryTrait, LedgerRepositoryTrait, ProcessedEventRepositoryTrait,
    ProgramRepositoryTrait, ProgressRepositoryTrait, VoucherRepositoryTrait,
};
use crate::models::{
    BusinessService, CustomerProgress, LedgerEntry, LedgerStatus, LoyaltyProgram, Voucher,
};

fn progress_key(customer_id: &str, program_id: &str) -> String {
    format!("{customer_id}:{program_id}")
}

// ---------------------------------------------------------------------------
// 忠诚度计划
// ---------------------------------------------------------------------------

/// 按计划 ID 索引的内存计划仓储
#[derive(Debug, Default)]
pub struct InMemoryProgramRepository {
    programs: DashMap<String, LoyaltyProgram>,
}

impl InMemoryProgramRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProgramRepositoryTrait for InMemoryProgramRepository {
    async fn get(&self, id: &str) -> Result<Option<LoyaltyProgram>> {
        Ok(self.programs.get(id).map(|p| p.clone()))
    }

    async fn list_by_business(&self, business_id: &str) -> Result<Vec<LoyaltyProgram>> {
        let mut programs: Vec<LoyaltyProgram> = self
            .programs
            .iter()
            .filter(|p| p.business_id == business_id)
            .map(|p| p.clone())
            .collect();
        programs.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(programs)
    }

    async fn list_active_by_business(&self, business_id: &str) -> Result<Vec<LoyaltyProgram>> {
        Ok(self
            .list_by_business(business_id)
            .await?
            .into_iter()
            .filter(|p| p.is_active)
            .collect())
    }

    async fn create(&self, program: &LoyaltyProgram) -> Result<()> {
        self.programs.insert(program.id.clone(), program.clone());
        Ok(())
    }

    async fn update(&self, program: &LoyaltyProgram) -> Result<()> {
        self.programs.insert(program.id.clone(), program.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// 客户进度
// ---------------------------------------------------------------------------

/// 按 (customer, program) 索引的内存进度仓储
#[derive(Debug, Default)]
pub struct InMemoryProgressRepository {
    rows: DashMap<String, CustomerProgress>,
}

impl InMemoryProgressRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProgressRepositoryTrait for InMemoryProgressRepository {
    async fn get(&self, customer_id: &str, program_id: &str) -> Result<Option<CustomerProgress>> {
        Ok(self
            .rows
            .get(&progress_key(customer_id, program_id))
            .map(|p| p.clone()))
    }

    async fn list_by_pair(
        &self,
        customer_id: &str,
        business_id: &str,
    ) -> Result<Vec<CustomerProgress>> {
        Ok(self
            .rows
            .iter()
            .filter(|p| p.customer_id == customer_id && p.business_id == business_id)
            .map(|p| p.clone())
            .collect())
    }

    async fn list_by_customer(&self, customer_id: &str) -> Result<Vec<CustomerProgress>> {
        let mut rows: Vec<CustomerProgress> = self
            .rows
            .iter()
            .filter(|p| p.customer_id == customer_id)
            .map(|p| p.clone())
            .collect();
        rows.sort_by(|a, b| {
            (&a.business_id, &a.program_id).cmp(&(&b.business_id, &b.program_id))
        });
        Ok(rows)
    }

    async fn upsert(&self, progress: &CustomerProgress) -> Result<()> {
        self.rows.insert(
            progress_key(&progress.customer_id, &progress.program_id),
            progress.clone(),
        );
        Ok(())
    }

    async fn mark_redeemed(&self, customer_id: &str, program_id: &str) -> Result<bool> {
        let key = progress_key(customer_id, program_id);
        if let Some(mut row) = self.rows.get_mut(&key) {
            if !row.reward_redeemed {
                row.reward_redeemed = true;
                row.updated_at = Utc::now();
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn exists_for_program(&self, program_id: &str) -> Result<bool> {
        Ok(self.rows.iter().any(|p| p.program_id == program_id))
    }
}

// ---------------------------------------------------------------------------
// 兑换码
// ---------------------------------------------------------------------------

/// 按码值索引的内存兑换码仓储
#[derive(Debug, Default)]
pub struct InMemoryVoucherRepository {
    vouchers: DashMap<String, Voucher>,
}

impl InMemoryVoucherRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VoucherRepositoryTrait for InMemoryVoucherRepository {
    async fn get_by_code(&self, code: &str) -> Result<Option<Voucher>> {
        Ok(self.vouchers.get(code).map(|v| v.clone()))
    }

    async fn code_exists(&self, code: &str) -> Result<bool> {
        Ok(self.vouchers.contains_key(code))
    }

    async fn find_usable(
        &self,
        customer_id: &str,
        program_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Voucher>> {
        let mut usable: Vec<Voucher> = self
            .vouchers
            .iter()
            .filter(|v| {
                v.customer_id == customer_id && v.program_id == program_id && v.is_usable(now)
            })
            .map(|v| v.clone())
            .collect();
        usable.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(usable.into_iter().next())
    }

    async fn list_by_customer(&self, customer_id: &str) -> Result<Vec<Voucher>> {
        let mut vouchers: Vec<Voucher> = self
            .vouchers
            .iter()
            .filter(|v| v.customer_id == customer_id)
            .map(|v| v.clone())
            .collect();
        vouchers.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(vouchers)
    }

    async fn create(&self, voucher: &Voucher) -> Result<()> {
        self.vouchers.insert(voucher.code.clone(), voucher.clone());
        Ok(())
    }

    async fn mark_used(&self, code: &str, now: DateTime<Utc>) -> Result<Option<Voucher>> {
        if let Some(mut voucher) = self.vouchers.get_mut(code) {
            if voucher.is_usable(now) {
                voucher.used = true;
                voucher.redeemed_at = Some(now);
                return Ok(Some(voucher.clone()));
            }
        }
        Ok(None)
    }

    async fn expire_due(&self, now: DateTime<Utc>) -> Result<u64> {
        let mut flipped = 0;
        for mut voucher in self.vouchers.iter_mut() {
            if !voucher.used && !voucher.expired && voucher.expires_at <= now {
                voucher.expired = true;
                flipped += 1;
            }
        }
        Ok(flipped)
    }

    async fn expire_for_pair(
        &self,
        customer_id: &str,
        business_id: &str,
        _now: DateTime<Utc>,
    ) -> Result<u64> {
        let mut flipped = 0;
        for mut voucher in self.vouchers.iter_mut() {
            if voucher.customer_id == customer_id
                && voucher.business_id == business_id
                && !voucher.used
                && !voucher.expired
            {
                voucher.expired = true;
                flipped += 1;
            }
        }
        Ok(flipped)
    }
}

// ---------------------------------------------------------------------------
// 积分账本
// ---------------------------------------------------------------------------

/// 按条目 ID 索引的内存账本仓储
#[derive(Debug, Default)]
pub struct InMemoryLedgerRepository {
    entries: DashMap<String, LedgerEntry>,
}

impl InMemoryLedgerRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LedgerRepositoryTrait for InMemoryLedgerRepository {
    async fn append(&self, entry: &LedgerEntry) -> Result<()> {
        self.entries.insert(entry.id.clone(), entry.clone());
        Ok(())
    }

    async fn flip_status(
        &self,
        booking_id: &str,
        from: LedgerStatus,
        to: LedgerStatus,
    ) -> Result<Option<LedgerEntry>> {
        // 与 Pg 实现一致：按创建时间取最早的匹配条目
        let mut candidates: Vec<(String, DateTime<Utc>)> = self
            .entries
            .iter()
            .filter(|e| e.booking_id == booking_id && e.status == from)
            .map(|e| (e.id.clone(), e.created_at))
            .collect();
        candidates.sort_by(|a, b| a.1.cmp(&b.1));

        if let Some((id, _)) = candidates.into_iter().next() {
            if let Some(mut entry) = self.entries.get_mut(&id) {
                entry.status = to;
                return Ok(Some(entry.clone()));
            }
        }
        Ok(None)
    }

    async fn find_by_booking(&self, booking_id: &str) -> Result<Vec<LedgerEntry>> {
        let mut entries: Vec<LedgerEntry> = self
            .entries
            .iter()
            .filter(|e| e.booking_id == booking_id)
            .map(|e| e.clone())
            .collect();
        entries.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(entries)
    }

    async fn balance(&self, user_id: &str) -> Result<i64> {
        Ok(self
            .entries
            .iter()
            .filter(|e| e.user_id == user_id && e.status.settles())
            .map(|e| e.points)
            .sum())
    }

    async fn pending_total(&self, user_id: &str) -> Result<i64> {
        Ok(self
            .entries
            .iter()
            .filter(|e| e.user_id == user_id && e.status == LedgerStatus::Pending)
            .map(|e| e.points.abs())
            .sum())
    }

    async fn redeemed_since(&self, user_id: &str, since: DateTime<Utc>) -> Result<i64> {
        Ok(self
            .entries
            .iter()
            .filter(|e| {
                e.user_id == user_id
                    && e.status.settles()
                    && e.is_redemption()
                    && e.created_at >= since
            })
            .map(|e| -e.points)
            .sum())
    }

    async fn list_by_user(&self, user_id: &str, limit: i64) -> Result<Vec<LedgerEntry>> {
        let mut entries: Vec<LedgerEntry> = self
            .entries
            .iter()
            .filter(|e| e.user_id == user_id)
            .map(|e| e.clone())
            .collect();
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        entries.truncate(limit.max(0) as usize);
        Ok(entries)
    }
}

// ---------------------------------------------------------------------------
// 商家服务目录
// ---------------------------------------------------------------------------

/// 按服务 ID 索引的内存目录仓储
#[derive(Debug, Default)]
pub struct InMemoryCatalogRepository {
    services: DashMap<String, BusinessService>,
}

impl InMemoryCatalogRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CatalogRepositoryTrait for InMemoryCatalogRepository {
    async fn cheapest_active_price(&self, business_id: &str) -> Result<Option<i64>> {
        Ok(self
            .services
            .iter()
            .filter(|s| s.business_id == business_id && s.is_active)
            .map(|s| s.price)
            .min())
    }

    async fn list_by_business(&self, business_id: &str) -> Result<Vec<BusinessService>> {
        let mut services: Vec<BusinessService> = self
            .services
            .iter()
            .filter(|s| s.business_id == business_id)
            .map(|s| s.clone())
            .collect();
        services.sort_by(|a, b| a.price.cmp(&b.price));
        Ok(services)
    }

    async fn upsert(&self, service: &BusinessService) -> Result<()> {
        self.services.insert(service.id.clone(), service.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// 幂等表
// ---------------------------------------------------------------------------

/// 内存幂等表
#[derive(Debug, Default)]
pub struct InMemoryProcessedEventRepository {
    processed: DashMap<String, DateTime<Utc>>,
}

impl InMemoryProcessedEventRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProcessedEventRepositoryTrait for InMemoryProcessedEventRepository {
    async fn try_mark_processed(&self, event_id: &str) -> Result<bool> {
        // entry API 保证先占式写入的原子性
        match self.processed.entry(event_id.to_string()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(vacant) => {
                vacant.insert(Utc::now());
                Ok(true)
            }
        }
    }

    async fn is_processed(&self, event_id: &str) -> Result<bool> {
        Ok(self.processed.contains_key(event_id))
    }
}

// ---------------------------------------------------------------------------
// 通知收集器
// ---------------------------------------------------------------------------

/// 收集通知载荷的交付实现，供测试断言
#[derive(Debug, Default)]
pub struct CollectingDispatcher {
    payloads: Mutex<Vec<NotificationPayload>>,
}

impl CollectingDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn payloads(&self) -> Vec<NotificationPayload> {
        self.payloads.lock().clone()
    }

    pub fn count(&self) -> usize {
        self.payloads.lock().len()
    }
}

#[async_trait]
impl NotificationDispatcher for CollectingDispatcher {
    async fn dispatch(&self, payload: NotificationPayload) -> std::result::Result<(), LoyaltyError> {
        self.payloads.lock().push(payload);
        Ok(())
    }
}
