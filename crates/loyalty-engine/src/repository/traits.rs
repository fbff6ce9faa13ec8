//! 仓储 Trait 定义
//!
//! 每个实体一个仓储接口，服务层依赖抽象而非具体实现，支持 mock 测试。
//! 所有状态翻转方法都是原子的条件更新（CAS 语义）：调用方不持有事务，
//! 并发安全由"条件不满足则不生效"保证。

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use loyalty_shared::error::Result;

use crate::models::{
    BusinessService, CustomerProgress, LedgerEntry, LedgerStatus, LoyaltyProgram, Voucher,
};

/// 忠诚度计划仓储接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProgramRepositoryTrait: Send + Sync {
    async fn get(&self, id: &str) -> Result<Option<LoyaltyProgram>>;
    async fn list_by_business(&self, business_id: &str) -> Result<Vec<LoyaltyProgram>>;
    async fn list_active_by_business(&self, business_id: &str) -> Result<Vec<LoyaltyProgram>>;
    async fn create(&self, program: &LoyaltyProgram) -> Result<()>;
    async fn update(&self, program: &LoyaltyProgram) -> Result<()>;
}

/// 客户进度仓储接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProgressRepositoryTrait: Send + Sync {
    async fn get(&self, customer_id: &str, program_id: &str) -> Result<Option<CustomerProgress>>;
    async fn list_by_pair(
        &self,
        customer_id: &str,
        business_id: &str,
    ) -> Result<Vec<CustomerProgress>>;
    async fn list_by_customer(&self, customer_id: &str) -> Result<Vec<CustomerProgress>>;
    /// 按 (customer_id, program_id) 插入或整行覆盖
    async fn upsert(&self, progress: &CustomerProgress) -> Result<()>;
    /// 原子核销标记：仅当 reward_redeemed 为 false 时置 true，返回是否生效
    async fn mark_redeemed(&self, customer_id: &str, program_id: &str) -> Result<bool>;
    /// 计划下是否已有任何客户进度（用于冻结字段判定）
    async fn exists_for_program(&self, program_id: &str) -> Result<bool>;
}

/// 兑换码仓储接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VoucherRepositoryTrait: Send + Sync {
    async fn get_by_code(&self, code: &str) -> Result<Option<Voucher>>;
    async fn code_exists(&self, code: &str) -> Result<bool>;
    /// 查找 (customer, program) 当前可核销的兑换码
    async fn find_usable(
        &self,
        customer_id: &str,
        program_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Voucher>>;
    async fn list_by_customer(&self, customer_id: &str) -> Result<Vec<Voucher>>;
    async fn create(&self, voucher: &Voucher) -> Result<()>;
    /// 原子核销：仅当兑换码可用时标记已使用，返回核销后的兑换码
    async fn mark_used(&self, code: &str, now: DateTime<Utc>) -> Result<Option<Voucher>>;
    /// 过期清理：把有效期已过的未核销兑换码批量置为过期，返回条数
    async fn expire_due(&self, now: DateTime<Utc>) -> Result<u64>;
    /// 将 (customer, business) 的所有未核销兑换码置为过期（客户退出时）
    async fn expire_for_pair(
        &self,
        customer_id: &str,
        business_id: &str,
        now: DateTime<Utc>,
    ) -> Result<u64>;
}

/// 积分账本仓储接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LedgerRepositoryTrait: Send + Sync {
    async fn append(&self, entry: &LedgerEntry) -> Result<()>;
    /// 原子状态翻转：按 booking_id 定位 `from` 状态的条目翻转为 `to`，
    /// 返回翻转后的条目；无匹配条目时返回 None
    async fn flip_status(
        &self,
        booking_id: &str,
        from: LedgerStatus,
        to: LedgerStatus,
    ) -> Result<Option<LedgerEntry>>;
    /// 某预订关联的全部条目
    async fn find_by_booking(&self, booking_id: &str) -> Result<Vec<LedgerEntry>>;
    /// 已结算余额：Deducted 条目的带符号积分之和
    async fn balance(&self, user_id: &str) -> Result<i64>;
    /// 预留中的积分总量（绝对值）
    async fn pending_total(&self, user_id: &str) -> Result<i64>;
    /// 自 `since` 起已结算的兑换积分总量（绝对值），用于滚动上限检查
    async fn redeemed_since(&self, user_id: &str, since: DateTime<Utc>) -> Result<i64>;
    async fn list_by_user(&self, user_id: &str, limit: i64) -> Result<Vec<LedgerEntry>>;
}

/// 商家服务目录仓储接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CatalogRepositoryTrait: Send + Sync {
    /// 商家目录中最便宜的在售服务价格（便士），目录为空时返回 None
    async fn cheapest_active_price(&self, business_id: &str) -> Result<Option<i64>>;
    async fn list_by_business(&self, business_id: &str) -> Result<Vec<BusinessService>>;
    async fn upsert(&self, service: &BusinessService) -> Result<()>;
}

/// 已处理事件仓储接口（幂等表）
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProcessedEventRepositoryTrait: Send + Sync {
    /// 先占式标记：事件未处理过则写入标记并返回 true，已存在返回 false
    async fn try_mark_processed(&self, event_id: &str) -> Result<bool>;
    async fn is_processed(&self, event_id: &str) -> Result<bool>;
}
