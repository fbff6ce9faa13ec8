//! 忠诚度引擎
//!
//! 本地服务市场的忠诚度业务规则模块：进度追踪、奖励评估、兑换码发放
//! 与积分兑换账本。
//!
//! ## 核心功能
//!
//! - **进度计算**：根据预订历史计算客户在商家忠诚度计划中的进度
//! - **奖励评估**：判定奖励是否解锁、可用，并在结算时计算折扣金额
//! - **兑换码发放**：解锁后生成不可预测的兑换码，单次可用
//! - **积分账本**：记录积分的预留/扣减/释放，滚动窗口内限额兑换
//! - **通知触发**：一次性"即将解锁"/"奖励解锁"提醒，重复事件不重发
//! - **事件管道**：消费预订完成/取消事件，幂等推进各计划进度
//!
//! ## 模块结构
//!
//! - `models`: 领域模型定义
//! - `repository`: 数据仓储层（Postgres 实现 + 内存实现）
//! - `progress`: 进度计算器
//! - `reward`: 奖励评估器
//! - `notify`: 通知触发器
//! - `ledger`: 积分兑换账本
//! - `voucher`: 兑换码服务
//! - `lock`: 按键互斥锁
//! - `service`: 业务服务层

pub mod ledger;
pub mod lock;
pub mod models;
pub mod notify;
pub mod progress;
pub mod repository;
pub mod reward;
pub mod service;
pub mod voucher;

pub use ledger::RedemptionLedger;
pub use lock::{LockGuard, LockManager, lock_keys};
pub use models::*;
pub use notify::NotificationTrigger;
pub use progress::{ProgressCalculator, ProgressSnapshot};
pub use repository::{
    CatalogRepositoryTrait, LedgerRepositoryTrait, ProcessedEventRepositoryTrait,
    ProgramRepositoryTrait, ProgressRepositoryTrait, VoucherRepositoryTrait,
};
pub use reward::RewardEvaluator;
pub use service::{CheckoutService, EventService, ProgramService, QueryService, dto};
pub use voucher::VoucherService;
