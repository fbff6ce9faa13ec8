//! 忠诚度引擎枚举类型定义
//!
//! 所有枚举都支持数据库（sqlx）和 JSON（serde）序列化

use serde::{Deserialize, Serialize};

/// 忠诚度计划类型
///
/// 决定进度的计量方式：按访问次数、按累计消费金额，或限时窗口内的访问次数
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "varchar", rename_all = "snake_case")]
pub enum ProgramType {
    /// 按访问次数 - 完成 N 次预订解锁
    #[default]
    VisitBased,
    /// 按消费金额 - 累计消费达到阈值（便士）解锁
    SpendBased,
    /// 限时窗口 - 在 time_limit_days 天内完成 N 次预订解锁
    TimeLimited,
}

impl ProgramType {
    /// 进度是否以访问次数计量
    ///
    /// 限时计划同样按次数计量，只是附加了时间窗口约束
    pub fn counts_visits(&self) -> bool {
        matches!(self, Self::VisitBased | Self::TimeLimited)
    }

    /// 是否受时间窗口约束
    pub fn is_time_windowed(&self) -> bool {
        matches!(self, Self::TimeLimited)
    }
}

/// 奖励类型
///
/// 决定解锁后在结算时如何折算优惠
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "varchar", rename_all = "snake_case")]
pub enum RewardType {
    /// 免费服务 - 抵扣商家目录中最便宜服务的价格
    #[default]
    FreeService,
    /// 固定折扣 - 抵扣固定金额（便士），不超过订单金额
    FixedDiscount,
    /// 百分比折扣 - 按订单金额的百分比抵扣，创建时约束不超过 100
    PercentageDiscount,
}

impl RewardType {
    /// 该奖励类型是否要求配置 reward_value
    ///
    /// 免费服务的价值由商家目录决定，不在计划上配置
    pub fn requires_value(&self) -> bool {
        !matches!(self, Self::FreeService)
    }
}

/// 账本条目状态
///
/// 积分账本为只追加日志，条目状态描述积分变动的结算进度
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "varchar", rename_all = "lowercase")]
pub enum LedgerStatus {
    /// 待结算 - 预留中，计入可用余额扣除项但尚未扣减余额
    #[default]
    Pending,
    /// 已结算 - 对余额生效；累积条目（正数）与已扣减条目（负数）均为此状态
    Deducted,
    /// 已释放 - 预订取消后释放的预留，对余额无影响
    Released,
}

impl LedgerStatus {
    /// 该状态的条目是否计入余额
    pub fn settles(&self) -> bool {
        matches!(self, Self::Deducted)
    }
}
