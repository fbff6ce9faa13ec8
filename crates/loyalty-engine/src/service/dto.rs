//! 服务层数据传输对象
//!
//! 定义服务层与宿主系统交互使用的 DTO，与内部领域模型解耦。
//! 单字段约束（非空、范围）由 validator 派生完成，依赖计划类型的
//! 跨字段校验在领域模型的 `validate` 中。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use loyalty_shared::error::{LoyaltyError, Result};

use crate::models::{LedgerStatus, ProgramType, RewardType};

/// 把 validator 的校验错误折叠为统一的业务错误
pub(crate) fn validated<T: Validate>(request: &T) -> Result<()> {
    request
        .validate()
        .map_err(|e| LoyaltyError::Validation(e.to_string()))
}

// ---------------------------------------------------------------------------
// 请求
// ---------------------------------------------------------------------------

/// 创建忠诚度计划请求
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateProgramRequest {
    #[validate(length(min = 1, message = "business_id 不能为空"))]
    pub business_id: String,
    pub program_type: ProgramType,
    #[validate(range(min = 1, message = "threshold 必须大于 0"))]
    pub threshold: i64,
    pub time_limit_days: Option<i64>,
    pub reward_type: RewardType,
    pub reward_value: Option<i64>,
}

/// 更新忠诚度计划请求
///
/// 只带需要修改的字段。一旦计划下已有客户进度，除 `is_active` 外的
/// 字段全部冻结，携带冻结字段的更新会被整体拒绝。
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProgramRequest {
    pub program_type: Option<ProgramType>,
    pub threshold: Option<i64>,
    pub time_limit_days: Option<i64>,
    pub reward_type: Option<RewardType>,
    pub reward_value: Option<i64>,
    pub is_active: Option<bool>,
}

impl UpdateProgramRequest {
    /// 是否触碰了进度存在后冻结的字段
    pub fn touches_frozen_fields(&self) -> bool {
        self.program_type.is_some()
            || self.threshold.is_some()
            || self.time_limit_days.is_some()
            || self.reward_type.is_some()
            || self.reward_value.is_some()
    }
}

/// 录入/更新商家目录服务请求
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpsertServiceRequest {
    /// 已存在的服务 ID；为空表示新建
    pub id: Option<String>,
    #[validate(length(min = 1, message = "business_id 不能为空"))]
    pub business_id: String,
    #[validate(length(min = 1, message = "name 不能为空"))]
    pub name: String,
    #[validate(range(min = 1, message = "price 必须大于 0"))]
    pub price: i64,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

/// 积分兑换预留请求
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RedeemPointsRequest {
    #[validate(length(min = 1, message = "user_id 不能为空"))]
    pub user_id: String,
    #[validate(length(min = 1, message = "booking_id 不能为空"))]
    pub booking_id: String,
    #[validate(range(min = 1, message = "points 必须大于 0"))]
    pub points: i64,
    /// 本次预订的订单总金额（便士），公平性约束据此校验
    #[validate(range(min = 1, message = "booking_total 必须大于 0"))]
    pub booking_total: i64,
}

// ---------------------------------------------------------------------------
// 响应
// ---------------------------------------------------------------------------

/// 结算折扣报价
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscountQuote {
    pub program_id: String,
    pub reward_type: RewardType,
    pub booking_amount: i64,
    /// 折扣金额（便士）
    pub discount: i64,
    /// 折后应付金额
    pub payable: i64,
}

/// 奖励核销结果
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyRewardResponse {
    pub program_id: String,
    pub customer_id: String,
    pub discount: i64,
    pub payable: i64,
    /// 一并核销的兑换码（存在时）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voucher_code: Option<String>,
    pub redeemed_at: DateTime<Utc>,
}

/// 客户在单个计划中的进度概览
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressOverviewDto {
    pub program_id: String,
    pub program_type: ProgramType,
    pub reward_type: RewardType,
    pub current: i64,
    pub threshold: i64,
    pub percentage: f64,
    pub remaining: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub days_remaining: Option<i64>,
    pub unlocked: bool,
    pub usable: bool,
    /// 当前可核销的兑换码（存在时）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voucher_code: Option<String>,
}

/// 用户积分余额摘要
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceSummaryDto {
    pub user_id: String,
    pub balance: i64,
    pub pending: i64,
    pub available: i64,
    pub redeemed_in_window: i64,
    pub cap: i64,
    /// 窗口内还可兑换的积分
    pub cap_headroom: i64,
}

/// 账本流水条目视图
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntryDto {
    pub id: String,
    pub booking_id: String,
    pub points: i64,
    pub status: LedgerStatus,
    pub created_at: DateTime<Utc>,
}
