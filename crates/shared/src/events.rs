//! 事件模型与处理管道抽象
//!
//! 定义进入忠诚度模块的预订事件统一信封格式、处理结果以及通知载荷模型。
//! 同时提供 `BookingEventProcessor` trait 作为事件处理管道的核心抽象。
//! 本模块只对预订生命周期事件做出反应，从不主动发起预订操作。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::LoyaltyError;

// ---------------------------------------------------------------------------
// BookingEvent — 预订生命周期事件
// ---------------------------------------------------------------------------

/// 预订生命周期事件
///
/// 由预订系统发出，带固定字段结构的标签化变体，消费方必须穷尽匹配。
/// 金额以便士表示。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingEvent {
    /// 预订完成，触发积分累积与计划进度推进
    #[serde(rename_all = "camelCase")]
    Completed {
        booking_id: String,
        customer_id: String,
        business_id: String,
        /// 订单总金额（便士）
        total_amount: i64,
        service_ids: Vec<String>,
        timestamp: DateTime<Utc>,
    },
    /// 预订取消，只释放关联的积分预留，从不回退进度
    #[serde(rename_all = "camelCase")]
    Cancelled {
        booking_id: String,
        customer_id: String,
        business_id: String,
        total_amount: i64,
        service_ids: Vec<String>,
        timestamp: DateTime<Utc>,
    },
}

impl BookingEvent {
    pub fn booking_id(&self) -> &str {
        match self {
            Self::Completed { booking_id, .. } | Self::Cancelled { booking_id, .. } => booking_id,
        }
    }

    pub fn customer_id(&self) -> &str {
        match self {
            Self::Completed { customer_id, .. } | Self::Cancelled { customer_id, .. } => {
                customer_id
            }
        }
    }

    pub fn business_id(&self) -> &str {
        match self {
            Self::Completed { business_id, .. } | Self::Cancelled { business_id, .. } => {
                business_id
            }
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::Completed { timestamp, .. } | Self::Cancelled { timestamp, .. } => *timestamp,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

// ---------------------------------------------------------------------------
// EventEnvelope — 通用事件信封
// ---------------------------------------------------------------------------

/// 通用事件信封
///
/// 所有进入忠诚度模块的事件都包装在此信封中，确保：
/// - 通过 `event_id`（UUID v7）实现幂等性校验，重复投递不会重复累积
/// - 通过 `trace_id` 串联调用方的追踪上下文
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventEnvelope {
    /// 事件唯一标识（UUID v7），时间有序便于索引，同时用于幂等性校验
    pub event_id: String,
    /// 事件来源系统
    pub source: String,
    /// 追踪 ID（用于分布式追踪串联）
    pub trace_id: Option<String>,
    /// 预订事件本体
    pub event: BookingEvent,
}

impl EventEnvelope {
    /// 构建新信封，自动生成 UUID v7 作为 event_id
    ///
    /// UUID v7 包含时间戳前缀，使得按 event_id 排序即可获得时间顺序，
    /// 适合直接作为幂等表的主键。
    pub fn new(event: BookingEvent, source: impl Into<String>) -> Self {
        Self {
            event_id: Uuid::now_v7().to_string(),
            source: source.into(),
            trace_id: None,
            event,
        }
    }

    pub fn with_trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = Some(trace_id.into());
        self
    }
}

// ---------------------------------------------------------------------------
// EventOutcome — 事件处理结果
// ---------------------------------------------------------------------------

/// 单个商家计划在本次事件中的进度变化
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgramUpdate {
    pub program_id: String,
    /// 更新后的进度值（访问次数或累计消费便士）
    pub current: i64,
    pub percentage: f64,
    /// 本次事件是否使奖励从未解锁变为解锁
    pub newly_unlocked: bool,
    /// 新解锁时发放的兑换码
    pub voucher_code: Option<String>,
}

/// 事件处理结果
///
/// 记录单个预订事件经过完整管道后的处理结果。`errors` 字段采用字符串数组
/// 而非立即失败，因为一个事件可能推进多个计划的进度，部分计划失败不应
/// 阻止其他计划的正常推进。
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventOutcome {
    pub event_id: String,
    /// 是否实际处理（重复投递时为 false）
    pub processed: bool,
    /// 本次累积的积分
    pub points_accrued: i64,
    /// 是否将预留积分转为已扣减
    pub reservation_committed: bool,
    /// 是否释放了预留积分
    pub reservation_released: bool,
    pub program_updates: Vec<ProgramUpdate>,
    /// 交付给通知系统的载荷（本模块只产出，不负责发送）
    pub notifications: Vec<NotificationPayload>,
    /// 部分计划推进失败时收集错误信息，不中断整体流程
    pub errors: Vec<String>,
}

impl EventOutcome {
    /// 重复投递时的空结果
    pub fn duplicate(event_id: impl Into<String>) -> Self {
        Self {
            event_id: event_id.into(),
            processed: false,
            points_accrued: 0,
            reservation_committed: false,
            reservation_released: false,
            program_updates: Vec::new(),
            notifications: Vec::new(),
            errors: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// NotificationPayload — 通知载荷
// ---------------------------------------------------------------------------

/// 通知模板
///
/// 不同模板对应通知系统中不同的文案与渠道策略
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationTemplate {
    AlmostUnlocked,
    RewardUnlocked,
}

/// 通知载荷
///
/// 忠诚度模块产出 {recipient, template, data} 并交付给通知系统，
/// 由通知系统负责实际推送。解耦业务处理与消息推送，
/// 推送失败不影响核心业务流程。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPayload {
    /// 接收方（客户 ID）
    pub recipient: String,
    pub template: NotificationTemplate,
    /// 模板渲染数据（JSON 对象，不同模板携带不同字段）
    pub data: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// 通知交付抽象
///
/// 本模块只负责把载荷交出去。实现方可以写入消息队列、调用推送服务，
/// 或在测试中收集载荷做断言。
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn dispatch(&self, payload: NotificationPayload) -> Result<(), LoyaltyError>;
}

/// 仅记录日志的交付实现
///
/// 默认实现，用于没有接入真实通知系统的环境。
#[derive(Debug, Default, Clone)]
pub struct TracingDispatcher;

#[async_trait]
impl NotificationDispatcher for TracingDispatcher {
    async fn dispatch(&self, payload: NotificationPayload) -> Result<(), LoyaltyError> {
        tracing::info!(
            recipient = %payload.recipient,
            template = ?payload.template,
            "notification handed off"
        );
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// BookingEventProcessor trait — 事件处理管道抽象
// ---------------------------------------------------------------------------

/// 事件处理管道的核心抽象
///
/// 设计要点：
/// - `process` 负责完整的事件处理流程（预留结转 -> 积分累积 -> 进度推进 -> 通知产出）
/// - `is_processed` 基于 event_id 的幂等性校验，防止重复投递导致重复累积；
///   幂等标记由 `process` 内部以先占式写入完成，调用方无需显式标记
#[async_trait]
pub trait BookingEventProcessor: Send + Sync {
    /// 处理单个事件信封，返回处理结果
    async fn process(&self, envelope: &EventEnvelope) -> Result<EventOutcome, LoyaltyError>;

    /// 检查事件是否已处理（基于 event_id 的幂等性校验）
    async fn is_processed(&self, event_id: &str) -> Result<bool, LoyaltyError>;
}

// ---------------------------------------------------------------------------
// 单元测试
// ---------------------------------------------------------------------------
