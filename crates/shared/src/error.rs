//! 统一错误处理模块
//!
//! 定义忠诚度系统所有共享的错误类型，使用 thiserror 提供良好的错误信息。
//! 业务错误（校验失败、超出上限、重复核销等）对调用方都是可恢复的：
//! 结算流程向用户返回提示并放弃应用折扣，不会导致进程级故障。

use thiserror::Error;

/// 忠诚度系统错误类型
#[derive(Debug, Error)]
pub enum LoyaltyError {
    // ==================== 校验错误 ====================
    #[error("参数校验失败: {0}")]
    Validation(String),

    // ==================== 查找错误 ====================
    #[error("记录未找到: {entity} id={id}")]
    NotFound { entity: String, id: String },

    // ==================== 业务逻辑错误 ====================
    #[error("超出滚动兑换上限: 请求 {requested}, 窗口内已兑换 {redeemed}, 上限 {cap}")]
    CapExceeded {
        requested: i64,
        redeemed: i64,
        cap: i64,
    },

    #[error("积分余额不足: 需要 {required}, 可用 {available}")]
    InsufficientBalance { required: i64, available: i64 },

    #[error("奖励已核销: customer_id={customer_id}, program_id={program_id}")]
    AlreadyRedeemed {
        customer_id: String,
        program_id: String,
    },

    #[error("兑换码生成失败: 连续 {attempts} 次碰撞")]
    GenerationExhausted { attempts: u32 },

    // ==================== 系统错误 ====================
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    #[error("JSON 序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("内部错误: {0}")]
    Internal(String),
}

/// 错误结果类型别名
pub type Result<T> = std::result::Result<T, LoyaltyError>;

impl LoyaltyError {
    /// 获取错误码（用于上层响应与日志归类）
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::CapExceeded { .. } => "CAP_EXCEEDED",
            Self::InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
            Self::AlreadyRedeemed { .. } => "ALREADY_REDEEMED",
            Self::GenerationExhausted { .. } => "GENERATION_EXHAUSTED",
            Self::Database(_) => "DATABASE_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// 是否为可重试错误
    ///
    /// 兑换码碰撞的重试由生成器内部限定在 5 次以内，对外不再重试。
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Database(_))
    }

    /// 是否为业务错误（非系统错误）
    pub fn is_business_error(&self) -> bool {
        !matches!(
            self,
            Self::Database(_) | Self::Serialization(_) | Self::Internal(_)
        )
    }

    /// 构造 NotFound 的便捷方法
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }
}
