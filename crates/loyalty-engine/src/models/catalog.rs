//! 商家服务目录实体定义

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 商家目录中的单项服务
///
/// 免费服务型奖励在结算时抵扣商家目录中最便宜的在售服务价格，
/// 因此忠诚度引擎需要目录的最小视图：名称与定价。
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct BusinessService {
    pub id: String,
    pub business_id: String,
    pub name: String,
    /// 服务价格（便士）
    pub price: i64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BusinessService {
    pub fn new(business_id: impl Into<String>, name: impl Into<String>, price: i64) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7().to_string(),
            business_id: business_id.into(),
            name: name.into(),
            price,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }
}
