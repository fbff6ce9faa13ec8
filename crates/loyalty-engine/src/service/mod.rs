//! 业务服务层
//!
//! 包装核心组件形成对宿主系统的四个入口：
//! - `EventService`: 预订事件管道（进度推进、积分结转、通知产出）
//! - `ProgramService`: 商家侧计划与目录管理
//! - `CheckoutService`: 结算折扣报价、奖励核销、积分兑换预留
//! - `QueryService`: 只读视图

pub mod checkout_service;
pub mod dto;
pub mod event_service;
pub mod program_service;
pub mod query_service;

pub use checkout_service::CheckoutService;
pub use event_service::EventService;
pub use program_service::ProgramService;
pub use query_service::QueryService;
