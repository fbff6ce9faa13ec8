//! 共享库
//!
//! 包含忠诚度系统各模块共用的配置、错误处理、数据库连接、事件模型与
//! 可观测性等基础设施代码。

pub mod config;
pub mod database;
pub mod error;
pub mod events;
pub mod observability;
pub mod test_utils;
