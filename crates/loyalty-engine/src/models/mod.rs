//! 领域模型定义
//!
//! 忠诚度引擎的核心实体与枚举类型

pub mod catalog;
pub mod enums;
pub mod ledger;
pub mod program;
pub mod progress;
pub mod voucher;

pub use catalog::BusinessService;
pub use enums::{LedgerStatus, ProgramType, RewardType};
pub use ledger::LedgerEntry;
pub use program::LoyaltyProgram;
pub use progress::CustomerProgress;
pub use voucher::Voucher;
