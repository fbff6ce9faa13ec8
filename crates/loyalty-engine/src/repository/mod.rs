//! 数据仓储层
//!
//! 每个实体一个仓储：trait 定义接口，`Pg*` 为 PostgreSQL 实现，
//! `memory` 模块提供基于 DashMap 的内存实现（测试与开发环境）。

pub mod catalog_repo;
pub mod event_repo;
pub mod ledger_repo;
pub mod memory;
pub mod program_repo;
pub mod progress_repo;
pub mod traits;
pub mod voucher_repo;

pub use catalog_repo::PgCatalogRepository;
pub use event_repo::PgProcessedEventRepository;
pub use ledger_repo::PgLedgerRepository;
pub use memory::{
    CollectingDispatcher, InMemoryCatalogRepository, InMemoryLedgerRepository,
    InMemoryProcessedEventRepository, InMemoryProgramRepository, InMemoryProgressRepository,
    InMemoryVoucherRepository,
};
pub use program_repo::PgProgramRepository;
pub use progress_repo::PgProgressRepository;
pub use traits::{
    CatalogRepositoryTrait, LedgerRepositoryTrait, ProcessedEventRepositoryTrait,
    ProgramRepositoryTrait, ProgressRepositoryTrait, VoucherRepositoryTrait,
};
pub use voucher_repo::PgVoucherRepository;
