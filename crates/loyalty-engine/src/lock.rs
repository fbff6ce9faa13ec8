//! 按键互斥锁管理器
//!
//! 为 (customer, business) 与用户账本提供进程内的单写者保证：
//! 同一把键上的操作串行执行，不同键之间互不阻塞。
//! 并发预订同一客户的场景下，奖励核销与兑换上限检查必须持锁进行，
//! 否则可能出现同一奖励被折算两次或上限窗口被重复计数。

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

/// 锁键生成
pub mod lock_keys {
    /// 客户进度与奖励核销的互斥键，按 (customer, business) 串行
    pub fn progress(customer_id: &str, business_id: &str) -> String {
        format!("progress:{customer_id}:{business_id}")
    }

    /// 积分账本的互斥键，按用户串行
    pub fn ledger(user_id: &str) -> String {
        format!("ledger:{user_id}")
    }
}

/// 按键互斥锁管理器
///
/// 每个键对应一把异步互斥锁，锁按需创建后常驻。
/// 键空间为活跃的 (customer, business) 组合，量级有限，不做回收。
#[derive(Debug, Default)]
pub struct LockManager {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl LockManager {
    pub fn new() -> Self {
        Self {
            locks: DashMap::new(),
        }
    }

    /// 获取指定键的互斥锁，持有者 drop 守卫即释放
    ///
    /// 锁获取不设超时：临界区内只有内存操作与持久化调用，
    /// 不存在跨键等待，不会形成死锁环。
    pub async fn acquire(&self, key: &str) -> LockGuard {
        // 先克隆 Arc 再 await，避免持有 DashMap 分片引用跨越挂起点
        let mutex = self
            .locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        let guard = mutex.lock_owned().await;
        debug!(key = %key, "lock acquired");

        LockGuard {
            key: key.to_string(),
            _guard: guard,
        }
    }
}

/// 锁守卫，drop 时释放对应键的互斥锁
pub struct LockGuard {
    key: String,
    _guard: OwnedMutexGuard<()>,
}

impl LockGuard {
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        debug!(key = %self.key, "lock released");
    }
}
