//! 兑换码服务
//!
//! 奖励解锁后发放持有者凭证。码值由加密安全随机源产生（8 字节，
//! 大写十六进制，带前缀），对已发放的码做唯一性检查，碰撞重试
//! 上限 5 次后报 GenerationExhausted。
//!
//! 发放是幂等的：同一 (customer, program) 已存在可核销的兑换码时
//! 直接返回现有码，不会重复铸造（同一计划至多一张未核销凭证）。

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use tracing::{info, instrument, warn};

use loyalty_shared::config::LoyaltyConfig;
use loyalty_shared::error::{LoyaltyError, Result};

use crate::models::{LoyaltyProgram, Voucher};
use crate::repository::VoucherRepositoryTrait;

/// 兑换码随机部分的字节长度
const CODE_BYTES: usize = 8;

/// 兑换码服务
pub struct VoucherService<VR>
where
    VR: VoucherRepositoryTrait,
{
    repo: Arc<VR>,
    prefix: String,
    ttl_days: i64,
    max_attempts: u32,
}

impl<VR> VoucherService<VR>
where
    VR: VoucherRepositoryTrait,
{
    pub fn new(repo: Arc<VR>, config: &LoyaltyConfig) -> Self {
        Self {
            repo,
            prefix: config.voucher_prefix.clone(),
            ttl_days: config.voucher_ttl_days,
            max_attempts: config.voucher_max_attempts,
        }
    }

    /// 为解锁的奖励发放兑换码
    ///
    /// 已存在可核销兑换码时返回现有码（幂等）；否则生成新码并入库。
    /// 有效期为发放时刻起 `voucher_ttl_days` 天。
    #[instrument(skip(self, program), fields(customer_id = %customer_id, program_id = %program.id))]
    pub async fn issue(
        &self,
        customer_id: &str,
        program: &LoyaltyProgram,
        now: DateTime<Utc>,
    ) -> Result<Voucher> {
        if let Some(existing) = self.repo.find_usable(customer_id, &program.id, now).await? {
            info!(code = %existing.code, "可核销兑换码已存在, 幂等返回");
            return Ok(existing);
        }

        let code = self.generate_code().await?;
        let voucher = Voucher::new(
            &code,
            customer_id,
            &program.business_id,
            &program.id,
            program.reward_type,
            program.reward_value,
            now,
            now + Duration::days(self.ttl_days),
        );
        self.repo.create(&voucher).await?;

        info!(code = %voucher.code, expires_at = %voucher.expires_at, "兑换码已发放");
        Ok(voucher)
    }

    /// 生成全局唯一的兑换码
    ///
    /// 每次取 8 字节 CSPRNG 随机数；与已发放的码碰撞时重试，
    /// 连续碰撞达到上限后失败。64 位随机空间下碰撞概率可忽略，
    /// 重试上限只是异常数据下的保险。
    async fn generate_code(&self) -> Result<String> {
        for attempt in 1..=self.max_attempts {
            let code = self.random_code();
            if !self.repo.code_exists(&code).await? {
                return Ok(code);
            }
            warn!(attempt, "兑换码碰撞, 重试");
        }

        Err(LoyaltyError::GenerationExhausted {
            attempts: self.max_attempts,
        })
    }

    /// 取一段加密安全随机字节并编码为带前缀的码值
    fn random_code(&self) -> String {
        let mut bytes = [0u8; CODE_BYTES];
        rand::rng().fill(&mut bytes);
        format!("{}{}", self.prefix, hex::encode_upper(bytes))
    }

    pub async fn get_by_code(&self, code: &str) -> Result<Voucher> {
        self.repo
            .get_by_code(code)
            .await?
            .ok_or_else(|| LoyaltyError::not_found("Voucher", code))
    }

    pub async fn list_by_customer(&self, customer_id: &str) -> Result<Vec<Voucher>> {
        self.repo.list_by_customer(customer_id).await
    }

    /// 将 (customer, business) 的所有未核销兑换码置为过期
    ///
    /// 客户退出计划（GDPR）时调用，退出后凭证随进度一并作废。
    pub async fn expire_for_pair(
        &self,
        customer_id: &str,
        business_id: &str,
        now: DateTime<Utc>,
    ) -> Result<u64> {
        self.repo.expire_for_pair(customer_id, business_id, now).await
    }

    /// 过期清理：把有效期已过的未核销兑换码置为过期，返回条数
    ///
    /// 由宿主系统定期调用（如每日一次），不在模块内起定时任务。
    #[instrument(skip(self))]
    pub async fn expire_due(&self, now: DateTime<Utc>) -> Result<u64> {
        let expired = self.repo.expire_due(now).await?;
        if expired > 0 {
            info!(expired, "过期兑换码已清理");
        }
        Ok(expired)
    }
}
