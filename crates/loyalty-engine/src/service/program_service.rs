//! 计划管理服务
//!
//! 商家侧的忠诚度计划 CRUD 与目录维护。
//! 变更策略：一旦计划下存在任何客户进度，threshold/type/窗口/奖励
//! 字段全部冻结，只允许启停，避免运营中途改规则导致进度失真。

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, instrument};

use loyalty_shared::error::{LoyaltyError, Result};

use crate::models::{BusinessService, LoyaltyProgram};
use crate::repository::{CatalogRepositoryTrait, ProgramRepositoryTrait, ProgressRepositoryTrait};
use crate::service::dto::{
    CreateProgramRequest, UpdateProgramRequest, UpsertServiceRequest, validated,
};

/// 计划管理服务
pub struct ProgramService {
    programs: Arc<dyn ProgramRepositoryTrait>,
    progress: Arc<dyn ProgressRepositoryTrait>,
    catalog: Arc<dyn CatalogRepositoryTrait>,
}

impl ProgramService {
    pub fn new(
        programs: Arc<dyn ProgramRepositoryTrait>,
        progress: Arc<dyn ProgressRepositoryTrait>,
        catalog: Arc<dyn CatalogRepositoryTrait>,
    ) -> Self {
        Self {
            programs,
            progress,
            catalog,
        }
    }

    /// 创建忠诚度计划
    #[instrument(skip(self, request), fields(business_id = %request.business_id))]
    pub async fn create_program(&self, request: CreateProgramRequest) -> Result<LoyaltyProgram> {
        validated(&request)?;

        let program = LoyaltyProgram::new(
            &request.business_id,
            request.program_type,
            request.threshold,
            request.time_limit_days,
            request.reward_type,
            request.reward_value,
        );
        program.validate()?;

        self.programs.create(&program).await?;
        info!(program_id = %program.id, program_type = ?program.program_type, "计划已创建");
        Ok(program)
    }

    /// 更新忠诚度计划
    ///
    /// 冻结策略：已有客户进度时只接受 `is_active` 的变更，携带其他
    /// 字段的请求整体拒绝（不做部分生效）。
    #[instrument(skip(self, request), fields(program_id = %program_id))]
    pub async fn update_program(
        &self,
        program_id: &str,
        request: UpdateProgramRequest,
    ) -> Result<LoyaltyProgram> {
        let mut program = self.get_program(program_id).await?;

        if request.touches_frozen_fields()
            && self.progress.exists_for_program(program_id).await?
        {
            return Err(LoyaltyError::Validation(
                "计划下已有客户进度, threshold/类型/奖励字段已冻结, 只允许启停".to_string(),
            ));
        }

        if let Some(program_type) = request.program_type {
            program.program_type = program_type;
        }
        if let Some(threshold) = request.threshold {
            program.threshold = threshold;
        }
        if request.program_type.is_some() || request.time_limit_days.is_some() {
            program.time_limit_days = request.time_limit_days;
        }
        if let Some(reward_type) = request.reward_type {
            program.reward_type = reward_type;
            program.reward_value = request.reward_value;
        } else if let Some(reward_value) = request.reward_value {
            program.reward_value = Some(reward_value);
        }
        if let Some(is_active) = request.is_active {
            program.is_active = is_active;
        }
        program.updated_at = Utc::now();
        program.validate()?;

        self.programs.update(&program).await?;
        info!("计划已更新");
        Ok(program)
    }

    /// 启用/停用计划（不受冻结策略限制）
    #[instrument(skip(self), fields(program_id = %program_id))]
    pub async fn set_active(&self, program_id: &str, is_active: bool) -> Result<LoyaltyProgram> {
        let mut program = self.get_program(program_id).await?;
        program.is_active = is_active;
        program.updated_at = Utc::now();
        self.programs.update(&program).await?;
        info!(is_active, "计划启停状态已变更");
        Ok(program)
    }

    pub async fn get_program(&self, program_id: &str) -> Result<LoyaltyProgram> {
        self.programs
            .get(program_id)
            .await?
            .ok_or_else(|| LoyaltyError::not_found("LoyaltyProgram", program_id))
    }

    pub async fn list_programs(&self, business_id: &str) -> Result<Vec<LoyaltyProgram>> {
        self.programs.list_by_business(business_id).await
    }

    /// 录入或更新商家目录中的服务
    #[instrument(skip(self, request), fields(business_id = %request.business_id))]
    pub async fn upsert_service(&self, request: UpsertServiceRequest) -> Result<BusinessService> {
        validated(&request)?;

        let mut service = BusinessService::new(&request.business_id, &request.name, request.price);
        if let Some(id) = &request.id {
            service.id = id.clone();
        }
        service.is_active = request.is_active;
        service.updated_at = Utc::now();

        self.catalog.upsert(&service).await?;
        info!(service_id = %service.id, price = service.price, "目录服务已写入");
        Ok(service)
    }

    pub async fn list_services(&self, business_id: &str) -> Result<Vec<BusinessService>> {
        self.catalog.list_by_business(business_id).await
    }
}
