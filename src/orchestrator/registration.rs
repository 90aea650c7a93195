//! 调度登记编排器 - 编排层
//!
//! ## 职责
//!
//! 本模块是整个应用的入口，负责会话生命周期和流程串联。
//!
//! ## 核心功能
//!
//! 1. **应用初始化**：创建传输层与交互层
//! 2. **登录**：运行认证状态机
//! 3. **企业流程**：打开登记页面 → 询问企业代码 → 搜索 → 确认后选择
//! 4. **司机流程**：在企业选择结果上继续 → 询问证件号 → 搜索 → 确认后选择
//! 5. **会话收尾**：无论成功、出错还是取消，登出只执行一次
//! 6. **结果汇总**：输出每个流程的最终状态
//!
//! ## 错误处理
//!
//! - 认证错误、传输错误、取消：中止整个会话
//! - 协议错误：只中止当前流程，记为 `Failed`

use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::AppResult;
use crate::infrastructure::prompt::{ask_numeric, ask_yes_no};
use crate::infrastructure::{ConsolePrompter, Prompter, ReqwestTransport, Session, Transport};
use crate::models::{Completeness, Entity, EntityKind, IdentityNumber, SelectionRecord, SelectionState};
use crate::services::{
    ArtifactWriter, AuthMachine, Credentials, RetryPolicy, SnapshotLoader, SnapshotSynchronizer,
};
use crate::utils::logging::{log_stage, log_startup};
use crate::workflow::{EntityWorkflow, SearchOutcome, WorkflowResult};

/// 单个流程的最终状态
#[derive(Debug, Clone, PartialEq)]
pub enum EntityOutcome {
    /// 前置流程没有选中实体，本流程未执行
    NotAttempted,
    /// 协议错误导致流程中止
    Failed(String),
    NotFound,
    FoundNotSelected(Entity),
    Selected { entity: Entity, confirmed: bool },
}

impl EntityOutcome {
    fn describe(&self) -> String {
        match self {
            EntityOutcome::NotAttempted => "⏭️ 未执行".to_string(),
            EntityOutcome::Failed(reason) => format!("❌ 失败: {}", reason),
            EntityOutcome::NotFound => "🔍 未找到".to_string(),
            EntityOutcome::FoundNotSelected(entity) => {
                format!("📋 已找到未选择 (id={})", entity.display("id"))
            }
            EntityOutcome::Selected { entity, confirmed } => format!(
                "✅ 已选择 (id={}{})",
                entity.display("id"),
                if *confirmed { "" } else { ", 未收到确认" }
            ),
        }
    }
}

/// 一次运行的汇总
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub company: EntityOutcome,
    pub driver: EntityOutcome,
}

impl Default for RunReport {
    fn default() -> Self {
        Self {
            company: EntityOutcome::NotAttempted,
            driver: EntityOutcome::NotAttempted,
        }
    }
}

/// 一个阶段的产出：状态 + 可供下游使用的选择结果
#[derive(Debug)]
struct StageResult {
    outcome: EntityOutcome,
    selected: Option<WorkflowResult>,
}

impl StageResult {
    fn outcome(outcome: EntityOutcome) -> Self {
        Self {
            outcome,
            selected: None,
        }
    }
}

/// 应用主结构
pub struct App {
    config: Config,
    transport: Arc<dyn Transport>,
    prompter: Arc<dyn Prompter>,
    loader: SnapshotLoader,
    sync: SnapshotSynchronizer,
    artifacts: ArtifactWriter,
}

impl App {
    /// 使用真实网络与控制台初始化应用
    pub fn initialize(config: Config) -> AppResult<Self> {
        log_startup(&config.site.base_url);
        let transport = Arc::new(ReqwestTransport::new(&config.site)?);
        Ok(Self::with_collaborators(
            config,
            transport,
            Arc::new(ConsolePrompter::new()),
        ))
    }

    /// 注入传输层与交互层
    pub fn with_collaborators(
        config: Config,
        transport: Arc<dyn Transport>,
        prompter: Arc<dyn Prompter>,
    ) -> Self {
        let artifacts = ArtifactWriter::new(&config.artifacts_dir);
        let loader = SnapshotLoader::new(
            config.component.clone(),
            RetryPolicy::from_config(&config.retry),
            artifacts.clone(),
        );
        let sync = SnapshotSynchronizer::new(
            &config.component,
            Completeness::registration(),
            artifacts.clone(),
        );
        Self {
            config,
            transport,
            prompter,
            loader,
            sync,
            artifacts,
        }
    }

    /// 运行应用主逻辑
    ///
    /// 会话在这里创建，也在这里关闭；`drive` 的任何退出路径（包括 panic）都会经过 `close`
    pub async fn run(&self) -> AppResult<RunReport> {
        let mut session = Session::new(self.transport.clone(), self.config.site.clone());

        let outcome = AssertUnwindSafe(self.drive(&mut session))
            .catch_unwind()
            .await;
        session.close().await;
        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(panic) => {
                error!("❌ 运行中发生 panic，会话已关闭");
                std::panic::resume_unwind(panic)
            }
        };

        match &outcome {
            Ok(report) => print_final_report(report),
            Err(e) if e.is_cancelled() => warn!("⚠️ 操作已取消，会话已关闭"),
            Err(e) => error!("❌ 运行中止: {}", e),
        }
        outcome
    }

    async fn drive(&self, session: &mut Session) -> AppResult<RunReport> {
        let credentials = self.credentials().await?;

        log_stage("登录");
        let mut auth = AuthMachine::new(&self.config.site);
        auth.run(session, &credentials).await?;

        let mut report = RunReport::default();

        log_stage("企业查找与选择");
        let company = recoverable("企业", self.company_stage(session).await)?;
        report.company = company.outcome;

        let Some(upstream) = company.selected else {
            info!("未选择企业，跳过司机流程");
            return Ok(report);
        };

        log_stage("司机查找与选择");
        let driver = recoverable("司机", self.driver_stage(session, &upstream).await)?;
        report.driver = driver.outcome;

        Ok(report)
    }

    /// 配置里没有的凭据在控制台询问
    async fn credentials(&self) -> AppResult<Credentials> {
        let username = match &self.config.username {
            Some(name) if !name.is_empty() => name.clone(),
            _ => loop {
                let answer = self.prompter.ask("👤 用户名: ").await?;
                if !answer.is_empty() {
                    break answer;
                }
            },
        };
        let password = match &self.config.password {
            Some(secret) if !secret.is_empty() => secret.clone(),
            _ => self.prompter.ask_secret("🔑 密码: ").await?,
        };
        Ok(Credentials { username, password })
    }

    async fn company_stage(&self, session: &mut Session) -> AppResult<StageResult> {
        let mut flow = EntityWorkflow::new(EntityKind::company());
        flow.navigate(session, &self.loader, &self.config.component.register_path)
            .await?;

        let code = ask_numeric(self.prompter.as_ref(), "🏢 请输入企业代码: ").await?;
        self.search_and_select(session, flow, &code).await
    }

    async fn driver_stage(&self, session: &mut Session, upstream: &WorkflowResult) -> AppResult<StageResult> {
        let flow = EntityWorkflow::dependent(EntityKind::driver(), upstream);

        let identity = loop {
            let answer = self
                .prompter
                .ask("👤 请输入司机证件号 (例: V-25526479): ")
                .await?;
            match IdentityNumber::parse(&answer) {
                Some(identity) => break identity,
                None => println!("❌ 证件号格式无效，请使用 V-12345678 格式"),
            }
        };
        info!("证件号: {}", identity);

        self.search_and_select(session, flow, &identity.to_string()).await
    }

    /// 两类实体共用的"搜索 → 展示 → 确认 → 选择 → 保存"
    async fn search_and_select(
        &self,
        session: &mut Session,
        mut flow: EntityWorkflow,
        term: &str,
    ) -> AppResult<StageResult> {
        let kind = flow.kind().clone();

        let candidate = match flow.search(session, &self.sync, term).await? {
            SearchOutcome::Found(entity) => entity,
            SearchOutcome::Empty => {
                flow.finish()?;
                warn!("⚠️ 未找到{}: {}", kind.label, term);
                return Ok(StageResult::outcome(EntityOutcome::NotFound));
            }
        };

        // 每次搜到都记录，不管之后是否选择
        let found = SelectionRecord {
            entity: candidate.clone(),
            search_term: term.to_string(),
            state: SelectionState::FoundNotSelected,
            confirmed: None,
            selection_response: flow.search_response().cloned(),
            snapshot: flow.snapshot().cloned(),
            saved_at: now(),
        };
        self.persist(|a| a.save_found(kind.name, &found));

        print_entity_summary(&kind, &candidate);
        let question = format!("是否选择该{}? (s/n): ", kind.label);
        if !ask_yes_no(self.prompter.as_ref(), &question).await? {
            flow.finish()?;
            return Ok(StageResult::outcome(EntityOutcome::FoundNotSelected(candidate)));
        }

        let result = flow.select(session, &self.sync).await?;
        flow.finish()?;

        let record = SelectionRecord {
            entity: result.entity.clone(),
            search_term: term.to_string(),
            state: SelectionState::Selected,
            confirmed: Some(result.confirmed),
            selection_response: Some(result.response.clone()),
            snapshot: Some(result.snapshot.clone()),
            saved_at: now(),
        };
        self.persist(|a| a.save_selected(kind.name, &record));

        Ok(StageResult {
            outcome: EntityOutcome::Selected {
                entity: result.entity.clone(),
                confirmed: result.confirmed,
            },
            selected: Some(result),
        })
    }

    /// 结果文件写入失败不影响流程
    fn persist<F>(&self, save: F)
    where
        F: FnOnce(&ArtifactWriter) -> AppResult<std::path::PathBuf>,
    {
        match save(&self.artifacts) {
            Ok(path) => info!("💾 结果已保存至: {}", path.display()),
            Err(e) => warn!("⚠️ 结果保存失败: {}", e),
        }
    }
}

/// 协议错误降级为当前流程失败，其它错误继续向上传播
fn recoverable(label: &str, result: AppResult<StageResult>) -> AppResult<StageResult> {
    match result {
        Err(e) if e.is_protocol() => {
            error!("❌ {}流程中止: {}", label, e);
            Ok(StageResult::outcome(EntityOutcome::Failed(e.to_string())))
        }
        other => other,
    }
}

fn now() -> String {
    chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

// ========== 输出辅助函数 ==========

fn print_entity_summary(kind: &EntityKind, entity: &Entity) {
    println!("\n📋 找到{}:", kind.label);
    for (key, label) in kind.summary_fields {
        println!("   {}: {}", label, entity.display(key));
    }
}

fn print_final_report(report: &RunReport) {
    info!("\n{}", "=".repeat(60));
    info!("📊 运行结果");
    info!(
        "完成时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("{}", "=".repeat(60));
    info!("🏢 企业: {}", report.company.describe());
    info!("👤 司机: {}", report.driver.describe());
    info!("{}", "=".repeat(60));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AppError, ProtocolError};

    #[test]
    fn test_protocol_error_becomes_failed_outcome() {
        let result: AppResult<StageResult> = Err(ProtocolError::Status {
            status: 500,
            body: "boom".to_string(),
        }
        .into());
        let stage = recoverable("企业", result).unwrap();
        assert!(matches!(stage.outcome, EntityOutcome::Failed(ref reason) if reason.contains("500")));
        assert!(stage.selected.is_none());
    }

    #[test]
    fn test_cancellation_is_not_recovered() {
        let result: AppResult<StageResult> = Err(AppError::Cancelled);
        assert!(recoverable("企业", result).unwrap_err().is_cancelled());
    }

    #[test]
    fn test_default_report_is_not_attempted() {
        let report = RunReport::default();
        assert_eq!(report.company, EntityOutcome::NotAttempted);
        assert_eq!(report.driver, EntityOutcome::NotAttempted);
    }
}
