//! # SICA Client
//!
//! 调度登记系统的自动化客户端：登录、定位登记组件、查找并选择企业与司机
//!
//! ## 架构设计
//!
//! 本系统采用严格的四层架构：
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 持有稀缺资源（Cookie 会话、标准输入），只暴露能力
//! - `Session` - 唯一的会话上下文，负责令牌与登出
//! - `Transport` / `Prompter` - 网络与交互的抽象，测试中可替换
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"
//! - `AuthMachine` - 五步登录
//! - `SnapshotLoader` - 打开页面并解析组件快照
//! - `SnapshotSynchronizer` - 组件更新往返与 memo 替换
//! - `ArtifactWriter` - 写诊断文件与结果文件
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一类实体"的完整处理流程
//! - `EntityWorkflow` - 状态机（navigate → search → select → finish）
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/registration` - 会话生命周期，企业 → 司机串联
//!
//! ## 模块结构

pub mod config;
pub mod error;
pub mod infrastructure;

pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use config::Config;
pub use error::{AppError, AppResult, AuthError, ProtocolError};
pub use infrastructure::{Prompter, Session, Transport};
pub use models::{ComponentSnapshot, Entity, EntityKind};
pub use orchestrator::{App, EntityOutcome, RunReport};
pub use workflow::{EntityWorkflow, SearchOutcome, WorkflowResult, WorkflowState};
