//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层持有会话，负责把各个流程串起来，是整个系统的"指挥中心"。
//!
//! ## 层次关系
//!
//! ```text
//! registration (会话生命周期：登录 → 企业 → 司机 → 登出)
//!     ↓
//! workflow::EntityWorkflow (单类实体的状态机)
//!     ↓
//! services (能力层：auth / snapshot_loader / synchronizer / artifact_writer)
//!     ↓
//! infrastructure (基础设施：Session / Transport / Prompter)
//! ```
//!
//! ## 设计原则
//!
//! 1. **资源隔离**：只有编排层创建并关闭 Session
//! 2. **向下依赖**：编排层 → workflow → services → infrastructure
//! 3. **严格串行**：同一时间只有一个请求或一个输入提示在进行

pub mod registration;

pub use registration::{App, EntityOutcome, RunReport};
