//! 实体查找与选择流程 - 流程层
//!
//! 核心职责：定义"一类实体"的完整处理流程
//!
//! 状态顺序：
//! `Idle → Navigated → Searched → (Selected | SearchEmpty) → Done`
//!
//! 流程不持有会话，也不持有同步器，只持有"当前快照"。
//! 每一步都把旧快照交给同步器，再用返回的新快照替换。

use serde_json::{json, Value as JsonValue};
use std::fmt::Display;
use tracing::{info, warn};

use crate::error::{AppError, AppResult, ProtocolError};
use crate::infrastructure::Session;
use crate::models::{ComponentSnapshot, Entity, EntityKind, Memo, UpdateOp, DISPATCH_METHOD};
use crate::services::{selection_confirmed, SnapshotLoader, SnapshotSynchronizer};

/// 流程状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowState {
    Idle,
    /// 已拿到组件快照
    Navigated,
    /// 搜索完成且有候选实体
    Searched,
    /// 搜索完成但结果列表为空
    SearchEmpty,
    Selected,
    Done,
}

impl Display for WorkflowState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            WorkflowState::Idle => "Idle",
            WorkflowState::Navigated => "Navigated",
            WorkflowState::Searched => "Searched",
            WorkflowState::SearchEmpty => "SearchEmpty",
            WorkflowState::Selected => "Selected",
            WorkflowState::Done => "Done",
        };
        f.write_str(name)
    }
}

/// 搜索结果
#[derive(Debug, Clone, PartialEq)]
pub enum SearchOutcome {
    /// 结果列表中的第一个实体
    Found(Entity),
    Empty,
}

/// 选择成功后的结果，下游流程只能从这里开始
#[derive(Debug, Clone)]
pub struct WorkflowResult {
    pub kind: &'static str,
    pub entity: Entity,
    /// 选择之后的快照
    pub snapshot: ComponentSnapshot,
    /// 服务端是否明确确认了选择
    pub confirmed: bool,
    /// 选择请求的原始响应
    pub response: JsonValue,
}

/// 实体处理流程
///
/// - 校验状态转换，非法调用返回 `InvalidTransition`
/// - 决定发送哪些更新操作
/// - 不持有任何资源（会话）
pub struct EntityWorkflow {
    kind: EntityKind,
    state: WorkflowState,
    snapshot: Option<ComponentSnapshot>,
    /// 上游流程选中的实体（依赖重建的第一来源）
    upstream: Option<Entity>,
    candidate: Option<Entity>,
    search_term: Option<String>,
    search_response: Option<JsonValue>,
    result: Option<WorkflowResult>,
}

impl EntityWorkflow {
    pub fn new(kind: EntityKind) -> Self {
        Self {
            kind,
            state: WorkflowState::Idle,
            snapshot: None,
            upstream: None,
            candidate: None,
            search_term: None,
            search_response: None,
            result: None,
        }
    }

    /// 依赖上游选择结果的流程，直接从上游的快照开始
    pub fn dependent(kind: EntityKind, upstream: &WorkflowResult) -> Self {
        let mut flow = Self::new(kind);
        flow.snapshot = Some(upstream.snapshot.clone());
        flow.upstream = Some(upstream.entity.clone());
        flow.state = WorkflowState::Navigated;
        flow
    }

    pub fn kind(&self) -> &EntityKind {
        &self.kind
    }

    pub fn state(&self) -> WorkflowState {
        self.state
    }

    pub fn snapshot(&self) -> Option<&ComponentSnapshot> {
        self.snapshot.as_ref()
    }

    pub fn candidate(&self) -> Option<&Entity> {
        self.candidate.as_ref()
    }

    pub fn search_term(&self) -> Option<&str> {
        self.search_term.as_deref()
    }

    /// 搜索请求的原始响应
    pub fn search_response(&self) -> Option<&JsonValue> {
        self.search_response.as_ref()
    }

    fn expect_state(&self, expected: WorkflowState, action: &'static str) -> AppResult<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(AppError::InvalidTransition {
                state: self.state.to_string(),
                action,
            })
        }
    }

    fn current_snapshot(&self, action: &'static str) -> AppResult<&ComponentSnapshot> {
        self.snapshot.as_ref().ok_or(AppError::InvalidTransition {
            state: self.state.to_string(),
            action,
        })
    }

    /// 打开组件页面：Idle → Navigated
    pub async fn navigate(
        &mut self,
        session: &mut Session,
        loader: &SnapshotLoader,
        path: &str,
    ) -> AppResult<&ComponentSnapshot> {
        self.expect_state(WorkflowState::Idle, "navigate")?;
        let snapshot = loader.load(session, path).await?;
        if snapshot.is_degraded() {
            warn!("⚠️ [{}] 使用降级快照继续", self.kind.label);
        }
        self.attach(snapshot)
    }

    /// 使用已有快照开始：Idle → Navigated
    pub fn attach(&mut self, snapshot: ComponentSnapshot) -> AppResult<&ComponentSnapshot> {
        self.expect_state(WorkflowState::Idle, "attach")?;
        self.state = WorkflowState::Navigated;
        Ok(&*self.snapshot.insert(snapshot))
    }

    /// 按关键字搜索：Navigated → Searched | SearchEmpty
    pub async fn search(
        &mut self,
        session: &mut Session,
        sync: &SnapshotSynchronizer,
        term: &str,
    ) -> AppResult<SearchOutcome> {
        self.expect_state(WorkflowState::Navigated, "search")?;
        let mut snapshot = self.current_snapshot("search")?.clone();

        if let Some(dependency) = &self.kind.dependency {
            snapshot = sync.ensure_dependency(&snapshot, dependency, self.upstream.as_ref());
        }

        info!("🔍 [{}] 搜索: {}", self.kind.label, term);
        let updates = vec![
            UpdateOp::sync_input(self.kind.search_input_id, self.kind.search_field, term),
            UpdateOp::call_method(self.kind.search_call_id, self.kind.search_method, vec![]),
        ];
        let list_key = self.kind.result_list;
        let outcome = sync
            .sync(session, &snapshot, updates, |memo: &Memo| {
                memo.result_list(list_key).first().and_then(Entity::from_value)
            })
            .await?;

        self.snapshot = Some(outcome.snapshot);
        self.search_term = Some(term.to_string());
        self.search_response = Some(outcome.raw);

        match outcome.result {
            Some(entity) => {
                info!("✓ [{}] 找到候选实体 id={}", self.kind.label, entity.display("id"));
                self.candidate = Some(entity.clone());
                self.state = WorkflowState::Searched;
                Ok(SearchOutcome::Found(entity))
            }
            None => {
                info!("[{}] 搜索结果为空", self.kind.label);
                self.state = WorkflowState::SearchEmpty;
                Ok(SearchOutcome::Empty)
            }
        }
    }

    /// 选择候选实体：Searched → Selected
    ///
    /// 服务端没有明确确认时仍然采用返回的 memo，只记录告警
    pub async fn select(
        &mut self,
        session: &mut Session,
        sync: &SnapshotSynchronizer,
    ) -> AppResult<WorkflowResult> {
        self.expect_state(WorkflowState::Searched, "select")?;
        let mut snapshot = self.current_snapshot("select")?.clone();
        let candidate = self.candidate.clone().ok_or(AppError::InvalidTransition {
            state: self.state.to_string(),
            action: "select",
        })?;
        let id = candidate.id().cloned().ok_or_else(|| ProtocolError::MalformedResponse {
            endpoint: self.kind.search_method.to_string(),
            reason: "候选实体缺少 id".to_string(),
        })?;

        // 搜索响应可能漏掉上游列表，选择前同样要补回
        if let Some(dependency) = &self.kind.dependency {
            snapshot = sync.ensure_dependency(&snapshot, dependency, self.upstream.as_ref());
        }
        SnapshotSynchronizer::warn_if_unsigned(&snapshot);

        info!("🎯 [{}] 选择 id={}", self.kind.label, id);
        let updates = vec![UpdateOp::call_method(
            self.kind.select_call_id,
            DISPATCH_METHOD,
            vec![json!(self.kind.selector), id.clone()],
        )];
        let list_key = self.kind.result_list;
        let outcome = sync
            .sync(session, &snapshot, updates, |memo: &Memo| {
                memo.result_list(list_key)
                    .iter()
                    .filter_map(Entity::from_value)
                    .find(|e| e.id() == Some(&id))
            })
            .await?;

        let confirmed = selection_confirmed(&outcome.effects.emits, self.kind.confirm_phrase);
        if confirmed {
            info!("✅ [{}] 服务端已确认选择", self.kind.label);
        } else {
            warn!("⚠️ [{}] 响应中没有确认消息，仍采用新的快照", self.kind.label);
        }

        let result = WorkflowResult {
            kind: self.kind.name,
            entity: outcome.result.unwrap_or(candidate),
            snapshot: outcome.snapshot.clone(),
            confirmed,
            response: outcome.raw,
        };
        self.snapshot = Some(outcome.snapshot);
        self.state = WorkflowState::Selected;
        self.result = Some(result.clone());
        Ok(result)
    }

    /// 结束流程：Searched | SearchEmpty | Selected → Done
    ///
    /// 只有选择成功的流程会返回结果
    pub fn finish(&mut self) -> AppResult<Option<WorkflowResult>> {
        match self.state {
            WorkflowState::Searched | WorkflowState::SearchEmpty | WorkflowState::Selected => {
                self.state = WorkflowState::Done;
                Ok(self.result.take())
            }
            _ => Err(AppError::InvalidTransition {
                state: self.state.to_string(),
                action: "finish",
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Fingerprint, Memo};
    use serde_json::Map;

    fn snapshot() -> ComponentSnapshot {
        ComponentSnapshot::degraded(
            Fingerprint::new("X", "reg", "es", "despachos/registrar", "GET", "acj"),
            Memo::minimal(Map::new()),
        )
    }

    #[test]
    fn test_new_workflow_is_idle() {
        let flow = EntityWorkflow::new(EntityKind::company());
        assert_eq!(flow.state(), WorkflowState::Idle);
        assert!(flow.snapshot().is_none());
    }

    #[test]
    fn test_attach_moves_to_navigated_once() {
        let mut flow = EntityWorkflow::new(EntityKind::company());
        flow.attach(snapshot()).unwrap();
        assert_eq!(flow.state(), WorkflowState::Navigated);

        let err = flow.attach(snapshot()).unwrap_err();
        assert!(matches!(err, AppError::InvalidTransition { action: "attach", .. }));
    }

    #[test]
    fn test_finish_before_search_is_rejected() {
        let mut flow = EntityWorkflow::new(EntityKind::company());
        assert!(flow.finish().is_err());
        flow.attach(snapshot()).unwrap();
        assert!(flow.finish().is_err());
    }

    #[test]
    fn test_dependent_starts_navigated_with_upstream_snapshot() {
        let upstream = WorkflowResult {
            kind: "company",
            entity: Entity::from_value(&json!({"id": "E1"})).unwrap(),
            snapshot: snapshot(),
            confirmed: false,
            response: json!({}),
        };
        let flow = EntityWorkflow::dependent(EntityKind::driver(), &upstream);
        assert_eq!(flow.state(), WorkflowState::Navigated);
        assert_eq!(flow.snapshot(), Some(&upstream.snapshot));
    }

    #[test]
    fn test_state_display() {
        assert_eq!(WorkflowState::SearchEmpty.to_string(), "SearchEmpty");
    }
}
