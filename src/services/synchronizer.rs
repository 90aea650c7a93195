//! 快照同步 - 业务能力层
//!
//! 一次往返：规范化 memo → 发送更新 → 用服务端返回的 memo 整体替换本地 memo。
//! 调用方拿到的是新的快照，旧快照不会被修改。

use serde_json::{json, Value as JsonValue};
use tracing::{debug, info, warn};

use crate::config::ComponentConfig;
use crate::error::{AppResult, ProtocolError};
use crate::infrastructure::{HttpRequest, Session};
use crate::models::{
    Completeness, ComponentSnapshot, Dependency, Effects, Emit, Entity, Memo, UpdateOp,
    UpdateRequest, UpdateResponse,
};
use crate::services::artifact_writer::ArtifactWriter;
use crate::utils::truncate_text;

/// 一次同步的结果
#[derive(Debug, Clone)]
pub struct SyncOutcome<T> {
    /// 替换 memo 之后的新快照
    pub snapshot: ComponentSnapshot,
    /// 调用方从新 memo 中提取的值
    pub result: T,
    pub effects: Effects,
    /// 原始响应 JSON，用于持久化
    pub raw: JsonValue,
}

/// 快照同步器
pub struct SnapshotSynchronizer {
    endpoint_prefix: String,
    referer_path: String,
    completeness: Completeness,
    artifacts: ArtifactWriter,
}

impl SnapshotSynchronizer {
    pub fn new(component: &ComponentConfig, completeness: Completeness, artifacts: ArtifactWriter) -> Self {
        Self {
            endpoint_prefix: component.endpoint_prefix.clone(),
            referer_path: component.register_path.clone(),
            completeness,
            artifacts,
        }
    }

    pub fn artifacts(&self) -> &ArtifactWriter {
        &self.artifacts
    }

    fn endpoint_path(&self, snapshot: &ComponentSnapshot) -> String {
        format!(
            "/{}/{}",
            self.endpoint_prefix.trim_matches('/'),
            snapshot.fingerprint().name()
        )
    }

    /// 发送一次组件更新
    ///
    /// `project` 在服务端返回的 memo 上执行，用来取出本次关心的值
    pub async fn sync<T, F>(
        &self,
        session: &mut Session,
        snapshot: &ComponentSnapshot,
        updates: Vec<UpdateOp>,
        project: F,
    ) -> AppResult<SyncOutcome<T>>
    where
        F: FnOnce(&Memo) -> T,
    {
        let memo = snapshot.memo().normalized(&self.completeness);
        let body = serde_json::to_value(UpdateRequest {
            fingerprint: snapshot.fingerprint(),
            server_memo: &memo,
            updates: &updates,
        })?;

        let endpoint = session.url(&self.endpoint_path(snapshot));
        debug!("📤 组件更新 {} ({} 个操作)", endpoint, updates.len());

        let request = HttpRequest::post_json(endpoint.clone(), body)
            .header("X-Livewire", "true")
            .header("X-CSRF-TOKEN", session.header_token().unwrap_or_default())
            .header("Content-Type", "application/json")
            .header("Accept", "text/html, application/xhtml+xml")
            .header("Referer", session.url(&self.referer_path))
            .header("Origin", session.site().base_url.trim_end_matches('/'));

        let response = session.send(request).await?;

        if !response.is_ok() {
            if let Err(e) = self.artifacts.save_protocol_error(response.status, &response.body) {
                warn!("⚠️ 保存错误响应失败: {}", e);
            }
            return Err(ProtocolError::Status {
                status: response.status,
                body: truncate_text(&response.body, 200),
            }
            .into());
        }

        let (parsed, raw) = Self::parse_response(&endpoint, &response.body)?;
        let result = project(&parsed.server_memo);
        debug!("📥 收到 {} 个事件", parsed.effects.emits.len());

        Ok(SyncOutcome {
            snapshot: snapshot.with_memo(parsed.server_memo),
            result,
            effects: parsed.effects,
            raw,
        })
    }

    fn parse_response(endpoint: &str, body: &str) -> AppResult<(UpdateResponse, JsonValue)> {
        let malformed = |reason: String| ProtocolError::MalformedResponse {
            endpoint: endpoint.to_string(),
            reason,
        };

        let raw: JsonValue =
            serde_json::from_str(body).map_err(|e| malformed(format!("不是合法 JSON: {}", e)))?;
        if !raw.get("serverMemo").map(JsonValue::is_object).unwrap_or(false) {
            return Err(malformed("缺少 serverMemo".to_string()).into());
        }
        let parsed: UpdateResponse =
            serde_json::from_value(raw.clone()).map_err(|e| malformed(e.to_string()))?;
        Ok((parsed, raw))
    }

    /// 选择之前检查 memo 是否带有服务端哈希
    ///
    /// 缺失时只告警，请求仍会发送
    pub fn warn_if_unsigned(snapshot: &ComponentSnapshot) {
        let memo = snapshot.memo();
        if memo.html_hash().is_none() {
            warn!("⚠️ memo 缺少 htmlHash，服务端可能拒绝本次选择");
        }
        if memo.checksum().is_none() {
            warn!("⚠️ memo 缺少 checksum，服务端可能拒绝本次选择");
        }
    }

    /// 确保快照中存在上游实体列表
    ///
    /// 列表为空时依次尝试：
    /// 1. 调用方持有的已选上游实体
    /// 2. 上一次持久化的上游选择结果
    /// 3. 由快照中的 id / 编码字段拼出的最小实体
    /// 4. 空列表（请求照样发送，交给服务端判断）
    pub fn ensure_dependency(
        &self,
        snapshot: &ComponentSnapshot,
        dependency: &Dependency,
        known: Option<&Entity>,
    ) -> ComponentSnapshot {
        let memo = snapshot.memo();
        if !memo.result_list(dependency.list_key).is_empty() {
            return snapshot.clone();
        }

        let recovered = known
            .cloned()
            .map(|e| (e, "当前会话"))
            .or_else(|| {
                self.artifacts
                    .load_selected(dependency.upstream)
                    .map(|e| (e, "已保存的结果"))
            })
            .or_else(|| minimal_entity(memo, dependency).map(|e| (e, "快照字段")));

        let items = match recovered {
            Some((entity, source)) => {
                info!("🔧 {} 列表为空，使用{}重建", dependency.list_key, source);
                vec![entity.to_value()]
            }
            None => {
                warn!(
                    "⚠️ {} 列表为空且无法重建，按空列表继续",
                    dependency.list_key
                );
                Vec::new()
            }
        };

        snapshot.with_memo(memo.with_recovered_list(dependency.list_key, items))
    }
}

/// 由 `data.<id_field>` 和 `data.<code_field>` 拼出最小实体，两者都存在时才成立；代码不是纯数字时为 null
fn minimal_entity(memo: &Memo, dependency: &Dependency) -> Option<Entity> {
    let id = memo
        .field(dependency.id_field)
        .filter(|v| !v.is_null() && v.as_str() != Some(""))?
        .clone();
    let code = memo.field_text(dependency.code_field)?;
    // 非数字代码不可信，置空
    let code_value = Some(code.as_str())
        .filter(|c| c.chars().all(|ch| ch.is_ascii_digit()))
        .and_then(|c| c.parse::<u64>().ok())
        .map_or(JsonValue::Null, JsonValue::from);
    Entity::from_value(&json!({ "id": id, "codigo": code_value }))
}

/// 选择是否被服务端确认
///
/// 条件：存在 `alert` 事件，第一个参数为 `success`，第二个参数包含确认词（不区分大小写）
pub fn selection_confirmed(emits: &[Emit], phrase: &str) -> bool {
    let phrase = phrase.to_lowercase();
    emits.iter().any(|emit| {
        emit.event == "alert"
            && emit.params.first().and_then(JsonValue::as_str) == Some("success")
            && emit
                .params
                .get(1)
                .and_then(JsonValue::as_str)
                .map(|message| message.to_lowercase().contains(&phrase))
                .unwrap_or(false)
    })
}
