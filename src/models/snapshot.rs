//! 组件快照模型
//!
//! 快照 = 指纹（不可变身份）+ 服务端备忘（memo）。
//! memo 里的 `htmlHash` / `checksum` 由服务端根据整个 memo 计算，客户端无法复算，
//! 因此 `Memo` 不提供逐字段修改的接口：只能整体替换为服务端返回值，或者按"缺哪个键补哪个键"做规范化。

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value as JsonValue};
use std::sync::OnceLock;

use crate::error::AppResult;
use crate::models::entity_kind::Completeness;

/// 组件指纹
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fingerprint {
    id: String,
    name: String,
    #[serde(default)]
    locale: String,
    #[serde(default)]
    path: String,
    #[serde(default)]
    method: String,
    #[serde(default)]
    v: String,
    /// 服务端额外下发的键，原样回传
    #[serde(flatten)]
    extra: Map<String, JsonValue>,
}

impl Fingerprint {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        locale: impl Into<String>,
        path: impl Into<String>,
        method: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            locale: locale.into(),
            path: path.into(),
            method: method.into(),
            v: version.into(),
            extra: Map::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// 组件类型名（加密后的不透明字符串），用于拼接更新接口地址
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

fn empty_data() -> &'static Map<String, JsonValue> {
    static EMPTY: OnceLock<Map<String, JsonValue>> = OnceLock::new();
    EMPTY.get_or_init(Map::new)
}

/// 服务端备忘
///
/// 服务端没发的键回传时同样省略，否则校验和对不上
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Memo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    children: Option<JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    errors: Option<JsonValue>,
    #[serde(rename = "htmlHash", default, skip_serializing_if = "Option::is_none")]
    html_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    data: Option<Map<String, JsonValue>>,
    #[serde(rename = "dataMeta", default, skip_serializing_if = "Option::is_none")]
    data_meta: Option<JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    checksum: Option<String>,
    #[serde(flatten)]
    extra: Map<String, JsonValue>,
}

impl Memo {
    /// 只有数据袋、没有哈希与校验和的最小 memo（降级模式使用）
    pub fn minimal(data: Map<String, JsonValue>) -> Self {
        Self {
            children: Some(json!({})),
            errors: Some(json!([])),
            html_hash: None,
            data: Some(data),
            data_meta: Some(json!([])),
            checksum: None,
            extra: Map::new(),
        }
    }

    /// 数据袋；服务端没发时为空表
    pub fn data(&self) -> &Map<String, JsonValue> {
        self.data.as_ref().unwrap_or_else(|| empty_data())
    }

    pub fn html_hash(&self) -> Option<&str> {
        self.html_hash.as_deref()
    }

    pub fn checksum(&self) -> Option<&str> {
        self.checksum.as_deref()
    }

    /// 数据袋中的命名结果列表；缺失或不是数组时为空
    pub fn result_list(&self, key: &str) -> &[JsonValue] {
        self.data()
            .get(key)
            .and_then(|v| v.as_array())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// 嵌套字段表 `data.data.<key>` 中的值
    pub fn field(&self, key: &str) -> Option<&JsonValue> {
        self.data().get("data").and_then(|d| d.get(key))
    }

    /// 非空字符串字段（数字会转成文本）
    pub fn field_text(&self, key: &str) -> Option<String> {
        match self.field(key)? {
            JsonValue::String(s) if !s.is_empty() => Some(s.clone()),
            JsonValue::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// 完整性规范化
    ///
    /// 只补充缺失的键，已有的键（即使为空）保持原值
    pub fn normalized(&self, completeness: &Completeness) -> Memo {
        let mut memo = self.clone();
        let missing: Vec<_> = completeness
            .defaults()
            .iter()
            .filter(|(key, _)| !self.data().contains_key(*key))
            .collect();
        if missing.is_empty() {
            return memo;
        }
        let data = memo.data.get_or_insert_with(Map::new);
        for (key, default) in missing {
            data.insert((*key).to_string(), default.clone());
        }
        memo
    }

    /// 服务端漏发依赖列表时的重建
    ///
    /// 只有列表缺失或为空时才会写入
    pub(crate) fn with_recovered_list(&self, key: &str, items: Vec<JsonValue>) -> Memo {
        let mut memo = self.clone();
        if memo.result_list(key).is_empty() {
            memo.data
                .get_or_insert_with(Map::new)
                .insert(key.to_string(), JsonValue::Array(items));
        }
        memo
    }

    /// 除校验和之外结构相同
    pub fn same_state_as(&self, other: &Memo) -> bool {
        self.children == other.children
            && self.errors == other.errors
            && self.html_hash == other.html_hash
            && self.data == other.data
            && self.data_meta == other.data_meta
            && self.extra == other.extra
    }
}

/// 组件快照
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentSnapshot {
    fingerprint: Fingerprint,
    #[serde(rename = "serverMemo")]
    memo: Memo,
    #[serde(skip)]
    degraded: bool,
}

impl ComponentSnapshot {
    /// 解析页面中嵌入的 initial-data（已做实体解码的 JSON）
    pub fn from_initial_data(raw: &str) -> AppResult<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    /// 降级快照：调用方应当把它的数据袋视为空
    pub fn degraded(fingerprint: Fingerprint, memo: Memo) -> Self {
        Self {
            fingerprint,
            memo,
            degraded: true,
        }
    }

    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    pub fn memo(&self) -> &Memo {
        &self.memo
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    /// 用服务端返回的 memo 整体替换，指纹原样保留
    pub fn with_memo(&self, memo: Memo) -> Self {
        Self {
            fingerprint: self.fingerprint.clone(),
            memo,
            degraded: self.degraded,
        }
    }
}

/// 一次往返中的更新操作
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum UpdateOp {
    #[serde(rename = "syncInput")]
    SyncInput {
        id: String,
        name: String,
        value: JsonValue,
    },
    #[serde(rename = "callMethod")]
    CallMethod {
        id: String,
        method: String,
        params: Vec<JsonValue>,
    },
}

impl UpdateOp {
    pub fn sync_input(id: &str, name: &str, value: impl Into<JsonValue>) -> Self {
        UpdateOp::SyncInput {
            id: id.to_string(),
            name: name.to_string(),
            value: value.into(),
        }
    }

    pub fn call_method(id: &str, method: &str, params: Vec<JsonValue>) -> Self {
        UpdateOp::CallMethod {
            id: id.to_string(),
            method: method.to_string(),
            params,
        }
    }
}

/// 发往组件更新接口的请求体
#[derive(Debug, Serialize)]
pub struct UpdateRequest<'a> {
    pub fingerprint: &'a Fingerprint,
    #[serde(rename = "serverMemo")]
    pub server_memo: &'a Memo,
    pub updates: &'a [UpdateOp],
}

/// 服务端声明的事件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Emit {
    pub event: String,
    #[serde(default)]
    pub params: Vec<JsonValue>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Effects {
    #[serde(default)]
    pub emits: Vec<Emit>,
    #[serde(flatten)]
    pub rest: Map<String, JsonValue>,
}

/// 组件更新接口的响应
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateResponse {
    #[serde(rename = "serverMemo")]
    pub server_memo: Memo,
    #[serde(default)]
    pub effects: Effects,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_memo() -> Memo {
        serde_json::from_value(json!({
            "children": {"l1-0": {"id": "c1", "tag": "div"}},
            "errors": [],
            "htmlHash": "fd29f861",
            "data": {
                "data": {"code": "", "num": 7},
                "empresas": [],
                "anios_cuspal": ["2030"]
            },
            "dataMeta": [],
            "checksum": "abc",
            "unknownKey": 1
        }))
        .unwrap()
    }

    #[test]
    fn test_memo_round_trip_keeps_unknown_keys() {
        let memo = sample_memo();
        let back = serde_json::to_value(&memo).unwrap();
        assert_eq!(back["unknownKey"], json!(1));
        assert_eq!(back["htmlHash"], json!("fd29f861"));
        assert_eq!(back["checksum"], json!("abc"));
    }

    #[test]
    fn test_memo_round_trip_does_not_add_absent_keys() {
        let wire = json!({"htmlHash": "h", "data": {"x": 1}, "checksum": "c"});
        let memo: Memo = serde_json::from_value(wire.clone()).unwrap();
        assert_eq!(serde_json::to_value(&memo).unwrap(), wire);

        let bare: Memo = serde_json::from_value(json!({"checksum": "c"})).unwrap();
        assert!(bare.data().is_empty());
        assert_eq!(serde_json::to_value(&bare).unwrap(), json!({"checksum": "c"}));
    }

    #[test]
    fn test_normalized_is_superset_and_never_alters_existing_keys() {
        let memo = sample_memo();
        let normalized = memo.normalized(&Completeness::registration());

        for (key, value) in memo.data() {
            assert_eq!(normalized.data().get(key), Some(value), "键 {} 被修改", key);
        }
        // 已存在的 anios_cuspal 不被默认值覆盖
        assert_eq!(normalized.data()["anios_cuspal"], json!(["2030"]));
        assert_eq!(normalized.data()["conductores"], json!([]));
        assert_eq!(normalized.data()["meses_cuspal"].as_array().unwrap().len(), 12);
        assert_eq!(normalized.checksum(), Some("abc"));
        assert_eq!(normalized.html_hash(), Some("fd29f861"));
    }

    #[test]
    fn test_normalized_is_idempotent() {
        let completeness = Completeness::registration();
        let once = sample_memo().normalized(&completeness);
        assert_eq!(once.normalized(&completeness), once);
    }

    #[test]
    fn test_recovered_list_only_fills_empty() {
        let memo = sample_memo();
        let recovered = memo.with_recovered_list("empresas", vec![json!({"id": 1})]);
        assert_eq!(recovered.result_list("empresas").len(), 1);

        let untouched = recovered.with_recovered_list("empresas", vec![json!({"id": 2})]);
        assert_eq!(untouched.result_list("empresas")[0]["id"], json!(1));
    }

    #[test]
    fn test_field_text() {
        let memo = sample_memo();
        assert_eq!(memo.field_text("code"), None);
        assert_eq!(memo.field_text("num"), Some("7".to_string()));
        assert_eq!(memo.field_text("missing"), None);
    }

    #[test]
    fn test_update_op_wire_shape() {
        let ops = vec![
            UpdateOp::sync_input("ohmu", "data.code", "12345"),
            UpdateOp::call_method("mvmr", "searchEmpresaCodigo", vec![]),
        ];
        let wire = serde_json::to_value(&ops).unwrap();
        assert_eq!(
            wire,
            json!([
                {"type": "syncInput", "payload": {"id": "ohmu", "name": "data.code", "value": "12345"}},
                {"type": "callMethod", "payload": {"id": "mvmr", "method": "searchEmpresaCodigo", "params": []}}
            ])
        );
    }

    #[test]
    fn test_snapshot_from_initial_data_ignores_effects() {
        let raw = json!({
            "fingerprint": {"id": "X1", "name": "comp", "locale": "es", "path": "despachos/registrar", "method": "GET", "v": "acj"},
            "effects": {"listeners": []},
            "serverMemo": sample_memo()
        })
        .to_string();
        let snapshot = ComponentSnapshot::from_initial_data(&raw).unwrap();
        assert_eq!(snapshot.fingerprint().id(), "X1");
        assert_eq!(snapshot.fingerprint().name(), "comp");
        assert!(!snapshot.is_degraded());

        let replaced = snapshot.with_memo(Memo::minimal(Map::new()));
        assert_eq!(replaced.fingerprint(), snapshot.fingerprint());
        assert!(replaced.memo().data().is_empty());
    }
}
