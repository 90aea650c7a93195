use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::fmt::Display;

use crate::models::snapshot::ComponentSnapshot;

/// 搜索结果中的一个实体（属性名 → 值）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Entity(Map<String, JsonValue>);

impl Entity {
    /// 只接受 JSON 对象
    pub fn from_value(value: &JsonValue) -> Option<Self> {
        value.as_object().cloned().map(Entity)
    }

    pub fn from_map(map: Map<String, JsonValue>) -> Self {
        Entity(map)
    }

    pub fn get(&self, key: &str) -> Option<&JsonValue> {
        self.0.get(key)
    }

    /// 实体 id，可能是数字或字符串
    pub fn id(&self) -> Option<&JsonValue> {
        self.0.get("id").filter(|v| !v.is_null())
    }

    /// 字段的展示文本
    pub fn display(&self, key: &str) -> String {
        match self.0.get(key) {
            Some(JsonValue::String(s)) => s.clone(),
            Some(JsonValue::Null) | None => "-".to_string(),
            Some(other) => other.to_string(),
        }
    }

    pub fn to_value(&self) -> JsonValue {
        JsonValue::Object(self.0.clone())
    }
}

/// 证件号：一个类型字母 + 数字，规范形式 `V-12345678`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityNumber {
    letter: char,
    digits: String,
}

impl IdentityNumber {
    const LETTERS: [char; 5] = ['V', 'E', 'J', 'G', 'P'];
    const DEFAULT_LETTER: char = 'V';

    /// 解析 `V-12345678`、`V12345678`、`12345678`（默认字母 V）
    pub fn parse(input: &str) -> Option<Self> {
        let clean: String = input
            .chars()
            .filter(|c| *c != '-' && !c.is_whitespace())
            .collect::<String>()
            .to_uppercase();

        let mut chars = clean.chars();
        let first = chars.next()?;
        let (letter, digits) = if first.is_ascii_digit() {
            (Self::DEFAULT_LETTER, clean.clone())
        } else if Self::LETTERS.contains(&first) {
            (first, chars.collect::<String>())
        } else {
            return None;
        };

        if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        Some(Self { letter, digits })
    }
}

impl Display for IdentityNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.letter, self.digits)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SelectionState {
    Selected,
    FoundNotSelected,
}

/// 持久化的搜索/选择结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectionRecord {
    pub entity: Entity,
    pub search_term: String,
    pub state: SelectionState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selection_response: Option<JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<ComponentSnapshot>,
    pub saved_at: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_identity_number_formats() {
        let canonical = IdentityNumber::parse("V-25526479").unwrap();
        assert_eq!(canonical.to_string(), "V-25526479");

        assert_eq!(IdentityNumber::parse("e12345").unwrap().to_string(), "E-12345");
        assert_eq!(IdentityNumber::parse(" 25526479 ").unwrap().to_string(), "V-25526479");
        assert_eq!(IdentityNumber::parse("j 123 456").unwrap().to_string(), "J-123456");
    }

    #[test]
    fn test_identity_number_rejects_invalid() {
        assert!(IdentityNumber::parse("").is_none());
        assert!(IdentityNumber::parse("X-123").is_none());
        assert!(IdentityNumber::parse("V-").is_none());
        assert!(IdentityNumber::parse("V-12a4").is_none());
    }

    #[test]
    fn test_entity_accessors() {
        let entity = Entity::from_value(&json!({"id": "E1", "codigo": 12345, "rif": null})).unwrap();
        assert_eq!(entity.id(), Some(&json!("E1")));
        assert_eq!(entity.display("codigo"), "12345");
        assert_eq!(entity.display("rif"), "-");
        assert!(Entity::from_value(&json!([1, 2])).is_none());

        let no_id = Entity::from_value(&json!({"id": null})).unwrap();
        assert!(no_id.id().is_none());
    }

    #[test]
    fn test_selection_state_wire_names() {
        assert_eq!(
            serde_json::to_value(SelectionState::FoundNotSelected).unwrap(),
            json!("FOUND_NOT_SELECTED")
        );
    }
}
