//! 页面标记解析 - 基础设施层
//!
//! 只负责从原始 HTML 中找出元素并读取属性，不理解页面语义

use regex::Regex;

/// 一个开始标签及其属性
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub tag: String,
    /// 属性按出现顺序保存，值已做实体解码
    pub attrs: Vec<(String, String)>,
}

impl Element {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn has_attr(&self, name: &str) -> bool {
        self.attr(name).is_some()
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.attr("class")
            .map(|c| c.split_whitespace().any(|token| token.contains(class)))
            .unwrap_or(false)
    }
}

/// 解析页面中所有的开始标签
pub fn parse_elements(markup: &str) -> Vec<Element> {
    let Ok(tag_re) = Regex::new(r#"<([A-Za-z][A-Za-z0-9-]*)((?:\s+[^\s=>/"']+(?:\s*=\s*(?:"[^"]*"|'[^']*'|[^\s>"']+))?)*)\s*/?>"#) else {
        return Vec::new();
    };
    let Ok(attr_re) = Regex::new(r#"([^\s=>/"']+)(?:\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s>"']+)))?"#) else {
        return Vec::new();
    };

    tag_re
        .captures_iter(markup)
        .map(|cap| {
            let tag = cap[1].to_ascii_lowercase();
            let raw_attrs = cap.get(2).map(|m| m.as_str()).unwrap_or_default();
            let attrs = attr_re
                .captures_iter(raw_attrs)
                .map(|a| {
                    let value = a
                        .get(2)
                        .or_else(|| a.get(3))
                        .or_else(|| a.get(4))
                        .map(|m| decode_entities(m.as_str()))
                        .unwrap_or_default();
                    (a[1].to_string(), value)
                })
                .collect();
            Element { tag, attrs }
        })
        .collect()
}

/// 按属性名和属性值查找第一个元素
pub fn find_by_attr<'a>(elements: &'a [Element], name: &str, value: &str) -> Option<&'a Element> {
    elements.iter().find(|e| e.attr(name) == Some(value))
}

/// 查找带有某属性的所有元素
pub fn find_all_with_attr<'a>(elements: &'a [Element], name: &str) -> Vec<&'a Element> {
    elements.iter().filter(|e| e.has_attr(name)).collect()
}

/// 解码 HTML 实体（命名实体只处理常见的几种，数字实体全部支持）
pub fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    let Ok(re) = Regex::new(r"&(#[xX][0-9a-fA-F]+|#[0-9]+|[A-Za-z]+);") else {
        return text.to_string();
    };

    re.replace_all(text, |cap: &regex::Captures| {
        let entity = &cap[1];
        let decoded = if let Some(hex) = entity
            .strip_prefix("#x")
            .or_else(|| entity.strip_prefix("#X"))
        {
            u32::from_str_radix(hex, 16).ok().and_then(char::from_u32)
        } else if let Some(dec) = entity.strip_prefix('#') {
            dec.parse::<u32>().ok().and_then(char::from_u32)
        } else {
            match entity {
                "quot" => Some('"'),
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "apos" => Some('\''),
                "nbsp" => Some('\u{a0}'),
                _ => None,
            }
        };
        decoded
            .map(|c| c.to_string())
            .unwrap_or_else(|| cap[0].to_string())
    })
    .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_attributes_with_colons_and_quotes() {
        let html = r#"<div wire:id="abc" class="card componentRegistro" wire:initial-data="{&quot;a&quot;:1}"><input type='hidden' name=_token value="tok"></div>"#;
        let elements = parse_elements(html);

        let div = find_by_attr(&elements, "wire:id", "abc").unwrap();
        assert_eq!(div.tag, "div");
        assert!(div.has_class("componentRegistro"));
        assert_eq!(div.attr("wire:initial-data"), Some(r#"{"a":1}"#));

        let input = find_by_attr(&elements, "name", "_token").unwrap();
        assert_eq!(input.attr("value"), Some("tok"));
        assert_eq!(input.attr("type"), Some("hidden"));
    }

    #[test]
    fn test_find_all_with_attr() {
        let html = r#"<div wire:id="a"></div><span></span><div wire:id="b" disabled></div>"#;
        let elements = parse_elements(html);
        let found = find_all_with_attr(&elements, "wire:id");
        assert_eq!(found.len(), 2);
        assert!(found[1].has_attr("disabled"));
    }

    #[test]
    fn test_decode_entities() {
        assert_eq!(decode_entities("a &amp; b"), "a & b");
        assert_eq!(decode_entities("&#39;x&#x27;"), "'x'");
        assert_eq!(decode_entities("&unknown; stays"), "&unknown; stays");
        assert_eq!(decode_entities("no entities"), "no entities");
    }
}
