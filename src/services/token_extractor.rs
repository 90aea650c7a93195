//! 令牌提取 - 业务能力层
//!
//! 纯函数：页面 → 可选值。找不到时返回 None，是否致命由调用方决定

use regex::Regex;

use crate::infrastructure::markup;

/// 读取表单隐藏字段 `<input name="{field}" value="...">`
pub fn extract_token(html: &str, field_name: &str) -> Option<String> {
    let elements = markup::parse_elements(html);
    markup::find_by_attr(&elements, "name", field_name)
        .filter(|e| e.tag == "input")
        .and_then(|e| e.attr("value"))
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// 提取页面中第一个独立的 6 位数字
pub fn extract_verification_code(html: &str) -> Option<String> {
    let re = Regex::new(r"\b([0-9]{6})\b").ok()?;
    re.captures(html)
        .and_then(|cap| cap.get(1))
        .map(|m| m.as_str().to_string())
}

/// 读取 `<meta name="{meta_name}" content="...">`
pub fn extract_meta_token(html: &str, meta_name: &str) -> Option<String> {
    let elements = markup::parse_elements(html);
    elements
        .iter()
        .filter(|e| e.tag == "meta")
        .find(|e| e.attr("name") == Some(meta_name))
        .and_then(|e| e.attr("content"))
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
