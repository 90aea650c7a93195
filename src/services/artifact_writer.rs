//! 结果与诊断文件写入服务 - 业务能力层
//!
//! 只负责"把东西写到磁盘 / 读回上一次的选择结果"，不关心流程

use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::{AppError, AppResult};
use crate::models::entity::{Entity, SelectionRecord};

/// 结果与诊断文件写入服务
///
/// 文件：
/// - `component_not_found.html`：找不到组件时的最后一次页面
/// - `protocol_error.html`：最近一次非 200 响应体
/// - `<kind>_found.json` / `<kind>_selected.json`：搜索与选择结果
#[derive(Debug, Clone)]
pub struct ArtifactWriter {
    dir: PathBuf,
}

impl ArtifactWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_of(&self, file_name: &str) -> PathBuf {
        self.dir.join(file_name)
    }

    fn write(&self, file_name: &str, content: &[u8]) -> AppResult<PathBuf> {
        fs::create_dir_all(&self.dir)
            .map_err(|e| AppError::file(self.dir.display().to_string(), e))?;
        let path = self.path_of(file_name);
        fs::write(&path, content).map_err(|e| AppError::file(path.display().to_string(), e))?;
        debug!("已写入 {}", path.display());
        Ok(path)
    }

    /// 找不到组件时保存原始页面
    pub fn save_markup(&self, html: &str) -> AppResult<PathBuf> {
        self.write("component_not_found.html", html.as_bytes())
    }

    /// 保存非 200 响应体
    pub fn save_protocol_error(&self, status: u16, body: &str) -> AppResult<PathBuf> {
        let content = format!("<!-- status: {} -->\n{}", status, body);
        self.write("protocol_error.html", content.as_bytes())
    }

    pub fn save_json<T: Serialize>(&self, file_name: &str, value: &T) -> AppResult<PathBuf> {
        let json = serde_json::to_vec_pretty(value)?;
        self.write(file_name, &json)
    }

    pub fn save_found(&self, kind: &str, record: &SelectionRecord) -> AppResult<PathBuf> {
        self.save_json(&format!("{}_found.json", kind), record)
    }

    pub fn save_selected(&self, kind: &str, record: &SelectionRecord) -> AppResult<PathBuf> {
        self.save_json(&format!("{}_selected.json", kind), record)
    }

    /// 读回上一次持久化的选择结果中的实体
    ///
    /// 文件不存在或内容无法解析时返回 None
    pub fn load_selected(&self, kind: &str) -> Option<Entity> {
        let path = self.path_of(&format!("{}_selected.json", kind));
        let content = fs::read_to_string(&path).ok()?;
        match serde_json::from_str::<SelectionRecord>(&content) {
            Ok(record) => Some(record.entity),
            Err(e) => {
                warn!("⚠️ 无法解析 {}: {}", path.display(), e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::entity::SelectionState;
    use serde_json::json;

    fn record() -> SelectionRecord {
        SelectionRecord {
            entity: Entity::from_value(&json!({"id": 7, "codigo": 12345})).unwrap(),
            search_term: "12345".to_string(),
            state: SelectionState::Selected,
            confirmed: Some(true),
            selection_response: None,
            snapshot: None,
            saved_at: "2025-01-01 00:00:00".to_string(),
        }
    }

    #[test]
    fn test_selected_record_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ArtifactWriter::new(dir.path().join("nested"));

        assert!(writer.load_selected("company").is_none());
        writer.save_selected("company", &record()).unwrap();

        let entity = writer.load_selected("company").unwrap();
        assert_eq!(entity.id(), Some(&json!(7)));
    }

    #[test]
    fn test_corrupt_record_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ArtifactWriter::new(dir.path());
        std::fs::write(dir.path().join("company_selected.json"), "{not json").unwrap();
        assert!(writer.load_selected("company").is_none());
    }

    #[test]
    fn test_protocol_error_body_is_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ArtifactWriter::new(dir.path());
        let path = writer.save_protocol_error(500, "<h1>Server Error</h1>").unwrap();
        let content = std::fs::read_to_string(path).unwrap();
        assert!(content.contains("500"));
        assert!(content.contains("Server Error"));
    }
}
