//! 组件快照加载 - 业务能力层
//!
//! 打开登记页面，找到目标组件，解析出初始快照。
//! 页面还在加载时按重试策略等待；多次尝试后仍找不到组件则保存页面并报错。

use serde_json::{json, Map, Value as JsonValue};
use tracing::{debug, info, warn};

use crate::config::ComponentConfig;
use crate::error::{AppResult, ProtocolError};
use crate::infrastructure::markup::{self, Element};
use crate::infrastructure::Session;
use crate::models::{ComponentSnapshot, EntityKind, Fingerprint, Memo};
use crate::services::artifact_writer::ArtifactWriter;
use crate::services::retry::RetryPolicy;
use crate::services::token_extractor::{extract_meta_token, extract_token};
use crate::utils::truncate_text;

const INITIAL_DATA_ATTR: &str = "wire:initial-data";
const INSTANCE_ATTR: &str = "wire:id";

/// 命中的组件元素及命中方式
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocatedComponent {
    pub instance_id: String,
    /// 页面中嵌入的 initial-data（属性值已做实体解码）
    pub initial_data: Option<String>,
    pub matched_by: MatchRule,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchRule {
    InstanceId,
    DataNeedle,
    ClassMarker,
}

/// 组件定位规则，按顺序尝试：
/// 1. 已知实例 id
/// 2. initial-data 中包含关键字
/// 3. 带实例 id 且 class 含结构标记
pub struct ComponentLocator<'a> {
    config: &'a ComponentConfig,
}

impl<'a> ComponentLocator<'a> {
    pub fn new(config: &'a ComponentConfig) -> Self {
        Self { config }
    }

    /// 页面是否仍显示加载遮罩且组件尚未渲染
    pub fn is_loading(&self, html: &str) -> bool {
        html.contains(&self.config.loading_marker) && !html.contains(&self.config.identity_marker)
    }

    pub fn locate(&self, html: &str) -> Option<LocatedComponent> {
        let elements = markup::parse_elements(html);

        if let Some(e) = markup::find_by_attr(&elements, INSTANCE_ATTR, &self.config.instance_id) {
            return Some(Self::located(e, MatchRule::InstanceId));
        }

        let with_data = markup::find_all_with_attr(&elements, INITIAL_DATA_ATTR);
        let by_needle = with_data.iter().find(|e| {
            e.attr(INITIAL_DATA_ATTR)
                .map(|data| self.config.data_needles.iter().any(|n| data.contains(n.as_str())))
                .unwrap_or(false)
        });
        if let Some(e) = by_needle {
            return Some(Self::located(e, MatchRule::DataNeedle));
        }

        markup::find_all_with_attr(&elements, INSTANCE_ATTR)
            .into_iter()
            .find(|e| e.has_class(&self.config.class_marker))
            .map(|e| Self::located(e, MatchRule::ClassMarker))
    }

    fn located(element: &Element, matched_by: MatchRule) -> LocatedComponent {
        LocatedComponent {
            instance_id: element.attr(INSTANCE_ATTR).unwrap_or_default().to_string(),
            initial_data: element.attr(INITIAL_DATA_ATTR).map(str::to_string),
            matched_by,
        }
    }
}

/// 快照加载器
pub struct SnapshotLoader {
    component: ComponentConfig,
    retry: RetryPolicy,
    artifacts: ArtifactWriter,
}

impl SnapshotLoader {
    pub fn new(component: ComponentConfig, retry: RetryPolicy, artifacts: ArtifactWriter) -> Self {
        Self {
            component,
            retry,
            artifacts,
        }
    }

    /// 打开页面并加载组件快照
    ///
    /// 顺带用页面里的令牌刷新会话
    pub async fn load(&self, session: &mut Session, path: &str) -> AppResult<ComponentSnapshot> {
        let locator = ComponentLocator::new(&self.component);

        for attempt in self.retry.attempts() {
            info!("📄 打开页面 {} (第 {}/{} 次)", path, attempt, self.retry.max_attempts());
            let page = session.get(path).await?;
            let html = page.body;

            if locator.is_loading(&html) && !self.retry.is_last(attempt) {
                debug!("页面仍在加载，稍后重试");
                self.retry.pause().await;
                continue;
            }

            match locator.locate(&html) {
                Some(found) => {
                    info!("✓ 找到组件 {} ({:?})", found.instance_id, found.matched_by);
                    Self::refresh_session_tokens(session, &html);
                    return Ok(self.build_snapshot(&found, path));
                }
                None if self.retry.is_last(attempt) => {
                    match self.artifacts.save_markup(&html) {
                        Ok(saved) => warn!("⚠️ 未找到组件，页面已保存到 {}", saved.display()),
                        Err(e) => warn!("⚠️ 未找到组件，页面保存失败: {}", e),
                    }
                    return Err(ProtocolError::ComponentNotFound {
                        path: path.to_string(),
                        attempts: attempt,
                    }
                    .into());
                }
                None => {
                    debug!("第 {} 次未找到组件", attempt);
                    self.retry.pause().await;
                }
            }
        }

        Err(ProtocolError::ComponentNotFound {
            path: path.to_string(),
            attempts: self.retry.max_attempts(),
        }
        .into())
    }

    fn refresh_session_tokens(session: &mut Session, html: &str) {
        let form = extract_token(html, &session.site().token_field);
        let meta = extract_meta_token(html, &session.site().token_meta);
        session.refresh_tokens(form, meta);
    }

    /// initial-data 无法解析时退回降级快照
    pub fn build_snapshot(&self, found: &LocatedComponent, path: &str) -> ComponentSnapshot {
        if let Some(raw) = &found.initial_data {
            match ComponentSnapshot::from_initial_data(raw) {
                Ok(snapshot) => return snapshot,
                Err(e) => warn!(
                    "⚠️ initial-data 解析失败，使用降级快照: {} ({})",
                    e,
                    truncate_text(raw, 80)
                ),
            }
        } else {
            warn!("⚠️ 组件没有 initial-data，使用降级快照");
        }
        self.degraded_snapshot(&found.instance_id, path)
    }

    fn degraded_snapshot(&self, instance_id: &str, path: &str) -> ComponentSnapshot {
        let fallback = &self.component.fallback;
        let fingerprint = Fingerprint::new(
            instance_id,
            fallback.name.as_str(),
            fallback.locale.as_str(),
            path.trim_start_matches('/'),
            fallback.method.as_str(),
            fallback.version.as_str(),
        );

        let company = EntityKind::company();
        let code_key = company
            .search_field
            .strip_prefix("data.")
            .unwrap_or(company.search_field);
        let mut nested = Map::new();
        nested.insert(code_key.to_string(), json!(""));
        let mut data = Map::new();
        data.insert("data".to_string(), JsonValue::Object(nested));
        data.insert(company.result_list.to_string(), json!([]));

        ComponentSnapshot::degraded(fingerprint, Memo::minimal(data))
    }
}
