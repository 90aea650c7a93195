//! 会话上下文 - 基础设施层
//!
//! 持有唯一的传输会话（Cookie）和最近一次看到的安全令牌。
//! 所有与服务端交互的步骤都通过 `&mut Session` 进行，同一时间只有一个调用在进行中。

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::SiteConfig;
use crate::error::AppResult;
use crate::infrastructure::markup;
use crate::infrastructure::transport::{HttpRequest, HttpResponse, Transport};

/// 会话上下文
///
/// 职责：
/// - 持有唯一的 Transport
/// - 记录当前表单令牌与头部令牌
/// - 负责会话结束时的登出（只执行一次）
pub struct Session {
    transport: Arc<dyn Transport>,
    site: SiteConfig,
    form_token: Option<String>,
    header_token: Option<String>,
    cookies: Option<String>,
    authenticated: bool,
    closed: bool,
}

impl Session {
    /// 创建空会话
    pub fn new(transport: Arc<dyn Transport>, site: SiteConfig) -> Self {
        Self {
            transport,
            site,
            form_token: None,
            header_token: None,
            cookies: None,
            authenticated: false,
            closed: false,
        }
    }

    pub fn site(&self) -> &SiteConfig {
        &self.site
    }

    /// 把站内路径拼成完整地址
    pub fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.site.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    pub async fn send(&mut self, request: HttpRequest) -> AppResult<HttpResponse> {
        self.transport.send(request).await
    }

    pub async fn get(&mut self, path: &str) -> AppResult<HttpResponse> {
        let url = self.url(path);
        self.send(HttpRequest::get(url)).await
    }

    pub async fn post_form(&mut self, path: &str, fields: &[(&str, &str)]) -> AppResult<HttpResponse> {
        let url = self.url(path);
        self.send(HttpRequest::post_form(url, fields)).await
    }

    /// 导航后更新令牌：页面里有哪个令牌就更新哪个
    pub fn refresh_tokens(&mut self, form_token: Option<String>, header_token: Option<String>) {
        if let Some(token) = form_token {
            self.form_token = Some(token);
        }
        if let Some(token) = header_token {
            self.header_token = Some(token);
        }
    }

    pub fn form_token(&self) -> Option<&str> {
        self.form_token.as_deref()
    }

    /// 用于请求头的令牌：meta 标签的值优先，其次是表单令牌
    pub fn header_token(&self) -> Option<&str> {
        self.header_token.as_deref().or(self.form_token.as_deref())
    }

    pub fn cookies(&self) -> Option<&str> {
        self.cookies.as_deref()
    }

    /// 读取当前传输层中站点的 Cookie
    pub fn capture_cookies(&mut self) -> Option<String> {
        let base = self.url("/");
        self.cookies = self.transport.cookie_header(&base);
        self.cookies.clone()
    }

    pub fn mark_authenticated(&mut self) {
        self.authenticated = true;
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// 结束会话
    ///
    /// 只在已认证时登出，且无论调用多少次只执行一次。
    /// 登出失败只记录日志，不向上抛出。
    pub async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        if !self.authenticated {
            debug!("会话未认证，无需登出");
            return;
        }

        info!("🔒 正在登出...");
        match self.logout().await {
            Ok(true) => info!("✓ 已登出"),
            Ok(false) => warn!("⚠️ 登出请求已发送，但未确认结果"),
            Err(e) => warn!("⚠️ 登出失败: {}", e),
        }
        self.authenticated = false;
    }

    async fn logout(&mut self) -> AppResult<bool> {
        if self.form_token.is_none() {
            let dashboard = self.site.dashboard_path.clone();
            match self.get(&dashboard).await {
                Ok(page) => {
                    let elements = markup::parse_elements(&page.body);
                    let token = markup::find_by_attr(&elements, "name", &self.site.token_field)
                        .and_then(|e| e.attr("value"))
                        .map(str::to_string);
                    self.refresh_tokens(token, None);
                }
                Err(e) => debug!("登出前获取令牌失败: {}", e),
            }
        }

        let token = self.form_token.clone().unwrap_or_default();
        let token_field = self.site.token_field.clone();
        let logout_path = self.site.logout_path.clone();
        let response = self
            .post_form(&logout_path, &[(token_field.as_str(), token.as_str())])
            .await?;

        Ok(response.final_url.contains("login") || response.is_ok())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.authenticated && !self.closed {
            warn!("⚠️ 会话在未登出的情况下被释放");
        }
    }
}
