//! 登录认证状态机 - 业务能力层
//!
//! 五个步骤严格按顺序执行，任何一步失败立即终止，本层不做重试：
//! 1. 获取登录表单 → 2. 提交凭据 → 3. 提取验证码 → 4. 确认设备 → 5. 获取认证后令牌

use std::fmt::Display;
use tracing::{debug, error, info, warn};

use crate::config::SiteConfig;
use crate::error::{AppResult, AuthError};
use crate::infrastructure::Session;
use crate::services::token_extractor::{extract_meta_token, extract_token, extract_verification_code};
use crate::utils::truncate_text;

/// 认证步骤
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthStep {
    FetchLoginForm,
    SubmitCredentials,
    ExtractVerificationCode,
    ConfirmDevice,
    FetchDashboardTokens,
}

impl AuthStep {
    pub fn name(&self) -> &'static str {
        match self {
            AuthStep::FetchLoginForm => "FetchLoginForm",
            AuthStep::SubmitCredentials => "SubmitCredentials",
            AuthStep::ExtractVerificationCode => "ExtractVerificationCode",
            AuthStep::ConfirmDevice => "ConfirmDevice",
            AuthStep::FetchDashboardTokens => "FetchDashboardTokens",
        }
    }
}

impl Display for AuthStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// 认证成功后得到的令牌
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthTokens {
    /// 表单隐藏字段中的令牌
    pub form_token: String,
    /// 请求头使用的令牌（meta 标签优先）
    pub header_token: String,
    pub cookies: Option<String>,
}

/// 登录认证状态机
///
/// `trail` 记录实际进入过的步骤，便于诊断与测试
pub struct AuthMachine {
    site: SiteConfig,
    trail: Vec<AuthStep>,
}

impl AuthMachine {
    pub fn new(site: &SiteConfig) -> Self {
        Self {
            site: site.clone(),
            trail: Vec::new(),
        }
    }

    pub fn trail(&self) -> &[AuthStep] {
        &self.trail
    }

    fn enter(&mut self, step: AuthStep) {
        info!("🔄 认证步骤 {}/5: {}", self.trail.len() + 1, step);
        self.trail.push(step);
    }

    /// 执行完整登录流程，成功后会话被标记为已认证
    pub async fn run(&mut self, session: &mut Session, credentials: &Credentials) -> AppResult<AuthTokens> {
        let result = self.run_steps(session, credentials).await;
        if let Err(e) = &result {
            let step = self.trail.last().map(AuthStep::name).unwrap_or("-");
            error!("❌ 认证在步骤 {} 失败: {}", step, e);
        }
        result
    }

    async fn run_steps(&mut self, session: &mut Session, credentials: &Credentials) -> AppResult<AuthTokens> {
        self.fetch_login_form(session).await?;
        let verification_page = self.submit_credentials(session, credentials).await?;
        let code = self.extract_code(session, &verification_page)?;
        self.confirm_device(session, &code).await?;
        let tokens = self.fetch_dashboard_tokens(session).await?;

        session.mark_authenticated();
        info!("✅ 登录完成");
        Ok(tokens)
    }

    async fn fetch_login_form(&mut self, session: &mut Session) -> AppResult<()> {
        let step = AuthStep::FetchLoginForm;
        self.enter(step);

        let page = session.get(&self.site.login_path).await?;
        let token = extract_token(&page.body, &self.site.token_field)
            .ok_or(AuthError::TokenMissing { step: step.name() })?;

        debug!("登录表单令牌: {}", truncate_text(&token, 20));
        session.refresh_tokens(Some(token), None);
        Ok(())
    }

    /// 成功时返回设备验证页面
    async fn submit_credentials(&mut self, session: &mut Session, credentials: &Credentials) -> AppResult<String> {
        self.enter(AuthStep::SubmitCredentials);

        let token = session.form_token().unwrap_or_default().to_string();
        let response = session
            .post_form(
                &self.site.login_path,
                &[
                    (self.site.token_field.as_str(), token.as_str()),
                    (self.site.username_field.as_str(), credentials.username.as_str()),
                    (self.site.password_field.as_str(), credentials.password.as_str()),
                ],
            )
            .await?;

        if response.final_url.contains(&self.site.device_unlinked_marker) {
            info!("✓ 凭据已接受，跳转到设备验证页面");
            Ok(response.body)
        } else {
            warn!(
                "登录未跳转到设备验证页面: {} {}",
                response.status,
                truncate_text(&response.body, 200)
            );
            Err(AuthError::LoginRejected {
                final_url: response.final_url,
            }
            .into())
        }
    }

    fn extract_code(&mut self, session: &mut Session, verification_page: &str) -> AppResult<String> {
        self.enter(AuthStep::ExtractVerificationCode);

        match extract_token(verification_page, &self.site.token_field) {
            Some(token) => session.refresh_tokens(Some(token), None),
            None => warn!("⚠️ 验证页面没有新的令牌，沿用上一个"),
        }

        let code = extract_verification_code(verification_page).ok_or(AuthError::CodeNotFound)?;
        info!("✓ 验证码: {}", code);
        Ok(code)
    }

    async fn confirm_device(&mut self, session: &mut Session, code: &str) -> AppResult<()> {
        self.enter(AuthStep::ConfirmDevice);

        let token = session.form_token().unwrap_or_default().to_string();
        let response = session
            .post_form(
                &self.site.device_link_path,
                &[
                    (self.site.token_field.as_str(), token.as_str()),
                    (self.site.code_field.as_str(), code),
                ],
            )
            .await?;

        if response.final_url.contains(&self.site.device_unlinked_marker) {
            return Err(AuthError::DeviceVerificationFailed {
                final_url: response.final_url,
            }
            .into());
        }
        info!("✓ 设备已绑定");
        Ok(())
    }

    async fn fetch_dashboard_tokens(&mut self, session: &mut Session) -> AppResult<AuthTokens> {
        let step = AuthStep::FetchDashboardTokens;
        self.enter(step);

        let page = session.get(&self.site.dashboard_path).await?;
        let form_token = extract_token(&page.body, &self.site.token_field);
        let meta_token = extract_meta_token(&page.body, &self.site.token_meta);

        if form_token.is_none() && meta_token.is_none() {
            return Err(AuthError::TokenMissing { step: step.name() }.into());
        }
        if form_token.is_some() && meta_token.is_some() && form_token != meta_token {
            debug!("表单令牌与 meta 令牌不同，请求头使用 meta 令牌");
        }

        session.refresh_tokens(form_token.clone(), meta_token.clone());
        let cookies = session.capture_cookies();

        let header_token = meta_token.or_else(|| form_token.clone()).unwrap_or_default();
        let form_token = form_token.unwrap_or_else(|| header_token.clone());

        info!("✓ 已获取认证令牌: {}", truncate_text(&header_token, 20));
        Ok(AuthTokens {
            form_token,
            header_token,
            cookies,
        })
    }
}
