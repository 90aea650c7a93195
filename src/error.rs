use thiserror::Error;

/// 应用程序错误类型
#[derive(Debug, Error)]
pub enum AppError {
    /// 认证阶段错误（整个会话中止）
    #[error("认证错误: {0}")]
    Auth(#[from] AuthError),
    /// 组件协议错误（当前流程中止）
    #[error("协议错误: {0}")]
    Protocol(#[from] ProtocolError),
    /// 网络传输失败
    #[error("请求失败 ({url}): {source}")]
    Transport {
        url: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 文件读写失败
    #[error("文件错误 ({path}): {source}")]
    File {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// 配置错误
    #[error("配置错误: {0}")]
    Config(String),
    /// JSON 序列化/反序列化失败
    #[error("JSON解析失败: {0}")]
    Json(#[from] serde_json::Error),
    /// 流程状态不允许该操作
    #[error("流程状态错误: 无法在 {state} 状态下执行 {action}")]
    InvalidTransition { state: String, action: &'static str },
    /// 用户取消（例如在输入提示时按下 Ctrl+C）
    #[error("操作已被用户取消")]
    Cancelled,
}

/// 认证阶段错误
#[derive(Debug, Error)]
pub enum AuthError {
    /// 页面中找不到安全令牌
    #[error("步骤 {step} 未找到安全令牌")]
    TokenMissing { step: &'static str },
    /// 提交凭据后没有跳转到设备验证页面
    #[error("登录被拒绝 (最终地址: {final_url})")]
    LoginRejected { final_url: String },
    /// 验证页面中没有 6 位验证码
    #[error("验证页面中未找到 6 位验证码")]
    CodeNotFound,
    /// 设备确认后仍停留在验证页面
    #[error("设备验证失败 (最终地址: {final_url})")]
    DeviceVerificationFailed { final_url: String },
}

/// 组件协议错误
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// 页面中没有目标组件
    #[error("页面 {path} 中未找到目标组件 (已尝试 {attempts} 次)")]
    ComponentNotFound { path: String, attempts: u32 },
    /// 响应不是合法的组件更新结果
    #[error("响应格式错误 ({endpoint}): {reason}")]
    MalformedResponse { endpoint: String, reason: String },
    /// 服务端返回非 200 状态码
    #[error("服务端返回状态码 {status}: {body}")]
    Status { status: u16, body: String },
}

impl AppError {
    /// 创建网络请求失败错误
    pub fn transport(
        url: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        AppError::Transport {
            url: url.into(),
            source: Box::new(source),
        }
    }

    /// 创建文件读写错误
    pub fn file(path: impl Into<String>, source: std::io::Error) -> Self {
        AppError::File {
            path: path.into(),
            source,
        }
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, AppError::Auth(_))
    }

    /// 协议阶段错误只影响当前流程，编排层可以把它当作"无结果"处理
    pub fn is_protocol(&self) -> bool {
        matches!(self, AppError::Protocol(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, AppError::Cancelled)
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        let auth: AppError = AuthError::CodeNotFound.into();
        assert!(auth.is_auth());
        assert!(!auth.is_protocol());

        let protocol: AppError = ProtocolError::Status {
            status: 500,
            body: "boom".to_string(),
        }
        .into();
        assert!(protocol.is_protocol());
        assert!(protocol.to_string().contains("500"));

        assert!(AppError::Cancelled.is_cancelled());
    }

    #[test]
    fn test_token_missing_names_step() {
        let err = AuthError::TokenMissing {
            step: "FetchLoginForm",
        };
        assert!(err.to_string().contains("FetchLoginForm"));
    }
}
