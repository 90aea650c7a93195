use crate::error::{AppError, AppResult};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// 程序配置
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// 站点地址与登录表单相关配置
    pub site: SiteConfig,
    /// 目标组件定位配置
    pub component: ComponentConfig,
    /// 页面加载重试策略
    pub retry: RetryConfig,
    /// 诊断文件与结果文件的存放目录
    pub artifacts_dir: String,
    /// 登录用户名（为空时在控制台询问）
    pub username: Option<String>,
    /// 登录密码（为空时在控制台询问）
    pub password: Option<String>,
    /// 是否显示详细日志
    pub verbose_logging: bool,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    pub base_url: String,
    pub login_path: String,
    pub device_link_path: String,
    pub dashboard_path: String,
    pub logout_path: String,
    /// 设备未绑定时跳转地址中包含的标记
    pub device_unlinked_marker: String,
    /// 表单中隐藏安全令牌的字段名
    pub token_field: String,
    /// 头部令牌所在 meta 标签的 name
    pub token_meta: String,
    pub username_field: String,
    pub password_field: String,
    pub code_field: String,
    pub user_agent: String,
    pub request_timeout_secs: u64,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ComponentConfig {
    /// 包含目标组件的页面路径
    pub register_path: String,
    /// 组件更新接口前缀，后面拼接组件类型名
    pub endpoint_prefix: String,
    /// 已知的组件实例 id
    pub instance_id: String,
    /// 在 initial-data 中用于识别目标组件的关键字
    pub data_needles: Vec<String>,
    /// 结构兜底：class 中包含此标记的组件
    pub class_marker: String,
    /// 页面仍在加载时出现的标记
    pub loading_marker: String,
    /// 组件已渲染时出现的标记
    pub identity_marker: String,
    /// 降级快照使用的默认值
    pub fallback: FallbackFingerprint,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct FallbackFingerprint {
    pub name: String,
    pub locale: String,
    pub method: String,
    pub version: String,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub delay_ms: u64,
}

impl RetryConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            site: SiteConfig::default(),
            component: ComponentConfig::default(),
            retry: RetryConfig::default(),
            artifacts_dir: "output".to_string(),
            username: None,
            password: None,
            verbose_logging: false,
        }
    }
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            base_url: "https://sica.sunagro.gob.ve".to_string(),
            login_path: "/login".to_string(),
            device_link_path: "/vincular_dispositivo".to_string(),
            dashboard_path: "/despachos".to_string(),
            logout_path: "/logout".to_string(),
            device_unlinked_marker: "dispositivo_no_vinculado".to_string(),
            token_field: "_token".to_string(),
            token_meta: "csrf-token".to_string(),
            username_field: "name".to_string(),
            password_field: "password".to_string(),
            code_field: "codigo".to_string(),
            user_agent: "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/139.0.0.0 Safari/537.36".to_string(),
            request_timeout_secs: 30,
        }
    }
}

impl Default for ComponentConfig {
    fn default() -> Self {
        Self {
            register_path: "/despachos/registrar".to_string(),
            endpoint_prefix: "/api/app/".to_string(),
            instance_id: "sHMG2QtFIfB6w2F4jVnH".to_string(),
            data_needles: vec![
                "searchEmpresaCodigo".to_string(),
                "cWFjL1BPYjFSMHBuMWkxbi9PZ0dxdz09".to_string(),
            ],
            class_marker: "componentRegistro".to_string(),
            loading_marker: "loading-top".to_string(),
            identity_marker: "wire:id".to_string(),
            fallback: FallbackFingerprint::default(),
        }
    }
}

impl Default for FallbackFingerprint {
    fn default() -> Self {
        Self {
            name: "eyJpdiI6ImVMR0QwQ29KMHhIRDIzWCtVRzY5cFE9PSIsInZhbHVlIjoiQWw3eXlDTDlSRUhEYnZ1NnkzY3VMQkExY243UXdyZ2VHNkx5THJiUkgzYz0iLCJtYWMiOiI2NTE4YTgxZjc2MDRkOWIyZDliNjgyYTFiZWJlZTdhMmMyZjM4MDZjN2IxYzU1YWY2M2Y1YWQ5MjA1NzU4ZDQ0IiwidGFnIjoiIn0=".to_string(),
            locale: "es".to_string(),
            method: "GET".to_string(),
            version: "acj".to_string(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay_ms: 2000,
        }
    }
}

impl Config {
    /// 从 TOML 文本解析配置，未出现的字段使用默认值
    pub fn from_toml_str(content: &str) -> AppResult<Self> {
        toml::from_str(content).map_err(|e| AppError::Config(e.to_string()))
    }

    pub fn from_file(path: &Path) -> AppResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::file(path.display().to_string(), e))?;
        Self::from_toml_str(&content)
    }

    /// 在已有配置上叠加环境变量
    pub fn with_env_overrides(self) -> Self {
        let mut config = self;
        if let Ok(v) = std::env::var("SICA_BASE_URL") {
            config.site.base_url = v;
        }
        if let Ok(v) = std::env::var("SICA_USERNAME") {
            config.username = Some(v);
        }
        if let Ok(v) = std::env::var("SICA_PASSWORD") {
            config.password = Some(v);
        }
        if let Ok(v) = std::env::var("SICA_ARTIFACTS_DIR") {
            config.artifacts_dir = v;
        }
        config.retry.max_attempts = std::env::var("SICA_RETRY_MAX")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(config.retry.max_attempts);
        config.retry.delay_ms = std::env::var("SICA_RETRY_DELAY_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(config.retry.delay_ms);
        config.verbose_logging = std::env::var("VERBOSE_LOGGING")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(config.verbose_logging);
        config
    }

    /// 加载配置：`SICA_CONFIG` 指定的文件（或当前目录下的 sica.toml），再叠加环境变量
    pub fn load() -> AppResult<Self> {
        let base = match std::env::var("SICA_CONFIG") {
            Ok(path) => Self::from_file(Path::new(&path))?,
            Err(_) if Path::new("sica.toml").exists() => Self::from_file(Path::new("sica.toml"))?,
            Err(_) => Self::default(),
        };
        Ok(base.with_env_overrides())
    }
}
