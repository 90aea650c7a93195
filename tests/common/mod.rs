//! 集成测试共用的脚本化传输层与交互层
#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{json, Value as JsonValue};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use sica_client::config::Config;
use sica_client::error::{AppError, AppResult};
use sica_client::infrastructure::{HttpMethod, HttpRequest, HttpResponse, Prompter, Transport};

pub const BASE: &str = "https://sica.test";
pub const INSTANCE_ID: &str = "sHMG2QtFIfB6w2F4jVnH";
pub const COMPONENT_NAME: &str = "registro";

pub type Responder = Box<dyn Fn(&HttpRequest) -> HttpResponse + Send + Sync>;

/// 一条预设回复
pub enum Reply {
    /// 固定响应；`final_path` 为空时最终地址就是请求地址
    Fixed {
        status: u16,
        final_path: Option<String>,
        body: String,
    },
    /// 根据请求动态生成
    Dynamic(Responder),
    /// 网络层失败
    Fail,
}

impl Reply {
    pub fn html(body: impl Into<String>) -> Self {
        Reply::Fixed {
            status: 200,
            final_path: None,
            body: body.into(),
        }
    }

    /// 模拟跳转之后落在 `path`
    pub fn landed(path: &str, body: impl Into<String>) -> Self {
        Reply::Fixed {
            status: 200,
            final_path: Some(path.to_string()),
            body: body.into(),
        }
    }

    pub fn json(value: JsonValue) -> Self {
        Reply::html(value.to_string())
    }

    pub fn status(status: u16, body: impl Into<String>) -> Self {
        Reply::Fixed {
            status,
            final_path: None,
            body: body.into(),
        }
    }

    pub fn dynamic(f: impl Fn(&HttpRequest) -> HttpResponse + Send + Sync + 'static) -> Self {
        Reply::Dynamic(Box::new(f))
    }
}

struct Route {
    method: HttpMethod,
    path: String,
    replies: VecDeque<Reply>,
}

/// 按 (方法, 路径) 回放预设响应的传输层
///
/// 同一路由的回复依次取出，最后一条会一直重复
#[derive(Default)]
pub struct ScriptedTransport {
    routes: Mutex<Vec<Route>>,
    log: Mutex<Vec<HttpRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn on(&self, method: HttpMethod, path: &str, reply: Reply) -> &Self {
        let mut routes = self.routes.lock().unwrap();
        match routes.iter_mut().find(|r| r.method == method && r.path == path) {
            Some(route) => route.replies.push_back(reply),
            None => routes.push(Route {
                method,
                path: path.to_string(),
                replies: VecDeque::from([reply]),
            }),
        }
        self
    }

    pub fn on_get(&self, path: &str, reply: Reply) -> &Self {
        self.on(HttpMethod::Get, path, reply)
    }

    pub fn on_post(&self, path: &str, reply: Reply) -> &Self {
        self.on(HttpMethod::Post, path, reply)
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.log.lock().unwrap().clone()
    }

    pub fn requests_to(&self, method: HttpMethod, path: &str) -> Vec<HttpRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.method == method && path_of(&r.url) == path)
            .collect()
    }

    pub fn count(&self, method: HttpMethod, path: &str) -> usize {
        self.requests_to(method, path).len()
    }

    pub fn logout_count(&self) -> usize {
        self.count(HttpMethod::Post, "/logout")
    }
}

pub fn path_of(url: &str) -> String {
    url.strip_prefix(BASE).unwrap_or(url).to_string()
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: HttpRequest) -> AppResult<HttpResponse> {
        self.log.lock().unwrap().push(request.clone());
        let path = path_of(&request.url);

        let mut routes = self.routes.lock().unwrap();
        let route = routes
            .iter_mut()
            .find(|r| r.method == request.method && r.path == path);
        let Some(route) = route else {
            return Ok(HttpResponse {
                status: 404,
                final_url: request.url.clone(),
                headers: Vec::new(),
                body: format!("no route for {:?} {}", request.method, path),
            });
        };

        let reply = if route.replies.len() > 1 {
            route.replies.pop_front()
        } else {
            None
        };
        let reply_ref = match &reply {
            Some(r) => r,
            None => &route.replies[0],
        };

        match reply_ref {
            Reply::Fixed {
                status,
                final_path,
                body,
            } => Ok(HttpResponse {
                status: *status,
                final_url: final_path
                    .as_ref()
                    .map(|p| format!("{}{}", BASE, p))
                    .unwrap_or_else(|| request.url.clone()),
                headers: Vec::new(),
                body: body.clone(),
            }),
            Reply::Dynamic(f) => Ok(f(&request)),
            Reply::Fail => Err(AppError::transport(
                request.url.clone(),
                std::io::Error::new(std::io::ErrorKind::ConnectionReset, "connection reset"),
            )),
        }
    }

    fn cookie_header(&self, _url: &str) -> Option<String> {
        Some("laravel_session=abc123".to_string())
    }
}

/// 按顺序给出预设回答；用完后视为用户取消
#[derive(Default)]
pub struct ScriptedPrompter {
    answers: Mutex<VecDeque<String>>,
    asked: Mutex<Vec<String>>,
}

impl ScriptedPrompter {
    pub fn new(answers: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            answers: Mutex::new(answers.iter().map(|a| a.to_string()).collect()),
            asked: Mutex::new(Vec::new()),
        })
    }

    pub fn asked(&self) -> Vec<String> {
        self.asked.lock().unwrap().clone()
    }
}

#[async_trait]
impl Prompter for ScriptedPrompter {
    async fn ask(&self, question: &str) -> AppResult<String> {
        self.asked.lock().unwrap().push(question.to_string());
        self.answers
            .lock()
            .unwrap()
            .pop_front()
            .ok_or(AppError::Cancelled)
    }

    async fn ask_secret(&self, question: &str) -> AppResult<String> {
        self.ask(question).await
    }
}

/// 指向测试站点、不等待重试、诊断文件写到临时目录的配置
pub fn test_config(artifacts: &std::path::Path) -> Config {
    let mut config = Config::default();
    config.site.base_url = BASE.to_string();
    config.retry.delay_ms = 0;
    config.artifacts_dir = artifacts.display().to_string();
    config.username = Some("tester".to_string());
    config.password = Some("secret".to_string());
    config
}

// ========== 页面 ==========

pub fn login_page(token: &str) -> String {
    format!(
        r#"<html><body><form method="POST" action="/login"><input type="hidden" name="_token" value="{}"><input name="name"><input type="password" name="password"></form></body></html>"#,
        token
    )
}

pub fn verification_page(token: &str, code: &str) -> String {
    format!(
        r#"<html><body><form method="POST" action="/vincular_dispositivo"><input type="hidden" name="_token" value="{}"><p>Su código de verificación es <b>{}</b></p><input name="codigo"></form></body></html>"#,
        token, code
    )
}

pub fn dashboard_page(form_token: Option<&str>, meta_token: Option<&str>) -> String {
    let meta = meta_token
        .map(|t| format!(r#"<meta name="csrf-token" content="{}">"#, t))
        .unwrap_or_default();
    let form = form_token
        .map(|t| format!(r#"<form><input type="hidden" name="_token" value="{}"></form>"#, t))
        .unwrap_or_default();
    format!("<html><head>{}</head><body>{}</body></html>", meta, form)
}

pub fn registration_memo() -> JsonValue {
    json!({
        "children": {},
        "errors": [],
        "htmlHash": "9f1c2a7e",
        "data": {
            "data": {"cWFjL1BPYjFSMHBuMWkxbi9PZ0dxdz09": ""},
            "empresas": []
        },
        "dataMeta": [],
        "checksum": "c0ffee"
    })
}

pub fn initial_data() -> JsonValue {
    json!({
        "fingerprint": {
            "id": INSTANCE_ID,
            "name": COMPONENT_NAME,
            "locale": "es",
            "path": "despachos/registrar",
            "method": "GET",
            "v": "acj"
        },
        "effects": {"listeners": []},
        "serverMemo": registration_memo()
    })
}

pub fn register_page(meta_token: &str) -> String {
    let escaped = initial_data().to_string().replace('"', "&quot;");
    format!(
        r#"<html><head><meta name="csrf-token" content="{}"></head><body><div wire:id="{}" wire:initial-data="{}" class="componentRegistro"></div></body></html>"#,
        meta_token, INSTANCE_ID, escaped
    )
}

pub fn loading_page() -> String {
    r#"<html><body><div class="loading-top"></div></body></html>"#.to_string()
}

pub fn endpoint_path() -> String {
    format!("/api/app/{}", COMPONENT_NAME)
}

/// 组件更新请求体
pub fn request_json(request: &HttpRequest) -> JsonValue {
    match &request.body {
        sica_client::infrastructure::RequestBody::Json(v) => v.clone(),
        _ => JsonValue::Null,
    }
}

pub fn header<'a>(request: &'a HttpRequest, name: &str) -> Option<&'a str> {
    request
        .headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

/// 原样回显请求中的 memo，并按 `edit` 修改数据袋
pub fn echo_with(
    edit: impl Fn(&mut serde_json::Map<String, JsonValue>) + Send + Sync + 'static,
    emits: JsonValue,
) -> Reply {
    Reply::dynamic(move |request| {
        let mut memo = request_json(request)["serverMemo"].clone();
        if let Some(data) = memo.get_mut("data").and_then(JsonValue::as_object_mut) {
            edit(data);
        }
        memo["checksum"] = json!("next");
        HttpResponse {
            status: 200,
            final_url: request.url.clone(),
            headers: Vec::new(),
            body: json!({"effects": {"html": null, "emits": emits.clone()}, "serverMemo": memo})
                .to_string(),
        }
    })
}

/// 登录四个页面全部成功
pub fn script_login(transport: &ScriptedTransport) {
    transport
        .on_get("/login", Reply::html(login_page("T1")))
        .on_post(
            "/login",
            Reply::landed("/dispositivo_no_vinculado", verification_page("T2", "482913")),
        )
        .on_post("/vincular_dispositivo", Reply::landed("/despachos", "<html>ok</html>"))
        .on_get("/despachos", Reply::html(dashboard_page(Some("T3"), Some("T3"))))
        .on_post("/logout", Reply::landed("/login", login_page("T9")));
}
