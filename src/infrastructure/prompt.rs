//! 控制台交互 - 基础设施层
//!
//! 只负责"问一个问题、拿一行回答"，输入校验由调用方决定

use async_trait::async_trait;
use std::io::{self, Write};
use tracing::debug;

use crate::error::{AppError, AppResult};

/// 交互输入能力
#[async_trait]
pub trait Prompter: Send + Sync {
    /// 读取一行（已去除首尾空白）
    async fn ask(&self, question: &str) -> AppResult<String>;

    /// 读取不回显的一行（密码）
    async fn ask_secret(&self, question: &str) -> AppResult<String>;
}

/// 标准输入实现
///
/// Ctrl+C 或输入流结束都会返回 `AppError::Cancelled`
pub struct ConsolePrompter;

impl ConsolePrompter {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ConsolePrompter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Prompter for ConsolePrompter {
    async fn ask(&self, question: &str) -> AppResult<String> {
        let question = question.to_string();
        let read = tokio::task::spawn_blocking(move || -> io::Result<Option<String>> {
            print!("{}", question);
            io::stdout().flush()?;
            let mut line = String::new();
            let n = io::stdin().read_line(&mut line)?;
            Ok((n > 0).then(|| line.trim().to_string()))
        });

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                debug!("输入时收到 Ctrl+C");
                Err(AppError::Cancelled)
            }
            joined = read => match joined {
                Ok(Ok(Some(line))) => Ok(line),
                Ok(Ok(None)) => Err(AppError::Cancelled),
                Ok(Err(e)) => Err(AppError::file("<stdin>", e)),
                Err(_) => Err(AppError::Cancelled),
            }
        }
    }

    async fn ask_secret(&self, question: &str) -> AppResult<String> {
        let question = question.to_string();
        let read = tokio::task::spawn_blocking(move || rpassword::prompt_password(question));

        tokio::select! {
            _ = tokio::signal::ctrl_c() => Err(AppError::Cancelled),
            joined = read => match joined {
                Ok(Ok(secret)) => Ok(secret),
                Ok(Err(e)) => Err(AppError::file("<tty>", e)),
                Err(_) => Err(AppError::Cancelled),
            }
        }
    }
}

/// 询问纯数字编码，直到输入合法
pub async fn ask_numeric(prompter: &dyn Prompter, question: &str) -> AppResult<String> {
    loop {
        let answer = prompter.ask(question).await?;
        if !answer.is_empty() && answer.chars().all(|c| c.is_ascii_digit()) {
            return Ok(answer);
        }
        println!("❌ 请输入纯数字编码");
    }
}

/// 询问是/否，直到输入可识别
pub async fn ask_yes_no(prompter: &dyn Prompter, question: &str) -> AppResult<bool> {
    loop {
        let answer = prompter.ask(question).await?.to_lowercase();
        match answer.as_str() {
            "s" | "si" | "sí" | "y" | "yes" => return Ok(true),
            "n" | "no" => return Ok(false),
            _ => println!("❌ 请输入 s (是) 或 n (否)"),
        }
    }
}
