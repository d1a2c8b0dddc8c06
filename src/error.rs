//! 错误处理模块
//!
//! 定义应用程序的错误类型，以及面向调用方展示的操作结果。

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 应用程序错误类型
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AppError {
    /// 凭证错误（密码不匹配、远端拒绝登录）
    #[error("Invalid email or password")]
    InvalidCredential,

    /// 资源不存在（未知邮箱、未知记录）
    #[error("Not found: {0}")]
    NotFound(String),

    /// 当前模式下功能不可用
    #[error("{0} is not available in demo mode")]
    FeatureDisabled(String),

    /// 远端存储错误，消息原样透传
    #[error("{0}")]
    Remote(String),

    /// 参数验证错误
    #[error("Validation failed: {0}")]
    Validation(String),

    /// 当前身份无权执行该操作
    #[error("Not allowed: {0}")]
    Authorization(String),

    /// 配置错误
    #[error("Configuration error: {0}")]
    Config(String),

    /// 序列化错误
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// 本地状态读写错误
    #[error("Local state error: {0}")]
    LocalState(String),

    /// IO 错误
    #[error("IO error: {0}")]
    Io(String),
}

impl AppError {
    /// 稳定的错误代码，供界面层做分支
    pub fn code(&self) -> &'static str {
        match self {
            AppError::InvalidCredential => "INVALID_CREDENTIAL",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::FeatureDisabled(_) => "FEATURE_DISABLED",
            AppError::Remote(_) => "REMOTE_ERROR",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::Authorization(_) => "FORBIDDEN",
            AppError::Config(_) => "CONFIG_ERROR",
            AppError::Serialization(_) => "SERIALIZATION_ERROR",
            AppError::LocalState(_) => "LOCAL_STATE_ERROR",
            AppError::Io(_) => "IO_ERROR",
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(e: std::io::Error) -> Self {
        AppError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(e: serde_json::Error) -> Self {
        AppError::Serialization(e.to_string())
    }
}

impl From<figment::Error> for AppError {
    fn from(e: figment::Error) -> Self {
        AppError::Config(e.to_string())
    }
}

impl From<reqwest::Error> for AppError {
    fn from(e: reqwest::Error) -> Self {
        AppError::Remote(e.to_string())
    }
}

/// 操作结果
///
/// 认证与账号类操作以 `{success, error}` 的形式交给界面直接展示。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActionResult {
    /// 是否成功
    pub success: bool,
    /// 错误代码
    pub code: Option<String>,
    /// 错误消息
    pub error: Option<String>,
}

impl ActionResult {
    /// 成功结果
    pub fn ok() -> Self {
        Self {
            success: true,
            code: None,
            error: None,
        }
    }

    /// 失败结果
    pub fn failed(err: &AppError) -> Self {
        Self {
            success: false,
            code: Some(err.code().to_string()),
            error: Some(err.to_string()),
        }
    }
}

impl<T> From<&Result<T>> for ActionResult {
    fn from(result: &Result<T>) -> Self {
        match result {
            Ok(_) => ActionResult::ok(),
            Err(e) => ActionResult::failed(e),
        }
    }
}

impl<T> From<Result<T>> for ActionResult {
    fn from(result: Result<T>) -> Self {
        ActionResult::from(&result)
    }
}

/// 结果类型别名
pub type Result<T> = std::result::Result<T, AppError>;
