//! TutorHub - 多角色辅导平台的数据与会话层
//!
//! 在演示模式（内存种子数据）与在线模式（远端托管存储）之间切换，
//! 负责当前身份、领域数据的本地镜像以及积分与进度规则。

pub mod config;
pub mod demo;
pub mod error;
pub mod models;
pub mod observability;
pub mod security;
pub mod services;
pub mod storage;

pub use error::{ActionResult, AppError, Result};
