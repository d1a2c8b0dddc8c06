//! 远端存储客户端边界
//!
//! 托管数据库/认证服务被视为不透明的远端存储：按表进行记录增删改查
//! （等值与集合成员过滤），外加一组认证能力。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use tokio::sync::broadcast;

use crate::error::Result;

/// 远端表
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    Profiles,
    Students,
    Parents,
    Resources,
    Assessments,
    Lessons,
    Messages,
    Notifications,
    ShopItems,
    StudentPurchases,
    ProgressHistory,
}

impl Table {
    pub fn as_str(&self) -> &'static str {
        match self {
            Table::Profiles => "profiles",
            Table::Students => "students",
            Table::Parents => "parents",
            Table::Resources => "resources",
            Table::Assessments => "assessments",
            Table::Lessons => "lessons",
            Table::Messages => "messages",
            Table::Notifications => "notifications",
            Table::ShopItems => "shop_items",
            Table::StudentPurchases => "student_purchases",
            Table::ProgressHistory => "progress_history",
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 查询过滤条件
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// column = value
    Eq(String, Value),
    /// column IN (values)
    In(String, Vec<Value>),
}

impl Filter {
    pub fn eq(column: &str, value: impl Into<Value>) -> Self {
        Filter::Eq(column.to_string(), value.into())
    }

    pub fn is_in<I, V>(column: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Filter::In(column.to_string(), values.into_iter().map(Into::into).collect())
    }

    pub fn column(&self) -> &str {
        match self {
            Filter::Eq(column, _) | Filter::In(column, _) => column,
        }
    }

    /// 判断一行记录是否满足条件
    pub fn matches(&self, row: &Value) -> bool {
        match self {
            Filter::Eq(column, value) => row.get(column) == Some(value),
            Filter::In(column, values) => row
                .get(column)
                .map(|v| values.contains(v))
                .unwrap_or(false),
        }
    }
}

/// 记录存取能力
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// 查询满足所有过滤条件的记录
    async fn select(&self, table: Table, filters: &[Filter]) -> Result<Vec<Value>>;

    /// 插入整行记录，返回存储后的记录
    async fn insert(&self, table: Table, row: Value) -> Result<Value>;

    /// 用 patch 更新满足条件的记录，返回更新后的记录
    async fn update(&self, table: Table, filters: &[Filter], patch: Value) -> Result<Vec<Value>>;

    /// 删除满足条件的记录，返回删除数量
    async fn delete(&self, table: Table, filters: &[Filter]) -> Result<u64>;
}

/// 远端认证用户
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuthUser {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub user_metadata: Value,
}

/// 远端会话
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuthSession {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    pub user: AuthUser,
}

impl AuthSession {
    pub fn is_expired(&self) -> bool {
        self.expires_at.map(|at| Utc::now() >= at).unwrap_or(false)
    }
}

/// 认证状态变化事件
#[derive(Debug, Clone, PartialEq)]
pub enum AuthEvent {
    SignedIn(AuthSession),
    SignedOut,
    TokenRefreshed(AuthSession),
}

/// 认证能力
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AuthClient: Send + Sync {
    /// 注册并登录新账号
    async fn sign_up(&self, email: &str, password: &str, metadata: Value) -> Result<AuthUser>;

    /// 创建认证身份，但不替换当前会话
    async fn create_user(&self, email: &str, password: &str, metadata: Value) -> Result<AuthUser>;

    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<AuthSession>;

    async fn sign_out(&self) -> Result<()>;

    /// 当前会话（过期时尝试刷新）
    async fn get_session(&self) -> Result<Option<AuthSession>>;

    async fn reset_password_for_email(&self, email: &str) -> Result<()>;

    async fn update_password(&self, new_password: &str) -> Result<()>;

    /// 订阅认证状态变化
    fn subscribe(&self) -> broadcast::Receiver<AuthEvent>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_filter_matches() {
        let row = json!({"id": "a1", "tutor_id": "t1", "status": "scheduled"});

        assert!(Filter::eq("tutor_id", "t1").matches(&row));
        assert!(!Filter::eq("tutor_id", "t2").matches(&row));
        assert!(Filter::is_in("id", ["a0", "a1"]).matches(&row));
        assert!(!Filter::is_in("id", Vec::<String>::new()).matches(&row));
        assert!(!Filter::eq("missing", "x").matches(&row));
    }

    #[test]
    fn test_table_names() {
        assert_eq!(Table::ShopItems.as_str(), "shop_items");
        assert_eq!(Table::ProgressHistory.to_string(), "progress_history");
    }
}
