//! 进程内远端存储
//!
//! 以内存表实现 `RemoteStore` 与 `AuthClient`，用于本地开发和测试。
//! 支持按表注入失败，以模拟远端持久化出错的情况。

use async_trait::async_trait;
use chrono::{Duration, Utc};
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::storage::remote::{
    AuthClient, AuthEvent, AuthSession, AuthUser, Filter, RemoteStore, Table,
};

const EVENT_CAPACITY: usize = 64;

struct MemoryAccount {
    user: AuthUser,
    password: String,
}

/// 内存存储
pub struct MemoryStore {
    tables: DashMap<Table, Vec<Value>>,
    accounts: DashMap<String, MemoryAccount>,
    session: RwLock<Option<AuthSession>>,
    failing_tables: DashMap<Table, String>,
    failing_user_creation: Mutex<Option<String>>,
    password_resets: Mutex<Vec<String>>,
    events: broadcast::Sender<AuthEvent>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            tables: DashMap::new(),
            accounts: DashMap::new(),
            session: RwLock::new(None),
            failing_tables: DashMap::new(),
            failing_user_creation: Mutex::new(None),
            password_resets: Mutex::new(Vec::new()),
            events,
        }
    }

    /// 直接写入记录（不经过失败注入）
    pub fn seed(&self, table: Table, rows: Vec<Value>) {
        self.tables.entry(table).or_default().extend(rows);
    }

    /// 表中当前的全部记录
    pub fn rows(&self, table: Table) -> Vec<Value> {
        self.tables
            .get(&table)
            .map(|rows| rows.clone())
            .unwrap_or_default()
    }

    /// 注册一个认证账号，返回其用户 ID
    pub fn register_account(&self, email: &str, password: &str) -> String {
        let user = AuthUser {
            id: Uuid::new_v4().to_string(),
            email: Some(email.to_string()),
            user_metadata: Value::Null,
        };
        let id = user.id.clone();
        self.accounts.insert(
            email.to_lowercase(),
            MemoryAccount {
                user,
                password: password.to_string(),
            },
        );
        id
    }

    pub fn has_account(&self, email: &str) -> bool {
        self.accounts.contains_key(&email.to_lowercase())
    }

    /// 使某张表的所有操作失败
    pub fn fail_table(&self, table: Table, message: &str) {
        self.failing_tables.insert(table, message.to_string());
    }

    pub fn heal_table(&self, table: Table) {
        self.failing_tables.remove(&table);
    }

    /// 使认证身份创建失败
    pub fn fail_user_creation(&self, message: &str) {
        *self.failing_user_creation.lock() = Some(message.to_string());
    }

    /// 已请求重置密码的邮箱
    pub fn password_resets(&self) -> Vec<String> {
        self.password_resets.lock().clone()
    }

    fn check_table(&self, table: Table) -> Result<()> {
        match self.failing_tables.get(&table) {
            Some(message) => Err(AppError::Remote(message.clone())),
            None => Ok(()),
        }
    }

    fn matches_all(row: &Value, filters: &[Filter]) -> bool {
        filters.iter().all(|f| f.matches(row))
    }

    fn create_account(&self, email: &str, password: &str, metadata: Value) -> Result<AuthUser> {
        if let Some(message) = self.failing_user_creation.lock().clone() {
            return Err(AppError::Remote(message));
        }
        let key = email.to_lowercase();
        if self.accounts.contains_key(&key) {
            return Err(AppError::Remote("User already registered".to_string()));
        }
        let user = AuthUser {
            id: Uuid::new_v4().to_string(),
            email: Some(email.to_string()),
            user_metadata: metadata,
        };
        self.accounts.insert(
            key,
            MemoryAccount {
                user: user.clone(),
                password: password.to_string(),
            },
        );
        Ok(user)
    }

    fn open_session(&self, user: AuthUser) -> AuthSession {
        let session = AuthSession {
            access_token: Uuid::new_v4().to_string(),
            refresh_token: Some(Uuid::new_v4().to_string()),
            expires_at: Some(Utc::now() + Duration::hours(1)),
            user,
        };
        *self.session.write() = Some(session.clone());
        let _ = self.events.send(AuthEvent::SignedIn(session.clone()));
        session
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn select(&self, table: Table, filters: &[Filter]) -> Result<Vec<Value>> {
        self.check_table(table)?;
        Ok(self
            .tables
            .get(&table)
            .map(|rows| {
                rows.iter()
                    .filter(|row| Self::matches_all(row, filters))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn insert(&self, table: Table, mut row: Value) -> Result<Value> {
        self.check_table(table)?;
        let object = row
            .as_object_mut()
            .ok_or_else(|| AppError::Remote("Row must be a JSON object".to_string()))?;
        let id = object
            .entry("id")
            .or_insert_with(|| Value::String(Uuid::new_v4().to_string()))
            .clone();

        let mut rows = self.tables.entry(table).or_default();
        if rows.iter().any(|existing| existing.get("id") == Some(&id)) {
            return Err(AppError::Remote(format!(
                "duplicate key value violates unique constraint \"{}_pkey\"",
                table
            )));
        }
        rows.push(row.clone());
        Ok(row)
    }

    async fn update(&self, table: Table, filters: &[Filter], patch: Value) -> Result<Vec<Value>> {
        self.check_table(table)?;
        let patch = patch
            .as_object()
            .cloned()
            .ok_or_else(|| AppError::Remote("Patch must be a JSON object".to_string()))?;

        let mut updated = Vec::new();
        if let Some(mut rows) = self.tables.get_mut(&table) {
            for row in rows.iter_mut() {
                if !Self::matches_all(row, filters) {
                    continue;
                }
                if let Some(object) = row.as_object_mut() {
                    for (key, value) in &patch {
                        object.insert(key.clone(), value.clone());
                    }
                }
                updated.push(row.clone());
            }
        }
        Ok(updated)
    }

    async fn delete(&self, table: Table, filters: &[Filter]) -> Result<u64> {
        self.check_table(table)?;
        let mut removed = 0u64;
        if let Some(mut rows) = self.tables.get_mut(&table) {
            rows.retain(|row| {
                let hit = Self::matches_all(row, filters);
                if hit {
                    removed += 1;
                }
                !hit
            });
        }
        Ok(removed)
    }
}

#[async_trait]
impl AuthClient for MemoryStore {
    async fn sign_up(&self, email: &str, password: &str, metadata: Value) -> Result<AuthUser> {
        let user = self.create_account(email, password, metadata)?;
        self.open_session(user.clone());
        Ok(user)
    }

    async fn create_user(&self, email: &str, password: &str, metadata: Value) -> Result<AuthUser> {
        self.create_account(email, password, metadata)
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<AuthSession> {
        let user = match self.accounts.get(&email.to_lowercase()) {
            Some(account) if account.password == password => account.user.clone(),
            _ => return Err(AppError::InvalidCredential),
        };
        Ok(self.open_session(user))
    }

    async fn sign_out(&self) -> Result<()> {
        *self.session.write() = None;
        let _ = self.events.send(AuthEvent::SignedOut);
        Ok(())
    }

    async fn get_session(&self) -> Result<Option<AuthSession>> {
        Ok(self.session.read().clone())
    }

    async fn reset_password_for_email(&self, email: &str) -> Result<()> {
        self.password_resets.lock().push(email.to_string());
        Ok(())
    }

    async fn update_password(&self, new_password: &str) -> Result<()> {
        let session = self
            .session
            .read()
            .clone()
            .ok_or_else(|| AppError::Remote("Auth session missing!".to_string()))?;
        let email = session.user.email.unwrap_or_default().to_lowercase();
        match self.accounts.get_mut(&email) {
            Some(mut account) => {
                account.password = new_password.to_string();
                Ok(())
            }
            None => Err(AppError::Remote("User not found".to_string())),
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }
}
