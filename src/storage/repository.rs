use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};
use std::marker::PhantomData;
use std::sync::Arc;

use crate::error::{AppError, Result};
use crate::storage::remote::{Filter, RemoteStore, Table};

/// 仓储 trait
#[async_trait]
pub trait Repository<T: Clone + Send + Sync> {
    /// 创建实体
    async fn create(&self, entity: &T) -> Result<T>;

    /// 根据 ID 获取实体
    async fn get_by_id(&self, id: &str) -> Result<Option<T>>;

    /// 更新实体
    async fn update(&self, id: &str, entity: &T) -> Result<Option<T>>;

    /// 删除实体
    async fn delete(&self, id: &str) -> Result<bool>;

    /// 按条件列出实体
    async fn list_where(&self, filters: &[Filter]) -> Result<Vec<T>>;

    /// 列出所有实体
    async fn list(&self) -> Result<Vec<T>> {
        self.list_where(&[]).await
    }
}

/// 基于远端表的通用仓储
///
/// 表的列与实体字段一一对应，整行写入。
pub struct TableRepository<T> {
    store: Arc<dyn RemoteStore>,
    table: Table,
    _marker: PhantomData<T>,
}

impl<T> Clone for TableRepository<T> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            table: self.table,
            _marker: PhantomData,
        }
    }
}

impl<T> TableRepository<T> {
    pub fn new(store: Arc<dyn RemoteStore>, table: Table) -> Self {
        Self {
            store,
            table,
            _marker: PhantomData,
        }
    }

    pub fn table(&self) -> Table {
        self.table
    }
}

impl<T: DeserializeOwned> TableRepository<T> {
    /// 解析查询结果，跳过无法反序列化的行
    fn parse_rows(&self, rows: Vec<serde_json::Value>) -> Vec<T> {
        rows.into_iter()
            .filter_map(|row| match serde_json::from_value(row) {
                Ok(entity) => Some(entity),
                Err(e) => {
                    tracing::warn!(table = %self.table, "Failed to deserialize row: {}", e);
                    None
                }
            })
            .collect()
    }
}

#[async_trait]
impl<T> Repository<T> for TableRepository<T>
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    async fn create(&self, entity: &T) -> Result<T> {
        let row = serde_json::to_value(entity)?;
        let created = self.store.insert(self.table, row).await?;
        serde_json::from_value(created).map_err(|e| {
            AppError::Serialization(format!("Failed to read created {} row: {}", self.table, e))
        })
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<T>> {
        let rows = self
            .store
            .select(self.table, &[Filter::eq("id", id)])
            .await?;
        Ok(self.parse_rows(rows).into_iter().next())
    }

    async fn update(&self, id: &str, entity: &T) -> Result<Option<T>> {
        let patch = serde_json::to_value(entity)?;
        let rows = self
            .store
            .update(self.table, &[Filter::eq("id", id)], patch)
            .await?;
        Ok(self.parse_rows(rows).into_iter().next())
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let deleted = self
            .store
            .delete(self.table, &[Filter::eq("id", id)])
            .await?;
        Ok(deleted > 0)
    }

    async fn list_where(&self, filters: &[Filter]) -> Result<Vec<T>> {
        let rows = self.store.select(self.table, filters).await?;
        Ok(self.parse_rows(rows))
    }
}
