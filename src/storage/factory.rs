//! 存储工厂模块
//!
//! 根据配置创建远端后端与本地状态存储。

use std::sync::Arc;

use crate::config::{LocalStateConfig, RemoteConfig};
use crate::error::Result;
use crate::storage::local::{FileLocalStore, LocalStore, MemoryLocalStore};
use crate::storage::remote::{AuthClient, RemoteStore, Table};
use crate::storage::rest::RestStore;

/// 远端后端：记录存取与认证通常由同一个客户端提供
#[derive(Clone)]
pub struct RemoteBackend {
    pub store: Arc<dyn RemoteStore>,
    pub auth: Arc<dyn AuthClient>,
}

impl RemoteBackend {
    pub fn new(store: Arc<dyn RemoteStore>, auth: Arc<dyn AuthClient>) -> Self {
        Self { store, auth }
    }

    /// 由同时实现两种能力的客户端构造
    pub fn from_shared<T>(client: Arc<T>) -> Self
    where
        T: RemoteStore + AuthClient + 'static,
    {
        Self {
            store: client.clone(),
            auth: client,
        }
    }

    /// 检查远端是否可用
    pub async fn health_check(&self) -> bool {
        match self.store.select(Table::ShopItems, &[]).await {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!("Remote store health check failed: {}", e);
                false
            }
        }
    }
}

/// 存储工厂
pub struct StorageFactory;

impl StorageFactory {
    /// 创建远端后端；未配置时返回 None（仅支持演示模式）
    pub fn create_remote(config: &RemoteConfig) -> Result<Option<RemoteBackend>> {
        if !config.is_configured() {
            tracing::info!("Remote store not configured, live mode unavailable");
            return Ok(None);
        }
        let client = Arc::new(RestStore::new(config)?);
        tracing::info!("Remote store client created for {}", config.url);
        Ok(Some(RemoteBackend::from_shared(client)))
    }

    /// 创建本地状态存储；未配置数据目录时仅保存在内存中
    pub fn create_local(config: &LocalStateConfig) -> Result<Arc<dyn LocalStore>> {
        match &config.data_dir {
            Some(dir) => {
                let store = FileLocalStore::open(dir)?;
                tracing::debug!("Local state file: {}", store.path().display());
                Ok(Arc::new(store))
            }
            None => Ok(Arc::new(MemoryLocalStore::new())),
        }
    }
}
