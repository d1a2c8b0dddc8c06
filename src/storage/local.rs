//! 本地持久化键值状态
//!
//! 类似浏览器 localStorage：字符串键到字符串值，整体保存在一个 JSON 文件中。

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{AppError, Result};

/// 演示模式下序列化的当前身份
pub const DEMO_USER_KEY: &str = "tutorhub.demo_user";

/// 被本地修改过的管理员密码
pub const ADMIN_PASSWORD_KEY: &str = "tutorhub.admin_password";

const STATE_FILE_NAME: &str = "local_state.json";

/// 本地键值存储
pub trait LocalStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;

    fn set(&self, key: &str, value: &str) -> Result<()>;

    fn remove(&self, key: &str) -> Result<()>;
}

/// 基于 JSON 文件的本地存储
pub struct FileLocalStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl FileLocalStore {
    /// 打开数据目录下的状态文件，不存在时创建目录
    pub fn open(data_dir: &Path) -> Result<Self> {
        fs::create_dir_all(data_dir)?;
        let path = data_dir.join(STATE_FILE_NAME);

        let entries = if path.exists() {
            let raw = fs::read_to_string(&path)?;
            if raw.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str(&raw).map_err(|e| {
                    AppError::LocalState(format!("{} is corrupt: {}", path.display(), e))
                })?
            }
        } else {
            BTreeMap::new()
        };

        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self, entries: &BTreeMap<String, String>) -> Result<()> {
        let raw = serde_json::to_string_pretty(entries)?;
        fs::write(&self.path, raw)?;
        Ok(())
    }
}

impl LocalStore for FileLocalStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.entries.lock();
        entries.insert(key.to_string(), value.to_string());
        self.flush(&entries)
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut entries = self.entries.lock();
        if entries.remove(key).is_some() {
            self.flush(&entries)?;
        }
        Ok(())
    }
}

/// 仅保存在内存中的本地存储
#[derive(Default)]
pub struct MemoryLocalStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryLocalStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LocalStore for MemoryLocalStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries
            .lock()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.entries.lock().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("tutorhub-{}-{}", name, uuid::Uuid::new_v4()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_file_store_survives_reopen() {
        let dir = temp_dir("reopen");
        {
            let store = FileLocalStore::open(&dir).unwrap();
            store.set(DEMO_USER_KEY, "{\"id\":\"s1\"}").unwrap();
            store.set(ADMIN_PASSWORD_KEY, "n3w-secret").unwrap();
            store.remove(ADMIN_PASSWORD_KEY).unwrap();
        }

        let reopened = FileLocalStore::open(&dir).unwrap();
        assert_eq!(
            reopened.get(DEMO_USER_KEY).unwrap().as_deref(),
            Some("{\"id\":\"s1\"}")
        );
        assert_eq!(reopened.get(ADMIN_PASSWORD_KEY).unwrap(), None);

        fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn test_corrupt_file_is_reported() {
        let dir = temp_dir("corrupt");
        fs::write(dir.join(STATE_FILE_NAME), "not json").unwrap();

        let result = FileLocalStore::open(&dir);
        assert!(matches!(result, Err(AppError::LocalState(_))));

        fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn test_memory_store() {
        let store = MemoryLocalStore::new();
        assert_eq!(store.get("k").unwrap(), None);
        store.set("k", "v").unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some("v"));
        store.remove("k").unwrap();
        assert_eq!(store.get("k").unwrap(), None);
    }
}
