//! 存储层模块
//!
//! 远端存储边界（记录与认证）、REST 与内存实现、类型化仓储，
//! 以及本地持久化键值状态。

pub mod factory;
pub mod local;
pub mod memory;
pub mod remote;
pub mod repository;
pub mod rest;
pub mod rows;

pub use factory::{RemoteBackend, StorageFactory};
pub use local::{ADMIN_PASSWORD_KEY, DEMO_USER_KEY, FileLocalStore, LocalStore, MemoryLocalStore};
pub use memory::MemoryStore;
pub use remote::{AuthClient, AuthEvent, AuthSession, AuthUser, Filter, RemoteStore, Table};
pub use repository::{Repository, TableRepository};
pub use rest::RestStore;
pub use rows::ProfileRow;
