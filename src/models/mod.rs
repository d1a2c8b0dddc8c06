//! 核心数据模型模块
//!
//! 定义身份、角色资料以及导师名下的各类业务记录：
//! 测验、课程、消息、通知、资源、商店与进度历史。

pub mod assessment;
pub mod identity;
pub mod message;
pub mod profile;
pub mod progress;
pub mod resource;
pub mod schedule;
pub mod shop;

pub use assessment::*;
pub use identity::*;
pub use message::*;
pub use profile::*;
pub use progress::*;
pub use resource::*;
pub use schedule::*;
pub use shop::*;
