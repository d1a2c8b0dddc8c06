//! 服务模块
//!
//! 规则计算、领域状态镜像与会话管理。

pub mod accounts;
pub mod mirror;
pub mod rewards;
pub mod session;

pub use accounts::{CreatedAccount, NewParent, NewStudent, generate_password};
pub use mirror::{AssessmentOutcome, DataSource, DomainMirror, LessonOutcome, MirrorState, RefreshReport};
pub use rewards::{SessionReward, assessment_points, percentage, recompute_progress, session_reward};
pub use session::{SessionManager, SessionState};
