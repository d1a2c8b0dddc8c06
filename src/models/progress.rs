//! 进度历史快照

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProgressSnapshot {
    pub id: String,
    pub student_id: String,
    pub progress: u8,
    /// 参与计算的测验数量
    pub assessment_count: usize,
    pub recorded_at: DateTime<Utc>,
}

impl ProgressSnapshot {
    pub fn new(student_id: &str, progress: u8, assessment_count: usize) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            student_id: student_id.to_string(),
            progress,
            assessment_count,
            recorded_at: Utc::now(),
        }
    }
}
