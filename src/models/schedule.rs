//! 课程日程模型

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 课程状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LessonStatus {
    #[default]
    Scheduled,
    Completed,
    Cancelled,
}

impl LessonStatus {
    /// 已完成为终态
    pub fn can_transition_to(&self, next: LessonStatus) -> bool {
        match self {
            LessonStatus::Completed => next == LessonStatus::Completed,
            LessonStatus::Scheduled | LessonStatus::Cancelled => true,
        }
    }
}

/// 日程事件（课程）
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScheduleEvent {
    pub id: String,
    pub student_id: String,
    pub tutor_id: String,
    pub subject: String,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    #[serde(default)]
    pub status: LessonStatus,
    #[serde(default)]
    pub notes: Option<String>,
}

impl ScheduleEvent {
    pub fn new(
        student_id: &str,
        tutor_id: &str,
        subject: &str,
        date: NaiveDate,
        start_time: NaiveTime,
        end_time: NaiveTime,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            student_id: student_id.to_string(),
            tutor_id: tutor_id.to_string(),
            subject: subject.to_string(),
            date,
            start_time,
            end_time,
            status: LessonStatus::Scheduled,
            notes: None,
        }
    }
}
