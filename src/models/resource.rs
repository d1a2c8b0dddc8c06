//! 学习资源模型

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

/// 资源类型
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    #[default]
    Document,
    Video,
    Worksheet,
    Link,
}

/// 学习资源
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Resource {
    pub id: String,
    pub tutor_id: String,
    pub title: String,
    pub subject: String,
    #[serde(default)]
    pub kind: ResourceKind,
    #[serde(default)]
    pub url: Option<String>,
    /// 分配给的学生；为空表示对导师的所有学生可见
    #[serde(default)]
    pub assigned_student_ids: BTreeSet<String>,
    pub created_at: DateTime<Utc>,
}

impl Resource {
    pub fn new(tutor_id: &str, title: &str, subject: &str, kind: ResourceKind) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            tutor_id: tutor_id.to_string(),
            title: title.to_string(),
            subject: subject.to_string(),
            kind,
            url: None,
            assigned_student_ids: BTreeSet::new(),
            created_at: Utc::now(),
        }
    }

    pub fn is_visible_to(&self, student_id: &str, tutor_id: &str) -> bool {
        if self.assigned_student_ids.is_empty() {
            self.tutor_id == tutor_id
        } else {
            self.assigned_student_ids.contains(student_id)
        }
    }
}
