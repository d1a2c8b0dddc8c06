//! 角色资料模型
//!
//! 导师、学生、家长的资料结构。远端记录缺少的集合字段统一回落为默认值。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::models::identity::{Identity, Role};

/// 导师资料
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TutorProfile {
    pub id: String,
    pub email: String,
    pub name: String,
    /// 资质
    #[serde(default)]
    pub qualifications: Vec<String>,
    /// 擅长方向
    #[serde(default)]
    pub specializations: Vec<String>,
}

impl TutorProfile {
    pub fn new(id: &str, email: &str, name: &str) -> Self {
        Self {
            id: id.to_string(),
            email: email.to_string(),
            name: name.to_string(),
            qualifications: Vec::new(),
            specializations: Vec::new(),
        }
    }
}

/// 积分调整记录（奖励或惩罚）
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PointAdjustment {
    /// 积分数
    pub points: u32,
    /// 原因
    pub reason: String,
    /// 记录时间
    pub recorded_at: DateTime<Utc>,
}

/// 学生学习统计
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct StudentStats {
    /// 总体进度百分比（0-100）
    pub progress: u8,
    /// 强项
    pub strengths: Vec<String>,
    /// 弱项
    pub weaknesses: Vec<String>,
    /// 当前连续上课次数
    pub current_streak: u32,
    /// 历史最长连续次数
    pub longest_streak: u32,
    /// 已完成课程数
    pub sessions_completed: u32,
    /// 惩罚记录
    pub penalties: Vec<PointAdjustment>,
    /// 奖励记录
    pub bonuses: Vec<PointAdjustment>,
}

/// 头像装扮
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Avatar {
    /// 槽位 -> 已装备物品
    pub equipped: BTreeMap<String, String>,
    /// 已解锁物品
    pub unlocked_items: BTreeSet<String>,
}

/// 学生资料
///
/// `points` 为无符号整数，只有经过校验的商店购买会扣减。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StudentProfile {
    pub id: String,
    pub email: String,
    pub name: String,
    /// 所属导师，每个学生只属于一位导师
    #[serde(default)]
    pub tutor_id: String,
    #[serde(default)]
    pub year_group: Option<String>,
    #[serde(default)]
    pub subjects: BTreeSet<String>,
    /// 弱引用，家长可能不存在于缓存中
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub points: u32,
    #[serde(default)]
    pub stats: StudentStats,
    #[serde(default)]
    pub avatar: Avatar,
    #[serde(default)]
    pub inventory: Vec<String>,
}

impl StudentProfile {
    pub fn new(id: &str, email: &str, name: &str, tutor_id: &str) -> Self {
        Self {
            id: id.to_string(),
            email: email.to_string(),
            name: name.to_string(),
            tutor_id: tutor_id.to_string(),
            year_group: None,
            subjects: BTreeSet::new(),
            parent_id: None,
            points: 0,
            stats: StudentStats::default(),
            avatar: Avatar::default(),
            inventory: Vec::new(),
        }
    }

    pub fn identity(&self) -> Identity {
        Identity::new(&self.id, &self.email, &self.name, Role::Student)
    }

    pub fn with_subjects<I, S>(mut self, subjects: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.subjects = subjects.into_iter().map(Into::into).collect();
        self
    }

    pub fn has_unlocked(&self, item_id: &str) -> bool {
        self.avatar.unlocked_items.contains(item_id)
    }
}

/// 家长资料
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ParentProfile {
    pub id: String,
    pub email: String,
    pub name: String,
    #[serde(default)]
    pub phone: Option<String>,
    /// 子女学生 ID（弱引用）
    #[serde(default)]
    pub children_ids: BTreeSet<String>,
}

impl ParentProfile {
    pub fn new(id: &str, email: &str, name: &str) -> Self {
        Self {
            id: id.to_string(),
            email: email.to_string(),
            name: name.to_string(),
            phone: None,
            children_ids: BTreeSet::new(),
        }
    }

    pub fn identity(&self) -> Identity {
        Identity::new(&self.id, &self.email, &self.name, Role::Parent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thin_student_row_defaults() {
        let row = serde_json::json!({
            "id": "s9",
            "email": "s9@example.com",
            "name": "Sam"
        });
        let student: StudentProfile = serde_json::from_value(row).unwrap();
        assert_eq!(student.points, 0);
        assert!(student.subjects.is_empty());
        assert_eq!(student.stats.progress, 0);
        assert!(student.avatar.unlocked_items.is_empty());
        assert!(student.tutor_id.is_empty());
    }

    #[test]
    fn test_negative_points_rejected() {
        let row = serde_json::json!({
            "id": "s9",
            "email": "s9@example.com",
            "name": "Sam",
            "points": -5
        });
        assert!(serde_json::from_value::<StudentProfile>(row).is_err());
    }
}
