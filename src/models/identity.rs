//! 身份与角色模型
//!
//! 当前登录主体以 `UserProfile` 标签联合表示，每个角色携带各自的资料结构。

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::profile::{ParentProfile, StudentProfile, TutorProfile};

/// 用户角色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Tutor,
    Student,
    Parent,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Admin => write!(f, "admin"),
            Role::Tutor => write!(f, "tutor"),
            Role::Student => write!(f, "student"),
            Role::Parent => write!(f, "parent"),
        }
    }
}

impl Role {
    /// 从远端记录中的字符串解析角色
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "admin" => Some(Role::Admin),
            "tutor" => Some(Role::Tutor),
            "student" => Some(Role::Student),
            "parent" => Some(Role::Parent),
            _ => None,
        }
    }

    /// 是否需要加载完整的学生名册
    pub fn needs_roster(&self) -> bool {
        matches!(self, Role::Tutor)
    }
}

/// 身份
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Identity {
    /// 唯一标识
    pub id: String,
    /// 邮箱
    pub email: String,
    /// 显示名称
    pub name: String,
    /// 角色
    pub role: Role,
}

impl Identity {
    pub fn new(id: &str, email: &str, name: &str, role: Role) -> Self {
        Self {
            id: id.to_string(),
            email: email.to_string(),
            name: name.to_string(),
            role,
        }
    }
}

/// 按角色区分的当前用户
///
/// 所有依赖角色的分支都对该枚举做穷尽匹配。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", content = "profile", rename_all = "lowercase")]
pub enum UserProfile {
    Admin(Identity),
    Tutor(TutorProfile),
    Student(StudentProfile),
    Parent(ParentProfile),
}

impl UserProfile {
    pub fn id(&self) -> &str {
        match self {
            UserProfile::Admin(identity) => &identity.id,
            UserProfile::Tutor(tutor) => &tutor.id,
            UserProfile::Student(student) => &student.id,
            UserProfile::Parent(parent) => &parent.id,
        }
    }

    pub fn email(&self) -> &str {
        match self {
            UserProfile::Admin(identity) => &identity.email,
            UserProfile::Tutor(tutor) => &tutor.email,
            UserProfile::Student(student) => &student.email,
            UserProfile::Parent(parent) => &parent.email,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            UserProfile::Admin(identity) => &identity.name,
            UserProfile::Tutor(tutor) => &tutor.name,
            UserProfile::Student(student) => &student.name,
            UserProfile::Parent(parent) => &parent.name,
        }
    }

    pub fn role(&self) -> Role {
        match self {
            UserProfile::Admin(_) => Role::Admin,
            UserProfile::Tutor(_) => Role::Tutor,
            UserProfile::Student(_) => Role::Student,
            UserProfile::Parent(_) => Role::Parent,
        }
    }

    /// 投影为基础身份
    pub fn identity(&self) -> Identity {
        Identity::new(self.id(), self.email(), self.name(), self.role())
    }
}
