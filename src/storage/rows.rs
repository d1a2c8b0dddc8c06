//! 远端记录到角色资料的投影
//!
//! `profiles` 表只保存基础身份；角色相关的字段分别保存在
//! `students` / `parents` 表中，缺失时回落为默认值。

use serde::{Deserialize, Serialize};
use serde_json::Value;
use serde_with::skip_serializing_none;

use crate::error::{AppError, Result};
use crate::models::{
    Identity, ParentProfile, Role, StudentProfile, TutorProfile, UserProfile,
};

/// `profiles` 表记录
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProfileRow {
    pub id: String,
    #[serde(default)]
    pub email: String,
    #[serde(default, alias = "full_name")]
    pub name: String,
    pub role: String,
    #[serde(default)]
    pub qualifications: Option<Vec<String>>,
    #[serde(default)]
    pub specializations: Option<Vec<String>>,
}

impl ProfileRow {
    pub fn new(identity: &Identity) -> Self {
        Self {
            id: identity.id.clone(),
            email: identity.email.clone(),
            name: identity.name.clone(),
            role: identity.role.to_string(),
            qualifications: None,
            specializations: None,
        }
    }

    pub fn role(&self) -> Result<Role> {
        Role::parse(&self.role).ok_or_else(|| {
            AppError::Validation(format!("Unknown role '{}' for profile {}", self.role, self.id))
        })
    }

    /// 投影为角色化的用户资料
    ///
    /// `detail` 为角色表中的对应记录（学生/家长），不存在时使用默认字段。
    pub fn project(&self, detail: Option<Value>) -> Result<UserProfile> {
        let profile = match self.role()? {
            Role::Admin => UserProfile::Admin(Identity::new(
                &self.id,
                &self.email,
                &self.name,
                Role::Admin,
            )),
            Role::Tutor => {
                let mut tutor = TutorProfile::new(&self.id, &self.email, &self.name);
                tutor.qualifications = self.qualifications.clone().unwrap_or_default();
                tutor.specializations = self.specializations.clone().unwrap_or_default();
                UserProfile::Tutor(tutor)
            }
            Role::Student => {
                let mut student = match detail {
                    Some(row) => serde_json::from_value::<StudentProfile>(self.merge_identity(row))?,
                    None => StudentProfile::new(&self.id, &self.email, &self.name, ""),
                };
                student.id = self.id.clone();
                UserProfile::Student(student)
            }
            Role::Parent => {
                let mut parent = match detail {
                    Some(row) => serde_json::from_value::<ParentProfile>(self.merge_identity(row))?,
                    None => ParentProfile::new(&self.id, &self.email, &self.name),
                };
                parent.id = self.id.clone();
                UserProfile::Parent(parent)
            }
        };
        Ok(profile)
    }

    /// 角色表记录可能不含 email/name，用身份字段补齐
    fn merge_identity(&self, mut row: Value) -> Value {
        if let Some(object) = row.as_object_mut() {
            object
                .entry("id")
                .or_insert_with(|| Value::String(self.id.clone()));
            object
                .entry("email")
                .or_insert_with(|| Value::String(self.email.clone()));
            object
                .entry("name")
                .or_insert_with(|| Value::String(self.name.clone()));
        }
        row
    }
}
