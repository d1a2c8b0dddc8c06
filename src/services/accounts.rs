//! Account creation inputs and generated passwords.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::models::UserProfile;

/// Password handed to a newly created student or parent: full weekday name
/// followed by the zero-padded day of month, e.g. `Sunday08`.
pub fn generate_password(date: NaiveDate) -> String {
    date.format("%A%d").to_string()
}

/// Input for creating a student under the signed-in tutor.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewStudent {
    pub email: String,
    pub name: String,
    #[serde(default)]
    pub year_group: Option<String>,
    #[serde(default)]
    pub subjects: Vec<String>,
    #[serde(default)]
    pub parent_id: Option<String>,
}

impl NewStudent {
    pub fn new(email: &str, name: &str) -> Self {
        Self {
            email: email.trim().to_string(),
            name: name.trim().to_string(),
            ..Default::default()
        }
    }

    pub fn with_parent(mut self, parent_id: &str) -> Self {
        self.parent_id = Some(parent_id.to_string());
        self
    }
}

/// Input for creating a parent; `children_ids` are linked both ways.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewParent {
    pub email: String,
    pub name: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub children_ids: Vec<String>,
}

impl NewParent {
    pub fn new(email: &str, name: &str) -> Self {
        Self {
            email: email.trim().to_string(),
            name: name.trim().to_string(),
            ..Default::default()
        }
    }

    pub fn with_child(mut self, student_id: &str) -> Self {
        self.children_ids.push(student_id.to_string());
        self
    }
}

/// A created account and the password it was given.
#[derive(Debug, Clone, PartialEq)]
pub struct CreatedAccount {
    pub profile: UserProfile,
    pub password: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(2024, 9, 8, "Sunday08")]
    #[case(2024, 11, 4, "Monday04")]
    #[case(2025, 1, 1, "Wednesday01")]
    #[case(2024, 2, 29, "Thursday29")]
    fn test_generate_password(#[case] y: i32, #[case] m: u32, #[case] d: u32, #[case] expected: &str) {
        let date = NaiveDate::from_ymd_opt(y, m, d).unwrap();
        assert_eq!(generate_password(date), expected);
    }

    #[test]
    fn test_inputs_are_trimmed() {
        let student = NewStudent::new("  maya@example.com ", " Maya ").with_parent("p1");
        assert_eq!(student.email, "maya@example.com");
        assert_eq!(student.name, "Maya");
        assert_eq!(student.parent_id.as_deref(), Some("p1"));
    }
}
