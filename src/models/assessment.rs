//! 测验记录模型

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 测验记录
///
/// 创建后只有评分相关字段（score/max_score/grade/feedback）可以修改。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Assessment {
    pub id: String,
    pub student_id: String,
    pub tutor_id: String,
    pub subject: String,
    #[serde(default)]
    pub title: String,
    pub score: f64,
    pub max_score: f64,
    #[serde(default)]
    pub grade: Option<String>,
    #[serde(default)]
    pub feedback: Option<String>,
    pub date_taken: NaiveDate,
    /// 该测验累计已发放的积分，重新评分只补发超出部分
    #[serde(default)]
    pub awarded_points: u32,
}

impl Assessment {
    pub fn new(
        student_id: &str,
        tutor_id: &str,
        subject: &str,
        score: f64,
        max_score: f64,
        date_taken: NaiveDate,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            student_id: student_id.to_string(),
            tutor_id: tutor_id.to_string(),
            subject: subject.to_string(),
            title: String::new(),
            score,
            max_score,
            grade: None,
            feedback: None,
            date_taken,
            awarded_points: 0,
        }
    }

    pub fn with_title(mut self, title: &str) -> Self {
        self.title = title.to_string();
        self
    }
}

/// 评分更新
#[derive(Debug, Clone, Default)]
pub struct GradeUpdate {
    pub score: Option<f64>,
    pub max_score: Option<f64>,
    pub grade: Option<String>,
    pub feedback: Option<String>,
}

impl GradeUpdate {
    pub fn score(score: f64, max_score: f64) -> Self {
        Self {
            score: Some(score),
            max_score: Some(max_score),
            ..Default::default()
        }
    }

    /// 应用到测验记录，返回分数是否发生变化
    pub fn apply(&self, assessment: &mut Assessment) -> bool {
        let before = (assessment.score, assessment.max_score);
        if let Some(score) = self.score {
            assessment.score = score;
        }
        if let Some(max_score) = self.max_score {
            assessment.max_score = max_score;
        }
        if let Some(grade) = &self.grade {
            assessment.grade = Some(grade.clone());
        }
        if let Some(feedback) = &self.feedback {
            assessment.feedback = Some(feedback.clone());
        }
        before != (assessment.score, assessment.max_score)
    }
}
