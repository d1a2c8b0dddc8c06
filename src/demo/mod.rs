//! Seeded demo dataset
//!
//! Demo mode runs entirely against this in-memory data. Every seeded identity
//! has a plain password so the dashboards can be explored without a backend.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use std::collections::BTreeSet;

use crate::models::{
    Assessment, ChatMessage, Identity, LessonStatus, Notification, ParentProfile, Resource,
    ResourceKind, Role, ScheduleEvent, ShopCategory, ShopItem, StudentProfile, TutorProfile,
    UserProfile,
};

pub const DEMO_ADMIN_ID: &str = "demo-admin";
pub const DEMO_TUTOR_ID: &str = "demo-tutor";

/// A seeded identity with its demo password.
#[derive(Debug, Clone, PartialEq)]
pub struct DemoAccount {
    pub profile: UserProfile,
    pub password: String,
}

impl DemoAccount {
    pub fn new(profile: UserProfile, password: &str) -> Self {
        Self {
            profile,
            password: password.to_string(),
        }
    }

    pub fn matches_email(&self, email: &str) -> bool {
        self.profile.email().eq_ignore_ascii_case(email.trim())
    }
}

/// All collections the mirror starts with in demo mode.
#[derive(Debug, Clone, Default)]
pub struct DemoDataset {
    pub accounts: Vec<DemoAccount>,
    pub students: Vec<StudentProfile>,
    pub parents: Vec<ParentProfile>,
    pub resources: Vec<Resource>,
    pub assessments: Vec<Assessment>,
    pub lessons: Vec<ScheduleEvent>,
    pub messages: Vec<ChatMessage>,
    pub notifications: Vec<Notification>,
    pub shop_items: Vec<ShopItem>,
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap_or_default()
}

fn time(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap_or_default()
}

fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
    date(y, mo, d).and_time(time(h, mi)).and_utc()
}

fn student(
    id: &str,
    email: &str,
    name: &str,
    year_group: &str,
    subjects: &[&str],
    parent_id: &str,
    points: u32,
) -> StudentProfile {
    let mut s = StudentProfile::new(id, email, name, DEMO_TUTOR_ID)
        .with_subjects(subjects.iter().copied());
    s.year_group = Some(year_group.to_string());
    s.parent_id = Some(parent_id.to_string());
    s.points = points;
    s
}

fn assessment(
    id: &str,
    student_id: &str,
    subject: &str,
    title: &str,
    score: f64,
    max_score: f64,
    taken: NaiveDate,
) -> Assessment {
    let mut a = Assessment::new(student_id, DEMO_TUTOR_ID, subject, score, max_score, taken)
        .with_title(title);
    a.id = id.to_string();
    a
}

fn lesson(
    id: &str,
    student_id: &str,
    subject: &str,
    day: NaiveDate,
    start: (u32, u32),
    status: LessonStatus,
) -> ScheduleEvent {
    let mut l = ScheduleEvent::new(
        student_id,
        DEMO_TUTOR_ID,
        subject,
        day,
        time(start.0, start.1),
        time(start.0 + 1, start.1),
    );
    l.id = id.to_string();
    l.status = status;
    l
}

fn message(id: &str, from: &str, to: &str, content: &str, sent: DateTime<Utc>) -> ChatMessage {
    let mut m = ChatMessage::new(from, to, content);
    m.id = id.to_string();
    m.timestamp = sent;
    m.read = true;
    m
}

impl DemoDataset {
    pub fn seeded() -> Self {
        let admin = Identity::new(DEMO_ADMIN_ID, "admin@tutorhub.demo", "Alex Morgan", Role::Admin);

        let mut tutor = TutorProfile::new(DEMO_TUTOR_ID, "tutor@tutorhub.demo", "Taylor Reed");
        tutor.qualifications = vec!["PGCE Secondary Mathematics".into(), "MSc Physics".into()];
        tutor.specializations = vec!["GCSE Maths".into(), "A-Level Physics".into()];

        let mut emma = student(
            "demo-student-1",
            "emma@tutorhub.demo",
            "Emma Clarke",
            "Year 10",
            &["Maths", "Physics"],
            "demo-parent-1",
            240,
        );
        emma.stats.progress = 84;
        emma.stats.current_streak = 6;
        emma.stats.longest_streak = 6;
        emma.stats.sessions_completed = 11;
        emma.stats.strengths = vec!["Algebra".into(), "Forces".into()];
        emma.stats.weaknesses = vec!["Circle theorems".into()];
        emma.avatar.unlocked_items.insert("hat-cap".into());
        emma.avatar.equipped.insert("hat".into(), "hat-cap".into());

        let mut oliver = student(
            "demo-student-2",
            "oliver@tutorhub.demo",
            "Oliver Grant",
            "Year 8",
            &["Maths", "English"],
            "demo-parent-2",
            90,
        );
        oliver.stats.progress = 68;
        oliver.stats.current_streak = 2;
        oliver.stats.longest_streak = 4;
        oliver.stats.sessions_completed = 5;
        oliver.stats.weaknesses = vec!["Fractions".into()];

        let mut lucas = student(
            "demo-student-3",
            "lucas@tutorhub.demo",
            "Lucas Clarke",
            "Year 12",
            &["Maths", "Chemistry"],
            "demo-parent-1",
            410,
        );
        lucas.stats.progress = 91;
        lucas.stats.current_streak = 29;
        lucas.stats.longest_streak = 29;
        lucas.stats.sessions_completed = 38;
        lucas.stats.strengths = vec!["Calculus".into(), "Organic chemistry".into()];

        let mut sarah = ParentProfile::new("demo-parent-1", "sarah.clarke@tutorhub.demo", "Sarah Clarke");
        sarah.phone = Some("07700 900123".into());
        sarah.children_ids = BTreeSet::from([emma.id.clone(), lucas.id.clone()]);
        let mut james = ParentProfile::new("demo-parent-2", "james.grant@tutorhub.demo", "James Grant");
        james.children_ids = BTreeSet::from([oliver.id.clone()]);

        let students = vec![emma, oliver, lucas];
        let parents = vec![sarah, james];

        let mut accounts = vec![
            DemoAccount::new(UserProfile::Admin(admin), "admin123"),
            DemoAccount::new(UserProfile::Tutor(tutor), "tutor123"),
        ];
        accounts.extend(
            students
                .iter()
                .map(|s| DemoAccount::new(UserProfile::Student(s.clone()), "student123")),
        );
        accounts.extend(
            parents
                .iter()
                .map(|p| DemoAccount::new(UserProfile::Parent(p.clone()), "parent123")),
        );

        let assessments = vec![
            assessment("demo-assessment-1", "demo-student-1", "Maths", "Quadratics quiz", 78.0, 100.0, date(2024, 9, 10)),
            assessment("demo-assessment-2", "demo-student-1", "Physics", "Forces test", 90.0, 100.0, date(2024, 9, 24)),
            assessment("demo-assessment-3", "demo-student-2", "Maths", "Fractions check", 34.0, 50.0, date(2024, 9, 17)),
            assessment("demo-assessment-4", "demo-student-3", "Chemistry", "Mock paper 1", 91.0, 100.0, date(2024, 10, 1)),
        ];

        let lessons = vec![
            lesson("demo-lesson-1", "demo-student-1", "Maths", date(2024, 10, 7), (16, 0), LessonStatus::Completed),
            lesson("demo-lesson-2", "demo-student-1", "Physics", date(2024, 11, 4), (16, 0), LessonStatus::Scheduled),
            lesson("demo-lesson-3", "demo-student-2", "English", date(2024, 11, 5), (17, 30), LessonStatus::Scheduled),
            lesson("demo-lesson-4", "demo-student-3", "Chemistry", date(2024, 11, 6), (18, 0), LessonStatus::Scheduled),
            lesson("demo-lesson-5", "demo-student-2", "Maths", date(2024, 10, 29), (17, 30), LessonStatus::Cancelled),
        ];

        let messages = vec![
            message("demo-message-1", DEMO_TUTOR_ID, "demo-student-1", "Great work on the forces test!", at(2024, 9, 25, 9, 15)),
            message("demo-message-2", "demo-student-1", DEMO_TUTOR_ID, "Thanks! Can we go over circle theorems next?", at(2024, 9, 25, 18, 2)),
            message("demo-message-3", "demo-parent-1", DEMO_TUTOR_ID, "Lucas will be ten minutes late on Wednesday.", at(2024, 11, 4, 8, 40)),
        ];

        let mut welcome = Notification::new(
            "demo-student-1",
            "New resource",
            "Circle theorems worksheet has been shared with you.",
        );
        welcome.id = "demo-notification-1".into();
        welcome.created_at = at(2024, 10, 2, 12, 0);

        let mut worksheet = Resource::new(DEMO_TUTOR_ID, "Circle theorems worksheet", "Maths", ResourceKind::Worksheet);
        worksheet.id = "demo-resource-1".into();
        worksheet.created_at = at(2024, 10, 2, 11, 55);
        worksheet.assigned_student_ids.insert("demo-student-1".into());
        let mut video = Resource::new(DEMO_TUTOR_ID, "Moles explained", "Chemistry", ResourceKind::Video);
        video.id = "demo-resource-2".into();
        video.url = Some("https://videos.tutorhub.demo/moles".into());
        video.created_at = at(2024, 9, 30, 10, 0);

        let shop_items = vec![
            ShopItem::new("hat-cap", "Baseball Cap", 50, ShopCategory::Hat),
            ShopItem::new("hat-wizard", "Wizard Hat", 150, ShopCategory::Hat),
            ShopItem::new("outfit-hoodie", "Galaxy Hoodie", 120, ShopCategory::Outfit),
            ShopItem::new("acc-glasses", "Round Glasses", 80, ShopCategory::Accessory),
            ShopItem::new("bg-space", "Deep Space", 200, ShopCategory::Background),
            ShopItem::new("pet-owl", "Study Owl", 300, ShopCategory::Pet),
        ];

        Self {
            accounts,
            students,
            parents,
            resources: vec![worksheet, video],
            assessments,
            lessons,
            messages,
            notifications: vec![welcome],
            shop_items,
        }
    }

    pub fn account_by_email(&self, email: &str) -> Option<&DemoAccount> {
        self.accounts.iter().find(|a| a.matches_email(email))
    }
}
