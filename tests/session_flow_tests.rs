// End-to-end flows through the public API
//
// Tests cover:
// - A tutor's demo day: assessment, lesson completion, shop, messaging
// - Session restore across a restart with the file-backed local store
// - Switching from a live session into demo mode
// - Optimistic writes surviving remote persist failures

use chrono::{Local, NaiveDate};
use fake::Fake;
use fake::faker::internet::en::SafeEmail;
use fake::faker::name::en::Name;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tutorhub::config::{AppConfig, DataMode, LocalStateConfig};
use tutorhub::error::AppError;
use tutorhub::models::{Assessment, LessonStatus, Role, UserProfile};
use tutorhub::services::{NewStudent, SessionManager, SessionState, generate_password};
use tutorhub::storage::{MemoryLocalStore, MemoryStore, RemoteBackend, StorageFactory, Table};

fn demo_session() -> SessionManager {
    SessionManager::new(
        &AppConfig::development(),
        Arc::new(MemoryLocalStore::new()),
        None,
    )
    .unwrap()
}

fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("tutorhub-{}-{}", name, uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn day(m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, m, d).unwrap()
}

#[tokio::test]
async fn test_tutor_demo_day() {
    let session = demo_session();
    let tutor = session.login("tutor@tutorhub.demo", "tutor123").await.unwrap();
    assert_eq!(tutor.role(), Role::Tutor);
    let mirror = session.mirror();

    // 92% lands in the mid tier and blends into the existing history.
    let outcome = mirror
        .add_assessment(Assessment::new("demo-student-2", tutor.id(), "Maths", 92.0, 100.0, day(11, 1)))
        .await;
    assert_eq!(outcome.points_awarded, 30);
    // (68 + 92) / 2
    assert_eq!(outcome.progress, Some(80));

    // Emma is on a six-session streak: the seventh adds the milestone bonus.
    let lesson = mirror
        .set_lesson_status("demo-lesson-2", LessonStatus::Completed)
        .await
        .unwrap();
    let reward = lesson.reward.unwrap();
    assert_eq!((reward.new_streak, reward.base_points, reward.streak_bonus), (7, 10, 25));

    let before = mirror.student("demo-student-1").unwrap().points;
    mirror.purchase_item("demo-student-1", "hat-wizard").await.unwrap();
    let after = mirror.student("demo-student-1").unwrap();
    assert_eq!(after.points, before - 150);
    assert!(after.has_unlocked("hat-wizard"));
    let err = mirror
        .purchase_item("demo-student-1", "hat-wizard")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
    assert_eq!(mirror.student("demo-student-1").unwrap().points, before - 150);

    mirror
        .send_message(tutor.id(), "demo-student-1", "Nice hat!")
        .await
        .unwrap();
    let thread = mirror.messages_between("demo-student-1", tutor.id());
    assert_eq!(thread.last().unwrap().content, "Nice hat!");
    assert_eq!(thread, mirror.messages_between(tutor.id(), "demo-student-1"));

    session.logout().await.unwrap();
    let emma = session.login("emma@tutorhub.demo", "student123").await.unwrap();
    match emma {
        UserProfile::Student(student) => assert_eq!(student.points, before - 150),
        other => panic!("expected a student, got {:?}", other.role()),
    }
}

#[tokio::test]
async fn test_new_student_credentials() {
    let session = demo_session();
    session.login("tutor@tutorhub.demo", "tutor123").await.unwrap();
    let email: String = SafeEmail().fake();
    let name: String = Name().fake();

    let created = session.add_student(NewStudent::new(&email, &name)).await.unwrap();
    assert_eq!(created.password, generate_password(Local::now().date_naive()));

    session.logout().await.unwrap();
    let err = session.login(&email, "wrong-password1").await.unwrap_err();
    assert_eq!(err, AppError::InvalidCredential);
    let profile = session.login(&email, &created.password).await.unwrap();
    assert_eq!(profile.name(), name.trim());
}

#[tokio::test]
async fn test_demo_identity_survives_restart() {
    let dir = scratch_dir("restore");
    let local_config = LocalStateConfig {
        data_dir: Some(dir.clone()),
    };

    let first = SessionManager::new(
        &AppConfig::development(),
        StorageFactory::create_local(&local_config).unwrap(),
        None,
    )
    .unwrap();
    let profile = first.login("lucas@tutorhub.demo", "student123").await.unwrap();
    drop(first);

    let second = SessionManager::new(
        &AppConfig::development(),
        StorageFactory::create_local(&local_config).unwrap(),
        None,
    )
    .unwrap();
    assert_eq!(second.restore().await.unwrap(), Some(profile));
    assert_eq!(second.state(), SessionState::DemoSignedIn);

    std::fs::remove_dir_all(dir).ok();
}

#[tokio::test]
async fn test_entering_demo_mode_signs_out_live_identity() {
    let store = Arc::new(MemoryStore::new());
    let id = store.register_account("tia@example.com", "secret123");
    store.seed(
        Table::Profiles,
        vec![json!({ "id": id, "email": "tia@example.com", "name": "Tia", "role": "tutor" })],
    );
    let mut config = AppConfig::development();
    config.mode = DataMode::Live;
    let session = SessionManager::new(
        &config,
        Arc::new(MemoryLocalStore::new()),
        Some(RemoteBackend::from_shared(store.clone())),
    )
    .unwrap();
    session.login("tia@example.com", "secret123").await.unwrap();
    assert_eq!(session.state(), SessionState::LiveSignedIn);

    session.enter_demo_mode().await;

    assert_eq!(session.state(), SessionState::DemoSignedOut);
    assert_eq!(session.mirror().students().len(), 3);
    assert!(matches!(
        session.login("tia@example.com", "secret123").await,
        Err(AppError::NotFound(_))
    ));
    session.login("tutor@tutorhub.demo", "tutor123").await.unwrap();
    assert_eq!(session.state(), SessionState::DemoSignedIn);
}

#[tokio::test]
async fn test_optimistic_writes_survive_remote_failures() {
    let store = Arc::new(MemoryStore::new());
    let id = store.register_account("tia@example.com", "secret123");
    store.seed(
        Table::Profiles,
        vec![json!({ "id": id, "email": "tia@example.com", "name": "Tia", "role": "tutor" })],
    );
    let mut config = AppConfig::development();
    config.mode = DataMode::Live;
    let session = SessionManager::new(
        &config,
        Arc::new(MemoryLocalStore::new()),
        Some(RemoteBackend::from_shared(store.clone())),
    )
    .unwrap();
    session.login("tia@example.com", "secret123").await.unwrap();
    let created = session
        .add_student(NewStudent::new("sam@example.com", "Sam"))
        .await
        .unwrap();
    let student_id = created.profile.id().to_string();

    store.fail_table(Table::Messages, "network error");
    store.fail_table(Table::Lessons, "network error");
    let mirror = session.mirror();

    mirror.send_message(&id, &student_id, "Welcome!").await.unwrap();
    let lesson = mirror
        .add_lesson(tutorhub::models::ScheduleEvent::new(
            &student_id,
            &id,
            "Maths",
            day(11, 12),
            chrono::NaiveTime::from_hms_opt(16, 0, 0).unwrap(),
            chrono::NaiveTime::from_hms_opt(17, 0, 0).unwrap(),
        ))
        .await;

    assert_eq!(mirror.messages_between(&id, &student_id).len(), 1);
    assert_eq!(mirror.lessons_for_student(&student_id), vec![lesson]);
    assert!(store.rows(Table::Messages).is_empty());
    assert!(store.rows(Table::Lessons).is_empty());
    assert_eq!(mirror.metrics().snapshot().persist_failed, 2);

    // Collections that fail to reload keep what the session already has.
    let report = mirror.refresh_data(&id).await;
    assert!(report.failed.iter().any(|(table, _)| *table == Table::Lessons));
    assert_eq!(mirror.lessons_for_student(&student_id).len(), 1);
    assert_eq!(mirror.students().len(), 1);
}
