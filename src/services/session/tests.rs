use super::*;
use crate::error::ActionResult;
use crate::storage::remote::{AuthClient, MockAuthClient, MockRemoteStore};
use crate::storage::{MemoryLocalStore, MemoryStore};
use fake::Fake;
use fake::faker::internet::en::SafeEmail;
use fake::faker::name::en::Name;
use std::time::Duration;

fn demo_manager() -> (SessionManager, Arc<MemoryLocalStore>) {
    let local = Arc::new(MemoryLocalStore::new());
    let manager = SessionManager::new(&AppConfig::development(), local.clone(), None).unwrap();
    (manager, local)
}

fn live_manager() -> (Arc<SessionManager>, Arc<MemoryStore>) {
    let mut config = AppConfig::development();
    config.mode = DataMode::Live;
    let store = Arc::new(MemoryStore::new());
    let manager = SessionManager::new(
        &config,
        Arc::new(MemoryLocalStore::new()),
        Some(RemoteBackend::from_shared(store.clone())),
    )
    .unwrap();
    (Arc::new(manager), store)
}

fn seed_user(store: &MemoryStore, email: &str, password: &str, name: &str, role: &str) -> String {
    let id = store.register_account(email, password);
    store.seed(
        Table::Profiles,
        vec![json!({ "id": id, "email": email, "name": name, "role": role })],
    );
    id
}

/// Local state whose removals always fail.
struct StuckLocalStore;

impl LocalStore for StuckLocalStore {
    fn get(&self, _key: &str) -> Result<Option<String>> {
        Ok(None)
    }

    fn set(&self, _key: &str, _value: &str) -> Result<()> {
        Ok(())
    }

    fn remove(&self, _key: &str) -> Result<()> {
        Err(AppError::LocalState("disk is read-only".to_string()))
    }
}

async fn signed_in_tutor() -> (SessionManager, Arc<MemoryLocalStore>) {
    let (manager, local) = demo_manager();
    manager.login("tutor@tutorhub.demo", "tutor123").await.unwrap();
    (manager, local)
}

// ===== Demo mode =====

#[tokio::test]
async fn test_every_seeded_account_logs_in_and_round_trips() {
    let (manager, local) = demo_manager();

    for account in DemoDataset::seeded().accounts {
        let profile = manager
            .login(account.profile.email(), &account.password)
            .await
            .unwrap();
        assert_eq!(profile.id(), account.profile.id());
        assert_eq!(manager.state(), SessionState::DemoSignedIn);

        let stored = local.get(DEMO_USER_KEY).unwrap().unwrap();
        let restored: UserProfile = serde_json::from_str(&stored).unwrap();
        assert_eq!(restored, profile);

        manager.logout().await.unwrap();
        assert_eq!(manager.state(), SessionState::DemoSignedOut);
        assert!(local.get(DEMO_USER_KEY).unwrap().is_none());
    }
}

#[tokio::test]
async fn test_demo_login_failures() {
    let (manager, _) = demo_manager();

    let err = manager.login("nobody@tutorhub.demo", "x").await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));

    let err = manager.login("emma@tutorhub.demo", "wrong").await.unwrap_err();
    assert_eq!(err, AppError::InvalidCredential);
    assert!(manager.current_user().is_none());

    let profile = manager.login(" EMMA@tutorhub.demo ", "student123").await.unwrap();
    assert_eq!(profile.role(), Role::Student);
}

#[tokio::test]
async fn test_demo_student_login_sees_earned_points() {
    let (manager, _) = demo_manager();
    manager
        .mirror()
        .award_bonus("demo-student-2", 10, "Great effort")
        .await
        .unwrap();

    let profile = manager.login("oliver@tutorhub.demo", "student123").await.unwrap();
    match profile {
        UserProfile::Student(student) => assert_eq!(student.points, 100),
        other => panic!("expected a student, got {:?}", other.role()),
    }
}

#[tokio::test]
async fn test_admin_password_override() {
    let (manager, local) = demo_manager();
    manager.login("admin@tutorhub.demo", "admin123").await.unwrap();

    let err = manager
        .change_admin_password("admin123", "newpass1", "newpass2")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
    let err = manager
        .change_admin_password("wrong", "newpass1", "newpass1")
        .await
        .unwrap_err();
    assert_eq!(err, AppError::InvalidCredential);

    manager
        .change_admin_password("admin123", "newpass1", "newpass1")
        .await
        .unwrap();
    assert_eq!(local.get(ADMIN_PASSWORD_KEY).unwrap().as_deref(), Some("newpass1"));

    manager.logout().await.unwrap();
    let err = manager.login("admin@tutorhub.demo", "admin123").await.unwrap_err();
    assert_eq!(err, AppError::InvalidCredential);
    manager.login("admin@tutorhub.demo", "newpass1").await.unwrap();
}

#[tokio::test]
async fn test_only_admin_changes_admin_password() {
    let (manager, _) = signed_in_tutor().await;
    let err = manager
        .change_admin_password("tutor123", "newpass1", "newpass1")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Authorization(_)));
}

#[tokio::test]
async fn test_sign_up_and_reset_disabled_in_demo() {
    let (manager, _) = demo_manager();
    let err = manager
        .sign_up("new@example.com", "secret123", "New User", Role::Tutor)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::FeatureDisabled(_)));
    let err = manager.reset_password("emma@tutorhub.demo").await.unwrap_err();
    assert!(matches!(err, AppError::FeatureDisabled(_)));
}

#[tokio::test]
async fn test_demo_restore_from_local_key() {
    let (manager, local) = demo_manager();
    let profile = manager.login("sarah.clarke@tutorhub.demo", "parent123").await.unwrap();

    let reopened = SessionManager::new(&AppConfig::development(), local.clone(), None).unwrap();
    assert_eq!(reopened.state(), SessionState::DemoSignedOut);
    let restored = reopened.restore().await.unwrap();
    assert_eq!(restored, Some(profile));
    assert_eq!(reopened.state(), SessionState::DemoSignedIn);
}

#[tokio::test]
async fn test_unreadable_demo_session_is_discarded() {
    let (manager, local) = demo_manager();
    local.set(DEMO_USER_KEY, "{not json").unwrap();
    assert_eq!(manager.restore().await.unwrap(), None);
    assert!(local.get(DEMO_USER_KEY).unwrap().is_none());
}

#[tokio::test]
async fn test_exit_demo_mode_needs_remote() {
    let (manager, _) = demo_manager();
    let err = manager.exit_demo_mode().unwrap_err();
    assert!(matches!(err, AppError::Config(_)));
    assert_eq!(manager.mode(), DataMode::Demo);
}

#[tokio::test]
async fn test_exit_demo_mode_survives_local_state_failure() {
    let store = Arc::new(MemoryStore::new());
    let manager = SessionManager::new(
        &AppConfig::development(),
        Arc::new(StuckLocalStore),
        Some(RemoteBackend::from_shared(store)),
    )
    .unwrap();
    assert_eq!(manager.mirror().students().len(), 3);

    manager.exit_demo_mode().unwrap();

    assert_eq!(manager.state(), SessionState::LiveSignedOut);
    assert!(manager.mirror().is_live());
    assert!(manager.mirror().students().is_empty());
}

#[tokio::test]
async fn test_live_logout_survives_local_state_failure() {
    let mut config = AppConfig::development();
    config.mode = DataMode::Live;
    let store = Arc::new(MemoryStore::new());
    seed_user(&store, "tutor@example.com", "secret123", "Tia", "tutor");
    let manager = SessionManager::new(
        &config,
        Arc::new(StuckLocalStore),
        Some(RemoteBackend::from_shared(store.clone())),
    )
    .unwrap();
    manager.login("tutor@example.com", "secret123").await.unwrap();
    manager.mirror().send_message("x", "y", "hello").await.unwrap();

    manager.logout().await.unwrap();

    assert_eq!(manager.state(), SessionState::LiveSignedOut);
    assert!(manager.mirror().messages_between("x", "y").is_empty());
    assert!(store.get_session().await.unwrap().is_none());
}

#[test]
fn test_live_mode_needs_remote() {
    let mut config = AppConfig::development();
    config.mode = DataMode::Live;
    let result = SessionManager::new(&config, Arc::new(MemoryLocalStore::new()), None);
    assert!(matches!(result, Err(AppError::Config(_))));
}

// ===== Account creation =====

#[tokio::test]
async fn test_demo_add_student_can_log_in() {
    let (manager, _) = signed_in_tutor().await;
    let email: String = SafeEmail().fake();
    let name: String = Name().fake();

    let created = manager
        .add_student(NewStudent::new(&email, &name).with_parent("demo-parent-2"))
        .await
        .unwrap();

    assert_eq!(created.password, generate_password(Local::now().date_naive()));
    let student_id = created.profile.id().to_string();
    let cached = manager.mirror().student(&student_id).unwrap();
    assert_eq!(cached.tutor_id, "demo-tutor");
    assert!(manager
        .mirror()
        .parent("demo-parent-2")
        .unwrap()
        .children_ids
        .contains(&student_id));

    manager.logout().await.unwrap();
    let profile = manager.login(&email, &created.password).await.unwrap();
    assert_eq!(profile.id(), student_id);
}

#[tokio::test]
async fn test_demo_add_student_rejects_taken_email() {
    let (manager, _) = signed_in_tutor().await;
    let err = manager
        .add_student(NewStudent::new("emma@tutorhub.demo", "Emma Again"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
}

#[tokio::test]
async fn test_demo_add_parent_links_children() {
    let (manager, _) = signed_in_tutor().await;
    let created = manager
        .add_parent(
            NewParent::new("guardian@example.com", "Jo Guardian")
                .with_child("demo-student-2")
                .with_child("no-such-student"),
        )
        .await
        .unwrap();

    let parent = match created.profile {
        UserProfile::Parent(parent) => parent,
        other => panic!("expected a parent, got {:?}", other.role()),
    };
    assert_eq!(parent.children_ids.len(), 1);
    assert_eq!(
        manager.mirror().student("demo-student-2").unwrap().parent_id,
        Some(parent.id.clone())
    );
    assert_eq!(manager.mirror().children_of(&parent.id).len(), 1);
}

#[tokio::test]
async fn test_only_tutors_add_accounts() {
    let (manager, _) = demo_manager();
    let err = manager
        .add_student(NewStudent::new("x@example.com", "X"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Authorization(_)));

    manager.login("emma@tutorhub.demo", "student123").await.unwrap();
    let err = manager
        .add_parent(NewParent::new("y@example.com", "Y"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Authorization(_)));
}

// ===== Live mode =====

#[tokio::test]
async fn test_live_student_login_projects_detail_row() {
    let (manager, store) = live_manager();
    let id = seed_user(&store, "sam@example.com", "secret123", "Sam", "student");
    let mut detail = StudentProfile::new(&id, "sam@example.com", "Sam", "t1");
    detail.points = 120;
    store.seed(Table::Students, vec![serde_json::to_value(&detail).unwrap()]);

    let profile = manager.login("sam@example.com", "secret123").await.unwrap();

    match profile {
        UserProfile::Student(student) => {
            assert_eq!(student.id, id);
            assert_eq!(student.points, 120);
            assert!(student.subjects.is_empty());
        }
        other => panic!("expected a student, got {:?}", other.role()),
    }
    assert_eq!(manager.state(), SessionState::LiveSignedIn);
}

#[tokio::test]
async fn test_live_login_without_profile_row() {
    let (manager, store) = live_manager();
    store.register_account("ghost@example.com", "secret123");
    let err = manager.login("ghost@example.com", "secret123").await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
    assert!(manager.current_user().is_none());
    // No remote session is left behind for the next start-up to pick up.
    assert!(store.get_session().await.unwrap().is_none());
    assert_eq!(manager.restore().await.unwrap(), None);
}

#[tokio::test]
async fn test_live_tutor_login_loads_roster() {
    let (manager, store) = live_manager();
    let tutor_id = seed_user(&store, "tutor@example.com", "secret123", "Tia", "tutor");
    store.seed(
        Table::Students,
        vec![
            serde_json::to_value(StudentProfile::new("s1", "s1@example.com", "A", &tutor_id)).unwrap(),
            serde_json::to_value(StudentProfile::new("s2", "s2@example.com", "B", "other")).unwrap(),
        ],
    );

    manager.login("tutor@example.com", "secret123").await.unwrap();

    assert_eq!(manager.mirror().students().len(), 1);
    assert_eq!(manager.mirror().students()[0].id, "s1");
}

#[tokio::test]
async fn test_live_logout_clears_everything() {
    let (manager, store) = live_manager();
    seed_user(&store, "tutor@example.com", "secret123", "Tia", "tutor");
    manager.login("tutor@example.com", "secret123").await.unwrap();
    manager
        .mirror()
        .send_message("x", "y", "hello")
        .await
        .unwrap();

    manager.logout().await.unwrap();

    assert_eq!(manager.state(), SessionState::LiveSignedOut);
    assert!(manager.mirror().messages_between("x", "y").is_empty());
    assert!(store.get_session().await.unwrap().is_none());
}

#[tokio::test]
async fn test_enter_demo_mode_from_live_session() {
    let (manager, store) = live_manager();
    seed_user(&store, "tutor@example.com", "secret123", "Tia", "tutor");
    manager.login("tutor@example.com", "secret123").await.unwrap();

    manager.enter_demo_mode().await;

    assert_eq!(manager.state(), SessionState::DemoSignedOut);
    assert_eq!(manager.mirror().students().len(), 3);
    assert!(!manager.mirror().is_live());
    assert!(store.get_session().await.unwrap().is_none());

    let err = manager.login("tutor@example.com", "secret123").await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
    manager.login("tutor@tutorhub.demo", "tutor123").await.unwrap();

    manager.exit_demo_mode().unwrap();
    assert_eq!(manager.state(), SessionState::LiveSignedOut);
    assert!(manager.mirror().students().is_empty());
}

#[tokio::test]
async fn test_live_sign_up_validates_and_delegates() {
    let (manager, store) = live_manager();

    let err = manager
        .sign_up("not-an-email", "secret123", "Kim", Role::Tutor)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
    let err = manager
        .sign_up("kim@example.com", "short", "Kim", Role::Tutor)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    let user = manager
        .sign_up("kim@example.com", "secret123", "Kim", Role::Tutor)
        .await
        .unwrap();
    assert_eq!(user.user_metadata["role"], "tutor");
    assert!(store.has_account("kim@example.com"));
    assert!(store.rows(Table::Profiles).is_empty());
}

#[tokio::test]
async fn test_live_reset_password_delegates() {
    let (manager, store) = live_manager();
    manager.reset_password(" kim@example.com ").await.unwrap();
    assert_eq!(store.password_resets(), vec!["kim@example.com".to_string()]);
}

#[tokio::test]
async fn test_live_add_student_creates_identity_and_rows() {
    let (manager, store) = live_manager();
    seed_user(&store, "tutor@example.com", "secret123", "Tia", "tutor");
    manager.login("tutor@example.com", "secret123").await.unwrap();

    let created = manager
        .add_student(NewStudent::new("maya@example.com", "Maya"))
        .await
        .unwrap();

    assert!(store.has_account("maya@example.com"));
    let students = store.rows(Table::Students);
    assert_eq!(students.len(), 1);
    assert_eq!(students[0]["id"], created.profile.id());
    assert_eq!(store.rows(Table::Profiles).len(), 2);
    assert!(manager.mirror().student(created.profile.id()).is_some());
}

#[tokio::test]
async fn test_live_add_student_profile_failure_leaves_identity() {
    let (manager, store) = live_manager();
    seed_user(&store, "tutor@example.com", "secret123", "Tia", "tutor");
    manager.login("tutor@example.com", "secret123").await.unwrap();
    store.fail_table(Table::Profiles, "permission denied for table profiles");

    let err = manager
        .add_student(NewStudent::new("maya@example.com", "Maya"))
        .await
        .unwrap_err();

    assert_eq!(err, AppError::Remote("permission denied for table profiles".to_string()));
    assert!(store.has_account("maya@example.com"));
    assert!(store.rows(Table::Students).is_empty());
    assert!(manager.mirror().students().is_empty());
}

#[tokio::test]
async fn test_live_add_student_auth_failure() {
    let (manager, store) = live_manager();
    seed_user(&store, "tutor@example.com", "secret123", "Tia", "tutor");
    manager.login("tutor@example.com", "secret123").await.unwrap();
    store.fail_user_creation("User already registered");

    let err = manager
        .add_student(NewStudent::new("maya@example.com", "Maya"))
        .await
        .unwrap_err();
    assert_eq!(err, AppError::Remote("User already registered".to_string()));
    assert_eq!(store.rows(Table::Profiles).len(), 1);
}

#[tokio::test]
async fn test_live_change_admin_password_uses_session() {
    let (manager, store) = live_manager();
    seed_user(&store, "root@example.com", "secret123", "Root", "admin");
    manager.login("root@example.com", "secret123").await.unwrap();

    manager
        .change_admin_password("secret123", "better456", "better456")
        .await
        .unwrap();

    manager.logout().await.unwrap();
    let err = manager.login("root@example.com", "secret123").await.unwrap_err();
    assert_eq!(err, AppError::InvalidCredential);
    manager.login("root@example.com", "better456").await.unwrap();
}

// ===== Auth events =====

#[tokio::test]
async fn test_signed_out_event_clears_identity() {
    let (manager, store) = live_manager();
    seed_user(&store, "tutor@example.com", "secret123", "Tia", "tutor");
    manager.login("tutor@example.com", "secret123").await.unwrap();

    manager.handle_auth_event(AuthEvent::SignedOut).await.unwrap();

    assert_eq!(manager.state(), SessionState::LiveSignedOut);
}

#[tokio::test]
async fn test_listener_restores_identity_from_events() {
    let (manager, store) = live_manager();
    let id = seed_user(&store, "tutor@example.com", "secret123", "Tia", "tutor");
    let handle = manager.spawn_auth_listener().unwrap();

    store
        .sign_in_with_password("tutor@example.com", "secret123")
        .await
        .unwrap();

    let mut signed_in = false;
    for _ in 0..50 {
        if manager.current_user().map(|p| p.id().to_string()) == Some(id.clone()) {
            signed_in = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(signed_in, "listener should install the signed-in identity");

    store.sign_out().await.unwrap();
    for _ in 0..50 {
        if manager.current_user().is_none() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(manager.state(), SessionState::LiveSignedOut);
    handle.abort();
}

#[tokio::test]
async fn test_live_restore_uses_remote_session() {
    let (manager, store) = live_manager();
    let id = seed_user(&store, "tutor@example.com", "secret123", "Tia", "tutor");
    assert_eq!(manager.restore().await.unwrap(), None);

    store
        .sign_in_with_password("tutor@example.com", "secret123")
        .await
        .unwrap();
    let restored = manager.restore().await.unwrap().unwrap();
    assert_eq!(restored.id(), id);
    assert_eq!(restored.role(), Role::Tutor);
}

#[tokio::test]
async fn test_remote_error_passes_through_verbatim() {
    let mut auth = MockAuthClient::new();
    auth.expect_sign_in_with_password()
        .times(1)
        .returning(|_, _| Err(AppError::Remote("Email not confirmed".to_string())));
    let store = MockRemoteStore::new();

    let mut config = AppConfig::development();
    config.mode = DataMode::Live;
    let manager = SessionManager::new(
        &config,
        Arc::new(MemoryLocalStore::new()),
        Some(RemoteBackend::new(Arc::new(store), Arc::new(auth))),
    )
    .unwrap();

    let err = manager.login("kim@example.com", "secret123").await.unwrap_err();
    assert_eq!(err.to_string(), "Email not confirmed");
    assert!(!ActionResult::from(&Err::<(), _>(err)).success);
}
