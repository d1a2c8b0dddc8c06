//! Session Manager
//!
//! Resolves who the current user is and which data-source mode is active.
//! Owns the identity and the demo/live flag; switching modes always signs the
//! current identity out.

use chrono::Local;
use futures_util::StreamExt;
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::json;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use uuid::Uuid;

use crate::config::{AppConfig, DataMode};
use crate::demo::{DemoAccount, DemoDataset};
use crate::error::{AppError, Result};
use crate::models::{Identity, ParentProfile, Role, StudentProfile, UserProfile};
use crate::observability::SyncMetrics;
use crate::security::validation::{
    validate_email, validate_name, validate_new_password, validate_password,
};
use crate::services::accounts::{CreatedAccount, NewParent, NewStudent, generate_password};
use crate::services::mirror::DomainMirror;
use crate::storage::{
    ADMIN_PASSWORD_KEY, AuthEvent, AuthSession, AuthUser, DEMO_USER_KEY, Filter, LocalStore,
    ProfileRow, RemoteBackend, Table,
};

#[cfg(test)]
mod tests;

/// Mode × authentication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionState {
    DemoSignedOut,
    DemoSignedIn,
    LiveSignedOut,
    LiveSignedIn,
}

impl SessionState {
    pub fn is_signed_in(&self) -> bool {
        matches!(self, SessionState::DemoSignedIn | SessionState::LiveSignedIn)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::DemoSignedOut => "demo/signed-out",
            SessionState::DemoSignedIn => "demo/signed-in",
            SessionState::LiveSignedOut => "live/signed-out",
            SessionState::LiveSignedIn => "live/signed-in",
        };
        f.write_str(s)
    }
}

/// Session context, constructed once at start-up and shared behind an `Arc`.
pub struct SessionManager {
    mode: RwLock<DataMode>,
    identity: RwLock<Option<UserProfile>>,
    demo: RwLock<DemoDataset>,
    mirror: Arc<DomainMirror>,
    local: Arc<dyn LocalStore>,
    remote: Option<RemoteBackend>,
}

impl SessionManager {
    /// Build the session context in the configured mode.
    ///
    /// Live mode requires a remote backend.
    pub fn new(
        config: &AppConfig,
        local: Arc<dyn LocalStore>,
        remote: Option<RemoteBackend>,
    ) -> Result<Self> {
        let mirror = Arc::new(DomainMirror::new(config.rewards.clone(), SyncMetrics::new()));
        let demo = DemoDataset::seeded();
        match (config.mode, &remote) {
            (DataMode::Demo, _) => mirror.reset_demo(&demo),
            (DataMode::Live, Some(backend)) => mirror.reset_live(backend.store.clone()),
            (DataMode::Live, None) => {
                return Err(AppError::Config(
                    "live mode requires remote.url and remote.anon_key".to_string(),
                ));
            }
        }
        tracing::info!(mode = ?config.mode, "Session context created");

        Ok(Self {
            mode: RwLock::new(config.mode),
            identity: RwLock::new(None),
            demo: RwLock::new(demo),
            mirror,
            local,
            remote,
        })
    }

    pub fn mirror(&self) -> &Arc<DomainMirror> {
        &self.mirror
    }

    pub fn mode(&self) -> DataMode {
        *self.mode.read()
    }

    pub fn current_user(&self) -> Option<UserProfile> {
        self.identity.read().clone()
    }

    pub fn state(&self) -> SessionState {
        let signed_in = self.identity.read().is_some();
        match (self.mode(), signed_in) {
            (DataMode::Demo, false) => SessionState::DemoSignedOut,
            (DataMode::Demo, true) => SessionState::DemoSignedIn,
            (DataMode::Live, false) => SessionState::LiveSignedOut,
            (DataMode::Live, true) => SessionState::LiveSignedIn,
        }
    }

    fn backend(&self) -> Result<&RemoteBackend> {
        self.remote
            .as_ref()
            .ok_or_else(|| AppError::Config("remote store is not configured".to_string()))
    }

    fn set_identity(&self, profile: Option<UserProfile>) {
        *self.identity.write() = profile;
    }

    // ===== Login / logout =====

    /// Sign in and return the resolved profile.
    pub async fn login(&self, email: &str, password: &str) -> Result<UserProfile> {
        let email = email.trim();
        match self.mode() {
            DataMode::Demo => self.demo_login(email, password),
            DataMode::Live => {
                let backend = self.backend()?;
                let session = backend.auth.sign_in_with_password(email, password).await?;
                let profile = match self.load_profile(backend, &session.user).await {
                    Ok(profile) => profile,
                    Err(e) => {
                        if let Err(sign_out) = backend.auth.sign_out().await {
                            tracing::warn!(error = %sign_out, "Remote sign-out failed after profile load error");
                        }
                        return Err(e);
                    }
                };
                self.set_live_identity(profile.clone()).await;
                Ok(profile)
            }
        }
    }

    fn demo_password(&self, account: &DemoAccount) -> Result<String> {
        if account.profile.role() == Role::Admin {
            if let Some(overridden) = self.local.get(ADMIN_PASSWORD_KEY)? {
                return Ok(overridden);
            }
        }
        Ok(account.password.clone())
    }

    fn demo_login(&self, email: &str, password: &str) -> Result<UserProfile> {
        let account = self
            .demo
            .read()
            .account_by_email(email)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("no account for {}", email)))?;

        if self.demo_password(&account)? != password {
            tracing::info!(email, "Demo login rejected");
            return Err(AppError::InvalidCredential);
        }

        let profile = self.current_copy(account.profile);
        self.local
            .set(DEMO_USER_KEY, &serde_json::to_string(&profile)?)?;
        tracing::info!(user_id = profile.id(), role = %profile.role(), "Signed in (demo)");
        self.set_identity(Some(profile.clone()));
        Ok(profile)
    }

    /// Prefer the mirror's copy of a student so earned points are reflected.
    fn current_copy(&self, profile: UserProfile) -> UserProfile {
        match profile {
            UserProfile::Student(student) => {
                UserProfile::Student(self.mirror.student(&student.id).unwrap_or(student))
            }
            UserProfile::Parent(parent) => {
                UserProfile::Parent(self.mirror.parent(&parent.id).unwrap_or(parent))
            }
            other => other,
        }
    }

    /// Fetch the `profiles` row and its role-specific detail row.
    async fn load_profile(&self, backend: &RemoteBackend, user: &AuthUser) -> Result<UserProfile> {
        let rows = backend
            .store
            .select(Table::Profiles, &[Filter::eq("id", user.id.as_str())])
            .await?;
        let row = rows.into_iter().next().ok_or_else(|| {
            AppError::NotFound(format!("profile for user {}", user.id))
        })?;
        let mut row: ProfileRow = serde_json::from_value(row)?;
        if row.email.is_empty() {
            row.email = user.email.clone().unwrap_or_default();
        }

        let detail_table = match row.role()? {
            Role::Student => Some(Table::Students),
            Role::Parent => Some(Table::Parents),
            Role::Admin | Role::Tutor => None,
        };
        let detail = match detail_table {
            Some(table) => backend
                .store
                .select(table, &[Filter::eq("id", user.id.as_str())])
                .await?
                .into_iter()
                .next(),
            None => None,
        };
        row.project(detail)
    }

    /// Install a live identity; tutors also get their roster loaded.
    async fn set_live_identity(&self, profile: UserProfile) {
        let role = profile.role();
        let user_id = profile.id().to_string();
        self.set_identity(Some(profile));
        tracing::info!(user_id = %user_id, role = %role, "Signed in (live)");

        if role.needs_roster() {
            let report = self.mirror.refresh_data(&user_id).await;
            if !report.is_complete() {
                tracing::warn!(failed = report.failed.len(), "Roster loaded partially");
            }
        }
    }

    /// Clear the identity and persisted session; live mode also signs out remotely.
    pub async fn logout(&self) -> Result<()> {
        let previous = self.identity.write().take();

        if self.mode() == DataMode::Live {
            self.mirror.clear();
            let backend = self.backend()?;
            if let Err(e) = backend.auth.sign_out().await {
                tracing::warn!(error = %e, "Remote sign-out failed, local session cleared");
            }
        }
        if let Err(e) = self.local.remove(DEMO_USER_KEY) {
            tracing::warn!(error = %e, "Failed to clear persisted demo identity");
        }
        if let Some(profile) = previous {
            tracing::info!(user_id = profile.id(), "Signed out");
        }
        Ok(())
    }

    // ===== Accounts =====

    /// Register a live auth identity. No role-specific row is created.
    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        name: &str,
        role: Role,
    ) -> Result<AuthUser> {
        if self.mode() == DataMode::Demo {
            return Err(AppError::FeatureDisabled("Sign-up".to_string()));
        }
        let email = email.trim();
        validate_email(email)?;
        validate_password(password)?;
        validate_name(name)?;

        let backend = self.backend()?;
        let user = backend
            .auth
            .sign_up(email, password, json!({ "name": name.trim(), "role": role.to_string() }))
            .await?;
        tracing::info!(user_id = %user.id, role = %role, "Signed up");
        Ok(user)
    }

    pub async fn reset_password(&self, email: &str) -> Result<()> {
        if self.mode() == DataMode::Demo {
            return Err(AppError::FeatureDisabled("Password reset".to_string()));
        }
        let email = email.trim();
        validate_email(email)?;
        self.backend()?.auth.reset_password_for_email(email).await?;
        tracing::info!(email, "Password reset requested");
        Ok(())
    }

    /// Change the signed-in admin's password.
    ///
    /// Demo mode checks `current` and stores the override locally; live mode
    /// updates the password of the authenticated remote session.
    pub async fn change_admin_password(
        &self,
        current: &str,
        new_password: &str,
        confirmation: &str,
    ) -> Result<()> {
        let admin_email = match self.current_user() {
            Some(profile) if profile.role() == Role::Admin => profile.email().to_string(),
            _ => {
                return Err(AppError::Authorization(
                    "only an administrator can change the admin password".to_string(),
                ));
            }
        };
        validate_new_password(new_password, confirmation)?;

        match self.mode() {
            DataMode::Demo => {
                let account = self
                    .demo
                    .read()
                    .account_by_email(&admin_email)
                    .cloned()
                    .ok_or_else(|| AppError::NotFound(format!("no account for {}", admin_email)))?;
                if self.demo_password(&account)? != current {
                    return Err(AppError::InvalidCredential);
                }
                self.local.set(ADMIN_PASSWORD_KEY, new_password)?;
            }
            DataMode::Live => {
                self.backend()?.auth.update_password(new_password).await?;
            }
        }
        tracing::info!("Admin password changed");
        Ok(())
    }

    fn require_tutor(&self) -> Result<String> {
        match self.current_user() {
            Some(UserProfile::Tutor(tutor)) => Ok(tutor.id),
            _ => Err(AppError::Authorization(
                "only a signed-in tutor can create accounts".to_string(),
            )),
        }
    }

    fn ensure_demo_email_free(&self, email: &str) -> Result<()> {
        if self.demo.read().account_by_email(email).is_some() {
            return Err(AppError::Validation(format!("{} is already registered", email)));
        }
        Ok(())
    }

    /// Create the auth identity, then the `profiles` row, then the role row.
    ///
    /// There is no compensation: if a row insert fails after the auth identity
    /// was created, that identity is left without a profile.
    async fn create_live_account<T: Serialize>(
        &self,
        identity: &Identity,
        password: &str,
        table: Table,
        detail: &T,
    ) -> Result<String> {
        let backend = self.backend()?;
        let user = backend
            .auth
            .create_user(
                &identity.email,
                password,
                json!({ "name": identity.name, "role": identity.role.to_string() }),
            )
            .await?;

        let mut with_id = identity.clone();
        with_id.id = user.id.clone();
        let mut detail_row = serde_json::to_value(detail)?;
        if let Some(object) = detail_row.as_object_mut() {
            object.insert("id".to_string(), json!(user.id));
        }

        for (table, row) in [
            (Table::Profiles, serde_json::to_value(ProfileRow::new(&with_id))?),
            (table, detail_row),
        ] {
            if let Err(e) = backend.store.insert(table, row).await {
                tracing::warn!(
                    user_id = %user.id,
                    table = %table,
                    error = %e,
                    "Auth identity created but profile insert failed; identity left without a profile"
                );
                return Err(e);
            }
        }
        Ok(user.id)
    }

    /// Create a student under the signed-in tutor.
    pub async fn add_student(&self, input: NewStudent) -> Result<CreatedAccount> {
        let tutor_id = self.require_tutor()?;
        validate_email(&input.email)?;
        validate_name(&input.name)?;
        let password = generate_password(Local::now().date_naive());

        let mut student = StudentProfile::new(
            &Uuid::new_v4().to_string(),
            input.email.trim(),
            input.name.trim(),
            &tutor_id,
        )
        .with_subjects(input.subjects.iter().map(String::as_str));
        student.year_group = input.year_group.clone();
        student.parent_id = input.parent_id.clone();

        match self.mode() {
            DataMode::Demo => {
                self.ensure_demo_email_free(&student.email)?;
                self.mirror.add_student(student.clone()).await;
                self.demo
                    .write()
                    .accounts
                    .push(DemoAccount::new(UserProfile::Student(student.clone()), &password));
            }
            DataMode::Live => {
                student.id = self
                    .create_live_account(&student.identity(), &password, Table::Students, &student)
                    .await?;
                self.mirror.cache_student(student.clone());
                if let Some(parent) = student.parent_id.as_deref().and_then(|id| self.mirror.parent(id)) {
                    self.mirror.update_parent(parent).await?;
                }
            }
        }

        tracing::info!(student_id = %student.id, tutor_id = %tutor_id, "Student account created");
        Ok(CreatedAccount {
            profile: UserProfile::Student(student),
            password,
        })
    }

    /// Create a parent and link the given children both ways.
    pub async fn add_parent(&self, input: NewParent) -> Result<CreatedAccount> {
        self.require_tutor()?;
        validate_email(&input.email)?;
        validate_name(&input.name)?;
        let password = generate_password(Local::now().date_naive());

        let mut parent = ParentProfile::new(
            &Uuid::new_v4().to_string(),
            input.email.trim(),
            input.name.trim(),
        );
        parent.phone = input.phone.clone();
        parent.children_ids = input
            .children_ids
            .iter()
            .filter(|id| self.mirror.student(id).is_some())
            .cloned()
            .collect::<BTreeSet<_>>();

        match self.mode() {
            DataMode::Demo => {
                self.ensure_demo_email_free(&parent.email)?;
                self.mirror.add_parent(parent.clone()).await;
                self.demo
                    .write()
                    .accounts
                    .push(DemoAccount::new(UserProfile::Parent(parent.clone()), &password));
            }
            DataMode::Live => {
                parent.id = self
                    .create_live_account(&parent.identity(), &password, Table::Parents, &parent)
                    .await?;
                self.mirror.cache_parent(parent.clone());
                for child_id in &parent.children_ids {
                    if let Some(child) = self.mirror.student(child_id) {
                        self.mirror.update_student(child).await?;
                    }
                }
            }
        }

        tracing::info!(parent_id = %parent.id, children = parent.children_ids.len(), "Parent account created");
        Ok(CreatedAccount {
            profile: UserProfile::Parent(parent),
            password,
        })
    }

    // ===== Mode switching =====

    /// Switch to demo mode: sign out and reload the seeded dataset.
    pub async fn enter_demo_mode(&self) {
        let was_live_signed_in = self.state() == SessionState::LiveSignedIn;
        self.set_identity(None);
        *self.mode.write() = DataMode::Demo;
        if let Err(e) = self.local.remove(DEMO_USER_KEY) {
            tracing::warn!(error = %e, "Failed to clear persisted demo identity");
        }

        if was_live_signed_in {
            if let Some(backend) = &self.remote {
                if let Err(e) = backend.auth.sign_out().await {
                    tracing::warn!(error = %e, "Remote sign-out failed while entering demo mode");
                }
            }
        }

        let seeded = DemoDataset::seeded();
        self.mirror.reset_demo(&seeded);
        *self.demo.write() = seeded;
        tracing::info!("Entered demo mode");
    }

    /// Switch to live mode with an empty mirror. Requires a remote backend.
    pub fn exit_demo_mode(&self) -> Result<()> {
        let store = self.backend()?.store.clone();
        self.set_identity(None);
        *self.mode.write() = DataMode::Live;
        self.mirror.reset_live(store);
        if let Err(e) = self.local.remove(DEMO_USER_KEY) {
            tracing::warn!(error = %e, "Failed to clear persisted demo identity");
        }
        tracing::info!("Entered live mode");
        Ok(())
    }

    // ===== Start-up restore & auth events =====

    /// Restore a persisted session, if any.
    pub async fn restore(&self) -> Result<Option<UserProfile>> {
        match self.mode() {
            DataMode::Demo => {
                let Some(raw) = self.local.get(DEMO_USER_KEY)? else {
                    return Ok(None);
                };
                match serde_json::from_str::<UserProfile>(&raw) {
                    Ok(profile) => {
                        let profile = self.current_copy(profile);
                        tracing::info!(user_id = profile.id(), "Restored demo session");
                        self.set_identity(Some(profile.clone()));
                        Ok(Some(profile))
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Discarding unreadable demo session");
                        self.local.remove(DEMO_USER_KEY)?;
                        Ok(None)
                    }
                }
            }
            DataMode::Live => {
                let backend = self.backend()?;
                let Some(session) = backend.auth.get_session().await? else {
                    return Ok(None);
                };
                let profile = self.load_profile(backend, &session.user).await?;
                self.set_live_identity(profile.clone()).await;
                Ok(Some(profile))
            }
        }
    }

    fn is_current(&self, session: &AuthSession) -> bool {
        self.identity
            .read()
            .as_ref()
            .map(|p| p.id() == session.user.id)
            .unwrap_or(false)
    }

    /// React to an auth-state change reported by the remote backend.
    pub async fn handle_auth_event(&self, event: AuthEvent) -> Result<()> {
        if self.mode() != DataMode::Live {
            tracing::debug!("Ignoring auth event outside live mode");
            return Ok(());
        }
        match event {
            AuthEvent::SignedIn(session) => {
                if self.is_current(&session) {
                    return Ok(());
                }
                let profile = self.load_profile(self.backend()?, &session.user).await?;
                self.set_live_identity(profile).await;
            }
            AuthEvent::TokenRefreshed(session) => {
                let profile = self.load_profile(self.backend()?, &session.user).await?;
                self.set_live_identity(profile).await;
            }
            AuthEvent::SignedOut => {
                if self.identity.write().take().is_some() {
                    tracing::info!("Remote session ended");
                }
                self.mirror.clear();
            }
        }
        Ok(())
    }

    /// Forward auth events to [`handle_auth_event`](Self::handle_auth_event)
    /// on a background task. `None` when no remote backend is configured.
    pub fn spawn_auth_listener(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        let backend = self.remote.as_ref()?;
        let mut events = BroadcastStream::new(backend.auth.subscribe());
        let manager = Arc::clone(self);

        Some(tokio::spawn(async move {
            while let Some(item) = events.next().await {
                match item {
                    Ok(event) => {
                        if let Err(e) = manager.handle_auth_event(event).await {
                            tracing::warn!(error = %e, "Failed to apply auth event");
                        }
                    }
                    Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Auth event listener lagged");
                    }
                }
            }
            tracing::debug!("Auth event stream closed");
        }))
    }
}
