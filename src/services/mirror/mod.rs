//! Domain State Mirror
//!
//! In-process cached copies of the tutor-scoped collections. Every mutation is
//! applied to the cache first and unconditionally; in live mode the change is
//! then persisted on a best-effort basis. A failed persist is logged and counted
//! but never rolls back the local change: the cache stays authoritative for the
//! rest of the session.
//!
//! Lock guards are never held across an `.await`.

use chrono::{NaiveDate, NaiveTime, Utc};
use parking_lot::RwLock;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;

use crate::config::RewardConfig;
use crate::demo::DemoDataset;
use crate::error::{AppError, Result};
use crate::models::{
    Assessment, ChatMessage, GradeUpdate, LessonStatus, Notification, ParentProfile,
    PointAdjustment, ProgressSnapshot, Purchase, Resource, ScheduleEvent, ShopItem,
    StudentProfile,
};
use crate::observability::SyncMetrics;
use crate::services::rewards::{self, SessionReward};
use crate::storage::remote::{Filter, RemoteStore, Table};
use crate::storage::repository::{Repository, TableRepository};


/// Where mutations are persisted.
#[derive(Clone, Default)]
pub enum DataSource {
    /// Seeded in-memory data only.
    #[default]
    Demo,
    /// Best-effort persistence through the remote store.
    Live(Arc<dyn RemoteStore>),
}

/// The cached collections.
#[derive(Debug, Clone, Default)]
pub struct MirrorState {
    pub students: Vec<StudentProfile>,
    pub parents: Vec<ParentProfile>,
    pub resources: Vec<Resource>,
    pub assessments: Vec<Assessment>,
    pub lessons: Vec<ScheduleEvent>,
    pub messages: Vec<ChatMessage>,
    pub notifications: Vec<Notification>,
    pub shop_items: Vec<ShopItem>,
    pub purchases: Vec<Purchase>,
    pub progress_history: Vec<ProgressSnapshot>,
}

impl MirrorState {
    fn from_demo(data: &DemoDataset) -> Self {
        Self {
            students: data.students.clone(),
            parents: data.parents.clone(),
            resources: data.resources.clone(),
            assessments: data.assessments.clone(),
            lessons: data.lessons.clone(),
            messages: data.messages.clone(),
            notifications: data.notifications.clone(),
            shop_items: data.shop_items.clone(),
            purchases: Vec::new(),
            progress_history: Vec::new(),
        }
    }

    fn student_mut(&mut self, id: &str) -> Option<&mut StudentProfile> {
        self.students.iter_mut().find(|s| s.id == id)
    }

    fn parent_mut(&mut self, id: &str) -> Option<&mut ParentProfile> {
        self.parents.iter_mut().find(|p| p.id == id)
    }

    fn notify(&mut self, user_id: &str, title: &str, body: String) -> Notification {
        let notification = Notification::new(user_id, title, &body);
        self.notifications.push(notification.clone());
        notification
    }

    /// Recompute a student's progress from its full assessment history.
    ///
    /// Leaves progress untouched (and records nothing) when there is no history.
    fn recompute_progress(&mut self, student_id: &str) -> Option<ProgressSnapshot> {
        let history: Vec<&Assessment> = self
            .assessments
            .iter()
            .filter(|a| a.student_id == student_id)
            .collect();
        let count = history.len();
        let progress = rewards::recompute_progress(history)?;

        let student = self.student_mut(student_id)?;
        student.stats.progress = progress;
        let snapshot = ProgressSnapshot::new(student_id, progress, count);
        self.progress_history.push(snapshot.clone());
        Some(snapshot)
    }
}

/// Result of recording or regrading an assessment.
#[derive(Debug, Clone, PartialEq)]
pub struct AssessmentOutcome {
    pub assessment: Assessment,
    pub points_awarded: u32,
    pub progress: Option<u8>,
}

/// Result of a lesson status change.
#[derive(Debug, Clone, PartialEq)]
pub struct LessonOutcome {
    pub lesson: ScheduleEvent,
    /// Present only on the transition into `Completed`.
    pub reward: Option<SessionReward>,
}

/// Per-collection outcome of a bulk load.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RefreshReport {
    pub loaded: Vec<Table>,
    pub failed: Vec<(Table, String)>,
}

impl RefreshReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Cached, locally mutable projections of the remote collections.
pub struct DomainMirror {
    state: RwLock<MirrorState>,
    source: RwLock<DataSource>,
    rules: RewardConfig,
    metrics: SyncMetrics,
}

impl DomainMirror {
    pub fn new(rules: RewardConfig, metrics: SyncMetrics) -> Self {
        Self {
            state: RwLock::new(MirrorState::default()),
            source: RwLock::new(DataSource::Demo),
            rules,
            metrics,
        }
    }

    pub fn rules(&self) -> &RewardConfig {
        &self.rules
    }

    pub fn metrics(&self) -> &SyncMetrics {
        &self.metrics
    }

    // ===== Lifecycle =====

    /// Replace every collection with the seeded demo values.
    pub fn reset_demo(&self, data: &DemoDataset) {
        *self.source.write() = DataSource::Demo;
        let mut state = MirrorState::from_demo(data);
        self.settle_awards(&mut state.assessments);
        *self.state.write() = state;
        tracing::debug!("Mirror reset to demo dataset");
    }

    // Rows written before awards were tracked count as having paid their tier.
    fn settle_awards(&self, assessments: &mut [Assessment]) {
        for a in assessments {
            let tier = rewards::assessment_points(a.score, a.max_score, &self.rules.tiers);
            a.awarded_points = a.awarded_points.max(tier);
        }
    }

    /// Empty every collection and persist future mutations to `store`.
    pub fn reset_live(&self, store: Arc<dyn RemoteStore>) {
        *self.source.write() = DataSource::Live(store);
        *self.state.write() = MirrorState::default();
        tracing::debug!("Mirror reset to empty live state");
    }

    /// Empty every collection, keeping the current data source.
    pub fn clear(&self) {
        *self.state.write() = MirrorState::default();
    }

    pub fn is_live(&self) -> bool {
        matches!(*self.source.read(), DataSource::Live(_))
    }

    pub fn snapshot(&self) -> MirrorState {
        self.state.read().clone()
    }

    fn remote(&self) -> Option<Arc<dyn RemoteStore>> {
        match &*self.source.read() {
            DataSource::Live(store) => Some(store.clone()),
            DataSource::Demo => None,
        }
    }

    // ===== Persistence (best effort) =====

    fn record_persist(&self, operation: &str, result: Result<()>) {
        match result {
            Ok(()) => {
                self.metrics.record_persist(true);
                tracing::debug!(operation, "Persisted change");
            }
            Err(e) => {
                self.metrics.record_persist(false);
                tracing::error!(operation, error = %e, "Failed to persist change, keeping local state");
            }
        }
    }

    async fn persist_insert<T>(&self, operation: &str, table: Table, entity: &T)
    where
        T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
    {
        let Some(store) = self.remote() else {
            return;
        };
        let repo = TableRepository::<T>::new(store, table);
        let result = repo.create(entity).await.map(|_| ());
        self.record_persist(operation, result);
    }

    async fn persist_update<T>(&self, operation: &str, table: Table, id: &str, entity: &T)
    where
        T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
    {
        let Some(store) = self.remote() else {
            return;
        };
        let repo = TableRepository::<T>::new(store, table);
        let result = match repo.update(id, entity).await {
            Ok(Some(_)) => Ok(()),
            Ok(None) => Err(AppError::NotFound(format!("{} row {}", table, id))),
            Err(e) => Err(e),
        };
        self.record_persist(operation, result);
    }

    async fn persist_delete<T>(&self, operation: &str, table: Table, id: &str)
    where
        T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
    {
        let Some(store) = self.remote() else {
            return;
        };
        let repo = TableRepository::<T>::new(store, table);
        let result = repo.delete(id).await.map(|_| ());
        self.record_persist(operation, result);
    }

    // ===== Bulk load =====

    async fn load<T>(&self, store: &Arc<dyn RemoteStore>, table: Table, filters: &[Filter]) -> Result<Vec<T>>
    where
        T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
    {
        TableRepository::<T>::new(store.clone(), table)
            .list_where(filters)
            .await
    }

    /// Accept a loaded collection, or keep the prior cached value on failure.
    fn accept<T>(&self, report: &mut RefreshReport, table: Table, result: Result<Vec<T>>) -> Option<Vec<T>> {
        match result {
            Ok(rows) => {
                self.metrics.record_load(true);
                report.loaded.push(table);
                Some(rows)
            }
            Err(e) => {
                self.metrics.record_load(false);
                tracing::warn!(table = %table, error = %e, "Failed to load collection, keeping cached value");
                report.failed.push((table, e.to_string()));
                None
            }
        }
    }

    /// Load every tutor-scoped collection from the remote store.
    ///
    /// Independent collections are fetched concurrently; those keyed by the
    /// roster (parents, purchases, progress history) follow once students are
    /// known. A failure leaves that collection at its prior cached value.
    pub async fn refresh_data(&self, tutor_id: &str) -> RefreshReport {
        let mut report = RefreshReport::default();
        let Some(store) = self.remote() else {
            tracing::debug!("Demo mode, nothing to refresh");
            return report;
        };
        tracing::info!(tutor_id, "Refreshing tutor data");

        let by_tutor = [Filter::eq("tutor_id", tutor_id)];
        let sent_by = [Filter::eq("sender_id", tutor_id)];
        let sent_to = [Filter::eq("receiver_id", tutor_id)];
        let own = [Filter::eq("user_id", tutor_id)];

        let (students, resources, assessments, lessons, sent, received, notifications, shop_items) = tokio::join!(
            self.load::<StudentProfile>(&store, Table::Students, &by_tutor),
            self.load::<Resource>(&store, Table::Resources, &by_tutor),
            self.load::<Assessment>(&store, Table::Assessments, &by_tutor),
            self.load::<ScheduleEvent>(&store, Table::Lessons, &by_tutor),
            self.load::<ChatMessage>(&store, Table::Messages, &sent_by),
            self.load::<ChatMessage>(&store, Table::Messages, &sent_to),
            self.load::<Notification>(&store, Table::Notifications, &own),
            self.load::<ShopItem>(&store, Table::ShopItems, &[]),
        );

        let messages = match (sent, received) {
            (Ok(mut sent), Ok(received)) => {
                let seen: HashSet<String> = sent.iter().map(|m| m.id.clone()).collect();
                sent.extend(received.into_iter().filter(|m| !seen.contains(&m.id)));
                sent.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
                Ok(sent)
            }
            (Err(e), _) | (_, Err(e)) => Err(e),
        };

        let students = self.accept(&mut report, Table::Students, students);
        let resources = self.accept(&mut report, Table::Resources, resources);
        let assessments = self
            .accept(&mut report, Table::Assessments, assessments)
            .map(|mut rows| {
                self.settle_awards(&mut rows);
                rows
            });
        let lessons = self.accept(&mut report, Table::Lessons, lessons);
        let messages = self.accept(&mut report, Table::Messages, messages);
        let notifications = self.accept(&mut report, Table::Notifications, notifications);
        let shop_items = self.accept(&mut report, Table::ShopItems, shop_items);

        let (student_ids, parent_ids) = {
            let mut state = self.state.write();
            if let Some(v) = students {
                state.students = v;
            }
            if let Some(v) = resources {
                state.resources = v;
            }
            if let Some(v) = assessments {
                state.assessments = v;
            }
            if let Some(v) = lessons {
                state.lessons = v;
            }
            if let Some(v) = messages {
                state.messages = v;
            }
            if let Some(v) = notifications {
                state.notifications = v;
            }
            if let Some(v) = shop_items {
                state.shop_items = v;
            }
            let student_ids: Vec<String> = state.students.iter().map(|s| s.id.clone()).collect();
            let parent_ids: Vec<String> = state
                .students
                .iter()
                .filter_map(|s| s.parent_id.clone())
                .collect::<HashSet<_>>()
                .into_iter()
                .collect();
            (student_ids, parent_ids)
        };

        let parent_filter = [Filter::is_in("id", parent_ids.clone())];
        let roster_filter = [Filter::is_in("student_id", student_ids.clone())];
        let (parents, purchases, progress_history) = tokio::join!(
            async {
                if parent_ids.is_empty() {
                    return Ok(Vec::new());
                }
                self.load::<ParentProfile>(&store, Table::Parents, &parent_filter).await
            },
            async {
                if student_ids.is_empty() {
                    return Ok(Vec::new());
                }
                self.load::<Purchase>(&store, Table::StudentPurchases, &roster_filter).await
            },
            async {
                if student_ids.is_empty() {
                    return Ok(Vec::new());
                }
                self.load::<ProgressSnapshot>(&store, Table::ProgressHistory, &roster_filter).await
            },
        );

        let parents = self.accept(&mut report, Table::Parents, parents);
        let purchases = self.accept(&mut report, Table::StudentPurchases, purchases);
        let progress_history = self.accept(&mut report, Table::ProgressHistory, progress_history);
        {
            let mut state = self.state.write();
            if let Some(v) = parents {
                state.parents = v;
            }
            if let Some(v) = purchases {
                state.purchases = v;
            }
            if let Some(v) = progress_history {
                state.progress_history = v;
            }
        }

        tracing::info!(
            loaded = report.loaded.len(),
            failed = report.failed.len(),
            "Tutor data refresh finished"
        );
        report
    }

    // ===== Read accessors =====

    pub fn students(&self) -> Vec<StudentProfile> {
        self.state.read().students.clone()
    }

    pub fn student(&self, id: &str) -> Option<StudentProfile> {
        self.state.read().students.iter().find(|s| s.id == id).cloned()
    }

    pub fn students_for_tutor(&self, tutor_id: &str) -> Vec<StudentProfile> {
        self.state
            .read()
            .students
            .iter()
            .filter(|s| s.tutor_id == tutor_id)
            .cloned()
            .collect()
    }

    pub fn parents(&self) -> Vec<ParentProfile> {
        self.state.read().parents.clone()
    }

    pub fn parent(&self, id: &str) -> Option<ParentProfile> {
        self.state.read().parents.iter().find(|p| p.id == id).cloned()
    }

    /// Students linked to a parent from either side of the relation.
    pub fn children_of(&self, parent_id: &str) -> Vec<StudentProfile> {
        let state = self.state.read();
        let listed = state
            .parents
            .iter()
            .find(|p| p.id == parent_id)
            .map(|p| p.children_ids.clone())
            .unwrap_or_default();
        state
            .students
            .iter()
            .filter(|s| s.parent_id.as_deref() == Some(parent_id) || listed.contains(&s.id))
            .cloned()
            .collect()
    }

    pub fn resources(&self) -> Vec<Resource> {
        self.state.read().resources.clone()
    }

    pub fn resources_for_student(&self, student_id: &str) -> Vec<Resource> {
        let state = self.state.read();
        let tutor_id = state
            .students
            .iter()
            .find(|s| s.id == student_id)
            .map(|s| s.tutor_id.clone())
            .unwrap_or_default();
        state
            .resources
            .iter()
            .filter(|r| r.is_visible_to(student_id, &tutor_id))
            .cloned()
            .collect()
    }

    pub fn assessments(&self) -> Vec<Assessment> {
        self.state.read().assessments.clone()
    }

    pub fn assessments_for_student(&self, student_id: &str) -> Vec<Assessment> {
        self.state
            .read()
            .assessments
            .iter()
            .filter(|a| a.student_id == student_id)
            .cloned()
            .collect()
    }

    pub fn lessons(&self) -> Vec<ScheduleEvent> {
        self.state.read().lessons.clone()
    }

    pub fn lessons_for_student(&self, student_id: &str) -> Vec<ScheduleEvent> {
        self.state
            .read()
            .lessons
            .iter()
            .filter(|l| l.student_id == student_id)
            .cloned()
            .collect()
    }

    /// Scheduled lessons on or after `from`, earliest first.
    pub fn upcoming_lessons(&self, student_id: &str, from: NaiveDate) -> Vec<ScheduleEvent> {
        let mut upcoming: Vec<ScheduleEvent> = self
            .state
            .read()
            .lessons
            .iter()
            .filter(|l| {
                l.student_id == student_id && l.status == LessonStatus::Scheduled && l.date >= from
            })
            .cloned()
            .collect();
        upcoming.sort_by_key(|l| (l.date, l.start_time));
        upcoming
    }

    /// Messages exchanged between two identities, oldest first.
    ///
    /// Argument order does not matter; equal timestamps keep insertion order.
    pub fn messages_between(&self, a: &str, b: &str) -> Vec<ChatMessage> {
        let mut conversation: Vec<ChatMessage> = self
            .state
            .read()
            .messages
            .iter()
            .filter(|m| m.is_between(a, b))
            .cloned()
            .collect();
        conversation.sort_by(|x, y| x.timestamp.cmp(&y.timestamp));
        conversation
    }

    pub fn notifications_for(&self, user_id: &str) -> Vec<Notification> {
        self.state
            .read()
            .notifications
            .iter()
            .filter(|n| n.user_id == user_id)
            .cloned()
            .collect()
    }

    pub fn unread_notification_count(&self, user_id: &str) -> usize {
        self.state
            .read()
            .notifications
            .iter()
            .filter(|n| n.user_id == user_id && !n.read)
            .count()
    }

    pub fn shop_items(&self) -> Vec<ShopItem> {
        self.state.read().shop_items.clone()
    }

    pub fn purchases_for(&self, student_id: &str) -> Vec<Purchase> {
        self.state
            .read()
            .purchases
            .iter()
            .filter(|p| p.student_id == student_id)
            .cloned()
            .collect()
    }

    pub fn progress_history_for(&self, student_id: &str) -> Vec<ProgressSnapshot> {
        self.state
            .read()
            .progress_history
            .iter()
            .filter(|p| p.student_id == student_id)
            .cloned()
            .collect()
    }

    // ===== Local-only cache writes =====

    /// Insert or replace a student without persisting. Keeps the parent link.
    pub fn cache_student(&self, student: StudentProfile) {
        let mut state = self.state.write();
        if let Some(parent_id) = student.parent_id.clone() {
            if let Some(parent) = state.parent_mut(&parent_id) {
                parent.children_ids.insert(student.id.clone());
            }
        }
        match state.students.iter_mut().find(|s| s.id == student.id) {
            Some(existing) => *existing = student,
            None => state.students.push(student),
        }
    }

    /// Insert or replace a parent without persisting. Keeps child links.
    pub fn cache_parent(&self, parent: ParentProfile) {
        let mut state = self.state.write();
        for child_id in &parent.children_ids {
            if let Some(child) = state.student_mut(child_id) {
                child.parent_id = Some(parent.id.clone());
            }
        }
        match state.parents.iter_mut().find(|p| p.id == parent.id) {
            Some(existing) => *existing = parent,
            None => state.parents.push(parent),
        }
    }

    // ===== Students & parents =====

    pub async fn add_student(&self, student: StudentProfile) -> StudentProfile {
        let parent = {
            self.cache_student(student.clone());
            student
                .parent_id
                .as_deref()
                .and_then(|id| self.parent(id))
        };
        self.persist_insert("add_student", Table::Students, &student).await;
        if let Some(parent) = parent {
            self.persist_update("link_parent", Table::Parents, &parent.id, &parent).await;
        }
        student
    }

    pub async fn update_student(&self, student: StudentProfile) -> Result<StudentProfile> {
        {
            let mut state = self.state.write();
            let existing = state
                .student_mut(&student.id)
                .ok_or_else(|| AppError::NotFound(format!("student {}", student.id)))?;
            *existing = student.clone();
        }
        self.persist_update("update_student", Table::Students, &student.id, &student)
            .await;
        Ok(student)
    }

    pub async fn add_parent(&self, parent: ParentProfile) -> ParentProfile {
        let children = {
            self.cache_parent(parent.clone());
            let state = self.state.read();
            state
                .students
                .iter()
                .filter(|s| parent.children_ids.contains(&s.id))
                .cloned()
                .collect::<Vec<_>>()
        };
        self.persist_insert("add_parent", Table::Parents, &parent).await;
        for child in &children {
            self.persist_update("link_child", Table::Students, &child.id, child).await;
        }
        parent
    }

    pub async fn update_parent(&self, parent: ParentProfile) -> Result<ParentProfile> {
        {
            let mut state = self.state.write();
            let existing = state
                .parent_mut(&parent.id)
                .ok_or_else(|| AppError::NotFound(format!("parent {}", parent.id)))?;
            *existing = parent.clone();
        }
        self.persist_update("update_parent", Table::Parents, &parent.id, &parent)
            .await;
        Ok(parent)
    }

    // ===== Resources =====

    pub async fn add_resource(&self, resource: Resource) -> Resource {
        self.state.write().resources.push(resource.clone());
        self.persist_insert("add_resource", Table::Resources, &resource).await;
        resource
    }

    pub async fn update_resource(&self, resource: Resource) -> Result<Resource> {
        {
            let mut state = self.state.write();
            let existing = state
                .resources
                .iter_mut()
                .find(|r| r.id == resource.id)
                .ok_or_else(|| AppError::NotFound(format!("resource {}", resource.id)))?;
            *existing = resource.clone();
        }
        self.persist_update("update_resource", Table::Resources, &resource.id, &resource)
            .await;
        Ok(resource)
    }

    pub async fn delete_resource(&self, id: &str) -> Result<()> {
        {
            let mut state = self.state.write();
            let before = state.resources.len();
            state.resources.retain(|r| r.id != id);
            if state.resources.len() == before {
                return Err(AppError::NotFound(format!("resource {}", id)));
            }
        }
        self.persist_delete::<Resource>("delete_resource", Table::Resources, id)
            .await;
        Ok(())
    }

    // ===== Assessments =====

    /// Record an assessment, award tiered points and recompute progress.
    pub async fn add_assessment(&self, mut assessment: Assessment) -> AssessmentOutcome {
        let points = rewards::assessment_points(
            assessment.score,
            assessment.max_score,
            &self.rules.tiers,
        );

        let (student, snapshot, notification, awarded) = {
            let mut state = self.state.write();
            let awarded = match state.student_mut(&assessment.student_id) {
                Some(student) => {
                    student.points = student.points.saturating_add(points);
                    points
                }
                None => {
                    tracing::warn!(
                        student_id = %assessment.student_id,
                        "Assessment recorded for a student missing from the cache, no points awarded"
                    );
                    0
                }
            };
            assessment.awarded_points = awarded;
            state.assessments.push(assessment.clone());

            let snapshot = state.recompute_progress(&assessment.student_id);
            let notification = (awarded > 0).then(|| {
                state.notify(
                    &assessment.student_id,
                    "Points earned",
                    format!("You earned {} points for {}.", awarded, assessment.subject),
                )
            });
            let student = state
                .students
                .iter()
                .find(|s| s.id == assessment.student_id)
                .cloned();
            (student, snapshot, notification, awarded)
        };

        self.persist_insert("add_assessment", Table::Assessments, &assessment)
            .await;
        self.persist_reward_effects(student.as_ref(), snapshot.as_ref(), notification.as_ref())
            .await;

        AssessmentOutcome {
            progress: student.map(|s| s.stats.progress),
            assessment,
            points_awarded: awarded,
        }
    }

    /// Regrade an assessment.
    ///
    /// Only the part of the new tier award above what this assessment already
    /// paid is granted; a lower grade never takes points back.
    pub async fn update_assessment(&self, id: &str, update: GradeUpdate) -> Result<AssessmentOutcome> {
        let (assessment, student, snapshot, notification, awarded) = {
            let mut state = self.state.write();
            let index = state
                .assessments
                .iter()
                .position(|a| a.id == id)
                .ok_or_else(|| AppError::NotFound(format!("assessment {}", id)))?;

            let existing = &mut state.assessments[index];
            update.apply(existing);
            let (delta, paid) = rewards::regrade_award(
                existing.awarded_points,
                existing.score,
                existing.max_score,
                &self.rules.tiers,
            );
            let student_id = existing.student_id.clone();

            let paid_out = match state.student_mut(&student_id) {
                Some(student) => {
                    student.points = student.points.saturating_add(delta);
                    true
                }
                None => false,
            };
            let awarded = if paid_out {
                state.assessments[index].awarded_points = paid;
                delta
            } else {
                0
            };
            let assessment = state.assessments[index].clone();
            let snapshot = state.recompute_progress(&assessment.student_id);
            let notification = (awarded > 0).then(|| {
                state.notify(
                    &assessment.student_id,
                    "Points earned",
                    format!("Your {} grade improved: +{} points.", assessment.subject, awarded),
                )
            });
            let student = state
                .students
                .iter()
                .find(|s| s.id == assessment.student_id)
                .cloned();
            (assessment, student, snapshot, notification, awarded)
        };

        self.persist_update("update_assessment", Table::Assessments, id, &assessment)
            .await;
        self.persist_reward_effects(student.as_ref(), snapshot.as_ref(), notification.as_ref())
            .await;

        Ok(AssessmentOutcome {
            progress: student.map(|s| s.stats.progress),
            assessment,
            points_awarded: awarded,
        })
    }

    async fn persist_reward_effects(
        &self,
        student: Option<&StudentProfile>,
        snapshot: Option<&ProgressSnapshot>,
        notification: Option<&Notification>,
    ) {
        if let Some(student) = student {
            self.persist_update("update_student_rewards", Table::Students, &student.id, student)
                .await;
        }
        if let Some(snapshot) = snapshot {
            self.persist_insert("record_progress", Table::ProgressHistory, snapshot)
                .await;
        }
        if let Some(notification) = notification {
            self.persist_insert("notify", Table::Notifications, notification)
                .await;
        }
    }

    // ===== Lessons =====

    pub async fn add_lesson(&self, lesson: ScheduleEvent) -> ScheduleEvent {
        self.state.write().lessons.push(lesson.clone());
        self.persist_insert("add_lesson", Table::Lessons, &lesson).await;
        lesson
    }

    pub async fn reschedule_lesson(
        &self,
        id: &str,
        date: NaiveDate,
        start_time: NaiveTime,
        end_time: NaiveTime,
    ) -> Result<ScheduleEvent> {
        if end_time <= start_time {
            return Err(AppError::Validation("lesson must end after it starts".into()));
        }
        let lesson = {
            let mut state = self.state.write();
            let lesson = state
                .lessons
                .iter_mut()
                .find(|l| l.id == id)
                .ok_or_else(|| AppError::NotFound(format!("lesson {}", id)))?;
            if lesson.status == LessonStatus::Completed {
                return Err(AppError::Validation("completed lessons cannot be rescheduled".into()));
            }
            lesson.date = date;
            lesson.start_time = start_time;
            lesson.end_time = end_time;
            lesson.status = LessonStatus::Scheduled;
            lesson.clone()
        };
        self.persist_update("reschedule_lesson", Table::Lessons, id, &lesson)
            .await;
        Ok(lesson)
    }

    /// Change a lesson's status.
    ///
    /// The transition into `Completed` runs the streak and points side effect;
    /// `Completed` is terminal, so the side effect happens exactly once.
    pub async fn set_lesson_status(&self, id: &str, status: LessonStatus) -> Result<LessonOutcome> {
        let (lesson, reward, student, notification) = {
            let mut state = self.state.write();
            let lesson = state
                .lessons
                .iter_mut()
                .find(|l| l.id == id)
                .ok_or_else(|| AppError::NotFound(format!("lesson {}", id)))?;

            if !lesson.status.can_transition_to(status) {
                return Err(AppError::Validation(format!(
                    "lesson {} is already completed",
                    id
                )));
            }
            let completing = status == LessonStatus::Completed && lesson.status != LessonStatus::Completed;
            if lesson.status == status {
                return Ok(LessonOutcome {
                    lesson: lesson.clone(),
                    reward: None,
                });
            }
            lesson.status = status;
            let lesson = lesson.clone();

            let mut reward = None;
            let mut notification = None;
            if completing {
                match state.student_mut(&lesson.student_id) {
                    Some(student) => {
                        let r = rewards::session_reward(student.stats.current_streak, &self.rules);
                        student.stats.current_streak = r.new_streak;
                        student.stats.longest_streak = student.stats.longest_streak.max(r.new_streak);
                        student.stats.sessions_completed += 1;
                        student.points = student.points.saturating_add(r.total());
                        if r.hit_milestone() {
                            student.stats.bonuses.push(PointAdjustment {
                                points: r.streak_bonus,
                                reason: format!("{}-session streak", r.new_streak),
                                recorded_at: Utc::now(),
                            });
                        }
                        reward = Some(r);
                    }
                    None => tracing::warn!(
                        student_id = %lesson.student_id,
                        "Completed lesson for a student missing from the cache, no reward"
                    ),
                }
                if let Some(r) = reward {
                    let body = if r.hit_milestone() {
                        format!(
                            "Lesson complete: +{} points, plus a {}-session streak bonus of {}!",
                            r.base_points, r.new_streak, r.streak_bonus
                        )
                    } else {
                        format!("Lesson complete: +{} points.", r.base_points)
                    };
                    notification = Some(state.notify(&lesson.student_id, "Lesson complete", body));
                }
            }
            let student = reward.and_then(|_| {
                state
                    .students
                    .iter()
                    .find(|s| s.id == lesson.student_id)
                    .cloned()
            });
            (lesson, reward, student, notification)
        };

        self.persist_update("set_lesson_status", Table::Lessons, id, &lesson)
            .await;
        self.persist_reward_effects(student.as_ref(), None, notification.as_ref())
            .await;

        Ok(LessonOutcome { lesson, reward })
    }

    // ===== Messages & notifications =====

    pub async fn send_message(&self, sender_id: &str, receiver_id: &str, content: &str) -> Result<ChatMessage> {
        let content = content.trim();
        if content.is_empty() {
            return Err(AppError::Validation("message cannot be empty".into()));
        }
        let message = ChatMessage::new(sender_id, receiver_id, content);
        self.state.write().messages.push(message.clone());
        self.persist_insert("send_message", Table::Messages, &message).await;
        Ok(message)
    }

    /// Mark every unread message from `other_id` to `reader_id` as read.
    pub async fn mark_conversation_read(&self, reader_id: &str, other_id: &str) -> usize {
        let marked = {
            let mut state = self.state.write();
            let mut marked = 0;
            for message in state
                .messages
                .iter_mut()
                .filter(|m| m.receiver_id == reader_id && m.sender_id == other_id && !m.read)
            {
                message.read = true;
                marked += 1;
            }
            marked
        };
        if marked == 0 {
            return 0;
        }

        if let Some(store) = self.remote() {
            let result = store
                .update(
                    Table::Messages,
                    &[
                        Filter::eq("sender_id", other_id),
                        Filter::eq("receiver_id", reader_id),
                    ],
                    json!({ "read": true }),
                )
                .await
                .map(|_| ());
            self.record_persist("mark_conversation_read", result);
        }
        marked
    }

    pub async fn add_notification(&self, notification: Notification) -> Notification {
        self.state.write().notifications.push(notification.clone());
        self.persist_insert("add_notification", Table::Notifications, &notification)
            .await;
        notification
    }

    pub async fn mark_notification_read(&self, id: &str) -> Result<()> {
        let notification = {
            let mut state = self.state.write();
            let notification = state
                .notifications
                .iter_mut()
                .find(|n| n.id == id)
                .ok_or_else(|| AppError::NotFound(format!("notification {}", id)))?;
            notification.read = true;
            notification.clone()
        };
        self.persist_update("mark_notification_read", Table::Notifications, id, &notification)
            .await;
        Ok(())
    }

    // ===== Shop & rewards =====

    /// Buy a shop item with points.
    ///
    /// The deduction and the unlock happen under one write lock. Items already
    /// unlocked are rejected without touching points.
    pub async fn purchase_item(&self, student_id: &str, item_id: &str) -> Result<Purchase> {
        let (purchase, student) = {
            let mut state = self.state.write();
            let item = state
                .shop_items
                .iter()
                .find(|i| i.id == item_id)
                .cloned()
                .ok_or_else(|| AppError::NotFound(format!("shop item {}", item_id)))?;
            let student = state
                .student_mut(student_id)
                .ok_or_else(|| AppError::NotFound(format!("student {}", student_id)))?;

            if student.has_unlocked(&item.id) {
                return Err(AppError::Validation(format!("{} is already unlocked", item.name)));
            }
            if student.points < item.cost {
                return Err(AppError::Validation(format!(
                    "{} costs {} points but only {} are available",
                    item.name, item.cost, student.points
                )));
            }

            student.points -= item.cost;
            student.avatar.unlocked_items.insert(item.id.clone());
            student.inventory.push(item.id.clone());
            let student = student.clone();

            let purchase = Purchase::new(student_id, &item);
            state.purchases.push(purchase.clone());
            (purchase, student)
        };

        tracing::info!(student_id, item_id, cost = purchase.cost, "Shop purchase");
        self.persist_update("purchase_item", Table::Students, student_id, &student)
            .await;
        self.persist_insert("record_purchase", Table::StudentPurchases, &purchase)
            .await;
        Ok(purchase)
    }

    /// Equip an unlocked item in the slot for its category.
    pub async fn equip_item(&self, student_id: &str, item_id: &str) -> Result<StudentProfile> {
        let student = {
            let mut state = self.state.write();
            let slot = state
                .shop_items
                .iter()
                .find(|i| i.id == item_id)
                .map(|i| i.category.slot())
                .ok_or_else(|| AppError::NotFound(format!("shop item {}", item_id)))?;
            let student = state
                .student_mut(student_id)
                .ok_or_else(|| AppError::NotFound(format!("student {}", student_id)))?;
            if !student.has_unlocked(item_id) {
                return Err(AppError::Validation(format!("{} has not been unlocked", item_id)));
            }
            student
                .avatar
                .equipped
                .insert(slot.to_string(), item_id.to_string());
            student.clone()
        };
        self.persist_update("equip_item", Table::Students, student_id, &student)
            .await;
        Ok(student)
    }

    /// Grant bonus points with a reason.
    pub async fn award_bonus(&self, student_id: &str, points: u32, reason: &str) -> Result<StudentProfile> {
        if points == 0 {
            return Err(AppError::Validation("bonus must be at least one point".into()));
        }
        let (student, notification) = {
            let mut state = self.state.write();
            let student = state
                .student_mut(student_id)
                .ok_or_else(|| AppError::NotFound(format!("student {}", student_id)))?;
            student.points = student.points.saturating_add(points);
            student.stats.bonuses.push(PointAdjustment {
                points,
                reason: reason.to_string(),
                recorded_at: Utc::now(),
            });
            let student = student.clone();
            let notification = state.notify(
                student_id,
                "Bonus points",
                format!("+{} points: {}", points, reason),
            );
            (student, notification)
        };
        self.persist_reward_effects(Some(&student), None, Some(&notification))
            .await;
        Ok(student)
    }

    /// Record a penalty.
    ///
    /// Points are never deducted here (only purchases spend points); the
    /// penalty is kept in history and the current streak is reset.
    pub async fn apply_penalty(&self, student_id: &str, points: u32, reason: &str) -> Result<StudentProfile> {
        let student = {
            let mut state = self.state.write();
            let student = state
                .student_mut(student_id)
                .ok_or_else(|| AppError::NotFound(format!("student {}", student_id)))?;
            student.stats.penalties.push(PointAdjustment {
                points,
                reason: reason.to_string(),
                recorded_at: Utc::now(),
            });
            student.stats.current_streak = 0;
            student.clone()
        };
        self.persist_update("apply_penalty", Table::Students, student_id, &student)
            .await;
        Ok(student)
    }
}
