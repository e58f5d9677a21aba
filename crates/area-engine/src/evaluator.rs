// SPDX-FileCopyrightText: 2026 Area Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! One evaluation of one Area.
//!
//! Sequence: take the lease, poll the action, run the reaction once per new
//! matching event, then commit deliveries, watermark, and timestamps in one
//! transaction. If the sequence aborts after reactions ran (lost lease,
//! failed commit) the deliveries made so far are still recorded, so an event
//! fires at most once. Failures count towards suspension and release the
//! lease.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use area_core::{
    AreaError, AreaStatus, DeliveryStatus, ErrorClass, Params, PollContext, ReactionContext,
    TriggerEvent,
};
use area_registry::{ServiceDef, ServiceRegistry};
use area_storage::queries::areas::{self, EvaluationCommit};
use area_storage::queries::{accounts, deliveries};
use area_storage::{Area, Database, DeliveryRecord};
use area_vault::CredentialVault;
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, error, info, warn};

use crate::settings::EngineSettings;
use crate::template;

/// What an evaluation did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Evaluation {
    /// Another owner holds the lease, the Area is no longer active, or its
    /// interval has not elapsed.
    Skipped,
    /// Polled without new matching events.
    Quiet,
    Fired {
        delivered: usize,
        pending: usize,
        failed: usize,
    },
    /// The evaluation failed before committing; the Area is now in `status`.
    Failed { error: String, status: Option<AreaStatus> },
}

/// Reactions run for one batch of events.
#[derive(Debug)]
struct Batch {
    records: Vec<DeliveryRecord>,
    /// Why the batch stopped before its last event.
    aborted: Option<AreaError>,
}

/// Counts from one delivery retry sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryStats {
    pub attempted: usize,
    pub delivered: usize,
    pub rescheduled: usize,
    pub failed: usize,
}

pub(crate) fn chrono_duration(d: Duration) -> chrono::Duration {
    chrono::Duration::from_std(d).unwrap_or_else(|_| chrono::Duration::days(36_500))
}

/// Run a provider call under the configured bound. Elapsing is transient.
async fn bounded<T>(limit: Duration, call: impl Future<Output = Result<T, AreaError>>) -> Result<T, AreaError> {
    tokio::time::timeout(limit, call)
        .await
        .map_err(|_| AreaError::Timeout { duration: limit })?
}

/// Evaluates Areas and retries their pending deliveries.
pub struct Evaluator {
    db: Database,
    vault: Arc<CredentialVault>,
    registry: Arc<ServiceRegistry>,
    settings: EngineSettings,
}

impl std::fmt::Debug for Evaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Evaluator")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl Evaluator {
    pub fn new(
        db: Database,
        vault: Arc<CredentialVault>,
        registry: Arc<ServiceRegistry>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            db,
            vault,
            registry,
            settings,
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Evaluate one Area as lease holder `owner`.
    ///
    /// Per-Area failures are recorded and reported in the result; only
    /// storage failures while recording them surface as `Err`.
    pub async fn evaluate(&self, area_id: i64, owner: &str, now: DateTime<Utc>) -> Result<Evaluation, AreaError> {
        let lease_until = now + chrono_duration(self.settings.lease_ttl);
        if !areas::acquire_lease(&self.db, area_id, owner, now, lease_until).await? {
            debug!(area_id, "area leased elsewhere or inactive, skipping");
            return Ok(Evaluation::Skipped);
        }
        let Some(area) = areas::get_area(&self.db, area_id).await? else {
            return Ok(Evaluation::Skipped);
        };

        match self.run(&area, owner, now).await {
            Ok(evaluation) => Ok(evaluation),
            Err(err) => self.fail(&area, owner, err, now).await,
        }
    }

    async fn run(&self, area: &Area, owner: &str, now: DateTime<Utc>) -> Result<Evaluation, AreaError> {
        let (service, action) = self
            .registry
            .action(area.action_id)
            .ok_or_else(|| AreaError::InvariantViolation(format!("unknown action {}", area.action_id)))?;
        let poller = self
            .registry
            .poller(area.action_id)
            .ok_or_else(|| AreaError::InvariantViolation(format!("no poller for action {}", area.action_id)))?;

        let interval = self
            .settings
            .min_interval
            .max(Duration::from_secs(poller.min_interval_secs()));
        if let Some(last) = area.last_checked_at
            && last + chrono_duration(interval) > now
        {
            areas::release_lease(&self.db, area.id, owner).await?;
            return Ok(Evaluation::Skipped);
        }

        let token = self.resolve_token(area.user_id, service, now).await?;
        let outcome = bounded(
            self.settings.provider_timeout,
            poller.poll(PollContext {
                access_token: token.as_ref().map(|t| t.expose_secret()),
                params: &area.params_action,
                watermark: area.watermark.as_deref(),
                now,
            }),
        )
        .await?;

        let filters = template::conditions(&area.params_action, action.params);
        let events = self.fresh_events(area.id, outcome.events, &filters).await?;
        let records = self.fire(area, owner, events, now).await?;
        self.commit(area, owner, outcome.watermark, records, now).await
    }

    /// Deliver events a provider pushed for this Area, through the same
    /// filter, de-duplication, and commit path as a poll. The watermark is
    /// left unchanged; the action's poller assigns the same event ids, so a
    /// later poll does not fire them again.
    ///
    /// Returns [`Evaluation::Skipped`] when the lease is held elsewhere; the
    /// next poll then picks the events up.
    pub async fn push(
        &self,
        area_id: i64,
        owner: &str,
        events: Vec<TriggerEvent>,
        now: DateTime<Utc>,
    ) -> Result<Evaluation, AreaError> {
        let lease_until = now + chrono_duration(self.settings.lease_ttl);
        if !areas::acquire_lease(&self.db, area_id, owner, now, lease_until).await? {
            debug!(area_id, "area leased elsewhere or inactive, pushed events left to the poller");
            return Ok(Evaluation::Skipped);
        }
        let Some(area) = areas::get_area(&self.db, area_id).await? else {
            return Ok(Evaluation::Skipped);
        };

        let pushed = async {
            let (_, action) = self
                .registry
                .action(area.action_id)
                .ok_or_else(|| AreaError::InvariantViolation(format!("unknown action {}", area.action_id)))?;
            let filters = template::conditions(&area.params_action, action.params);
            let events = self.fresh_events(area.id, events, &filters).await?;
            let records = self.fire(&area, owner, events, now).await?;
            self.commit(&area, owner, None, records, now).await
        };
        match pushed.await {
            Ok(evaluation) => Ok(evaluation),
            Err(err) => self.fail(&area, owner, err, now).await,
        }
    }

    /// Run the reaction for fresh events. Deliveries made before an abort
    /// are recorded before the error is returned.
    async fn fire(
        &self,
        area: &Area,
        owner: &str,
        events: Vec<TriggerEvent>,
        now: DateTime<Utc>,
    ) -> Result<Vec<DeliveryRecord>, AreaError> {
        if events.is_empty() {
            return Ok(Vec::new());
        }
        info!(area_id = area.id, events = events.len(), "action fired");
        let batch = self.deliver(area, owner, events, now).await?;
        if let Some(err) = batch.aborted {
            self.keep_fired(area.id, batch.records, now).await;
            return Err(err);
        }
        Ok(batch.records)
    }

    /// Commit a finished evaluation. Deliveries survive a failed commit.
    async fn commit(
        &self,
        area: &Area,
        owner: &str,
        watermark: Option<String>,
        records: Vec<DeliveryRecord>,
        now: DateTime<Utc>,
    ) -> Result<Evaluation, AreaError> {
        let evaluation = if records.is_empty() {
            Evaluation::Quiet
        } else {
            let count = |status: DeliveryStatus| records.iter().filter(|r| r.status == status).count();
            Evaluation::Fired {
                delivered: count(DeliveryStatus::Delivered),
                pending: count(DeliveryStatus::Pending),
                failed: count(DeliveryStatus::Failed),
            }
        };
        let committed = areas::commit_evaluation(
            &self.db,
            area.id,
            owner,
            EvaluationCommit {
                watermark,
                checked_at: now,
                deliveries: records.clone(),
            },
        )
        .await;
        if let Err(err) = committed {
            self.keep_fired(area.id, records, now).await;
            return Err(err);
        }
        Ok(evaluation)
    }

    /// Record reactions that already ran even though the evaluation is
    /// aborting. The watermark is left alone; dedup covers the re-poll.
    async fn keep_fired(&self, area_id: i64, records: Vec<DeliveryRecord>, now: DateTime<Utc>) {
        if records.is_empty() {
            return;
        }
        let fired = records.len();
        match deliveries::record_fired(&self.db, area_id, records, now).await {
            Ok(kept) => warn!(area_id, fired, kept, "evaluation aborted after firing, deliveries kept"),
            Err(e) => error!(area_id, fired, error = %e, "could not record fired deliveries"),
        }
    }

    /// Drop events already delivered, duplicated within the batch, or
    /// rejected by the Area's filters.
    async fn fresh_events(
        &self,
        area_id: i64,
        events: Vec<TriggerEvent>,
        filters: &Params,
    ) -> Result<Vec<TriggerEvent>, AreaError> {
        let ids = events.iter().map(|e| e.id.clone()).collect();
        let seen = deliveries::existing_event_ids(&self.db, area_id, ids).await?;
        let mut batch = HashSet::new();
        Ok(events
            .into_iter()
            .filter(|e| !seen.contains(&e.id) && batch.insert(e.id.clone()))
            .filter(|e| template::matches_conditions(filters, &e.data))
            .collect())
    }

    /// Run the reaction for each event, strictly in order, stopping early if
    /// the lease is lost.
    async fn deliver(
        &self,
        area: &Area,
        owner: &str,
        events: Vec<TriggerEvent>,
        now: DateTime<Utc>,
    ) -> Result<Batch, AreaError> {
        let (service, _) = self
            .registry
            .reaction(area.reaction_id)
            .ok_or_else(|| AreaError::InvariantViolation(format!("unknown reaction {}", area.reaction_id)))?;
        let executor = self
            .registry
            .executor(area.reaction_id)
            .ok_or_else(|| AreaError::InvariantViolation(format!("no executor for reaction {}", area.reaction_id)))?;

        let mut batch = Batch {
            records: Vec::with_capacity(events.len()),
            aborted: None,
        };
        for event in events {
            let until = Utc::now() + chrono_duration(self.settings.lease_ttl);
            match areas::renew_lease(&self.db, area.id, owner, until).await {
                Ok(true) => {}
                Ok(false) => {
                    batch.aborted = Some(AreaError::InvariantViolation(format!(
                        "lease on area {} was lost",
                        area.id
                    )));
                    break;
                }
                Err(e) => {
                    batch.aborted = Some(e);
                    break;
                }
            }
            let params = template::expand(&area.params_reaction, &event.data);
            let result = match self.resolve_token(area.user_id, service, now).await {
                Ok(token) => {
                    bounded(
                        self.settings.provider_timeout,
                        executor.execute(ReactionContext {
                            access_token: token.as_ref().map(|t| t.expose_secret()),
                            params: &params,
                        }),
                    )
                    .await
                }
                Err(e) => Err(e),
            };
            batch
                .records
                .push(self.first_attempt(area.id, event.id, params, result, now));
        }
        Ok(batch)
    }

    fn first_attempt(
        &self,
        area_id: i64,
        event_id: String,
        params: Params,
        result: Result<(), AreaError>,
        now: DateTime<Utc>,
    ) -> DeliveryRecord {
        let (status, next_attempt_at, last_error) = self.attempt_outcome(1, result, now);
        match status {
            DeliveryStatus::Delivered => debug!(area_id, event_id = %event_id, "reaction delivered"),
            _ => warn!(area_id, event_id = %event_id, %status, error = ?last_error, "reaction failed"),
        }
        DeliveryRecord {
            event_id,
            params,
            status,
            attempts: 1,
            next_attempt_at,
            last_error,
        }
    }

    /// Classify the result of delivery attempt number `attempts`.
    fn attempt_outcome(
        &self,
        attempts: u32,
        result: Result<(), AreaError>,
        now: DateTime<Utc>,
    ) -> (DeliveryStatus, Option<DateTime<Utc>>, Option<String>) {
        match result {
            Ok(()) => (DeliveryStatus::Delivered, None, None),
            Err(e) if e.is_retryable() && attempts < self.settings.max_delivery_attempts => {
                let next = now + chrono_duration(self.settings.backoff(attempts));
                (DeliveryStatus::Pending, Some(next), Some(e.to_string()))
            }
            Err(e) => (DeliveryStatus::Failed, None, Some(e.to_string())),
        }
    }

    /// Token for `service` on behalf of `user_id`, or `None` when the service
    /// needs no account.
    async fn resolve_token(
        &self,
        user_id: i64,
        service: &ServiceDef,
        now: DateTime<Utc>,
    ) -> Result<Option<SecretString>, AreaError> {
        if !service.requires_account() {
            return Ok(None);
        }
        let account = accounts::get_active_account(&self.db, user_id, service.id)
            .await?
            .ok_or_else(|| AreaError::ServiceAccountNotConnected {
                service: service.name.to_string(),
            })?;
        self.vault.get_valid_token_at(account.id, now).await.map(Some)
    }

    async fn fail(&self, area: &Area, owner: &str, err: AreaError, now: DateTime<Utc>) -> Result<Evaluation, AreaError> {
        let message = err.to_string();
        match err.classify() {
            ErrorClass::Internal => error!(area_id = area.id, error = %message, "evaluation aborted"),
            _ => warn!(area_id = area.id, error = %message, "evaluation failed"),
        }
        let status = areas::record_area_failure(
            &self.db,
            area.id,
            owner,
            &message,
            self.settings.failure_threshold,
            now,
        )
        .await?;
        if status == Some(AreaStatus::Suspended) {
            warn!(
                area_id = area.id,
                user_id = area.user_id,
                threshold = self.settings.failure_threshold,
                "area suspended after repeated failures"
            );
        }
        Ok(Evaluation::Failed { error: message, status })
    }

    /// Retry pending deliveries whose time has come.
    ///
    /// Each retry holds the Area lease, so it never overlaps an evaluation.
    pub async fn retry_due(&self, owner: &str, now: DateTime<Utc>) -> Result<RetryStats, AreaError> {
        let due = deliveries::due_deliveries(&self.db, now, self.settings.retry_batch_size).await?;
        let mut stats = RetryStats::default();
        for delivery in due {
            let until = now + chrono_duration(self.settings.lease_ttl);
            if !areas::acquire_lease(&self.db, delivery.area_id, owner, now, until).await? {
                continue;
            }
            stats.attempted += 1;
            let result = self.redeliver(delivery.area_id, &delivery.params, now).await;
            let attempts = u32::try_from(delivery.attempts).unwrap_or(u32::MAX).saturating_add(1);
            let (status, next, last_error) = self.attempt_outcome(attempts, result, now);
            match status {
                DeliveryStatus::Delivered => stats.delivered += 1,
                DeliveryStatus::Pending => stats.rescheduled += 1,
                DeliveryStatus::Failed => {
                    stats.failed += 1;
                    warn!(
                        area_id = delivery.area_id,
                        event_id = %delivery.event_id,
                        attempts,
                        "delivery permanently failed"
                    );
                }
            }
            deliveries::record_attempt(&self.db, delivery.id, status, next, last_error.as_deref(), now).await?;
            areas::release_lease(&self.db, delivery.area_id, owner).await?;
        }
        if stats.attempted > 0 {
            info!(
                attempted = stats.attempted,
                delivered = stats.delivered,
                rescheduled = stats.rescheduled,
                failed = stats.failed,
                "delivery retry sweep finished"
            );
        }
        Ok(stats)
    }

    async fn redeliver(&self, area_id: i64, params: &Params, now: DateTime<Utc>) -> Result<(), AreaError> {
        let area = areas::get_area(&self.db, area_id)
            .await?
            .ok_or_else(|| AreaError::NotFound(format!("area {area_id}")))?;
        let (service, _) = self
            .registry
            .reaction(area.reaction_id)
            .ok_or_else(|| AreaError::InvariantViolation(format!("unknown reaction {}", area.reaction_id)))?;
        let executor = self
            .registry
            .executor(area.reaction_id)
            .ok_or_else(|| AreaError::InvariantViolation(format!("no executor for reaction {}", area.reaction_id)))?;
        let token = self.resolve_token(area.user_id, service, now).await?;
        bounded(
            self.settings.provider_timeout,
            executor.execute(ReactionContext {
                access_token: token.as_ref().map(|t| t.expose_secret()),
                params,
            }),
        )
        .await
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use area_core::{ActionPoller, ParamType, PollOutcome, ReactionExecutor};
    use area_registry::{CapabilityDef, ParamSpec};
    use area_storage::NewArea;
    use area_storage::queries::{services, users};
    use area_vault::{MasterKey, VaultSettings};
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    pub(crate) const ACTION: i64 = 900;
    pub(crate) const REACTION: i64 = 900;

    static TEST_SERVICE: ServiceDef = ServiceDef {
        id: 90,
        name: "stub",
        display_name: "Stub",
        description: "In-process test service",
        oauth_provider: None,
        icon: "stub",
        color: "#000000",
        category: "test",
        actions: &[CapabilityDef {
            id: ACTION,
            key: "event",
            name: "Event",
            description: "Scripted events",
            params: &[ParamSpec::optional("topic", ParamType::String, "")],
        }],
        reactions: &[CapabilityDef {
            id: REACTION,
            key: "record",
            name: "Record",
            description: "Records invocations",
            params: &[ParamSpec::required("text", ParamType::String, "")],
        }],
    };

    /// Returns the same outcome on every poll, regardless of the watermark.
    #[derive(Default)]
    pub(crate) struct StaticPoller {
        pub outcome: Mutex<PollOutcome>,
        pub fail: AtomicBool,
        pub panic: AtomicBool,
        pub delay_ms: u64,
        pub polls: AtomicUsize,
    }

    #[async_trait]
    impl ActionPoller for StaticPoller {
        async fn poll(&self, _ctx: PollContext<'_>) -> Result<PollOutcome, AreaError> {
            self.polls.fetch_add(1, Ordering::SeqCst);
            if self.delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
            }
            assert!(!self.panic.load(Ordering::SeqCst), "scripted poller panic");
            if self.fail.load(Ordering::SeqCst) {
                return Err(AreaError::TransientProvider("upstream returned 503".into()));
            }
            Ok(self.outcome.lock().unwrap().clone())
        }

        fn min_interval_secs(&self) -> u64 {
            0
        }
    }

    /// Records expanded params; fails while `failures_left` is positive.
    /// When `steal_lease` is set, the first call hands the Area's lease to
    /// another owner.
    #[derive(Default)]
    pub(crate) struct RecordingExecutor {
        pub calls: Mutex<Vec<Params>>,
        pub failures_left: AtomicUsize,
        pub steal_lease: Mutex<Option<(Database, i64)>>,
    }

    #[async_trait]
    impl ReactionExecutor for RecordingExecutor {
        async fn execute(&self, ctx: ReactionContext<'_>) -> Result<(), AreaError> {
            self.calls.lock().unwrap().push(ctx.params.clone());
            let steal = self.steal_lease.lock().unwrap().take();
            if let Some((db, area_id)) = steal {
                areas::release_lease(&db, area_id, "w").await.unwrap();
                let now = Utc::now();
                assert!(areas::acquire_lease(&db, area_id, "other", now, now).await.unwrap());
            }
            let left = self.failures_left.load(Ordering::SeqCst);
            if left > 0 {
                self.failures_left.store(left - 1, Ordering::SeqCst);
                return Err(AreaError::TransientProvider("webhook returned 502".into()));
            }
            Ok(())
        }
    }

    pub(crate) struct Fixture {
        pub evaluator: Arc<Evaluator>,
        pub db: Database,
        pub user_id: i64,
        pub area_id: i64,
        pub poller: Arc<StaticPoller>,
        pub executor: Arc<RecordingExecutor>,
        pub vault: Arc<CredentialVault>,
        _dir: tempfile::TempDir,
    }

    pub(crate) fn event(id: &str, topic: &str) -> TriggerEvent {
        TriggerEvent {
            id: id.into(),
            data: json!({"id": id, "topic": topic}),
        }
    }

    pub(crate) async fn fixture_with(poller: StaticPoller, action_params: serde_json::Value) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(dir.path().join("engine.db").to_str().unwrap())
            .await
            .unwrap();
        let poller = Arc::new(poller);
        let executor = Arc::new(RecordingExecutor::default());
        let registry = Arc::new(
            ServiceRegistry::builder()
                .services(std::slice::from_ref(&TEST_SERVICE))
                .poller(ACTION, poller.clone())
                .executor(REACTION, executor.clone())
                .build()
                .unwrap(),
        );
        services::seed_services(&db, &registry.service_rows()).await.unwrap();
        let vault = Arc::new(CredentialVault::new(
            db.clone(),
            MasterKey::ephemeral().unwrap(),
            HashMap::new(),
            VaultSettings::default(),
        ));
        let settings = EngineSettings {
            min_interval: Duration::ZERO,
            ..Default::default()
        };
        let user = users::create_user(&db, "engine@example.com", None, None).await.unwrap();
        let area = areas::create_area(
            &db,
            &NewArea {
                user_id: user.id,
                name: "stub → stub".into(),
                action_service_id: TEST_SERVICE.id,
                action_id: ACTION,
                params_action: action_params.as_object().cloned().unwrap(),
                reaction_service_id: TEST_SERVICE.id,
                reaction_id: REACTION,
                params_reaction: json!({"text": "got {{id}} about {{topic}}"}).as_object().cloned().unwrap(),
                status: AreaStatus::Active,
            },
        )
        .await
        .unwrap();
        Fixture {
            evaluator: Arc::new(Evaluator::new(db.clone(), vault.clone(), registry, settings)),
            db,
            user_id: user.id,
            area_id: area.id,
            poller,
            executor,
            vault,
            _dir: dir,
        }
    }

    pub(crate) async fn fixture(events: Vec<TriggerEvent>) -> Fixture {
        let poller = StaticPoller {
            outcome: Mutex::new(PollOutcome {
                events,
                watermark: Some("w1".into()),
            }),
            ..Default::default()
        };
        fixture_with(poller, json!({})).await
    }

    #[tokio::test]
    async fn repolling_same_upstream_state_fires_once() {
        let f = fixture(vec![event("e1", "rust")]).await;
        let now = Utc::now();

        let first = f.evaluator.evaluate(f.area_id, "w", now).await.unwrap();
        assert_eq!(first, Evaluation::Fired { delivered: 1, pending: 0, failed: 0 });
        let second = f.evaluator.evaluate(f.area_id, "w", now).await.unwrap();
        assert_eq!(second, Evaluation::Quiet);

        let calls = f.executor.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0]["text"], json!("got e1 about rust"));

        let area = areas::get_area(&f.db, f.area_id).await.unwrap().unwrap();
        assert_eq!(area.watermark.as_deref(), Some("w1"));
        assert!(area.last_triggered_at.is_some());
    }

    #[tokio::test]
    async fn filters_and_batch_duplicates_are_dropped() {
        let poller = StaticPoller {
            outcome: Mutex::new(PollOutcome {
                events: vec![event("a", "rust"), event("a", "rust"), event("b", "go")],
                watermark: None,
            }),
            ..Default::default()
        };
        let f = fixture_with(poller, json!({"topic": "rust"})).await;
        let result = f.evaluator.evaluate(f.area_id, "w", Utc::now()).await.unwrap();
        assert_eq!(result, Evaluation::Fired { delivered: 1, pending: 0, failed: 0 });
    }

    #[tokio::test]
    async fn concurrent_evaluations_are_mutually_exclusive() {
        let poller = StaticPoller {
            outcome: Mutex::new(PollOutcome::quiet(None)),
            delay_ms: 100,
            ..Default::default()
        };
        let f = fixture_with(poller, json!({})).await;
        let now = Utc::now();
        let (a, b) = tokio::join!(
            f.evaluator.evaluate(f.area_id, "worker-a", now),
            f.evaluator.evaluate(f.area_id, "worker-b", now),
        );
        let results = [a.unwrap(), b.unwrap()];
        assert_eq!(results.iter().filter(|r| **r == Evaluation::Skipped).count(), 1);
        assert_eq!(f.poller.polls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn repeated_failures_suspend_and_toggle_recovers() {
        let f = fixture(vec![]).await;
        f.poller.fail.store(true, Ordering::SeqCst);
        let now = Utc::now();

        for attempt in 1..=4 {
            let result = f.evaluator.evaluate(f.area_id, "w", now).await.unwrap();
            assert!(
                matches!(result, Evaluation::Failed { status: Some(AreaStatus::Active), .. }),
                "attempt {attempt}: {result:?}"
            );
        }
        let fifth = f.evaluator.evaluate(f.area_id, "w", now).await.unwrap();
        assert!(matches!(fifth, Evaluation::Failed { status: Some(AreaStatus::Suspended), .. }));
        assert_eq!(f.evaluator.evaluate(f.area_id, "w", now).await.unwrap(), Evaluation::Skipped);

        let area = areas::set_area_status(&f.db, f.user_id, f.area_id, AreaStatus::Active)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(area.failure_count, 0);
        assert!(area.last_error.is_none());
    }

    #[tokio::test]
    async fn failed_reaction_is_retried_with_backoff() {
        let f = fixture(vec![event("e1", "rust")]).await;
        f.executor.failures_left.store(1, Ordering::SeqCst);
        let now = Utc::now();

        let result = f.evaluator.evaluate(f.area_id, "w", now).await.unwrap();
        assert_eq!(result, Evaluation::Fired { delivered: 0, pending: 1, failed: 0 });
        let pending = &deliveries::list_deliveries(&f.db, f.area_id, 10).await.unwrap()[0];
        // Stored timestamps keep millisecond precision.
        let delay = pending.next_attempt_at.unwrap() - now;
        let expected = chrono_duration(f.evaluator.settings().backoff(1));
        assert!((delay - expected).num_milliseconds().abs() <= 1, "{delay:?}");

        // Not due yet.
        let early = f.evaluator.retry_due("sweep", now).await.unwrap();
        assert_eq!(early.attempted, 0);

        let later = now + chrono::Duration::hours(2);
        let stats = f.evaluator.retry_due("sweep", later).await.unwrap();
        assert_eq!(stats.delivered, 1);
        let delivered = &deliveries::list_deliveries(&f.db, f.area_id, 10).await.unwrap()[0];
        assert_eq!(delivered.status, DeliveryStatus::Delivered);
        assert_eq!(delivered.attempts, 2);
        assert_eq!(f.executor.calls.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn retries_stop_at_the_attempt_limit() {
        let f = fixture(vec![event("e1", "rust")]).await;
        f.executor.failures_left.store(usize::MAX, Ordering::SeqCst);
        let mut now = Utc::now();
        f.evaluator.evaluate(f.area_id, "w", now).await.unwrap();

        for _ in 1..f.evaluator.settings().max_delivery_attempts {
            now += chrono::Duration::days(1);
            f.evaluator.retry_due("sweep", now).await.unwrap();
        }
        let delivery = &deliveries::list_deliveries(&f.db, f.area_id, 10).await.unwrap()[0];
        assert_eq!(delivery.status, DeliveryStatus::Failed);
        assert_eq!(delivery.attempts, i64::from(f.evaluator.settings().max_delivery_attempts));
    }

    #[tokio::test]
    async fn lost_lease_mid_batch_keeps_fired_deliveries() {
        let f = fixture(vec![event("e1", "rust"), event("e2", "rust")]).await;
        *f.executor.steal_lease.lock().unwrap() = Some((f.db.clone(), f.area_id));
        let now = Utc::now();

        let aborted = f.evaluator.evaluate(f.area_id, "w", now).await.unwrap();
        assert!(matches!(aborted, Evaluation::Failed { .. }), "{aborted:?}");
        let kept = deliveries::list_deliveries(&f.db, f.area_id, 10).await.unwrap();
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].event_id, "e1");
        assert_eq!(kept[0].status, DeliveryStatus::Delivered);

        let later = now + chrono::Duration::minutes(1);
        let next = f.evaluator.evaluate(f.area_id, "w", later).await.unwrap();
        assert_eq!(next, Evaluation::Fired { delivered: 1, pending: 0, failed: 0 });
        let calls = f.executor.calls.lock().unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1]["text"], json!("got e2 about rust"));
    }

    #[tokio::test]
    async fn failed_commit_keeps_fired_deliveries() {
        let f = fixture(vec![event("e1", "rust")]).await;
        *f.executor.steal_lease.lock().unwrap() = Some((f.db.clone(), f.area_id));
        let now = Utc::now();

        let aborted = f.evaluator.evaluate(f.area_id, "w", now).await.unwrap();
        assert!(matches!(aborted, Evaluation::Failed { .. }), "{aborted:?}");

        let later = now + chrono::Duration::minutes(1);
        assert_eq!(f.evaluator.evaluate(f.area_id, "w", later).await.unwrap(), Evaluation::Quiet);
        assert_eq!(f.executor.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn pushed_events_are_not_polled_again() {
        let f = fixture(vec![event("e1", "rust")]).await;
        let now = Utc::now();

        let pushed = f
            .evaluator
            .push(f.area_id, "hook", vec![event("e1", "rust")], now)
            .await
            .unwrap();
        assert_eq!(pushed, Evaluation::Fired { delivered: 1, pending: 0, failed: 0 });
        let area = areas::get_area(&f.db, f.area_id).await.unwrap().unwrap();
        assert!(area.watermark.is_none());

        assert_eq!(f.evaluator.evaluate(f.area_id, "w", now).await.unwrap(), Evaluation::Quiet);
        assert_eq!(f.executor.calls.lock().unwrap().len(), 1);
        let area = areas::get_area(&f.db, f.area_id).await.unwrap().unwrap();
        assert_eq!(area.watermark.as_deref(), Some("w1"));
    }

    #[tokio::test]
    async fn push_defers_to_a_running_evaluation() {
        let f = fixture(vec![]).await;
        let now = Utc::now();
        let until = now + chrono::Duration::minutes(1);
        assert!(areas::acquire_lease(&f.db, f.area_id, "w", now, until).await.unwrap());

        let pushed = f
            .evaluator
            .push(f.area_id, "hook", vec![event("e1", "rust")], now)
            .await
            .unwrap();
        assert_eq!(pushed, Evaluation::Skipped);
        assert!(f.executor.calls.lock().unwrap().is_empty());
    }
}
