// SPDX-FileCopyrightText: 2026 Area Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tick loop, bounded due-queue, and worker pool.
//!
//! Each tick lists due Areas (healthiest and longest-waiting first) and
//! offers them to a bounded queue. When the queue is full the rest of the
//! list is deferred to a later tick, so the most recently failing Areas are
//! the ones shed. A separate sweeper retries deliveries, refreshes expiring
//! tokens, and purges expired OAuth states.

use std::sync::Arc;

use area_core::{AreaError, PushedEvent};
use area_storage::Database;
use area_storage::queries::{areas, states};
use area_vault::CredentialVault;
use chrono::Utc;
use dashmap::DashSet;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::evaluator::{Evaluation, Evaluator};

/// Result of offering due Areas to the queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub due: usize,
    pub enqueued: usize,
    /// Deferred because the queue was full.
    pub shed: usize,
}

/// Result of routing one pushed event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Active Areas the event was addressed to.
    pub matched: usize,
    pub fired: usize,
    /// Leased by a running evaluation; the next poll covers them.
    pub deferred: usize,
    pub failed: usize,
}

/// The automation engine: scheduler, workers, and sweeps.
pub struct Engine {
    db: Database,
    evaluator: Arc<Evaluator>,
    vault: Arc<CredentialVault>,
    /// Areas sitting in the queue, so a slow queue never holds one twice.
    queued: DashSet<i64>,
    instance: String,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("instance", &self.instance)
            .field("queued", &self.queued.len())
            .finish_non_exhaustive()
    }
}

impl Engine {
    pub fn new(db: Database, evaluator: Arc<Evaluator>, vault: Arc<CredentialVault>) -> Self {
        Self {
            db,
            evaluator,
            vault,
            queued: DashSet::new(),
            instance: format!("engine-{}", uuid::Uuid::new_v4().simple()),
        }
    }

    /// Run until `cancel` fires, then let workers finish their current
    /// evaluation and exit.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) -> Result<(), AreaError> {
        let settings = self.evaluator.settings().clone();
        let (tx, rx) = mpsc::channel::<i64>(settings.queue_capacity);
        let rx = Arc::new(Mutex::new(rx));

        let mut tasks = JoinSet::new();
        for n in 0..settings.workers {
            let engine = self.clone();
            let rx = rx.clone();
            let cancel = cancel.clone();
            tasks.spawn(async move { engine.worker(n, rx, cancel).await });
        }
        {
            let engine = self.clone();
            let cancel = cancel.clone();
            tasks.spawn(async move { engine.sweeper(cancel).await });
        }
        info!(
            workers = settings.workers,
            queue_capacity = settings.queue_capacity,
            tick_secs = settings.tick.as_secs(),
            "engine started"
        );

        let mut interval = tokio::time::interval(settings.tick);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.schedule(&tx).await {
                        error!(error = %e, "scheduling tick failed");
                    }
                }
                _ = cancel.cancelled() => {
                    info!("engine shutting down, draining workers");
                    break;
                }
            }
        }

        drop(tx);
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "engine task panicked");
            }
        }
        info!("engine stopped");
        Ok(())
    }

    /// Offer due Areas to the queue.
    pub async fn schedule(&self, tx: &mpsc::Sender<i64>) -> Result<TickReport, AreaError> {
        let settings = self.evaluator.settings();
        let now = Utc::now();
        let due = areas::list_due_areas(
            &self.db,
            now,
            settings.min_interval.as_secs(),
            settings.queue_capacity * 2,
        )
        .await?;

        let mut report = TickReport {
            due: due.len(),
            ..Default::default()
        };
        for (index, area) in due.iter().enumerate() {
            if !self.queued.insert(area.id) {
                continue;
            }
            match tx.try_send(area.id) {
                Ok(()) => report.enqueued += 1,
                Err(mpsc::error::TrySendError::Full(id)) => {
                    self.queued.remove(&id);
                    report.shed = due.len() - index;
                    break;
                }
                Err(mpsc::error::TrySendError::Closed(id)) => {
                    self.queued.remove(&id);
                    break;
                }
            }
        }
        if report.shed > 0 {
            warn!(shed = report.shed, enqueued = report.enqueued, "due-queue full, deferring areas");
        } else if report.enqueued > 0 {
            debug!(enqueued = report.enqueued, "areas scheduled");
        }
        Ok(report)
    }

    async fn worker(&self, n: usize, rx: Arc<Mutex<mpsc::Receiver<i64>>>, cancel: CancellationToken) {
        let owner = format!("{}-w{n}", self.instance);
        loop {
            let next = {
                let mut rx = rx.lock().await;
                tokio::select! {
                    id = rx.recv() => id,
                    _ = cancel.cancelled() => None,
                }
            };
            let Some(area_id) = next else {
                break;
            };
            self.queued.remove(&area_id);
            let evaluator = self.evaluator.clone();
            let evaluation_owner = owner.clone();
            let evaluated =
                tokio::spawn(async move { evaluator.evaluate(area_id, &evaluation_owner, Utc::now()).await }).await;
            match evaluated {
                Ok(Ok(Evaluation::Fired { delivered, pending, failed })) => {
                    info!(area_id, delivered, pending, failed, "area evaluated");
                }
                Ok(Ok(Evaluation::Failed { status, .. })) => debug!(area_id, ?status, "area evaluation failed"),
                Ok(Ok(_)) => {}
                // Only storage failures reach here; the next tick retries.
                Ok(Err(e)) => error!(area_id, error = %e, "could not record evaluation"),
                Err(e) => self.evaluation_panicked(area_id, &owner, e).await,
            }
        }
        debug!(worker = n, "worker stopped");
    }

    /// Count a panicked evaluation as a failure so the lease is released and
    /// a persistently panicking Area ends up suspended.
    async fn evaluation_panicked(&self, area_id: i64, owner: &str, err: tokio::task::JoinError) {
        error!(area_id, error = %err, "area evaluation panicked");
        let threshold = self.evaluator.settings().failure_threshold;
        if let Err(e) =
            areas::record_area_failure(&self.db, area_id, owner, "evaluation panicked", threshold, Utc::now()).await
        {
            error!(area_id, error = %e, "could not record panicked evaluation");
        }
    }

    async fn sweeper(&self, cancel: CancellationToken) {
        let owner = format!("{}-sweep", self.instance);
        let mut interval = tokio::time::interval(self.evaluator.settings().tick);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = interval.tick() => self.sweep(&owner).await,
                _ = cancel.cancelled() => break,
            }
        }
    }

    /// Route a pushed provider event to every active Area it selects.
    ///
    /// Each Area goes through the usual lease, filter, de-duplication and
    /// commit path, so an event already seen by polling fires nothing.
    pub async fn dispatch(&self, pushed: PushedEvent) -> Result<DispatchReport, AreaError> {
        let owner = format!("{}-push", self.instance);
        let candidates = areas::list_active_areas_for_action(&self.db, pushed.action_id).await?;
        let mut report = DispatchReport::default();
        for area in candidates.iter().filter(|a| pushed.selects(&a.params_action)) {
            report.matched += 1;
            let events = vec![pushed.event.clone()];
            match self.evaluator.push(area.id, &owner, events, Utc::now()).await? {
                Evaluation::Fired { .. } => report.fired += 1,
                Evaluation::Skipped => report.deferred += 1,
                Evaluation::Failed { .. } => report.failed += 1,
                // Already delivered or filtered out.
                Evaluation::Quiet => {}
            }
        }
        info!(
            action_id = pushed.action_id,
            event_id = %pushed.event.id,
            matched = report.matched,
            fired = report.fired,
            deferred = report.deferred,
            "pushed event dispatched"
        );
        Ok(report)
    }

    /// One pass of the background sweeps. Each failure is logged on its own.
    pub async fn sweep(&self, owner: &str) {
        let now = Utc::now();
        if let Err(e) = self.evaluator.retry_due(owner, now).await {
            warn!(error = %e, "delivery retry sweep failed");
        }
        if let Err(e) = self.vault.batch_refresh_expired(now).await {
            warn!(error = %e, "token refresh sweep failed");
        }
        match states::purge_expired_states(&self.db, now).await {
            Ok(0) => {}
            Ok(purged) => debug!(purged, "expired oauth states purged"),
            Err(e) => warn!(error = %e, "oauth state purge failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::tests::{event, fixture};
    use area_core::AreaStatus;
    use area_storage::NewArea;
    use std::sync::atomic::Ordering;

    #[tokio::test]
    async fn full_queue_sheds_and_never_double_queues() {
        let f = fixture(vec![]).await;
        let first = areas::get_area(&f.db, f.area_id).await.unwrap().unwrap();
        areas::create_area(
            &f.db,
            &NewArea {
                user_id: f.user_id,
                name: "second".into(),
                action_service_id: first.action_service_id,
                action_id: first.action_id,
                params_action: first.params_action.clone(),
                reaction_service_id: first.reaction_service_id,
                reaction_id: first.reaction_id,
                params_reaction: first.params_reaction.clone(),
                status: AreaStatus::Active,
            },
        )
        .await
        .unwrap();
        let engine = Engine::new(f.db.clone(), f.evaluator.clone(), f.vault.clone());
        let (tx, mut rx) = mpsc::channel(1);

        let report = engine.schedule(&tx).await.unwrap();
        assert_eq!(report, TickReport { due: 2, enqueued: 1, shed: 1 });
        // The queued Area is not offered twice; the shed one still does not fit.
        let again = engine.schedule(&tx).await.unwrap();
        assert_eq!(again.enqueued, 0);
        assert_eq!(again.shed, 1);

        assert_eq!(rx.recv().await, Some(f.area_id));
        engine.queued.remove(&f.area_id);
        let after_drain = engine.schedule(&tx).await.unwrap();
        assert_eq!(after_drain.enqueued, 1);
        assert_eq!(rx.recv().await, Some(f.area_id));
    }

    #[tokio::test]
    async fn run_evaluates_and_stops_on_cancel() {
        let f = fixture(vec![event("e1", "rust")]).await;
        let engine = Arc::new(Engine::new(f.db.clone(), f.evaluator.clone(), f.vault.clone()));
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(engine.clone().run(cancel.clone()));

        for _ in 0..100 {
            if !f.executor.calls.lock().unwrap().is_empty() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        cancel.cancel();
        handle.await.unwrap().unwrap();

        assert_eq!(f.executor.calls.lock().unwrap().len(), 1);
        assert!(f.poller.polls.load(Ordering::SeqCst) >= 1);
        let area = areas::get_area(&f.db, f.area_id).await.unwrap().unwrap();
        assert!(area.last_checked_at.is_some());
    }

    #[tokio::test]
    async fn panicking_evaluation_is_recorded_and_workers_survive() {
        let f = fixture(vec![event("e1", "rust")]).await;
        f.poller.panic.store(true, Ordering::SeqCst);
        let engine = Arc::new(Engine::new(f.db.clone(), f.evaluator.clone(), f.vault.clone()));
        let (tx, rx) = mpsc::channel(4);
        let rx = Arc::new(Mutex::new(rx));
        let cancel = CancellationToken::new();
        let worker = {
            let engine = engine.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { engine.worker(0, rx, cancel).await })
        };

        tx.send(f.area_id).await.unwrap();
        let mut area = areas::get_area(&f.db, f.area_id).await.unwrap().unwrap();
        for _ in 0..100 {
            if area.failure_count > 0 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            area = areas::get_area(&f.db, f.area_id).await.unwrap().unwrap();
        }
        assert_eq!(area.failure_count, 1);
        assert_eq!(area.last_error.as_deref(), Some("evaluation panicked"));

        // The same worker keeps serving the queue.
        f.poller.panic.store(false, Ordering::SeqCst);
        tx.send(f.area_id).await.unwrap();
        for _ in 0..100 {
            if !f.executor.calls.lock().unwrap().is_empty() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        assert_eq!(f.executor.calls.lock().unwrap().len(), 1);

        cancel.cancel();
        worker.await.unwrap();
    }

    #[tokio::test]
    async fn dispatch_routes_by_selector_once() {
        let f = fixture(vec![]).await;
        let engine = Engine::new(f.db.clone(), f.evaluator.clone(), f.vault.clone());
        let mut selector = area_core::Params::new();
        selector.insert("topic".into(), serde_json::json!("RUST"));
        let pushed = PushedEvent {
            action_id: crate::evaluator::tests::ACTION,
            selector,
            event: event("e1", "rust"),
        };

        // The fixture Area has no `topic` parameter, so it is not addressed.
        assert_eq!(engine.dispatch(pushed.clone()).await.unwrap(), DispatchReport::default());

        let area = areas::get_area(&f.db, f.area_id).await.unwrap().unwrap();
        let mut params_action = area.params_action.clone();
        params_action.insert("topic".into(), serde_json::json!("rust"));
        areas::update_area(
            &f.db,
            f.user_id,
            f.area_id,
            &area_storage::AreaPatch {
                params_action: Some(params_action),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let first = engine.dispatch(pushed.clone()).await.unwrap();
        assert_eq!(first, DispatchReport { matched: 1, fired: 1, deferred: 0, failed: 0 });
        let replay = engine.dispatch(pushed).await.unwrap();
        assert_eq!(replay, DispatchReport { matched: 1, fired: 0, deferred: 0, failed: 0 });
        assert_eq!(f.executor.calls.lock().unwrap().len(), 1);
    }
}
