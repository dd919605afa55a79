use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::{
    sync::Mutex,
    task::JoinHandle,
    time::{self, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

use crate::{config, model::event::Event};

/// The conditional bulk updates the status updater needs from the store.
/// Each transition is a single predicate-guarded `UPDATE`: the predicate is
/// the concurrency control, so a row can never be transitioned twice.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// `upcoming -> active` for events whose start time has passed. Returns
    /// the number of rows changed.
    async fn activate_started(&self, now: DateTime<Utc>) -> sqlx::Result<u64>;

    /// `active -> complete` for events whose end time has passed.
    async fn complete_ended(&self, now: DateTime<Utc>) -> sqlx::Result<u64>;

    /// `active -> complete` for events without an end time that started
    /// before `cutoff`.
    async fn complete_overrunning(&self, cutoff: DateTime<Utc>) -> sqlx::Result<u64>;

    /// Events whose persisted status disagrees with what the clock says.
    /// Read-only; used by the ops surface and tests.
    async fn find_stale(&self, now: DateTime<Utc>) -> sqlx::Result<Vec<Event>>;
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepOutcome {
    pub activated: u64,
    pub completed: u64,
    pub timed_out: u64,
}

struct SweepTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Periodically brings persisted event statuses into agreement with the
/// clock. Statuses are read as stored on the hot paths, so without this
/// background reconciliation they would never advance.
pub struct EventStatusUpdater {
    store: Arc<dyn EventStore>,
    interval: Duration,
    task: Mutex<Option<SweepTask>>,
}

impl EventStatusUpdater {
    pub fn new(store: Arc<dyn EventStore>, interval: Duration) -> Self {
        Self {
            store,
            interval,
            task: Mutex::new(None),
        }
    }

    /// Runs one sweep right away, then keeps sweeping on the configured
    /// interval until `stop` is called. Calling `start` again without an
    /// intervening `stop` is a no-op.
    pub async fn start(&self) {
        let mut task = self.task.lock().await;
        if task.is_some() {
            tracing::warn!("event status updater already running");
            return;
        }
        tracing::info!("starting event status updater");

        // Correct stale rows immediately so a fresh boot does not serve
        // outdated statuses for a full interval.
        let _ = run_sweep(self.store.as_ref(), Utc::now()).await;

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let store = self.store.clone();
        let period = self.interval;
        let handle = tokio::spawn(async move {
            let mut ticker = time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately and the initial sweep has
            // already run, so consume it before the loop.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let _ = run_sweep(store.as_ref(), Utc::now()).await;
                    }
                }
            }
            tracing::info!("event status updater stopped");
        });
        *task = Some(SweepTask { cancel, handle });
    }

    /// Halts the periodic sweeps. Safe to call from any task; an in-flight
    /// sweep finishes before the loop observes the cancellation, so no bulk
    /// update is ever cut short. After this returns no further sweeps run.
    pub async fn stop(&self) {
        let task = self.task.lock().await.take();
        if let Some(SweepTask { cancel, handle }) = task {
            cancel.cancel();
            if let Err(e) = handle.await {
                tracing::error!("sweep task failed to shut down cleanly: {e}");
            }
        }
    }

    /// Runs exactly one sweep now, independent of the periodic timer. All
    /// steps are attempted; the first error encountered is returned.
    pub async fn force_sweep(&self) -> sqlx::Result<SweepOutcome> {
        run_sweep(self.store.as_ref(), Utc::now()).await
    }

    /// Events the next sweep would touch. Diagnostics only, mutates nothing.
    pub async fn find_stale_events(&self, now: DateTime<Utc>) -> sqlx::Result<Vec<Event>> {
        self.store.find_stale(now).await
    }
}

/// One sweep: three independent bulk transitions. A failing step is logged
/// and skipped so the others still run; the next tick retries it.
async fn run_sweep(store: &dyn EventStore, now: DateTime<Utc>) -> sqlx::Result<SweepOutcome> {
    let mut outcome = SweepOutcome::default();
    let mut first_error = None;

    match store.activate_started(now).await {
        Ok(count) => {
            outcome.activated = count;
            if count > 0 {
                tracing::info!(count, "events transitioned from 'upcoming' to 'active'");
            }
        }
        Err(e) => {
            tracing::error!("failed to activate started events: {e}");
            first_error.get_or_insert(e);
        }
    }

    match store.complete_ended(now).await {
        Ok(count) => {
            outcome.completed = count;
            if count > 0 {
                tracing::info!(count, "events transitioned from 'active' to 'complete'");
            }
        }
        Err(e) => {
            tracing::error!("failed to complete ended events: {e}");
            first_error.get_or_insert(e);
        }
    }

    let cutoff = now - chrono::Duration::minutes(config::OPEN_ENDED_EVENT_TIMEOUT_MINUTES);
    match store.complete_overrunning(cutoff).await {
        Ok(count) => {
            outcome.timed_out = count;
            if count > 0 {
                tracing::info!(count, "events without an end time timed out to 'complete'");
            }
        }
        Err(e) => {
            tracing::error!("failed to complete overrunning events: {e}");
            first_error.get_or_insert(e);
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(outcome),
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashSet,
        sync::Mutex as StdMutex,
    };

    use chrono::Duration as ChronoDuration;
    use uuid::Uuid;

    use super::*;
    use crate::model::event::{EventStatus, EventType};

    struct MemoryStore {
        events: StdMutex<Vec<Event>>,
        calls: StdMutex<Vec<&'static str>>,
        failing: StdMutex<HashSet<&'static str>>,
    }

    impl MemoryStore {
        fn new(events: Vec<Event>) -> Self {
            Self {
                events: StdMutex::new(events),
                calls: StdMutex::new(Vec::new()),
                failing: StdMutex::new(HashSet::new()),
            }
        }

        fn fail_on(&self, step: &'static str) {
            self.failing.lock().unwrap().insert(step);
        }

        fn record(&self, step: &'static str) -> sqlx::Result<()> {
            self.calls.lock().unwrap().push(step);
            if self.failing.lock().unwrap().contains(step) {
                return Err(sqlx::Error::PoolClosed);
            }
            Ok(())
        }

        fn sweeps(&self) -> usize {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter(|step| **step == "activate")
                .count()
        }

        fn status_of(&self, id: Uuid) -> EventStatus {
            self.events
                .lock()
                .unwrap()
                .iter()
                .find(|e| e.id == id)
                .unwrap()
                .status
        }
    }

    #[async_trait]
    impl EventStore for MemoryStore {
        async fn activate_started(&self, now: DateTime<Utc>) -> sqlx::Result<u64> {
            self.record("activate")?;
            let mut events = self.events.lock().unwrap();
            let mut count = 0;
            for event in events.iter_mut() {
                if event.deleted_at.is_none()
                    && event.status == EventStatus::Upcoming
                    && event.start_at <= now
                {
                    event.status = EventStatus::Active;
                    count += 1;
                }
            }
            Ok(count)
        }

        async fn complete_ended(&self, now: DateTime<Utc>) -> sqlx::Result<u64> {
            self.record("complete")?;
            let mut events = self.events.lock().unwrap();
            let mut count = 0;
            for event in events.iter_mut() {
                if event.deleted_at.is_none()
                    && event.status == EventStatus::Active
                    && event.end_at.is_some_and(|end_at| end_at <= now)
                {
                    event.status = EventStatus::Complete;
                    count += 1;
                }
            }
            Ok(count)
        }

        async fn complete_overrunning(&self, cutoff: DateTime<Utc>) -> sqlx::Result<u64> {
            self.record("timeout")?;
            let mut events = self.events.lock().unwrap();
            let mut count = 0;
            for event in events.iter_mut() {
                if event.deleted_at.is_none()
                    && event.status == EventStatus::Active
                    && event.end_at.is_none()
                    && event.start_at <= cutoff
                {
                    event.status = EventStatus::Complete;
                    count += 1;
                }
            }
            Ok(count)
        }

        async fn find_stale(&self, now: DateTime<Utc>) -> sqlx::Result<Vec<Event>> {
            self.record("stale")?;
            let cutoff =
                now - ChronoDuration::minutes(config::OPEN_ENDED_EVENT_TIMEOUT_MINUTES);
            let events = self.events.lock().unwrap();
            Ok(events
                .iter()
                .filter(|e| {
                    e.deleted_at.is_none()
                        && match e.status {
                            EventStatus::Upcoming => e.start_at <= now,
                            EventStatus::Active => match e.end_at {
                                Some(end_at) => end_at <= now,
                                None => e.start_at <= cutoff,
                            },
                            EventStatus::Complete | EventStatus::Cancelled => false,
                        }
                })
                .cloned()
                .collect())
        }
    }

    fn event(
        status: EventStatus,
        start_at: DateTime<Utc>,
        end_at: Option<DateTime<Utc>>,
    ) -> Event {
        Event {
            id: Uuid::new_v4(),
            organizer_id: Uuid::new_v4(),
            event_type: EventType::Event,
            title: "pickup game".to_string(),
            description: None,
            sport: Some("football".to_string()),
            start_at,
            end_at,
            capacity: None,
            location_name: None,
            latitude: None,
            longitude: None,
            status,
            created_at: start_at,
            updated_at: start_at,
            deleted_at: None,
        }
    }

    #[tokio::test]
    async fn sweep_applies_all_three_transitions() {
        let now = Utc::now();
        let started = event(EventStatus::Upcoming, now - ChronoDuration::minutes(5), None);
        let ended = event(
            EventStatus::Active,
            now - ChronoDuration::hours(2),
            Some(now - ChronoDuration::minutes(5)),
        );
        let overrunning = event(
            EventStatus::Active,
            now - ChronoDuration::minutes(61),
            None,
        );
        let ids = (started.id, ended.id, overrunning.id);
        let store = MemoryStore::new(vec![started, ended, overrunning]);

        let outcome = run_sweep(&store, now).await.unwrap();

        assert_eq!(
            outcome,
            SweepOutcome {
                activated: 1,
                completed: 1,
                timed_out: 1,
            }
        );
        assert_eq!(store.status_of(ids.0), EventStatus::Active);
        assert_eq!(store.status_of(ids.1), EventStatus::Complete);
        assert_eq!(store.status_of(ids.2), EventStatus::Complete);
    }

    #[tokio::test]
    async fn sweep_is_idempotent() {
        let now = Utc::now();
        let store = MemoryStore::new(vec![
            event(EventStatus::Upcoming, now - ChronoDuration::minutes(5), None),
            event(
                EventStatus::Active,
                now - ChronoDuration::hours(2),
                Some(now - ChronoDuration::minutes(5)),
            ),
        ]);

        let first = run_sweep(&store, now).await.unwrap();
        assert_eq!(first.activated + first.completed + first.timed_out, 2);

        let second = run_sweep(&store, now).await.unwrap();
        assert_eq!(second, SweepOutcome::default());
    }

    #[tokio::test]
    async fn cancelled_events_are_never_touched() {
        let now = Utc::now();
        let cancelled_past = event(
            EventStatus::Cancelled,
            now - ChronoDuration::hours(3),
            Some(now - ChronoDuration::hours(2)),
        );
        let cancelled_open = event(
            EventStatus::Cancelled,
            now - ChronoDuration::hours(3),
            None,
        );
        let ids = (cancelled_past.id, cancelled_open.id);
        let store = MemoryStore::new(vec![cancelled_past, cancelled_open]);

        for _ in 0..3 {
            run_sweep(&store, now).await.unwrap();
        }

        assert_eq!(store.status_of(ids.0), EventStatus::Cancelled);
        assert_eq!(store.status_of(ids.1), EventStatus::Cancelled);
    }

    #[tokio::test]
    async fn open_ended_events_time_out_after_an_hour() {
        let now = Utc::now();
        let overdue = event(
            EventStatus::Active,
            now - ChronoDuration::minutes(61),
            None,
        );
        let recent = event(
            EventStatus::Active,
            now - ChronoDuration::minutes(30),
            None,
        );
        let ids = (overdue.id, recent.id);
        let store = MemoryStore::new(vec![overdue, recent]);

        let outcome = run_sweep(&store, now).await.unwrap();

        assert_eq!(outcome.timed_out, 1);
        assert_eq!(store.status_of(ids.0), EventStatus::Complete);
        assert_eq!(store.status_of(ids.1), EventStatus::Active);
    }

    #[tokio::test]
    async fn lifecycle_follows_the_clock() {
        let t0 = Utc::now();
        let created = event(
            EventStatus::Upcoming,
            t0 + ChronoDuration::hours(1),
            Some(t0 + ChronoDuration::hours(2)),
        );
        let id = created.id;
        let store = MemoryStore::new(vec![created]);

        run_sweep(&store, t0).await.unwrap();
        assert_eq!(store.status_of(id), EventStatus::Upcoming);

        run_sweep(&store, t0 + ChronoDuration::minutes(90)).await.unwrap();
        assert_eq!(store.status_of(id), EventStatus::Active);

        run_sweep(&store, t0 + ChronoDuration::minutes(150)).await.unwrap();
        assert_eq!(store.status_of(id), EventStatus::Complete);
    }

    #[tokio::test]
    async fn a_failing_step_does_not_stop_the_others() {
        let now = Utc::now();
        let ended = event(
            EventStatus::Active,
            now - ChronoDuration::hours(2),
            Some(now - ChronoDuration::minutes(5)),
        );
        let id = ended.id;
        let store = MemoryStore::new(vec![ended]);
        store.fail_on("activate");

        let result = run_sweep(&store, now).await;

        assert!(result.is_err());
        // The later steps still ran and did their work.
        assert_eq!(
            *store.calls.lock().unwrap(),
            vec!["activate", "complete", "timeout"]
        );
        assert_eq!(store.status_of(id), EventStatus::Complete);
    }

    #[tokio::test]
    async fn find_stale_reports_without_mutating() {
        let now = Utc::now();
        let started = event(EventStatus::Upcoming, now - ChronoDuration::minutes(5), None);
        let fresh = event(EventStatus::Upcoming, now + ChronoDuration::hours(1), None);
        let id = started.id;
        let store = MemoryStore::new(vec![started, fresh]);
        let updater = EventStatusUpdater::new(
            Arc::new(store),
            Duration::from_secs(60),
        );

        let stale = updater.find_stale_events(now).await.unwrap();

        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].id, id);
        assert_eq!(stale[0].status, EventStatus::Upcoming);
    }

    #[tokio::test(start_paused = true)]
    async fn start_runs_an_immediate_sweep() {
        let store = Arc::new(MemoryStore::new(vec![]));
        let updater = EventStatusUpdater::new(store.clone(), Duration::from_secs(60));

        updater.start().await;
        assert_eq!(store.sweeps(), 1);

        updater.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn double_start_is_a_noop() {
        let store = Arc::new(MemoryStore::new(vec![]));
        let updater = EventStatusUpdater::new(store.clone(), Duration::from_secs(60));

        updater.start().await;
        updater.start().await;
        assert_eq!(store.sweeps(), 1);

        updater.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn stop_halts_the_periodic_sweeps() {
        let store = Arc::new(MemoryStore::new(vec![]));
        let updater = EventStatusUpdater::new(store.clone(), Duration::from_secs(60));

        updater.start().await;
        time::sleep(Duration::from_secs(150)).await;
        let while_running = store.sweeps();
        assert!(while_running >= 2);

        updater.stop().await;
        let after_stop = store.sweeps();
        time::sleep(Duration::from_secs(300)).await;
        assert_eq!(store.sweeps(), after_stop);
    }

    #[tokio::test(start_paused = true)]
    async fn force_sweep_works_alongside_the_timer() {
        let store = Arc::new(MemoryStore::new(vec![]));
        let updater = EventStatusUpdater::new(store.clone(), Duration::from_secs(60));

        updater.start().await;
        let baseline = store.sweeps();
        updater.force_sweep().await.unwrap();
        assert_eq!(store.sweeps(), baseline + 1);

        updater.stop().await;
    }

    #[tokio::test]
    async fn force_sweep_returns_the_first_error() {
        let store = Arc::new(MemoryStore::new(vec![]));
        store.fail_on("complete");
        let updater = EventStatusUpdater::new(store.clone(), Duration::from_secs(60));

        let result = updater.force_sweep().await;

        assert!(result.is_err());
        assert_eq!(
            *store.calls.lock().unwrap(),
            vec!["activate", "complete", "timeout"]
        );
    }
}
