use crate::device_response::{DeviceSnapshot, Envelope};
use crate::error::UpdateError;
use crate::eyedro_api::EyedroAPI;
use crate::metrics::{self, DerivedMetrics};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct PollFailure {
    pub at: DateTime<Utc>,
    pub reason: String,
}

/// Latest snapshot plus poll bookkeeping, replaced as a whole on every poll.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CoordinatorState {
    pub snapshot: Option<DeviceSnapshot>,
    pub last_update_success: bool,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_failure: Option<PollFailure>,
    pub consecutive_failures: u32,
}

impl CoordinatorState {
    fn record_success(&mut self, snapshot: DeviceSnapshot, at: DateTime<Utc>) {
        self.snapshot = Some(snapshot);
        self.last_update_success = true;
        self.last_success_at = Some(at);
        self.consecutive_failures = 0;
    }

    // Snapshot is left untouched, readers keep seeing the last good values
    fn record_failure(&mut self, reason: String, at: DateTime<Utc>) {
        self.last_update_success = false;
        self.last_failure = Some(PollFailure { at, reason });
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
    }

    pub fn metrics(&self) -> Option<DerivedMetrics> {
        metrics::reduce_latest(self.snapshot.as_ref())
    }
}

#[derive(Debug)]
struct Inner {
    api: EyedroAPI,
    envelope: Envelope,
    state: watch::Sender<CoordinatorState>,
    update_interval: watch::Sender<Duration>,
}

/// Polls one device and keeps its latest snapshot. Clones share the same state;
/// concurrent `refresh` calls are applied in completion order.
#[derive(Debug, Clone)]
pub struct EyedroCoordinator {
    inner: Arc<Inner>,
}

impl EyedroCoordinator {
    pub fn new(api: EyedroAPI, envelope: Envelope, update_interval: Duration) -> Self {
        let (state, _) = watch::channel(CoordinatorState::default());
        let (update_interval, _) = watch::channel(update_interval);
        Self {
            inner: Arc::new(Inner {
                api,
                envelope,
                state,
                update_interval,
            }),
        }
    }

    pub fn api(&self) -> &EyedroAPI {
        &self.inner.api
    }

    pub fn envelope(&self) -> Envelope {
        self.inner.envelope
    }

    pub async fn refresh(&self) -> Result<DeviceSnapshot, UpdateError> {
        match self.inner.api.get_data(self.inner.envelope).await {
            Ok(snapshot) => {
                self.inner
                    .state
                    .send_modify(|state| state.record_success(snapshot, Utc::now()));
                debug!("Eyedro {} updated: {snapshot:?}", self.inner.api.base_url());
                Ok(snapshot)
            }
            Err(e) => {
                let reason = e.to_string();
                let mut failures = 0;
                self.inner.state.send_modify(|state| {
                    state.record_failure(reason, Utc::now());
                    failures = state.consecutive_failures;
                });
                warn!(
                    "Eyedro {} poll failed ({} in a row): {}",
                    self.inner.api.base_url(),
                    failures,
                    e
                );
                Err(e)
            }
        }
    }

    /// Initial refresh done during setup; the caller aborts setup on error.
    pub async fn first_refresh(&self) -> Result<DeviceSnapshot, UpdateError> {
        info!("Fetching initial data from {}", self.inner.api.url());
        self.refresh().await
    }

    pub fn state(&self) -> CoordinatorState {
        self.inner.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<CoordinatorState> {
        self.inner.state.subscribe()
    }

    pub fn is_available(&self) -> bool {
        self.inner.state.borrow().last_update_success
    }

    pub fn snapshot(&self) -> Option<DeviceSnapshot> {
        self.inner.state.borrow().snapshot
    }

    pub fn metrics(&self) -> Option<DerivedMetrics> {
        self.inner.state.borrow().metrics()
    }

    pub fn total_power_kw(&self) -> Option<f64> {
        self.snapshot().as_ref().map(metrics::total_power_kw)
    }

    pub fn total_current_a(&self) -> Option<f64> {
        self.snapshot().as_ref().map(metrics::total_current_a)
    }

    pub fn average_voltage_v(&self) -> Option<f64> {
        self.snapshot().as_ref().map(metrics::average_voltage_v)
    }

    pub fn average_power_factor_pct(&self) -> Option<f64> {
        self.snapshot().as_ref().map(metrics::average_power_factor_pct)
    }

    pub fn update_interval(&self) -> Duration {
        *self.inner.update_interval.borrow()
    }

    pub fn set_update_interval(&self, update_interval: Duration) {
        self.inner.update_interval.send_replace(update_interval);
    }

    /// Spawns the periodic poll loop. The first poll happens one interval from
    /// now, setup is expected to have called [`Self::first_refresh`] already.
    pub fn spawn(&self) -> CoordinatorHandle {
        let coordinator = self.clone();
        let task = tokio::spawn(async move {
            coordinator.run().await;
        });
        CoordinatorHandle {
            coordinator: self.clone(),
            task,
        }
    }

    async fn run(&self) {
        info!("Starting Eyedro poll loop for {}", self.inner.api.base_url());
        let mut interval_changes = self.inner.update_interval.subscribe();

        loop {
            let period = *interval_changes.borrow_and_update();
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            debug!("Polling every {period:?}");

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        // Failures are recorded in the state and logged by refresh
                        let _ = self.refresh().await;
                    }
                    changed = interval_changes.changed() => {
                        if changed.is_err() {
                            return;
                        }
                        break;
                    }
                }
            }
        }
    }
}

/// Owns a running poll loop. Dropping it cancels the loop, including any
/// request in flight.
#[derive(Debug)]
pub struct CoordinatorHandle {
    coordinator: EyedroCoordinator,
    task: JoinHandle<()>,
}

impl CoordinatorHandle {
    pub fn coordinator(&self) -> &EyedroCoordinator {
        &self.coordinator
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    pub async fn shutdown(mut self) {
        self.task.abort();
        let _ = (&mut self.task).await;
        info!(
            "Stopped Eyedro poll loop for {}",
            self.coordinator.api().base_url()
        );
    }
}

impl Drop for CoordinatorHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}
