//! Screen-level reload coordination.
//!
//! A screen asks for fresh data through a [`Reloader`], which debounces
//! repeated requests, drives a loading flag with a hard ceiling, runs the
//! network work on spawned tasks and reports user-facing failures as
//! [`Alert`]s. Background reloads fail quietly: their outcome only shows in
//! record sync status and the last [`SyncSummary`].

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::config::Config;
use crate::models::EntityKind;
use crate::remote::{RemoteService, SyncScope};
use crate::sync_client::{SyncClient, SyncSummary};

/// Who asked for a reload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadTrigger {
    /// Pull-to-refresh, a button, or any other explicit user action
    User,
    /// Screen focus, timers and other automatic refreshes
    Background,
}

/// A failure worth showing to the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alert {
    pub title: String,
    pub message: String,
}

/// Drops reloads that arrive within `window` of the last accepted one.
pub struct ReloadGate {
    window: Duration,
    last: Mutex<Option<Instant>>,
}

impl ReloadGate {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last: Mutex::new(None),
        }
    }

    /// Accept a reload now, or refuse it if one was accepted too recently.
    pub fn try_acquire(&self) -> bool {
        let mut last = match self.last.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let now = Instant::now();
        if let Some(previous) = *last {
            if now.duration_since(previous) < self.window {
                return false;
            }
        }
        *last = Some(now);
        true
    }
}

/// Loading flag that clears itself after `ceiling` even if the work
/// it tracks never finishes.
pub struct LoadingIndicator {
    state: watch::Sender<bool>,
    ceiling: Duration,
    generation: Arc<AtomicU64>,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl LoadingIndicator {
    pub fn new(ceiling: Duration) -> Self {
        let (state, _) = watch::channel(false);
        Self {
            state,
            ceiling,
            generation: Arc::new(AtomicU64::new(0)),
            timer: Mutex::new(None),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.state.subscribe()
    }

    pub fn is_loading(&self) -> bool {
        *self.state.borrow()
    }

    /// Raise the flag. The returned token clears it through [`finish`](Self::finish).
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self) -> u64 {
        let token = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.send_replace(true);

        let state = self.state.clone();
        let generation = Arc::clone(&self.generation);
        let ceiling = self.ceiling;
        let timer = tokio::spawn(async move {
            tokio::time::sleep(ceiling).await;
            if generation.load(Ordering::SeqCst) == token {
                tracing::warn!("Reload still running after {:?}, hiding loading state", ceiling);
                state.send_replace(false);
            }
        });

        if let Some(previous) = self.lock_timer().replace(timer) {
            previous.abort();
        }
        token
    }

    /// Lower the flag if `token` belongs to the most recent start.
    pub fn finish(&self, token: u64) {
        if self.generation.load(Ordering::SeqCst) == token {
            self.clear();
        }
    }

    /// Lower the flag unconditionally.
    pub fn clear(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(timer) = self.lock_timer().take() {
            timer.abort();
        }
        self.state.send_replace(false);
    }

    fn lock_timer(&self) -> std::sync::MutexGuard<'_, Option<JoinHandle<()>>> {
        match self.timer.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// What a spawned reload does
enum ReloadJob {
    Pull(Vec<EntityKind>),
    SyncAll,
}

/// Runs reloads for one screen.
pub struct Reloader<R> {
    client: Arc<SyncClient<R>>,
    gate: ReloadGate,
    loading: Arc<LoadingIndicator>,
    alerts: broadcast::Sender<Alert>,
    last_summary: watch::Sender<Option<SyncSummary>>,
    active: Arc<AtomicBool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl<R: RemoteService + 'static> Reloader<R> {
    pub fn new(client: Arc<SyncClient<R>>, debounce: Duration, loading_timeout: Duration) -> Self {
        let (alerts, _) = broadcast::channel(16);
        let (last_summary, _) = watch::channel(None);
        Self {
            client,
            gate: ReloadGate::new(debounce),
            loading: Arc::new(LoadingIndicator::new(loading_timeout)),
            alerts,
            last_summary,
            active: Arc::new(AtomicBool::new(true)),
            tasks: Mutex::new(Vec::new()),
        }
    }

    pub fn from_config(client: Arc<SyncClient<R>>, config: &Config) -> Self {
        let sync = config.sync_config();
        Self::new(client, sync.reload_debounce(), sync.loading_timeout())
    }

    pub fn loading(&self) -> &LoadingIndicator {
        &self.loading
    }

    pub fn subscribe_alerts(&self) -> broadcast::Receiver<Alert> {
        self.alerts.subscribe()
    }

    /// Outcome of the most recent reload that completed while active
    pub fn last_summary(&self) -> Option<SyncSummary> {
        self.last_summary.borrow().clone()
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Pull `kinds` from the server. Returns false if the reload was dropped.
    pub fn reload(&self, kinds: &[EntityKind], scope: SyncScope, trigger: ReloadTrigger) -> bool {
        self.spawn(ReloadJob::Pull(kinds.to_vec()), scope, trigger)
    }

    /// Push local drafts and pull every kind. Returns false if dropped.
    pub fn sync_now(&self, scope: SyncScope, trigger: ReloadTrigger) -> bool {
        self.spawn(ReloadJob::SyncAll, scope, trigger)
    }

    /// Wait for every reload spawned so far.
    pub async fn wait_idle(&self) {
        let tasks: Vec<_> = self.lock_tasks().drain(..).collect();
        for result in join_all(tasks).await {
            if let Err(e) = result {
                if !e.is_cancelled() {
                    tracing::error!("Reload task failed: {}", e);
                }
            }
        }
    }

    /// Stop all reloads. Results that arrive later are dropped.
    pub fn deactivate(&self) {
        self.active.store(false, Ordering::SeqCst);
        for task in self.lock_tasks().drain(..) {
            task.abort();
        }
        self.loading.clear();
        tracing::debug!("Reloader deactivated");
    }

    fn spawn(&self, job: ReloadJob, scope: SyncScope, trigger: ReloadTrigger) -> bool {
        if !self.is_active() {
            return false;
        }
        if !self.client.is_enabled() {
            tracing::debug!("Reload dropped: sync is disabled");
            return false;
        }
        if !self.gate.try_acquire() {
            tracing::debug!("Reload dropped: within debounce window");
            return false;
        }

        let token = self.loading.start();
        let client = Arc::clone(&self.client);
        let loading = Arc::clone(&self.loading);
        let active = Arc::clone(&self.active);
        let alerts = self.alerts.clone();
        let last_summary = self.last_summary.clone();

        let task = tokio::spawn(async move {
            let result = match job {
                ReloadJob::Pull(kinds) => client.pull_many(&kinds, &scope).await,
                ReloadJob::SyncAll => client.sync_all(&scope).await,
            };

            if !active.load(Ordering::SeqCst) {
                tracing::debug!("Ignoring reload result after deactivation");
                return;
            }
            loading.finish(token);

            let failure = match result {
                Ok(summary) => {
                    let failure = (!summary.success).then(|| summary.errors.join("\n"));
                    last_summary.send_replace(Some(summary));
                    failure
                }
                Err(e) => Some(e.to_string()),
            };

            let Some(message) = failure else {
                return;
            };
            match trigger {
                ReloadTrigger::User => {
                    // No subscribers is fine
                    let _ = alerts.send(Alert {
                        title: "Sync failed".to_string(),
                        message,
                    });
                }
                ReloadTrigger::Background => {
                    tracing::warn!("Background reload failed: {}", message);
                }
            }
        });

        let mut tasks = self.lock_tasks();
        tasks.retain(|t| !t.is_finished());
        tasks.push(task);
        true
    }

    fn lock_tasks(&self) -> std::sync::MutexGuard<'_, Vec<JoinHandle<()>>> {
        match self.tasks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl<R> Drop for Reloader<R> {
    fn drop(&mut self) {
        if let Ok(tasks) = self.tasks.get_mut() {
            for task in tasks.drain(..) {
                task.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conflicts::ConflictPolicy;
    use crate::error::RosterError;
    use crate::remote::mock::MockRemote;
    use crate::store::Store;
    use serde_json::json;
    use tokio::sync::broadcast::error::TryRecvError;

    fn reloader(remote: Arc<MockRemote>) -> Reloader<MockRemote> {
        let store = Arc::new(Mutex::new(Store::new_in_memory().unwrap()));
        let client = Arc::new(SyncClient::new(store, remote, ConflictPolicy::default(), 5));
        Reloader::new(client, Duration::from_secs(5), Duration::from_secs(10))
    }

    #[tokio::test(start_paused = true)]
    async fn test_gate_window() {
        let gate = ReloadGate::new(Duration::from_secs(5));
        assert!(gate.try_acquire());
        assert!(!gate.try_acquire());

        tokio::time::advance(Duration::from_secs(4)).await;
        assert!(!gate.try_acquire());

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(gate.try_acquire());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rapid_reloads_make_one_network_call() {
        let remote = Arc::new(MockRemote::new());
        remote.seed(EntityKind::Task, json!({ "task_id": 1, "project_id": 50, "name": "Lift" }));
        let reloader = reloader(remote.clone());

        assert!(reloader.reload(&[EntityKind::Task], SyncScope::all(), ReloadTrigger::User));
        assert!(!reloader.reload(&[EntityKind::Task], SyncScope::all(), ReloadTrigger::User));
        assert!(!reloader.reload(&[EntityKind::Task], SyncScope::all(), ReloadTrigger::Background));
        reloader.wait_idle().await;

        assert_eq!(remote.fetches(), 1);
        assert_eq!(reloader.last_summary().unwrap().pulled, 1);
        assert!(!reloader.loading().is_loading());

        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(reloader.reload(&[EntityKind::Task], SyncScope::all(), ReloadTrigger::User));
        reloader.wait_idle().await;
        assert_eq!(remote.fetches(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabled_sync_drops_reloads() {
        let remote = Arc::new(MockRemote::new());
        let reloader = reloader(remote.clone());
        reloader.client.set_enabled(false);

        assert!(!reloader.reload(&[EntityKind::Task], SyncScope::all(), ReloadTrigger::User));
        assert!(!reloader.sync_now(SyncScope::all(), ReloadTrigger::Background));
        assert!(!reloader.loading().is_loading());
        reloader.wait_idle().await;
        assert_eq!(remote.fetches(), 0);

        // The debounce window was not consumed by the dropped reloads
        reloader.client.set_enabled(true);
        assert!(reloader.reload(&[EntityKind::Task], SyncScope::all(), ReloadTrigger::User));
        reloader.wait_idle().await;
        assert_eq!(remote.fetches(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_loading_clears_after_ceiling() {
        let remote = Arc::new(MockRemote::new());
        remote.delay_fetch(Duration::from_secs(60));
        let reloader = reloader(remote.clone());
        let mut loading = reloader.loading().subscribe();

        assert!(reloader.reload(&[EntityKind::Project], SyncScope::all(), ReloadTrigger::User));
        assert!(reloader.loading().is_loading());

        let started = Instant::now();
        loading.wait_for(|on| !*on).await.unwrap();
        let waited = started.elapsed();
        assert!(waited >= Duration::from_secs(10) && waited < Duration::from_secs(11));

        // The request itself is still outstanding
        assert!(reloader.last_summary().is_none());
        reloader.deactivate();
    }

    #[tokio::test(start_paused = true)]
    async fn test_loading_clears_on_completion() {
        let remote = Arc::new(MockRemote::new());
        remote.delay_fetch(Duration::from_secs(2));
        let reloader = reloader(remote);

        let started = Instant::now();
        reloader.reload(&[EntityKind::Project], SyncScope::all(), ReloadTrigger::User);
        reloader.wait_idle().await;

        assert!(!reloader.loading().is_loading());
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_alerts_only_for_user_reloads() {
        let remote = Arc::new(MockRemote::new());
        let reloader = reloader(remote.clone());
        let mut alerts = reloader.subscribe_alerts();

        remote.fail_fetch(RosterError::server(500, "boom"));
        reloader.reload(&[EntityKind::Task], SyncScope::all(), ReloadTrigger::Background);
        reloader.wait_idle().await;
        assert!(matches!(alerts.try_recv(), Err(TryRecvError::Empty)));
        assert!(!reloader.last_summary().unwrap().success);

        tokio::time::advance(Duration::from_secs(5)).await;
        remote.fail_fetch(RosterError::server(500, "boom"));
        reloader.reload(&[EntityKind::Task], SyncScope::all(), ReloadTrigger::User);
        reloader.wait_idle().await;

        let alert = alerts.try_recv().unwrap();
        assert_eq!(alert.title, "Sync failed");
        assert!(alert.message.contains("500"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_login_alerts_user() {
        let remote = Arc::new(MockRemote::new());
        remote.fail_fetch(RosterError::Unauthorized);
        let reloader = reloader(remote);
        let mut alerts = reloader.subscribe_alerts();

        reloader.sync_now(SyncScope::all(), ReloadTrigger::User);
        reloader.wait_idle().await;

        let alert = alerts.try_recv().unwrap();
        assert!(alert.message.contains("log in again"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deactivate_drops_late_results() {
        let remote = Arc::new(MockRemote::new());
        remote.delay_fetch(Duration::from_secs(3));
        remote.seed(EntityKind::Task, json!({ "task_id": 1, "project_id": 50, "name": "Lift" }));
        let reloader = reloader(remote.clone());

        reloader.reload(&[EntityKind::Task], SyncScope::all(), ReloadTrigger::User);
        reloader.deactivate();
        tokio::time::sleep(Duration::from_secs(5)).await;

        assert!(reloader.last_summary().is_none());
        assert!(!reloader.loading().is_loading());
        assert!(!reloader.is_active());

        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(!reloader.reload(&[EntityKind::Task], SyncScope::all(), ReloadTrigger::User));
    }
}
