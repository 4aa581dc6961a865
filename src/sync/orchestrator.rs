//! Sync orchestrator
//!
//! Decides when the local store is written or read and when the transport
//! runs. Background calls are debounced per direction on the monotonic clock,
//! gated on the connectivity level they need (deferred as continuations
//! rather than failed) and guarded so at most one push and one pull are in
//! flight at any time. Background prompts run on their own task so the
//! caller never waits for the user. Failures stop here: interactive calls
//! get one generic notice, background calls are only logged.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::lifecycle::{AutoSync, LifecycleEvent, LifecycleEventKind};
use super::merge::on_merge;
use super::providers::{
    Clock, Connectivity, DigestProvider, NetworkMonitor, Notifier, ReaderPosition,
};
use super::transport::Transport;
use super::SyncDirection;
use crate::device::DeviceIdentity;
use crate::error::{Result, SyncError};
use crate::storage::Storage;
use crate::types::{ProgressRecord, SyncConfig, SyncStrategy};

/// Everything the orchestrator needs from the host application
#[derive(Clone)]
pub struct Collaborators {
    pub transport: Arc<dyn Transport>,
    pub digest: Arc<dyn DigestProvider>,
    pub reader: Arc<dyn ReaderPosition>,
    pub network: Arc<dyn NetworkMonitor>,
    pub notifier: Arc<dyn Notifier>,
    pub clock: Arc<dyn Clock>,
}

/// How a push or pull was requested
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncRequest {
    /// Connectivity to wait for; `None` tries right away
    pub requires: Option<Connectivity>,
    /// User initiated: bypasses debounce, reports every result
    pub interactive: bool,
}

impl SyncRequest {
    pub const INTERACTIVE: Self = Self {
        requires: Some(Connectivity::Online),
        interactive: true,
    };
    pub const BACKGROUND: Self = Self {
        requires: None,
        interactive: false,
    };
    pub const BACKGROUND_ONLINE: Self = Self {
        requires: Some(Connectivity::Online),
        interactive: false,
    };
    /// Link up is enough (e.g. a shared folder on the local network)
    pub const BACKGROUND_CONNECTED: Self = Self {
        requires: Some(Connectivity::Connected),
        interactive: false,
    };
}

/// Observable orchestration phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Idle,
    AwaitingNetwork,
    Pushing,
    Pulling,
}

/// Why a call stopped before touching the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NoDestination,
    NoDigest,
}

impl SkipReason {
    fn as_error(&self) -> SyncError {
        match self {
            SkipReason::NoDestination => SyncError::NoSyncDestinationConfigured,
            SkipReason::NoDigest => SyncError::MissingDocumentDigest,
        }
    }
}

/// Result of applying the pull policy to the pulled record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PullOutcome {
    /// Nothing stored for this document
    NoRecord,
    /// The record is our own echo
    OwnDevice,
    /// Remote position equals the local one
    AlreadySynchronized,
    /// Reader moved to the remote position
    Applied,
    /// User refused the prompt
    Declined,
    /// Strategy for this direction is disabled
    Disabled,
    /// Question handed to the notifier; the answer is applied off the caller's task
    Prompted,
}

/// What a call or event did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Dropped by the debounce window
    Debounced,
    /// Dropped because a background call of the same direction is running
    InFlight,
    /// Queued until the network is back
    Deferred,
    Skipped(SkipReason),
    Pushed,
    Pulled(PullOutcome),
    /// Error caught at the boundary (message only)
    Failed(String),
    /// A timer was armed
    Scheduled,
    /// Page turn recorded, nothing scheduled
    PageTracked,
    /// Event not subscribed in the current auto-sync state
    Ignored,
}

/// In-memory per-session state, rebuilt from reading activity
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceSyncState {
    pub push_timestamp: Option<i64>,
    pub pull_timestamp: Option<i64>,
    pub page_update_counter: u32,
    pub last_page: Option<u64>,
    pub last_page_turn_timestamp: Option<i64>,
    pub periodic_push_scheduled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Continuation {
    direction: SyncDirection,
    request: SyncRequest,
}

struct Inner {
    state: DeviceSyncState,
    auto_sync: AutoSync,
    pending: VecDeque<Continuation>,
    push_deadline: Option<Instant>,
    pull_deadline: Option<Instant>,
    push_started: Option<Instant>,
    pull_started: Option<Instant>,
    pushing: bool,
    pulling: bool,
    prompt: Option<JoinHandle<PullOutcome>>,
}

impl Inner {
    fn phase(&self) -> SyncPhase {
        if self.pushing {
            SyncPhase::Pushing
        } else if self.pulling {
            SyncPhase::Pulling
        } else if !self.pending.is_empty() {
            SyncPhase::AwaitingNetwork
        } else {
            SyncPhase::Idle
        }
    }

    fn active(&mut self, direction: SyncDirection) -> &mut bool {
        match direction {
            SyncDirection::Push => &mut self.pushing,
            SyncDirection::Pull => &mut self.pulling,
        }
    }
}

/// Marks one direction as running until dropped
struct PhaseGuard<'a> {
    inner: &'a Mutex<Inner>,
    direction: SyncDirection,
}

impl<'a> PhaseGuard<'a> {
    fn enter(inner: &'a Mutex<Inner>, direction: SyncDirection) -> Self {
        *inner.lock().active(direction) = true;
        Self { inner, direction }
    }
}

impl Drop for PhaseGuard<'_> {
    fn drop(&mut self) {
        *self.inner.lock().active(self.direction) = false;
    }
}

/// Coordinates the local store, the transport and the pull policy
pub struct SyncOrchestrator {
    config: SyncConfig,
    storage: Storage,
    identity: DeviceIdentity,
    deps: Collaborators,
    inner: Mutex<Inner>,
    push_flight: tokio::sync::Mutex<()>,
    pull_flight: tokio::sync::Mutex<()>,
}

impl SyncOrchestrator {
    pub fn new(
        config: SyncConfig,
        storage: Storage,
        identity: DeviceIdentity,
        deps: Collaborators,
    ) -> Self {
        let auto_sync = AutoSync::from_enabled(config.auto_sync);
        Self {
            config,
            storage,
            identity,
            deps,
            inner: Mutex::new(Inner {
                state: DeviceSyncState::default(),
                auto_sync,
                pending: VecDeque::new(),
                push_deadline: None,
                pull_deadline: None,
                push_started: None,
                pull_started: None,
                pushing: false,
                pulling: false,
                prompt: None,
            }),
            push_flight: tokio::sync::Mutex::new(()),
            pull_flight: tokio::sync::Mutex::new(()),
        }
    }

    /// Open the store named in `config` and build an orchestrator over it
    pub fn open(config: SyncConfig, identity: DeviceIdentity, deps: Collaborators) -> Result<Self> {
        let storage = Storage::open(&config)?;
        Ok(Self::new(config, storage, identity, deps))
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    /// Snapshot of the session state
    pub fn state(&self) -> DeviceSyncState {
        self.inner.lock().state.clone()
    }

    pub fn phase(&self) -> SyncPhase {
        self.inner.lock().phase()
    }

    pub fn auto_sync(&self) -> AutoSync {
        self.inner.lock().auto_sync
    }

    /// Number of operations waiting for connectivity
    pub fn pending_continuations(&self) -> usize {
        self.inner.lock().pending.len()
    }

    /// Switch auto-sync on or off; switching off drops armed timers
    pub fn set_auto_sync(&self, enabled: bool) {
        let next = AutoSync::from_enabled(enabled);
        let mut inner = self.inner.lock();
        if inner.auto_sync == next {
            return;
        }
        tracing::info!("Auto sync {:?} -> {:?}", inner.auto_sync, next);
        inner.auto_sync = next;
        if next == AutoSync::Off {
            inner.push_deadline = None;
            inner.pull_deadline = None;
            inner.state.periodic_push_scheduled = false;
            inner.state.page_update_counter = 0;
        }
    }

    /// Write the current position locally, then reconcile and upload
    pub async fn push(&self, request: SyncRequest) -> SyncOutcome {
        self.run(SyncDirection::Push, request).await
    }

    /// Reconcile and download, then apply the pull policy
    pub async fn pull(&self, request: SyncRequest) -> SyncOutcome {
        self.run(SyncDirection::Pull, request).await
    }

    /// Dispatch a lifecycle event according to the auto-sync state
    pub async fn handle_event(&self, event: LifecycleEvent) -> SyncOutcome {
        let kind = event.kind();

        // Continuations belong to calls that were already accepted
        if kind == LifecycleEventKind::NetworkConnected {
            self.run_pending_continuations().await;
        }

        let auto_sync = self.auto_sync();
        if !auto_sync.subscribes(kind) {
            tracing::trace!("{:?} ignored while auto sync is {:?}", kind, auto_sync);
            return SyncOutcome::Ignored;
        }

        match event {
            LifecycleEvent::ReaderReady => self.pull(SyncRequest::BACKGROUND_ONLINE).await,
            LifecycleEvent::PageUpdate(page) => self.on_page_update(page),
            LifecycleEvent::CloseDocument | LifecycleEvent::Suspend => {
                self.unschedule_periodic_push();
                self.push(SyncRequest::BACKGROUND).await
            }
            LifecycleEvent::Resume => {
                self.schedule_pull(Duration::from_millis(self.config.resume_pull_delay_ms))
            }
            LifecycleEvent::NetworkConnected => {
                self.pull(SyncRequest::BACKGROUND_CONNECTED).await
            }
            LifecycleEvent::NetworkDisconnecting => self.push(SyncRequest::BACKGROUND).await,
            LifecycleEvent::PushNow => self.push(SyncRequest::INTERACTIVE).await,
            LifecycleEvent::PullNow => self.pull(SyncRequest::INTERACTIVE).await,
        }
    }

    /// Run, in FIFO order, every queued continuation whose connectivity
    /// level is reached; the others stay queued
    pub async fn run_pending_continuations(&self) -> Vec<SyncOutcome> {
        let status = self.deps.network.status();

        let ready: VecDeque<Continuation> = {
            let mut inner = self.inner.lock();
            let (ready, waiting): (VecDeque<_>, VecDeque<_>) = inner
                .pending
                .drain(..)
                .partition(|c| c.request.requires.map_or(true, |level| status >= level));
            inner.pending = waiting;
            ready
        };

        let mut outcomes = Vec::with_capacity(ready.len());
        for continuation in ready {
            tracing::debug!("Resuming deferred {:?}", continuation.direction);
            outcomes.push(self.run(continuation.direction, continuation.request).await);
        }
        outcomes
    }

    /// Earliest armed timer, if any
    pub fn next_deadline(&self) -> Option<Instant> {
        let inner = self.inner.lock();
        [inner.push_deadline, inner.pull_deadline]
            .into_iter()
            .flatten()
            .min()
    }

    /// Fire the timers whose deadline has passed
    pub async fn run_due_timers(&self) -> Vec<SyncOutcome> {
        let now = Instant::now();
        let (push_due, pull_due) = {
            let mut inner = self.inner.lock();
            let push_due = matches!(inner.push_deadline, Some(d) if d <= now);
            if push_due {
                inner.push_deadline = None;
                inner.state.periodic_push_scheduled = false;
                inner.state.page_update_counter = 0;
            }
            let pull_due = matches!(inner.pull_deadline, Some(d) if d <= now);
            if pull_due {
                inner.pull_deadline = None;
            }
            (push_due, pull_due)
        };

        let mut outcomes = Vec::new();
        if push_due {
            outcomes.push(self.push(SyncRequest::BACKGROUND).await);
        }
        if pull_due {
            outcomes.push(self.pull(SyncRequest::BACKGROUND_CONNECTED).await);
        }
        outcomes
    }

    /// Drop the armed periodic push, if any
    pub fn unschedule_periodic_push(&self) {
        let mut inner = self.inner.lock();
        inner.push_deadline = None;
        inner.state.periodic_push_scheduled = false;
    }

    /// Wait for the open background prompt, if any, and return the user's choice
    pub async fn wait_for_prompt(&self) -> Option<PullOutcome> {
        let prompt = self.inner.lock().prompt.take()?;
        prompt.await.ok()
    }

    /// Drop every timer and any open prompt; queued network continuations
    /// stay until the process ends
    pub fn shutdown(&self) {
        let mut inner = self.inner.lock();
        inner.push_deadline = None;
        inner.pull_deadline = None;
        inner.state.periodic_push_scheduled = false;
        if let Some(prompt) = inner.prompt.take() {
            prompt.abort();
        }
    }

    fn on_page_update(&self, page: u64) -> SyncOutcome {
        let now = self.deps.clock.now();
        let delay = Duration::from_millis(self.config.periodic_push_delay_ms);

        let mut inner = self.inner.lock();
        if inner.state.last_page == Some(page) {
            return SyncOutcome::PageTracked;
        }
        inner.state.last_page = Some(page);
        inner.state.last_page_turn_timestamp = Some(now);
        inner.state.page_update_counter += 1;

        let threshold_reached = matches!(
            self.config.pages_before_update,
            Some(n) if n > 0 && inner.state.page_update_counter >= n
        );
        if inner.state.periodic_push_scheduled || threshold_reached {
            // Re-arming moves the single deadline instead of stacking pushes
            inner.push_deadline = Some(Instant::now() + delay);
            inner.state.periodic_push_scheduled = true;
            inner.state.page_update_counter = 0;
            tracing::debug!("Periodic push scheduled in {:?}", delay);
            return SyncOutcome::Scheduled;
        }
        SyncOutcome::PageTracked
    }

    fn schedule_pull(&self, delay: Duration) -> SyncOutcome {
        self.inner.lock().pull_deadline = Some(Instant::now() + delay);
        tracing::debug!("Pull scheduled in {:?}", delay);
        SyncOutcome::Scheduled
    }

    fn network_reaches(&self, level: Connectivity) -> bool {
        self.deps.network.status() >= level
    }

    fn prompt_open(&self) -> bool {
        matches!(&self.inner.lock().prompt, Some(prompt) if !prompt.is_finished())
    }

    // Monotonic: wall clock jumps neither reopen nor extend the window
    fn is_debounced(&self, direction: SyncDirection) -> bool {
        let window = Duration::from_secs(self.config.debounce_secs.max(0) as u64);
        let inner = self.inner.lock();
        let started = match direction {
            SyncDirection::Push => inner.push_started,
            SyncDirection::Pull => inner.pull_started,
        };
        matches!(started, Some(t) if t.elapsed() <= window)
    }

    fn defer(&self, direction: SyncDirection, request: SyncRequest) {
        let continuation = Continuation { direction, request };
        let mut inner = self.inner.lock();
        if !inner.pending.contains(&continuation) {
            inner.pending.push_back(continuation);
        }
        tracing::info!("{:?} deferred until the network is available", direction);
    }

    async fn run(&self, direction: SyncDirection, request: SyncRequest) -> SyncOutcome {
        let now = self.deps.clock.now();

        if !request.interactive && self.is_debounced(direction) {
            tracing::debug!(
                "{:?} dropped: previous one started less than {}s ago",
                direction,
                self.config.debounce_secs
            );
            return SyncOutcome::Debounced;
        }

        let destination = match self.config.destination.as_deref() {
            Some(d) if !d.trim().is_empty() => d.to_string(),
            _ => return self.report_skip(SkipReason::NoDestination, request),
        };

        if let Some(level) = request.requires {
            if !self.network_reaches(level) {
                self.defer(direction, request);
                return SyncOutcome::Deferred;
            }
        }

        if direction == SyncDirection::Pull && !request.interactive && self.prompt_open() {
            tracing::debug!("Pull dropped: a prompt is still open");
            return SyncOutcome::InFlight;
        }

        let flight = match direction {
            SyncDirection::Push => &self.push_flight,
            SyncDirection::Pull => &self.pull_flight,
        };
        let _flight = if request.interactive {
            flight.lock().await
        } else {
            match flight.try_lock() {
                Ok(guard) => guard,
                Err(_) => {
                    tracing::debug!("{:?} dropped: one is already in flight", direction);
                    return SyncOutcome::InFlight;
                }
            }
        };

        let digest = match self.deps.digest.current_digest() {
            Some(digest) => digest,
            None => return self.report_skip(SkipReason::NoDigest, request),
        };

        {
            let mut inner = self.inner.lock();
            let started = Some(Instant::now());
            match direction {
                SyncDirection::Push => {
                    inner.push_started = started;
                    inner.state.push_timestamp = Some(now);
                }
                SyncDirection::Pull => {
                    inner.pull_started = started;
                    inner.state.pull_timestamp = Some(now);
                }
            }
        }

        let _phase = PhaseGuard::enter(&self.inner, direction);
        match direction {
            SyncDirection::Push => self.do_push(&destination, digest, now, request).await,
            SyncDirection::Pull => self.do_pull(&destination, &digest, request).await,
        }
    }

    async fn do_push(
        &self,
        destination: &str,
        digest: String,
        now: i64,
        request: SyncRequest,
    ) -> SyncOutcome {
        let timestamp = self
            .inner
            .lock()
            .state
            .last_page_turn_timestamp
            .unwrap_or(now);
        let record = ProgressRecord::new(
            digest,
            self.deps.reader.current_progress(),
            self.deps.reader.current_percentage(),
            timestamp,
            &self.identity.model,
            &self.identity.device_id,
        );

        // Local first: progress survives a failing transport
        if let Err(e) = self.storage.write(&record) {
            return self.fail(SyncDirection::Push, e, request);
        }

        match self.exchange(destination, request).await {
            Ok(()) => {
                tracing::info!(
                    "Pushed progress {} ({}) for {}",
                    record.progress_cursor,
                    record.percent_label(),
                    record.doc_digest
                );
                if request.interactive {
                    self.deps.notifier.info("Progress has been pushed.");
                }
                SyncOutcome::Pushed
            }
            Err(e) => self.fail(SyncDirection::Push, e, request),
        }
    }

    async fn do_pull(&self, destination: &str, digest: &str, request: SyncRequest) -> SyncOutcome {
        if let Err(e) = self.exchange(destination, request).await {
            return self.fail(SyncDirection::Pull, e, request);
        }

        let remote = match self.storage.read(digest) {
            Ok(remote) => remote,
            Err(e) => return self.fail(SyncDirection::Pull, e, request),
        };

        let outcome = self.apply_pull_policy(remote, request);
        tracing::info!("Pulled progress for {}: {:?}", digest, outcome);
        SyncOutcome::Pulled(outcome)
    }

    async fn exchange(&self, destination: &str, request: SyncRequest) -> Result<()> {
        if self.storage.is_in_memory() {
            return Err(SyncError::Config(
                "an in-memory store cannot be synced".to_string(),
            ));
        }
        self.storage.checkpoint()?;

        let local = Path::new(self.storage.db_path());
        self.deps
            .transport
            .sync(destination, local, &on_merge, !request.interactive)
            .await
    }

    fn apply_pull_policy(
        &self,
        remote: Option<ProgressRecord>,
        request: SyncRequest,
    ) -> PullOutcome {
        let notifier = &self.deps.notifier;

        let remote = match remote {
            Some(remote) => remote,
            None => {
                if request.interactive {
                    notifier.info("No progress has been recorded for this document yet.");
                }
                return PullOutcome::NoRecord;
            }
        };

        if remote.origin_device_id == self.identity.device_id {
            if request.interactive {
                notifier.info("Latest progress is coming from this device.");
            }
            return PullOutcome::OwnDevice;
        }

        let local_progress = self.deps.reader.current_progress();
        let local_percentage = self.deps.reader.current_percentage();
        if remote.percentage == local_percentage || remote.progress_cursor == local_progress {
            if request.interactive {
                notifier.info("Progress is already synchronized.");
            }
            return PullOutcome::AlreadySynchronized;
        }

        if request.interactive {
            self.deps.reader.apply(&remote);
            notifier.info("Progress has been synchronized.");
            return PullOutcome::Applied;
        }

        let last_turn = self.inner.lock().state.last_page_turn_timestamp;
        let forward = match last_turn {
            Some(turned_at) => remote.timestamp > turned_at,
            None => remote.percentage > local_percentage,
        };

        match self.config.strategy_for(forward) {
            SyncStrategy::Silent => {
                self.deps.reader.apply(&remote);
                notifier.info("Progress has been synchronized.");
                PullOutcome::Applied
            }
            SyncStrategy::Prompt => {
                let question = format!(
                    "Sync to {} location {} from device '{}'?",
                    if forward { "latest" } else { "previous" },
                    remote.percent_label(),
                    remote.origin_device
                );
                let notifier = notifier.clone();
                let reader = self.deps.reader.clone();
                let prompt = tokio::spawn(async move {
                    if notifier.confirm(&question).await {
                        reader.apply(&remote);
                        tracing::info!("Moved to {} after confirmation", remote.progress_cursor);
                        PullOutcome::Applied
                    } else {
                        tracing::info!("Pulled position declined");
                        PullOutcome::Declined
                    }
                });
                self.inner.lock().prompt = Some(prompt);
                PullOutcome::Prompted
            }
            SyncStrategy::Disabled => PullOutcome::Disabled,
        }
    }

    fn report_skip(&self, reason: SkipReason, request: SyncRequest) -> SyncOutcome {
        let error = reason.as_error();
        if request.interactive {
            self.deps.notifier.error(error.user_message());
        } else {
            tracing::debug!("Background sync skipped: {}", error);
        }
        SyncOutcome::Skipped(reason)
    }

    fn fail(&self, direction: SyncDirection, error: SyncError, request: SyncRequest) -> SyncOutcome {
        if request.interactive {
            tracing::error!("{:?} failed: {}", direction, error);
            self.deps.notifier.error(error.user_message());
        } else {
            tracing::warn!("Background {:?} failed: {}", direction, error);
        }
        SyncOutcome::Failed(error.to_string())
    }
}
