//! Shared fakes for orchestrator tests

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tempfile::TempDir;

use readsync::sync::{
    Clock, Collaborators, Connectivity, DigestProvider, MergeFn, NetworkMonitor, Notifier,
    ReaderPosition, SyncOrchestrator, Transport,
};
use readsync::{DeviceIdentity, ProgressRecord, Result, Storage, StorageMode, SyncConfig, SyncError};

pub const DIGEST: &str = "abc";

/// Clock the test moves by hand
#[derive(Default)]
pub struct ManualClock(AtomicI64);

impl ManualClock {
    pub fn set(&self, now: i64) {
        self.0.store(now, Ordering::SeqCst);
    }

    pub fn advance(&self, secs: i64) {
        self.0.fetch_add(secs, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> i64 {
        self.0.load(Ordering::SeqCst)
    }
}

/// Transport that merges a prepared snapshot file, counts calls and can fail or block
#[derive(Default)]
pub struct FakeTransport {
    pub calls: AtomicUsize,
    pub fail: AtomicBool,
    pub remote: Mutex<Option<PathBuf>>,
    pub gate: Mutex<Option<Arc<tokio::sync::Semaphore>>>,
}

impl FakeTransport {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn sync(
        &self,
        _destination: &str,
        local_store: &Path,
        on_merge: &MergeFn,
        _silent: bool,
    ) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let gate = self.gate.lock().clone();
        if let Some(gate) = gate {
            gate.acquire().await.expect("gate closed").forget();
        }

        if self.fail.load(Ordering::SeqCst) {
            return Err(SyncError::Transport("connection reset".to_string()));
        }

        let remote = self.remote.lock().clone();
        if let Some(remote) = remote {
            if !on_merge(local_store, local_store, &remote) {
                return Err(SyncError::LocalStoreInvalid("merge failed".to_string()));
            }
        }
        Ok(())
    }
}

pub struct FakeDigest(pub Mutex<Option<String>>);

impl DigestProvider for FakeDigest {
    fn current_digest(&self) -> Option<String> {
        self.0.lock().clone()
    }
}

pub struct FakeNetwork(pub Mutex<Connectivity>);

impl NetworkMonitor for FakeNetwork {
    fn status(&self) -> Connectivity {
        *self.0.lock()
    }
}

pub struct FakeReader {
    pub position: Mutex<(String, f64)>,
    pub applied: Mutex<Vec<ProgressRecord>>,
}

impl FakeReader {
    pub fn set(&self, cursor: &str, percentage: f64) {
        *self.position.lock() = (cursor.to_string(), percentage);
    }

    pub fn current(&self) -> (String, f64) {
        self.position.lock().clone()
    }

    pub fn applied(&self) -> usize {
        self.applied.lock().len()
    }
}

impl ReaderPosition for FakeReader {
    fn current_progress(&self) -> String {
        self.position.lock().0.clone()
    }

    fn current_percentage(&self) -> f64 {
        self.position.lock().1
    }

    fn apply(&self, record: &ProgressRecord) {
        self.set(&record.progress_cursor, record.percentage);
        self.applied.lock().push(record.clone());
    }
}

#[derive(Default)]
pub struct FakeNotifier {
    pub infos: Mutex<Vec<String>>,
    pub errors: Mutex<Vec<String>>,
    pub prompts: Mutex<Vec<String>>,
    pub accept: AtomicBool,
    /// Never answer a confirmation
    pub hang: AtomicBool,
}

#[async_trait]
impl Notifier for FakeNotifier {
    fn info(&self, message: &str) {
        self.infos.lock().push(message.to_string());
    }

    fn error(&self, message: &str) {
        self.errors.lock().push(message.to_string());
    }

    async fn confirm(&self, message: &str) -> bool {
        self.prompts.lock().push(message.to_string());
        if self.hang.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        self.accept.load(Ordering::SeqCst)
    }
}

/// One simulated device with every collaborator faked
pub struct Harness {
    pub dir: TempDir,
    pub clock: Arc<ManualClock>,
    pub transport: Arc<FakeTransport>,
    pub digest: Arc<FakeDigest>,
    pub network: Arc<FakeNetwork>,
    pub reader: Arc<FakeReader>,
    pub notifier: Arc<FakeNotifier>,
    pub orchestrator: Arc<SyncOrchestrator>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(|_| {})
    }

    pub fn with_config(tweak: impl FnOnce(&mut SyncConfig)) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut config = SyncConfig::new(dir.path().join("local.sqlite3").to_str().unwrap());
        config.destination = Some(dir.path().join("shared").to_string_lossy().into_owned());
        tweak(&mut config);

        let clock = Arc::new(ManualClock::default());
        clock.set(10_000);
        let transport = Arc::new(FakeTransport::default());
        let digest = Arc::new(FakeDigest(Mutex::new(Some(DIGEST.to_string()))));
        let network = Arc::new(FakeNetwork(Mutex::new(Connectivity::Online)));
        let reader = Arc::new(FakeReader {
            position: Mutex::new(("10".to_string(), 0.10)),
            applied: Mutex::new(Vec::new()),
        });
        let notifier = Arc::new(FakeNotifier::default());

        let deps = Collaborators {
            transport: transport.clone(),
            digest: digest.clone(),
            reader: reader.clone(),
            network: network.clone(),
            notifier: notifier.clone(),
            clock: clock.clone(),
        };
        let identity = DeviceIdentity {
            model: "Kobo Libra 2".to_string(),
            device_id: "device-b".to_string(),
        };
        let orchestrator =
            Arc::new(SyncOrchestrator::open(config, identity, deps).expect("open orchestrator"));

        Self {
            dir,
            clock,
            transport,
            digest,
            network,
            reader,
            notifier,
            orchestrator,
        }
    }

    /// Prepare the snapshot the fake transport will merge on the next sync
    pub fn remote_snapshot(&self, records: &[ProgressRecord]) -> PathBuf {
        let path = self.dir.path().join("remote.sqlite3");
        write_store(&path, records);
        *self.transport.remote.lock() = Some(path.clone());
        path
    }

    pub fn stored(&self) -> Option<ProgressRecord> {
        self.orchestrator.storage().read(DIGEST).expect("read")
    }

    pub fn set_network(&self, status: Connectivity) {
        *self.network.0.lock() = status;
    }
}

/// Create a store file at `path` holding `records`
pub fn write_store(path: &Path, records: &[ProgressRecord]) -> Storage {
    let storage =
        Storage::open_path(path.to_str().unwrap(), StorageMode::CloudSafe).expect("open store");
    for record in records {
        storage.write(record).expect("write");
    }
    storage
}

/// Record as device A would have pushed it
pub fn from_device_a(cursor: &str, percentage: f64, timestamp: i64) -> ProgressRecord {
    ProgressRecord::new(DIGEST, cursor, percentage, timestamp, "Kindle", "device-a")
}
