//! Core types for readsync

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Result, SyncError};

/// Stable identity of a document, supplied by a `DigestProvider`
pub type DocDigest = String;

/// One reading position per document, as stored on disk and exchanged between devices
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressRecord {
    /// Document identity (primary key)
    pub doc_digest: DocDigest,
    /// Opaque position marker (page number or structural pointer)
    pub progress_cursor: String,
    /// Normalized completion in [0.0, 1.0]
    pub percentage: f64,
    /// Unix seconds on the origin device's clock
    pub timestamp: i64,
    /// Human readable device model
    pub origin_device: String,
    /// Install-scoped device UUID
    pub origin_device_id: String,
}

impl ProgressRecord {
    /// Create a record, clamping the percentage into [0, 1]
    pub fn new(
        doc_digest: impl Into<String>,
        progress_cursor: impl Into<String>,
        percentage: f64,
        timestamp: i64,
        origin_device: impl Into<String>,
        origin_device_id: impl Into<String>,
    ) -> Self {
        Self {
            doc_digest: doc_digest.into(),
            progress_cursor: progress_cursor.into(),
            percentage: clamp_percentage(percentage),
            timestamp,
            origin_device: origin_device.into(),
            origin_device_id: origin_device_id.into(),
        }
    }

    /// Percentage rendered for user-facing messages, e.g. "40%"
    pub fn percent_label(&self) -> String {
        format!("{:.0}%", self.percentage * 100.0)
    }
}

/// Clamp a completion ratio into [0, 1]; NaN collapses to 0
pub fn clamp_percentage(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// What to do with a pulled position that is ahead of / behind the local one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SyncStrategy {
    /// Jump right away and show a short notice
    Silent,
    /// Ask first
    #[default]
    Prompt,
    /// Leave the position alone
    Disabled,
}

impl std::fmt::Display for SyncStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncStrategy::Silent => write!(f, "silent"),
            SyncStrategy::Prompt => write!(f, "prompt"),
            SyncStrategy::Disabled => write!(f, "disabled"),
        }
    }
}

impl std::str::FromStr for SyncStrategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "silent" => Ok(SyncStrategy::Silent),
            "prompt" => Ok(SyncStrategy::Prompt),
            "disabled" | "disable" | "never" => Ok(SyncStrategy::Disabled),
            _ => Err(format!("Unknown sync strategy: {}", s)),
        }
    }
}

/// Storage mode for SQLite
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum StorageMode {
    /// WAL journal; must be checkpointed before the file is shipped
    Local,
    /// DELETE journal; the store is always one self-contained file
    #[default]
    CloudSafe,
}

impl std::str::FromStr for StorageMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "local" | "wal" => Ok(StorageMode::Local),
            "cloud-safe" | "cloud_safe" | "delete" => Ok(StorageMode::CloudSafe),
            _ => Err(format!("Unknown storage mode: {}", s)),
        }
    }
}

/// Configuration for the store and the sync orchestrator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Path to the local SQLite store
    pub store_path: String,
    /// Storage mode (local or cloud-safe)
    #[serde(default)]
    pub storage_mode: StorageMode,
    /// Shared folder the store is exchanged through
    #[serde(default)]
    pub destination: Option<String>,
    /// Sync on lifecycle events (open, close, suspend, resume, network)
    #[serde(default)]
    pub auto_sync: bool,
    /// Schedule a background push after this many page turns
    #[serde(default)]
    pub pages_before_update: Option<u32>,
    /// Strategy when the pulled position is ahead of ours
    #[serde(default)]
    pub sync_forward: SyncStrategy,
    /// Strategy when the pulled position is behind ours
    #[serde(default = "default_backward")]
    pub sync_backward: SyncStrategy,
    /// Non-interactive calls in the same direction inside this window are dropped
    #[serde(default = "default_debounce_secs")]
    pub debounce_secs: i64,
    /// Delay between reaching the page threshold and the background push
    #[serde(default = "default_periodic_push_delay")]
    pub periodic_push_delay_ms: u64,
    /// Delay between device resume and the pull it triggers
    #[serde(default = "default_resume_pull_delay")]
    pub resume_pull_delay_ms: u64,
    /// Override for the device model recorded in pushed records
    #[serde(default)]
    pub device_model: Option<String>,
}

fn default_backward() -> SyncStrategy {
    SyncStrategy::Disabled
}

fn default_debounce_secs() -> i64 {
    25
}

fn default_periodic_push_delay() -> u64 {
    10_000
}

fn default_resume_pull_delay() -> u64 {
    1_000
}

impl SyncConfig {
    /// Config for a store at `store_path` with every other field defaulted
    pub fn new(store_path: impl Into<String>) -> Self {
        Self {
            store_path: store_path.into(),
            storage_mode: StorageMode::default(),
            destination: None,
            auto_sync: false,
            pages_before_update: None,
            sync_forward: SyncStrategy::default(),
            sync_backward: default_backward(),
            debounce_secs: default_debounce_secs(),
            periodic_push_delay_ms: default_periodic_push_delay(),
            resume_pull_delay_ms: default_resume_pull_delay(),
            device_model: None,
        }
    }

    /// In-memory store, used by tests
    pub fn in_memory() -> Self {
        Self::new(":memory:")
    }

    /// Parse a TOML config document
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| SyncError::Config(e.to_string()))
    }

    /// Load a TOML config file
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    /// Strategy for a pulled record classified as newer (`forward`) or older
    pub fn strategy_for(&self, forward: bool) -> SyncStrategy {
        if forward {
            self.sync_forward
        } else {
            self.sync_backward
        }
    }
}
