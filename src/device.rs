//! Per-install device identity
//!
//! The id is generated once and kept in a small JSON file next to the store,
//! so pulled records written by this install can be recognized as our own echo.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Identity stamped on every record this device pushes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceIdentity {
    /// Human readable model name
    pub model: String,
    /// UUID, stable for the lifetime of the install
    pub device_id: String,
}

impl DeviceIdentity {
    /// Fresh identity with a random id
    pub fn generate(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            device_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    /// Load the identity stored at `path`, creating it on first use.
    ///
    /// A `model_override` replaces the stored model but never the id.
    pub fn load_or_create(path: &Path, model_override: Option<&str>) -> Result<Self> {
        let mut identity = if path.exists() {
            let raw = std::fs::read_to_string(path)?;
            serde_json::from_str::<DeviceIdentity>(&raw)?
        } else {
            let identity = Self::generate(default_model());
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, serde_json::to_string_pretty(&identity)?)?;
            tracing::info!("Generated device id {} at {}", identity.device_id, path.display());
            identity
        };

        if let Some(model) = model_override {
            identity.model = model.to_string();
        }
        Ok(identity)
    }
}

/// Model name used when none is configured
pub fn default_model() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .filter(|h| !h.trim().is_empty())
        .unwrap_or_else(|| format!("{}-{}", std::env::consts::OS, std::env::consts::ARCH))
}
