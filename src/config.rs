// config.rs - Binding and surface configuration
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::probe::DEFAULT_PROBE_TIMEOUT;
use crate::error::{Error, Result};

/// Options for a single bitmap size binding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BindingOptions {
    /// Use the device-pixel-content-box observer when the host supports it
    #[serde(alias = "allow_high_precision_watcher")]
    pub allow_resize_observer: bool,
    /// Upper bound on the capability probe, in milliseconds
    pub probe_timeout_ms: u64,
}

impl BindingOptions {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    /// Options that force the pixel density fallback
    pub fn pixel_density_only() -> Self {
        Self { allow_resize_observer: false, ..Self::default() }
    }
}

impl Default for BindingOptions {
    fn default() -> Self {
        Self {
            allow_resize_observer: true,
            probe_timeout_ms: DEFAULT_PROBE_TIMEOUT.as_millis() as u64,
        }
    }
}

/// When a surface commits suggested bitmap sizes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
#[value(rename_all = "snake_case")]
pub enum ApplyPolicy {
    /// Inside the suggestion notification
    Immediate,
    /// At the start of the next frame
    #[default]
    NextFrame,
}

/// Configuration for a [`crate::core::CanvasSurface`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SurfaceConfig {
    pub binding: BindingOptions,
    pub apply_policy: ApplyPolicy,
}

impl SurfaceConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|err| Error::Config(err.to_string()))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|err| Error::Config(format!("{}: {err}", path.display())))?;
        Self::from_json_str(&json)
    }
}
