// cli.rs - Command-line interface configuration
use std::path::PathBuf;

use clap::Parser;

use crate::config::{ApplyPolicy, SurfaceConfig};
use crate::error::Result;

#[derive(Parser, Debug, Clone)]
#[command(name = "canvas-bitmap-size")]
#[command(about = "Device pixel aligned canvas sizing", long_about = None)]
pub struct Cli {
    /// Never use the device-pixel-content-box observer
    #[arg(long = "no-resize-observer", default_value = "false")]
    pub no_resize_observer: bool,

    /// Capability probe timeout in milliseconds
    #[arg(long = "probe-timeout-ms")]
    pub probe_timeout_ms: Option<u64>,

    /// When to commit suggested bitmap sizes
    #[arg(long = "apply-policy", value_enum)]
    pub apply_policy: Option<ApplyPolicy>,

    /// JSON configuration file; flags override it
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Print the final surface state as JSON on exit
    #[arg(long, default_value = "false")]
    pub snapshot: bool,
}

impl Cli {
    pub fn surface_config(&self) -> Result<SurfaceConfig> {
        let mut config = match &self.config {
            Some(path) => SurfaceConfig::load(path)?,
            None => SurfaceConfig::default(),
        };
        if self.no_resize_observer {
            config.binding.allow_resize_observer = false;
        }
        if let Some(timeout) = self.probe_timeout_ms {
            config.binding.probe_timeout_ms = timeout;
        }
        if let Some(policy) = self.apply_policy {
            config.apply_policy = policy;
        }
        Ok(config)
    }
}
