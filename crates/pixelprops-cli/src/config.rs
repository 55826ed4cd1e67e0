//! Configuration for the dry-run tool

use std::path::PathBuf;

use pixelprops_core::{DisplayMetrics, FeatureFlags, ReferenceSources};
use serde::{Deserialize, Serialize};

/// Main CLI configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CliConfig {
    /// Feature flag values
    #[serde(default)]
    pub flags: FeatureFlags,

    /// Simulated device
    #[serde(default)]
    pub device: DeviceConfig,

    /// Fingerprints the reference profiles are built from
    #[serde(default)]
    pub profiles: ReferenceSources,

    /// JSON bundle of candidate profiles for the core-services process
    #[serde(default)]
    pub bundle: Option<PathBuf>,
}

/// The device the engine pretends to run on
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Codename the device reports for itself
    #[serde(default)]
    pub codename: Option<String>,

    /// Real build time, in milliseconds since the epoch
    #[serde(default = "default_build_time")]
    pub build_time_millis: i64,

    #[serde(default)]
    pub display: Option<DisplayMetrics>,

    /// Activity on top of the focused task
    #[serde(default)]
    pub foreground_activity: Option<String>,

    /// Call stack frames seen by the certificate-chain hook
    #[serde(default)]
    pub call_frames: Vec<String>,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            codename: None,
            build_time_millis: default_build_time(),
            display: None,
            foreground_activity: None,
            call_frames: Vec::new(),
        }
    }
}

fn default_build_time() -> i64 {
    1_707_091_200_000
}

impl CliConfig {
    /// Load configuration from file, then `PIXELPROPS_*` environment variables
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        // e.g. PIXELPROPS_FLAGS__CERTIFY_SPOOF_ENABLED=false
        builder = builder.add_source(
            config::Environment::with_prefix("PIXELPROPS")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }
}
