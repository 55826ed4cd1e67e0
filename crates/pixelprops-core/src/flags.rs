use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::traits::FlagSource;

pub const KEY_GLOBAL_SPOOF: &str = "ro.pixelprops.enabled";
pub const KEY_SOFT_OVERRIDE: &str = "persist.sys.pixelprops";
pub const KEY_FORCED_OVERRIDE: &str = "persist.sys.pixelprops.force";
pub const KEY_CERTIFY_SPOOF: &str = "persist.sys.pif";
pub const KEY_VENDOR_MUSIC: &str = "persist.sys.disguise_props_for_music_app";
pub const KEY_DEBUG_LOGGING: &str = "persist.sys.pixelprops.debug";

/// Snapshot of the feature flags for one evaluation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureFlags {
    pub global_spoof_enabled: bool,
    pub soft_override_enabled: bool,
    pub forced_override_enabled: bool,
    pub certify_spoof_enabled: bool,
    pub vendor_music_spoof_enabled: bool,
    pub debug_logging_enabled: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            global_spoof_enabled: true,
            soft_override_enabled: true,
            forced_override_enabled: false,
            certify_spoof_enabled: true,
            vendor_music_spoof_enabled: false,
            debug_logging_enabled: false,
        }
    }
}

impl FeatureFlags {
    /// Read every flag from `source`, falling back to the defaults.
    pub fn read(source: &dyn FlagSource) -> Self {
        let d = Self::default();
        Self {
            global_spoof_enabled: source.get_bool(KEY_GLOBAL_SPOOF, d.global_spoof_enabled),
            soft_override_enabled: source.get_bool(KEY_SOFT_OVERRIDE, d.soft_override_enabled),
            forced_override_enabled: source
                .get_bool(KEY_FORCED_OVERRIDE, d.forced_override_enabled),
            certify_spoof_enabled: source.get_bool(KEY_CERTIFY_SPOOF, d.certify_spoof_enabled),
            vendor_music_spoof_enabled: source
                .get_bool(KEY_VENDOR_MUSIC, d.vendor_music_spoof_enabled),
            debug_logging_enabled: source.get_bool(KEY_DEBUG_LOGGING, d.debug_logging_enabled),
        }
    }
}

/// Flag source backed by a fixed key/value map.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MapFlagSource {
    values: HashMap<String, bool>,
}

impl MapFlagSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: bool) -> Self {
        self.values.insert(key.into(), value);
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: bool) {
        self.values.insert(key.into(), value);
    }
}

impl From<FeatureFlags> for MapFlagSource {
    fn from(flags: FeatureFlags) -> Self {
        Self::new()
            .with(KEY_GLOBAL_SPOOF, flags.global_spoof_enabled)
            .with(KEY_SOFT_OVERRIDE, flags.soft_override_enabled)
            .with(KEY_FORCED_OVERRIDE, flags.forced_override_enabled)
            .with(KEY_CERTIFY_SPOOF, flags.certify_spoof_enabled)
            .with(KEY_VENDOR_MUSIC, flags.vendor_music_spoof_enabled)
            .with(KEY_DEBUG_LOGGING, flags.debug_logging_enabled)
    }
}

impl FlagSource for MapFlagSource {
    fn get_bool(&self, key: &str, default: bool) -> bool {
        self.values.get(key).copied().unwrap_or(default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_source_yields_defaults() {
        let flags = FeatureFlags::read(&MapFlagSource::new());
        assert_eq!(flags, FeatureFlags::default());
        assert!(flags.soft_override_enabled);
        assert!(!flags.forced_override_enabled);
    }

    #[test]
    fn source_values_override_defaults() {
        let source = MapFlagSource::new()
            .with(KEY_CERTIFY_SPOOF, false)
            .with(KEY_VENDOR_MUSIC, true);
        let flags = FeatureFlags::read(&source);
        assert!(!flags.certify_spoof_enabled);
        assert!(flags.vendor_music_spoof_enabled);
        assert!(flags.global_spoof_enabled);
    }

    #[test]
    fn snapshot_converts_back_to_source() {
        let flags = FeatureFlags {
            forced_override_enabled: true,
            certify_spoof_enabled: false,
            ..FeatureFlags::default()
        };
        assert_eq!(FeatureFlags::read(&MapFlagSource::from(flags)), flags);
    }

    #[test]
    fn map_source_deserializes_from_plain_table() {
        let source: MapFlagSource =
            serde_json::from_str(r#"{"persist.sys.pixelprops.force": true}"#).unwrap();
        assert!(source.get_bool(KEY_FORCED_OVERRIDE, false));
    }
}
