//! Randomized external profiles used by the core-services certification path.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use rand::seq::SliceRandom;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::error::ProviderError;
use crate::field::IdentityField;
use crate::fingerprint::{build_id, device_name};
use crate::profile::IdentityProfile;
use crate::traits::ExternalProfileProvider;

/// Settings key the selected candidate's name is recorded under.
pub const SETTINGS_KEY_SELECTED_PROFILE: &str = "ppu_spoof_build_gms_array";

static INITIAL_SDK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^2[3-6]$").expect("valid sdk pattern"));

/// One candidate from the provider. Every field may be empty.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExternalProfile {
    pub name: String,
    pub product: String,
    pub device: String,
    pub manufacturer: String,
    pub brand: String,
    pub model: String,
    pub fingerprint: String,
    pub security_patch: String,
    pub initial_sdk: String,
    pub build_id: String,
    pub build_type: String,
    pub tags: String,
}

impl ExternalProfile {
    /// Convert to an identity profile, filling derived and defaulted fields.
    ///
    /// An empty device or build id is derived from the fingerprint. The initial
    /// SDK level is only kept when it is one of 23 to 26.
    pub fn into_profile(self) -> IdentityProfile {
        let device = if self.device.is_empty() {
            device_name(&self.fingerprint)
        } else {
            self.device
        };
        let id = if self.build_id.is_empty() {
            build_id(&self.fingerprint)
        } else {
            self.build_id
        };
        let build_type = non_empty_or(self.build_type, "user");
        let tags = non_empty_or(self.tags, "release-keys");

        let mut profile = IdentityProfile::new(self.name)
            .with(IdentityField::Product, self.product)
            .with(IdentityField::Device, device)
            .with(IdentityField::Manufacturer, self.manufacturer)
            .with(IdentityField::Brand, self.brand)
            .with(IdentityField::Model, self.model)
            .with(IdentityField::Fingerprint, self.fingerprint)
            .with(IdentityField::SecurityPatch, self.security_patch)
            .with(IdentityField::BuildId, id)
            .with(IdentityField::BuildType, build_type)
            .with(IdentityField::Tags, tags);

        match self.initial_sdk.parse::<i64>() {
            Ok(sdk) if INITIAL_SDK.is_match(&self.initial_sdk) => {
                profile.set(IdentityField::InitialSdk, sdk);
            }
            _ => error!(
                value = %self.initial_sdk,
                "Value for DEVICE_INITIAL_SDK_INT must be between 23-26"
            ),
        }
        profile
    }
}

fn non_empty_or(value: String, default: &str) -> String {
    if value.is_empty() {
        default.to_string()
    } else {
        value
    }
}

/// Provider reading a JSON array of candidates from disk and picking one at
/// random on every fetch.
#[derive(Clone, Debug)]
pub struct BundleProfileProvider {
    path: PathBuf,
}

impl BundleProfileProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<Vec<ExternalProfile>, ProviderError> {
        let raw = std::fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&raw)?)
    }
}

impl ExternalProfileProvider for BundleProfileProvider {
    fn fetch_external_profile(&self) -> Result<Option<ExternalProfile>, ProviderError> {
        if !self.path.exists() {
            error!(path = %self.path.display(), "Profile bundle is not installed");
            return Ok(None);
        }
        let candidates = self.load()?;
        let picked = candidates.choose(&mut rand::thread_rng()).cloned();
        match &picked {
            Some(p) => debug!(candidate = %p.name, total = candidates.len(), "Picked external profile"),
            None => error!(path = %self.path.display(), "No device arrays found"),
        }
        Ok(picked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::ProfileValue;
    use std::io::Write;

    const HUSKY: &str = "google/husky/husky:14/UQ1A.240205.004/11269751:user/release-keys";

    fn candidate() -> ExternalProfile {
        ExternalProfile {
            name: "husky_beta".into(),
            product: "husky_beta".into(),
            manufacturer: "Google".into(),
            brand: "google".into(),
            model: "Pixel 8 Pro".into(),
            fingerprint: HUSKY.into(),
            security_patch: "2024-02-05".into(),
            initial_sdk: "25".into(),
            ..Default::default()
        }
    }

    #[test]
    fn derives_device_and_id_and_defaults() {
        let p = candidate().into_profile();
        assert_eq!(p.name, "husky_beta");
        assert_eq!(p.text(IdentityField::Device), "husky");
        assert_eq!(p.text(IdentityField::BuildId), "UQ1A.240205.004");
        assert_eq!(p.text(IdentityField::BuildType), "user");
        assert_eq!(p.text(IdentityField::Tags), "release-keys");
        assert_eq!(p.get(IdentityField::InitialSdk), Some(&ProfileValue::Integer(25)));
    }

    #[test]
    fn explicit_values_win_over_derivation() {
        let p = ExternalProfile {
            device: "shiba".into(),
            build_id: "XYZ".into(),
            build_type: "userdebug".into(),
            ..candidate()
        }
        .into_profile();
        assert_eq!(p.text(IdentityField::Device), "shiba");
        assert_eq!(p.text(IdentityField::BuildId), "XYZ");
        assert_eq!(p.text(IdentityField::BuildType), "userdebug");
    }

    #[test]
    fn out_of_range_initial_sdk_is_dropped() {
        for bad in ["22", "27", "", "2x", "250"] {
            let p = ExternalProfile {
                initial_sdk: bad.into(),
                ..candidate()
            }
            .into_profile();
            assert_eq!(p.get(IdentityField::InitialSdk), None, "{bad}");
        }
    }

    #[test]
    fn missing_bundle_yields_none() {
        let provider = BundleProfileProvider::new("/nonexistent/pixelprops/bundle.json");
        assert!(provider.fetch_external_profile().unwrap().is_none());
    }

    #[test]
    fn bundle_picks_one_candidate() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let bundle = serde_json::to_string(&vec![candidate()]).unwrap();
        file.write_all(bundle.as_bytes()).unwrap();

        let provider = BundleProfileProvider::new(file.path());
        let picked = provider.fetch_external_profile().unwrap().unwrap();
        assert_eq!(picked, candidate());
    }

    #[test]
    fn empty_bundle_yields_none() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"[]").unwrap();
        let provider = BundleProfileProvider::new(file.path());
        assert!(provider.fetch_external_profile().unwrap().is_none());
    }

    #[test]
    fn malformed_bundle_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"{not json").unwrap();
        let provider = BundleProfileProvider::new(file.path());
        assert!(matches!(
            provider.fetch_external_profile(),
            Err(ProviderError::Parse(_))
        ));
    }
}
