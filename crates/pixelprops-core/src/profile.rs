use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::field::{IdentityField, ProfileValue};
use crate::fingerprint::{build_id, device_name};

/// A named set of identity descriptor values presented in place of the real
/// device's values.
///
/// Fields are held in canonical field order. An empty text value means "do not
/// set this field"; it is never an error.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityProfile {
    pub name: String,
    pub fields: BTreeMap<IdentityField, ProfileValue>,
}

impl IdentityProfile {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Set a field, replacing any previous value.
    pub fn with(mut self, field: IdentityField, value: impl Into<ProfileValue>) -> Self {
        self.set(field, value);
        self
    }

    pub fn set(&mut self, field: IdentityField, value: impl Into<ProfileValue>) {
        self.fields.insert(field, value.into());
    }

    pub fn get(&self, field: IdentityField) -> Option<&ProfileValue> {
        self.fields.get(&field)
    }

    /// Text value of a field, or "" if absent or non-text.
    pub fn text(&self, field: IdentityField) -> &str {
        match self.fields.get(&field) {
            Some(ProfileValue::Text(s)) => s,
            _ => "",
        }
    }

    /// True when applying this profile would write nothing.
    pub fn is_empty(&self) -> bool {
        self.fields.values().all(ProfileValue::is_empty)
    }

    pub fn iter(&self) -> impl Iterator<Item = (IdentityField, &ProfileValue)> {
        self.fields.iter().map(|(k, v)| (*k, v))
    }
}

/// Names of the profiles in the built-in catalogue.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProfileName {
    MostRecentReferencePhone,
    ReferenceTablet,
    ReferencePhoneCompact,
    CompetitorMusicVendor,
}

impl ProfileName {
    pub const ALL: [ProfileName; 4] = [
        ProfileName::MostRecentReferencePhone,
        ProfileName::ReferenceTablet,
        ProfileName::ReferencePhoneCompact,
        ProfileName::CompetitorMusicVendor,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ProfileName::MostRecentReferencePhone => "most-recent-reference-phone",
            ProfileName::ReferenceTablet => "reference-tablet",
            ProfileName::ReferencePhoneCompact => "reference-phone-compact",
            ProfileName::CompetitorMusicVendor => "competitor-music-vendor",
        }
    }
}

impl fmt::Display for ProfileName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Build a reference-vendor profile from a marketing model and a fingerprint.
///
/// `ID`, `DEVICE` and `PRODUCT` are derived from the fingerprint.
pub fn reference_profile(name: ProfileName, model: &str, fingerprint: &str) -> IdentityProfile {
    let device = device_name(fingerprint);
    IdentityProfile::new(name.as_str())
        .with(IdentityField::Brand, "google")
        .with(IdentityField::Manufacturer, "Google")
        .with(IdentityField::BuildId, build_id(fingerprint))
        .with(IdentityField::Device, device.clone())
        .with(IdentityField::Product, device)
        .with(IdentityField::Model, model)
        .with(IdentityField::Fingerprint, fingerprint)
        .with(IdentityField::BuildType, "user")
        .with(IdentityField::Tags, "release-keys")
}

/// The music-vendor disguise used for vendor-locked music apps.
pub fn music_vendor_profile() -> IdentityProfile {
    IdentityProfile::new(ProfileName::CompetitorMusicVendor.as_str())
        .with(IdentityField::Brand, "meizu")
        .with(IdentityField::Manufacturer, "Meizu")
        .with(IdentityField::Device, "m1892")
        .with(IdentityField::Display, "Flyme")
        .with(IdentityField::Product, "meizu_16thPlus_CN")
        .with(IdentityField::Model, "meizu 16th Plus")
}

/// The generic fields re-applied on every evaluation, ahead of any policy.
pub fn generic_profile() -> IdentityProfile {
    IdentityProfile::new("generic")
        .with(IdentityField::BuildType, "user")
        .with(IdentityField::Tags, "release-keys")
}

/// Model and fingerprint of a reference-vendor profile.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceSource {
    pub model: String,
    pub fingerprint: String,
}

impl ReferenceSource {
    fn new(model: &str, fingerprint: &str) -> Self {
        Self {
            model: model.into(),
            fingerprint: fingerprint.into(),
        }
    }
}

/// Canonical fingerprints the reference profiles are derived from.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ReferenceSources {
    pub most_recent_reference_phone: ReferenceSource,
    pub reference_tablet: ReferenceSource,
    pub reference_phone_compact: ReferenceSource,
}

impl Default for ReferenceSources {
    fn default() -> Self {
        Self {
            most_recent_reference_phone: ReferenceSource::new(
                "Pixel 8 Pro",
                "google/husky/husky:14/UQ1A.240205.004/11269751:user/release-keys",
            ),
            reference_tablet: ReferenceSource::new(
                "Pixel Tablet",
                "google/tangorpro/tangorpro:14/UQ1A.240205.002/11224170:user/release-keys",
            ),
            reference_phone_compact: ReferenceSource::new(
                "Pixel 5a",
                "google/barbet/barbet:14/UQ1A.240205.002/11224170:user/release-keys",
            ),
        }
    }
}

impl ReferenceSources {
    /// Every fingerprint must yield a build id and a device name.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let entries = [
            (ProfileName::MostRecentReferencePhone, &self.most_recent_reference_phone),
            (ProfileName::ReferenceTablet, &self.reference_tablet),
            (ProfileName::ReferencePhoneCompact, &self.reference_phone_compact),
        ];
        for (name, src) in entries {
            let reason = if device_name(&src.fingerprint).is_empty() {
                "fingerprint has no device segment"
            } else if build_id(&src.fingerprint).is_empty() {
                "fingerprint has no build id"
            } else {
                continue;
            };
            return Err(ConfigError::InvalidProfile {
                profile: name.to_string(),
                reason: reason.to_string(),
            });
        }
        Ok(())
    }
}

/// The fixed catalogue of named identity profiles.
///
/// Built once at startup and read-only afterwards.
#[derive(Clone, Debug)]
pub struct ProfileStore {
    recent_phone: IdentityProfile,
    tablet: IdentityProfile,
    compact_phone: IdentityProfile,
    music_vendor: IdentityProfile,
}

impl ProfileStore {
    /// The built-in catalogue.
    pub fn canonical() -> Self {
        Self::from_sources(&ReferenceSources::default())
    }

    /// Catalogue derived from the given reference fingerprints.
    pub fn from_sources(sources: &ReferenceSources) -> Self {
        let build = |name: ProfileName, src: &ReferenceSource| {
            reference_profile(name, &src.model, &src.fingerprint)
        };
        Self {
            recent_phone: build(
                ProfileName::MostRecentReferencePhone,
                &sources.most_recent_reference_phone,
            ),
            tablet: build(ProfileName::ReferenceTablet, &sources.reference_tablet),
            compact_phone: build(
                ProfileName::ReferencePhoneCompact,
                &sources.reference_phone_compact,
            ),
            music_vendor: music_vendor_profile(),
        }
    }

    /// Replace a single catalogue entry.
    pub fn with_profile(mut self, name: ProfileName, profile: IdentityProfile) -> Self {
        *self.slot_mut(name) = profile;
        self
    }

    pub fn get(&self, name: ProfileName) -> &IdentityProfile {
        match name {
            ProfileName::MostRecentReferencePhone => &self.recent_phone,
            ProfileName::ReferenceTablet => &self.tablet,
            ProfileName::ReferencePhoneCompact => &self.compact_phone,
            ProfileName::CompetitorMusicVendor => &self.music_vendor,
        }
    }

    fn slot_mut(&mut self, name: ProfileName) -> &mut IdentityProfile {
        match name {
            ProfileName::MostRecentReferencePhone => &mut self.recent_phone,
            ProfileName::ReferenceTablet => &mut self.tablet,
            ProfileName::ReferencePhoneCompact => &mut self.compact_phone,
            ProfileName::CompetitorMusicVendor => &mut self.music_vendor,
        }
    }
}

impl Default for ProfileStore {
    fn default() -> Self {
        Self::canonical()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recent_phone_derives_id_and_device() {
        let store = ProfileStore::canonical();
        let p = store.get(ProfileName::MostRecentReferencePhone);
        assert_eq!(p.text(IdentityField::BuildId), "UQ1A.240205.004");
        assert_eq!(p.text(IdentityField::Device), "husky");
        assert_eq!(p.text(IdentityField::Product), "husky");
        assert_eq!(p.text(IdentityField::Model), "Pixel 8 Pro");
        assert_eq!(p.text(IdentityField::Brand), "google");
    }

    #[test]
    fn tablet_and_compact_profiles() {
        let store = ProfileStore::canonical();
        assert_eq!(
            store.get(ProfileName::ReferenceTablet).text(IdentityField::Device),
            "tangorpro"
        );
        assert_eq!(
            store
                .get(ProfileName::ReferencePhoneCompact)
                .text(IdentityField::Model),
            "Pixel 5a"
        );
    }

    #[test]
    fn music_vendor_has_no_fingerprint() {
        let p = ProfileStore::canonical()
            .get(ProfileName::CompetitorMusicVendor)
            .clone();
        assert!(p.get(IdentityField::Fingerprint).is_none());
        assert_eq!(p.text(IdentityField::Display), "Flyme");
    }

    #[test]
    fn profile_with_only_empty_values_is_empty() {
        let p = IdentityProfile::new("blank")
            .with(IdentityField::Model, "")
            .with(IdentityField::Fingerprint, "");
        assert!(p.is_empty());
        assert!(IdentityProfile::new("none").is_empty());
        assert!(!generic_profile().is_empty());
    }

    #[test]
    fn fields_iterate_in_canonical_order() {
        let p = reference_profile(
            ProfileName::ReferencePhoneCompact,
            "Pixel 5a",
            "google/barbet/barbet:14/UQ1A.240205.002/11224170:user/release-keys",
        );
        let order: Vec<_> = p.iter().map(|(f, _)| f).collect();
        let mut sorted = order.clone();
        sorted.sort();
        assert_eq!(order, sorted);
        assert_eq!(order.first(), Some(&IdentityField::Brand));
    }

    #[test]
    fn overridden_sources_change_catalogue() {
        let mut sources = ReferenceSources::default();
        sources.most_recent_reference_phone = ReferenceSource::new(
            "Pixel 8",
            "google/shiba/shiba:14/AP1A.240305.019.A1/11445699:user/release-keys",
        );
        let store = ProfileStore::from_sources(&sources);
        let p = store.get(ProfileName::MostRecentReferencePhone);
        assert_eq!(p.text(IdentityField::Device), "shiba");
        assert_eq!(p.text(IdentityField::BuildId), "AP1A.240305.019.A1");
    }

    #[test]
    fn source_validation_rejects_unparsable_fingerprint() {
        assert!(ReferenceSources::default().validate().is_ok());

        let mut sources = ReferenceSources::default();
        sources.reference_tablet.fingerprint = "tangorpro".into();
        let err = sources.validate().unwrap_err();
        assert!(err.to_string().contains("reference-tablet"));

        sources.reference_tablet.fingerprint = "google/tangorpro/tangorpro:14/release".into();
        assert!(matches!(
            sources.validate(),
            Err(ConfigError::InvalidProfile { reason, .. }) if reason.contains("build id")
        ));
    }

    #[test]
    fn profile_name_serde_is_kebab_case() {
        let json = serde_json::to_string(&ProfileName::ReferencePhoneCompact).unwrap();
        assert_eq!(json, "\"reference-phone-compact\"");
    }
}
