//! Well-known package names and the static package lists driving selection.

use std::collections::{BTreeSet, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::field::IdentityField;

/// Core services package.
pub const PACKAGE_CORE_SERVICES: &str = "com.google.android.gms";
/// The core-services background process allowed to certify.
pub const PROCESS_CORE_SERVICES_BACKGROUND: &str = "com.google.android.gms.unstable";
/// Application store package.
pub const PACKAGE_STORE: &str = "com.android.vending";
/// First-boot setup flow.
pub const PACKAGE_SETUP_FLOW: &str = "com.google.android.setupwizard";
/// On-device search/indexing component that keeps a locally unique fingerprint.
pub const PACKAGE_SEARCH_INDEXING: &str = "com.google.android.settings.intelligence";
/// Voice/search assistant.
pub const PACKAGE_SEARCH_ASSISTANT: &str = "com.google.android.googlequicksearchbox";

/// Prefix shared by the vendor camera app variants.
pub const CAMERA_PACKAGE_PREFIX: &str = "com.google.android.GoogleCamera";

/// Component name of the account sign-in screen inside core services.
pub const ACCOUNT_SIGN_IN_ACTIVITY: &str =
    "com.google.android.gms/.auth.uiflows.minutemaid.MinuteMaidActivity";

/// Codenames of devices that already self-identify as a reference device.
pub const REFERENCE_CODENAMES: [&str; 11] = [
    "husky",
    "shiba",
    "felix",
    "tangorpro",
    "lynx",
    "cheetah",
    "panther",
    "bluejay",
    "oriole",
    "raven",
    "barbet",
];

/// Core-services process name fragments that must present the compact phone.
pub const INTERNAL_ROLE_FRAGMENTS: [&str; 6] =
    ["ui", "gservice", "gapps", "learning", "search", "persistent"];

/// Process name fragments eligible for certification.
pub const CERTIFY_ROLE_FRAGMENTS: [&str; 4] =
    ["unstable", "chimera", "pixelmigrate", "instrumentation"];

fn set(items: &[&str]) -> HashSet<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// The static package lists consulted by the selection policy.
///
/// Loaded once; read-only for the process lifetime.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StaticPackageLists {
    /// Always spoofed as the most recent reference phone.
    pub recent_profile: HashSet<String>,
    /// Never spoofed.
    pub always_excluded: HashSet<String>,
    /// Spoofed regardless of vendor branding.
    pub always_add: HashSet<String>,
    /// Custom builds of the camera app.
    pub custom_camera: HashSet<String>,
    /// Vendor-locked music apps.
    pub vendor_music: HashSet<String>,
}

impl Default for StaticPackageLists {
    fn default() -> Self {
        Self {
            recent_profile: set(&[
                PACKAGE_CORE_SERVICES,
                PACKAGE_SEARCH_ASSISTANT,
                "com.google.android.apps.bard",
                "com.google.android.apps.customization.pixel",
                "com.google.android.apps.emojiwallpaper",
                "com.google.android.apps.privacy.wildlife",
                "com.google.android.apps.subscriptions.red",
                "com.google.android.apps.wallpaper",
                "com.google.android.apps.wallpaper.pixel",
                "com.google.android.wallpaper.effects",
                "com.google.pixel.livewallpaper",
            ]),
            always_excluded: set(&[
                PACKAGE_STORE,
                PACKAGE_SETUP_FLOW,
                "com.google.android.apps.miphone.aiai.AiaiApplication",
                "com.google.ar.core",
                "com.google.android.apps.photos",
                "com.google.android.apps.motionsense.bridge",
                "com.google.android.apps.nexuslauncher",
                "com.google.android.apps.pixelmigrate",
                "com.google.android.apps.recorder",
                "com.google.android.apps.restore",
                "com.google.android.apps.tachyon",
                "com.google.android.apps.tycho",
                "com.google.android.apps.wearables.maestro.companion",
                "com.google.android.apps.youtube.kids",
                "com.google.android.apps.youtube.music",
                "com.google.android.as",
                "com.google.android.dialer",
                "com.google.android.euicc",
                "com.google.android.youtube",
                "com.google.oslo",
            ]),
            always_add: set(&[
                "com.amazon.avod.thirdpartyclient",
                "com.android.chrome",
                "com.breel.wallpapers20",
                "com.disney.disneyplus",
                "com.microsoft.android.smsorganizer",
                "com.nhs.online.nhsonline",
                "com.nothing.smartcenter",
                "in.startv.hotstar",
                "jp.id_credit_sp2.android",
            ]),
            custom_camera: set(&[
                "com.google.android.MTCL83",
                "com.google.android.UltraCVM",
                "com.google.android.apps.cameralite",
            ]),
            vendor_music: set(&[
                "com.hihonor.cloudmusic",
                "com.netease.cloudmusic",
                "com.tencent.qqmusic",
                "com.kugou.android",
                "com.kugou.android.lite",
                "cmccwm.mobilemusic",
                "cn.kuwo.player",
                "com.meizu.media.music",
            ]),
        }
    }
}

impl StaticPackageLists {
    /// Exact match on either the package or the process name.
    pub fn is_excluded(&self, package: &str, process: &str) -> bool {
        self.always_excluded.contains(package) || self.always_excluded.contains(process)
    }

    pub fn is_recent(&self, package: &str, process: &str) -> bool {
        self.recent_profile.contains(package) || self.recent_profile.contains(process)
    }

    pub fn is_always_added(&self, package: &str, process: &str) -> bool {
        self.always_add.contains(package) || self.always_add.contains(process)
    }
}

/// Per-package fields that must never be overridden.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RetentionDirective {
    retained: HashMap<String, BTreeSet<IdentityField>>,
}

impl RetentionDirective {
    /// The built-in directive: the search/indexing component keeps its fingerprint.
    pub fn canonical() -> Self {
        Self::default().retain(PACKAGE_SEARCH_INDEXING, IdentityField::Fingerprint)
    }

    pub fn retain(mut self, package: impl Into<String>, field: IdentityField) -> Self {
        self.retained.entry(package.into()).or_default().insert(field);
        self
    }

    pub fn is_retained(&self, package: &str, field: IdentityField) -> bool {
        self.retained
            .get(package)
            .is_some_and(|fields| fields.contains(&field))
    }
}
