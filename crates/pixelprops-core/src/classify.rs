use serde::{Deserialize, Serialize};

use crate::packages::{
    StaticPackageLists, CAMERA_PACKAGE_PREFIX, PACKAGE_CORE_SERVICES, PACKAGE_SETUP_FLOW,
    PACKAGE_STORE, PROCESS_CORE_SERVICES_BACKGROUND,
};

/// Screen size category reported by the display configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScreenSize {
    Undefined,
    Small,
    Normal,
    Large,
    XLarge,
}

/// Extra-high density tier, in dots per inch.
pub const DENSITY_XHIGH: u32 = 320;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayMetrics {
    pub screen_size: ScreenSize,
    pub density_dpi: u32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceShape {
    #[default]
    Phone,
    Tablet,
}

impl DeviceShape {
    /// Tablet when the screen is at least "large" or the density is at least
    /// the extra-high tier. Missing metrics classify as a phone.
    pub fn from_metrics(metrics: Option<DisplayMetrics>) -> Self {
        match metrics {
            Some(m) if m.screen_size >= ScreenSize::Large || m.density_dpi >= DENSITY_XHIGH => {
                DeviceShape::Tablet
            }
            _ => DeviceShape::Phone,
        }
    }
}

/// Facts about the calling process, recomputed on every evaluation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PackageClassification {
    pub package: String,
    pub process: String,
    pub is_core_services_process: bool,
    pub is_store_process: bool,
    pub is_setup_flow: bool,
    pub is_google_branded: bool,
    pub is_competitor_branded: bool,
    pub is_camera_app: bool,
    pub is_music_app: bool,
    pub device_shape: DeviceShape,
}

impl PackageClassification {
    pub fn is_core_services_package(&self) -> bool {
        self.package == PACKAGE_CORE_SERVICES
    }
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(needle)
}

/// Classify a package/process pair.
pub fn classify(
    package: &str,
    process: &str,
    lists: &StaticPackageLists,
    device_shape: DeviceShape,
) -> PackageClassification {
    let branded = |needle: &str| contains_ci(package, needle) || contains_ci(process, needle);

    PackageClassification {
        package: package.to_string(),
        process: process.to_string(),
        is_core_services_process: package == PACKAGE_CORE_SERVICES
            && process == PROCESS_CORE_SERVICES_BACKGROUND,
        is_store_process: package == PACKAGE_STORE,
        is_setup_flow: package == PACKAGE_SETUP_FLOW,
        is_google_branded: branded("google"),
        is_competitor_branded: branded("samsung"),
        is_camera_app: package.starts_with(CAMERA_PACKAGE_PREFIX)
            || lists.custom_camera.contains(package),
        is_music_app: lists.vendor_music.contains(package),
        device_shape,
    }
}
