//! Selection policy: the priority-ordered rule table that picks exactly one
//! outcome for a classified process.
//!
//! Rules, first match wins:
//!
//! 1. Always-excluded package or process: no change.
//! 2. Core services package: the background-services process certifies through
//!    the external provider (or terminates when certification spoofing is
//!    switched off); every core-services process gets its timestamp stamped.
//!    Other core-services processes continue to rule 3.
//! 3. Vendor-branded, competitor-branded or always-added: a reference profile,
//!    subject to the global and override flags.
//! 4. Vendor music apps: the music-vendor profile, when enabled.
//! 5. Otherwise no change.

use serde::Serialize;

use crate::classify::{DeviceShape, PackageClassification};
use crate::flags::FeatureFlags;
use crate::packages::{StaticPackageLists, INTERNAL_ROLE_FRAGMENTS, REFERENCE_CODENAMES};
use crate::profile::{ProfileName, ProfileStore};

/// What the pipeline should do for this process.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "profile", rename_all = "snake_case")]
pub enum Outcome {
    NoChange,
    Profile(ProfileName),
    ExternalProfile,
    TerminateSelf,
}

/// Which rule produced the outcome.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionReason {
    Excluded,
    CoreServicesCertify,
    CoreServicesCertifyDisabled,
    SpoofDisabledByConfig,
    ReferenceDevice,
    SpoofDisabledByFlag,
    CameraEmptyProfile,
    ReferenceProfile,
    VendorMusic,
    NoRuleMatched,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Selection {
    pub outcome: Outcome,
    pub reason: SelectionReason,
    /// Stamp the current time into `TIME`, independently of the outcome.
    pub stamp_time: bool,
}

/// Per-evaluation inputs that do not come from the classification.
#[derive(Clone, Copy, Debug)]
pub struct SelectionContext<'a> {
    pub flags: FeatureFlags,
    /// Codename the real device reports for itself.
    pub device_codename: Option<&'a str>,
    /// Result of the attestation guard's eligibility check. Only consulted for
    /// the core-services background process.
    pub may_certify: bool,
}

fn has_role_fragment(process: &str, fragments: &[&str]) -> bool {
    let process = process.to_lowercase();
    fragments.iter().any(|f| process.contains(f))
}

/// True when the device already identifies as a supported reference device.
pub fn is_reference_device(codename: Option<&str>) -> bool {
    codename.is_some_and(|c| REFERENCE_CODENAMES.contains(&c))
}

/// Apply the rule table.
pub fn select(
    c: &PackageClassification,
    ctx: &SelectionContext<'_>,
    lists: &StaticPackageLists,
    store: &ProfileStore,
) -> Selection {
    let done = |outcome, reason, stamp_time| Selection {
        outcome,
        reason,
        stamp_time,
    };

    // Rule 1
    if lists.is_excluded(&c.package, &c.process) {
        return done(Outcome::NoChange, SelectionReason::Excluded, false);
    }

    // Rule 2
    let stamp_time = c.is_core_services_package();
    if c.is_core_services_process && ctx.may_certify {
        return if ctx.flags.certify_spoof_enabled {
            done(
                Outcome::ExternalProfile,
                SelectionReason::CoreServicesCertify,
                stamp_time,
            )
        } else {
            done(
                Outcome::TerminateSelf,
                SelectionReason::CoreServicesCertifyDisabled,
                stamp_time,
            )
        };
    }

    // Rule 3
    let always_added = lists.is_always_added(&c.package, &c.process);
    if (c.is_google_branded && !c.is_core_services_process)
        || c.is_competitor_branded
        || always_added
    {
        let flags = &ctx.flags;
        if !flags.global_spoof_enabled {
            return done(
                Outcome::NoChange,
                SelectionReason::SpoofDisabledByConfig,
                stamp_time,
            );
        }
        let reference = is_reference_device(ctx.device_codename);
        if reference && !flags.soft_override_enabled && !flags.forced_override_enabled {
            return done(
                Outcome::NoChange,
                SelectionReason::ReferenceDevice,
                stamp_time,
            );
        }
        if !reference && !flags.soft_override_enabled {
            return done(
                Outcome::NoChange,
                SelectionReason::SpoofDisabledByFlag,
                stamp_time,
            );
        }

        let mut name = if lists.is_recent(&c.package, &c.process) || always_added {
            ProfileName::MostRecentReferencePhone
        } else if c.device_shape == DeviceShape::Tablet {
            ProfileName::ReferenceTablet
        } else {
            ProfileName::ReferencePhoneCompact
        };

        // Internal core-services processes must match the UI-facing identity.
        if c.is_core_services_package() && has_role_fragment(&c.process, &INTERNAL_ROLE_FRAGMENTS)
        {
            name = ProfileName::ReferencePhoneCompact;
        }

        if c.is_camera_app && store.get(name).is_empty() {
            return done(
                Outcome::NoChange,
                SelectionReason::CameraEmptyProfile,
                stamp_time,
            );
        }
        return done(
            Outcome::Profile(name),
            SelectionReason::ReferenceProfile,
            stamp_time,
        );
    }

    // Rule 4
    if ctx.flags.vendor_music_spoof_enabled && c.is_music_app {
        return done(
            Outcome::Profile(ProfileName::CompetitorMusicVendor),
            SelectionReason::VendorMusic,
            stamp_time,
        );
    }

    // Rule 5
    done(Outcome::NoChange, SelectionReason::NoRuleMatched, stamp_time)
}
