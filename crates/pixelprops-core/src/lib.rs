//! # pixelprops-core
//!
//! Per-process device identity overrides. When an application process starts,
//! the engine decides which identity profile (if any) the process should see
//! and writes that profile's values onto the process-global identity
//! descriptors.
//!
//! ## Pipeline
//!
//! 1. **Generic pre-pass**: `TYPE=user`, `TAGS=release-keys` for every
//!    resolved process.
//! 2. **Classification**: vendor/competitor branding, core services, store,
//!    setup flow, camera, music, phone or tablet.
//! 3. **Selection**: a priority-ordered rule table yields exactly one
//!    [`Outcome`].
//! 4. **Application**: the chosen profile's fields are written in canonical
//!    order; per-field failures are logged and skipped.
//!
//! ## Attestation guard
//!
//! The core-services background process may only certify while the account
//! sign-in screen keeps its on-top state. See [`guard`].
//!
//! Platform capabilities sit behind the traits in [`traits`]; in-memory
//! versions live in [`mocks`].

pub mod applier;
pub mod classify;
pub mod engine;
pub mod error;
pub mod external;
pub mod field;
pub mod fingerprint;
pub mod flags;
pub mod guard;
pub mod mocks;
pub mod packages;
pub mod profile;
pub mod selection;
pub mod traits;

pub use applier::{FieldWrite, OverrideApplier, SkipReason};
pub use classify::{classify, DeviceShape, DisplayMetrics, PackageClassification, ScreenSize};
pub use engine::{
    AttestationDecision, Collaborators, EngineConfig, EvaluationReport, PropsEngine,
    TerminationCause,
};
pub use error::{
    AttestationError, ConfigError, ObserverError, ProviderError, SchemaError, SettingsError,
    WriteError,
};
pub use external::{BundleProfileProvider, ExternalProfile, SETTINGS_KEY_SELECTED_PROFILE};
pub use field::{FieldSchema, FieldType, IdentityField, ProfileValue, TypedValue};
pub use fingerprint::{build_id, device_name};
pub use flags::{FeatureFlags, MapFlagSource};
pub use guard::{
    is_integrity_caller, should_bypass_task_permission, AttestationGuard, BlockReason,
    GuardState, GuardVerdict, WatchTicket,
};
pub use packages::{RetentionDirective, StaticPackageLists};
pub use profile::{IdentityProfile, ProfileName, ProfileStore, ReferenceSource, ReferenceSources};
pub use selection::{select, Outcome, Selection, SelectionContext, SelectionReason};
pub use traits::{
    CallContext, DisplayInfo, ExternalProfileProvider, FlagSource, ForegroundListener,
    ForegroundTaskObserver, IdentityWriter, PlatformInfo, ProcessControl, ProcessResolver,
    SettingsStore, SubscriptionHandle,
};
