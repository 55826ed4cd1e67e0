//! Collaborators consumed by the engine.
//!
//! Everything platform-specific sits behind one of these traits: process
//! enumeration, display metrics, feature flags, the randomized profile source,
//! foreground-task notifications, the privileged descriptor write, persisted
//! settings, call-stack inspection and self-termination.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::classify::DisplayMetrics;
use crate::error::{ObserverError, ProviderError, SettingsError, WriteError};
use crate::external::ExternalProfile;
use crate::field::{FieldType, IdentityField, TypedValue};

/// Maps a process id to its process name.
pub trait ProcessResolver: Send + Sync {
    /// `None` when the process cannot be found among the running processes.
    fn resolve_process_name(&self, pid: u32) -> Option<String>;
}

/// Display and configuration metrics of the device.
pub trait DisplayInfo: Send + Sync {
    /// `None` when no display configuration is available.
    fn metrics(&self) -> Option<DisplayMetrics>;
}

/// Read-only facts about the real platform build.
pub trait PlatformInfo: Send + Sync {
    /// Codename the device reports for itself.
    fn device_codename(&self) -> Option<String>;

    /// Real build timestamp, in milliseconds since the epoch.
    fn build_time_millis(&self) -> i64;
}

/// Boolean configuration source. Read on every evaluation.
pub trait FlagSource: Send + Sync {
    fn get_bool(&self, key: &str, default: bool) -> bool;
}

/// Source of randomized candidate profiles.
///
/// Untrusted and optional: `Ok(None)` means no candidate is available.
pub trait ExternalProfileProvider: Send + Sync {
    fn fetch_external_profile(&self) -> Result<Option<ExternalProfile>, ProviderError>;
}

/// Opaque handle to a foreground-change registration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionHandle(pub u64);

/// Receives foreground-task change notifications.
///
/// May be called from any thread, any number of times, until unregistered.
pub trait ForegroundListener: Send + Sync {
    /// `top_activity` is the flattened component name now on top, if any.
    fn on_foreground_changed(&self, top_activity: Option<&str>);
}

/// Foreground-task state and change notifications.
pub trait ForegroundTaskObserver: Send + Sync {
    fn register(
        &self,
        listener: Arc<dyn ForegroundListener>,
    ) -> Result<SubscriptionHandle, ObserverError>;

    fn unregister(&self, handle: SubscriptionHandle) -> Result<(), ObserverError>;

    /// Flattened component name of the activity on top of the focused task.
    fn current_foreground_activity(&self) -> Result<Option<String>, ObserverError>;
}

/// Privileged write onto the process-global identity descriptors.
pub trait IdentityWriter: Send + Sync {
    /// Type the platform declares for a field, or `None` if it has no such field.
    fn declared_type(&self, field: IdentityField) -> Option<FieldType>;

    fn set_field(&self, field: IdentityField, value: TypedValue) -> Result<(), WriteError>;
}

/// Persisted key/value settings, written for diagnostics only.
pub trait SettingsStore: Send + Sync {
    fn put_string(&self, key: &str, value: &str) -> Result<(), SettingsError>;
}

/// Inspection of the active call context.
pub trait CallContext: Send + Sync {
    /// Class or module names of the frames on the current call stack.
    fn call_frames(&self) -> Vec<String>;
}

/// Fatal self-termination of the current process.
pub trait ProcessControl: Send + Sync {
    fn terminate_self(&self);
}
