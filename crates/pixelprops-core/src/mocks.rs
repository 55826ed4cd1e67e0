//! In-memory collaborators for tests and dry runs.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::classify::DisplayMetrics;
use crate::error::{ObserverError, ProviderError, SettingsError, WriteError};
use crate::external::ExternalProfile;
use crate::field::{FieldType, IdentityField, TypedValue};
use crate::traits::{
    CallContext, DisplayInfo, ExternalProfileProvider, ForegroundListener,
    ForegroundTaskObserver, IdentityWriter, PlatformInfo, ProcessControl, ProcessResolver,
    SettingsStore, SubscriptionHandle,
};

/// Identity writer that records every successful write.
///
/// Declares every schema field with its schema type unless told otherwise.
#[derive(Default)]
pub struct RecordingWriter {
    missing: HashSet<IdentityField>,
    declared: HashMap<IdentityField, FieldType>,
    failing: HashSet<IdentityField>,
    writes: Mutex<Vec<(IdentityField, TypedValue)>>,
}

impl RecordingWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pretend the platform has no such field.
    pub fn without_field(mut self, field: IdentityField) -> Self {
        self.missing.insert(field);
        self
    }

    /// Declare a field with a non-schema type.
    pub fn with_declared(mut self, field: IdentityField, ty: FieldType) -> Self {
        self.declared.insert(field, ty);
        self
    }

    /// Reject every write to `field`.
    pub fn failing_on(mut self, field: IdentityField) -> Self {
        self.failing.insert(field);
        self
    }

    /// Successful writes, in write order.
    pub fn writes(&self) -> Vec<(IdentityField, TypedValue)> {
        self.writes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Last value written to `field`.
    pub fn value_of(&self, field: IdentityField) -> Option<TypedValue> {
        self.writes()
            .into_iter()
            .rev()
            .find(|(f, _)| *f == field)
            .map(|(_, v)| v)
    }

    pub fn clear(&self) {
        self.writes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl IdentityWriter for RecordingWriter {
    fn declared_type(&self, field: IdentityField) -> Option<FieldType> {
        if self.missing.contains(&field) {
            return None;
        }
        Some(
            self.declared
                .get(&field)
                .copied()
                .unwrap_or_else(|| field.field_type()),
        )
    }

    fn set_field(&self, field: IdentityField, value: TypedValue) -> Result<(), WriteError> {
        if self.missing.contains(&field) {
            return Err(WriteError::FieldNotFound(field));
        }
        if self.failing.contains(&field) {
            return Err(WriteError::TypeMismatch {
                field,
                reason: "rejected by recording writer".into(),
            });
        }
        self.writes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((field, value));
        Ok(())
    }
}

/// Resolves process names from a fixed pid table.
#[derive(Clone, Debug, Default)]
pub struct StaticProcessResolver {
    processes: HashMap<u32, String>,
}

impl StaticProcessResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, pid: u32, name: impl Into<String>) -> Self {
        self.processes.insert(pid, name.into());
        self
    }
}

impl ProcessResolver for StaticProcessResolver {
    fn resolve_process_name(&self, pid: u32) -> Option<String> {
        self.processes.get(&pid).cloned()
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct StaticDisplay(pub Option<DisplayMetrics>);

impl DisplayInfo for StaticDisplay {
    fn metrics(&self) -> Option<DisplayMetrics> {
        self.0
    }
}

#[derive(Clone, Debug, Default)]
pub struct StaticPlatform {
    pub codename: Option<String>,
    pub build_time_millis: i64,
}

impl StaticPlatform {
    pub fn new(codename: Option<&str>, build_time_millis: i64) -> Self {
        Self {
            codename: codename.map(str::to_string),
            build_time_millis,
        }
    }
}

impl PlatformInfo for StaticPlatform {
    fn device_codename(&self) -> Option<String> {
        self.codename.clone()
    }

    fn build_time_millis(&self) -> i64 {
        self.build_time_millis
    }
}

/// Foreground observer driven by hand.
///
/// `notify` delivers synchronously on the calling thread to every registered
/// listener.
#[derive(Default)]
pub struct MockForegroundObserver {
    top: Mutex<Option<String>>,
    listeners: Mutex<BTreeMap<u64, Arc<dyn ForegroundListener>>>,
    next_id: AtomicU64,
    registrations: AtomicUsize,
    on_register: Option<Option<String>>,
    fail_register: bool,
    fail_unregister: bool,
    fail_query: bool,
}

impl MockForegroundObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_top(self, activity: impl Into<String>) -> Self {
        *self.top.lock().unwrap_or_else(PoisonError::into_inner) = Some(activity.into());
        self
    }

    /// Deliver a change to `top` while `register` is still running, i.e.
    /// before the caller can read its decision.
    pub fn notify_on_register(mut self, top: Option<&str>) -> Self {
        self.on_register = Some(top.map(str::to_string));
        self
    }

    pub fn failing_register(mut self) -> Self {
        self.fail_register = true;
        self
    }

    pub fn failing_unregister(mut self) -> Self {
        self.fail_unregister = true;
        self
    }

    pub fn failing_query(mut self) -> Self {
        self.fail_query = true;
        self
    }

    /// Change the top activity and notify every listener.
    pub fn notify(&self, top: Option<&str>) {
        *self.top.lock().unwrap_or_else(PoisonError::into_inner) = top.map(str::to_string);
        let listeners: Vec<_> = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        for listener in listeners {
            listener.on_foreground_changed(top);
        }
    }

    /// Listeners registered and not yet unregistered.
    pub fn active_listeners(&self) -> usize {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Total successful registrations.
    pub fn registrations(&self) -> usize {
        self.registrations.load(Ordering::SeqCst)
    }
}

impl ForegroundTaskObserver for MockForegroundObserver {
    fn register(
        &self,
        listener: Arc<dyn ForegroundListener>,
    ) -> Result<SubscriptionHandle, ObserverError> {
        if self.fail_register {
            return Err(ObserverError::Register("mock register failure".into()));
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, listener);
        self.registrations.fetch_add(1, Ordering::SeqCst);
        if let Some(top) = &self.on_register {
            self.notify(top.as_deref());
        }
        Ok(SubscriptionHandle(id))
    }

    fn unregister(&self, handle: SubscriptionHandle) -> Result<(), ObserverError> {
        let removed = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&handle.0);
        if self.fail_unregister {
            return Err(ObserverError::Unregister("mock unregister failure".into()));
        }
        match removed {
            Some(_) => Ok(()),
            None => Err(ObserverError::Unregister(format!(
                "unknown subscription {}",
                handle.0
            ))),
        }
    }

    fn current_foreground_activity(&self) -> Result<Option<String>, ObserverError> {
        if self.fail_query {
            return Err(ObserverError::Query("mock query failure".into()));
        }
        Ok(self
            .top
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }
}

/// External provider returning a fixed answer and counting fetches.
#[derive(Default)]
pub struct StaticExternalProvider {
    profile: Option<ExternalProfile>,
    fail: bool,
    fetches: AtomicUsize,
}

impl StaticExternalProvider {
    pub fn new(profile: Option<ExternalProfile>) -> Self {
        Self {
            profile,
            ..Default::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

impl ExternalProfileProvider for StaticExternalProvider {
    fn fetch_external_profile(&self) -> Result<Option<ExternalProfile>, ProviderError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(ProviderError::Unavailable("mock provider failure".into()));
        }
        Ok(self.profile.clone())
    }
}

#[derive(Default)]
pub struct MemorySettings {
    values: Mutex<HashMap<String, String>>,
    reject: bool,
}

impl MemorySettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rejecting() -> Self {
        Self {
            reject: true,
            ..Default::default()
        }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }
}

impl SettingsStore for MemorySettings {
    fn put_string(&self, key: &str, value: &str) -> Result<(), SettingsError> {
        if self.reject {
            return Err(SettingsError::WriteRejected {
                key: key.into(),
                reason: "read-only mock".into(),
            });
        }
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.into(), value.into());
        Ok(())
    }
}

#[derive(Clone, Debug, Default)]
pub struct StaticCallContext(pub Vec<String>);

impl StaticCallContext {
    pub fn new<I, S>(frames: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(frames.into_iter().map(Into::into).collect())
    }
}

impl CallContext for StaticCallContext {
    fn call_frames(&self) -> Vec<String> {
        self.0.clone()
    }
}

/// Records termination requests instead of exiting.
#[derive(Default)]
pub struct RecordingProcessControl {
    terminations: AtomicUsize,
}

impl RecordingProcessControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn terminations(&self) -> usize {
        self.terminations.load(Ordering::SeqCst)
    }
}

impl ProcessControl for RecordingProcessControl {
    fn terminate_self(&self) {
        self.terminations.fetch_add(1, Ordering::SeqCst);
    }
}
