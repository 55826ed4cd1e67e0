//! The per-process pipeline: classify, select, apply. Plus the
//! certificate-chain hook.

use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{error, info_span, warn};

use crate::applier::{FieldWrite, OverrideApplier};
use crate::classify::{classify, DeviceShape, PackageClassification};
use crate::error::{AttestationError, SchemaError};
use crate::external::SETTINGS_KEY_SELECTED_PROFILE;
use crate::field::{FieldSchema, IdentityField, TypedValue};
use crate::flags::FeatureFlags;
use crate::guard::{is_integrity_caller, AttestationGuard, BlockReason, GuardVerdict};
use crate::packages::{RetentionDirective, StaticPackageLists};
use crate::profile::{generic_profile, ProfileStore};
use crate::selection::{select, Outcome, Selection, SelectionContext};
use crate::traits::{
    CallContext, DisplayInfo, ExternalProfileProvider, FlagSource, ForegroundTaskObserver,
    IdentityWriter, PlatformInfo, ProcessControl, ProcessResolver, SettingsStore,
};

/// Debug line gated on the per-evaluation debug flag.
macro_rules! dlog {
    ($on:expr, $($arg:tt)+) => {
        if $on {
            tracing::debug!($($arg)+);
        }
    };
}

/// Platform capabilities the engine is wired to.
#[derive(Clone)]
pub struct Collaborators {
    pub processes: Arc<dyn ProcessResolver>,
    pub display: Arc<dyn DisplayInfo>,
    pub platform: Arc<dyn PlatformInfo>,
    pub flags: Arc<dyn FlagSource>,
    pub external: Arc<dyn ExternalProfileProvider>,
    pub observer: Arc<dyn ForegroundTaskObserver>,
    pub writer: Arc<dyn IdentityWriter>,
    pub settings: Arc<dyn SettingsStore>,
    pub calls: Arc<dyn CallContext>,
    pub process_control: Arc<dyn ProcessControl>,
}

/// Static tables. Immutable once the engine is built.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    pub profiles: ProfileStore,
    pub lists: StaticPackageLists,
    pub retention: RetentionDirective,
}

impl EngineConfig {
    pub fn canonical() -> Self {
        Self {
            profiles: ProfileStore::canonical(),
            lists: StaticPackageLists::default(),
            retention: RetentionDirective::canonical(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::canonical()
    }
}

/// Everything one evaluation did.
#[derive(Clone, Debug, Serialize)]
pub struct EvaluationReport {
    pub package: String,
    pub pid: u32,
    pub process: Option<String>,
    pub flags: Option<FeatureFlags>,
    pub classification: Option<PackageClassification>,
    pub guard: Option<GuardVerdict>,
    pub selection: Option<Selection>,
    /// Writes of the generic pre-pass, made before the exclusion check.
    pub generic_writes: Vec<FieldWrite>,
    pub time_write: Option<FieldWrite>,
    pub profile_writes: Vec<FieldWrite>,
    /// Name of the profile whose fields were written, if any.
    pub applied_profile: Option<String>,
    pub terminated: bool,
}

impl EvaluationReport {
    fn new(package: &str, pid: u32) -> Self {
        Self {
            package: package.to_string(),
            pid,
            process: None,
            flags: None,
            classification: None,
            guard: None,
            selection: None,
            generic_writes: Vec::new(),
            time_write: None,
            profile_writes: Vec::new(),
            applied_profile: None,
            terminated: false,
        }
    }

    pub fn outcome(&self) -> Outcome {
        self.selection.map_or(Outcome::NoChange, |s| s.outcome)
    }

    /// Every write that reached the identity writer, in order.
    pub fn applied(&self) -> impl Iterator<Item = &FieldWrite> {
        self.generic_writes
            .iter()
            .chain(self.time_write.iter())
            .chain(self.profile_writes.iter())
            .filter(|w| w.is_applied())
    }

    /// Profile writes that reached the identity writer.
    pub fn applied_profile_fields(&self) -> Vec<IdentityField> {
        self.profile_writes
            .iter()
            .filter(|w| w.is_applied())
            .map(FieldWrite::field)
            .collect()
    }
}

impl fmt::Display for EvaluationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "package: {} (pid {}, process {})",
            self.package,
            self.pid,
            self.process.as_deref().unwrap_or("<unresolved>")
        )?;
        if let Some(s) = &self.selection {
            writeln!(f, "outcome: {:?} ({:?})", s.outcome, s.reason)?;
        } else {
            writeln!(f, "outcome: skipped")?;
        }
        if let Some(g) = &self.guard {
            writeln!(f, "guard:   {}", g.state())?;
        }
        if let Some(name) = &self.applied_profile {
            writeln!(f, "profile: {}", name)?;
        }
        let sections = [
            ("generic", self.generic_writes.as_slice()),
            ("time", self.time_write.as_slice()),
            ("profile", self.profile_writes.as_slice()),
        ];
        for (label, writes) in sections {
            for w in writes {
                match w {
                    FieldWrite::Applied { field, value } => {
                        writeln!(f, "  [{label}] {field} = {value}")?
                    }
                    FieldWrite::Skipped { field, reason } => {
                        writeln!(f, "  [{label}] {field} skipped: {reason:?}")?
                    }
                }
            }
        }
        if self.terminated {
            writeln!(f, "process terminated")?;
        }
        Ok(())
    }
}

/// Result of the certificate-chain hook when it does not reject the caller.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", content = "cause", rename_all = "snake_case")]
pub enum AttestationDecision {
    Proceed,
    Terminated(TerminationCause),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationCause {
    SetupFlow,
    Blocked(BlockReason),
    Disallowed,
}

/// The identity override engine.
pub struct PropsEngine {
    collaborators: Collaborators,
    config: EngineConfig,
    schema: FieldSchema,
}

impl PropsEngine {
    /// Build an engine, validating the descriptor schema against the writer.
    pub fn new(collaborators: Collaborators, config: EngineConfig) -> Result<Self, SchemaError> {
        let schema = FieldSchema::validate(collaborators.writer.as_ref())?;
        Ok(Self {
            collaborators,
            config,
            schema,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn schema(&self) -> &FieldSchema {
        &self.schema
    }

    fn applier<'a>(&'a self, retention: &'a RetentionDirective, verbose: bool) -> OverrideApplier<'a> {
        OverrideApplier::new(self.collaborators.writer.as_ref(), &self.schema, retention)
            .verbose(verbose)
    }

    fn guard(&self, verbose: bool) -> AttestationGuard<'_> {
        AttestationGuard::new(self.collaborators.observer.as_ref()).verbose(verbose)
    }

    fn classify(&self, package: &str, process: &str) -> PackageClassification {
        let shape = DeviceShape::from_metrics(self.collaborators.display.metrics());
        classify(package, process, &self.config.lists, shape)
    }

    /// Run the pipeline for a process that is starting up.
    ///
    /// Never fails: every problem is logged and reflected in the report.
    pub fn evaluate(&self, package: &str, pid: u32) -> EvaluationReport {
        let mut report = EvaluationReport::new(package, pid);
        let Some(process) = self.collaborators.processes.resolve_process_name(pid) else {
            warn!(package, pid, "Unable to resolve process name, skipping");
            return report;
        };
        let _span = info_span!("pixelprops", process = %process).entered();

        let flags = FeatureFlags::read(self.collaborators.flags.as_ref());
        let verbose = flags.debug_logging_enabled;
        let build_time = self.collaborators.platform.build_time_millis();
        report.process = Some(process.clone());
        report.flags = Some(flags);

        let no_retention = RetentionDirective::default();
        report.generic_writes = self
            .applier(&no_retention, verbose)
            .apply_fields(&generic_profile(), package);

        let c = self.classify(package, &process);
        let guard = c
            .is_core_services_process
            .then(|| self.guard(verbose).evaluate(&c));
        let codename = self.collaborators.platform.device_codename();
        let ctx = SelectionContext {
            flags,
            device_codename: codename.as_deref(),
            may_certify: guard.is_some_and(GuardVerdict::may_certify),
        };
        let selection = select(&c, &ctx, &self.config.lists, &self.config.profiles);
        dlog!(
            verbose,
            package,
            outcome = ?selection.outcome,
            reason = ?selection.reason,
            "Selected"
        );

        let applier = self.applier(&self.config.retention, verbose);
        if selection.stamp_time {
            let now = Utc::now().timestamp_millis();
            report.time_write = Some(applier.write(IdentityField::Time, TypedValue::Integer(now)));
        }

        match selection.outcome {
            Outcome::NoChange => {}
            Outcome::Profile(name) => {
                report.profile_writes =
                    applier.apply(self.config.profiles.get(name), package, build_time);
                report.applied_profile = Some(name.to_string());
            }
            Outcome::ExternalProfile => {
                if let Some((name, writes)) = self.apply_external(&applier, package, build_time) {
                    report.profile_writes = writes;
                    report.applied_profile = Some(name);
                }
            }
            Outcome::TerminateSelf => {
                warn!(package, "Certification spoofing disabled, terminating process");
                self.collaborators.process_control.terminate_self();
                report.terminated = true;
            }
        }

        report.classification = Some(c);
        report.guard = guard;
        report.selection = Some(selection);
        report
    }

    fn apply_external(
        &self,
        applier: &OverrideApplier<'_>,
        package: &str,
        build_time: i64,
    ) -> Option<(String, Vec<FieldWrite>)> {
        let candidate = match self.collaborators.external.fetch_external_profile() {
            Ok(Some(candidate)) => candidate,
            Ok(None) => {
                error!("No external profile available");
                return None;
            }
            Err(e) => {
                error!(error = %e, "Failed to fetch external profile");
                return None;
            }
        };
        let profile = candidate.into_profile();
        let writes = applier.apply(&profile, package, build_time);
        if let Err(e) = self
            .collaborators
            .settings
            .put_string(SETTINGS_KEY_SELECTED_PROFILE, &profile.name)
        {
            warn!(error = %e, "Failed to record selected external profile");
        }
        Some((profile.name, writes))
    }

    /// Hook for the certificate-chain operation of the key store.
    ///
    /// `Err` rejects the operation for the caller. `Terminated` means the
    /// process has been asked to exit.
    pub fn on_get_certificate_chain(
        &self,
        package: &str,
        pid: u32,
    ) -> Result<AttestationDecision, AttestationError> {
        let process = self
            .collaborators
            .processes
            .resolve_process_name(pid)
            .unwrap_or_default();
        let verbose = FeatureFlags::read(self.collaborators.flags.as_ref()).debug_logging_enabled;
        let c = self.classify(package, &process);

        if c.is_setup_flow {
            return Ok(self.terminate(TerminationCause::SetupFlow));
        }

        let integrity_caller = c.is_core_services_process
            && is_integrity_caller(&self.collaborators.calls.call_frames());
        if integrity_caller || c.is_store_process {
            dlog!(
                verbose,
                process = %process,
                is_core_services = c.is_core_services_process,
                is_store = c.is_store_process,
                "Blocked key attestation"
            );
            let reason = if c.is_store_process {
                "store process"
            } else {
                "integrity subsystem caller"
            };
            return Err(AttestationError::NotSupported {
                reason: reason.to_string(),
            });
        }

        match self.guard(verbose).evaluate(&c) {
            GuardVerdict::Certify => Ok(AttestationDecision::Proceed),
            GuardVerdict::Disallow => Ok(self.terminate(TerminationCause::Disallowed)),
            GuardVerdict::Blocked(reason) => Ok(self.terminate(TerminationCause::Blocked(reason))),
        }
    }

    fn terminate(&self, cause: TerminationCause) -> AttestationDecision {
        warn!(cause = ?cause, "Terminating process on certificate chain request");
        self.collaborators.process_control.terminate_self();
        AttestationDecision::Terminated(cause)
    }
}
