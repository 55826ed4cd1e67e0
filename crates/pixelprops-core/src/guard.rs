//! Attestation guard.
//!
//! Gates the certificate-chain operation of the core-services process. The
//! eligibility decision is taken at one instant, but issuance may complete
//! later; a foreground-task listener watches the account sign-in screen in the
//! meantime and retracts permission if its on-top state flips.
//!
//! ```text
//! Start -> CheckEligible -> Blocked
//!                        -> Watching -> Certify
//!                                    -> Disallow
//! ```
//!
//! A notification that arrives after [`WatchTicket::decide`] has read the flag
//! is lost. That window is accepted.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, error, warn};

use crate::classify::PackageClassification;
use crate::packages::{ACCOUNT_SIGN_IN_ACTIVITY, CERTIFY_ROLE_FRAGMENTS};
use crate::traits::{ForegroundListener, ForegroundTaskObserver, SubscriptionHandle};

/// Frame name fragment identifying the integrity-attestation subsystem.
pub const INTEGRITY_SUBSYSTEM_MARKER: &str = "DroidGuard";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GuardState {
    Start,
    CheckEligible,
    Blocked,
    Watching,
    Certify,
    Disallow,
}

impl fmt::Display for GuardState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            GuardState::Start => "start",
            GuardState::CheckEligible => "check-eligible",
            GuardState::Blocked => "blocked",
            GuardState::Watching => "watching",
            GuardState::Certify => "certify",
            GuardState::Disallow => "disallow",
        };
        f.write_str(s)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockReason {
    NotCoreServicesProcess,
    RoleNotEligible,
}

/// Final state of one eligibility check.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "verdict", content = "reason", rename_all = "snake_case")]
pub enum GuardVerdict {
    Blocked(BlockReason),
    Certify,
    Disallow,
}

impl GuardVerdict {
    pub fn state(self) -> GuardState {
        match self {
            GuardVerdict::Blocked(_) => GuardState::Blocked,
            GuardVerdict::Certify => GuardState::Certify,
            GuardVerdict::Disallow => GuardState::Disallow,
        }
    }

    pub fn may_certify(self) -> bool {
        matches!(self, GuardVerdict::Certify)
    }
}

/// Baseline plus "still safe" flag shared with the observer.
struct ForegroundWatch {
    account_activity: String,
    was_account_flow: bool,
    safe: AtomicBool,
}

impl ForegroundListener for ForegroundWatch {
    fn on_foreground_changed(&self, top_activity: Option<&str>) {
        let is_now = top_activity == Some(self.account_activity.as_str());
        if is_now != self.was_account_flow {
            warn!(
                is_now,
                was = self.was_account_flow,
                "Account sign-in on-top state changed, retracting certification"
            );
            self.safe.store(false, Ordering::SeqCst);
        }
    }
}

/// The attestation guard.
pub struct AttestationGuard<'a> {
    observer: &'a dyn ForegroundTaskObserver,
    account_activity: String,
    verbose: bool,
}

impl<'a> AttestationGuard<'a> {
    pub fn new(observer: &'a dyn ForegroundTaskObserver) -> Self {
        Self {
            observer,
            account_activity: ACCOUNT_SIGN_IN_ACTIVITY.to_string(),
            verbose: false,
        }
    }

    /// Emit state transition debug lines.
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Watch a different screen instead of the account sign-in activity.
    pub fn with_account_activity(mut self, component: impl Into<String>) -> Self {
        self.account_activity = component.into();
        self
    }

    /// Run the eligibility gates and, if they pass, start watching.
    pub fn begin(&self, c: &PackageClassification) -> Result<WatchTicket<'a>, BlockReason> {
        if self.verbose {
            debug!(state = %GuardState::CheckEligible, process = %c.process, "Attestation guard");
        }
        if !c.is_core_services_process {
            return Err(BlockReason::NotCoreServicesProcess);
        }
        let process = c.process.to_lowercase();
        if !CERTIFY_ROLE_FRAGMENTS.iter().any(|f| process.contains(f)) {
            return Err(BlockReason::RoleNotEligible);
        }

        let watch = Arc::new(ForegroundWatch {
            was_account_flow: self.is_account_flow_on_top(),
            account_activity: self.account_activity.clone(),
            safe: AtomicBool::new(true),
        });
        let handle = match self.observer.register(watch.clone()) {
            Ok(handle) => Some(handle),
            Err(e) => {
                error!(error = %e, "Failed to register task stack listener");
                None
            }
        };
        if self.verbose {
            debug!(
                state = %GuardState::Watching,
                was_account_flow = watch.was_account_flow,
                "Attestation guard"
            );
        }
        Ok(WatchTicket {
            observer: self.observer,
            watch,
            handle,
            verbose: self.verbose,
        })
    }

    /// `begin` followed immediately by `decide`.
    pub fn evaluate(&self, c: &PackageClassification) -> GuardVerdict {
        match self.begin(c) {
            Ok(ticket) => ticket.decide(),
            Err(reason) => GuardVerdict::Blocked(reason),
        }
    }

    fn is_account_flow_on_top(&self) -> bool {
        match self.observer.current_foreground_activity() {
            Ok(top) => top.as_deref() == Some(self.account_activity.as_str()),
            Err(e) => {
                error!(error = %e, "Unable to get top activity");
                false
            }
        }
    }
}

/// An in-flight eligibility check in the `Watching` state.
pub struct WatchTicket<'a> {
    observer: &'a dyn ForegroundTaskObserver,
    watch: Arc<ForegroundWatch>,
    handle: Option<SubscriptionHandle>,
    verbose: bool,
}

impl WatchTicket<'_> {
    pub fn was_account_flow(&self) -> bool {
        self.watch.was_account_flow
    }

    /// Read the flag once and end the watch.
    ///
    /// Unregistration is best effort: a failure only leaves a stale listener.
    pub fn decide(mut self) -> GuardVerdict {
        let safe = self.watch.safe.load(Ordering::SeqCst);
        self.unregister();
        let verdict = if safe {
            GuardVerdict::Certify
        } else {
            GuardVerdict::Disallow
        };
        if self.verbose {
            debug!(state = %verdict.state(), "Attestation guard");
        }
        verdict
    }

    fn unregister(&mut self) {
        if let Some(handle) = self.handle.take() {
            if let Err(e) = self.observer.unregister(handle) {
                warn!(error = %e, "Failed to unregister task stack listener");
            }
        }
    }
}

/// A ticket dropped without a decision stops watching.
impl Drop for WatchTicket<'_> {
    fn drop(&mut self) {
        self.unregister();
    }
}

/// Whether the frames of the active call belong to the integrity subsystem.
pub fn is_integrity_caller(frames: &[String]) -> bool {
    frames.iter().any(|f| f.contains(INTEGRITY_SUBSYSTEM_MARKER))
}

/// The core-services process lacks the task-management permission the guard
/// needs; callers whose package names the vendor may bypass that check.
pub fn should_bypass_task_permission(calling_package: Option<&str>) -> bool {
    calling_package.is_some_and(|p| p.to_lowercase().contains("google"))
}
