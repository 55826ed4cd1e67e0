//! End-to-end scenarios through the public engine API.

use std::io::Write;
use std::sync::Arc;
use std::thread;

use pixelprops_core::flags::{KEY_CERTIFY_SPOOF, KEY_VENDOR_MUSIC};
use pixelprops_core::mocks::*;
use pixelprops_core::packages::{
    ACCOUNT_SIGN_IN_ACTIVITY, PACKAGE_CORE_SERVICES, PACKAGE_SEARCH_INDEXING, PACKAGE_STORE,
    PROCESS_CORE_SERVICES_BACKGROUND,
};
use pixelprops_core::*;

const BUILD_TIME: i64 = 1_707_091_200_000;

struct Device {
    writer: Arc<RecordingWriter>,
    settings: Arc<MemorySettings>,
    control: Arc<RecordingProcessControl>,
    observer: Arc<MockForegroundObserver>,
    processes: StaticProcessResolver,
    flags: MapFlagSource,
    display: Option<DisplayMetrics>,
    external: Arc<dyn ExternalProfileProvider>,
}

impl Device {
    fn new() -> Self {
        Self {
            writer: Arc::new(RecordingWriter::new()),
            settings: Arc::new(MemorySettings::new()),
            control: Arc::new(RecordingProcessControl::new()),
            observer: Arc::new(MockForegroundObserver::new()),
            processes: StaticProcessResolver::new(),
            flags: MapFlagSource::new(),
            display: None,
            external: Arc::new(StaticExternalProvider::new(None)),
        }
    }

    fn process(mut self, pid: u32, name: &str) -> Self {
        self.processes = self.processes.with(pid, name);
        self
    }

    fn flag(mut self, key: &str, value: bool) -> Self {
        self.flags.set(key, value);
        self
    }

    fn tablet(mut self) -> Self {
        self.display = Some(DisplayMetrics {
            screen_size: ScreenSize::XLarge,
            density_dpi: 320,
        });
        self
    }

    fn engine(&self) -> PropsEngine {
        PropsEngine::new(
            Collaborators {
                processes: Arc::new(self.processes.clone()),
                display: Arc::new(StaticDisplay(self.display)),
                platform: Arc::new(StaticPlatform::new(Some("a52q"), BUILD_TIME)),
                flags: Arc::new(self.flags.clone()),
                external: self.external.clone(),
                observer: self.observer.clone(),
                writer: self.writer.clone(),
                settings: self.settings.clone(),
                calls: Arc::new(StaticCallContext::default()),
                process_control: self.control.clone(),
            },
            EngineConfig::canonical(),
        )
        .unwrap()
    }
}

fn profile_writes(writer: &RecordingWriter) -> Vec<(IdentityField, TypedValue)> {
    // Skip the generic pre-pass.
    writer.writes().into_iter().skip(2).collect()
}

#[test]
fn store_package_is_left_alone() {
    let device = Device::new().process(10, PACKAGE_STORE);
    let report = device.engine().evaluate(PACKAGE_STORE, 10);

    assert_eq!(report.outcome(), Outcome::NoChange);
    assert_eq!(report.selection.unwrap().reason, SelectionReason::Excluded);
    assert!(report.applied_profile_fields().is_empty());
    assert!(profile_writes(&device.writer).is_empty());
}

#[test]
fn core_services_with_certification_disabled_terminates() {
    let device = Device::new()
        .process(20, PROCESS_CORE_SERVICES_BACKGROUND)
        .flag(KEY_CERTIFY_SPOOF, false);
    let report = device.engine().evaluate(PACKAGE_CORE_SERVICES, 20);

    assert_eq!(report.outcome(), Outcome::TerminateSelf);
    assert_eq!(device.control.terminations(), 1);
}

#[test]
fn chrome_on_tablet_gets_every_recent_phone_field() {
    let device = Device::new().process(30, "com.android.chrome").tablet();
    let report = device.engine().evaluate("com.android.chrome", 30);

    let recent = ProfileStore::canonical()
        .get(ProfileName::MostRecentReferencePhone)
        .clone();
    assert_eq!(
        report.outcome(),
        Outcome::Profile(ProfileName::MostRecentReferencePhone)
    );
    let expected: Vec<_> = recent
        .iter()
        .filter(|(_, v)| !v.is_empty())
        .map(|(f, v)| (f, TypedValue::Text(v.to_string())))
        .collect();
    assert_eq!(profile_writes(&device.writer), expected);
}

#[test]
fn google_app_on_tablet_gets_tablet_profile() {
    let device = Device::new()
        .process(31, "com.google.android.apps.maps")
        .tablet();
    device.engine().evaluate("com.google.android.apps.maps", 31);
    assert_eq!(
        device.writer.value_of(IdentityField::Model),
        Some(TypedValue::Text("Pixel Tablet".into()))
    );
}

#[test]
fn search_indexing_keeps_fingerprint_and_gets_build_time() {
    let device = Device::new().process(40, PACKAGE_SEARCH_INDEXING);
    let report = device.engine().evaluate(PACKAGE_SEARCH_INDEXING, 40);

    assert!(report.profile_writes.contains(&FieldWrite::Skipped {
        field: IdentityField::Fingerprint,
        reason: SkipReason::Retained,
    }));
    assert_eq!(
        device.writer.value_of(IdentityField::Fingerprint),
        Some(TypedValue::Text(BUILD_TIME.to_string()))
    );
}

#[test]
fn music_app_disguised_only_when_enabled() {
    let device = Device::new().process(50, "com.netease.cloudmusic");
    let report = device.engine().evaluate("com.netease.cloudmusic", 50);
    assert_eq!(report.outcome(), Outcome::NoChange);

    let device = device.flag(KEY_VENDOR_MUSIC, true);
    let report = device.engine().evaluate("com.netease.cloudmusic", 50);
    assert_eq!(
        report.outcome(),
        Outcome::Profile(ProfileName::CompetitorMusicVendor)
    );
    assert_eq!(
        device.writer.value_of(IdentityField::Brand),
        Some(TypedValue::Text("meizu".into()))
    );
}

#[test]
fn evaluation_is_idempotent() {
    let device = Device::new().process(60, "com.android.chrome");
    let engine = device.engine();

    engine.evaluate("com.android.chrome", 60);
    let first = device.writer.writes();
    device.writer.clear();
    engine.evaluate("com.android.chrome", 60);
    assert_eq!(device.writer.writes(), first);
}

#[test]
fn core_services_applies_bundle_profile() {
    let mut bundle = tempfile::NamedTempFile::new().unwrap();
    bundle
        .write_all(
            br#"[{
                "name": "shiba_beta",
                "product": "shiba_beta",
                "manufacturer": "Google",
                "brand": "google",
                "model": "Pixel 8",
                "fingerprint": "google/shiba_beta/shiba:15/AP31.240517.022/11948202:user/release-keys",
                "security_patch": "2024-06-05",
                "initial_sdk": "32"
            }]"#,
        )
        .unwrap();

    let mut device = Device::new().process(70, PROCESS_CORE_SERVICES_BACKGROUND);
    device.external = Arc::new(BundleProfileProvider::new(bundle.path()));
    let report = device.engine().evaluate(PACKAGE_CORE_SERVICES, 70);

    assert_eq!(report.applied_profile.as_deref(), Some("shiba_beta"));
    assert_eq!(
        device.writer.value_of(IdentityField::Device),
        Some(TypedValue::Text("shiba_beta".into()))
    );
    assert_eq!(
        device.writer.value_of(IdentityField::BuildId),
        Some(TypedValue::Text("AP31.240517.022".into()))
    );
    // Out of range, never written.
    assert_eq!(device.writer.value_of(IdentityField::InitialSdk), None);
    assert!(device.writer.value_of(IdentityField::Time).is_some());
    assert_eq!(
        device.settings.get(SETTINGS_KEY_SELECTED_PROFILE).as_deref(),
        Some("shiba_beta")
    );
}

#[test]
fn missing_external_profile_degrades_to_no_change() {
    let device = Device::new().process(80, PROCESS_CORE_SERVICES_BACKGROUND);
    let report = device.engine().evaluate(PACKAGE_CORE_SERVICES, 80);

    assert_eq!(report.outcome(), Outcome::ExternalProfile);
    assert!(report.applied_profile.is_none());
    assert!(report.profile_writes.is_empty());
    assert_eq!(device.control.terminations(), 0);
}

#[test]
fn failing_provider_degrades_to_no_change() {
    let mut device = Device::new().process(81, PROCESS_CORE_SERVICES_BACKGROUND);
    device.external = Arc::new(StaticExternalProvider::failing());
    let report = device.engine().evaluate(PACKAGE_CORE_SERVICES, 81);
    assert!(report.profile_writes.is_empty());
    assert!(!report.terminated);
}

#[test]
fn certificate_chain_certifies_without_notifications() {
    let device = Device::new().process(90, PROCESS_CORE_SERVICES_BACKGROUND);
    let decision = device
        .engine()
        .on_get_certificate_chain(PACKAGE_CORE_SERVICES, 90)
        .unwrap();
    assert_eq!(decision, AttestationDecision::Proceed);
    assert_eq!(device.observer.active_listeners(), 0);
}

#[test]
fn certificate_chain_disallowed_after_account_flow_flip() {
    let mut device = Device::new().process(91, PROCESS_CORE_SERVICES_BACKGROUND);
    device.observer = Arc::new(
        MockForegroundObserver::new().notify_on_register(Some(ACCOUNT_SIGN_IN_ACTIVITY)),
    );
    let decision = device
        .engine()
        .on_get_certificate_chain(PACKAGE_CORE_SERVICES, 91)
        .unwrap();
    assert_eq!(
        decision,
        AttestationDecision::Terminated(TerminationCause::Disallowed)
    );
    assert_eq!(device.control.terminations(), 1);
}

#[test]
fn guard_sees_notifications_from_other_threads() {
    let observer = Arc::new(MockForegroundObserver::new());
    let lists = StaticPackageLists::default();
    let c = classify(
        PACKAGE_CORE_SERVICES,
        PROCESS_CORE_SERVICES_BACKGROUND,
        &lists,
        DeviceShape::Phone,
    );

    let guard = AttestationGuard::new(observer.as_ref());
    let ticket = guard.begin(&c).unwrap();
    let handles: Vec<_> = (0..4)
        .map(|i| {
            let observer = observer.clone();
            thread::spawn(move || {
                let top = if i == 3 {
                    Some(ACCOUNT_SIGN_IN_ACTIVITY)
                } else {
                    Some("com.example/.Main")
                };
                observer.notify(top);
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
    assert_eq!(ticket.decide(), GuardVerdict::Disallow);
}

#[test]
fn bypass_task_permission_for_vendor_callers() {
    assert!(should_bypass_task_permission(Some("com.Google.android.gms")));
    assert!(!should_bypass_task_permission(Some("org.example")));
}
