//! Build fingerprint parsing.
//!
//! A fingerprint has the shape `brand/product/device:osVersion/buildId/incremental:type/tags`,
//! e.g. `google/husky/husky:14/UQ1A.240205.004/11269751:user/release-keys`.

use std::sync::LazyLock;

use regex::Regex;

// The trailing `.word` part is optional: most release ids stop at three parts.
// The leading part needs a letter so `8.1.0` after the device is never taken.
static BUILD_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^|[/:])([A-Za-z0-9]*[A-Za-z][A-Za-z0-9]*\.\d+\.\d+(?:\.\w+)?)(?:[/:]|$)")
        .expect("valid build id pattern")
});

/// First `/` or `:` delimited segment of the form `alnum.digits.digits[.word]`,
/// or empty if none.
pub fn build_id(fingerprint: &str) -> String {
    BUILD_ID
        .captures(fingerprint)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_default()
}

/// Second `/`-delimited segment, or empty if there is none.
pub fn device_name(fingerprint: &str) -> String {
    fingerprint
        .split('/')
        .nth(1)
        .map(str::to_string)
        .unwrap_or_default()
}
