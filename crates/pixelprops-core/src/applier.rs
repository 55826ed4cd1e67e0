use serde::Serialize;
use tracing::{debug, warn};

use crate::error::WriteError;
use crate::field::{coerce, FieldSchema, IdentityField, TypedValue};
use crate::packages::{RetentionDirective, PACKAGE_SEARCH_INDEXING};
use crate::profile::IdentityProfile;
use crate::traits::IdentityWriter;

/// Why a field was not written.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum SkipReason {
    EmptyValue,
    Retained,
    Unavailable,
    Unparsable(String),
    WriteFailed(String),
}

/// Result of one field of a profile.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FieldWrite {
    Applied {
        field: IdentityField,
        value: TypedValue,
    },
    Skipped {
        field: IdentityField,
        reason: SkipReason,
    },
}

impl FieldWrite {
    pub fn field(&self) -> IdentityField {
        match self {
            FieldWrite::Applied { field, .. } | FieldWrite::Skipped { field, .. } => *field,
        }
    }

    pub fn is_applied(&self) -> bool {
        matches!(self, FieldWrite::Applied { .. })
    }
}

/// Writes profile fields onto the global identity descriptors.
///
/// Every failure is local to its field: the applier logs it and moves on.
pub struct OverrideApplier<'a> {
    writer: &'a dyn IdentityWriter,
    schema: &'a FieldSchema,
    retention: &'a RetentionDirective,
    verbose: bool,
}

impl<'a> OverrideApplier<'a> {
    pub fn new(
        writer: &'a dyn IdentityWriter,
        schema: &'a FieldSchema,
        retention: &'a RetentionDirective,
    ) -> Self {
        Self {
            writer,
            schema,
            retention,
            verbose: false,
        }
    }

    /// Emit per-field debug lines.
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Apply `profile` for `package`, in canonical field order.
    ///
    /// The search/indexing package additionally gets its fingerprint set to the
    /// platform build time once the profile has been processed.
    pub fn apply(
        &self,
        profile: &IdentityProfile,
        package: &str,
        build_time_millis: i64,
    ) -> Vec<FieldWrite> {
        if self.verbose && !profile.is_empty() {
            debug!(package, profile = %profile.name, "Defining props");
        }
        let mut writes = self.apply_fields(profile, package);
        if package == PACKAGE_SEARCH_INDEXING && !profile.is_empty() {
            writes.push(self.write(
                IdentityField::Fingerprint,
                TypedValue::Text(build_time_millis.to_string()),
            ));
        }
        writes
    }

    /// Write the profile's fields only, without package special cases.
    pub fn apply_fields(&self, profile: &IdentityProfile, package: &str) -> Vec<FieldWrite> {
        profile
            .iter()
            .map(|(field, value)| {
                if value.is_empty() {
                    if self.verbose {
                        debug!(field = %field, "Skipping empty value");
                    }
                    return FieldWrite::Skipped {
                        field,
                        reason: SkipReason::EmptyValue,
                    };
                }
                if self.retention.is_retained(package, field) {
                    if self.verbose {
                        debug!(field = %field, package, "Not defining retained prop");
                    }
                    return FieldWrite::Skipped {
                        field,
                        reason: SkipReason::Retained,
                    };
                }
                match coerce(field, value) {
                    Ok(typed) => self.write(field, typed),
                    Err(e) => {
                        warn!(field = %field, value = %e.value, "Failed to parse value for field");
                        FieldWrite::Skipped {
                            field,
                            reason: SkipReason::Unparsable(e.value),
                        }
                    }
                }
            })
            .collect()
    }

    /// Write a single already-typed value.
    pub fn write(&self, field: IdentityField, value: TypedValue) -> FieldWrite {
        if !self.schema.is_available(field) {
            if self.verbose {
                debug!(field = %field, "Field not available on this platform");
            }
            return FieldWrite::Skipped {
                field,
                reason: SkipReason::Unavailable,
            };
        }
        if self.verbose {
            debug!(field = %field, value = %value, "Setting property");
        }
        match self.writer.set_field(field, value.clone()) {
            Ok(()) => FieldWrite::Applied { field, value },
            Err(e) => {
                let detail = match &e {
                    WriteError::FieldNotFound(_) => "field not found".to_string(),
                    WriteError::TypeMismatch { reason, .. } => reason.clone(),
                };
                warn!(field = %field, error = %e, "Failed to set prop");
                FieldWrite::Skipped {
                    field,
                    reason: SkipReason::WriteFailed(detail),
                }
            }
        }
    }
}
