use thiserror::Error;

use crate::field::{FieldType, IdentityField};

/// Errors raised while resolving or validating the descriptor schema.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("unknown identity field: {0}")]
    UnknownField(String),

    #[error("field {field} declared as {declared} by the platform, schema expects {expected}")]
    TypeConflict {
        field: IdentityField,
        declared: FieldType,
        expected: FieldType,
    },
}

/// Failure reported by the privileged identity write capability.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WriteError {
    #[error("identity field not found: {0}")]
    FieldNotFound(IdentityField),

    #[error("type mismatch writing {field}: {reason}")]
    TypeMismatch { field: IdentityField, reason: String },
}

/// Errors from the randomized external profile provider.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("external profile source unavailable: {0}")]
    Unavailable(String),

    #[error("external profile malformed: {0}")]
    Malformed(String),

    #[error("failed to read profile bundle: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse profile bundle: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Errors from the foreground-task observer collaborator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ObserverError {
    #[error("failed to register foreground listener: {0}")]
    Register(String),

    #[error("failed to unregister foreground listener: {0}")]
    Unregister(String),

    #[error("unable to query foreground task: {0}")]
    Query(String),
}

/// Errors from the persisted settings collaborator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SettingsError {
    #[error("settings write rejected for {key}: {reason}")]
    WriteRejected { key: String, reason: String },
}

/// Signal raised by the certificate-chain hook for callers that must never
/// observe a spoofed identity.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AttestationError {
    #[error("key attestation not supported for this caller: {reason}")]
    NotSupported { reason: String },
}

/// Errors in user supplied profile configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid profile override for {profile}: {reason}")]
    InvalidProfile { profile: String, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_error_display_names_field() {
        let err = WriteError::FieldNotFound(IdentityField::InitialSdk);
        assert!(err.to_string().contains("DEVICE_INITIAL_SDK_INT"));
    }

    #[test]
    fn schema_conflict_display() {
        let err = SchemaError::TypeConflict {
            field: IdentityField::Time,
            declared: FieldType::Text,
            expected: FieldType::Integer,
        };
        let s = err.to_string();
        assert!(s.contains("TIME"));
        assert!(s.contains("text"));
        assert!(s.contains("integer"));
    }

    #[test]
    fn attestation_error_display() {
        let err = AttestationError::NotSupported {
            reason: "store process".into(),
        };
        assert!(err.to_string().contains("store process"));
    }
}
