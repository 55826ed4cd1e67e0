use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::SchemaError;
use crate::traits::IdentityWriter;

/// Process-global identity descriptors that a profile may override.
///
/// The declaration order is the canonical mapping order: profiles are applied
/// field by field in this order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IdentityField {
    Brand,
    Manufacturer,
    Device,
    Product,
    Model,
    Display,
    Fingerprint,
    #[serde(rename = "ID")]
    BuildId,
    #[serde(rename = "TYPE")]
    BuildType,
    Tags,
    SecurityPatch,
    #[serde(rename = "DEVICE_INITIAL_SDK_INT")]
    InitialSdk,
    Time,
}

/// Declared type of a descriptor field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldType {
    Text,
    Integer,
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Text => write!(f, "text"),
            FieldType::Integer => write!(f, "integer"),
        }
    }
}

impl IdentityField {
    pub const ALL: [IdentityField; 13] = [
        IdentityField::Brand,
        IdentityField::Manufacturer,
        IdentityField::Device,
        IdentityField::Product,
        IdentityField::Model,
        IdentityField::Display,
        IdentityField::Fingerprint,
        IdentityField::BuildId,
        IdentityField::BuildType,
        IdentityField::Tags,
        IdentityField::SecurityPatch,
        IdentityField::InitialSdk,
        IdentityField::Time,
    ];

    /// Platform name of the descriptor.
    pub fn name(self) -> &'static str {
        match self {
            IdentityField::Brand => "BRAND",
            IdentityField::Manufacturer => "MANUFACTURER",
            IdentityField::Device => "DEVICE",
            IdentityField::Product => "PRODUCT",
            IdentityField::Model => "MODEL",
            IdentityField::Display => "DISPLAY",
            IdentityField::Fingerprint => "FINGERPRINT",
            IdentityField::BuildId => "ID",
            IdentityField::BuildType => "TYPE",
            IdentityField::Tags => "TAGS",
            IdentityField::SecurityPatch => "SECURITY_PATCH",
            IdentityField::InitialSdk => "DEVICE_INITIAL_SDK_INT",
            IdentityField::Time => "TIME",
        }
    }

    /// Type the schema declares for this field.
    pub fn field_type(self) -> FieldType {
        match self {
            IdentityField::InitialSdk | IdentityField::Time => FieldType::Integer,
            _ => FieldType::Text,
        }
    }
}

impl fmt::Display for IdentityField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for IdentityField {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        IdentityField::ALL
            .iter()
            .copied()
            .find(|f| f.name() == s)
            .ok_or_else(|| SchemaError::UnknownField(s.to_string()))
    }
}

/// A value as stored in a profile, before coercion.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProfileValue {
    Integer(i64),
    Text(String),
}

impl ProfileValue {
    /// Empty text means "do not set this field".
    pub fn is_empty(&self) -> bool {
        matches!(self, ProfileValue::Text(s) if s.is_empty())
    }
}

impl fmt::Display for ProfileValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProfileValue::Integer(v) => write!(f, "{}", v),
            ProfileValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for ProfileValue {
    fn from(s: &str) -> Self {
        ProfileValue::Text(s.to_string())
    }
}

impl From<String> for ProfileValue {
    fn from(s: String) -> Self {
        ProfileValue::Text(s)
    }
}

impl From<i64> for ProfileValue {
    fn from(v: i64) -> Self {
        ProfileValue::Integer(v)
    }
}

/// A value coerced to the field's declared type, ready for the write capability.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TypedValue {
    Text(String),
    Integer(i64),
}

impl TypedValue {
    pub fn field_type(&self) -> FieldType {
        match self {
            TypedValue::Text(_) => FieldType::Text,
            TypedValue::Integer(_) => FieldType::Integer,
        }
    }
}

impl fmt::Display for TypedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypedValue::Text(s) => f.write_str(s),
            TypedValue::Integer(v) => write!(f, "{}", v),
        }
    }
}

/// Why a profile value could not be coerced to its field's type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CoercionError {
    pub field: IdentityField,
    pub value: String,
}

/// Coerce a profile value to the declared type of `field`.
///
/// Integer fields accept a native integer or a numeric string. Text fields
/// accept anything and render it as a string.
pub fn coerce(field: IdentityField, value: &ProfileValue) -> Result<TypedValue, CoercionError> {
    match (field.field_type(), value) {
        (FieldType::Text, v) => Ok(TypedValue::Text(v.to_string())),
        (FieldType::Integer, ProfileValue::Integer(v)) => Ok(TypedValue::Integer(*v)),
        (FieldType::Integer, ProfileValue::Text(s)) => {
            s.trim()
                .parse::<i64>()
                .map(TypedValue::Integer)
                .map_err(|_| CoercionError {
                    field,
                    value: s.clone(),
                })
        }
    }
}

/// The descriptor schema checked against the platform's write capability.
///
/// Built once at startup. Fields the platform does not expose are recorded as
/// unavailable and skipped by the applier; a field the platform declares with a
/// different type than the schema is a startup error.
#[derive(Clone, Debug)]
pub struct FieldSchema {
    available: BTreeSet<IdentityField>,
}

impl FieldSchema {
    /// Validate every schema field against the writer's declarations.
    pub fn validate(writer: &dyn IdentityWriter) -> Result<Self, SchemaError> {
        let mut available = BTreeSet::new();
        for field in IdentityField::ALL {
            match writer.declared_type(field) {
                Some(declared) if declared == field.field_type() => {
                    available.insert(field);
                }
                Some(declared) => {
                    return Err(SchemaError::TypeConflict {
                        field,
                        declared,
                        expected: field.field_type(),
                    });
                }
                None => {
                    warn!(field = %field, "Identity field not exposed by platform");
                }
            }
        }
        Ok(Self { available })
    }

    /// A schema that assumes every field is writable.
    pub fn full() -> Self {
        Self {
            available: IdentityField::ALL.into_iter().collect(),
        }
    }

    pub fn is_available(&self, field: IdentityField) -> bool {
        self.available.contains(&field)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::RecordingWriter;

    #[test]
    fn field_names_round_trip() {
        for field in IdentityField::ALL {
            assert_eq!(field.name().parse::<IdentityField>().unwrap(), field);
        }
        assert!(matches!(
            "BOGUS".parse::<IdentityField>(),
            Err(SchemaError::UnknownField(_))
        ));
    }

    #[test]
    fn serde_uses_descriptor_names() {
        for field in IdentityField::ALL {
            let json = serde_json::to_string(&field).unwrap();
            assert_eq!(json, format!("\"{}\"", field.name()));
        }
    }

    #[test]
    fn integer_fields_parse_numeric_strings() {
        let v = coerce(IdentityField::InitialSdk, &ProfileValue::from("25")).unwrap();
        assert_eq!(v, TypedValue::Integer(25));

        let v = coerce(IdentityField::Time, &ProfileValue::Integer(42)).unwrap();
        assert_eq!(v, TypedValue::Integer(42));
    }

    #[test]
    fn integer_field_rejects_garbage() {
        let err = coerce(IdentityField::InitialSdk, &ProfileValue::from("twenty")).unwrap_err();
        assert_eq!(err.field, IdentityField::InitialSdk);
        assert_eq!(err.value, "twenty");
    }

    #[test]
    fn text_field_renders_integers() {
        let v = coerce(IdentityField::Fingerprint, &ProfileValue::Integer(1700000000)).unwrap();
        assert_eq!(v, TypedValue::Text("1700000000".into()));
    }

    #[test]
    fn empty_text_is_empty() {
        assert!(ProfileValue::from("").is_empty());
        assert!(!ProfileValue::from("x").is_empty());
        assert!(!ProfileValue::Integer(0).is_empty());
    }

    #[test]
    fn schema_validation_marks_missing_fields() {
        let writer = RecordingWriter::new().without_field(IdentityField::InitialSdk);
        let schema = FieldSchema::validate(&writer).unwrap();
        assert!(!schema.is_available(IdentityField::InitialSdk));
        assert!(schema.is_available(IdentityField::Brand));
    }

    #[test]
    fn schema_validation_rejects_type_conflict() {
        let writer = RecordingWriter::new().with_declared(IdentityField::Time, FieldType::Text);
        let err = FieldSchema::validate(&writer).unwrap_err();
        assert!(matches!(
            err,
            SchemaError::TypeConflict {
                field: IdentityField::Time,
                ..
            }
        ));
    }
}
