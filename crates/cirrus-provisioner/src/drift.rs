use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ProvisionerError;

/// Structured before/after for a single field that doesn't match desired
/// state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDrift {
    /// Machine-readable field name, e.g. "destination_cidr_block"
    pub field: String,
    /// What we want
    pub expected: Value,
    /// What the cloud has (`null` when the resource does not exist)
    pub actual: Value,
}

/// The fields of desired state that differ from actual state.
///
/// Fields left unset in desired state never appear: unset means "no
/// opinion", which compares equal to anything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Changes(Vec<FieldDrift>);

impl Changes {
    /// Field-by-field comparison of two snapshots of the same resource.
    pub fn between<S: Serialize>(desired: &S, actual: &S) -> Result<Self, ProvisionerError> {
        let desired = as_object(desired)?;
        let actual = as_object(actual)?;

        let drifts = desired
            .into_iter()
            .filter(|(_, expected)| !expected.is_null())
            .filter_map(|(field, expected)| {
                let actual = actual.get(&field).cloned().unwrap_or(Value::Null);
                (actual != expected).then_some(FieldDrift {
                    field,
                    expected,
                    actual,
                })
            })
            .collect();

        Ok(Self(drifts))
    }

    /// Changes needed to create a resource from nothing: every set field.
    pub fn creation<S: Serialize>(desired: &S) -> Result<Self, ProvisionerError> {
        let drifts = as_object(desired)?
            .into_iter()
            .filter(|(_, expected)| !expected.is_null())
            .map(|(field, expected)| FieldDrift {
                field,
                expected,
                actual: Value::Null,
            })
            .collect();
        Ok(Self(drifts))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.iter().any(|d| d.field == field)
    }

    pub fn get(&self, field: &str) -> Option<&FieldDrift> {
        self.0.iter().find(|d| d.field == field)
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|d| d.field.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldDrift> {
        self.0.iter()
    }

    /// Reject the change if it touches any of `immutable`, naming every
    /// offending field.
    pub fn reject_immutable(&self, immutable: &[&str]) -> Result<(), ProvisionerError> {
        let fields: Vec<String> = self
            .fields()
            .filter(|f| immutable.contains(f))
            .map(String::from)
            .collect();
        if fields.is_empty() {
            Ok(())
        } else {
            Err(ProvisionerError::CannotChangeField { fields })
        }
    }
}

fn as_object<S: Serialize>(state: &S) -> Result<Map<String, Value>, ProvisionerError> {
    match serde_json::to_value(state)? {
        Value::Object(map) => Ok(map),
        other => Err(ProvisionerError::Config(format!(
            "resource state must serialize to an object, got {other}"
        ))),
    }
}
