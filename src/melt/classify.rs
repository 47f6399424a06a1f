//! Parameter classification
//!
//! A parameter either embeds a resource, which is routed to an extractor by
//! [`ResourceKind`], or carries a `value[x]` scalar.

use crate::melt::path;
use crate::reader::Parameter;
use serde_json::{Map, Value};
use tracing::warn;

/// Resource kinds with a dedicated extractor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Patient,
    Claim,
    ExplanationOfBenefit,
    Observation,
    Procedure,
    Encounter,
    MedicationDispense,
}

/// Name-based rules for parameters whose resource has no `resourceType`.
/// Checked in order; matching is case-sensitive and anchored at the start,
/// so `"Claims with diagnosis"` and `"Claims 2"` both land on `Claim`.
const NAME_PREFIXES: &[(&str, ResourceKind)] = &[
    ("Patient", ResourceKind::Patient),
    ("Claim", ResourceKind::Claim),
    ("EOB", ResourceKind::ExplanationOfBenefit),
    ("ExplanationOfBenefit", ResourceKind::ExplanationOfBenefit),
    ("Observation", ResourceKind::Observation),
    ("Procedures", ResourceKind::Procedure),
    ("Dispenses", ResourceKind::MedicationDispense),
    ("Encounter", ResourceKind::Encounter),
];

impl ResourceKind {
    pub fn from_resource_type(resource_type: &str) -> Option<Self> {
        match resource_type {
            "Patient" => Some(ResourceKind::Patient),
            "Claim" => Some(ResourceKind::Claim),
            "ExplanationOfBenefit" => Some(ResourceKind::ExplanationOfBenefit),
            "Observation" => Some(ResourceKind::Observation),
            "Procedure" => Some(ResourceKind::Procedure),
            "Encounter" => Some(ResourceKind::Encounter),
            "MedicationDispense" => Some(ResourceKind::MedicationDispense),
            _ => None,
        }
    }

    pub fn from_parameter_name(name: &str) -> Option<Self> {
        NAME_PREFIXES
            .iter()
            .find(|(prefix, _)| name.starts_with(prefix))
            .map(|(_, kind)| *kind)
    }

    pub fn resource_type(self) -> &'static str {
        match self {
            ResourceKind::Patient => "Patient",
            ResourceKind::Claim => "Claim",
            ResourceKind::ExplanationOfBenefit => "ExplanationOfBenefit",
            ResourceKind::Observation => "Observation",
            ResourceKind::Procedure => "Procedure",
            ResourceKind::Encounter => "Encounter",
            ResourceKind::MedicationDispense => "MedicationDispense",
        }
    }
}

/// A `value[x]` parameter reduced to text
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScalarValue {
    /// The `value[x]` suffix, e.g. `Boolean` for `valueBoolean`
    pub kind: String,
    pub value: String,
}

/// What to do with one parameter
#[derive(Debug, PartialEq)]
pub enum Disposition<'a> {
    Resource {
        kind: ResourceKind,
        resource: &'a Value,
    },
    /// An embedded resource nobody extracts
    Unrecognized {
        resource_type: &'a str,
        resource: &'a Value,
    },
    /// No resource; `None` when there is no `value[x]` key either
    Scalar(Option<ScalarValue>),
}

pub fn classify(param: &Parameter) -> Disposition<'_> {
    let Some(resource) = &param.resource else {
        return Disposition::Scalar(scalar_value(param));
    };

    let declared = resource
        .get("resourceType")
        .and_then(Value::as_str)
        .filter(|rt| !rt.is_empty());

    let kind = match declared {
        Some(resource_type) => ResourceKind::from_resource_type(resource_type),
        None => ResourceKind::from_parameter_name(&param.name),
    };

    match kind {
        Some(kind) => Disposition::Resource { kind, resource },
        None => Disposition::Unrecognized {
            resource_type: declared.unwrap_or(""),
            resource,
        },
    }
}

const VALUE_PREFIX: &str = "value";

/// Find the parameter's `value[x]` key and reduce its value to text
///
/// Keys are visited in document order and the first match wins.
pub fn scalar_value(param: &Parameter) -> Option<ScalarValue> {
    let mut keys = value_entries(&param.fields);
    let (key, value) = keys.next()?;

    let extra = keys.count();
    if extra > 0 {
        warn!(
            parameter = %param.name,
            chosen = %key,
            extra,
            "parameter carries more than one value[x] key; using the first"
        );
    }

    let kind = match &key[VALUE_PREFIX.len()..] {
        "" => "String",
        suffix => suffix,
    };

    Some(ScalarValue {
        kind: kind.to_string(),
        value: scalar_text(value),
    })
}

fn value_entries(fields: &Map<String, Value>) -> impl Iterator<Item = (&String, &Value)> {
    fields.iter().filter(|(key, _)| key.starts_with(VALUE_PREFIX))
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::Object(obj) if obj.contains_key("code") => path::scalar_text(&obj["code"]),
        Value::Object(_) | Value::Array(_) => serde_json::to_string(value).unwrap_or_default(),
        other => path::scalar_text(other),
    }
}
