//! Per-resource extraction rules
//!
//! Each [`ResourceKind`] maps to one function that projects the resource into
//! its parent row and any child rows. All nested reads go through
//! [`crate::melt::path`], so a missing field becomes an empty column.

use crate::melt::classify::ResourceKind;
use crate::melt::ids::IdAllocator;
use crate::melt::path::{self, get, items, text};
use crate::melt::plan::TableKind;
use crate::melt::types::{CodingPolicy, Row, TableSet};
use serde_json::Value;
use tracing::warn;

/// Signature shared by every resource extractor
pub type Extractor = fn(&Value, &mut Emitter<'_>);

/// The extractor responsible for a resource kind
pub fn extractor(kind: ResourceKind) -> Extractor {
    match kind {
        ResourceKind::Patient => patient,
        ResourceKind::Claim => claim,
        ResourceKind::ExplanationOfBenefit => explanation_of_benefit,
        ResourceKind::Observation => observation,
        ResourceKind::Procedure => procedure,
        ResourceKind::Encounter => encounter,
        ResourceKind::MedicationDispense => medication_dispense,
    }
}

/// Where extractors put their rows while one document is being melted
pub struct Emitter<'a> {
    tables: &'a mut TableSet,
    ids: &'a mut IdAllocator,
    policy: CodingPolicy,
    parameters_id: &'a str,
}

impl<'a> Emitter<'a> {
    pub fn new(
        tables: &'a mut TableSet,
        ids: &'a mut IdAllocator,
        policy: CodingPolicy,
        parameters_id: &'a str,
    ) -> Self {
        Emitter {
            tables,
            ids,
            policy,
            parameters_id,
        }
    }

    /// Id of the `Parameters` document being melted
    pub fn parameters_id(&self) -> &'a str {
        self.parameters_id
    }

    /// A fresh row for a surrogate-keyed table, `id` already assigned
    pub fn child(&mut self, table: TableKind) -> (u64, Row) {
        let id = self.ids.next(table);
        (id, Row::new(table).with("id", id))
    }

    /// A fresh row for a resource-keyed table owned by the current document
    pub fn parent(&self, table: TableKind, id: &str) -> Row {
        Row::new(table)
            .with("id", id)
            .with("parameters_id", self.parameters_id)
    }

    pub fn emit(&mut self, row: Row) {
        self.tables.push(row);
    }

    /// Flatten a resource that has no extractor into its own table
    pub fn flatten(&mut self, resource_type: &str, resource: &Value) {
        self.tables
            .flattened_mut()
            .push(resource_type, self.parameters_id, resource);
    }

    pub fn coding(&self, concept: &Value) -> Coding {
        Coding::from_concept(concept, self.policy)
    }
}

/// One codeable concept reduced to text
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Coding {
    pub code: String,
    pub system: String,
    pub display: String,
}

impl Coding {
    pub fn from_concept(concept: &Value, policy: CodingPolicy) -> Self {
        let codings = items(concept, "/coding");
        match policy {
            CodingPolicy::First => codings
                .first()
                .map(|c| Coding {
                    code: text(c, "/code"),
                    system: text(c, "/system"),
                    display: text(c, "/display"),
                })
                .unwrap_or_default(),
            CodingPolicy::JoinAll => Coding {
                code: join_field(codings, "/code"),
                system: join_field(codings, "/system"),
                display: join_field(codings, "/display"),
            },
        }
    }
}

/// Positions line up across fields, so a coding without a system leaves an
/// empty slot. A field empty in every coding stays `""`.
fn join_field(codings: &[Value], pointer: &str) -> String {
    let values: Vec<String> = codings.iter().map(|c| text(c, pointer)).collect();
    if values.iter().all(String::is_empty) {
        return String::new();
    }
    values.join(", ")
}

/// Child rows need an owner id to point at
fn owns_children(kind: ResourceKind, id: &str) -> bool {
    if id.is_empty() {
        warn!(
            resource_type = kind.resource_type(),
            "resource has no id; its child rows are dropped"
        );
        return false;
    }
    true
}

fn patient(resource: &Value, out: &mut Emitter<'_>) {
    let id = text(resource, "/id");
    let (race_code, race_system) = us_core_category(resource, "us-core-race");
    let (ethnicity_code, ethnicity_system) = us_core_category(resource, "us-core-ethnicity");

    let row = out
        .parent(TableKind::Patients, &id)
        .with("last_updated", text(resource, "/meta/lastUpdated"))
        .with("gender", text(resource, "/gender"))
        .with("birth_date", text(resource, "/birthDate"))
        .with("race_code", race_code)
        .with("race_system", race_system)
        .with("ethnicity_code", ethnicity_code)
        .with("ethnicity_system", ethnicity_system);
    out.emit(row);

    if !owns_children(ResourceKind::Patient, &id) {
        return;
    }

    for identifier in items(resource, "/identifier") {
        let (_, row) = out.child(TableKind::PatientIdentifiers);
        out.emit(
            row.with("patient_id", id.as_str())
                .with("system", text(identifier, "/system"))
                .with("value", text(identifier, "/value"))
                .with("use", text(identifier, "/use")),
        );
    }

    for name in items(resource, "/name") {
        let (_, row) = out.child(TableKind::PatientNames);
        out.emit(
            row.with("patient_id", id.as_str())
                .with("family", text(name, "/family"))
                .with("given", path::joined(name, "/given", " ")),
        );
    }

    for telecom in items(resource, "/telecom") {
        let (_, row) = out.child(TableKind::PatientTelecom);
        out.emit(
            row.with("patient_id", id.as_str())
                .with("system", text(telecom, "/system"))
                .with("value", text(telecom, "/value")),
        );
    }

    for address in items(resource, "/address") {
        let (_, row) = out.child(TableKind::PatientAddresses);
        out.emit(
            row.with("patient_id", id.as_str())
                .with("line", path::joined(address, "/line", " "))
                .with("city", text(address, "/city"))
                .with("state", text(address, "/state"))
                .with("postal_code", text(address, "/postalCode")),
        );
    }

    for communication in items(resource, "/communication") {
        let language = out.coding(get(communication, "/language"));
        let (_, row) = out.child(TableKind::PatientCommunication);
        out.emit(
            row.with("patient_id", id.as_str())
                .with("language_code", language.code)
                .with("preferred", text(communication, "/preferred"))
                .with(
                    "preference_type",
                    text(communication, "/_preferred/extension/0/valueCoding/code"),
                ),
        );
    }
}

/// Race or ethnicity from the US Core extension whose url ends in `suffix`.
/// The last `ombCategory` or `detailed` sub-extension with a coding wins.
fn us_core_category(resource: &Value, suffix: &str) -> (String, String) {
    items(resource, "/extension")
        .iter()
        .filter(|ext| text(ext, "/url").ends_with(suffix))
        .flat_map(|ext| items(ext, "/extension"))
        .filter(|sub| {
            matches!(text(sub, "/url").as_str(), "ombCategory" | "detailed")
                && get(sub, "/valueCoding").is_object()
        })
        .last()
        .map(|sub| (text(sub, "/valueCoding/code"), text(sub, "/valueCoding/system")))
        .unwrap_or_default()
}

/// Tables fed by a Claim or an ExplanationOfBenefit
struct ClaimTables {
    kind: ResourceKind,
    parent: TableKind,
    diagnoses: TableKind,
    items: TableKind,
    owner_column: &'static str,
    adjudications: Option<TableKind>,
}

const CLAIM_TABLES: ClaimTables = ClaimTables {
    kind: ResourceKind::Claim,
    parent: TableKind::Claims,
    diagnoses: TableKind::ClaimDiagnoses,
    items: TableKind::ClaimItems,
    owner_column: "claim_id",
    adjudications: None,
};

const EOB_TABLES: ClaimTables = ClaimTables {
    kind: ResourceKind::ExplanationOfBenefit,
    parent: TableKind::ExplanationOfBenefits,
    diagnoses: TableKind::EobDiagnoses,
    items: TableKind::EobItems,
    owner_column: "eob_id",
    adjudications: Some(TableKind::EobAdjudications),
};

fn claim(resource: &Value, out: &mut Emitter<'_>) {
    claim_like(resource, out, &CLAIM_TABLES);
}

fn explanation_of_benefit(resource: &Value, out: &mut Emitter<'_>) {
    claim_like(resource, out, &EOB_TABLES);
}

fn claim_like(resource: &Value, out: &mut Emitter<'_>, tables: &ClaimTables) {
    let id = text(resource, "/id");
    let claim_type = out.coding(get(resource, "/type"));

    let mut parent = out
        .parent(tables.parent, &id)
        .with("patient_id", path::reference_id(resource, "/patient/reference"))
        .with("status", text(resource, "/status"))
        .with("type_code", claim_type.code)
        .with("type_system", claim_type.system)
        .with("created", text(resource, "/created"))
        .with("serviced_date", text(resource, "/servicedDate"));

    match tables.kind {
        ResourceKind::Claim => {
            parent.set("provider_id", path::reference_id(resource, "/provider/reference"));
        }
        _ => parent.set("outcome", text(resource, "/outcome")),
    }

    if parent.text("serviced_date").is_empty() {
        let first_item_date = items(resource, "/item")
            .iter()
            .map(|item| text(item, "/servicedDate"))
            .find(|date| !date.is_empty());
        if let Some(date) = first_item_date {
            parent.set("serviced_date", date);
        }
    }

    if owns_children(tables.kind, &id) {
        for diagnosis in items(resource, "/diagnosis") {
            let concept = out.coding(get(diagnosis, "/diagnosisCodeableConcept"));
            let diagnosis_type = out.coding(get(diagnosis, "/type/0"));
            let (_, row) = out.child(tables.diagnoses);
            out.emit(
                row.with(tables.owner_column, id.as_str())
                    .with("sequence", text(diagnosis, "/sequence"))
                    .with("code", concept.code)
                    .with("system", concept.system)
                    .with("diagnosis_type", diagnosis_type.code),
            );
        }

        for item in items(resource, "/item") {
            let serviced_date = text(item, "/servicedDate");
            let product = out.coding(get(item, "/productOrService"));
            let (item_id, row) = out.child(tables.items);
            out.emit(
                row.with(tables.owner_column, id.as_str())
                    .with("sequence", text(item, "/sequence"))
                    .with("product_or_service_code", product.code)
                    .with("product_or_service_system", product.system)
                    .with("serviced_date", serviced_date),
            );

            if let Some(adjudications) = tables.adjudications {
                for adjudication in items(item, "/adjudication") {
                    let category = out.coding(get(adjudication, "/category"));
                    let (_, row) = out.child(adjudications);
                    out.emit(
                        row.with("eob_item_id", item_id)
                            .with("eob_id", id.as_str())
                            .with("category_code", category.code)
                            .with("category_system", category.system)
                            .with("amount_value", text(adjudication, "/amount/value"))
                            .with("amount_currency", text(adjudication, "/amount/currency")),
                    );
                }
            }
        }
    }

    out.emit(parent);
}

fn observation(resource: &Value, out: &mut Emitter<'_>) {
    let id = text(resource, "/id");
    let code = out.coding(get(resource, "/code"));
    let (start, end) = period_or_instant(resource, "/effectivePeriod", "/effectiveDateTime");

    let row = out
        .parent(TableKind::Observations, &id)
        .with("patient_id", path::reference_id(resource, "/subject/reference"))
        .with("status", text(resource, "/status"))
        .with("code_system", code.system)
        .with("code_value", code.code)
        .with("effective_start", start)
        .with("effective_end", end);
    out.emit(row);
}

fn procedure(resource: &Value, out: &mut Emitter<'_>) {
    let id = text(resource, "/id");
    let code = out.coding(get(resource, "/code"));
    let (start, end) = period_or_instant(resource, "/performedPeriod", "/performedDateTime");

    let row = out
        .parent(TableKind::Procedures, &id)
        .with("patient_id", path::reference_id(resource, "/subject/reference"))
        .with("status", text(resource, "/status"))
        .with("code_system", code.system)
        .with("code_value", code.code)
        .with("performed_start", start)
        .with("performed_end", end);
    out.emit(row);
}

/// `(start, end)` of a period, or `(instant, "")` when there is no period
fn period_or_instant(resource: &Value, period: &str, instant: &str) -> (String, String) {
    let period = get(resource, period);
    if period.is_object() {
        (text(period, "/start"), text(period, "/end"))
    } else {
        (text(resource, instant), String::new())
    }
}

fn encounter(resource: &Value, out: &mut Emitter<'_>) {
    let id = text(resource, "/id");
    if !owns_children(ResourceKind::Encounter, &id) {
        return;
    }

    for participant in items(resource, "/participant") {
        let (_, row) = out.child(TableKind::EncounterParticipants);
        out.emit(
            row.with("encounter_id", id.as_str())
                .with("participant_reference", text(participant, "/individual/reference")),
        );
    }
}

fn medication_dispense(resource: &Value, out: &mut Emitter<'_>) {
    let id = text(resource, "/id");
    let medication = out.coding(get(resource, "/medicationCodeableConcept"));

    let row = out
        .parent(TableKind::MedicationDispenses, &id)
        .with("patient_id", path::reference_id(resource, "/subject/reference"))
        .with("status", text(resource, "/status"))
        .with("medication_code", medication.code)
        .with("medication_display", medication.display)
        .with("quantity", text(resource, "/quantity/value"))
        .with("days_supply", text(resource, "/daysSupply/value"))
        .with("when_handed_over", text(resource, "/whenHandedOver"));
    out.emit(row);
}
