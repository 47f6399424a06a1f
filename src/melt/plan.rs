//! Fixed table plans for FHIR melting
//!
//! Every output table has a pre-computed plan: its name, column order, how
//! its `id` is produced, and the foreign keys it carries. Rows are written in
//! plan column order regardless of the order extractors filled them in.

use serde::{Deserialize, Serialize};

/// Output tables, in the order they are written and described
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableKind {
    Parameters,
    ParameterValues,
    Patients,
    PatientIdentifiers,
    PatientNames,
    PatientTelecom,
    PatientAddresses,
    PatientCommunication,
    Claims,
    ClaimDiagnoses,
    ClaimItems,
    ExplanationOfBenefits,
    EobDiagnoses,
    EobItems,
    EobAdjudications,
    Observations,
    Procedures,
    EncounterParticipants,
    MedicationDispenses,
}

/// Where a table's `id` column comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyKind {
    /// The source resource's own `id`
    Resource,
    /// A per-table counter starting at 1
    Surrogate,
}

/// What a foreign key column points at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Table(TableKind),
    /// A resource that has no table of its own (e.g. `Encounter`)
    Resource(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForeignKey {
    pub column: &'static str,
    pub target: Target,
}

const fn fk(column: &'static str, table: TableKind) -> ForeignKey {
    ForeignKey {
        column,
        target: Target::Table(table),
    }
}

/// Pre-computed layout of one output table
#[derive(Debug)]
pub struct TablePlan {
    pub kind: TableKind,
    pub name: &'static str,
    pub columns: &'static [&'static str],
    pub key: KeyKind,
    /// The row's owner; child rows are never emitted without it
    pub parent: Option<ForeignKey>,
    /// Other references that may or may not resolve within one run
    pub references: &'static [ForeignKey],
}

impl TablePlan {
    /// Every foreign key, owner first
    pub fn foreign_keys(&self) -> impl Iterator<Item = &ForeignKey> {
        self.parent.iter().chain(self.references.iter())
    }

    pub fn foreign_key(&self, column: &str) -> Option<&ForeignKey> {
        self.foreign_keys().find(|fk| fk.column == column)
    }
}

use TableKind::*;

static PLANS: [TablePlan; 19] = [
    TablePlan {
        kind: Parameters,
        name: "parameters",
        columns: &["id", "resource_type"],
        key: KeyKind::Resource,
        parent: None,
        references: &[],
    },
    TablePlan {
        kind: ParameterValues,
        name: "parameter_values",
        columns: &["id", "parameters_id", "name", "value_type", "value"],
        key: KeyKind::Surrogate,
        parent: Some(fk("parameters_id", Parameters)),
        references: &[],
    },
    TablePlan {
        kind: Patients,
        name: "patients",
        columns: &[
            "id",
            "parameters_id",
            "last_updated",
            "gender",
            "birth_date",
            "race_code",
            "race_system",
            "ethnicity_code",
            "ethnicity_system",
        ],
        key: KeyKind::Resource,
        parent: Some(fk("parameters_id", Parameters)),
        references: &[],
    },
    TablePlan {
        kind: PatientIdentifiers,
        name: "patient_identifiers",
        columns: &["id", "patient_id", "system", "value", "use"],
        key: KeyKind::Surrogate,
        parent: Some(fk("patient_id", Patients)),
        references: &[],
    },
    TablePlan {
        kind: PatientNames,
        name: "patient_names",
        columns: &["id", "patient_id", "family", "given"],
        key: KeyKind::Surrogate,
        parent: Some(fk("patient_id", Patients)),
        references: &[],
    },
    TablePlan {
        kind: PatientTelecom,
        name: "patient_telecom",
        columns: &["id", "patient_id", "system", "value"],
        key: KeyKind::Surrogate,
        parent: Some(fk("patient_id", Patients)),
        references: &[],
    },
    TablePlan {
        kind: PatientAddresses,
        name: "patient_addresses",
        columns: &["id", "patient_id", "line", "city", "state", "postal_code"],
        key: KeyKind::Surrogate,
        parent: Some(fk("patient_id", Patients)),
        references: &[],
    },
    TablePlan {
        kind: PatientCommunication,
        name: "patient_communication",
        columns: &["id", "patient_id", "language_code", "preferred", "preference_type"],
        key: KeyKind::Surrogate,
        parent: Some(fk("patient_id", Patients)),
        references: &[],
    },
    TablePlan {
        kind: Claims,
        name: "claims",
        columns: &[
            "id",
            "parameters_id",
            "patient_id",
            "provider_id",
            "status",
            "type_code",
            "type_system",
            "created",
            "serviced_date",
        ],
        key: KeyKind::Resource,
        parent: Some(fk("parameters_id", Parameters)),
        references: &[fk("patient_id", Patients)],
    },
    TablePlan {
        kind: ClaimDiagnoses,
        name: "claim_diagnoses",
        columns: &["id", "claim_id", "sequence", "code", "system", "diagnosis_type"],
        key: KeyKind::Surrogate,
        parent: Some(fk("claim_id", Claims)),
        references: &[],
    },
    TablePlan {
        kind: ClaimItems,
        name: "claim_items",
        columns: &[
            "id",
            "claim_id",
            "sequence",
            "product_or_service_code",
            "product_or_service_system",
            "serviced_date",
        ],
        key: KeyKind::Surrogate,
        parent: Some(fk("claim_id", Claims)),
        references: &[],
    },
    TablePlan {
        kind: ExplanationOfBenefits,
        name: "explanation_of_benefits",
        columns: &[
            "id",
            "parameters_id",
            "patient_id",
            "status",
            "outcome",
            "type_code",
            "type_system",
            "created",
            "serviced_date",
        ],
        key: KeyKind::Resource,
        parent: Some(fk("parameters_id", Parameters)),
        references: &[fk("patient_id", Patients)],
    },
    TablePlan {
        kind: EobDiagnoses,
        name: "eob_diagnoses",
        columns: &["id", "eob_id", "sequence", "code", "system", "diagnosis_type"],
        key: KeyKind::Surrogate,
        parent: Some(fk("eob_id", ExplanationOfBenefits)),
        references: &[],
    },
    TablePlan {
        kind: EobItems,
        name: "eob_items",
        columns: &[
            "id",
            "eob_id",
            "sequence",
            "product_or_service_code",
            "product_or_service_system",
            "serviced_date",
        ],
        key: KeyKind::Surrogate,
        parent: Some(fk("eob_id", ExplanationOfBenefits)),
        references: &[],
    },
    TablePlan {
        kind: EobAdjudications,
        name: "eob_adjudications",
        columns: &[
            "id",
            "eob_item_id",
            "eob_id",
            "category_code",
            "category_system",
            "amount_value",
            "amount_currency",
        ],
        key: KeyKind::Surrogate,
        parent: Some(fk("eob_item_id", EobItems)),
        references: &[fk("eob_id", ExplanationOfBenefits)],
    },
    TablePlan {
        kind: Observations,
        name: "observations",
        columns: &[
            "id",
            "parameters_id",
            "patient_id",
            "status",
            "code_system",
            "code_value",
            "effective_start",
            "effective_end",
        ],
        key: KeyKind::Resource,
        parent: Some(fk("parameters_id", Parameters)),
        references: &[fk("patient_id", Patients)],
    },
    TablePlan {
        kind: Procedures,
        name: "procedures",
        columns: &[
            "id",
            "parameters_id",
            "patient_id",
            "status",
            "code_system",
            "code_value",
            "performed_start",
            "performed_end",
        ],
        key: KeyKind::Resource,
        parent: Some(fk("parameters_id", Parameters)),
        references: &[fk("patient_id", Patients)],
    },
    TablePlan {
        kind: EncounterParticipants,
        name: "encounter_participants",
        columns: &["id", "encounter_id", "participant_reference"],
        key: KeyKind::Surrogate,
        parent: Some(ForeignKey {
            column: "encounter_id",
            target: Target::Resource("Encounter"),
        }),
        references: &[],
    },
    TablePlan {
        kind: MedicationDispenses,
        name: "medication_dispenses",
        columns: &[
            "id",
            "parameters_id",
            "patient_id",
            "status",
            "medication_code",
            "medication_display",
            "quantity",
            "days_supply",
            "when_handed_over",
        ],
        key: KeyKind::Resource,
        parent: Some(fk("parameters_id", Parameters)),
        references: &[fk("patient_id", Patients)],
    },
];

impl TableKind {
    pub const ALL: [TableKind; 19] = [
        Parameters,
        ParameterValues,
        Patients,
        PatientIdentifiers,
        PatientNames,
        PatientTelecom,
        PatientAddresses,
        PatientCommunication,
        Claims,
        ClaimDiagnoses,
        ClaimItems,
        ExplanationOfBenefits,
        EobDiagnoses,
        EobItems,
        EobAdjudications,
        Observations,
        Procedures,
        EncounterParticipants,
        MedicationDispenses,
    ];

    pub fn plan(self) -> &'static TablePlan {
        &PLANS[self as usize]
    }

    pub fn name(self) -> &'static str {
        self.plan().name
    }

    pub fn columns(self) -> &'static [&'static str] {
        self.plan().columns
    }

    pub fn from_name(name: &str) -> Option<TableKind> {
        PLANS.iter().find(|p| p.name == name).map(|p| p.kind)
    }
}

impl std::fmt::Display for TableKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
