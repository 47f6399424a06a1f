use fhir_melt::melt::{FileKind, MeltConfig, OutputConfig, TableKind, Target};
use fhir_melt::{melt_file, melt_ndjson};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::io::Cursor;
use std::path::Path;
use tempfile::TempDir;

fn ndjson(documents: &[Value]) -> String {
    documents
        .iter()
        .map(|d| serde_json::to_string(d).unwrap() + "\n")
        .collect()
}

/// Read a header-mode table back as column -> value maps
fn read_table(dir: &Path, table: TableKind) -> Vec<HashMap<String, String>> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'|')
        .from_path(dir.join(format!("{}.csv", table.name())))
        .unwrap();
    let headers = reader.headers().unwrap().clone();

    reader
        .records()
        .map(|record| {
            let record = record.unwrap();
            headers
                .iter()
                .zip(record.iter())
                .map(|(h, v)| (h.to_string(), v.to_string()))
                .collect()
        })
        .collect()
}

fn run(input: &str, config: OutputConfig) -> (TempDir, fhir_melt::RunSummary) {
    run_with(input, MeltConfig::default(), config)
}

fn run_with(
    input: &str,
    melt_config: MeltConfig,
    config: OutputConfig,
) -> (TempDir, fhir_melt::RunSummary) {
    let dir = TempDir::new().unwrap();
    let input_path = dir.path().join("input.ndjson");
    fs::write(&input_path, input).unwrap();

    let summary = melt_file(&input_path, &dir.path().join("out"), &melt_config, &config).unwrap();
    (dir, summary)
}

#[test]
fn test_bare_patient() {
    let input = ndjson(&[json!({
        "resourceType": "Parameters",
        "id": "doc-1",
        "parameter": [{
            "name": "Patient",
            "resource": {"resourceType": "Patient", "id": "p1", "gender": "female", "birthDate": "1990-01-01"}
        }]
    })]);

    let (dir, summary) = run(&input, OutputConfig::default());
    let out = dir.path().join("out");

    let patients = read_table(&out, TableKind::Patients);
    assert_eq!(patients.len(), 1);
    let patient = &patients[0];
    assert_eq!(patient["id"], "p1");
    assert_eq!(patient["parameters_id"], "doc-1");
    assert_eq!(patient["gender"], "female");
    assert_eq!(patient["birth_date"], "1990-01-01");
    for column in ["last_updated", "race_code", "race_system", "ethnicity_code", "ethnicity_system"] {
        assert_eq!(patient[column], "", "{}", column);
    }

    for child in [
        TableKind::PatientIdentifiers,
        TableKind::PatientNames,
        TableKind::PatientTelecom,
        TableKind::PatientAddresses,
        TableKind::PatientCommunication,
    ] {
        assert!(!out.join(format!("{}.csv", child.name())).exists(), "{}", child);
    }

    let counts: HashMap<TableKind, usize> = summary.counts.into_iter().collect();
    assert_eq!(counts[&TableKind::Patients], 1);
    assert_eq!(counts[&TableKind::PatientNames], 0);
}

#[test]
fn test_claim_with_two_diagnoses() {
    let input = ndjson(&[json!({
        "resourceType": "Parameters",
        "id": "doc-1",
        "parameter": [{
            "name": "Claims with acute bronchitis",
            "resource": {
                "resourceType": "Claim",
                "id": "c1",
                "status": "active",
                "created": "2024-03-01",
                "patient": {"reference": "Patient/p1"},
                "provider": {"reference": "Practitioner/dr-9"},
                "diagnosis": [
                    {"sequence": 1, "diagnosisCodeableConcept": {"coding": [{"system": "http://hl7.org/fhir/sid/icd-10-cm", "code": "J20.9"}]}},
                    {"sequence": 2, "diagnosisCodeableConcept": {"coding": [{"system": "http://hl7.org/fhir/sid/icd-10-cm", "code": "R05"}]}}
                ],
                "item": [{"sequence": 1, "productOrService": {"coding": [{"code": "99213"}]}}]
            }
        }]
    })]);

    let (dir, _) = run(&input, OutputConfig::default());
    let out = dir.path().join("out");

    let claims = read_table(&out, TableKind::Claims);
    assert_eq!(claims.len(), 1);
    assert_eq!(claims[0]["id"], "c1");
    assert_eq!(claims[0]["patient_id"], "p1");
    assert_eq!(claims[0]["provider_id"], "dr-9");
    assert_eq!(claims[0]["created"], "2024-03-01");
    assert_eq!(claims[0]["serviced_date"], "");

    let diagnoses = read_table(&out, TableKind::ClaimDiagnoses);
    assert_eq!(diagnoses.len(), 2);
    assert!(diagnoses.iter().all(|d| d["claim_id"] == "c1"));
    let codes: Vec<&str> = diagnoses.iter().map(|d| d["code"].as_str()).collect();
    assert_eq!(codes, vec!["J20.9", "R05"]);

    let items = read_table(&out, TableKind::ClaimItems);
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["serviced_date"], "");
    assert_eq!(items[0]["product_or_service_code"], "99213");
}

#[test]
fn test_claim_serviced_date_backfilled_from_items() {
    let input = ndjson(&[json!({
        "id": "doc-1",
        "parameter": [{
            "name": "Claims",
            "resource": {
                "id": "c1",
                "created": "2024-03-01",
                "item": [
                    {"sequence": 1},
                    {"sequence": 2, "servicedDate": "2024-02-10"},
                    {"sequence": 3, "servicedDate": "2024-02-20"}
                ]
            }
        }]
    })]);

    let outcome = melt_ndjson(Cursor::new(input), MeltConfig::default()).unwrap();
    let claims = outcome.tables.rows(TableKind::Claims);
    assert_eq!(claims[0].text("serviced_date"), "2024-02-10");
}

fn mixed_input() -> String {
    ndjson(&[
        json!({
            "resourceType": "Parameters",
            "id": "doc-1",
            "parameter": [
                {"name": "Numerator", "valueBoolean": true},
                {"name": "Patient", "resource": {
                    "resourceType": "Patient", "id": "p1",
                    "identifier": [{"system": "urn:mrn", "value": "123"}],
                    "name": [{"family": "Smith", "given": ["Ann", "Marie"]}],
                    "telecom": [{"system": "phone", "value": "555-0100"}],
                    "address": [{"line": ["1 Main St", "Apt 2"], "city": "Springfield", "state": "IL", "postalCode": "62701"}]
                }},
                {"name": "EOB", "resource": {
                    "resourceType": "ExplanationOfBenefit", "id": "e1", "outcome": "complete",
                    "patient": {"reference": "Patient/p1"},
                    "diagnosis": [{"sequence": 1}],
                    "item": [
                        {"sequence": 1, "adjudication": [
                            {"category": {"coding": [{"code": "submitted"}]}, "amount": {"value": 100.5, "currency": "USD"}},
                            {"category": {"coding": [{"code": "paid"}]}, "amount": {"value": 80, "currency": "USD"}}
                        ]},
                        {"sequence": 2, "adjudication": [{"category": {"coding": [{"code": "paid"}]}}]}
                    ]
                }},
                {"name": "Encounter", "resource": {
                    "resourceType": "Encounter", "id": "enc1",
                    "participant": [{"individual": {"reference": "Practitioner/dr-1"}}]
                }}
            ]
        }),
        json!({
            "resourceType": "Parameters",
            "id": "doc-2",
            "parameter": [
                {"name": "Patient", "resource": {
                    "resourceType": "Patient", "id": "p2",
                    "name": [{"family": "Jones \"JJ\" | Jr"}]
                }},
                {"name": "Claims", "resource": {
                    "resourceType": "Claim", "id": "c2",
                    "patient": {"reference": "p2"},
                    "diagnosis": [{"sequence": 1}, {"sequence": 2}],
                    "item": [{"sequence": 1, "servicedDate": "2024-01-05"}]
                }},
                {"name": "Observations", "resource": {
                    "resourceType": "Observation", "id": "o1",
                    "subject": {"reference": "Patient/p2"},
                    "effectiveDateTime": "2024-01-06"
                }},
                {"name": "Procedures", "resource": {
                    "resourceType": "Procedure", "id": "pr1",
                    "subject": {"reference": "Patient/p2"},
                    "performedPeriod": {"start": "2024-01-07", "end": "2024-01-08"}
                }},
                {"name": "Dispenses", "resource": {
                    "resourceType": "MedicationDispense", "id": "md1",
                    "subject": {"reference": "Patient/p2"},
                    "quantity": {"value": 30},
                    "daysSupply": {"value": 30}
                }}
            ]
        }),
    ])
}

#[test]
fn test_foreign_keys_resolve_to_exactly_one_parent() {
    let outcome = melt_ndjson(Cursor::new(mixed_input()), MeltConfig::default()).unwrap();
    let tables = &outcome.tables;

    for table in tables.iter() {
        let ids: Vec<String> = table.rows.iter().map(|r| r.text("id")).collect();
        let unique: HashSet<&String> = ids.iter().collect();
        assert_eq!(unique.len(), ids.len(), "duplicate ids in {}", table.name());
    }

    let mut checked = 0;
    for table in tables.iter() {
        for fk in table.plan().foreign_keys() {
            let Target::Table(target) = fk.target else {
                continue;
            };
            for row in &table.rows {
                let value = row.text(fk.column);
                let matches = tables
                    .rows(target)
                    .iter()
                    .filter(|parent| parent.text("id") == value)
                    .count();
                assert_eq!(matches, 1, "{}.{} = {:?}", table.name(), fk.column, value);
                checked += 1;
            }
        }
    }
    assert!(checked > 20);

    assert_eq!(tables.rows(TableKind::EobAdjudications).len(), 3);
    assert_eq!(tables.rows(TableKind::EncounterParticipants)[0].text("encounter_id"), "enc1");
    assert_eq!(tables.rows(TableKind::Observations)[0].text("effective_start"), "2024-01-06");
    assert_eq!(tables.rows(TableKind::Procedures)[0].text("performed_end"), "2024-01-08");
    assert_eq!(tables.rows(TableKind::MedicationDispenses)[0].text("days_supply"), "30");
}

#[test]
fn test_surrogate_ids_increase_in_first_seen_order() {
    let outcome = melt_ndjson(Cursor::new(mixed_input()), MeltConfig::default()).unwrap();

    for table in outcome.tables.iter() {
        if table.plan().key != fhir_melt::melt::KeyKind::Surrogate {
            continue;
        }
        let ids: Vec<u64> = table
            .rows
            .iter()
            .map(|r| r.text("id").parse().unwrap())
            .collect();
        let expected: Vec<u64> = (1..=ids.len() as u64).collect();
        assert_eq!(ids, expected, "{}", table.name());
    }

    let items = outcome.tables.rows(TableKind::EobItems);
    let adjudications = outcome.tables.rows(TableKind::EobAdjudications);
    let owners: Vec<String> = adjudications.iter().map(|r| r.text("eob_item_id")).collect();
    assert_eq!(owners, vec!["1", "1", "2"]);
    assert_eq!(items[1].text("sequence"), "2");
}

#[test]
fn test_written_tables_read_back_unchanged() {
    let (dir, _) = run(&mixed_input(), OutputConfig::default());
    let out = dir.path().join("out");

    let names = read_table(&out, TableKind::PatientNames);
    assert_eq!(names[0]["given"], "Ann Marie");
    assert_eq!(names[1]["family"], "Jones \"JJ\" | Jr");

    let addresses = read_table(&out, TableKind::PatientAddresses);
    assert_eq!(addresses[0]["line"], "1 Main St Apt 2");
    assert_eq!(addresses[0]["postal_code"], "62701");

    let adjudications = read_table(&out, TableKind::EobAdjudications);
    assert_eq!(adjudications[0]["amount_value"], "100.5");
    assert_eq!(adjudications[2]["amount_value"], "");

    let values = read_table(&out, TableKind::ParameterValues);
    assert_eq!(values.len(), 1);
    assert_eq!(values[0]["value_type"], "Boolean");
    assert_eq!(values[0]["value"], "true");
}

#[test]
fn test_headerless_run_writes_field_maps_and_schemas() {
    let config = OutputConfig {
        header: false,
        sql_schema: true,
        access_schema: true,
        ..OutputConfig::default()
    };
    let (dir, summary) = run(&mixed_input(), config);
    let out = dir.path().join("out");

    let patients = fs::read_to_string(out.join("patients.csv")).unwrap();
    assert!(patients.starts_with("\"p1\"|\"doc-1\"|"));

    let field_map = fs::read_to_string(out.join("field_maps").join("patients_fields.txt")).unwrap();
    assert!(field_map.contains("       1 | id\n"));
    assert!(out.join("field_maps").join("procedures_fields.txt").exists());
    assert!(!out.join("field_maps").join("patient_communication_fields.txt").exists());

    assert!(out.join("schema.sql").exists());
    assert!(out.join("ms_access_schema.sql").exists());
    assert!(summary.files.iter().any(|f| f.path.ends_with("schema.sql")));
}

#[test]
fn test_bom_and_malformed_lines() {
    let mut input = String::from("\u{feff}");
    input.push_str(&ndjson(&[json!({"resourceType": "Parameters", "id": "a"})]));
    input.push_str("{\"resourceType\": \"Parameters\", \"id\": \n");
    input.push_str(&ndjson(&[json!({"resourceType": "Bundle", "id": "b"})]));
    input.push_str(&ndjson(&[json!({"resourceType": "Parameters", "id": "c"})]));

    let outcome = melt_ndjson(Cursor::new(input), MeltConfig::default()).unwrap();

    let ids: Vec<String> = outcome
        .tables
        .rows(TableKind::Parameters)
        .iter()
        .map(|r| r.text("id"))
        .collect();
    assert_eq!(ids, vec!["a", "c"]);
    assert_eq!(outcome.report.skipped_lines, vec![2]);
    assert_eq!(outcome.report.skipped_documents, 1);
    assert_eq!(outcome.report.lines_read, 4);
}

#[test]
fn test_null_ids_and_names_keep_their_rows() {
    let input = ndjson(&[
        json!({
            "resourceType": "Parameters",
            "id": "doc-1",
            "parameter": [
                {"name": null, "valueString": "kept"},
                {"name": 42, "valueInteger": 7},
                {"name": "Patient", "resource": {
                    "resourceType": "Patient", "id": null, "gender": "male",
                    "name": [{"family": "Roe"}]
                }},
                {"name": "Claims", "resource": {
                    "resourceType": null, "id": "c1",
                    "item": [{"servicedDate": "2024-02-02"}]
                }}
            ]
        }),
        json!({
            "resourceType": null,
            "id": null,
            "parameter": [
                {"name": "Observation", "resource": {"resourceType": "Observation", "id": "o1"}}
            ]
        }),
    ]);

    let (dir, summary) = run(&input, OutputConfig::default());
    let out = dir.path().join("out");

    assert!(summary.report.skipped_lines.is_empty());
    assert_eq!(summary.report.documents, 2);

    let parameters = read_table(&out, TableKind::Parameters);
    let ids: Vec<&str> = parameters.iter().map(|p| p["id"].as_str()).collect();
    assert_eq!(ids, vec!["doc-1", ""]);

    let values = read_table(&out, TableKind::ParameterValues);
    assert_eq!(values.len(), 2);
    assert_eq!(values[0]["name"], "");
    assert_eq!(values[0]["value"], "kept");
    assert_eq!(values[1]["name"], "42");

    let patients = read_table(&out, TableKind::Patients);
    assert_eq!(patients.len(), 1);
    assert_eq!(patients[0]["id"], "");
    assert_eq!(patients[0]["gender"], "male");
    assert!(!out.join("patient_names.csv").exists());

    let claims = read_table(&out, TableKind::Claims);
    assert_eq!(claims[0]["id"], "c1");
    assert_eq!(claims[0]["serviced_date"], "2024-02-02");

    let observations = read_table(&out, TableKind::Observations);
    assert_eq!(observations[0]["id"], "o1");
    assert_eq!(observations[0]["parameters_id"], "");
}

#[test]
fn test_unknown_resources_written_as_flattened_tables() {
    let input = ndjson(&[json!({
        "resourceType": "Parameters",
        "id": "doc-1",
        "parameter": [
            {"name": "Coverage", "resource": {
                "resourceType": "Coverage", "id": "cov1", "status": "active",
                "class": [{"value": "gold"}, {"value": "dental"}]
            }},
            {"name": "Patient", "resource": {"resourceType": "Patient", "id": "p1"}}
        ]
    })]);

    let (dir, _) = run(&input, OutputConfig::default());
    assert!(!dir.path().join("out").join("coverage.csv").exists());

    let melt_config = MeltConfig {
        flatten_unknown: true,
        ..MeltConfig::default()
    };
    let (dir, summary) = run_with(&input, melt_config, OutputConfig::default());
    let out = dir.path().join("out");

    assert_eq!(summary.report.flattened_resources, 1);
    assert!(summary
        .files
        .iter()
        .any(|f| f.kind == FileKind::Flattened("coverage".to_string())));

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'|')
        .from_path(out.join("coverage.csv"))
        .unwrap();
    let headers: Vec<String> = reader.headers().unwrap().iter().map(String::from).collect();
    assert_eq!(
        headers,
        vec!["parameters_id", "resourceType", "id", "status", "class[0].value", "class[1].value"]
    );
    let records: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
    assert_eq!(records.len(), 1);
    assert_eq!(&records[0][0], "doc-1");
    assert_eq!(&records[0][5], "dental");

    assert_eq!(read_table(&out, TableKind::Patients).len(), 1);
}
