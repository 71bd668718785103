use std::collections::BTreeSet;
use std::sync::Arc;

use cohortql_core::SearchRequest;
use cohortql_search::{
    AncestorKey, CohortCompiler, CompileError, CompiledQuery, CompilerConfig, CompilerContext,
    CriteriaAncestorStore, CriteriaLookup, HierarchyResolver, InMemoryAncestorStore,
    QueryParameterValue, Selection, StoreError,
};
use regex::Regex;
use serde_json::json;

fn compiler() -> CohortCompiler {
    let config = CompilerConfig::new("all-of-us-ehr", "cdr2024");
    let context = CompilerContext::from_config(&config).expect("valid config");
    CohortCompiler::new(Arc::new(context))
}

fn request(value: serde_json::Value) -> SearchRequest {
    serde_json::from_value(value).expect("valid request json")
}

fn include(items: serde_json::Value) -> SearchRequest {
    request(json!({ "includes": [{ "items": items }] }))
}

fn compile(request: &SearchRequest) -> Result<CompiledQuery, CompileError> {
    tokio_test::block_on(compiler().compile_with_resolver(
        request,
        &HierarchyResolver::new(Arc::new(InMemoryAncestorStore::new())),
        Selection::Participants,
    ))
}

/// Names referenced in the SQL text and names bound in the parameter table.
fn parameter_names(query: &CompiledQuery) -> (BTreeSet<String>, BTreeSet<String>) {
    let token = Regex::new(r"@([A-Za-z_][A-Za-z0-9_]*)").unwrap();
    let referenced = token
        .captures_iter(&query.sql)
        .map(|c| c[1].to_string())
        .collect();
    let bound = query.parameters.names().map(str::to_string).collect();
    (referenced, bound)
}

fn assert_fully_bound(query: &CompiledQuery) {
    let (referenced, bound) = parameter_names(query);
    assert_eq!(referenced, bound, "sql: {}", query.sql);
}

fn gender_item() -> serde_json::Value {
    json!({
        "type": "DEMO",
        "searchParameters": [{
            "domain": "PERSON",
            "type": "DEMO",
            "subtype": "GEN",
            "conceptId": 8507
        }]
    })
}

fn condition_item(code: &str, temporal_group: i32) -> serde_json::Value {
    json!({
        "type": "ICD10",
        "temporalGroup": temporal_group,
        "searchParameters": [{
            "domain": "CONDITION",
            "type": "ICD10CM",
            "value": code,
            "group": true
        }]
    })
}

fn drug_item(concept_id: i64, temporal_group: i32) -> serde_json::Value {
    json!({
        "type": "DRUG",
        "temporalGroup": temporal_group,
        "searchParameters": [{
            "domain": "DRUG",
            "type": "RXNORM",
            "conceptId": concept_id,
            "standard": true
        }]
    })
}

#[test]
fn demographic_gender_binds_concept() {
    let query = compile(&include(json!([gender_item()]))).unwrap();

    let pattern = Regex::new(r"p\.gender_concept_id = @(\w+)").unwrap();
    let name = &pattern.captures(&query.sql).expect("gender predicate")[1];
    assert_eq!(
        query.parameters.get(name).and_then(|v| v.value()).as_deref(),
        Some("8507")
    );
    assert!(!query.sql.contains("8507"));
    assert_fully_bound(&query);
}

#[test]
fn code_group_emits_one_like_per_code() {
    let params: Vec<_> = ["11.1", "11.2", "11.3"]
        .into_iter()
        .map(|code| json!({ "domain": "PROCEDURE", "type": "ICD9Proc", "value": code }))
        .collect();
    let query = compile(&include(json!([{ "type": "CODES", "searchParameters": params }]))).unwrap();

    assert!(query
        .sql
        .contains("(code like @code1 or code like @code2 or code like @code3)"));
    assert_eq!(query.sql.matches("code like @code").count(), 3);
    assert!(query.sql.contains("is_selectable = TRUE and is_group = FALSE order by code asc"));
    assert_eq!(
        query.parameters.get("code3"),
        Some(&QueryParameterValue::String("11.3%".into()))
    );
    assert_fully_bound(&query);
}

#[test]
fn between_with_one_operand_is_rejected() {
    let req = include(json!([{
        "type": "MEASUREMENT",
        "searchParameters": [{
            "domain": "MEASUREMENT",
            "type": "LOINC",
            "conceptId": 3004410,
            "standard": true,
            "attributes": [{ "name": "NUM", "operator": "BETWEEN", "operands": ["5"] }]
        }]
    }]));

    let err = compile(&req).unwrap_err();
    let CompileError::Validation(validation) = &err else {
        panic!("expected validation error, got {err:?}");
    };
    assert!(validation.message().contains("BETWEEN"));
    assert!(validation.message().contains("2 operands"));
    assert_eq!(validation.field(), "operands");
}

#[test]
fn temporal_first_mention_days_after() {
    let req = request(json!({
        "includes": [{
            "temporal": true,
            "mention": "FIRST_MENTION",
            "time": "X_DAYS_AFTER",
            "timeValue": 5,
            "items": [condition_item("E11", 0), drug_item(1503297, 1)]
        }]
    }));
    let query = compile(&req).unwrap();

    assert!(!query.sql.contains("select distinct g0.person_id from (select ranked.person_id"));
    assert!(query.sql.contains(") g0 where exists (select 1 from (select ranked.person_id"));
    assert!(query.sql.contains("g1.person_id = g0.person_id"));
    assert_eq!(
        query
            .sql
            .matches("row_number() over (partition by e.person_id order by e.entry_date, e.visit_occurrence_id)")
            .count(),
        1
    );

    let relation = Regex::new(r"g1\.entry_date >= DATE_ADD\(g0\.entry_date, INTERVAL @(\w+) DAY\)").unwrap();
    let name = &relation.captures(&query.sql).expect("days-after relation")[1];
    assert_eq!(query.parameters.get(name), Some(&QueryParameterValue::Int64(5)));
    assert_eq!(
        query.parameters.get("code1"),
        Some(&QueryParameterValue::String("E11%".into()))
    );
    assert_fully_bound(&query);
}

#[test]
fn temporal_last_mention_days_before() {
    let req = request(json!({
        "includes": [{
            "temporal": true,
            "mention": "LAST_MENTION",
            "time": "X_DAYS_BEFORE",
            "timeValue": 30,
            "items": [drug_item(1503297, 0), drug_item(1503298, 1)]
        }]
    }));
    let query = compile(&req).unwrap();

    assert!(query.sql.contains("select distinct g0.person_id from (select person_id, entry_date"));
    assert_eq!(query.sql.matches("row_number()").count(), 1);
    assert!(query.sql.contains(
        "row_number() over (partition by e.person_id order by e.entry_date desc, e.visit_occurrence_id desc) rn"
    ));

    let relation = Regex::new(r"g1\.entry_date <= DATE_SUB\(g0\.entry_date, INTERVAL @(\w+) DAY\)").unwrap();
    let name = &relation.captures(&query.sql).expect("days-before relation")[1];
    assert_eq!(query.parameters.get(name), Some(&QueryParameterValue::Int64(30)));
    assert!(!query.sql.contains("DATE_ADD"));
    assert_fully_bound(&query);
}

#[test]
fn temporal_group_with_one_tag_is_rejected() {
    let req = request(json!({
        "includes": [{
            "temporal": true,
            "mention": "ANY_MENTION",
            "time": "DURING_SAME_ENCOUNTER_AS",
            "items": [condition_item("E11", 0), drug_item(1503297, 0)]
        }]
    }));
    let err = compile(&req).unwrap_err();
    assert!(err.is_client_error());
    assert_eq!(
        err.to_string(),
        "Bad Request: Search Group Items must provided for 2 different temporal groups(0 or 1)"
    );
}

#[test]
fn unknown_operator_names_the_field() {
    let req = include(json!([{
        "type": "MEASUREMENT",
        "searchParameters": [{
            "domain": "MEASUREMENT",
            "type": "LOINC",
            "conceptId": 3004410,
            "standard": true,
            "attributes": [{ "name": "NUM", "operator": "ROUGHLY", "operands": ["5"] }]
        }]
    }]));

    let err = compile(&req).unwrap_err();
    assert!(err.is_client_error());
    let CompileError::Validation(validation) = &err else {
        panic!("expected validation error, got {err:?}");
    };
    assert_eq!(validation.field(), "operator");
    assert_eq!(err.to_string(), "Bad Request: ROUGHLY is not a valid operator");
}

#[test]
fn unknown_temporal_mention_is_rejected() {
    let req = request(json!({
        "includes": [{
            "temporal": true,
            "mention": "EVERY_MENTION",
            "items": [condition_item("E11", 0), drug_item(1503297, 1)]
        }]
    }));
    let err = compile(&req).unwrap_err();
    let CompileError::Validation(validation) = &err else {
        panic!("expected validation error, got {err:?}");
    };
    assert_eq!(validation.field(), "mention");
}

#[test]
fn hypotensive_blood_pressure() {
    let req = include(json!([{
        "type": "PHYSICAL_MEASUREMENT",
        "searchParameters": [{
            "domain": "PHYSICAL_MEASUREMENT",
            "type": "PM",
            "subtype": "BP",
            "group": false,
            "attributes": [
                {
                    "conceptId": 903118,
                    "name": "SYSTOLIC",
                    "operands": ["90"],
                    "operator": "LESS_THAN_OR_EQUAL_TO"
                },
                {
                    "conceptId": 903115,
                    "name": "DIASTOLIC",
                    "operands": ["60"],
                    "operator": "LESS_THAN_OR_EQUAL_TO"
                }
            ]
        }],
        "modifiers": []
    }]));
    let query = compile(&req).unwrap();

    let pattern = Regex::new(
        r"concept_id in unnest\(@(\w+)\) and systolic <= @(\w+) and diastolic <= @(\w+)",
    )
    .unwrap();
    let captures = pattern.captures(&query.sql).expect("blood pressure predicate");
    assert_eq!(
        query.parameters.get(&captures[1]),
        Some(&QueryParameterValue::Int64Array(vec![903118, 903115]))
    );
    assert_eq!(
        query.parameters.get(&captures[2]),
        Some(&QueryParameterValue::Float64(90.0))
    );
    assert_eq!(
        query.parameters.get(&captures[3]),
        Some(&QueryParameterValue::Float64(60.0))
    );
    assert_fully_bound(&query);
}

#[test]
fn blood_pressure_attribute_without_concept_is_rejected() {
    let req = include(json!([{
        "type": "PHYSICAL_MEASUREMENT",
        "searchParameters": [{
            "domain": "PHYSICAL_MEASUREMENT",
            "type": "PM",
            "subtype": "BP",
            "attributes": [
                { "conceptId": 903118, "name": "SYSTOLIC", "operands": ["90"], "operator": "LESS_THAN_OR_EQUAL_TO" },
                { "name": "DIASTOLIC", "operands": ["60"], "operator": "LESS_THAN_OR_EQUAL_TO" }
            ]
        }]
    }]));
    let err = compile(&req).unwrap_err();
    assert_eq!(
        err.to_string(),
        "Bad Request: blood pressure attribute DIASTOLIC requires a concept id"
    );
}

#[test]
fn empty_descendants_match_nothing() {
    let req = include(json!([{
        "type": "DRUG",
        "searchParameters": [{
            "domain": "DRUG",
            "type": "ATC",
            "conceptId": 21600001,
            "group": true,
            "ancestorData": true,
            "standard": true
        }]
    }]));
    let query = compile(&req).unwrap();

    let pattern = Regex::new(r"concept_id in unnest\(@(\w+)\)").unwrap();
    let name = &pattern.captures(&query.sql).expect("concept predicate")[1];
    assert_eq!(
        query.parameters.get(name),
        Some(&QueryParameterValue::Int64Array(vec![]))
    );
}

#[test]
fn compilation_is_deterministic() {
    let req = request(json!({
        "includes": [
            { "items": [gender_item(), condition_item("E11", 0)] },
            { "items": [drug_item(1503297, 0)] }
        ],
        "excludes": [{ "items": [condition_item("I10", 0)] }]
    }));
    let first = compile(&req).unwrap();
    let second = compile(&req).unwrap();

    assert_eq!(first.sql, second.sql);
    assert_eq!(
        first.parameters.names().collect::<Vec<_>>(),
        second.parameters.names().collect::<Vec<_>>()
    );
    assert_eq!(first, second);
    assert_fully_bound(&first);
}

#[test]
fn excludes_are_subtracted() {
    let req = request(json!({
        "includes": [{ "items": [gender_item()] }],
        "excludes": [{ "items": [drug_item(1503297, 0)] }]
    }));
    let query = compile(&req).unwrap();
    assert!(query.sql.starts_with("select person.person_id from `all-of-us-ehr.cdr2024.person` person where person.person_id in ("));
    assert!(query.sql.contains(") and person.person_id not in (select distinct criteria.person_id"));
}

#[test]
fn count_query_shares_predicate() {
    let req = include(json!([gender_item()]));
    let compiler = compiler();
    let lookup = CriteriaLookup::new();
    let ids = compiler.compile(&req, &lookup).unwrap();
    let count = compiler.compile_count(&req, &lookup).unwrap();

    assert!(count.sql.starts_with("select count(*) as count from "));
    let predicate = |sql: &str| sql.split_once(" where ").map(|(_, rest)| rest.to_string());
    assert_eq!(predicate(&ids.sql), predicate(&count.sql));
    assert_eq!(ids.parameters, count.parameters);
}

#[test]
fn unknown_type_family() {
    let req = include(json!([{
        "type": "GENOMICS",
        "searchParameters": [{ "domain": "PERSON", "type": "DEMO" }]
    }]));
    let err = compile(&req).unwrap_err();
    assert!(matches!(err, CompileError::UnknownTypeFamily(ref tag) if tag == "GENOMICS"));
    assert!(err.is_server_error());
}

#[test]
fn validation_is_repeatable() {
    let req = include(json!([{
        "type": "CONDITION",
        "searchParameters": [{ "domain": "CONDITION", "type": "SNOMED", "conceptId": 201826 }],
        "modifiers": [
            { "name": "AGE_AT_EVENT", "operator": "GREATER_THAN", "operands": ["18"] },
            { "name": "AGE_AT_EVENT", "operator": "LESS_THAN", "operands": ["65"] }
        ]
    }]));
    let compiler = compiler();
    let first = compiler.validate(&req).unwrap_err().to_string();
    let second = compiler.validate(&req).unwrap_err().to_string();
    assert_eq!(first, second);
    assert_eq!(first, "Bad Request: modifier AGE_AT_EVENT can only be specified once");
}

struct UnavailableStore;

#[async_trait::async_trait]
impl CriteriaAncestorStore for UnavailableStore {
    async fn descendants(&self, _key: &AncestorKey) -> Result<Vec<i64>, StoreError> {
        Err(Box::new(std::io::Error::other("connection reset")))
    }
}

#[test]
fn store_failure_aborts_compilation() {
    let req = include(json!([{
        "type": "DRUG",
        "searchParameters": [{
            "domain": "DRUG",
            "type": "ATC",
            "conceptId": 21600001,
            "group": true,
            "ancestorData": true,
            "standard": true
        }]
    }]));
    let resolver = HierarchyResolver::new(Arc::new(UnavailableStore));
    let err = tokio_test::block_on(compiler().compile_with_resolver(
        &req,
        &resolver,
        Selection::Participants,
    ))
    .unwrap_err();

    let CompileError::Resolution(resolution) = err else {
        panic!("expected resolution error");
    };
    assert_eq!(resolution.ancestor_id, 21600001);
    assert!(resolution.to_string().contains("connection reset"));
}
