use datapost_core::criteria::CriteriaExpr;
use datapost_core::{validate_criteria, CriteriaConfig, CriteriaError};
use serde_json::{json, Value};

const SIRET: &str = "13002526500013";

fn first_error(value: &Value, config: &CriteriaConfig) -> CriteriaError {
    let errors = validate_criteria(value, config).unwrap_err();
    assert_eq!(errors.len(), 1, "validation is fail-fast");
    errors.into_iter().next().unwrap()
}

fn current(value: Value) -> CriteriaError {
    first_error(&value, &CriteriaConfig::default())
}

fn legacy(value: Value) -> CriteriaError {
    first_error(&value, &CriteriaConfig::legacy_siret_only())
}

#[test]
fn blank_documents_are_valid() {
    let config = CriteriaConfig::default();
    for blank in [json!(null), json!({}), json!([]), json!("")] {
        assert!(validate_criteria(&blank, &config).is_ok(), "{blank}");
    }
}

#[test]
fn whitespace_string_is_not_blank() {
    assert_eq!(
        current(json!("   ")),
        CriteriaError::NotAHash {
            path: String::new()
        }
    );
}

#[test]
fn full_grammar_is_accepted() {
    let value = json!({
        "_or": [
            {"siret": [SIRET], "organization_id": "8a1e0c5e-7c5f-4f6b-a3f4-2a6f5d0b1c2d"},
            {"_and": [{"subscription_id": []}, {"siret": SIRET}]}
        ]
    });
    assert!(validate_criteria(&value, &CriteriaConfig::default()).is_ok());
}

#[test]
fn non_hash_nodes_are_located_by_path() {
    assert_eq!(
        current(json!(42)),
        CriteriaError::NotAHash {
            path: String::new()
        }
    );
    assert_eq!(
        current(json!({"_or": [{"siret": [SIRET]}, "siret"]})),
        CriteriaError::NotAHash {
            path: "_or[1]".to_string()
        }
    );
}

#[test]
fn depth_two_is_accepted_and_depth_three_rejected() {
    let depth_two = json!({"_or": [{"_and": [{"siret": [SIRET]}]}]});
    assert!(validate_criteria(&depth_two, &CriteriaConfig::default()).is_ok());

    let depth_three = json!({"_or": [{"_and": [{"_or": [{"siret": [SIRET]}]}]}]});
    let err = current(depth_three);
    assert_eq!(err, CriteriaError::ExceedsMaxDepth { max: 2 });
    assert_eq!(err.to_string(), "exceeds maximum nesting depth of 2");
}

#[test]
fn twenty_criteria_are_accepted_and_twenty_one_rejected() {
    let leaves = |count: usize| -> Value {
        let items: Vec<Value> = (0..count).map(|_| json!({"siret": [SIRET]})).collect();
        json!({ "_or": items })
    };

    assert!(validate_criteria(&leaves(20), &CriteriaConfig::default()).is_ok());
    assert_eq!(
        current(leaves(21)),
        CriteriaError::TooManyCriteria { max: 20 }
    );
}

#[test]
fn criteria_count_spans_the_whole_tree() {
    let items: Vec<Value> = (0..7)
        .map(|_| json!({"siret": [SIRET], "organization_id": ["o"], "subscription_id": ["s"]}))
        .collect();
    assert_eq!(
        current(json!({ "_and": items })),
        CriteriaError::TooManyCriteria { max: 20 }
    );
}

#[test]
fn operator_shape_errors() {
    assert_eq!(
        current(json!({"_or": {"siret": [SIRET]}})),
        CriteriaError::OperatorMustBeArray {
            operator: "_or".to_string(),
            path: String::new()
        }
    );

    let nested_empty = current(json!({"_or": [{"siret": [SIRET]}, {"_and": []}]}));
    assert_eq!(nested_empty.to_string(), "_or[1]._and must not be empty");
}

#[test]
fn operator_precedence_ignores_sibling_keys() {
    let config = CriteriaConfig::default();
    let or_with_and = json!({"_or": [{"siret": [SIRET]}], "_and": []});
    assert!(validate_criteria(&or_with_and, &config).is_ok());

    let or_with_leaf_key = json!({"_or": [{"siret": [SIRET]}], "region": ["idf"]});
    assert!(validate_criteria(&or_with_leaf_key, &config).is_ok());

    // The `_or` branch is the one that gets checked.
    assert_eq!(
        current(json!({"_or": [], "_and": [{"siret": [SIRET]}]})),
        CriteriaError::OperatorMustNotBeEmpty {
            operator: "_or".to_string(),
            path: String::new()
        }
    );
}

#[test]
fn unknown_keys_are_rejected() {
    assert_eq!(
        current(json!({"_not": [{"siret": [SIRET]}]})),
        CriteriaError::UnknownOperator("_not".to_string())
    );
    assert_eq!(
        current(json!({"_or": [{"region": ["idf"]}]})),
        CriteriaError::UnsupportedCriterion("region".to_string())
    );
    assert_eq!(
        current(json!({"Siret": [SIRET]})).to_string(),
        "unsupported criterion: Siret"
    );
}

#[test]
fn non_string_values_are_rejected() {
    assert_eq!(
        current(json!({"siret": [SIRET, 13002526500013_u64]})),
        CriteriaError::InvalidValue {
            criterion: "siret".to_string(),
            index: 1
        }
    );
    assert_eq!(current(json!({"organization_id": true})).code(), "invalid_value");
}

#[test]
fn legacy_profile_accepts_plain_siret_lists() {
    let config = CriteriaConfig::legacy_siret_only();
    assert!(validate_criteria(&json!({"siret": [SIRET, "34495448100022"]}), &config).is_ok());
    assert!(validate_criteria(&json!(null), &config).is_ok());
}

#[test]
fn legacy_profile_rejects_richer_grammar() {
    assert_eq!(
        legacy(json!({"organization_id": ["o"]})),
        CriteriaError::UnsupportedCriterion("organization_id".to_string())
    );
    assert_eq!(
        legacy(json!({"_or": [{"siret": [SIRET]}]})),
        CriteriaError::UnknownOperator("_or".to_string())
    );
    assert!(validate_criteria(
        &json!({"siret": [SIRET], "subscription_id": ["s"]}),
        &CriteriaConfig::legacy_siret_only()
    )
    .is_err());
}

#[test]
fn legacy_profile_checks_values() {
    assert_eq!(
        legacy(json!({"siret": []})),
        CriteriaError::EmptyValues {
            criterion: "siret".to_string()
        }
    );
    assert_eq!(
        legacy(json!({"siret": [SIRET, "1234"]})),
        CriteriaError::InvalidValue {
            criterion: "siret".to_string(),
            index: 1
        }
    );

    let too_many: Vec<String> = (0..101).map(|i| format!("{:014}", i)).collect();
    assert_eq!(
        legacy(json!({ "siret": too_many })),
        CriteriaError::TooManyValues {
            criterion: "siret".to_string(),
            max: 100
        }
    );
}

#[test]
fn validator_and_parser_agree() {
    let config = CriteriaConfig::default();
    let documents = [
        json!({"_or": [{"siret": [SIRET]}, {"_and": [{"organization_id": ["o"]}]}]}),
        json!({"_or": []}),
        json!({"_and": [{"_or": [{"_and": [{"siret": [SIRET]}]}]}]}),
        json!({"bogus": []}),
    ];
    for document in documents {
        let validated = validate_criteria(&document, &config).map_err(|errors| errors[0].clone());
        let parsed = CriteriaExpr::parse(&document, &config).map(|_| ());
        assert_eq!(validated, parsed, "{document}");
    }
}
