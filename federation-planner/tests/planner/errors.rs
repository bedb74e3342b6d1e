use federation_planner::Configuration;
use federation_planner::DataSourceConfiguration;
use federation_planner::ErrorKind;
use federation_planner::PlanOptions;
use federation_planner::Planner;
use federation_planner::PlanningError;
use pretty_assertions::assert_eq;
use rstest::rstest;

use super::support::plan;
use super::support::plan_with;
use super::support::planner;

fn a() -> DataSourceConfiguration {
    DataSourceConfiguration::new("a")
        .with_root_node("Query", ["a"])
        .with_child_node("A", ["x", "y"])
}

#[rstest]
#[case::missing_name(None, Some(PlanningError::OperationNameRequired))]
#[case::unknown_name(Some("C"), Some(PlanningError::OperationNotFound { name: "C".to_owned() }))]
#[case::padded_name(Some(" B "), None)]
fn operation_selection(#[case] operation_name: Option<&str>, #[case] expected: Option<PlanningError>) {
    let mut planner = planner(vec![a()]);
    let result = plan_with(
        &mut planner,
        "query A { a { x } } query B { a { y } }",
        operation_name,
        PlanOptions::default(),
    );
    match expected {
        Some(expected) => {
            let report = result.unwrap_err();
            assert_eq!(report.errors(), [expected]);
            assert_eq!(report.external_errors().count(), 1);
        }
        None => assert_eq!(result.unwrap().operation_name.as_deref(), Some("B")),
    }
}

#[test]
fn unresolvable_fields_are_external_errors() {
    let mut planner = planner(vec![
        DataSourceConfiguration::new("a")
            .with_root_node("Query", ["a"])
            .with_child_node("A", ["x"]),
    ]);
    let report = plan(&mut planner, "{ a { y } }").unwrap_err();
    assert_eq!(
        report.errors(),
        [PlanningError::FieldNotResolvable {
            type_name: "A".to_owned(),
            field_name: "y".to_owned(),
        }]
    );
    assert_eq!(report.errors()[0].kind(), ErrorKind::External);
    assert_eq!(report.to_string(), "external error: could not resolve A.y");
}

#[test]
fn unreachable_entity_fields_stop_planning() {
    // reviews declares no key for User: nothing can hand it a user
    let mut planner = planner(vec![
        DataSourceConfiguration::new("accounts")
            .with_root_node("Query", ["me"])
            .with_root_node("User", ["id"]),
        DataSourceConfiguration::new("reviews")
            .with_root_node("User", ["reviews"])
            .with_child_node("Review", ["body"]),
    ]);
    let report = plan(&mut planner, "{ me { reviews { body } } }").unwrap_err();
    assert_eq!(
        report.errors(),
        [PlanningError::PlanningDidNotConverge {
            missing_paths: vec!["query.me.reviews".to_owned()],
        }]
    );
    assert_eq!(report.internal_errors().count(), 1);
}

#[test]
fn duplicate_data_source_ids_are_rejected() {
    let error = Planner::new(Configuration {
        data_sources: vec![a(), DataSourceConfiguration::new("x"), DataSourceConfiguration::new("x")],
        ..Default::default()
    })
    .unwrap_err();
    assert_eq!(error.to_string(), "duplicate datasource id: x");
    assert!(error.is_internal());
}
