use federation_planner::DataSourceConfiguration;
use federation_planner::PlanOptions;
use federation_planner::plan::FetchKind;
use federation_planner::plan::FetchQueryPlan;
use pretty_assertions::assert_eq;

use super::support::plan;
use super::support::plan_with;
use super::support::planner;

fn products() -> DataSourceConfiguration {
    DataSourceConfiguration::new("products")
        .with_root_node("Query", ["topProducts"])
        .with_root_node("Product", ["upc", "name"])
}

#[test]
fn single_data_source() {
    let mut planner = planner(vec![
        DataSourceConfiguration::new("a")
            .with_root_node("Query", ["a"])
            .with_child_node("A", ["x", "y"]),
    ]);
    let plan = assert_plan!(
        &mut planner,
        "{ a { x } }",
        @r###"
    Plan {
      Fetch(id: 0, service: "a") {
        {
          a {
            x
          }
        }
      },
    }
    "###
    );
    let fetch = &plan.fetches[0];
    assert_eq!(fetch.kind, FetchKind::Root);
    assert_eq!(fetch.parent_path, "query");
    assert!(fetch.merge_path.is_empty());
    assert_eq!(fetch.representations, None);
    assert_eq!(fetch.input, "{\n  a {\n    x\n  }\n}");
    assert_eq!(plan.query_plan, None);
}

#[test]
fn picks_the_data_source_covering_everything() {
    let mut planner = planner(vec![
        DataSourceConfiguration::new("first")
            .with_root_node("Query", ["a"])
            .with_child_node("A", ["y"]),
        DataSourceConfiguration::new("second")
            .with_root_node("Query", ["a"])
            .with_child_node("A", ["x"]),
    ]);
    let plan = assert_plan!(
        &mut planner,
        "{ a { x } }",
        @r###"
    Plan {
      Fetch(id: 0, service: "second") {
        {
          a {
            x
          }
        }
      },
    }
    "###
    );
    assert_eq!(plan.fetches_for("first").count(), 0);
}

#[test]
fn repeated_planning_gives_the_same_plan() {
    let mut planner = planner(vec![
        super::support::accounts(),
        super::support::reviews(),
    ]);
    let operation = "{ me { name reviews { body } } }";
    let first = plan(&mut planner, operation).unwrap();
    let second = plan(&mut planner, operation).unwrap();
    assert_eq!(first, second);

    let other = plan(&mut planner, "{ me { name } }").unwrap();
    assert_eq!(other.fetches.len(), 1);
    assert_eq!(plan(&mut planner, operation).unwrap(), first);
}

#[test]
fn renders_named_operations_with_variables() {
    let mut planner = planner(vec![products()]);
    let plan = plan_with(
        &mut planner,
        "query TopProducts($first: Int) { topProducts(first: $first) { name } }",
        None,
        PlanOptions::default(),
    )
    .unwrap();
    assert_eq!(plan.operation_name.as_deref(), Some("TopProducts"));
    let fetch = &plan.fetches[0];
    assert_eq!(fetch.variables, ["first"]);
    insta::assert_snapshot!(fetch.input, @r###"
    query TopProducts__products__0($first: Int) {
      topProducts(first: $first) {
        name
      }
    }
    "###);
}

#[test]
fn collects_variables_from_directives() {
    let mut planner = planner(vec![products()]);
    let plan = plan(
        &mut planner,
        "query($withName: Boolean!) { topProducts { upc name @include(if: $withName) } }",
    )
    .unwrap();
    insta::assert_snapshot!(plan.fetches[0].input, @r###"
    query($withName: Boolean!) {
      topProducts {
        upc
        name @include(if: $withName)
      }
    }
    "###);
}

#[test]
fn minifies_subgraph_operations() {
    let mut planner = federation_planner::Planner::new(federation_planner::Configuration {
        data_sources: vec![products()],
        minify_subgraph_operations: true,
        ..Default::default()
    })
    .unwrap();
    let plan = plan(
        &mut planner,
        "query TopProducts($first: Int) { topProducts(first: $first) { name } }",
    )
    .unwrap();
    assert_eq!(
        plan.fetches[0].input,
        "query TopProducts__products__0($first: Int) { topProducts(first: $first) { name } }"
    );
}

#[test]
fn root_typename_joins_a_root_fetch() {
    let mut planner = planner(vec![products()]);
    let plan = plan(&mut planner, "{ __typename topProducts { name } }").unwrap();
    assert_eq!(plan.fetches.len(), 1);
    assert_eq!(plan.fetches[0].field_paths(), ["__typename", "topProducts", "topProducts.name"]);
    insta::assert_snapshot!(plan.fetches[0].input, @r###"
    {
      __typename
      topProducts {
        name
      }
    }
    "###);
}

#[test]
fn root_typename_alone_is_fetched() {
    let mut planner = planner(vec![
        DataSourceConfiguration::new("a").with_child_node("A", ["x"]),
        products(),
    ]);
    let plan = plan(&mut planner, "{ __typename }").unwrap();
    assert_eq!(plan.fetches.len(), 1);
    assert_eq!(plan.fetches[0].data_source_id, "products");
    assert_eq!(plan.fetches[0].input, "{\n  __typename\n}");
}

#[test]
fn includes_query_plans_on_request() {
    let mut planner = planner(vec![products()]);
    let plan = plan_with(
        &mut planner,
        "{ topProducts { name } }",
        None,
        PlanOptions {
            include_query_plan_in_response: true,
        },
    )
    .unwrap();
    assert_eq!(plan.query_plan.as_deref(), Some(plan.to_string().as_str()));
    assert_eq!(
        plan.fetches[0].query_plan,
        Some(FetchQueryPlan {
            data_source_id: "products".to_owned(),
            fetch_id: 0,
            depends_on_fetch_ids: Vec::new(),
            path: "query".to_owned(),
            query: "{\n  topProducts {\n    name\n  }\n}".to_owned(),
        })
    );
}

#[test]
fn debug_switches_do_not_change_the_plan() {
    let mut quiet = planner(vec![products()]);
    let mut verbose = planner(vec![products()]);
    verbose.set_debug_config(federation_planner::DebugConfiguration {
        print_operation_transformations: true,
        print_planning_paths: true,
        print_node_suggestions: true,
        print_query_plans: true,
        configuration_visitor: true,
        planning_visitor: true,
        datasource_visitor: true,
        enable_node_suggestions_selection_reasons: true,
    });
    let operation = "{ topProducts { upc name } }";
    let expected = plan(&mut quiet, operation).unwrap();
    let mut actual = plan(&mut verbose, operation).unwrap();
    assert_eq!(actual.fetches[0].debug_id.as_deref(), Some("products#0"));
    actual.fetches[0].debug_id = None;
    assert_eq!(actual, expected);
}
