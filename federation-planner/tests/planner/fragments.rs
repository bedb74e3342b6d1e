use federation_planner::plan::FetchKind;
use pretty_assertions::assert_eq;

use super::support::accounts;
use super::support::plan;
use super::support::planner;
use super::support::reviews;

#[test]
fn fragments_without_planned_fields_are_pruned() {
    // both data sources resolve Node fields, only accounts ends up resolving `id`
    let mut planner = planner(vec![
        accounts().with_child_node("Node", ["id"]),
        reviews().with_child_node("Node", ["id"]),
    ]);
    assert_plan!(
        &mut planner,
        "{ me { name reviews { body } ... on Node { id } } }",
        @r###"
    Plan {
      Fetch(id: 0, service: "accounts") {
        {
          me {
            name
            __typename
            id
            ... on Node {
              id
            }
          }
        }
      },
      Fetch(id: 1, service: "reviews", path: "me", dependsOn: [0]) {
        {
          ... on User {
            __typename
            id
          }
        } =>
        {
          ... on User {
            reviews {
              body
            }
          }
        }
      },
    }
    "###
    );
}

#[test]
fn root_level_fragments_stay_on_root_fetches() {
    let mut planner = planner(vec![accounts()]);
    let plan = plan(
        &mut planner,
        "query($skip: Boolean!) { ... on Query @skip(if: $skip) { me { name } } }",
    )
    .unwrap();
    assert_eq!(plan.fetches.len(), 1);
    let fetch = &plan.fetches[0];
    assert_eq!(fetch.kind, FetchKind::Root);
    assert_eq!(fetch.parent_path, "query");
    assert_eq!(fetch.variables, ["skip"]);
    insta::assert_snapshot!(fetch.input, @r###"
    query($skip: Boolean!) {
      ... on Query @skip(if: $skip) {
        me {
          name
        }
      }
    }
    "###);
}
