use apollo_compiler::executable;
use federation_planner::DataSourceConfiguration;
use federation_planner::Plan;
use federation_planner::plan::FetchKind;
use federation_planner::plan::FetchNode;
use federation_planner::plan::FetchPathElement;
use pretty_assertions::assert_eq;

use super::support::accounts;
use super::support::plan;
use super::support::planner;
use super::support::reviews;

#[test]
fn entity_fields_depend_on_the_key_provider() {
    let mut planner = planner(vec![accounts(), reviews()]);
    let plan = assert_plan!(
        &mut planner,
        "{ me { name reviews { body } } }",
        @r###"
    Plan {
      Fetch(id: 0, service: "accounts") {
        {
          me {
            name
            __typename
            id
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

    let entity = &plan.fetches[1];
    assert_eq!(
        entity.kind,
        FetchKind::Entity {
            type_name: "User".to_owned()
        }
    );
    assert_eq!(entity.parent_path, "query.me");
    assert_eq!(entity.merge_path, [FetchPathElement::Key("me".to_owned())]);
    insta::assert_snapshot!(entity.input, @r###"
    query($representations: [_Any!]!) {
      _entities(representations: $representations) {
        ... on User {
          reviews {
            body
          }
        }
      }
    }
    "###);
}

/// `me.reviews.` for a fetch merged at `me.reviews.@`. List indices are dropped.
fn merge_prefix(fetch: &FetchNode) -> String {
    fetch
        .merge_path
        .iter()
        .filter_map(|element| match element {
            FetchPathElement::Key(key) => Some(format!("{key}.")),
            _ => None,
        })
        .collect()
}

/// Response paths of every field fetched by `plan`, sorted.
fn fetched_paths(plan: &Plan) -> Vec<String> {
    let mut paths: Vec<String> = plan
        .fetches
        .iter()
        .flat_map(|fetch| {
            let prefix = merge_prefix(fetch);
            fetch
                .field_paths()
                .into_iter()
                .map(move |path| format!("{prefix}{path}"))
        })
        .collect();
    paths.sort();
    paths
}

fn response_paths(selection_set: &executable::SelectionSet, prefix: &str, paths: &mut Vec<String>) {
    for selection in &selection_set.selections {
        match selection {
            executable::Selection::Field(field) => {
                let path = format!("{prefix}{}", field.response_key());
                response_paths(&field.selection_set, &format!("{path}."), paths);
                paths.push(path);
            }
            executable::Selection::InlineFragment(fragment) => {
                response_paths(&fragment.selection_set, prefix, paths)
            }
            executable::Selection::FragmentSpread(_) => {}
        }
    }
}

/// Every representation field is read from a response key some earlier fetch selected.
fn assert_representations_are_fetched(plan: &Plan) {
    for fetch in &plan.fetches {
        let Some(representations) = &fetch.representations else {
            continue;
        };
        let fetched_before: Vec<String> = plan
            .fetches
            .iter()
            .filter(|other| fetch.depends_on_fetch_ids.contains(&other.id))
            .flat_map(|other| {
                let prefix = merge_prefix(other);
                other
                    .field_paths()
                    .into_iter()
                    .map(move |path| format!("{prefix}{path}"))
            })
            .collect();
        let mut required = Vec::new();
        response_paths(representations, &merge_prefix(fetch), &mut required);
        for path in required {
            assert!(
                fetched_before.contains(&path),
                "fetch {} reads {path}, which its dependencies do not fetch: {fetched_before:?}",
                fetch.id
            );
        }
    }
}

#[test]
fn every_field_is_fetched_once() {
    let mut planner = planner(vec![accounts(), reviews()]);
    let plan = plan(&mut planner, "{ me { name reviews { body } } }").unwrap();
    assert_eq!(
        fetched_paths(&plan),
        [
            "me",
            "me.__typename",
            "me.id",
            "me.name",
            "me.reviews",
            "me.reviews.body",
        ]
    );
    assert_representations_are_fetched(&plan);
}

#[test]
fn aliased_fields_do_not_provide_keys() {
    // `id` is the response key of `name` here, the key goes under a generated alias
    let mut planner = planner(vec![accounts(), reviews()]);
    let plan = assert_plan!(
        &mut planner,
        "{ me { id: name reviews { body } } }",
        @r###"
    Plan {
      Fetch(id: 0, service: "accounts") {
        {
          me {
            id: name
            __typename
            id__alias_0: id
          }
        }
      },
      Fetch(id: 1, service: "reviews", path: "me", dependsOn: [0]) {
        {
          ... on User {
            __typename
            id__alias_0: id
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
    assert_eq!(
        fetched_paths(&plan),
        [
            "me",
            "me.__typename",
            "me.id",
            "me.id__alias_0",
            "me.reviews",
            "me.reviews.body",
        ]
    );
    assert_representations_are_fetched(&plan);
}

#[test]
fn fields_under_other_directives_are_fetched_separately() {
    let mut planner = planner(vec![accounts(), reviews()]);
    let plan = plan(
        &mut planner,
        "query($s: Boolean!) { me @skip(if: $s) { name } me { reviews { body } } }",
    )
    .unwrap();
    assert_eq!(plan.fetches.len(), 2);
    assert_eq!(plan.fetches[0].variables, ["s"]);
    insta::assert_snapshot!(plan.fetches[0].input, @r###"
    query($s: Boolean!) {
      ... on Query @skip(if: $s) {
        me {
          name
        }
      }
      me {
        __typename
        id
      }
    }
    "###);
    // `me` is selected once per directive set
    assert_eq!(
        fetched_paths(&plan),
        [
            "me",
            "me",
            "me.__typename",
            "me.id",
            "me.name",
            "me.reviews",
            "me.reviews.body",
        ]
    );
    assert_representations_are_fetched(&plan);
}

#[test]
fn entities_below_nested_lists() {
    let mut planner = planner(vec![
        accounts(),
        reviews()
            .with_child_node("Review", ["product"])
            .with_child_node("Product", ["upc"]),
        DataSourceConfiguration::new("products")
            .with_root_node("Product", ["upc", "name"])
            .with_key("Product", "upc"),
    ]);
    let plan = plan(&mut planner, "{ me { reviews { body product { name } } } }").unwrap();
    assert_eq!(plan.fetches.len(), 3);
    let products = &plan.fetches[2];
    assert_eq!(products.data_source_id, "products");
    assert_eq!(products.depends_on_fetch_ids, [1]);
    assert_eq!(
        products.merge_path,
        [
            FetchPathElement::Key("me".to_owned()),
            FetchPathElement::Key("reviews".to_owned()),
            FetchPathElement::AnyIndex,
            FetchPathElement::Key("product".to_owned()),
        ]
    );
    assert_eq!(
        fetched_paths(&plan),
        [
            "me",
            "me.__typename",
            "me.id",
            "me.reviews",
            "me.reviews.body",
            "me.reviews.product",
            "me.reviews.product.__typename",
            "me.reviews.product.name",
            "me.reviews.product.upc",
        ]
    );
    assert_representations_are_fetched(&plan);
}

#[test]
fn required_fields_are_fetched_first() {
    let mut planner = planner(vec![
        DataSourceConfiguration::new("products")
            .with_root_node("Query", ["topProducts"])
            .with_root_node("Product", ["upc", "name", "weight"])
            .with_key("Product", "upc"),
        DataSourceConfiguration::new("shipping")
            .with_root_node("Product", ["upc", "shippingEstimate"])
            .with_key("Product", "upc")
            .with_requires("Product", "shippingEstimate", "weight"),
    ]);
    let plan = assert_plan!(
        &mut planner,
        "{ topProducts { name shippingEstimate } }",
        @r###"
    Plan {
      Fetch(id: 0, service: "products") {
        {
          topProducts {
            name
            weight
            __typename
            upc
          }
        }
      },
      Fetch(id: 1, service: "shipping", path: "topProducts.@", dependsOn: [0]) {
        {
          ... on Product {
            __typename
            weight
            upc
          }
        } =>
        {
          ... on Product {
            shippingEstimate
          }
        }
      },
    }
    "###
    );
    assert_eq!(
        plan.fetches[1].merge_path,
        [
            FetchPathElement::Key("topProducts".to_owned()),
            FetchPathElement::AnyIndex,
        ]
    );
}

#[test]
fn required_fields_are_read_under_their_alias() {
    let mut planner = planner(vec![
        DataSourceConfiguration::new("products")
            .with_root_node("Query", ["topProducts"])
            .with_root_node("Product", ["upc", "name", "weight"])
            .with_key("Product", "upc"),
        DataSourceConfiguration::new("shipping")
            .with_root_node("Product", ["upc", "shippingEstimate"])
            .with_key("Product", "upc")
            .with_requires("Product", "shippingEstimate", "weight"),
    ]);
    let plan = assert_plan!(
        &mut planner,
        "{ topProducts { w: weight shippingEstimate } }",
        @r###"
    Plan {
      Fetch(id: 0, service: "products") {
        {
          topProducts {
            w: weight
            __typename
            upc
          }
        }
      },
      Fetch(id: 1, service: "shipping", path: "topProducts.@", dependsOn: [0]) {
        {
          ... on Product {
            __typename
            w: weight
            upc
          }
        } =>
        {
          ... on Product {
            shippingEstimate
          }
        }
      },
    }
    "###
    );
    assert_representations_are_fetched(&plan);
}
