use apollo_compiler::ExecutableDocument;
use apollo_compiler::Schema;
use apollo_compiler::validation::Valid;
use federation_planner::Configuration;
use federation_planner::DataSourceConfiguration;
use federation_planner::Plan;
use federation_planner::PlanOptions;
use federation_planner::Planner;
use federation_planner::Report;

pub(crate) const SCHEMA: &str = r#"
    type Query {
      me: User
      a: A
      topProducts(first: Int): [Product]
    }

    type A {
      x: Int
      y: Int
    }

    interface Node {
      id: ID!
    }

    type User implements Node {
      id: ID!
      name: String
      reviews: [Review]
    }

    type Review {
      body: String
      product: Product
    }

    type Product {
      upc: String!
      name: String
      weight: Int
      shippingEstimate: Int
    }
"#;

pub(crate) fn schema() -> Valid<Schema> {
    Schema::parse_and_validate(SCHEMA, "schema.graphql").unwrap()
}

pub(crate) fn planner(data_sources: Vec<DataSourceConfiguration>) -> Planner {
    Planner::new(Configuration {
        data_sources,
        ..Default::default()
    })
    .unwrap()
}

/// Plans `operation`, which must be valid against [`SCHEMA`].
pub(crate) fn plan_with(
    planner: &mut Planner,
    operation: &str,
    operation_name: Option<&str>,
    options: PlanOptions,
) -> Result<Plan, Report> {
    let schema = schema();
    let document =
        ExecutableDocument::parse_and_validate(&schema, operation, "operation.graphql").unwrap();
    planner.plan(&document, &schema, operation_name, options)
}

pub(crate) fn plan(planner: &mut Planner, operation: &str) -> Result<Plan, Report> {
    plan_with(planner, operation, None, PlanOptions::default())
}

/// Plans an operation and compares the rendered plan with an inline snapshot.
/// Run `cargo insta review` to diff and accept changes.
macro_rules! assert_plan {
    ($planner: expr, $operation: expr, @$expected: literal) => {{
        let plan = $crate::planner::support::plan($planner, $operation).unwrap();
        insta::assert_snapshot!(plan, @$expected);
        plan
    }};
}

pub(crate) fn accounts() -> DataSourceConfiguration {
    DataSourceConfiguration::new("accounts")
        .with_root_node("Query", ["me"])
        .with_root_node("User", ["id", "name"])
        .with_key("User", "id")
}

pub(crate) fn reviews() -> DataSourceConfiguration {
    DataSourceConfiguration::new("reviews")
        .with_root_node("User", ["id", "reviews"])
        .with_child_node("Review", ["body"])
        .with_key("User", "id")
}
