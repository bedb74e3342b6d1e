use std::sync::Arc;
use std::sync::Mutex;

use federation_planner::Configuration;
use federation_planner::DataSourceConfiguration;
use federation_planner::DebugConfiguration;
use federation_planner::PlanOptions;
use federation_planner::Planner;
use federation_planner::PlanningError;
use federation_planner::data_source::DataSourceDebugger;
use federation_planner::data_source::DataSourcePlanner;
use federation_planner::data_source::FetchConfiguration;
use federation_planner::data_source::FetchDescription;
use federation_planner::data_source::FetchIdentifier;
use federation_planner::data_source::FetchRegistration;
use federation_planner::data_source::PlannerFactory;
use federation_planner::data_source::QueryPlanProvider;
use federation_planner::data_source::SubgraphRequestMinifier;
use pretty_assertions::assert_eq;

use super::support::accounts;
use super::support::plan;
use super::support::plan_with;
use super::support::reviews;

type Events = Arc<Mutex<Vec<String>>>;

/// Records every call the plan assembly makes.
#[derive(Debug, Default)]
struct RecordingFactory {
    events: Events,
    fail_registration: bool,
}

impl RecordingFactory {
    fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }
}

impl PlannerFactory for RecordingFactory {
    fn planner(&self) -> Box<dyn DataSourcePlanner> {
        Box::new(RecordingPlanner {
            events: self.events.clone(),
            fail_registration: self.fail_registration,
            id: None,
        })
    }
}

struct RecordingPlanner {
    events: Events,
    fail_registration: bool,
    id: Option<usize>,
}

impl RecordingPlanner {
    fn record(&self, event: impl Into<String>) {
        self.events.lock().unwrap().push(event.into());
    }
}

impl DataSourcePlanner for RecordingPlanner {
    fn register(&mut self, registration: &FetchRegistration<'_>) -> Result<(), PlanningError> {
        if self.fail_registration {
            return Err(PlanningError::internal("boom"));
        }
        self.record(format!(
            "register {} {}",
            registration.data_source.id, registration.parent_path
        ));
        Ok(())
    }

    fn configure_fetch(
        &mut self,
        fetch: &FetchDescription<'_>,
    ) -> Result<FetchConfiguration, PlanningError> {
        self.record(format!("configure {}", fetch.fetch_id));
        Ok(FetchConfiguration {
            input: format!("{}/{:?}", fetch.data_source.id, self.id),
            ..Default::default()
        })
    }

    fn subgraph_request_minifier(&mut self) -> Option<&mut dyn SubgraphRequestMinifier> {
        Some(self)
    }

    fn query_plan_provider(&mut self) -> Option<&mut dyn QueryPlanProvider> {
        Some(self)
    }

    fn fetch_identifier(&mut self) -> Option<&mut dyn FetchIdentifier> {
        Some(self)
    }

    fn debugger(&mut self) -> Option<&mut dyn DataSourceDebugger> {
        Some(self)
    }
}

impl SubgraphRequestMinifier for RecordingPlanner {
    fn enable_subgraph_request_minifier(&mut self) {
        self.record("minify");
    }
}

impl QueryPlanProvider for RecordingPlanner {
    fn include_query_plan_in_fetch_configuration(&mut self) {
        self.record("query plan");
    }
}

impl FetchIdentifier for RecordingPlanner {
    fn set_id(&mut self, id: usize) {
        self.id = Some(id);
        self.record(format!("set id {id}"));
    }
}

impl DataSourceDebugger for RecordingPlanner {
    fn enable_debug(&mut self) {
        self.record("debug");
    }

    fn enable_debug_query_plan_logging(&mut self) {
        self.record("debug query plans");
    }
}

#[test]
fn planners_are_registered_before_fetches_are_configured() {
    let factory = Arc::new(RecordingFactory::default());
    let mut planner = super::support::planner(vec![
        accounts().with_planner_factory(factory.clone()),
        reviews().with_planner_factory(factory.clone()),
    ]);
    let plan = plan(&mut planner, "{ me { name reviews { body } } }").unwrap();
    assert_eq!(
        factory.events(),
        [
            "set id 0",
            "register accounts query",
            "set id 1",
            "register reviews query.me",
            "configure 0",
            "configure 1",
        ]
    );
    assert_eq!(plan.fetches[0].input, "accounts/Some(0)");
    assert_eq!(plan.fetches[1].input, "reviews/Some(1)");
}

#[test]
fn capabilities_follow_the_configuration() {
    let factory = Arc::new(RecordingFactory::default());
    let mut planner = Planner::new(Configuration {
        data_sources: vec![
            DataSourceConfiguration::new("a")
                .with_root_node("Query", ["a"])
                .with_child_node("A", ["x"])
                .with_planner_factory(factory.clone()),
        ],
        minify_subgraph_operations: true,
        debug: DebugConfiguration {
            datasource_visitor: true,
            print_query_plans: true,
            ..Default::default()
        },
    })
    .unwrap();
    plan_with(
        &mut planner,
        "{ a { x } }",
        None,
        PlanOptions {
            include_query_plan_in_response: true,
        },
    )
    .unwrap();
    assert_eq!(
        factory.events(),
        [
            "minify",
            "query plan",
            "set id 0",
            "debug",
            "debug query plans",
            "register a query",
            "configure 0",
        ]
    );
}

#[test]
fn registration_failures_name_the_data_source() {
    let factory = Arc::new(RecordingFactory {
        fail_registration: true,
        ..Default::default()
    });
    let mut planner = super::support::planner(vec![
        DataSourceConfiguration::new("a")
            .with_root_node("Query", ["a"])
            .with_child_node("A", ["x"])
            .with_planner_factory(factory),
    ]);
    let report = plan(&mut planner, "{ a { x } }").unwrap_err();
    assert_eq!(
        report.errors(),
        [PlanningError::PlannerRegistration {
            data_source_id: "a".to_owned(),
            message: "boom".to_owned(),
        }]
    );
    assert!(report.errors()[0].is_internal());
}

#[test]
fn graphql_planners_read_custom_configuration() {
    let mut planner = super::support::planner(vec![
        DataSourceConfiguration::new("a")
            .with_root_node("Query", ["a"])
            .with_child_node("A", ["x"])
            .with_custom(serde_json::json!({ "url": "http://a", "method": "POST" })),
    ]);
    let plan = plan(&mut planner, "{ a { x } }").unwrap();
    assert_eq!(plan.fetches_for("a").count(), 1);
}
