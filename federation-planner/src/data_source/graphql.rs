use apollo_compiler::Name;
use apollo_compiler::Node;
use apollo_compiler::ast;
use apollo_compiler::executable;
use apollo_compiler::name;
use apollo_compiler::schema;
use apollo_compiler::ty;
use serde::Deserialize;
use serde::Serialize;

use super::DataSourceDebugger;
use super::DataSourcePlanner;
use super::FetchConfiguration;
use super::FetchDescription;
use super::FetchIdentifier;
use super::FetchRegistration;
use super::PlannerFactory;
use super::QueryPlanProvider;
use super::SubgraphRequestMinifier;
use crate::error::PlanningError;
use crate::plan::FetchKind;
use crate::plan::FetchQueryPlan;
use crate::plan::OperationKind;
use crate::plan::wrap_in_fragment;

const REPRESENTATIONS_VARIABLE: Name = name!("representations");
const ENTITIES_FIELD: Name = name!("_entities");

/// Builds [`GraphQlDataSourcePlanner`]s. The default factory of every data source.
#[derive(Debug, Clone, Copy, Default)]
pub struct GraphQlPlannerFactory;

impl PlannerFactory for GraphQlPlannerFactory {
    fn planner(&self) -> Box<dyn DataSourcePlanner> {
        Box::new(GraphQlDataSourcePlanner::default())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    Post,
    Get,
}

/// The `custom` section of a GraphQL data source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GraphQlFetchConfiguration {
    pub url: Option<String>,
    pub method: HttpMethod,
}

/// Renders one fetch as a subgraph operation.
///
/// Root fetches select the planned fields directly on the root type. Entity fetches go through
/// the `_entities` entry point, with the representations passed as the `$representations`
/// variable.
#[derive(Debug, Default)]
pub struct GraphQlDataSourcePlanner {
    id: Option<usize>,
    data_source_id: String,
    fetch: GraphQlFetchConfiguration,
    minify: bool,
    include_query_plan: bool,
    debug: bool,
    debug_query_plan: bool,
}

impl GraphQlDataSourcePlanner {
    pub fn fetch_configuration(&self) -> &GraphQlFetchConfiguration {
        &self.fetch
    }

    fn render(&self, fetch: &FetchDescription<'_>) -> Result<String, PlanningError> {
        let operation_name = fetch
            .operation_name
            .map(|name| subgraph_operation_name(name, &self.data_source_id, fetch.fetch_id))
            .transpose()?;
        let operation = subgraph_operation(fetch, operation_name);
        Ok(if self.minify {
            operation.serialize().no_indent().to_string()
        } else {
            operation.serialize().to_string()
        })
    }
}

/// The operation sent to the subgraph for `fetch`.
fn subgraph_operation(
    fetch: &FetchDescription<'_>,
    operation_name: Option<Name>,
) -> executable::Operation {
    match fetch.kind {
        FetchKind::Root => executable::Operation {
            operation_type: fetch.operation_kind.into(),
            name: operation_name,
            variables: fetch.variables.to_vec(),
            directives: Default::default(),
            selection_set: fetch.selection_set.clone(),
        },
        // entities are always resolved through a query
        FetchKind::Entity { .. } => {
            let mut variables = vec![Node::new(executable::VariableDefinition {
                name: REPRESENTATIONS_VARIABLE,
                ty: Node::new(ty!([_Any!]!)),
                default_value: None,
                directives: Default::default(),
            })];
            variables.extend(fetch.variables.iter().cloned());
            let mut entities = executable::Field {
                definition: entities_field_definition(),
                alias: None,
                name: ENTITIES_FIELD,
                arguments: vec![Node::new(ast::Argument {
                    name: REPRESENTATIONS_VARIABLE,
                    value: Node::new(ast::Value::Variable(REPRESENTATIONS_VARIABLE)),
                })],
                directives: Default::default(),
                selection_set: wrap_in_fragment(fetch.selection_set),
            };
            entities.selection_set.ty = name!("_Entity");
            let mut selection_set = executable::SelectionSet::new(name!("Query"));
            selection_set.push(entities);
            executable::Operation {
                operation_type: executable::OperationType::Query,
                name: operation_name,
                variables,
                directives: Default::default(),
                selection_set,
            }
        }
    }
}

/// `_entities(representations: [_Any!]!): [_Entity]!`, the entry point of entity fetches.
fn entities_field_definition() -> Node<schema::FieldDefinition> {
    Node::new(schema::FieldDefinition {
        description: None,
        name: ENTITIES_FIELD,
        arguments: vec![Node::new(ast::InputValueDefinition {
            description: None,
            name: REPRESENTATIONS_VARIABLE,
            ty: Node::new(ty!([_Any!]!)),
            default_value: None,
            directives: Default::default(),
        })],
        ty: ty!([_Entity]!),
        directives: Default::default(),
    })
}

impl DataSourcePlanner for GraphQlDataSourcePlanner {
    fn register(&mut self, registration: &FetchRegistration<'_>) -> Result<(), PlanningError> {
        let data_source = registration.data_source;
        self.data_source_id = data_source.id.clone();
        if !data_source.custom.is_null() {
            self.fetch = serde_json::from_value(data_source.custom.clone()).map_err(|error| {
                PlanningError::PlannerRegistration {
                    data_source_id: data_source.id.clone(),
                    message: error.to_string(),
                }
            })?;
        }
        if self.debug {
            tracing::debug!(
                data_source = %data_source.id,
                fetch_id = registration.fetch_id,
                parent_path = registration.parent_path,
                url = ?self.fetch.url,
                "registered graphql planner"
            );
        }
        Ok(())
    }

    fn configure_fetch(
        &mut self,
        fetch: &FetchDescription<'_>,
    ) -> Result<FetchConfiguration, PlanningError> {
        if self.fetch.method == HttpMethod::Get
            && fetch.operation_kind == OperationKind::Mutation
            && *fetch.kind == FetchKind::Root
        {
            return Err(PlanningError::PlannerRegistration {
                data_source_id: self.data_source_id.clone(),
                message: "mutations cannot be sent with GET".to_owned(),
            });
        }
        let input = self.render(fetch)?;
        let fetch_id = self.id.unwrap_or(fetch.fetch_id);
        if self.debug_query_plan {
            tracing::debug!(
                data_source = %self.data_source_id,
                fetch_id,
                "subgraph operation:\n{input}"
            );
        }
        let query_plan = self.include_query_plan.then(|| FetchQueryPlan {
            data_source_id: self.data_source_id.clone(),
            fetch_id,
            depends_on_fetch_ids: fetch.depends_on_fetch_ids.to_vec(),
            path: fetch.parent_path.to_owned(),
            query: input.clone(),
        });
        let debug_id = self
            .debug
            .then(|| format!("{}#{fetch_id}", self.data_source_id));
        Ok(FetchConfiguration {
            input,
            query_plan,
            debug_id,
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

impl SubgraphRequestMinifier for GraphQlDataSourcePlanner {
    fn enable_subgraph_request_minifier(&mut self) {
        self.minify = true;
    }
}

impl QueryPlanProvider for GraphQlDataSourcePlanner {
    fn include_query_plan_in_fetch_configuration(&mut self) {
        self.include_query_plan = true;
    }
}

impl FetchIdentifier for GraphQlDataSourcePlanner {
    fn set_id(&mut self, id: usize) {
        self.id = Some(id);
    }
}

impl DataSourceDebugger for GraphQlDataSourcePlanner {
    fn enable_debug(&mut self) {
        self.debug = true;
    }

    fn enable_debug_query_plan_logging(&mut self) {
        self.debug_query_plan = true;
    }
}

/// `{operation}__{data source}__{fetch id}`, restricted to characters valid in a GraphQL name.
fn subgraph_operation_name(
    operation_name: &str,
    data_source_id: &str,
    fetch_id: usize,
) -> Result<Name, PlanningError> {
    let data_source: String = data_source_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    Name::new(&format!("{operation_name}__{data_source}__{fetch_id}"))
        .map_err(|error| PlanningError::internal(format!("invalid subgraph operation name: {error}")))
}
