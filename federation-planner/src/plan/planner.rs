use std::collections::HashSet;

use apollo_compiler::ExecutableDocument;
use apollo_compiler::Schema;
use apollo_compiler::executable;
use apollo_compiler::validation::Valid;
use itertools::Itertools;

use super::Configuration;
use super::DebugConfiguration;
use super::Plan;
use super::PlanOptions;
use super::configuration_visitor::ConfigurationPass;
use super::configuration_visitor::ConfigurationVisitor;
use super::configuration_visitor::FieldSetCache;
use super::data_source_filter::DataSourceFilter;
use super::node_suggestions::NodeSuggestions;
use super::planner_configuration::PlannerConfiguration;
use super::planning_visitor;
use crate::data_source::DataSourceConfiguration;
use crate::data_source::DataSourceHash;
use crate::error::PlanningError;
use crate::error::Report;
use crate::operation::Operation;
use crate::operation::normalize::normalize_operation;
use crate::operation::walker;
use crate::utils::logging::snapshot;

/// Configuration passes allowed before planning gives up on an operation.
pub const MAX_PLANNING_ITERATIONS: usize = 100;

/// Plans operations against a fixed set of data sources.
///
/// A planner can be reused for any number of operations, one at a time.
#[derive(Debug)]
pub struct Planner {
    config: Configuration,
    data_source_hashes: Vec<DataSourceHash>,
}

fn check_data_source_ids(data_sources: &[DataSourceConfiguration]) -> Result<(), PlanningError> {
    let mut seen = HashSet::with_capacity(data_sources.len());
    for data_source in data_sources {
        if !seen.insert(data_source.id.as_str()) {
            return Err(PlanningError::DuplicateDataSourceId {
                id: data_source.id.clone(),
            });
        }
    }
    Ok(())
}

impl Planner {
    pub fn new(config: Configuration) -> Result<Self, PlanningError> {
        check_data_source_ids(&config.data_sources)?;
        Ok(Self {
            config,
            data_source_hashes: Vec::new(),
        })
    }

    pub fn config(&self) -> &Configuration {
        &self.config
    }

    pub fn set_config(&mut self, config: Configuration) -> Result<(), PlanningError> {
        check_data_source_ids(&config.data_sources)?;
        self.config = config;
        Ok(())
    }

    pub fn set_debug_config(&mut self, debug: DebugConfiguration) {
        self.config.debug = debug;
    }

    /// Plans the operation named `operation_name` of `document`, or its only operation.
    ///
    /// On failure the report holds a single error: external errors (unknown operation, a field
    /// no data source resolves) are the caller's to fix, internal ones point at the data source
    /// configuration.
    #[cfg_attr(
        feature = "snapshot_tracing",
        tracing::instrument(level = "trace", skip_all, name = "Planner::plan")
    )]
    pub fn plan(
        &mut self,
        document: &Valid<ExecutableDocument>,
        schema: &Valid<Schema>,
        operation_name: Option<&str>,
        options: PlanOptions,
    ) -> Result<Plan, Report> {
        self.reset();

        let selected = select_operation(document, operation_name)?;
        let mut operation = normalize_operation(document, selected)?;

        self.data_source_hashes = self
            .config
            .data_sources
            .iter()
            .map(DataSourceConfiguration::hash)
            .collect();

        let planners = self.find_planning_paths(&mut operation, schema)?;

        if self.config.debug.planning_visitor {
            tracing::debug!("planning visitor: assembling {} fetches", planners.len());
        }
        let plan = planning_visitor::assemble(
            &operation,
            schema,
            &self.config,
            &self.data_source_hashes,
            &planners,
            options,
        )?;
        if self.config.debug.print_query_plans {
            tracing::debug!("query plan:\n{plan}");
        }
        snapshot!("Plan", plan.to_string(), "planned operation");
        Ok(plan)
    }

    fn reset(&mut self) {
        self.data_source_hashes.clear();
    }

    /// Runs configuration passes until every field has a planner and no field waits for
    /// another, then prunes fragment paths that no planned field goes through.
    fn find_planning_paths(
        &self,
        operation: &mut Operation,
        schema: &Valid<Schema>,
    ) -> Result<Vec<PlannerConfiguration>, PlanningError> {
        let debug = &self.config.debug;
        let mut filter = DataSourceFilter::new(&self.config.data_sources);
        if debug.enable_node_suggestions_selection_reasons {
            filter.enable_selection_reasons();
        }
        if debug.print_operation_transformations {
            tracing::debug!("initial operation:\n{operation}");
        }

        let (used, mut suggestions) = filter.filter_data_sources(operation, None, &[])?;
        if debug.datasource_visitor {
            tracing::debug!(
                data_sources = %used
                    .iter()
                    .map(|used| &self.config.data_sources[used.data_source_index].id)
                    .join(", "),
                "minimal data source set"
            );
        }
        if debug.print_node_suggestions {
            tracing::debug!("initial node suggestions:\n{suggestions}");
        }
        snapshot!(suggestions, "initial node suggestions");

        let mut field_sets = FieldSetCache::default();
        let mut pass = self.configuration_pass(operation, schema, &mut suggestions, &mut field_sets)?;
        self.print_pass(operation, &suggestions, &pass, "after initial run");

        let mut iteration = 1;
        while pass.state.should_revisit() {
            if pass.state.has_new_fields {
                let (_, refreshed) =
                    filter.filter_data_sources(operation, Some(&suggestions), &pass.hints)?;
                suggestions = refreshed;
                snapshot!(suggestions, "refreshed node suggestions");
            }

            pass = self.configuration_pass(operation, schema, &mut suggestions, &mut field_sets)?;
            self.print_pass(operation, &suggestions, &pass, &format!("after run #{iteration}"));

            iteration += 1;
            // checked before this pass's state is looked at: a pass converging exactly at the
            // cap still reports an error
            if iteration > MAX_PLANNING_ITERATIONS {
                return Err(PlanningError::PlanningDidNotConverge {
                    missing_paths: pass.state.missing_paths.into_iter().collect(),
                });
            }
        }

        let mut planners = pass.planners;
        let removed = remove_unnecessary_fragment_paths(&mut planners);
        if removed && debug.print_planning_paths {
            tracing::debug!(
                "planning paths after removing unnecessary fragment paths:\n{}",
                planners.iter().join("\n")
            );
        }
        snapshot!(planners, "planning paths");
        Ok(planners)
    }

    /// One walk of the configuration visitor, followed by the insertion of the fields it
    /// asked for.
    fn configuration_pass(
        &self,
        operation: &mut Operation,
        schema: &Valid<Schema>,
        suggestions: &mut NodeSuggestions,
        field_sets: &mut FieldSetCache,
    ) -> Result<ConfigurationPass, PlanningError> {
        let mut pass = {
            let mut visitor = ConfigurationVisitor::new(
                &self.config.data_sources,
                schema,
                operation,
                suggestions,
                field_sets,
            );
            if self.config.debug.configuration_visitor {
                visitor.enable_debug();
            }
            if self.config.debug.enable_node_suggestions_selection_reasons {
                visitor.enable_selection_reasons();
            }
            walker::walk(operation, &mut visitor)?;
            visitor.finish()
        };

        let inserted: usize = pass
            .insertions
            .iter()
            .map(|insertion| {
                operation.add_required_fields(
                    insertion.target,
                    insertion.before.as_deref(),
                    &insertion.field_set,
                )
            })
            .sum();
        pass.state.has_new_fields = inserted > 0;
        Ok(pass)
    }

    fn print_pass(
        &self,
        operation: &Operation,
        suggestions: &NodeSuggestions,
        pass: &ConfigurationPass,
        label: &str,
    ) {
        let debug = &self.config.debug;
        if !debug.prints_anything() && !debug.configuration_visitor {
            return;
        }
        if debug.print_operation_transformations {
            tracing::debug!(
                has_new_fields = pass.state.has_new_fields,
                added_fields = operation.added_field_count(),
                "operation {label}:\n{operation}"
            );
        }
        if debug.print_node_suggestions {
            tracing::debug!("node suggestions {label}:\n{suggestions}");
        }
        if debug.print_planning_paths || debug.configuration_visitor {
            tracing::debug!(
                should_revisit = pass.state.should_revisit(),
                has_new_fields = pass.state.has_new_fields,
                missing_paths = ?pass.state.missing_paths,
                fields_waiting_for_dependency = pass.state.fields_waiting_for_dependency,
                "revisit info {label}"
            );
        }
        if debug.print_planning_paths {
            tracing::debug!(
                "planning paths {label}:\n{}",
                pass.planners.iter().join("\n")
            );
        }
    }
}

/// Drops the fragment paths that were added speculatively but under which nothing was planned.
fn remove_unnecessary_fragment_paths(planners: &mut [PlannerConfiguration]) -> bool {
    planners
        .iter_mut()
        .fold(false, |removed, planner| planner.remove_leaf_fragment_paths() || removed)
}

fn select_operation<'doc>(
    document: &'doc ExecutableDocument,
    operation_name: Option<&str>,
) -> Result<&'doc executable::Operation, PlanningError> {
    let operation_name = operation_name.map(str::trim).filter(|name| !name.is_empty());
    let operations = &document.operations;
    let count = operations.named.len() + usize::from(operations.anonymous.is_some());
    match operation_name {
        Some(name) => operations
            .get(Some(name))
            .map(|operation| &**operation)
            .map_err(|_| PlanningError::OperationNotFound {
                name: name.to_owned(),
            }),
        None if count > 1 => Err(PlanningError::OperationNameRequired),
        None => operations
            .get(None)
            .map(|operation| &**operation)
            .map_err(|_| PlanningError::OperationNotFound {
                name: String::new(),
            }),
    }
}
