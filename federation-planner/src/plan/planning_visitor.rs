//! Plan assembly: turns the converged planner configurations into ordered fetches.
//!
//! Fetches are ordered topologically over their dependencies, then the operation is walked once
//! more and every field is appended to the selection set of the fetch whose planner resolves its
//! path. Each fetch is finalized by the data source planner created for it.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use apollo_compiler::Name;
use apollo_compiler::Node;
use apollo_compiler::Schema;
use apollo_compiler::ast;
use apollo_compiler::executable;
use apollo_compiler::executable::VariableDefinition;
use apollo_compiler::validation::Valid;
use indexmap::IndexSet;
use petgraph::Direction;
use petgraph::graph::DiGraph;
use petgraph::graph::NodeIndex;

use super::Configuration;
use super::FetchKind;
use super::FetchNode;
use super::Plan;
use super::PlanOptions;
use super::merge_selection_sets;
use super::planner_configuration::PlannerConfiguration;
use crate::data_source::DataSourceHash;
use crate::data_source::DataSourcePlanner;
use crate::data_source::FetchDescription;
use crate::data_source::FetchRegistration;
use crate::error::PlanningError;
use crate::operation::Field;
use crate::operation::InlineFragment;
use crate::operation::Operation;
use crate::operation::TYPENAME_FIELD;
use crate::operation::parse_field_set;
use crate::operation::walker;
use crate::operation::walker::Cursor;
use crate::operation::walker::Visit;
use crate::operation::walker::Visitor;
use crate::utils::logging::snapshot;

#[cfg_attr(
    feature = "snapshot_tracing",
    tracing::instrument(level = "trace", skip_all, name = "planning_visitor::assemble")
)]
pub(crate) fn assemble(
    operation: &Operation,
    schema: &Valid<Schema>,
    config: &Configuration,
    hashes: &[DataSourceHash],
    planners: &[PlannerConfiguration],
    options: PlanOptions,
) -> Result<Plan, PlanningError> {
    let order = fetch_order(planners)?;
    snapshot!(order, "fetch order");

    // fetch id of every planner
    let mut fetch_ids = vec![0; planners.len()];
    for (fetch_id, &planner_id) in order.iter().enumerate() {
        fetch_ids[planner_id] = fetch_id;
    }

    let mut data_source_planners = Vec::with_capacity(order.len());
    for (fetch_id, &planner_id) in order.iter().enumerate() {
        let planner = &planners[planner_id];
        data_source_planners.push(create_data_source_planner(config, options, fetch_id, planner)?);
    }

    let mut visitor = PlanningVisitor {
        builders: planners.iter().map(FetchBuilder::new).collect(),
        debug: config.debug.planning_visitor,
    };
    walker::walk(operation, &mut visitor)?;
    let mut built: Vec<Option<BuiltFetch>> = visitor
        .builders
        .into_iter()
        .map(|builder| Some(builder.finish()))
        .collect();

    let mut fetches = Vec::with_capacity(order.len());
    for ((fetch_id, &planner_id), mut data_source_planner) in
        order.iter().enumerate().zip(data_source_planners)
    {
        let planner = &planners[planner_id];
        let data_source = &config.data_sources[planner.data_source_index];
        let Some(BuiltFetch {
            selection_set,
            variables: used_variables,
        }) = built[planner_id].take()
        else {
            return Err(PlanningError::internal(format!(
                "planner {planner_id} appears twice in the fetch order"
            )));
        };

        let representations = match &planner.kind {
            FetchKind::Root => None,
            FetchKind::Entity { .. } => Some(representations(schema, operation, planner)?),
        };
        let variables: Vec<Node<VariableDefinition>> = operation
            .variables
            .iter()
            .filter(|variable| used_variables.contains(&variable.name))
            .cloned()
            .collect();
        let mut depends_on_fetch_ids: Vec<usize> = planner
            .depends_on
            .iter()
            .map(|&dependency| fetch_ids[dependency])
            .collect();
        depends_on_fetch_ids.sort_unstable();

        let fetch_configuration = data_source_planner.configure_fetch(&FetchDescription {
            fetch_id,
            data_source,
            operation_kind: operation.kind,
            operation_name: operation.name.as_ref(),
            kind: &planner.kind,
            parent_path: &planner.parent_path,
            selection_set: &selection_set,
            representations: representations.as_ref(),
            variables: &variables,
            depends_on_fetch_ids: &depends_on_fetch_ids,
        })?;

        fetches.push(FetchNode {
            id: fetch_id,
            data_source_id: data_source.id.clone(),
            data_source_hash: hashes
                .get(planner.data_source_index)
                .copied()
                .unwrap_or_else(|| data_source.hash()),
            parent_path: planner.parent_path.clone(),
            merge_path: planner.response_path.clone(),
            kind: planner.kind.clone(),
            selection_set,
            representations,
            variables: variables
                .iter()
                .map(|variable| variable.name.to_string())
                .collect(),
            depends_on_fetch_ids,
            input: fetch_configuration.input,
            query_plan: fetch_configuration.query_plan,
            debug_id: fetch_configuration.debug_id,
        });
    }

    let mut plan = Plan {
        operation_name: operation.name.as_ref().map(|name| name.to_string()),
        operation_kind: operation.kind,
        fetches,
        query_plan: None,
    };
    if options.include_query_plan_in_response {
        plan.query_plan = Some(plan.to_string());
    }
    Ok(plan)
}

/// Orders planners so that every planner comes after the planners it depends on. Among the
/// planners that are ready, the one with the smallest id goes first.
fn fetch_order(planners: &[PlannerConfiguration]) -> Result<Vec<usize>, PlanningError> {
    let mut graph: DiGraph<usize, ()> = DiGraph::with_capacity(planners.len(), planners.len());
    let nodes: Vec<NodeIndex> = planners
        .iter()
        .map(|planner| graph.add_node(planner.id))
        .collect();
    for planner in planners {
        for &dependency in &planner.depends_on {
            let Some(&dependency) = nodes.get(dependency) else {
                return Err(PlanningError::internal(format!(
                    "planner {} depends on unknown planner {dependency}",
                    planner.id
                )));
            };
            graph.add_edge(dependency, nodes[planner.id], ());
        }
    }

    let mut in_degree: Vec<usize> = graph
        .node_indices()
        .map(|node| graph.neighbors_directed(node, Direction::Incoming).count())
        .collect();
    let mut ready: BinaryHeap<Reverse<NodeIndex>> = graph
        .node_indices()
        .filter(|node| in_degree[node.index()] == 0)
        .map(Reverse)
        .collect();

    let mut order = Vec::with_capacity(planners.len());
    while let Some(Reverse(node)) = ready.pop() {
        order.push(graph[node]);
        for next in graph.neighbors_directed(node, Direction::Outgoing) {
            in_degree[next.index()] -= 1;
            if in_degree[next.index()] == 0 {
                ready.push(Reverse(next));
            }
        }
    }

    if order.len() < planners.len() {
        // fetch ids are only assigned once an order exists
        let planner_ids = graph
            .node_indices()
            .filter(|node| in_degree[node.index()] > 0)
            .map(|node| graph[node])
            .collect();
        return Err(PlanningError::FetchDependencyCycle { planner_ids });
    }
    Ok(order)
}

fn create_data_source_planner(
    config: &Configuration,
    options: PlanOptions,
    fetch_id: usize,
    planner: &PlannerConfiguration,
) -> Result<Box<dyn DataSourcePlanner>, PlanningError> {
    let data_source = &config.data_sources[planner.data_source_index];
    let mut data_source_planner = data_source.planner_factory.planner();

    if config.minify_subgraph_operations {
        if let Some(minifier) = data_source_planner.subgraph_request_minifier() {
            minifier.enable_subgraph_request_minifier();
        }
    }
    if options.include_query_plan_in_response {
        if let Some(provider) = data_source_planner.query_plan_provider() {
            provider.include_query_plan_in_fetch_configuration();
        }
    }
    if let Some(identifier) = data_source_planner.fetch_identifier() {
        identifier.set_id(fetch_id);
    }
    if let Some(debugger) = data_source_planner.debugger() {
        if config.debug.datasource_visitor {
            debugger.enable_debug();
        }
        if config.debug.print_query_plans {
            debugger.enable_debug_query_plan_logging();
        }
    }

    data_source_planner
        .register(&FetchRegistration {
            fetch_id,
            data_source,
            parent_path: &planner.parent_path,
            kind: &planner.kind,
        })
        .map_err(|error| match error {
            PlanningError::PlannerRegistration { .. } => error,
            other => PlanningError::PlannerRegistration {
                data_source_id: data_source.id.clone(),
                message: other.to_string(),
            },
        })?;
    Ok(data_source_planner)
}

/// `__typename` followed by the key and required fields of an entity fetch, aliased the way the
/// operation selects them on the parent object.
fn representations(
    schema: &Valid<Schema>,
    operation: &Operation,
    planner: &PlannerConfiguration,
) -> Result<executable::SelectionSet, PlanningError> {
    let target = planner.parent_selection_set.ok_or_else(|| {
        PlanningError::internal(format!("entity planner {} has no parent selection set", planner.id))
    })?;
    let typename = parse_field_set(schema, &planner.type_name, TYPENAME_FIELD.as_str())?;
    let mut representations = operation.provided_field_set(target, &typename);
    for required in &planner.required_fields {
        let field_set = parse_field_set(schema, &required.type_name, &required.selection_set)?;
        merge_selection_sets(
            &mut representations,
            &operation.provided_field_set(target, &field_set),
        );
    }
    Ok(representations)
}

enum PendingSelection {
    Root,
    Field(executable::Field),
    InlineFragment(executable::InlineFragment),
}

/// A selection whose children are still being collected.
struct Frame {
    path: String,
    selection: PendingSelection,
    selection_set: executable::SelectionSet,
}

struct BuiltFetch {
    selection_set: executable::SelectionSet,
    variables: IndexSet<Name>,
}

struct FetchBuilder<'a> {
    planner: &'a PlannerConfiguration,
    stack: Vec<Frame>,
    variables: IndexSet<Name>,
}

impl<'a> FetchBuilder<'a> {
    fn new(planner: &'a PlannerConfiguration) -> Self {
        Self {
            planner,
            stack: vec![Frame {
                path: planner.parent_path.clone(),
                selection: PendingSelection::Root,
                selection_set: executable::SelectionSet::new(planner.type_name.clone()),
            }],
            variables: IndexSet::new(),
        }
    }

    fn push(&mut self, path: &str, selection: PendingSelection, ty: Name) {
        self.stack.push(Frame {
            path: path.to_owned(),
            selection,
            selection_set: executable::SelectionSet::new(ty),
        });
    }

    /// Closes the frame of `path`, if it is the innermost one, into its enclosing frame.
    fn pop(&mut self, path: &str) {
        if self.stack.len() < 2 || self.stack.last().is_none_or(|frame| frame.path != path) {
            return;
        }
        self.close_innermost();
    }

    fn close_innermost(&mut self) {
        let Some(frame) = self.stack.pop() else {
            return;
        };
        let selection = match frame.selection {
            PendingSelection::Root => return,
            PendingSelection::Field(mut field) => {
                field.selection_set = frame.selection_set;
                executable::Selection::from(field)
            }
            PendingSelection::InlineFragment(mut fragment) => {
                fragment.selection_set = frame.selection_set;
                executable::Selection::from(fragment)
            }
        };
        if let Some(parent) = self.stack.last_mut() {
            parent.selection_set.push(selection);
        }
    }

    fn finish(mut self) -> BuiltFetch {
        while self.stack.len() > 1 {
            self.close_innermost();
        }
        let selection_set = match self.stack.pop() {
            Some(root) => root.selection_set,
            None => executable::SelectionSet::new(self.planner.type_name.clone()),
        };
        BuiltFetch {
            selection_set,
            variables: self.variables,
        }
    }
}

fn collect_variables(value: &ast::Value, variables: &mut IndexSet<Name>) {
    match value {
        ast::Value::Variable(name) => {
            variables.insert(name.clone());
        }
        ast::Value::List(items) => {
            for item in items {
                collect_variables(item, variables);
            }
        }
        ast::Value::Object(fields) => {
            for (_, value) in fields {
                collect_variables(value, variables);
            }
        }
        _ => {}
    }
}

struct PlanningVisitor<'a> {
    /// Indexed by planner id.
    builders: Vec<FetchBuilder<'a>>,
    debug: bool,
}

impl Visitor for PlanningVisitor<'_> {
    fn enter_field(&mut self, cursor: &Cursor<'_>, field: &Field) -> Result<Visit, PlanningError> {
        for builder in &mut self.builders {
            if !builder.planner.resolves_path(cursor.path) {
                continue;
            }
            if self.debug {
                tracing::debug!(
                    path = cursor.path,
                    planner_id = builder.planner.id,
                    data_source = %builder.planner.data_source_id,
                    "field added to fetch"
                );
            }
            for argument in &field.arguments {
                collect_variables(&argument.value, &mut builder.variables);
            }
            let field = field.to_executable();
            let ty = field.selection_set.ty.clone();
            builder.push(cursor.path, PendingSelection::Field(field), ty);
        }
        Ok(Visit::Continue)
    }

    fn leave_field(&mut self, cursor: &Cursor<'_>, _field: &Field) -> Result<(), PlanningError> {
        for builder in &mut self.builders {
            builder.pop(cursor.path);
        }
        Ok(())
    }

    fn enter_inline_fragment(
        &mut self,
        cursor: &Cursor<'_>,
        fragment: &InlineFragment,
    ) -> Result<Visit, PlanningError> {
        for builder in &mut self.builders {
            if !builder.planner.resolves_path(cursor.path) {
                continue;
            }
            builder.push(
                cursor.path,
                PendingSelection::InlineFragment(fragment.to_executable()),
                fragment.type_condition.clone(),
            );
        }
        Ok(Visit::Continue)
    }

    fn leave_inline_fragment(
        &mut self,
        cursor: &Cursor<'_>,
        _fragment: &InlineFragment,
    ) -> Result<(), PlanningError> {
        for builder in &mut self.builders {
            builder.pop(cursor.path);
        }
        Ok(())
    }

    fn enter_directive(
        &mut self,
        cursor: &Cursor<'_>,
        directive: &ast::Directive,
    ) -> Result<(), PlanningError> {
        for builder in &mut self.builders {
            if builder.planner.resolves_path(cursor.path) {
                for argument in &directive.arguments {
                    collect_variables(&argument.value, &mut builder.variables);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn planner(id: usize, depends_on: &[usize]) -> PlannerConfiguration {
        let mut planner = PlannerConfiguration::new(
            id,
            0,
            "accounts".to_owned(),
            "query".to_owned(),
            Vec::new(),
            FetchKind::Root,
            apollo_compiler::name!("Query"),
        );
        planner.depends_on.extend(depends_on.iter().copied());
        planner
    }

    #[test]
    fn orders_dependencies_first() {
        let planners = [planner(0, &[2]), planner(1, &[]), planner(2, &[1]), planner(3, &[])];
        assert_eq!(fetch_order(&planners).unwrap(), [1, 2, 0, 3]);

        let independent = [planner(0, &[]), planner(1, &[]), planner(2, &[0])];
        assert_eq!(fetch_order(&independent).unwrap(), [0, 1, 2]);
    }

    #[test]
    fn reports_dependency_cycles() {
        let planners = [planner(0, &[]), planner(1, &[2]), planner(2, &[1])];
        assert_eq!(
            fetch_order(&planners).unwrap_err(),
            PlanningError::FetchDependencyCycle {
                planner_ids: vec![1, 2]
            }
        );
    }

    #[test]
    fn collects_nested_variables() {
        let mut variables = IndexSet::new();
        let value = ast::Value::Object(vec![
            (
                Name::new("ids").unwrap(),
                Node::new(ast::Value::List(vec![
                    Node::new(ast::Value::Variable(Name::new("first").unwrap())),
                    Node::new(ast::Value::Null),
                ])),
            ),
            (
                Name::new("after").unwrap(),
                Node::new(ast::Value::Variable(Name::new("cursor").unwrap())),
            ),
        ]);
        collect_variables(&value, &mut variables);
        assert_eq!(
            variables.iter().map(|name| name.as_str()).collect::<Vec<_>>(),
            ["first", "cursor"]
        );
    }
}
