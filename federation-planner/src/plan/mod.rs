use std::fmt;

use apollo_compiler::ast;
use apollo_compiler::executable;
use serde::Serialize;

use crate::data_source::DataSourceHash;
use crate::display_helpers::DisplaySlice;
use crate::display_helpers::State;

mod configuration;
mod configuration_visitor;
mod data_source_filter;
mod node_suggestions;
mod planner;
mod planner_configuration;
mod planning_visitor;

pub use configuration::Configuration;
pub use configuration::DebugConfiguration;
pub use configuration::PlanOptions;
pub use planner::MAX_PLANNING_ITERATIONS;
pub use planner::Planner;

/// The root operation kind of a planned operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, strum_macros::Display)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Query,
    Mutation,
    Subscription,
}

impl From<ast::OperationType> for OperationKind {
    fn from(value: ast::OperationType) -> Self {
        match value {
            ast::OperationType::Query => Self::Query,
            ast::OperationType::Mutation => Self::Mutation,
            ast::OperationType::Subscription => Self::Subscription,
        }
    }
}

impl From<OperationKind> for ast::OperationType {
    fn from(value: OperationKind) -> Self {
        match value {
            OperationKind::Query => Self::Query,
            OperationKind::Mutation => Self::Mutation,
            OperationKind::Subscription => Self::Subscription,
        }
    }
}

/// The result of planning an operation: fetches in execution order.
///
/// Every fetch only depends on fetches with a lower id, and fetch ids are positions in `fetches`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    pub operation_name: Option<String>,
    pub operation_kind: OperationKind,
    pub fetches: Vec<FetchNode>,
    /// Human readable rendering of the plan, present when requested through
    /// [`PlanOptions::include_query_plan_in_response`].
    pub query_plan: Option<String>,
}

impl Plan {
    pub fn fetch(&self, id: usize) -> Option<&FetchNode> {
        self.fetches.get(id)
    }

    pub fn fetches_for(&self, data_source_id: &str) -> impl Iterator<Item = &FetchNode> {
        self.fetches
            .iter()
            .filter(move |fetch| fetch.data_source_id == data_source_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchNode {
    pub id: usize,
    pub data_source_id: String,
    pub data_source_hash: DataSourceHash,
    /// Dot-delimited operation path this fetch is attached to, e.g. `query.me`.
    pub parent_path: String,
    /// Response path at which the fetched data is merged. Empty for root fetches.
    pub merge_path: Vec<FetchPathElement>,
    pub kind: FetchKind,
    /// Selected on the root type for root fetches, on the entity type for entity fetches.
    #[serde(serialize_with = "crate::utils::serde_bridge::serialize_exe_selection_set")]
    pub selection_set: executable::SelectionSet,
    /// Entity representations the fetch takes as input (keys and required fields). A field is
    /// read from the parent data under its response key and sent under its name.
    #[serde(serialize_with = "crate::utils::serde_bridge::serialize_optional_exe_selection_set")]
    pub representations: Option<executable::SelectionSet>,
    /// Names of the operation variables used by this fetch.
    pub variables: Vec<String>,
    pub depends_on_fetch_ids: Vec<usize>,
    pub input: String,
    pub query_plan: Option<FetchQueryPlan>,
    pub debug_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum FetchKind {
    Root,
    Entity { type_name: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum FetchPathElement {
    Key(String),
    AnyIndex,
    TypeCondition(String),
}

impl fmt::Display for FetchPathElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Key(name) => f.write_str(name),
            Self::AnyIndex => f.write_str("@"),
            Self::TypeCondition(type_name) => write!(f, "|[{type_name}]"),
        }
    }
}

pub(crate) struct DisplayPath<'a>(pub(crate) &'a [FetchPathElement]);

impl fmt::Display for DisplayPath<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, element) in self.0.iter().enumerate() {
            if index > 0 && !matches!(element, FetchPathElement::TypeCondition(_)) {
                f.write_str(".")?;
            }
            write!(f, "{element}")?;
        }
        Ok(())
    }
}

/// Trace of a single fetch, attached when fetch-level query plans are requested and the data
/// source supports exporting them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchQueryPlan {
    pub data_source_id: String,
    pub fetch_id: usize,
    pub depends_on_fetch_ids: Vec<usize>,
    pub path: String,
    pub query: String,
}

impl FetchNode {
    /// Dot-delimited response paths of every selected field, depth first. Fragments are
    /// transparent.
    pub fn field_paths(&self) -> Vec<String> {
        let mut paths = Vec::new();
        collect_field_paths(&self.selection_set, "", &mut paths);
        paths
    }

    fn write_indented(&self, state: &mut State<'_, '_>) -> fmt::Result {
        write!(
            state,
            "Fetch(id: {}, service: \"{}\"",
            self.id, self.data_source_id
        )?;
        if !self.merge_path.is_empty() {
            write!(state, ", path: \"{}\"", DisplayPath(&self.merge_path))?;
        }
        if !self.depends_on_fetch_ids.is_empty() {
            write!(
                state,
                ", dependsOn: {}",
                DisplaySlice(&self.depends_on_fetch_ids)
            )?;
        }
        state.write(") {")?;
        state.indent()?;
        match &self.kind {
            FetchKind::Entity { .. } => {
                if let Some(representations) = &self.representations {
                    state.write_lines(wrap_in_fragment(representations).serialize())?;
                    state.write(" =>")?;
                    state.new_line()?;
                }
                state.write_lines(wrap_in_fragment(&self.selection_set).serialize())?;
            }
            FetchKind::Root => state.write_lines(self.selection_set.serialize())?,
        }
        state.dedent()?;
        state.write("}")
    }
}

fn collect_field_paths(selection_set: &executable::SelectionSet, prefix: &str, paths: &mut Vec<String>) {
    for selection in &selection_set.selections {
        match selection {
            executable::Selection::Field(field) => {
                let path = if prefix.is_empty() {
                    field.response_key().to_string()
                } else {
                    format!("{prefix}.{}", field.response_key())
                };
                paths.push(path.clone());
                collect_field_paths(&field.selection_set, &path, paths);
            }
            executable::Selection::InlineFragment(fragment) => {
                collect_field_paths(&fragment.selection_set, prefix, paths)
            }
            executable::Selection::FragmentSpread(_) => {}
        }
    }
}

/// `{ ... on T { <selection_set> } }` where `T` is the type of `selection_set`.
pub(crate) fn wrap_in_fragment(selection_set: &executable::SelectionSet) -> executable::SelectionSet {
    let mut wrapped = executable::SelectionSet::new(selection_set.ty.clone());
    wrapped.push(executable::InlineFragment {
        type_condition: Some(selection_set.ty.clone()),
        directives: Default::default(),
        selection_set: selection_set.clone(),
    });
    wrapped
}

/// Appends the selections of `other` to `target`, merging fields with the same response key and
/// fragments with the same type condition and directives.
pub(crate) fn merge_selection_sets(
    target: &mut executable::SelectionSet,
    other: &executable::SelectionSet,
) {
    for selection in &other.selections {
        match selection {
            executable::Selection::Field(field) => {
                let existing = target.selections.iter_mut().find_map(|existing| match existing {
                    executable::Selection::Field(existing)
                        if existing.response_key() == field.response_key() =>
                    {
                        Some(existing)
                    }
                    _ => None,
                });
                match existing {
                    Some(existing) => {
                        merge_selection_sets(&mut existing.make_mut().selection_set, &field.selection_set)
                    }
                    None => target.push(selection.clone()),
                }
            }
            executable::Selection::InlineFragment(fragment) => {
                let existing = target.selections.iter_mut().find_map(|existing| match existing {
                    executable::Selection::InlineFragment(existing)
                        if existing.type_condition == fragment.type_condition
                            && existing.directives == fragment.directives =>
                    {
                        Some(existing)
                    }
                    _ => None,
                });
                match existing {
                    Some(existing) => merge_selection_sets(
                        &mut existing.make_mut().selection_set,
                        &fragment.selection_set,
                    ),
                    None => target.push(selection.clone()),
                }
            }
            executable::Selection::FragmentSpread(_) => target.push(selection.clone()),
        }
    }
}

impl fmt::Display for FetchNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_indented(&mut State::new(f))
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut state = State::new(f);
        state.write("Plan ")?;
        state.write_block(&self.fetches, |state, fetch| {
            fetch.write_indented(state)?;
            state.write(",")
        })
    }
}
