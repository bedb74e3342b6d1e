use serde::Deserialize;
use serde::Serialize;

use crate::data_source::DataSourceConfiguration;

/// Planner configuration. Data sources are listed in priority order: when two sets of data
/// sources cover an operation equally well, the set found by excluding earlier sources first wins.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Configuration {
    pub data_sources: Vec<DataSourceConfiguration>,

    /// Ask data source planners to render subgraph operations without insignificant whitespace.
    ///
    /// Only planners exposing the [`SubgraphRequestMinifier`] capability are affected.
    ///
    /// [`SubgraphRequestMinifier`]: crate::data_source::SubgraphRequestMinifier
    pub minify_subgraph_operations: bool,

    pub debug: DebugConfiguration,
}

/// Switches for the debug side channel. Every enabled switch emits through `tracing::debug!`.
/// None of them change which fetches are planned, but `datasource_visitor` lets data source
/// planners attach debug ids to their fetches.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DebugConfiguration {
    /// Print the operation after normalization and after every pass that inserted fields.
    pub print_operation_transformations: bool,
    /// Print the paths owned by each planner after the configuration passes and after pruning.
    pub print_planning_paths: bool,
    pub print_node_suggestions: bool,
    /// Print the assembled plan, and ask data source planners to log the operations they render.
    pub print_query_plans: bool,

    /// Trace the decisions of the configuration passes, including why a revisit is needed.
    pub configuration_visitor: bool,
    /// Trace the plan assembly traversal.
    pub planning_visitor: bool,
    /// Enable the debug output of data source planners.
    pub datasource_visitor: bool,

    /// Record why each node suggestion was enabled. Adds work to every suggestion refresh.
    pub enable_node_suggestions_selection_reasons: bool,
}

impl DebugConfiguration {
    pub(crate) fn prints_anything(&self) -> bool {
        self.print_operation_transformations
            || self.print_planning_paths
            || self.print_node_suggestions
            || self.print_query_plans
    }
}

/// Per-call planning options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanOptions {
    /// Attach a human readable plan to [`Plan::query_plan`] and ask data source planners
    /// exposing the [`QueryPlanProvider`] capability for fetch-level plans.
    ///
    /// [`Plan::query_plan`]: crate::plan::Plan::query_plan
    /// [`QueryPlanProvider`]: crate::data_source::QueryPlanProvider
    pub include_query_plan_in_response: bool,
}
