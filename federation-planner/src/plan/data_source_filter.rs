//! Minimal data source set search.
//!
//! Every field of the operation is a `(type, field)` node. A data source "covers" a node when
//! its root or child nodes contain it. The filter looks for a smallest set of data sources that
//! covers every node, then turns the result into [`NodeSuggestions`]: one suggestion per data
//! source able to resolve a node, enabled when that data source is part of the set.

use std::collections::HashMap;

use indexmap::IndexSet;
use serde::Serialize;

use super::node_suggestions::NodeSuggestion;
use super::node_suggestions::NodeSuggestionHint;
use super::node_suggestions::NodeSuggestions;
use crate::data_source::DataSourceConfiguration;
use crate::error::PlanningError;
use crate::operation::Field;
use crate::operation::Operation;
use crate::operation::walker;
use crate::operation::walker::Cursor;
use crate::operation::walker::Visit;
use crate::operation::walker::Visitor;
use crate::utils::logging::snapshot;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub(crate) struct UsedNode {
    pub(crate) type_name: String,
    pub(crate) field_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub(crate) struct UsedDataSourceConfiguration {
    pub(crate) data_source_index: usize,
    pub(crate) used_nodes: Vec<UsedNode>,
}

pub(crate) struct DataSourceFilter<'a> {
    data_sources: &'a [DataSourceConfiguration],
    selection_reasons: bool,
    nodes: IndexSet<UsedNode>,
    /// Results per ordered subset of data source indices, valid for `nodes`.
    memo: HashMap<Vec<usize>, Result<Vec<UsedDataSourceConfiguration>, PlanningError>>,
}

impl<'a> DataSourceFilter<'a> {
    pub(crate) fn new(data_sources: &'a [DataSourceConfiguration]) -> Self {
        Self {
            data_sources,
            selection_reasons: false,
            nodes: IndexSet::new(),
            memo: HashMap::new(),
        }
    }

    pub(crate) fn enable_selection_reasons(&mut self) {
        self.selection_reasons = true;
    }

    /// Finds the minimal data source set for `operation` and derives node suggestions from it.
    ///
    /// Suggestions of nodes already present in `existing` keep their enabled state, and every
    /// hint enables the suggestion it pins.
    #[cfg_attr(
        feature = "snapshot_tracing",
        tracing::instrument(level = "trace", skip_all, name = "DataSourceFilter::filter_data_sources")
    )]
    pub(crate) fn filter_data_sources(
        &mut self,
        operation: &Operation,
        existing: Option<&NodeSuggestions>,
        hints: &[NodeSuggestionHint],
    ) -> Result<(Vec<UsedDataSourceConfiguration>, NodeSuggestions), PlanningError> {
        let mut collector = NodeCollector::default();
        walker::walk(operation, &mut collector)?;
        self.nodes = collector.nodes;
        self.memo.clear();

        let all: Vec<usize> = (0..self.data_sources.len()).collect();
        let used = self.find_best_data_source_set(&all)?;
        snapshot!(used, "minimal data source set");

        let suggestions = self.suggestions(&used, existing, hints);
        Ok((used, suggestions))
    }

    /// Records, for every node, the first data source of `subset` covering it.
    fn find_used_data_sources(
        &self,
        subset: &[usize],
    ) -> Result<Vec<UsedDataSourceConfiguration>, PlanningError> {
        let mut used: Vec<UsedDataSourceConfiguration> = subset
            .iter()
            .map(|&data_source_index| UsedDataSourceConfiguration {
                data_source_index,
                used_nodes: Vec::new(),
            })
            .collect();
        for node in &self.nodes {
            let covering = subset.iter().position(|&index| {
                self.data_sources[index].has_node(&node.type_name, &node.field_name)
            });
            match covering {
                Some(position) => used[position].used_nodes.push(node.clone()),
                None => {
                    return Err(PlanningError::FieldNotResolvable {
                        type_name: node.type_name.clone(),
                        field_name: node.field_name.clone(),
                    });
                }
            }
        }
        used.retain(|data_source| !data_source.used_nodes.is_empty());
        Ok(used)
    }

    /// Tries every subset reachable by excluding one data source at a time and keeps the
    /// smallest covering set. On ties the first one found wins, so data sources listed earlier
    /// are excluded first.
    fn find_best_data_source_set(
        &mut self,
        subset: &[usize],
    ) -> Result<Vec<UsedDataSourceConfiguration>, PlanningError> {
        if let Some(result) = self.memo.get(subset) {
            return result.clone();
        }
        let result = self.search(subset);
        self.memo.insert(subset.to_vec(), result.clone());
        result
    }

    fn search(&mut self, subset: &[usize]) -> Result<Vec<UsedDataSourceConfiguration>, PlanningError> {
        let planned = self.find_used_data_sources(subset)?;
        if planned.len() <= 1 {
            return Ok(planned);
        }
        let mut best = planned;
        for excluded in 0..subset.len() {
            let smaller: Vec<usize> = subset
                .iter()
                .enumerate()
                .filter(|(position, _)| *position != excluded)
                .map(|(_, &index)| index)
                .collect();
            match self.find_best_data_source_set(&smaller) {
                Ok(result) if result.len() < best.len() => best = result,
                Ok(_) => {}
                // the excluded data source is needed
                Err(PlanningError::FieldNotResolvable { .. }) => continue,
                Err(error) => return Err(error),
            }
        }
        Ok(best)
    }

    fn suggestions(
        &self,
        used: &[UsedDataSourceConfiguration],
        existing: Option<&NodeSuggestions>,
        hints: &[NodeSuggestionHint],
    ) -> NodeSuggestions {
        let mut suggestions = NodeSuggestions::default();
        for node in &self.nodes {
            let previous = existing.filter(|existing| existing.has_node(&node.type_name, &node.field_name));
            for (index, data_source) in self.data_sources.iter().enumerate() {
                if !data_source.has_node(&node.type_name, &node.field_name) {
                    continue;
                }
                let mut selection_reasons = Vec::new();
                let enabled = match previous {
                    Some(previous) => {
                        let suggestion = previous.suggestion(&node.type_name, &node.field_name, index);
                        if self.selection_reasons {
                            selection_reasons = suggestion
                                .map(|suggestion| suggestion.selection_reasons.clone())
                                .unwrap_or_default();
                        }
                        suggestion.is_some_and(|suggestion| suggestion.enabled)
                    }
                    None => {
                        let in_best_set = used.iter().any(|used| used.data_source_index == index);
                        if in_best_set && self.selection_reasons {
                            selection_reasons.push("part of the minimal data source set".to_owned());
                        }
                        in_best_set
                    }
                };
                suggestions.add(NodeSuggestion {
                    type_name: node.type_name.clone(),
                    field_name: node.field_name.clone(),
                    data_source_index: index,
                    data_source_id: data_source.id.clone(),
                    data_source_hash: data_source.hash(),
                    is_root_node: data_source.has_root_node(&node.type_name, &node.field_name),
                    enabled,
                    selection_reasons,
                });
            }
        }
        for hint in hints {
            let reason = self
                .selection_reasons
                .then(|| "provides fields required by another data source".to_owned());
            suggestions.enable(&hint.type_name, &hint.field_name, hint.data_source_index, reason);
        }
        suggestions
    }
}

/// Collects the distinct `(enclosing type, field)` pairs of an operation in traversal order.
#[derive(Default)]
struct NodeCollector {
    nodes: IndexSet<UsedNode>,
}

impl Visitor for NodeCollector {
    fn enter_field(&mut self, cursor: &Cursor<'_>, field: &Field) -> Result<Visit, PlanningError> {
        if !field.is_typename() {
            self.nodes.insert(UsedNode {
                type_name: cursor.enclosing_type.to_string(),
                field_name: field.name.to_string(),
            });
        }
        Ok(Visit::Continue)
    }
}
