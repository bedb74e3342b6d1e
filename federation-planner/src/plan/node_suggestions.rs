use std::fmt;

use indexmap::IndexMap;
use serde::Serialize;

use crate::data_source::DataSourceHash;

/// A candidate data source for one `(type, field)` node of the operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub(crate) struct NodeSuggestion {
    pub(crate) type_name: String,
    pub(crate) field_name: String,
    /// Position of the data source in the planner configuration.
    pub(crate) data_source_index: usize,
    pub(crate) data_source_id: String,
    pub(crate) data_source_hash: DataSourceHash,
    pub(crate) is_root_node: bool,
    pub(crate) enabled: bool,
    pub(crate) selection_reasons: Vec<String>,
}

/// Pins a node to a data source, e.g. entity key fields to the data source providing them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub(crate) struct NodeSuggestionHint {
    pub(crate) type_name: String,
    pub(crate) field_name: String,
    pub(crate) data_source_index: usize,
}

/// All suggestions of an operation, grouped by node in the order nodes were first seen.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct NodeSuggestions {
    nodes: IndexMap<(String, String), Vec<NodeSuggestion>>,
}

impl NodeSuggestions {
    pub(crate) fn add(&mut self, suggestion: NodeSuggestion) {
        self.nodes
            .entry((suggestion.type_name.clone(), suggestion.field_name.clone()))
            .or_default()
            .push(suggestion);
    }

    pub(crate) fn has_node(&self, type_name: &str, field_name: &str) -> bool {
        self.get(type_name, field_name).is_some()
    }

    fn get(&self, type_name: &str, field_name: &str) -> Option<&Vec<NodeSuggestion>> {
        self.nodes
            .get(&(type_name.to_owned(), field_name.to_owned()))
    }

    pub(crate) fn suggestion(
        &self,
        type_name: &str,
        field_name: &str,
        data_source_index: usize,
    ) -> Option<&NodeSuggestion> {
        self.get(type_name, field_name)?
            .iter()
            .find(|suggestion| suggestion.data_source_index == data_source_index)
    }

    pub(crate) fn is_enabled(&self, type_name: &str, field_name: &str, data_source_index: usize) -> bool {
        self.suggestion(type_name, field_name, data_source_index)
            .is_some_and(|suggestion| suggestion.enabled)
    }

    /// Enabled suggestions of a node, in data source configuration order.
    pub(crate) fn enabled(
        &self,
        type_name: &str,
        field_name: &str,
    ) -> impl Iterator<Item = &NodeSuggestion> {
        self.get(type_name, field_name)
            .into_iter()
            .flatten()
            .filter(|suggestion| suggestion.enabled)
    }

    /// Enables the suggestion of `data_source_index` for a node. Returns whether it changed.
    pub(crate) fn enable(
        &mut self,
        type_name: &str,
        field_name: &str,
        data_source_index: usize,
        reason: Option<String>,
    ) -> bool {
        let Some(suggestions) = self
            .nodes
            .get_mut(&(type_name.to_owned(), field_name.to_owned()))
        else {
            return false;
        };
        let Some(suggestion) = suggestions
            .iter_mut()
            .find(|suggestion| suggestion.data_source_index == data_source_index)
        else {
            return false;
        };
        if let Some(reason) = reason {
            suggestion.selection_reasons.push(reason);
        }
        !std::mem::replace(&mut suggestion.enabled, true)
    }

    /// Enables every suggestion of a node. Used when no enabled data source could plan it.
    pub(crate) fn enable_all(&mut self, type_name: &str, field_name: &str, reason: Option<&str>) {
        if let Some(suggestions) = self
            .nodes
            .get_mut(&(type_name.to_owned(), field_name.to_owned()))
        {
            for suggestion in suggestions.iter_mut().filter(|suggestion| !suggestion.enabled) {
                suggestion.enabled = true;
                if let Some(reason) = reason {
                    suggestion.selection_reasons.push(reason.to_owned());
                }
            }
        }
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &NodeSuggestion> {
        self.nodes.values().flatten()
    }
}

impl Serialize for NodeSuggestions {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter())
    }
}

impl fmt::Display for NodeSuggestions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for suggestion in self.iter() {
            write!(
                f,
                "{}.{} ds: {} (#{}) root: {} enabled: {}",
                suggestion.type_name,
                suggestion.field_name,
                suggestion.data_source_id,
                suggestion.data_source_index,
                suggestion.is_root_node,
                suggestion.enabled,
            )?;
            if !suggestion.selection_reasons.is_empty() {
                write!(f, " reasons: {}", suggestion.selection_reasons.join("; "))?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
