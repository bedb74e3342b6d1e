use std::fmt;

use apollo_compiler::Name;
use indexmap::IndexMap;
use indexmap::IndexSet;
use serde::Serialize;

use super::DisplayPath;
use super::FetchKind;
use super::FetchPathElement;
use crate::display_helpers::DisplaySlice;
use crate::operation::SelectionSetId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum_macros::Display)]
#[strum(serialize_all = "lowercase")]
pub(crate) enum PathKind {
    /// The path the planner's fetch is attached to.
    Parent,
    Field,
    /// A fragment the planner may resolve fields of. Dropped by pruning when no field below it
    /// is planned.
    Fragment,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub(crate) struct PathConfiguration {
    pub(crate) path: String,
    pub(crate) kind: PathKind,
    pub(crate) type_name: String,
    pub(crate) field_name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub(crate) enum RequiredFieldsKind {
    Key,
    Requires,
}

/// A field set an entity fetch takes as input.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub(crate) struct RequiredFields {
    pub(crate) type_name: Name,
    pub(crate) selection_set: String,
    pub(crate) kind: RequiredFieldsKind,
}

/// What one configuration pass decided for one future fetch: a data source, the path the fetch
/// is attached to and the operation paths it resolves.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct PlannerConfiguration {
    pub(crate) id: usize,
    pub(crate) data_source_index: usize,
    pub(crate) data_source_id: String,
    pub(crate) parent_path: String,
    pub(crate) response_path: Vec<FetchPathElement>,
    pub(crate) kind: FetchKind,
    /// The type the fetch selects on: the root type or the entity type.
    pub(crate) type_name: Name,
    /// For entity fetches, the selection set of the operation their keys are read from.
    #[serde(skip)]
    pub(crate) parent_selection_set: Option<SelectionSetId>,
    paths: IndexMap<String, PathConfiguration>,
    pub(crate) required_fields: Vec<RequiredFields>,
    pub(crate) depends_on: IndexSet<usize>,
    /// Resolves a field with `@requires`; such planners never take other fields.
    pub(crate) has_requires: bool,
}

impl PlannerConfiguration {
    pub(crate) fn new(
        id: usize,
        data_source_index: usize,
        data_source_id: String,
        parent_path: String,
        response_path: Vec<FetchPathElement>,
        kind: FetchKind,
        type_name: Name,
    ) -> Self {
        let mut paths = IndexMap::new();
        paths.insert(
            parent_path.clone(),
            PathConfiguration {
                path: parent_path.clone(),
                kind: PathKind::Parent,
                type_name: type_name.to_string(),
                field_name: None,
            },
        );
        Self {
            id,
            data_source_index,
            data_source_id,
            parent_path,
            response_path,
            kind,
            type_name,
            parent_selection_set: None,
            paths,
            required_fields: Vec::new(),
            depends_on: IndexSet::new(),
            has_requires: false,
        }
    }

    pub(crate) fn add_path(&mut self, path: PathConfiguration) {
        self.paths.entry(path.path.clone()).or_insert(path);
    }

    /// Whether this planner holds `path`. Fields directly below a held path can be attached to
    /// this planner.
    pub(crate) fn has_path(&self, path: &str) -> bool {
        self.paths.contains_key(path)
    }

    /// Whether this planner resolves the object at `path` itself, as opposed to only being
    /// attached to it. Only such planners can provide entity keys.
    pub(crate) fn resolves_path(&self, path: &str) -> bool {
        self.paths
            .get(path)
            .is_some_and(|config| config.kind != PathKind::Parent)
    }

    #[cfg(test)]
    pub(crate) fn paths(&self) -> impl Iterator<Item = &PathConfiguration> {
        self.paths.values()
    }

    pub(crate) fn add_required_fields(&mut self, required: RequiredFields) {
        if !self.required_fields.contains(&required) {
            self.required_fields.push(required);
        }
    }

    /// Drops fragment paths no other path of this planner goes through, including fragments
    /// that only contained such fragments. Returns whether any path was removed.
    pub(crate) fn remove_leaf_fragment_paths(&mut self) -> bool {
        let mut removed = false;
        loop {
            let leaves: Vec<String> = self
                .paths
                .values()
                .filter(|config| config.kind == PathKind::Fragment)
                .filter(|fragment| {
                    let prefix = format!("{}.", fragment.path);
                    !self.paths.keys().any(|other| other.starts_with(&prefix))
                })
                .map(|fragment| fragment.path.clone())
                .collect();
            if leaves.is_empty() {
                return removed;
            }
            for leaf in &leaves {
                self.paths.shift_remove(leaf);
            }
            removed = true;
        }
    }
}

impl fmt::Display for PlannerConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Planner id: {}", self.id)?;
        writeln!(f, "Data source: {}", self.data_source_id)?;
        writeln!(f, "Parent path: {}", self.parent_path)?;
        if let FetchKind::Entity { type_name } = &self.kind {
            writeln!(f, "Entity: {type_name} at {}", DisplayPath(&self.response_path))?;
        }
        let depends_on: Vec<usize> = self.depends_on.iter().copied().collect();
        writeln!(f, "Depends on planner ids: {}", DisplaySlice(&depends_on))?;
        if !self.required_fields.is_empty() {
            writeln!(f, "Required fields:")?;
            for required in &self.required_fields {
                writeln!(f, "  {}: {:?} {}", required.type_name, required.kind, required.selection_set)?;
            }
        }
        writeln!(f, "Paths:")?;
        for path in self.paths.values() {
            writeln!(f, "  {} ({})", path.path, path.kind)?;
        }
        Ok(())
    }
}
