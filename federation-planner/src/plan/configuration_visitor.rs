//! One configuration pass: assigns every field of the operation to a planner.
//!
//! A pass walks the operation with the current node suggestions and opens planners (future
//! fetches) as needed. Fields that need other fields first (entity keys, `@requires`
//! conditions) are not inserted while walking: the pass records insertions, and the driver
//! applies them and runs another pass until nothing changes.

use std::collections::HashMap;

use apollo_compiler::Name;
use apollo_compiler::Schema;
use apollo_compiler::executable;
use apollo_compiler::validation::Valid;
use indexmap::IndexSet;
use serde::Serialize;

use super::FetchKind;
use super::FetchPathElement;
use super::node_suggestions::NodeSuggestionHint;
use super::node_suggestions::NodeSuggestions;
use super::planner_configuration::PathConfiguration;
use super::planner_configuration::PathKind;
use super::planner_configuration::PlannerConfiguration;
use super::planner_configuration::RequiredFields;
use super::planner_configuration::RequiredFieldsKind;
use crate::data_source::DataSourceConfiguration;
use crate::error::PlanningError;
use crate::operation::Field;
use crate::operation::InlineFragment;
use crate::operation::Operation;
use crate::operation::SelectionSetId;
use crate::operation::TYPENAME_FIELD;
use crate::operation::field_set_names;
use crate::operation::parse_field_set;
use crate::operation::walker;
use crate::operation::walker::Cursor;
use crate::operation::walker::Visit;
use crate::operation::walker::Visitor;

/// Why another pass is needed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub(crate) struct ConvergenceState {
    /// The last pass inserted fields into the operation.
    pub(crate) has_new_fields: bool,
    /// Paths no planner could take, in traversal order.
    pub(crate) missing_paths: IndexSet<String>,
    /// Fields with `@requires` whose required fields were only scheduled for insertion.
    pub(crate) fields_waiting_for_dependency: usize,
}

impl ConvergenceState {
    pub(crate) fn should_revisit(&self) -> bool {
        self.has_new_fields
            || !self.missing_paths.is_empty()
            || self.fields_waiting_for_dependency > 0
    }
}

/// Fields to insert into `target`, before the field with response key `before`.
#[derive(Debug, Clone)]
pub(crate) struct PendingInsertion {
    pub(crate) target: SelectionSetId,
    pub(crate) before: Option<String>,
    pub(crate) field_set: executable::SelectionSet,
}

/// Parsed key and requires conditions, shared by all passes of one planning run.
#[derive(Debug, Default)]
pub(crate) struct FieldSetCache {
    parsed: HashMap<(Name, String), executable::SelectionSet>,
}

impl FieldSetCache {
    fn get(
        &mut self,
        schema: &Valid<Schema>,
        type_name: &Name,
        field_set: &str,
    ) -> Result<executable::SelectionSet, PlanningError> {
        let key = (type_name.clone(), field_set.to_owned());
        if let Some(parsed) = self.parsed.get(&key) {
            return Ok(parsed.clone());
        }
        let parsed = parse_field_set(schema, type_name, field_set)?;
        self.parsed.insert(key, parsed.clone());
        Ok(parsed)
    }
}

/// The outcome of a pass.
#[derive(Debug)]
pub(crate) struct ConfigurationPass {
    pub(crate) planners: Vec<PlannerConfiguration>,
    pub(crate) state: ConvergenceState,
    pub(crate) hints: Vec<NodeSuggestionHint>,
    pub(crate) insertions: Vec<PendingInsertion>,
}

struct PendingRequires {
    planner_id: usize,
    parent_path: String,
    /// Where the required fields were inserted.
    target: SelectionSetId,
    required: executable::SelectionSet,
}

/// A `__typename` selected on the operation root, attached once the root planners are known.
struct RootTypename {
    path: String,
    parent_path: String,
}

pub(crate) struct ConfigurationVisitor<'a> {
    data_sources: &'a [DataSourceConfiguration],
    schema: &'a Valid<Schema>,
    operation: &'a Operation,
    suggestions: &'a mut NodeSuggestions,
    field_sets: &'a mut FieldSetCache,
    debug: bool,
    selection_reasons: bool,

    planners: Vec<PlannerConfiguration>,
    state: ConvergenceState,
    hints: Vec<NodeSuggestionHint>,
    insertions: Vec<PendingInsertion>,
    field_owners: HashMap<String, usize>,
    pending_requires: Vec<PendingRequires>,
    root_typenames: Vec<RootTypename>,
}

/// The planner providing entity keys to a new entity planner.
struct KeyProvider {
    planner_id: usize,
    key: RequiredFields,
    key_field_set: executable::SelectionSet,
}

impl<'a> ConfigurationVisitor<'a> {
    pub(crate) fn new(
        data_sources: &'a [DataSourceConfiguration],
        schema: &'a Valid<Schema>,
        operation: &'a Operation,
        suggestions: &'a mut NodeSuggestions,
        field_sets: &'a mut FieldSetCache,
    ) -> Self {
        Self {
            data_sources,
            schema,
            operation,
            suggestions,
            field_sets,
            debug: false,
            selection_reasons: false,
            planners: Vec::new(),
            state: ConvergenceState::default(),
            hints: Vec::new(),
            insertions: Vec::new(),
            field_owners: HashMap::new(),
            pending_requires: Vec::new(),
            root_typenames: Vec::new(),
        }
    }

    pub(crate) fn enable_debug(&mut self) {
        self.debug = true;
    }

    pub(crate) fn enable_selection_reasons(&mut self) {
        self.selection_reasons = true;
    }

    pub(crate) fn finish(self) -> ConfigurationPass {
        ConfigurationPass {
            planners: self.planners,
            state: self.state,
            hints: self.hints,
            insertions: self.insertions,
        }
    }

    fn add_field_path(&mut self, planner_id: usize, cursor: &Cursor<'_>, field: &Field) {
        self.add_path_below(
            planner_id,
            cursor.path,
            cursor.parent_path(),
            cursor.enclosing_type,
            &field.name,
        );
    }

    fn add_path_below(
        &mut self,
        planner_id: usize,
        path: &str,
        parent_path: &str,
        type_name: &str,
        field_name: &str,
    ) {
        // fragments between the closest held path and the field become part of the fetch
        let planner = &mut self.planners[planner_id];
        let mut fragments = Vec::new();
        let mut ancestor = parent_path;
        while !planner.has_path(ancestor) {
            let Some((parent, segment)) = ancestor.rsplit_once('.') else {
                break;
            };
            let Some(type_condition) = walker::fragment_type_condition(segment) else {
                break;
            };
            fragments.push(PathConfiguration {
                path: ancestor.to_owned(),
                kind: PathKind::Fragment,
                type_name: type_condition.to_owned(),
                field_name: None,
            });
            ancestor = parent;
        }
        for fragment in fragments.into_iter().rev() {
            planner.add_path(fragment);
        }
        planner.add_path(PathConfiguration {
            path: path.to_owned(),
            kind: PathKind::Field,
            type_name: type_name.to_owned(),
            field_name: Some(field_name.to_owned()),
        });
        self.field_owners.insert(path.to_owned(), planner_id);
        if self.debug {
            tracing::debug!(
                path,
                planner_id,
                data_source = %self.planners[planner_id].data_source_id,
                "field planned"
            );
        }
    }

    /// Root fetches hang off the operation root even when the field sits in a root-level
    /// fragment. Entity fetches hang off the enclosing object.
    fn parent_path_for(&self, cursor: &Cursor<'_>, kind: &FetchKind) -> String {
        match kind {
            FetchKind::Root => self.operation.kind.to_string(),
            FetchKind::Entity { .. } => cursor.parent_path().to_owned(),
        }
    }

    fn new_planner(&mut self, data_source_index: usize, cursor: &Cursor<'_>, kind: FetchKind) -> usize {
        match kind {
            FetchKind::Root => self.new_root_planner(data_source_index),
            FetchKind::Entity { .. } => {
                let parent_path = self.parent_path_for(cursor, &kind);
                let id = self.push_planner(
                    data_source_index,
                    parent_path,
                    cursor.response_path.to_vec(),
                    kind,
                    cursor.enclosing_type.clone(),
                );
                self.planners[id].parent_selection_set = Some(cursor.selection_set);
                id
            }
        }
    }

    fn new_root_planner(&mut self, data_source_index: usize) -> usize {
        self.push_planner(
            data_source_index,
            self.operation.kind.to_string(),
            Vec::new(),
            FetchKind::Root,
            self.operation.root_type.clone(),
        )
    }

    fn push_planner(
        &mut self,
        data_source_index: usize,
        parent_path: String,
        response_path: Vec<FetchPathElement>,
        kind: FetchKind,
        type_name: Name,
    ) -> usize {
        let id = self.planners.len();
        self.planners.push(PlannerConfiguration::new(
            id,
            data_source_index,
            self.data_sources[data_source_index].id.clone(),
            parent_path,
            response_path,
            kind,
            type_name,
        ));
        id
    }

    /// `__typename` on the operation root goes to the first root planner. An operation
    /// selecting nothing else is sent to the first data source with root fields.
    fn plan_root_typenames(&mut self) {
        let root_typenames = std::mem::take(&mut self.root_typenames);
        if root_typenames.is_empty() {
            return;
        }
        let root_type = self.operation.root_type.clone();
        let planner_id = match self
            .planners
            .iter()
            .find(|planner| planner.kind == FetchKind::Root)
        {
            Some(planner) => Some(planner.id),
            None => self
                .data_sources
                .iter()
                .position(|data_source| data_source.has_root_node_with_typename(&root_type))
                .map(|data_source_index| self.new_root_planner(data_source_index)),
        };
        for typename in root_typenames {
            match planner_id {
                Some(planner_id) => self.add_path_below(
                    planner_id,
                    &typename.path,
                    &typename.parent_path,
                    &root_type,
                    &TYPENAME_FIELD,
                ),
                None => {
                    self.state.missing_paths.insert(typename.path);
                }
            }
        }
    }

    fn planner_for(&mut self, data_source_index: usize, cursor: &Cursor<'_>, kind: FetchKind) -> usize {
        let parent_path = self.parent_path_for(cursor, &kind);
        let existing = self.planners.iter().find(|planner| {
            planner.data_source_index == data_source_index
                && planner.parent_path == parent_path
                && planner.kind == kind
                && !planner.has_requires
        });
        match existing {
            Some(planner) => planner.id,
            None => self.new_planner(data_source_index, cursor, kind),
        }
    }

    /// `__typename` belongs to whichever planner resolves the enclosing object.
    fn plan_typename(&mut self, cursor: &Cursor<'_>, field: &Field) -> bool {
        let mut parent_path = cursor.parent_path();
        loop {
            if let Some(id) = self
                .planners
                .iter()
                .find(|planner| planner.has_path(parent_path))
                .map(|planner| planner.id)
            {
                self.add_field_path(id, cursor, field);
                return true;
            }
            match parent_path.rsplit_once('.') {
                Some((parent, last)) if last.starts_with('$') => parent_path = parent,
                _ => return false,
            }
        }
    }

    /// A planner already holding the parent path takes the field.
    fn plan_with_existing_planner(&mut self, cursor: &Cursor<'_>, field: &Field) -> bool {
        let type_name = cursor.enclosing_type.as_str();
        let parent_path = cursor.parent_path();
        let owner = self.planners.iter().find(|planner| {
            let data_source = &self.data_sources[planner.data_source_index];
            !(planner.has_requires && planner.parent_path == parent_path)
                && planner.has_path(parent_path)
                && self
                    .suggestions
                    .is_enabled(type_name, &field.name, planner.data_source_index)
                && data_source.has_node(type_name, &field.name)
                && data_source.requires_for(type_name, &field.name).is_none()
        });
        match owner.map(|planner| planner.id) {
            Some(id) => {
                self.add_field_path(id, cursor, field);
                true
            }
            None => false,
        }
    }

    /// Opens a root planner, or an entity planner fed by the planner resolving the parent.
    fn plan_with_new_planner(
        &mut self,
        cursor: &Cursor<'_>,
        field: &Field,
    ) -> Result<bool, PlanningError> {
        let type_name = cursor.enclosing_type;
        let candidates: Vec<usize> = self
            .suggestions
            .enabled(type_name, &field.name)
            .map(|suggestion| suggestion.data_source_index)
            .collect();
        for data_source_index in candidates {
            let data_source = &self.data_sources[data_source_index];
            if !data_source.has_root_node(type_name, &field.name)
                || data_source.requires_for(type_name, &field.name).is_some()
            {
                continue;
            }
            if cursor.is_root_level() {
                let id = self.planner_for(data_source_index, cursor, FetchKind::Root);
                self.add_field_path(id, cursor, field);
                return Ok(true);
            }
            let Some(provider) = self.key_provider(cursor, data_source_index)? else {
                continue;
            };
            let kind = FetchKind::Entity {
                type_name: type_name.to_string(),
            };
            let id = self.planner_for(data_source_index, cursor, kind);
            self.connect_to_provider(id, cursor, field, provider)?;
            self.add_field_path(id, cursor, field);
            return Ok(true);
        }
        Ok(false)
    }

    /// Finds a planner resolving the parent object whose data source can provide the entity key
    /// of `data_source_index`.
    fn key_provider(
        &mut self,
        cursor: &Cursor<'_>,
        data_source_index: usize,
    ) -> Result<Option<KeyProvider>, PlanningError> {
        let type_name = cursor.enclosing_type;
        let Some(key) = self.data_sources[data_source_index].key_for(type_name) else {
            return Ok(None);
        };
        let key_field_set = self
            .field_sets
            .get(self.schema, type_name, &key.selection_set)?;
        let key_fields = field_set_names(&key_field_set);
        let parent_path = cursor.parent_path();
        let provider = self.planners.iter().find(|planner| {
            let provider = &self.data_sources[planner.data_source_index];
            planner.data_source_index != data_source_index
                && planner.resolves_path(parent_path)
                && key_fields
                    .iter()
                    .all(|key_field| provider.has_node(type_name, key_field))
        });
        Ok(provider.map(|provider| KeyProvider {
            planner_id: provider.id,
            key: RequiredFields {
                type_name: type_name.clone(),
                selection_set: key.selection_set.clone(),
                kind: RequiredFieldsKind::Key,
            },
            key_field_set,
        }))
    }

    /// Makes the entity planner depend on its key provider, and schedules `__typename` and the
    /// key fields for insertion next to `field`, pinned to the provider's data source.
    fn connect_to_provider(
        &mut self,
        planner_id: usize,
        cursor: &Cursor<'_>,
        field: &Field,
        provider: KeyProvider,
    ) -> Result<(), PlanningError> {
        let provider_data_source = self.planners[provider.planner_id].data_source_index;
        let planner = &mut self.planners[planner_id];
        planner.depends_on.insert(provider.planner_id);
        planner.add_required_fields(provider.key.clone());

        for key_field in field_set_names(&provider.key_field_set) {
            let hint = NodeSuggestionHint {
                type_name: provider.key.type_name.to_string(),
                field_name: key_field.to_string(),
                data_source_index: provider_data_source,
            };
            if !self.hints.contains(&hint) {
                self.hints.push(hint);
            }
        }

        let with_typename = self.field_sets.get(
            self.schema,
            &provider.key.type_name,
            &format!("{TYPENAME_FIELD} {}", provider.key.selection_set),
        )?;
        self.schedule_insertion(cursor, field, with_typename);
        Ok(())
    }

    fn schedule_insertion(
        &mut self,
        cursor: &Cursor<'_>,
        field: &Field,
        field_set: executable::SelectionSet,
    ) {
        if self.operation.contains_field_set(cursor.selection_set, &field_set) {
            return;
        }
        if self.debug {
            tracing::debug!(path = cursor.path, "scheduled required fields for insertion");
        }
        self.insertions.push(PendingInsertion {
            target: cursor.selection_set,
            before: Some(field.response_key().to_string()),
            field_set,
        });
    }

    /// Plans a field with a `@requires` condition in a dedicated entity planner. Returns `None`
    /// when no enabled data source declares a condition for the field.
    fn plan_field_with_requires(
        &mut self,
        cursor: &Cursor<'_>,
        field: &Field,
    ) -> Result<Option<Visit>, PlanningError> {
        if cursor.is_root_level() {
            return Ok(None);
        }
        let type_name = cursor.enclosing_type;
        let candidate = self
            .suggestions
            .enabled(type_name, &field.name)
            .map(|suggestion| suggestion.data_source_index)
            .find_map(|index| {
                let data_source = &self.data_sources[index];
                data_source
                    .requires_for(type_name, &field.name)
                    .filter(|_| data_source.has_root_node(type_name, &field.name))
                    .map(|requires| (index, requires.selection_set.clone()))
            });
        let Some((data_source_index, requires)) = candidate else {
            return Ok(None);
        };

        let required = self.field_sets.get(self.schema, type_name, &requires)?;
        if !self.operation.contains_field_set(cursor.selection_set, &required) {
            self.schedule_insertion(cursor, field, required);
            self.state.fields_waiting_for_dependency += 1;
            if self.debug {
                tracing::debug!(path = cursor.path, "field waits for its required fields");
            }
            return Ok(Some(Visit::SkipChildren));
        }

        let Some(provider) = self.key_provider(cursor, data_source_index)? else {
            return Ok(Some(self.handle_missing_path(cursor, field)));
        };
        let id = self.new_planner(
            data_source_index,
            cursor,
            FetchKind::Entity {
                type_name: type_name.to_string(),
            },
        );
        self.planners[id].has_requires = true;
        self.planners[id].add_required_fields(RequiredFields {
            type_name: type_name.clone(),
            selection_set: requires,
            kind: RequiredFieldsKind::Requires,
        });
        self.connect_to_provider(id, cursor, field, provider)?;
        self.add_field_path(id, cursor, field);
        self.pending_requires.push(PendingRequires {
            planner_id: id,
            parent_path: cursor.parent_path().to_owned(),
            target: cursor.selection_set,
            required,
        });
        Ok(Some(Visit::Continue))
    }

    fn handle_missing_path(&mut self, cursor: &Cursor<'_>, field: &Field) -> Visit {
        self.state.missing_paths.insert(cursor.path.to_owned());
        let reason = self
            .selection_reasons
            .then_some("enabled as a fallback for an unplanned path");
        self.suggestions
            .enable_all(cursor.enclosing_type, &field.name, reason);
        if self.debug {
            tracing::debug!(path = cursor.path, "no planner could take the field");
        }
        Visit::SkipChildren
    }

    /// Planners of `@requires` fields depend on the planners resolving the required fields.
    fn resolve_requires_dependencies(&mut self) {
        for pending in std::mem::take(&mut self.pending_requires) {
            for required in pending.required.fields() {
                let Some(provider) = self.operation.providing_field(pending.target, required) else {
                    continue;
                };
                let path = format!("{}.{}", pending.parent_path, provider.response_key());
                if let Some(&owner) = self.field_owners.get(&path) {
                    if owner != pending.planner_id {
                        self.planners[pending.planner_id].depends_on.insert(owner);
                    }
                }
            }
        }
    }
}

impl Visitor for ConfigurationVisitor<'_> {
    fn enter_operation(&mut self, operation: &Operation) -> Result<(), PlanningError> {
        if self.debug {
            tracing::debug!(
                operation = ?operation.name,
                root_type = %operation.root_type,
                "configuration pass"
            );
        }
        Ok(())
    }

    fn leave_operation(&mut self, _operation: &Operation) -> Result<(), PlanningError> {
        self.plan_root_typenames();
        self.resolve_requires_dependencies();
        Ok(())
    }

    fn enter_field(&mut self, cursor: &Cursor<'_>, field: &Field) -> Result<Visit, PlanningError> {
        if field.is_typename() {
            if cursor.is_root_level() {
                self.root_typenames.push(RootTypename {
                    path: cursor.path.to_owned(),
                    parent_path: cursor.parent_path().to_owned(),
                });
            } else if !self.plan_typename(cursor, field) {
                self.state.missing_paths.insert(cursor.path.to_owned());
            }
            return Ok(Visit::Continue);
        }
        if let Some(visit) = self.plan_field_with_requires(cursor, field)? {
            return Ok(visit);
        }
        if self.plan_with_existing_planner(cursor, field) || self.plan_with_new_planner(cursor, field)? {
            return Ok(Visit::Continue);
        }
        Ok(self.handle_missing_path(cursor, field))
    }

    fn enter_inline_fragment(
        &mut self,
        cursor: &Cursor<'_>,
        fragment: &InlineFragment,
    ) -> Result<Visit, PlanningError> {
        let parent_path = cursor.parent_path();
        for planner in &mut self.planners {
            let data_source = &self.data_sources[planner.data_source_index];
            if planner.has_path(parent_path)
                && data_source.has_node_with_typename(&fragment.type_condition)
            {
                planner.add_path(PathConfiguration {
                    path: cursor.path.to_owned(),
                    kind: PathKind::Fragment,
                    type_name: fragment.type_condition.to_string(),
                    field_name: None,
                });
            }
        }
        Ok(Visit::Continue)
    }
}
