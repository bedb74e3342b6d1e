//! The planner's working copy of an operation.
//!
//! The selected operation of an [`ExecutableDocument`] is normalized into an arena of selection
//! sets (see [`normalize`]). Planning annotates it with fields the planner needs (`__typename`,
//! entity keys, `@requires` conditions), so unlike the validated document it is mutable. Every
//! selection set is addressed by a [`SelectionSetId`] which stays stable across insertions.
//!
//! [`ExecutableDocument`]: apollo_compiler::ExecutableDocument

use std::fmt;
use std::fmt::Display;

use apollo_compiler::Name;
use apollo_compiler::Node;
use apollo_compiler::Schema;
use apollo_compiler::ast;
use apollo_compiler::executable;
use apollo_compiler::executable::FieldSet;
use apollo_compiler::executable::VariableDefinition;
use apollo_compiler::name;
use apollo_compiler::schema;
use apollo_compiler::validation::Valid;

use crate::error::PlanningError;
use crate::plan::OperationKind;

pub(crate) mod normalize;
pub(crate) mod walker;

pub(crate) const TYPENAME_FIELD: Name = name!("__typename");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct SelectionSetId(usize);

#[derive(Debug, Clone)]
pub(crate) struct Operation {
    pub(crate) name: Option<Name>,
    pub(crate) kind: OperationKind,
    pub(crate) root_type: Name,
    pub(crate) variables: Vec<Node<VariableDefinition>>,
    pub(crate) selection_set: SelectionSetId,
    selection_sets: Vec<SelectionSet>,
}

#[derive(Debug, Clone)]
pub(crate) struct SelectionSet {
    pub(crate) ty: Name,
    pub(crate) selections: Vec<Selection>,
}

#[derive(Debug, Clone)]
pub(crate) enum Selection {
    Field(Field),
    InlineFragment(InlineFragment),
}

#[derive(Debug, Clone)]
pub(crate) struct Field {
    pub(crate) alias: Option<Name>,
    pub(crate) name: Name,
    pub(crate) arguments: Vec<Node<ast::Argument>>,
    pub(crate) directives: ast::DirectiveList,
    pub(crate) definition: Node<schema::FieldDefinition>,
    pub(crate) selection_set: Option<SelectionSetId>,
    /// Inserted by the planner rather than requested by the client.
    pub(crate) planner_added: bool,
}

#[derive(Debug, Clone)]
pub(crate) struct InlineFragment {
    pub(crate) type_condition: Name,
    pub(crate) directives: ast::DirectiveList,
    pub(crate) selection_set: SelectionSetId,
}

impl Field {
    pub(crate) fn response_key(&self) -> &Name {
        self.alias.as_ref().unwrap_or(&self.name)
    }

    pub(crate) fn is_typename(&self) -> bool {
        self.name == TYPENAME_FIELD
    }

    /// How many list wrappers the output type has, `[[User!]]` has two.
    pub(crate) fn list_depth(&self) -> usize {
        let mut depth = 0;
        let mut ty = &self.definition.ty;
        while let ast::Type::List(inner) | ast::Type::NonNullList(inner) = ty {
            depth += 1;
            ty = inner;
        }
        depth
    }

    /// Whether the value of `required` can be read from this field: same name and arguments,
    /// and no directive that could leave it out of the response.
    fn provides(&self, required: &executable::Field) -> bool {
        self.name == required.name
            && self.arguments == required.arguments
            && self.directives.is_empty()
    }

    /// This field with an empty selection set.
    pub(crate) fn to_executable(&self) -> executable::Field {
        executable::Field {
            definition: self.definition.clone(),
            alias: self.alias.clone(),
            name: self.name.clone(),
            arguments: self.arguments.clone(),
            directives: self.directives.clone(),
            selection_set: executable::SelectionSet::new(
                self.definition.ty.inner_named_type().clone(),
            ),
        }
    }
}

impl InlineFragment {
    /// This fragment with an empty selection set.
    pub(crate) fn to_executable(&self) -> executable::InlineFragment {
        executable::InlineFragment {
            type_condition: Some(self.type_condition.clone()),
            directives: self.directives.clone(),
            selection_set: executable::SelectionSet::new(self.type_condition.clone()),
        }
    }
}

impl Operation {
    pub(crate) fn new(
        name: Option<Name>,
        kind: OperationKind,
        root_type: Name,
        variables: Vec<Node<VariableDefinition>>,
    ) -> Self {
        let mut operation = Self {
            name,
            kind,
            root_type: root_type.clone(),
            variables,
            selection_set: SelectionSetId(0),
            selection_sets: Vec::new(),
        };
        operation.selection_set = operation.new_selection_set(root_type);
        operation
    }

    pub(crate) fn new_selection_set(&mut self, ty: Name) -> SelectionSetId {
        self.selection_sets.push(SelectionSet {
            ty,
            selections: Vec::new(),
        });
        SelectionSetId(self.selection_sets.len() - 1)
    }

    pub(crate) fn selection_set(&self, id: SelectionSetId) -> &SelectionSet {
        &self.selection_sets[id.0]
    }

    pub(crate) fn selection_set_mut(&mut self, id: SelectionSetId) -> &mut SelectionSet {
        &mut self.selection_sets[id.0]
    }

    /// Number of fields inserted by planning so far.
    pub(crate) fn added_field_count(&self) -> usize {
        self.selection_sets
            .iter()
            .flat_map(|set| &set.selections)
            .filter(|selection| matches!(selection, Selection::Field(field) if field.planner_added))
            .count()
    }

    /// The field of `target` the value of `required` is read from. A field answering under the
    /// required field's own name wins over an aliased one.
    pub(crate) fn providing_field(
        &self,
        target: SelectionSetId,
        required: &executable::Field,
    ) -> Option<&Field> {
        self.selection_set(target)
            .selections
            .iter()
            .filter_map(|selection| match selection {
                Selection::Field(field) if field.provides(required) => Some(field),
                _ => None,
            })
            .min_by_key(|field| *field.response_key() != required.name)
    }

    fn providing_fragment(&self, target: SelectionSetId, type_condition: &Name) -> Option<SelectionSetId> {
        self.selection_set(target)
            .selections
            .iter()
            .find_map(|selection| match selection {
                Selection::InlineFragment(fragment)
                    if fragment.type_condition == *type_condition && fragment.directives.is_empty() =>
                {
                    Some(fragment.selection_set)
                }
                _ => None,
            })
    }

    fn has_response_key(&self, target: SelectionSetId, response_key: &str) -> bool {
        self.selection_set(target)
            .selections
            .iter()
            .any(|selection| matches!(selection, Selection::Field(field) if field.response_key() == response_key))
    }

    /// `None` when `name` is free as a response key of `target`, otherwise the first free
    /// `{name}__alias_{n}`.
    fn alias_for(&self, target: SelectionSetId, name: &Name) -> Option<Name> {
        if !self.has_response_key(target, name) {
            return None;
        }
        (0usize..).find_map(|counter| {
            Name::new(&format!("{name}__alias_{counter}"))
                .ok()
                .filter(|alias| !self.has_response_key(target, alias))
        })
    }

    /// Inserts the fields of `field_set` missing from `target`, recursively.
    ///
    /// New top-level fields are placed right before the field with response key `before` when
    /// given, so that they are visited (and planned) before it. A field whose response key is
    /// already taken by another field is inserted under a generated alias. Returns how many
    /// fields were inserted.
    pub(crate) fn add_required_fields(
        &mut self,
        target: SelectionSetId,
        before: Option<&str>,
        field_set: &executable::SelectionSet,
    ) -> usize {
        let mut inserted = 0;
        for selection in &field_set.selections {
            match selection {
                executable::Selection::Field(required) => {
                    let existing = self
                        .providing_field(target, required)
                        .map(|field| field.selection_set);
                    let child = match existing {
                        Some(child) => child,
                        None => {
                            let child = (!required.selection_set.selections.is_empty())
                                .then(|| self.new_selection_set(required.selection_set.ty.clone()));
                            let field = Field {
                                alias: self.alias_for(target, &required.name),
                                name: required.name.clone(),
                                arguments: required.arguments.clone(),
                                directives: ast::DirectiveList::default(),
                                definition: required.definition.clone(),
                                selection_set: child,
                                planner_added: true,
                            };
                            self.insert_selection(target, before, Selection::Field(field));
                            inserted += 1;
                            child
                        }
                    };
                    if let Some(child) = child {
                        inserted += self.add_required_fields(child, None, &required.selection_set);
                    }
                }
                executable::Selection::InlineFragment(required) => {
                    let type_condition = required
                        .type_condition
                        .clone()
                        .unwrap_or_else(|| field_set.ty.clone());
                    let child = match self.providing_fragment(target, &type_condition) {
                        Some(child) => child,
                        None => {
                            let child = self.new_selection_set(type_condition.clone());
                            let fragment = InlineFragment {
                                type_condition,
                                directives: ast::DirectiveList::default(),
                                selection_set: child,
                            };
                            self.insert_selection(target, before, Selection::InlineFragment(fragment));
                            child
                        }
                    };
                    inserted += self.add_required_fields(child, None, &required.selection_set);
                }
                // field sets cannot contain named fragments
                executable::Selection::FragmentSpread(_) => {}
            }
        }
        inserted
    }

    fn insert_selection(&mut self, target: SelectionSetId, before: Option<&str>, selection: Selection) {
        let selections = &mut self.selection_set_mut(target).selections;
        let position = before.and_then(|before| {
            selections.iter().position(|selection| {
                matches!(selection, Selection::Field(field) if *field.response_key() == before)
            })
        });
        match position {
            Some(position) => selections.insert(position, selection),
            None => selections.push(selection),
        }
    }

    /// Whether every field of `field_set` is already provided by `target`.
    pub(crate) fn contains_field_set(
        &self,
        target: SelectionSetId,
        field_set: &executable::SelectionSet,
    ) -> bool {
        field_set.selections.iter().all(|selection| match selection {
            executable::Selection::Field(required) => match self.providing_field(target, required) {
                Some(Field {
                    selection_set: Some(child),
                    ..
                }) => self.contains_field_set(*child, &required.selection_set),
                Some(_) => true,
                None => false,
            },
            executable::Selection::InlineFragment(required) => {
                let type_condition = required.type_condition.as_ref().unwrap_or(&field_set.ty);
                self.providing_fragment(target, type_condition)
                    .is_some_and(|child| self.contains_field_set(child, &required.selection_set))
            }
            executable::Selection::FragmentSpread(_) => true,
        })
    }

    /// `field_set` as it is read from `target`: every field that is provided under another
    /// response key gets that response key as its alias.
    pub(crate) fn provided_field_set(
        &self,
        target: SelectionSetId,
        field_set: &executable::SelectionSet,
    ) -> executable::SelectionSet {
        let mut provided = executable::SelectionSet::new(field_set.ty.clone());
        for selection in &field_set.selections {
            match selection {
                executable::Selection::Field(required) => {
                    let mut field = executable::Field::clone(required);
                    if let Some(provider) = self.providing_field(target, required) {
                        if *provider.response_key() != required.name {
                            field.alias = Some(provider.response_key().clone());
                        }
                        if let Some(child) = provider.selection_set {
                            field.selection_set = self.provided_field_set(child, &required.selection_set);
                        }
                    }
                    provided.push(field);
                }
                executable::Selection::InlineFragment(required) => {
                    let mut fragment = executable::InlineFragment::clone(required);
                    let type_condition = required.type_condition.as_ref().unwrap_or(&field_set.ty);
                    if let Some(child) = self.providing_fragment(target, type_condition) {
                        fragment.selection_set = self.provided_field_set(child, &required.selection_set);
                    }
                    provided.push(fragment);
                }
                executable::Selection::FragmentSpread(_) => provided.push(selection.clone()),
            }
        }
        provided
    }

    /// The selection set `id`, planner-added fields included.
    pub(crate) fn to_executable(&self, id: SelectionSetId) -> executable::SelectionSet {
        let selection_set = self.selection_set(id);
        let mut executable = executable::SelectionSet::new(selection_set.ty.clone());
        for selection in &selection_set.selections {
            match selection {
                Selection::Field(field) => {
                    let mut converted = field.to_executable();
                    if let Some(child) = field.selection_set {
                        converted.selection_set = self.to_executable(child);
                    }
                    executable.push(converted);
                }
                Selection::InlineFragment(fragment) => {
                    let mut converted = fragment.to_executable();
                    converted.selection_set = self.to_executable(fragment.selection_set);
                    executable.push(converted);
                }
            }
        }
        executable
    }
}

/// Parses a key or requires condition such as `"id"` or `"author { id }"` against `type_name`.
pub(crate) fn parse_field_set(
    schema: &Valid<Schema>,
    type_name: &Name,
    field_set: &str,
) -> Result<executable::SelectionSet, PlanningError> {
    let parsed = FieldSet::parse_and_validate(schema, type_name.clone(), field_set, "field_set.graphql")
        .map_err(|with_errors| PlanningError::InvalidFieldSet {
            type_name: type_name.to_string(),
            field_set: field_set.to_owned(),
            message: with_errors.errors.to_string(),
        })?;
    Ok(parsed.into_inner().selection_set)
}

/// Top-level field names of a field set, in order.
pub(crate) fn field_set_names(field_set: &executable::SelectionSet) -> Vec<Name> {
    field_set
        .selections
        .iter()
        .filter_map(|selection| match selection {
            executable::Selection::Field(field) => Some(field.name.clone()),
            _ => None,
        })
        .collect()
}

impl Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let operation = executable::Operation {
            operation_type: self.kind.into(),
            name: self.name.clone(),
            variables: self.variables.clone(),
            directives: Default::default(),
            selection_set: self.to_executable(self.selection_set),
        };
        operation.serialize().fmt(f)
    }
}
