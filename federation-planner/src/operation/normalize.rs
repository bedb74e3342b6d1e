//! Builds the planner's [`Operation`] from a validated executable document.
//!
//! Normalization expands fragment spreads into inline fragments, inlines inline fragments that
//! do not narrow the type (and carry no directive), fills in missing type conditions, and merges
//! fields with the same response key and directives as well as fragments with the same type
//! condition and directives.
//!
//! Fields sharing a response key but not their directives are kept apart: every occurrence that
//! carries directives moves into a fragment on the enclosing type which carries them instead, so
//! that `me @skip(if: $s) { name } me { id }` becomes
//! `... on Query @skip(if: $s) { me { name } } me { id }`. The result has at most one field per
//! response key in each selection set.

use apollo_compiler::ExecutableDocument;
use apollo_compiler::Name;
use apollo_compiler::ast;
use apollo_compiler::executable;
use apollo_compiler::validation::Valid;

use super::Field;
use super::InlineFragment;
use super::Operation;
use super::Selection;
use super::SelectionSetId;
use crate::error::PlanningError;

pub(crate) fn normalize_operation(
    document: &Valid<ExecutableDocument>,
    operation: &executable::Operation,
) -> Result<Operation, PlanningError> {
    let mut normalized = Operation::new(
        operation.name.clone(),
        operation.operation_type.into(),
        operation.selection_set.ty.clone(),
        operation.variables.clone(),
    );
    let root = normalized.selection_set;
    let mut normalizer = Normalizer {
        document,
        operation: &mut normalized,
        depth: 0,
    };
    normalizer.add_selection_set(root, &operation.selection_set)?;
    Ok(normalized)
}

struct Normalizer<'a> {
    document: &'a ExecutableDocument,
    operation: &'a mut Operation,
    depth: usize,
}

/// Fragment cycles are rejected by validation; this only guards against runaway recursion.
const MAX_DEPTH: usize = 512;

impl Normalizer<'_> {
    fn add_selection_set(
        &mut self,
        target: SelectionSetId,
        selection_set: &executable::SelectionSet,
    ) -> Result<(), PlanningError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(PlanningError::internal(
                "selection sets are nested too deeply to normalize",
            ));
        }
        for selection in &selection_set.selections {
            match selection {
                executable::Selection::Field(field) => self.add_field(target, field)?,
                executable::Selection::InlineFragment(fragment) => self.add_fragment(
                    target,
                    fragment.type_condition.as_ref(),
                    &fragment.directives,
                    &fragment.selection_set,
                )?,
                executable::Selection::FragmentSpread(spread) => {
                    let fragment = self
                        .document
                        .fragments
                        .get(&spread.fragment_name)
                        .ok_or_else(|| {
                            PlanningError::internal(format!(
                                "unknown fragment \"{}\"",
                                spread.fragment_name
                            ))
                        })?;
                    self.add_fragment(
                        target,
                        Some(fragment.type_condition()),
                        &spread.directives,
                        &fragment.selection_set,
                    )?
                }
            }
        }
        self.depth -= 1;
        Ok(())
    }

    fn add_field(
        &mut self,
        target: SelectionSetId,
        field: &executable::Field,
    ) -> Result<(), PlanningError> {
        let response_key = field.response_key();
        let existing = self
            .operation
            .selection_set(target)
            .selections
            .iter()
            .enumerate()
            .find_map(|(index, selection)| match selection {
                Selection::Field(existing) if existing.response_key() == response_key => Some((
                    index,
                    existing.directives == field.directives,
                    existing.selection_set,
                )),
                _ => None,
            });
        match existing {
            Some((_, true, child)) => self.add_children(child, field),
            Some((index, false, _)) => {
                self.move_into_conditional_fragment(target, index);
                if field.directives.is_empty() {
                    self.push_field(target, field)
                } else {
                    self.add_conditional_field(target, field)
                }
            }
            None => self.push_field(target, field),
        }
    }

    fn push_field(
        &mut self,
        target: SelectionSetId,
        field: &executable::Field,
    ) -> Result<(), PlanningError> {
        let child = (!field.selection_set.selections.is_empty())
            .then(|| self.operation.new_selection_set(field.selection_set.ty.clone()));
        self.operation
            .selection_set_mut(target)
            .selections
            .push(Selection::Field(Field {
                alias: field.alias.clone(),
                name: field.name.clone(),
                arguments: field.arguments.clone(),
                directives: field.directives.clone(),
                definition: field.definition.clone(),
                selection_set: child,
                planner_added: false,
            }));
        self.add_children(child, field)
    }

    fn add_children(
        &mut self,
        child: Option<SelectionSetId>,
        field: &executable::Field,
    ) -> Result<(), PlanningError> {
        match child {
            Some(child) => self.add_selection_set(child, &field.selection_set),
            None => Ok(()),
        }
    }

    /// Adds `field` without its directives to a fragment on the enclosing type carrying them.
    fn add_conditional_field(
        &mut self,
        target: SelectionSetId,
        field: &executable::Field,
    ) -> Result<(), PlanningError> {
        let parent_type = self.operation.selection_set(target).ty.clone();
        let fragment = self.fragment_selection_set(target, parent_type, &field.directives);
        let mut unconditional = executable::Field::clone(field);
        unconditional.directives = ast::DirectiveList::default();
        self.add_field(fragment, &unconditional)
    }

    /// Moves the directives of the field at `index` to a new fragment on the enclosing type and
    /// the field into it. A field without directives stays in place.
    fn move_into_conditional_fragment(&mut self, target: SelectionSetId, index: usize) {
        let Some(Selection::Field(field)) = self
            .operation
            .selection_set_mut(target)
            .selections
            .get_mut(index)
        else {
            return;
        };
        if field.directives.is_empty() {
            return;
        }
        let directives = std::mem::take(&mut field.directives);
        let parent_type = self.operation.selection_set(target).ty.clone();
        let fragment = self.operation.new_selection_set(parent_type.clone());
        let field = std::mem::replace(
            &mut self.operation.selection_set_mut(target).selections[index],
            Selection::InlineFragment(InlineFragment {
                type_condition: parent_type,
                directives,
                selection_set: fragment,
            }),
        );
        self.operation
            .selection_set_mut(fragment)
            .selections
            .push(field);
    }

    fn add_fragment(
        &mut self,
        target: SelectionSetId,
        type_condition: Option<&Name>,
        directives: &ast::DirectiveList,
        selection_set: &executable::SelectionSet,
    ) -> Result<(), PlanningError> {
        let parent_type = self.operation.selection_set(target).ty.clone();
        let type_condition = type_condition.cloned().unwrap_or_else(|| parent_type.clone());
        if type_condition == parent_type && directives.is_empty() {
            return self.add_selection_set(target, selection_set);
        }
        let child = self.fragment_selection_set(target, type_condition, directives);
        self.add_selection_set(child, selection_set)
    }

    /// The selection set of the fragment of `target` with this type condition and these
    /// directives, created if missing.
    fn fragment_selection_set(
        &mut self,
        target: SelectionSetId,
        type_condition: Name,
        directives: &ast::DirectiveList,
    ) -> SelectionSetId {
        let existing = self
            .operation
            .selection_set(target)
            .selections
            .iter()
            .find_map(|selection| match selection {
                Selection::InlineFragment(existing)
                    if existing.type_condition == type_condition
                        && existing.directives == *directives =>
                {
                    Some(existing.selection_set)
                }
                _ => None,
            });
        match existing {
            Some(child) => child,
            None => {
                let child = self.operation.new_selection_set(type_condition.clone());
                self.operation
                    .selection_set_mut(target)
                    .selections
                    .push(Selection::InlineFragment(InlineFragment {
                        type_condition,
                        directives: directives.clone(),
                        selection_set: child,
                    }));
                child
            }
        }
    }
}
