//! Depth-first traversal of an [`Operation`] with enter/leave callbacks.
//!
//! Every node is identified by a dot-delimited path: the root is the operation kind (`query`),
//! a field appends its response key (`query.me.name`) and an inline fragment appends `$` and its
//! type condition (`query.node.$User`). Fragments repeating a type condition within one selection
//! set, which then differ by their directives, get their position among those fragments appended
//! (`query.$Query`, `query.$Query#1`). Data source ownership is tracked against these paths.

use std::collections::HashMap;

use apollo_compiler::Name;
use apollo_compiler::ast;

use super::Field;
use super::InlineFragment;
use super::Operation;
use super::Selection;
use super::SelectionSetId;
use crate::error::PlanningError;
use crate::plan::FetchPathElement;

/// The type condition of a fragment path segment, `None` for a field segment.
pub(crate) fn fragment_type_condition(segment: &str) -> Option<&str> {
    let segment = segment.strip_prefix('$')?;
    Some(segment.split_once('#').map_or(segment, |(type_condition, _)| type_condition))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Visit {
    Continue,
    SkipChildren,
}

/// Where the walker currently is. For a field or fragment callback, `path` is the path of that
/// field or fragment and the other members describe its enclosing selection set.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Cursor<'a> {
    pub(crate) path: &'a str,
    parent_len: usize,
    pub(crate) enclosing_type: &'a Name,
    pub(crate) selection_set: SelectionSetId,
    /// Response path of the enclosing object, list items as `@`.
    pub(crate) response_path: &'a [FetchPathElement],
}

impl<'a> Cursor<'a> {
    pub(crate) fn parent_path(&self) -> &'a str {
        &self.path[..self.parent_len]
    }

    /// Whether the enclosing object is the operation root, possibly narrowed by fragments.
    pub(crate) fn is_root_level(&self) -> bool {
        self.parent_path()
            .split('.')
            .skip(1)
            .all(|segment| segment.starts_with('$'))
    }
}

#[allow(unused_variables)]
pub(crate) trait Visitor {
    fn enter_operation(&mut self, operation: &Operation) -> Result<(), PlanningError> {
        Ok(())
    }

    fn leave_operation(&mut self, operation: &Operation) -> Result<(), PlanningError> {
        Ok(())
    }

    /// `cursor.path` is the path of the field or fragment owning the selection set.
    fn enter_selection_set(
        &mut self,
        cursor: &Cursor<'_>,
        selection_set: SelectionSetId,
    ) -> Result<(), PlanningError> {
        Ok(())
    }

    fn leave_selection_set(
        &mut self,
        cursor: &Cursor<'_>,
        selection_set: SelectionSetId,
    ) -> Result<(), PlanningError> {
        Ok(())
    }

    fn enter_field(&mut self, cursor: &Cursor<'_>, field: &Field) -> Result<Visit, PlanningError> {
        Ok(Visit::Continue)
    }

    fn leave_field(&mut self, cursor: &Cursor<'_>, field: &Field) -> Result<(), PlanningError> {
        Ok(())
    }

    fn enter_inline_fragment(
        &mut self,
        cursor: &Cursor<'_>,
        fragment: &InlineFragment,
    ) -> Result<Visit, PlanningError> {
        Ok(Visit::Continue)
    }

    fn leave_inline_fragment(
        &mut self,
        cursor: &Cursor<'_>,
        fragment: &InlineFragment,
    ) -> Result<(), PlanningError> {
        Ok(())
    }

    /// Called for the directives of fields and fragments whose children are visited.
    fn enter_directive(
        &mut self,
        cursor: &Cursor<'_>,
        directive: &ast::Directive,
    ) -> Result<(), PlanningError> {
        Ok(())
    }
}

pub(crate) fn walk<V: Visitor>(operation: &Operation, visitor: &mut V) -> Result<(), PlanningError> {
    visitor.enter_operation(operation)?;
    let mut walker = Walker {
        operation,
        visitor: &mut *visitor,
        path: operation.kind.to_string(),
        response_path: Vec::new(),
    };
    let root_len = walker.path.len();
    walker.walk_selection_set(operation.selection_set, root_len, &operation.root_type)?;
    visitor.leave_operation(operation)
}

struct Walker<'a, V> {
    operation: &'a Operation,
    visitor: &'a mut V,
    path: String,
    response_path: Vec<FetchPathElement>,
}

impl<V: Visitor> Walker<'_, V> {
    fn walk_selection_set(
        &mut self,
        id: SelectionSetId,
        parent_len: usize,
        enclosing_type: &Name,
    ) -> Result<(), PlanningError> {
        let cursor = Cursor {
            path: &self.path,
            parent_len,
            enclosing_type,
            selection_set: id,
            response_path: &self.response_path,
        };
        self.visitor.enter_selection_set(&cursor, id)?;
        let operation = self.operation;
        let selection_set = operation.selection_set(id);
        let mut seen_type_conditions: HashMap<&Name, usize> = HashMap::new();
        for selection in &selection_set.selections {
            match selection {
                Selection::Field(field) => self.walk_field(id, &selection_set.ty, field)?,
                Selection::InlineFragment(fragment) => {
                    let seen = seen_type_conditions
                        .entry(&fragment.type_condition)
                        .or_default();
                    self.walk_inline_fragment(id, &selection_set.ty, fragment, *seen)?;
                    *seen += 1;
                }
            }
        }
        let cursor = Cursor {
            path: &self.path,
            parent_len,
            enclosing_type,
            selection_set: id,
            response_path: &self.response_path,
        };
        self.visitor.leave_selection_set(&cursor, id)
    }

    fn walk_field(
        &mut self,
        enclosing: SelectionSetId,
        enclosing_type: &Name,
        field: &Field,
    ) -> Result<(), PlanningError> {
        let parent_len = self.path.len();
        self.path.push('.');
        self.path.push_str(field.response_key());
        let cursor = Cursor {
            path: &self.path,
            parent_len,
            enclosing_type,
            selection_set: enclosing,
            response_path: &self.response_path,
        };
        let visit = self.visitor.enter_field(&cursor, field)?;
        if visit == Visit::Continue {
            for directive in field.directives.iter() {
                self.visitor.enter_directive(&cursor, directive)?;
            }
            if let Some(child) = field.selection_set {
                let response_len = self.response_path.len();
                self.response_path
                    .push(FetchPathElement::Key(field.response_key().to_string()));
                self.response_path
                    .extend(std::iter::repeat_n(FetchPathElement::AnyIndex, field.list_depth()));
                let operation = self.operation;
                let child_type = &operation.selection_set(child).ty;
                self.walk_selection_set(child, parent_len, child_type)?;
                self.response_path.truncate(response_len);
            }
        }
        let cursor = Cursor {
            path: &self.path,
            parent_len,
            enclosing_type,
            selection_set: enclosing,
            response_path: &self.response_path,
        };
        self.visitor.leave_field(&cursor, field)?;
        self.path.truncate(parent_len);
        Ok(())
    }

    fn walk_inline_fragment(
        &mut self,
        enclosing: SelectionSetId,
        enclosing_type: &Name,
        fragment: &InlineFragment,
        occurrence: usize,
    ) -> Result<(), PlanningError> {
        let parent_len = self.path.len();
        self.path.push_str(".$");
        self.path.push_str(&fragment.type_condition);
        if occurrence > 0 {
            self.path.push('#');
            self.path.push_str(&occurrence.to_string());
        }
        let cursor = Cursor {
            path: &self.path,
            parent_len,
            enclosing_type,
            selection_set: enclosing,
            response_path: &self.response_path,
        };
        let visit = self.visitor.enter_inline_fragment(&cursor, fragment)?;
        if visit == Visit::Continue {
            for directive in fragment.directives.iter() {
                self.visitor.enter_directive(&cursor, directive)?;
            }
            let response_len = self.response_path.len();
            if fragment.type_condition != *enclosing_type {
                self.response_path
                    .push(FetchPathElement::TypeCondition(fragment.type_condition.to_string()));
            }
            self.walk_selection_set(fragment.selection_set, parent_len, &fragment.type_condition)?;
            self.response_path.truncate(response_len);
        }
        let cursor = Cursor {
            path: &self.path,
            parent_len,
            enclosing_type,
            selection_set: enclosing,
            response_path: &self.response_path,
        };
        self.visitor.leave_inline_fragment(&cursor, fragment)?;
        self.path.truncate(parent_len);
        Ok(())
    }
}
