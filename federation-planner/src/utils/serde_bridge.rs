//! Serializes apollo-compiler values with serde as their single-line GraphQL form.

use apollo_compiler::executable;
use serde::Serializer;

pub(crate) fn serialize_exe_selection_set<S: Serializer>(
    selection_set: &executable::SelectionSet,
    ser: S,
) -> Result<S::Ok, S::Error> {
    ser.serialize_str(&selection_set.serialize().no_indent().to_string())
}

pub(crate) fn serialize_optional_exe_selection_set<S: Serializer>(
    selection_set: &Option<executable::SelectionSet>,
    ser: S,
) -> Result<S::Ok, S::Error> {
    match selection_set {
        Some(selection_set) => serialize_exe_selection_set(selection_set, ser),
        None => ser.serialize_none(),
    }
}
