/// This macro is a wrapper around `tracing::trace!` and should not be confused with snapshot
/// testing. It adds the context needed by external tools to follow how the key planning
/// structures (node suggestions, planner configurations, plans) evolve over the fixpoint passes.
///
/// Passing an identifier serializes the value with serde_json and tags the snapshot with the
/// value's type name:
/// ```ignore
/// snapshot!(node_suggestions, "refreshed node suggestions");
/// // Generates:
/// // trace!(snapshot = "NodeSuggestions", data = "{ .. }", "refreshed node suggestions");
/// ```
/// Passing a name tag and data explicitly skips serialization. The data must implement the
/// tracing crate's `Value` trait, ideally a string rendering of the structure:
/// ```ignore
/// snapshot!("Plan", plan.to_string(), "assembled plan");
/// ```
macro_rules! snapshot {
    ($value:expr, $msg:literal) => {
        #[cfg(feature = "snapshot_tracing")]
        tracing::trace!(
            snapshot = std::any::type_name_of_val(&$value),
            data = serde_json::to_string(&$value).unwrap_or_default(),
            $msg
        );
    };
    ($name:literal, $value:expr, $msg:literal) => {
        #[cfg(feature = "snapshot_tracing")]
        tracing::trace!(snapshot = $name, data = $value, $msg);
    };
}

pub(crate) use snapshot;
