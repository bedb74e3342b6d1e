use std::fmt;

use serde::Serialize;

use crate::display_helpers::DisplaySlice;

/// Whether an error was caused by the caller's input or by the planner itself.
///
/// External errors are client-correctable (an unknown operation name, a field no data source can
/// resolve). Internal errors point at a bug or at a contradictory data source configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, strum_macros::Display)]
pub enum ErrorKind {
    #[strum(to_string = "external")]
    External,
    #[strum(to_string = "internal")]
    Internal,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlanningError {
    #[error("duplicate datasource id: {id}")]
    DuplicateDataSourceId { id: String },
    #[error("operation name is required when the document contains multiple operations")]
    OperationNameRequired,
    #[error("operation with name '{name}' not found")]
    OperationNotFound { name: String },
    #[error("could not resolve {type_name}.{field_name}")]
    FieldNotResolvable {
        type_name: String,
        field_name: String,
    },
    #[error(
        "bad datasource configuration - could not plan the operation. missing path: {}",
        DisplaySlice(missing_paths)
    )]
    PlanningDidNotConverge { missing_paths: Vec<String> },
    #[error("could not register planner for datasource '{data_source_id}': {message}")]
    PlannerRegistration {
        data_source_id: String,
        message: String,
    },
    #[error("invalid field set \"{field_set}\" on type {type_name}: {message}")]
    InvalidFieldSet {
        type_name: String,
        field_set: String,
        message: String,
    },
    #[error("planners form a dependency cycle: {}", DisplaySlice(planner_ids))]
    FetchDependencyCycle { planner_ids: Vec<usize> },
    #[error("{message}")]
    Internal { message: String },
}

impl PlanningError {
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::OperationNameRequired
            | Self::OperationNotFound { .. }
            | Self::FieldNotResolvable { .. } => ErrorKind::External,
            Self::DuplicateDataSourceId { .. }
            | Self::PlanningDidNotConverge { .. }
            | Self::PlannerRegistration { .. }
            | Self::InvalidFieldSet { .. }
            | Self::FetchDependencyCycle { .. }
            | Self::Internal { .. } => ErrorKind::Internal,
        }
    }

    pub fn is_internal(&self) -> bool {
        self.kind() == ErrorKind::Internal
    }
}

/// Errors accumulated while planning a single operation.
///
/// Both external and internal errors end up in the same report; callers should treat internal
/// errors as bugs and surface external ones to the client.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Report {
    errors: Vec<PlanningError>,
}

impl Report {
    pub fn add_error(&mut self, error: PlanningError) {
        self.errors.push(error);
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn errors(&self) -> &[PlanningError] {
        &self.errors
    }

    pub fn external_errors(&self) -> impl Iterator<Item = &PlanningError> {
        self.errors.iter().filter(|error| !error.is_internal())
    }

    pub fn internal_errors(&self) -> impl Iterator<Item = &PlanningError> {
        self.errors.iter().filter(|error| error.is_internal())
    }

    pub fn into_errors(self) -> Vec<PlanningError> {
        self.errors
    }
}

impl From<PlanningError> for Report {
    fn from(error: PlanningError) -> Self {
        Self {
            errors: vec![error],
        }
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut iter = self.errors.iter();
        if let Some(first) = iter.next() {
            write!(f, "{} error: {first}", first.kind())?;
        }
        for error in iter {
            write!(f, "\n{} error: {error}", error.kind())?;
        }
        Ok(())
    }
}

impl std::error::Error for Report {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_errors() {
        assert_eq!(PlanningError::OperationNameRequired.kind(), ErrorKind::External);
        assert_eq!(
            PlanningError::FieldNotResolvable {
                type_name: "Query".to_owned(),
                field_name: "a".to_owned(),
            }
            .kind(),
            ErrorKind::External
        );
        assert!(
            PlanningError::PlanningDidNotConverge {
                missing_paths: vec![]
            }
            .is_internal()
        );
        assert!(PlanningError::internal("boom").is_internal());
    }

    #[test]
    fn report_display_lists_every_error() {
        let mut report = Report::default();
        report.add_error(PlanningError::OperationNotFound {
            name: "Foo".to_owned(),
        });
        report.add_error(PlanningError::PlanningDidNotConverge {
            missing_paths: vec!["query.a".to_owned(), "query.b".to_owned()],
        });
        assert_eq!(
            report.to_string(),
            "external error: operation with name 'Foo' not found\n\
             internal error: bad datasource configuration - could not plan the operation. missing path: [query.a, query.b]"
        );
        assert_eq!(report.external_errors().count(), 1);
        assert_eq!(report.internal_errors().count(), 1);
    }
}
