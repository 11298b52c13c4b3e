/// Errors from the entry store facade.
///
/// These are surfaced to the model as structured tool results, never as
/// faults that abort an agent turn. `kind()` gives the stable identifier
/// used in those results.
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("No entry with id '{0}'")]
    NotFound(String),

    #[error("Entry '{id}' is in '{actual}', not '{claimed}'")]
    CategoryMismatch {
        id: String,
        claimed: String,
        actual: String,
    },

    #[error("Unknown category '{0}': expected people, projects, ideas, admin, or review")]
    InvalidCategory(String),

    #[error("Entry '{id}' is already in '{category}'")]
    NoOpMove { id: String, category: String },
}

impl StoreError {
    pub fn kind(&self) -> &'static str {
        match self {
            StoreError::NotFound(_) => "not_found",
            StoreError::CategoryMismatch { .. } => "category_mismatch",
            StoreError::InvalidCategory(_) => "invalid_category",
            StoreError::NoOpMove { .. } => "no_op_move",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_not_found() {
        let err = StoreError::NotFound("01ARZ3NDEKTSV4RRFFQ69G5FAV".into());
        assert_eq!(
            err.to_string(),
            "No entry with id '01ARZ3NDEKTSV4RRFFQ69G5FAV'"
        );
    }

    #[test]
    fn test_display_category_mismatch() {
        let err = StoreError::CategoryMismatch {
            id: "01ARZ".into(),
            claimed: "people".into(),
            actual: "ideas".into(),
        };
        assert_eq!(err.to_string(), "Entry '01ARZ' is in 'ideas', not 'people'");
    }

    #[test]
    fn test_display_invalid_category() {
        let err = StoreError::InvalidCategory("journal".into());
        assert_eq!(
            err.to_string(),
            "Unknown category 'journal': expected people, projects, ideas, admin, or review"
        );
    }

    #[test]
    fn test_display_no_op_move() {
        let err = StoreError::NoOpMove {
            id: "01ARZ".into(),
            category: "people".into(),
        };
        assert_eq!(err.to_string(), "Entry '01ARZ' is already in 'people'");
    }

    #[test]
    fn test_kind_strings() {
        assert_eq!(StoreError::NotFound("x".into()).kind(), "not_found");
        assert_eq!(
            StoreError::InvalidCategory("x".into()).kind(),
            "invalid_category"
        );
        assert_eq!(
            StoreError::NoOpMove {
                id: "x".into(),
                category: "people".into(),
            }
            .kind(),
            "no_op_move"
        );
    }

    #[test]
    fn test_error_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<StoreError>();
    }
}
