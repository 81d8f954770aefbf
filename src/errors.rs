//! Typed error hierarchy for the board service.
//!
//! `BoardError` is the single domain error surfaced by the reorderer, the
//! store handle and the HTTP layer. Store plumbing that has no interesting
//! failure modes uses `anyhow` and lands in `BoardError::Other`.

use thiserror::Error;

/// Errors from board operations (reordering, CRUD, storage).
#[derive(Debug, Error)]
pub enum BoardError {
    #[error("Project {id} not found")]
    ProjectNotFound { id: i64 },

    #[error("Column {id} not found")]
    ColumnNotFound { id: i64 },

    #[error("Card {id} not found")]
    CardNotFound { id: i64 },

    #[error("Position {position} is out of range (expected 0..={max})")]
    InvalidPosition { position: i32, max: i32 },

    #[error("User '{user_id}' may not modify column {column_id}")]
    PermissionDenied { user_id: String, column_id: i64 },

    #[error("Card {card_id} changed since it was read; refetch and retry")]
    ConcurrencyConflict { card_id: i64 },

    #[error("Card {card_id} cannot move to column {column_id} of another project")]
    CrossProjectMove { card_id: i64, column_id: i64 },

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Database lock poisoned")]
    LockPoisoned,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl BoardError {
    /// True for errors caused by the caller's request rather than the store.
    pub fn is_client_error(&self) -> bool {
        !matches!(
            self,
            BoardError::Database(_) | BoardError::LockPoisoned | BoardError::Other(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_position_reports_bounds() {
        let err = BoardError::InvalidPosition {
            position: 5,
            max: 2,
        };
        let msg = err.to_string();
        assert!(msg.contains('5'));
        assert!(msg.contains("0..=2"));
    }

    #[test]
    fn permission_denied_carries_user_and_column() {
        let err = BoardError::PermissionDenied {
            user_id: "mallory".into(),
            column_id: 7,
        };
        match &err {
            BoardError::PermissionDenied { user_id, column_id } => {
                assert_eq!(user_id, "mallory");
                assert_eq!(*column_id, 7);
            }
            _ => panic!("Expected PermissionDenied"),
        }
        assert!(err.is_client_error());
    }

    #[test]
    fn rusqlite_errors_convert_to_database() {
        let err: BoardError = rusqlite::Error::QueryReturnedNoRows.into();
        assert!(matches!(err, BoardError::Database(_)));
        assert!(!err.is_client_error());
    }

    #[test]
    fn anyhow_errors_convert_to_other() {
        let err: BoardError = anyhow::anyhow!("disk on fire").into();
        assert!(matches!(err, BoardError::Other(_)));
        assert_eq!(err.to_string(), "disk on fire");
    }

    #[test]
    fn not_found_variants_are_distinct() {
        let column = BoardError::ColumnNotFound { id: 1 };
        let card = BoardError::CardNotFound { id: 1 };
        assert!(matches!(column, BoardError::ColumnNotFound { .. }));
        assert!(!matches!(card, BoardError::ColumnNotFound { .. }));
    }
}
