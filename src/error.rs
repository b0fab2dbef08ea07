// src/error.rs
use thiserror::Error;

pub type StoreResult<T> = Result<T, StoreError>;

/// SQLSTATE for unique_violation.
const UNIQUE_VIOLATION: &str = "23505";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("poll {id} not found")]
    NotFound { id: i32 },

    #[error("answer {answer_id} does not belong to poll {poll_id}")]
    AnswerNotInPoll { poll_id: i32, answer_id: i32 },

    #[error("user {user_id} has already voted on poll {poll_id}")]
    AlreadyVoted { poll_id: i32, user_id: i32 },

    #[error("a poll needs at least one answer")]
    NoAnswers,

    #[error("database error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("configuration error: {0}")]
    Config(String),
}

impl StoreError {
    /// Map a failed vote-link insert, turning a duplicate key into `AlreadyVoted`.
    pub(crate) fn from_vote_insert(err: sqlx::Error, poll_id: i32, user_id: i32) -> Self {
        match &err {
            sqlx::Error::Database(db) if db.code().as_deref() == Some(UNIQUE_VIOLATION) => {
                StoreError::AlreadyVoted { poll_id, user_id }
            }
            _ => StoreError::Storage(err),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}
