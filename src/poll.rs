// src/poll.rs
use async_trait::async_trait;
use sqlx::{PgConnection, PgPool, Postgres, Transaction};

use crate::error::{StoreError, StoreResult};
use crate::models::{Answer, NewPoll, Poll, PollDisplay, PollListing, PollWithAnswers, User};
use crate::pagination::{Paginated, Pagination};

/// Sole access path to poll, answer and vote-link persistence.
///
/// Input validation beyond "at least one answer" is the caller's job.
#[async_trait]
pub trait PollStore: Send + Sync {
    /// One page of polls ordered by creation, plus every question with at least one voter.
    async fn list_polls(&self, page: Pagination) -> StoreResult<PollListing>;

    /// Create a poll and its answers (each starting at 0) in one transaction.
    async fn create_poll(&self, new_poll: &NewPoll) -> StoreResult<Poll>;

    /// Poll with answers, its own vote total, and whether `user` has voted.
    /// An anonymous caller never counts as having voted.
    async fn poll_for_display(&self, id: i32, user: Option<&User>) -> StoreResult<PollDisplay>;

    async fn poll_for_edit(&self, id: i32) -> StoreResult<PollWithAnswers>;

    /// True once any user has voted on the poll.
    async fn has_any_votes(&self, id: i32) -> StoreResult<bool>;

    /// Overwrite the question and replace the whole answer set, counters reset.
    async fn update_poll(&self, id: i32, new_poll: &NewPoll) -> StoreResult<()>;

    /// Remove the poll, its answers and its vote links. Users are untouched.
    async fn delete_poll(&self, id: i32) -> StoreResult<()>;

    async fn get_by_id(&self, id: i32) -> StoreResult<Option<Poll>>;

    async fn has_voted(&self, poll_id: i32, user_id: i32) -> StoreResult<bool>;

    /// Count one vote for `answer_id` and remember that `user` voted on the poll.
    async fn record_vote(&self, poll_id: i32, answer_id: i32, user: &User) -> StoreResult<()>;
}

/// `PollStore` over a Postgres pool.
#[derive(Clone)]
pub struct PgPollStore {
    pool: PgPool,
}

impl PgPollStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

async fn fetch_poll(conn: &mut PgConnection, id: i32) -> StoreResult<Poll> {
    sqlx::query_as::<_, Poll>("SELECT id, question, created_at, updated_at FROM polls WHERE id = $1")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(StoreError::NotFound { id })
}

async fn fetch_answers(conn: &mut PgConnection, poll_id: i32) -> StoreResult<Vec<Answer>> {
    let answers = sqlx::query_as::<_, Answer>(
        r#"
        SELECT id, poll_id, answer, result
        FROM answers
        WHERE poll_id = $1
        ORDER BY id
        "#,
    )
    .bind(poll_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(answers)
}

/// Open a transaction whose reads all see one snapshot.
async fn begin_snapshot(pool: &PgPool) -> StoreResult<Transaction<'static, Postgres>> {
    let mut tx = pool.begin().await?;
    sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
        .execute(&mut *tx)
        .await?;
    Ok(tx)
}

/// Insert one answer row per label, in label order, each with result 0.
async fn insert_answers(
    conn: &mut PgConnection,
    poll_id: i32,
    labels: &[String],
) -> Result<(), sqlx::Error> {
    for label in labels {
        sqlx::query("INSERT INTO answers (poll_id, answer, result) VALUES ($1, $2, 0)")
            .bind(poll_id)
            .bind(label)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

#[async_trait]
impl PollStore for PgPollStore {
    async fn list_polls(&self, page: Pagination) -> StoreResult<PollListing> {
        let mut tx = begin_snapshot(&self.pool).await?;

        let items = sqlx::query_as::<_, Poll>(
            r#"
            SELECT id, question, created_at, updated_at
            FROM polls
            ORDER BY created_at, id
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(page.limit() as i64)
        .bind(page.offset() as i64)
        .fetch_all(&mut *tx)
        .await?;

        let (total,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM polls")
            .fetch_one(&mut *tx)
            .await?;

        let voted_questions: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT p.question
            FROM polls p
            WHERE EXISTS (SELECT 1 FROM poll_user pu WHERE pu.poll_id = p.id)
            ORDER BY p.created_at, p.id
            "#,
        )
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::debug!(page = page.page, returned = items.len(), total, "listed polls");

        Ok(PollListing {
            polls: Paginated {
                items,
                total,
                page: page.page,
                per_page: page.per_page,
            },
            voted_questions,
        })
    }

    #[tracing::instrument(skip(self, new_poll), fields(answers = new_poll.answers.len()))]
    async fn create_poll(&self, new_poll: &NewPoll) -> StoreResult<Poll> {
        new_poll.validate()?;

        let mut tx = self.pool.begin().await?;

        let poll = sqlx::query_as::<_, Poll>(
            r#"
            INSERT INTO polls (question)
            VALUES ($1)
            RETURNING id, question, created_at, updated_at
            "#,
        )
        .bind(&new_poll.question)
        .fetch_one(&mut *tx)
        .await?;

        insert_answers(&mut *tx, poll.id, &new_poll.answers).await?;

        tx.commit().await?;
        tracing::info!(poll_id = poll.id, "poll created");
        Ok(poll)
    }

    async fn poll_for_display(&self, id: i32, user: Option<&User>) -> StoreResult<PollDisplay> {
        let mut tx = begin_snapshot(&self.pool).await?;

        let poll = fetch_poll(&mut *tx, id).await?;
        let answers = fetch_answers(&mut *tx, id).await?;
        let has_voted = match user {
            Some(user) => {
                let (voted,): (bool,) = sqlx::query_as(
                    "SELECT EXISTS(SELECT 1 FROM poll_user WHERE poll_id = $1 AND user_id = $2)",
                )
                .bind(id)
                .bind(user.id)
                .fetch_one(&mut *tx)
                .await?;
                voted
            }
            None => false,
        };

        tx.commit().await?;
        Ok(PollDisplay::new(poll, answers, has_voted))
    }

    async fn poll_for_edit(&self, id: i32) -> StoreResult<PollWithAnswers> {
        let mut tx = begin_snapshot(&self.pool).await?;
        let poll = fetch_poll(&mut *tx, id).await?;
        let answers = fetch_answers(&mut *tx, id).await?;
        tx.commit().await?;
        Ok(PollWithAnswers { poll, answers })
    }

    async fn has_any_votes(&self, id: i32) -> StoreResult<bool> {
        if self.get_by_id(id).await?.is_none() {
            return Err(StoreError::NotFound { id });
        }

        let (voted,): (bool,) =
            sqlx::query_as("SELECT EXISTS(SELECT 1 FROM poll_user WHERE poll_id = $1)")
                .bind(id)
                .fetch_one(&self.pool)
                .await?;

        Ok(voted)
    }

    #[tracing::instrument(skip(self, new_poll), fields(answers = new_poll.answers.len()))]
    async fn update_poll(&self, id: i32, new_poll: &NewPoll) -> StoreResult<()> {
        new_poll.validate()?;

        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query("UPDATE polls SET question = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(&new_poll.question)
            .execute(&mut *tx)
            .await?;

        if updated.rows_affected() == 0 {
            return Err(StoreError::NotFound { id });
        }

        sqlx::query("DELETE FROM answers WHERE poll_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        insert_answers(&mut *tx, id, &new_poll.answers).await?;

        tx.commit().await?;
        tracing::info!(poll_id = id, "poll updated, answers replaced");
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn delete_poll(&self, id: i32) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM answers WHERE poll_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        // Detach voters; the users themselves stay.
        sqlx::query("DELETE FROM poll_user WHERE poll_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        let deleted = sqlx::query("DELETE FROM polls WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        if deleted.rows_affected() == 0 {
            return Err(StoreError::NotFound { id });
        }

        tx.commit().await?;
        tracing::info!(poll_id = id, "poll deleted");
        Ok(())
    }

    async fn get_by_id(&self, id: i32) -> StoreResult<Option<Poll>> {
        let poll = sqlx::query_as::<_, Poll>(
            "SELECT id, question, created_at, updated_at FROM polls WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(poll)
    }

    async fn has_voted(&self, poll_id: i32, user_id: i32) -> StoreResult<bool> {
        let (voted,): (bool,) = sqlx::query_as(
            "SELECT EXISTS(SELECT 1 FROM poll_user WHERE poll_id = $1 AND user_id = $2)",
        )
        .bind(poll_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(voted)
    }

    #[tracing::instrument(skip(self, user), fields(user_id = user.id))]
    async fn record_vote(&self, poll_id: i32, answer_id: i32, user: &User) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;

        // Increment and ownership check in one statement; a concurrently
        // deleted answer leaves nothing to count.
        let counted = sqlx::query(
            "UPDATE answers SET result = result + 1 WHERE id = $1 AND poll_id = $2",
        )
        .bind(answer_id)
        .bind(poll_id)
        .execute(&mut *tx)
        .await?;

        if counted.rows_affected() == 0 {
            let (poll_exists,): (bool,) =
                sqlx::query_as("SELECT EXISTS(SELECT 1 FROM polls WHERE id = $1)")
                    .bind(poll_id)
                    .fetch_one(&mut *tx)
                    .await?;

            tracing::warn!(poll_id, answer_id, "vote rejected: answer not in poll");
            return Err(if poll_exists {
                StoreError::AnswerNotInPoll { poll_id, answer_id }
            } else {
                StoreError::NotFound { id: poll_id }
            });
        }

        // A duplicate link aborts the transaction, undoing the increment.
        sqlx::query("INSERT INTO poll_user (poll_id, user_id) VALUES ($1, $2)")
            .bind(poll_id)
            .bind(user.id)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                let err = StoreError::from_vote_insert(e, poll_id, user.id);
                if matches!(err, StoreError::AlreadyVoted { .. }) {
                    tracing::warn!(poll_id, user_id = user.id, "vote rejected: already voted");
                }
                err
            })?;

        tx.commit().await?;
        tracing::info!(poll_id, answer_id, "vote recorded");
        Ok(())
    }
}
