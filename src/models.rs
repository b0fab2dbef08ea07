// models.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};
use crate::pagination::Paginated;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Poll {
    pub id: i32,
    pub question: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One option of a poll with its running vote counter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Answer {
    pub id: i32,
    pub poll_id: i32,
    pub answer: String,
    pub result: i32,
}

/// The authenticated caller, as handed over by the auth layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: i32,
    pub name: String,
    pub email: String,
}

/// Input for creating or replacing a poll. Answer labels keep their order.
#[derive(Debug, Clone, Deserialize)]
pub struct NewPoll {
    pub question: String,
    pub answers: Vec<String>,
}

impl NewPoll {
    pub fn new<Q, I, S>(question: Q, answers: I) -> Self
    where
        Q: Into<String>,
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            question: question.into(),
            answers: answers.into_iter().map(Into::into).collect(),
        }
    }

    pub fn validate(&self) -> StoreResult<()> {
        if self.answers.is_empty() {
            return Err(StoreError::NoAnswers);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PollWithAnswers {
    pub poll: Poll,
    pub answers: Vec<Answer>,
}

/// A poll as shown to a voter: answers, the vote total and whether
/// the current user already took part.
#[derive(Debug, Clone, Serialize)]
pub struct PollDisplay {
    pub poll: Poll,
    pub answers: Vec<Answer>,
    pub total_votes: i64,
    pub has_voted: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct TallyRow {
    pub answer: String,
    pub result: i32,
    pub percentage: f64,
}

impl PollDisplay {
    /// The vote total covers this poll's answers only.
    pub fn new(poll: Poll, answers: Vec<Answer>, has_voted: bool) -> Self {
        let total_votes = answers.iter().map(|a| a.result as i64).sum();
        Self {
            poll,
            answers,
            total_votes,
            has_voted,
        }
    }

    pub fn percentage(&self, answer: &Answer) -> f64 {
        if self.total_votes == 0 {
            return 0.0;
        }
        answer.result as f64 * 100.0 / self.total_votes as f64
    }

    pub fn tally(&self) -> Vec<TallyRow> {
        self.answers
            .iter()
            .map(|a| TallyRow {
                answer: a.answer.clone(),
                result: a.result,
                percentage: self.percentage(a),
            })
            .collect()
    }
}

/// A page of polls plus the questions that have received at least one vote.
#[derive(Debug, Clone, Serialize)]
pub struct PollListing {
    pub polls: Paginated<Poll>,
    pub voted_questions: Vec<String>,
}
