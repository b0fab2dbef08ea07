// src/memory.rs
//! In-process `PollStore`. Every operation holds the lock for its whole
//! duration, so multi-step writes are all-or-nothing like the Postgres ones.

use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::error::{StoreError, StoreResult};
use crate::models::{Answer, NewPoll, Poll, PollDisplay, PollListing, PollWithAnswers, User};
use crate::pagination::{Paginated, Pagination};
use crate::poll::PollStore;

#[derive(Default)]
struct Tables {
    next_poll_id: i32,
    next_answer_id: i32,
    // insertion order is creation order
    polls: Vec<Poll>,
    answers: Vec<Answer>,
    // (poll_id, user_id)
    votes: BTreeSet<(i32, i32)>,
}

impl Tables {
    fn poll(&self, id: i32) -> StoreResult<&Poll> {
        self.polls
            .iter()
            .find(|p| p.id == id)
            .ok_or(StoreError::NotFound { id })
    }

    fn answers_of(&self, poll_id: i32) -> Vec<Answer> {
        self.answers
            .iter()
            .filter(|a| a.poll_id == poll_id)
            .cloned()
            .collect()
    }

    fn insert_answers(&mut self, poll_id: i32, labels: &[String]) {
        for label in labels {
            self.next_answer_id += 1;
            self.answers.push(Answer {
                id: self.next_answer_id,
                poll_id,
                answer: label.clone(),
                result: 0,
            });
        }
    }
}

#[derive(Default)]
pub struct MemoryPollStore {
    tables: RwLock<Tables>,
}

impl MemoryPollStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PollStore for MemoryPollStore {
    async fn list_polls(&self, page: Pagination) -> StoreResult<PollListing> {
        let tables = self.tables.read().await;

        let items = tables
            .polls
            .iter()
            .skip(page.offset() as usize)
            .take(page.limit() as usize)
            .cloned()
            .collect();

        let voted_questions = tables
            .polls
            .iter()
            .filter(|p| tables.votes.iter().any(|(poll_id, _)| *poll_id == p.id))
            .map(|p| p.question.clone())
            .collect();

        Ok(PollListing {
            polls: Paginated {
                items,
                total: tables.polls.len() as i64,
                page: page.page,
                per_page: page.per_page,
            },
            voted_questions,
        })
    }

    async fn create_poll(&self, new_poll: &NewPoll) -> StoreResult<Poll> {
        new_poll.validate()?;

        let mut tables = self.tables.write().await;
        tables.next_poll_id += 1;
        let now = Utc::now();
        let poll = Poll {
            id: tables.next_poll_id,
            question: new_poll.question.clone(),
            created_at: now,
            updated_at: now,
        };
        tables.polls.push(poll.clone());
        tables.insert_answers(poll.id, &new_poll.answers);

        tracing::info!(poll_id = poll.id, "poll created");
        Ok(poll)
    }

    async fn poll_for_display(&self, id: i32, user: Option<&User>) -> StoreResult<PollDisplay> {
        let tables = self.tables.read().await;
        let poll = tables.poll(id)?.clone();
        let has_voted = user.is_some_and(|u| tables.votes.contains(&(id, u.id)));
        Ok(PollDisplay::new(poll, tables.answers_of(id), has_voted))
    }

    async fn poll_for_edit(&self, id: i32) -> StoreResult<PollWithAnswers> {
        let tables = self.tables.read().await;
        let poll = tables.poll(id)?.clone();
        Ok(PollWithAnswers {
            poll,
            answers: tables.answers_of(id),
        })
    }

    async fn has_any_votes(&self, id: i32) -> StoreResult<bool> {
        let tables = self.tables.read().await;
        tables.poll(id)?;
        Ok(tables.votes.iter().any(|(poll_id, _)| *poll_id == id))
    }

    async fn update_poll(&self, id: i32, new_poll: &NewPoll) -> StoreResult<()> {
        new_poll.validate()?;

        let mut tables = self.tables.write().await;
        let poll = tables
            .polls
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or(StoreError::NotFound { id })?;
        poll.question = new_poll.question.clone();
        poll.updated_at = Utc::now();

        tables.answers.retain(|a| a.poll_id != id);
        tables.insert_answers(id, &new_poll.answers);

        tracing::info!(poll_id = id, "poll updated, answers replaced");
        Ok(())
    }

    async fn delete_poll(&self, id: i32) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        tables.poll(id)?;

        tables.answers.retain(|a| a.poll_id != id);
        tables.votes.retain(|(poll_id, _)| *poll_id != id);
        tables.polls.retain(|p| p.id != id);

        tracing::info!(poll_id = id, "poll deleted");
        Ok(())
    }

    async fn get_by_id(&self, id: i32) -> StoreResult<Option<Poll>> {
        let tables = self.tables.read().await;
        Ok(tables.polls.iter().find(|p| p.id == id).cloned())
    }

    async fn has_voted(&self, poll_id: i32, user_id: i32) -> StoreResult<bool> {
        Ok(self.tables.read().await.votes.contains(&(poll_id, user_id)))
    }

    async fn record_vote(&self, poll_id: i32, answer_id: i32, user: &User) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        tables.poll(poll_id)?;

        let Some(idx) = tables
            .answers
            .iter()
            .position(|a| a.id == answer_id && a.poll_id == poll_id)
        else {
            tracing::warn!(poll_id, answer_id, "vote rejected: answer not in poll");
            return Err(StoreError::AnswerNotInPoll { poll_id, answer_id });
        };

        if !tables.votes.insert((poll_id, user.id)) {
            tracing::warn!(poll_id, user_id = user.id, "vote rejected: already voted");
            return Err(StoreError::AlreadyVoted {
                poll_id,
                user_id: user.id,
            });
        }
        tables.answers[idx].result += 1;

        tracing::info!(poll_id, answer_id, "vote recorded");
        Ok(())
    }
}
