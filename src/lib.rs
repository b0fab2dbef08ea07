//! Poll storage: polls with a fixed set of answers, one vote per user
//! per poll, and per-poll tallies.

pub mod config;
pub mod db;
pub mod error;
pub mod memory;
pub mod models;
pub mod pagination;
pub mod poll;

pub use config::Config;
pub use error::{StoreError, StoreResult};
pub use memory::MemoryPollStore;
pub use models::{Answer, NewPoll, Poll, PollDisplay, PollListing, PollWithAnswers, TallyRow, User};
pub use pagination::{Paginated, Pagination};
pub use poll::{PgPollStore, PollStore};
