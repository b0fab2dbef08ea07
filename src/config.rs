// src/config.rs
use std::env;

use crate::error::{StoreError, StoreResult};
use crate::pagination::{Pagination, DEFAULT_PER_PAGE};

const DEFAULT_MAX_CONNECTIONS: u32 = 5;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub max_connections: u32,
    pub polls_per_page: u32,
}

impl Config {
    /// Load `.env` if present, then read the process environment.
    pub fn from_env() -> StoreResult<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> StoreResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL")
            .filter(|url| !url.is_empty())
            .ok_or_else(|| StoreError::Config("DATABASE_URL must be set".into()))?;

        Ok(Self {
            database_url,
            max_connections: parse_or(&lookup, "DATABASE_MAX_CONNECTIONS", DEFAULT_MAX_CONNECTIONS)?,
            polls_per_page: parse_or(&lookup, "POLLS_PER_PAGE", DEFAULT_PER_PAGE)?,
        })
    }

    /// First page at the configured size.
    pub fn first_page(&self) -> Pagination {
        Pagination::new(1, self.polls_per_page)
    }
}

fn parse_or<F>(lookup: &F, key: &str, default: u32) -> StoreResult<u32>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => match raw.parse::<u32>() {
            Ok(value) if value > 0 => Ok(value),
            _ => Err(StoreError::Config(format!(
                "{key} must be a positive number, got {raw:?}"
            ))),
        },
    }
}
