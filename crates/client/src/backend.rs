//! Calls to the backend's HTTP API.
//!
//! The monitor never depends on these succeeding. They feed the
//! [`caches`](crate::cache) and start scenarios; the event stream is the
//! only thing that moves the ledger.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use txlens_core::IsolationLevel;

use crate::error::Error;

/// Row of the backend's `users` table.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct User {
    pub id: u64,
    pub name: String,
    pub balance: f64,
}

/// Anomaly demonstrations the backend can run on request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Scenario {
    /// One transaction updates a balance and rolls back after a pause;
    /// a second, read-uncommitted transaction reads the uncommitted value
    /// in between.
    DirtyRead { user_id: u64, amount: f64 },
}

impl Scenario {
    /// Path segment under `/api/scenarios/`.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::DirtyRead { .. } => "dirty-read",
        }
    }

    #[must_use]
    pub fn payload(&self) -> Value {
        match self {
            Self::DirtyRead { user_id, amount } => json!({
                "user_id": user_id,
                "amount": amount,
            }),
        }
    }
}

/// How the level is spelled in the body of `POST /api/isolation-level`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum LevelSpelling {
    /// `READ-UNCOMMITTED`, the spelling the backend reports levels in.
    #[default]
    Hyphenated,
    /// `READ UNCOMMITTED`, for backends that splice the value into a
    /// `SET TRANSACTION ISOLATION LEVEL` statement.
    Sql,
}

impl LevelSpelling {
    #[must_use]
    pub const fn spell(self, level: IsolationLevel) -> &'static str {
        match self {
            Self::Hyphenated => level.as_str(),
            Self::Sql => level.as_sql(),
        }
    }
}

/// Request/response collaborator for everything outside the event stream.
#[async_trait]
pub trait BackendApi: Send + Sync + 'static {
    async fn fetch_users(&self) -> Result<Vec<User>, Error>;

    async fn fetch_isolation_level(&self) -> Result<IsolationLevel, Error>;

    /// Start a scenario. Its effects arrive later, as stream events.
    async fn run_scenario(&self, scenario: &Scenario) -> Result<(), Error>;

    async fn set_isolation_level(&self, level: IsolationLevel) -> Result<(), Error>;
}

#[derive(Deserialize)]
struct IsolationLevelResponse {
    isolation_level: String,
}

/// [`BackendApi`] over the backend's JSON endpoints.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
    level_spelling: LevelSpelling,
}

impl HttpBackend {
    /// # Errors
    ///
    /// Fails if the HTTP client cannot be built (TLS backend unavailable).
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            level_spelling: LevelSpelling::default(),
        })
    }

    #[must_use]
    pub fn with_level_spelling(mut self, level_spelling: LevelSpelling) -> Self {
        self.level_spelling = level_spelling;
        self
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/api/{path}", self.base_url)
    }

    fn check(endpoint: String, response: reqwest::Response) -> Result<reqwest::Response, Error> {
        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            tracing::warn!(%endpoint, %status, "backend rejected request");
            Err(Error::Status {
                endpoint,
                status: status.as_u16(),
            })
        }
    }
}

#[async_trait]
impl BackendApi for HttpBackend {
    async fn fetch_users(&self) -> Result<Vec<User>, Error> {
        let endpoint = self.endpoint("users");
        let response = self.client.get(&endpoint).send().await?;
        let users: Vec<User> = Self::check(endpoint, response)?.json().await?;
        tracing::debug!(users = users.len(), "fetched users");
        Ok(users)
    }

    async fn fetch_isolation_level(&self) -> Result<IsolationLevel, Error> {
        let endpoint = self.endpoint("isolation-level");
        let response = self.client.get(&endpoint).send().await?;
        let body: IsolationLevelResponse = Self::check(endpoint, response)?.json().await?;
        Ok(body.isolation_level.parse()?)
    }

    async fn run_scenario(&self, scenario: &Scenario) -> Result<(), Error> {
        let endpoint = self.endpoint(&format!("scenarios/{}", scenario.name()));
        tracing::info!(scenario = scenario.name(), "starting scenario");
        let response = self
            .client
            .post(&endpoint)
            .json(&scenario.payload())
            .send()
            .await?;
        Self::check(endpoint, response)?;
        Ok(())
    }

    async fn set_isolation_level(&self, level: IsolationLevel) -> Result<(), Error> {
        let endpoint = self.endpoint("isolation-level");
        let response = self
            .client
            .post(&endpoint)
            .json(&json!({ "level": self.level_spelling.spell(level) }))
            .send()
            .await?;
        Self::check(endpoint, response)?;
        tracing::info!(%level, "isolation level changed");
        Ok(())
    }
}
