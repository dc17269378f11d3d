//! Control-plane agent directory.
//!
//! The directory is consumed read-only by the core to compute confirmed,
//! orphan, and promotion sets. The HTTP implementation additionally exposes
//! disable/delete calls used by the binary when acting on the controller's
//! expiry recommendations; the core itself never calls them.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::Agents;

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Future returned by directory operations.
pub type DirectoryFuture<'a, T, E> = Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'a>>;

/// Read-only view of the control plane's agent directory.
pub trait AgentDirectory {
    /// Directory specific error type.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Lists the elastic-agent ids the control plane currently confirms.
    ///
    /// Failures here must be propagated: promotion and orphan decisions are
    /// unsafe to make without the confirmed set.
    fn list_agents(&self) -> DirectoryFuture<'_, Agents, Self::Error>;
}

/// Wire representation of a directory entry.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
struct AgentEntry {
    elastic_agent_id: String,
}

/// Errors raised by the HTTP agent directory.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum DirectoryError {
    /// Raised when the control plane answers with a non-success status.
    #[error("control plane request to {endpoint} failed with status {status}")]
    UnexpectedStatus {
        /// Endpoint path that was called.
        endpoint: String,
        /// HTTP status code returned.
        status: u16,
    },
    /// Raised when the response body cannot be parsed.
    #[error("failed to parse {endpoint} response: {message}")]
    Parse {
        /// Endpoint path that was called.
        endpoint: String,
        /// Parser error message.
        message: String,
    },
    /// Wrapper for transport level failures.
    #[error("control plane transport error: {message}")]
    Transport {
        /// Message reported by the HTTP client.
        message: String,
    },
}

impl From<reqwest::Error> for DirectoryError {
    fn from(value: reqwest::Error) -> Self {
        Self::Transport {
            message: value.to_string(),
        }
    }
}

/// Agent directory backed by the control plane's HTTP API.
#[derive(Clone, Debug)]
pub struct HttpAgentDirectory {
    http: reqwest::Client,
    base_url: String,
}

impl HttpAgentDirectory {
    /// Creates a directory client for the given control plane base URL.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn fetch_agents(&self) -> Result<Agents, DirectoryError> {
        let endpoint = self.endpoint("/api/elastic/agents");
        let response = self.http.get(&endpoint).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(DirectoryError::UnexpectedStatus {
                endpoint,
                status: status.as_u16(),
            });
        }
        let entries: Vec<AgentEntry> =
            response
                .json()
                .await
                .map_err(|err| DirectoryError::Parse {
                    endpoint,
                    message: err.to_string(),
                })?;
        Ok(entries
            .into_iter()
            .map(|entry| entry.elastic_agent_id)
            .collect())
    }

    async fn post_agent_ids(&self, path: &str, ids: &[String]) -> Result<(), DirectoryError> {
        if ids.is_empty() {
            return Ok(());
        }
        let endpoint = self.endpoint(path);
        let body: Vec<AgentEntry> = ids
            .iter()
            .map(|id| AgentEntry {
                elastic_agent_id: id.clone(),
            })
            .collect();
        let response = self.http.post(&endpoint).json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(DirectoryError::UnexpectedStatus {
                endpoint,
                status: status.as_u16(),
            });
        }
        Ok(())
    }

    /// Asks the control plane to disable the given agents. A no-op on empty
    /// input.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError`] when the request fails or the control plane
    /// answers with a non-success status.
    pub async fn disable_agents(&self, ids: &[String]) -> Result<(), DirectoryError> {
        self.post_agent_ids("/api/elastic/agents/disable", ids).await
    }

    /// Asks the control plane to delete the given agents. A no-op on empty
    /// input.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError`] when the request fails or the control plane
    /// answers with a non-success status.
    pub async fn delete_agents(&self, ids: &[String]) -> Result<(), DirectoryError> {
        self.post_agent_ids("/api/elastic/agents/delete", ids).await
    }
}

impl AgentDirectory for HttpAgentDirectory {
    type Error = DirectoryError;

    fn list_agents(&self) -> DirectoryFuture<'_, Agents, Self::Error> {
        Box::pin(async move { self.fetch_agents().await })
    }
}
