//! OpenStack-compatible compute provider.
//!
//! Talks to a Nova-style API with a pre-issued token; Keystone credential
//! flows are out of scope. Image and flavor resolution accepts either a
//! concrete id or a name. Names can be republished, so a name resolves to
//! the newest matching image and the generation published immediately before
//! it is available as the "previous" id. Resolved image ids are cached under
//! a configurable TTL to keep reuse matching off the image API's hot path.

#[cfg(test)]
mod tests;
mod wire;

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::provider::{BootSpec, ComputeProvider, ProviderFuture, ServerRecord, ServerStatus};

use wire::{
    BootRequest, BootWire, CreatedResponse, FlavorWire, FlavorsResponse, ImageWire,
    ImagesResponse, ServerResponse, ServerWire, ServersResponse,
};

const HTTP_TIMEOUT: StdDuration = StdDuration::from_secs(30);
const AUTH_HEADER: &str = "X-Auth-Token";

/// Errors raised by the compute API client.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum OpenStackError {
    /// Raised when the API answers with a non-success status.
    #[error("compute API request to {endpoint} failed with status {status}")]
    UnexpectedStatus {
        /// Endpoint path that was called.
        endpoint: String,
        /// HTTP status code returned.
        status: u16,
    },
    /// Raised when a response body cannot be parsed.
    #[error("failed to parse {endpoint} response: {message}")]
    Parse {
        /// Endpoint path that was called.
        endpoint: String,
        /// Parser error message.
        message: String,
    },
    /// Raised when a freshly created server cannot be fetched back.
    #[error("created server {id} is missing from the compute API")]
    CreatedServerMissing {
        /// Id the create call returned.
        id: String,
    },
    /// Wrapper for transport level failures.
    #[error("compute API transport error: {message}")]
    Transport {
        /// Message reported by the HTTP client.
        message: String,
    },
}

impl From<reqwest::Error> for OpenStackError {
    fn from(value: reqwest::Error) -> Self {
        Self::Transport {
            message: value.to_string(),
        }
    }
}

#[derive(Clone, Debug)]
struct CachedId {
    id: String,
    resolved_at: DateTime<Utc>,
}

/// Compute provider backed by an OpenStack-compatible HTTP API.
#[derive(Debug)]
pub struct OpenStackProvider {
    http: reqwest::Client,
    compute_url: String,
    auth_token: String,
    cache_ttl: Duration,
    image_cache: Mutex<HashMap<String, CachedId>>,
}

impl OpenStackProvider {
    /// Creates a client for the given compute API base URL and token.
    #[must_use]
    pub fn new(
        compute_url: impl Into<String>,
        auth_token: impl Into<String>,
        cache_ttl: Duration,
    ) -> Self {
        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            http,
            compute_url: compute_url.into().trim_end_matches('/').to_owned(),
            auth_token: auth_token.into(),
            cache_ttl,
            image_cache: Mutex::new(HashMap::new()),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.compute_url)
    }

    fn cache(&self) -> MutexGuard<'_, HashMap<String, CachedId>> {
        self.image_cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn cached_id(&self, key: &str) -> Option<String> {
        self.cache()
            .get(key)
            .filter(|entry| Utc::now() - entry.resolved_at < self.cache_ttl)
            .map(|entry| entry.id.clone())
    }

    fn remember_id(&self, key: &str, id: &str) {
        self.cache().insert(
            key.to_owned(),
            CachedId {
                id: id.to_owned(),
                resolved_at: Utc::now(),
            },
        );
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, OpenStackError> {
        let endpoint = self.endpoint(path);
        let response = self
            .http
            .get(&endpoint)
            .header(AUTH_HEADER, &self.auth_token)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(OpenStackError::UnexpectedStatus {
                endpoint,
                status: status.as_u16(),
            });
        }
        response.json().await.map_err(|err| OpenStackError::Parse {
            endpoint,
            message: err.to_string(),
        })
    }

    async fn list_servers(&self, name_prefix: &str) -> Result<Vec<ServerRecord>, OpenStackError> {
        let listing: ServersResponse = self.get_json("/servers/detail").await?;
        Ok(listing
            .servers
            .into_iter()
            .filter(|server| server.name.starts_with(name_prefix))
            .map(record_from)
            .collect())
    }

    async fn get_server(&self, id: &str) -> Result<Option<ServerRecord>, OpenStackError> {
        let endpoint = self.endpoint(&format!("/servers/{id}"));
        let response = self
            .http
            .get(&endpoint)
            .header(AUTH_HEADER, &self.auth_token)
            .send()
            .await?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(OpenStackError::UnexpectedStatus {
                endpoint,
                status: status.as_u16(),
            });
        }
        let body: ServerResponse =
            response.json().await.map_err(|err| OpenStackError::Parse {
                endpoint,
                message: err.to_string(),
            })?;
        Ok(Some(record_from(body.server)))
    }

    async fn delete_server(&self, id: &str) -> Result<(), OpenStackError> {
        let endpoint = self.endpoint(&format!("/servers/{id}"));
        let response = self
            .http
            .delete(&endpoint)
            .header(AUTH_HEADER, &self.auth_token)
            .send()
            .await?;
        let status = response.status();
        // Deleting a server the API no longer has is not an error.
        if status == StatusCode::NOT_FOUND || status.is_success() {
            return Ok(());
        }
        Err(OpenStackError::UnexpectedStatus {
            endpoint,
            status: status.as_u16(),
        })
    }

    async fn boot_server(&self, spec: &BootSpec) -> Result<ServerRecord, OpenStackError> {
        let endpoint = self.endpoint("/servers");
        let request = BootRequest {
            server: BootWire {
                name: spec.name.clone(),
                image_ref: spec.image_id.clone(),
                flavor_ref: spec.flavor_id.clone(),
                metadata: spec.metadata.clone().into_iter().collect(),
            },
        };
        let response = self
            .http
            .post(&endpoint)
            .header(AUTH_HEADER, &self.auth_token)
            .json(&request)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(OpenStackError::UnexpectedStatus {
                endpoint,
                status: status.as_u16(),
            });
        }
        let created: CreatedResponse =
            response.json().await.map_err(|err| OpenStackError::Parse {
                endpoint,
                message: err.to_string(),
            })?;
        // Create responses carry only the id; fetch the full record back.
        match self.get_server(&created.server.id).await? {
            Some(record) => Ok(record),
            None => Err(OpenStackError::CreatedServerMissing {
                id: created.server.id,
            }),
        }
    }

    async fn image_id(&self, name_or_id: &str) -> Result<Option<String>, OpenStackError> {
        if let Some(id) = self.cached_id(name_or_id) {
            return Ok(Some(id));
        }
        let listing: ImagesResponse = self.get_json("/images/detail").await?;
        let resolved = newest_image_id(&listing.images, name_or_id);
        if let Some(id) = &resolved {
            self.remember_id(name_or_id, id);
        }
        Ok(resolved)
    }

    async fn previous_image(&self, name_or_id: &str) -> Result<Option<String>, OpenStackError> {
        let key = format!("previous:{name_or_id}");
        if let Some(id) = self.cached_id(&key) {
            return Ok(Some(id));
        }
        let listing: ImagesResponse = self.get_json("/images/detail").await?;
        let resolved = previous_image_id(&listing.images, name_or_id);
        if let Some(id) = &resolved {
            self.remember_id(&key, id);
        }
        Ok(resolved)
    }

    async fn flavor_id(&self, name_or_id: &str) -> Result<Option<String>, OpenStackError> {
        let listing: FlavorsResponse = self.get_json("/flavors/detail").await?;
        Ok(matching_flavor_id(&listing.flavors, name_or_id))
    }
}

fn record_from(server: ServerWire) -> ServerRecord {
    ServerRecord {
        status: ServerStatus::parse(&server.status),
        id: server.id,
        name: server.name,
        created_at: server.created,
        image_id: server.image.id,
        flavor_id: server.flavor.id,
        metadata: server.metadata.into_iter().collect::<BTreeMap<_, _>>(),
    }
}

/// Resolves a name-or-id against an image listing. An exact id wins; a name
/// resolves to the newest matching image.
fn newest_image_id(images: &[ImageWire], name_or_id: &str) -> Option<String> {
    if images.iter().any(|image| image.id == name_or_id) {
        return Some(name_or_id.to_owned());
    }
    named_newest_first(images, name_or_id)
        .first()
        .map(|image| image.id.clone())
}

/// Resolves the generation published immediately before the newest one. An
/// exact id names one concrete generation and so has no previous.
fn previous_image_id(images: &[ImageWire], name_or_id: &str) -> Option<String> {
    named_newest_first(images, name_or_id)
        .get(1)
        .map(|image| image.id.clone())
}

fn named_newest_first<'a>(images: &'a [ImageWire], name: &str) -> Vec<&'a ImageWire> {
    let mut matching: Vec<&ImageWire> =
        images.iter().filter(|image| image.name == name).collect();
    matching.sort_by(|a, b| b.created.cmp(&a.created));
    matching
}

fn matching_flavor_id(flavors: &[FlavorWire], name_or_id: &str) -> Option<String> {
    flavors
        .iter()
        .find(|flavor| flavor.id == name_or_id || flavor.name == name_or_id)
        .map(|flavor| flavor.id.clone())
}

impl ComputeProvider for OpenStackProvider {
    type Error = OpenStackError;

    fn list_prefixed<'a>(
        &'a self,
        name_prefix: &'a str,
    ) -> ProviderFuture<'a, Vec<ServerRecord>, Self::Error> {
        Box::pin(self.list_servers(name_prefix))
    }

    fn get<'a>(&'a self, id: &'a str) -> ProviderFuture<'a, Option<ServerRecord>, Self::Error> {
        Box::pin(self.get_server(id))
    }

    fn delete<'a>(&'a self, id: &'a str) -> ProviderFuture<'a, (), Self::Error> {
        Box::pin(self.delete_server(id))
    }

    fn boot<'a>(&'a self, spec: &'a BootSpec) -> ProviderFuture<'a, ServerRecord, Self::Error> {
        Box::pin(self.boot_server(spec))
    }

    fn resolve_image_id<'a>(
        &'a self,
        name_or_id: &'a str,
    ) -> ProviderFuture<'a, Option<String>, Self::Error> {
        Box::pin(self.image_id(name_or_id))
    }

    fn resolve_previous_image_id<'a>(
        &'a self,
        name_or_id: &'a str,
    ) -> ProviderFuture<'a, Option<String>, Self::Error> {
        Box::pin(self.previous_image(name_or_id))
    }

    fn resolve_flavor_id<'a>(
        &'a self,
        name_or_id: &'a str,
    ) -> ProviderFuture<'a, Option<String>, Self::Error> {
        Box::pin(self.flavor_id(name_or_id))
    }
}
