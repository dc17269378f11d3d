//! Compute-provider abstraction consumed by the fleet controller.
//!
//! The trait mirrors the handful of provider operations the lifecycle logic
//! needs: prefix listing, point lookup, deletion, boot, and name-to-id
//! resolution for images and flavors. Resolution returns `Ok(None)` for
//! "not found" so a miss is an ordinary control path, never an error.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;

use chrono::{DateTime, Utc};

/// Metadata key under which an instance's environment tag is stored at the
/// provider, so it can be recovered after a controller restart.
pub const METADATA_ENVIRONMENT_KEY: &str = "hangar:environment";

/// Provider-reported lifecycle status of a server.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ServerStatus {
    /// Running normally.
    Active,
    /// Still being built.
    Building,
    /// The provider reports the server as failed.
    Error,
    /// Any other status string the provider may emit.
    Other(String),
}

impl ServerStatus {
    /// Parses a provider status string, case-insensitively.
    #[must_use]
    pub fn parse(value: &str) -> Self {
        match value.to_ascii_uppercase().as_str() {
            "ACTIVE" => Self::Active,
            "BUILD" | "BUILDING" => Self::Building,
            "ERROR" => Self::Error,
            _ => Self::Other(value.to_owned()),
        }
    }

    /// Returns true when the provider reports the server as failed.
    #[must_use]
    pub const fn is_error(&self) -> bool {
        matches!(self, Self::Error)
    }
}

/// A provider-side view of a server, as returned by listing or lookup.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ServerRecord {
    /// Provider-assigned identifier.
    pub id: String,
    /// Server name (carries the controller's prefix).
    pub name: String,
    /// Creation timestamp reported by the provider.
    pub created_at: DateTime<Utc>,
    /// Current lifecycle status.
    pub status: ServerStatus,
    /// Concrete image id the server was booted from.
    pub image_id: String,
    /// Concrete flavor id the server runs as.
    pub flavor_id: String,
    /// Free-form metadata attached at boot time.
    pub metadata: BTreeMap<String, String>,
}

impl ServerRecord {
    /// Returns the environment tag recovered from metadata, if present.
    #[must_use]
    pub fn environment(&self) -> &str {
        self.metadata
            .get(METADATA_ENVIRONMENT_KEY)
            .map_or("", String::as_str)
    }
}

/// Parameters for booting a new server.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BootSpec {
    /// Server name; must carry the cluster profile's prefix.
    pub name: String,
    /// Concrete image id to boot from.
    pub image_id: String,
    /// Concrete flavor id to boot as.
    pub flavor_id: String,
    /// Metadata to attach, including the environment tag.
    pub metadata: BTreeMap<String, String>,
}

/// Future returned by provider operations.
pub type ProviderFuture<'a, T, E> = Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'a>>;

/// Minimal interface implemented by compute providers.
///
/// Calls are expected to carry caller-supplied timeouts; no operation here
/// may block indefinitely.
pub trait ComputeProvider {
    /// Provider specific error type returned by operations.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Lists servers whose name starts with the given prefix.
    fn list_prefixed<'a>(
        &'a self,
        name_prefix: &'a str,
    ) -> ProviderFuture<'a, Vec<ServerRecord>, Self::Error>;

    /// Looks up a single server; `Ok(None)` when the provider no longer has it.
    fn get<'a>(&'a self, id: &'a str) -> ProviderFuture<'a, Option<ServerRecord>, Self::Error>;

    /// Deletes a server. Deleting an id the provider no longer has is not an
    /// error.
    fn delete<'a>(&'a self, id: &'a str) -> ProviderFuture<'a, (), Self::Error>;

    /// Boots a new server and returns its provider-side record.
    fn boot<'a>(&'a self, spec: &'a BootSpec) -> ProviderFuture<'a, ServerRecord, Self::Error>;

    /// Resolves an image identifier-or-name to a concrete image id;
    /// `Ok(None)` when no such image exists.
    fn resolve_image_id<'a>(
        &'a self,
        name_or_id: &'a str,
    ) -> ProviderFuture<'a, Option<String>, Self::Error>;

    /// Resolves the id of the generation published immediately before the
    /// newest one for the given image name; `Ok(None)` when there is none.
    fn resolve_previous_image_id<'a>(
        &'a self,
        name_or_id: &'a str,
    ) -> ProviderFuture<'a, Option<String>, Self::Error>;

    /// Resolves a flavor identifier-or-name to a concrete flavor id;
    /// `Ok(None)` when no such flavor exists.
    fn resolve_flavor_id<'a>(
        &'a self,
        name_or_id: &'a str,
    ) -> ProviderFuture<'a, Option<String>, Self::Error>;
}
