//! Core data model for the fleet controller.
//!
//! Instances are identified by the provider-assigned opaque id and carry the
//! *literal* image and flavor strings from the request that created them; the
//! reuse matcher's staged comparison depends on that literal being preserved.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::config::ClusterProfile;

/// A compute instance known to the controller.
///
/// Owned exclusively by the registry once registered; callers receive clones,
/// never mutable aliases. Immutable after creation except for the
/// completed-jobs cap, which the registry can update in place.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Instance {
    /// Provider-assigned opaque identifier.
    pub id: String,
    /// Creation timestamp reported by the provider.
    pub created_at: DateTime<Utc>,
    /// Environment tag the instance was provisioned for; may be empty.
    pub environment: String,
    /// Image identifier-or-name as requested (literal, unresolved).
    pub image: String,
    /// Flavor identifier-or-name as requested (literal, unresolved).
    pub flavor: String,
    /// Opaque cap on completed jobs, attached but not interpreted here.
    pub max_completed_jobs: Option<u32>,
}

/// A job-creation request arriving from the control plane.
///
/// Image and flavor are optional; when absent, the cluster profile's defaults
/// apply.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
pub struct CreateAgentRequest {
    /// Identity of the job the agent is being created for.
    pub job_id: String,
    /// Requested environment tag, if any.
    #[serde(default)]
    pub environment: Option<String>,
    /// Requested image identifier-or-name, if any.
    #[serde(default)]
    pub image: Option<String>,
    /// Requested flavor identifier-or-name, if any.
    #[serde(default)]
    pub flavor: Option<String>,
    /// Opaque completed-jobs cap to attach to the created instance.
    #[serde(default)]
    pub max_completed_jobs: Option<u32>,
}

impl CreateAgentRequest {
    /// Returns the requested image, falling back to the profile default.
    #[must_use]
    pub fn image_or_default(&self, profile: &ClusterProfile) -> String {
        self.image
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .unwrap_or(profile.default_image.as_str())
            .to_owned()
    }

    /// Returns the requested flavor, falling back to the profile default.
    #[must_use]
    pub fn flavor_or_default(&self, profile: &ClusterProfile) -> String {
        self.flavor
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .unwrap_or(profile.default_flavor.as_str())
            .to_owned()
    }

    /// Returns the requested environment with absent normalised to empty.
    #[must_use]
    pub fn environment_or_empty(&self) -> &str {
        self.environment.as_deref().map_or("", str::trim)
    }
}

/// An instance that has been requested but not yet confirmed registered by
/// the control plane.
///
/// The insertion time is the wrapped instance's creation timestamp.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PendingAgent {
    /// The created but unconfirmed instance.
    pub instance: Instance,
    /// The request that caused its creation.
    pub request: CreateAgentRequest,
}

impl PendingAgent {
    /// Timestamp from which the registration timeout is measured.
    #[must_use]
    pub const fn requested_at(&self) -> DateTime<Utc> {
        self.instance.created_at
    }
}

/// The set of elastic-agent ids the control plane currently confirms.
///
/// Consumed read-only to compute confirmed, orphan, and promotion sets.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Agents(BTreeSet<String>);

impl Agents {
    /// Creates an empty set.
    #[must_use]
    pub const fn new() -> Self {
        Self(BTreeSet::new())
    }

    /// Returns true when the control plane confirms this id.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.0.contains(id)
    }

    /// Adds a confirmed id.
    pub fn insert(&mut self, id: impl Into<String>) {
        self.0.insert(id.into());
    }

    /// Iterates over the confirmed ids in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Number of confirmed ids.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true when no ids are confirmed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<String> for Agents {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> FromIterator<&'a str> for Agents {
    fn from_iter<I: IntoIterator<Item = &'a str>>(iter: I) -> Self {
        Self(iter.into_iter().map(str::to_owned).collect())
    }
}
