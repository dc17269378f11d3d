//! Fleet orchestration: create, reuse, terminate, and the periodic tick.
//!
//! The controller owns the registry, the pending tracker, and the
//! reconciliation engine, and borrows a provider and a directory. The
//! cluster profile is passed per call and treated as immutable for the
//! duration of that call.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::config::ClusterProfile;
use crate::directory::AgentDirectory;
use crate::expiry;
use crate::matcher::{InstanceMatcher, ReuseProposal};
use crate::model::{Agents, CreateAgentRequest, Instance, PendingAgent};
use crate::pending::{PendingAgentTracker, SweepOutcome};
use crate::provider::{BootSpec, ComputeProvider, METADATA_ENVIRONMENT_KEY};
use crate::reconcile::{ReconciliationEngine, RefreshOutcome};
use crate::registry::InstanceRegistry;

/// Errors raised while creating an agent.
#[derive(Debug, Error)]
pub enum CreateError<E: std::error::Error + 'static> {
    /// The requested (or default) image resolved to nothing.
    #[error("image {0:?} is not known to the provider")]
    UnknownImage(String),
    /// The requested (or default) flavor resolved to nothing.
    #[error("flavor {0:?} is not known to the provider")]
    UnknownFlavor(String),
    /// A provider call failed.
    #[error("provider request failed: {0}")]
    Provider(#[from] E),
}

/// Errors raised by a tick.
#[derive(Debug, Error)]
pub enum TickError<PE: std::error::Error + 'static, DE: std::error::Error + 'static> {
    /// The directory listing failed; without the confirmed set every
    /// downstream decision is unsafe, so the whole tick aborts.
    #[error("agent directory listing failed: {0}")]
    Directory(#[source] DE),
    /// A provider call failed.
    #[error("provider request failed: {0}")]
    Provider(#[source] PE),
}

/// What one tick observed and did.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TickReport {
    /// Outcome of the reconciliation refresh.
    pub refresh: RefreshOutcome,
    /// Outcome of the pending sweep.
    pub sweep: SweepOutcome,
    /// Confirmed agents past their time-to-live. A recommendation: the
    /// control plane decides when they drain and stop.
    pub expired: Agents,
    /// Abandoned provider-side servers terminated this tick.
    pub terminated_abandoned: Agents,
}

/// Drives the lifecycle of a fleet of elastic agents.
#[derive(Debug)]
pub struct FleetController<P, D> {
    provider: P,
    directory: D,
    registry: InstanceRegistry,
    pending: PendingAgentTracker,
    engine: ReconciliationEngine,
}

impl<P: ComputeProvider, D: AgentDirectory> FleetController<P, D> {
    /// Creates a controller with an empty registry and a once-per-process
    /// reconciliation engine.
    #[must_use]
    pub fn new(provider: P, directory: D) -> Self {
        Self {
            provider,
            directory,
            registry: InstanceRegistry::new(),
            pending: PendingAgentTracker::new(),
            engine: ReconciliationEngine::new(),
        }
    }

    /// Replaces the reconciliation engine, for deployments that want a full
    /// re-listing on every tick.
    #[must_use]
    pub fn with_engine(mut self, engine: ReconciliationEngine) -> Self {
        self.engine = engine;
        self
    }

    /// The controller's view of existing instances.
    #[must_use]
    pub const fn registry(&self) -> &InstanceRegistry {
        &self.registry
    }

    /// Instances awaiting control-plane confirmation.
    #[must_use]
    pub const fn pending(&self) -> &PendingAgentTracker {
        &self.pending
    }

    /// Boots an instance for the request and starts tracking it as pending.
    ///
    /// The instance keeps the request-literal image and flavor strings so
    /// later reuse matching can compare literals before resolving. The
    /// environment tag is attached as provider metadata for recovery after a
    /// restart.
    ///
    /// # Errors
    ///
    /// Returns [`CreateError::UnknownImage`] or [`CreateError::UnknownFlavor`]
    /// when resolution finds nothing, and [`CreateError::Provider`] when a
    /// provider call fails.
    pub async fn create_agent(
        &self,
        request: &CreateAgentRequest,
        profile: &ClusterProfile,
    ) -> Result<Instance, CreateError<P::Error>> {
        let image = request.image_or_default(profile);
        let flavor = request.flavor_or_default(profile);
        let image_id = self
            .provider
            .resolve_image_id(&image)
            .await?
            .ok_or_else(|| CreateError::UnknownImage(image.clone()))?;
        let flavor_id = self
            .provider
            .resolve_flavor_id(&flavor)
            .await?
            .ok_or_else(|| CreateError::UnknownFlavor(flavor.clone()))?;

        let environment = request.environment_or_empty().to_owned();
        let mut metadata = BTreeMap::new();
        if !environment.is_empty() {
            metadata.insert(METADATA_ENVIRONMENT_KEY.to_owned(), environment.clone());
        }
        let spec = BootSpec {
            name: format!("{}{}", profile.vm_prefix, Uuid::new_v4().simple()),
            image_id,
            flavor_id,
            metadata,
        };
        let record = self.provider.boot(&spec).await?;
        tracing::info!(
            instance_id = %record.id,
            name = %spec.name,
            job_id = %request.job_id,
            "booted instance",
        );

        let instance = Instance {
            id: record.id,
            created_at: record.created_at,
            environment,
            image,
            flavor,
            max_completed_jobs: request.max_completed_jobs,
        };
        self.registry.register(instance.clone());
        self.pending.track(PendingAgent {
            instance: instance.clone(),
            request: request.clone(),
        });
        Ok(instance)
    }

    /// Returns true when the registered instance can serve the request.
    ///
    /// # Errors
    ///
    /// Propagates provider errors raised while resolving identifiers.
    pub async fn can_reuse(
        &self,
        instance_id: &str,
        request: &CreateAgentRequest,
        profile: &ClusterProfile,
    ) -> Result<bool, P::Error> {
        let proposal = ReuseProposal::from_request(request, profile);
        InstanceMatcher::new(&self.registry, &self.provider)
            .matches(instance_id, &proposal)
            .await
    }

    /// Deletes an instance at the provider and forgets it locally.
    ///
    /// Terminating an id the controller does not know is logged and still
    /// attempted at the provider, the instance may predate a restart.
    ///
    /// # Errors
    ///
    /// Propagates the provider error when deletion fails; local state is
    /// untouched in that case.
    pub async fn terminate(&self, instance_id: &str) -> Result<(), P::Error> {
        if !self.registry.contains(instance_id) {
            tracing::warn!(instance_id, "terminating an instance the registry does not know");
        }
        self.provider.delete(instance_id).await?;
        self.registry.remove(instance_id);
        self.pending.remove(instance_id);
        tracing::info!(instance_id, "terminated instance");
        Ok(())
    }

    /// Runs one maintenance pass: refresh, pending sweep, TTL evaluation,
    /// and termination of abandoned servers.
    ///
    /// # Errors
    ///
    /// Returns [`TickError::Directory`] when the confirmed set cannot be
    /// listed and [`TickError::Provider`] when discovery fails. Per-server
    /// termination failures are logged and skipped, not propagated.
    pub async fn tick(
        &self,
        profile: &ClusterProfile,
        now: DateTime<Utc>,
    ) -> Result<TickReport, TickError<P::Error, D::Error>> {
        let confirmed = self
            .directory
            .list_agents()
            .await
            .map_err(TickError::Directory)?;
        let refresh = self
            .engine
            .refresh(&self.provider, &self.registry, profile, &confirmed)
            .await
            .map_err(TickError::Provider)?;
        let sweep = self
            .pending
            .sweep(&self.provider, &self.registry, profile, &confirmed, now)
            .await;
        let expired = expiry::instances_created_after_ttl(profile, &self.registry, &confirmed, now);
        let abandoned = expiry::unregistered_after_timeout(&self.provider, profile, &confirmed, now)
            .await
            .map_err(TickError::Provider)?;
        let terminated_abandoned = self.terminate_abandoned(&abandoned).await;
        Ok(TickReport {
            refresh,
            sweep,
            expired,
            terminated_abandoned,
        })
    }

    async fn terminate_abandoned(&self, abandoned: &Agents) -> Agents {
        let mut terminated = Agents::new();
        for id in abandoned.iter() {
            match self.terminate(id).await {
                Ok(()) => terminated.insert(id),
                Err(err) => {
                    tracing::warn!(instance_id = %id, error = %err, "failed to terminate abandoned server");
                }
            }
        }
        terminated
    }
}
