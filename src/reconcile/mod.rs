//! Registry reconciliation against the provider.
//!
//! After a restart the registry is empty while instances may still be
//! running. Reconciliation lists the provider's servers under the profile
//! prefix, registers the ones the control plane confirms (recovering the
//! environment tag from metadata), and deletes the ones the control plane
//! never placed. By default the engine refreshes once per process;
//! overlapping invocations are dropped either way.


use std::sync::atomic::{AtomicBool, Ordering};

use crate::config::ClusterProfile;
use crate::latch::RunLatch;
use crate::model::{Agents, Instance};
use crate::provider::{ComputeProvider, ServerRecord};
use crate::registry::InstanceRegistry;

/// Result of asking for a refresh.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RefreshOutcome {
    /// A refresh already ran (or is running); this invocation did nothing.
    Skipped,
    /// The profile carries no prefix, so discovery is unsafe; nothing changed.
    Unconfigured,
    /// The registry was rebuilt from the provider listing.
    Completed {
        /// Confirmed servers found at the provider and registered.
        registered: usize,
        /// Unconfirmed servers deleted as orphans.
        orphans_deleted: usize,
    },
}

/// Rebuilds the registry from the provider's view.
#[derive(Debug)]
pub struct ReconciliationEngine {
    refreshed: AtomicBool,
    running: RunLatch,
    run_once: bool,
}

impl Default for ReconciliationEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ReconciliationEngine {
    /// Creates an engine that refreshes at most once per process.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            refreshed: AtomicBool::new(false),
            running: RunLatch::new(),
            run_once: true,
        }
    }

    /// Creates an engine that refreshes on every invocation.
    #[must_use]
    pub const fn with_rerun() -> Self {
        Self {
            refreshed: AtomicBool::new(false),
            running: RunLatch::new(),
            run_once: false,
        }
    }

    /// Reconciles the registry with a prefix listing at the provider.
    ///
    /// Listed servers the control plane confirms are registered; the rest
    /// are orphans and deleted at the provider, with per-server failures
    /// logged and skipped. A failed listing leaves the once-per-process flag
    /// unset so a later call can retry.
    ///
    /// # Errors
    ///
    /// Propagates the provider error when the listing fails.
    pub async fn refresh<P: ComputeProvider>(
        &self,
        provider: &P,
        registry: &InstanceRegistry,
        profile: &ClusterProfile,
        confirmed: &Agents,
    ) -> Result<RefreshOutcome, P::Error> {
        let Some(_guard) = self.running.try_acquire() else {
            tracing::debug!("refresh already running; dropping invocation");
            return Ok(RefreshOutcome::Skipped);
        };
        if self.run_once && self.refreshed.load(Ordering::Acquire) {
            return Ok(RefreshOutcome::Skipped);
        }
        if !profile.is_configured() {
            tracing::warn!("profile has no prefix; skipping discovery");
            return Ok(RefreshOutcome::Unconfigured);
        }
        let servers = provider.list_prefixed(&profile.vm_prefix).await?;
        let mut registered = 0;
        let mut orphans_deleted = 0;
        for record in servers {
            if confirmed.contains(&record.id) {
                registry.register(recovered_instance(record));
                registered += 1;
                continue;
            }
            // The provider holds a server the control plane never placed.
            match provider.delete(&record.id).await {
                Ok(()) => {
                    tracing::info!(instance_id = %record.id, "deleted orphaned server");
                    orphans_deleted += 1;
                }
                Err(err) => {
                    tracing::warn!(instance_id = %record.id, error = %err, "failed to delete orphaned server");
                }
            }
        }
        self.refreshed.store(true, Ordering::Release);
        tracing::info!(registered, orphans_deleted, "registry reconciled with provider");
        Ok(RefreshOutcome::Completed {
            registered,
            orphans_deleted,
        })
    }
}

fn recovered_instance(record: ServerRecord) -> Instance {
    Instance {
        environment: record.environment().to_owned(),
        id: record.id,
        created_at: record.created_at,
        image: record.image_id,
        flavor: record.flavor_id,
        max_completed_jobs: None,
    }
}
