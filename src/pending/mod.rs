//! Tracking of created-but-unconfirmed instances.
//!
//! An instance enters the tracker when it is booted and leaves when the
//! control plane confirms it (promotion), when it exceeds the registration
//! timeout (termination), or when the provider no longer knows it. Sweeps
//! are serialised by a latch: an invocation arriving while one is running is
//! dropped, not queued.


use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::config::ClusterProfile;
use crate::latch::RunLatch;
use crate::model::{Agents, PendingAgent};
use crate::provider::ComputeProvider;
use crate::registry::InstanceRegistry;

/// Counters describing what one sweep did.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct SweepStats {
    /// Entries removed because the control plane confirmed them.
    pub promoted: usize,
    /// Entries terminated for exceeding the registration timeout.
    pub timed_out: usize,
    /// Entries dropped for an error status; also deleted at the provider
    /// when `delete_error_instances` is set.
    pub errored: usize,
    /// Entries dropped because the provider no longer knows them.
    pub vanished: usize,
    /// Entries left in place because a provider call failed.
    pub provider_failures: usize,
    /// Entries still pending after the sweep.
    pub remaining: usize,
}

/// Result of asking for a sweep.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SweepOutcome {
    /// Another sweep was already running; this invocation did nothing.
    Skipped,
    /// The sweep ran to completion.
    Completed(SweepStats),
}

/// Tracker of instances awaiting control-plane confirmation.
#[derive(Debug, Default)]
pub struct PendingAgentTracker {
    pending: DashMap<String, PendingAgent>,
    sweep_latch: RunLatch,
}

impl PendingAgentTracker {
    /// Creates an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts tracking an agent. A duplicate id keeps the earlier entry and
    /// its timestamp; returns false in that case.
    pub fn track(&self, agent: PendingAgent) -> bool {
        match self.pending.entry(agent.instance.id.clone()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(agent);
                true
            }
        }
    }

    /// Returns true when the id is currently pending.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.pending.contains_key(id)
    }

    /// Stops tracking an id, returning the entry if it was pending.
    pub fn remove(&self, id: &str) -> Option<PendingAgent> {
        self.pending.remove(id).map(|(_, agent)| agent)
    }

    /// Number of pending entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Returns true when nothing is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Sweeps the pending set against the confirmed agents and the provider.
    ///
    /// Confirmed entries are promoted out of the tracker. The rest are looked
    /// up at the provider: vanished entries are dropped from tracker and
    /// registry, error-state entries are dropped (and deleted when the
    /// profile says so), and entries older than the registration timeout are
    /// terminated. Termination is fire-and-forget: the entry is dropped
    /// before the delete is attempted and a failing delete is only logged.
    /// A failed lookup leaves the affected entry pending for the next sweep.
    pub async fn sweep<P: ComputeProvider>(
        &self,
        provider: &P,
        registry: &InstanceRegistry,
        profile: &ClusterProfile,
        confirmed: &Agents,
        now: DateTime<Utc>,
    ) -> SweepOutcome {
        let Some(_guard) = self.sweep_latch.try_acquire() else {
            tracing::debug!("pending sweep already running; dropping invocation");
            return SweepOutcome::Skipped;
        };
        let mut stats = SweepStats::default();
        let ids: Vec<String> = self.pending.iter().map(|entry| entry.key().clone()).collect();
        for id in ids {
            let Some(agent) = self.pending.get(&id).map(|entry| entry.value().clone()) else {
                continue;
            };
            if confirmed.contains(&id) {
                self.pending.remove(&id);
                stats.promoted += 1;
                tracing::info!(instance_id = %id, "pending agent confirmed by the control plane");
                continue;
            }
            self.classify(provider, registry, profile, &agent, now, &mut stats)
                .await;
        }
        stats.remaining = self.pending.len();
        SweepOutcome::Completed(stats)
    }

    async fn classify<P: ComputeProvider>(
        &self,
        provider: &P,
        registry: &InstanceRegistry,
        profile: &ClusterProfile,
        agent: &PendingAgent,
        now: DateTime<Utc>,
        stats: &mut SweepStats,
    ) {
        let id = agent.instance.id.as_str();
        let fetched = match provider.get(id).await {
            Ok(fetched) => fetched,
            Err(err) => {
                tracing::warn!(instance_id = %id, error = %err, "pending lookup failed; will retry");
                stats.provider_failures += 1;
                return;
            }
        };
        let Some(record) = fetched else {
            tracing::warn!(instance_id = %id, "pending instance vanished at the provider");
            self.pending.remove(id);
            registry.remove(id);
            stats.vanished += 1;
            return;
        };
        if record.status.is_error() {
            // The drop is unconditional; the policy only scopes the delete.
            self.pending.remove(id);
            registry.remove(id);
            stats.errored += 1;
            if profile.delete_error_instances {
                match provider.delete(id).await {
                    Ok(()) => {
                        tracing::info!(instance_id = %id, "deleted error-state pending instance");
                    }
                    Err(err) => {
                        tracing::warn!(instance_id = %id, error = %err, "failed to delete error-state instance");
                    }
                }
            } else {
                tracing::warn!(instance_id = %id, "dropping error-state pending instance");
            }
            return;
        }
        if now - agent.requested_at() > profile.pending_register_timeout() {
            self.pending.remove(id);
            registry.remove(id);
            stats.timed_out += 1;
            match provider.delete(id).await {
                Ok(()) => {
                    tracing::info!(
                        instance_id = %id,
                        timeout_minutes = profile.agent_pending_register_timeout_minutes,
                        "terminated instance that never registered",
                    );
                }
                Err(err) => {
                    tracing::warn!(instance_id = %id, error = %err, "failed to terminate timed-out instance");
                }
            }
        }
    }
}
