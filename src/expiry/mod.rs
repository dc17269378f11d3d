//! Age-based expiry policies.
//!
//! Two policies exist. Confirmed agents expire after a time-to-live, with
//! optional per-evaluation jitter so a co-created cohort does not expire as
//! one thundering herd. Provider-side servers carrying the profile prefix
//! that never became confirmed agents are abandoned once older than the
//! non-jittered minimum TTL.

#[cfg(test)]
mod tests;

use chrono::{DateTime, Duration, Utc};
use rand::Rng;

use crate::config::ClusterProfile;
use crate::model::Agents;
use crate::provider::ComputeProvider;
use crate::registry::InstanceRegistry;

/// Picks the time-to-live in minutes for one evaluation.
///
/// Jitter applies only when the maximum exceeds the minimum; otherwise the
/// minimum applies exactly.
#[must_use]
pub fn ttl_minutes(min_minutes: i64, max_minutes: i64) -> i64 {
    if max_minutes > min_minutes {
        rand::thread_rng().gen_range(min_minutes..=max_minutes)
    } else {
        min_minutes
    }
}

fn effective_ttl(profile: &ClusterProfile) -> Duration {
    Duration::minutes(ttl_minutes(
        profile.agent_ttl_min_minutes,
        profile.agent_ttl_max_minutes,
    ))
}

/// Returns the confirmed agents whose registered instances have outlived
/// their time-to-live.
///
/// The TTL is re-drawn per instance per evaluation, so with jitter enabled
/// the same cohort expires gradually. Unconfirmed instances are never
/// reported here; the pending timeout owns them.
#[must_use]
pub fn instances_created_after_ttl(
    profile: &ClusterProfile,
    registry: &InstanceRegistry,
    confirmed: &Agents,
    now: DateTime<Utc>,
) -> Agents {
    registry
        .snapshot()
        .into_iter()
        .filter(|instance| confirmed.contains(&instance.id))
        .filter(|instance| now - instance.created_at > effective_ttl(profile))
        .map(|instance| instance.id)
        .collect()
}

/// Returns provider-side servers carrying the profile prefix that are not
/// confirmed agents and are older than the non-jittered minimum TTL.
///
/// This is a safety net over provider-observed servers rather than locally
/// tracked pending entries: it catches instances whose pending record was
/// lost, typically across a restart. Each candidate is re-checked at the
/// provider before being flagged; an id gone by then is skipped, as is one
/// whose lookup fails. With an unconfigured profile the result is empty,
/// prefix comparisons would otherwise sweep up foreign servers.
///
/// # Errors
///
/// Propagates the provider error when the listing fails.
pub async fn unregistered_after_timeout<P: ComputeProvider>(
    provider: &P,
    profile: &ClusterProfile,
    confirmed: &Agents,
    now: DateTime<Utc>,
) -> Result<Agents, P::Error> {
    if !profile.is_configured() {
        return Ok(Agents::new());
    }
    let minimum_age = profile.ttl_min();
    let servers = provider.list_prefixed(&profile.vm_prefix).await?;
    let mut abandoned = Agents::new();
    for record in servers {
        if confirmed.contains(&record.id) || now - record.created_at <= minimum_age {
            continue;
        }
        match provider.get(&record.id).await {
            Ok(Some(_)) => abandoned.insert(record.id),
            Ok(None) => {
                tracing::debug!(instance_id = %record.id, "listed server vanished before the sweep");
            }
            Err(err) => {
                tracing::warn!(instance_id = %record.id, error = %err, "abandoned-server check failed; skipping");
            }
        }
    }
    Ok(abandoned)
}
