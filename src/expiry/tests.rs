use chrono::{Duration, Utc};
use rstest::rstest;

use crate::config::ClusterProfile;
use crate::model::{Agents, Instance};
use crate::registry::InstanceRegistry;
use crate::test_support::{ScriptedProvider, server};

use super::{instances_created_after_ttl, ttl_minutes, unregistered_after_timeout};

fn register_aged(registry: &InstanceRegistry, id: &str, age_minutes: i64) {
    registry.register(Instance {
        id: id.to_owned(),
        created_at: Utc::now() - Duration::minutes(age_minutes),
        environment: String::new(),
        image: "debian-12".to_owned(),
        flavor: "m1.small".to_owned(),
        max_completed_jobs: None,
    });
}

#[rstest]
#[case(10, 0, 10)]
#[case(10, 10, 10)]
#[case(10, 5, 10)]
fn ttl_without_jitter_is_exactly_the_minimum(
    #[case] min_minutes: i64,
    #[case] max_minutes: i64,
    #[case] expected: i64,
) {
    assert_eq!(ttl_minutes(min_minutes, max_minutes), expected);
}

#[test]
fn ttl_with_jitter_stays_within_the_configured_range() {
    for _ in 0..200 {
        let minutes = ttl_minutes(10, 30);
        assert!((10..=30).contains(&minutes));
    }
}

#[test]
fn only_confirmed_instances_past_their_ttl_expire() {
    let registry = InstanceRegistry::new();
    register_aged(&registry, "vm-old-confirmed", 15);
    register_aged(&registry, "vm-old-pending", 15);
    register_aged(&registry, "vm-young-confirmed", 2);
    let confirmed: Agents = ["vm-old-confirmed", "vm-young-confirmed"]
        .into_iter()
        .collect();

    let expired = instances_created_after_ttl(
        &ClusterProfile::default(),
        &registry,
        &confirmed,
        Utc::now(),
    );

    assert!(expired.contains("vm-old-confirmed"));
    assert!(!expired.contains("vm-old-pending"));
    assert!(!expired.contains("vm-young-confirmed"));
    assert_eq!(expired.len(), 1);
}

#[tokio::test]
async fn abandoned_servers_are_old_prefixed_and_unconfirmed() {
    let provider = ScriptedProvider::new();
    let old = Utc::now() - Duration::minutes(15);
    let young = Utc::now() - Duration::minutes(2);
    provider.add_server(server("vm-1", "hangar-1", old));
    provider.add_server(server("vm-2", "hangar-2", old));
    provider.add_server(server("vm-3", "hangar-3", young));
    provider.add_server(server("vm-4", "other-4", old));
    let profile = ClusterProfile {
        vm_prefix: "hangar-".to_owned(),
        ..ClusterProfile::default()
    };
    let confirmed: Agents = ["vm-2"].into_iter().collect();

    let abandoned = unregistered_after_timeout(&provider, &profile, &confirmed, Utc::now())
        .await
        .expect("listing should succeed");

    assert!(abandoned.contains("vm-1"));
    assert_eq!(abandoned.len(), 1);
}

#[tokio::test]
async fn servers_gone_or_unreadable_at_recheck_time_are_skipped() {
    let provider = ScriptedProvider::new();
    let old = Utc::now() - Duration::minutes(15);
    provider.add_server(server("vm-1", "hangar-1", old));
    provider.add_server(server("vm-2", "hangar-2", old));
    provider.add_server(server("vm-3", "hangar-3", old));
    // Still listed, but gone by the time it is looked up again.
    provider.vanish_on_get("vm-2");
    provider.fail_get("vm-3");
    let profile = ClusterProfile {
        vm_prefix: "hangar-".to_owned(),
        ..ClusterProfile::default()
    };

    let abandoned = unregistered_after_timeout(&provider, &profile, &Agents::new(), Utc::now())
        .await
        .expect("listing should succeed");

    assert!(abandoned.contains("vm-1"));
    assert_eq!(abandoned.len(), 1);
}

#[tokio::test]
async fn an_unconfigured_profile_yields_no_abandoned_servers() {
    let provider = ScriptedProvider::new();
    provider.add_server(server("vm-1", "hangar-1", Utc::now() - Duration::minutes(60)));

    let abandoned = unregistered_after_timeout(
        &provider,
        &ClusterProfile::default(),
        &Agents::new(),
        Utc::now(),
    )
    .await
    .expect("listing should succeed");

    assert!(abandoned.is_empty());
}

#[tokio::test]
async fn a_failed_listing_propagates() {
    let provider = ScriptedProvider::new();
    provider.fail_op("list");
    let profile = ClusterProfile {
        vm_prefix: "hangar-".to_owned(),
        ..ClusterProfile::default()
    };

    let result = unregistered_after_timeout(&provider, &profile, &Agents::new(), Utc::now()).await;
    assert!(result.is_err());
}
