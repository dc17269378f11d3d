use chrono::Utc;
use rstest::rstest;

use crate::config::ClusterProfile;
use crate::model::{CreateAgentRequest, Instance};
use crate::registry::InstanceRegistry;
use crate::test_support::ScriptedProvider;

use super::{InstanceMatcher, ReuseProposal};

fn register(registry: &InstanceRegistry, id: &str, environment: &str, image: &str, flavor: &str) {
    registry.register(Instance {
        id: id.to_owned(),
        created_at: Utc::now(),
        environment: environment.to_owned(),
        image: image.to_owned(),
        flavor: flavor.to_owned(),
        max_completed_jobs: None,
    });
}

fn proposal(environment: &str, image: &str, flavor: &str) -> ReuseProposal {
    ReuseProposal {
        environment: environment.to_owned(),
        image: image.to_owned(),
        flavor: flavor.to_owned(),
        use_previous_image: false,
    }
}

#[tokio::test]
async fn unregistered_instance_never_matches() {
    let registry = InstanceRegistry::new();
    let provider = ScriptedProvider::new();
    let matcher = InstanceMatcher::new(&registry, &provider);

    let matched = matcher
        .matches("vm-ghost", &proposal("", "debian-12", "m1.small"))
        .await
        .expect("verdict");
    assert!(!matched);
}

#[rstest]
#[case("Staging", "staging", true)]
#[case("staging", "staging", true)]
#[case("", "", true)]
#[case("staging", "production", false)]
#[case("staging", "", false)]
#[tokio::test]
async fn environment_comparison_is_case_insensitive(
    #[case] instance_environment: &str,
    #[case] requested_environment: &str,
    #[case] expected: bool,
) {
    let registry = InstanceRegistry::new();
    register(&registry, "vm-1", instance_environment, "debian-12", "m1.small");
    let provider = ScriptedProvider::new();
    let matcher = InstanceMatcher::new(&registry, &provider);

    let matched = matcher
        .matches("vm-1", &proposal(requested_environment, "debian-12", "m1.small"))
        .await
        .expect("verdict");
    assert_eq!(matched, expected);
}

#[tokio::test]
async fn equal_literals_match_without_touching_the_provider() {
    let registry = InstanceRegistry::new();
    register(&registry, "vm-1", "", "debian-12", "m1.small");
    let provider = ScriptedProvider::new();
    provider.fail_op("resolve_image");
    provider.fail_op("resolve_flavor");
    let matcher = InstanceMatcher::new(&registry, &provider);

    let matched = matcher
        .matches("vm-1", &proposal("", "debian-12", "m1.small"))
        .await
        .expect("verdict");
    assert!(matched);
}

#[tokio::test]
async fn a_proposed_name_matches_when_it_resolves_to_the_stored_id() {
    let registry = InstanceRegistry::new();
    register(&registry, "vm-1", "", "img-123", "m1.small");
    let provider = ScriptedProvider::new();
    provider.map_image("web-image", "img-123");
    let matcher = InstanceMatcher::new(&registry, &provider);

    let matched = matcher
        .matches("vm-1", &proposal("", "web-image", "m1.small"))
        .await
        .expect("verdict");
    assert!(matched);
}

#[tokio::test]
async fn unresolvable_image_is_a_mismatch_not_an_error() {
    let registry = InstanceRegistry::new();
    register(&registry, "vm-1", "", "debian-12", "m1.small");
    let provider = ScriptedProvider::new();
    let matcher = InstanceMatcher::new(&registry, &provider);

    let matched = matcher
        .matches("vm-1", &proposal("", "debian-13", "m1.small"))
        .await
        .expect("verdict");
    assert!(!matched);
}

#[rstest]
#[case(true, true)]
#[case(false, false)]
#[tokio::test]
async fn previous_generation_matches_only_when_enabled(
    #[case] use_previous_image: bool,
    #[case] expected: bool,
) {
    let registry = InstanceRegistry::new();
    register(&registry, "vm-1", "", "img-old", "m1.small");
    let provider = ScriptedProvider::new();
    provider.map_image("debian", "img-new");
    provider.map_previous_image("debian", "img-old");
    let matcher = InstanceMatcher::new(&registry, &provider);

    let request = ReuseProposal {
        use_previous_image,
        ..proposal("", "debian", "m1.small")
    };
    let matched = matcher.matches("vm-1", &request).await.expect("verdict");
    assert_eq!(matched, expected);
}

#[tokio::test]
async fn a_resolution_miss_skips_the_previous_generation_fallback() {
    let registry = InstanceRegistry::new();
    register(&registry, "vm-1", "", "img-old", "m1.small");
    let provider = ScriptedProvider::new();
    // A previous-generation mapping exists, but the name itself resolves to
    // nothing, so the fallback must not be consulted.
    provider.map_previous_image("debian", "img-old");
    let matcher = InstanceMatcher::new(&registry, &provider);

    let request = ReuseProposal {
        use_previous_image: true,
        ..proposal("", "debian", "m1.small")
    };
    let matched = matcher.matches("vm-1", &request).await.expect("verdict");
    assert!(!matched);
}

#[tokio::test]
async fn flavors_compare_by_literal_then_by_resolved_id() {
    let registry = InstanceRegistry::new();
    register(&registry, "vm-1", "", "debian-12", "fl-1");
    let provider = ScriptedProvider::new();
    provider.map_flavor("small", "fl-1");
    provider.map_flavor("large", "fl-2");
    let matcher = InstanceMatcher::new(&registry, &provider);

    let small = matcher
        .matches("vm-1", &proposal("", "debian-12", "small"))
        .await
        .expect("verdict");
    assert!(small);

    let large = matcher
        .matches("vm-1", &proposal("", "debian-12", "large"))
        .await
        .expect("verdict");
    assert!(!large);
}

#[tokio::test]
async fn provider_errors_propagate() {
    let registry = InstanceRegistry::new();
    register(&registry, "vm-1", "", "debian-12", "m1.small");
    let provider = ScriptedProvider::new();
    provider.fail_op("resolve_image");
    let matcher = InstanceMatcher::new(&registry, &provider);

    let result = matcher.matches("vm-1", &proposal("", "debian-13", "m1.small")).await;
    assert!(result.is_err());
}

#[test]
fn from_request_applies_profile_defaults() {
    let profile = ClusterProfile {
        default_image: "debian-12".to_owned(),
        default_flavor: "m1.small".to_owned(),
        use_previous_image: true,
        ..ClusterProfile::default()
    };
    let request = CreateAgentRequest {
        job_id: "job-1".to_owned(),
        environment: Some("Staging".to_owned()),
        ..CreateAgentRequest::default()
    };

    let built = ReuseProposal::from_request(&request, &profile);
    assert_eq!(built.environment, "Staging");
    assert_eq!(built.image, "debian-12");
    assert_eq!(built.flavor, "m1.small");
    assert!(built.use_previous_image);
}
