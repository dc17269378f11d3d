//! Profile parsing and configuration validation.

use hangar::{ClusterProfile, ConfigError, ControllerConfig};

#[test]
fn an_empty_profile_document_gets_the_documented_defaults() {
    let profile = ClusterProfile::from_json("{}").expect("profile parses");

    assert_eq!(profile.vm_prefix, "");
    assert_eq!(profile.agent_ttl_min_minutes, 10);
    assert_eq!(profile.agent_ttl_max_minutes, 0);
    assert_eq!(profile.agent_pending_register_timeout_minutes, 10);
    assert!(!profile.delete_error_instances);
    assert!(!profile.use_previous_image);
    assert_eq!(profile.image_cache_ttl_minutes, 30);
    assert!(!profile.is_configured());
}

#[test]
fn a_full_profile_document_parses() {
    let payload = r#"{
        "vm_prefix": "hangar-",
        "agent_ttl_min_minutes": 30,
        "agent_ttl_max_minutes": 90,
        "agent_pending_register_timeout_minutes": 15,
        "delete_error_instances": true,
        "use_previous_image": true,
        "default_image": "debian-12",
        "default_flavor": "m1.small",
        "image_cache_ttl_minutes": 5
    }"#;
    let profile = ClusterProfile::from_json(payload).expect("profile parses");

    assert!(profile.is_configured());
    assert_eq!(profile.agent_ttl_min_minutes, 30);
    assert_eq!(profile.agent_ttl_max_minutes, 90);
    assert!(profile.delete_error_instances);
    assert_eq!(profile.ttl_min(), chrono::Duration::minutes(30));
    assert_eq!(
        profile.pending_register_timeout(),
        chrono::Duration::minutes(15)
    );
}

#[test]
fn malformed_profile_documents_are_rejected() {
    assert!(matches!(
        ClusterProfile::from_json("not json"),
        Err(ConfigError::Parse(_))
    ));
    assert!(matches!(
        ClusterProfile::from_json(r#"{"agent_ttl_min_minutes": "ten"}"#),
        Err(ConfigError::Parse(_))
    ));
}

#[test]
fn a_blank_prefix_means_unconfigured() {
    let profile = ClusterProfile::from_json(r#"{"vm_prefix": "   "}"#).expect("profile parses");
    assert!(!profile.is_configured());
}

#[test]
fn validation_points_at_the_missing_field() {
    let config = ControllerConfig {
        compute_url: String::new(),
        auth_token: "token".to_owned(),
        server_url: "https://cp.example.net".to_owned(),
        tick_interval_seconds: 60,
    };

    let err = config.validate().expect_err("missing field");
    let message = err.to_string();
    assert!(message.contains("HANGAR_COMPUTE_URL"));
    assert!(message.contains("compute_url"));
}

#[test]
fn a_complete_configuration_validates() {
    let config = ControllerConfig {
        compute_url: "https://compute.example.net/v2.1".to_owned(),
        auth_token: "token".to_owned(),
        server_url: "https://cp.example.net".to_owned(),
        tick_interval_seconds: 60,
    };
    assert!(config.validate().is_ok());
}
