use chrono::{TimeZone, Utc};
use rstest::rstest;

use crate::provider::ServerStatus;

use super::wire::{FlavorWire, ImageWire, ServerWire};
use super::{matching_flavor_id, newest_image_id, previous_image_id, record_from};

fn image(id: &str, name: &str, year: i32) -> ImageWire {
    ImageWire {
        id: id.to_owned(),
        name: name.to_owned(),
        created: Utc.with_ymd_and_hms(year, 1, 1, 0, 0, 0).single().expect("valid timestamp"),
    }
}

#[test]
fn server_payloads_parse_with_metadata_and_resource_refs() {
    let payload = r#"{
        "id": "srv-1",
        "name": "hangar-abc",
        "created": "2026-08-01T12:00:00Z",
        "status": "ACTIVE",
        "metadata": {"hangar:environment": "staging"},
        "image": {"id": "img-1"},
        "flavor": {"id": "fl-1"}
    }"#;
    let server: ServerWire = serde_json::from_str(payload).expect("payload parses");
    let record = record_from(server);

    assert_eq!(record.id, "srv-1");
    assert_eq!(record.status, ServerStatus::Active);
    assert_eq!(record.environment(), "staging");
    assert_eq!(record.image_id, "img-1");
    assert_eq!(record.flavor_id, "fl-1");
}

#[test]
fn boot_from_volume_servers_parse_without_an_image_ref() {
    let payload = r#"{
        "id": "srv-2",
        "name": "hangar-def",
        "created": "2026-08-01T12:00:00Z",
        "status": "BUILD"
    }"#;
    let server: ServerWire = serde_json::from_str(payload).expect("payload parses");
    let record = record_from(server);

    assert_eq!(record.status, ServerStatus::Building);
    assert_eq!(record.image_id, "");
    assert!(record.metadata.is_empty());
}

#[rstest]
#[case("ERROR", ServerStatus::Error)]
#[case("error", ServerStatus::Error)]
#[case("active", ServerStatus::Active)]
#[case("SHUTOFF", ServerStatus::Other("SHUTOFF".to_owned()))]
fn provider_statuses_parse_case_insensitively(#[case] raw: &str, #[case] expected: ServerStatus) {
    assert_eq!(ServerStatus::parse(raw), expected);
}

#[test]
fn an_exact_image_id_resolves_to_itself() {
    let images = vec![image("img-1", "debian", 2024)];
    assert_eq!(newest_image_id(&images, "img-1"), Some("img-1".to_owned()));
}

#[test]
fn an_image_name_resolves_to_its_newest_generation() {
    let images = vec![
        image("img-2024", "debian", 2024),
        image("img-2026", "debian", 2026),
        image("img-2025", "debian", 2025),
        image("img-other", "ubuntu", 2026),
    ];
    assert_eq!(newest_image_id(&images, "debian"), Some("img-2026".to_owned()));
    assert_eq!(newest_image_id(&images, "fedora"), None);
}

#[test]
fn the_previous_generation_is_the_second_newest() {
    let images = vec![
        image("img-2024", "debian", 2024),
        image("img-2026", "debian", 2026),
        image("img-2025", "debian", 2025),
    ];
    assert_eq!(
        previous_image_id(&images, "debian"),
        Some("img-2025".to_owned())
    );
}

#[test]
fn a_single_generation_has_no_previous() {
    let images = vec![image("img-1", "debian", 2026)];
    assert_eq!(previous_image_id(&images, "debian"), None);
    // A concrete id names one generation, never a lineage.
    assert_eq!(previous_image_id(&images, "img-1"), None);
}

#[test]
fn flavors_resolve_by_id_or_name() {
    let flavors = vec![
        FlavorWire {
            id: "fl-1".to_owned(),
            name: "m1.small".to_owned(),
        },
        FlavorWire {
            id: "fl-2".to_owned(),
            name: "m1.large".to_owned(),
        },
    ];
    assert_eq!(matching_flavor_id(&flavors, "fl-2"), Some("fl-2".to_owned()));
    assert_eq!(
        matching_flavor_id(&flavors, "m1.small"),
        Some("fl-1".to_owned())
    );
    assert_eq!(matching_flavor_id(&flavors, "m1.medium"), None);
}
