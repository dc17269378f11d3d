//! Wire representation of the compute API payloads.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Deserialize)]
pub(super) struct ServersResponse {
    pub servers: Vec<ServerWire>,
}

#[derive(Clone, Debug, Deserialize)]
pub(super) struct ServerResponse {
    pub server: ServerWire,
}

#[derive(Clone, Debug, Deserialize)]
pub(super) struct ServerWire {
    pub id: String,
    pub name: String,
    pub created: DateTime<Utc>,
    pub status: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    #[serde(default)]
    pub image: ResourceRef,
    #[serde(default)]
    pub flavor: ResourceRef,
}

/// Nested `{"id": ...}` reference; empty for boot-from-volume servers.
#[derive(Clone, Debug, Default, Deserialize)]
pub(super) struct ResourceRef {
    #[serde(default)]
    pub id: String,
}

#[derive(Clone, Debug, Deserialize)]
pub(super) struct ImagesResponse {
    pub images: Vec<ImageWire>,
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
pub(super) struct ImageWire {
    pub id: String,
    pub name: String,
    pub created: DateTime<Utc>,
}

#[derive(Clone, Debug, Deserialize)]
pub(super) struct FlavorsResponse {
    pub flavors: Vec<FlavorWire>,
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
pub(super) struct FlavorWire {
    pub id: String,
    pub name: String,
}

#[derive(Clone, Debug, Serialize)]
pub(super) struct BootRequest {
    pub server: BootWire,
}

#[derive(Clone, Debug, Serialize)]
pub(super) struct BootWire {
    pub name: String,
    #[serde(rename = "imageRef")]
    pub image_ref: String,
    #[serde(rename = "flavorRef")]
    pub flavor_ref: String,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
}

/// Boot responses carry only the new server's identity.
#[derive(Clone, Debug, Deserialize)]
pub(super) struct CreatedResponse {
    pub server: CreatedWire,
}

#[derive(Clone, Debug, Deserialize)]
pub(super) struct CreatedWire {
    pub id: String,
}
