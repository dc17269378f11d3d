//! Configuration loading via `ortho-config` and cluster profile parsing.
//!
//! Two layers exist: [`ControllerConfig`] is process-level and merged from
//! defaults, configuration files, environment variables, and CLI flags;
//! [`ClusterProfile`] is the per-invocation policy bundle supplied by the
//! control plane as JSON and treated as immutable for the duration of a call.

use chrono::Duration;
use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

/// Process-level configuration for the controller binary.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(prefix = "HANGAR")]
pub struct ControllerConfig {
    /// Base URL of the OpenStack-compatible compute API
    /// (for example `https://compute.example.net/v2.1`).
    pub compute_url: String,
    /// Pre-issued authentication token sent as `X-Auth-Token`. Keystone
    /// credential flows are outside this controller's scope.
    pub auth_token: String,
    /// Base URL of the control plane serving the agent directory.
    pub server_url: String,
    /// Seconds between scheduler ticks. Defaults to 60.
    #[ortho_config(default = 60)]
    pub tick_interval_seconds: u64,
}

/// Metadata for a configuration field, used to generate actionable error messages.
struct FieldMetadata {
    description: &'static str,
    env_var: &'static str,
    toml_key: &'static str,
}

impl FieldMetadata {
    const fn new(description: &'static str, env_var: &'static str, toml_key: &'static str) -> Self {
        Self {
            description,
            env_var,
            toml_key,
        }
    }
}

impl ControllerConfig {
    fn require_field(value: &str, metadata: &FieldMetadata) -> Result<(), ConfigError> {
        if value.trim().is_empty() {
            return Err(ConfigError::MissingField(format!(
                "missing {}: set {} or add {} to hangar.toml",
                metadata.description, metadata.env_var, metadata.toml_key
            )));
        }
        Ok(())
    }

    /// Loads configuration without attempting to parse CLI arguments. Values
    /// merge defaults, configuration files, and environment variables; CLI
    /// flags stay with `clap`, which owns the subcommand surface.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([std::ffi::OsString::from("hangar")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Performs semantic validation on required fields. Error messages include
    /// guidance on how to provide missing values via environment variables or
    /// configuration files.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when a required field is empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        Self::require_field(
            &self.compute_url,
            &FieldMetadata::new("compute API URL", "HANGAR_COMPUTE_URL", "compute_url"),
        )?;
        Self::require_field(
            &self.auth_token,
            &FieldMetadata::new("compute API token", "HANGAR_AUTH_TOKEN", "auth_token"),
        )?;
        Self::require_field(
            &self.server_url,
            &FieldMetadata::new("control plane URL", "HANGAR_SERVER_URL", "server_url"),
        )?;
        Ok(())
    }
}

fn default_ttl_min_minutes() -> i64 {
    10
}

fn default_pending_timeout_minutes() -> i64 {
    10
}

fn default_image_cache_ttl_minutes() -> i64 {
    30
}

/// The named bundle of policy configuration under which agents are
/// provisioned. Read-only and immutable per invocation.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
pub struct ClusterProfile {
    /// Name prefix used to discover this controller's instances at the
    /// provider. Empty means the profile is unset and prefix-based
    /// comparisons are unsafe.
    #[serde(default)]
    pub vm_prefix: String,
    /// Minimum agent time-to-live in minutes; also the fixed age gate for
    /// the abandoned-instance sweep. Defaults to 10.
    #[serde(default = "default_ttl_min_minutes")]
    pub agent_ttl_min_minutes: i64,
    /// Maximum agent time-to-live in minutes. When not greater than the
    /// minimum, jitter is disabled and the minimum applies exactly.
    /// Defaults to 0 (disabled).
    #[serde(default)]
    pub agent_ttl_max_minutes: i64,
    /// Minutes a created instance may stay pending before it is considered
    /// to have never phoned home. Defaults to 10.
    #[serde(default = "default_pending_timeout_minutes")]
    pub agent_pending_register_timeout_minutes: i64,
    /// Whether the pending sweep deletes instances the provider reports in
    /// an error state. Defaults to false.
    #[serde(default)]
    pub delete_error_instances: bool,
    /// Whether the matcher may fall back to the image's previous published
    /// generation. Defaults to false.
    #[serde(default)]
    pub use_previous_image: bool,
    /// Image identifier-or-name applied when a request names none.
    #[serde(default)]
    pub default_image: String,
    /// Flavor identifier-or-name applied when a request names none.
    #[serde(default)]
    pub default_flavor: String,
    /// Minutes a resolved image id may be served from the provider-side
    /// cache. Defaults to 30.
    #[serde(default = "default_image_cache_ttl_minutes")]
    pub image_cache_ttl_minutes: i64,
}

impl Default for ClusterProfile {
    fn default() -> Self {
        Self {
            vm_prefix: String::new(),
            agent_ttl_min_minutes: default_ttl_min_minutes(),
            agent_ttl_max_minutes: 0,
            agent_pending_register_timeout_minutes: default_pending_timeout_minutes(),
            delete_error_instances: false,
            use_previous_image: false,
            default_image: String::new(),
            default_flavor: String::new(),
            image_cache_ttl_minutes: default_image_cache_ttl_minutes(),
        }
    }
}

impl ClusterProfile {
    /// Parses a profile from the control plane's JSON representation.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the payload is not valid JSON for
    /// this shape.
    pub fn from_json(payload: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(payload).map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Returns true when the profile carries enough to compare instances by
    /// name prefix. An unconfigured profile makes reconciliation a no-op.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        !self.vm_prefix.trim().is_empty()
    }

    /// Minimum TTL as a duration.
    #[must_use]
    pub fn ttl_min(&self) -> Duration {
        Duration::minutes(self.agent_ttl_min_minutes)
    }

    /// Pending-registration timeout as a duration.
    #[must_use]
    pub fn pending_register_timeout(&self) -> Duration {
        Duration::minutes(self.agent_pending_register_timeout_minutes)
    }
}

/// Errors raised during configuration loading and validation.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Indicates a required configuration field is empty or missing.
    #[error("missing configuration field: {0}")]
    MissingField(String),
    /// Surfaces errors from the loader or profile parser.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
}
