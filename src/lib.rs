//! Lifecycle controller for a fleet of elastic build agents on an
//! OpenStack-compatible compute provider.
//!
//! The controller boots instances on demand for a control plane's jobs,
//! tracks them from creation through confirmation, matches idle instances
//! against new work, and reclaims anything that outlives its welcome:
//! confirmed agents past their time-to-live, pending instances that never
//! register, and provider-side servers nothing claims. All state is held in
//! memory and reconciled against the provider after a restart.
//!
//! [`controller::FleetController`] is the entry point; it drives a
//! [`provider::ComputeProvider`] and an [`directory::AgentDirectory`]
//! implementation, of which [`openstack::OpenStackProvider`] and
//! [`directory::HttpAgentDirectory`] are the production ones.

pub mod cli;
pub mod config;
pub mod controller;
pub mod directory;
pub mod expiry;
mod latch;
pub mod matcher;
pub mod model;
pub mod openstack;
pub mod pending;
pub mod provider;
pub mod reconcile;
pub mod registry;
pub mod test_support;

pub use config::{ClusterProfile, ConfigError, ControllerConfig};
pub use controller::{CreateError, FleetController, TickError, TickReport};
pub use directory::{AgentDirectory, DirectoryError, HttpAgentDirectory};
pub use matcher::{InstanceMatcher, ReuseProposal};
pub use model::{Agents, CreateAgentRequest, Instance, PendingAgent};
pub use openstack::{OpenStackError, OpenStackProvider};
pub use pending::{PendingAgentTracker, SweepOutcome, SweepStats};
pub use provider::{
    BootSpec, ComputeProvider, METADATA_ENVIRONMENT_KEY, ServerRecord, ServerStatus,
};
pub use reconcile::{ReconciliationEngine, RefreshOutcome};
pub use registry::InstanceRegistry;
