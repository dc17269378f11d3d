//! Scripted in-memory doubles for the provider and directory seams.
//!
//! These live in the library so unit tests and the integration suite share
//! one set of doubles. Behaviour is driven by a scripted state: servers,
//! identifier mappings, and operations marked to fail.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::directory::{AgentDirectory, DirectoryFuture};
use crate::model::Agents;
use crate::provider::{BootSpec, ComputeProvider, ProviderFuture, ServerRecord, ServerStatus};

/// Failure injected by a scripted double.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error("scripted failure: {0}")]
pub struct ScriptedError(pub String);

#[derive(Debug, Default)]
struct ProviderState {
    servers: BTreeMap<String, ServerRecord>,
    image_ids: BTreeMap<String, String>,
    previous_image_ids: BTreeMap<String, String>,
    flavor_ids: BTreeMap<String, String>,
    failing: BTreeSet<String>,
    vanished: BTreeSet<String>,
    deleted: Vec<String>,
    booted: Vec<BootSpec>,
    boot_serial: u32,
    list_calls: usize,
}

/// Compute provider whose responses are scripted up front.
#[derive(Clone, Debug, Default)]
pub struct ScriptedProvider {
    state: Arc<Mutex<ProviderState>>,
}

/// Builds a server record with the given identity and creation time, status
/// `Active` and empty metadata.
#[must_use]
pub fn server(id: &str, name: &str, created_at: DateTime<Utc>) -> ServerRecord {
    ServerRecord {
        id: id.to_owned(),
        name: name.to_owned(),
        created_at,
        status: ServerStatus::Active,
        image_id: String::new(),
        flavor_id: String::new(),
        metadata: BTreeMap::new(),
    }
}

impl ScriptedProvider {
    /// Creates a provider with no servers and no mappings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, ProviderState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds or replaces a server.
    pub fn add_server(&self, record: ServerRecord) {
        self.state().servers.insert(record.id.clone(), record);
    }

    /// Overwrites a server's status. Unknown ids are ignored.
    pub fn set_status(&self, id: &str, status: ServerStatus) {
        if let Some(record) = self.state().servers.get_mut(id) {
            record.status = status;
        }
    }

    /// Maps an image identifier-or-name to the id it resolves to.
    pub fn map_image(&self, name_or_id: &str, id: &str) {
        self.state()
            .image_ids
            .insert(name_or_id.to_owned(), id.to_owned());
    }

    /// Maps an image name to its previous published generation's id.
    pub fn map_previous_image(&self, name_or_id: &str, id: &str) {
        self.state()
            .previous_image_ids
            .insert(name_or_id.to_owned(), id.to_owned());
    }

    /// Maps a flavor identifier-or-name to the id it resolves to.
    pub fn map_flavor(&self, name_or_id: &str, id: &str) {
        self.state()
            .flavor_ids
            .insert(name_or_id.to_owned(), id.to_owned());
    }

    /// Marks a whole operation (`list`, `get`, `delete`, `boot`,
    /// `resolve_image`, `resolve_previous_image`, `resolve_flavor`) as
    /// failing.
    pub fn fail_op(&self, op: &str) {
        self.state().failing.insert(op.to_owned());
    }

    /// Marks `get` as failing for one specific server id only.
    pub fn fail_get(&self, id: &str) {
        self.state().failing.insert(format!("get:{id}"));
    }

    /// Makes `get` answer "gone" for one server id while listings still
    /// carry it, mimicking a server deleted between the two calls.
    pub fn vanish_on_get(&self, id: &str) {
        self.state().vanished.insert(id.to_owned());
    }

    /// Clears all scripted failures.
    pub fn clear_failures(&self) {
        self.state().failing.clear();
    }

    /// Ids passed to `delete`, in call order.
    #[must_use]
    pub fn deleted(&self) -> Vec<String> {
        self.state().deleted.clone()
    }

    /// Boot specs passed to `boot`, in call order.
    #[must_use]
    pub fn booted(&self) -> Vec<BootSpec> {
        self.state().booted.clone()
    }

    /// Number of times `list_prefixed` was invoked.
    #[must_use]
    pub fn list_calls(&self) -> usize {
        self.state().list_calls
    }

    fn check(&self, op: &str, id: Option<&str>) -> Result<(), ScriptedError> {
        let state = self.state();
        if state.failing.contains(op) {
            return Err(ScriptedError(format!("{op} is scripted to fail")));
        }
        if let Some(target) = id {
            if state.failing.contains(&format!("{op}:{target}")) {
                return Err(ScriptedError(format!(
                    "{op} is scripted to fail for {target}"
                )));
            }
        }
        Ok(())
    }
}

impl ComputeProvider for ScriptedProvider {
    type Error = ScriptedError;

    fn list_prefixed<'a>(
        &'a self,
        name_prefix: &'a str,
    ) -> ProviderFuture<'a, Vec<ServerRecord>, Self::Error> {
        Box::pin(async move {
            self.state().list_calls += 1;
            self.check("list", None)?;
            Ok(self
                .state()
                .servers
                .values()
                .filter(|record| record.name.starts_with(name_prefix))
                .cloned()
                .collect())
        })
    }

    fn get<'a>(&'a self, id: &'a str) -> ProviderFuture<'a, Option<ServerRecord>, Self::Error> {
        Box::pin(async move {
            self.check("get", Some(id))?;
            let state = self.state();
            if state.vanished.contains(id) {
                return Ok(None);
            }
            Ok(state.servers.get(id).cloned())
        })
    }

    fn delete<'a>(&'a self, id: &'a str) -> ProviderFuture<'a, (), Self::Error> {
        Box::pin(async move {
            self.check("delete", Some(id))?;
            let mut state = self.state();
            state.servers.remove(id);
            state.deleted.push(id.to_owned());
            Ok(())
        })
    }

    fn boot<'a>(&'a self, spec: &'a BootSpec) -> ProviderFuture<'a, ServerRecord, Self::Error> {
        Box::pin(async move {
            self.check("boot", None)?;
            let mut state = self.state();
            state.boot_serial += 1;
            let record = ServerRecord {
                id: format!("srv-{}", state.boot_serial),
                name: spec.name.clone(),
                created_at: Utc::now(),
                status: ServerStatus::Building,
                image_id: spec.image_id.clone(),
                flavor_id: spec.flavor_id.clone(),
                metadata: spec.metadata.clone(),
            };
            state.servers.insert(record.id.clone(), record.clone());
            state.booted.push(spec.clone());
            Ok(record)
        })
    }

    fn resolve_image_id<'a>(
        &'a self,
        name_or_id: &'a str,
    ) -> ProviderFuture<'a, Option<String>, Self::Error> {
        Box::pin(async move {
            self.check("resolve_image", None)?;
            Ok(self.state().image_ids.get(name_or_id).cloned())
        })
    }

    fn resolve_previous_image_id<'a>(
        &'a self,
        name_or_id: &'a str,
    ) -> ProviderFuture<'a, Option<String>, Self::Error> {
        Box::pin(async move {
            self.check("resolve_previous_image", None)?;
            Ok(self.state().previous_image_ids.get(name_or_id).cloned())
        })
    }

    fn resolve_flavor_id<'a>(
        &'a self,
        name_or_id: &'a str,
    ) -> ProviderFuture<'a, Option<String>, Self::Error> {
        Box::pin(async move {
            self.check("resolve_flavor", None)?;
            Ok(self.state().flavor_ids.get(name_or_id).cloned())
        })
    }
}

#[derive(Debug, Default)]
struct DirectoryState {
    agents: Agents,
    failing: bool,
}

/// Agent directory answering from a fixed confirmed set.
#[derive(Clone, Debug, Default)]
pub struct StaticDirectory {
    state: Arc<Mutex<DirectoryState>>,
}

impl StaticDirectory {
    /// Creates a directory confirming nothing.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a directory confirming exactly the given ids.
    #[must_use]
    pub fn confirming<'a, I: IntoIterator<Item = &'a str>>(ids: I) -> Self {
        let directory = Self::default();
        directory.state().agents = ids.into_iter().collect();
        directory
    }

    fn state(&self) -> MutexGuard<'_, DirectoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds an id to the confirmed set.
    pub fn confirm(&self, id: &str) {
        self.state().agents.insert(id);
    }

    /// Makes subsequent listings fail.
    pub fn fail_listing(&self) {
        self.state().failing = true;
    }
}

impl AgentDirectory for StaticDirectory {
    type Error = ScriptedError;

    fn list_agents(&self) -> DirectoryFuture<'_, Agents, Self::Error> {
        Box::pin(async move {
            let state = self.state();
            if state.failing {
                return Err(ScriptedError("directory listing is scripted to fail".to_owned()));
            }
            Ok(state.agents.clone())
        })
    }
}
