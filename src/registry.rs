//! In-memory registry of instances the controller believes exist.
//!
//! The registry owns its [`Instance`] values; lookups hand out clones so no
//! caller ever holds a mutable alias into the map. All operations are safe
//! under concurrent access.

use dashmap::DashMap;

use crate::model::Instance;

/// Concurrent map of instance id to instance.
#[derive(Debug, Default)]
pub struct InstanceRegistry {
    instances: DashMap<String, Instance>,
}

impl InstanceRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an instance, replacing any previous entry with the same id.
    pub fn register(&self, instance: Instance) {
        self.instances.insert(instance.id.clone(), instance);
    }

    /// Returns a clone of the instance with the given id, if known.
    #[must_use]
    pub fn find(&self, id: &str) -> Option<Instance> {
        self.instances.get(id).map(|entry| entry.value().clone())
    }

    /// Returns true when the registry knows the given id.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.instances.contains_key(id)
    }

    /// Removes the instance with the given id, returning it if it was known.
    pub fn remove(&self, id: &str) -> Option<Instance> {
        self.instances.remove(id).map(|(_, instance)| instance)
    }

    /// Updates the completed-jobs cap on a known instance in place. Unknown
    /// ids are ignored.
    pub fn set_job_cap(&self, id: &str, cap: Option<u32>) {
        if let Some(mut entry) = self.instances.get_mut(id) {
            entry.value_mut().max_completed_jobs = cap;
        }
    }

    /// Returns clones of all known instances.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Instance> {
        self.instances
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Number of known instances.
    #[must_use]
    pub fn len(&self) -> usize {
        self.instances.len()
    }

    /// Returns true when no instances are known.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn instance(id: &str) -> Instance {
        Instance {
            id: id.to_owned(),
            created_at: Utc::now(),
            environment: String::new(),
            image: "debian-12".to_owned(),
            flavor: "m1.small".to_owned(),
            max_completed_jobs: None,
        }
    }

    #[test]
    fn find_returns_clone_of_registered_instance() {
        let registry = InstanceRegistry::new();
        registry.register(instance("vm-1"));

        let found = registry.find("vm-1").expect("registered");
        assert_eq!(found.id, "vm-1");
        assert!(registry.find("vm-2").is_none());
    }

    #[test]
    fn remove_forgets_the_instance() {
        let registry = InstanceRegistry::new();
        registry.register(instance("vm-1"));

        assert!(registry.remove("vm-1").is_some());
        assert!(registry.remove("vm-1").is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn set_job_cap_updates_in_place_and_ignores_unknown_ids() {
        let registry = InstanceRegistry::new();
        registry.register(instance("vm-1"));

        registry.set_job_cap("vm-1", Some(5));
        registry.set_job_cap("vm-9", Some(7));

        assert_eq!(registry.find("vm-1").expect("registered").max_completed_jobs, Some(5));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn register_replaces_existing_entry() {
        let registry = InstanceRegistry::new();
        registry.register(instance("vm-1"));
        let mut replacement = instance("vm-1");
        replacement.environment = "staging".to_owned();
        registry.register(replacement);

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.find("vm-1").expect("registered").environment, "staging");
    }
}
