//! Structural diff between two configuration documents.
//!
//! The reconfiguration engine never looks at a document directly; it
//! consumes a [`ConfigDiff`] and applies the added/modified/removed
//! sets. A rename therefore shows up as one removal plus one addition.

use std::collections::HashMap;
use std::hash::Hash;

use crate::config::{Config, JobConfig, ModuleConfig, ProcessConfig, RemoteConfig, ResourceConfig};

/// Diff of one keyed collection.
#[derive(Debug, Clone)]
pub struct CollectionDiff<T> {
    /// Present in `next` only.
    pub added: Vec<T>,
    /// Present in both with different content; carries the `next` value.
    pub modified: Vec<T>,
    /// Present in `prev` only.
    pub removed: Vec<T>,
    /// Present in both, identical.
    pub unchanged: Vec<T>,
}

// Not derived: the derive would demand `T: Default` even though empty
// vectors need nothing from `T`.
impl<T> Default for CollectionDiff<T> {
    fn default() -> Self {
        Self {
            added: Vec::new(),
            modified: Vec::new(),
            removed: Vec::new(),
            unchanged: Vec::new(),
        }
    }
}

impl<T> CollectionDiff<T> {
    /// True when applying this diff would be a no-op.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.modified.is_empty() && self.removed.is_empty()
    }
}

fn diff_keyed<T, K, KF, EF>(prev: &[T], next: &[T], key: KF, same: EF) -> CollectionDiff<T>
where
    T: Clone,
    K: Eq + Hash,
    KF: Fn(&T) -> K,
    EF: Fn(&T, &T) -> bool,
{
    let prev_by_key: HashMap<K, &T> = prev.iter().map(|t| (key(t), t)).collect();
    let next_keys: std::collections::HashSet<K> = next.iter().map(|t| key(t)).collect();

    let mut diff = CollectionDiff::default();
    for item in next {
        match prev_by_key.get(&key(item)) {
            None => diff.added.push(item.clone()),
            Some(old) if same(old, item) => diff.unchanged.push(item.clone()),
            Some(_) => diff.modified.push(item.clone()),
        }
    }
    for item in prev {
        if !next_keys.contains(&key(item)) {
            diff.removed.push(item.clone());
        }
    }
    diff
}

/// The full diff between a previously applied document and its successor.
#[derive(Debug, Clone, Default)]
pub struct ConfigDiff {
    /// Components and services, merged; keyed by `(api, name)`.
    pub resources: CollectionDiff<ResourceConfig>,
    /// Remote machine connections, keyed by name.
    pub remotes: CollectionDiff<RemoteConfig>,
    /// Modules, keyed by name.
    pub modules: CollectionDiff<ModuleConfig>,
    /// Managed processes, keyed by id.
    pub processes: CollectionDiff<ProcessConfig>,
    /// Scheduled jobs, keyed by name.
    pub jobs: CollectionDiff<JobConfig>,
}

impl ConfigDiff {
    /// Compute the diff between two documents.
    #[must_use]
    pub fn new(prev: &Config, next: &Config) -> Self {
        let prev_resources: Vec<ResourceConfig> = prev.resources().cloned().collect();
        let next_resources: Vec<ResourceConfig> = next.resources().cloned().collect();

        Self {
            resources: diff_keyed(
                &prev_resources,
                &next_resources,
                |r| (r.api.clone(), r.name.clone()),
                ResourceConfig::is_equivalent,
            ),
            remotes: diff_keyed(
                &prev.remotes,
                &next.remotes,
                |r| r.name.clone(),
                PartialEq::eq,
            ),
            modules: diff_keyed(
                &prev.modules,
                &next.modules,
                |m| m.name.clone(),
                PartialEq::eq,
            ),
            processes: diff_keyed(
                &prev.processes,
                &next.processes,
                |p| p.id.clone(),
                PartialEq::eq,
            ),
            jobs: diff_keyed(&prev.jobs, &next.jobs, |j| j.name.clone(), PartialEq::eq),
        }
    }

    /// True when the two documents are operationally identical.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
            && self.remotes.is_empty()
            && self.modules.is_empty()
            && self.processes.is_empty()
            && self.jobs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use chassis_core::{Api, Model};
    use pretty_assertions::assert_eq;

    use super::*;

    fn component(name: &str, attrs: serde_json::Map<String, serde_json::Value>) -> ResourceConfig {
        ResourceConfig {
            name: name.to_owned(),
            api: Api::component("sensor").unwrap(),
            model: Model::builtin("fake").unwrap(),
            attributes: attrs,
            depends_on: Vec::new(),
            frame: None,
            log_configuration: None,
            implicit_depends_on: Vec::new(),
        }
    }

    fn attrs(pairs: &[(&str, i64)]) -> serde_json::Map<String, serde_json::Value> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), serde_json::json!(v)))
            .collect()
    }

    #[test]
    fn identical_documents_diff_empty() {
        let cfg = Config {
            components: vec![component("a", attrs(&[]))],
            ..Default::default()
        };
        let diff = ConfigDiff::new(&cfg, &cfg);
        assert!(diff.is_empty());
        assert_eq!(diff.resources.unchanged.len(), 1);
    }

    #[test]
    fn classification_covers_all_four_sets() {
        let prev = Config {
            components: vec![
                component("keep", attrs(&[])),
                component("tweak", attrs(&[("x", 1)])),
                component("drop", attrs(&[])),
            ],
            ..Default::default()
        };
        let next = Config {
            components: vec![
                component("keep", attrs(&[])),
                component("tweak", attrs(&[("x", 2)])),
                component("new", attrs(&[])),
            ],
            ..Default::default()
        };
        let diff = ConfigDiff::new(&prev, &next);
        assert_eq!(diff.resources.unchanged[0].name, "keep");
        assert_eq!(diff.resources.modified[0].name, "tweak");
        assert_eq!(diff.resources.added[0].name, "new");
        assert_eq!(diff.resources.removed[0].name, "drop");
    }

    #[test]
    fn rename_is_remove_plus_add() {
        let prev = Config {
            components: vec![component("one", attrs(&[]))],
            ..Default::default()
        };
        let next = Config {
            components: vec![component("two", attrs(&[]))],
            ..Default::default()
        };
        let diff = ConfigDiff::new(&prev, &next);
        assert_eq!(diff.resources.removed[0].name, "one");
        assert_eq!(diff.resources.added[0].name, "two");
        assert!(diff.resources.modified.is_empty());
    }

    #[test]
    fn implicit_deps_do_not_mark_modified() {
        let prev = Config {
            components: vec![component("a", attrs(&[]))],
            ..Default::default()
        };
        let mut next = prev.clone();
        next.components[0].implicit_depends_on = vec!["arm1".to_owned()];
        assert!(ConfigDiff::new(&prev, &next).is_empty());
    }

    #[test]
    fn job_schedule_change_is_modification() {
        let job = |schedule: &str| JobConfig {
            name: "j".into(),
            schedule: schedule.into(),
            resource: "s".into(),
            method: "GetReadings".into(),
            command: serde_json::Map::new(),
            log_configuration: None,
        };
        let prev = Config {
            jobs: vec![job("5s")],
            ..Default::default()
        };
        let next = Config {
            jobs: vec![job("10s")],
            ..Default::default()
        };
        let diff = ConfigDiff::new(&prev, &next);
        assert_eq!(diff.jobs.modified.len(), 1);
        assert_eq!(diff.jobs.modified[0].schedule, "10s");
    }

    #[test]
    fn services_and_components_share_the_resource_set() {
        let mut svc = component("dup", attrs(&[]));
        svc.api = Api::service("navigation").unwrap();
        let prev = Config::default();
        let next = Config {
            components: vec![component("dup", attrs(&[]))],
            services: vec![svc],
            ..Default::default()
        };
        let diff = ConfigDiff::new(&prev, &next);
        // Different APIs, so both count as additions.
        assert_eq!(diff.resources.added.len(), 2);
    }
}
