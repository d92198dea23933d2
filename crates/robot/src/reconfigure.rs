//! The diff-driven reconfiguration engine.
//!
//! One entry point, [`apply`], runs the foreground phases in order:
//!
//! 1. Validate and normalize the incoming document
//! 2. Diff against the last applied document
//! 3. Module host add/modify/remove
//! 4. Remote add/modify/remove and export import
//! 5. Resource removals, dependents-first, close-with-timeout
//! 6. Node upsert, edge wiring (cycles refused), topo-ordered build
//!    with the rebuild-vs-reconfigure decision per node
//! 7. Weak-dependency second pass
//! 8. Managed processes, then jobs
//!
//! A single node failing any phase never aborts the pass; the final
//! report enumerates everything that is not ready. The completion
//! worker re-runs the build and weak phases over the leftovers.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use chassis_config::{
    CollectionDiff, Config, ConfigDiff, ModuleConfig, RemoteConfig, ResourceConfig,
};
use chassis_core::{Model, Name};
use chassis_resource::{Dependencies, NodeRef, NodeState, Resource, ResourceError};

use crate::error::{NodeFailure, RobotError};
use crate::process::ProcessManager;
use crate::remote::RemoteHandle;
use crate::robot::RobotInner;

/// Everything the engine mutates under the reconfigure lock.
pub(crate) struct AppliedState {
    /// The last successfully applied document.
    pub config: Config,
    /// Weak-dependency sets observed at the last weak pass, per node.
    pub weak_deps: HashMap<Name, BTreeSet<Name>>,
    /// Configured remotes by name.
    pub remotes: HashMap<String, RemoteHandle>,
    /// Managed OS processes.
    pub processes: ProcessManager,
}

impl AppliedState {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
            weak_deps: HashMap::new(),
            remotes: HashMap::new(),
            processes: ProcessManager::new(),
        }
    }
}

/// Outcome of resolving one `depends_on` entry.
pub(crate) enum DepResolution {
    /// Exactly one candidate.
    One(Name),
    /// Nothing matched.
    Missing,
    /// A bare name matched more than one source.
    Ambiguous(Vec<Name>),
}

/// Resolve a dependency string against the graph, honoring the
/// prefix-only flag of remotes.
pub(crate) fn resolve_dep(
    graph: &chassis_resource::Graph,
    prefixed: &HashSet<String>,
    dep: &str,
) -> DepResolution {
    let mut candidates = graph.resolve_dependency(dep);
    if !dep.contains(':') {
        // Exports of a prefix-only remote are not reachable bare.
        candidates.retain(|name| match &name.remote {
            Some(chain) => {
                let root = chain.split(':').next().unwrap_or(chain);
                !prefixed.contains(root)
            }
            None => true,
        });
    }
    match candidates.len() {
        0 => DepResolution::Missing,
        1 => DepResolution::One(candidates.remove(0)),
        _ => DepResolution::Ambiguous(candidates),
    }
}

/// Apply a new configuration document. Caller holds the state lock.
pub(crate) async fn apply(
    inner: &Arc<RobotInner>,
    state: &mut AppliedState,
    mut new: Config,
) -> Result<(), RobotError> {
    new.ensure_valid()?;
    let diff = ConfigDiff::new(&state.config, &new);
    tracing::info!(
        added = diff.resources.added.len(),
        modified = diff.resources.modified.len(),
        removed = diff.resources.removed.len(),
        "reconfiguring"
    );

    apply_modules(inner, &diff.modules).await;
    let remote_failures = apply_remotes(inner, state, &diff.remotes).await;
    apply_removals(inner, state, &diff.resources).await;
    upsert_nodes(inner, &diff.resources);

    let built = build_pass(inner).await;
    weak_pass(inner, state, &built).await;

    let process_failures = state.processes.reconfigure(&diff.processes).await;
    inner.jobs.lock().await.reconfigure(&diff.jobs).await;

    state.config = new;
    report(inner, remote_failures, process_failures)
}

/// The completion worker's pass: re-dial offline remotes, re-sync
/// online ones, then retry unresolved and errored nodes.
pub(crate) async fn completion_pass(inner: &Arc<RobotInner>) {
    let mut state = inner.state.lock().await;

    let remote_names: Vec<String> = state.remotes.keys().cloned().collect();
    for name in remote_names {
        let Some(handle) = state.remotes.get_mut(&name) else {
            continue;
        };
        if !handle.online() {
            if let Err(err) = connect_remote(inner, handle).await {
                tracing::debug!(remote = %name, error = %err, "remote still unreachable");
                continue;
            }
        }
        sync_remote(inner, handle).await;
    }

    let retry = inner.shared.graph.read().names_needing_retry();
    if !retry.is_empty() {
        tracing::debug!(count = retry.len(), "retrying unresolved resources");
    }
    let built = build_pass(inner).await;
    weak_pass(inner, &mut state, &built).await;
}

// ── Modules ────────────────────────────────────────────────────────────────

async fn apply_modules(inner: &Arc<RobotInner>, diff: &CollectionDiff<ModuleConfig>) {
    let Some(manager) = &inner.module_manager else {
        if !diff.added.is_empty() || !diff.modified.is_empty() {
            tracing::error!("config declares modules but no module manager is attached");
        }
        return;
    };

    for removed in &diff.removed {
        if let Err(err) = manager.remove_module(&removed.name).await {
            tracing::error!(module = %removed.name, error = %err, "failed to remove module");
        }
    }
    for modified in &diff.modified {
        // Replace: the old module process goes away first.
        let _ = manager.remove_module(&modified.name).await;
        if let Err(err) = manager.add_module(modified).await {
            tracing::error!(module = %modified.name, error = %err, "failed to restart module");
        }
    }
    for added in &diff.added {
        if let Err(err) = manager.add_module(added).await {
            tracing::error!(module = %added.name, error = %err, "failed to start module");
        }
    }
}

// ── Remotes ────────────────────────────────────────────────────────────────

async fn apply_remotes(
    inner: &Arc<RobotInner>,
    state: &mut AppliedState,
    diff: &CollectionDiff<RemoteConfig>,
) -> Vec<NodeFailure> {
    let mut failures = Vec::new();

    for removed in &diff.removed {
        remove_remote(inner, state, &removed.name).await;
    }
    for config in diff.modified.iter().chain(diff.added.iter()) {
        if state.remotes.contains_key(&config.name) {
            remove_remote(inner, state, &config.name).await;
        }
        if config.prefix {
            inner
                .shared
                .prefixed_remotes
                .write()
                .insert(config.name.clone());
        }

        let mut handle = RemoteHandle::new(config.clone());
        match connect_remote(inner, &mut handle).await {
            Ok(()) => sync_remote(inner, &mut handle).await,
            Err(err) => {
                tracing::warn!(remote = %config.name, error = %err,
                    "remote offline, will retry in background");
                failures.push(NodeFailure {
                    name: config.name.clone(),
                    error: err.to_string(),
                });
            }
        }
        state.remotes.insert(config.name.clone(), handle);
    }

    failures
}

/// Dial a remote and start forwarding its change signal into the
/// completion trigger.
async fn connect_remote(
    inner: &Arc<RobotInner>,
    handle: &mut RemoteHandle,
) -> Result<(), ResourceError> {
    let remote = handle.config.name.clone();
    let dialer = inner
        .remote_dialer
        .as_ref()
        .ok_or_else(|| ResourceError::RemoteUnavailable {
            remote: remote.clone(),
            message: "no remote dialer attached".into(),
        })?;
    let client = dialer
        .dial(&handle.config)
        .await
        .map_err(|err| ResourceError::RemoteUnavailable {
            remote: remote.clone(),
            message: err.to_string(),
        })?;
    tracing::info!(remote = %remote, "connected to remote");

    let mut changes = client.changes();
    let trigger = inner.trigger_tx.clone();
    let cancel = inner.cancel.clone();
    handle.stop_forwarder();
    handle.forwarder = Some(tokio::spawn(async move {
        loop {
            tokio::select! {
                () = cancel.cancelled() => return,
                changed = changes.changed() => {
                    let _ = trigger.try_send(());
                    if changed.is_err() {
                        // Client dropped; the trigger above lets the
                        // completion worker notice the outage.
                        return;
                    }
                }
            }
        }
    }));
    handle.client = Some(client);
    Ok(())
}

/// Reconcile one remote's exports with the local graph.
pub(crate) async fn sync_remote(inner: &Arc<RobotInner>, handle: &mut RemoteHandle) {
    let Some(client) = handle.client.clone() else {
        return;
    };
    let remote = handle.config.name.clone();

    let exported = match client.resource_names().await {
        Ok(exported) => exported,
        Err(err) => {
            tracing::warn!(remote = %remote, error = %err,
                "remote unreachable, dropping its resources");
            handle.client = None;
            handle.stop_forwarder();
            let imported = std::mem::take(&mut handle.imported);
            for name in imported {
                remove_import(inner, &name).await;
            }
            return;
        }
    };

    let desired: HashMap<Name, Name> = exported
        .into_iter()
        .map(|orig| (orig.with_remote(&remote), orig))
        .collect();

    let stale: Vec<Name> = handle
        .imported
        .iter()
        .filter(|name| !desired.contains_key(name))
        .cloned()
        .collect();
    for name in stale {
        remove_import(inner, &name).await;
        handle.imported.retain(|n| n != &name);
    }

    for (imported, orig) in desired {
        if handle.imported.contains(&imported) {
            continue;
        }
        match client.resource(&orig).await {
            Ok(proxy) => {
                let mut graph = inner.shared.graph.write();
                if graph.contains(&imported) {
                    continue;
                }
                match graph.add_node(imported.clone(), import_placeholder(&imported)) {
                    Ok(node) => {
                        node.write().mark_ready(proxy);
                        tracing::info!(resource = %imported, "imported remote resource");
                        handle.imported.push(imported);
                    }
                    Err(err) => {
                        tracing::error!(resource = %imported, error = %err,
                            "failed to import remote resource");
                    }
                }
            }
            Err(err) => {
                tracing::warn!(resource = %imported, error = %err,
                    "could not fetch remote resource");
            }
        }
    }
}

/// A synthetic declared config for an imported node; imports are never
/// built locally, so only the name and api matter.
fn import_placeholder(name: &Name) -> ResourceConfig {
    ResourceConfig {
        name: name.name.clone(),
        api: name.api.clone(),
        model: Model::builtin("imported").expect("static model"),
        attributes: serde_json::Map::new(),
        depends_on: Vec::new(),
        frame: None,
        log_configuration: None,
        implicit_depends_on: Vec::new(),
    }
}

/// Remove one imported node; local dependents lose the dependency, get
/// their instances closed, and wait unresolved for a reconnect.
async fn remove_import(inner: &Arc<RobotInner>, name: &Name) {
    let (node, dependents) = {
        let mut graph = inner.shared.graph.write();
        let dependents = graph.parents(name);
        let node = graph.force_remove(name);
        (node, dependents)
    };
    if let Some(node) = node {
        let instance = node.write().take_instance();
        let _ = close_instance(inner, name, instance).await;
        tracing::info!(resource = %name, "dropped remote resource");
    }
    for dependent in dependents {
        if dependent.is_remote() {
            continue;
        }
        let Some(dep_node) = inner.shared.graph.read().node(&dependent) else {
            continue;
        };
        let instance = dep_node.write().take_instance();
        let _ = close_instance(inner, &dependent, instance).await;
        dep_node.write().mark_unresolved(vec![name.short_name()]);
    }
}

async fn remove_remote(inner: &Arc<RobotInner>, state: &mut AppliedState, name: &str) {
    inner.shared.prefixed_remotes.write().remove(name);
    let Some(mut handle) = state.remotes.remove(name) else {
        return;
    };
    tracing::info!(remote = %name, "removing remote");
    handle.stop_forwarder();
    let imported = std::mem::take(&mut handle.imported);
    for imported_name in imported {
        remove_import(inner, &imported_name).await;
    }
    if let Some(client) = handle.client.take() {
        if let Err(err) = client.close().await {
            tracing::warn!(remote = %name, error = %err, "error closing remote");
        }
    }
}

// ── Resource removal ───────────────────────────────────────────────────────

async fn apply_removals(
    inner: &Arc<RobotInner>,
    state: &mut AppliedState,
    diff: &CollectionDiff<ResourceConfig>,
) {
    let removed_names: HashSet<Name> = diff
        .removed
        .iter()
        .filter_map(|config| config.resource_name().ok())
        .collect();

    for name in &removed_names {
        if !inner.shared.graph.read().contains(name) {
            continue;
        }
        // Dependents-first walk over everything that can reach the
        // removed node.
        let closure = inner.shared.graph.read().reverse_reachable(name);
        for member in closure {
            if member.is_remote() {
                continue;
            }
            let Some(node) = inner.shared.graph.read().node(&member) else {
                continue;
            };
            let instance = node.write().take_instance();
            let close_result = close_instance(inner, &member, instance).await;

            if removed_names.contains(&member) {
                if close_result.is_err() {
                    node.write().mark_removing();
                }
                notify_module_removed(inner, &member, &node).await;
                inner.shared.graph.write().force_remove(&member);
                state.weak_deps.remove(&member);
                tracing::info!(resource = %member, "removed resource");
            } else {
                // Still configured; it rebuilds once its remaining
                // dependencies settle.
                node.write().mark_unresolved(vec![name.short_name()]);
            }
        }
    }
}

/// Tell the module host when one of its resources goes away.
async fn notify_module_removed(inner: &Arc<RobotInner>, name: &Name, node: &NodeRef) {
    let Some(manager) = &inner.module_manager else {
        return;
    };
    let (api, model) = {
        let guard = node.read();
        (guard.declared().api.clone(), guard.declared().model.clone())
    };
    if !inner.registry.contains(&api, &model) && manager.provides(&api, &model) {
        if let Err(err) = manager.remove_resource(name).await {
            tracing::warn!(resource = %name, error = %err, "module resource removal failed");
        }
    }
}

// ── Node upsert and build ──────────────────────────────────────────────────

fn upsert_nodes(inner: &Arc<RobotInner>, diff: &CollectionDiff<ResourceConfig>) {
    for config in diff.added.iter().chain(diff.modified.iter()) {
        let Ok(name) = config.resource_name() else {
            // ensure_valid already parsed every name.
            continue;
        };
        let validated = validate_config(inner, config);
        let mut graph = inner.shared.graph.write();
        let exists = graph.contains(&name);
        match validated {
            Ok(validated) => {
                if exists {
                    let _ = graph.replace_declared(&name, validated);
                } else {
                    let _ = graph.add_node(name, validated);
                }
            }
            Err(err) => {
                let node = if exists {
                    let _ = graph.replace_declared(&name, config.clone());
                    graph.node(&name)
                } else {
                    graph.add_node(name.clone(), config.clone()).ok()
                };
                if let Some(node) = node {
                    node.write().mark_errored(err.to_string());
                }
                tracing::error!(resource = %name, error = %err, "config validation failed");
            }
        }
    }
}

/// Run the model's validator, filling implicit dependencies.
fn validate_config(
    inner: &Arc<RobotInner>,
    config: &ResourceConfig,
) -> Result<ResourceConfig, ResourceError> {
    let mut config = config.clone();
    if let Some(registration) = inner.registry.lookup(&config.api, &config.model) {
        if let Some(validator) = &registration.validator {
            config.implicit_depends_on = validator(&config)?;
        }
    }
    Ok(config)
}

fn strong_dep_strings(declared: &ResourceConfig) -> Vec<String> {
    let mut deps: Vec<String> = Vec::new();
    for dep in declared
        .depends_on
        .iter()
        .chain(declared.implicit_depends_on.iter())
    {
        if !deps.contains(dep) {
            deps.push(dep.clone());
        }
    }
    deps
}

/// Wire edges and build every local node that is not ready, in
/// topological order. Returns the names that became ready.
pub(crate) async fn build_pass(inner: &Arc<RobotInner>) -> HashSet<Name> {
    let mut built = HashSet::new();

    // Wire strong-dependency edges first so the walk order is right.
    // Cycles are refused per node; everything else proceeds.
    let mut wire_failed: HashSet<Name> = HashSet::new();
    {
        let prefixed = inner.shared.prefixed_remotes.read().clone();
        let mut graph = inner.shared.graph.write();
        let pending: Vec<Name> = graph
            .names()
            .into_iter()
            .filter(|name| !name.is_remote())
            .filter(|name| {
                graph.node(name).is_some_and(|node| {
                    !matches!(node.read().state(), NodeState::Ready | NodeState::Removing)
                })
            })
            .collect();

        for name in pending {
            let Some(node) = graph.node(&name) else {
                continue;
            };
            let declared = node.read().declared().clone();
            graph.remove_children(&name);
            for dep in strong_dep_strings(&declared) {
                if let DepResolution::One(dep_name) = resolve_dep(&graph, &prefixed, &dep) {
                    if let Err(err) = graph.add_child(&name, &dep_name) {
                        tracing::error!(resource = %name, error = %err, "dependency cycle");
                        node.write().mark_errored(err.to_string());
                        graph.remove_children(&name);
                        wire_failed.insert(name.clone());
                        break;
                    }
                }
                // Missing and ambiguous entries surface during the
                // readiness check below.
            }
        }
    }

    let order = inner.shared.graph.read().topological_sort();
    for name in order {
        if name.is_remote() || wire_failed.contains(&name) {
            continue;
        }
        let Some(node) = inner.shared.graph.read().node(&name) else {
            continue;
        };
        if matches!(node.read().state(), NodeState::Ready | NodeState::Removing) {
            continue;
        }
        let declared = node.read().declared().clone();

        let deps = {
            let graph = inner.shared.graph.read();
            let prefixed = inner.shared.prefixed_remotes.read();
            let mut deps = Dependencies::new();
            let mut missing: Vec<String> = Vec::new();
            let mut ambiguous: Option<(String, Vec<Name>)> = None;
            for dep in strong_dep_strings(&declared) {
                match resolve_dep(&graph, &prefixed, &dep) {
                    DepResolution::One(dep_name) => {
                        let instance = graph
                            .node(&dep_name)
                            .and_then(|n| n.read().resource().ok());
                        match instance {
                            Some(instance) => {
                                deps.insert(dep_name, instance);
                            }
                            None => missing.push(dep),
                        }
                    }
                    DepResolution::Missing => missing.push(dep),
                    DepResolution::Ambiguous(candidates) => {
                        ambiguous = Some((dep, candidates));
                        break;
                    }
                }
            }
            if let Some((dep, candidates)) = ambiguous {
                node.write().mark_unresolved_ambiguous(
                    &dep,
                    candidates.iter().map(ToString::to_string).collect(),
                );
                continue;
            }
            if !missing.is_empty() {
                node.write().mark_unresolved(missing);
                continue;
            }
            deps
        };

        build_node(inner, &name, &node, declared, deps).await;
        if node.read().state() == NodeState::Ready {
            built.insert(name);
        }
    }

    built
}

/// Build or reconfigure one node whose strong deps are all ready.
async fn build_node(
    inner: &Arc<RobotInner>,
    name: &Name,
    node: &NodeRef,
    declared: ResourceConfig,
    deps: Dependencies,
) {
    if let Err(err) = validate_config(inner, &declared).map(drop) {
        node.write().mark_errored(err.to_string());
        return;
    }

    let registration = inner.registry.lookup(&declared.api, &declared.model);
    let modular = registration.is_none()
        && inner
            .module_manager
            .as_ref()
            .is_some_and(|m| m.provides(&declared.api, &declared.model));
    let always_rebuild = registration.as_ref().is_some_and(|r| r.always_rebuild);

    let old_instance = node.read().instance();
    let same_model = node.read().built_model() == Some(&declared.model);

    if let Some(instance) = old_instance.clone() {
        if same_model && !always_rebuild {
            let budget = inner.options.construction_timeout;
            let attempt = tokio::time::timeout(budget, async {
                if modular {
                    match &inner.module_manager {
                        Some(manager) => manager.reconfigure_resource(&declared, &deps).await,
                        None => Err(ResourceError::NotReconfigurable),
                    }
                } else {
                    instance.reconfigure(&deps, &declared).await
                }
            })
            .await;
            match attempt {
                Ok(Ok(())) => {
                    tracing::info!(resource = %name, "reconfigured resource in place");
                    node.write().mark_reconfigured();
                    return;
                }
                Ok(Err(ResourceError::NotReconfigurable)) => {
                    // Fall through to a rebuild.
                }
                Ok(Err(err)) => {
                    tracing::error!(resource = %name, error = %err, "reconfigure failed");
                    node.write().mark_errored(err.to_string());
                    return;
                }
                Err(_) => {
                    node.write()
                        .mark_errored(ResourceError::Timeout { budget }.to_string());
                    return;
                }
            }
        }
        // Rebuild: the old instance goes first.
        let taken = node.write().take_instance();
        let _ = close_instance(inner, name, taken).await;
    }

    let replacing = old_instance.is_some();
    let budget = inner.options.construction_timeout;
    let constructed = tokio::time::timeout(budget, async {
        if modular {
            match &inner.module_manager {
                Some(manager) => manager.add_resource(&declared, &deps).await,
                None => Err(ResourceError::Other("module manager detached".into())),
            }
        } else if let Some(registration) = &registration {
            (registration.constructor)(declared.clone(), deps.clone()).await
        } else {
            Err(ResourceError::Other(format!(
                "model {} not registered",
                declared.model
            )))
        }
    })
    .await;

    match constructed {
        Ok(Ok(instance)) => {
            tracing::info!(resource = %name, model = %declared.model, "built resource");
            node.write().mark_ready(instance);
            if replacing {
                mark_dependents_for_update(inner, name);
            }
        }
        Ok(Err(err)) => {
            tracing::error!(resource = %name, error = %err, "failed to build resource");
            node.write().mark_errored(err.to_string());
        }
        Err(_) => {
            tracing::error!(resource = %name, ?budget, "resource construction timed out");
            node.write()
                .mark_errored(ResourceError::Timeout { budget }.to_string());
        }
    }
}

/// A rebuilt instance invalidates the copies its dependents hold; send
/// ready dependents back through the build pass. They come after this
/// node in topological order, so the current pass picks them up.
fn mark_dependents_for_update(inner: &Arc<RobotInner>, name: &Name) {
    let graph = inner.shared.graph.read();
    for dependent in graph.parents(name) {
        if dependent.is_remote() {
            continue;
        }
        if let Some(node) = graph.node(&dependent) {
            let mut guard = node.write();
            if guard.state() == NodeState::Ready {
                let declared = guard.declared().clone();
                guard.set_declared(declared);
            }
        }
    }
}

// ── Weak dependencies ──────────────────────────────────────────────────────

/// Second pass: every node whose model registered a weak-dependency
/// matcher gets reconfigured with the matching ready resources. Skipped
/// when neither the node nor its weak set changed.
pub(crate) async fn weak_pass(
    inner: &Arc<RobotInner>,
    state: &mut AppliedState,
    built: &HashSet<Name>,
) {
    let candidates: Vec<(Name, NodeRef)> = {
        let graph = inner.shared.graph.read();
        graph
            .names_in_state(NodeState::Ready)
            .into_iter()
            .filter(|name| !name.is_remote())
            .filter_map(|name| graph.node(&name).map(|node| (name, node)))
            .collect()
    };

    for (name, node) in candidates {
        let declared = node.read().declared().clone();
        let Some(registration) = inner.registry.lookup(&declared.api, &declared.model) else {
            continue;
        };
        let Some(matcher) = registration.weak_dependencies.clone() else {
            continue;
        };

        let weak_names: BTreeSet<Name> = {
            let graph = inner.shared.graph.read();
            graph
                .names_in_state(NodeState::Ready)
                .into_iter()
                .filter(|candidate| candidate != &name && matcher(candidate))
                .collect()
        };

        let unchanged = !built.contains(&name) && state.weak_deps.get(&name) == Some(&weak_names);
        if unchanged {
            continue;
        }

        // Strong deps plus the weak set, no edges created.
        let mut deps = Dependencies::new();
        {
            let graph = inner.shared.graph.read();
            let prefixed = inner.shared.prefixed_remotes.read();
            for dep in strong_dep_strings(&declared) {
                if let DepResolution::One(dep_name) = resolve_dep(&graph, &prefixed, &dep) {
                    if let Some(instance) =
                        graph.node(&dep_name).and_then(|n| n.read().resource().ok())
                    {
                        deps.insert(dep_name, instance);
                    }
                }
            }
            for weak_name in &weak_names {
                if let Some(instance) = graph
                    .node(weak_name)
                    .and_then(|n| n.read().resource().ok())
                {
                    deps.insert(weak_name.clone(), instance);
                }
            }
        }

        let Some(instance) = node.read().instance() else {
            continue;
        };
        let budget = inner.options.construction_timeout;
        let attempt =
            tokio::time::timeout(budget, instance.reconfigure(&deps, &declared)).await;
        match attempt {
            Ok(Ok(())) => {
                tracing::debug!(resource = %name, weak = weak_names.len(),
                    "weak dependencies applied");
                node.write().mark_reconfigured();
                state.weak_deps.insert(name, weak_names);
            }
            Ok(Err(ResourceError::NotReconfigurable)) => {
                // The model asked for weak deps but cannot take them in
                // place; rebuild with the expanded set. build_node closes
                // the old instance and refreshes dependents.
                build_node(inner, &name, &node, declared, deps).await;
                if node.read().state() == NodeState::Ready {
                    state.weak_deps.insert(name, weak_names);
                }
            }
            Ok(Err(err)) => {
                tracing::error!(resource = %name, error = %err, "weak-dependency pass failed");
                node.write().mark_errored(err.to_string());
            }
            Err(_) => {
                node.write()
                    .mark_errored(ResourceError::Timeout { budget }.to_string());
            }
        }
    }
}

// ── Teardown and reporting ─────────────────────────────────────────────────

/// Close an instance within the close budget. On timeout the close
/// continues in a detached task and an error is returned.
async fn close_instance(
    inner: &Arc<RobotInner>,
    name: &Name,
    instance: Option<Arc<dyn Resource>>,
) -> Result<(), String> {
    let Some(instance) = instance else {
        return Ok(());
    };
    tracing::info!(resource = %name, "closing resource");
    let mut task = tokio::spawn(async move { instance.close().await });
    match tokio::time::timeout(inner.options.close_timeout, &mut task).await {
        Ok(Ok(Ok(()))) => Ok(()),
        Ok(Ok(Err(err))) => {
            tracing::error!(resource = %name, error = %err, "error closing resource");
            Err(err.to_string())
        }
        Ok(Err(join_err)) => {
            tracing::error!(resource = %name, error = %join_err, "close task failed");
            Err(join_err.to_string())
        }
        Err(_) => {
            tracing::warn!(resource = %name, "close timed out, detaching");
            Err(format!(
                "close timed out after {:?}",
                inner.options.close_timeout
            ))
        }
    }
}

/// Shutdown path: close every resource dependents-first, then remotes,
/// then processes. Returns close failures for reporting.
pub(crate) async fn close_all(
    inner: &Arc<RobotInner>,
    state: &mut AppliedState,
) -> Vec<NodeFailure> {
    let mut failures = Vec::new();

    let order = inner.shared.graph.read().reverse_topological_sort();
    for name in order {
        let Some(node) = inner.shared.graph.read().node(&name) else {
            continue;
        };
        let instance = node.write().take_instance();
        if let Err(err) = close_instance(inner, &name, instance).await {
            failures.push(NodeFailure {
                name: name.to_string(),
                error: err,
            });
        }
        inner.shared.graph.write().force_remove(&name);
    }

    for (name, mut handle) in state.remotes.drain() {
        handle.stop_forwarder();
        if let Some(client) = handle.client.take() {
            if let Err(err) = client.close().await {
                failures.push(NodeFailure {
                    name: name.clone(),
                    error: err.to_string(),
                });
            }
        }
    }
    inner.shared.prefixed_remotes.write().clear();

    state.processes.close().await;
    state.weak_deps.clear();
    state.config = Config::default();

    failures
}

/// The consolidated result of a reconfiguration.
fn report(
    inner: &Arc<RobotInner>,
    remote_failures: Vec<NodeFailure>,
    process_failures: Vec<(String, String)>,
) -> Result<(), RobotError> {
    let mut failures = remote_failures;

    {
        let graph = inner.shared.graph.read();
        for name in graph.names() {
            if name.is_remote() {
                continue;
            }
            let Some(node) = graph.node(&name) else {
                continue;
            };
            let guard = node.read();
            let error = match guard.state() {
                NodeState::Ready => continue,
                NodeState::Errored => guard
                    .last_err()
                    .unwrap_or("construction failed")
                    .to_owned(),
                NodeState::Unresolved | NodeState::Configuring => match guard.last_err() {
                    Some(err) => err.to_owned(),
                    None => format!(
                        "unresolved dependencies: {:?}",
                        guard.unresolved_deps()
                    ),
                },
                NodeState::Removing => "stuck closing".to_owned(),
            };
            failures.push(NodeFailure {
                name: name.to_string(),
                error,
            });
        }
    }

    for (id, error) in process_failures {
        failures.push(NodeFailure {
            name: format!("process {id}"),
            error,
        });
    }

    if failures.is_empty() {
        Ok(())
    } else {
        Err(RobotError::Incomplete { failures })
    }
}
