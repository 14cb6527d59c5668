//! The plugin kernel (§4.7): dependency-ordered init/destroy, the
//! transaction pipeline, and schema aggregation.
//!
//! No single teacher file matches this one-to-one; modeled after the
//! teacher's actor registration/lifecycle discipline (explicit, ordered
//! init/shutdown) together with the dependency-ordered registry shape of
//! `other_examples/c203af4c darianrosebrook-sterling-native
//! operator_registry.rs`.

use std::collections::{BTreeMap, VecDeque};

use crate::error::{CoreError, CoreResult};
use crate::keymap::KeyEvent;
use crate::model::{ContentState, Transaction};

/// A toolbar/menu contribution a plugin adds to the aggregated schema.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolbarItem {
    pub name: String,
    pub order: i32,
}

/// What a plugin contributes to the editor's aggregate schema (§4.7).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PluginSchema {
    pub node_types: Vec<String>,
    pub mark_types: Vec<String>,
    pub toolbar_items: Vec<ToolbarItem>,
}

/// A unit of collaborative-editing behaviour. Implementors declare their
/// `name`/`depends_on` for topological ordering, optionally contribute to
/// the schema, and can veto or rewrite in-flight transactions.
pub trait Plugin: Send + Sync {
    fn name(&self) -> &str;

    fn depends_on(&self) -> &[String] {
        &[]
    }

    fn schema(&self) -> PluginSchema {
        PluginSchema::default()
    }

    fn on_init(&self) {}

    fn on_destroy(&self) {}

    /// Observes (and may veto) a transaction before it's applied.
    /// Returning `None` aborts the whole transaction (§4.7).
    fn on_transaction(&self, state: &ContentState, tr: Transaction) -> Option<Transaction> {
        let _ = state;
        Some(tr)
    }

    /// Notified after a transaction has been applied and the editor's
    /// listeners have fired, with the state just before and just after.
    fn on_update(&self, prev: &ContentState, next: &ContentState) {
        let _ = (prev, next);
    }

    /// Runs before the keymap lookup (§4.7/§4.8). Returning `true`
    /// consumes the event: no later plugin or the keymap itself sees it.
    fn on_key_down(&self, event: &KeyEvent, ctx: &ContentState) -> bool {
        let _ = (event, ctx);
        false
    }
}

/// Registers plugins, initialises/destroys them in dependency order, and
/// folds transactions through every registered `on_transaction`.
pub struct PluginRegistry {
    order: Vec<String>,
    plugins: BTreeMap<String, Box<dyn Plugin>>,
    initialized: bool,
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self {
            order: Vec::new(),
            plugins: BTreeMap::new(),
            initialized: false,
        }
    }

    /// Registers `plugin`, re-deriving the dependency order. Fails without
    /// mutating the registry if a name collides, a dependency is unknown,
    /// the resulting graph has a cycle, or the registry is already locked
    /// by a prior `init_all` (§4.7: registration is locked after the
    /// first `init_all`; re-registration raises `Locked`).
    pub fn register(&mut self, plugin: Box<dyn Plugin>) -> CoreResult<()> {
        let name = plugin.name().to_string();
        if self.initialized {
            return Err(CoreError::Locked { name });
        }
        if self.plugins.contains_key(&name) {
            return Err(CoreError::AlreadyRegistered { name });
        }
        for dep in plugin.depends_on() {
            if !self.plugins.contains_key(dep) {
                return Err(CoreError::UnknownPlugin {
                    dependent: name.clone(),
                    dependency: dep.clone(),
                });
            }
        }

        let mut plugins = std::mem::take(&mut self.plugins);
        plugins.insert(name, plugin);
        let order = topological_order(&plugins)?;
        self.plugins = plugins;
        self.order = order;
        Ok(())
    }

    /// Calls `on_init` on every registered plugin, once, in dependency
    /// order, then locks the registry against further `register` calls
    /// (§4.7). A second call is a no-op.
    pub fn init_all(&mut self) {
        if self.initialized {
            return;
        }
        for name in &self.order {
            if let Some(plugin) = self.plugins.get(name) {
                plugin.on_init();
            }
        }
        self.initialized = true;
    }

    pub fn is_locked(&self) -> bool {
        self.initialized
    }

    /// Destroys every plugin in reverse init order and unlocks the
    /// registry for a fresh round of registration.
    pub fn destroy_all(&mut self) {
        for name in self.order.clone().into_iter().rev() {
            if let Some(plugin) = self.plugins.get(&name) {
                plugin.on_destroy();
            }
        }
        self.plugins.clear();
        self.order.clear();
        self.initialized = false;
    }

    /// Folds `tr` through every plugin's `on_transaction` in dependency
    /// order. Any plugin returning `None` aborts the whole transaction
    /// (§4.7, §8.1 atomicity).
    pub fn run_transaction(&self, state: &ContentState, tr: Transaction) -> Option<Transaction> {
        let mut current = tr;
        for name in &self.order {
            let plugin = self.plugins.get(name)?;
            current = plugin.on_transaction(state, current)?;
        }
        Some(current)
    }

    /// Notifies every plugin's `on_update` in dependency order.
    pub fn notify_update(&self, prev: &ContentState, next: &ContentState) {
        for name in &self.order {
            if let Some(plugin) = self.plugins.get(name) {
                plugin.on_update(prev, next);
            }
        }
    }

    /// Runs `on_key_down` on every plugin in init order; the first that
    /// returns `true` consumes the event (§4.7).
    pub fn dispatch_key(&self, event: &KeyEvent, ctx: &ContentState) -> bool {
        for name in &self.order {
            if let Some(plugin) = self.plugins.get(name) {
                if plugin.on_key_down(event, ctx) {
                    return true;
                }
            }
        }
        false
    }

    /// Aggregates every registered plugin's schema contribution, toolbar
    /// items sorted by `order` (§4.7).
    pub fn schema(&self) -> PluginSchema {
        let mut node_types = Vec::new();
        let mut mark_types = Vec::new();
        let mut toolbar_items = Vec::new();
        for name in &self.order {
            if let Some(plugin) = self.plugins.get(name) {
                let s = plugin.schema();
                node_types.extend(s.node_types);
                mark_types.extend(s.mark_types);
                toolbar_items.extend(s.toolbar_items);
            }
        }
        toolbar_items.sort_by_key(|item| item.order);
        PluginSchema { node_types, mark_types, toolbar_items }
    }

    pub fn init_order(&self) -> &[String] {
        &self.order
    }
}

/// Kahn's algorithm over the registered plugins' `depends_on` edges.
fn topological_order(plugins: &BTreeMap<String, Box<dyn Plugin>>) -> CoreResult<Vec<String>> {
    let mut indegree: BTreeMap<&str, usize> = plugins.keys().map(|n| (n.as_str(), 0)).collect();
    let mut dependents: BTreeMap<&str, Vec<&str>> = BTreeMap::new();

    for (name, plugin) in plugins {
        for dep in plugin.depends_on() {
            *indegree.get_mut(name.as_str()).expect("name is in the map") += 1;
            dependents.entry(dep.as_str()).or_default().push(name.as_str());
        }
    }

    let mut queue: VecDeque<&str> = indegree
        .iter()
        .filter(|(_, &deg)| deg == 0)
        .map(|(&n, _)| n)
        .collect();
    let mut order = Vec::with_capacity(plugins.len());

    while let Some(name) = queue.pop_front() {
        order.push(name.to_string());
        if let Some(deps) = dependents.get(name) {
            for &dependent in deps {
                let deg = indegree.get_mut(dependent).expect("dependent is in the map");
                *deg -= 1;
                if *deg == 0 {
                    queue.push_back(dependent);
                }
            }
        }
    }

    if order.len() != plugins.len() {
        let cycle: Vec<String> = plugins
            .keys()
            .filter(|n| !order.contains(n))
            .cloned()
            .collect();
        return Err(CoreError::CyclicDependency { cycle });
    }
    Ok(order)
}
