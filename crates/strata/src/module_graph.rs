//! Module graph: declared modules and their dependency edges
//!
//! Nodes live in a petgraph `DiGraph` for the graph algorithms, while the
//! declaration order of modules and of each module's dependencies is kept
//! separately so every traversal is deterministic.
//!
//! Edges point from a dependency to its dependent, so a topological sort
//! yields dependencies first.

use indexmap::IndexMap;
use log::debug;
use petgraph::{
    algo::{tarjan_scc, toposort},
    graph::{DiGraph, NodeIndex},
};
use rustc_hash::{FxBuildHasher, FxHashMap, FxHashSet};

use crate::{
    descriptor::Descriptor,
    error::{DeclarationError, GenerateError},
};

type FxIndexMap<K, V> = IndexMap<K, V, FxBuildHasher>;

/// Unique identifier for a module
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ModuleId(u32);

impl ModuleId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }
}

/// A declared module and its direct dependencies
#[derive(Debug)]
pub struct ModuleNode {
    pub id: ModuleId,
    pub name: String,
    /// Directory of the module's sources, relative to `$srcDir`
    pub dir: String,
    pub descriptor: Descriptor,
    /// Direct dependencies in declaration order
    deps: Vec<ModuleId>,
}

impl ModuleNode {
    pub fn dependencies(&self) -> &[ModuleId] {
        &self.deps
    }
}

#[derive(Debug, Default)]
pub struct ModuleGraph {
    /// All modules in declaration order
    modules: FxIndexMap<ModuleId, ModuleNode>,
    module_names: FxHashMap<String, ModuleId>,
    graph: DiGraph<ModuleId, ()>,
    node_indices: FxHashMap<ModuleId, NodeIndex>,
    next_module_id: u32,
}

impl ModuleGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a module. Names are unique across the whole graph.
    pub fn add_module(
        &mut self,
        name: impl Into<String>,
        dir: impl Into<String>,
        descriptor: Descriptor,
    ) -> Result<ModuleId, DeclarationError> {
        let name = name.into();
        if self.module_names.contains_key(&name) {
            return Err(DeclarationError::DuplicateModule(name));
        }

        let id = ModuleId::new(self.next_module_id);
        self.next_module_id += 1;

        let node_idx = self.graph.add_node(id);
        self.node_indices.insert(id, node_idx);
        self.module_names.insert(name.clone(), id);

        debug!("Registered module '{name}' ({})", descriptor.kind());
        self.modules.insert(
            id,
            ModuleNode {
                id,
                name,
                dir: dir.into(),
                descriptor,
                deps: Vec::new(),
            },
        );
        Ok(id)
    }

    /// Record that `from` depends on `to`. Repeated edges are ignored.
    pub fn add_dependency(&mut self, from: ModuleId, to: ModuleId) {
        let (Some(&from_idx), Some(&to_idx)) =
            (self.node_indices.get(&from), self.node_indices.get(&to))
        else {
            return;
        };
        if self.graph.contains_edge(to_idx, from_idx) {
            return;
        }
        self.graph.add_edge(to_idx, from_idx, ());
        if let Some(node) = self.modules.get_mut(&from) {
            node.deps.push(to);
        }
    }

    /// Look up a module.
    ///
    /// # Panics
    /// When `id` did not come from this graph.
    pub fn module(&self, id: ModuleId) -> &ModuleNode {
        &self.modules[&id]
    }

    pub fn get(&self, id: ModuleId) -> Option<&ModuleNode> {
        self.modules.get(&id)
    }

    pub fn id_by_name(&self, name: &str) -> Option<ModuleId> {
        self.module_names.get(name).copied()
    }

    /// All modules in declaration order
    pub fn modules(&self) -> impl Iterator<Item = &ModuleNode> {
        self.modules.values()
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Direct dependencies of a module in declaration order
    pub fn dependencies(&self, id: ModuleId) -> &[ModuleId] {
        match self.modules.get(&id) {
            Some(node) => node.dependencies(),
            None => &[],
        }
    }

    /// Modules ordered so that every dependency precedes its dependents
    pub fn topological_sort(&self) -> Result<Vec<ModuleId>, GenerateError> {
        toposort(&self.graph, None)
            .map(|nodes| nodes.into_iter().map(|n| self.graph[n]).collect())
            .map_err(|_| GenerateError::Cycle(self.find_cycle()))
    }

    /// Modules ordered so that every dependent precedes its dependencies
    pub fn top_down_order(&self) -> Result<Vec<ModuleId>, GenerateError> {
        let mut order = self.topological_sort()?;
        order.reverse();
        Ok(order)
    }

    /// Names of the modules forming one dependency cycle, first module
    /// repeated at the end. Empty when the graph is acyclic.
    pub fn find_cycle(&self) -> Vec<String> {
        let Some(component) = tarjan_scc(&self.graph).into_iter().find(|component| {
            component.len() > 1
                || self
                    .graph
                    .contains_edge(component[0], component[0])
        }) else {
            return Vec::new();
        };

        let mut names: Vec<String> = component
            .iter()
            .rev()
            .map(|&idx| self.module(self.graph[idx]).name.clone())
            .collect();
        names.push(names[0].clone());
        names
    }

    /// Visit every transitive dependency of `id` once, dependencies of a
    /// module before the module itself
    pub fn visit_deps_depth_first<'a>(
        &'a self,
        id: ModuleId,
        mut visit: impl FnMut(&'a ModuleNode),
    ) {
        let mut visited = FxHashSet::default();
        visited.insert(id);
        self.walk_deps(id, &mut visited, &mut visit);
    }

    fn walk_deps<'a>(
        &'a self,
        id: ModuleId,
        visited: &mut FxHashSet<ModuleId>,
        visit: &mut impl FnMut(&'a ModuleNode),
    ) {
        for &dep in self.dependencies(id) {
            if visited.insert(dep) {
                self.walk_deps(dep, visited, visit);
                visit(self.module(dep));
            }
        }
    }

    /// Transitive dependencies of `id` in depth-first visiting order
    pub fn transitive_dependencies(&self, id: ModuleId) -> Vec<ModuleId> {
        let mut deps = Vec::new();
        self.visit_deps_depth_first(id, |node| deps.push(node.id));
        deps
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        config::Config,
        descriptor::{ModuleFactory, PackageProperties},
    };

    fn graph_with(names: &[&str]) -> (ModuleGraph, Vec<ModuleId>) {
        let factory = ModuleFactory::new(Arc::new(Config::default()));
        let mut graph = ModuleGraph::new();
        let ids = names
            .iter()
            .map(|name| {
                let descriptor = factory.package(PackageProperties {
                    pkg_path: format!("example/{name}"),
                    ..Default::default()
                });
                graph.add_module(*name, *name, descriptor).unwrap()
            })
            .collect();
        (graph, ids)
    }

    #[test]
    fn test_topological_sort_puts_dependencies_first() {
        let (mut graph, ids) = graph_with(&["main", "utils"]);
        graph.add_dependency(ids[0], ids[1]);

        let sorted = graph.topological_sort().unwrap();
        assert_eq!(sorted, vec![ids[1], ids[0]]);
        assert_eq!(graph.top_down_order().unwrap(), vec![ids[0], ids[1]]);
    }

    #[test]
    fn test_duplicate_names_are_rejected() {
        let (mut graph, _) = graph_with(&["a"]);
        let factory = ModuleFactory::new(Arc::new(Config::default()));
        let err = graph
            .add_module("a", "", factory.package(PackageProperties::default()))
            .unwrap_err();
        assert!(matches!(err, DeclarationError::DuplicateModule(name) if name == "a"));
    }

    #[test]
    fn test_depth_first_visits_each_dependency_once() {
        // top -> (left, right), left -> base, right -> base
        let (mut graph, ids) = graph_with(&["top", "left", "right", "base"]);
        graph.add_dependency(ids[0], ids[1]);
        graph.add_dependency(ids[0], ids[2]);
        graph.add_dependency(ids[1], ids[3]);
        graph.add_dependency(ids[2], ids[3]);
        graph.add_dependency(ids[0], ids[1]);

        assert_eq!(graph.dependencies(ids[0]), &[ids[1], ids[2]]);
        assert_eq!(
            graph.transitive_dependencies(ids[0]),
            vec![ids[3], ids[1], ids[2]]
        );
    }

    #[test]
    fn test_cycle_is_reported_by_name() {
        let (mut graph, ids) = graph_with(&["a", "b", "c"]);
        graph.add_dependency(ids[0], ids[1]);
        graph.add_dependency(ids[1], ids[2]);
        graph.add_dependency(ids[2], ids[0]);

        let err = graph.topological_sort().unwrap_err();
        let GenerateError::Cycle(names) = err else {
            panic!("expected a cycle error");
        };
        assert_eq!(names.len(), 4);
        assert_eq!(names.first(), names.last());
        for name in ["a", "b", "c"] {
            assert!(names.iter().any(|n| n == name));
        }
    }
}
