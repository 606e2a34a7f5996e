//! Plugin discovery
//!
//! Collection runs as its own pass over the whole graph and produces an
//! immutable [`PluginSet`]. Only afterwards are the primary builder's dynamic
//! dependency edges added and any binary emitted, so nothing reads a partially
//! collected set.

use log::debug;

use crate::module_graph::{ModuleGraph, ModuleId};

/// A package registered with the primary builder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plugin {
    pub id: ModuleId,
    pub name: String,
    pub pkg_path: String,
}

/// Plugin packages in module declaration order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PluginSet {
    plugins: Vec<Plugin>,
}

impl PluginSet {
    /// Plugin-flagged packages without a package path are left out; they
    /// fail validation when their artifacts are derived.
    pub fn collect(graph: &ModuleGraph) -> Self {
        let plugins: Vec<Plugin> = graph
            .modules()
            .filter_map(|node| {
                let provider = node.descriptor.as_plugin_provider()?;
                if !provider.is_plugin() {
                    return None;
                }
                if provider.pkg_path().is_empty() {
                    debug!("Ignoring plugin {} without a package path", node.name);
                    return None;
                }
                debug!("Found plugin {} ({})", node.name, provider.pkg_path());
                Some(Plugin {
                    id: node.id,
                    name: node.name.clone(),
                    pkg_path: provider.pkg_path().to_owned(),
                })
            })
            .collect();
        Self { plugins }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Plugin> {
        self.plugins.iter()
    }

    pub fn ids(&self) -> impl Iterator<Item = ModuleId> + '_ {
        self.plugins.iter().map(|p| p.id)
    }

    /// Package paths joined the way the registration generator takes them
    pub fn pkg_paths_arg(&self) -> String {
        self.plugins
            .iter()
            .map(|p| p.pkg_path.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}

/// Make every primary builder depend on every plugin.
///
/// Returns the number of edges added.
pub fn wire_dynamic_dependencies(graph: &mut ModuleGraph, plugins: &PluginSet) -> usize {
    let builders: Vec<ModuleId> = graph
        .modules()
        .filter(|node| node.descriptor.is_primary_builder())
        .map(|node| node.id)
        .collect();

    let mut added = 0;
    for builder in builders {
        for plugin in plugins.ids() {
            if plugin == builder || graph.dependencies(builder).contains(&plugin) {
                continue;
            }
            graph.add_dependency(builder, plugin);
            added += 1;
        }
    }
    added
}
