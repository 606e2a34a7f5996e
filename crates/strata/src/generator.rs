//! Generation driver
//!
//! One run is a fixed sequence of graph-wide passes. Each pass produces a
//! read-only value consumed by the later ones:
//!
//! 1. plugin collection, then the primary builder's dynamic dependency edges
//! 2. topological ordering
//! 3. stage propagation into a [`StageMap`]
//! 4. artifact derivation and validation into an [`ArtifactMap`]
//! 5. per-module emission, dependencies first
//! 6. the stage orchestrator

use std::sync::Arc;

use log::{debug, info, warn};

use crate::{
    artifacts::ArtifactMap,
    config::Config,
    emitter::ModuleContext,
    error::{GenerateError, ModuleError},
    manifest::Manifest,
    module_graph::ModuleGraph,
    orchestrator::Orchestrator,
    plugins::{PluginSet, wire_dynamic_dependencies},
    rules,
    stage::StageMap,
};

/// Everything one generation run produced, including the errors reported
/// against individual modules
#[derive(Debug)]
pub struct Generation {
    manifest: Manifest,
    errors: Vec<ModuleError>,
    stages: StageMap,
    plugins: PluginSet,
    artifacts: ArtifactMap,
}

impl Generation {
    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub fn errors(&self) -> &[ModuleError] {
        &self.errors
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn stages(&self) -> &StageMap {
        &self.stages
    }

    pub fn plugins(&self) -> &PluginSet {
        &self.plugins
    }

    pub fn artifacts(&self) -> &ArtifactMap {
        &self.artifacts
    }

    /// The manifest, unless any module reported an error
    pub fn into_result(self) -> Result<Manifest, GenerateError> {
        if self.errors.is_empty() {
            Ok(self.manifest)
        } else {
            Err(GenerateError::Modules(self.errors))
        }
    }
}

#[derive(Debug, Clone)]
pub struct Generator {
    config: Arc<Config>,
}

impl Generator {
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run every pass over `graph`.
    ///
    /// Only a dependency cycle fails outright. Module errors are collected
    /// in the returned [`Generation`] so one run surfaces all of them.
    pub fn generate(&self, graph: &mut ModuleGraph) -> Result<Generation, GenerateError> {
        let config = self.config.as_ref();
        info!(
            "Starting generation for stage {} ({} modules)",
            config.stage,
            graph.len()
        );

        let plugins = PluginSet::collect(graph);
        let wired = wire_dynamic_dependencies(graph, &plugins);
        debug!("{} plugin(s), {wired} dynamic dependency edge(s)", plugins.len());

        let order = graph.topological_sort()?;
        let top_down: Vec<_> = order.iter().rev().copied().collect();
        let stages = StageMap::propagate(graph, &top_down);

        let (artifacts, mut errors) = ArtifactMap::derive(graph, &plugins);

        let mut manifest = Manifest::new();
        rules::define_variables(&mut manifest, config);

        let graph: &ModuleGraph = graph;
        for &id in &order {
            let node = graph.module(id);
            if artifacts.get(id).is_none() {
                warn!("Skipping module {} after configuration errors", node.name);
                continue;
            }
            let Some(stage) = stages.get(id) else {
                continue;
            };

            let ctx = ModuleContext {
                graph,
                node,
                config,
                stage,
                plugins: &plugins,
                artifacts: &artifacts,
            };
            debug!("{}: {:?} ({} in {} stage)", node.name, ctx.emission(), stage, config.stage);
            node.descriptor.emitter().emit(&ctx, &mut manifest);
        }

        if let Err(builder_errors) =
            Orchestrator::new(config).emit(graph, &stages, &artifacts, &mut manifest)
        {
            errors.extend(builder_errors);
        }

        info!(
            "Generation complete: {} actions, {} error(s)",
            manifest.actions().len(),
            errors.len()
        );
        Ok(Generation {
            manifest,
            errors,
            stages,
            plugins,
            artifacts,
        })
    }
}
