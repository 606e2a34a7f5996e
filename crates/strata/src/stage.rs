//! Build stages and stage propagation
//!
//! Every compilable module is assigned one of three ordered stages. A module
//! needed while bootstrapping drags all of its dependencies into the bootstrap
//! stage as well; the propagation pass computes that closure once and freezes
//! it into a [`StageMap`] read by all later passes.

use std::{fmt, str::FromStr};

use log::{debug, trace};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::module_graph::{ModuleGraph, ModuleId};

/// Phase of self-construction, ordered by how early it runs
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// Built by the mini builder to produce the primary builder
    Bootstrap,
    /// Built by the primary builder's own bootstrap manifest
    #[default]
    Primary,
    /// The final project manifest
    Main,
}

impl Stage {
    pub const ALL: [Self; 3] = [Self::Bootstrap, Self::Primary, Self::Main];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bootstrap => "bootstrap",
            Self::Primary => "primary",
            Self::Main => "main",
        }
    }

    /// The stage the external stage chooser hands off to once this stage's
    /// manifest fragment is current
    pub fn next(self) -> Option<Self> {
        match self {
            Self::Bootstrap => Some(Self::Primary),
            Self::Primary => Some(Self::Main),
            Self::Main => None,
        }
    }

    /// File name of the manifest fragment produced for this stage
    pub fn fragment_name(self) -> &'static str {
        match self {
            Self::Bootstrap => "bootstrap.ninja.in",
            Self::Primary => "primary.ninja.in",
            Self::Main => "main.ninja.in",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|stage| stage.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown stage `{s}` (expected bootstrap, primary or main)"))
    }
}

/// Effective stage of every module after propagation. Read-only once built.
#[derive(Debug, Clone, Default)]
pub struct StageMap {
    stages: FxHashMap<ModuleId, Stage>,
}

impl StageMap {
    /// Propagate bootstrap status from every bootstrap module to its direct
    /// dependencies.
    ///
    /// `top_down` must list dependents before their dependencies, so that a
    /// single sweep reaches the transitive closure.
    pub fn propagate(graph: &ModuleGraph, top_down: &[ModuleId]) -> Self {
        let mut stages: FxHashMap<ModuleId, Stage> = graph
            .modules()
            .filter_map(|node| {
                node.descriptor
                    .as_stage_bearer()
                    .map(|bearer| (node.id, bearer.declared_stage()))
            })
            .collect();

        for &id in top_down {
            if stages.get(&id) != Some(&Stage::Bootstrap) {
                continue;
            }
            for &dep in graph.dependencies(id) {
                if let Some(stage) = stages.get_mut(&dep)
                    && *stage != Stage::Bootstrap
                {
                    trace!(
                        "{} pulls {} into the bootstrap stage",
                        graph.module(id).name,
                        graph.module(dep).name
                    );
                    *stage = Stage::Bootstrap;
                }
            }
        }

        debug!(
            "Stage propagation complete: {} bootstrap module(s)",
            stages.values().filter(|s| **s == Stage::Bootstrap).count()
        );
        Self { stages }
    }

    /// Effective stage of a module, `None` when it carries no stage
    pub fn get(&self, id: ModuleId) -> Option<Stage> {
        self.stages.get(&id).copied()
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}
