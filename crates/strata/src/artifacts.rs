//! Derived artifact paths
//!
//! Every output path a module will produce is computed up front in a single
//! pass, before any action is emitted. Emitters and the stage orchestrator
//! only read the resulting [`ArtifactMap`]; descriptors are never mutated.

use log::debug;
use rustc_hash::FxHashMap;

use crate::{
    error::ModuleError,
    module_graph::{ModuleGraph, ModuleId},
    paths::join_path,
    plugins::PluginSet,
};

/// Outputs of a module's test pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestArtifacts {
    pub root: String,
    /// Implementation and test sources compiled together
    pub archive: String,
    /// Synthesized test main
    pub main_src: String,
    pub main_archive: String,
    pub executable: String,
    /// Touched once the test executable succeeds. Callers depend on this
    /// rather than on the executable.
    pub passed: String,
}

impl TestArtifacts {
    pub(crate) fn new(root: String, archive: String, source_ext: &str) -> Self {
        let main_name = format!("test.{source_ext}");
        Self {
            main_src: join_path(&[root.as_str(), main_name.as_str()]),
            main_archive: join_path(&[root.as_str(), "test.a"]),
            executable: join_path(&[root.as_str(), "test"]),
            passed: join_path(&[root.as_str(), "test.passed"]),
            archive,
            root,
        }
    }

    /// Files produced on the way to the sentinel
    pub fn intermediates(&self) -> Vec<String> {
        vec![
            self.archive.clone(),
            self.main_src.clone(),
            self.main_archive.clone(),
            self.executable.clone(),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageArtifacts {
    /// Searched by dependents through `-I` and `-L` flags
    pub pkg_root: String,
    pub archive: String,
    pub test: Option<TestArtifacts>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryArtifacts {
    pub archive: String,
    /// Raw linker output, before it is copied into `$BinDir`
    pub aout: String,
    pub binary: String,
    /// Generated plugin registration source, present only for a primary
    /// builder when at least one plugin exists
    pub plugin_src: Option<String>,
    pub test: Option<TestArtifacts>,
}

impl BinaryArtifacts {
    /// Sources generated for this binary and compiled with its declared ones
    pub fn generated_sources(&self) -> Vec<String> {
        self.plugin_src.iter().cloned().collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Artifacts {
    Package(PackageArtifacts),
    Binary(BinaryArtifacts),
}

impl Artifacts {
    pub fn as_package(&self) -> Option<&PackageArtifacts> {
        match self {
            Self::Package(package) => Some(package),
            Self::Binary(_) => None,
        }
    }

    pub fn as_binary(&self) -> Option<&BinaryArtifacts> {
        match self {
            Self::Binary(binary) => Some(binary),
            Self::Package(_) => None,
        }
    }

    pub fn test(&self) -> Option<&TestArtifacts> {
        match self {
            Self::Package(package) => package.test.as_ref(),
            Self::Binary(binary) => binary.test.as_ref(),
        }
    }
}

/// Artifacts of every module whose descriptor passed validation
#[derive(Debug, Clone, Default)]
pub struct ArtifactMap {
    artifacts: FxHashMap<ModuleId, Artifacts>,
}

impl ArtifactMap {
    /// Derive the artifacts of every module.
    ///
    /// A module that fails validation gets no entry and one error; the
    /// remaining modules are still derived.
    pub fn derive(graph: &ModuleGraph, plugins: &PluginSet) -> (Self, Vec<ModuleError>) {
        let mut artifacts = FxHashMap::default();
        let mut errors = Vec::new();

        for node in graph.modules() {
            match node.descriptor.emitter().derive_artifacts(&node.name, plugins) {
                Ok(derived) => {
                    artifacts.insert(node.id, derived);
                }
                Err(message) => {
                    debug!("Module {} failed validation: {message}", node.name);
                    errors.push(ModuleError::new(&node.name, message));
                }
            }
        }

        (Self { artifacts }, errors)
    }

    pub fn get(&self, id: ModuleId) -> Option<&Artifacts> {
        self.artifacts.get(&id)
    }

    pub fn package(&self, id: ModuleId) -> Option<&PackageArtifacts> {
        self.get(id).and_then(Artifacts::as_package)
    }

    pub fn binary(&self, id: ModuleId) -> Option<&BinaryArtifacts> {
        self.get(id).and_then(Artifacts::as_binary)
    }

    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }
}
