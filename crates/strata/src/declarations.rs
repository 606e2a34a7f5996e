//! Module declarations
//!
//! Declarations are TOML documents holding `[[module]]` tables. Each table
//! names a registered module type with `type`, carries `name`, an optional
//! `dir` and `deps`, and the properties of that type. A file may pull in
//! further files from `subdirs`; every file read is recorded so the caller
//! can write a depfile.

use std::{
    fs,
    path::{Path, PathBuf},
};

use log::{debug, trace};
use rustc_hash::FxHashSet;
use serde::Deserialize;

use crate::{
    descriptor::{ModuleFactory, ModuleType},
    error::DeclarationError,
    module_graph::{ModuleGraph, ModuleId},
    paths::join_path,
};

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct DeclarationFile {
    /// Directories whose declaration file (same file name) is loaded too
    #[serde(default)]
    subdirs: Vec<String>,
    #[serde(default, rename = "module")]
    modules: Vec<ModuleDeclaration>,
}

#[derive(Debug, Deserialize)]
struct ModuleDeclaration {
    #[serde(rename = "type")]
    module_type: String,
    name: String,
    dir: Option<String>,
    #[serde(default)]
    deps: Vec<String>,
    #[serde(flatten)]
    properties: toml::Table,
}

/// A module graph together with the files it was read from
#[derive(Debug)]
pub struct LoadedDeclarations {
    pub graph: ModuleGraph,
    pub files: Vec<PathBuf>,
}

#[derive(Debug)]
pub struct DeclarationLoader {
    factory: ModuleFactory,
}

impl DeclarationLoader {
    pub fn new(factory: ModuleFactory) -> Self {
        Self { factory }
    }

    /// Load the top-level declaration file and everything it includes
    pub fn load(&self, top_level: &Path) -> Result<LoadedDeclarations, DeclarationError> {
        let root = top_level.parent().unwrap_or_else(|| Path::new(""));
        let file_name = top_level
            .file_name()
            .map_or_else(|| PathBuf::from(top_level), PathBuf::from);

        let mut state = LoadState::default();
        self.load_file(root, &file_name, "", &mut state)?;
        let loaded = state.resolve()?;

        debug!(
            "Loaded {} module(s) from {} file(s)",
            loaded.graph.len(),
            loaded.files.len()
        );
        Ok(loaded)
    }

    /// Parse declarations from a string, as if read from `path`. `subdirs`
    /// are not followed.
    pub fn load_str(&self, source: &str, path: &Path) -> Result<ModuleGraph, DeclarationError> {
        let mut state = LoadState::default();
        let file = parse(source, path)?;
        self.add_modules(file.modules, "", &mut state)?;
        Ok(state.resolve()?.graph)
    }

    fn load_file(
        &self,
        root: &Path,
        file_name: &Path,
        rel_dir: &str,
        state: &mut LoadState,
    ) -> Result<(), DeclarationError> {
        let path = root.join(rel_dir).join(file_name);
        if !state.visited.insert(path.clone()) {
            return Ok(());
        }

        trace!("Reading declarations from {}", path.display());
        let source = fs::read_to_string(&path).map_err(|source| DeclarationError::Io {
            path: path.clone(),
            source,
        })?;
        let file = parse(&source, &path)?;
        state.files.push(path);

        self.add_modules(file.modules, rel_dir, state)?;

        for subdir in file.subdirs {
            let sub_rel = join_path(&[rel_dir, subdir.as_str()]);
            self.load_file(root, file_name, &sub_rel, state)?;
        }
        Ok(())
    }

    fn add_modules(
        &self,
        modules: Vec<ModuleDeclaration>,
        rel_dir: &str,
        state: &mut LoadState,
    ) -> Result<(), DeclarationError> {
        for declaration in modules {
            let module_type: ModuleType = declaration.module_type.parse().map_err(|module_type| {
                DeclarationError::UnknownModuleType {
                    module: declaration.name.clone(),
                    module_type,
                }
            })?;

            let descriptor = self
                .factory
                .create(module_type, declaration.properties)
                .map_err(|source| DeclarationError::InvalidProperties {
                    module: declaration.name.clone(),
                    source,
                })?;

            let dir = match &declaration.dir {
                Some(dir) => join_path(&[rel_dir, dir.as_str()]),
                None if rel_dir.is_empty() => String::new(),
                None => join_path(&[rel_dir]),
            };

            let id = state.graph.add_module(&declaration.name, dir, descriptor)?;
            state.pending_deps.push((id, declaration.name, declaration.deps));
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct LoadState {
    graph: ModuleGraph,
    files: Vec<PathBuf>,
    visited: FxHashSet<PathBuf>,
    /// Dependencies are resolved once every file is loaded, so a module may
    /// name one declared later
    pending_deps: Vec<(ModuleId, String, Vec<String>)>,
}

impl LoadState {
    fn resolve(mut self) -> Result<LoadedDeclarations, DeclarationError> {
        for (id, module, deps) in std::mem::take(&mut self.pending_deps) {
            for dependency in deps {
                let Some(dep_id) = self.graph.id_by_name(&dependency) else {
                    return Err(DeclarationError::UnknownDependency { module, dependency });
                };
                self.graph.add_dependency(id, dep_id);
            }
        }
        Ok(LoadedDeclarations {
            graph: self.graph,
            files: self.files,
        })
    }
}

fn parse(source: &str, path: &Path) -> Result<DeclarationFile, DeclarationError> {
    toml::from_str(source).map_err(|source| DeclarationError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    use super::*;
    use crate::config::Config;

    fn loader() -> DeclarationLoader {
        DeclarationLoader::new(ModuleFactory::new(Arc::new(Config::default())))
    }

    #[test]
    fn test_load_modules_and_dependencies() {
        let graph = loader()
            .load_str(
                r#"
[[module]]
type = "bootstrap_binary"
name = "tool"
srcs = ["main.go"]
deps = ["lib"]

[[module]]
type = "bootstrap_package"
name = "lib"
dir = "lib"
pkg_path = "example/lib"
srcs = ["lib.go"]
"#,
                Path::new("Strata.toml"),
            )
            .unwrap();

        let tool = graph.id_by_name("tool").unwrap();
        let lib = graph.id_by_name("lib").unwrap();
        assert_eq!(graph.dependencies(tool), [lib]);
        assert_eq!(graph.module(lib).dir, "lib");
        assert_eq!(graph.module(tool).dir, "");
    }

    #[test]
    fn test_unknown_type_and_dependency_are_rejected() {
        let err = loader()
            .load_str(
                "[[module]]\ntype = \"cc_library\"\nname = \"a\"\n",
                Path::new("Strata.toml"),
            )
            .unwrap_err();
        assert!(matches!(err, DeclarationError::UnknownModuleType { .. }));

        let err = loader()
            .load_str(
                "[[module]]\ntype = \"bootstrap_binary\"\nname = \"a\"\ndeps = [\"missing\"]\n",
                Path::new("Strata.toml"),
            )
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "module a depends on undefined module missing"
        );
    }

    #[test]
    fn test_subdirs_are_loaded_and_recorded() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("Strata.toml"),
            "subdirs = [\"lib\"]\n\n[[module]]\ntype = \"bootstrap_binary\"\nname = \"tool\"\ndeps = [\"lib\"]\n",
        )
        .unwrap();
        fs::create_dir(dir.path().join("lib")).unwrap();
        fs::write(
            dir.path().join("lib/Strata.toml"),
            "[[module]]\ntype = \"bootstrap_package\"\nname = \"lib\"\npkg_path = \"example/lib\"\n",
        )
        .unwrap();

        let loaded = loader().load(&dir.path().join("Strata.toml")).unwrap();
        assert_eq!(loaded.files.len(), 2);
        let lib = loaded.graph.id_by_name("lib").unwrap();
        assert_eq!(loaded.graph.module(lib).dir, "lib");
    }
}
