//! Error types shared across generation passes.

use std::{fmt, path::PathBuf};

use thiserror::Error;

/// A configuration problem attributed to a single module.
///
/// Module errors never abort sibling modules: they are collected for the
/// whole run and reported together once generation finishes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("module {module}: {message}")]
pub struct ModuleError {
    pub module: String,
    pub message: String,
}

impl ModuleError {
    pub fn new(module: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            message: message.into(),
        }
    }
}

/// Failure of a whole generation run. No manifest is produced.
#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("{}", ModuleErrorList(.0))]
    Modules(Vec<ModuleError>),

    #[error("dependency cycle between modules: {}", .0.join(" -> "))]
    Cycle(Vec<String>),
}

impl GenerateError {
    /// Names of every module the failure was reported against
    pub fn modules(&self) -> Vec<&str> {
        match self {
            Self::Modules(errors) => errors.iter().map(|e| e.module.as_str()).collect(),
            Self::Cycle(names) => names.iter().map(String::as_str).collect(),
        }
    }
}

struct ModuleErrorList<'a>(&'a [ModuleError]);

impl fmt::Display for ModuleErrorList<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} module error(s)", self.0.len())?;
        for error in self.0 {
            write!(f, "\n  {error}")?;
        }
        Ok(())
    }
}

/// Problems found while turning declaration files into a module graph
#[derive(Debug, Error)]
pub enum DeclarationError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("module {module}: unknown module type `{module_type}`")]
    UnknownModuleType { module: String, module_type: String },

    #[error("module {module}: invalid properties: {source}")]
    InvalidProperties {
        module: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("module {0} is declared more than once")]
    DuplicateModule(String),

    #[error("module {module} depends on undefined module {dependency}")]
    UnknownDependency { module: String, dependency: String },
}
