//! Generation configuration
//!
//! [`Config`] is built once per run and shared read-only (as `Arc<Config>`)
//! with every module factory and the stage orchestrator. Optional settings
//! come from TOML files layered as: built-in defaults, then the user config
//! (`<config dir>/strata/config.toml`), then the project's `.strata.toml`,
//! then command-line flags.

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use etcetera::{BaseStrategy, choose_base_strategy};
use log::debug;
use serde::Deserialize;

use crate::{paths::join_path, stage::Stage};

/// Name of the per-project settings file, looked up next to the top-level
/// declaration file. The leading dot keeps it distinct from `Strata.toml`
/// on case-insensitive filesystems.
pub const PROJECT_CONFIG_FILE: &str = ".strata.toml";

/// External tools referenced by the generated actions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toolchain {
    pub compile_cmd: String,
    pub link_cmd: String,
    /// Extra flags passed to every compile action
    pub compile_flags: String,
    /// Flags passed to test executables
    pub test_flags: String,
    /// Script that turns the chosen fragment into `build.ninja`
    pub bootstrap_cmd: String,
    /// Builder binary that synthesizes test mains
    pub test_main_tool: String,
    /// Builder binary that picks the next stage's fragment
    pub choose_stage_tool: String,
    /// Builder binary that writes the plugin registration source
    pub plugin_gen_tool: String,
    /// Module name of the hand-written mini builder
    pub mini_builder: String,
    /// Extension of generated sources
    pub source_ext: String,
}

impl Default for Toolchain {
    fn default() -> Self {
        Self {
            compile_cmd: "$toolDir/compile".to_owned(),
            link_cmd: "$toolDir/link".to_owned(),
            compile_flags: "-complete -pack".to_owned(),
            test_flags: "-test.short".to_owned(),
            bootstrap_cmd: "$srcDir/bootstrap.bash".to_owned(),
            test_main_tool: "testmain".to_owned(),
            choose_stage_tool: "choosestage".to_owned(),
            plugin_gen_tool: "loadplugins".to_owned(),
            mini_builder: "ministrata".to_owned(),
            source_ext: "go".to_owned(),
        }
    }
}

/// Process-wide settings for one generation run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Stage whose manifest this run generates
    pub stage: Stage,
    pub run_tests: bool,
    /// Top-level declaration file
    pub top_level_file: PathBuf,
    /// Value of `$buildDir`
    pub build_dir: String,
    /// Value of `$srcDir`
    pub src_dir: String,
    /// Value of `$bootstrapManifest`
    pub bootstrap_manifest: String,
    /// Value of `$toolDir`, the directory holding the compiler and linker
    pub tool_dir: String,
    pub toolchain: Toolchain,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            stage: Stage::Bootstrap,
            run_tests: false,
            top_level_file: PathBuf::from("Strata.toml"),
            build_dir: ".".to_owned(),
            src_dir: ".".to_owned(),
            bootstrap_manifest: "build.ninja.in".to_owned(),
            tool_dir: "/usr/lib/strata/tool".to_owned(),
            toolchain: Toolchain::default(),
        }
    }
}

impl Config {
    /// The top-level declaration file as referenced from generated actions
    pub fn top_level_declarations(&self) -> String {
        let base = self
            .top_level_file
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        join_path(&["$srcDir", base.as_str()])
    }

    /// Apply file-based overrides on top of this configuration
    pub fn apply(&mut self, file: &ConfigFile) {
        if let Some(run_tests) = file.run_tests {
            self.run_tests = run_tests;
        }
        if let Some(build_dir) = &file.build_dir {
            self.build_dir.clone_from(build_dir);
        }
        if let Some(tool_dir) = &file.tool_dir {
            self.tool_dir.clone_from(tool_dir);
        }
        if let Some(manifest) = &file.bootstrap_manifest {
            self.bootstrap_manifest.clone_from(manifest);
        }
        file.toolchain.apply_to(&mut self.toolchain);
    }
}

/// Optional settings as they appear in a TOML config file
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigFile {
    pub run_tests: Option<bool>,
    pub build_dir: Option<String>,
    pub tool_dir: Option<String>,
    pub bootstrap_manifest: Option<String>,
    pub toolchain: ToolchainFile,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ToolchainFile {
    pub compile_cmd: Option<String>,
    pub link_cmd: Option<String>,
    pub compile_flags: Option<String>,
    pub test_flags: Option<String>,
    pub bootstrap_cmd: Option<String>,
    pub test_main_tool: Option<String>,
    pub choose_stage_tool: Option<String>,
    pub plugin_gen_tool: Option<String>,
    pub mini_builder: Option<String>,
    pub source_ext: Option<String>,
}

impl ToolchainFile {
    fn apply_to(&self, toolchain: &mut Toolchain) {
        let overrides = [
            (&self.compile_cmd, &mut toolchain.compile_cmd),
            (&self.link_cmd, &mut toolchain.link_cmd),
            (&self.compile_flags, &mut toolchain.compile_flags),
            (&self.test_flags, &mut toolchain.test_flags),
            (&self.bootstrap_cmd, &mut toolchain.bootstrap_cmd),
            (&self.test_main_tool, &mut toolchain.test_main_tool),
            (&self.choose_stage_tool, &mut toolchain.choose_stage_tool),
            (&self.plugin_gen_tool, &mut toolchain.plugin_gen_tool),
            (&self.mini_builder, &mut toolchain.mini_builder),
            (&self.source_ext, &mut toolchain.source_ext),
        ];
        for (value, slot) in overrides {
            if let Some(value) = value {
                slot.clone_from(value);
            }
        }
    }

    fn merge(&mut self, other: Self) {
        macro_rules! take {
            ($($field:ident),*) => {
                $(if other.$field.is_some() { self.$field = other.$field; })*
            };
        }
        take!(
            compile_cmd,
            link_cmd,
            compile_flags,
            test_flags,
            bootstrap_cmd,
            test_main_tool,
            choose_stage_tool,
            plugin_gen_tool,
            mini_builder,
            source_ext
        );
    }
}

impl ConfigFile {
    /// Layer `other` over `self`; settings present in `other` win
    pub fn merge(&mut self, other: Self) {
        if other.run_tests.is_some() {
            self.run_tests = other.run_tests;
        }
        if other.build_dir.is_some() {
            self.build_dir = other.build_dir;
        }
        if other.tool_dir.is_some() {
            self.tool_dir = other.tool_dir;
        }
        if other.bootstrap_manifest.is_some() {
            self.bootstrap_manifest = other.bootstrap_manifest;
        }
        self.toolchain.merge(other.toolchain);
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        toml::from_str(&text)
            .with_context(|| format!("failed to parse config file {}", path.display()))
    }
}

/// Locates and layers config files
#[derive(Debug, Clone, Default)]
pub struct ConfigLoader {
    user_config_dir: Option<PathBuf>,
}

impl ConfigLoader {
    /// Loader that reads the user config from the platform config directory
    pub fn new() -> Self {
        let user_config_dir = choose_base_strategy()
            .ok()
            .map(|strategy| strategy.config_dir().join("strata"));
        Self { user_config_dir }
    }

    /// Loader with an explicit user config directory, or none at all
    pub fn with_user_config_dir(dir: Option<PathBuf>) -> Self {
        Self {
            user_config_dir: dir,
        }
    }

    /// Read and layer the user config and the project config in `project_dir`.
    /// Missing files are skipped.
    pub fn load(&self, project_dir: &Path) -> Result<ConfigFile> {
        let mut merged = ConfigFile::default();

        let candidates = self
            .user_config_dir
            .iter()
            .map(|dir| dir.join("config.toml"))
            .chain(std::iter::once(project_dir.join(PROJECT_CONFIG_FILE)));

        for path in candidates {
            if path.is_file() {
                debug!("Loading config from {}", path.display());
                merged.merge(ConfigFile::from_path(&path)?);
            }
        }
        Ok(merged)
    }
}
