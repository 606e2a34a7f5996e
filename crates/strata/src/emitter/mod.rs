//! Per-module action emission
//!
//! Each descriptor variant implements [`ActionEmitter`]. Emission compares the
//! module's effective stage with the stage being generated and either declares
//! the real compile/link/test actions, declares placeholders that only keep
//! artifact identities alive, or declares nothing at all.

mod binary;
mod package;
pub mod phony;
pub mod test_pipeline;

use log::trace;

use crate::{
    artifacts::{ArtifactMap, Artifacts, PackageArtifacts},
    config::Config,
    manifest::{ActionSink, BuildParams},
    module_graph::{ModuleGraph, ModuleNode},
    paths::{module_src_dir, prefix_paths},
    plugins::PluginSet,
    rules,
    stage::Stage,
};

/// Per-module behaviour of a descriptor variant
pub trait ActionEmitter {
    /// Validate the descriptor and compute every path it will produce.
    ///
    /// An `Err` carries the message reported against the module.
    fn derive_artifacts(&self, name: &str, plugins: &PluginSet) -> Result<Artifacts, String>;

    /// Declare this module's actions for the active stage
    fn emit(&self, ctx: &ModuleContext<'_>, sink: &mut dyn ActionSink);
}

/// What a module contributes to the manifest being generated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Emission {
    /// The module is needed by this stage: build it for real
    Build,
    /// Bootstrapping, and the module belongs to a later stage
    Skip,
    /// Already built by an earlier stage: keep its identity only
    Placeholder,
}

impl Emission {
    pub fn decide(active: Stage, module: Stage) -> Self {
        if active == module {
            Self::Build
        } else if active == Stage::Bootstrap {
            Self::Skip
        } else {
            Self::Placeholder
        }
    }
}

/// Everything a module sees while emitting
#[derive(Debug, Clone, Copy)]
pub struct ModuleContext<'a> {
    pub graph: &'a ModuleGraph,
    pub node: &'a ModuleNode,
    pub config: &'a Config,
    /// Effective stage of this module after propagation
    pub stage: Stage,
    pub plugins: &'a PluginSet,
    pub artifacts: &'a ArtifactMap,
}

impl<'a> ModuleContext<'a> {
    pub fn name(&self) -> &'a str {
        &self.node.name
    }

    pub fn emission(&self) -> Emission {
        Emission::decide(self.config.stage, self.stage)
    }

    /// This module's derived artifacts
    pub fn own_artifacts(&self) -> Option<&'a Artifacts> {
        self.artifacts.get(self.node.id)
    }

    /// Directory the module's declared sources are relative to
    pub fn src_dir(&self) -> String {
        module_src_dir(&self.node.dir)
    }

    pub fn source_paths(&self, srcs: &[String]) -> Vec<String> {
        prefix_paths(srcs, &self.src_dir())
    }

    /// Artifacts of every transitive package dependency, in depth-first order
    pub fn package_deps(&self) -> Vec<&'a PackageArtifacts> {
        let mut deps = Vec::new();
        self.graph.visit_deps_depth_first(self.node.id, |dep| {
            if dep.descriptor.is_package_producer()
                && let Some(package) = self.artifacts.package(dep.id)
            {
                deps.push(package);
            }
        });
        deps
    }
}

/// Compile `srcs` and `gen_srcs` into `archive`, importing every package
/// dependency
pub(crate) fn compile_package(
    ctx: &ModuleContext<'_>,
    sink: &mut dyn ActionSink,
    pkg_path: &str,
    archive: &str,
    srcs: &[String],
    gen_srcs: &[String],
    order_only: &[String],
) {
    let mut inputs = ctx.source_paths(srcs);
    inputs.extend(gen_srcs.iter().cloned());

    let deps = ctx.package_deps();
    let inc_flags: Vec<String> = deps.iter().map(|d| format!("-I {}", d.pkg_root)).collect();
    let implicits = std::iter::once("$compileCmd".to_owned())
        .chain(deps.iter().map(|d| d.archive.clone()));

    let mut params = BuildParams::new(&rules::COMPILE)
        .outputs([archive])
        .inputs(inputs)
        .implicits(implicits)
        .order_only(order_only.iter().cloned())
        .arg("pkgPath", pkg_path);
    if !inc_flags.is_empty() {
        params = params.arg("incFlags", inc_flags.join(" "));
    }

    trace!("{}: compile {archive}", ctx.name());
    sink.build(params);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emission_decision() {
        use Stage::{Bootstrap, Main, Primary};

        assert_eq!(Emission::decide(Bootstrap, Bootstrap), Emission::Build);
        assert_eq!(Emission::decide(Primary, Primary), Emission::Build);
        assert_eq!(Emission::decide(Bootstrap, Primary), Emission::Skip);
        assert_eq!(Emission::decide(Bootstrap, Main), Emission::Skip);
        assert_eq!(Emission::decide(Primary, Bootstrap), Emission::Placeholder);
        assert_eq!(Emission::decide(Main, Primary), Emission::Placeholder);
    }
}
