//! Stage orchestrator
//!
//! Runs once per generation, after every module has emitted its actions. It
//! finds the primary builder, works out which artifacts each regeneration
//! step depends on, and wires the self-regeneration chain for the active
//! stage. The chain is a state machine over [`Stage`]: each stage's manifest
//! knows how to regenerate its own fragment and the next stage's fragment,
//! and the external stage chooser picks which fragment becomes current.

use std::sync::Arc;

use log::{debug, info};

use crate::{
    artifacts::ArtifactMap,
    config::Config,
    error::ModuleError,
    manifest::{ActionSink, BuildParams, Rule},
    module_graph::ModuleGraph,
    paths::{BOOTSTRAP_DIR, MINI_BOOTSTRAP_DIR, binary_path, docs_dir, join_path},
    rules,
    stage::{Stage, StageMap},
};

/// Output of the terminal action, the file the executor actually reads
pub const FINAL_MANIFEST: &str = "$buildDir/build.ninja";

/// A file that never exists. Depending on it keeps a bootstrapping manifest
/// eager to hand off to the next stage.
pub fn not_a_file() -> String {
    join_path(&[BOOTSTRAP_DIR, "notAFile"])
}

/// The fragment chosen as current, input of the terminal action
pub fn chosen_fragment() -> String {
    join_path(&[BOOTSTRAP_DIR, "build.ninja.in"])
}

/// Manifest fragment generated for `stage`
pub fn fragment_path(stage: Stage) -> String {
    join_path(&[BOOTSTRAP_DIR, stage.fragment_name()])
}

/// Timestamp touched when `stage`'s fragment has to be regenerated
pub fn timestamp_path(stage: Stage) -> String {
    format!("{}.timestamp", fragment_path(stage))
}

pub fn timestamp_depfile(stage: Stage) -> String {
    format!("{}.d", timestamp_path(stage))
}

/// The builder that generates the main manifest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrimaryBuilder {
    pub name: String,
    /// Flags that put the builder into primary mode
    pub extra_flags: Vec<String>,
    /// No module is flagged; the mini builder stands in
    pub is_fallback: bool,
}

impl PrimaryBuilder {
    pub fn file(&self) -> String {
        binary_path(&self.name)
    }

    pub fn docs_file(&self) -> String {
        join_path(&[docs_dir(), format!("{}.html", self.name)])
    }

    fn flags(&self) -> String {
        self.extra_flags.join(" ")
    }
}

/// Regeneration dependencies split by the stage that builds them
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RebootstrapDeps {
    /// Built by the mini builder. A change returns to the bootstrap stage.
    pub bootstrap: Vec<String>,
    /// Built in the primary stage. A change regenerates the main fragment.
    pub primary: Vec<String>,
}

#[derive(Debug)]
pub struct Orchestrator<'a> {
    config: &'a Config,
}

impl<'a> Orchestrator<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self { config }
    }

    /// Find the unique primary builder. Zero flagged modules falls back to
    /// the mini builder in primary mode; more than one is an error reported
    /// against every flagged module.
    pub fn primary_builder(&self, graph: &ModuleGraph) -> Result<PrimaryBuilder, Vec<ModuleError>> {
        let flagged: Vec<&str> = graph
            .modules()
            .filter(|node| node.descriptor.is_primary_builder())
            .map(|node| node.name.as_str())
            .collect();

        let mut builder = match flagged.as_slice() {
            [] => PrimaryBuilder {
                name: self.config.toolchain.mini_builder.clone(),
                extra_flags: vec!["-p".to_owned()],
                is_fallback: true,
            },
            [name] => PrimaryBuilder {
                name: (*name).to_owned(),
                extra_flags: Vec::new(),
                is_fallback: false,
            },
            names => {
                return Err(names
                    .iter()
                    .map(|name| ModuleError::new(*name, "multiple primary builder modules present"))
                    .collect());
            }
        };

        if self.config.run_tests {
            builder.extra_flags.push("-t".to_owned());
        }
        Ok(builder)
    }

    /// Collect linked binaries and test sentinels, split by effective stage
    pub fn rebootstrap_deps(
        &self,
        graph: &ModuleGraph,
        stages: &StageMap,
        artifacts: &ArtifactMap,
        builder: &PrimaryBuilder,
    ) -> RebootstrapDeps {
        let mut deps = RebootstrapDeps::default();
        let is_bootstrap = |id| stages.get(id) == Some(Stage::Bootstrap);

        for node in graph.modules().filter(|n| n.descriptor.as_binary().is_some()) {
            let path = binary_path(&node.name);
            if is_bootstrap(node.id) {
                deps.bootstrap.push(path);
            } else {
                deps.primary.push(path);
            }
        }

        let top_level = self.config.top_level_declarations();
        deps.bootstrap.push(top_level.clone());
        deps.primary.push(top_level);
        deps.primary.push(builder.docs_file());

        // Test results must be dependencies of the fragments, or the
        // timestamps would stay newer than the manifest and the bootstrap
        // stage would never be left.
        for node in graph.modules() {
            let Some(test) = artifacts.get(node.id).and_then(|a| a.test()) else {
                continue;
            };
            if is_bootstrap(node.id) {
                deps.bootstrap.push(test.passed.clone());
            } else {
                deps.primary.push(test.passed.clone());
            }
        }

        deps
    }

    /// Emit the regeneration chain for the active stage followed by the
    /// terminal action producing [`FINAL_MANIFEST`].
    ///
    /// With more than one primary builder nothing is emitted.
    pub fn emit(
        &self,
        graph: &ModuleGraph,
        stages: &StageMap,
        artifacts: &ArtifactMap,
        sink: &mut dyn ActionSink,
    ) -> Result<(), Vec<ModuleError>> {
        let builder = self.primary_builder(graph)?;
        let deps = self.rebootstrap_deps(graph, stages, artifacts, &builder);
        info!(
            "Wiring {} stage with primary builder {}",
            self.config.stage, builder.name
        );

        match self.config.stage {
            Stage::Bootstrap => self.emit_bootstrap(sink, &deps),
            Stage::Primary => self.emit_primary(sink, &deps, &builder),
            Stage::Main => self.emit_main(sink, &deps, &builder),
        }
        if let Some(next) = self.config.stage.next() {
            debug!("{} stage hands off to {}", self.config.stage, fragment_path(next));
        }

        sink.build(
            BuildParams::new(&rules::BOOTSTRAP)
                .outputs([FINAL_MANIFEST])
                .inputs([chosen_fragment()])
                .implicits(["$bootstrapCmd"]),
        );
        Ok(())
    }

    fn mini_builder_file(&self) -> String {
        binary_path(&self.config.toolchain.mini_builder)
    }

    fn run_tests_arg(&self, params: BuildParams) -> BuildParams {
        if self.config.run_tests {
            params.arg("runTests", "-t")
        } else {
            params
        }
    }

    fn emit_bootstrap(&self, sink: &mut dyn ActionSink, deps: &RebootstrapDeps) {
        // Each stage needs its own builddir, or the executor's orphan cleanup
        // would remove another stage's outputs.
        sink.set_build_dir(MINI_BOOTSTRAP_DIR);

        let mini = self.mini_builder_file();
        let mini_name = &self.config.toolchain.mini_builder;
        let top_level = self.config.top_level_declarations();
        let bootstrap_fragment = fragment_path(Stage::Bootstrap);
        let primary_fragment = fragment_path(Stage::Primary);

        let regen_primary = Arc::new(
            Rule::new(
                "regenPrimary",
                format!(
                    "{mini} --build-primary $runTests -m $bootstrapManifest \
                     --timestamp $timestamp --timestampdep $timestampdep \
                     -b $buildDir -d $outfile.d -o $outfile $in"
                ),
            )
            .description(format!("{mini_name} $outfile"))
            .depfile("$outfile.d")
            .variables(&["runTests", "timestamp", "timestampdep", "outfile"]),
        );
        sink.build(self.run_tests_arg(
            BuildParams::new(&regen_primary)
                .outputs([primary_fragment.clone(), timestamp_path(Stage::Primary)])
                .inputs([top_level.as_str()])
                .implicits(deps.bootstrap.iter().cloned())
                .arg("outfile", primary_fragment.as_str())
                .arg("timestamp", timestamp_path(Stage::Primary))
                .arg("timestampdep", timestamp_depfile(Stage::Primary)),
        ));

        // Regenerating this very fragment with the freshly built mini
        // builder; a difference makes the chooser replay this stage.
        let regen_bootstrap = Arc::new(
            Rule::new(
                "regenBootstrap",
                format!("{mini} $runTests -m $bootstrapManifest -b $buildDir -d $out.d -o $out $in"),
            )
            .description(format!("{mini_name} $out"))
            .depfile("$out.d")
            .generator()
            .variables(&["runTests"]),
        );
        sink.build(self.run_tests_arg(
            BuildParams::new(&regen_bootstrap)
                .outputs([bootstrap_fragment.as_str()])
                .inputs([top_level.as_str()])
                .implicits(["$bootstrapManifest".to_owned(), mini]),
        ));

        sink.build(BuildParams::phony().outputs([not_a_file()]));

        sink.build(
            BuildParams::new(&rules::CHOOSE_STAGE)
                .outputs([chosen_fragment()])
                .inputs([bootstrap_fragment.as_str(), primary_fragment.as_str()])
                .implicits(["$chooseStageCmd".to_owned(), "$bootstrapManifest".to_owned(), not_a_file()])
                .arg("current", bootstrap_fragment.as_str()),
        );
    }

    fn emit_primary(&self, sink: &mut dyn ActionSink, deps: &RebootstrapDeps, builder: &PrimaryBuilder) {
        sink.set_build_dir(BOOTSTRAP_DIR);

        let builder_file = builder.file();
        let flags = builder.flags();
        let top_level = self.config.top_level_declarations();
        let main_fragment = fragment_path(Stage::Main);
        let docs_file = builder.docs_file();

        let regen_main = Arc::new(
            Rule::new(
                "regenMain",
                normalize_spaces(&format!(
                    "{builder_file} {flags} -m $bootstrapManifest \
                     --timestamp $timestamp --timestampdep $timestampdep \
                     -b $buildDir -d $outfile.d -o $outfile $in"
                )),
            )
            .description(format!("{} $outfile", builder.name))
            .depfile("$outfile.d")
            .variables(&["timestamp", "timestampdep", "outfile"]),
        );
        sink.build(
            BuildParams::new(&regen_main)
                .outputs([main_fragment.clone(), timestamp_path(Stage::Main)])
                .inputs([top_level.as_str()])
                .implicits(deps.primary.iter().cloned())
                .arg("timestamp", timestamp_path(Stage::Main))
                .arg("timestampdep", timestamp_depfile(Stage::Main))
                .arg("outfile", main_fragment.as_str()),
        );

        // Reads the builder's sources, which are covered by depending on
        // the builder itself.
        let regen_docs = Arc::new(
            Rule::new(
                "regenDocs",
                normalize_spaces(&format!(
                    "{builder_file} {flags} -b $buildDir --docs $out {top_level}"
                )),
            )
            .description(format!("{} docs $out", builder.name)),
        );
        sink.build(
            BuildParams::new(&regen_docs)
                .outputs([docs_file.as_str()])
                .implicits([builder_file.as_str()]),
        );

        // Newer than the primary fragment means a bootstrap-stage input
        // changed: the chooser then returns to the bootstrap stage.
        sink.build(touch_timestamp(Stage::Primary, &deps.bootstrap));

        sink.build(BuildParams::phony().outputs([not_a_file()]));

        sink.build(
            BuildParams::new(&rules::CHOOSE_STAGE)
                .outputs([chosen_fragment()])
                .inputs(Stage::ALL.map(fragment_path))
                .implicits([
                    "$chooseStageCmd".to_owned(),
                    "$bootstrapManifest".to_owned(),
                    not_a_file(),
                    timestamp_path(Stage::Primary),
                ])
                .arg("current", fragment_path(Stage::Primary)),
        );

        // Keeps upgrades from deleting the bootstrap fragment during cleanup
        sink.build(BuildParams::phony().outputs([fragment_path(Stage::Bootstrap)]));
    }

    fn emit_main(&self, sink: &mut dyn ActionSink, deps: &RebootstrapDeps, builder: &PrimaryBuilder) {
        sink.set_build_dir("$buildDir");

        sink.build(touch_timestamp(Stage::Primary, &deps.bootstrap));
        sink.build(touch_timestamp(Stage::Main, &deps.primary));

        sink.build(
            BuildParams::new(&rules::CHOOSE_STAGE)
                .outputs([chosen_fragment()])
                .inputs(Stage::ALL.map(fragment_path))
                .implicits([
                    "$chooseStageCmd".to_owned(),
                    "$bootstrapManifest".to_owned(),
                    timestamp_path(Stage::Primary),
                    timestamp_path(Stage::Main),
                ])
                .arg("current", fragment_path(Stage::Main))
                .arg("generator", "true"),
        );

        sink.build(BuildParams::phony().outputs([fragment_path(Stage::Main), builder.docs_file()]));

        if builder.is_fallback {
            // Standalone build: put the mini builder somewhere easy to find
            let installed = join_path(&["$buildDir", "bin", builder.name.as_str()]);
            sink.build(
                BuildParams::new(&rules::CP)
                    .outputs([installed])
                    .inputs([builder.file()]),
            );
        }
    }
}

/// Touch `stage`'s timestamp whenever one of `deps` changes
fn touch_timestamp(stage: Stage, deps: &[String]) -> BuildParams {
    BuildParams::new(&rules::TOUCH)
        .outputs([timestamp_path(stage)])
        .implicits(deps.iter().cloned())
        .arg("depfile", timestamp_depfile(stage))
        .arg("generator", "true")
}

fn normalize_spaces(command: &str) -> String {
    command.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_fragment_layout() {
        assert_eq!(fragment_path(Stage::Primary), "$buildDir/.bootstrap/primary.ninja.in");
        assert_eq!(
            timestamp_path(Stage::Main),
            "$buildDir/.bootstrap/main.ninja.in.timestamp"
        );
        assert_eq!(
            timestamp_depfile(Stage::Main),
            "$buildDir/.bootstrap/main.ninja.in.timestamp.d"
        );
        assert_eq!(chosen_fragment(), "$buildDir/.bootstrap/build.ninja.in");
    }

    #[test]
    fn test_fallback_builder_runs_in_primary_mode() {
        let config = Config {
            run_tests: true,
            ..Config::default()
        };
        let builder = Orchestrator::new(&config)
            .primary_builder(&ModuleGraph::new())
            .unwrap();
        assert_eq!(builder.name, "ministrata");
        assert_eq!(builder.extra_flags, vec!["-p", "-t"]);
        assert!(builder.is_fallback);
        assert_eq!(builder.docs_file(), "$buildDir/.bootstrap/docs/ministrata.html");
    }

    #[test]
    fn test_normalize_spaces() {
        assert_eq!(normalize_spaces("a  b -m  c"), "a b -m c");
    }
}
