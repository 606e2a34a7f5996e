use log::debug;

use super::{
    ActionEmitter, Emission, ModuleContext, compile_package, phony::emit_placeholder,
    test_pipeline::emit_test_pipeline,
};
use crate::{
    artifacts::{Artifacts, BinaryArtifacts, TestArtifacts},
    descriptor::{Binary, SourceProvider},
    manifest::{ActionSink, BuildParams},
    paths::{binary_path, join_path, module_obj_dir, test_root},
    plugins::PluginSet,
    rules,
};

impl ActionEmitter for Binary {
    fn derive_artifacts(&self, name: &str, plugins: &PluginSet) -> Result<Artifacts, String> {
        let config = self.config();
        let obj_dir = module_obj_dir(name);
        let archive_name = format!("{name}.a");

        let plugin_src = (self.is_primary_builder() && !plugins.is_empty()).then(|| {
            let file = format!("plugin.{}", config.toolchain.source_ext);
            join_path(&[obj_dir.as_str(), file.as_str()])
        });

        let test = (!self.test_srcs().is_empty() && config.run_tests).then(|| {
            let root = test_root(name);
            let archive = join_path(&[root.as_str(), archive_name.as_str()]);
            TestArtifacts::new(root, archive, &config.toolchain.source_ext)
        });

        Ok(Artifacts::Binary(BinaryArtifacts {
            archive: join_path(&[obj_dir.as_str(), archive_name.as_str()]),
            aout: join_path(&[obj_dir.as_str(), "a.out"]),
            binary: binary_path(name),
            plugin_src,
            test,
        }))
    }

    fn emit(&self, ctx: &ModuleContext<'_>, sink: &mut dyn ActionSink) {
        let Some(artifacts) = ctx.own_artifacts().and_then(Artifacts::as_binary) else {
            return;
        };
        let gen_srcs = artifacts.generated_sources();

        match ctx.emission() {
            Emission::Build => self.emit_build(ctx, sink, artifacts, &gen_srcs),
            Emission::Skip => {
                debug!("{}: not needed while bootstrapping", ctx.name());
            }
            Emission::Placeholder => {
                if let Some(test) = &artifacts.test {
                    emit_placeholder(
                        ctx,
                        sink,
                        &test.passed,
                        self.test_srcs(),
                        &[],
                        &test.intermediates(),
                    );
                }
                let intermediates = [artifacts.aout.clone(), artifacts.archive.clone()];
                emit_placeholder(
                    ctx,
                    sink,
                    &artifacts.binary,
                    self.srcs(),
                    &gen_srcs,
                    &intermediates,
                );
            }
        }
    }
}

impl Binary {
    fn emit_build(
        &self,
        ctx: &ModuleContext<'_>,
        sink: &mut dyn ActionSink,
        artifacts: &BinaryArtifacts,
        gen_srcs: &[String],
    ) {
        let name = ctx.name();

        if let Some(plugin_src) = &artifacts.plugin_src {
            debug!("{name}: registering {} plugin(s)", ctx.plugins.len());
            sink.build(
                BuildParams::new(&rules::PLUGIN_GEN_SRC)
                    .outputs([plugin_src.as_str()])
                    .implicits(["$pluginGenSrcCmd"])
                    .arg("plugins", ctx.plugins.pkg_paths_arg()),
            );
        }

        let passed: Vec<String> = artifacts
            .test
            .as_ref()
            .and_then(|test| {
                emit_test_pipeline(
                    ctx,
                    sink,
                    test,
                    name,
                    self.srcs(),
                    gen_srcs,
                    self.test_srcs(),
                )
            })
            .into_iter()
            .collect();

        compile_package(
            ctx,
            sink,
            name,
            &artifacts.archive,
            self.srcs(),
            gen_srcs,
            &passed,
        );

        let lib_dir_flags: Vec<String> = ctx
            .package_deps()
            .iter()
            .map(|d| format!("-L {}", d.pkg_root))
            .collect();

        let mut link = BuildParams::new(&rules::LINK)
            .outputs([artifacts.aout.as_str()])
            .inputs([artifacts.archive.as_str()])
            .implicits(["$linkCmd"]);
        if !lib_dir_flags.is_empty() {
            link = link.arg("libDirFlags", lib_dir_flags.join(" "));
        }
        sink.build(link);

        sink.build(
            BuildParams::new(&rules::CP)
                .outputs([artifacts.binary.as_str()])
                .inputs([artifacts.aout.as_str()]),
        );
    }
}
