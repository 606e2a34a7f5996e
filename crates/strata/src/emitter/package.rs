use log::debug;

use super::{
    ActionEmitter, Emission, ModuleContext, compile_package, phony::emit_placeholder,
    test_pipeline::emit_test_pipeline,
};
use crate::{
    artifacts::{Artifacts, PackageArtifacts, TestArtifacts},
    descriptor::{Package, PluginProvider, SourceProvider},
    manifest::ActionSink,
    paths::{join_path, package_root, test_root},
    plugins::PluginSet,
};

impl ActionEmitter for Package {
    fn derive_artifacts(&self, name: &str, _plugins: &PluginSet) -> Result<Artifacts, String> {
        let pkg_path = self.pkg_path();
        if pkg_path.is_empty() {
            return Err(format!("module {name} did not specify a valid pkg_path"));
        }

        let archive_name = format!("{pkg_path}.a");
        let pkg_root = package_root(name);
        let archive = join_path(&[pkg_root.as_str(), archive_name.as_str()]);

        let config = self.config();
        let test = (!self.test_srcs().is_empty() && config.run_tests).then(|| {
            let root = test_root(name);
            let archive = join_path(&[root.as_str(), archive_name.as_str()]);
            TestArtifacts::new(root, archive, &config.toolchain.source_ext)
        });

        Ok(Artifacts::Package(PackageArtifacts {
            pkg_root,
            archive,
            test,
        }))
    }

    fn emit(&self, ctx: &ModuleContext<'_>, sink: &mut dyn ActionSink) {
        let Some(artifacts) = ctx.own_artifacts().and_then(Artifacts::as_package) else {
            return;
        };

        match ctx.emission() {
            Emission::Build => {
                let passed: Vec<String> = artifacts
                    .test
                    .as_ref()
                    .and_then(|test| {
                        emit_test_pipeline(
                            ctx,
                            sink,
                            test,
                            self.pkg_path(),
                            self.srcs(),
                            &[],
                            self.test_srcs(),
                        )
                    })
                    .into_iter()
                    .collect();

                compile_package(
                    ctx,
                    sink,
                    self.pkg_path(),
                    &artifacts.archive,
                    self.srcs(),
                    &[],
                    &passed,
                );
            }
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
                emit_placeholder(ctx, sink, &artifacts.archive, self.srcs(), &[], &[]);
            }
        }
    }
}
