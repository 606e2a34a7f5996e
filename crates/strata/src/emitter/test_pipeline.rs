//! Test pipeline: combined archive, synthesized main, link, run

use log::debug;

use super::{ModuleContext, compile_package};
use crate::{
    artifacts::TestArtifacts,
    manifest::{ActionSink, BuildParams},
    paths::parent_dir,
    rules,
};

/// Declare the actions that build and run a module's tests.
///
/// Returns the sentinel touched when the tests pass; that file, not the
/// executable, is what callers should depend on. Returns `None` when there
/// are no test sources.
pub fn emit_test_pipeline(
    ctx: &ModuleContext<'_>,
    sink: &mut dyn ActionSink,
    test: &TestArtifacts,
    pkg_path: &str,
    srcs: &[String],
    gen_srcs: &[String],
    test_srcs: &[String],
) -> Option<String> {
    let test_files = ctx.source_paths(test_srcs);
    let pkg_src_dir = parent_dir(test_files.first()?);

    let combined: Vec<String> = srcs.iter().chain(test_srcs).cloned().collect();
    compile_package(ctx, sink, pkg_path, &test.archive, &combined, gen_srcs, &[]);

    sink.build(
        BuildParams::new(&rules::TEST_MAIN)
            .outputs([test.main_src.as_str()])
            .inputs(test_files)
            .implicits(["$testMainCmd"])
            .arg("pkg", pkg_path),
    );

    let lib_dir_flags: Vec<String> = std::iter::once(test.root.as_str())
        .chain(ctx.package_deps().iter().map(|d| d.pkg_root.as_str()))
        .map(|dir| format!("-L {dir}"))
        .collect();

    sink.build(
        BuildParams::new(&rules::COMPILE)
            .outputs([test.main_archive.as_str()])
            .inputs([test.main_src.as_str()])
            .implicits(["$compileCmd", test.archive.as_str()])
            .arg("pkgPath", "main")
            .arg("incFlags", format!("-I {}", test.root)),
    );

    sink.build(
        BuildParams::new(&rules::LINK)
            .outputs([test.executable.as_str()])
            .inputs([test.main_archive.as_str()])
            .implicits(["$linkCmd"])
            .arg("libDirFlags", lib_dir_flags.join(" ")),
    );

    sink.build(
        BuildParams::new(&rules::TEST)
            .outputs([test.passed.as_str()])
            .inputs([test.executable.as_str()])
            .arg("pkg", pkg_path)
            .arg("pkgSrcDir", pkg_src_dir),
    );

    debug!("{}: test pipeline ends at {}", ctx.name(), test.passed);
    Some(test.passed.clone())
}
