//! Static rules and the top-level variables their commands reference

use std::sync::Arc;

use once_cell::sync::Lazy;

use crate::{
    config::Config,
    manifest::{Manifest, Rule},
    paths::{BOOTSTRAP_DIR, binary_path, join_path},
};

pub static COMPILE: Lazy<Arc<Rule>> = Lazy::new(|| {
    Arc::new(
        Rule::new(
            "compile",
            "$compileCmd -o $out -p $pkgPath $compileFlags $incFlags $in",
        )
        .description("compile $out")
        .variables(&["pkgPath", "incFlags"]),
    )
});

pub static LINK: Lazy<Arc<Rule>> = Lazy::new(|| {
    Arc::new(
        Rule::new("link", "$linkCmd -o $out $libDirFlags $in")
            .description("link $out")
            .variables(&["libDirFlags"]),
    )
});

pub static TEST_MAIN: Lazy<Arc<Rule>> = Lazy::new(|| {
    Arc::new(
        Rule::new("testmain", "$testMainCmd -o $out -pkg $pkg $in")
            .description("testmain $out")
            .variables(&["pkg"]),
    )
});

pub static PLUGIN_GEN_SRC: Lazy<Arc<Rule>> = Lazy::new(|| {
    Arc::new(
        Rule::new("pluginGenSrc", "$pluginGenSrcCmd -o $out $plugins")
            .description("create $out")
            .variables(&["plugins"]),
    )
});

pub static TEST: Lazy<Arc<Rule>> = Lazy::new(|| {
    Arc::new(
        Rule::new(
            "test",
            "(cd $pkgSrcDir && $$OLDPWD/$in $testFlags) && touch $out",
        )
        .description("test $pkg")
        .variables(&["pkg", "pkgSrcDir"]),
    )
});

pub static CP: Lazy<Arc<Rule>> = Lazy::new(|| {
    Arc::new(
        Rule::new("cp", "cp $in $out")
            .description("cp $out")
            .variables(&["generator"]),
    )
});

/// Turns the chosen fragment into the manifest the executor reads
pub static BOOTSTRAP: Lazy<Arc<Rule>> = Lazy::new(|| {
    Arc::new(
        Rule::new("bootstrap", "$bootstrapCmd -i $in -b $buildDir")
            .description("bootstrap $in")
            .generator(),
    )
});

pub static CHOOSE_STAGE: Lazy<Arc<Rule>> = Lazy::new(|| {
    Arc::new(
        Rule::new(
            "chooseStage",
            "$chooseStageCmd --current $current --bootstrap $bootstrapManifest -o $out $in",
        )
        .description("choosing next stage")
        .variables(&["current", "generator"]),
    )
});

pub static TOUCH: Lazy<Arc<Rule>> = Lazy::new(|| {
    Arc::new(
        Rule::new("touch", "touch $out")
            .description("touch $out")
            .variables(&["depfile", "generator"]),
    )
});

/// Placeholder that does no work. Declared as a real rule rather than the
/// built-in phony so that it may carry inputs without Ninja treating its
/// output as an alias.
pub static PHONY: Lazy<Arc<Rule>> = Lazy::new(|| {
    Arc::new(
        Rule::new("placeholder", "# phony $out")
            .description("phony $out")
            .generator()
            .variables(&["depfile"]),
    )
});

/// Define every top-level variable referenced by the static rules
pub fn define_variables(manifest: &mut Manifest, config: &Config) {
    let toolchain = &config.toolchain;
    let variables = [
        ("buildDir", config.build_dir.clone()),
        ("srcDir", config.src_dir.clone()),
        ("toolDir", config.tool_dir.clone()),
        ("BinDir", join_path(&[BOOTSTRAP_DIR, "bin"])),
        ("bootstrapManifest", config.bootstrap_manifest.clone()),
        ("bootstrapCmd", toolchain.bootstrap_cmd.clone()),
        ("compileCmd", toolchain.compile_cmd.clone()),
        ("linkCmd", toolchain.link_cmd.clone()),
        ("compileFlags", toolchain.compile_flags.clone()),
        ("testFlags", toolchain.test_flags.clone()),
        ("testMainCmd", binary_path(&toolchain.test_main_tool)),
        ("chooseStageCmd", binary_path(&toolchain.choose_stage_tool)),
        ("pluginGenSrcCmd", binary_path(&toolchain.plugin_gen_tool)),
    ];
    for (name, value) in variables {
        manifest.set_variable(name, value);
    }
}
