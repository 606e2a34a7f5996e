#![allow(clippy::disallowed_methods)]

use std::{fs, path::Path, sync::Arc};

use insta::assert_snapshot;
use pretty_assertions::assert_eq;
use strata::{
    Config, DeclarationLoader, GenerateError, Generation, Generator, ModuleFactory, ModuleGraph,
    Stage,
    manifest::{BuildParams, RuleRef},
};
use tempfile::TempDir;

fn config(stage: Stage, run_tests: bool) -> Arc<Config> {
    Arc::new(Config {
        stage,
        run_tests,
        ..Config::default()
    })
}

fn load(config: &Arc<Config>, declarations: &str) -> ModuleGraph {
    DeclarationLoader::new(ModuleFactory::new(Arc::clone(config)))
        .load_str(declarations, Path::new("Strata.toml"))
        .unwrap()
}

fn generate(stage: Stage, run_tests: bool, declarations: &str) -> Generation {
    let config = config(stage, run_tests);
    let mut graph = load(&config, declarations);
    Generator::new(config).generate(&mut graph).unwrap()
}

fn only<'a>(mut actions: impl Iterator<Item = &'a BuildParams>) -> &'a BuildParams {
    let action = actions.next().expect("no matching action");
    assert!(actions.next().is_none(), "more than one matching action");
    action
}

const BOOTSTRAP_CHAIN: &str = r#"
[[module]]
type = "bootstrap_core_binary"
name = "core"
srcs = ["core.go"]
deps = ["lib_a"]

[[module]]
type = "bootstrap_package"
name = "lib_a"
dir = "lib_a"
pkg_path = "example/lib_a"
srcs = ["a.go"]
deps = ["lib_b"]

[[module]]
type = "bootstrap_package"
name = "lib_b"
dir = "lib_b"
pkg_path = "example/lib_b"
srcs = ["b.go"]

[[module]]
type = "bootstrap_package"
name = "lib_c"
dir = "lib_c"
pkg_path = "example/lib_c"
srcs = ["c.go"]
"#;

#[test]
fn test_bootstrap_stage_infects_transitive_dependencies() {
    let config = config(Stage::Bootstrap, false);
    let mut graph = load(&config, BOOTSTRAP_CHAIN);
    let generation = Generator::new(config).generate(&mut graph).unwrap();

    let stage_of = |name: &str| {
        generation
            .stages()
            .get(graph.id_by_name(name).unwrap())
            .unwrap()
    };
    assert_eq!(stage_of("core"), Stage::Bootstrap);
    assert_eq!(stage_of("lib_a"), Stage::Bootstrap);
    assert_eq!(stage_of("lib_b"), Stage::Bootstrap);
    assert_eq!(stage_of("lib_c"), Stage::Primary);

    // Every bootstrap module's whole dependency closure is bootstrap too
    for node in graph.modules() {
        if generation.stages().get(node.id) == Some(Stage::Bootstrap) {
            for dep in graph.transitive_dependencies(node.id) {
                assert_eq!(generation.stages().get(dep), Some(Stage::Bootstrap));
            }
        }
    }

    // lib_c belongs to a later stage and is skipped while bootstrapping
    let manifest = generation.manifest();
    assert!(
        manifest
            .producer_of("$buildDir/.bootstrap/lib_c/pkg/example/lib_c.a")
            .is_none()
    );
    assert_eq!(manifest.actions_with_rule("compile").count(), 3);
}

#[test]
fn test_multiple_primary_builders_fail_without_manifest() {
    let generation = generate(
        Stage::Primary,
        false,
        r#"
[[module]]
type = "bootstrap_binary"
name = "builder_one"
primary_builder = true

[[module]]
type = "bootstrap_binary"
name = "builder_two"
primary_builder = true

[[module]]
type = "bootstrap_binary"
name = "tool"
"#,
    );

    assert!(generation.has_errors());
    let err = generation.into_result().unwrap_err();
    assert_eq!(err.modules(), vec!["builder_one", "builder_two"]);
    assert!(matches!(err, GenerateError::Modules(_)));
    assert_eq!(
        err.to_string(),
        "2 module error(s)\n  module builder_one: multiple primary builder modules present\n  module builder_two: multiple primary builder modules present"
    );
}

#[test]
fn test_empty_pkg_path_fails_only_that_module() {
    let generation = generate(
        Stage::Primary,
        false,
        r#"
[[module]]
type = "bootstrap_package"
name = "broken"
srcs = ["broken.go"]

[[module]]
type = "bootstrap_package"
name = "fine"
pkg_path = "example/fine"
srcs = ["fine.go"]
"#,
    );

    assert_eq!(generation.errors().len(), 1);
    assert_eq!(generation.errors()[0].module, "broken");
    assert_eq!(
        generation.errors()[0].message,
        "module broken did not specify a valid pkg_path"
    );

    let compile = only(generation.manifest().actions_with_rule("compile"));
    assert_eq!(
        compile.outputs,
        vec!["$buildDir/.bootstrap/fine/pkg/example/fine.a"]
    );
    assert!(generation.into_result().is_err());
}

#[test]
fn test_placeholders_are_identical_across_runs() {
    let first = generate(Stage::Primary, true, BOOTSTRAP_CHAIN);
    let second = generate(Stage::Primary, true, BOOTSTRAP_CHAIN);

    let placeholders = |generation: &Generation| -> Vec<BuildParams> {
        generation
            .manifest()
            .actions()
            .iter()
            .filter(|a| matches!(a.rule, RuleRef::Phony) || a.rule_name() == "placeholder")
            .cloned()
            .collect()
    };
    assert!(!placeholders(&first).is_empty());
    assert_eq!(placeholders(&first), placeholders(&second));
    assert_eq!(first.manifest().render(), second.manifest().render());
}

#[test]
fn test_bootstrap_modules_are_placeholders_in_primary_stage() {
    let generation = generate(Stage::Primary, false, BOOTSTRAP_CHAIN);
    let manifest = generation.manifest();

    let core = manifest.producer_of("$BinDir/core").unwrap();
    assert_eq!(core.rule_name(), "placeholder");
    assert_eq!(core.inputs, vec!["$srcDir/core.go"]);
    assert_eq!(
        core.implicits,
        vec![
            "$buildDir/.bootstrap/lib_b/pkg/example/lib_b.a",
            "$buildDir/.bootstrap/lib_a/pkg/example/lib_a.a",
        ]
    );

    // Intermediates stay known to the executor
    for intermediate in [
        "$buildDir/.bootstrap/core/obj/a.out",
        "$buildDir/.bootstrap/core/obj/core.a",
        "$srcDir/core.go",
    ] {
        let action = manifest.producer_of(intermediate).unwrap();
        assert_eq!(action.rule, RuleRef::Phony);
        assert!(action.inputs.is_empty());
    }

    // lib_c is needed in this stage and really compiled
    let lib_c = manifest
        .producer_of("$buildDir/.bootstrap/lib_c/pkg/example/lib_c.a")
        .unwrap();
    assert_eq!(lib_c.rule_name(), "compile");
}

#[test]
fn test_deleted_source_stays_tracked() {
    let dir = TempDir::new().unwrap();
    let top_level = dir.path().join("Strata.toml");
    fs::write(
        &top_level,
        r#"
[[module]]
type = "bootstrap_package"
name = "lib"
dir = "lib"
pkg_path = "example/lib"
srcs = ["a.go", "b.go"]
"#,
    )
    .unwrap();
    fs::create_dir(dir.path().join("lib")).unwrap();
    fs::write(dir.path().join("lib/a.go"), "package lib\n").unwrap();
    fs::write(dir.path().join("lib/b.go"), "package lib\n").unwrap();

    let run = || {
        let config = config(Stage::Main, false);
        let mut loaded = DeclarationLoader::new(ModuleFactory::new(Arc::clone(&config)))
            .load(&top_level)
            .unwrap();
        Generator::new(config)
            .generate(&mut loaded.graph)
            .unwrap()
            .into_result()
            .unwrap()
    };

    let before = run();
    fs::remove_file(dir.path().join("lib/a.go")).unwrap();
    let after = run();

    let marker = after.producer_of("$srcDir/lib/a.go").unwrap();
    assert_eq!(marker.rule, RuleRef::Phony);
    assert!(marker.inputs.is_empty());

    let archive = after
        .producer_of("$buildDir/.bootstrap/lib/pkg/example/lib.a")
        .unwrap();
    assert_eq!(archive.inputs, vec!["$srcDir/lib/a.go", "$srcDir/lib/b.go"]);
    assert_eq!(before.render(), after.render());
}

#[test]
fn test_single_package_compiles_in_its_own_stage() {
    let generation = generate(
        Stage::Primary,
        false,
        r#"
[[module]]
type = "bootstrap_package"
name = "lib"
dir = "lib"
pkg_path = "example/lib"
srcs = ["one.go", "two.go"]
"#,
    );
    let manifest = generation.into_result().unwrap();

    let compile = only(manifest.actions_with_rule("compile"));
    assert_eq!(compile.inputs, vec!["$srcDir/lib/one.go", "$srcDir/lib/two.go"]);
    assert_eq!(compile.implicits, vec!["$compileCmd"]);
    assert_eq!(compile.args.get("pkgPath").map(String::as_str), Some("example/lib"));
    assert!(!compile.args.contains_key("incFlags"));
}

#[test]
fn test_primary_builder_registers_plugins() {
    let generation = generate(
        Stage::Primary,
        false,
        r#"
[[module]]
type = "bootstrap_binary"
name = "builder"
dir = "builder"
srcs = ["main.go"]
primary_builder = true

[[module]]
type = "bootstrap_package"
name = "plugin"
dir = "plugin"
pkg_path = "example/plugin"
srcs = ["plugin.go"]
plugin = true
"#,
    );
    assert_eq!(generation.plugins().len(), 1);
    let manifest = generation.into_result().unwrap();

    let plugin_src = "$buildDir/.bootstrap/builder/obj/plugin.go";
    let registration = only(manifest.actions_with_rule("pluginGenSrc"));
    assert_eq!(registration.outputs, vec![plugin_src]);
    assert_eq!(
        registration.args.get("plugins").map(String::as_str),
        Some("example/plugin")
    );

    let compile = manifest
        .producer_of("$buildDir/.bootstrap/builder/obj/builder.a")
        .unwrap();
    assert_eq!(compile.inputs, vec!["$srcDir/builder/main.go", plugin_src]);
    assert_eq!(
        compile.args.get("incFlags").map(String::as_str),
        Some("-I $buildDir/.bootstrap/plugin/pkg")
    );

    let link = only(manifest.actions_with_rule("link"));
    assert_eq!(
        link.args.get("libDirFlags").map(String::as_str),
        Some("-L $buildDir/.bootstrap/plugin/pkg")
    );
    let copy = manifest.producer_of("$BinDir/builder").unwrap();
    assert_eq!(copy.inputs, vec!["$buildDir/.bootstrap/builder/obj/a.out"]);
}

#[test]
fn test_bootstrap_regeneration_depends_on_test_results() {
    let generation = generate(
        Stage::Bootstrap,
        true,
        r#"
[[module]]
type = "bootstrap_core_binary"
name = "core"
dir = "core"
srcs = ["core.go"]
test_srcs = ["core_test.go"]
deps = ["lib"]

[[module]]
type = "bootstrap_package"
name = "lib"
dir = "lib"
pkg_path = "example/lib"
srcs = ["lib.go"]
test_srcs = ["lib_test.go"]
"#,
    );
    let manifest = generation.into_result().unwrap();

    let regen = only(manifest.actions_with_rule("regenPrimary"));
    assert_eq!(regen.args.get("runTests").map(String::as_str), Some("-t"));
    if let RuleRef::Rule(rule) = &regen.rule {
        assert!(rule.command.contains("$runTests"));
    }
    for sentinel in [
        "$buildDir/.bootstrap/core/test/test.passed",
        "$buildDir/.bootstrap/lib/test/test.passed",
    ] {
        assert!(regen.implicits.iter().any(|i| i == sentinel), "missing {sentinel}");
        assert_eq!(manifest.producer_of(sentinel).unwrap().rule_name(), "test");
    }
    assert!(regen.implicits.iter().any(|i| i == "$BinDir/core"));
    assert!(regen.implicits.iter().any(|i| i == "$srcDir/Strata.toml"));

    // The test run gates the real archive through an order-only edge
    let archive = manifest
        .producer_of("$buildDir/.bootstrap/lib/pkg/example/lib.a")
        .unwrap();
    assert_eq!(
        archive.order_only,
        vec!["$buildDir/.bootstrap/lib/test/test.passed"]
    );

    let run = manifest
        .producer_of("$buildDir/.bootstrap/lib/test/test.passed")
        .unwrap();
    assert_eq!(
        run.args.get("pkgSrcDir").map(String::as_str),
        Some("$srcDir/lib")
    );
}

const TWO_BUILDERS: &str = r#"
[[module]]
type = "bootstrap_core_binary"
name = "core"
dir = "core"
srcs = ["core.go"]

[[module]]
type = "bootstrap_binary"
name = "builder"
dir = "builder"
srcs = ["builder.go"]
primary_builder = true
"#;

fn assert_builddir_after_variables(manifest: &strata::Manifest, expected: &str) {
    assert_eq!(manifest.build_dir(), Some(expected));
    let rendered = manifest.render();
    let line_of = |prefix: &str| {
        rendered
            .lines()
            .position(|line| line.starts_with(prefix))
            .unwrap()
    };
    assert!(line_of("buildDir = ") < line_of("builddir = "));
}

#[test]
fn test_bootstrap_stage_wiring() {
    let generation = generate(Stage::Bootstrap, false, TWO_BUILDERS);
    let manifest = generation.into_result().unwrap();
    assert_builddir_after_variables(&manifest, "$buildDir/.minibootstrap");

    let bootstrap_deps = vec!["$BinDir/core", "$srcDir/Strata.toml"];

    let regen_primary = only(manifest.actions_with_rule("regenPrimary"));
    assert_eq!(
        regen_primary.outputs,
        vec![
            "$buildDir/.bootstrap/primary.ninja.in",
            "$buildDir/.bootstrap/primary.ninja.in.timestamp",
        ]
    );
    assert_eq!(regen_primary.inputs, vec!["$srcDir/Strata.toml"]);
    assert_eq!(regen_primary.implicits, bootstrap_deps);
    assert!(!regen_primary.args.contains_key("runTests"));
    assert_eq!(
        regen_primary.args.get("timestampdep").map(String::as_str),
        Some("$buildDir/.bootstrap/primary.ninja.in.timestamp.d")
    );

    let regen_bootstrap = only(manifest.actions_with_rule("regenBootstrap"));
    assert_eq!(regen_bootstrap.outputs, vec!["$buildDir/.bootstrap/bootstrap.ninja.in"]);
    assert_eq!(regen_bootstrap.inputs, vec!["$srcDir/Strata.toml"]);
    assert_eq!(
        regen_bootstrap.implicits,
        vec!["$bootstrapManifest", "$BinDir/ministrata"]
    );
    let RuleRef::Rule(rule) = &regen_bootstrap.rule else {
        panic!("regenBootstrap must be a declared rule");
    };
    assert!(rule.generator);

    let trigger = manifest.producer_of("$buildDir/.bootstrap/notAFile").unwrap();
    assert_eq!(trigger.rule, RuleRef::Phony);
    assert!(trigger.inputs.is_empty());

    let chooser = only(manifest.actions_with_rule("chooseStage"));
    assert_eq!(chooser.outputs, vec!["$buildDir/.bootstrap/build.ninja.in"]);
    assert_eq!(
        chooser.inputs,
        vec![
            "$buildDir/.bootstrap/bootstrap.ninja.in",
            "$buildDir/.bootstrap/primary.ninja.in",
        ]
    );
    assert_eq!(
        chooser.implicits,
        vec![
            "$chooseStageCmd",
            "$bootstrapManifest",
            "$buildDir/.bootstrap/notAFile",
        ]
    );
    assert_eq!(
        chooser.args.get("current").map(String::as_str),
        Some("$buildDir/.bootstrap/bootstrap.ninja.in")
    );

    let last = manifest.actions().last().unwrap();
    assert_eq!(last.rule_name(), "bootstrap");
    assert_eq!(last.outputs, vec!["$buildDir/build.ninja"]);
    assert_eq!(last.inputs, vec!["$buildDir/.bootstrap/build.ninja.in"]);
}

#[test]
fn test_primary_stage_wiring() {
    let generation = generate(Stage::Primary, false, TWO_BUILDERS);
    let manifest = generation.into_result().unwrap();
    assert_builddir_after_variables(&manifest, "$buildDir/.bootstrap");

    let docs = "$buildDir/.bootstrap/docs/builder.html";

    let regen_main = only(manifest.actions_with_rule("regenMain"));
    assert_eq!(
        regen_main.outputs,
        vec![
            "$buildDir/.bootstrap/main.ninja.in",
            "$buildDir/.bootstrap/main.ninja.in.timestamp",
        ]
    );
    assert_eq!(regen_main.inputs, vec!["$srcDir/Strata.toml"]);
    assert_eq!(
        regen_main.implicits,
        vec!["$BinDir/builder", "$srcDir/Strata.toml", docs]
    );
    let RuleRef::Rule(rule) = &regen_main.rule else {
        panic!("regenMain must be a declared rule");
    };
    assert!(rule.command.starts_with("$BinDir/builder -m $bootstrapManifest "));

    let regen_docs = only(manifest.actions_with_rule("regenDocs"));
    assert_eq!(regen_docs.outputs, vec![docs]);
    assert!(regen_docs.inputs.is_empty());
    assert_eq!(regen_docs.implicits, vec!["$BinDir/builder"]);

    let touch = only(manifest.actions_with_rule("touch"));
    assert_eq!(
        touch.outputs,
        vec!["$buildDir/.bootstrap/primary.ninja.in.timestamp"]
    );
    assert_eq!(touch.implicits, vec!["$BinDir/core", "$srcDir/Strata.toml"]);
    assert_eq!(
        touch.args.get("depfile").map(String::as_str),
        Some("$buildDir/.bootstrap/primary.ninja.in.timestamp.d")
    );
    assert_eq!(touch.args.get("generator").map(String::as_str), Some("true"));

    assert_eq!(
        manifest.producer_of("$buildDir/.bootstrap/notAFile").unwrap().rule,
        RuleRef::Phony
    );

    let chooser = only(manifest.actions_with_rule("chooseStage"));
    assert_eq!(
        chooser.inputs,
        vec![
            "$buildDir/.bootstrap/bootstrap.ninja.in",
            "$buildDir/.bootstrap/primary.ninja.in",
            "$buildDir/.bootstrap/main.ninja.in",
        ]
    );
    assert_eq!(
        chooser.implicits,
        vec![
            "$chooseStageCmd",
            "$bootstrapManifest",
            "$buildDir/.bootstrap/notAFile",
            "$buildDir/.bootstrap/primary.ninja.in.timestamp",
        ]
    );
    assert_eq!(
        chooser.args.get("current").map(String::as_str),
        Some("$buildDir/.bootstrap/primary.ninja.in")
    );

    // The bootstrap fragment is kept alive as a phony marker
    let marker = manifest
        .producer_of("$buildDir/.bootstrap/bootstrap.ninja.in")
        .unwrap();
    assert_eq!(marker.rule, RuleRef::Phony);
    assert!(manifest.actions_with_rule("regenPrimary").next().is_none());
}

#[test]
fn test_dependency_cycle_is_reported() {
    let config = config(Stage::Primary, false);
    let mut graph = load(
        &config,
        r#"
[[module]]
type = "bootstrap_package"
name = "a"
pkg_path = "a"
deps = ["b"]

[[module]]
type = "bootstrap_package"
name = "b"
pkg_path = "b"
deps = ["a"]
"#,
    );
    let err = Generator::new(config).generate(&mut graph).unwrap_err();
    assert!(matches!(err, GenerateError::Cycle(_)));
}

#[test]
fn test_main_stage_manifest_without_modules() {
    let generation = generate(Stage::Main, false, "");
    assert_snapshot!(generation.manifest().render(), @r"
    # This file is generated by strata. Do not edit.

    ninja_required_version = 1.7.0

    buildDir = .
    srcDir = .
    toolDir = /usr/lib/strata/tool
    BinDir = $buildDir/.bootstrap/bin
    bootstrapManifest = build.ninja.in
    bootstrapCmd = $srcDir/bootstrap.bash
    compileCmd = $toolDir/compile
    linkCmd = $toolDir/link
    compileFlags = -complete -pack
    testFlags = -test.short
    testMainCmd = $BinDir/testmain
    chooseStageCmd = $BinDir/choosestage
    pluginGenSrcCmd = $BinDir/loadplugins

    builddir = $buildDir

    rule touch
        command = touch $out
        description = touch $out

    rule chooseStage
        command = $chooseStageCmd --current $current --bootstrap $bootstrapManifest -o $out $in
        description = choosing next stage

    rule cp
        command = cp $in $out
        description = cp $out

    rule bootstrap
        command = $bootstrapCmd -i $in -b $buildDir
        description = bootstrap $in
        generator = true

    build $buildDir/.bootstrap/primary.ninja.in.timestamp: touch | $srcDir/Strata.toml
        depfile = $buildDir/.bootstrap/primary.ninja.in.timestamp.d
        generator = true

    build $buildDir/.bootstrap/main.ninja.in.timestamp: touch | $srcDir/Strata.toml $buildDir/.bootstrap/docs/ministrata.html
        depfile = $buildDir/.bootstrap/main.ninja.in.timestamp.d
        generator = true

    build $buildDir/.bootstrap/build.ninja.in: chooseStage $buildDir/.bootstrap/bootstrap.ninja.in $buildDir/.bootstrap/primary.ninja.in $buildDir/.bootstrap/main.ninja.in | $chooseStageCmd $bootstrapManifest $buildDir/.bootstrap/primary.ninja.in.timestamp $buildDir/.bootstrap/main.ninja.in.timestamp
        current = $buildDir/.bootstrap/main.ninja.in
        generator = true

    build $buildDir/.bootstrap/main.ninja.in $buildDir/.bootstrap/docs/ministrata.html: phony

    build $buildDir/bin/ministrata: cp $BinDir/ministrata

    build $buildDir/build.ninja: bootstrap $buildDir/.bootstrap/build.ninja.in | $bootstrapCmd
    ");
}
