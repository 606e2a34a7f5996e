//! Placeholder actions for modules built by an earlier stage
//!
//! The manifest that regenerates stage N is itself produced by a builder
//! from stage N-1, so modules that are not rebuilt here must still present
//! stable artifact paths to the executor.

use log::debug;

use super::ModuleContext;
use crate::{
    manifest::{ActionSink, BuildParams},
    rules,
};

/// Declare `target` as produced by a no-op from the module's sources.
///
/// Every source also gets a built-in phony action keyed on its own path, so a
/// deleted or renamed source stays a known dependency and makes the next
/// build fail instead of silently reusing a stale archive. Every intermediate
/// gets the same treatment so orphan cleanup never removes it.
pub fn emit_placeholder(
    ctx: &ModuleContext<'_>,
    sink: &mut dyn ActionSink,
    target: &str,
    srcs: &[String],
    gen_srcs: &[String],
    intermediates: &[String],
) {
    let dep_targets: Vec<String> = ctx
        .package_deps()
        .iter()
        .map(|d| d.archive.clone())
        .collect();

    let mut inputs = ctx.source_paths(srcs);
    inputs.extend(gen_srcs.iter().cloned());

    debug!("{}: placeholder for {target}", ctx.name());
    sink.build(
        BuildParams::new(&rules::PHONY)
            .outputs([target])
            .inputs(inputs.iter().cloned())
            .implicits(dep_targets),
    );

    for src in inputs {
        sink.build(BuildParams::phony().outputs([src]));
    }

    for intermediate in intermediates {
        sink.build(BuildParams::phony().outputs([intermediate.as_str()]));
    }
}
