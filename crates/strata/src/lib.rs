//! strata: the self-bootstrapping core of a three-stage meta-build tool.
//!
//! A declarative module graph is compiled into a Ninja manifest. The same
//! tool regenerates itself across three ordered stages: a hand-written mini
//! builder constructs the primary builder, which in turn produces the final
//! project manifest.

pub mod artifacts;
pub mod config;
pub mod declarations;
pub mod descriptor;
pub mod docs;
pub mod emitter;
pub mod error;
pub mod generator;
pub mod manifest;
pub mod module_graph;
pub mod orchestrator;
pub mod paths;
pub mod plugins;
pub mod rules;
pub mod stage;

pub use config::{Config, ConfigLoader, Toolchain};
pub use declarations::{DeclarationLoader, LoadedDeclarations};
pub use descriptor::{Binary, Descriptor, ModuleFactory, ModuleType, Package};
pub use error::{DeclarationError, GenerateError, ModuleError};
pub use generator::{Generation, Generator};
pub use manifest::{ActionSink, BuildParams, Manifest};
pub use module_graph::{ModuleGraph, ModuleId};
pub use stage::{Stage, StageMap};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
