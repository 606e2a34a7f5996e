//! Compilable-unit descriptors
//!
//! A [`Descriptor`] is the in-memory form of one declared module. The two
//! variants share capability groups, exposed as small traits and reached
//! through the accessor methods on [`Descriptor`] rather than by matching on
//! concrete types at every use site.

use std::{fmt, str::FromStr, sync::Arc};

use serde::Deserialize;

use crate::{config::Config, emitter::ActionEmitter, stage::Stage};

/// Registered module types, each backed by a factory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModuleType {
    /// A library package, built in the primary stage unless pulled earlier
    BootstrapPackage,
    /// A binary the mini builder itself needs; always bootstrap stage
    BootstrapCoreBinary,
    /// A binary built in the primary stage, such as the primary builder
    BootstrapBinary,
}

impl ModuleType {
    pub const ALL: [Self; 3] = [
        Self::BootstrapPackage,
        Self::BootstrapCoreBinary,
        Self::BootstrapBinary,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::BootstrapPackage => "bootstrap_package",
            Self::BootstrapCoreBinary => "bootstrap_core_binary",
            Self::BootstrapBinary => "bootstrap_binary",
        }
    }

    pub fn default_stage(self) -> Stage {
        match self {
            Self::BootstrapCoreBinary => Stage::Bootstrap,
            Self::BootstrapPackage | Self::BootstrapBinary => Stage::Primary,
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::BootstrapPackage => {
                "A package compiled into an archive that other modules import."
            }
            Self::BootstrapCoreBinary => {
                "A binary required by the mini builder, built while bootstrapping."
            }
            Self::BootstrapBinary => "A binary built once the bootstrap stage has completed.",
        }
    }

    /// Property names and their meaning, for generated documentation
    pub fn properties(self) -> &'static [(&'static str, &'static str)] {
        match self {
            Self::BootstrapPackage => &[
                ("pkg_path", "import path of the package (required)"),
                ("srcs", "source files, relative to the module directory"),
                ("test_srcs", "test-only source files"),
                ("plugin", "register the package with the primary builder"),
            ],
            Self::BootstrapCoreBinary | Self::BootstrapBinary => &[
                ("srcs", "source files, relative to the module directory"),
                ("test_srcs", "test-only source files"),
                ("primary_builder", "this binary generates the main manifest"),
            ],
        }
    }
}

impl fmt::Display for ModuleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ModuleType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.name() == s)
            .ok_or_else(|| s.to_owned())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PackageProperties {
    pub pkg_path: String,
    pub srcs: Vec<String>,
    pub test_srcs: Vec<String>,
    pub plugin: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BinaryProperties {
    pub srcs: Vec<String>,
    pub test_srcs: Vec<String>,
    pub primary_builder: bool,
}

/// Carries a declared build stage
pub trait StageBearer {
    fn declared_stage(&self) -> Stage;
}

/// Can be registered with the primary builder
pub trait PluginProvider {
    fn pkg_path(&self) -> &str;
    fn is_plugin(&self) -> bool;
}

/// Declares implementation and test sources
pub trait SourceProvider {
    fn srcs(&self) -> &[String];
    fn test_srcs(&self) -> &[String];
}

/// A library package producing an archive
#[derive(Debug, Clone)]
pub struct Package {
    pub properties: PackageProperties,
    config: Arc<Config>,
    stage: Stage,
}

impl Package {
    pub fn config(&self) -> &Config {
        &self.config
    }
}

impl StageBearer for Package {
    fn declared_stage(&self) -> Stage {
        self.stage
    }
}

impl PluginProvider for Package {
    fn pkg_path(&self) -> &str {
        &self.properties.pkg_path
    }

    fn is_plugin(&self) -> bool {
        self.properties.plugin
    }
}

impl SourceProvider for Package {
    fn srcs(&self) -> &[String] {
        &self.properties.srcs
    }

    fn test_srcs(&self) -> &[String] {
        &self.properties.test_srcs
    }
}

/// An executable linked from its own sources and its package dependencies
#[derive(Debug, Clone)]
pub struct Binary {
    pub properties: BinaryProperties,
    config: Arc<Config>,
    stage: Stage,
}

impl Binary {
    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn is_primary_builder(&self) -> bool {
        self.properties.primary_builder
    }
}

impl StageBearer for Binary {
    fn declared_stage(&self) -> Stage {
        self.stage
    }
}

impl SourceProvider for Binary {
    fn srcs(&self) -> &[String] {
        &self.properties.srcs
    }

    fn test_srcs(&self) -> &[String] {
        &self.properties.test_srcs
    }
}

#[derive(Debug, Clone)]
pub enum Descriptor {
    Package(Package),
    Binary(Binary),
}

impl Descriptor {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Package(_) => "package",
            Self::Binary(_) => "binary",
        }
    }

    pub fn as_package(&self) -> Option<&Package> {
        match self {
            Self::Package(package) => Some(package),
            Self::Binary(_) => None,
        }
    }

    pub fn as_binary(&self) -> Option<&Binary> {
        match self {
            Self::Binary(binary) => Some(binary),
            Self::Package(_) => None,
        }
    }

    pub fn as_stage_bearer(&self) -> Option<&dyn StageBearer> {
        match self {
            Self::Package(package) => Some(package),
            Self::Binary(binary) => Some(binary),
        }
    }

    pub fn as_plugin_provider(&self) -> Option<&dyn PluginProvider> {
        match self {
            Self::Package(package) => Some(package),
            Self::Binary(_) => None,
        }
    }

    pub fn sources(&self) -> &dyn SourceProvider {
        match self {
            Self::Package(package) => package,
            Self::Binary(binary) => binary,
        }
    }

    pub fn emitter(&self) -> &dyn ActionEmitter {
        match self {
            Self::Package(package) => package,
            Self::Binary(binary) => binary,
        }
    }

    /// Whether this module produces an archive that dependents compile and
    /// link against
    pub fn is_package_producer(&self) -> bool {
        matches!(self, Self::Package(_))
    }

    pub fn is_plugin(&self) -> bool {
        self.as_plugin_provider().is_some_and(|p| p.is_plugin())
    }

    pub fn is_primary_builder(&self) -> bool {
        self.as_binary().is_some_and(Binary::is_primary_builder)
    }
}

/// Creates descriptors wired to the run's shared configuration
#[derive(Debug, Clone)]
pub struct ModuleFactory {
    config: Arc<Config>,
}

impl ModuleFactory {
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &Arc<Config> {
        &self.config
    }

    pub fn package(&self, properties: PackageProperties) -> Descriptor {
        Descriptor::Package(Package {
            properties,
            config: Arc::clone(&self.config),
            stage: ModuleType::BootstrapPackage.default_stage(),
        })
    }

    pub fn binary(&self, module_type: ModuleType, properties: BinaryProperties) -> Descriptor {
        Descriptor::Binary(Binary {
            properties,
            config: Arc::clone(&self.config),
            stage: module_type.default_stage(),
        })
    }

    /// Build a descriptor of `module_type` from its raw property table
    pub fn create(
        &self,
        module_type: ModuleType,
        properties: toml::Table,
    ) -> Result<Descriptor, toml::de::Error> {
        let value = toml::Value::Table(properties);
        Ok(match module_type {
            ModuleType::BootstrapPackage => self.package(value.try_into()?),
            ModuleType::BootstrapCoreBinary | ModuleType::BootstrapBinary => {
                self.binary(module_type, value.try_into()?)
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn factory() -> ModuleFactory {
        ModuleFactory::new(Arc::new(Config::default()))
    }

    #[test]
    fn test_factories_assign_default_stages() {
        let factory = factory();
        let stage = |d: &Descriptor| d.as_stage_bearer().map(|b| b.declared_stage());

        let package = factory.package(PackageProperties::default());
        let core = factory.binary(ModuleType::BootstrapCoreBinary, BinaryProperties::default());
        let binary = factory.binary(ModuleType::BootstrapBinary, BinaryProperties::default());

        assert_eq!(stage(&package), Some(Stage::Primary));
        assert_eq!(stage(&core), Some(Stage::Bootstrap));
        assert_eq!(stage(&binary), Some(Stage::Primary));
    }

    #[test]
    fn test_create_from_table() {
        let table: toml::Table = toml::from_str(
            "pkg_path = \"example/lib\"\nsrcs = [\"lib.go\"]\nplugin = true\n",
        )
        .unwrap();
        let descriptor = factory()
            .create(ModuleType::BootstrapPackage, table)
            .unwrap();

        assert!(descriptor.is_package_producer());
        assert!(descriptor.is_plugin());
        assert_eq!(descriptor.sources().srcs(), ["lib.go".to_owned()]);
        assert_eq!(
            descriptor.as_plugin_provider().map(|p| p.pkg_path()),
            Some("example/lib")
        );
    }

    #[test]
    fn test_create_rejects_properties_of_other_variant() {
        let table: toml::Table = toml::from_str("primary_builder = true\n").unwrap();
        assert!(
            factory()
                .create(ModuleType::BootstrapPackage, table)
                .is_err()
        );
    }

    #[test]
    fn test_module_type_round_trips_through_name() {
        for module_type in ModuleType::ALL {
            assert_eq!(module_type.name().parse::<ModuleType>(), Ok(module_type));
        }
        assert!("cc_library".parse::<ModuleType>().is_err());
    }
}
