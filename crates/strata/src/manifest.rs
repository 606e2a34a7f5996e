//! Build actions and the manifest they are collected into
//!
//! Emitters describe work as [`BuildParams`] handed to an [`ActionSink`].
//! [`Manifest`] is the sink used for real runs: it keeps actions in emission
//! order and renders them as a Ninja file. Rendering is a pure function of
//! the collected actions, so identical inputs produce byte-identical files.

use std::{
    fmt::{self, Write as _},
    fs,
    path::Path,
    sync::Arc,
};

use anyhow::{Context, Result};
use indexmap::{IndexMap, IndexSet};
use log::trace;

const NINJA_REQUIRED_VERSION: &str = "1.7.0";

/// A command template shared by many actions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    pub name: String,
    pub command: String,
    pub description: String,
    pub depfile: Option<String>,
    /// Ninja skips restat and cleanup for generator outputs
    pub generator: bool,
    /// Per-action variables the command template accepts
    pub variables: Vec<String>,
}

impl Rule {
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            description: String::new(),
            depfile: None,
            generator: false,
            variables: Vec::new(),
        }
    }

    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    #[must_use]
    pub fn depfile(mut self, depfile: impl Into<String>) -> Self {
        self.depfile = Some(depfile.into());
        self
    }

    #[must_use]
    pub fn generator(mut self) -> Self {
        self.generator = true;
        self
    }

    #[must_use]
    pub fn variables(mut self, variables: &[&str]) -> Self {
        self.variables = variables.iter().map(|v| (*v).to_owned()).collect();
        self
    }

    pub fn accepts(&self, variable: &str) -> bool {
        self.variables.iter().any(|v| v == variable)
    }
}

/// The rule an action runs: Ninja's built-in `phony` or a declared rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleRef {
    /// Built-in no-op. A phony output with no inputs is always considered
    /// dirty when missing, and never deleted during cleanup.
    Phony,
    Rule(Arc<Rule>),
}

impl RuleRef {
    pub fn name(&self) -> &str {
        match self {
            Self::Phony => "phony",
            Self::Rule(rule) => &rule.name,
        }
    }
}

/// One declared unit of work
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildParams {
    pub rule: RuleRef,
    pub outputs: Vec<String>,
    pub inputs: Vec<String>,
    /// Dependencies that are not passed on the command line
    pub implicits: Vec<String>,
    /// Must exist before the action runs, but never make it dirty
    pub order_only: Vec<String>,
    pub args: IndexMap<String, String>,
}

impl BuildParams {
    pub fn new(rule: &Arc<Rule>) -> Self {
        Self::with_rule(RuleRef::Rule(Arc::clone(rule)))
    }

    /// A built-in phony action
    pub fn phony() -> Self {
        Self::with_rule(RuleRef::Phony)
    }

    fn with_rule(rule: RuleRef) -> Self {
        Self {
            rule,
            outputs: Vec::new(),
            inputs: Vec::new(),
            implicits: Vec::new(),
            order_only: Vec::new(),
            args: IndexMap::new(),
        }
    }

    #[must_use]
    pub fn outputs<I: IntoIterator<Item = S>, S: Into<String>>(mut self, outputs: I) -> Self {
        self.outputs.extend(outputs.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn inputs<I: IntoIterator<Item = S>, S: Into<String>>(mut self, inputs: I) -> Self {
        self.inputs.extend(inputs.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn implicits<I: IntoIterator<Item = S>, S: Into<String>>(mut self, implicits: I) -> Self {
        self.implicits.extend(implicits.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn order_only<I: IntoIterator<Item = S>, S: Into<String>>(mut self, deps: I) -> Self {
        self.order_only.extend(deps.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn arg(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.args.insert(name.into(), value.into());
        self
    }

    pub fn rule_name(&self) -> &str {
        self.rule.name()
    }
}

/// Receiver of emitted actions
pub trait ActionSink {
    fn build(&mut self, params: BuildParams);

    /// Set Ninja's `builddir`, the scope of its orphan cleanup
    fn set_build_dir(&mut self, dir: &str);
}

/// Actions collected for one stage, renderable as a Ninja file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    build_dir: Option<String>,
    variables: IndexMap<String, String>,
    actions: Vec<BuildParams>,
}

impl Manifest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Define a top-level variable. Redefinition replaces the value in place.
    pub fn set_variable(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.variables.insert(name.into(), value.into());
    }

    pub fn variable(&self, name: &str) -> Option<&str> {
        self.variables.get(name).map(String::as_str)
    }

    pub fn build_dir(&self) -> Option<&str> {
        self.build_dir.as_deref()
    }

    pub fn actions(&self) -> &[BuildParams] {
        &self.actions
    }

    /// Actions running the rule called `rule`
    pub fn actions_with_rule<'a>(&'a self, rule: &'a str) -> impl Iterator<Item = &'a BuildParams> {
        self.actions.iter().filter(move |a| a.rule_name() == rule)
    }

    /// The first action declaring `output`
    pub fn producer_of(&self, output: &str) -> Option<&BuildParams> {
        self.actions
            .iter()
            .find(|a| a.outputs.iter().any(|o| o == output))
    }

    /// Declared rules in order of first use
    pub fn rules(&self) -> Vec<&Rule> {
        let mut seen = IndexSet::new();
        self.actions
            .iter()
            .filter_map(|action| match &action.rule {
                RuleRef::Rule(rule) if seen.insert(rule.name.as_str()) => Some(rule.as_ref()),
                _ => None,
            })
            .collect()
    }

    pub fn render(&self) -> String {
        self.to_string()
    }

    pub fn write_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        fs::write(path, self.render())
            .with_context(|| format!("failed to write manifest {}", path.display()))
    }

    fn write_rule(out: &mut fmt::Formatter<'_>, rule: &Rule) -> fmt::Result {
        writeln!(out, "rule {}", rule.name)?;
        writeln!(out, "    command = {}", rule.command)?;
        if !rule.description.is_empty() {
            writeln!(out, "    description = {}", rule.description)?;
        }
        if let Some(depfile) = &rule.depfile {
            writeln!(out, "    depfile = {depfile}")?;
        }
        if rule.generator {
            writeln!(out, "    generator = true")?;
        }
        writeln!(out)
    }

    fn write_action(out: &mut fmt::Formatter<'_>, action: &BuildParams) -> fmt::Result {
        let mut line = String::from("build");
        for output in &action.outputs {
            write!(line, " {}", escape_path(output))?;
        }
        write!(line, ": {}", action.rule_name())?;
        for input in &action.inputs {
            write!(line, " {}", escape_path(input))?;
        }
        if !action.implicits.is_empty() {
            line.push_str(" |");
            for implicit in &action.implicits {
                write!(line, " {}", escape_path(implicit))?;
            }
        }
        if !action.order_only.is_empty() {
            line.push_str(" ||");
            for dep in &action.order_only {
                write!(line, " {}", escape_path(dep))?;
            }
        }
        writeln!(out, "{line}")?;

        let mut names: Vec<&String> = action.args.keys().collect();
        names.sort();
        for name in names {
            writeln!(out, "    {name} = {}", action.args[name])?;
        }
        writeln!(out)
    }
}

impl ActionSink for Manifest {
    fn build(&mut self, params: BuildParams) {
        if let RuleRef::Rule(rule) = &params.rule {
            debug_assert!(
                params.args.keys().all(|arg| rule.accepts(arg)),
                "rule {} does not accept args {:?}",
                rule.name,
                params.args.keys().collect::<Vec<_>>()
            );
        }
        trace!("build {:?}: {}", params.outputs, params.rule_name());
        self.actions.push(params);
    }

    fn set_build_dir(&mut self, dir: &str) {
        self.build_dir = Some(dir.to_owned());
    }
}

impl fmt::Display for Manifest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "# This file is generated by strata. Do not edit.")?;
        writeln!(f)?;
        writeln!(f, "ninja_required_version = {NINJA_REQUIRED_VERSION}")?;
        writeln!(f)?;
        // Top-level bindings expand as they are read, so `builddir` has to
        // follow the variables it refers to.
        if !self.variables.is_empty() {
            for (name, value) in &self.variables {
                writeln!(f, "{name} = {value}")?;
            }
            writeln!(f)?;
        }
        if let Some(build_dir) = &self.build_dir {
            writeln!(f, "builddir = {build_dir}")?;
            writeln!(f)?;
        }
        for rule in self.rules() {
            Self::write_rule(f, rule)?;
        }
        for action in &self.actions {
            Self::write_action(f, action)?;
        }
        Ok(())
    }
}

/// Escape a path for use in a build line. `$` is left alone so variable
/// references such as `$buildDir` keep working.
pub fn escape_path(path: &str) -> String {
    let mut escaped = String::with_capacity(path.len());
    for c in path.chars() {
        match c {
            ' ' | ':' => {
                escaped.push('$');
                escaped.push(c);
            }
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Write a Make-style depfile declaring that `target` depends on `deps`
pub fn write_depfile(path: &Path, target: &str, deps: &[String]) -> Result<()> {
    let mut contents = format!("{}:", escape_depfile_path(target));
    for dep in deps {
        write!(contents, " \\\n    {}", escape_depfile_path(dep))?;
    }
    contents.push('\n');
    fs::write(path, contents).with_context(|| format!("failed to write depfile {}", path.display()))
}

fn escape_depfile_path(path: &str) -> String {
    path.replace(' ', "\\ ")
}
