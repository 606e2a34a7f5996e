use std::{
    fs,
    path::{Path, PathBuf},
    process::ExitCode,
    sync::Arc,
};

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use log::{LevelFilter, error, info};
use strata::{
    Config, ConfigLoader, DeclarationLoader, Generator, ModuleFactory, Stage,
    docs::write_docs, manifest::write_depfile, orchestrator::Orchestrator,
};

#[derive(Parser, Debug)]
#[command(
    name = "strata",
    version,
    about = "Generate a Ninja manifest from module declarations"
)]
struct Cli {
    /// Top-level declaration file
    declarations: PathBuf,

    /// Manifest to write
    #[arg(short, long, required_unless_present = "docs")]
    output: Option<PathBuf>,

    /// Value of $buildDir in the generated manifest
    #[arg(short = 'b', long = "build-dir")]
    build_dir: Option<String>,

    /// Write a depfile listing every declaration file read
    #[arg(short, long)]
    depfile: Option<PathBuf>,

    /// Bootstrap manifest the stage chooser falls back to
    #[arg(short = 'm', long = "bootstrap-manifest")]
    bootstrap_manifest: Option<String>,

    /// Build and run tests of bootstrap modules
    #[arg(short = 't', long = "run-tests")]
    run_tests: bool,

    /// Act as the primary builder and generate the main manifest
    #[arg(short, long)]
    primary: bool,

    /// Generate the manifest that builds the primary builder
    #[arg(long = "build-primary")]
    build_primary: bool,

    /// Timestamp file touched after the manifest is written
    #[arg(long)]
    timestamp: Option<PathBuf>,

    /// Depfile for the timestamp file
    #[arg(long)]
    timestampdep: Option<PathBuf>,

    /// Write module type documentation to this file instead of a manifest
    #[arg(long)]
    docs: Option<PathBuf>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn stage(&self) -> Stage {
        if self.build_primary {
            Stage::Primary
        } else if self.primary {
            Stage::Main
        } else {
            Stage::Bootstrap
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(&cli) {
        Ok(code) => code,
        Err(err) => {
            error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .format_timestamp(None)
        .init();
}

fn load_config(cli: &Cli) -> Result<Config> {
    let project_dir = cli
        .declarations
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    let mut config = Config {
        top_level_file: cli.declarations.clone(),
        src_dir: project_dir.display().to_string(),
        ..Config::default()
    };
    config.apply(&ConfigLoader::new().load(project_dir)?);

    config.stage = cli.stage();
    config.run_tests |= cli.run_tests;
    if let Some(build_dir) = &cli.build_dir {
        config.build_dir.clone_from(build_dir);
    }
    if let Some(manifest) = &cli.bootstrap_manifest {
        config.bootstrap_manifest.clone_from(manifest);
    }
    Ok(config)
}

fn run(cli: &Cli) -> Result<ExitCode> {
    let config = Arc::new(load_config(cli)?);
    info!(
        "Generating {} stage manifest from {}",
        config.stage,
        cli.declarations.display()
    );

    let loader = DeclarationLoader::new(ModuleFactory::new(Arc::clone(&config)));
    let mut loaded = loader
        .load(&cli.declarations)
        .with_context(|| format!("failed to load {}", cli.declarations.display()))?;

    if let Some(docs) = &cli.docs {
        let name = Orchestrator::new(&config)
            .primary_builder(&loaded.graph)
            .map_or_else(|_| config.toolchain.mini_builder.clone(), |b| b.name);
        write_docs(docs, &name, &loaded.graph)?;
        return Ok(ExitCode::SUCCESS);
    }

    let Some(output) = &cli.output else {
        anyhow::bail!("no output manifest given");
    };

    let generation = Generator::new(Arc::clone(&config)).generate(&mut loaded.graph)?;
    let manifest = match generation.into_result() {
        Ok(manifest) => manifest,
        Err(err) => {
            error!("{err}");
            return Ok(ExitCode::FAILURE);
        }
    };

    manifest.write_to(output)?;
    info!("Wrote {}", output.display());

    let deps: Vec<String> = loaded
        .files
        .iter()
        .map(|f| f.display().to_string())
        .collect();
    if let Some(depfile) = &cli.depfile {
        write_depfile(depfile, &output.display().to_string(), &deps)?;
    }
    if let Some(timestamp) = &cli.timestamp {
        fs::write(timestamp, "")
            .with_context(|| format!("failed to write {}", timestamp.display()))?;
        if let Some(timestampdep) = &cli.timestampdep {
            write_depfile(timestampdep, &timestamp.display().to_string(), &deps)?;
        }
    }

    Ok(ExitCode::SUCCESS)
}
