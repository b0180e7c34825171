//! Command-line interface for the featstore feature store.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `import` | Import a GeoJSON Feature or FeatureCollection |
//! | `get` | Show the current version of a feature |
//! | `list` | List entries by uid, bounding box, time or keyword |
//! | `bbox` | Show the extent of all stored geometries |
//! | `count` | Count features and versions |
//! | `remove` | Remove a feature version, or every matching version |
//! | `config` | Show, locate or initialize the store configuration |
//!
//! # Environment Variables
//!
//! - `FEATSTORE_CONFIG`: configuration file (overridden by `--config`)
//! - `FEATSTORE_DB`: database file (overridden by `--database`)
//! - `RUST_LOG`: log filter when neither `--verbose` nor `--quiet` is given

use std::io::{self, Read, Write};
use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use featstore_store::{
    FeatureKind, FeatureStore, GeoJsonFeatureStore, ProcedureStore, StoreConfig, SystemDescStore,
};
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;
mod config;

use cli::{Cli, Commands, ConfigAction, StoreKind};

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.quiet {
        EnvFilter::new("warn")
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    let output = run(&cli)?;
    write_output(cli.output.as_deref(), &output)
}

fn run(cli: &Cli) -> Result<String> {
    if let Commands::Config { action } = &cli.command {
        return run_config(cli, action);
    }

    let config = config::resolve(cli.config.as_deref(), cli.database.as_deref())?;

    match &cli.command {
        Commands::Import { input, parent } => {
            let text = read_input(input)?;
            let store: GeoJsonFeatureStore = open(config)?;
            with_store(store, |store| commands::cmd_import(store, &text, *parent))
        }
        Commands::Get { uid, output } => {
            with_store(open(config)?, |store: &GeoJsonFeatureStore| {
                commands::cmd_get(store, uid, output.format)
            })
        }
        Commands::List {
            select,
            kind,
            output,
        } => match kind {
            StoreKind::Features => with_store(open(config)?, |store: &GeoJsonFeatureStore| {
                commands::cmd_list(store, select, output.format)
            }),
            StoreKind::Procedures => with_store(open(config)?, |store: &ProcedureStore| {
                commands::cmd_list(store, select, output.format)
            }),
            StoreKind::Systems => with_store(open(config)?, |store: &SystemDescStore| {
                commands::cmd_list(store, select, output.format)
            }),
        },
        Commands::Bbox { output } => with_store(open(config)?, |store: &GeoJsonFeatureStore| {
            commands::cmd_bbox(store, output.format)
        }),
        Commands::Count { kind } => match kind {
            StoreKind::Features => {
                with_store(open(config)?, |store: &GeoJsonFeatureStore| commands::cmd_count(store))
            }
            StoreKind::Procedures => {
                with_store(open(config)?, |store: &ProcedureStore| commands::cmd_count(store))
            }
            StoreKind::Systems => {
                with_store(open(config)?, |store: &SystemDescStore| commands::cmd_count(store))
            }
        },
        Commands::Remove {
            uid,
            all_matching,
            select,
        } => with_store(open(config)?, |store: &GeoJsonFeatureStore| {
            match (uid, all_matching) {
                (_, true) => commands::cmd_remove_matching(store, select),
                (Some(uid), false) => commands::cmd_remove(store, uid),
                (None, false) => anyhow::bail!("Give a uid or --all-matching"),
            }
        }),
        Commands::Config { .. } => unreachable!("handled above"),
    }
}

fn run_config(cli: &Cli, action: &ConfigAction) -> Result<String> {
    let path = config::config_file(cli.config.as_deref());
    match action {
        ConfigAction::Path => Ok(format!("{}\n", path.display())),
        ConfigAction::Show => {
            let config = config::resolve(cli.config.as_deref(), cli.database.as_deref())?;
            config::show(&config)
        }
        ConfigAction::Init { force } => {
            config::init(&path, *force)?;
            Ok(format!("Wrote {}\n", path.display()))
        }
    }
}

fn open<K: FeatureKind>(config: StoreConfig) -> Result<FeatureStore<K>> {
    let path = config.path.clone();
    FeatureStore::open(config)
        .with_context(|| format!("Failed to open database {}", path.display()))
}

/// Run `f` and close the store whatever the outcome.
fn with_store<K: FeatureKind, T>(
    store: FeatureStore<K>,
    f: impl FnOnce(&FeatureStore<K>) -> Result<T>,
) -> Result<T> {
    let result = f(&store);
    store.close();
    result
}

fn read_input(input: &Path) -> Result<String> {
    if input == Path::new("-") {
        let mut text = String::new();
        io::stdin()
            .read_to_string(&mut text)
            .context("Failed to read stdin")?;
        Ok(text)
    } else {
        std::fs::read_to_string(input)
            .with_context(|| format!("Failed to read {}", input.display()))
    }
}

/// Write output to file or stdout
fn write_output(output: Option<&Path>, content: &str) -> Result<()> {
    match output {
        Some(path) => {
            std::fs::write(path, content)
                .with_context(|| format!("Failed to write to {}", path.display()))?;
        }
        None => {
            let mut stdout = io::stdout().lock();
            stdout.write_all(content.as_bytes())?;
            stdout.flush()?;
        }
    }
    Ok(())
}
