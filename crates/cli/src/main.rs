//! querybench CLI: drive a full experiment from one TOML file.
//!
//! - `init`: write a template experiment file
//! - `generate`: stream a table's rows to stdout as CSV
//! - `load`: create the schema and load the dataset into a SQLite file
//! - `run`: benchmark the query variants and compare them
//! - `all`: `load`, then `run`

mod commands;
mod format;

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::ArgMatches;
use querybench_bench::{render, Experiment, ExperimentReport, OutputFormat, VariantRegistry};
use querybench_core::{BenchError, Checkout, ExperimentFile};
use querybench_dataset::{DataGenerator, DatasetLoader, LoadReport};
use querybench_sqlite::SqliteFactory;
use tracing::info;
use tracing_subscriber::EnvFilter;

use commands::build_cli;
use format::{format_load_report, write_rows_csv};

/// Some table failed to load or some variant failed to run
const EXIT_PARTIAL_FAILURE: i32 = 2;

fn main() {
    let matches = build_cli().get_matches();
    init_logging(matches.get_count("verbose"));

    let exit_code = match dispatch(&matches) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("(error) {:#}", e);
            1
        }
    };
    process::exit(exit_code);
}

/// Install the stderr subscriber; `RUST_LOG` wins over `-v`.
fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

struct GlobalOpts {
    config: PathBuf,
    db: PathBuf,
    format: OutputFormat,
}

impl GlobalOpts {
    fn from_matches(matches: &ArgMatches) -> anyhow::Result<Self> {
        let path = |name: &str| {
            matches
                .get_one::<String>(name)
                .map(PathBuf::from)
                .with_context(|| format!("missing --{}", name))
        };
        let format = matches
            .get_one::<String>("format")
            .map(String::as_str)
            .unwrap_or("table")
            .parse::<OutputFormat>()?;
        Ok(Self {
            config: path("config")?,
            db: path("db")?,
            format,
        })
    }

    fn experiment_file(&self) -> anyhow::Result<ExperimentFile> {
        Ok(ExperimentFile::from_file(&self.config)?)
    }
}

fn dispatch(matches: &ArgMatches) -> anyhow::Result<i32> {
    let opts = GlobalOpts::from_matches(matches)?;

    match matches.subcommand() {
        Some(("init", _)) => {
            if ExperimentFile::write_default_if_missing(&opts.config)? {
                println!("Wrote {}", opts.config.display());
            } else {
                println!("{} already exists, left unchanged", opts.config.display());
            }
            Ok(0)
        }
        Some(("generate", sub)) => {
            let file = opts.experiment_file()?;
            let table = sub
                .get_one::<String>("table")
                .context("missing --table")?;
            let offset = sub.get_one::<u64>("offset").copied().unwrap_or(0);
            let limit = sub.get_one::<u64>("limit").copied();
            generate(&file, table, offset, limit)?;
            Ok(0)
        }
        Some(("load", sub)) => {
            let file = opts.experiment_file()?;
            let report = load(&file, &opts.db, sub.get_flag("fresh"))?;
            println!("{}", format_load_report(&report, opts.format)?);
            Ok(exit_code(report.is_success()))
        }
        Some(("run", sub)) => {
            let file = opts.experiment_file()?;
            if !opts.db.exists() {
                bail!(
                    "database {} does not exist; run `querybench load` first",
                    opts.db.display()
                );
            }
            let report = run(&file, &opts.db, &selected_variants(sub))?;
            println!("{}", render(&report, opts.format)?);
            Ok(exit_code(report.is_success()))
        }
        Some(("all", sub)) => {
            let file = opts.experiment_file()?;
            let load_report = load(&file, &opts.db, sub.get_flag("fresh"))?;
            if !load_report.is_success() {
                println!("{}", format_load_report(&load_report, opts.format)?);
                eprintln!("(error) dataset load incomplete, benchmark not run");
                return Ok(EXIT_PARTIAL_FAILURE);
            }
            let report = run(&file, &opts.db, &selected_variants(sub))?;
            print_all(&load_report, &report, opts.format)?;
            Ok(exit_code(report.is_success()))
        }
        Some((other, _)) => bail!("unknown command '{}'", other),
        None => bail!("no command given"),
    }
}

fn exit_code(success: bool) -> i32 {
    if success {
        0
    } else {
        EXIT_PARTIAL_FAILURE
    }
}

fn selected_variants(sub: &ArgMatches) -> Vec<String> {
    sub.get_many::<String>("variant")
        .map(|names| names.cloned().collect())
        .unwrap_or_default()
}

fn generate(file: &ExperimentFile, table: &str, offset: u64, limit: Option<u64>) -> anyhow::Result<()> {
    let generator = DataGenerator::new(&file.schema(), &file.plan())?;
    let rows = generator
        .rows_from(table, offset)
        .ok_or_else(|| BenchError::config(format!("table '{}' is not in the experiment", table)))?;
    let stdout = io::stdout();
    let written = write_rows_csv(stdout.lock(), rows, limit)?;
    info!(target: "querybench::gen", table, offset, rows = written, "Rows written");
    Ok(())
}

/// Create the schema in a new database file and load every table.
fn load(file: &ExperimentFile, db: &Path, fresh: bool) -> anyhow::Result<LoadReport> {
    if db.exists() {
        if !fresh {
            bail!(
                "database {} already exists; pass --fresh to replace it",
                db.display()
            );
        }
        remove_database(db)?;
    }

    let schema = file.schema();
    let generator = DataGenerator::new(&schema, &file.plan())?;
    let factory = SqliteFactory::new(db);
    let loader = DatasetLoader::from_config(&file.harness);
    {
        let mut conn = Checkout::acquire(&factory, "schema")?;
        loader.create_schema(&mut *conn, &schema)?;
    }
    Ok(loader.load_all(&factory, &generator)?)
}

/// Remove a database file together with its WAL side files.
fn remove_database(db: &Path) -> anyhow::Result<()> {
    std::fs::remove_file(db).with_context(|| format!("removing {}", db.display()))?;
    for suffix in ["-wal", "-shm"] {
        let mut side = db.as_os_str().to_owned();
        side.push(suffix);
        let side = PathBuf::from(side);
        if side.exists() {
            std::fs::remove_file(&side).with_context(|| format!("removing {}", side.display()))?;
        }
    }
    Ok(())
}

fn run(file: &ExperimentFile, db: &Path, only: &[String]) -> anyhow::Result<ExperimentReport> {
    let mut registry = VariantRegistry::new();
    let mut bindings = Vec::new();
    for entry in &file.variants {
        if only.is_empty() || only.contains(&entry.variant.name) {
            registry.register(entry.variant.clone());
            bindings.push((entry.variant.name.clone(), entry.params.clone()));
        }
    }
    for name in only {
        if !registry.contains(name) {
            return Err(BenchError::not_found(name.clone()).into());
        }
    }
    if registry.is_empty() {
        bail!("no variants to run");
    }

    let experiment = bindings.into_iter().fold(
        Experiment::new(Arc::new(registry), file.harness.clone()),
        |experiment, (name, params)| experiment.with_params(name, params),
    );
    Ok(experiment.run(&SqliteFactory::new(db)))
}

fn print_all(load: &LoadReport, report: &ExperimentReport, format: OutputFormat) -> anyhow::Result<()> {
    let mut stdout = io::stdout().lock();
    match format {
        OutputFormat::Json => {
            let combined = serde_json::json!({
                "load": serde_json::to_value(load)?,
                "experiment": serde_json::to_value(report)?,
            });
            writeln!(stdout, "{}", serde_json::to_string_pretty(&combined)?)?;
        }
        OutputFormat::Csv | OutputFormat::Table => {
            writeln!(stdout, "{}", format_load_report(load, format)?)?;
            writeln!(stdout)?;
            writeln!(stdout, "{}", render(report, format)?)?;
        }
    }
    Ok(())
}
