//! Clap command tree definition.

use clap::{value_parser, Arg, ArgAction, Command};

/// Build the complete CLI command tree.
pub fn build_cli() -> Command {
    Command::new("querybench")
        .about("Generate synthetic datasets and benchmark query variants against SQLite")
        .after_help(
            "Exit status: 0 on success, 1 on configuration or engine errors, \
             2 when any table failed to load or any variant failed to run.",
        )
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .help("Experiment file")
                .default_value("querybench.toml")
                .global(true),
        )
        .arg(
            Arg::new("db")
                .long("db")
                .help("SQLite database file")
                .default_value("querybench.db")
                .global(true),
        )
        .arg(
            Arg::new("format")
                .long("format")
                .short('f')
                .help("Output format")
                .value_parser(["table", "json", "csv"])
                .default_value("table")
                .global(true),
        )
        .arg(
            Arg::new("verbose")
                .long("verbose")
                .short('v')
                .help("More logging on stderr (-v info, -vv debug, -vvv trace)")
                .action(ArgAction::Count)
                .global(true),
        )
        .subcommand(build_init())
        .subcommand(build_generate())
        .subcommand(build_load())
        .subcommand(build_run())
        .subcommand(build_all())
}

fn build_init() -> Command {
    Command::new("init").about("Write a template experiment file if none exists")
}

fn build_generate() -> Command {
    Command::new("generate")
        .about("Stream one table's generated rows to stdout as CSV")
        .arg(
            Arg::new("table")
                .long("table")
                .short('t')
                .help("Table to generate")
                .required(true),
        )
        .arg(
            Arg::new("offset")
                .long("offset")
                .help("First row index")
                .value_parser(value_parser!(u64))
                .default_value("0"),
        )
        .arg(
            Arg::new("limit")
                .long("limit")
                .help("Maximum rows to write")
                .value_parser(value_parser!(u64)),
        )
}

fn fresh_arg() -> Arg {
    Arg::new("fresh")
        .long("fresh")
        .help("Replace an existing database file")
        .action(ArgAction::SetTrue)
}

fn variant_arg() -> Arg {
    Arg::new("variant")
        .long("variant")
        .help("Only run the named variant (repeatable)")
        .action(ArgAction::Append)
}

fn build_load() -> Command {
    Command::new("load")
        .about("Create the schema and load the generated dataset")
        .arg(fresh_arg())
}

fn build_run() -> Command {
    Command::new("run")
        .about("Benchmark the query variants and compare candidates to baselines")
        .arg(variant_arg())
}

fn build_all() -> Command {
    Command::new("all")
        .about("Load the dataset, then run the benchmark")
        .arg(fresh_arg())
        .arg(variant_arg())
}
