//! `lab`: run declarative experiment suites from the command line.

use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use lab_cli::{load_laboratory, write_report, ConfigOverrides, Suite};
use lab_report::ReportFormat;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

fn cli() -> Command {
    Command::new("lab")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Run declarative experiment suites")
        .arg_required_else_help(true)
        .arg(
            Arg::new("log-level")
                .long("log-level")
                .global(true)
                .help("Log filter, e.g. info or lab_core=debug (overrides RUST_LOG)"),
        )
        .subcommand(
            Command::new("run")
                .about("Run a suite and report the results")
                .arg(
                    Arg::new("suite")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("Suite file (YAML)"),
                )
                .arg(
                    Arg::new("format")
                        .long("format")
                        .value_parser(|s: &str| s.parse::<ReportFormat>())
                        .help("text, json, html or markdown"),
                )
                .arg(
                    Arg::new("output")
                        .long("output")
                        .value_parser(value_parser!(PathBuf))
                        .help("Write the report here instead of stdout"),
                )
                .arg(
                    Arg::new("parallel")
                        .long("parallel")
                        .action(ArgAction::SetTrue)
                        .help("Run experiments in parallel batches"),
                )
                .arg(
                    Arg::new("max-parallel")
                        .long("max-parallel")
                        .value_parser(value_parser!(usize))
                        .help("Experiments per batch"),
                )
                .arg(
                    Arg::new("timeout-ms")
                        .long("timeout-ms")
                        .value_parser(value_parser!(u64))
                        .help("Default per-experiment timeout"),
                )
                .arg(
                    Arg::new("config")
                        .long("config")
                        .value_parser(value_parser!(PathBuf))
                        .help("Laboratory config (TOML)"),
                ),
        )
        .subcommand(
            Command::new("validate")
                .about("Parse a suite without running it")
                .arg(
                    Arg::new("suite")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("Suite file (YAML)"),
                ),
        )
}

fn init_tracing(level: Option<&String>) {
    let filter = match level {
        Some(level) => EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info")),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

async fn run(args: &ArgMatches) -> anyhow::Result<bool> {
    let suite = args.get_one::<PathBuf>("suite").cloned().unwrap_or_default();
    let overrides = ConfigOverrides {
        parallel: args.get_flag("parallel").then_some(true),
        max_parallel: args.get_one::<usize>("max-parallel").copied(),
        default_timeout_ms: args.get_one::<u64>("timeout-ms").copied(),
        ..ConfigOverrides::default()
    };
    let config = args.get_one::<PathBuf>("config");

    let lab = load_laboratory(&suite, config.map(PathBuf::as_path), &overrides)?;
    tracing::info!(laboratory = lab.name(), experiments = lab.len(), "running suite");
    let report = lab.run_all().await?;

    write_report(
        &report,
        args.get_one::<ReportFormat>("format").copied(),
        args.get_one::<PathBuf>("output").map(PathBuf::as_path),
        &mut std::io::stdout().lock(),
    )?;
    Ok(report.success)
}

fn validate(args: &ArgMatches) -> anyhow::Result<bool> {
    let path = args.get_one::<PathBuf>("suite").cloned().unwrap_or_default();
    let suite = Suite::from_path(&path)?;
    let experiments = suite.experiments()?;
    println!(
        "{}: {} experiment(s), {} fixture subject(s)",
        path.display(),
        experiments.len(),
        suite.subjects.len()
    );
    Ok(true)
}

#[tokio::main]
async fn main() {
    let matches = cli().get_matches();
    // globals propagate down only
    let level = matches
        .subcommand()
        .and_then(|(_, args)| args.get_one::<String>("log-level"))
        .or_else(|| matches.get_one::<String>("log-level"));
    init_tracing(level);

    let outcome = match matches.subcommand() {
        Some(("run", args)) => run(args).await,
        Some(("validate", args)) => validate(args),
        _ => Ok(true),
    };

    match outcome {
        Ok(success) => std::process::exit(if success { 0 } else { 1 }),
        Err(err) => {
            eprintln!("error: {err:#}");
            std::process::exit(2);
        }
    }
}
