use argfuzz_core::catalog::PayloadCatalog;
use argfuzz_core::config::{ArgfuzzConfig, ConfigError, resolve_target, validate_script};
use argfuzz_core::executor::CommandExecutor;
use argfuzz_core::reporter::TextReporter;
use argfuzz_core::session::FuzzSession;

use clap::Parser;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::filter::LevelFilter;

/// sysexits.h EX_USAGE
const EX_USAGE: u8 = 64;

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Cli {
    /// Path to binary to fuzz
    #[clap(value_parser, required_unless_present = "list_payloads")]
    target: Option<PathBuf>,
    /// Path to script file containing test cases
    #[clap(value_parser, required_unless_present = "list_payloads")]
    script: Option<PathBuf>,
    /// Seconds before killing the program being fuzzed, 0 disables
    #[clap(short, long, allow_negative_numbers = true)]
    timeout: Option<f64>,
    #[clap(short, long, value_parser)]
    config_file: Option<PathBuf>,
    /// Debug logging
    #[clap(short, long)]
    verbose: bool,
    /// Print the payload catalog and exit
    #[clap(long)]
    list_payloads: bool,
}

fn init_logging(verbose: bool) {
    let level = if verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let catalog = PayloadCatalog::builtin();
    if cli.list_payloads {
        print_catalog(&catalog);
        return ExitCode::SUCCESS;
    }

    match run(cli, &catalog) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => ExitCode::from(failure_status(&err)),
    }
}

/// Reports a failed run and picks the process exit status for it.
fn failure_status(err: &anyhow::Error) -> u8 {
    match err.downcast_ref::<ConfigError>() {
        Some(config_err) => {
            println!("[-] {config_err}");
            println!("[-] Exiting.");
            EX_USAGE
        }
        None => {
            error!("{err:#}");
            1
        }
    }
}

fn load_config(config_file: Option<PathBuf>) -> Result<ArgfuzzConfig, ConfigError> {
    match config_file {
        Some(config_path) => {
            info!("Loading configuration from specified path: {config_path:?}");
            ArgfuzzConfig::load_from_file(&config_path)
        }
        None => {
            let default_config_path = Path::new("config.toml");
            if default_config_path.exists() {
                info!("No config file specified, loading default: {default_config_path:?}");
                ArgfuzzConfig::load_from_file(default_config_path)
            } else {
                Ok(ArgfuzzConfig::default())
            }
        }
    }
}

fn run(cli: Cli, catalog: &PayloadCatalog) -> Result<(), anyhow::Error> {
    let (Some(target), Some(script)) = (cli.target, cli.script) else {
        anyhow::bail!("target and script are required");
    };

    let mut config = load_config(cli.config_file)?;
    if let Some(timeout) = cli.timeout {
        config.runner.timeout_secs = timeout;
    }
    let executor_config = config.executor_config()?;

    let resolved = resolve_target(&target)?;
    validate_script(&script)?;
    let target_str = resolved
        .to_str()
        .ok_or_else(|| ConfigError::NonUtf8Path(resolved.clone()))?;
    let script_file = File::open(&script).map_err(|source| ConfigError::ScriptUnreadable {
        path: script.clone(),
        source,
    })?;

    info!("Effective configuration: {config:?}");
    println!(
        "[+] Fuzzing {} with tests defined in {}\n",
        target.display(),
        script.display()
    );

    let session = FuzzSession::new(target_str, catalog, CommandExecutor::new(executor_config));
    let mut reporter = TextReporter::new(std::io::stdout().lock(), script.display().to_string());
    session.run_script(BufReader::new(script_file), &mut reporter)?;
    drop(reporter);

    println!("[+] Done");
    Ok(())
}

fn print_catalog(catalog: &PayloadCatalog) {
    for set in catalog.sets() {
        println!("{} ({} payloads)", set.placeholder, set.len());
        for entry in &set.entries {
            println!("    {:<24}{} bytes", entry.label, entry.value.len());
        }
    }
}
