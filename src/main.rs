use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;
use wand_cli::exception::Severity;
use wand_cli::{Wand, catalog, config, output};

fn version_string() -> &'static str {
    let hash = env!("WAND_GIT_HASH");
    if hash.is_empty() {
        env!("CARGO_PKG_VERSION")
    } else {
        // Leaked once at startup, called exactly once
        Box::leak(format!("{}@{hash}", env!("CARGO_PKG_VERSION")).into_boxed_str())
    }
}

#[derive(Parser)]
#[command(name = "wand")]
#[command(about = "Apply image settings and operators one option at a time")]
#[command(long_about = "\
Apply image settings and operators one option at a time

Options are applied left to right to a single image list:

  wand rose.png -resize 50% ( +clone -negate ) -append -write out.png

  rose.png            read (any word without a leading - or +)
  -resize 50%         simple operator: applied to every image
  ( ... )             work on a fresh list, appended to the outer one on )
  +clone              copy the last image of the enclosing list
  -append             list operator: applied to the whole list
  { ... }             settings changed inside are restored on }
  -write out.png      write the list and keep going

-name applies or sets, +name resets or reverses. Problems are reported and
the run continues; only resource exhaustion stops it.

Run 'wand gen-config' to generate a documented wand.toml.")]
#[command(version = version_string())]
struct Cli {
    /// Configuration file (default: ./wand.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Report exceptions as JSON on stderr
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Apply a sequence of options
    Run {
        /// Options and file names, in order
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
    /// Print a stock wand.toml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(file) => config::load_config_file(file)?,
        None => config::load_config(Path::new("."))?,
    };
    init_tracing(&config.log);
    init_thread_pool(&config.resources);

    match cli.command {
        Command::Run { args } => {
            let mut wand = Wand::new();
            config.apply(&mut wand)?;
            let result = catalog::run(&mut wand, args.as_slice());
            wand.catch_exceptions(true);
            let caught = wand.take_exceptions();
            drop(wand);

            if cli.json {
                eprintln!("{}", output::exceptions_json(&caught)?);
            } else {
                output::print_exceptions(&caught);
            }
            result?;
            if caught.iter().any(|e| e.severity >= Severity::Error) {
                std::process::exit(1);
            }
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

/// Install the tracing subscriber. `RUST_LOG` wins over the config level.
fn init_tracing(log: &config::LogConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log.level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Initialize the rayon thread pool based on the resources config.
///
/// Caps at the number of available CPU cores. User can constrain down, not up.
fn init_thread_pool(resources: &config::ResourcesConfig) {
    let threads = config::effective_threads(resources);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}
