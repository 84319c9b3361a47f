//! SLUICE CLI
//!
//! Run sandboxed libsodium calls from the command line.

#![warn(missing_docs)]
#![warn(clippy::all)]

use clap::{Parser, Subcommand};
use color_eyre::eyre::{WrapErr, bail, eyre};
use color_eyre::Result;
use sluice_core::{Encoding, from_hex};
use sluice_sim::{SimSandbox, SimSeed};
use sluice_sodium::{ArgKind, CallContract, Input, Sodium};
use sluice_wasm::{Ready, SandboxBackend, SandboxConfig, WasmSandbox};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Placeholder for an omitted optional argument
const ABSENT: &str = "_";

#[derive(Parser)]
#[command(name = "sluice")]
#[command(
    about = "SLUICE - call libsodium primitives inside a WebAssembly sandbox",
    long_about = None
)]
struct Cli {
    /// Primitive module to load
    #[arg(short, long, global = true, conflicts_with = "simulated")]
    module: Option<PathBuf>,
    /// Use the in-process simulated sandbox
    #[arg(long, global = true)]
    simulated: bool,
    /// Seed for the simulated sandbox
    #[arg(long, global = true, default_value_t = 42)]
    seed: u64,
    /// Sandbox configuration (JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Invoke a primitive
    Call {
        /// Call name, e.g. crypto_generichash
        name: String,
        /// Arguments in declared order; `_` omits an optional argument
        args: Vec<String>,
        /// Output encoding
        #[arg(short, long)]
        encoding: Option<String>,
        /// Decode byte arguments as hex instead of taking their UTF-8 bytes
        #[arg(long)]
        hex_args: bool,
    },
    /// List supported calls
    Symbols {
        /// Print each call's contract as JSON
        #[arg(short, long)]
        verbose: bool,
    },
    /// List output encodings
    Encodings,
}

fn main() -> Result<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("SLUICE_LOG").unwrap_or_else(|_| EnvFilter::new("sluice=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Symbols { verbose } => {
            for name in Sodium::<SimSandbox>::list_supported_calls() {
                if *verbose {
                    let contract = Sodium::<SimSandbox>::contract(name)?;
                    println!("{}", serde_json::to_string(contract)?);
                } else {
                    println!("{name}");
                }
            }
            Ok(())
        }
        Commands::Encodings => {
            for name in Encoding::available() {
                println!("{name}");
            }
            Ok(())
        }
        Commands::Call {
            name,
            args,
            encoding,
            hex_args,
        } => {
            let config = match &cli.config {
                Some(path) => SandboxConfig::from_file(path)?,
                None => SandboxConfig::default(),
            };
            let contract = Sodium::<SimSandbox>::contract(name)?;
            let owned = parse_args(contract, args, *hex_args)?;

            if let Some(path) = &cli.module {
                info!(module = %path.display(), "loading primitive module");
                let sandbox = WasmSandbox::from_file(config.clone(), path)?;
                run(Ready::initialize(sandbox)?, &config, name, &owned, encoding.as_deref())
            } else if cli.simulated {
                info!(seed = cli.seed, "using simulated sandbox");
                let sandbox = SimSandbox::new(SimSeed::from_literal(cli.seed));
                run(Ready::initialize(sandbox)?, &config, name, &owned, encoding.as_deref())
            } else {
                bail!("choose a sandbox with --module <file.wasm> or --simulated")
            }
        }
    }
}

fn run<B: SandboxBackend>(
    ready: Ready<B>,
    config: &SandboxConfig,
    name: &str,
    owned: &[Arg],
    encoding: Option<&str>,
) -> Result<()> {
    let mut sodium = Sodium::with_config(ready, config);
    let inputs: Vec<Option<Input<'_>>> = owned.iter().map(Arg::as_input).collect();
    let rendered = sodium.call(name, &inputs, encoding)?;
    println!("{}", serde_json::to_string_pretty(&rendered)?);
    Ok(())
}

/// A command-line argument converted for its declared kind
#[derive(Debug, PartialEq, Eq)]
enum Arg {
    Absent,
    Bytes(Vec<u8>),
    Text(String),
    Number(u64),
}

impl Arg {
    fn as_input(&self) -> Option<Input<'_>> {
        match self {
            Self::Absent => None,
            Self::Bytes(bytes) => Some(Input::from(bytes)),
            Self::Text(text) => Some(Input::from(text)),
            Self::Number(n) => Some(Input::Number(*n)),
        }
    }
}

fn parse_args(contract: &CallContract, args: &[String], hex_args: bool) -> Result<Vec<Arg>> {
    // Trailing placeholders are dropped
    let given = args.iter().rposition(|raw| raw != ABSENT).map_or(0, |last| last + 1);
    if given > contract.args.len() {
        bail!(
            "{} takes at most {} arguments, got {}",
            contract.name,
            contract.args.len(),
            given
        );
    }

    args[..given]
        .iter()
        .zip(contract.args)
        .map(|(raw, spec)| {
            if raw == ABSENT {
                return Ok(Arg::Absent);
            }
            match spec.kind {
                ArgKind::Scalar { .. } => raw
                    .parse()
                    .map(Arg::Number)
                    .map_err(|e| eyre!("{}: {} must be a number: {e}", contract.name, spec.name)),
                ArgKind::Bytes(_) if hex_args => from_hex(raw)
                    .map(Arg::Bytes)
                    .wrap_err_with(|| format!("{}: {}", contract.name, spec.name)),
                ArgKind::Bytes(_) => Ok(Arg::Text(raw.clone())),
            }
        })
        .collect()
}
