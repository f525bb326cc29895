#![forbid(unsafe_code)]

//! wssec CLI: undecorate WS-Security messages and inspect Security headers.

use std::path::{Path, PathBuf};
use std::process;

use clap::{ArgAction, Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use wssec::report;
use wssec::{Error, Message, SoapMessage, WssProcessor};

#[derive(Parser)]
#[command(
    name = "wssec",
    about = "WS-Security message processing: verify, decrypt and strip Security headers",
    version
)]
struct Cli {
    /// More log output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Process the Security header of a SOAP message
    Process {
        /// Input SOAP message
        file: PathBuf,

        /// Processor configuration (TOML)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Certificate (PEM) to resolve tokens against; repeatable
        #[arg(long)]
        cert: Vec<PathBuf>,

        /// RSA private key (PEM) belonging to the first --cert
        #[arg(short = 'k', long)]
        key: Option<PathBuf>,

        /// Write the undecorated message here
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List the Security header children without any cryptography
    Inspect {
        /// Input SOAP message
        file: PathBuf,

        /// Processor configuration (TOML), for the recipient actors
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Process {
            file,
            config,
            cert,
            key,
            output,
        } => cmd_process(file, config, cert, key, output),
        Commands::Inspect { file, config } => cmd_inspect(file, config),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn cmd_process(
    file: PathBuf,
    config: Option<PathBuf>,
    cert: Vec<PathBuf>,
    key: Option<PathBuf>,
    output: Option<PathBuf>,
) -> Result<(), Error> {
    let config = report::load_config(config.as_deref())?;
    let resolver = report::build_resolver(&cert, key.as_deref())?;
    let mut message = read_message(&file)?;

    tracing::info!(file = %file.display(), "processing message");
    let processor = WssProcessor::new(config);
    let result = processor.undecorate_message(&mut message, None, None, Some(&resolver))?;
    print!("{}", report::summary(&result, message.document()));

    if let Some(path) = output {
        let xml = wssec::xml::writer::serialize(message.document());
        std::fs::write(&path, xml)
            .map_err(|e| Error::Processor(format!("{}: {e}", path.display())))?;
    }
    Ok(())
}

fn cmd_inspect(file: PathBuf, config: Option<PathBuf>) -> Result<(), Error> {
    let config = report::load_config(config.as_deref())?;
    let message = read_message(&file)?;
    for line in report::inspect(message.document(), &config) {
        println!("{line}");
    }
    Ok(())
}

// ── Utility functions ────────────────────────────────────────────────

fn read_message(path: &Path) -> Result<SoapMessage, Error> {
    let data = std::fs::read(path).map_err(|e| Error::Processor(format!("{}: {e}", path.display())))?;
    SoapMessage::parse_bytes(&data)
}
