//! ChemBridge CLI: drive the chemengine native toolkit through the FFI bridge.

mod optfile;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use lib_chem_ffi::Session;
use std::io::Write;
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "chembridge")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Engine install root (contains lib/<os>-<arch>/)
    #[arg(short = 'r', long)]
    engine_root: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print engine version and build information
    Version,

    /// Load a structure file and print its canonical representation
    Convert {
        /// Input file the engine reads
        input: PathBuf,

        /// JSON option file applied before loading
        #[arg(short, long)]
        options: Option<PathBuf>,
    },

    /// Write the engine's binary serialization of a structure file
    Serialize {
        /// Input file the engine reads
        input: PathBuf,

        /// Output file for the serialized bytes
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Apply a JSON option file and read every option back
    Options {
        /// JSON option file
        #[arg(short, long)]
        file: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .init();

    let session = Session::attach(&cli.engine_root)
        .with_context(|| format!("attaching engine session from {:?}", cli.engine_root))?;

    match cli.command {
        Commands::Version => print_version(&session)?,
        Commands::Convert { input, options } => convert(&session, &input, options.as_deref())?,
        Commands::Serialize { input, output } => serialize(&session, &input, &output)?,
        Commands::Options { file } => apply_options(&session, &file)?,
    }

    Ok(())
}

fn print_version(session: &Session) -> Result<()> {
    println!("{}", session.version()?);
    println!("{}", session.version_info()?);
    Ok(())
}

fn convert(
    session: &Session,
    input: &std::path::Path,
    options: Option<&std::path::Path>,
) -> Result<()> {
    if let Some(path) = options {
        for (name, value) in optfile::load(path)? {
            session.set_option(&name, value)?;
        }
    }

    tracing::info!("Loading structure from {:?}", input);
    let structure = session.load_structure_from_file(input)?;
    println!("{}", structure.representation()?);
    Ok(())
}

fn serialize(session: &Session, input: &std::path::Path, output: &std::path::Path) -> Result<()> {
    tracing::info!("Loading structure from {:?}", input);
    let structure = session.load_structure_from_file(input)?;
    let bytes = structure.serialize()?;

    let mut f = std::fs::File::create(output)
        .with_context(|| format!("creating output file {output:?}"))?;
    f.write_all(&bytes)?;

    tracing::info!(bytes = bytes.len(), "Wrote serialized structure to {:?}", output);
    Ok(())
}

fn apply_options(session: &Session, file: &std::path::Path) -> Result<()> {
    for (name, value) in optfile::load(file)? {
        session.set_option(&name, value)?;
        let kind = session.get_option_type(&name)?;
        let readback = session.get_option(&name)?;
        println!("{name} ({kind}) = {readback}");
    }
    Ok(())
}
