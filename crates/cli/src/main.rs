use std::ffi::OsString;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use luabox_core::CoreError;
use luabox_lua::{OsPolicy, render_chain};
use tracing_subscriber::EnvFilter;

mod cmd;

/// luabox - Run Lua scripts in a sandbox
#[derive(Parser)]
#[command(name = "luabox")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to the project manifest
    #[arg(long, global = true, default_value = "Project.yml")]
    project: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a Lua script outside of any project
    Run {
        /// Path to the script
        script: PathBuf,

        /// How the `os` library is exposed (disabled, hardened or full)
        #[arg(long, default_value = "hardened")]
        os: OsPolicy,
    },

    /// Command declared in the project manifest
    #[command(external_subcommand)]
    Project(Vec<OsString>),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging. RUST_LOG takes precedence over --verbose.
    let level = if cli.verbose { "debug" } else { "warn" };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)),
        )
        .with_writer(std::io::stderr)
        .without_time()
        .init();

    let r = match cli.command {
        Commands::Run { script, os } => cmd::cmd_run(&script, os),
        Commands::Project(args) => cmd::cmd_project(&cli.project, args),
    };

    match r {
        Ok(code) => code.into(),
        Err(e) => report(e),
    }
}

fn report(e: CoreError) -> ExitCode {
    match &e {
        // Lua messages already carry the location.
        CoreError::LoadScript(v) | CoreError::RunScript(v) => eprintln!("{v}"),
        e => eprintln!("error: {}", render_chain(e)),
    }

    e.exit_code().into()
}
