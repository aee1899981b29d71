use clap::{Args, Parser, Subcommand};
use licbundle::commands;
use licbundle::error::CommandError;
use licbundle::parser::DEFAULT_MANIFEST;
use licbundle::utils::log::{log, set_log_level, LogLevel};
use std::path::PathBuf;

/// Bundle the license texts of a project and its installed packages
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Print debug messages
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write the license bundle
    Bundle(InputArgs),
    /// Exit with status 1 if the bundle on disk is missing or stale
    Check(InputArgs),
    /// List the dependencies and how many license files each ships
    List(InputArgs),
    /// Write a sample manifest
    Init {
        /// Manifest to create
        #[arg(short, long, default_value = DEFAULT_MANIFEST)]
        config: PathBuf,
        /// Overwrite an existing manifest without asking
        #[arg(short, long)]
        force: bool,
    },
}

#[derive(Args, Debug)]
struct InputArgs {
    /// Manifest describing the project
    #[arg(short, long, default_value = DEFAULT_MANIFEST)]
    config: PathBuf,
    /// Bundle path, overriding the manifest
    #[arg(short, long)]
    output: Option<PathBuf>,
    /// Conan graph JSON, overriding the manifest
    #[arg(short, long)]
    graph: Option<PathBuf>,
    /// Include packages from the build context of the graph
    #[arg(long)]
    build_context: bool,
}

impl InputArgs {
    fn load(&self) -> Result<commands::Inputs, CommandError> {
        commands::load_inputs(
            &self.config,
            self.output.as_deref(),
            self.graph.as_deref(),
            self.build_context,
        )
    }
}

fn run(cli: Cli) -> Result<bool, CommandError> {
    match cli.command {
        Command::Bundle(args) => commands::bundle(&args.load()?).map(|()| true),
        Command::Check(args) => commands::check(&args.load()?),
        Command::List(args) => {
            let stdout = std::io::stdout();
            commands::list(&args.load()?, &mut stdout.lock()).map(|()| true)
        }
        Command::Init { config, force } => commands::init_manifest(&config, force).map(|()| true),
    }
}

fn main() {
    let cli = Cli::parse();
    if cli.verbose {
        set_log_level(LogLevel::Debug);
    }
    match run(cli) {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(err) => {
            log(LogLevel::Error, &err.to_string());
            std::process::exit(1);
        }
    }
}
