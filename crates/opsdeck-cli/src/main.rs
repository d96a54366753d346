mod cmd;
mod output;
mod root;

use clap::{Parser, Subcommand};
use cmd::{config::ConfigSubcommand, launch::LaunchArgs};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "opsdeck",
    about = "Operations control plane: run catalogued actions and supervise node/wallet processes",
    version,
    propagate_version = true
)]
struct Cli {
    /// Project root (default: auto-detect from .opsdeck/ or .git/)
    #[arg(long, global = true, env = "OPSDECK_ROOT")]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List catalogued actions grouped by category
    List,

    /// Run one action, streaming its output
    Run {
        /// Action slug (see `opsdeck list`)
        slug: String,
    },

    /// Write the action catalog as JSON
    Export {
        /// Output file (default: stdout)
        #[arg(long, short = 'o')]
        out: Option<PathBuf>,

        /// Pretty-print (always on when writing a file)
        #[arg(long)]
        pretty: bool,
    },

    /// Serve the HTTP API
    Serve {
        /// Listen address (default: server.bind from config)
        #[arg(long)]
        bind: Option<String>,
    },

    /// Start a supervised node or wallet in the foreground until Ctrl-C
    Launch(LaunchArgs),

    /// Inspect and validate `.opsdeck/config.yaml`
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Serve { .. } | Commands::Launch(_) => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let root = root::resolve_root(cli.root.as_deref());

    let result = match cli.command {
        Commands::List => cmd::list::run(&root, cli.json),
        Commands::Run { slug } => cmd::run::run(&root, &slug, cli.json),
        Commands::Export { out, pretty } => cmd::export::run(&root, out.as_deref(), pretty),
        Commands::Serve { bind } => cmd::serve::run(&root, bind),
        Commands::Launch(args) => cmd::launch::run(&root, args, cli.json),
        Commands::Config { subcommand } => cmd::config::run(&root, subcommand, cli.json),
    };

    if let Err(e) = result {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
