use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use regrisk::cli::commands::analyze::AnalyzeOptions;

/// Validate `owner/name`
fn parse_repository(s: &str) -> Result<String, String> {
    match s.split_once('/') {
        Some((owner, name)) if !owner.is_empty() && !name.is_empty() && !name.contains('/') => {
            Ok(s.to_string())
        }
        _ => Err(format!("Invalid repository '{}'. Expected owner/name", s)),
    }
}

#[derive(Parser)]
#[command(name = "regrisk")]
#[command(
    version,
    about = "Regression risk analysis for pull requests, driven by file history and tickets"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long, global = true)]
    verbose: bool,

    #[arg(long, short, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze every changed file of a pull request
    Analyze {
        #[arg(long, value_parser = parse_repository, help = "Repository as owner/name")]
        repo: String,
        #[arg(long, help = "Pull request number")]
        pr: u64,
        #[arg(long, help = "LLM provider (gemini, openai)")]
        provider: Option<String>,
        #[arg(long, help = "Model to use")]
        model: Option<String>,
        #[arg(long, short, help = "Write the markdown report to this file")]
        output: Option<PathBuf>,
        #[arg(
            long = "dry-run",
            help = "Gather evidence and estimate prompt sizes without calling the LLM"
        )]
        dry_run: bool,
        #[arg(long = "no-tickets", help = "Skip ticket description lookup")]
        no_tickets: bool,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration (merged from all sources)
    Show {
        #[arg(short = 'g', long, help = "Show global config file only")]
        global: bool,
        #[arg(
            short = 'f',
            long,
            default_value = "text",
            help = "Output format: text, json"
        )]
        format: String,
    },
    /// Show configuration file paths
    Path,
    /// Initialize configuration
    Init {
        #[arg(long, short, help = "Initialize global config")]
        global: bool,
        #[arg(long, help = "Overwrite existing config")]
        force: bool,
    },
}

/// Set up panic handler for graceful error reporting
fn setup_panic_handler() {
    let default_hook = std::panic::take_hook();

    std::panic::set_hook(Box::new(move |panic_info| {
        let message = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic".to_string()
        };

        eprintln!("\n\x1b[1;31m━━━ PANIC ━━━\x1b[0m");
        eprintln!("\x1b[31mregrisk encountered an unexpected error:\x1b[0m");
        eprintln!("  {}", message);

        if let Some(location) = panic_info.location() {
            eprintln!(
                "\x1b[90mLocation: {}:{}:{}\x1b[0m",
                location.file(),
                location.line(),
                location.column()
            );
        }
        eprintln!();

        // Call default hook for backtrace (if RUST_BACKTRACE=1)
        default_hook(panic_info);
    }));
}

fn main() -> ExitCode {
    setup_panic_handler();

    match run_cli() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("\x1b[31mError:\x1b[0m {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run_cli() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match cli.command {
        Commands::Analyze {
            repo,
            pr,
            provider,
            model,
            output,
            dry_run,
            no_tickets,
        } => {
            regrisk::cli::commands::analyze::run(AnalyzeOptions {
                repo,
                pr,
                provider,
                model,
                output,
                dry_run,
                no_tickets,
            })?;
        }
        Commands::Config { action } => match action {
            ConfigAction::Show { global, format } => {
                regrisk::cli::commands::config::show(global, &format)?;
            }
            ConfigAction::Path => {
                regrisk::cli::commands::config::path()?;
            }
            ConfigAction::Init { global, force } => {
                regrisk::cli::commands::config::init(global, force)?;
            }
        },
    }

    Ok(())
}
