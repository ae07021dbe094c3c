use clap::{Parser, Subcommand};
use std::process::ExitCode;
use tokio::runtime::Runtime;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sampling_lab::ai::cost::{ReasoningEffort, ThinkingBudget};
use sampling_lab::cli::commands;

#[derive(Parser)]
#[command(name = "sampling-lab")]
#[command(
    version,
    about = "Estimate, route and send LLM sampling requests across providers"
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
    /// Estimate the cost of a message without sending it
    Estimate {
        #[arg(help = "Message text")]
        text: String,
        #[arg(long, help = "Completion token limit (config default when unset)")]
        max_tokens: Option<u32>,
        #[arg(long, help = "Provider id to price against")]
        provider: Option<String>,
        #[arg(
            long,
            default_value = "minimal",
            help = "Reasoning effort: minimal, low, medium, high"
        )]
        effort: ReasoningEffort,
        #[arg(long, help = "Thinking budget: low, medium, high")]
        thinking: Option<ThinkingBudget>,
        #[arg(
            short = 'f',
            long,
            default_value = "text",
            help = "Output format: text, json"
        )]
        format: String,
    },

    /// Submit a sampling request and wait for the result
    Send {
        #[arg(help = "Message text")]
        text: String,
        #[arg(long, help = "System prompt")]
        system: Option<String>,
        #[arg(long, help = "Completion token limit")]
        max_tokens: Option<u32>,
        #[arg(long, help = "Sampling temperature (0.0-2.0)")]
        temperature: Option<f32>,
        #[arg(long, default_value = "cli", help = "Requesting server id")]
        server: String,
        #[arg(long, help = "Provider id (overrides active_provider)")]
        provider: Option<String>,
        #[arg(
            long,
            default_value = "minimal",
            help = "Reasoning effort: minimal, low, medium, high"
        )]
        effort: ReasoningEffort,
        #[arg(long, help = "Thinking budget: low, medium, high")]
        thinking: Option<ThinkingBudget>,
        #[arg(long, help = "Route by the configured sampling mode and rules")]
        route: bool,
        #[arg(
            short = 'f',
            long,
            default_value = "text",
            help = "Output format: text, json"
        )]
        format: String,
    },

    /// List providers and their status
    Providers {
        #[arg(
            short = 'f',
            long,
            default_value = "text",
            help = "Output format: text, json"
        )]
        format: String,
        #[arg(long, help = "Fetch available model ids from each provider")]
        models: bool,
    },

    /// Show or clear persisted request history
    History {
        #[arg(
            short = 'f',
            long,
            default_value = "text",
            help = "Output format: text, json"
        )]
        format: String,
        #[arg(short = 'n', long, default_value = "20", help = "Requests to show")]
        limit: usize,
        #[arg(long, help = "Delete the history file")]
        clear: bool,
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
        #[arg(
            short = 'f',
            long,
            default_value = "toml",
            help = "Output format: toml, json"
        )]
        format: String,
    },
    /// Show configuration file paths
    Path,
    /// Write a starter configuration file
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
        eprintln!("\x1b[31msampling-lab encountered an unexpected error:\x1b[0m");
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

        // Default hook prints the backtrace when RUST_BACKTRACE=1
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
        Commands::Estimate {
            text,
            max_tokens,
            provider,
            effort,
            thinking,
            format,
        } => {
            commands::estimate::run(commands::estimate::EstimateOptions {
                text,
                max_tokens,
                provider,
                effort,
                thinking,
                format,
            })?;
        }
        Commands::Send {
            text,
            system,
            max_tokens,
            temperature,
            server,
            provider,
            effort,
            thinking,
            route,
            format,
        } => {
            let rt = Runtime::new()?;
            rt.block_on(commands::send::run(commands::send::SendOptions {
                text,
                system,
                max_tokens,
                temperature,
                server,
                provider,
                effort,
                thinking,
                route,
                format,
            }))?;
        }
        Commands::Providers { format, models } => {
            let rt = Runtime::new()?;
            rt.block_on(commands::providers::run(&format, models))?;
        }
        Commands::History {
            format,
            limit,
            clear,
        } => {
            let rt = Runtime::new()?;
            rt.block_on(commands::history::run(&format, limit, clear))?;
        }
        Commands::Config { action } => match action {
            ConfigAction::Show { format } => commands::config::show(&format)?,
            ConfigAction::Path => commands::config::path()?,
            ConfigAction::Init { global, force } => commands::config::init(global, force)?,
        },
    }

    Ok(())
}
